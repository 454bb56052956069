//! Deployment execution engine.
//!
//! Steps run strictly in plan order, one at a time, against a single signer. The
//! first failure aborts the run: later steps are never attempted and the results
//! recorded so far are returned with the error. There is no rollback because
//! published contracts cannot be removed from the chain.

use crate::{
    AccountHandle, CreationTx, DeployError, DeploymentPlan, DeploymentResult, NetworkContext,
    PlanFailure, ResultLedger,
};

/// Lifecycle of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum StepState {
    Pending,
    Resolving,
    Submitting,
    Confirming,
    Succeeded,
    Failed,
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Lifecycle of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum PlanStatus {
    Running,
    Completed,
    Aborted,
}

/// One execution of a [`DeploymentPlan`] against a [`NetworkContext`].
pub struct Pipeline<'a, N> {
    plan: &'a DeploymentPlan,
    network: &'a N,
    signer: Option<AccountHandle>,
    ledger: ResultLedger,
    states: Vec<StepState>,
    status: PlanStatus,
    next: usize,
}

impl<'a, N: NetworkContext> Pipeline<'a, N> {
    pub fn new(plan: &'a DeploymentPlan, network: &'a N) -> Self {
        Self {
            plan,
            network,
            signer: None,
            ledger: ResultLedger::new(),
            states: vec![StepState::Pending; plan.len()],
            status: if plan.is_empty() {
                PlanStatus::Completed
            } else {
                PlanStatus::Running
            },
            next: 0,
        }
    }

    pub fn status(&self) -> PlanStatus {
        self.status
    }

    /// State of each step, in plan order.
    pub fn step_states(&self) -> &[StepState] {
        &self.states
    }

    /// Results recorded so far.
    pub fn ledger(&self) -> &ResultLedger {
        &self.ledger
    }

    pub fn into_ledger(self) -> ResultLedger {
        self.ledger
    }

    /// The signing account, once the first step has fetched it.
    pub fn signer(&self) -> Option<AccountHandle> {
        self.signer
    }

    /// Stop before the next step. A step in flight is never interrupted.
    pub fn cancel(&mut self) {
        if self.status == PlanStatus::Running {
            tracing::warn!(
                completed = self.next,
                remaining = self.plan.len() - self.next,
                "Deployment cancelled, remaining steps will not run"
            );
            self.status = PlanStatus::Aborted;
        }
    }

    /// Execute every remaining step.
    pub async fn run(mut self) -> Result<ResultLedger, PlanFailure> {
        while let Some(outcome) = self.next_step().await {
            if let Err(error) = outcome {
                let step = self.next;
                return Err(PlanFailure {
                    step,
                    kind: self.plan.steps()[step].kind().to_string(),
                    error,
                    ledger: self.ledger,
                });
            }
        }
        Ok(self.ledger)
    }

    /// Execute the next step.
    ///
    /// Returns `None` once the run is completed or aborted. After an error the run
    /// is aborted and the failed step's index stays at [`Pipeline::position`].
    pub async fn next_step(&mut self) -> Option<Result<DeploymentResult, DeployError>> {
        if self.status != PlanStatus::Running {
            return None;
        }

        let index = self.next;
        let outcome = self.execute(index).await;

        match &outcome {
            Ok(result) => {
                self.set_state(index, StepState::Succeeded);
                tracing::info!(
                    step = index,
                    kind = %result.kind,
                    address = %result.address,
                    block = ?result.confirmed_at_block,
                    "Contract deployed"
                );
                self.next += 1;
                if self.next == self.plan.len() {
                    self.status = PlanStatus::Completed;
                }
            }
            Err(error) => {
                self.set_state(index, StepState::Failed);
                tracing::error!(
                    step = index,
                    kind = self.plan.steps()[index].kind(),
                    error_kind = %error.kind(),
                    error = %error,
                    deployed = self.ledger.len(),
                    "Deployment step failed, aborting plan"
                );
                self.status = PlanStatus::Aborted;
            }
        }

        Some(outcome)
    }

    /// Index of the step that runs next, or that failed.
    pub fn position(&self) -> usize {
        self.next
    }

    fn set_state(&mut self, index: usize, state: StepState) {
        tracing::debug!(step = index, from = %self.states[index], to = %state, "Step state");
        self.states[index] = state;
    }

    async fn execute(&mut self, index: usize) -> Result<DeploymentResult, DeployError> {
        let plan = self.plan;
        let network = self.network;
        let step = &plan.steps()[index];

        tracing::info!(step = index, kind = step.kind(), "Deploying contract...");
        self.set_state(index, StepState::Resolving);

        let signer = self.ensure_signer().await?;
        let args = step.resolve_args(signer, &self.ledger)?;

        if self.ledger.contains(step.kind()) {
            return Err(DeployError::DuplicateKind(step.kind().to_string()));
        }

        let init_code = step.artifact().init_code(&args)?;

        self.set_state(index, StepState::Submitting);
        let pending = network
            .submit_creation(CreationTx {
                kind: step.kind(),
                constructor_args: &args,
                init_code: &init_code,
                from: signer,
            })
            .await?;

        self.set_state(index, StepState::Confirming);
        let mut result = network.confirm_creation(pending).await?;
        result.kind = step.kind().to_string();

        self.ledger.record(result.clone())?;
        Ok(result)
    }

    /// Fetch the signer on first use and log its balance.
    async fn ensure_signer(&mut self) -> Result<AccountHandle, DeployError> {
        if let Some(signer) = self.signer {
            return Ok(signer);
        }

        let signer = self.network.current_signer().await?;
        tracing::info!(
            account = %signer,
            chain_id = self.network.chain_id(),
            "Deploying contracts with the account"
        );

        match self.network.account_balance(&signer).await {
            Ok(balance) => {
                tracing::info!(balance_wei = %balance, "Account balance");
            }
            Err(e) => tracing::warn!(error = %e, "Failed to read account balance"),
        }

        self.signer = Some(signer);
        Ok(signer)
    }
}

impl DeploymentPlan {
    /// Execute the plan against `network`.
    pub async fn execute<N: NetworkContext>(
        &self,
        network: &N,
    ) -> Result<ResultLedger, PlanFailure> {
        Pipeline::new(self, network).run().await
    }
}

//! Deployment plans: ordered steps with explicit data dependencies.
//!
//! Every step names the contract kind it deploys and how its constructor arguments
//! are derived. A step may only depend on steps declared before it. This is
//! checked by [`PlanBuilder`] when the step is added, so a built
//! [`DeploymentPlan`] cannot reference a result that will not exist.
//!
//! # Example
//!
//! ```no_run
//! use grantscube_deploy::{BoundArtifacts, ConstructorArg, DeployError, DeploymentPlan};
//!
//! fn plan(artifacts: &BoundArtifacts) -> Result<DeploymentPlan, DeployError> {
//!     DeploymentPlan::builder(artifacts)
//!         .step("GrantsCubeNFTFactory", [ConstructorArg::Signer])?
//!         .step("ProjectFactory", [])?
//!         .build()
//! }
//! ```

use std::{fmt, sync::Arc};

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue, Specifier},
    primitives::Address,
};
use serde::{Deserialize, Serialize};

use crate::{AccountHandle, Artifact, BoundArtifacts, CompilerProfile, DeployError, ResultLedger};

/// Where a constructor argument comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "kebab-case")]
pub enum ConstructorArg {
    /// Address of the current signing account.
    Signer,
    /// Address of a contract deployed by an earlier step.
    AddressOf { kind: String },
    /// A literal, parsed against the constructor parameter type.
    Literal { value: String },
}

impl ConstructorArg {
    pub fn address_of(kind: impl Into<String>) -> Self {
        Self::AddressOf { kind: kind.into() }
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal {
            value: value.into(),
        }
    }
}

impl fmt::Display for ConstructorArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signer => write!(f, "<signer>"),
            Self::AddressOf { kind } => write!(f, "<address of {}>", kind),
            Self::Literal { value } => write!(f, "{:?}", value),
        }
    }
}

/// Read-only view handed to argument resolvers.
///
/// Only results of earlier steps are visible.
pub struct ResolveContext<'a> {
    kind: &'a str,
    signer: AccountHandle,
    ledger: &'a ResultLedger,
    depends_on: &'a [String],
}

impl<'a> ResolveContext<'a> {
    pub(crate) fn new(
        kind: &'a str,
        signer: AccountHandle,
        ledger: &'a ResultLedger,
        depends_on: &'a [String],
    ) -> Self {
        Self {
            kind,
            signer,
            ledger,
            depends_on,
        }
    }

    /// Kind of the step being resolved.
    pub fn kind(&self) -> &str {
        self.kind
    }

    pub fn signer(&self) -> AccountHandle {
        self.signer
    }

    /// Results recorded so far.
    pub fn ledger(&self) -> &ResultLedger {
        self.ledger
    }

    /// Address of a declared dependency.
    ///
    /// Fails with [`DeployError::UnresolvedDependency`] if `kind` was not declared
    /// as a dependency or has no recorded result.
    pub fn address_of(&self, kind: &str) -> Result<Address, DeployError> {
        let declared = self.depends_on.iter().any(|dep| dep == kind);
        self.ledger
            .address_of(kind)
            .filter(|_| declared)
            .ok_or_else(|| DeployError::UnresolvedDependency {
                kind: self.kind.to_string(),
                missing: kind.to_string(),
            })
    }
}

/// A custom argument resolver.
pub type ResolveFn =
    dyn Fn(&ResolveContext<'_>) -> Result<Vec<DynSolValue>, DeployError> + Send + Sync;

/// A declared argument after validation against the constructor ABI.
#[derive(Debug, Clone, PartialEq)]
enum BoundArg {
    Signer,
    AddressOf(String),
    Value(DynSolValue),
}

#[derive(Clone)]
enum ArgsResolver {
    Declared(Vec<BoundArg>),
    Custom(Arc<ResolveFn>),
}

impl fmt::Debug for ArgsResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Declared(args) => f.debug_tuple("Declared").field(args).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One contract deployment within a plan.
#[derive(Debug, Clone)]
pub struct DeploymentStep {
    artifact: Artifact,
    depends_on: Vec<String>,
    description: Vec<String>,
    resolver: ArgsResolver,
}

impl DeploymentStep {
    pub fn kind(&self) -> &str {
        &self.artifact.kind
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// Kinds this step reads results from.
    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    /// Human-readable constructor arguments.
    pub fn describe_args(&self) -> &[String] {
        &self.description
    }

    /// Resolve the constructor arguments from the signer and earlier results.
    pub fn resolve_args(
        &self,
        signer: AccountHandle,
        ledger: &ResultLedger,
    ) -> Result<Vec<DynSolValue>, DeployError> {
        let ctx = ResolveContext::new(self.kind(), signer, ledger, &self.depends_on);

        match &self.resolver {
            ArgsResolver::Declared(args) => args
                .iter()
                .map(|arg| match arg {
                    BoundArg::Signer => Ok(DynSolValue::Address(signer.address())),
                    BoundArg::AddressOf(kind) => ctx.address_of(kind).map(DynSolValue::Address),
                    BoundArg::Value(value) => Ok(value.clone()),
                })
                .collect(),
            ArgsResolver::Custom(resolve) => resolve(&ctx),
        }
    }
}

/// An ordered, validated sequence of deployment steps.
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    profile: CompilerProfile,
    steps: Vec<DeploymentStep>,
}

impl DeploymentPlan {
    pub fn builder(artifacts: &BoundArtifacts) -> PlanBuilder<'_> {
        PlanBuilder::new(artifacts)
    }

    /// Profile the plan's artifacts were verified against.
    pub fn profile(&self) -> &CompilerProfile {
        &self.profile
    }

    pub fn steps(&self) -> &[DeploymentStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Builds a [`DeploymentPlan`], validating each step as it is added.
pub struct PlanBuilder<'a> {
    artifacts: &'a BoundArtifacts,
    steps: Vec<DeploymentStep>,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(artifacts: &'a BoundArtifacts) -> Self {
        Self {
            artifacts,
            steps: Vec::new(),
        }
    }

    fn is_declared(&self, kind: &str) -> bool {
        self.steps.iter().any(|step| step.kind() == kind)
    }

    /// Check that `kind` is new and has a deployable artifact.
    fn new_step_artifact(&self, kind: &str) -> Result<Artifact, DeployError> {
        if self.is_declared(kind) {
            return Err(DeployError::config(format!(
                "contract kind {} appears twice in the plan",
                kind
            )));
        }
        self.artifacts.artifact(kind).cloned()
    }

    /// Check that every dependency is an earlier step.
    fn check_dependencies(&self, kind: &str, depends_on: &[String]) -> Result<(), DeployError> {
        match depends_on.iter().find(|dep| !self.is_declared(dep)) {
            Some(dep) => Err(DeployError::config(format!(
                "{} depends on {}, which is not deployed by an earlier step",
                kind, dep
            ))),
            None => Ok(()),
        }
    }

    /// Add a step whose constructor arguments are declared.
    ///
    /// Rejects duplicate kinds, references to steps not declared earlier, and
    /// arguments that do not fit the constructor ABI.
    pub fn step(
        mut self,
        kind: &str,
        args: impl IntoIterator<Item = ConstructorArg>,
    ) -> Result<Self, DeployError> {
        let artifact = self.new_step_artifact(kind)?;
        let args: Vec<ConstructorArg> = args.into_iter().collect();

        let inputs = artifact
            .constructor()
            .map(|c| c.inputs.as_slice())
            .unwrap_or_default();
        if inputs.len() != args.len() {
            return Err(DeployError::config(format!(
                "{} takes {} constructor arguments, {} given",
                kind,
                inputs.len(),
                args.len()
            )));
        }

        let mut depends_on = Vec::new();
        let mut bound = Vec::with_capacity(args.len());

        for (param, arg) in inputs.iter().zip(&args) {
            let ty: DynSolType = param.resolve().map_err(|e| {
                DeployError::config(format!(
                    "unsupported constructor parameter {} of {}: {}",
                    param.name, kind, e
                ))
            })?;

            let produces_address = !matches!(arg, ConstructorArg::Literal { .. });
            if produces_address && ty != DynSolType::Address {
                return Err(DeployError::config(format!(
                    "{} argument {} has type {} but {} produces an address",
                    kind, param.name, param.ty, arg
                )));
            }

            bound.push(match arg {
                ConstructorArg::Signer => BoundArg::Signer,
                ConstructorArg::AddressOf { kind: dep } => {
                    if !depends_on.contains(dep) {
                        depends_on.push(dep.clone());
                    }
                    BoundArg::AddressOf(dep.clone())
                }
                ConstructorArg::Literal { value } => {
                    BoundArg::Value(ty.coerce_str(value).map_err(|e| {
                        DeployError::config(format!(
                            "{} argument {}: cannot parse {:?} as {}: {}",
                            kind, param.name, value, param.ty, e
                        ))
                    })?)
                }
            });
        }

        self.check_dependencies(kind, &depends_on)?;

        self.steps.push(DeploymentStep {
            artifact,
            depends_on,
            description: args.iter().map(ToString::to_string).collect(),
            resolver: ArgsResolver::Declared(bound),
        });
        Ok(self)
    }

    /// Add a step with a custom argument resolver.
    ///
    /// `depends_on` must list every kind the resolver reads; the resolver can only
    /// see those results.
    pub fn custom_step<F>(
        mut self,
        kind: &str,
        depends_on: &[&str],
        resolve: F,
    ) -> Result<Self, DeployError>
    where
        F: Fn(&ResolveContext<'_>) -> Result<Vec<DynSolValue>, DeployError>
            + Send
            + Sync
            + 'static,
    {
        let artifact = self.new_step_artifact(kind)?;
        let depends_on: Vec<String> = depends_on.iter().map(|dep| dep.to_string()).collect();
        self.check_dependencies(kind, &depends_on)?;

        self.steps.push(DeploymentStep {
            artifact,
            description: vec!["<custom>".to_string()],
            depends_on,
            resolver: ArgsResolver::Custom(Arc::new(resolve)),
        });
        Ok(self)
    }

    pub fn build(self) -> Result<DeploymentPlan, DeployError> {
        if self.steps.is_empty() {
            return Err(DeployError::config("deployment plan has no steps"));
        }

        Ok(DeploymentPlan {
            profile: self.artifacts.profile().clone(),
            steps: self.steps,
        })
    }
}

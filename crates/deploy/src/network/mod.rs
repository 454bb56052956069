//! Network context: which chain, which account signs, and how creation
//! transactions are submitted and confirmed.
//!
//! The pipeline only talks to the chain through [`NetworkContext`], so it can be
//! driven by [`RpcNetwork`] against a real node or by a mock in tests.

mod rpc;

use std::future::Future;

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, Bytes, U256},
};
use derive_more::{Deref, Display, From};
use serde::{Deserialize, Serialize};

pub use rpc::RpcNetwork;

use crate::{DeployError, DeploymentResult};

/// The account that signs and pays for deployments.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Deref, Display, From, Serialize, Deserialize,
)]
pub struct AccountHandle(pub Address);

impl AccountHandle {
    pub fn address(&self) -> Address {
        self.0
    }
}

/// A contract-creation transaction ready to be submitted.
#[derive(Debug, Clone, Copy)]
pub struct CreationTx<'a> {
    /// Contract kind being deployed.
    pub kind: &'a str,
    /// Resolved constructor arguments, in declaration order.
    pub constructor_args: &'a [DynSolValue],
    /// Creation bytecode with the encoded constructor arguments appended.
    pub init_code: &'a Bytes,
    /// Account submitting the transaction.
    pub from: AccountHandle,
}

/// A creation transaction that was accepted by the node but not yet confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCreation {
    pub kind: String,
    pub tx_hash: B256,
}

/// Capabilities the deployment pipeline needs from a chain.
pub trait NetworkContext: Send + Sync {
    /// Chain id this context targets.
    fn chain_id(&self) -> u64;

    /// The current signing account.
    ///
    /// Fails with [`DeployError::NoSignerAvailable`] if none is configured.
    fn current_signer(&self) -> impl Future<Output = Result<AccountHandle, DeployError>> + Send;

    /// Balance of `account` in wei. Read-only.
    fn account_balance(
        &self,
        account: &AccountHandle,
    ) -> impl Future<Output = Result<U256, DeployError>> + Send;

    /// Submit a creation transaction exactly once.
    ///
    /// Fails with [`DeployError::SubmissionFailed`] if the node does not accept it.
    fn submit_creation(
        &self,
        tx: CreationTx<'_>,
    ) -> impl Future<Output = Result<PendingCreation, DeployError>> + Send;

    /// Wait, within a bounded time, until a submitted transaction reaches a
    /// terminal status.
    ///
    /// Fails with [`DeployError::DeploymentRejected`] if execution reverted and
    /// [`DeployError::ConfirmationTimeout`] if no status was observed in time.
    fn confirm_creation(
        &self,
        pending: PendingCreation,
    ) -> impl Future<Output = Result<DeploymentResult, DeployError>> + Send;

    /// Submit a creation transaction and wait for its terminal status.
    ///
    /// Spends funds and publishes bytecode irreversibly; never retried. The
    /// pipeline drives [`NetworkContext::submit_creation`] and
    /// [`NetworkContext::confirm_creation`] separately to report step states, so
    /// overriding this method does not change how plans execute.
    fn deploy_contract(
        &self,
        tx: CreationTx<'_>,
    ) -> impl Future<Output = Result<DeploymentResult, DeployError>> + Send {
        async move {
            let pending = self.submit_creation(tx).await?;
            self.confirm_creation(pending).await
        }
    }
}

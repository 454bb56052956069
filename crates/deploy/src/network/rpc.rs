//! [`NetworkContext`] over Ethereum JSON-RPC.
//!
//! Transactions are signed by the node (`eth_sendTransaction`), as on a Hardhat or
//! Anvil development node with unlocked accounts.

use std::time::Duration;

use alloy_core::primitives::{Address, B256, U64, U256};
use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use super::{AccountHandle, CreationTx, NetworkContext, PendingCreation};
use crate::{DeployError, DeploymentResult, NetworkConfig};

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
///
/// # Returns
/// The deserialized result, or an error if the request failed or returned an error response.
pub(crate) async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url.clone())
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        anyhow::bail!(
            "RPC error: {}",
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
        );
    }

    let result_value = result
        .get("result")
        .context("No result in response")?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Receipt fields needed to decide the outcome of a creation transaction.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    #[serde(default)]
    status: Option<U64>,
    #[serde(default)]
    contract_address: Option<Address>,
    #[serde(default)]
    block_number: Option<U64>,
}

/// A chain reached over JSON-RPC.
#[derive(Debug, Clone)]
pub struct RpcNetwork {
    client: reqwest::Client,
    url: Url,
    chain_id: u64,
    from: Option<Address>,
    confirmation_timeout: Duration,
    poll_interval: Duration,
}

impl RpcNetwork {
    /// Connect to the configured endpoint and check that it serves the expected chain.
    pub async fn connect(config: &NetworkConfig) -> Result<Self, DeployError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| DeployError::config(format!("failed to create HTTP client: {}", e)))?;

        let remote: U64 = json_rpc_call(&client, &config.rpc_url, "eth_chainId", vec![])
            .await
            .map_err(|e| DeployError::Rpc {
                method: "eth_chainId".to_string(),
                reason: format!("{:#}", e),
            })?;
        let remote = remote.to::<u64>();

        if remote != config.chain_id {
            return Err(DeployError::config(format!(
                "{} serves chain {} but the network is configured for chain {}",
                config.rpc_url, remote, config.chain_id
            )));
        }

        tracing::debug!(rpc_url = %config.rpc_url, chain_id = remote, "Connected to network");

        Ok(Self {
            client,
            url: config.rpc_url.clone(),
            chain_id: config.chain_id,
            from: config.from,
            confirmation_timeout: Duration::from_secs(config.confirmation_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }

    pub fn rpc_url(&self) -> &Url {
        &self.url
    }

    /// Poll for the receipt until it appears or the confirmation timeout elapses.
    ///
    /// Only the receipt lookup is repeated; the transaction is never resent.
    async fn wait_for_receipt(
        &self,
        kind: &str,
        tx_hash: B256,
    ) -> Result<TransactionReceipt, DeployError> {
        let (client, url) = (&self.client, &self.url);
        let fetch = move || async move {
            let receipt: Option<TransactionReceipt> = json_rpc_call(
                client,
                url,
                "eth_getTransactionReceipt",
                vec![serde_json::json!(tx_hash)],
            )
            .await?;
            receipt.context("Receipt not available yet")
        };

        let poll_ms = self.poll_interval.as_millis().max(1);
        let attempts = (self.confirmation_timeout.as_millis() / poll_ms) as usize + 1;

        let polling = fetch
            .retry(
                ConstantBuilder::default()
                    .with_delay(self.poll_interval)
                    .with_max_times(attempts),
            )
            .sleep(tokio::time::sleep)
            .notify(|err: &anyhow::Error, delay: Duration| {
                tracing::trace!(error = %err, kind, ?delay, "Waiting for confirmation...");
            });

        match tokio::time::timeout(self.confirmation_timeout, polling).await {
            Ok(Ok(receipt)) => Ok(receipt),
            Ok(Err(_)) | Err(_) => Err(DeployError::ConfirmationTimeout {
                kind: kind.to_string(),
                tx_hash,
                waited: self.confirmation_timeout,
            }),
        }
    }
}

impl NetworkContext for RpcNetwork {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn current_signer(&self) -> Result<AccountHandle, DeployError> {
        if let Some(from) = self.from {
            return Ok(AccountHandle(from));
        }

        let accounts: Vec<Address> =
            json_rpc_call(&self.client, &self.url, "eth_accounts", vec![])
                .await
                .map_err(|e| DeployError::Rpc {
                    method: "eth_accounts".to_string(),
                    reason: format!("{:#}", e),
                })?;

        accounts
            .first()
            .copied()
            .map(AccountHandle)
            .ok_or(DeployError::NoSignerAvailable {
                chain_id: self.chain_id,
            })
    }

    async fn account_balance(&self, account: &AccountHandle) -> Result<U256, DeployError> {
        json_rpc_call(
            &self.client,
            &self.url,
            "eth_getBalance",
            vec![
                serde_json::json!(account.address()),
                serde_json::json!("latest"),
            ],
        )
        .await
        .map_err(|e| DeployError::Rpc {
            method: "eth_getBalance".to_string(),
            reason: format!("{:#}", e),
        })
    }

    async fn submit_creation(&self, tx: CreationTx<'_>) -> Result<PendingCreation, DeployError> {
        let tx_hash: B256 = json_rpc_call(
            &self.client,
            &self.url,
            "eth_sendTransaction",
            vec![serde_json::json!({
                "from": tx.from.address(),
                "data": tx.init_code,
            })],
        )
        .await
        .map_err(|e| DeployError::SubmissionFailed {
            kind: tx.kind.to_string(),
            reason: format!("{:#}", e),
        })?;

        tracing::info!(kind = tx.kind, %tx_hash, "Creation transaction submitted, awaiting confirmation...");

        Ok(PendingCreation {
            kind: tx.kind.to_string(),
            tx_hash,
        })
    }

    async fn confirm_creation(
        &self,
        pending: PendingCreation,
    ) -> Result<DeploymentResult, DeployError> {
        let PendingCreation { kind, tx_hash } = pending;
        let receipt = self.wait_for_receipt(&kind, tx_hash).await?;

        if receipt.status == Some(U64::ZERO) {
            return Err(DeployError::DeploymentRejected {
                kind,
                tx_hash,
                reason: "execution reverted".to_string(),
            });
        }

        let Some(address) = receipt.contract_address else {
            return Err(DeployError::DeploymentRejected {
                kind,
                tx_hash,
                reason: "receipt has no contract address".to_string(),
            });
        };

        Ok(DeploymentResult {
            kind,
            address,
            confirmed_at_block: receipt.block_number.map(|n| n.to::<u64>()),
            tx_hash: Some(tx_hash),
        })
    }
}

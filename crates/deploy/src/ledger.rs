//! In-memory record of the contracts deployed during one pipeline run.

use alloy_core::primitives::{Address, B256};
use serde::{Deserialize, Serialize};

use crate::DeployError;

/// A confirmed contract deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    /// Contract kind, e.g. `ProjectFactory`.
    pub kind: String,
    /// Address the contract was published at.
    pub address: Address,
    /// Block that included the creation transaction, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at_block: Option<u64>,
    /// Hash of the creation transaction, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<B256>,
}

/// Ordered, write-once mapping of contract kind to deployment result.
///
/// Only [`ResultLedger::record`] adds entries; there is no way to build a ledger
/// from serialized data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResultLedger {
    entries: Vec<DeploymentResult>,
}

impl ResultLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a result. A kind can only be recorded once.
    pub fn record(&mut self, result: DeploymentResult) -> Result<(), DeployError> {
        if self.contains(&result.kind) {
            return Err(DeployError::DuplicateKind(result.kind));
        }
        self.entries.push(result);
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Option<&DeploymentResult> {
        self.entries.iter().find(|entry| entry.kind == kind)
    }

    pub fn address_of(&self, kind: &str) -> Option<Address> {
        self.get(kind).map(|entry| entry.address)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.get(kind).is_some()
    }

    /// Results in deployment order.
    pub fn iter(&self) -> impl Iterator<Item = &DeploymentResult> {
        self.entries.iter()
    }

    /// Contract kinds in deployment order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.kind.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a ResultLedger {
    type Item = &'a DeploymentResult;
    type IntoIter = std::slice::Iter<'a, DeploymentResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

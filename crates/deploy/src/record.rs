//! Durable record of the addresses produced by a deployment run.
//!
//! Every run gets its own file, `{outdata}/{network}-{deployed_at}.json`, so an
//! aborted run can never hide the addresses of an earlier one.

use std::{
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{CompilerProfile, ResultLedger};

/// One deployed contract in a [`DeploymentRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedContract {
    pub kind: String,
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at_block: Option<u64>,
}

/// Addresses produced by one run.
///
/// Written after complete and aborted runs alike. It is an output for operators
/// and never consulted to skip deployments on a later run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Name of the network deployed to.
    pub network: String,
    pub chain_id: u64,
    /// Fingerprint of the compiler profile the bytecode was built with.
    pub profile_fingerprint: String,
    /// Unix timestamp when the run finished.
    pub deployed_at: i64,
    /// Whether every step of the plan succeeded.
    pub complete: bool,
    /// Deployed contracts in deployment order.
    pub contracts: Vec<RecordedContract>,
    /// Version of the tool that wrote the record.
    pub grantscube_version: String,
}

impl DeploymentRecord {
    pub fn new(
        network: impl Into<String>,
        chain_id: u64,
        profile: &CompilerProfile,
        ledger: &ResultLedger,
        complete: bool,
    ) -> Self {
        Self {
            network: network.into(),
            chain_id,
            profile_fingerprint: profile.fingerprint(),
            deployed_at: chrono::Utc::now().timestamp(),
            complete,
            contracts: ledger
                .iter()
                .map(|result| RecordedContract {
                    kind: result.kind.clone(),
                    address: result.address,
                    confirmed_at_block: result.confirmed_at_block,
                })
                .collect(),
            grantscube_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// File name of this record, unique per network and second.
    pub fn file_name(&self) -> String {
        format!("{}-{}.json", self.network, self.deployed_at)
    }

    pub fn address_of(&self, kind: &str) -> Option<Address> {
        self.contracts
            .iter()
            .find(|contract| contract.kind == kind)
            .map(|contract| contract.address)
    }

    /// Write this record into `outdata` under a name no other record uses.
    ///
    /// Existing files are never replaced; on a name clash a numeric suffix is
    /// added. Returns the path written.
    pub fn save_in(&self, outdata: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(outdata)
            .context(format!("Failed to create directory {}", outdata.display()))?;

        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize deployment record")?;
        let stem = self.file_name().trim_end_matches(".json").to_string();

        let mut attempt = 0u32;
        loop {
            let path = match attempt {
                0 => outdata.join(self.file_name()),
                n => outdata.join(format!("{}-{}.json", stem, n)),
            };

            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    file.write_all(json.as_bytes()).context(format!(
                        "Failed to write deployment record to {}",
                        path.display()
                    ))?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => {
                    return Err(e).context(format!(
                        "Failed to create deployment record {}",
                        path.display()
                    ));
                }
            }
        }
    }

    /// Load a record from a file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Deployment record does not exist: {}", path.display());
        }

        let content = std::fs::read_to_string(path).context(format!(
            "Failed to read deployment record from {}",
            path.display()
        ))?;

        serde_json::from_str(&content).context("Failed to parse deployment record JSON")
    }
}

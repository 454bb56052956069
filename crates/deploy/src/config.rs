//! Operator configuration.
//!
//! Values are layered: built-in defaults, then `Grantscube.toml`, then
//! `GRANTSCUBE_*` environment variables (nested keys separated by `__`, e.g.
//! `GRANTSCUBE_NETWORKS__HARDHAT__RPC_URL`).

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    BoundArtifacts, CompilerProfile, ConstructorArg, DeployError, DeploymentPlan,
    ProfileSettings,
};

/// The default name for the configuration file.
pub const CONFIG_FILENAME: &str = "Grantscube.toml";

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "GRANTSCUBE_";

/// Default network name.
pub const DEFAULT_NETWORK: &str = "hardhat";

/// Default chain id of a local Hardhat node.
pub const DEFAULT_CHAIN_ID: u64 = 1337;

/// Default RPC endpoint of a local Hardhat node.
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

fn default_confirmation_timeout_secs() -> u64 {
    DEFAULT_CONFIRMATION_TIMEOUT_SECS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

/// Connection settings for one named network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Chain id the endpoint must report.
    pub chain_id: u64,
    /// JSON-RPC endpoint.
    pub rpc_url: Url,
    /// Signing account. Defaults to the node's first account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    /// How long to wait for a creation transaction to be mined.
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    /// Delay between receipt lookups.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Timeout of a single RPC request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl NetworkConfig {
    pub fn new(chain_id: u64, rpc_url: Url) -> Self {
        Self {
            chain_id,
            rpc_url,
            from: None,
            confirmation_timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    /// The local Hardhat development node.
    pub fn hardhat() -> Self {
        let rpc_url = Url::parse(DEFAULT_RPC_URL).expect("default RPC URL is valid");
        Self::new(DEFAULT_CHAIN_ID, rpc_url)
    }
}

/// A declared deployment step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepConfig {
    /// Contract kind to deploy.
    pub kind: String,
    /// Constructor arguments, in declaration order.
    #[serde(default)]
    pub args: Vec<ConstructorArg>,
}

impl StepConfig {
    pub fn new(kind: impl Into<String>, args: impl IntoIterator<Item = ConstructorArg>) -> Self {
        Self {
            kind: kind.into(),
            args: args.into_iter().collect(),
        }
    }
}

/// Everything needed to build and run a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Name of the active network.
    pub network: String,
    /// Known networks by name.
    pub networks: BTreeMap<String, NetworkConfig>,
    /// Compiler settings the artifacts must have been built with.
    pub compiler: ProfileSettings,
    /// Root of the compiler output (Hardhat `artifacts/` layout).
    pub artifacts: PathBuf,
    /// Directory deployment records are written to.
    pub outdata: PathBuf,
    /// Ordered deployment steps.
    pub steps: Vec<StepConfig>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            network: DEFAULT_NETWORK.to_string(),
            networks: BTreeMap::from([(DEFAULT_NETWORK.to_string(), NetworkConfig::hardhat())]),
            compiler: ProfileSettings::default(),
            artifacts: PathBuf::from("artifacts"),
            outdata: PathBuf::from("deployments"),
            steps: vec![
                StepConfig::new("GrantsCubeNFTFactory", [ConstructorArg::Signer]),
                StepConfig::new("ProjectFactory", []),
            ],
        }
    }
}

impl DeployConfig {
    /// Load the layered configuration.
    ///
    /// With `path`, that file (or `Grantscube.toml` inside that directory) must
    /// exist. Without it, `Grantscube.toml` in the working directory is used if
    /// present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => {
                let file = config_file(path);
                if !file.exists() {
                    anyhow::bail!("Configuration file not found: {}", file.display());
                }
                file
            }
            None => PathBuf::from(CONFIG_FILENAME),
        };

        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(&file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to load configuration")?;

        tracing::debug!(path = %file.display(), network = %config.network, "Configuration loaded");
        Ok(config)
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;
        std::fs::write(path, content)
            .context(format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load the configuration from a TOML file alone, without defaults or environment.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let path = config_file(path);
        if !path.exists() {
            anyhow::bail!("Configuration file not found: {}", path.display());
        }

        let content = std::fs::read_to_string(&path)
            .context(format!("Failed to read config from {}", path.display()))?;
        toml::from_str(&content).context("Failed to parse config file as TOML")
    }

    /// Settings of the active network.
    pub fn active_network(&self) -> Result<&NetworkConfig, DeployError> {
        self.networks.get(&self.network).ok_or_else(|| {
            DeployError::config(format!(
                "network {:?} is not configured (known: {})",
                self.network,
                self.networks
                    .keys()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })
    }

    /// The validated compiler profile.
    pub fn profile(&self) -> Result<CompilerProfile, DeployError> {
        CompilerProfile::new(self.compiler.clone())
    }

    /// Build the deployment plan from the declared steps.
    pub fn build_plan(&self, artifacts: &BoundArtifacts) -> Result<DeploymentPlan, DeployError> {
        self.steps
            .iter()
            .try_fold(DeploymentPlan::builder(artifacts), |builder, step| {
                builder.step(&step.kind, step.args.iter().cloned())
            })?
            .build()
    }
}

fn config_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(CONFIG_FILENAME)
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;
    use crate::{
        ArtifactSet, DeployErrorKind,
        artifacts::tests::{FACTORY_ABI, artifact},
    };

    #[test]
    fn test_defaults_match_original_project() {
        let config = DeployConfig::default();

        let network = config.active_network().unwrap();
        assert_eq!(network.chain_id, 1337);
        assert_eq!(network.rpc_url.as_str(), "http://127.0.0.1:8545/");
        assert_eq!(network.from, None);

        let profile = config.profile().unwrap();
        assert_eq!(profile.language_version().to_string(), "0.8.13");
        assert!(profile.optimizer_enabled());
        assert_eq!(profile.optimizer_runs(), Some(200));
        assert_eq!(profile.codegen_flags().get("yul"), Some(&false));

        assert_eq!(
            config.steps,
            vec![
                StepConfig::new("GrantsCubeNFTFactory", [ConstructorArg::Signer]),
                StepConfig::new("ProjectFactory", []),
            ]
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new("grantscube-config").unwrap();
        let path = dir.path().join(CONFIG_FILENAME);

        let mut config = DeployConfig::default();
        config.networks.get_mut("hardhat").unwrap().from = Some(Address::repeat_byte(0x11));
        config.save_to_file(&path).unwrap();

        assert_eq!(DeployConfig::load_from_file(&path).unwrap(), config);
        // A directory resolves to the file inside it.
        assert_eq!(DeployConfig::load_from_file(dir.path()).unwrap(), config);
    }

    #[test]
    fn test_load_merges_file_over_defaults() {
        let dir = TempDir::new("grantscube-config").unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(
            &path,
            r#"
network = "sepolia"

[networks.sepolia]
chain_id = 11155111
rpc_url = "https://rpc.sepolia.org"
confirmation_timeout_secs = 300

[compiler]
optimizer_runs = 1000

[[steps]]
kind = "ProjectFactory"
"#,
        )
        .unwrap();

        let config = DeployConfig::load(Some(path.as_path())).unwrap();

        assert_eq!(config.network, "sepolia");
        let sepolia = config.active_network().unwrap();
        assert_eq!(sepolia.chain_id, 11155111);
        assert_eq!(sepolia.confirmation_timeout_secs, 300);
        assert_eq!(sepolia.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        // Default network is still known.
        assert!(config.networks.contains_key("hardhat"));
        // Untouched compiler settings keep their defaults.
        assert_eq!(config.compiler.language_version, "0.8.13");
        assert_eq!(config.compiler.optimizer_runs, Some(1000));
        assert_eq!(config.steps, vec![StepConfig::new("ProjectFactory", [])]);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = TempDir::new("grantscube-config").unwrap();
        assert!(DeployConfig::load(Some(dir.path().join("missing.toml").as_path())).is_err());
    }

    #[test]
    fn test_unknown_network_is_a_configuration_error() {
        let config = DeployConfig {
            network: "mainnet".to_string(),
            ..Default::default()
        };

        let err = config.active_network().unwrap_err();
        assert_eq!(err.kind(), DeployErrorKind::Configuration);
        assert!(err.to_string().contains("hardhat"));
    }

    #[test]
    fn test_invalid_compiler_settings_are_rejected() {
        let mut config = DeployConfig::default();
        config.compiler.optimizer_runs = Some(-1);

        assert_eq!(
            config.profile().unwrap_err().kind(),
            DeployErrorKind::Configuration
        );
    }

    #[test]
    fn test_build_plan_from_declared_steps() {
        let config = DeployConfig::default();
        let profile = config.profile().unwrap();
        let artifacts = ArtifactSet::new(
            [
                artifact("GrantsCubeNFTFactory", FACTORY_ABI),
                artifact("ProjectFactory", "[]"),
            ],
            Some(profile.clone()),
        )
        .bind(&profile)
        .unwrap();

        let plan = config.build_plan(&artifacts).unwrap();

        assert_eq!(
            plan.steps().iter().map(|s| s.kind()).collect::<Vec<_>>(),
            vec!["GrantsCubeNFTFactory", "ProjectFactory"]
        );

        let empty = DeployConfig {
            steps: vec![],
            ..Default::default()
        };
        assert!(empty.build_plan(&artifacts).is_err());
    }
}

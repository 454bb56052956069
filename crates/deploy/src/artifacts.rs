//! Compiled contract artifacts and their binding to a [`CompilerProfile`].
//!
//! Artifacts are read from a Hardhat-style output directory:
//!
//! ```text
//! artifacts/
//! ├── build-info/<id>.json          # solcVersion + input.settings.optimizer
//! └── contracts/Foo.sol/Foo.json    # contractName, abi, bytecode
//! ```
//!
//! The compiler settings recorded in `build-info` are compared to the operator's
//! profile by [`ArtifactSet::bind`]. Plans can only be built from the resulting
//! [`BoundArtifacts`], so a divergence is reported before any network interaction.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use alloy_core::{
    dyn_abi::{DynSolValue, JsonAbiExt},
    json_abi::{Constructor, JsonAbi},
    primitives::Bytes,
};
use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;

use crate::{CompilerProfile, DeployError, ProfileSettings};

/// Name of the directory holding compiler build information.
pub const BUILD_INFO_DIR: &str = "build-info";

/// A compiled, deployable contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Contract name, used as the contract kind.
    pub kind: String,
    pub abi: JsonAbi,
    /// Creation bytecode, without constructor arguments.
    pub bytecode: Bytes,
}

impl Artifact {
    pub fn new(kind: impl Into<String>, abi: JsonAbi, bytecode: Bytes) -> Self {
        Self {
            kind: kind.into(),
            abi,
            bytecode,
        }
    }

    pub fn constructor(&self) -> Option<&Constructor> {
        self.abi.constructor.as_ref()
    }

    /// Number of constructor parameters.
    pub fn constructor_arity(&self) -> usize {
        self.constructor().map_or(0, |c| c.inputs.len())
    }

    /// Creation bytecode followed by the ABI-encoded constructor arguments.
    pub fn init_code(&self, args: &[DynSolValue]) -> Result<Bytes, DeployError> {
        let encoded = match self.constructor() {
            Some(constructor) => constructor.abi_encode_input(args).map_err(|e| {
                DeployError::config(format!(
                    "failed to encode constructor arguments for {}: {}",
                    self.kind, e
                ))
            })?,
            None if args.is_empty() => Vec::new(),
            None => {
                return Err(DeployError::config(format!(
                    "{} has no constructor but {} arguments were given",
                    self.kind,
                    args.len()
                )));
            }
        };

        let mut code = Vec::with_capacity(self.bytecode.len() + encoded.len());
        code.extend_from_slice(&self.bytecode);
        code.extend_from_slice(&encoded);
        Ok(code.into())
    }
}

/// Contract artifact file as written by Hardhat.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HardhatArtifact {
    contract_name: String,
    abi: JsonAbi,
    bytecode: String,
}

/// The parts of a Hardhat build-info file that determine bytecode.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildInfo {
    solc_version: String,
    input: BuildInput,
}

#[derive(Debug, Deserialize)]
struct BuildInput {
    #[serde(default)]
    settings: BuildSettings,
}

#[derive(Debug, Default, Deserialize)]
struct BuildSettings {
    #[serde(default)]
    optimizer: OptimizerSettings,
}

#[derive(Debug, Default, Deserialize)]
struct OptimizerSettings {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    runs: Option<i64>,
    #[serde(default)]
    details: BTreeMap<String, Value>,
}

impl BuildInfo {
    /// Only boolean optimizer details become codegen flags. Nested detail tables
    /// (e.g. `yulDetails`) are not compared.
    fn into_profile(self) -> Result<CompilerProfile, DeployError> {
        let optimizer = self.input.settings.optimizer;
        CompilerProfile::new(ProfileSettings {
            language_version: self.solc_version,
            optimizer_enabled: optimizer.enabled,
            optimizer_runs: optimizer.runs,
            codegen_flags: optimizer
                .details
                .into_iter()
                .filter_map(|(name, value)| value.as_bool().map(|flag| (name, flag)))
                .collect(),
        })
    }
}

/// All artifacts produced by one compilation.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSet {
    artifacts: BTreeMap<String, Artifact>,
    /// Names defined by more than one source file.
    ambiguous: BTreeSet<String>,
    /// Artifacts whose bytecode could not be parsed, with the reason.
    unlinked: BTreeMap<String, String>,
    /// Profile recorded by the compiler, if known.
    compiled_with: Option<CompilerProfile>,
}

impl ArtifactSet {
    /// Create an artifact set from already compiled artifacts.
    pub fn new(
        artifacts: impl IntoIterator<Item = Artifact>,
        compiled_with: Option<CompilerProfile>,
    ) -> Self {
        let mut set = Self {
            compiled_with,
            ..Default::default()
        };
        for artifact in artifacts {
            set.insert(artifact);
        }
        set
    }

    fn is_known(&self, kind: &str) -> bool {
        self.artifacts.contains_key(kind) || self.unlinked.contains_key(kind)
    }

    fn insert(&mut self, artifact: Artifact) {
        if self.is_known(&artifact.kind) {
            tracing::debug!(kind = %artifact.kind, "Contract name defined by several sources");
            self.ambiguous.insert(artifact.kind.clone());
        } else {
            self.artifacts.insert(artifact.kind.clone(), artifact);
        }
    }

    /// Load a Hardhat artifacts directory.
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        if !root.is_dir() {
            anyhow::bail!("Artifacts directory not found: {}", root.display());
        }

        let mut set = Self::default();
        let mut files = Vec::new();
        collect_json_files(root, &mut files)?;

        for path in files {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read artifact {}", path.display()))?;
            let artifact: HardhatArtifact = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse artifact {}", path.display()))?;

            match artifact.bytecode.parse::<Bytes>() {
                Ok(bytecode) => {
                    set.insert(Artifact::new(artifact.contract_name, artifact.abi, bytecode))
                }
                Err(e) if set.is_known(&artifact.contract_name) => {
                    set.ambiguous.insert(artifact.contract_name);
                    tracing::debug!(path = %path.display(), error = %e, "Unparsable bytecode");
                }
                Err(e) => {
                    // Unlinked library placeholders only matter if the contract is deployed.
                    tracing::debug!(path = %path.display(), error = %e, "Unparsable bytecode");
                    set.unlinked.insert(
                        artifact.contract_name,
                        format!("invalid bytecode in {}: {}", path.display(), e),
                    );
                }
            }
        }

        set.compiled_with = load_build_profile(&root.join(BUILD_INFO_DIR))?;

        tracing::debug!(
            root = %root.display(),
            artifacts = set.artifacts.len(),
            "Loaded contract artifacts"
        );

        Ok(set)
    }

    pub fn get(&self, kind: &str) -> Option<&Artifact> {
        self.artifacts.get(kind)
    }

    /// Profile the artifacts were compiled with, as recorded in build info.
    pub fn compiled_with(&self) -> Option<&CompilerProfile> {
        self.compiled_with.as_ref()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }

    /// Bind the artifacts to the profile the operator intends to deploy.
    ///
    /// Fails if the compiler settings are unknown or differ from `profile`.
    pub fn bind(self, profile: &CompilerProfile) -> Result<BoundArtifacts, DeployError> {
        let Some(compiled_with) = &self.compiled_with else {
            return Err(DeployError::config(
                "artifacts carry no compiler build info; cannot verify the compiler profile",
            ));
        };

        if !profile.is_equivalent(compiled_with) {
            return Err(DeployError::config(format!(
                "artifacts were not compiled with the configured profile: {}",
                profile.describe_difference(compiled_with).join(", ")
            )));
        }

        Ok(BoundArtifacts {
            profile: profile.clone(),
            artifacts: self,
        })
    }
}

/// Artifacts verified to match a compiler profile.
#[derive(Debug, Clone)]
pub struct BoundArtifacts {
    profile: CompilerProfile,
    artifacts: ArtifactSet,
}

impl BoundArtifacts {
    pub fn profile(&self) -> &CompilerProfile {
        &self.profile
    }

    /// Look up a deployable artifact.
    pub fn artifact(&self, kind: &str) -> Result<&Artifact, DeployError> {
        if self.artifacts.ambiguous.contains(kind) {
            return Err(DeployError::config(format!(
                "contract name {} is defined by several sources",
                kind
            )));
        }

        if let Some(reason) = self.artifacts.unlinked.get(kind) {
            return Err(DeployError::config(format!(
                "{} cannot be deployed ({}); unlinked libraries are not supported",
                kind, reason
            )));
        }

        let artifact = self
            .artifacts
            .get(kind)
            .ok_or_else(|| DeployError::config(format!("no artifact for contract {}", kind)))?;

        if artifact.bytecode.is_empty() {
            return Err(DeployError::config(format!(
                "{} has no creation bytecode (abstract contract or interface)",
                kind
            )));
        }

        Ok(artifact)
    }
}

/// Recursively collect artifact files, skipping build info and debug files.
fn collect_json_files(dir: &Path, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?;

    for entry in entries {
        let path = entry.context("Failed to read directory entry")?.path();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        if path.is_dir() {
            if file_name != BUILD_INFO_DIR {
                collect_json_files(&path, out)?;
            }
        } else if file_name.ends_with(".json") && !file_name.ends_with(".dbg.json") {
            out.push(path);
        }
    }

    out.sort();
    Ok(())
}

/// Read every build-info file; they must all describe the same profile.
fn load_build_profile(dir: &Path) -> anyhow::Result<Option<CompilerProfile>> {
    if !dir.is_dir() {
        return Ok(None);
    }

    let mut profile: Option<CompilerProfile> = None;
    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read build-info entry")?;
    entries.sort();

    for path in entries.into_iter().filter(|p| p.extension().is_some_and(|e| e == "json")) {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read build info {}", path.display()))?;
        let info: BuildInfo = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse build info {}", path.display()))?;
        let found = info.into_profile()?;

        match &profile {
            Some(existing) if !existing.is_equivalent(&found) => {
                return Err(DeployError::config(format!(
                    "build info files disagree: {}",
                    existing.describe_difference(&found).join(", ")
                ))
                .into());
            }
            Some(_) => {}
            None => profile = Some(found),
        }
    }

    Ok(profile)
}

//! Compiler profile that produced the deployed artifacts.
//!
//! Bytecode, and therefore every address derived from it, depends on the compiler
//! version and optimizer settings. The profile is fixed at configuration time and
//! checked against the artifact set before a plan can be built.

use std::collections::BTreeMap;

use semver::Version;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::DeployError;

/// Raw compiler settings as written in configuration files.
///
/// `optimizer_runs` is signed so that a negative value reaches validation and is
/// reported as a configuration error instead of a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSettings {
    /// Compiler language version, e.g. `0.8.13`.
    pub language_version: String,
    /// Whether the optimizer was enabled.
    pub optimizer_enabled: bool,
    /// Optimizer run count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimizer_runs: Option<i64>,
    /// Fine-grained codegen toggles (e.g. `yul = false`).
    #[serde(default)]
    pub codegen_flags: BTreeMap<String, bool>,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            language_version: "0.8.13".to_string(),
            optimizer_enabled: true,
            optimizer_runs: Some(200),
            codegen_flags: BTreeMap::from([("yul".to_string(), false)]),
        }
    }
}

/// A validated, immutable compiler profile.
///
/// Runs and codegen flags are kept verbatim even when the optimizer is disabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ProfileSettings", into = "ProfileSettings")]
pub struct CompilerProfile {
    language_version: Version,
    optimizer_enabled: bool,
    optimizer_runs: Option<i64>,
    codegen_flags: BTreeMap<String, bool>,
}

impl CompilerProfile {
    /// Validate raw settings into a profile.
    pub fn new(settings: ProfileSettings) -> Result<Self, DeployError> {
        let language_version = Version::parse(settings.language_version.trim()).map_err(|e| {
            DeployError::config(format!(
                "invalid compiler version '{}': {}",
                settings.language_version, e
            ))
        })?;

        if settings.optimizer_enabled {
            match settings.optimizer_runs {
                None => {
                    return Err(DeployError::config(
                        "optimizer is enabled but no run count is set",
                    ));
                }
                Some(runs) if runs < 0 => {
                    return Err(DeployError::config(format!(
                        "optimizer run count must be non-negative, got {}",
                        runs
                    )));
                }
                Some(_) => {}
            }
        }

        Ok(Self {
            language_version,
            optimizer_enabled: settings.optimizer_enabled,
            optimizer_runs: settings.optimizer_runs,
            codegen_flags: settings.codegen_flags,
        })
    }

    pub fn language_version(&self) -> &Version {
        &self.language_version
    }

    pub fn optimizer_enabled(&self) -> bool {
        self.optimizer_enabled
    }

    /// The run count as recorded, whether or not the optimizer is enabled.
    pub fn optimizer_runs(&self) -> Option<i64> {
        self.optimizer_runs
    }

    /// The run count the compiler actually applied.
    pub fn effective_runs(&self) -> Option<u64> {
        if !self.optimizer_enabled {
            return None;
        }
        self.optimizer_runs.and_then(|runs| u64::try_from(runs).ok())
    }

    pub fn codegen_flags(&self) -> &BTreeMap<String, bool> {
        &self.codegen_flags
    }

    /// Whether two profiles produce the same bytecode.
    ///
    /// Build metadata on the version is ignored, and runs and codegen flags only
    /// count when the optimizer is enabled.
    pub fn is_equivalent(&self, other: &Self) -> bool {
        self.describe_difference(other).is_empty()
    }

    /// Describe how `other` differs from this profile, using the same rules as
    /// [`CompilerProfile::is_equivalent`].
    pub fn describe_difference(&self, other: &Self) -> Vec<String> {
        let mut diffs = Vec::new();

        let (a, b) = (&self.language_version, &other.language_version);
        if (a.major, a.minor, a.patch, &a.pre) != (b.major, b.minor, b.patch, &b.pre) {
            diffs.push(format!("compiler version {} != {}", a, b));
        }
        if self.optimizer_enabled != other.optimizer_enabled {
            diffs.push(format!(
                "optimizer enabled {} != {}",
                self.optimizer_enabled, other.optimizer_enabled
            ));
            return diffs;
        }
        if !self.optimizer_enabled {
            return diffs;
        }
        if self.optimizer_runs != other.optimizer_runs {
            diffs.push(format!(
                "optimizer runs {:?} != {:?}",
                self.optimizer_runs, other.optimizer_runs
            ));
        }
        if self.codegen_flags != other.codegen_flags {
            diffs.push(format!(
                "codegen flags {:?} != {:?}",
                self.codegen_flags, other.codegen_flags
            ));
        }
        diffs
    }

    /// SHA-256 over the canonical JSON form of the profile, hex encoded.
    ///
    /// Codegen flags are a sorted map, so the same profile always hashes the same.
    pub fn fingerprint(&self) -> String {
        let settings = ProfileSettings::from(self.clone());
        let json = serde_json::to_string(&settings)
            .expect("ProfileSettings has only string keys and plain values");

        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl TryFrom<ProfileSettings> for CompilerProfile {
    type Error = DeployError;

    fn try_from(settings: ProfileSettings) -> Result<Self, Self::Error> {
        Self::new(settings)
    }
}

impl From<CompilerProfile> for ProfileSettings {
    fn from(profile: CompilerProfile) -> Self {
        Self {
            language_version: profile.language_version.to_string(),
            optimizer_enabled: profile.optimizer_enabled,
            optimizer_runs: profile.optimizer_runs,
            codegen_flags: profile.codegen_flags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeployErrorKind;

    fn settings(enabled: bool, runs: Option<i64>) -> ProfileSettings {
        ProfileSettings {
            language_version: "0.8.13".to_string(),
            optimizer_enabled: enabled,
            optimizer_runs: runs,
            codegen_flags: BTreeMap::from([("yul".to_string(), false)]),
        }
    }

    #[test]
    fn test_default_profile_is_valid() {
        let profile = CompilerProfile::new(ProfileSettings::default()).unwrap();
        assert_eq!(profile.language_version(), &Version::new(0, 8, 13));
        assert!(profile.optimizer_enabled());
        assert_eq!(profile.effective_runs(), Some(200));
        assert_eq!(profile.codegen_flags().get("yul"), Some(&false));
    }

    #[test]
    fn test_enabled_optimizer_requires_non_negative_runs() {
        for runs in [Some(-1), Some(i64::MIN), None] {
            let err = CompilerProfile::new(settings(true, runs)).unwrap_err();
            assert_eq!(err.kind(), DeployErrorKind::Configuration, "runs = {:?}", runs);
        }

        for runs in [0, 1, 200, 1_000_000] {
            assert!(CompilerProfile::new(settings(true, Some(runs))).is_ok());
        }
    }

    #[test]
    fn test_disabled_optimizer_records_settings_verbatim() {
        let profile = CompilerProfile::new(settings(false, Some(-7))).unwrap();
        assert_eq!(profile.optimizer_runs(), Some(-7));
        assert_eq!(profile.effective_runs(), None);
        assert_eq!(profile.codegen_flags().len(), 1);
    }

    #[test]
    fn test_invalid_version_rejected() {
        let mut raw = settings(true, Some(200));
        raw.language_version = "0.8".to_string();
        let err = CompilerProfile::new(raw).unwrap_err();
        assert_eq!(err.kind(), DeployErrorKind::Configuration);
    }

    #[test]
    fn test_equivalence_ignores_runs_when_disabled() {
        let a = CompilerProfile::new(settings(false, Some(200))).unwrap();
        let mut raw = settings(false, None);
        raw.codegen_flags.clear();
        let b = CompilerProfile::new(raw).unwrap();
        assert!(a.is_equivalent(&b));

        let c = CompilerProfile::new(settings(true, Some(200))).unwrap();
        let d = CompilerProfile::new(settings(true, Some(1000))).unwrap();
        assert!(!c.is_equivalent(&d));
        assert!(!a.is_equivalent(&c));
    }

    #[test]
    fn test_equivalence_ignores_build_metadata() {
        let a = CompilerProfile::new(settings(true, Some(200))).unwrap();
        let mut raw = settings(true, Some(200));
        raw.language_version = "0.8.13+commit.abcdef12".to_string();
        let b = CompilerProfile::new(raw).unwrap();
        assert!(a.is_equivalent(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_difference_report_agrees_with_equivalence() {
        let plain = CompilerProfile::new(settings(true, Some(200))).unwrap();
        let mut raw = settings(true, Some(200));
        raw.language_version = "0.8.13+commit.abcdef12".to_string();
        let with_metadata = CompilerProfile::new(raw).unwrap();
        assert!(plain.describe_difference(&with_metadata).is_empty());

        let disabled = CompilerProfile::new(settings(false, Some(200))).unwrap();
        let mut raw = settings(false, None);
        raw.codegen_flags.clear();
        let disabled_bare = CompilerProfile::new(raw).unwrap();
        assert!(disabled.describe_difference(&disabled_bare).is_empty());

        let more_runs = CompilerProfile::new(settings(true, Some(1000))).unwrap();
        let diffs = plain.describe_difference(&more_runs);
        assert_eq!(diffs.len(), 1);
        assert!(diffs[0].contains("optimizer runs"));

        let diffs = plain.describe_difference(&disabled_bare);
        assert_eq!(diffs, vec!["optimizer enabled true != false".to_string()]);
    }

    #[test]
    fn test_fingerprint_determinism() {
        let profile = CompilerProfile::new(settings(true, Some(200))).unwrap();
        let hash1 = profile.fingerprint();
        let hash2 = profile.clone().fingerprint();
        assert_eq!(hash1, hash2, "Hash should be deterministic");
        assert_eq!(hash1.len(), 64, "SHA-256 hash should be 64 hex characters");

        let other = CompilerProfile::new(settings(true, Some(201))).unwrap();
        assert_ne!(hash1, other.fingerprint(), "Hash should change with runs");

        // SHA-256 of the empty string: the settings must always be hashed.
        assert_ne!(
            hash1,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: CompilerProfile = toml::from_str(
            r#"
            language_version = "0.8.13"
            optimizer_enabled = true
            optimizer_runs = 200
            [codegen_flags]
            yul = false
            "#,
        )
        .unwrap();
        assert_eq!(ok.effective_runs(), Some(200));

        let bad: Result<CompilerProfile, _> = toml::from_str(
            r#"
            language_version = "0.8.13"
            optimizer_enabled = true
            optimizer_runs = -5
            "#,
        );
        assert!(bad.is_err());
    }
}

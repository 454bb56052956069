//! grantscube-deploy - Deployment library for the GrantsCube contracts.
//!
//! This crate deploys an ordered set of interdependent contracts to an EVM chain.
//! Compiled artifacts are bound to the compiler profile they must have been built
//! with, a [`DeploymentPlan`] declares the steps and their data dependencies, and a
//! [`Pipeline`] executes the plan one step at a time against a [`NetworkContext`],
//! recording every confirmed address in a [`ResultLedger`].

mod error;
pub use error::{DeployError, DeployErrorKind, PlanFailure};

mod profile;
pub use profile::{CompilerProfile, ProfileSettings};

mod ledger;
pub use ledger::{DeploymentResult, ResultLedger};

mod artifacts;
pub use artifacts::{Artifact, ArtifactSet, BoundArtifacts};

mod network;
pub use network::{AccountHandle, CreationTx, NetworkContext, PendingCreation, RpcNetwork};

mod plan;
pub use plan::{
    ConstructorArg, DeploymentPlan, DeploymentStep, PlanBuilder, ResolveContext, ResolveFn,
};

mod pipeline;
pub use pipeline::{PlanStatus, Pipeline, StepState};

mod config;
pub use config::{
    CONFIG_FILENAME, DEFAULT_NETWORK, DeployConfig, ENV_PREFIX, NetworkConfig, StepConfig,
};

mod record;
pub use record::{DeploymentRecord, RecordedContract};

//! grantscube is a CLI tool to deploy the GrantsCube contracts to an EVM network.

mod cli;

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};

use cli::Cli;
use grantscube_deploy::{
    ArtifactSet, DeployConfig, DeployError, DeploymentPlan, DeploymentRecord, NetworkContext,
    Pipeline, PlanStatus, ResultLedger, RpcNetwork,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let mut config = DeployConfig::load(cli.config.as_deref())?;
    if let Some(network) = cli.network {
        config.network = network;
    }
    if let Some(artifacts) = cli.artifacts {
        config.artifacts = artifacts;
    }
    if let Some(outdata) = cli.outdata {
        config.outdata = outdata;
    }

    // Everything that can be checked offline is checked before connecting.
    let profile = config.profile()?;
    let network_config = config.active_network()?.clone();
    let artifacts = ArtifactSet::load(&config.artifacts)?.bind(&profile)?;
    let plan = config.build_plan(&artifacts)?;

    tracing::info!(
        network = %config.network,
        chain_id = network_config.chain_id,
        compiler = %profile.language_version(),
        steps = plan.len(),
        "Deployment plan ready"
    );

    if cli.dry_run {
        println!("{}", plan_table(&plan));
        return Ok(());
    }

    let network = RpcNetwork::connect(&network_config).await?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, stopping after the current step...");
                interrupted.store(true, Ordering::SeqCst);
            }
        });
    }

    let mut pipeline = Pipeline::new(&plan, &network);
    let mut failure = None;
    loop {
        if interrupted.load(Ordering::SeqCst) {
            pipeline.cancel();
        }
        match pipeline.next_step().await {
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                failure = Some(e);
                break;
            }
            None => break,
        }
    }

    let complete = pipeline.status() == PlanStatus::Completed;
    let failed_step = pipeline.position();
    let ledger = pipeline.into_ledger();

    println!("{}", ledger_table(&ledger));

    let record = DeploymentRecord::new(
        &config.network,
        network.chain_id(),
        &profile,
        &ledger,
        complete,
    );
    save_record(&record, &config.outdata);

    run_outcome(&plan, &ledger, failed_step, failure, complete)
}

/// Write the run's record. A failure is logged and not returned, so it can never
/// hide the outcome of the deployment itself.
fn save_record(record: &DeploymentRecord, outdata: &Path) -> Option<PathBuf> {
    match record.save_in(outdata) {
        Ok(path) => {
            tracing::info!(path = %path.display(), "Deployment record saved");
            Some(path)
        }
        Err(e) => {
            tracing::error!(
                error = ?e,
                outdata = %outdata.display(),
                "Failed to save deployment record; the table above is the only copy"
            );
            None
        }
    }
}

/// Turn the end state of a run into the process result.
fn run_outcome(
    plan: &DeploymentPlan,
    ledger: &ResultLedger,
    failed_step: usize,
    failure: Option<DeployError>,
    complete: bool,
) -> Result<()> {
    if let Some(error) = failure {
        let kind = plan.steps()[failed_step].kind();
        if !ledger.is_empty() {
            tracing::warn!(
                deployed = ledger.len(),
                "Contracts listed above are already published on-chain"
            );
        }
        return Err(error).context(format!(
            "Deployment aborted at step {} ({})",
            failed_step, kind
        ));
    }

    if !complete {
        anyhow::bail!(
            "Deployment cancelled after {} of {} steps",
            ledger.len(),
            plan.len()
        );
    }

    tracing::info!(contracts = ledger.len(), "Deployment complete");
    Ok(())
}

fn plan_table(plan: &DeploymentPlan) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["#", "Contract", "Constructor arguments"]);
    for (index, step) in plan.steps().iter().enumerate() {
        table.add_row(vec![
            index.to_string(),
            step.kind().to_string(),
            step.describe_args().join(", "),
        ]);
    }
    table
}

fn ledger_table(ledger: &ResultLedger) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Contract", "Address", "Block"]);
    for result in ledger {
        table.add_row(vec![
            result.kind.clone(),
            result.address.to_string(),
            result
                .confirmed_at_block
                .map(|block| block.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }
    table
}

//! Run command implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use tagmirror_core::{Config, ErrorScope, MirrorOutcome};
use tagmirror_engine::{Mirrorer, RunReport};
use tagmirror_registry::{AuthResolver, HttpRegistryClient, RegistryConfig};

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Path to the mirroring configuration file
    #[arg(short, long, env = "TAGMIRROR_CONFIG")]
    pub config: PathBuf,

    /// Stop the whole run at the first registry failure
    #[arg(long)]
    pub stop_on_error: bool,

    /// Seconds a registry response may stall before the request fails
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    pub timeout: u64,
}

/// Executes the run command.
pub async fn execute(args: &RunArgs, json: bool) -> Result<()> {
    let mut config = Config::load(&args.config).with_context(|| {
        format!("Failed to load configuration from {}", args.config.display())
    })?;
    if args.stop_on_error {
        config = config.with_error_scope(ErrorScope::Run);
    }

    info!(
        config = %args.config.display(),
        images = config.images().len(),
        "Loaded configuration"
    );

    let registry_config = RegistryConfig::new()
        .with_read_timeout(Duration::from_secs(args.timeout))
        .with_insecure_registries(config.insecure_registries().iter().cloned());
    let client =
        HttpRegistryClient::new(registry_config).context("Failed to create registry client")?;
    let mirrorer = Mirrorer::new(Arc::new(client), AuthResolver::new());

    match mirrorer.run(&config).await {
        Ok(report) => {
            print_report(&report, json)?;
            if report.has_failures() {
                anyhow::bail!(
                    "{} mirror decision(s) failed",
                    report.count(MirrorOutcome::Error)
                );
            }
            Ok(())
        }
        Err(err) => {
            if let Some(report) = err.report() {
                print_report(report, json)?;
            }
            Err(err.into())
        }
    }
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Run {}", report.run_id());
    for record in report.records() {
        match &record.error {
            Some(error) => println!("✗ {}:{} {} ({error})", record.image, record.tag, record.outcome),
            None => println!("✓ {}:{} {}", record.image, record.tag, record.outcome),
        }
    }
    println!("{}", report.summary());
    Ok(())
}

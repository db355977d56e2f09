#![deny(unused)]
//! opgate - operator tooling for the Operative Gate.
//!
//! Verifies tenant audit chains, prints the manifest Merkle root, and runs a
//! single gated call through a passthrough agent.
//!
//! Exit codes: 0 on success, 1 when a chain is broken or the gated call did
//! not succeed, 2 on usage errors.

use std::process::ExitCode;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use operative_core::{config::GateConfig, traits::FnAgent, types::AgentAnalysis};
use operative_gate::{Gate, IntoOperative, OperativeRequest};
use operative_governance::{setup_metrics_recorder, ConversionManifest, ImmutableAuditLogger};

#[derive(Parser, Debug)]
#[command(name = "opgate")]
#[command(version, about = "Operator tooling for the Operative Gate", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify a tenant's audit chains (every logged day if DAY is omitted)
    Verify {
        tenant: String,

        /// Day to verify, as YYYY-MM-DD
        day: Option<NaiveDate>,
    },

    /// Print the manifest entry count and Merkle root
    ManifestRoot,

    /// Run one gated call through a passthrough agent
    Run {
        tenant: String,
        action: String,

        /// Agent input as a JSON document
        input: serde_json::Value,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Usage errors exit with 2 before any config is read.
    let cli = Cli::parse();

    let config = GateConfig::load()?;
    operative_governance::configure_tracing(&config.logging)?;
    let metrics = setup_metrics_recorder()?;

    tracing::debug!("Starting opgate v{}", env!("CARGO_PKG_VERSION"));

    let passed = match cli.command {
        Command::Verify { tenant, day } => verify(&config, &tenant, day)?,
        Command::ManifestRoot => manifest_root(&config)?,
        Command::Run {
            tenant,
            action,
            input,
        } => run(&config, &tenant, &action, input).await?,
    };

    tracing::debug!(metrics = %metrics.render(), "Final metrics snapshot");

    Ok(if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Returns false when any verified chain is broken.
fn verify(config: &GateConfig, tenant: &str, day: Option<NaiveDate>) -> anyhow::Result<bool> {
    let logger = ImmutableAuditLogger::new(config.audit.audit_dir.clone());

    let days = match day {
        Some(day) => vec![day],
        None => logger.days(tenant)?,
    };
    if days.is_empty() {
        println!("{}: no audit logs under {}", tenant, config.audit.audit_dir.display());
        return Ok(false);
    }

    let mut all_valid = true;
    for day in days {
        let report = logger.verify_chain(tenant, day)?;
        let verdict = if report.valid { "OK" } else { "BROKEN" };
        println!("{} {} {} ({} entries)", tenant, day, verdict, report.entries);
        for error in &report.errors {
            println!("  line {}: {}", error.line, error.message);
        }
        all_valid &= report.valid;
    }
    Ok(all_valid)
}

fn manifest_root(config: &GateConfig) -> anyhow::Result<bool> {
    let manifest = ConversionManifest::new(config.manifest.manifest_path.clone());
    println!("entries: {}", manifest.len()?);
    println!("merkle_root: {}", manifest.merkle_root()?);
    Ok(true)
}

/// Returns false unless the gated call succeeded.
async fn run(
    config: &GateConfig,
    tenant: &str,
    action: &str,
    input: serde_json::Value,
) -> anyhow::Result<bool> {
    let gate = Gate::builder(config.clone()).build()?;
    let agent = Arc::new(FnAgent::new("opgate_passthrough", |_ctx, input| {
        Ok(AgentAnalysis::from_value(input.clone()))
    }))
    .bind(&gate);

    let result = agent
        .execute_operative(OperativeRequest::new(tenant, input).action(action))
        .await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.ok)
}

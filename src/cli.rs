//! Command-line entry points: serve stubs, compare contracts, verify a
//! running service.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::compat::CompatibilityChecker;
use crate::config::StubConfig;
use crate::contract::Feature;
use crate::errors::{IncompatibleContracts, SpecmockError};
use crate::observability::telemetry::init_tracing;
use crate::stub::{loader, StubEngine, StubServer};
use crate::testing::ContractVerifier;

#[derive(Parser)]
#[command(name = "specmock")]
#[command(about = "Contract-driven stub server and compatibility checker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve contracts as a stub server until interrupted
    Stub {
        /// Contract documents (JSON)
        #[arg(value_name = "CONTRACT")]
        contracts: Vec<PathBuf>,

        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,

        /// Answer unmatched requests with a 400 report
        #[arg(long)]
        strict: bool,

        /// Forward unmatched requests to this base URL
        #[arg(long, value_name = "URL")]
        passthrough: Option<String>,

        /// Directory of seed expectations (repeatable)
        #[arg(long = "expectations", value_name = "DIR")]
        expectation_dirs: Vec<PathBuf>,
    },

    /// Check that NEWER is backward compatible with OLDER
    Compat {
        older: PathBuf,
        newer: PathBuf,
    },

    /// Generate tests from a contract and run them against a live service
    Test {
        contract: PathBuf,

        #[arg(long, value_name = "URL")]
        base_url: String,

        /// Per-request timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = StubConfig::load(cli.config.as_deref())
        .map_err(|e| SpecmockError::Config(format!("{:#}", e)))?;
    init_tracing(&config.log_filter);

    match cli.command {
        Commands::Stub {
            contracts,
            host,
            port,
            strict,
            passthrough,
            expectation_dirs,
        } => {
            config.contracts.extend(contracts);
            config.expectation_dirs.extend(expectation_dirs);
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            config.strict |= strict;
            if passthrough.is_some() {
                config.passthrough_url = passthrough;
            }
            run_stub(config).await
        }
        Commands::Compat { older, newer } => run_compat(&older, &newer, config.max_test_variants),
        Commands::Test {
            contract,
            base_url,
            timeout,
        } => run_tests(&contract, &base_url, timeout, config.max_test_variants).await,
    }
}

async fn run_stub(config: StubConfig) -> Result<()> {
    config.validate()?;
    let outcome = loader::load(&config.contracts, &config.expectation_dirs)
        .map_err(SpecmockError::from)?;
    for line in &outcome.log {
        eprintln!("{}", line);
    }
    let engine = Arc::new(StubEngine::from_outcome(outcome, &config).map_err(SpecmockError::from)?);
    let server = StubServer::start(engine, &config)
        .await
        .map_err(SpecmockError::from)?;
    println!("Stub server running at {}", server.url());

    shutdown_signal().await;
    eprintln!("\nReceived shutdown signal, stopping...");
    server.stop().await;
    Ok(())
}

fn load_feature(path: &Path) -> Result<Feature> {
    Feature::from_file(path)
        .map_err(SpecmockError::from)
        .with_context(|| format!("Failed to load contract {}", path.display()))
}

fn run_compat(older: &Path, newer: &Path, variant_limit: usize) -> Result<()> {
    let older = load_feature(older)?;
    let newer = load_feature(newer)?;
    let results = CompatibilityChecker::new()
        .with_variant_limit(variant_limit)
        .check(&older, &newer);

    if results.is_success() {
        println!("The newer contract is backward compatible.");
        if results.advisory_count() > 0 {
            println!("\nIgnored failures:\n{}", results.report());
        }
        return Ok(());
    }
    println!("{}", results.report());
    Err(IncompatibleContracts {
        failures: results.failure_count(),
    }
    .into())
}

async fn run_tests(contract: &Path, base_url: &str, timeout: u64, variant_limit: usize) -> Result<()> {
    let feature = load_feature(contract)?;
    let verifier = ContractVerifier::new(base_url, Duration::from_secs(timeout))
        .map_err(SpecmockError::from)?
        .with_variant_limit(variant_limit);
    let report = verifier.verify(&feature).await.map_err(SpecmockError::from)?;

    for outcome in &report.outcomes {
        let mark = if outcome.passed() { "PASS" } else { "FAIL" };
        println!("{} {} {} ({})", mark, outcome.method, outcome.target, outcome.scenario);
        if let Some(failure) = outcome.result.as_failure() {
            println!("{}", failure.report());
        }
    }
    let summary = report.summary();
    println!(
        "\n{} tests, {} passed, {} failed, {} ignored",
        summary.total, summary.passed, summary.failed, summary.advisory
    );
    if report.is_success() {
        Ok(())
    } else {
        anyhow::bail!("{} contract tests failed", summary.failed)
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(_) => {
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}

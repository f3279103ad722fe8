//! Model Harness - Gradle model-builder suite runner
//!
//! ## Commands
//!
//! - `run`: Run every case of a suite against the Gradle version table
//! - `resolve`: Show where the distribution for a version would come from
//! - `versions`: List the supported Gradle versions

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};

use model_harness::distribution::{select_distribution, DistributionLocator};
use model_harness::{
    init_tracing, AllModels, CaseFailure, DistributionSource, GradleVersion, HarnessConfig,
    LogFormat, ModelCase, ModelClass, ModelHarness, ModelSuite, RepositorySettings, SuiteReport,
    SUPPORTED_VERSIONS,
};

#[derive(Parser)]
#[command(name = "model-harness")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run Gradle model-builder suites across Gradle versions", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a suite against each Gradle version
    Run {
        /// Suite definition (TOML)
        #[arg(short, long)]
        suite: PathBuf,

        /// Fixture directory (default: MODEL_HARNESS_FIXTURES or tests/fixtures)
        #[arg(short, long)]
        fixtures: Option<PathBuf>,

        /// Gradle version to run; repeat for several (default: all supported)
        #[arg(long = "version", value_name = "VERSION")]
        versions: Vec<String>,

        /// Model-builder extension script to load into the init script
        #[arg(long, env = "MODEL_HARNESS_EXTENSION_SCRIPT")]
        extension: Option<PathBuf>,

        /// Also fail when the snapshot has models nobody asked for
        #[arg(long)]
        strict: bool,

        /// Write a JSON report of every run to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Show the distribution source chosen for a version
    Resolve {
        /// Gradle version, e.g. 1.9 or 1.12-20140327133732+0000
        version: String,
    },

    /// List the supported Gradle versions
    Versions,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let format = if cli.json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_tracing(format, level);

    match cli.command {
        Commands::Run {
            suite,
            fixtures,
            versions,
            extension,
            strict,
            report,
        } => {
            cmd_run(
                &suite,
                fixtures,
                &versions,
                extension,
                strict,
                report.as_deref(),
            )
            .await
        }
        Commands::Resolve { version } => cmd_resolve(&version),
        Commands::Versions => cmd_versions(),
    }
}

/// Run a suite and print a summary
async fn cmd_run(
    suite_path: &Path,
    fixtures: Option<PathBuf>,
    versions: &[String],
    extension: Option<PathBuf>,
    strict: bool,
    report_path: Option<&Path>,
) -> Result<()> {
    let suite = ModelSuite::load(suite_path)
        .with_context(|| format!("Failed to load suite {:?}", suite_path))?;

    let mut config = HarnessConfig::from_env();
    if let Some(dir) = fixtures {
        config = config.with_fixtures_dir(dir);
    }
    if let Some(script) = extension {
        config = config.with_extension_script(script);
    }

    let versions: Vec<&str> = if versions.is_empty() {
        SUPPORTED_VERSIONS.to_vec()
    } else {
        versions.iter().map(String::as_str).collect()
    };

    info!(
        suite = %suite.name,
        cases = suite.cases.len(),
        versions = versions.len(),
        "Running suite"
    );

    let harness = ModelHarness::from_config(&config).context("Failed to set up harness")?;
    let report = harness
        .run_suite(&suite, &versions, |ctx| {
            verify_snapshot(ctx.case, ctx.snapshot, strict)
        })
        .await;

    print_summary(&report);

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&RunReport::from(&report))?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
        println!("Report written to {}", path.display());
    }

    if !report.success() {
        bail!(
            "{} of {} runs failed",
            report.failed_count(),
            report.runs.len()
        );
    }
    Ok(())
}

/// Requested models must all be present; under `strict`, nothing else may be.
fn verify_snapshot(case: &ModelCase, snapshot: &AllModels, strict: bool) -> Result<()> {
    let missing = snapshot.missing(&case.models);
    if !missing.is_empty() {
        bail!("missing models: {}", join(&missing));
    }

    if strict {
        let unexpected: Vec<ModelClass> = snapshot
            .unexpected(&case.models)
            .into_iter()
            .filter(|class| {
                !(case.include_default_models && class.as_str() == ModelClass::GRADLE_BUILD)
            })
            .collect();
        if !unexpected.is_empty() {
            bail!("unexpected models: {}", join(&unexpected));
        }
    }
    Ok(())
}

fn join(classes: &[ModelClass]) -> String {
    classes
        .iter()
        .map(ModelClass::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_summary(report: &SuiteReport) {
    println!("Suite: {}", report.suite);
    println!();

    for run in &report.runs {
        match &run.outcome {
            Ok(_) => println!(
                "  PASS  {} @ {} ({} ms)",
                run.case, run.version, run.duration_ms
            ),
            Err(failure) => println!(
                "  FAIL  {} @ {} ({} ms) [{}] {}",
                run.case,
                run.version,
                run.duration_ms,
                failure_label(failure),
                failure
            ),
        }
    }

    println!();
    println!(
        "{} passed, {} failed",
        report.passed_count(),
        report.failed_count()
    );
}

fn failure_label(failure: &CaseFailure) -> &'static str {
    failure.kind().map_or("assertion", |kind| kind.as_str())
}

#[derive(Debug, Serialize)]
struct RunReport {
    suite: String,
    passed: usize,
    failed: usize,
    runs: Vec<RunEntry>,
}

#[derive(Debug, Serialize)]
struct RunEntry {
    case: String,
    version: String,
    started_at: String,
    duration_ms: u64,
    reached: String,
    passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot: Option<AllModels>,
}

impl From<&SuiteReport> for RunReport {
    fn from(report: &SuiteReport) -> Self {
        RunReport {
            suite: report.suite.clone(),
            passed: report.passed_count(),
            failed: report.failed_count(),
            runs: report
                .runs
                .iter()
                .map(|run| RunEntry {
                    case: run.case.clone(),
                    version: run.version.clone(),
                    started_at: run.started_at.to_rfc3339(),
                    duration_ms: run.duration_ms,
                    reached: run.reached().to_string(),
                    passed: run.passed(),
                    failure: run.failure().map(|f| f.to_string()),
                    snapshot: run.snapshot().cloned(),
                })
                .collect(),
        }
    }
}

/// Show where the distribution for a version comes from
fn cmd_resolve(version: &str) -> Result<()> {
    let version = GradleVersion::parse(version)?;
    let settings = RepositorySettings::from_env();

    println!("Gradle {}", version);
    println!(
        "Channel: {}",
        if version.is_snapshot() {
            "snapshot"
        } else {
            "release"
        }
    );

    match select_distribution(&settings, &version)? {
        DistributionSource::Uri(uri) => {
            println!("Distribution: {}", uri);
        }
        DistributionSource::Version(_) => {
            let fallback = DistributionLocator::public().distribution_for(&version)?;
            println!("Distribution: resolved by version name");
            println!("  (connector default: {})", fallback);
        }
    }

    Ok(())
}

/// List the version table
fn cmd_versions() -> Result<()> {
    for raw in SUPPORTED_VERSIONS {
        let version = GradleVersion::parse(raw)?;
        let marker = if version.is_snapshot() {
            " (snapshot)"
        } else {
            ""
        };
        println!("{}{}", version, marker);
    }
    Ok(())
}

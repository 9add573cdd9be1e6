//! hpdcov - HPD interval coverage for simulation-based calibration
//!
//! A CLI tool that pools the posterior samples of simulated replicates,
//! computes highest posterior density intervals and reports how often the
//! true simulated parameter values fall inside them.
//!
//! Exit codes:
//!   0 - Success (every parameter evaluated, none below --min-coverage)
//!   1 - Runtime error (bad config, unusable input, failed parameters)
//!   2 - A parameter's coverage fell below the --min-coverage threshold

mod analysis;
mod cli;
mod config;
mod loader;
mod models;
mod report;

use analysis::CoverageEngine;
use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use loader::{DatasetLoader, LoadConfig};
use models::{Report, ReportMetadata};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration before logging so its verbosity applies
    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(&args, config.general.verbose);

    info!("hpdcov v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Configuration: {:?}", config);

    match run_analysis(config, args.quiet).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .hpdcov.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to set input paths, replicates, chains and parameters.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// `RUST_LOG` takes precedence over the verbosity flags when set.
fn init_logging(args: &Args, config_verbose: bool) {
    let level = if config_verbose && !args.quiet {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete coverage workflow. Returns exit code (0, 1 or 2).
async fn run_analysis(config: Config, quiet: bool) -> Result<i32> {
    let start_time = Instant::now();

    // Step 1: Validate what to analyze
    let engine = CoverageEngine::new(config.analysis_settings())
        .context("Invalid analysis settings")?;
    let settings = engine.settings();

    println!("📐 Coverage analysis: {}", config.general.title);
    println!("   HPD mass: {}", settings.mass_level);
    println!("   Replicates: {}", settings.replicate_count);
    println!("   Chains: {}", config.analysis.chain_ids.join(", "));
    println!("   Parameters: {}", settings.parameters.len());

    // Step 2: Load posterior logs and true values
    println!("\n📥 Loading inputs from {}", config.inputs.base_dir);
    let load_config = LoadConfig {
        show_progress: !quiet,
        ..LoadConfig::from(&config.inputs)
    };
    let loader = DatasetLoader::new(
        load_config,
        settings.parameters.clone(),
        settings.replicate_count,
        settings.chain_ids.clone(),
    )
    .context("Invalid input configuration")?;
    let tables = loader.load().await?;

    // Step 3: Intervals and coverage
    println!("\n🔬 Computing HPD intervals...");
    let summary = engine.run(&tables)?;

    // Step 4: Build the report
    println!("\n📝 Generating report...");
    let duration = start_time.elapsed().as_secs_f64();

    let metadata = ReportMetadata {
        title: config.general.title.clone(),
        analysis_date: Utc::now(),
        mass_level: settings.mass_level,
        replicate_count: settings.replicate_count,
        chain_count: settings.chain_ids.len(),
        parameters_analyzed: summary.results.len(),
        parameters_failed: summary.failures.len(),
        duration_seconds: duration,
    };

    let below = config
        .analysis
        .min_coverage
        .map(|min| {
            summary
                .below(min)
                .into_iter()
                .map(|r| (r.label.clone(), r.percentage()))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let report = Report::new(metadata, summary);

    // Step 5: Save the report
    let output = match config.report.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => {
            report::generate_markdown_report(&report, config.report.include_replicates)
        }
        OutputFormat::Tsv => report::generate_tsv_report(&report),
    };

    std::fs::write(&config.general.output, &output)
        .with_context(|| format!("Failed to write report to {}", config.general.output))?;

    // Print summary
    println!("\n📊 Coverage Summary:");
    for result in &report.results {
        println!(
            "   {:<16} {:>6.2}% ({}/{})",
            result.label,
            result.percentage(),
            result.covered_count(),
            result.replicate_count()
        );
    }
    for failure in &report.failures {
        println!("   {:<16} failed: {}", failure.parameter, failure.error);
    }
    println!("   Duration: {:.1}s", duration);
    println!(
        "\n✅ Analysis complete! Report saved to: {}",
        config.general.output
    );

    if !report.failures.is_empty() {
        warn!("{} parameter(s) could not be evaluated", report.failures.len());
        eprintln!(
            "\n⛔ {} parameter(s) failed on missing or invalid input (exit code 1).",
            report.failures.len()
        );
        return Ok(1);
    }

    // Check --min-coverage threshold
    if !below.is_empty() {
        for (label, percentage) in &below {
            eprintln!("   {} at {:.2}%", label, percentage);
        }
        eprintln!(
            "\n⛔ Coverage below {}% for {} parameter(s). Failing (exit code 2).",
            config.analysis.min_coverage.unwrap_or_default(),
            below.len()
        );
        return Ok(2);
    }

    Ok(0)
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is set up, so problems go to stderr directly.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Ignoring {}: {:#}", CONFIG_FILE, e);
            Ok(Config::default())
        }
    }
}

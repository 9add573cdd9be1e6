//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// hpdcov - HPD interval coverage for simulation-based calibration
///
/// Pools the posterior samples of every replicate across chains, computes
/// the highest posterior density interval of each parameter and reports how
/// often the true simulated value falls inside it.
///
/// Examples:
///   hpdcov --base-dir ./Yule100
///   hpdcov --base-dir ./Yule100 --mass 0.9 --chains 1,2,3
///   hpdcov --config study.toml --format json --output coverage.json
///   hpdcov --parameters kappa,shape --min-coverage 90
///   hpdcov --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Root directory of the simulation study
    ///
    /// Path templates from the config are resolved relative to it.
    #[arg(short, long, value_name = "DIR")]
    pub base_dir: Option<PathBuf>,

    /// Probability mass of the HPD intervals (strictly between 0 and 1)
    #[arg(short, long, value_name = "LEVEL", env = "HPDCOV_MASS")]
    pub mass: Option<f64>,

    /// Number of replicates, numbered from 1
    #[arg(short, long, value_name = "COUNT")]
    pub replicates: Option<u32>,

    /// Chain ids pooled per replicate (comma-separated)
    ///
    /// Example: --chains 1,2
    #[arg(long, value_name = "IDS", value_delimiter = ',')]
    pub chains: Option<Vec<String>>,

    /// Parameters to check (comma-separated)
    ///
    /// Names from the config keep their label and truth source; unknown
    /// names read their true value from the generation log column of the
    /// same name.
    #[arg(short, long, value_name = "NAMES", value_delimiter = ',')]
    pub parameters: Option<Vec<String>>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json, tsv)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Title of the report
    #[arg(long, value_name = "TITLE")]
    pub title: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .hpdcov.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of replicates loaded concurrently
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Abort on the first parameter with missing or invalid data
    ///
    /// By default such a parameter is reported as failed and the others
    /// are still evaluated.
    #[arg(long)]
    pub strict: bool,

    /// Fail if any parameter's coverage is below this percentage
    ///
    /// Useful for CI pipelines. Exit code 2 when the threshold is missed.
    #[arg(long, value_name = "PCT")]
    pub min_coverage: Option<f64>,

    /// Leave the per-replicate interval tables out of the report
    #[arg(long)]
    pub no_replicates: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .hpdcov.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
    /// Tab-separated, one row per parameter and replicate
    Tsv,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(mass) = self.mass {
            if !(mass > 0.0 && mass < 1.0) {
                return Err("Mass must be strictly between 0 and 1".to_string());
            }
        }

        if let Some(min_coverage) = self.min_coverage {
            if !(0.0..=100.0).contains(&min_coverage) {
                return Err("Minimum coverage must be a percentage between 0 and 100".to_string());
            }
        }

        if self.replicates == Some(0) {
            return Err("Replicate count must be at least 1".to_string());
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if let Some(ref chains) = self.chains {
            if chains.iter().any(|c| c.trim().is_empty()) {
                return Err("Chain ids cannot be empty".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        // Validate base directory if provided
        if let Some(ref base_dir) = self.base_dir {
            if !base_dir.exists() {
                return Err(format!(
                    "Base directory does not exist: {}",
                    base_dir.display()
                ));
            }
            if !base_dir.is_dir() {
                return Err(format!(
                    "Base path is not a directory: {}",
                    base_dir.display()
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            base_dir: None,
            mass: None,
            replicates: None,
            chains: None,
            parameters: None,
            output: None,
            format: None,
            title: None,
            config: None,
            concurrency: None,
            strict: false,
            min_coverage: None,
            no_replicates: false,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_from_command_line() {
        let args = Args::parse_from([
            "hpdcov",
            "--mass",
            "0.9",
            "--chains",
            "1,2,3",
            "--parameters",
            "kappa,shape",
            "--format",
            "tsv",
            "--strict",
        ]);
        assert_eq!(args.mass, Some(0.9));
        assert_eq!(args.chains, Some(vec!["1".into(), "2".into(), "3".into()]));
        assert_eq!(args.parameters, Some(vec!["kappa".into(), "shape".into()]));
        assert_eq!(args.format, Some(OutputFormat::Tsv));
        assert!(args.strict);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_mass_range() {
        let mut args = make_args();
        for bad in [0.0, 1.0, 1.2, -0.1, f64::NAN] {
            args.mass = Some(bad);
            assert!(args.validate().is_err(), "mass {bad}");
        }
        args.mass = Some(0.5);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_counts() {
        let mut args = make_args();
        args.replicates = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.concurrency = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.min_coverage = Some(120.0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_missing_base_dir() {
        let mut args = make_args();
        args.base_dir = Some(PathBuf::from("/definitely/not/here/hpdcov"));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}

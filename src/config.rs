//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.hpdcov.toml` files.

use crate::analysis::{AnalysisSettings, DEFAULT_MASS};
use crate::cli::OutputFormat;
use crate::models::{ChainId, Parameter, TreeStatistic, TruthSource};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = ".hpdcov.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Interval and replicate settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Input file locations.
    #[serde(default)]
    pub inputs: InputsConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,

    /// Parameters to check, in report order.
    #[serde(default = "default_parameters")]
    pub parameters: Vec<Parameter>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            analysis: AnalysisConfig::default(),
            inputs: InputsConfig::default(),
            report: ReportConfig::default(),
            parameters: default_parameters(),
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Name of the simulation study, used as report title.
    #[serde(default = "default_title")]
    pub title: String,

    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_title() -> String {
    "Yule100".to_string()
}

fn default_output() -> String {
    "coverage_report.md".to_string()
}

/// Interval and replicate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Probability mass of each HPD interval.
    #[serde(default = "default_mass_level")]
    pub mass_level: f64,

    /// Number of replicates, numbered from 1.
    #[serde(default = "default_replicate_count")]
    pub replicate_count: u32,

    /// Chains pooled per replicate.
    #[serde(default = "default_chain_ids")]
    pub chain_ids: Vec<String>,

    /// Abort on the first failing parameter instead of skipping it.
    #[serde(default)]
    pub strict: bool,

    /// Coverage percentage below which the run exits with code 2.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_coverage: Option<f64>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            mass_level: default_mass_level(),
            replicate_count: default_replicate_count(),
            chain_ids: default_chain_ids(),
            strict: false,
            min_coverage: None,
        }
    }
}

fn default_mass_level() -> f64 {
    DEFAULT_MASS
}

fn default_replicate_count() -> u32 {
    100
}

fn default_chain_ids() -> Vec<String> {
    vec!["1".to_string(), "2".to_string()]
}

/// Input file locations.
///
/// Templates are relative to `base_dir`; `{rep}` and `{chain}` are substituted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputsConfig {
    /// Root directory of the simulation study.
    #[serde(default = "default_base_dir")]
    pub base_dir: String,

    /// Per-chain posterior trace log.
    #[serde(default = "default_posterior_log")]
    pub posterior_log: String,

    /// Generation log whose first row holds the true values.
    #[serde(default = "default_truth_log")]
    pub truth_log: Option<String>,

    /// File holding the generating tree (bare Newick or XML).
    #[serde(default = "default_truth_tree")]
    pub truth_tree: Option<String>,

    /// XML element id carrying the `newick` attribute.
    #[serde(default = "default_tree_node_id")]
    pub tree_node_id: String,

    /// Number of replicates loaded concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            posterior_log: default_posterior_log(),
            truth_log: default_truth_log(),
            truth_tree: default_truth_tree(),
            tree_node_id: default_tree_node_id(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_base_dir() -> String {
    ".".to_string()
}

fn default_posterior_log() -> String {
    "reps/rep{rep}/run{chain}/yule-n100-{rep}.log".to_string()
}

fn default_truth_log() -> Option<String> {
    Some("reps/rep{rep}/yule-n100-{rep}.log".to_string())
}

fn default_truth_tree() -> Option<String> {
    Some("reps/rep{rep}/yule-n100-{rep}.xml".to_string())
}

fn default_tree_node_id() -> String {
    "phi".to_string()
}

fn default_concurrency() -> usize {
    8
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Output format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Include per-replicate interval tables.
    #[serde(default = "default_true")]
    pub include_replicates: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            include_replicates: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Parameters of a Yule-tree HKY+G simulation study.
///
/// The generation logs name base frequencies `frequencies_0..3` while the
/// inference logs use `frequencies.A..T`, hence the column overrides.
fn default_parameters() -> Vec<Parameter> {
    let tree = |name: &str, label: &str, statistic| {
        Parameter::new(name)
            .with_label(label)
            .with_truth(TruthSource::Tree { statistic })
    };
    let freq = |base: &str, index: usize| {
        Parameter::new(format!("frequencies.{}", base))
            .with_label(format!("freq {}", base))
            .with_truth(TruthSource::Log {
                column: Some(format!("frequencies_{}", index)),
            })
    };

    vec![
        tree("phi.height", "tree height", TreeStatistic::Height),
        tree("phi.treeLength", "tree length", TreeStatistic::Length),
        Parameter::new("kappa"),
        Parameter::new("shape"),
        Parameter::new("birthRate").with_label("birth rate"),
        freq("A", 0),
        freq("C", 1),
        freq("G", 2),
        freq("T", 3),
    ]
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(mass) = args.mass {
            self.analysis.mass_level = mass;
        }
        if let Some(replicates) = args.replicates {
            self.analysis.replicate_count = replicates;
        }
        if let Some(ref chains) = args.chains {
            self.analysis.chain_ids = chains.clone();
        }
        if let Some(min_coverage) = args.min_coverage {
            self.analysis.min_coverage = Some(min_coverage);
        }
        if args.strict {
            self.analysis.strict = true;
        }

        // Keep configured definitions (labels, truth sources) of selected names.
        if let Some(ref names) = args.parameters {
            self.parameters = names
                .iter()
                .map(|name| {
                    self.parameters
                        .iter()
                        .find(|p| &p.name == name)
                        .cloned()
                        .unwrap_or_else(|| Parameter::new(name.as_str()))
                })
                .collect();
        }

        if let Some(ref base_dir) = args.base_dir {
            self.inputs.base_dir = base_dir.display().to_string();
        }
        if let Some(concurrency) = args.concurrency {
            self.inputs.concurrency = concurrency;
        }

        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(ref title) = args.title {
            self.general.title = title.clone();
        }
        if let Some(format) = args.format {
            self.report.format = format;
        }
        if args.no_replicates {
            self.report.include_replicates = false;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Engine settings derived from this configuration.
    pub fn analysis_settings(&self) -> AnalysisSettings {
        AnalysisSettings {
            mass_level: self.analysis.mass_level,
            parameters: self.parameters.clone(),
            replicate_count: self.analysis.replicate_count,
            chain_ids: self
                .analysis
                .chain_ids
                .iter()
                .map(|c| ChainId::from(c.as_str()))
                .collect(),
            strict: self.analysis.strict,
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

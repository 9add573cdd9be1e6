//! Data models for the coverage analysis.
//!
//! This module contains the core data structures used throughout the
//! application for representing parameters, intervals, per-replicate
//! outcomes and the final report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one simulated dataset / inference run pair (1-indexed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicateId(pub u32);

impl fmt::Display for ReplicateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ReplicateId {
    /// Replicates `1..=count`, in ascending order.
    pub fn range(count: u32) -> Vec<ReplicateId> {
        (1..=count).map(ReplicateId).collect()
    }
}

/// Identifier of one independent inference chain of a replicate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub String);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChainId {
    fn from(s: &str) -> Self {
        ChainId(s.to_string())
    }
}

/// Which statistic of the generating tree a parameter's true value is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeStatistic {
    /// Maximum root-to-node distance.
    Height,
    /// Sum of all branch lengths.
    Length,
}

impl fmt::Display for TreeStatistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeStatistic::Height => write!(f, "height"),
            TreeStatistic::Length => write!(f, "length"),
        }
    }
}

/// Where the true value of a parameter comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TruthSource {
    /// First data row of the replicate's generation log.
    ///
    /// `column` defaults to the parameter name when absent.
    Log {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        column: Option<String>,
    },
    /// A statistic of the replicate's generating tree.
    Tree { statistic: TreeStatistic },
}

impl Default for TruthSource {
    fn default() -> Self {
        TruthSource::Log { column: None }
    }
}

/// A scalar quantity of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Column name in the posterior logs.
    pub name: String,
    /// Human readable label used in reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Source of the true value.
    #[serde(default)]
    pub truth: TruthSource,
}

impl Parameter {
    /// Creates a parameter whose truth is read from the log column of the same name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            truth: TruthSource::default(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_truth(mut self, truth: TruthSource) -> Self {
        self.truth = truth;
        self
    }

    /// Label for display, falling back to the name.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    /// Column of the generation log holding the true value, if log-sourced.
    pub fn truth_column(&self) -> Option<&str> {
        match &self.truth {
            TruthSource::Log { column } => Some(column.as_deref().unwrap_or(&self.name)),
            TruthSource::Tree { .. } => None,
        }
    }
}

/// An interval `[lower, upper]` holding a target share of a posterior sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CredibleInterval {
    pub lower: f64,
    pub upper: f64,
}

impl CredibleInterval {
    /// Whether `value` lies within the interval, bounds included.
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

impl fmt::Display for CredibleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}

/// Interval and coverage outcome of one replicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicateOutcome {
    pub replicate: ReplicateId,
    pub true_value: f64,
    pub interval: CredibleInterval,
    pub covered: bool,
}

/// Coverage of one parameter across all replicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageResult {
    /// Parameter identifier.
    pub parameter: String,
    /// Display label.
    pub label: String,
    /// Probability mass each interval was computed at.
    pub mass_level: f64,
    /// Fraction of replicates whose true value is covered.
    pub coverage_fraction: f64,
    /// Per-replicate outcomes, in replicate order.
    pub outcomes: Vec<ReplicateOutcome>,
}

impl CoverageResult {
    /// Number of replicates whose interval covers the true value.
    pub fn covered_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.covered).count()
    }

    pub fn replicate_count(&self) -> usize {
        self.outcomes.len()
    }

    /// Coverage in percent.
    pub fn percentage(&self) -> f64 {
        self.coverage_fraction * 100.0
    }

    /// Largest of all true values and upper bounds.
    ///
    /// Plotting tools use it as the extent of the `y = x` reference line.
    pub fn axis_max(&self) -> f64 {
        self.outcomes
            .iter()
            .flat_map(|o| [o.true_value, o.interval.upper])
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// A parameter that could not be evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterFailure {
    pub parameter: String,
    pub error: String,
}

/// Outcome of a full engine run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    /// Successful parameters, in configured order.
    pub results: Vec<CoverageResult>,
    /// Parameters aborted by an input error.
    pub failures: Vec<ParameterFailure>,
}

impl CoverageSummary {
    /// Look up a result by parameter name.
    #[allow(dead_code)] // Lookup for presentation layers
    pub fn get(&self, parameter: &str) -> Option<&CoverageResult> {
        self.results.iter().find(|r| r.parameter == parameter)
    }

    /// Results whose coverage percentage is below `min_percentage`.
    pub fn below(&self, min_percentage: f64) -> Vec<&CoverageResult> {
        self.results
            .iter()
            .filter(|r| r.percentage() < min_percentage)
            .collect()
    }
}

/// Metadata about the coverage report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Name of the simulation study.
    pub title: String,
    /// Date and time of the analysis.
    pub analysis_date: DateTime<Utc>,
    /// Target mass of the credible intervals.
    pub mass_level: f64,
    /// Number of replicates per parameter.
    pub replicate_count: u32,
    /// Number of chains pooled per replicate.
    pub chain_count: usize,
    /// Parameters with a coverage result.
    pub parameters_analyzed: usize,
    /// Parameters that failed.
    pub parameters_failed: usize,
    /// Duration of the analysis in seconds.
    pub duration_seconds: f64,
}

/// The complete coverage report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub results: Vec<CoverageResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ParameterFailure>,
}

impl Report {
    /// Creates a report from an engine run.
    pub fn new(metadata: ReportMetadata, summary: CoverageSummary) -> Self {
        Self {
            metadata,
            results: summary.results,
            failures: summary.failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(rep: u32, true_value: f64, lower: f64, upper: f64) -> ReplicateOutcome {
        let interval = CredibleInterval { lower, upper };
        ReplicateOutcome {
            replicate: ReplicateId(rep),
            true_value,
            interval,
            covered: interval.contains(true_value),
        }
    }

    #[test]
    fn test_interval_contains_is_inclusive() {
        let interval = CredibleInterval {
            lower: 1.0,
            upper: 2.0,
        };
        assert!(interval.contains(1.0));
        assert!(interval.contains(2.0));
        assert!(interval.contains(1.5));
        assert!(!interval.contains(0.999));
        assert!(!interval.contains(2.001));
        assert!(!interval.contains(f64::NAN));
        assert_eq!(interval.width(), 1.0);
    }

    #[test]
    fn test_parameter_truth_column() {
        let plain = Parameter::new("kappa");
        assert_eq!(plain.truth_column(), Some("kappa"));
        assert_eq!(plain.display_label(), "kappa");

        let mapped = Parameter::new("frequencies.A")
            .with_label("freq A")
            .with_truth(TruthSource::Log {
                column: Some("frequencies_0".to_string()),
            });
        assert_eq!(mapped.truth_column(), Some("frequencies_0"));
        assert_eq!(mapped.display_label(), "freq A");

        let tree = Parameter::new("phi.height").with_truth(TruthSource::Tree {
            statistic: TreeStatistic::Height,
        });
        assert_eq!(tree.truth_column(), None);
    }

    #[test]
    fn test_coverage_result_accessors() {
        let result = CoverageResult {
            parameter: "kappa".to_string(),
            label: "kappa".to_string(),
            mass_level: 0.95,
            coverage_fraction: 0.5,
            outcomes: vec![outcome(1, 2.0, 1.0, 3.0), outcome(2, 7.5, 1.0, 4.0)],
        };

        assert_eq!(result.covered_count(), 1);
        assert_eq!(result.replicate_count(), 2);
        assert_eq!(result.percentage(), 50.0);
        assert_eq!(result.axis_max(), 7.5);
    }

    #[test]
    fn test_summary_lookup_and_threshold() {
        let make = |name: &str, fraction: f64| CoverageResult {
            parameter: name.to_string(),
            label: name.to_string(),
            mass_level: 0.95,
            coverage_fraction: fraction,
            outcomes: Vec::new(),
        };
        let summary = CoverageSummary {
            results: vec![make("kappa", 0.96), make("shape", 0.81)],
            failures: Vec::new(),
        };

        assert!(summary.get("kappa").is_some());
        assert!(summary.get("missing").is_none());
        let low = summary.below(90.0);
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].parameter, "shape");
    }

    #[test]
    fn test_truth_source_serde() {
        let toml_str = r#"
name = "phi.treeLength"
label = "tree length"
truth = { kind = "tree", statistic = "length" }
"#;
        let parameter: Parameter = toml::from_str(toml_str).unwrap();
        assert_eq!(
            parameter.truth,
            TruthSource::Tree {
                statistic: TreeStatistic::Length
            }
        );

        let bare: Parameter = toml::from_str("name = \"kappa\"").unwrap();
        assert_eq!(bare.truth, TruthSource::Log { column: None });
    }

    #[test]
    fn test_replicate_range() {
        let reps = ReplicateId::range(3);
        assert_eq!(reps, vec![ReplicateId(1), ReplicateId(2), ReplicateId(3)]);
        assert!(ReplicateId::range(0).is_empty());
    }
}

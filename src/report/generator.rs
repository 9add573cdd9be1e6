//! Coverage report generation.
//!
//! This module renders a [`Report`] as Markdown for reading, as JSON for
//! tooling, or as a long-format TSV that plotting scripts can consume
//! directly (one interval mark per row, colored by the `covered` column).

use crate::models::{CoverageResult, ParameterFailure, Report, ReportMetadata};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report, include_replicates: bool) -> String {
    let mut output = String::new();

    output.push_str(&format!("# Coverage Report: {}\n\n", report.metadata.title));
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_summary_section(
        &report.results,
        report.metadata.mass_level,
    ));
    output.push_str(&generate_failures_section(&report.failures));

    if include_replicates {
        output.push_str(&generate_replicates_section(&report.results));
    }

    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **HPD Mass:** {}%\n",
        format_percent(metadata.mass_level * 100.0)
    ));
    section.push_str(&format!("- **Replicates:** {}\n", metadata.replicate_count));
    section.push_str(&format!("- **Chains per Replicate:** {}\n", metadata.chain_count));
    section.push_str(&format!(
        "- **Parameters Analyzed:** {}\n",
        metadata.parameters_analyzed
    ));
    if metadata.parameters_failed > 0 {
        section.push_str(&format!(
            "- **Parameters Failed:** {}\n",
            metadata.parameters_failed
        ));
    }
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the per-parameter coverage table.
fn generate_summary_section(results: &[CoverageResult], mass_level: f64) -> String {
    let mut section = String::new();

    section.push_str("## Coverage\n\n");

    if results.is_empty() {
        section.push_str("No parameter could be evaluated.\n\n");
        return section;
    }

    section.push_str("| Parameter | Identifier | Coverage | Covered | Nominal |\n");
    section.push_str("|:---|:---|:---:|:---:|:---:|\n");

    let nominal = format_percent(mass_level * 100.0);
    for result in results {
        section.push_str(&format!(
            "| {} | `{}` | {:.2}% | {}/{} | {}% |\n",
            result.label,
            result.parameter,
            result.percentage(),
            result.covered_count(),
            result.replicate_count(),
            nominal
        ));
    }
    section.push('\n');

    section
}

/// Generate the section listing parameters that could not be evaluated.
fn generate_failures_section(failures: &[ParameterFailure]) -> String {
    if failures.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Failed Parameters\n\n");
    for failure in failures {
        section.push_str(&format!("- `{}`: {}\n", failure.parameter, failure.error));
    }
    section.push('\n');

    section
}

/// Generate one interval table per parameter.
fn generate_replicates_section(results: &[CoverageResult]) -> String {
    if results.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Intervals by Replicate\n\n");

    for result in results {
        section.push_str(&format!(
            "### {} ({:.2}% coverage)\n\n",
            result.label,
            result.percentage()
        ));
        section.push_str(&format!(
            "*Largest true value or upper bound: {}*\n\n",
            result.axis_max()
        ));
        section.push_str("| Replicate | True Value | Lower | Upper | Width | Covered |\n");
        section.push_str("|:---:|---:|---:|---:|---:|:---:|\n");

        for outcome in &result.outcomes {
            section.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} |\n",
                outcome.replicate,
                outcome.true_value,
                outcome.interval.lower,
                outcome.interval.upper,
                outcome.interval.width(),
                if outcome.covered { "yes" } else { "**no**" }
            ));
        }
        section.push('\n');
    }

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by hpdcov v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// `95` rather than `95.00000000000001`.
fn format_percent(value: f64) -> String {
    let rounded = format!("{:.4}", value);
    rounded
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Generate a long-format TSV with one row per parameter and replicate.
pub fn generate_tsv_report(report: &Report) -> String {
    let mut output = String::from("parameter\tlabel\treplicate\ttrue_value\tlower\tupper\tcovered\n");

    for result in &report.results {
        for outcome in &result.outcomes {
            output.push_str(&format!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
                result.parameter,
                result.label,
                outcome.replicate,
                outcome.true_value,
                outcome.interval.lower,
                outcome.interval.upper,
                outcome.covered
            ));
        }
    }

    output
}

//! Coverage aggregation across replicates.
//!
//! For every (parameter, replicate) pair the HPD interval of the pooled
//! posterior sample is compared with the true value; the per-parameter
//! coverage is the share of replicates whose interval contains it.

use super::error::{CoverageError, MissingDatum};
use super::hpd::{self, estimate};
use super::pooling::pool_chains;
use super::source::PosteriorSource;
use crate::models::{
    ChainId, CoverageResult, CoverageSummary, Parameter, ParameterFailure, ReplicateId,
    ReplicateOutcome,
};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use tracing::{debug, info, warn};

/// Values keyed by parameter name, then replicate.
pub type ByParameter<T> = HashMap<String, HashMap<ReplicateId, T>>;

/// Pooled posterior samples per (parameter, replicate).
pub type PooledSamples = ByParameter<Vec<f64>>;

/// True values per (parameter, replicate).
pub type TrueValues = ByParameter<f64>;

/// Compute coverage for every parameter over every replicate.
///
/// Results come back in the order of `parameters`, and each result's
/// outcomes in the order of `replicates`. The first error aborts.
pub fn aggregate(
    parameters: &[Parameter],
    replicates: &[ReplicateId],
    pooled_samples: &PooledSamples,
    true_values: &TrueValues,
    mass: f64,
) -> Result<Vec<CoverageResult>, CoverageError> {
    hpd::validate_mass(mass)?;

    parameters
        .iter()
        .map(|parameter| {
            let name = parameter.name.as_str();
            let samples = pooled_samples.get(name);
            let truths = true_values.get(name);

            let outcomes = replicates
                .iter()
                .map(|&replicate| {
                    let pooled = samples.and_then(|m| m.get(&replicate)).ok_or_else(|| {
                        CoverageError::missing(name, replicate, MissingDatum::PooledSample)
                    })?;
                    let true_value = truths.and_then(|m| m.get(&replicate)).ok_or_else(|| {
                        CoverageError::missing(name, replicate, MissingDatum::TrueValue)
                    })?;
                    replicate_outcome(name, replicate, pooled, *true_value, mass)
                })
                .collect::<Result<Vec<_>, _>>()?;

            reduce(parameter, mass, outcomes)
        })
        .collect()
}

/// Interval and covered flag of one replicate.
fn replicate_outcome(
    parameter: &str,
    replicate: ReplicateId,
    samples: &[f64],
    true_value: f64,
    mass: f64,
) -> Result<ReplicateOutcome, CoverageError> {
    if !true_value.is_finite() {
        return Err(CoverageError::invalid(
            "true value",
            format!("{} is not finite", true_value),
        )
        .at(parameter, replicate));
    }
    let interval = estimate(samples, mass).map_err(|e| e.at(parameter, replicate))?;
    let covered = interval.contains(true_value);

    debug!(
        "{} rep {}: true {} in {} -> {}",
        parameter, replicate, true_value, interval, covered
    );

    Ok(ReplicateOutcome {
        replicate,
        true_value,
        interval,
        covered,
    })
}

/// Reduce per-replicate outcomes to a coverage fraction.
fn reduce(
    parameter: &Parameter,
    mass: f64,
    outcomes: Vec<ReplicateOutcome>,
) -> Result<CoverageResult, CoverageError> {
    if outcomes.is_empty() {
        return Err(CoverageError::invalid(
            format!("parameter '{}'", parameter.name),
            "no replicates; coverage over an empty set is undefined",
        ));
    }

    let covered = outcomes.iter().filter(|o| o.covered).count();
    let coverage_fraction = covered as f64 / outcomes.len() as f64;

    Ok(CoverageResult {
        parameter: parameter.name.clone(),
        label: parameter.display_label().to_string(),
        mass_level: mass,
        coverage_fraction,
        outcomes,
    })
}

fn first_duplicate<T: Eq + Hash>(items: impl Iterator<Item = T>) -> Option<T> {
    let mut seen = HashSet::new();
    for item in items {
        if seen.contains(&item) {
            return Some(item);
        }
        seen.insert(item);
    }
    None
}

/// What to analyze, fixed at engine construction.
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    /// Target probability mass of each interval.
    pub mass_level: f64,
    /// Parameters, in report order.
    pub parameters: Vec<Parameter>,
    /// Replicates are numbered `1..=replicate_count`.
    pub replicate_count: u32,
    /// Chains pooled per replicate.
    pub chain_ids: Vec<ChainId>,
    /// Abort the whole run on the first failing parameter.
    pub strict: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            mass_level: hpd::DEFAULT_MASS,
            parameters: Vec::new(),
            replicate_count: 100,
            chain_ids: vec![ChainId::from("1"), ChainId::from("2")],
            strict: false,
        }
    }
}

/// Runs the pooling -> HPD -> coverage pipeline against a [`PosteriorSource`].
#[derive(Debug, Clone)]
pub struct CoverageEngine {
    settings: AnalysisSettings,
    replicates: Vec<ReplicateId>,
}

impl CoverageEngine {
    /// Create an engine, rejecting settings no run could succeed with.
    pub fn new(settings: AnalysisSettings) -> Result<Self, CoverageError> {
        hpd::validate_mass(settings.mass_level)?;

        if settings.replicate_count == 0 {
            return Err(CoverageError::invalid("settings", "replicate count must be at least 1"));
        }
        if settings.chain_ids.is_empty() {
            return Err(CoverageError::invalid("settings", "at least one chain is required"));
        }
        if settings.parameters.is_empty() {
            return Err(CoverageError::invalid("settings", "no parameters configured"));
        }

        if let Some(dup) = first_duplicate(settings.parameters.iter().map(|p| p.name.as_str())) {
            return Err(CoverageError::invalid(
                "settings",
                format!("parameter '{}' is listed twice", dup),
            ));
        }
        if let Some(dup) = first_duplicate(settings.chain_ids.iter()) {
            return Err(CoverageError::invalid(
                "settings",
                format!("chain '{}' is listed twice", dup),
            ));
        }

        let replicates = ReplicateId::range(settings.replicate_count);
        Ok(Self {
            settings,
            replicates,
        })
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Coverage of a single parameter over all configured replicates.
    ///
    /// Chains are pooled replicate by replicate, then the pooled samples go
    /// through [`aggregate`].
    pub fn evaluate_parameter<S: PosteriorSource + ?Sized>(
        &self,
        source: &S,
        parameter: &Parameter,
    ) -> Result<CoverageResult, CoverageError> {
        let name = parameter.name.as_str();

        let mut pooled = HashMap::with_capacity(self.replicates.len());
        let mut truths = HashMap::with_capacity(self.replicates.len());
        for &replicate in &self.replicates {
            let chains: Vec<(ChainId, Option<&[f64]>)> = self
                .settings
                .chain_ids
                .iter()
                .map(|chain| (chain.clone(), source.samples_of(name, replicate, chain)))
                .collect();
            pooled.insert(replicate, pool_chains(name, replicate, &chains)?);

            let true_value = source
                .true_value_of(name, replicate)
                .ok_or_else(|| CoverageError::missing(name, replicate, MissingDatum::TrueValue))?;
            truths.insert(replicate, true_value);
        }

        let pooled_samples = PooledSamples::from([(parameter.name.clone(), pooled)]);
        let true_values = TrueValues::from([(parameter.name.clone(), truths)]);

        aggregate(
            std::slice::from_ref(parameter),
            &self.replicates,
            &pooled_samples,
            &true_values,
            self.settings.mass_level,
        )?
        .pop()
        .ok_or_else(|| {
            CoverageError::invalid(format!("parameter '{}'", name), "no coverage result")
        })
    }

    /// Evaluate every configured parameter.
    ///
    /// In strict mode the first error is returned. Otherwise a failing
    /// parameter is recorded in `failures` with no partial numbers, and the
    /// run only fails when no parameter succeeds.
    pub fn run<S: PosteriorSource + ?Sized>(
        &self,
        source: &S,
    ) -> Result<CoverageSummary, CoverageError> {
        let mut summary = CoverageSummary::default();
        let mut first_error = None;

        for parameter in &self.settings.parameters {
            match self.evaluate_parameter(source, parameter) {
                Ok(result) => {
                    info!(
                        "{}: {:.2}% coverage ({}/{})",
                        result.label,
                        result.percentage(),
                        result.covered_count(),
                        result.replicate_count()
                    );
                    summary.results.push(result);
                }
                Err(e) if self.settings.strict => return Err(e),
                Err(e) => {
                    warn!("Skipping parameter '{}': {}", parameter.name, e);
                    summary.failures.push(ParameterFailure {
                        parameter: parameter.name.clone(),
                        error: e.to_string(),
                    });
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if summary.results.is_empty() => Err(e),
            _ => Ok(summary),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::source::DatasetTables;

    /// 100 replicates sharing the sample 0.00..0.99; replicates 1-95 have a
    /// true value inside the 95% interval, 96-100 one far outside.
    fn ninety_five_of_hundred() -> (PooledSamples, TrueValues) {
        let sample: Vec<f64> = (0..100).map(|i| f64::from(i) / 100.0).collect();
        let mut pooled = PooledSamples::new();
        let mut truths = TrueValues::new();
        for rep in 1..=100 {
            pooled
                .entry("kappa".to_string())
                .or_default()
                .insert(ReplicateId(rep), sample.clone());
            let truth = if rep <= 95 { 0.5 } else { 1000.0 };
            truths
                .entry("kappa".to_string())
                .or_default()
                .insert(ReplicateId(rep), truth);
        }
        (pooled, truths)
    }

    fn settings(parameters: Vec<Parameter>, replicate_count: u32) -> AnalysisSettings {
        AnalysisSettings {
            parameters,
            replicate_count,
            ..AnalysisSettings::default()
        }
    }

    #[test]
    fn test_aggregate_reports_exact_fraction() {
        let (pooled, truths) = ninety_five_of_hundred();
        let results = aggregate(
            &[Parameter::new("kappa")],
            &ReplicateId::range(100),
            &pooled,
            &truths,
            0.95,
        )
        .unwrap();

        assert_eq!(results.len(), 1);
        let kappa = &results[0];
        assert_eq!(kappa.coverage_fraction, 0.95);
        assert_eq!(kappa.covered_count(), 95);
        assert!(kappa.outcomes[..95].iter().all(|o| o.covered));
        assert!(kappa.outcomes[95..].iter().all(|o| !o.covered));
        assert_eq!(kappa.outcomes[0].replicate, ReplicateId(1));
        assert_eq!(kappa.outcomes[99].replicate, ReplicateId(100));
    }

    #[test]
    fn test_aggregate_bounds_are_inclusive() {
        let mut pooled = PooledSamples::new();
        let mut truths = TrueValues::new();
        pooled
            .entry("shape".to_string())
            .or_default()
            .insert(ReplicateId(1), vec![1.0, 2.0, 3.0, 4.0]);
        // floor(0.5 * 4) = 2 ranks: leftmost window [1, 3].
        truths
            .entry("shape".to_string())
            .or_default()
            .insert(ReplicateId(1), 3.0);

        let results = aggregate(
            &[Parameter::new("shape")],
            &[ReplicateId(1)],
            &pooled,
            &truths,
            0.5,
        )
        .unwrap();
        assert!(results[0].outcomes[0].covered);
        assert_eq!(results[0].coverage_fraction, 1.0);
    }

    #[test]
    fn test_aggregate_missing_true_value_names_replicate() {
        let (pooled, mut truths) = ninety_five_of_hundred();
        truths.get_mut("kappa").unwrap().remove(&ReplicateId(42));

        let err = aggregate(
            &[Parameter::new("kappa")],
            &ReplicateId::range(100),
            &pooled,
            &truths,
            0.95,
        )
        .unwrap_err();

        assert_eq!(
            err,
            CoverageError::MissingData {
                parameter: "kappa".to_string(),
                replicate: ReplicateId(42),
                missing: MissingDatum::TrueValue,
            }
        );
    }

    #[test]
    fn test_aggregate_missing_pooled_sample() {
        let (pooled, truths) = ninety_five_of_hundred();
        let err = aggregate(
            &[Parameter::new("kappa")],
            &ReplicateId::range(101),
            &pooled,
            &truths,
            0.95,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            CoverageError::MissingData {
                replicate: ReplicateId(101),
                missing: MissingDatum::PooledSample,
                ..
            }
        ));
    }

    #[test]
    fn test_aggregate_zero_replicates_is_invalid() {
        let (pooled, truths) = ninety_five_of_hundred();
        let err = aggregate(&[Parameter::new("kappa")], &[], &pooled, &truths, 0.95).unwrap_err();
        assert!(matches!(err, CoverageError::InvalidInput { .. }));
    }

    #[test]
    fn test_aggregate_rejects_bad_mass() {
        let (pooled, truths) = ninety_five_of_hundred();
        let err = aggregate(
            &[Parameter::new("kappa")],
            &[ReplicateId(1)],
            &pooled,
            &truths,
            1.0,
        )
        .unwrap_err();
        assert!(matches!(err, CoverageError::InvalidInput { .. }));
    }

    #[test]
    fn test_aggregate_rejects_non_finite_true_value() {
        let mut pooled = PooledSamples::new();
        let mut truths = TrueValues::new();
        for (rep, truth) in [(1, 2.0), (2, f64::NAN)] {
            pooled
                .entry("kappa".to_string())
                .or_default()
                .insert(ReplicateId(rep), vec![1.0, 2.0, 3.0]);
            truths
                .entry("kappa".to_string())
                .or_default()
                .insert(ReplicateId(rep), truth);
        }

        let err = aggregate(
            &[Parameter::new("kappa")],
            &ReplicateId::range(2),
            &pooled,
            &truths,
            0.95,
        )
        .unwrap_err();
        match err {
            CoverageError::InvalidInput { context, reason } => {
                assert!(context.contains("replicate 2"), "{context}");
                assert!(reason.contains("not finite"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_aggregate_preserves_caller_order() {
        let mut pooled = PooledSamples::new();
        let mut truths = TrueValues::new();
        for name in ["b", "a"] {
            for rep in [3, 1] {
                pooled
                    .entry(name.to_string())
                    .or_default()
                    .insert(ReplicateId(rep), vec![1.0, 2.0]);
                truths
                    .entry(name.to_string())
                    .or_default()
                    .insert(ReplicateId(rep), 1.5);
            }
        }

        let results = aggregate(
            &[Parameter::new("b"), Parameter::new("a")],
            &[ReplicateId(3), ReplicateId(1)],
            &pooled,
            &truths,
            0.9,
        )
        .unwrap();

        let names: Vec<_> = results.iter().map(|r| r.parameter.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        let reps: Vec<_> = results[0].outcomes.iter().map(|o| o.replicate).collect();
        assert_eq!(reps, vec![ReplicateId(3), ReplicateId(1)]);
    }

    fn two_chain_tables() -> DatasetTables {
        let mut tables = DatasetTables::new();
        for rep in 1..=4 {
            let rep = ReplicateId(rep);
            tables.insert_samples("kappa", rep, "1".into(), vec![1.0, 2.0, 3.0]);
            tables.insert_samples("kappa", rep, "2".into(), vec![4.0, 5.0, 6.0]);
            tables.insert_true_value("kappa", rep, if rep.0 == 4 { 99.0 } else { 3.5 });

            tables.insert_samples("shape", rep, "1".into(), vec![0.1, 0.2]);
            tables.insert_true_value("shape", rep, 0.15);
        }
        tables
    }

    #[test]
    fn test_engine_pools_chains() {
        let engine = CoverageEngine::new(settings(vec![Parameter::new("kappa")], 4)).unwrap();
        let result = engine
            .evaluate_parameter(&two_chain_tables(), &Parameter::new("kappa"))
            .unwrap();

        // Pooled [1..6], floor(0.95 * 6) = 5 ranks, so the interval is [1, 6].
        let interval = result.outcomes[0].interval;
        assert_eq!((interval.lower, interval.upper), (1.0, 6.0));
        assert_eq!(result.coverage_fraction, 0.75);
    }

    #[test]
    fn test_engine_isolates_failing_parameter() {
        let engine = CoverageEngine::new(settings(
            vec![
                Parameter::new("kappa").with_label("transition/transversion"),
                Parameter::new("shape"),
            ],
            4,
        ))
        .unwrap();

        let summary = engine.run(&two_chain_tables()).unwrap();
        assert_eq!(summary.results.len(), 1);
        assert_eq!(summary.results[0].label, "transition/transversion");
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].parameter, "shape");
        assert!(summary.failures[0].error.contains("chain 2"));
    }

    #[test]
    fn test_engine_strict_aborts() {
        let mut strict = settings(vec![Parameter::new("kappa"), Parameter::new("shape")], 4);
        strict.strict = true;
        let engine = CoverageEngine::new(strict).unwrap();

        let err = engine.run(&two_chain_tables()).unwrap_err();
        assert_eq!(
            err,
            CoverageError::MissingData {
                parameter: "shape".to_string(),
                replicate: ReplicateId(1),
                missing: MissingDatum::Chain("2".into()),
            }
        );
    }

    #[test]
    fn test_engine_fails_when_nothing_succeeds() {
        let engine = CoverageEngine::new(settings(vec![Parameter::new("shape")], 4)).unwrap();
        let err = engine.run(&two_chain_tables()).unwrap_err();
        assert!(matches!(err, CoverageError::MissingData { .. }));
    }

    #[test]
    fn test_engine_missing_true_value() {
        let mut tables = two_chain_tables();
        tables.insert_samples("freq", ReplicateId(1), "1".into(), vec![0.25]);
        tables.insert_samples("freq", ReplicateId(1), "2".into(), vec![0.26]);

        let engine = CoverageEngine::new(settings(vec![Parameter::new("freq")], 1)).unwrap();
        let err = engine
            .evaluate_parameter(&tables, &Parameter::new("freq"))
            .unwrap_err();
        assert_eq!(
            err,
            CoverageError::missing("freq", ReplicateId(1), MissingDatum::TrueValue)
        );
    }

    #[test]
    fn test_engine_rejects_non_finite_true_value() {
        let mut tables = two_chain_tables();
        tables.insert_true_value("kappa", ReplicateId(3), f64::INFINITY);

        let engine = CoverageEngine::new(settings(vec![Parameter::new("kappa")], 4)).unwrap();
        let err = engine
            .evaluate_parameter(&tables, &Parameter::new("kappa"))
            .unwrap_err();
        match err {
            CoverageError::InvalidInput { context, .. } => {
                assert!(context.contains("parameter 'kappa', replicate 3"), "{context}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_engine_rejects_invalid_settings() {
        let kappa = || vec![Parameter::new("kappa")];

        let mut bad_mass = settings(kappa(), 4);
        bad_mass.mass_level = 0.0;
        assert!(CoverageEngine::new(bad_mass).is_err());

        assert!(CoverageEngine::new(settings(kappa(), 0)).is_err());
        assert!(CoverageEngine::new(settings(Vec::new(), 4)).is_err());

        let mut no_chains = settings(kappa(), 4);
        no_chains.chain_ids.clear();
        assert!(CoverageEngine::new(no_chains).is_err());

        let dup = settings(vec![Parameter::new("kappa"), Parameter::new("kappa")], 4);
        assert!(CoverageEngine::new(dup).is_err());

        let mut dup_chain = settings(kappa(), 4);
        dup_chain.chain_ids = vec!["1".into(), "1".into()];
        assert!(CoverageEngine::new(dup_chain).is_err());
    }
}

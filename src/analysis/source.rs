//! Data access seam between the engine and whatever loads the inputs.

use crate::models::{ChainId, ReplicateId};
use std::collections::HashMap;

/// Supplies true values and per-chain posterior samples.
///
/// The engine only talks to this trait, so it is independent of any file
/// format. `None` means the datum is absent.
pub trait PosteriorSource {
    /// True value of `parameter` in `replicate`.
    fn true_value_of(&self, parameter: &str, replicate: ReplicateId) -> Option<f64>;

    /// Posterior draws of `parameter` in `replicate` from `chain`.
    fn samples_of(&self, parameter: &str, replicate: ReplicateId, chain: &ChainId)
        -> Option<&[f64]>;
}

/// In-memory tables of true values and samples.
#[derive(Debug, Clone, Default)]
pub struct DatasetTables {
    true_values: HashMap<String, HashMap<ReplicateId, f64>>,
    samples: HashMap<String, HashMap<(ReplicateId, ChainId), Vec<f64>>>,
}

impl DatasetTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the true value of a parameter; a later insert replaces it.
    pub fn insert_true_value(&mut self, parameter: &str, replicate: ReplicateId, value: f64) {
        self.true_values
            .entry(parameter.to_string())
            .or_default()
            .insert(replicate, value);
    }

    /// Record the draws of one chain; a later insert replaces them.
    pub fn insert_samples(
        &mut self,
        parameter: &str,
        replicate: ReplicateId,
        chain: ChainId,
        samples: Vec<f64>,
    ) {
        self.samples
            .entry(parameter.to_string())
            .or_default()
            .insert((replicate, chain), samples);
    }

    /// Merge another table into this one, the other side winning on conflicts.
    pub fn merge(&mut self, other: DatasetTables) {
        for (parameter, values) in other.true_values {
            self.true_values.entry(parameter).or_default().extend(values);
        }
        for (parameter, samples) in other.samples {
            self.samples.entry(parameter).or_default().extend(samples);
        }
    }

    /// Number of stored sample sequences.
    pub fn sequence_count(&self) -> usize {
        self.samples.values().map(HashMap::len).sum()
    }

    /// Number of stored true values.
    pub fn true_value_count(&self) -> usize {
        self.true_values.values().map(HashMap::len).sum()
    }
}

impl PosteriorSource for DatasetTables {
    fn true_value_of(&self, parameter: &str, replicate: ReplicateId) -> Option<f64> {
        self.true_values.get(parameter)?.get(&replicate).copied()
    }

    fn samples_of(
        &self,
        parameter: &str,
        replicate: ReplicateId,
        chain: &ChainId,
    ) -> Option<&[f64]> {
        self.samples
            .get(parameter)?
            .get(&(replicate, chain.clone()))
            .map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_absence() {
        let mut tables = DatasetTables::new();
        tables.insert_true_value("kappa", ReplicateId(1), 2.5);
        tables.insert_samples("kappa", ReplicateId(1), "1".into(), vec![1.0, 2.0]);

        assert_eq!(tables.true_value_of("kappa", ReplicateId(1)), Some(2.5));
        assert_eq!(tables.true_value_of("kappa", ReplicateId(2)), None);
        assert_eq!(tables.true_value_of("shape", ReplicateId(1)), None);
        assert_eq!(
            tables.samples_of("kappa", ReplicateId(1), &"1".into()),
            Some(&[1.0, 2.0][..])
        );
        assert_eq!(tables.samples_of("kappa", ReplicateId(1), &"2".into()), None);
    }

    #[test]
    fn test_merge() {
        let mut left = DatasetTables::new();
        left.insert_true_value("kappa", ReplicateId(1), 1.0);
        left.insert_samples("kappa", ReplicateId(1), "1".into(), vec![1.0]);

        let mut right = DatasetTables::new();
        right.insert_true_value("kappa", ReplicateId(2), 2.0);
        right.insert_samples("kappa", ReplicateId(1), "2".into(), vec![2.0]);

        left.merge(right);
        assert_eq!(left.true_value_count(), 2);
        assert_eq!(left.sequence_count(), 2);
        assert_eq!(left.true_value_of("kappa", ReplicateId(2)), Some(2.0));
    }
}

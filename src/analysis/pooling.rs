//! Pooling of posterior samples across independent chains.

use super::error::{CoverageError, MissingDatum};
use crate::models::{ChainId, ReplicateId};

/// Concatenate the sample sequences of every chain of one replicate.
///
/// Chains are appended in the order given. A chain without a sequence is
/// `MissingData` and an empty sequence is `InvalidInput`; neither is skipped,
/// since dropping a chain would silently change the interval.
pub fn pool_chains(
    parameter: &str,
    replicate: ReplicateId,
    chains: &[(ChainId, Option<&[f64]>)],
) -> Result<Vec<f64>, CoverageError> {
    if chains.is_empty() {
        return Err(CoverageError::invalid(
            format!("parameter '{}', replicate {}", parameter, replicate),
            "no chains configured",
        ));
    }

    let total: usize = chains
        .iter()
        .map(|(_, samples)| samples.map_or(0, <[f64]>::len))
        .sum();
    let mut pooled = Vec::with_capacity(total);

    for (chain, samples) in chains {
        let samples = samples.ok_or_else(|| {
            CoverageError::missing(parameter, replicate, MissingDatum::Chain(chain.clone()))
        })?;
        if samples.is_empty() {
            return Err(CoverageError::invalid(
                format!(
                    "parameter '{}', replicate {}, chain {}",
                    parameter, replicate, chain
                ),
                "sample sequence is empty",
            ));
        }
        pooled.extend_from_slice(samples);
    }

    Ok(pooled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(mut v: Vec<f64>) -> Vec<f64> {
        v.sort_by(|a, b| a.total_cmp(b));
        v
    }

    #[test]
    fn test_pools_every_value_once() {
        let first = [1.0, 2.0];
        let second = [3.0, 4.0];
        let pooled = pool_chains(
            "kappa",
            ReplicateId(1),
            &[("1".into(), Some(&first[..])), ("2".into(), Some(&second[..]))],
        )
        .unwrap();

        assert_eq!(sorted(pooled), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_keeps_duplicates_across_chains() {
        let first = [1.5, 1.5];
        let second = [1.5];
        let pooled = pool_chains(
            "shape",
            ReplicateId(4),
            &[("a".into(), Some(&first[..])), ("b".into(), Some(&second[..]))],
        )
        .unwrap();

        assert_eq!(pooled, vec![1.5, 1.5, 1.5]);
    }

    #[test]
    fn test_missing_chain_is_missing_data() {
        let first = [1.0];
        let err = pool_chains(
            "kappa",
            ReplicateId(9),
            &[("1".into(), Some(&first[..])), ("2".into(), None)],
        )
        .unwrap_err();

        assert_eq!(
            err,
            CoverageError::MissingData {
                parameter: "kappa".to_string(),
                replicate: ReplicateId(9),
                missing: MissingDatum::Chain("2".into()),
            }
        );
    }

    #[test]
    fn test_empty_chain_is_invalid_input() {
        let first = [1.0];
        let empty: [f64; 0] = [];
        let err = pool_chains(
            "kappa",
            ReplicateId(2),
            &[("1".into(), Some(&first[..])), ("2".into(), Some(&empty[..]))],
        )
        .unwrap_err();

        match err {
            CoverageError::InvalidInput { context, .. } => assert!(context.contains("chain 2")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_no_chains_is_invalid_input() {
        let err = pool_chains("kappa", ReplicateId(1), &[]).unwrap_err();
        assert!(matches!(err, CoverageError::InvalidInput { .. }));
    }
}

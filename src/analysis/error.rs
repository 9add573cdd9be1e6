//! Error taxonomy of the coverage engine.

use crate::models::{ChainId, ReplicateId};
use std::fmt;
use thiserror::Error;

/// The datum that was absent for a (parameter, replicate) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingDatum {
    /// No true value was supplied.
    TrueValue,
    /// No pooled sample was supplied.
    PooledSample,
    /// A configured chain has no sample sequence.
    Chain(ChainId),
}

impl fmt::Display for MissingDatum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingDatum::TrueValue => write!(f, "true value"),
            MissingDatum::PooledSample => write!(f, "pooled sample"),
            MissingDatum::Chain(chain) => write!(f, "samples of chain {}", chain),
        }
    }
}

/// Errors raised by the estimator, the pooling step and the aggregator.
///
/// Both variants mean malformed input; nothing is retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoverageError {
    /// Input violates a precondition (empty samples, bad mass, non-finite values...).
    #[error("invalid input ({context}): {reason}")]
    InvalidInput { context: String, reason: String },

    /// Required data is absent for a parameter/replicate pair.
    #[error("missing {missing} for parameter '{parameter}', replicate {replicate}")]
    MissingData {
        parameter: String,
        replicate: ReplicateId,
        missing: MissingDatum,
    },
}

impl CoverageError {
    pub fn invalid(context: impl Into<String>, reason: impl Into<String>) -> Self {
        CoverageError::InvalidInput {
            context: context.into(),
            reason: reason.into(),
        }
    }

    pub fn missing(parameter: &str, replicate: ReplicateId, missing: MissingDatum) -> Self {
        CoverageError::MissingData {
            parameter: parameter.to_string(),
            replicate,
            missing,
        }
    }

    /// Prefixes the context of an `InvalidInput` with the pair it occurred for.
    pub(crate) fn at(self, parameter: &str, replicate: ReplicateId) -> Self {
        match self {
            CoverageError::InvalidInput { context, reason } => CoverageError::InvalidInput {
                context: format!(
                    "parameter '{}', replicate {}: {}",
                    parameter, replicate, context
                ),
                reason,
            },
            other => other,
        }
    }
}

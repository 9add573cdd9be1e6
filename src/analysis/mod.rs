//! Coverage analysis modules.
//!
//! Pooling of chains, the HPD estimator and the coverage aggregator. Nothing
//! here performs I/O; inputs arrive through [`PosteriorSource`].

pub mod coverage;
pub mod error;
pub mod hpd;
pub mod pooling;
pub mod source;

pub use coverage::{aggregate, AnalysisSettings, CoverageEngine, PooledSamples, TrueValues};
pub use error::{CoverageError, MissingDatum};
pub use hpd::{estimate, DEFAULT_MASS};
pub use pooling::pool_chains;
pub use source::{DatasetTables, PosteriorSource};

//! Input loading for the coverage engine.
//!
//! Parses posterior trace logs and generating trees and binds them to
//! replicates and chains through path templates.

pub mod dataset;
pub mod newick;
pub mod tracelog;

pub use dataset::{DatasetLoader, LoadConfig};

//! Common types for the Rook operators: cluster topology, naming, errors, and utilities

#![deny(missing_docs)]

pub mod error;
pub mod k8s;
pub mod kube_utils;
pub mod mon;
pub mod retry;

pub use error::Error;
pub use mon::ClusterTopology;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

//! MDS reconcile errors
//!
//! One variant per step so the caller can tell how far a failed `start` got.
//! Partial progress (a keyring stored, no deployment yet) is fine: the next
//! call picks up from there.

/// Failure of one step of the MDS reconcile
#[derive(Debug, thiserror::Error)]
pub enum MdsError {
    /// Topology or CLI configuration is unusable
    #[error("config error: {0}")]
    Config(String),

    /// Could not open an admin session to the storage cluster
    #[error("failed to connect to cluster as admin: {0}")]
    Session(String),

    /// Could not look up, issue or store the MDS keyring
    #[error("failed to create mds keyring: {0}")]
    Identity(String),

    /// Could not create the MDS deployment
    #[error("failed to create mds deployment: {0}")]
    Deployment(String),
}

impl MdsError {
    /// Whether re-running `start` might succeed without a config change
    pub fn is_retryable(&self) -> bool {
        !matches!(self, MdsError::Config(_))
    }
}

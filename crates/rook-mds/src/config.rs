//! Deployment target and the fixed identifiers of the MDS workload

use serde::{Deserialize, Serialize};

/// Name shared by the MDS secret, deployment, container and `app` label
pub const APP_NAME: &str = "mds";

/// Key of the keyring entry inside the MDS secret
pub const KEYRING_KEY: &str = "keyring";

/// Daemon id of the single MDS instance
pub const MDS_DAEMON_ID: &str = "mds1";

/// Env var the MDS reads its keyring from
pub const MDS_KEYRING_ENV: &str = "ROOKD_MDS_KEYRING";

/// Default namespace for Rook resources
pub const DEFAULT_NAMESPACE: &str = "rook";

/// Where and how the MDS is deployed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentTarget {
    /// Namespace holding the secret and the deployment
    pub namespace: String,
    /// Daemon image tag
    pub version: String,
    /// Desired replica count, passed through unchanged
    #[serde(default = "default_replicas")]
    pub replicas: i32,
}

fn default_replicas() -> i32 {
    1
}

impl DeploymentTarget {
    /// Target with a single replica
    pub fn new(namespace: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            version: version.into(),
            replicas: default_replicas(),
        }
    }

    /// Override the replica count
    pub fn with_replicas(mut self, replicas: i32) -> Self {
        self.replicas = replicas;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replicas_default_to_one() {
        assert_eq!(DeploymentTarget::new("rook", "v1").replicas, 1);

        let parsed: DeploymentTarget =
            serde_json::from_str(r#"{"namespace":"rook","version":"v1"}"#).unwrap();
        assert_eq!(parsed, DeploymentTarget::new("rook", "v1"));
    }

    #[test]
    fn replicas_can_be_overridden() {
        let target = DeploymentTarget::new("rook", "v1").with_replicas(3);
        assert_eq!(target.replicas, 3);
    }
}

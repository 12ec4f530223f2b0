//! Get-or-create of the MDS keyring secret
//!
//! The keyring is issued by the storage cluster (`auth get-or-create-key`)
//! and stored once in the `mds` secret. An existing secret is never rewritten
//! and never causes a round trip to the cluster; there is no rotation here.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{info, warn};

use rook_common::kube_utils::CreateOutcome;

use crate::admin::AdminConnection;
use crate::client::MdsKubeClient;
use crate::config::{APP_NAME, KEYRING_KEY};
use crate::error::MdsError;

/// How the keyring secret came to exist during this reconcile
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyringOrigin {
    /// Found on lookup; the cluster was not contacted
    Existing,
    /// Issued and stored by this call
    Created,
    /// Issued by this call, but another reconciler stored its secret first
    CreatedConcurrently,
}

/// Where the daemon's keyring lives. Holds a reference, never the key itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// Daemon id the keyring authenticates
    pub daemon_id: String,
    /// Secret holding the keyring
    pub secret_name: String,
    /// Key of the keyring entry in the secret
    pub secret_key: String,
    /// How the secret came to exist
    pub origin: KeyringOrigin,
}

impl Identity {
    fn new(daemon_id: &str, origin: KeyringOrigin) -> Self {
        Self {
            daemon_id: daemon_id.to_string(),
            secret_name: APP_NAME.to_string(),
            secret_key: KEYRING_KEY.to_string(),
            origin,
        }
    }

    /// Reference to an already stored keyring for `daemon_id`
    pub fn existing(daemon_id: &str) -> Self {
        Self::new(daemon_id, KeyringOrigin::Existing)
    }
}

/// Cluster entity name of an MDS daemon
pub fn mds_entity(daemon_id: &str) -> String {
    format!("mds.{}", daemon_id)
}

/// Capabilities granted to an MDS key, as `service, capability` pairs
pub fn mds_caps() -> Vec<String> {
    ["osd", "allow *", "mds", "allow", "mon", "allow profile mds"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// The `mds` secret holding a single keyring entry
pub fn keyring_secret(namespace: &str, keyring: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(APP_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        string_data: Some(BTreeMap::from([(
            KEYRING_KEY.to_string(),
            keyring.to_string(),
        )])),
        ..Default::default()
    }
}

/// Ensures the MDS keyring secret exists in one namespace
pub struct IdentityProvisioner {
    kube: Arc<dyn MdsKubeClient>,
    namespace: String,
}

impl IdentityProvisioner {
    /// Provisioner for `namespace`
    pub fn new(kube: Arc<dyn MdsKubeClient>, namespace: impl Into<String>) -> Self {
        Self {
            kube,
            namespace: namespace.into(),
        }
    }

    /// Make sure the keyring for `daemon_id` is stored, issuing it through
    /// `session` only when the secret does not exist yet.
    pub async fn ensure(
        &self,
        session: &dyn AdminConnection,
        daemon_id: &str,
    ) -> Result<Identity, MdsError> {
        let existing = self
            .kube
            .get_secret(&self.namespace, APP_NAME)
            .await
            .map_err(|e| MdsError::Identity(format!("failed to get mds secrets. {}", e)))?;

        if existing.is_some() {
            info!(namespace = %self.namespace, "the mds keyring was already generated");
            return Ok(Identity::existing(daemon_id));
        }

        let keyring = session
            .auth_get_or_create_key(&mds_entity(daemon_id), &mds_caps())
            .await
            .map_err(|e| MdsError::Identity(format!("failed to issue mds key. {}", e)))?;

        let secret = keyring_secret(&self.namespace, &keyring);
        let outcome = self
            .kube
            .create_secret(&self.namespace, &secret)
            .await
            .map_err(|e| MdsError::Identity(format!("failed to save mds secrets. {}", e)))?;

        let origin = match outcome {
            CreateOutcome::Created => {
                info!(namespace = %self.namespace, daemon = %daemon_id, "stored mds keyring");
                KeyringOrigin::Created
            }
            CreateOutcome::AlreadyExists => {
                // Content of the winning secret is not compared with ours.
                warn!(
                    namespace = %self.namespace,
                    daemon = %daemon_id,
                    "mds keyring secret was created concurrently, keeping the existing one"
                );
                KeyringOrigin::CreatedConcurrently
            }
        };

        Ok(Identity::new(daemon_id, origin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::MockAdminConnection;
    use crate::client::MockMdsKubeClient;
    use mockall::predicate::eq;
    use rook_common::Error;

    fn not_found_then(
        create: impl Fn() -> Result<CreateOutcome, Error> + Send + 'static,
    ) -> MockMdsKubeClient {
        let mut kube = MockMdsKubeClient::new();
        kube.expect_get_secret()
            .with(eq("rook"), eq("mds"))
            .times(1)
            .returning(|_, _| Ok(None));
        kube.expect_create_secret()
            .times(1)
            .withf(|ns, secret| {
                ns == "rook"
                    && secret.metadata.name.as_deref() == Some("mds")
                    && secret
                        .string_data
                        .as_ref()
                        .and_then(|d| d.get("keyring"))
                        .map(String::as_str)
                        == Some("AQBmds==")
            })
            .returning(move |_, _| create());
        kube
    }

    fn issuing_session() -> MockAdminConnection {
        let mut session = MockAdminConnection::new();
        session
            .expect_auth_get_or_create_key()
            .withf(|entity, caps| entity == "mds.mds1" && caps == mds_caps().as_slice())
            .times(1)
            .returning(|_, _| Ok("AQBmds==".to_string()));
        session
    }

    #[tokio::test]
    async fn existing_secret_is_not_reissued() {
        let mut kube = MockMdsKubeClient::new();
        kube.expect_get_secret()
            .times(1)
            .returning(|_, _| Ok(Some(keyring_secret("rook", "AQBold=="))));
        // No expectations: any call to the session or create_secret panics.
        let session = MockAdminConnection::new();

        let provisioner = IdentityProvisioner::new(Arc::new(kube), "rook");
        let identity = provisioner.ensure(&session, "mds1").await.unwrap();

        assert_eq!(identity, Identity::existing("mds1"));
    }

    #[tokio::test]
    async fn missing_secret_is_issued_and_stored() {
        let kube = not_found_then(|| Ok(CreateOutcome::Created));
        let session = issuing_session();

        let provisioner = IdentityProvisioner::new(Arc::new(kube), "rook");
        let identity = provisioner.ensure(&session, "mds1").await.unwrap();

        assert_eq!(identity.origin, KeyringOrigin::Created);
        assert_eq!(identity.secret_name, "mds");
        assert_eq!(identity.secret_key, "keyring");
    }

    #[tokio::test]
    async fn concurrent_creation_is_benign() {
        let kube = not_found_then(|| Ok(CreateOutcome::AlreadyExists));
        let session = issuing_session();

        let provisioner = IdentityProvisioner::new(Arc::new(kube), "rook");
        let identity = provisioner.ensure(&session, "mds1").await.unwrap();

        assert_eq!(identity.origin, KeyringOrigin::CreatedConcurrently);
    }

    #[tokio::test]
    async fn lookup_failure_is_fatal_and_skips_the_cluster() {
        let mut kube = MockMdsKubeClient::new();
        kube.expect_get_secret()
            .times(1)
            .returning(|_, _| Err(Error::internal("apiserver unavailable")));
        let session = MockAdminConnection::new();

        let provisioner = IdentityProvisioner::new(Arc::new(kube), "rook");
        let err = provisioner.ensure(&session, "mds1").await.unwrap_err();

        assert!(matches!(err, MdsError::Identity(_)));
        assert!(err.to_string().contains("failed to get mds secrets"));
    }

    #[tokio::test]
    async fn issue_failure_stores_nothing() {
        let mut kube = MockMdsKubeClient::new();
        kube.expect_get_secret().returning(|_, _| Ok(None));
        let mut session = MockAdminConnection::new();
        session
            .expect_auth_get_or_create_key()
            .times(1)
            .returning(|_, _| Err(Error::command("ceph auth get-or-create-key", "EACCES")));

        let provisioner = IdentityProvisioner::new(Arc::new(kube), "rook");
        let err = provisioner.ensure(&session, "mds1").await.unwrap_err();

        assert!(matches!(err, MdsError::Identity(_)));
        assert!(err.to_string().contains("EACCES"));
    }

    #[tokio::test]
    async fn store_failure_is_an_identity_error() {
        let kube = not_found_then(|| Err(Error::internal("etcd timeout")));
        let session = issuing_session();

        let provisioner = IdentityProvisioner::new(Arc::new(kube), "rook");
        let err = provisioner.ensure(&session, "mds1").await.unwrap_err();

        assert!(err.to_string().contains("failed to save mds secrets"));
    }

    #[test]
    fn entity_and_caps() {
        assert_eq!(mds_entity("mds1"), "mds.mds1");
        assert_eq!(
            mds_caps(),
            vec!["osd", "allow *", "mds", "allow", "mon", "allow profile mds"]
        );
    }
}

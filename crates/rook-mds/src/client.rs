//! Kubernetes seam for the MDS reconcile
//!
//! The reconcile only ever reads one secret and creates a secret and a
//! deployment, so the trait is kept to exactly those calls. Not-found and
//! already-exists come back as values; every other API failure is an error.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use rook_common::kube_utils::{self, CreateOutcome};
use rook_common::Error;

/// Trait abstracting the Kubernetes operations the MDS reconcile needs
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MdsKubeClient: Send + Sync {
    /// Get a Secret, `None` if it does not exist
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error>;

    /// Create a Secret, never touching an existing one
    async fn create_secret(&self, namespace: &str, secret: &Secret)
        -> Result<CreateOutcome, Error>;

    /// Create a Deployment, never touching an existing one
    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<CreateOutcome, Error>;
}

/// Real Kubernetes client implementation
pub struct MdsKubeClientImpl {
    client: Client,
}

impl MdsKubeClientImpl {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MdsKubeClient for MdsKubeClientImpl {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        kube_utils::get_opt(&api, name).await
    }

    async fn create_secret(
        &self,
        namespace: &str,
        secret: &Secret,
    ) -> Result<CreateOutcome, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let outcome = kube_utils::create_if_absent(&api, secret).await?;
        debug!(namespace = %namespace, ?outcome, "create secret");
        Ok(outcome)
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<CreateOutcome, Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let outcome = kube_utils::create_if_absent(&api, deployment).await?;
        debug!(namespace = %namespace, ?outcome, "create deployment");
        Ok(outcome)
    }
}

//! Shared Kubernetes utilities using kube-rs
//!
//! Client construction plus the get-or-create primitives the operators build
//! their idempotent reconcile steps on. "Not found" and "already exists" are
//! surfaced as values, not errors, so callers branch on them explicitly.

use std::fmt::Debug;
use std::path::Path;
use std::time::Duration;

use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::Error;

/// Default connect timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a create call against the API server
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The object was created by this call
    Created,
    /// An object with the same name was already present; nothing was changed
    AlreadyExists,
}

/// Whether a kube error is the API server's 404
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// Whether a kube error is the API server's 409 on create
pub fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}

/// Get an object, mapping 404 to `None`
pub async fn get_opt<K>(api: &Api<K>, name: &str) -> Result<Option<K>, Error>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    match api.get(name).await {
        Ok(obj) => Ok(Some(obj)),
        Err(e) if is_not_found(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Create an object, mapping 409 to [`CreateOutcome::AlreadyExists`].
///
/// Never updates an existing object.
pub async fn create_if_absent<K>(api: &Api<K>, obj: &K) -> Result<CreateOutcome, Error>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Debug,
{
    match api.create(&PostParams::default(), obj).await {
        Ok(_) => Ok(CreateOutcome::Created),
        Err(e) if is_already_exists(&e) => {
            debug!(
                name = obj.meta().name.as_deref().unwrap_or_default(),
                "object already exists, leaving it untouched"
            );
            Ok(CreateOutcome::AlreadyExists)
        }
        Err(e) => Err(e.into()),
    }
}

/// Read a UTF-8 value from a secret key
pub async fn get_secret_string(
    client: &Client,
    namespace: &str,
    name: &str,
    key: &str,
) -> Result<String, Error> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);

    let secret = secrets.get(name).await.map_err(|e| {
        Error::internal_with_context(
            "get_secret_string",
            format!("failed to get secret {}/{}: {}", namespace, name, e),
        )
    })?;

    let bytes = secret
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .ok_or_else(|| {
            Error::internal_with_context(
                "get_secret_string",
                format!("secret {}/{} missing key {}", namespace, name, key),
            )
        })?;

    String::from_utf8(bytes.0.clone()).map_err(|e| {
        Error::serialization_for_kind(
            "Secret",
            format!("{}/{} key {} is not UTF-8: {}", namespace, name, key, e),
        )
    })
}

/// Create a kube client from optional kubeconfig path with default timeouts
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    create_client_with_timeout(kubeconfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).await
}

/// Create a kube client from optional kubeconfig path with custom timeouts
pub async fn create_client_with_timeout(
    kubeconfig: Option<&Path>,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context(
                    "create_client",
                    format!("failed to read kubeconfig {}: {}", path.display(), e),
                )
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::internal_with_context(
                        "create_client",
                        format!("failed to load kubeconfig: {}", e),
                    )
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::internal_with_context("create_client", format!("failed to infer config: {}", e))
        })?,
    };
    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);
    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "test".to_string(),
            reason: "Test".to_string(),
            code,
        })
    }

    #[test]
    fn not_found_is_only_404() {
        assert!(is_not_found(&api_error(404)));
        assert!(!is_not_found(&api_error(409)));
        assert!(!is_not_found(&api_error(500)));
    }

    #[test]
    fn already_exists_is_only_409() {
        assert!(is_already_exists(&api_error(409)));
        assert!(!is_already_exists(&api_error(404)));
        assert!(!is_already_exists(&api_error(422)));
    }

    #[tokio::test]
    async fn missing_kubeconfig_is_an_internal_error() {
        let err = create_client(Some(Path::new("/nonexistent/rook/kubeconfig")))
            .await
            .err()
            .expect("kubeconfig is missing");
        assert_eq!(err.context(), Some("create_client"));
        assert!(err.to_string().contains("failed to read kubeconfig"));
    }
}

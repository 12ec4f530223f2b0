//! Kubernetes naming shared by every Rook daemon workload
//!
//! Label keys, the data directory layout, image naming, and the env bindings
//! to the cluster-wide secrets written when the monitors were bootstrapped.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EnvVar, EnvVarSource, SecretKeySelector};

/// Directory inside daemon containers holding config and local state
pub const DATA_DIR: &str = "/var/lib/rook";

/// Name of the volume mounted at [`DATA_DIR`]
pub const DATA_DIR_VOLUME: &str = "rook-data";

/// Label key carrying the daemon application name
pub const APP_ATTR: &str = "app";

/// Label key carrying the storage cluster name
pub const CLUSTER_ATTR: &str = "rook_cluster";

/// Repository daemon images are pulled from
pub const ROOK_IMAGE_REPOSITORY: &str = "quay.io/rook/rookd";

/// Secret written by the monitor bootstrap, holding cluster-wide keys
pub const MON_SECRET_NAME: &str = "mon";

/// Key in [`MON_SECRET_NAME`] holding the monitor secret
pub const MON_SECRET_KEY: &str = "mon-secret";

/// Key in [`MON_SECRET_NAME`] holding the `client.admin` key
pub const ADMIN_SECRET_KEY: &str = "admin-secret";

/// Env var daemons read the monitor secret from
pub const MON_SECRET_ENV: &str = "ROOKD_MON_SECRET";

/// Env var daemons read the admin secret from
pub const ADMIN_SECRET_ENV: &str = "ROOKD_ADMIN_SECRET";

/// Image reference for a daemon version tag
pub fn make_rook_image(version: &str) -> String {
    format!("{}:{}", ROOK_IMAGE_REPOSITORY, version)
}

/// Standard labels for a daemon of `app` in `cluster_name`
pub fn daemon_labels(app: &str, cluster_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_ATTR.to_string(), app.to_string()),
        (CLUSTER_ATTR.to_string(), cluster_name.to_string()),
    ])
}

/// Env var resolved from a secret key at container start.
///
/// The value never appears in the workload spec, so rotating the secret does
/// not require recomposing the workload.
pub fn secret_env_var(
    name: impl Into<String>,
    secret_name: impl Into<String>,
    key: impl Into<String>,
) -> EnvVar {
    EnvVar {
        name: name.into(),
        value: None,
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret_name.into(),
                key: key.into(),
                optional: None,
            }),
            ..Default::default()
        }),
    }
}

/// Binding of the monitor secret for daemon containers
pub fn mon_secret_env_var() -> EnvVar {
    secret_env_var(MON_SECRET_ENV, MON_SECRET_NAME, MON_SECRET_KEY)
}

/// Binding of the admin secret for daemon containers
pub fn admin_secret_env_var() -> EnvVar {
    secret_env_var(ADMIN_SECRET_ENV, MON_SECRET_NAME, ADMIN_SECRET_KEY)
}

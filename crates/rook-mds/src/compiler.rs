//! Composition of the MDS deployment
//!
//! Pure function of topology, target and identity. Every map in the output
//! is a `BTreeMap`, so serializing the same inputs twice gives identical bytes.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, PodSpec, PodTemplateSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use rook_common::k8s::{
    admin_secret_env_var, daemon_labels, make_rook_image, mon_secret_env_var, secret_env_var,
    DATA_DIR, DATA_DIR_VOLUME,
};
use rook_common::ClusterTopology;

use crate::config::{DeploymentTarget, APP_NAME, MDS_KEYRING_ENV};
use crate::keyring::Identity;

/// Path of the daemon binary inside the image
pub const ROOKD_BIN: &str = "/usr/bin/rookd";

/// Seconds to wait before starting the daemon.
///
/// Pod networking is frequently not ready when the container starts; starting
/// the daemon right away makes its first monitor connection flaky.
// TODO: replace with a readiness gate on the pod network once one exists.
pub const STARTUP_DELAY_SECS: u32 = 5;

/// Builds the desired MDS `Deployment`
#[derive(Clone, Copy, Debug, Default)]
pub struct WorkloadComposer;

impl WorkloadComposer {
    /// Compose the deployment for `identity` in `topology` at `target`
    pub fn build(
        &self,
        topology: &ClusterTopology,
        target: &DeploymentTarget,
        identity: &Identity,
    ) -> Deployment {
        let labels = daemon_labels(APP_NAME, &topology.name);

        let pod = PodTemplateSpec {
            metadata: Some(ObjectMeta {
                name: Some(APP_NAME.to_string()),
                labels: Some(labels.clone()),
                annotations: Some(BTreeMap::new()),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                containers: vec![self.container(topology, target, identity)],
                restart_policy: Some("Always".to_string()),
                volumes: Some(vec![Volume {
                    name: DATA_DIR_VOLUME.to_string(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
        };

        Deployment {
            metadata: ObjectMeta {
                name: Some(APP_NAME.to_string()),
                namespace: Some(target.namespace.clone()),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(target.replicas),
                selector: LabelSelector {
                    match_labels: Some(labels),
                    ..Default::default()
                },
                template: pod,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn container(
        &self,
        topology: &ClusterTopology,
        target: &DeploymentTarget,
        identity: &Identity,
    ) -> Container {
        Container {
            name: APP_NAME.to_string(),
            image: Some(make_rook_image(&target.version)),
            command: Some(vec![
                "/bin/sh".to_string(),
                "-c".to_string(),
                format!(
                    "sleep {}; {}",
                    STARTUP_DELAY_SECS,
                    mds_command(topology, &identity.daemon_id)
                ),
            ]),
            volume_mounts: Some(vec![VolumeMount {
                name: DATA_DIR_VOLUME.to_string(),
                mount_path: DATA_DIR.to_string(),
                ..Default::default()
            }]),
            env: Some(self.env(identity)),
            ..Default::default()
        }
    }

    fn env(&self, identity: &Identity) -> Vec<EnvVar> {
        vec![
            secret_env_var(
                MDS_KEYRING_ENV,
                identity.secret_name.as_str(),
                identity.secret_key.as_str(),
            ),
            mon_secret_env_var(),
            admin_secret_env_var(),
        ]
    }
}

/// The daemon command line. Depends only on its arguments.
pub fn mds_command(topology: &ClusterTopology, daemon_id: &str) -> String {
    format!(
        "{} mds --data-dir={} --mon-endpoints={} --cluster-name={} --mds-id={} ",
        ROOKD_BIN,
        DATA_DIR,
        topology.flattened_monitors(),
        topology.name,
        daemon_id
    )
}

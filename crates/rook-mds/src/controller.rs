//! MDS reconcile: one idempotent convergence step per [`ClusterController::start`]
//!
//! ```text
//! validate topology -> open admin session -> ensure keyring
//!                   -> compose deployment -> create deployment -> release session
//! ```
//!
//! "Already exists" on either create is success. Nothing is retried here; the
//! caller re-invokes `start`, which is safe because every step is get-or-create.

use std::sync::Arc;

use tracing::{info, instrument};

use rook_common::kube_utils::CreateOutcome;
use rook_common::ClusterTopology;

use crate::admin::{AdminConnector, AdminSession};
use crate::client::MdsKubeClient;
use crate::compiler::WorkloadComposer;
use crate::config::{DeploymentTarget, APP_NAME, MDS_DAEMON_ID};
use crate::error::MdsError;
use crate::keyring::{IdentityProvisioner, KeyringOrigin};

/// What a successful `start` found or did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconcileReport {
    /// How the keyring secret came to exist
    pub keyring: KeyringOrigin,
    /// Whether the deployment was created by this call
    pub deployment: CreateOutcome,
}

/// Reconciles the single MDS of a storage cluster
pub struct ClusterController {
    kube: Arc<dyn MdsKubeClient>,
    connector: Arc<dyn AdminConnector>,
    composer: WorkloadComposer,
}

impl ClusterController {
    /// Controller over the given Kubernetes and admin seams
    pub fn new(kube: Arc<dyn MdsKubeClient>, connector: Arc<dyn AdminConnector>) -> Self {
        Self {
            kube,
            connector,
            composer: WorkloadComposer,
        }
    }

    /// Make sure the MDS keyring and deployment exist for `topology` at `target`
    #[instrument(skip_all, fields(namespace = %target.namespace))]
    pub async fn start(
        &self,
        target: &DeploymentTarget,
        topology: Option<&ClusterTopology>,
    ) -> Result<ReconcileReport, MdsError> {
        info!("start running mds");

        let topology = require_membership(topology)?;

        // Released when it goes out of scope, on every return path below.
        let session = AdminSession::open(self.connector.as_ref(), topology)
            .await
            .map_err(|e| MdsError::Session(e.to_string()))?;

        let provisioner = IdentityProvisioner::new(self.kube.clone(), target.namespace.as_str());
        let identity = provisioner.ensure(&*session, MDS_DAEMON_ID).await?;

        let deployment = self.composer.build(topology, target, &identity);
        let outcome = self
            .kube
            .create_deployment(&target.namespace, &deployment)
            .await
            .map_err(|e| MdsError::Deployment(e.to_string()))?;

        match outcome {
            CreateOutcome::Created => info!(
                cluster = %topology.name,
                replicas = target.replicas,
                "{} deployment started",
                APP_NAME
            ),
            CreateOutcome::AlreadyExists => info!(
                cluster = %topology.name,
                "{} deployment already exists",
                APP_NAME
            ),
        }

        Ok(ReconcileReport {
            keyring: identity.origin,
            deployment: outcome,
        })
    }
}

/// Check the topology before anything external is contacted
pub fn require_membership(
    topology: Option<&ClusterTopology>,
) -> Result<&ClusterTopology, MdsError> {
    let topology = match topology {
        Some(t) if t.has_monitors() => t,
        _ => return Err(MdsError::Config("missing cluster membership".to_string())),
    };
    if !topology.is_command_safe() {
        return Err(MdsError::Config(format!(
            "cluster name {:?} or monitor endpoints {:?} are not DNS-safe",
            topology.name, topology.monitors
        )));
    }
    Ok(topology)
}

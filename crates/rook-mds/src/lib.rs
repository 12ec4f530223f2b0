//! rook-mds - provisions and reconciles the Ceph metadata server for a Rook cluster
//!
//! Each call to [`ClusterController::start`] is one idempotent convergence step
//! toward "the MDS keyring secret exists and the MDS deployment exists":
//!
//! - [`keyring`] - get-or-create of the daemon keyring secret
//! - [`compiler`] - pure composition of the MDS `Deployment`
//! - [`controller`] - precondition checks, admin session scope, apply
//! - [`client`] - Kubernetes seam (secrets and deployments)
//! - [`admin`] - storage cluster admin session seam and its `ceph` CLI backend
//! - [`config`] - deployment target and fixed identifiers
//! - [`error`] - step-level errors

#![deny(missing_docs)]

pub mod admin;
pub mod client;
pub mod compiler;
pub mod config;
pub mod controller;
pub mod error;
pub mod keyring;

pub use compiler::WorkloadComposer;
pub use config::DeploymentTarget;
pub use controller::{ClusterController, ReconcileReport};
pub use error::MdsError;
pub use keyring::{Identity, IdentityProvisioner, KeyringOrigin};

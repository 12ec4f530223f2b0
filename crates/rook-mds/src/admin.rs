//! Admin session to the storage cluster
//!
//! The reconcile only needs one admin primitive, `auth get-or-create-key`.
//! Sessions are scoped: [`AdminSession`] shuts the connection down when it
//! goes out of scope, whichever way the reconcile exits.
//!
//! [`CephCliConnector`] backs the seam with the `ceph` command line. Each
//! session gets a private directory holding a cluster config (monitor hosts)
//! and the `client.admin` keyring; shutdown removes it.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

use rook_common::{ClusterTopology, Error};

/// Default bound on a single `ceph` invocation
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Entity the admin session authenticates as
pub const ADMIN_ENTITY: &str = "client.admin";

/// An open admin connection to the storage cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AdminConnection: Send + Sync {
    /// Return the key for `entity`, creating it with `caps` if it does not exist.
    ///
    /// `caps` is a flat list of `service, capability` pairs.
    async fn auth_get_or_create_key(&self, entity: &str, caps: &[String]) -> Result<String, Error>;

    /// Release the connection. Called exactly once per connection.
    fn shutdown(&self);
}

/// Opens admin connections for a given cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AdminConnector: Send + Sync {
    /// Connect as `client.admin` to the cluster described by `topology`
    async fn connect(&self, topology: &ClusterTopology) -> Result<Box<dyn AdminConnection>, Error>;
}

/// Scoped admin connection; shuts the connection down on drop
pub struct AdminSession {
    conn: Box<dyn AdminConnection>,
}

impl AdminSession {
    /// Open a session through `connector`
    pub async fn open(
        connector: &dyn AdminConnector,
        topology: &ClusterTopology,
    ) -> Result<Self, Error> {
        let conn = connector.connect(topology).await?;
        debug!(cluster = %topology.name, "admin session opened");
        Ok(Self { conn })
    }
}

impl Deref for AdminSession {
    type Target = dyn AdminConnection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref()
    }
}

impl Drop for AdminSession {
    fn drop(&mut self) {
        self.conn.shutdown();
        debug!("admin session released");
    }
}

// =============================================================================
// ceph CLI backend
// =============================================================================

/// Connector that drives the `ceph` command line as `client.admin`
pub struct CephCliConnector {
    ceph_bin: PathBuf,
    admin_secret: String,
    command_timeout: Duration,
}

impl CephCliConnector {
    /// Connector using the given `ceph` binary and `client.admin` key
    pub fn new(ceph_bin: impl Into<PathBuf>, admin_secret: impl Into<String>) -> Self {
        Self {
            ceph_bin: ceph_bin.into(),
            admin_secret: admin_secret.into(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Override the per-command timeout
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

#[async_trait]
impl AdminConnector for CephCliConnector {
    async fn connect(&self, topology: &ClusterTopology) -> Result<Box<dyn AdminConnection>, Error> {
        let dir = tempfile::Builder::new()
            .prefix("rook-admin-")
            .tempdir()
            .map_err(|e| {
                Error::internal_with_context(
                    "admin_session",
                    format!("failed to create config dir: {}", e),
                )
            })?;

        let config_path = dir.path().join(format!("{}.config", topology.name));
        let keyring_path = dir.path().join(format!("{}.keyring", topology.name));
        write_file(&config_path, &render_config(topology)).await?;
        write_file(&keyring_path, &render_admin_keyring(&self.admin_secret)).await?;

        let conn = CephCliConnection {
            ceph_bin: self.ceph_bin.clone(),
            cluster: topology.name.clone(),
            config_path,
            keyring_path,
            timeout: self.command_timeout,
            dir: Mutex::new(Some(dir)),
        };

        // Fails fast when no monitor answers; dropping `conn` removes the dir.
        conn.run(&["status".to_string()]).await?;
        info!(
            cluster = %topology.name,
            monitors = topology.monitors.len(),
            "connected to cluster as admin"
        );

        Ok(Box::new(conn))
    }
}

struct CephCliConnection {
    ceph_bin: PathBuf,
    cluster: String,
    config_path: PathBuf,
    keyring_path: PathBuf,
    timeout: Duration,
    dir: Mutex<Option<TempDir>>,
}

impl CephCliConnection {
    async fn run(&self, args: &[String]) -> Result<Vec<u8>, Error> {
        let description = format!("ceph {}", args.join(" "));

        let mut cmd = Command::new(&self.ceph_bin);
        cmd.arg("--cluster")
            .arg(&self.cluster)
            .arg("--conf")
            .arg(&self.config_path)
            .arg("--name")
            .arg(ADMIN_ENTITY)
            .arg("--keyring")
            .arg(&self.keyring_path)
            .arg("--connect-timeout")
            .arg(self.timeout.as_secs().to_string())
            .args(args)
            .kill_on_drop(true);

        debug!(command = %description, "running ceph command");
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| Error::Timeout {
                command: description.clone(),
                timeout: self.timeout,
            })?
            .map_err(|e| Error::command(&description, format!("failed to execute: {}", e)))?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(Error::command(
                &description,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}

#[async_trait]
impl AdminConnection for CephCliConnection {
    async fn auth_get_or_create_key(&self, entity: &str, caps: &[String]) -> Result<String, Error> {
        let mut args = vec!["auth".to_string(), "get-or-create-key".to_string()];
        args.push(entity.to_string());
        args.extend(caps.iter().cloned());
        args.extend(["--format".to_string(), "json".to_string()]);

        let stdout = self.run(&args).await?;
        parse_key_response(&stdout)
    }

    // Blocking removal: runs from `AdminSession::drop`, which cannot await, and
    // the directory only holds two small files.
    fn shutdown(&self) {
        if let Some(dir) = self.dir.lock().take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(path = %path.display(), error = %e, "failed to remove admin config dir");
            }
        }
    }
}

#[derive(Deserialize)]
struct KeyResponse {
    key: String,
}

/// Extract the key from `auth get-or-create-key --format json` output
fn parse_key_response(stdout: &[u8]) -> Result<String, Error> {
    let response: KeyResponse = serde_json::from_slice(stdout)
        .map_err(|e| Error::serialization(format!("unexpected auth response: {}", e)))?;
    if response.key.is_empty() {
        return Err(Error::serialization("auth response carried an empty key"));
    }
    Ok(response.key)
}

/// Minimal cluster config pointing the CLI at the monitors
fn render_config(topology: &ClusterTopology) -> String {
    format!("[global]\nmon host = {}\n", topology.flattened_monitors())
}

fn render_admin_keyring(secret: &str) -> String {
    format!("[{}]\n\tkey = {}\n", ADMIN_ENTITY, secret)
}

async fn write_file(path: &Path, contents: &str) -> Result<(), Error> {
    tokio::fs::write(path, contents).await.map_err(|e| {
        Error::internal_with_context(
            "admin_session",
            format!("failed to write {}: {}", path.display(), e),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology() -> ClusterTopology {
        ClusterTopology::new("mycluster", ["10.0.0.1:6789", "10.0.0.2:6789"])
    }

    #[test]
    fn config_lists_monitors_in_order() {
        let config = render_config(&topology());
        assert_eq!(config, "[global]\nmon host = 10.0.0.1:6789,10.0.0.2:6789\n");
    }

    #[test]
    fn admin_keyring_holds_secret() {
        assert_eq!(
            render_admin_keyring("AQAdmin=="),
            "[client.admin]\n\tkey = AQAdmin==\n"
        );
    }

    #[test]
    fn key_response_parsing() {
        assert_eq!(
            parse_key_response(br#"{"key":"AQBmds=="}"#).unwrap(),
            "AQBmds=="
        );
        assert!(parse_key_response(br#"{"key":""}"#).is_err());
        assert!(parse_key_response(b"Error EACCES: access denied").is_err());
    }

    #[test]
    fn dropping_a_session_shuts_it_down_once() {
        let mut conn = MockAdminConnection::new();
        conn.expect_shutdown().times(1).return_const(());
        let session = AdminSession {
            conn: Box::new(conn),
        };
        drop(session);
    }

    #[tokio::test]
    async fn open_propagates_connect_failure() {
        let mut connector = MockAdminConnector::new();
        connector
            .expect_connect()
            .times(1)
            .returning(|_| Err(Error::command("ceph status", "no monitors reachable")));

        let err = AdminSession::open(&connector, &topology())
            .await
            .err()
            .expect("connect should fail");
        assert!(err.to_string().contains("no monitors reachable"));
    }

    #[tokio::test]
    async fn missing_ceph_binary_fails_to_connect() {
        let connector = CephCliConnector::new("/nonexistent/bin/ceph", "AQAdmin==");
        let err = connector.connect(&topology()).await.err().expect("no binary");
        assert!(matches!(err, Error::Command { .. }));
        assert!(err.to_string().contains("failed to execute"));
    }

    #[cfg(unix)]
    mod fake_ceph {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        /// A `ceph` stand-in that logs its arguments and answers like the real CLI
        fn install(dir: &Path) -> (PathBuf, PathBuf) {
            let log = dir.join("args.log");
            let bin = dir.join("ceph");
            let script = format!(
                "#!/bin/sh\necho \"$@\" >> {}\ncase \"$*\" in\n  *get-or-create-key*) echo '{{\"key\":\"AQBfake==\"}}' ;;\n  *) echo HEALTH_OK ;;\nesac\n",
                log.display()
            );
            std::fs::write(&bin, script).unwrap();
            std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
            (bin, log)
        }

        #[tokio::test]
        async fn issues_key_with_caps_and_cleans_up() {
            let scratch = tempfile::tempdir().unwrap();
            let (bin, log) = install(scratch.path());

            let connector = CephCliConnector::new(&bin, "AQAdmin==")
                .with_command_timeout(Duration::from_secs(10));
            let conn = connector.connect(&topology()).await.unwrap();

            let caps: Vec<String> = ["osd", "allow *", "mds", "allow"]
                .iter()
                .map(|s| s.to_string())
                .collect();
            let key = conn.auth_get_or_create_key("mds.mds1", &caps).await.unwrap();
            assert_eq!(key, "AQBfake==");

            let calls = std::fs::read_to_string(&log).unwrap();
            let lines: Vec<&str> = calls.lines().collect();
            assert_eq!(lines.len(), 2);
            assert!(lines[0].contains("--cluster mycluster"));
            assert!(lines[0].contains("--name client.admin"));
            assert!(lines[0].ends_with("status"));
            assert!(lines[1].contains("auth get-or-create-key mds.mds1 osd allow * mds allow"));
            assert!(lines[1].ends_with("--format json"));
            assert!(!calls.contains("AQAdmin=="));

            let config_dir = lines[0]
                .split_whitespace()
                .skip_while(|arg| *arg != "--conf")
                .nth(1)
                .map(|p| Path::new(p).parent().unwrap().to_path_buf())
                .unwrap();
            assert!(config_dir.exists());
            conn.shutdown();
            assert!(!config_dir.exists());
        }
    }
}

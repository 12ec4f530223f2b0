//! Storage cluster membership as seen by the operators
//!
//! The monitor list is owned by the cluster directory; operators only read it
//! to configure the daemons they launch.

use serde::{Deserialize, Serialize};

/// Separator used when a monitor list is passed on a daemon command line
pub const MON_ENDPOINT_SEPARATOR: &str = ",";

/// Name and monitor endpoints of a running storage cluster.
///
/// Monitor order is preserved exactly as supplied; anything derived from it
/// (command lines, config files) depends on that order.
///
/// The name and endpoints are spliced unquoted into daemon shell command
/// lines, so they must be DNS-safe; see [`ClusterTopology::is_command_safe`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterTopology {
    /// Cluster name (e.g., "mycluster")
    pub name: String,
    /// Monitor endpoints, `host:port`
    pub monitors: Vec<String>,
}

impl ClusterTopology {
    /// Create a topology from a name and an ordered list of monitor endpoints
    pub fn new<I, S>(name: impl Into<String>, monitors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            monitors: monitors.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a comma separated endpoint list, dropping empty entries
    pub fn from_endpoint_list(name: impl Into<String>, endpoints: &str) -> Self {
        Self::new(
            name,
            endpoints
                .split(MON_ENDPOINT_SEPARATOR)
                .map(str::trim)
                .filter(|e| !e.is_empty()),
        )
    }

    /// Whether at least one monitor is known
    pub fn has_monitors(&self) -> bool {
        !self.monitors.is_empty()
    }

    /// Whether the name and every endpoint can be placed on a shell command
    /// line without quoting: DNS labels, IPv4/IPv6 literals and ports only.
    pub fn is_command_safe(&self) -> bool {
        is_command_safe_token(&self.name)
            && self.monitors.iter().all(|m| is_command_safe_token(m))
    }

    /// Monitor endpoints joined for a daemon command line
    pub fn flattened_monitors(&self) -> String {
        flatten_mon_endpoints(&self.monitors)
    }
}

fn is_command_safe_token(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '[' | ']'))
}

/// Join monitor endpoints in input order. Never sorts.
pub fn flatten_mon_endpoints(monitors: &[String]) -> String {
    monitors.join(MON_ENDPOINT_SEPARATOR)
}

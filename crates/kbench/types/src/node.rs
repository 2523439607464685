//! Testbed hosts and how to reach them

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Role a host plays in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Runs the control plane and initiates the cluster
    Master,
    /// Joins the cluster and runs workloads
    Worker,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Master => write!(f, "master"),
            NodeRole::Worker => write!(f, "worker"),
        }
    }
}

/// Credentials used to open an authenticated session on a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshCredentials {
    pub username: String,
    pub key_file: PathBuf,
    pub port: u16,
}

/// A testbed host. Immutable once the testbed configuration is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub hostname: String,
    pub role: NodeRole,
    pub credentials: SshCredentials,
}

impl Node {
    pub fn new(hostname: impl Into<String>, role: NodeRole, credentials: SshCredentials) -> Self {
        Self {
            hostname: hostname.into(),
            role,
            credentials,
        }
    }

    pub fn is_master(&self) -> bool {
        self.role == NodeRole::Master
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.hostname, self.role)
    }
}

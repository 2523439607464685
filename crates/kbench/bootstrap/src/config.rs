//! Testbed configuration
//!
//! The testbed file names every host with its role, the account used to
//! reach them and the system software to install:
//!
//! ```json
//! {
//!   "servers": { "hostnames": { "node0": "master", "node1": "worker" } },
//!   "account": { "username": "alice", "ssh_key_filename": "~/.ssh/id_ed25519", "port": 22 },
//!   "sys": { "vHive_version": "v1.6", "log_filename": "bootstrap.log" }
//! }
//! ```

use kbench_types::{Node, NodeRole, SshCredentials};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{BootstrapError, BootstrapResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestbedConfig {
    pub servers: ServersSection,
    pub account: AccountSection,
    pub sys: SysSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServersSection {
    /// Hostname to role
    pub hostnames: BTreeMap<String, NodeRole>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSection {
    pub username: String,
    pub ssh_key_filename: PathBuf,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SysSection {
    /// vHive git tag or branch to check out
    #[serde(rename = "vHive_version")]
    pub vhive_version: String,
    pub log_filename: PathBuf,
}

fn default_ssh_port() -> u16 {
    22
}

/// The validated host layout: one master and at least one worker
#[derive(Debug, Clone)]
pub struct Topology {
    pub master: Node,
    pub workers: Vec<Node>,
}

impl Topology {
    /// Master followed by workers.
    pub fn all(&self) -> impl Iterator<Item = &Node> {
        std::iter::once(&self.master).chain(self.workers.iter())
    }

    pub fn len(&self) -> usize {
        1 + self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl TestbedConfig {
    /// Parse a testbed file. Unknown roles are rejected here.
    pub fn load(path: &Path) -> BootstrapResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> BootstrapResult<Self> {
        serde_json::from_str(json).map_err(|e| BootstrapError::Config(e.to_string()))
    }

    pub fn credentials(&self) -> SshCredentials {
        SshCredentials {
            username: self.account.username.clone(),
            key_file: self.account.ssh_key_filename.clone(),
            port: self.account.port,
        }
    }

    /// Split hosts by role, checking there is exactly one master and at
    /// least one worker.
    pub fn topology(&self) -> BootstrapResult<Topology> {
        let creds = self.credentials();
        let mut masters = Vec::new();
        let mut workers = Vec::new();

        for (host, role) in &self.servers.hostnames {
            let node = Node::new(host.clone(), *role, creds.clone());
            match role {
                NodeRole::Master => masters.push(node),
                NodeRole::Worker => workers.push(node),
            }
        }

        if masters.len() != 1 {
            return Err(BootstrapError::Config(format!(
                "exactly one master node is required, found {}",
                masters.len()
            )));
        }
        if workers.is_empty() {
            return Err(BootstrapError::Config(
                "the testbed must have at least one worker node".into(),
            ));
        }

        Ok(Topology {
            master: masters.remove(0),
            workers,
        })
    }
}

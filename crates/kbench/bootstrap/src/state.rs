//! Cluster formation state machine

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{BootstrapError, BootstrapResult};

/// Where a bootstrap currently is.
///
/// States advance strictly in declaration order. `Aborted` can be entered
/// from any other state and is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterState {
    Idle,
    NodesCleaning,
    NodesProvisioned,
    WorkersConfigured,
    MasterJoinInitiated,
    JoinStringAvailable,
    WorkersJoined,
    VSwarmInstalled,
    MetricsAgentsInstalled,
    Ready,
    Aborted,
}

impl ClusterState {
    /// The state that follows this one on the success path.
    pub fn successor(self) -> Option<ClusterState> {
        use ClusterState::*;
        match self {
            Idle => Some(NodesCleaning),
            NodesCleaning => Some(NodesProvisioned),
            NodesProvisioned => Some(WorkersConfigured),
            WorkersConfigured => Some(MasterJoinInitiated),
            MasterJoinInitiated => Some(JoinStringAvailable),
            JoinStringAvailable => Some(WorkersJoined),
            WorkersJoined => Some(VSwarmInstalled),
            VSwarmInstalled => Some(MetricsAgentsInstalled),
            MetricsAgentsInstalled => Some(Ready),
            Ready | Aborted => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ClusterState::Ready | ClusterState::Aborted)
    }

    /// Move to `next`, rejecting anything but the successor or an abort.
    pub fn transition(&mut self, next: ClusterState) -> BootstrapResult<ClusterState> {
        let allowed = match next {
            ClusterState::Aborted => *self != ClusterState::Aborted,
            other => self.successor() == Some(other),
        };
        if !allowed {
            return Err(BootstrapError::InvalidTransition {
                from: *self,
                to: next,
            });
        }
        let previous = *self;
        *self = next;
        Ok(previous)
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClusterState::Idle => "Idle",
            ClusterState::NodesCleaning => "NodesCleaning",
            ClusterState::NodesProvisioned => "NodesProvisioned",
            ClusterState::WorkersConfigured => "WorkersConfigured",
            ClusterState::MasterJoinInitiated => "MasterJoinInitiated",
            ClusterState::JoinStringAvailable => "JoinStringAvailable",
            ClusterState::WorkersJoined => "WorkersJoined",
            ClusterState::VSwarmInstalled => "vSwarmInstalled",
            ClusterState::MetricsAgentsInstalled => "MetricsAgentsInstalled",
            ClusterState::Ready => "Ready",
            ClusterState::Aborted => "Aborted",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_path_reaches_ready() {
        let mut state = ClusterState::Idle;
        let mut steps = 0;
        while let Some(next) = state.successor() {
            state.transition(next).unwrap();
            steps += 1;
        }
        assert_eq!(state, ClusterState::Ready);
        assert_eq!(steps, 9);
    }

    #[test]
    fn test_skipping_is_rejected() {
        let mut state = ClusterState::NodesProvisioned;
        let err = state.transition(ClusterState::WorkersJoined).unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidTransition { .. }));
        assert_eq!(state, ClusterState::NodesProvisioned);
    }

    #[test]
    fn test_abort_from_any_non_terminal_state() {
        let mut state = ClusterState::JoinStringAvailable;
        assert_eq!(
            state.transition(ClusterState::Aborted).unwrap(),
            ClusterState::JoinStringAvailable
        );
        assert!(state.transition(ClusterState::Aborted).is_err());

        let mut ready = ClusterState::Ready;
        assert!(ready.transition(ClusterState::Idle).is_err());
        assert!(ready.transition(ClusterState::Aborted).is_ok());
    }
}

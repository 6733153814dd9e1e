//! # Members
//!
//! Vault server pods as seen by the controller.

use crate::constants::POD_PHASE_RUNNING;
use k8s_openapi::api::core::v1::Pod;

/// One Vault server instance
///
/// Built fresh from every pod list or watch event and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    /// Pod IP, unset until the pod is scheduled
    pub address: Option<String>,
    /// Pod lifecycle phase (`Pending`, `Running`, ...)
    pub phase: Option<String>,
}

impl Member {
    pub fn from_pod(pod: &Pod) -> Self {
        let status = pod.status.as_ref();
        Self {
            name: pod.metadata.name.clone().unwrap_or_default(),
            address: status
                .and_then(|s| s.pod_ip.clone())
                .filter(|ip| !ip.is_empty()),
            phase: status.and_then(|s| s.phase.clone()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase.as_deref() == Some(POD_PHASE_RUNNING)
    }
}

/// A member lifecycle event from the watch stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberEvent {
    Added(Member),
    Modified(Member),
    Deleted(Member),
    /// Resource version checkpoint, no member change
    Bookmark,
    /// The API server no longer has our resource version (HTTP 410)
    Expired,
}

impl MemberEvent {
    /// Event kind label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            MemberEvent::Added(_) => "added",
            MemberEvent::Modified(_) => "modified",
            MemberEvent::Deleted(_) => "deleted",
            MemberEvent::Bookmark => "bookmark",
            MemberEvent::Expired => "expired",
        }
    }

    /// Address of a running member from an Added/Modified event
    ///
    /// Every other event kind, phase, or a pod without an IP yields `None`.
    pub fn unseal_candidate(&self) -> Option<&str> {
        match self {
            MemberEvent::Added(member) | MemberEvent::Modified(member) if member.is_running() => {
                member.address.as_deref()
            }
            _ => None,
        }
    }
}

//! ArgoCD Application custom resource (read-side subset)
//!
//! Mirrors `applications.argoproj.io/v1alpha1`. The GitOps controller owns
//! these objects; the orchestrator reads health/sync snapshots and matches
//! sync revisions against expected commit SHAs.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Subset of the Application spec the core reads: project membership and
/// the destination the workload deploys into.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "argoproj.io",
    version = "v1alpha1",
    kind = "Application",
    namespaced,
    status = "ApplicationStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    #[serde(default)]
    pub project: String,

    #[serde(default)]
    pub destination: ApplicationDestination,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDestination {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatus {
    #[serde(default)]
    pub health: HealthInfo,

    #[serde(default)]
    pub sync: SyncInfo,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct HealthInfo {
    #[serde(default)]
    pub status: HealthState,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncInfo {
    #[serde(default)]
    pub status: SyncState,

    /// Git commit SHA the app is currently synced to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

/// ArgoCD health states. Values not known to this crate deserialize to
/// `Unknown` rather than failing the whole list call.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(from = "String")]
pub enum HealthState {
    Healthy,
    Progressing,
    Degraded,
    Suspended,
    Missing,
    #[default]
    Unknown,
}

impl From<String> for HealthState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Healthy" => HealthState::Healthy,
            "Progressing" => HealthState::Progressing,
            "Degraded" => HealthState::Degraded,
            "Suspended" => HealthState::Suspended,
            "Missing" => HealthState::Missing,
            _ => HealthState::Unknown,
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthState::Healthy => "Healthy",
            HealthState::Progressing => "Progressing",
            HealthState::Degraded => "Degraded",
            HealthState::Suspended => "Suspended",
            HealthState::Missing => "Missing",
            HealthState::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(from = "String")]
pub enum SyncState {
    Synced,
    OutOfSync,
    #[default]
    Unknown,
}

impl From<String> for SyncState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Synced" => SyncState::Synced,
            "OutOfSync" => SyncState::OutOfSync,
            _ => SyncState::Unknown,
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncState::Synced => "Synced",
            SyncState::OutOfSync => "OutOfSync",
            SyncState::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

impl Application {
    /// healthy ⇔ health == Healthy AND sync == Synced.
    pub fn is_healthy(&self) -> bool {
        self.status
            .as_ref()
            .map(|s| s.health.status == HealthState::Healthy && s.sync.status == SyncState::Synced)
            .unwrap_or(false)
    }

    pub fn health_state(&self) -> HealthState {
        self.status
            .as_ref()
            .map(|s| s.health.status)
            .unwrap_or_default()
    }

    pub fn sync_state(&self) -> SyncState {
        self.status
            .as_ref()
            .map(|s| s.sync.status)
            .unwrap_or_default()
    }

    pub fn sync_revision(&self) -> Option<&str> {
        self.status.as_ref()?.sync.revision.as_deref()
    }

    pub fn destination_namespace(&self) -> Option<&str> {
        self.spec.destination.namespace.as_deref()
    }
}

/// Compare two Git revisions, tolerating an abbreviated SHA on either
/// side: equal outright, or equal on the first 8 characters when both
/// sides have at least 8. Shorter strings never prefix-match.
pub fn revisions_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    a.len() >= 8 && b.len() >= 8 && a.as_bytes()[..8] == b.as_bytes()[..8]
}

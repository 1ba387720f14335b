//! Partial typed views of the external custom resources the validators read
//!
//! Only the fields the core actually inspects are declared; everything else
//! is left to serde's default handling. These resources are owned and
//! mutated by their external controllers — the core only reads snapshots
//! (plus the single refresh annotation patch in [`crate::argo`]).

mod application;
mod certificate;

pub use application::{
    revisions_match, Application, ApplicationDestination, ApplicationSpec, ApplicationStatus,
    HealthInfo, HealthState, SyncInfo, SyncState,
};
pub use certificate::{Certificate, CertificateCondition, CertificateSpec, CertificateStatus};

//! Resource-state validators
//!
//! Each validator inspects one category of cluster resource with read-only
//! API calls and accumulates findings into a [`crate::ValidationReport`].
//! Per-resource defects never raise — only a total enumeration failure
//! (the scope itself cannot be listed, or zero resources exist where at
//! least one is required) becomes an `Err`.

mod argocd;
mod ingress;
mod jobs;
mod pods;

pub use argocd::validate_applications;
pub use ingress::{
    ingress_records, load_balancer_ip_for_class, validate_ingress_configuration, IngressRecord,
};
pub use jobs::{exclusion_matches, validate_failed_jobs, wait_for_job, JobWaitResult};
pub use pods::validate_pod_health;

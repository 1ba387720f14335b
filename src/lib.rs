//! End-to-end validation core for GitOps-managed Kubernetes platforms
//!
//! Turns an eventually-consistent platform (ArgoCD reconciling Git commits
//! into cluster state, cert-manager issuing certificates, external-dns
//! publishing records) into deterministic pass/fail outcomes:
//!
//! - [`poll`] bounds every wait with an explicit timeout/interval budget.
//! - [`argo`] drives the two-phase created-then-healthy Application wait.
//! - [`validators`] inspect pods, jobs, ingresses, and Applications,
//!   accumulating findings instead of failing fast.
//! - [`certs`] and [`dns`] verify the network-facing consequences: the
//!   served certificate and the published A records.
//! - [`assertions`] convert a dirty report into a single structured error
//!   for a test harness.
//! - [`github`], [`manifests`], and [`names`] drive the Git side of a
//!   scenario: unique names, generated fixtures, committed files.
//!
//! Cluster access goes through the capability traits in [`cluster`], so
//! every component runs against in-memory fakes in tests.

pub mod argo;
pub mod assertions;
pub mod certs;
pub mod cluster;
pub mod crd;
pub mod dns;
pub mod error;
pub mod github;
pub mod http;
pub mod manifests;
pub mod names;
pub mod poll;
pub mod report;
pub mod telemetry;
pub mod validators;

pub use cluster::{ClusterClient, ScopeConfig};
pub use error::{Error, Result};
pub use poll::{Lookup, PollConfig, PollOutcome, PollStep};
pub use report::{Problem, ValidationReport};

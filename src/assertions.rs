//! Pass/fail adapters over validation reports
//!
//! Validators accumulate findings; test harnesses want a single verdict.
//! Each adapter runs one validator and converts a dirty report into a
//! [`ValidationFailure`] whose message shows at most
//! [`MAX_DISPLAYED_PROBLEMS`] findings (the full list stays on the error
//! for programmatic inspection). Warnings never fail a run; they are
//! logged and dropped.

use tracing::{info, warn};

use crate::certs::{validate_certificate_secret, validate_https_certificate};
use crate::cluster::{ApplicationLister, IngressLister, JobLister, PodLister, SecretReader};
use crate::dns::{check_ingress_dns, DnsResolver};
use crate::error::Result;
use crate::report::{Problem, ValidationReport};
use crate::validators::{
    ingress_records, validate_applications, validate_failed_jobs, validate_ingress_configuration,
    validate_pod_health,
};

/// How many findings a failure message shows before truncating.
pub const MAX_DISPLAYED_PROBLEMS: usize = 10;

/// A failed validation: a human-readable title plus every finding.
#[derive(Debug, Clone)]
pub struct ValidationFailure {
    pub title: String,
    pub problems: Vec<Problem>,
}

impl ValidationFailure {
    pub fn new(title: impl Into<String>, problems: Vec<Problem>) -> Self {
        Self {
            title: title.into(),
            problems,
        }
    }
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} ({} problems)", self.title, self.problems.len())?;
        for problem in self.problems.iter().take(MAX_DISPLAYED_PROBLEMS) {
            writeln!(f, "  - {problem}")?;
        }
        let hidden = self.problems.len().saturating_sub(MAX_DISPLAYED_PROBLEMS);
        if hidden > 0 {
            writeln!(f, "  ... and {hidden} more")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationFailure {}

fn verdict(title: &str, report: ValidationReport) -> Result<ValidationReport> {
    for warning in &report.warnings {
        warn!(%warning, "validation warning");
    }
    if report.is_clean() {
        info!(title, scanned = report.scanned, "validation passed");
        Ok(report)
    } else {
        Err(ValidationFailure::new(title, report.problems).into())
    }
}

/// Assert every ArgoCD Application in scope is Healthy and Synced.
pub async fn assert_argocd_healthy(
    apps: &impl ApplicationLister,
    namespace_filter: Option<&str>,
) -> Result<ValidationReport> {
    let report = validate_applications(apps, namespace_filter).await?;
    verdict("ArgoCD applications unhealthy or out of sync", report)
}

/// Assert no pod in the given namespaces shows a failure pathology.
pub async fn assert_pods_healthy(
    pods: &impl PodLister,
    namespaces: &[String],
) -> Result<ValidationReport> {
    let report = validate_pod_health(pods, namespaces).await?;
    verdict("Unhealthy pods found", report)
}

/// Assert no truly-failed Jobs outside the exclusion list.
pub async fn assert_jobs_clean(
    jobs: &impl JobLister,
    namespaces: &[String],
    exclude: &[String],
) -> Result<ValidationReport> {
    let report = validate_failed_jobs(jobs, namespaces, exclude).await?;
    verdict("Failed jobs found", report)
}

/// Assert every Ingress carries rules, hosts, and a load balancer.
pub async fn assert_ingress_valid(
    ingresses: &impl IngressLister,
    namespaces: &[String],
) -> Result<ValidationReport> {
    let report = validate_ingress_configuration(ingresses, namespaces).await?;
    verdict("Misconfigured ingresses found", report)
}

/// Assert every Ingress host resolves to its load balancer IPs.
pub async fn assert_ingress_dns_valid(
    ingresses: &impl IngressLister,
    resolver: &impl DnsResolver,
    namespaces: &[String],
) -> Result<ValidationReport> {
    let records = ingress_records(ingresses, namespaces).await?;
    let report = check_ingress_dns(&records, resolver).await?;
    verdict("Ingress DNS mismatches found", report)
}

/// Assert a TLS Secret holds a currently-valid certificate covering the
/// expected hostname.
pub async fn assert_tls_secret_valid(
    secrets: &impl SecretReader,
    namespace: &str,
    name: &str,
    expected_hostname: &str,
) -> Result<ValidationReport> {
    let report = validate_certificate_secret(secrets, namespace, name, expected_hostname).await?;
    verdict("TLS secret certificate invalid", report)
}

/// Assert an HTTPS endpoint presents a valid certificate for its host.
pub async fn assert_https_certificate_valid(url: &str) -> Result<ValidationReport> {
    let report = validate_https_certificate(url).await?;
    verdict("HTTPS endpoint certificate invalid", report)
}

//! Reconciliation orchestrator
//!
//! Bridges a Git commit into a deterministic outcome by waiting on the
//! ArgoCD Application resources the ApplicationSet generates from it.
//! The multi-app wait runs two strictly ordered phases over one shared
//! time budget: first "creation" (the expected number of Applications
//! targeting the destination namespace exist), then "health" (all of
//! them are Healthy and Synced). The creation phase is never re-entered.

use std::cell::Cell;

use kube::ResourceExt;
use tracing::{info, instrument, warn};

use crate::cluster::{ApplicationLister, ApplicationReader, ApplicationRefresher};
use crate::crd::revisions_match;
use crate::error::Result;
use crate::poll::{poll_until, Lookup, PollConfig, PollOutcome, PollStep};

/// Where the Application custom resources live and how long to wait.
///
/// Application CRs are created in the ArgoCD control namespace even when
/// their workloads deploy elsewhere; the multi-app wait lists there and
/// filters on `spec.destination.namespace`.
#[derive(Debug, Clone)]
pub struct ArgoConfig {
    pub argocd_namespace: String,
    pub poll: PollConfig,
}

impl ArgoConfig {
    pub fn new(argocd_namespace: impl Into<String>) -> Self {
        Self {
            argocd_namespace: argocd_namespace.into(),
            poll: PollConfig::reconcile(),
        }
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }
}

/// Which phase the multi-app wait was in when it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPhase {
    Creation,
    Health,
}

/// Diagnostic snapshot of one poll attempt of the multi-app wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppsSnapshot {
    pub phase: WaitPhase,
    pub created: usize,
    pub healthy: usize,
    /// `name: health/sync` summaries of apps still not healthy.
    pub unhealthy: Vec<String>,
}

/// Multi-app wait returning the full poll outcome for diagnostics.
///
/// NotFound while listing (namespace or CRD not there yet) counts as
/// pending; any other API failure is fatal.
#[instrument(skip(apps, config), fields(namespace = %config.argocd_namespace))]
pub async fn apps_created_and_healthy_outcome(
    apps: &impl ApplicationLister,
    config: &ArgoConfig,
    destination_namespace: &str,
    expected_count: usize,
) -> Result<PollOutcome<AppsSnapshot>> {
    // Cell rather than a mutable capture so the check closure stays Fn.
    let created_phase_done = Cell::new(false);
    let created_phase_done = &created_phase_done;

    poll_until(config.poll, || async move {
        let items = match apps.list_applications(&config.argocd_namespace).await? {
            Lookup::Found(items) => items,
            Lookup::NotFound => {
                info!("application namespace not found yet, waiting");
                return Ok(PollStep::Pending(AppsSnapshot {
                    phase: WaitPhase::Creation,
                    created: 0,
                    healthy: 0,
                    unhealthy: Vec::new(),
                }));
            }
        };

        let filtered: Vec<_> = items
            .into_iter()
            .filter(|app| app.destination_namespace() == Some(destination_namespace))
            .collect();

        if !created_phase_done.get() {
            if filtered.len() >= expected_count {
                created_phase_done.set(true);
                info!(
                    created = filtered.len(),
                    expected = expected_count,
                    "all applications created, waiting for health"
                );
            } else {
                info!(
                    created = filtered.len(),
                    expected = expected_count,
                    "waiting for applications to be created"
                );
                return Ok(PollStep::Pending(AppsSnapshot {
                    phase: WaitPhase::Creation,
                    created: filtered.len(),
                    healthy: 0,
                    unhealthy: Vec::new(),
                }));
            }
        }

        let healthy = filtered.iter().filter(|app| app.is_healthy()).count();
        let unhealthy: Vec<String> = filtered
            .iter()
            .filter(|app| !app.is_healthy())
            .map(|app| {
                format!(
                    "{}: {}/{}",
                    app.name_any(),
                    app.health_state(),
                    app.sync_state()
                )
            })
            .collect();

        let snapshot = AppsSnapshot {
            phase: WaitPhase::Health,
            created: filtered.len(),
            healthy,
            unhealthy: unhealthy.clone(),
        };

        if healthy >= expected_count && unhealthy.is_empty() {
            info!(healthy, "all applications healthy and synced");
            Ok(PollStep::Done(snapshot))
        } else {
            info!(healthy, expected = expected_count, stragglers = ?unhealthy, "waiting for application health");
            Ok(PollStep::Pending(snapshot))
        }
    })
    .await
}

/// Wait for `expected_count` Applications targeting `destination_namespace`
/// to be created and become Healthy + Synced. Returns false on timeout.
pub async fn wait_for_apps_created_and_healthy(
    apps: &impl ApplicationLister,
    config: &ArgoConfig,
    destination_namespace: &str,
    expected_count: usize,
) -> Result<bool> {
    let outcome =
        apps_created_and_healthy_outcome(apps, config, destination_namespace, expected_count)
            .await?;
    if !outcome.is_success() {
        warn!(
            elapsed = ?outcome.elapsed(),
            last = ?outcome.last(),
            "timed out waiting for applications"
        );
    }
    Ok(outcome.is_success())
}

/// Wait for one Application to be Healthy + Synced, optionally also synced
/// to `expected_sha` (full match, or mutual 8-character prefix).
#[instrument(skip(reader, config))]
pub async fn wait_for_app_healthy(
    reader: &impl ApplicationReader,
    config: &ArgoConfig,
    name: &str,
    expected_sha: Option<&str>,
) -> Result<bool> {
    let outcome = poll_until(config.poll, || async move {
        match reader
            .get_application(&config.argocd_namespace, name)
            .await?
        {
            Lookup::NotFound => Ok(PollStep::Pending("not created yet".to_string())),
            Lookup::Found(app) => {
                let revision = app.sync_revision().unwrap_or("");
                let summary = format!(
                    "health={} sync={} revision={revision}",
                    app.health_state(),
                    app.sync_state()
                );
                let sha_ok = match expected_sha {
                    Some(expected) => revisions_match(revision, expected),
                    None => true,
                };
                if app.is_healthy() && sha_ok {
                    Ok(PollStep::Done(summary))
                } else {
                    Ok(PollStep::Pending(summary))
                }
            }
        }
    })
    .await?;

    if !outcome.is_success() {
        warn!(
            app = name,
            last = outcome.last().map(String::as_str).unwrap_or("never observed"),
            "timed out waiting for application"
        );
    }
    Ok(outcome.is_success())
}

/// Nudge the GitOps controller with a refresh annotation, then wait for
/// the Application to be healthy (and SHA-matched if requested). The
/// refresh patch failing is fatal and short-circuits the wait.
pub async fn refresh_and_wait_for_app<C>(
    cluster: &C,
    config: &ArgoConfig,
    name: &str,
    expected_sha: Option<&str>,
) -> Result<bool>
where
    C: ApplicationReader + ApplicationRefresher,
{
    cluster
        .request_refresh(&config.argocd_namespace, name)
        .await?;
    wait_for_app_healthy(cluster, config, name, expected_sha).await
}

/// Wait until no Application references `spec.project == project` in any
/// namespace. Used before deleting an AppProject so nothing dangles.
#[instrument(skip(apps, config))]
pub async fn wait_for_apps_by_project_deleted(
    apps: &impl ApplicationLister,
    config: &ArgoConfig,
    project: &str,
) -> Result<bool> {
    let outcome = poll_until(config.poll, || async move {
        let remaining: Vec<String> = apps
            .list_all_applications()
            .await?
            .into_iter()
            .filter(|app| app.spec.project == project)
            .map(|app| {
                format!(
                    "{}/{}",
                    app.namespace().unwrap_or_default(),
                    app.name_any()
                )
            })
            .collect();

        if remaining.is_empty() {
            Ok(PollStep::Done(Vec::new()))
        } else {
            info!(count = remaining.len(), "applications still reference project");
            Ok(PollStep::Pending(remaining))
        }
    })
    .await?;

    if !outcome.is_success() {
        warn!(project, remaining = ?outcome.last(), "timed out waiting for project drain");
    }
    Ok(outcome.is_success())
}

//! Pod health validator
//!
//! Flags the pod pathologies that indicate a broken deployment:
//! Failed/Unknown phase, crash/image-pull waiting loops, OOM kills, and
//! high restart counts. Pods owned by a Job that already ran to a
//! terminal phase are skipped entirely — their Failed/Succeeded state is
//! the job controller's business (see [`super::validate_failed_jobs`]),
//! and they count toward neither the healthy nor the problem tally.

use k8s_openapi::api::core::v1::{ContainerStatus, Pod};
use tracing::{debug, info};

use crate::cluster::PodLister;
use crate::error::Result;
use crate::report::{Problem, ValidationReport};

/// Fixed threshold; restarts beyond this indicate intermittent failure.
const RESTART_THRESHOLD: i32 = 5;

const PROBLEM_WAITING_REASONS: [&str; 3] =
    ["CrashLoopBackOff", "ImagePullBackOff", "ErrImagePull"];

/// Check pod health across the given namespaces.
pub async fn validate_pod_health(
    pods: &impl PodLister,
    namespaces: &[String],
) -> Result<ValidationReport> {
    let mut report = ValidationReport::new();

    for namespace in namespaces {
        for pod in pods.list_pods(namespace).await? {
            if is_terminal_job_pod(&pod) {
                continue;
            }
            report.scanned += 1;

            let name = pod.metadata.name.clone().unwrap_or_default();
            let phase = pod
                .status
                .as_ref()
                .and_then(|s| s.phase.clone())
                .unwrap_or_default();

            if phase == "Failed" || phase == "Unknown" {
                report.push(Problem::scoped(
                    namespace,
                    &name,
                    format!("Phase={phase}"),
                ));
                continue;
            }

            let statuses = pod
                .status
                .as_ref()
                .and_then(|s| s.container_statuses.as_deref())
                .unwrap_or(&[]);

            for container in statuses {
                check_container(&mut report, namespace, &name, container);
            }
        }
    }

    if report.is_clean() {
        info!(pods = report.scanned, "all scanned pods healthy");
    } else {
        info!(
            pods = report.scanned,
            problems = report.problems.len(),
            "pod health problems found"
        );
    }
    Ok(report)
}

fn check_container(
    report: &mut ValidationReport,
    namespace: &str,
    pod_name: &str,
    container: &ContainerStatus,
) {
    let scope = format!("{pod_name}/{}", container.name);

    if container.restart_count > RESTART_THRESHOLD {
        report.push(Problem::scoped(
            namespace,
            &scope,
            format!("{} restarts", container.restart_count),
        ));
    }

    if let Some(reason) = container
        .state
        .as_ref()
        .and_then(|s| s.waiting.as_ref())
        .and_then(|w| w.reason.as_deref())
    {
        if PROBLEM_WAITING_REASONS.contains(&reason) {
            report.push(Problem::scoped(namespace, &scope, reason));
        }
    }

    let last_terminated_reason = container
        .last_state
        .as_ref()
        .and_then(|s| s.terminated.as_ref())
        .and_then(|t| t.reason.as_deref());
    if last_terminated_reason == Some("OOMKilled") {
        report.push(Problem::scoped(namespace, &scope, "OOMKilled"));
    }

    let current_terminated_reason = container
        .state
        .as_ref()
        .and_then(|s| s.terminated.as_ref())
        .and_then(|t| t.reason.as_deref());
    if current_terminated_reason == Some("OOMKilled") {
        report.push(Problem::scoped(namespace, &scope, "Currently OOMKilled"));
    }
}

/// A pod belongs to a one-shot Job and has already reached a terminal
/// phase. Its Failed/Succeeded state is expected, not a defect.
fn is_terminal_job_pod(pod: &Pod) -> bool {
    let owned_by_job = pod
        .metadata
        .owner_references
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .any(|owner| owner.kind == "Job");
    if !owned_by_job {
        return false;
    }
    let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref());
    let terminal = matches!(phase, Some("Succeeded") | Some("Failed"));
    if terminal {
        debug!(
            pod = pod.metadata.name.as_deref().unwrap_or_default(),
            "skipping terminal job pod"
        );
    }
    terminal
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::{
        ContainerState, ContainerStateTerminated, ContainerStateWaiting, PodStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

    struct FakePods(Vec<Pod>);

    #[async_trait]
    impl PodLister for FakePods {
        async fn list_pods(&self, _namespace: &str) -> Result<Vec<Pod>> {
            Ok(self.0.clone())
        }
    }

    fn pod(name: &str, phase: &str) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.into());
        pod.status = Some(PodStatus {
            phase: Some(phase.into()),
            ..Default::default()
        });
        pod
    }

    fn container(name: &str) -> ContainerStatus {
        ContainerStatus {
            name: name.into(),
            restart_count: 0,
            ..Default::default()
        }
    }

    fn namespaces() -> Vec<String> {
        vec!["nonprod".to_string()]
    }

    #[tokio::test]
    async fn running_pod_with_calm_containers_is_healthy() {
        let mut p = pod("web", "Running");
        p.status.as_mut().unwrap().container_statuses = Some(vec![container("app")]);
        let report = validate_pod_health(&FakePods(vec![p]), &namespaces())
            .await
            .unwrap();
        assert!(report.is_clean());
        assert_eq!(report.scanned, 1);
    }

    #[tokio::test]
    async fn failed_phase_is_a_problem() {
        let report = validate_pod_health(&FakePods(vec![pod("web", "Failed")]), &namespaces())
            .await
            .unwrap();
        assert_eq!(report.problems.len(), 1);
        assert_eq!(report.problems[0].as_str(), "nonprod/web: Phase=Failed");
    }

    #[tokio::test]
    async fn terminal_job_pod_is_excluded_from_both_tallies() {
        let mut job_pod = pod("migrate-abc", "Failed");
        job_pod.metadata.owner_references = Some(vec![OwnerReference {
            kind: "Job".into(),
            name: "migrate".into(),
            ..Default::default()
        }]);
        let healthy = pod("web", "Running");

        let report = validate_pod_health(&FakePods(vec![job_pod, healthy]), &namespaces())
            .await
            .unwrap();
        // The failed job pod appears in neither scanned nor problems.
        assert_eq!(report.scanned, 1);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn running_job_pod_is_still_checked() {
        let mut job_pod = pod("sync-abc", "Running");
        job_pod.metadata.owner_references = Some(vec![OwnerReference {
            kind: "Job".into(),
            name: "sync".into(),
            ..Default::default()
        }]);
        let mut bad = container("worker");
        bad.state = Some(ContainerState {
            waiting: Some(ContainerStateWaiting {
                reason: Some("CrashLoopBackOff".into()),
                ..Default::default()
            }),
            ..Default::default()
        });
        job_pod.status.as_mut().unwrap().container_statuses = Some(vec![bad]);

        let report = validate_pod_health(&FakePods(vec![job_pod]), &namespaces())
            .await
            .unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(
            report.problems[0].as_str(),
            "nonprod/sync-abc/worker: CrashLoopBackOff"
        );
    }

    #[tokio::test]
    async fn restart_threshold_is_strictly_greater_than_five() {
        let mut p = pod("web", "Running");
        let mut at_limit = container("app");
        at_limit.restart_count = 5;
        let mut over_limit = container("sidecar");
        over_limit.restart_count = 6;
        p.status.as_mut().unwrap().container_statuses = Some(vec![at_limit, over_limit]);

        let report = validate_pod_health(&FakePods(vec![p]), &namespaces())
            .await
            .unwrap();
        assert_eq!(report.problems.len(), 1);
        assert_eq!(report.problems[0].as_str(), "nonprod/web/sidecar: 6 restarts");
    }

    #[tokio::test]
    async fn oom_kills_are_reported_for_last_and_current_state() {
        let mut p = pod("web", "Running");
        let mut oom = container("app");
        oom.last_state = Some(ContainerState {
            terminated: Some(ContainerStateTerminated {
                reason: Some("OOMKilled".into()),
                ..Default::default()
            }),
            ..Default::default()
        });
        oom.state = Some(ContainerState {
            terminated: Some(ContainerStateTerminated {
                reason: Some("OOMKilled".into()),
                ..Default::default()
            }),
            ..Default::default()
        });
        p.status.as_mut().unwrap().container_statuses = Some(vec![oom]);

        let report = validate_pod_health(&FakePods(vec![p]), &namespaces())
            .await
            .unwrap();
        let texts: Vec<&str> = report.problems.iter().map(Problem::as_str).collect();
        assert_eq!(
            texts,
            vec![
                "nonprod/web/app: OOMKilled",
                "nonprod/web/app: Currently OOMKilled"
            ]
        );
    }

    #[tokio::test]
    async fn repeated_runs_yield_identical_reports() {
        let mut p = pod("web", "Running");
        let mut bad = container("app");
        bad.restart_count = 9;
        p.status.as_mut().unwrap().container_statuses = Some(vec![bad]);
        let fake = FakePods(vec![p]);

        let first = validate_pod_health(&fake, &namespaces()).await.unwrap();
        let second = validate_pod_health(&fake, &namespaces()).await.unwrap();
        assert_eq!(first.problems, second.problems);
        assert_eq!(first.scanned, second.scanned);
    }
}

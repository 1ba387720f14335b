//! Job failure validator and completion wait
//!
//! A Job is a true failure only when it reports `Failed=True` without also
//! reporting `Complete=True` — jobs that failed attempts but eventually
//! succeeded are healthy. Failures whose name matches an exclusion pattern
//! are downgraded to warnings so known-flaky maintenance jobs do not fail
//! a whole validation run.

use k8s_openapi::api::batch::v1::Job;
use tracing::{info, warn};

use crate::cluster::JobLister;
use crate::error::Result;
use crate::poll::{poll_until, Lookup, PollConfig, PollOutcome, PollStep};
use crate::report::{Problem, ValidationReport};

/// Exclusion pattern match: a trailing `*` makes it a prefix pattern,
/// anything else matches as a substring.
pub fn exclusion_matches(pattern: &str, job_name: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => job_name.starts_with(prefix),
        None => job_name.contains(pattern),
    }
}

/// Check for truly-failed Jobs across the given namespaces.
pub async fn validate_failed_jobs(
    jobs: &impl JobLister,
    namespaces: &[String],
    exclude: &[String],
) -> Result<ValidationReport> {
    let mut report = ValidationReport::new();

    for namespace in namespaces {
        for job in jobs.list_jobs(namespace).await? {
            report.scanned += 1;
            let name = job.metadata.name.clone().unwrap_or_default();

            if !is_truly_failed(&job) {
                continue;
            }

            let attempts = job.status.as_ref().and_then(|s| s.failed).unwrap_or(0);
            let finding = Problem::scoped(
                namespace,
                &name,
                format!("Failed (attempts: {attempts})"),
            );

            if exclude.iter().any(|p| exclusion_matches(p, &name)) {
                warn!(namespace, job = %name, attempts, "failed job matches exclusion, downgraded to warning");
                report.warn(finding);
            } else {
                report.push(finding);
            }
        }
    }

    info!(
        jobs = report.scanned,
        failures = report.problems.len(),
        excluded = report.warnings.len(),
        "job failure scan complete"
    );
    Ok(report)
}

fn is_truly_failed(job: &Job) -> bool {
    let mut failed = false;
    let mut complete = false;
    if let Some(conditions) = job.status.as_ref().and_then(|s| s.conditions.as_ref()) {
        for condition in conditions {
            if condition.type_ == "Failed" && condition.status == "True" {
                failed = true;
            }
            if condition.type_ == "Complete" && condition.status == "True" {
                complete = true;
            }
        }
    }
    failed && !complete
}

/// Terminal state of a bounded job wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobWaitResult {
    Succeeded,
    Failed,
    TimedOut,
}

/// Wait for a Job to finish, using the completion poll profile by default
/// (300s/5s). The Job not existing yet is treated as pending.
pub async fn wait_for_job(
    jobs: &impl JobLister,
    namespace: &str,
    name: &str,
    config: PollConfig,
) -> Result<JobWaitResult> {
    let outcome = poll_until(config, || async move {
        match jobs.get_job(namespace, name).await? {
            Lookup::NotFound => Ok(PollStep::Pending("job not found yet".to_string())),
            Lookup::Found(job) => {
                let status = job.status.unwrap_or_default();
                let succeeded = status.succeeded.unwrap_or(0);
                let failed = status.failed.unwrap_or(0);
                let summary = format!("succeeded={succeeded} failed={failed}");
                if succeeded > 0 {
                    Ok(PollStep::Done(summary))
                } else if failed > 0 {
                    Ok(PollStep::Abort(summary))
                } else {
                    Ok(PollStep::Pending(summary))
                }
            }
        }
    })
    .await?;

    Ok(match outcome {
        PollOutcome::Succeeded { .. } => JobWaitResult::Succeeded,
        PollOutcome::Failed { .. } => JobWaitResult::Failed,
        PollOutcome::TimedOut { last, .. } => {
            warn!(
                namespace,
                job = name,
                last = last.as_deref().unwrap_or("never observed"),
                "timed out waiting for job completion"
            );
            JobWaitResult::TimedOut
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use k8s_openapi::api::batch::v1::{JobCondition, JobStatus};

    struct FakeJobs(Vec<Job>);

    #[async_trait]
    impl JobLister for FakeJobs {
        async fn list_jobs(&self, _namespace: &str) -> Result<Vec<Job>> {
            Ok(self.0.clone())
        }

        async fn get_job(&self, _namespace: &str, name: &str) -> Result<Lookup<Job>> {
            Ok(self
                .0
                .iter()
                .find(|j| j.metadata.name.as_deref() == Some(name))
                .cloned()
                .map(Lookup::Found)
                .unwrap_or(Lookup::NotFound))
        }
    }

    fn job(name: &str, failed: i32, succeeded: i32, conditions: Vec<(&str, &str)>) -> Job {
        let mut job = Job::default();
        job.metadata.name = Some(name.into());
        job.status = Some(JobStatus {
            failed: (failed > 0).then_some(failed),
            succeeded: (succeeded > 0).then_some(succeeded),
            conditions: Some(
                conditions
                    .into_iter()
                    .map(|(type_, status)| JobCondition {
                        type_: type_.into(),
                        status: status.into(),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        });
        job
    }

    fn namespaces() -> Vec<String> {
        vec!["nonprod".to_string()]
    }

    #[tokio::test]
    async fn eventual_success_is_not_a_failure() {
        // failed=2 but the job completed in the end.
        let j = job("migrate", 2, 1, vec![("Complete", "True")]);
        let report = validate_failed_jobs(&FakeJobs(vec![j]), &namespaces(), &[])
            .await
            .unwrap();
        assert!(report.is_clean());
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn truly_failed_job_yields_exactly_one_problem() {
        let j = job(
            "migrate",
            2,
            0,
            vec![("Failed", "True"), ("Complete", "False")],
        );
        let report = validate_failed_jobs(&FakeJobs(vec![j]), &namespaces(), &[])
            .await
            .unwrap();
        assert_eq!(report.problems.len(), 1);
        assert_eq!(
            report.problems[0].as_str(),
            "nonprod/migrate: Failed (attempts: 2)"
        );
    }

    #[tokio::test]
    async fn job_without_conditions_is_not_failed() {
        let mut j = Job::default();
        j.metadata.name = Some("quiet".into());
        j.status = Some(JobStatus::default());
        let report = validate_failed_jobs(&FakeJobs(vec![j]), &namespaces(), &[])
            .await
            .unwrap();
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn exclusions_downgrade_to_warnings() {
        let j = job("cleanup-hourly-xyz", 1, 0, vec![("Failed", "True")]);
        let report = validate_failed_jobs(
            &FakeJobs(vec![j]),
            &namespaces(),
            &["cleanup-hourly*".to_string()],
        )
        .await
        .unwrap();
        assert!(report.is_clean());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn exclusion_pattern_semantics() {
        assert!(exclusion_matches("cleanup*", "cleanup-hourly"));
        assert!(!exclusion_matches("cleanup*", "db-cleanup"));
        // No star means substring.
        assert!(exclusion_matches("cleanup", "db-cleanup-hourly"));
        assert!(!exclusion_matches("cleanup", "sweeper"));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_job_reports_success() {
        let j = job("batch", 0, 1, vec![("Complete", "True")]);
        let result = wait_for_job(
            &FakeJobs(vec![j]),
            "nonprod",
            "batch",
            PollConfig::completion(),
        )
        .await
        .unwrap();
        assert_eq!(result, JobWaitResult::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_missing_job_times_out() {
        let result = wait_for_job(
            &FakeJobs(vec![]),
            "nonprod",
            "ghost",
            PollConfig::new(std::time::Duration::from_secs(20), std::time::Duration::from_secs(5)),
        )
        .await
        .unwrap();
        assert_eq!(result, JobWaitResult::TimedOut);
    }
}

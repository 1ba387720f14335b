//! ArgoCD Application validator
//!
//! Health and sync are checked independently so one degraded-and-drifted
//! app reports two problems. Finding zero Applications in scope is a
//! caller error (the scope is wrong), not a transient condition.

use kube::ResourceExt;
use tracing::{debug, info};

use crate::cluster::ApplicationLister;
use crate::crd::{HealthState, SyncState};
use crate::error::{Error, Result};
use crate::poll::Lookup;
use crate::report::{Problem, ValidationReport};

/// Check every ArgoCD Application in scope for Healthy + Synced.
pub async fn validate_applications(
    apps: &impl ApplicationLister,
    namespace_filter: Option<&str>,
) -> Result<ValidationReport> {
    let items = match namespace_filter {
        Some(namespace) => match apps.list_applications(namespace).await? {
            Lookup::Found(items) => items,
            Lookup::NotFound => {
                return Err(Error::EmptyScope {
                    kind: "ArgoCD Applications",
                    scope: namespace.to_string(),
                })
            }
        },
        None => apps.list_all_applications().await?,
    };

    if items.is_empty() {
        return Err(Error::EmptyScope {
            kind: "ArgoCD Applications",
            scope: namespace_filter.unwrap_or("<cluster>").to_string(),
        });
    }

    let mut report = ValidationReport::new();
    for app in &items {
        report.scanned += 1;
        let name = app.name_any();
        let namespace = app.namespace().unwrap_or_default();
        let health = app.health_state();
        let sync = app.sync_state();

        if health != HealthState::Healthy {
            report.push(Problem::scoped(
                &namespace,
                &name,
                format!("Health={health} (expected Healthy)"),
            ));
        }
        if sync != SyncState::Synced {
            report.push(Problem::scoped(
                &namespace,
                &name,
                format!("Sync={sync} (expected Synced)"),
            ));
        }
        debug!(app = %name, %health, %sync, "application status");
    }

    if report.is_clean() {
        info!(apps = report.scanned, "all applications healthy and synced");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        Application, ApplicationSpec, ApplicationStatus, HealthInfo, SyncInfo,
    };
    use async_trait::async_trait;

    struct FakeApps(Vec<Application>);

    #[async_trait]
    impl ApplicationLister for FakeApps {
        async fn list_applications(&self, _namespace: &str) -> Result<Lookup<Vec<Application>>> {
            Ok(Lookup::Found(self.0.clone()))
        }

        async fn list_all_applications(&self) -> Result<Vec<Application>> {
            Ok(self.0.clone())
        }
    }

    fn app(name: &str, health: &str, sync: &str) -> Application {
        let mut app = Application::new(name, ApplicationSpec::default());
        app.metadata.namespace = Some("argocd".into());
        app.status = Some(ApplicationStatus {
            health: HealthInfo {
                status: health.to_string().into(),
            },
            sync: SyncInfo {
                status: sync.to_string().into(),
                revision: None,
            },
        });
        app
    }

    #[tokio::test]
    async fn healthy_synced_apps_are_clean() {
        let fake = FakeApps(vec![app("web", "Healthy", "Synced")]);
        let report = validate_applications(&fake, Some("argocd")).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.scanned, 1);
    }

    #[tokio::test]
    async fn both_axes_fire_for_one_app() {
        let fake = FakeApps(vec![app("web", "Degraded", "OutOfSync")]);
        let report = validate_applications(&fake, Some("argocd")).await.unwrap();
        let texts: Vec<&str> = report.problems.iter().map(|p| p.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "argocd/web: Health=Degraded (expected Healthy)",
                "argocd/web: Sync=OutOfSync (expected Synced)"
            ]
        );
    }

    #[tokio::test]
    async fn empty_scope_is_a_caller_error() {
        let fake = FakeApps(vec![]);
        let err = validate_applications(&fake, Some("argocd")).await.unwrap_err();
        assert!(matches!(err, Error::EmptyScope { .. }));
    }
}

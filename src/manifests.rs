//! Manifest generation for scenario fixtures
//!
//! Builds the YAML committed to the GitOps repository by the end-to-end
//! deployment scenario: a tenant Namespace, the ArgoCD AppProject scoping
//! it, and the directory-generator ApplicationSet that turns committed
//! app directories into Applications. Values are assembled as
//! `serde_json::Value` trees and rendered with `serde_yaml`, never by
//! string templating.

use serde_json::json;

use crate::error::Result;

/// Inputs shared by the tenant-environment manifests.
#[derive(Debug, Clone)]
pub struct TenantEnv {
    /// Environment namespace, e.g. `nonprod`.
    pub namespace: String,
    /// GitHub organization owning the deployment repository.
    pub github_org: String,
    /// Deployment-configurations repository name.
    pub config_repo: String,
    /// Full platform domain, e.g. `nonprod.jupiter.example.io`.
    pub domain: String,
    /// Namespace the ArgoCD control plane runs in.
    pub argocd_namespace: String,
}

impl TenantEnv {
    /// The environment namespace is the first label of the platform
    /// domain (`nonprod.jupiter.example.io` -> `nonprod`).
    pub fn namespace_from_domain(domain: &str) -> &str {
        domain.split('.').next().unwrap_or(domain)
    }

    pub fn repo_url(&self) -> String {
        format!("https://github.com/{}/{}", self.github_org, self.config_repo)
    }
}

/// Namespace manifest for the tenant environment.
pub fn namespace_manifest(namespace: &str) -> Result<String> {
    let manifest = json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {
            "name": namespace,
            "labels": { "kubernetes.io/metadata.name": namespace }
        }
    });
    Ok(serde_yaml::to_string(&manifest)?)
}

/// AppProject scoping the tenant's Applications to its namespace and its
/// own GitHub organization's repositories.
pub fn app_project_manifest(env: &TenantEnv) -> Result<String> {
    let manifest = json!({
        "apiVersion": "argoproj.io/v1alpha1",
        "kind": "AppProject",
        "metadata": {
            "name": env.namespace,
            "namespace": env.argocd_namespace,
        },
        "spec": {
            "sourceNamespaces": [env.namespace],
            "clusterResourceBlacklist": [
                { "group": "*", "kind": "*" }
            ],
            "namespaceResourceBlacklist": [
                { "group": "*", "kind": "Namespace" },
                { "group": "*", "kind": "CustomResourceDefinition" }
            ],
            "destinations": [
                { "name": "*", "namespace": env.namespace, "server": "*" }
            ],
            "sourceRepos": [
                format!("https://github.com/{}/*", env.github_org)
            ]
        }
    });
    Ok(serde_yaml::to_string(&manifest)?)
}

/// Directory-generator ApplicationSet: every `apps/<name>/envs/<env>`
/// directory committed to the repository becomes one Application deployed
/// into the tenant namespace.
pub fn application_set_manifest(env: &TenantEnv) -> Result<String> {
    let app_name = r#"{{ index .path.segments 1 | replace "." "-" | replace "_" "-" }}-{{ .path.basenameNormalized }}"#;
    let manifest = json!({
        "apiVersion": "argoproj.io/v1alpha1",
        "kind": "ApplicationSet",
        "metadata": {
            "name": format!("{}-application-set", env.namespace),
            "namespace": env.argocd_namespace,
        },
        "spec": {
            "goTemplate": true,
            "generators": [
                {
                    "git": {
                        "repoURL": env.repo_url(),
                        "revision": "main",
                        "directories": [
                            { "path": "apps/*/envs/*" }
                        ]
                    }
                }
            ],
            "template": {
                "metadata": {
                    "name": app_name,
                    "namespace": env.argocd_namespace,
                },
                "spec": {
                    "project": env.namespace,
                    "destination": {
                        "namespace": env.namespace,
                        "server": "https://kubernetes.default.svc"
                    },
                    "sources": [
                        {
                            "repoURL": env.repo_url(),
                            "targetRevision": "main",
                            "path": "{{ .path.path }}",
                            "helm": {
                                "ignoreMissingValueFiles": true,
                                "values": format!(
                                    "platform_domain: {}\napp_name: '{}'\n",
                                    env.domain, app_name
                                )
                            }
                        }
                    ],
                    "syncPolicy": {
                        "automated": { "prune": true, "selfHeal": true },
                        "retry": {
                            "limit": 2,
                            "backoff": { "duration": "5s", "factor": 2, "maxDuration": "3m0s" }
                        },
                        "syncOptions": ["CreateNamespace=true"]
                    }
                }
            }
        }
    });
    Ok(serde_yaml::to_string(&manifest)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> TenantEnv {
        TenantEnv {
            namespace: "nonprod".into(),
            github_org: "tenant-jupiter".into(),
            config_repo: "deployment-configurations".into(),
            domain: "nonprod.jupiter.example.io".into(),
            argocd_namespace: "argocd".into(),
        }
    }

    #[test]
    fn namespace_comes_from_the_first_domain_label() {
        assert_eq!(
            TenantEnv::namespace_from_domain("nonprod.jupiter.example.io"),
            "nonprod"
        );
        assert_eq!(TenantEnv::namespace_from_domain("bare"), "bare");
    }

    #[test]
    fn namespace_manifest_round_trips() {
        let yaml = namespace_manifest("nonprod").unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed["kind"], "Namespace");
        assert_eq!(parsed["metadata"]["name"], "nonprod");
    }

    #[test]
    fn app_project_scopes_destinations_to_the_namespace() {
        let yaml = app_project_manifest(&env()).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed["spec"]["destinations"][0]["namespace"], "nonprod");
        assert_eq!(
            parsed["spec"]["sourceRepos"][0],
            "https://github.com/tenant-jupiter/*"
        );
    }

    #[test]
    fn application_set_points_at_the_deployment_repo() {
        let yaml = application_set_manifest(&env()).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(
            parsed["spec"]["generators"][0]["git"]["repoURL"],
            "https://github.com/tenant-jupiter/deployment-configurations"
        );
        assert_eq!(
            parsed["spec"]["template"]["spec"]["destination"]["namespace"],
            "nonprod"
        );
        assert_eq!(
            parsed["spec"]["template"]["spec"]["project"],
            "nonprod"
        );
    }
}

//! Cluster access seams
//!
//! The validators and the orchestrator never hold a raw `kube::Client`;
//! they declare exactly the verbs they need through narrow capability
//! traits, so tests substitute in-memory fakes and production code wires
//! in [`ClusterClient`]. Verbs are read-only except for the single
//! refresh annotation patch on ArgoCD Applications.

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Namespace, Pod, Secret};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use tracing::debug;

use crate::crd::{Application, Certificate};
use crate::error::Result;
use crate::poll::{lookup_from_kube, Lookup};

#[async_trait]
pub trait NamespaceLister {
    async fn list_namespace_names(&self) -> Result<Vec<String>>;
}

#[async_trait]
pub trait PodLister {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>>;
}

#[async_trait]
pub trait JobLister {
    async fn list_jobs(&self, namespace: &str) -> Result<Vec<Job>>;
    async fn get_job(&self, namespace: &str, name: &str) -> Result<Lookup<Job>>;
}

#[async_trait]
pub trait IngressLister {
    async fn list_ingresses(&self, namespace: &str) -> Result<Vec<Ingress>>;
    async fn list_all_ingresses(&self) -> Result<Vec<Ingress>>;
}

#[async_trait]
pub trait SecretReader {
    async fn read_secret(&self, namespace: &str, name: &str) -> Result<Lookup<Secret>>;
}

#[async_trait]
pub trait ApplicationLister {
    /// List Applications in one namespace. `NotFound` covers the window
    /// where the namespace (or the CRD itself) does not exist yet.
    async fn list_applications(&self, namespace: &str) -> Result<Lookup<Vec<Application>>>;

    async fn list_all_applications(&self) -> Result<Vec<Application>>;
}

#[async_trait]
pub trait ApplicationReader {
    async fn get_application(&self, namespace: &str, name: &str) -> Result<Lookup<Application>>;
}

#[async_trait]
pub trait ApplicationRefresher {
    /// Ask the GitOps controller to reconcile sooner. A failure here is
    /// fatal to the caller, never retried.
    async fn request_refresh(&self, namespace: &str, name: &str) -> Result<()>;
}

#[async_trait]
pub trait CertificateReader {
    async fn get_certificate(&self, namespace: &str, name: &str) -> Result<Lookup<Certificate>>;
}

/// Production implementation of every capability trait over one
/// `kube::Client`.
#[derive(Clone)]
pub struct ClusterClient {
    client: Client,
}

impl ClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the ambient kubeconfig/in-cluster configuration.
    pub async fn try_default() -> Result<Self> {
        Ok(Self::new(Client::try_default().await?))
    }
}

#[async_trait]
impl NamespaceLister for ClusterClient {
    async fn list_namespace_names(&self) -> Result<Vec<String>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespaces = api.list(&ListParams::default()).await?;
        Ok(namespaces.items.iter().map(|ns| ns.name_any()).collect())
    }
}

#[async_trait]
impl PodLister for ClusterClient {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }
}

#[async_trait]
impl JobLister for ClusterClient {
    async fn list_jobs(&self, namespace: &str) -> Result<Vec<Job>> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Lookup<Job>> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        lookup_from_kube(api.get(name).await)
    }
}

#[async_trait]
impl IngressLister for ClusterClient {
    async fn list_ingresses(&self, namespace: &str) -> Result<Vec<Ingress>> {
        let api: Api<Ingress> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn list_all_ingresses(&self) -> Result<Vec<Ingress>> {
        let api: Api<Ingress> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }
}

#[async_trait]
impl SecretReader for ClusterClient {
    async fn read_secret(&self, namespace: &str, name: &str) -> Result<Lookup<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        lookup_from_kube(api.get(name).await)
    }
}

#[async_trait]
impl ApplicationLister for ClusterClient {
    async fn list_applications(&self, namespace: &str) -> Result<Lookup<Vec<Application>>> {
        let api: Api<Application> = Api::namespaced(self.client.clone(), namespace);
        match lookup_from_kube(api.list(&ListParams::default()).await)? {
            Lookup::Found(list) => Ok(Lookup::Found(list.items)),
            Lookup::NotFound => Ok(Lookup::NotFound),
        }
    }

    async fn list_all_applications(&self) -> Result<Vec<Application>> {
        let api: Api<Application> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }
}

#[async_trait]
impl ApplicationReader for ClusterClient {
    async fn get_application(&self, namespace: &str, name: &str) -> Result<Lookup<Application>> {
        let api: Api<Application> = Api::namespaced(self.client.clone(), namespace);
        lookup_from_kube(api.get(name).await)
    }
}

#[async_trait]
impl ApplicationRefresher for ClusterClient {
    async fn request_refresh(&self, namespace: &str, name: &str) -> Result<()> {
        debug!(namespace, name, "annotating Application for refresh");
        let api: Api<Application> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({
            "metadata": {
                "annotations": { "argocd.argoproj.io/refresh": "normal" }
            }
        });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CertificateReader for ClusterClient {
    async fn get_certificate(&self, namespace: &str, name: &str) -> Result<Lookup<Certificate>> {
        let api: Api<Certificate> = Api::namespaced(self.client.clone(), namespace);
        lookup_from_kube(api.get(name).await)
    }
}

/// Which namespaces a validation pass covers.
///
/// A namespace is in scope when it starts with any configured prefix or
/// equals any extra name. An empty config means every namespace.
#[derive(Debug, Clone, Default)]
pub struct ScopeConfig {
    pub prefixes: Vec<String>,
    pub extra: Vec<String>,
}

impl ScopeConfig {
    pub fn new(prefixes: Vec<String>, extra: Vec<String>) -> Self {
        Self { prefixes, extra }
    }

    pub fn matches(&self, namespace: &str) -> bool {
        if self.prefixes.is_empty() && self.extra.is_empty() {
            return true;
        }
        self.prefixes.iter().any(|p| namespace.starts_with(p.as_str()))
            || self.extra.iter().any(|e| e == namespace)
    }
}

/// Resolve the namespaces to validate: a single filtered namespace, or
/// every cluster namespace matching `scope`.
pub async fn platform_namespaces(
    lister: &impl NamespaceLister,
    filter: Option<&str>,
    scope: &ScopeConfig,
) -> Result<Vec<String>> {
    if let Some(namespace) = filter {
        return Ok(vec![namespace.to_string()]);
    }
    let all = lister.list_namespace_names().await?;
    Ok(all.into_iter().filter(|ns| scope.matches(ns)).collect())
}

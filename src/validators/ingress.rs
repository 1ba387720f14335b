//! Ingress configuration validator
//!
//! Requires each Ingress to carry a spec with at least one rule, a
//! non-empty host on every rule, and a populated load-balancer status.
//! Each unmet requirement is its own problem — an ingress with an empty
//! host *and* no load balancer reports both.

use k8s_openapi::api::networking::v1::Ingress;
use tracing::{debug, info};

use crate::cluster::IngressLister;
use crate::error::Result;
use crate::report::{Problem, ValidationReport};

/// Host/load-balancer pairing extracted from one Ingress, the
/// expected-value side of the DNS cross-check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressRecord {
    pub namespace: String,
    pub name: String,
    pub hosts: Vec<String>,
    pub lb_ips: Vec<String>,
    pub lb_hostnames: Vec<String>,
}

/// Validate Ingress configuration across the given namespaces.
pub async fn validate_ingress_configuration(
    ingresses: &impl IngressLister,
    namespaces: &[String],
) -> Result<ValidationReport> {
    let mut report = ValidationReport::new();

    for namespace in namespaces {
        for ingress in ingresses.list_ingresses(namespace).await? {
            report.scanned += 1;
            let name = ingress.metadata.name.clone().unwrap_or_default();
            check_ingress(&mut report, namespace, &name, &ingress);
        }
    }

    if report.is_clean() {
        info!(ingresses = report.scanned, "all ingresses properly configured");
    }
    Ok(report)
}

fn check_ingress(report: &mut ValidationReport, namespace: &str, name: &str, ingress: &Ingress) {
    let Some(spec) = ingress.spec.as_ref() else {
        report.push(Problem::scoped(namespace, name, "Missing spec"));
        return;
    };

    let rules = spec.rules.as_deref().unwrap_or(&[]);
    if rules.is_empty() {
        report.push(Problem::scoped(namespace, name, "No rules defined"));
    }
    for (index, rule) in rules.iter().enumerate() {
        let host_is_empty = rule
            .host
            .as_deref()
            .map(|h| h.trim().is_empty())
            .unwrap_or(true);
        if host_is_empty {
            report.push(Problem::scoped(
                namespace,
                name,
                format!("Rule {index} has empty host"),
            ));
        }
    }

    let Some(lb) = ingress
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
    else {
        report.push(Problem::scoped(namespace, name, "No load balancer status"));
        return;
    };

    let entries = lb.ingress.as_deref().unwrap_or(&[]);
    if entries.is_empty() {
        report.push(Problem::scoped(
            namespace,
            name,
            "Load balancer has no ingress",
        ));
        return;
    }

    let has_address = entries
        .iter()
        .any(|entry| entry.ip.is_some() || entry.hostname.is_some());
    if !has_address {
        report.push(Problem::scoped(
            namespace,
            name,
            "Load balancer has no IP or hostname",
        ));
    }
}

/// Extract the host/LB pairings of every Ingress in scope. Hosts and
/// addresses keep cluster order.
pub async fn ingress_records(
    ingresses: &impl IngressLister,
    namespaces: &[String],
) -> Result<Vec<IngressRecord>> {
    let mut records = Vec::new();
    for namespace in namespaces {
        for ingress in ingresses.list_ingresses(namespace).await? {
            let name = ingress.metadata.name.clone().unwrap_or_default();

            let hosts: Vec<String> = ingress
                .spec
                .as_ref()
                .and_then(|s| s.rules.as_ref())
                .map(|rules| {
                    rules
                        .iter()
                        .filter_map(|r| r.host.clone())
                        .filter(|h| !h.trim().is_empty())
                        .collect()
                })
                .unwrap_or_default();

            let entries = ingress
                .status
                .as_ref()
                .and_then(|s| s.load_balancer.as_ref())
                .and_then(|lb| lb.ingress.as_deref())
                .unwrap_or(&[]);
            let lb_ips: Vec<String> = entries.iter().filter_map(|e| e.ip.clone()).collect();
            let lb_hostnames: Vec<String> =
                entries.iter().filter_map(|e| e.hostname.clone()).collect();

            records.push(IngressRecord {
                namespace: namespace.clone(),
                name,
                hosts,
                lb_ips,
                lb_hostnames,
            });
        }
    }
    Ok(records)
}

/// First load-balancer IP reported by any Ingress of the given class.
pub async fn load_balancer_ip_for_class(
    ingresses: &impl IngressLister,
    class_name: &str,
    namespace: Option<&str>,
) -> Result<Option<String>> {
    let candidates = match namespace {
        Some(ns) => ingresses.list_ingresses(ns).await?,
        None => ingresses.list_all_ingresses().await?,
    };

    for ingress in candidates {
        let class_matches = ingress
            .spec
            .as_ref()
            .and_then(|s| s.ingress_class_name.as_deref())
            == Some(class_name);
        if !class_matches {
            continue;
        }
        let ip = ingress
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref())
            .and_then(|entries| entries.iter().find_map(|e| e.ip.clone()));
        if let Some(ip) = ip {
            debug!(class = class_name, %ip, "found load balancer IP");
            return Ok(Some(ip));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use k8s_openapi::api::networking::v1::{
        IngressLoadBalancerIngress, IngressLoadBalancerStatus, IngressRule, IngressSpec,
        IngressStatus,
    };

    struct FakeIngresses(Vec<Ingress>);

    #[async_trait]
    impl IngressLister for FakeIngresses {
        async fn list_ingresses(&self, _namespace: &str) -> Result<Vec<Ingress>> {
            Ok(self.0.clone())
        }

        async fn list_all_ingresses(&self) -> Result<Vec<Ingress>> {
            Ok(self.0.clone())
        }
    }

    fn ingress(name: &str, hosts: &[&str], lb_ips: &[&str]) -> Ingress {
        let mut ing = Ingress::default();
        ing.metadata.name = Some(name.into());
        ing.spec = Some(IngressSpec {
            rules: Some(
                hosts
                    .iter()
                    .map(|h| IngressRule {
                        host: (!h.is_empty()).then(|| h.to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        });
        if !lb_ips.is_empty() {
            ing.status = Some(IngressStatus {
                load_balancer: Some(IngressLoadBalancerStatus {
                    ingress: Some(
                        lb_ips
                            .iter()
                            .map(|ip| IngressLoadBalancerIngress {
                                ip: Some(ip.to_string()),
                                ..Default::default()
                            })
                            .collect(),
                    ),
                }),
            });
        }
        ing
    }

    fn namespaces() -> Vec<String> {
        vec!["nonprod".to_string()]
    }

    #[tokio::test]
    async fn well_formed_ingress_is_clean() {
        let ing = ingress("web", &["app.example.com"], &["1.2.3.4"]);
        let report = validate_ingress_configuration(&FakeIngresses(vec![ing]), &namespaces())
            .await
            .unwrap();
        assert!(report.is_clean());
        assert_eq!(report.scanned, 1);
    }

    #[tokio::test]
    async fn empty_host_and_missing_lb_fire_independently() {
        // One rule with an empty host AND no load balancer status.
        let ing = ingress("web", &[""], &[]);
        let report = validate_ingress_configuration(&FakeIngresses(vec![ing]), &namespaces())
            .await
            .unwrap();
        let texts: Vec<&str> = report.problems.iter().map(|p| p.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "nonprod/web: Rule 0 has empty host",
                "nonprod/web: No load balancer status"
            ]
        );
    }

    #[tokio::test]
    async fn whitespace_host_counts_as_empty() {
        let mut ing = ingress("web", &[], &["1.2.3.4"]);
        ing.spec.as_mut().unwrap().rules = Some(vec![IngressRule {
            host: Some("   ".into()),
            ..Default::default()
        }]);
        let report = validate_ingress_configuration(&FakeIngresses(vec![ing]), &namespaces())
            .await
            .unwrap();
        assert_eq!(report.problems[0].as_str(), "nonprod/web: Rule 0 has empty host");
    }

    #[tokio::test]
    async fn missing_spec_short_circuits() {
        let mut ing = Ingress::default();
        ing.metadata.name = Some("bare".into());
        let report = validate_ingress_configuration(&FakeIngresses(vec![ing]), &namespaces())
            .await
            .unwrap();
        assert_eq!(report.problems.len(), 1);
        assert_eq!(report.problems[0].as_str(), "nonprod/bare: Missing spec");
    }

    #[tokio::test]
    async fn lb_entry_without_address_is_flagged() {
        let mut ing = ingress("web", &["app.example.com"], &[]);
        ing.status = Some(IngressStatus {
            load_balancer: Some(IngressLoadBalancerStatus {
                ingress: Some(vec![IngressLoadBalancerIngress::default()]),
            }),
        });
        let report = validate_ingress_configuration(&FakeIngresses(vec![ing]), &namespaces())
            .await
            .unwrap();
        assert_eq!(
            report.problems[0].as_str(),
            "nonprod/web: Load balancer has no IP or hostname"
        );
    }

    #[tokio::test]
    async fn records_capture_hosts_and_ips() {
        let ing = ingress("web", &["a.example.com", "b.example.com"], &["1.2.3.4"]);
        let records = ingress_records(&FakeIngresses(vec![ing]), &namespaces())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].hosts, vec!["a.example.com", "b.example.com"]);
        assert_eq!(records[0].lb_ips, vec!["1.2.3.4"]);
    }

    #[tokio::test]
    async fn lb_ip_lookup_filters_by_class() {
        let mut with_class = ingress("public-web", &["app.example.com"], &["9.9.9.9"]);
        with_class.spec.as_mut().unwrap().ingress_class_name = Some("public".into());
        let other = ingress("internal-web", &["int.example.com"], &["10.0.0.1"]);

        let fake = FakeIngresses(vec![other, with_class]);
        let ip = load_balancer_ip_for_class(&fake, "public", None).await.unwrap();
        assert_eq!(ip.as_deref(), Some("9.9.9.9"));

        let missing = load_balancer_ip_for_class(&fake, "absent", None).await.unwrap();
        assert!(missing.is_none());
    }
}

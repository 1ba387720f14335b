//! DNS cross-checks against a pinned public resolver
//!
//! Ingress hosts must resolve, through real public DNS, to the load
//! balancer IPs the cluster reports. Resolution is pinned to an explicit
//! nameserver so results do not depend on the host's stub resolver or
//! any split-horizon view. Each failure mode gets a distinct problem
//! text: NXDOMAIN, an empty answer, a timeout, and an IP mismatch all
//! mean different operational faults.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::TokioAsyncResolver;
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::report::{Problem, ValidationReport};
use crate::validators::IngressRecord;

/// Pinned-resolver settings. Defaults to Cloudflare public DNS over UDP.
#[derive(Debug, Clone)]
pub struct DnsCheckConfig {
    pub nameserver: IpAddr,
    pub port: u16,
    pub timeout: Duration,
}

impl Default for DnsCheckConfig {
    fn default() -> Self {
        Self {
            nameserver: IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
            port: 53,
            timeout: Duration::from_secs(5),
        }
    }
}

/// One A-record lookup outcome, already classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsAnswer {
    Records(Vec<Ipv4Addr>),
    NxDomain,
    NoRecords,
    Timeout,
    Failed(String),
}

/// Seam between the DNS check and the network, so tests script answers.
#[async_trait]
pub trait DnsResolver {
    async fn lookup_ipv4(&self, host: &str) -> Result<DnsAnswer>;
}

/// Production resolver pinned to one nameserver.
pub struct PinnedResolver {
    resolver: TokioAsyncResolver,
}

impl PinnedResolver {
    pub fn new(config: &DnsCheckConfig) -> Self {
        let mut resolver_config = ResolverConfig::new();
        resolver_config.add_name_server(NameServerConfig::new(
            SocketAddr::new(config.nameserver, config.port),
            Protocol::Udp,
        ));
        let mut opts = ResolverOpts::default();
        opts.timeout = config.timeout;
        // One authoritative answer per check; caching would hide flapping.
        opts.cache_size = 0;
        Self {
            resolver: TokioAsyncResolver::tokio(resolver_config, opts),
        }
    }
}

#[async_trait]
impl DnsResolver for PinnedResolver {
    async fn lookup_ipv4(&self, host: &str) -> Result<DnsAnswer> {
        match self.resolver.ipv4_lookup(host).await {
            Ok(lookup) => Ok(DnsAnswer::Records(
                lookup.iter().map(|a| a.0).collect(),
            )),
            Err(err) => Ok(match err.kind() {
                ResolveErrorKind::NoRecordsFound { response_code, .. } => {
                    if *response_code == ResponseCode::NXDomain {
                        DnsAnswer::NxDomain
                    } else {
                        DnsAnswer::NoRecords
                    }
                }
                ResolveErrorKind::Timeout => DnsAnswer::Timeout,
                _ => DnsAnswer::Failed(err.to_string()),
            }),
        }
    }
}

/// Cross-check every Ingress host against public DNS.
///
/// Ingresses with no load balancer IP (hostname-only LBs included) and
/// rules without hosts are skipped; they are configuration concerns for
/// [`crate::validators::validate_ingress_configuration`], not DNS faults.
/// The resolved set must overlap the cluster-reported set; extra records
/// (a CDN fronting the LB, say) are tolerated.
#[instrument(skip(records, resolver))]
pub async fn check_ingress_dns(
    records: &[IngressRecord],
    resolver: &impl DnsResolver,
) -> Result<ValidationReport> {
    let mut report = ValidationReport::new();

    for record in records {
        if record.lb_ips.is_empty() {
            debug!(
                namespace = %record.namespace,
                ingress = %record.name,
                "skipping ingress without load balancer IPs"
            );
            continue;
        }

        let mut expected: Vec<Ipv4Addr> = record
            .lb_ips
            .iter()
            .filter_map(|ip| ip.parse().ok())
            .collect();
        expected.sort();

        for host in &record.hosts {
            report.scanned += 1;
            let scope = format!("{}/{}", record.namespace, record.name);

            match resolver.lookup_ipv4(host).await? {
                DnsAnswer::Records(mut resolved) => {
                    resolved.sort();
                    if resolved.iter().any(|ip| expected.contains(ip)) {
                        debug!(host, ips = ?resolved, "DNS record matches load balancer");
                    } else {
                        report.push(Problem::new(format!(
                            "{scope}: {host} resolves to {resolved:?}, expected {expected:?}"
                        )));
                    }
                }
                DnsAnswer::NxDomain => {
                    report.push(Problem::new(format!(
                        "{scope}: {host} NXDOMAIN (host does not exist)"
                    )));
                }
                DnsAnswer::NoRecords => {
                    report.push(Problem::new(format!("{scope}: {host} has no A records")));
                }
                DnsAnswer::Timeout => {
                    report.push(Problem::new(format!("{scope}: {host} DNS lookup timed out")));
                }
                DnsAnswer::Failed(text) => {
                    report.push(Problem::new(format!("{scope}: {host} DNS error - {text}")));
                }
            }
        }
    }

    if report.is_clean() {
        info!(hosts = report.scanned, "all ingress hosts resolve correctly");
    }
    Ok(report)
}

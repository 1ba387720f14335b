//! HTTPS smoke checks
//!
//! Application-level probes against freshly deployed endpoints. A new
//! deployment's ingress, DNS, and certificate can each lag a little even
//! after ArgoCD reports health, so the probes retry on a short backoff
//! ladder before recording findings. Response-level findings become
//! Problems; only client construction fails hard.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::report::{Problem, ValidationReport};

#[derive(Debug, Clone)]
pub struct SmokeConfig {
    pub request_timeout: Duration,
    pub retry_delays: Vec<Duration>,
}

impl Default for SmokeConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            retry_delays: vec![
                Duration::from_secs(10),
                Duration::from_secs(30),
                Duration::from_secs(60),
            ],
        }
    }
}

pub fn smoke_client(config: &SmokeConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()?)
}

/// GET `url` until a 200 arrives, walking the retry ladder. Returns a
/// report with one problem when every attempt fails.
#[instrument(skip(client, config))]
pub async fn check_https_ok(
    client: &reqwest::Client,
    url: &str,
    config: &SmokeConfig,
) -> Result<ValidationReport> {
    let mut report = ValidationReport::new();
    report.scanned = 1;

    let mut last_outcome = String::new();
    for (attempt, delay) in backoff(config) {
        match client.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                info!(url, attempt, "endpoint reachable");
                return Ok(report);
            }
            Ok(response) => {
                last_outcome = format!("HTTP {}", response.status().as_u16());
            }
            Err(err) => {
                last_outcome = format!("request failed - {err}");
            }
        }
        debug!(url, attempt, outcome = %last_outcome, "smoke check attempt failed");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    report.push(Problem::new(format!("{url}: {last_outcome}")));
    Ok(report)
}

/// Probe an HTTP echo deployment and verify it was reached through the
/// expected hostname over TLS-terminated ingress.
///
/// The echo body must report `hostname == expected_hostname` and both
/// `headers.x-scheme` and `headers.x-forwarded-proto` as `https`.
#[instrument(skip(client, config))]
pub async fn check_http_echo(
    client: &reqwest::Client,
    url: &str,
    expected_hostname: &str,
    config: &SmokeConfig,
) -> Result<ValidationReport> {
    let mut report = ValidationReport::new();
    report.scanned = 1;

    let mut last_outcome = String::new();
    for (attempt, delay) in backoff(config) {
        match fetch_echo(client, url).await {
            Ok(body) => {
                inspect_echo(&mut report, url, expected_hostname, &body);
                if report.is_clean() {
                    info!(url, attempt, "echo endpoint verified");
                }
                return Ok(report);
            }
            Err(outcome) => last_outcome = outcome,
        }
        debug!(url, attempt, outcome = %last_outcome, "echo attempt failed");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    report.push(Problem::new(format!("{url}: {last_outcome}")));
    Ok(report)
}

async fn fetch_echo(client: &reqwest::Client, url: &str) -> Result<Value, String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| format!("request failed - {e}"))?;
    if !response.status().is_success() {
        return Err(format!("HTTP {}", response.status().as_u16()));
    }
    response
        .json()
        .await
        .map_err(|e| format!("invalid echo body - {e}"))
}

fn inspect_echo(report: &mut ValidationReport, url: &str, expected_hostname: &str, body: &Value) {
    let hostname = body.get("hostname").and_then(Value::as_str).unwrap_or("");
    if hostname != expected_hostname {
        report.push(Problem::new(format!(
            "{url}: hostname is '{hostname}', expected '{expected_hostname}'"
        )));
    }

    for header in ["x-scheme", "x-forwarded-proto"] {
        let value = body
            .get("headers")
            .and_then(|h| h.get(header))
            .and_then(Value::as_str)
            .unwrap_or("");
        if value != "https" {
            report.push(Problem::new(format!(
                "{url}: header {header} is '{value}', expected 'https'"
            )));
        }
    }
}

/// Attempt numbers paired with the delay to sleep after each failure.
/// The last attempt has no trailing delay.
fn backoff(config: &SmokeConfig) -> impl Iterator<Item = (usize, Option<Duration>)> + '_ {
    let total = config.retry_delays.len() + 1;
    (0..total).map(move |attempt| (attempt, config.retry_delays.get(attempt).copied()))
}

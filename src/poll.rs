//! Bounded poll-until-condition primitive
//!
//! Bridges eventually-consistent external systems into deterministic
//! pass/fail outcomes within a fixed time budget. The caller supplies an
//! async check that classifies the current state as done, pending, or
//! terminally failed; the loop sleeps a fixed interval between attempts
//! and gives up once the deadline elapses.
//!
//! "Resource not yet created" is not an error: read helpers return
//! [`Lookup::NotFound`] and the check maps it to [`PollStep::Pending`].
//! Any `Err` from the check is an unexpected fault and propagates
//! immediately instead of retrying forever.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::error::Result;

/// Timeout/interval pair for one bounded wait.
///
/// Two profiles cover all callers: [`PollConfig::reconcile`] (600s/15s,
/// GitOps reconciliation chains) and [`PollConfig::completion`] (300s/5s,
/// simple completion waits such as batch jobs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollConfig {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// 10-minute budget at 15s intervals, the default for reconciliation
    /// waits (commit → ApplicationSet → sync → ingress → DNS → certs).
    pub fn reconcile() -> Self {
        Self::new(Duration::from_secs(600), Duration::from_secs(15))
    }

    /// 5-minute budget at 5s intervals, for simple completion waits.
    pub fn completion() -> Self {
        Self::new(Duration::from_secs(300), Duration::from_secs(5))
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::reconcile()
    }
}

/// Classification of one check attempt. `S` is a diagnostic snapshot of
/// whatever the check observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep<S> {
    /// Condition satisfied; stop with success.
    Done(S),
    /// Terminal negative condition observed; stop with failure.
    Abort(S),
    /// Not satisfied yet; sleep and re-check.
    Pending(S),
}

/// Result of a bounded wait, carrying the last observed snapshot so
/// callers can log what the world looked like when the wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<S> {
    Succeeded { last: S, elapsed: Duration },
    Failed { last: S, elapsed: Duration },
    TimedOut { last: Option<S>, elapsed: Duration },
}

impl<S> PollOutcome<S> {
    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Succeeded { .. })
    }

    pub fn last(&self) -> Option<&S> {
        match self {
            PollOutcome::Succeeded { last, .. } | PollOutcome::Failed { last, .. } => Some(last),
            PollOutcome::TimedOut { last, .. } => last.as_ref(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            PollOutcome::Succeeded { elapsed, .. }
            | PollOutcome::Failed { elapsed, .. }
            | PollOutcome::TimedOut { elapsed, .. } => *elapsed,
        }
    }
}

/// Run `check` every `config.interval` until it returns [`PollStep::Done`]
/// or [`PollStep::Abort`], or until `config.timeout` elapses.
///
/// The check always runs at least once. Errors from the check abort the
/// loop immediately — transient "not there yet" states must be expressed
/// as `Pending`, not as errors.
pub async fn poll_until<S, F, Fut>(config: PollConfig, mut check: F) -> Result<PollOutcome<S>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStep<S>>>,
{
    let started = Instant::now();
    let mut last = None;

    loop {
        match check().await? {
            PollStep::Done(snapshot) => {
                return Ok(PollOutcome::Succeeded {
                    last: snapshot,
                    elapsed: started.elapsed(),
                })
            }
            PollStep::Abort(snapshot) => {
                return Ok(PollOutcome::Failed {
                    last: snapshot,
                    elapsed: started.elapsed(),
                })
            }
            PollStep::Pending(snapshot) => last = Some(snapshot),
        }

        if started.elapsed() >= config.timeout {
            return Ok(PollOutcome::TimedOut {
                last,
                elapsed: started.elapsed(),
            });
        }
        sleep(config.interval).await;
    }
}

/// Typed replacement for 404-driven control flow.
///
/// Read helpers return `Lookup` so "keep waiting" is a normal match arm in
/// the poll check instead of a caught exception. Hard API failures remain
/// `Err(_)` on the surrounding `Result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => None,
        }
    }
}

/// Map a kube API result into `Lookup`, folding 404 into `NotFound` and
/// passing every other failure through.
pub fn lookup_from_kube<T>(result: kube::Result<T>) -> Result<Lookup<T>> {
    match result {
        Ok(value) => Ok(Lookup::Found(value)),
        Err(kube::Error::Api(response)) if response.code == 404 => Ok(Lookup::NotFound),
        Err(err) => Err(err.into()),
    }
}

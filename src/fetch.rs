//! Resilient acquisition of a remote dataset.
//!
//! [`FetchPipeline::fetch`] issues bounded, strictly sequential attempts
//! against a [`Transport`], each with a fresh deadline, and waits an
//! exponentially growing delay between failed attempts.
//!
//! ```text
//! Attempting(1) ──ok, non-empty──▶ Success
//!      │
//!      └─fail──▶ backoff(base·2^(n-1)) ──▶ Attempting(n+1) ... ──▶ Exhausted
//! ```
//!
//! An attempt fails when it times out, when the transport errors, when the
//! status is not 2xx, when the body does not decode as a
//! [`RemoteEnvelope`](crate::models::RemoteEnvelope), or when the decoded
//! item list is empty. Attempt-level failures are logged and never
//! propagated; the caller sees a [`FetchOutcome`] whose `items` are empty
//! (or the fallback dataset) and whose `error` says why.
//!
//! The pipeline holds no state between calls. Shutdown during an attempt or
//! a backoff wait ends the call with [`FetchError::Canceled`].

use std::fmt;
use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::envelope::decode_envelope;
use crate::shutdown::Shutdown;
use crate::transport::{Transport, TransportError};

/// Retry budget for one [`FetchPipeline::fetch`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub backoff_base: Duration,
    pub use_fallback: bool,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(30),
            backoff_base: Duration::from_secs(1),
            use_fallback: true,
        }
    }
}

/// Delay after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`.
pub fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    let multiplier = 2_u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(multiplier)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success { items: usize },
    Timeout,
    HttpStatus(u16),
    Transport(String),
    Decode(String),
    EmptyItems,
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success { .. })
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Success { items } => write!(f, "success ({} items)", items),
            AttemptOutcome::Timeout => f.write_str("timed out"),
            AttemptOutcome::HttpStatus(status) => write!(f, "HTTP {}", status),
            AttemptOutcome::Transport(msg) => write!(f, "transport error: {}", msg),
            AttemptOutcome::Decode(msg) => write!(f, "decode error: {}", msg),
            AttemptOutcome::EmptyItems => f.write_str("empty item list"),
        }
    }
}

/// One bounded try.
#[derive(Debug, Clone)]
pub struct FetchAttempt {
    /// 1-based.
    pub number: u32,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
    /// Wait before the next attempt. `None` on success and on the last one.
    pub backoff: Option<Duration>,
}

impl FetchAttempt {
    pub fn retries_remaining(&self) -> bool {
        self.backoff.is_some()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("source URL is not configured")]
    MissingUrl,
    #[error("all {attempts} attempts failed (last: {last})")]
    Exhausted { attempts: u32, last: String },
    #[error("fetch canceled by shutdown")]
    Canceled,
}

/// Where the items of a [`FetchOutcome`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOrigin {
    Remote,
    Fallback,
    Unavailable,
}

impl fmt::Display for DataOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataOrigin::Remote => "remote",
            DataOrigin::Fallback => "fallback",
            DataOrigin::Unavailable => "none",
        })
    }
}

/// Result of one [`FetchPipeline::fetch`] call: the items, why they are
/// not the remote ones (if they aren't), and the attempt log.
#[derive(Debug, Clone)]
pub struct FetchOutcome<I> {
    pub items: Vec<I>,
    pub error: Option<FetchError>,
    pub origin: DataOrigin,
    pub attempts: Vec<FetchAttempt>,
}

impl<I> FetchOutcome<I> {
    fn failed(error: FetchError, attempts: Vec<FetchAttempt>) -> Self {
        Self {
            items: Vec::new(),
            error: Some(error),
            origin: DataOrigin::Unavailable,
            attempts,
        }
    }
}

pub struct FetchPipeline<C, I> {
    transport: C,
    fallback: Option<Vec<I>>,
    shutdown: Shutdown,
}

impl<C, I> FetchPipeline<C, I>
where
    C: Transport,
    I: DeserializeOwned + Clone,
{
    pub fn new(transport: C) -> Self {
        Self {
            transport,
            fallback: None,
            shutdown: Shutdown::never(),
        }
    }

    /// Items served when every attempt fails and the policy allows it.
    pub fn with_fallback(mut self, items: Vec<I>) -> Self {
        self.fallback = Some(items);
        self
    }

    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.as_ref().is_some_and(|f| !f.is_empty())
    }

    pub async fn fetch(&self, url: &str, policy: &FetchPolicy) -> FetchOutcome<I> {
        let url = url.trim();
        if url.is_empty() {
            error!("source URL is not configured");
            return FetchOutcome::failed(FetchError::MissingUrl, Vec::new());
        }

        let max_attempts = policy.max_attempts.max(1);
        let mut attempts = Vec::with_capacity(max_attempts as usize);

        for number in 1..=max_attempts {
            if self.shutdown.is_triggered() {
                return canceled(attempts);
            }
            info!(attempt = number, max_attempts, url, "fetching dataset");

            let started = Instant::now();
            let response = tokio::select! {
                biased;
                _ = self.shutdown.triggered() => return canceled(attempts),
                r = tokio::time::timeout(policy.attempt_timeout, self.transport.get(url)) => r,
            };

            let outcome = match response {
                Err(_) | Ok(Err(TransportError::Timeout)) => AttemptOutcome::Timeout,
                Ok(Err(TransportError::Connection(msg))) => AttemptOutcome::Transport(msg),
                Ok(Ok(resp)) if !resp.is_success() => AttemptOutcome::HttpStatus(resp.status),
                Ok(Ok(resp)) => match decode_envelope::<I>(&resp.body) {
                    Err(e) => AttemptOutcome::Decode(e.to_string()),
                    Ok(envelope) if envelope.items.is_empty() => AttemptOutcome::EmptyItems,
                    Ok(envelope) => {
                        let elapsed = started.elapsed();
                        let count = envelope.items.len();
                        info!(
                            attempt = number,
                            items = count,
                            reported_count = envelope.count,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "dataset fetched"
                        );
                        attempts.push(FetchAttempt {
                            number,
                            outcome: AttemptOutcome::Success { items: count },
                            elapsed,
                            backoff: None,
                        });
                        return FetchOutcome {
                            items: envelope.items,
                            error: None,
                            origin: DataOrigin::Remote,
                            attempts,
                        };
                    }
                },
            };

            let elapsed = started.elapsed();
            let backoff = (number < max_attempts).then(|| backoff_delay(number, policy.backoff_base));
            warn!(
                attempt = number,
                max_attempts,
                outcome = %outcome,
                elapsed_ms = elapsed.as_millis() as u64,
                "fetch attempt failed"
            );
            attempts.push(FetchAttempt {
                number,
                outcome,
                elapsed,
                backoff,
            });

            if let Some(delay) = backoff {
                info!(delay_ms = delay.as_millis() as u64, "waiting before next attempt");
                tokio::select! {
                    biased;
                    _ = self.shutdown.triggered() => return canceled(attempts),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        let last = attempts
            .last()
            .map(|a| a.outcome.to_string())
            .unwrap_or_default();
        let exhausted = FetchError::Exhausted {
            attempts: max_attempts,
            last,
        };

        match &self.fallback {
            Some(fallback) if policy.use_fallback && !fallback.is_empty() => {
                warn!(
                    attempts = max_attempts,
                    items = fallback.len(),
                    "all attempts failed, serving fallback dataset"
                );
                FetchOutcome {
                    items: fallback.clone(),
                    error: Some(exhausted),
                    origin: DataOrigin::Fallback,
                    attempts,
                }
            }
            _ => {
                error!(attempts = max_attempts, "all attempts failed, no data available");
                FetchOutcome::failed(exhausted, attempts)
            }
        }
    }
}

fn canceled<I>(attempts: Vec<FetchAttempt>) -> FetchOutcome<I> {
    warn!(attempts = attempts.len(), "fetch canceled by shutdown");
    FetchOutcome::failed(FetchError::Canceled, attempts)
}

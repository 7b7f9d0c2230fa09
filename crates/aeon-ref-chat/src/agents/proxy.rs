//! Backend proxy agent: one backend behind an availability circuit breaker.
//!
//! State machine:
//!
//!   Available --failure signal--> Unavailable (since = t, unavailable_count + 1)
//!   Unavailable --failure signal--> Unavailable (exception_count + 1 only)
//!   Unavailable --is_available() at or after since + delay--> Available
//!   Unavailable --record_success()--> Available
//!
//! Recovery is lazy: it happens on the next availability query, not on a
//! timer. An optional background probe can recover earlier by running the
//! backend's health check.
//!
//! Proxies are reentrant. Backend calls happen outside any turn; only the
//! resulting health events are proposed and confirmed.

use std::{collections::VecDeque, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use aeon_contracts::{
    agent::AgentAddress,
    backend::{CompletionRequest, CompletionResponse},
    error::{AeonError, AeonResult},
    health::{
        recovery_delay_from_secs, Availability, FailureKind, FailureSignal, ProxyHealthRecord,
        MAX_PROBE_INTERVAL_SECS, MAX_RECOVERY_DELAY_SECS,
    },
};
use aeon_core::{
    traits::{Agent, AgentEvent, Backend},
    AgentHandle,
};

use crate::{messages::AvailabilityChanged, mock_backends::BackendRegistry};

/// Failure signal ids remembered for deduplication.
pub const SIGNAL_DEDUPE_WINDOW: usize = 64;

const PROBE_TASK: &str = "health-probe";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProxyState {
    /// Name of the wrapped backend; empty until configured.
    pub backend: String,
    /// The router that owns this proxy, if any.
    pub parent: Option<AgentAddress>,
    pub health: ProxyHealthRecord,
    pub probe_interval_secs: Option<u64>,
    pub recent_signals: VecDeque<uuid::Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryCause {
    /// The recovery delay elapsed and someone asked.
    DelayElapsed,
    /// A health check or successful call proved the backend is back.
    Confirmed,
}

/// Logged under the variant tag, with every field under its ordinal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProxyEvent {
    Configured {
        #[serde(rename = "1")]
        backend: String,
        #[serde(rename = "2")]
        parent: Option<AgentAddress>,
        #[serde(rename = "3")]
        recovery_delay_secs: i64,
        #[serde(rename = "4")]
        probe_interval_secs: Option<u64>,
    },
    FailureRecorded {
        #[serde(rename = "1")]
        signal_id: uuid::Uuid,
        #[serde(rename = "2")]
        failure: FailureKind,
        #[serde(rename = "3")]
        at: DateTime<Utc>,
    },
    Recovered {
        #[serde(rename = "1")]
        cause: RecoveryCause,
        #[serde(rename = "2")]
        at: DateTime<Utc>,
    },
}

impl AgentEvent for ProxyEvent {
    fn kind(&self) -> &'static str {
        match self {
            ProxyEvent::Configured { .. } => "proxy-configured",
            ProxyEvent::FailureRecorded { .. } => "failure-recorded",
            ProxyEvent::Recovered { .. } => "recovered",
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            ProxyEvent::Configured { backend, .. } if backend.trim().is_empty() => {
                Err("backend name must not be blank".to_string())
            }
            ProxyEvent::Configured {
                recovery_delay_secs, ..
            } if recovery_delay_from_secs(*recovery_delay_secs).is_none() => Err(format!(
                "recovery delay must be positive and at most {MAX_RECOVERY_DELAY_SECS}s, got {recovery_delay_secs}"
            )),
            ProxyEvent::Configured {
                probe_interval_secs: Some(secs),
                ..
            } if *secs == 0 || *secs > MAX_PROBE_INTERVAL_SECS => Err(format!(
                "probe interval must be between 1 and {MAX_PROBE_INTERVAL_SECS}s, got {secs}"
            )),
            _ => Ok(()),
        }
    }
}

pub struct ProxyAgent;

impl Agent for ProxyAgent {
    const TYPE_NAME: &'static str = "proxy";
    const REENTRANT: bool = true;
    type State = ProxyState;
    type Event = ProxyEvent;

    fn apply(state: &mut ProxyState, event: &ProxyEvent) {
        match event {
            ProxyEvent::Configured {
                backend,
                parent,
                recovery_delay_secs,
                probe_interval_secs,
            } => {
                state.backend = backend.clone();
                state.parent = parent.clone();
                // Out-of-range delays never pass validation; keep the old one.
                if let Some(delay) = recovery_delay_from_secs(*recovery_delay_secs) {
                    state.health.recovery_delay = delay;
                }
                state.probe_interval_secs =
                    probe_interval_secs.filter(|secs| (1..=MAX_PROBE_INTERVAL_SECS).contains(secs));
            }
            ProxyEvent::FailureRecorded { signal_id, at, .. } => {
                if state.recent_signals.contains(signal_id) {
                    return;
                }
                state.recent_signals.push_back(*signal_id);
                if state.recent_signals.len() > SIGNAL_DEDUPE_WINDOW {
                    state.recent_signals.pop_front();
                }
                state.health.exception_count += 1;
                if state.health.availability == Availability::Available {
                    state.health.availability = Availability::Unavailable;
                    state.health.unavailable_since = Some(*at);
                    state.health.unavailable_count += 1;
                }
            }
            ProxyEvent::Recovered { .. } => {
                state.health.availability = Availability::Available;
                state.health.unavailable_since = None;
            }
        }
    }

    fn on_activate(agent: &AgentHandle<Self>) {
        if let Some(secs) = agent.read(|s| s.probe_interval_secs) {
            schedule_probe(agent, Duration::from_secs(secs));
        }
    }
}

/// Operations on a backend proxy.
#[async_trait]
pub trait ProxyApi {
    /// Bind this proxy to `backend`. Re-configuring replaces the settings
    /// but keeps the health history.
    async fn configure(
        &self,
        backend: &str,
        parent: Option<AgentAddress>,
        recovery_delay: chrono::Duration,
        probe_interval: Option<Duration>,
    ) -> AeonResult<()>;

    /// Availability right now, recovering first if the delay has elapsed.
    async fn is_available(&self) -> AeonResult<bool>;

    /// Record a failure. Returns false if this signal was already counted.
    async fn record_failure(&self, signal: FailureSignal) -> AeonResult<bool>;

    /// Mark the backend as recovered. No-op while Available.
    async fn record_success(&self) -> AeonResult<()>;

    /// Call the backend, recording any failure or timeout.
    async fn invoke(&self, request: CompletionRequest, timeout: Duration) -> AeonResult<CompletionResponse>;

    fn health(&self) -> ProxyHealthRecord;
    fn backend_name(&self) -> String;
}

#[async_trait]
impl ProxyApi for AgentHandle<ProxyAgent> {
    async fn configure(
        &self,
        backend: &str,
        parent: Option<AgentAddress>,
        recovery_delay: chrono::Duration,
        probe_interval: Option<Duration>,
    ) -> AeonResult<()> {
        let probe_interval_secs = probe_interval.map(|d| d.as_secs().max(1));
        self.commit([ProxyEvent::Configured {
            backend: backend.to_string(),
            parent,
            recovery_delay_secs: recovery_delay.num_seconds(),
            probe_interval_secs,
        }])
        .await?;

        match probe_interval_secs {
            Some(secs) => schedule_probe(self, Duration::from_secs(secs)),
            None => {
                self.cancel_task(PROBE_TASK);
            }
        }
        debug!(agent = %self.address(), backend, "proxy configured");
        Ok(())
    }

    async fn is_available(&self) -> AeonResult<bool> {
        let now = self.now();
        let (available, due) = self.read(|s| (s.health.is_available(), s.health.recovery_due(now)));
        if available {
            return Ok(true);
        }
        if !due {
            return Ok(false);
        }

        self.commit([ProxyEvent::Recovered {
            cause: RecoveryCause::DelayElapsed,
            at: now,
        }])
        .await?;
        info!(agent = %self.address(), backend = %self.backend_name(), "recovery delay elapsed, backend available again");
        announce(self, true);
        Ok(true)
    }

    async fn record_failure(&self, signal: FailureSignal) -> AeonResult<bool> {
        let (seen, was_available) = self.read(|s| {
            (
                s.recent_signals.contains(&signal.signal_id),
                s.health.is_available(),
            )
        });
        if seen {
            debug!(agent = %self.address(), signal_id = %signal.signal_id, "duplicate failure signal ignored");
            return Ok(false);
        }

        self.commit([ProxyEvent::FailureRecorded {
            signal_id: signal.signal_id,
            failure: signal.kind.clone(),
            at: self.now(),
        }])
        .await?;

        if was_available && !self.read(|s| s.health.is_available()) {
            warn!(
                agent = %self.address(),
                backend = %self.backend_name(),
                failure = %signal.kind,
                "backend marked unavailable"
            );
            announce(self, false);
        }
        Ok(true)
    }

    async fn record_success(&self) -> AeonResult<()> {
        if self.read(|s| s.health.is_available()) {
            return Ok(());
        }
        self.commit([ProxyEvent::Recovered {
            cause: RecoveryCause::Confirmed,
            at: self.now(),
        }])
        .await?;
        info!(agent = %self.address(), backend = %self.backend_name(), "backend confirmed healthy");
        announce(self, true);
        Ok(())
    }

    async fn invoke(&self, request: CompletionRequest, timeout: Duration) -> AeonResult<CompletionResponse> {
        let name = self.backend_name();
        let backend = backend_for(self, &name)?;

        let outcome = match tokio::time::timeout(timeout, backend.invoke(request)).await {
            Ok(result) => result,
            Err(_) => Err(FailureSignal::timeout()),
        };

        match outcome {
            Ok(response) => Ok(response),
            Err(signal) => {
                let reason = signal.kind.to_string();
                self.record_failure(signal).await?;
                Err(AeonError::Backend { backend: name, reason })
            }
        }
    }

    fn health(&self) -> ProxyHealthRecord {
        self.read(|s| s.health.clone())
    }

    fn backend_name(&self) -> String {
        self.read(|s| s.backend.clone())
    }
}

fn backend_for(agent: &AgentHandle<ProxyAgent>, name: &str) -> AeonResult<std::sync::Arc<dyn Backend>> {
    if name.is_empty() {
        return Err(AeonError::Backend {
            backend: agent.address().to_string(),
            reason: "proxy is not configured".to_string(),
        });
    }
    let runtime = agent.runtime().ok_or_else(|| AeonError::Bus {
        reason: "runtime has shut down".to_string(),
    })?;
    runtime.service::<BackendRegistry>()?.get(name)
}

/// Tell subscribers the availability flipped. Best effort.
fn announce(agent: &AgentHandle<ProxyAgent>, available: bool) {
    let message = AvailabilityChanged {
        backend: agent.backend_name(),
        available,
    };
    if let Err(err) = agent.publish(&message) {
        debug!(agent = %agent.address(), error = %err, "availability change not published");
    }
}

fn schedule_probe(agent: &AgentHandle<ProxyAgent>, interval: Duration) {
    let scheduled = agent.schedule_every(PROBE_TASK, interval, |proxy: AgentHandle<ProxyAgent>| async move {
        if proxy.read(|s| s.health.is_available()) {
            return;
        }
        let backend = match backend_for(&proxy, &proxy.backend_name()) {
            Ok(backend) => backend,
            Err(err) => {
                debug!(agent = %proxy.address(), error = %err, "probe skipped");
                return;
            }
        };
        match backend.health_check().await {
            Ok(()) => {
                if let Err(err) = proxy.record_success().await {
                    warn!(agent = %proxy.address(), error = %err, "probe could not record recovery");
                }
            }
            Err(signal) => debug!(agent = %proxy.address(), failure = %signal.kind, "probe: still unhealthy"),
        }
    });
    if let Err(err) = scheduled {
        warn!(agent = %agent.address(), error = %err, "health probe not scheduled");
    }
}

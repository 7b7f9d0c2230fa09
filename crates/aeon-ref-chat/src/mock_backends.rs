//! Simulated completion backends for the AEON chat reference runtime.
//!
//! No external systems are contacted. Each `ScriptedBackend` answers by
//! echoing the prompt, or fails in whatever way its current `Mode` says, so
//! scenarios and tests can drive the circuit breaker deterministically.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;

use aeon_contracts::{
    backend::{CompletionRequest, CompletionResponse},
    error::{AeonError, AeonResult},
    health::{FailureKind, FailureSignal},
};
use aeon_core::traits::Backend;

/// How a scripted backend answers its next calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Reply with "[name] prompt".
    Echo,
    /// Reject every call as rate limited.
    RateLimited,
    /// Fail every call with the given provider error.
    Failing(String),
    /// Echo, but only after sleeping this long.
    Slow(Duration),
}

#[derive(Debug)]
pub struct ScriptedBackend {
    name: String,
    mode: Mutex<Mode>,
    healthy: AtomicBool,
    calls: AtomicU32,
}

impl ScriptedBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: Mutex::new(Mode::Echo),
            healthy: AtomicBool::new(true),
            calls: AtomicU32::new(0),
        }
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
    }

    /// What the background probe's health check reports.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Number of `invoke` calls received so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn mode(&self) -> Mode {
        self.mode.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn echo(&self, request: &CompletionRequest) -> CompletionResponse {
        CompletionResponse {
            text: format!("[{}] {}", self.name, request.prompt),
            backend: self.name.clone(),
        }
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, request: CompletionRequest) -> Result<CompletionResponse, FailureSignal> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode() {
            Mode::Echo => Ok(self.echo(&request)),
            Mode::RateLimited => Err(FailureSignal::rate_limited()),
            Mode::Failing(detail) => Err(FailureSignal::new(FailureKind::Backend(detail))),
            Mode::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(self.echo(&request))
            }
        }
    }

    async fn health_check(&self) -> Result<(), FailureSignal> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(FailureSignal::new(FailureKind::Backend("health check failed".to_string())))
        }
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// Backends by provider name. Registered on the runtime as a service so
/// proxy agents can find the backend they wrap.
#[derive(Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backends.insert(backend.name().to_string(), backend);
        self
    }

    pub fn get(&self, name: &str) -> AeonResult<Arc<dyn Backend>> {
        self.backends.get(name).cloned().ok_or_else(|| AeonError::Backend {
            backend: name.to_string(),
            reason: "no such backend registered".to_string(),
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }
}

/// The three providers named in the reference routing table, all echoing.
pub fn reference_backends() -> (BackendRegistry, BTreeMap<String, Arc<ScriptedBackend>>) {
    let mut handles = BTreeMap::new();
    let mut registry = BackendRegistry::new();
    for name in ["OpenAILast", "OpenAI", "BytePlusDeepSeekV3"] {
        let backend = Arc::new(ScriptedBackend::new(name));
        registry = registry.with(backend.clone());
        handles.insert(name.to_string(), backend);
    }
    (registry, handles)
}

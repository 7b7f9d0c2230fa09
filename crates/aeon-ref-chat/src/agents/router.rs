//! Chat router agent: picks a backend proxy by region and records the
//! conversation.
//!
//! Routing order for a request in region R:
//!   1. R's proxies in configured preference order, skipping unavailable ones
//!   2. then the default region's proxies the same way
//!   3. otherwise `NoAvailableBackend`
//!
//! A proxy that fails while being called records the failure itself and
//! the router moves on to the next one. Proxies are provisioned lazily the
//! first time a region is used and remembered in the router's log.
//!
//! Backend calls happen before anything is proposed; the exchange is only
//! committed once an answer came back.

use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use aeon_config::RuntimeConfig;
use aeon_contracts::{
    backend::{ChatMessage, CompletionRequest, CompletionResponse},
    error::{AeonError, AeonResult},
};
use aeon_core::{
    traits::{Agent, AgentEvent},
    AgentHandle, Runtime,
};

use crate::{
    agents::{
        configuration::{ConfigurationAgent, ConfigurationApi},
        proxy::{ProxyAgent, ProxyApi},
    },
    messages::ChatResponded,
};

/// Upper bound for one backend call before it counts as a timeout failure.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouterState {
    /// Region → proxy ids in preference order.
    pub regions: BTreeMap<String, Vec<String>>,
    /// Configuration agent supplying the system prompt, if linked.
    pub configuration: Option<String>,
    pub history: Vec<ChatMessage>,
    pub exchanges: u64,
}

/// Logged under the variant tag, with every field under its ordinal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RouterEvent {
    RegionProvisioned {
        #[serde(rename = "1")]
        region: String,
        #[serde(rename = "2")]
        proxies: Vec<String>,
    },
    ConfigurationLinked {
        #[serde(rename = "1")]
        configuration: String,
    },
    ExchangeRecorded {
        #[serde(rename = "1")]
        region: String,
        #[serde(rename = "2")]
        backend: String,
        #[serde(rename = "3")]
        prompt: String,
        #[serde(rename = "4")]
        reply: String,
        #[serde(rename = "5")]
        at: DateTime<Utc>,
    },
}

impl AgentEvent for RouterEvent {
    fn kind(&self) -> &'static str {
        match self {
            RouterEvent::RegionProvisioned { .. } => "region-provisioned",
            RouterEvent::ConfigurationLinked { .. } => "configuration-linked",
            RouterEvent::ExchangeRecorded { .. } => "exchange-recorded",
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            RouterEvent::RegionProvisioned { proxies, region } if proxies.is_empty() => {
                Err(format!("region '{region}' provisioned without proxies"))
            }
            _ => Ok(()),
        }
    }
}

pub struct ChatRouterAgent;

impl Agent for ChatRouterAgent {
    const TYPE_NAME: &'static str = "chat-router";
    type State = RouterState;
    type Event = RouterEvent;

    fn apply(state: &mut RouterState, event: &RouterEvent) {
        match event {
            RouterEvent::RegionProvisioned { region, proxies } => {
                state.regions.insert(region.clone(), proxies.clone());
            }
            RouterEvent::ConfigurationLinked { configuration } => {
                state.configuration = Some(configuration.clone());
            }
            RouterEvent::ExchangeRecorded { prompt, reply, .. } => {
                state.history.push(ChatMessage::user(prompt.clone()));
                state.history.push(ChatMessage::assistant(reply.clone()));
                state.exchanges += 1;
            }
        }
    }
}

/// Operations on a chat router.
#[async_trait]
pub trait RouterApi {
    /// Take the system prompt from the configuration agent `configuration`.
    async fn link_configuration(&self, configuration: &str) -> AeonResult<()>;

    /// Proxy ids serving `region`, provisioning them on first use.
    ///
    /// `None` if the region is not in the routing table.
    async fn proxies_for(&self, region: &str) -> AeonResult<Option<Vec<String>>>;

    /// The first available proxy for `region`, falling back to the default
    /// region. `None` if every eligible proxy is unavailable.
    async fn route(&self, region: &str) -> AeonResult<Option<AgentHandle<ProxyAgent>>>;

    /// Answer `prompt` through the best available backend for `region`.
    async fn chat(&self, region: &str, prompt: &str) -> AeonResult<ChatResponded>;

    fn history(&self) -> Vec<ChatMessage>;
}

fn runtime_of(agent: &AgentHandle<ChatRouterAgent>) -> AeonResult<Runtime> {
    agent.runtime().ok_or_else(|| AeonError::Bus {
        reason: format!("runtime of '{}' has shut down", agent.address()),
    })
}

/// The requested region first, then the default region if different.
fn candidate_regions(config: &RuntimeConfig, region: &str) -> Vec<String> {
    let mut regions = vec![region.to_string()];
    if region != config.routing.default_region {
        regions.push(config.routing.default_region.clone());
    }
    regions
}

/// The completion request for `prompt`: linked system prompt plus history.
pub async fn build_request(
    router: &AgentHandle<ChatRouterAgent>,
    runtime: &Runtime,
    prompt: &str,
) -> AeonResult<CompletionRequest> {
    let (configuration, history) = router.read(|s| (s.configuration.clone(), s.history.clone()));
    let system_prompt = match configuration {
        Some(id) => runtime.agent::<ConfigurationAgent>(id).await?.prompt(),
        None => String::new(),
    };
    Ok(CompletionRequest {
        system_prompt,
        history,
        prompt: prompt.to_string(),
    })
}

async fn record_exchange(
    router: &AgentHandle<ChatRouterAgent>,
    region: &str,
    prompt: &str,
    response: CompletionResponse,
) -> AeonResult<ChatResponded> {
    router
        .commit([RouterEvent::ExchangeRecorded {
            region: region.to_string(),
            backend: response.backend.clone(),
            prompt: prompt.to_string(),
            reply: response.text.clone(),
            at: router.now(),
        }])
        .await?;

    let responded = ChatResponded {
        region: region.to_string(),
        backend: response.backend,
        prompt: prompt.to_string(),
        reply: response.text,
    };
    // The exchange is committed; a closed bus does not undo it.
    if let Err(err) = router.publish(&responded) {
        debug!(agent = %router.address(), error = %err, "chat reply not published");
    }
    Ok(responded)
}

#[async_trait]
impl RouterApi for AgentHandle<ChatRouterAgent> {
    async fn link_configuration(&self, configuration: &str) -> AeonResult<()> {
        self.commit([RouterEvent::ConfigurationLinked {
            configuration: configuration.to_string(),
        }])
        .await?;
        Ok(())
    }

    async fn proxies_for(&self, region: &str) -> AeonResult<Option<Vec<String>>> {
        if let Some(proxies) = self.read(|s| s.regions.get(region).cloned()) {
            return Ok(Some(proxies));
        }

        let runtime = runtime_of(self)?;
        let config = runtime.service::<RuntimeConfig>()?;
        let Some(backends) = config.routing.backends_for(region) else {
            return Ok(None);
        };

        let mut turn = self.begin_turn().await;
        // Another caller may have provisioned while we waited for the turn.
        if let Some(proxies) = turn.read(|s| s.regions.get(region).cloned()) {
            return Ok(Some(proxies));
        }

        let mut proxies = Vec::with_capacity(backends.len());
        for backend in backends {
            let id = format!("{}.{}", self.id(), backend);
            let proxy = runtime.agent::<ProxyAgent>(id.as_str()).await?;
            proxy
                .configure(
                    backend,
                    Some(self.address().clone()),
                    config.breaker.recovery_delay(),
                    config.breaker.probe_interval(),
                )
                .await?;
            proxies.push(id);
        }

        turn.propose(RouterEvent::RegionProvisioned {
            region: region.to_string(),
            proxies: proxies.clone(),
        })?;
        turn.confirm().await?;
        info!(agent = %self.address(), region, proxies = proxies.len(), "region provisioned");
        Ok(Some(proxies))
    }

    async fn route(&self, region: &str) -> AeonResult<Option<AgentHandle<ProxyAgent>>> {
        let runtime = runtime_of(self)?;
        let config = runtime.service::<RuntimeConfig>()?;

        for candidate in candidate_regions(&config, region) {
            let Some(proxies) = self.proxies_for(&candidate).await? else {
                continue;
            };
            for id in proxies {
                let proxy = runtime.agent::<ProxyAgent>(id.as_str()).await?;
                if proxy.is_available().await? {
                    return Ok(Some(proxy));
                }
            }
        }
        Ok(None)
    }

    async fn chat(&self, region: &str, prompt: &str) -> AeonResult<ChatResponded> {
        let runtime = runtime_of(self)?;
        let config = runtime.service::<RuntimeConfig>()?;
        let request = build_request(self, &runtime, prompt).await?;

        for candidate in candidate_regions(&config, region) {
            let Some(proxies) = self.proxies_for(&candidate).await? else {
                debug!(agent = %self.address(), region = %candidate, "region not routed");
                continue;
            };
            for id in proxies {
                let proxy = runtime.agent::<ProxyAgent>(id.as_str()).await?;
                if !proxy.is_available().await? {
                    debug!(agent = %self.address(), proxy = %id, "skipping unavailable proxy");
                    continue;
                }
                match proxy.invoke(request.clone(), REQUEST_TIMEOUT).await {
                    Ok(response) => return record_exchange(self, &candidate, prompt, response).await,
                    Err(err) => {
                        warn!(agent = %self.address(), proxy = %id, error = %err, "backend failed, failing over");
                    }
                }
            }
        }

        Err(AeonError::NoAvailableBackend {
            region: region.to_string(),
        })
    }

    fn history(&self) -> Vec<ChatMessage> {
        self.read(|s| s.history.clone())
    }
}

//! Scenario 3: Event Fan-out
//!
//! One operator console publishes; several agents react:
//!   1. An activity log subscribes to every origin with a wildcard handler
//!   2. A bus prompt change reaches the configuration agent, whose own
//!      change notice then reaches the log
//!   3. A chat request reaches the router; its reply event reaches the log
//!   4. A failure report delivered twice trips the proxy once
//!   5. A kind no agent was written for still reaches the log
//!
//! Publishers never wait on subscribers; `drain` is only for printing.

use std::sync::Arc;

use aeon_config::RuntimeConfig;
use aeon_contracts::{agent::AgentAddress, error::AeonResult, health::FailureSignal};
use aeon_core::SystemClock;
use aeon_journal::InMemoryJournal;

use crate::{
    agents::{ActivityLogAgent, ChatRouterAgent, ConfigurationAgent, ConfigurationApi, ProxyAgent, ProxyApi, RouterApi},
    messages::{ChatRequested, FailureReported, SetPromptRequested},
    mock_backends::reference_backends,
    wiring::build_runtime,
};

/// Run Scenario 3: Event Fan-out.
pub async fn run_scenario(config: &RuntimeConfig) -> AeonResult<()> {
    println!("=== Scenario 3: Event Fan-out ===");
    println!();

    let journal = Arc::new(InMemoryJournal::new());
    let (registry, _) = reference_backends();
    let runtime = build_runtime(config.clone(), journal.clone(), Arc::new(SystemClock), registry)?;

    let operator = AgentAddress::new("operator", "console");
    let log = runtime.agent::<ActivityLogAgent>("log").await?;
    let settings = runtime.agent::<ConfigurationAgent>("config-1").await?;
    let router = runtime.agent::<ChatRouterAgent>("chat-1").await?;

    // ── Step 1: subscriptions ────────────────────────────────────────────────

    runtime.subscribe_all(log.address().clone());
    runtime.subscribe(operator.clone(), settings.address().clone());
    runtime.subscribe(operator.clone(), router.address().clone());
    println!("  {} subscribed to every origin", log.address());
    println!("  {} and {} subscribed to {operator}", settings.address(), router.address());
    println!();

    // ── Step 2: configuration over the bus ───────────────────────────────────

    runtime.publish_from(
        &operator,
        &SetPromptRequested {
            prompt: "Answer in one sentence.".to_string(),
        },
    )?;
    runtime.drain().await;
    println!("  [2] set-prompt-requested → prompt now {:?}", settings.prompt());

    // ── Step 3: chat over the bus ────────────────────────────────────────────

    let region = config.routing.default_region.clone();
    runtime.publish_from(
        &operator,
        &ChatRequested {
            region: region.clone(),
            prompt: "what is an event log?".to_string(),
        },
    )?;
    runtime.drain().await;
    println!("  [3] chat-requested → router history has {} message(s)", router.history().len());

    // ── Step 4: duplicate failure report ─────────────────────────────────────

    if let Some(proxy_id) = router.proxies_for(&region).await?.and_then(|p| p.first().cloned()) {
        let proxy = runtime.agent::<ProxyAgent>(proxy_id.as_str()).await?;
        runtime.subscribe(operator.clone(), proxy.address().clone());
        let report = FailureReported {
            signal: FailureSignal::rate_limited(),
        };
        runtime.publish_from(&operator, &report)?;
        runtime.publish_from(&operator, &report)?;
        runtime.drain().await;
        let health = proxy.health();
        println!(
            "  [4] same failure reported twice → {} {:?}, {} failure(s) counted",
            proxy.address(),
            health.availability,
            health.exception_count
        );
    }

    // ── Step 5: unforeseen kind ──────────────────────────────────────────────

    runtime.publish_value(&operator, "maintenance-window-announced", serde_json::json!({"minutes": 5}))?;
    runtime.drain().await;
    println!("  [5] maintenance-window-announced → only the wildcard log handles it");
    println!();

    // ── Activity log contents ────────────────────────────────────────────────

    let entries = log.read(|s| s.entries.clone());
    println!("  Activity log ({} entries):", entries.len());
    for entry in &entries {
        println!("    {:<28} from {}", entry.kind, entry.publisher);
    }
    println!();
    println!("  Hash chains intact: {}", journal.verify_all());
    println!();

    runtime.shutdown().await;
    Ok(())
}

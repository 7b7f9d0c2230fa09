//! Scenario 2: Backend Failover
//!
//! Drives the availability circuit breaker through a chat router:
//!   1. Healthy: the first backend of the region answers
//!   2. The first backend is rate limited: its proxy trips and the next one answers
//!   3. The backend heals, but the breaker stays open until the delay passes
//!   4. One second before the delay: still skipped. At the delay: back in rotation
//!   5. Every backend down: the router reports no available backend
//!
//! Time is a manual clock so the recovery window is exact.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};

use aeon_config::RuntimeConfig;
use aeon_contracts::error::{AeonError, AeonResult};
use aeon_core::{ManualClock, Runtime};
use aeon_journal::InMemoryJournal;

use crate::{
    agents::{ChatRouterAgent, ConfigurationAgent, ConfigurationApi, ProxyAgent, ProxyApi, RouterApi},
    mock_backends::{reference_backends, Mode},
    wiring::build_runtime,
};

async fn print_proxy(runtime: &Runtime, id: &str) -> AeonResult<()> {
    let proxy = runtime.agent::<ProxyAgent>(id).await?;
    let health = proxy.health();
    println!(
        "    {id}: {:?}, unavailable {} time(s), {} failure(s)",
        health.availability, health.unavailable_count, health.exception_count
    );
    Ok(())
}

/// Run Scenario 2: Backend Failover.
pub async fn run_scenario(config: &RuntimeConfig) -> AeonResult<()> {
    println!("=== Scenario 2: Backend Failover ===");
    println!();

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let (registry, backends) = reference_backends();
    let runtime = build_runtime(config.clone(), Arc::new(InMemoryJournal::new()), clock.clone(), registry)?;
    let region = config.routing.default_region.clone();
    let delay = config.breaker.recovery_delay();

    let settings = runtime.agent::<ConfigurationAgent>("config-1").await?;
    settings.set_prompt("You are a concise assistant.").await?;
    let router = runtime.agent::<ChatRouterAgent>("chat-1").await?;
    router.link_configuration("config-1").await?;

    let proxies = router.proxies_for(&region).await?.unwrap_or_default();
    println!("  Region {region} served by: {}", proxies.join(", "));
    println!("  Recovery delay: {}s", delay.num_seconds());
    println!();

    // ── Step 1: healthy ──────────────────────────────────────────────────────

    let reply = router.chat(&region, "hello").await?;
    println!("  [1] chat(\"hello\")       → {} says {:?}", reply.backend, reply.reply);

    // ── Step 2: first backend rate limited ───────────────────────────────────

    let first = proxies.first().cloned().unwrap_or_default();
    let first_backend = runtime.agent::<ProxyAgent>(first.as_str()).await?.backend_name();
    if let Some(backend) = backends.get(&first_backend) {
        backend.set_mode(Mode::RateLimited);
    }
    let reply = router.chat(&region, "are you there?").await?;
    println!("  [2] {first_backend} rate limited → failover to {}", reply.backend);
    print_proxy(&runtime, &first).await?;

    // ── Step 3: backend heals, breaker still open ────────────────────────────

    if let Some(backend) = backends.get(&first_backend) {
        backend.set_mode(Mode::Echo);
    }
    let reply = router.chat(&region, "still there?").await?;
    println!("  [3] {first_backend} healed, breaker open → {}", reply.backend);

    // ── Step 4: recovery window ──────────────────────────────────────────────

    clock.advance(delay - ChronoDuration::seconds(1));
    let reply = router.chat(&region, "one second early").await?;
    println!("  [4] t0 + {}s → {}", (delay - ChronoDuration::seconds(1)).num_seconds(), reply.backend);
    clock.advance(ChronoDuration::seconds(1));
    let reply = router.chat(&region, "right on time").await?;
    println!("      t0 + {}s → {}", delay.num_seconds(), reply.backend);
    print_proxy(&runtime, &first).await?;

    // ── Step 5: everything down ──────────────────────────────────────────────

    for backend in backends.values() {
        backend.set_mode(Mode::RateLimited);
    }
    match router.chat("CN", "anyone?").await {
        Err(AeonError::NoAvailableBackend { region }) => {
            println!("  [5] all backends rate limited → no available backend for {region}");
        }
        Err(err) => return Err(err),
        Ok(reply) => println!("  [5] unexpectedly answered by {}", reply.backend),
    }
    println!();
    println!("  Conversation kept: {} message(s)", router.history().len());
    println!();

    runtime.shutdown().await;
    Ok(())
}

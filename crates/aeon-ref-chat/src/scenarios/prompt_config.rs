//! Scenario 1: Prompt Configuration
//!
//! Walks one configuration agent through the propose / confirm protocol:
//!   1. Fresh activation shows defaults with an empty log
//!   2. set_prompt("Hi") commits one event
//!   3. A failed durable append leaves the prompt at "Hi"
//!   4. set_prompt("Bye") then succeeds
//!   5. A bus request changes the LLM without a direct call
//!   6. Deactivate, reactivate, and the log replays to the same state

use std::sync::Arc;

use aeon_config::RuntimeConfig;
use aeon_contracts::{agent::AgentAddress, error::AeonResult};
use aeon_core::SystemClock;
use aeon_journal::InMemoryJournal;

use crate::{
    agents::{ConfigurationAgent, ConfigurationApi},
    messages::SetLlmRequested,
    mock_backends::reference_backends,
    wiring::build_runtime,
};

/// Run Scenario 1: Prompt Configuration.
pub async fn run_scenario(config: &RuntimeConfig) -> AeonResult<()> {
    println!("=== Scenario 1: Prompt Configuration ===");
    println!();

    let journal = Arc::new(InMemoryJournal::new());
    let (registry, _) = reference_backends();
    let runtime = build_runtime(config.clone(), journal.clone(), Arc::new(SystemClock), registry)?;

    // ── Step 1: activation ───────────────────────────────────────────────────

    let agent = runtime.agent::<ConfigurationAgent>("config-1").await?;
    println!("  Activated {}", agent.address());
    println!("    system_llm:     {}", agent.system_llm());
    println!("    streaming mode: {}", agent.streaming_mode_enabled());
    println!("    log length:     {}", journal.stream_len(agent.address()));
    println!();

    // ── Step 2: first prompt ─────────────────────────────────────────────────

    agent.set_prompt("Hi").await?;
    println!("  set_prompt(\"Hi\")  → version {}, prompt = {:?}", agent.version(), agent.prompt());

    // ── Step 3: durable append fails ─────────────────────────────────────────

    journal.fail_next_appends(1);
    match agent.set_prompt("Bye").await {
        Ok(()) => println!("  set_prompt(\"Bye\") → unexpectedly committed"),
        Err(err) => {
            println!("  set_prompt(\"Bye\") → {err}");
            println!("    state unchanged: prompt = {:?}, version {}", agent.prompt(), agent.version());
        }
    }

    // ── Step 4: retry ────────────────────────────────────────────────────────

    agent.set_prompt("Bye").await?;
    println!("  set_prompt(\"Bye\") → version {}, prompt = {:?}", agent.version(), agent.prompt());
    println!();

    // ── Step 5: change through the bus ───────────────────────────────────────

    let operator = AgentAddress::new("operator", "console");
    runtime.subscribe(operator.clone(), agent.address().clone());
    let event_id = runtime.publish_from(
        &operator,
        &SetLlmRequested {
            system_llm: "BytePlusDeepSeekV3".to_string(),
        },
    )?;
    runtime.drain().await;
    println!("  {operator} published set-llm-requested ({event_id})");
    println!("    system_llm now: {}", agent.system_llm());
    println!();

    // ── Step 6: replay ───────────────────────────────────────────────────────

    let before = agent.snapshot();
    let address = agent.address().clone();
    drop(agent);
    runtime.deactivate(&address);
    let again = runtime.agent::<ConfigurationAgent>("config-1").await?;
    println!("  Reactivated from {} logged events", again.version());
    println!("    state identical after replay: {}", again.snapshot() == before);
    println!("    hash chain intact:            {}", journal.verify_integrity(&address));
    println!();

    runtime.shutdown().await;
    Ok(())
}

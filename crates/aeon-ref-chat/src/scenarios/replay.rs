//! Scenario 4: Durable Replay
//!
//! Runs a short session against the file journal, shuts the runtime down,
//! then opens a second runtime over the same directory:
//!   1. Configure and chat; every confirm is flushed to a JSON-lines log
//!   2. Shut down; nothing lives in memory any more
//!   3. Reopen: agents rebuild from their logs with identical state
//!   4. Each log's hash chain is verified end to end
//!
//! Running it again on the same directory continues the existing logs.

use std::{path::Path, sync::Arc};

use aeon_config::RuntimeConfig;
use aeon_contracts::error::AeonResult;
use aeon_core::SystemClock;
use aeon_journal::FileJournal;

use crate::{
    agents::{ChatRouterAgent, ConfigurationAgent, ConfigurationApi, RouterApi},
    mock_backends::reference_backends,
    wiring::build_runtime,
};

/// Run Scenario 4: Durable Replay, keeping logs under `journal_dir`.
pub async fn run_scenario(config: &RuntimeConfig, journal_dir: &Path) -> AeonResult<()> {
    println!("=== Scenario 4: Durable Replay ===");
    println!();
    println!("  Journal directory: {}", journal_dir.display());
    println!();

    // ── Step 1: first session ────────────────────────────────────────────────

    let journal = Arc::new(FileJournal::open(journal_dir).await?);
    let (registry, _) = reference_backends();
    let runtime = build_runtime(config.clone(), journal.clone(), Arc::new(SystemClock), registry)?;

    let settings = runtime.agent::<ConfigurationAgent>("config-1").await?;
    let router = runtime.agent::<ChatRouterAgent>("chat-1").await?;
    println!(
        "  Session 1 found {} configuration event(s), {} router event(s)",
        settings.version(),
        router.version()
    );

    settings.set_system_llm("OpenAI").await?;
    settings.set_prompt("Reply like a ship's log.").await?;
    settings.set_streaming_mode(false).await?;
    if router.read(|s| s.configuration.is_none()) {
        router.link_configuration("config-1").await?;
    }
    let reply = router.chat(&config.routing.default_region, "status report").await?;
    println!("  Session 1 chat answered by {}", reply.backend);

    let settings_before = settings.snapshot();
    let history_before = router.history();
    let addresses = [settings.address().clone(), router.address().clone()];
    println!(
        "  Session 1 ends at configuration v{}, router v{}",
        settings.version(),
        router.version()
    );

    // ── Step 2: shutdown ─────────────────────────────────────────────────────

    drop((settings, router));
    runtime.shutdown().await;
    drop(runtime);
    println!("  Runtime shut down");
    println!();

    // ── Step 3: second session ───────────────────────────────────────────────

    let journal = Arc::new(FileJournal::open(journal_dir).await?);
    let (registry, _) = reference_backends();
    let runtime = build_runtime(config.clone(), journal.clone(), Arc::new(SystemClock), registry)?;

    let settings = runtime.agent::<ConfigurationAgent>("config-1").await?;
    let router = runtime.agent::<ChatRouterAgent>("chat-1").await?;
    println!(
        "  Session 2 replayed configuration v{}, router v{}",
        settings.version(),
        router.version()
    );
    println!("    configuration identical: {}", settings.snapshot() == settings_before);
    println!("    chat history identical:  {}", router.history() == history_before);
    println!();

    // ── Step 4: integrity ────────────────────────────────────────────────────

    for address in &addresses {
        let intact = journal.verify_integrity(address).await?;
        println!(
            "  {} → {} (chain intact: {intact})",
            address,
            journal.stream_path(address).display()
        );
    }
    println!();

    runtime.shutdown().await;
    Ok(())
}

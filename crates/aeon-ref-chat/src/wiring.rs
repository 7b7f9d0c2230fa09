//! Runtime assembly for the chat agents.
//!
//! Handler table:
//!
//! | agent type      | message kind                       | handler                  |
//! |-----------------|------------------------------------|--------------------------|
//! | configuration   | set-llm-requested                  | `set_system_llm`         |
//! | configuration   | set-prompt-requested               | `set_prompt`             |
//! | configuration   | set-streaming-mode-requested       | `set_streaming_mode`     |
//! | configuration   | set-user-profile-prompt-requested  | `set_user_profile_prompt`|
//! | proxy           | failure-reported                   | `record_failure`         |
//! | chat-router     | chat-requested                     | `chat`                   |
//! | activity-log    | *                                  | `observe`                |

use std::sync::Arc;

use tracing::warn;

use aeon_config::RuntimeConfig;
use aeon_contracts::error::{AeonError, AeonResult};
use aeon_core::{
    traits::{Clock, EventJournal},
    DispatchTable, Runtime,
};

use crate::{
    agents::{
        activity::{self, ActivityLogAgent},
        ConfigurationAgent, ConfigurationApi, ChatRouterAgent, ProxyAgent, ProxyApi, RouterApi,
    },
    messages::{
        ChatRequested, FailureReported, SetLlmRequested, SetPromptRequested, SetStreamingModeRequested,
        SetUserProfilePromptRequested,
    },
    mock_backends::BackendRegistry,
};

/// The dispatch table every chat runtime is built with.
pub fn dispatch_table() -> AeonResult<DispatchTable> {
    Ok(DispatchTable::builder()
        .on::<ConfigurationAgent, SetLlmRequested, _, _>(|agent, _, msg| async move {
            agent.set_system_llm(&msg.system_llm).await
        })?
        .on::<ConfigurationAgent, SetPromptRequested, _, _>(|agent, _, msg| async move {
            agent.set_prompt(&msg.prompt).await
        })?
        .on::<ConfigurationAgent, SetStreamingModeRequested, _, _>(|agent, _, msg| async move {
            agent.set_streaming_mode(msg.enabled).await
        })?
        .on::<ConfigurationAgent, SetUserProfilePromptRequested, _, _>(|agent, _, msg| async move {
            agent.set_user_profile_prompt(&msg.prompt).await
        })?
        .on::<ProxyAgent, FailureReported, _, _>(|agent, _, msg| async move {
            agent.record_failure(msg.signal).await.map(|_| ())
        })?
        .on::<ChatRouterAgent, ChatRequested, _, _>(|agent, envelope, msg| async move {
            match agent.chat(&msg.region, &msg.prompt).await {
                Ok(_) => Ok(()),
                // Retrying cannot help until a breaker recovers.
                Err(AeonError::NoAvailableBackend { region }) => {
                    warn!(agent = %agent.address(), event_id = %envelope.event_id, region = %region, "chat request dropped: no available backend");
                    Ok(())
                }
                Err(err) => Err(err),
            }
        })?
        .on_any::<ActivityLogAgent, _, _>(|agent, envelope| async move {
            activity::observe(&agent, &envelope).await.map(|_| ())
        })?
        .build())
}

/// Build a runtime with the chat dispatch table, the bus policy from
/// `config`, and `config` plus `backends` registered as services.
pub fn build_runtime(
    config: RuntimeConfig,
    journal: Arc<dyn EventJournal>,
    clock: Arc<dyn Clock>,
    backends: BackendRegistry,
) -> AeonResult<Runtime> {
    Runtime::builder()
        .journal(journal)
        .clock(clock)
        .dispatch(dispatch_table()?)
        .bus_policy(config.bus.policy())
        .service(Arc::new(backends))
        .service(Arc::new(config))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_covers_every_chat_message() {
        let table = dispatch_table().unwrap();
        assert_eq!(
            table.kinds_for("configuration"),
            [
                "set-llm-requested",
                "set-prompt-requested",
                "set-streaming-mode-requested",
                "set-user-profile-prompt-requested",
            ]
        );
        assert!(table.accepts("proxy", "failure-reported"));
        assert!(table.accepts("chat-router", "chat-requested"));
        assert!(table.accepts("activity-log", "anything-at-all"));
        assert!(!table.accepts("proxy", "chat-requested"));
    }
}

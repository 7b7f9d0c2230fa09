//! Configuration agent: the settings a chat deployment runs with.
//!
//! Every setter is one turn: propose the matching event, confirm, then
//! announce the change on the bus. A fresh agent starts with the provider
//! "OpenAI" and streaming on; those defaults live in `State::default()` so
//! activation never writes to the log.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use aeon_contracts::error::AeonResult;
use aeon_core::{
    traits::{Agent, AgentEvent},
    AgentHandle,
};

use crate::messages::ConfigurationChanged;

pub const DEFAULT_SYSTEM_LLM: &str = "OpenAI";

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationState {
    pub system_llm: String,
    pub prompt: String,
    pub streaming_mode_enabled: bool,
    pub user_profile_prompt: String,
}

impl Default for ConfigurationState {
    fn default() -> Self {
        Self {
            system_llm: DEFAULT_SYSTEM_LLM.to_string(),
            prompt: String::new(),
            streaming_mode_enabled: true,
            user_profile_prompt: String::new(),
        }
    }
}

/// Logged under the variant tag, with every field under its ordinal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ConfigurationEvent {
    SystemLlmSet {
        #[serde(rename = "1")]
        system_llm: String,
    },
    PromptSet {
        #[serde(rename = "1")]
        prompt: String,
    },
    StreamingModeSet {
        #[serde(rename = "1")]
        enabled: bool,
    },
    UserProfilePromptSet {
        #[serde(rename = "1")]
        prompt: String,
    },
}

impl AgentEvent for ConfigurationEvent {
    fn kind(&self) -> &'static str {
        match self {
            ConfigurationEvent::SystemLlmSet { .. } => "system-llm-set",
            ConfigurationEvent::PromptSet { .. } => "prompt-set",
            ConfigurationEvent::StreamingModeSet { .. } => "streaming-mode-set",
            ConfigurationEvent::UserProfilePromptSet { .. } => "user-profile-prompt-set",
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            ConfigurationEvent::SystemLlmSet { system_llm } if system_llm.trim().is_empty() => {
                Err("system LLM name must not be blank".to_string())
            }
            _ => Ok(()),
        }
    }
}

pub struct ConfigurationAgent;

impl Agent for ConfigurationAgent {
    const TYPE_NAME: &'static str = "configuration";
    type State = ConfigurationState;
    type Event = ConfigurationEvent;

    fn apply(state: &mut ConfigurationState, event: &ConfigurationEvent) {
        match event {
            ConfigurationEvent::SystemLlmSet { system_llm } => state.system_llm = system_llm.clone(),
            ConfigurationEvent::PromptSet { prompt } => state.prompt = prompt.clone(),
            ConfigurationEvent::StreamingModeSet { enabled } => state.streaming_mode_enabled = *enabled,
            ConfigurationEvent::UserProfilePromptSet { prompt } => {
                state.user_profile_prompt = prompt.clone()
            }
        }
    }
}

/// Operations on a configuration agent.
#[async_trait]
pub trait ConfigurationApi {
    async fn set_system_llm(&self, system_llm: &str) -> AeonResult<()>;
    async fn set_prompt(&self, prompt: &str) -> AeonResult<()>;
    async fn set_streaming_mode(&self, enabled: bool) -> AeonResult<()>;
    async fn set_user_profile_prompt(&self, prompt: &str) -> AeonResult<()>;

    /// Alias of `set_prompt`.
    async fn update_system_prompt(&self, prompt: &str) -> AeonResult<()> {
        self.set_prompt(prompt).await
    }

    fn system_llm(&self) -> String;
    fn prompt(&self) -> String;
    fn streaming_mode_enabled(&self) -> bool;
    fn user_profile_prompt(&self) -> String;
}

async fn commit_setting(
    agent: &AgentHandle<ConfigurationAgent>,
    event: ConfigurationEvent,
) -> AeonResult<()> {
    let setting = event.kind();
    let version = agent.commit([event]).await?;
    info!(agent = %agent.address(), setting, version, "configuration updated");
    // The setting is committed either way; the notice is best effort.
    if let Err(err) = agent.publish(&ConfigurationChanged {
        setting: setting.to_string(),
    }) {
        debug!(agent = %agent.address(), setting, error = %err, "configuration change not announced");
    }
    Ok(())
}

#[async_trait]
impl ConfigurationApi for AgentHandle<ConfigurationAgent> {
    async fn set_system_llm(&self, system_llm: &str) -> AeonResult<()> {
        commit_setting(
            self,
            ConfigurationEvent::SystemLlmSet {
                system_llm: system_llm.to_string(),
            },
        )
        .await
    }

    async fn set_prompt(&self, prompt: &str) -> AeonResult<()> {
        commit_setting(
            self,
            ConfigurationEvent::PromptSet {
                prompt: prompt.to_string(),
            },
        )
        .await
    }

    async fn set_streaming_mode(&self, enabled: bool) -> AeonResult<()> {
        commit_setting(self, ConfigurationEvent::StreamingModeSet { enabled }).await
    }

    async fn set_user_profile_prompt(&self, prompt: &str) -> AeonResult<()> {
        commit_setting(
            self,
            ConfigurationEvent::UserProfilePromptSet {
                prompt: prompt.to_string(),
            },
        )
        .await
    }

    fn system_llm(&self) -> String {
        self.read(|s| s.system_llm.clone())
    }

    fn prompt(&self) -> String {
        self.read(|s| s.prompt.clone())
    }

    fn streaming_mode_enabled(&self) -> bool {
        self.read(|s| s.streaming_mode_enabled)
    }

    fn user_profile_prompt(&self) -> String {
        self.read(|s| s.user_profile_prompt.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use aeon_contracts::{agent::AgentAddress, error::AeonError};
    use aeon_core::Runtime;
    use aeon_journal::InMemoryJournal;

    use super::*;

    fn runtime() -> (Runtime, Arc<InMemoryJournal>) {
        let journal = Arc::new(InMemoryJournal::new());
        let runtime = Runtime::builder().journal(journal.clone()).build().unwrap();
        (runtime, journal)
    }

    #[tokio::test]
    async fn fresh_agent_has_defaults_and_empty_log() {
        let (runtime, journal) = runtime();
        let config = runtime.agent::<ConfigurationAgent>("config-1").await.unwrap();

        assert_eq!(config.system_llm(), "OpenAI");
        assert!(config.streaming_mode_enabled());
        assert_eq!(config.prompt(), "");
        assert_eq!(journal.stream_len(config.address()), 0);
    }

    #[tokio::test]
    async fn setters_commit_one_event_each() {
        let (runtime, journal) = runtime();
        let config = runtime.agent::<ConfigurationAgent>("config-1").await.unwrap();

        config.set_system_llm("BytePlusDeepSeekV3").await.unwrap();
        config.update_system_prompt("You are helpful").await.unwrap();
        config.set_streaming_mode(false).await.unwrap();
        config.set_user_profile_prompt("likes brevity").await.unwrap();

        assert_eq!(
            config.snapshot(),
            ConfigurationState {
                system_llm: "BytePlusDeepSeekV3".to_string(),
                prompt: "You are helpful".to_string(),
                streaming_mode_enabled: false,
                user_profile_prompt: "likes brevity".to_string(),
            }
        );
        let kinds: Vec<String> = journal
            .export_stream(config.address())
            .records()
            .into_iter()
            .map(|r| r.kind)
            .collect();
        assert_eq!(
            kinds,
            ["system-llm-set", "prompt-set", "streaming-mode-set", "user-profile-prompt-set"]
        );
    }

    #[tokio::test]
    async fn proposed_prompt_is_invisible_until_confirmed() {
        let (runtime, _) = runtime();
        let config = runtime.agent::<ConfigurationAgent>("config-1").await.unwrap();
        config.set_prompt("Hi").await.unwrap();

        let mut turn = config.begin_turn().await;
        turn.propose(ConfigurationEvent::PromptSet {
            prompt: "Bye".to_string(),
        })
        .unwrap();
        assert_eq!(config.prompt(), "Hi");

        turn.confirm().await.unwrap();
        assert_eq!(config.prompt(), "Bye");
    }

    /// A closed bus does not turn a committed setting into an error.
    #[tokio::test]
    async fn setter_succeeds_when_change_cannot_be_announced() {
        let journal = Arc::new(InMemoryJournal::new());
        let runtime = Runtime::builder()
            .journal(journal.clone())
            .dispatch(crate::wiring::dispatch_table().unwrap())
            .build()
            .unwrap();
        runtime.subscribe_all(AgentAddress::new("activity-log", "log"));
        let config = runtime.agent::<ConfigurationAgent>("config-1").await.unwrap();
        config.set_prompt("Hi").await.unwrap();

        runtime.shutdown().await;
        config.set_prompt("Bye").await.unwrap();

        assert_eq!(config.prompt(), "Bye");
        assert_eq!(journal.stream_len(config.address()), 2);
    }

    #[tokio::test]
    async fn blank_llm_name_is_rejected_without_writing() {
        let (runtime, journal) = runtime();
        let config = runtime.agent::<ConfigurationAgent>("config-1").await.unwrap();

        let err = config.set_system_llm("  ").await.unwrap_err();
        assert!(matches!(err, AeonError::Propose { .. }));
        assert_eq!(config.system_llm(), "OpenAI");
        assert_eq!(journal.stream_len(config.address()), 0);
    }

    #[tokio::test]
    async fn failed_confirm_keeps_previous_prompt() {
        let (runtime, journal) = runtime();
        let config = runtime.agent::<ConfigurationAgent>("config-1").await.unwrap();
        config.set_prompt("Hi").await.unwrap();

        journal.fail_next_appends(1);
        let err = config.set_prompt("Bye").await.unwrap_err();
        assert!(err.is_confirm_failure());
        assert_eq!(config.prompt(), "Hi");
        assert_eq!(config.version(), 1);
    }
}

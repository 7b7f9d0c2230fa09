//! Static dispatch table: which handler runs for which (agent type, kind).
//!
//! Built once at startup and immutable afterwards. Each agent type may
//! register at most one handler per message kind plus one wildcard handler
//! that sees every kind, including kinds no code knew about when the table
//! was built. When both match, both run: the kind handler first.

use std::{collections::HashMap, fmt, future::Future, sync::Arc};

use futures::future::BoxFuture;

use aeon_contracts::{
    agent::AgentId,
    error::{AeonError, AeonResult},
    event::EventEnvelope,
};

use crate::{
    engine::AgentHandle,
    runtime::Runtime,
    traits::{Agent, BusMessage},
};

pub(crate) type ErasedHandler =
    Arc<dyn Fn(Runtime, AgentId, EventEnvelope) -> BoxFuture<'static, AeonResult<()>> + Send + Sync>;

#[derive(Default)]
struct TypeHandlers {
    by_kind: HashMap<String, ErasedHandler>,
    any_kind: Option<ErasedHandler>,
}

#[derive(Default)]
pub struct DispatchTable {
    types: HashMap<String, TypeHandlers>,
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (agent_type, handlers) in &self.types {
            let mut kinds: Vec<&str> = handlers.by_kind.keys().map(String::as_str).collect();
            kinds.sort_unstable();
            if handlers.any_kind.is_some() {
                kinds.push("*");
            }
            map.entry(agent_type, &kinds);
        }
        map.finish()
    }
}

impl DispatchTable {
    pub fn builder() -> DispatchTableBuilder {
        DispatchTableBuilder::default()
    }

    /// True if an agent of `agent_type` has any handler for `kind`.
    pub fn accepts(&self, agent_type: &str, kind: &str) -> bool {
        self.types
            .get(agent_type)
            .is_some_and(|h| h.any_kind.is_some() || h.by_kind.contains_key(kind))
    }

    /// Handlers to run for one delivery, kind-specific first.
    pub(crate) fn handlers_for(&self, agent_type: &str, kind: &str) -> Vec<ErasedHandler> {
        let Some(handlers) = self.types.get(agent_type) else {
            return Vec::new();
        };
        handlers
            .by_kind
            .get(kind)
            .into_iter()
            .chain(handlers.any_kind.as_ref())
            .cloned()
            .collect()
    }

    /// Kinds `agent_type` registered typed handlers for, sorted.
    pub fn kinds_for(&self, agent_type: &str) -> Vec<&str> {
        let mut kinds: Vec<&str> = self
            .types
            .get(agent_type)
            .map(|h| h.by_kind.keys().map(String::as_str).collect())
            .unwrap_or_default();
        kinds.sort_unstable();
        kinds
    }
}

#[derive(Default)]
pub struct DispatchTableBuilder {
    table: DispatchTable,
}

impl DispatchTableBuilder {
    /// Route messages of type `M` delivered to agents of type `A` to `handler`.
    ///
    /// The subscriber is activated on demand before the handler runs.
    pub fn on<A, M, F, Fut>(mut self, handler: F) -> AeonResult<Self>
    where
        A: Agent,
        M: BusMessage,
        F: Fn(AgentHandle<A>, EventEnvelope, M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AeonResult<()>> + Send + 'static,
    {
        let entry = self.table.types.entry(A::TYPE_NAME.to_string()).or_default();
        if entry.by_kind.contains_key(M::KIND) {
            return Err(AeonError::DuplicateHandler {
                agent_type: A::TYPE_NAME.to_string(),
                kind: M::KIND.to_string(),
            });
        }

        let handler = Arc::new(handler);
        let erased: ErasedHandler = Arc::new(move |runtime: Runtime, id: AgentId, envelope: EventEnvelope| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let message: M = serde_json::from_value(envelope.payload.clone()).map_err(|e| {
                    AeonError::Serialization {
                        reason: format!("'{}' payload does not decode: {}", envelope.kind, e),
                    }
                })?;
                let agent = runtime.agent::<A>(id).await?;
                handler(agent, envelope, message).await
            }) as BoxFuture<'static, AeonResult<()>>
        });
        entry.by_kind.insert(M::KIND.to_string(), erased);
        Ok(self)
    }

    /// Route every message delivered to agents of type `A` to `handler`,
    /// whatever its kind.
    pub fn on_any<A, F, Fut>(mut self, handler: F) -> AeonResult<Self>
    where
        A: Agent,
        F: Fn(AgentHandle<A>, EventEnvelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AeonResult<()>> + Send + 'static,
    {
        let entry = self.table.types.entry(A::TYPE_NAME.to_string()).or_default();
        if entry.any_kind.is_some() {
            return Err(AeonError::DuplicateHandler {
                agent_type: A::TYPE_NAME.to_string(),
                kind: "*".to_string(),
            });
        }

        let handler = Arc::new(handler);
        let erased: ErasedHandler = Arc::new(move |runtime: Runtime, id: AgentId, envelope: EventEnvelope| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let agent = runtime.agent::<A>(id).await?;
                handler(agent, envelope).await
            }) as BoxFuture<'static, AeonResult<()>>
        });
        entry.any_kind = Some(erased);
        Ok(self)
    }

    pub fn build(self) -> DispatchTable {
        self.table
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use aeon_contracts::error::AeonError;

    use super::DispatchTable;
    use crate::traits::{Agent, AgentEvent, BusMessage};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Nothing;

    impl AgentEvent for Nothing {
        fn kind(&self) -> &'static str {
            "nothing"
        }
    }

    struct Listener;

    impl Agent for Listener {
        const TYPE_NAME: &'static str = "listener";
        type State = ();
        type Event = Nothing;
        fn apply(_state: &mut (), _event: &Nothing) {}
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Ping;

    impl BusMessage for Ping {
        const KIND: &'static str = "ping";
    }

    #[test]
    fn duplicate_kind_handler_is_rejected() {
        let result = DispatchTable::builder()
            .on::<Listener, Ping, _, _>(|_, _, _| async { Ok(()) })
            .and_then(|b| b.on::<Listener, Ping, _, _>(|_, _, _| async { Ok(()) }));

        match result {
            Err(AeonError::DuplicateHandler { agent_type, kind }) => {
                assert_eq!(agent_type, "listener");
                assert_eq!(kind, "ping");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("second registration must fail"),
        }
    }

    #[test]
    fn wildcard_accepts_unknown_kinds() {
        let table = DispatchTable::builder()
            .on::<Listener, Ping, _, _>(|_, _, _| async { Ok(()) })
            .and_then(|b| b.on_any::<Listener, _, _>(|_, _| async { Ok(()) }))
            .unwrap()
            .build();

        assert!(table.accepts("listener", "ping"));
        assert!(table.accepts("listener", "never-registered"));
        assert!(!table.accepts("someone-else", "ping"));
        assert_eq!(table.handlers_for("listener", "ping").len(), 2);
        assert_eq!(table.handlers_for("listener", "other").len(), 1);
        assert_eq!(table.kinds_for("listener"), vec!["ping"]);
    }
}

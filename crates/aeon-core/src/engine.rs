//! The AEON agent engine: one event-sourced activation per identity.
//!
//! Every write follows the two-phase turn protocol:
//!
//!   begin_turn → propose* → confirm → (publish)
//!
//! `propose()` only buffers. `confirm()` is the commit point: it appends the
//! whole buffer to the journal and, only if that append succeeded, folds the
//! events into state in buffer order. Nothing proposed is observable before
//! confirm returns, and everything is observable at once after it.
//!
//! Non-reentrant agents hold an exclusive per-identity turn lock for the
//! whole turn. Reentrant agents skip that lock, but confirms on one identity
//! are still serialized so groups of events never interleave.

use std::{
    any::Any,
    fmt,
    future::Future,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, Weak},
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use aeon_contracts::{
    agent::{AgentAddress, AgentId},
    error::{AeonError, AeonResult},
    event::{EventId, RecordedEvent},
};

use crate::{
    runtime::{Runtime, RuntimeInner},
    schedule::ScheduledTasks,
    traits::{Agent, AgentEvent, BusMessage, Clock, EventJournal},
};

/// Rebuild an agent's state from its full event log.
///
/// Fails if the log is not contiguous from sequence 1 or if a payload no
/// longer decodes into the agent's event type.
pub fn replay<A: Agent>(records: &[RecordedEvent]) -> AeonResult<(A::State, u64)> {
    let mut state = A::State::default();
    let mut version = 0u64;

    for record in records {
        if record.sequence != version + 1 {
            return Err(AeonError::Journal {
                reason: format!(
                    "log of agent type '{}' jumps from sequence {} to {}",
                    A::TYPE_NAME,
                    version,
                    record.sequence
                ),
            });
        }
        let event: A::Event =
            serde_json::from_value(record.payload.clone()).map_err(|e| AeonError::Journal {
                reason: format!(
                    "event {} ('{}') does not decode as a '{}' event: {}",
                    record.sequence,
                    record.kind,
                    A::TYPE_NAME,
                    e
                ),
            })?;
        A::apply(&mut state, &event);
        version = record.sequence;
    }

    Ok((state, version))
}

// ── Activation cell ──────────────────────────────────────────────────────────

struct Committed<S> {
    state: S,
    version: u64,
}

/// The single activation of one agent identity.
pub(crate) struct AgentCell<A: Agent> {
    address: AgentAddress,
    committed: RwLock<Committed<A::State>>,
    /// Held for the lifetime of every non-reentrant turn.
    turn_lock: Arc<AsyncMutex<()>>,
    /// Held across journal append + fold so confirms never interleave.
    commit_lock: AsyncMutex<()>,
    tasks: ScheduledTasks,
    journal: Arc<dyn EventJournal>,
    clock: Arc<dyn Clock>,
    runtime: Weak<RuntimeInner>,
}

impl<A: Agent> AgentCell<A> {
    /// Replay the full log of `address` and build its activation.
    pub(crate) async fn activate(
        address: AgentAddress,
        journal: Arc<dyn EventJournal>,
        clock: Arc<dyn Clock>,
        runtime: Weak<RuntimeInner>,
    ) -> AeonResult<Arc<Self>> {
        let records = journal
            .read_events(&address)
            .await
            .map_err(|e| AeonError::Activation {
                agent: address.to_string(),
                reason: e.to_string(),
            })?;
        let (state, version) = replay::<A>(&records).map_err(|e| AeonError::Activation {
            agent: address.to_string(),
            reason: e.to_string(),
        })?;

        info!(
            agent = %address,
            replayed = records.len(),
            version,
            "agent activated"
        );

        Ok(Arc::new(Self {
            address,
            committed: RwLock::new(Committed { state, version }),
            turn_lock: Arc::new(AsyncMutex::new(())),
            commit_lock: AsyncMutex::new(()),
            tasks: ScheduledTasks::new(),
            journal,
            clock,
            runtime,
        }))
    }

    fn committed(&self) -> RwLockReadGuard<'_, Committed<A::State>> {
        self.committed.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace in-memory state with a fresh replay of the journal.
    ///
    /// Callers must hold `commit_lock`.
    async fn reload(&self) -> AeonResult<()> {
        let records = self.journal.read_events(&self.address).await?;
        let (state, version) = replay::<A>(&records)?;
        let mut committed = self.committed.write().unwrap_or_else(PoisonError::into_inner);
        committed.state = state;
        committed.version = version;
        info!(agent = %self.address, version, "agent state reloaded from journal");
        Ok(())
    }
}

/// Type-erased view of an activation, stored in the runtime registry.
pub(crate) trait LiveAgent: Send + Sync {
    fn address(&self) -> &AgentAddress;
    fn deactivate(&self);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<A: Agent> LiveAgent for AgentCell<A> {
    fn address(&self) -> &AgentAddress {
        &self.address
    }

    fn deactivate(&self) {
        let cancelled = self.tasks.cancel_all();
        info!(agent = %self.address, cancelled_tasks = cancelled, "agent deactivated");
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

// ── Handle ───────────────────────────────────────────────────────────────────

/// A cheap, clonable reference to one agent activation.
///
/// All reads go through the committed state; all writes go through a `Turn`.
pub struct AgentHandle<A: Agent> {
    cell: Arc<AgentCell<A>>,
}

impl<A: Agent> Clone for AgentHandle<A> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<A: Agent> fmt::Debug for AgentHandle<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentHandle")
            .field("address", &self.cell.address)
            .field("version", &self.version())
            .finish()
    }
}

impl<A: Agent> AgentHandle<A> {
    pub(crate) fn from_cell(cell: Arc<AgentCell<A>>) -> Self {
        Self { cell }
    }

    pub fn address(&self) -> &AgentAddress {
        &self.cell.address
    }

    pub fn id(&self) -> &AgentId {
        &self.cell.address.id
    }

    /// Start a write turn.
    ///
    /// For non-reentrant agents this waits until every other turn on this
    /// identity has finished, and holds the identity until the returned turn
    /// is dropped. Never call this while already holding a turn on the same
    /// non-reentrant agent.
    pub async fn begin_turn(&self) -> Turn<A> {
        let exclusive = if A::REENTRANT {
            None
        } else {
            Some(Arc::clone(&self.cell.turn_lock).lock_owned().await)
        };
        Turn {
            cell: Arc::clone(&self.cell),
            pending: Vec::new(),
            aborted: false,
            _exclusive: exclusive,
        }
    }

    /// Propose `events` in one turn and confirm them together.
    pub async fn commit(&self, events: impl IntoIterator<Item = A::Event>) -> AeonResult<u64> {
        let mut turn = self.begin_turn().await;
        for event in events {
            turn.propose(event)?;
        }
        turn.confirm().await
    }

    /// Read the committed state without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&A::State) -> R) -> R {
        f(&self.cell.committed().state)
    }

    /// Clone the committed state.
    pub fn snapshot(&self) -> A::State {
        self.read(Clone::clone)
    }

    /// Sequence of the last confirmed event (0 before the first confirm).
    pub fn version(&self) -> u64 {
        self.cell.committed().version
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.cell.clock.now()
    }

    /// The runtime that owns this activation, if it is still running.
    pub fn runtime(&self) -> Option<Runtime> {
        Runtime::upgrade(&self.cell.runtime)
    }

    /// Publish `message` on the bus with this agent as the origin.
    ///
    /// Returns as soon as the deliveries are queued; subscriber results are
    /// never reported back.
    pub fn publish<M: BusMessage>(&self, message: &M) -> AeonResult<EventId> {
        let runtime = self.runtime().ok_or_else(|| AeonError::Bus {
            reason: format!("runtime of '{}' has shut down", self.cell.address),
        })?;
        runtime.publish_from(&self.cell.address, message)
    }

    /// Run `task` every `period` for as long as this activation lives.
    ///
    /// Scheduling under an existing name replaces the older task. The first
    /// run happens one full period after scheduling.
    pub fn schedule_every<F, Fut>(
        &self,
        name: impl Into<String>,
        period: Duration,
        task: F,
    ) -> AeonResult<()>
    where
        F: Fn(AgentHandle<A>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        if period.is_zero() {
            return Err(AeonError::Config {
                reason: format!("scheduled task '{}' on '{}' has a zero period", name, self.cell.address),
            });
        }

        // The ticker adds `period` once more after the first run.
        let start = tokio::time::Instant::now()
            .checked_add(period)
            .filter(|start| start.checked_add(period).is_some())
            .ok_or_else(|| AeonError::Config {
                reason: format!("scheduled task '{}' on '{}' has a period too long to schedule", name, self.cell.address),
            })?;

        let weak = Arc::downgrade(&self.cell);
        debug!(agent = %self.cell.address, task = %name, ?period, "scheduling task");
        self.cell.tasks.spawn(name, async move {
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                ticker.tick().await;
                let Some(cell) = weak.upgrade() else {
                    break;
                };
                task(AgentHandle { cell }).await;
            }
        });
        Ok(())
    }

    pub fn cancel_task(&self, name: &str) -> bool {
        self.cell.tasks.cancel(name)
    }

    pub fn has_task(&self, name: &str) -> bool {
        self.cell.tasks.is_running(name)
    }
}

// ── Turn ─────────────────────────────────────────────────────────────────────

/// One logical write turn. Owns the pending buffer.
///
/// Dropping a turn with unconfirmed events discards them; that is how a
/// turn aborts.
pub struct Turn<A: Agent> {
    cell: Arc<AgentCell<A>>,
    pending: Vec<(A::Event, serde_json::Value)>,
    aborted: bool,
    _exclusive: Option<OwnedMutexGuard<()>>,
}

impl<A: Agent> Turn<A> {
    pub fn address(&self) -> &AgentAddress {
        &self.cell.address
    }

    /// A handle to the agent this turn runs on.
    pub fn agent(&self) -> AgentHandle<A> {
        AgentHandle {
            cell: Arc::clone(&self.cell),
        }
    }

    /// Buffer `event` for the next confirm.
    ///
    /// Performs no I/O. Fails only if the event is malformed (or the turn
    /// was aborted); the buffer is left as it was.
    pub fn propose(&mut self, event: A::Event) -> AeonResult<()> {
        if self.aborted {
            return Err(AeonError::TurnAborted {
                agent: self.cell.address.to_string(),
            });
        }
        event.validate().map_err(|reason| AeonError::Propose {
            reason: format!("{} on '{}': {}", event.kind(), self.cell.address, reason),
        })?;
        let payload = serde_json::to_value(&event).map_err(|e| AeonError::Propose {
            reason: format!("{} on '{}' is not serializable: {}", event.kind(), self.cell.address, e),
        })?;
        self.pending.push((event, payload));
        Ok(())
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Read the committed state. Pending events are never visible here.
    pub fn read<R>(&self, f: impl FnOnce(&A::State) -> R) -> R {
        f(&self.cell.committed().state)
    }

    pub fn state(&self) -> A::State {
        self.read(Clone::clone)
    }

    pub fn version(&self) -> u64 {
        self.cell.committed().version
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.cell.clock.now()
    }

    /// Durably append every pending event, then fold them into state.
    ///
    /// An empty buffer is a no-op. On failure the buffer is discarded, state
    /// is exactly what it was before, and the turn is aborted. Returns the
    /// agent's version after the commit.
    pub async fn confirm(&mut self) -> AeonResult<u64> {
        if self.aborted {
            return Err(AeonError::TurnAborted {
                agent: self.cell.address.to_string(),
            });
        }
        if self.pending.is_empty() {
            return Ok(self.version());
        }

        let pending = std::mem::take(&mut self.pending);
        let cell = Arc::clone(&self.cell);
        let _commit = cell.commit_lock.lock().await;

        let (base_version, mut next_state) = {
            let committed = cell.committed();
            (committed.version, committed.state.clone())
        };
        let recorded_at = cell.clock.now();
        let records: Vec<RecordedEvent> = pending
            .iter()
            .zip(1u64..)
            .map(|((event, payload), offset)| RecordedEvent {
                sequence: base_version + offset,
                kind: event.kind().to_string(),
                payload: payload.clone(),
                recorded_at,
            })
            .collect();

        if let Err(err) = cell
            .journal
            .append_events(&cell.address, base_version, &records)
            .await
        {
            self.aborted = true;
            warn!(
                agent = %cell.address,
                discarded = records.len(),
                error = %err,
                "confirm failed, pending events discarded"
            );
            if matches!(err, AeonError::VersionConflict { .. }) {
                // Someone else advanced the log; catch up so the next turn
                // starts from the durable truth.
                if let Err(reload_err) = cell.reload().await {
                    warn!(agent = %cell.address, error = %reload_err, "reload after conflict failed");
                }
            }
            return Err(match err {
                e @ (AeonError::Confirm { .. } | AeonError::VersionConflict { .. }) => e,
                other => AeonError::Confirm {
                    agent: cell.address.to_string(),
                    reason: other.to_string(),
                },
            });
        }

        for (event, _) in &pending {
            A::apply(&mut next_state, event);
        }
        let version = base_version + records.len() as u64;
        {
            let mut committed = cell.committed.write().unwrap_or_else(PoisonError::into_inner);
            committed.state = next_state;
            committed.version = version;
        }

        debug!(
            agent = %cell.address,
            committed = records.len(),
            version,
            "events confirmed"
        );
        Ok(version)
    }
}

impl<A: Agent> Drop for Turn<A> {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            debug!(
                agent = %self.cell.address,
                discarded = self.pending.len(),
                "turn ended without confirm, pending events discarded"
            );
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicBool, AtomicU32, Ordering},
            Arc, Mutex,
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use chrono::Utc;
    use proptest::prelude::*;
    use serde::{Deserialize, Serialize};

    use aeon_contracts::{
        agent::AgentAddress,
        error::{AeonError, AeonResult},
        event::RecordedEvent,
    };

    use crate::{
        runtime::Runtime,
        traits::{Agent, AgentEvent, EventJournal},
    };

    use super::replay;

    // ── Mock helpers ─────────────────────────────────────────────────────────

    /// A journal that keeps logs in a map and can be told to fail appends.
    #[derive(Default)]
    struct MockJournal {
        logs: Mutex<HashMap<AgentAddress, Vec<RecordedEvent>>>,
        fail_appends: AtomicBool,
        appends: AtomicU32,
    }

    #[async_trait]
    impl EventJournal for MockJournal {
        async fn append_events(
            &self,
            agent: &AgentAddress,
            expected_version: u64,
            events: &[RecordedEvent],
        ) -> AeonResult<u64> {
            self.appends.fetch_add(1, Ordering::SeqCst);
            if self.fail_appends.load(Ordering::SeqCst) {
                return Err(AeonError::Journal {
                    reason: "disk full".to_string(),
                });
            }
            let mut logs = self.logs.lock().unwrap();
            let log = logs.entry(agent.clone()).or_default();
            let actual = log.last().map(|r| r.sequence).unwrap_or(0);
            if actual != expected_version {
                return Err(AeonError::VersionConflict {
                    agent: agent.to_string(),
                    expected: expected_version,
                    actual,
                });
            }
            log.extend_from_slice(events);
            Ok(log.last().map(|r| r.sequence).unwrap_or(0))
        }

        async fn read_events(&self, agent: &AgentAddress) -> AeonResult<Vec<RecordedEvent>> {
            Ok(self.logs.lock().unwrap().get(agent).cloned().unwrap_or_default())
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", rename_all = "kebab-case")]
    enum CounterEvent {
        Added { amount: i64 },
        Labelled { label: String },
    }

    impl AgentEvent for CounterEvent {
        fn kind(&self) -> &'static str {
            match self {
                CounterEvent::Added { .. } => "added",
                CounterEvent::Labelled { .. } => "labelled",
            }
        }

        fn validate(&self) -> Result<(), String> {
            match self {
                CounterEvent::Labelled { label } if label.is_empty() => {
                    Err("label must not be empty".to_string())
                }
                _ => Ok(()),
            }
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct CounterState {
        total: i64,
        labels: Vec<String>,
        applied: u64,
    }

    struct Counter;

    impl Agent for Counter {
        const TYPE_NAME: &'static str = "counter";
        type State = CounterState;
        type Event = CounterEvent;

        fn apply(state: &mut CounterState, event: &CounterEvent) {
            state.applied += 1;
            match event {
                CounterEvent::Added { amount } => state.total += amount,
                CounterEvent::Labelled { label } => state.labels.push(label.clone()),
            }
        }
    }

    struct ReentrantCounter;

    impl Agent for ReentrantCounter {
        const TYPE_NAME: &'static str = "reentrant-counter";
        const REENTRANT: bool = true;
        type State = CounterState;
        type Event = CounterEvent;

        fn apply(state: &mut CounterState, event: &CounterEvent) {
            Counter::apply(state, event)
        }
    }

    fn runtime_with(journal: Arc<MockJournal>) -> Runtime {
        Runtime::builder().journal(journal).build().unwrap()
    }

    // ── Test cases ───────────────────────────────────────────────────────────

    /// Proposed events stay invisible until confirm, then all appear at once.
    #[tokio::test]
    async fn test_confirm_is_the_commit_point() {
        let runtime = runtime_with(Arc::new(MockJournal::default()));
        let counter = runtime.agent::<Counter>("c-1").await.unwrap();

        let mut turn = counter.begin_turn().await;
        turn.propose(CounterEvent::Added { amount: 2 }).unwrap();
        turn.propose(CounterEvent::Added { amount: 3 }).unwrap();

        assert_eq!(turn.read(|s| s.total), 0, "pending events must not be visible");
        assert_eq!(counter.read(|s| s.total), 0);

        let version = turn.confirm().await.unwrap();
        assert_eq!(version, 2);
        assert_eq!(counter.read(|s| s.total), 5);
        assert_eq!(turn.pending_len(), 0);
    }

    /// A failed append leaves state exactly as it was and aborts the turn.
    #[tokio::test]
    async fn test_confirm_failure_rolls_back() {
        let journal = Arc::new(MockJournal::default());
        let runtime = runtime_with(journal.clone());
        let counter = runtime.agent::<Counter>("c-1").await.unwrap();
        counter.commit([CounterEvent::Added { amount: 1 }]).await.unwrap();
        let before = counter.snapshot();

        journal.fail_appends.store(true, Ordering::SeqCst);
        let mut turn = counter.begin_turn().await;
        for amount in 0..5 {
            turn.propose(CounterEvent::Added { amount }).unwrap();
        }
        let err = turn.confirm().await.unwrap_err();
        assert!(err.is_confirm_failure(), "got {err:?}");

        assert_eq!(counter.snapshot(), before, "no partial application");
        assert_eq!(counter.version(), 1);
        assert_eq!(turn.pending_len(), 0, "pending buffer discarded");

        // The turn is dead: nothing more may be proposed or confirmed on it.
        assert!(matches!(
            turn.propose(CounterEvent::Added { amount: 1 }),
            Err(AeonError::TurnAborted { .. })
        ));
        assert!(matches!(turn.confirm().await, Err(AeonError::TurnAborted { .. })));
    }

    /// Confirm with nothing pending touches neither state nor journal.
    #[tokio::test]
    async fn test_empty_confirm_is_noop() {
        let journal = Arc::new(MockJournal::default());
        let runtime = runtime_with(journal.clone());
        let counter = runtime.agent::<Counter>("c-1").await.unwrap();
        counter.commit([CounterEvent::Added { amount: 4 }]).await.unwrap();
        let appends_before = journal.appends.load(Ordering::SeqCst);

        let mut turn = counter.begin_turn().await;
        assert_eq!(turn.confirm().await.unwrap(), 1);
        assert_eq!(journal.appends.load(Ordering::SeqCst), appends_before);
        assert_eq!(counter.read(|s| s.total), 4);
    }

    /// A malformed payload is rejected before buffering; earlier proposals survive.
    #[tokio::test]
    async fn test_propose_rejects_malformed_event() {
        let runtime = runtime_with(Arc::new(MockJournal::default()));
        let counter = runtime.agent::<Counter>("c-1").await.unwrap();

        let mut turn = counter.begin_turn().await;
        turn.propose(CounterEvent::Added { amount: 1 }).unwrap();
        let err = turn
            .propose(CounterEvent::Labelled { label: String::new() })
            .unwrap_err();
        assert!(matches!(err, AeonError::Propose { .. }));
        assert_eq!(turn.pending_len(), 1);

        turn.confirm().await.unwrap();
        assert_eq!(counter.read(|s| s.total), 1);
    }

    /// Dropping a turn discards its pending events.
    #[tokio::test]
    async fn test_dropped_turn_discards_pending() {
        let runtime = runtime_with(Arc::new(MockJournal::default()));
        let counter = runtime.agent::<Counter>("c-1").await.unwrap();
        {
            let mut turn = counter.begin_turn().await;
            turn.propose(CounterEvent::Added { amount: 9 }).unwrap();
        }
        assert_eq!(counter.version(), 0);

        // The identity is free again for the next turn.
        counter.commit([CounterEvent::Added { amount: 1 }]).await.unwrap();
        assert_eq!(counter.read(|s| s.total), 1);
    }

    /// Non-reentrant agents run one turn at a time.
    #[tokio::test]
    async fn test_non_reentrant_turns_are_serialized() {
        let runtime = runtime_with(Arc::new(MockJournal::default()));
        let counter = runtime.agent::<Counter>("c-1").await.unwrap();

        let first = counter.begin_turn().await;
        let second = tokio::time::timeout(Duration::from_millis(50), counter.begin_turn()).await;
        assert!(second.is_err(), "second turn must wait for the first");

        drop(first);
        let second = tokio::time::timeout(Duration::from_millis(50), counter.begin_turn()).await;
        assert!(second.is_ok());
    }

    /// Reentrant turns may overlap, but each confirm lands as one contiguous group.
    #[tokio::test]
    async fn test_reentrant_turns_interleave_without_mixing_groups() {
        let journal = Arc::new(MockJournal::default());
        let runtime = runtime_with(journal.clone());
        let counter = runtime.agent::<ReentrantCounter>("r-1").await.unwrap();

        let mut a = counter.begin_turn().await;
        let mut b = counter.begin_turn().await;
        a.propose(CounterEvent::Labelled { label: "a1".into() }).unwrap();
        b.propose(CounterEvent::Labelled { label: "b1".into() }).unwrap();
        a.propose(CounterEvent::Labelled { label: "a2".into() }).unwrap();
        b.propose(CounterEvent::Labelled { label: "b2".into() }).unwrap();

        b.confirm().await.unwrap();
        a.confirm().await.unwrap();

        assert_eq!(counter.read(|s| s.labels.clone()), vec!["b1", "b2", "a1", "a2"]);
        let log = journal.read_events(counter.address()).await.unwrap();
        let sequences: Vec<u64> = log.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4]);
    }

    /// Deactivating and re-activating replays the log into the same state.
    #[tokio::test]
    async fn test_reactivation_replays_log() {
        let journal = Arc::new(MockJournal::default());
        let runtime = runtime_with(journal);
        let counter = runtime.agent::<Counter>("c-1").await.unwrap();
        counter
            .commit([
                CounterEvent::Added { amount: 5 },
                CounterEvent::Labelled { label: "x".into() },
            ])
            .await
            .unwrap();
        let live = counter.snapshot();

        assert!(runtime.deactivate(counter.address()));
        let again = runtime.agent::<Counter>("c-1").await.unwrap();
        assert_eq!(again.snapshot(), live);
        assert_eq!(again.version(), 2);
    }

    /// A second writer that bypasses this activation causes a conflict,
    /// after which the activation catches up with the journal.
    #[tokio::test]
    async fn test_version_conflict_reloads_state() {
        let journal = Arc::new(MockJournal::default());
        let runtime = runtime_with(journal.clone());
        let counter = runtime.agent::<Counter>("c-1").await.unwrap();

        // Out-of-band append at sequence 1.
        let foreign = RecordedEvent {
            sequence: 1,
            kind: "added".to_string(),
            payload: serde_json::to_value(CounterEvent::Added { amount: 10 }).unwrap(),
            recorded_at: Utc::now(),
        };
        journal
            .append_events(counter.address(), 0, &[foreign])
            .await
            .unwrap();

        let err = counter
            .commit([CounterEvent::Added { amount: 1 }])
            .await
            .unwrap_err();
        assert!(matches!(err, AeonError::VersionConflict { .. }));
        assert_eq!(counter.read(|s| s.total), 10);
        assert_eq!(counter.version(), 1);
    }

    #[tokio::test]
    async fn test_schedule_every_rejects_unschedulable_periods() {
        let runtime = runtime_with(Arc::new(MockJournal::default()));
        let counter = runtime.agent::<Counter>("c-1").await.unwrap();

        let err = counter
            .schedule_every("tick", Duration::MAX, |_agent| async {})
            .unwrap_err();
        assert!(matches!(err, AeonError::Config { .. }));
        let err = counter
            .schedule_every("tick", Duration::ZERO, |_agent| async {})
            .unwrap_err();
        assert!(matches!(err, AeonError::Config { .. }));
        assert!(!counter.has_task("tick"));

        counter
            .schedule_every("tick", Duration::from_secs(3600), |_agent| async {})
            .unwrap();
        assert!(counter.has_task("tick"));
    }

    /// Replaying a log with a gap is refused.
    #[test]
    fn test_replay_rejects_gaps() {
        let record = |sequence| RecordedEvent {
            sequence,
            kind: "added".to_string(),
            payload: serde_json::to_value(CounterEvent::Added { amount: 1 }).unwrap(),
            recorded_at: Utc::now(),
        };
        assert!(replay::<Counter>(&[record(1), record(2)]).is_ok());
        assert!(replay::<Counter>(&[record(1), record(3)]).is_err());
    }

    fn counter_event() -> impl Strategy<Value = CounterEvent> {
        prop_oneof![
            (-1_000i64..1_000).prop_map(|amount| CounterEvent::Added { amount }),
            "[a-z]{1,8}".prop_map(|label| CounterEvent::Labelled { label }),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

        /// Folding events turn by turn and replaying the resulting log from
        /// empty state always agree.
        #[test]
        fn replay_matches_incremental_state(
            batches in proptest::collection::vec(proptest::collection::vec(counter_event(), 0..5), 1..8)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let journal = Arc::new(MockJournal::default());
                let runtime = runtime_with(journal.clone());
                let counter = runtime.agent::<Counter>("p-1").await.unwrap();

                for batch in &batches {
                    counter.commit(batch.clone()).await.unwrap();
                }

                let log = journal.read_events(counter.address()).await.unwrap();
                let (replayed, version) = replay::<Counter>(&log).unwrap();
                prop_assert_eq!(replayed, counter.snapshot());
                prop_assert_eq!(version, counter.version());
                Ok(())
            })?;
        }
    }
}

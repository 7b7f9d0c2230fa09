//! The AEON runtime: activation registry, bus front-end and service lookup.
//!
//! A `Runtime` is a cheap handle. Agents are activated lazily on first use
//! and at most once per address; concurrent first uses share one activation.

use std::{
    any::{type_name, Any, TypeId},
    collections::HashMap,
    fmt,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, PoisonError, Weak},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use aeon_contracts::{
    agent::{AgentAddress, AgentId},
    error::{AeonError, AeonResult},
    event::{EventEnvelope, EventId},
};

use crate::{
    bus::{BusPolicy, BusTransport, Delivery, DeliverySink, MailboxTransport, Subscriptions},
    clock::SystemClock,
    dispatch::{DispatchTable, ErasedHandler},
    engine::{AgentCell, AgentHandle, LiveAgent},
    traits::{Agent, BusMessage, Clock, EventJournal},
};

type Slot = Arc<OnceCell<Arc<dyn LiveAgent>>>;

pub(crate) struct RuntimeInner {
    me: Weak<RuntimeInner>,
    journal: Arc<dyn EventJournal>,
    clock: Arc<dyn Clock>,
    dispatch: DispatchTable,
    transport: Arc<dyn BusTransport>,
    bus_policy: BusPolicy,
    subscriptions: Mutex<Subscriptions>,
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    activations: Mutex<HashMap<AgentAddress, Slot>>,
}

#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("active_agents", &self.active_count())
            .field("dispatch", &self.inner.dispatch)
            .field("bus_policy", &self.inner.bus_policy)
            .finish()
    }
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    pub(crate) fn upgrade(inner: &Weak<RuntimeInner>) -> Option<Runtime> {
        inner.upgrade().map(|inner| Runtime { inner })
    }

    // ── Activation ───────────────────────────────────────────────────────────

    /// Get the activation of `A` under `id`, activating it on first use.
    ///
    /// Activation replays the full journal for the address; a failed
    /// activation is not cached and the next call tries again.
    pub async fn agent<A: Agent>(&self, id: impl Into<AgentId>) -> AeonResult<AgentHandle<A>> {
        let address = AgentAddress::new(A::TYPE_NAME, id);
        let slot: Slot = {
            let mut activations = self.lock_activations();
            Arc::clone(activations.entry(address.clone()).or_default())
        };

        let live = slot
            .get_or_try_init(|| async {
                let cell = AgentCell::<A>::activate(
                    address.clone(),
                    Arc::clone(&self.inner.journal),
                    Arc::clone(&self.inner.clock),
                    self.inner.me.clone(),
                )
                .await?;
                A::on_activate(&AgentHandle::from_cell(Arc::clone(&cell)));
                Ok::<Arc<dyn LiveAgent>, AeonError>(cell)
            })
            .await?;

        let cell = Arc::clone(live)
            .into_any()
            .downcast::<AgentCell<A>>()
            .map_err(|_| AeonError::Activation {
                agent: address.to_string(),
                reason: "address is already live under a different agent type".to_string(),
            })?;
        Ok(AgentHandle::from_cell(cell))
    }

    pub fn is_active(&self, address: &AgentAddress) -> bool {
        self.lock_activations()
            .get(address)
            .is_some_and(|slot| slot.initialized())
    }

    pub fn active_count(&self) -> usize {
        self.lock_activations()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    /// Drop the activation of `address` and cancel its scheduled tasks.
    ///
    /// The next use re-activates it from the journal. Returns false if the
    /// address was not active.
    pub fn deactivate(&self, address: &AgentAddress) -> bool {
        let slot = self.lock_activations().remove(address);
        self.inner.transport.release(address);
        match slot.as_ref().and_then(|slot| slot.get()) {
            Some(live) => {
                live.deactivate();
                true
            }
            None => false,
        }
    }

    /// Let in-flight deliveries finish, close the bus, then deactivate
    /// every agent.
    pub async fn shutdown(&self) {
        self.inner.transport.drain().await;
        self.inner.transport.close();

        let slots: Vec<Slot> = self.lock_activations().drain().map(|(_, slot)| slot).collect();
        let mut deactivated = 0usize;
        for live in slots.iter().filter_map(|slot| slot.get()) {
            live.deactivate();
            debug!(agent = %live.address(), "deactivated at shutdown");
            deactivated += 1;
        }
        info!(deactivated, "runtime shut down");
    }

    fn lock_activations(&self) -> std::sync::MutexGuard<'_, HashMap<AgentAddress, Slot>> {
        self.inner.activations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Bus ──────────────────────────────────────────────────────────────────

    /// Deliver everything `origin` publishes to `subscriber`.
    pub fn subscribe(&self, origin: AgentAddress, subscriber: AgentAddress) -> bool {
        debug!(origin = %origin, subscriber = %subscriber, "subscribing");
        self.lock_subscriptions().subscribe(origin, subscriber)
    }

    /// Deliver everything anyone publishes to `subscriber`.
    pub fn subscribe_all(&self, subscriber: AgentAddress) -> bool {
        debug!(subscriber = %subscriber, "subscribing to every origin");
        self.lock_subscriptions().subscribe_all(subscriber)
    }

    pub fn unsubscribe(&self, origin: &AgentAddress, subscriber: &AgentAddress) -> bool {
        self.lock_subscriptions().unsubscribe(origin, subscriber)
    }

    /// Publish `message` as coming from `origin`.
    pub fn publish_from<M: BusMessage>(&self, origin: &AgentAddress, message: &M) -> AeonResult<EventId> {
        let payload = serde_json::to_value(message)?;
        self.publish_value(origin, M::KIND, payload)
    }

    /// Publish an untyped payload under `kind`.
    pub fn publish_value(
        &self,
        origin: &AgentAddress,
        kind: &str,
        payload: serde_json::Value,
    ) -> AeonResult<EventId> {
        let envelope = EventEnvelope::new(origin.clone(), kind, payload, self.now());
        self.publish_envelope(envelope)
    }

    /// Hand `envelope` to every subscriber of its publisher that has a
    /// handler for its kind. Returns once the deliveries are queued.
    pub fn publish_envelope(&self, envelope: EventEnvelope) -> AeonResult<EventId> {
        let recipients: Vec<AgentAddress> = self
            .lock_subscriptions()
            .matching(&envelope.publisher)
            .into_iter()
            .filter(|s| self.inner.dispatch.accepts(&s.agent_type, &envelope.kind))
            .collect();

        let event_id = envelope.event_id;
        debug!(
            publisher = %envelope.publisher,
            kind = %envelope.kind,
            event_id = %event_id,
            recipients = recipients.len(),
            "publishing event"
        );

        let sink: Weak<dyn DeliverySink> = self.inner.me.clone();
        let mut first_error = None;
        for subscriber in recipients {
            let delivery = Delivery {
                subscriber,
                envelope: envelope.clone(),
            };
            if let Err(err) = self.inner.transport.enqueue(delivery, sink.clone()) {
                warn!(event_id = %event_id, error = %err, "delivery not queued");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(event_id),
        }
    }

    /// Wait until the bus is idle, including cascaded publishes.
    pub async fn drain(&self) {
        self.inner.transport.drain().await;
    }

    fn lock_subscriptions(&self) -> std::sync::MutexGuard<'_, Subscriptions> {
        self.inner.subscriptions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Services ─────────────────────────────────────────────────────────────

    /// Look up a shared service registered on the builder.
    pub fn service<T: Any + Send + Sync>(&self) -> AeonResult<Arc<T>> {
        self.inner
            .services
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|service| service.downcast::<T>().ok())
            .ok_or_else(|| AeonError::Config {
                reason: format!("no service of type {} registered", type_name::<T>()),
            })
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.inner.clock)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    pub fn journal(&self) -> Arc<dyn EventJournal> {
        Arc::clone(&self.inner.journal)
    }

    pub fn dispatch_table(&self) -> &DispatchTable {
        &self.inner.dispatch
    }

    pub fn bus_policy(&self) -> BusPolicy {
        self.inner.bus_policy
    }
}

// ── Delivery ─────────────────────────────────────────────────────────────────

impl RuntimeInner {
    /// Run one handler until it succeeds or runs out of redeliveries.
    async fn run_with_redelivery(
        &self,
        runtime: &Runtime,
        handler: &ErasedHandler,
        delivery: &Delivery,
    ) -> AeonResult<()> {
        let attempts = 1 + self.bus_policy.max_redeliveries;
        let mut last_reason = String::new();

        for attempt in 1..=attempts {
            let call = handler(
                runtime.clone(),
                delivery.subscriber.id.clone(),
                delivery.envelope.clone(),
            );
            let reason = match AssertUnwindSafe(call).catch_unwind().await {
                Ok(Ok(())) => {
                    if attempt > 1 {
                        debug!(
                            subscriber = %delivery.subscriber,
                            event_id = %delivery.envelope.event_id,
                            attempt,
                            "redelivery succeeded"
                        );
                    }
                    return Ok(());
                }
                Ok(Err(err)) => err.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };

            warn!(
                subscriber = %delivery.subscriber,
                kind = %delivery.envelope.kind,
                event_id = %delivery.envelope.event_id,
                attempt,
                error = %reason,
                "handler failed"
            );
            last_reason = reason;
        }

        error!(
            subscriber = %delivery.subscriber,
            kind = %delivery.envelope.kind,
            event_id = %delivery.envelope.event_id,
            attempts,
            "delivery abandoned"
        );
        Err(AeonError::Handler {
            subscriber: delivery.subscriber.to_string(),
            kind: delivery.envelope.kind.clone(),
            reason: last_reason,
        })
    }
}

#[async_trait]
impl DeliverySink for RuntimeInner {
    async fn deliver(&self, delivery: &Delivery) -> AeonResult<()> {
        let runtime = Runtime::upgrade(&self.me).ok_or_else(|| AeonError::Bus {
            reason: "runtime has shut down".to_string(),
        })?;
        let handlers = self
            .dispatch
            .handlers_for(&delivery.subscriber.agent_type, &delivery.envelope.kind);

        // Handlers are independent: one giving up does not skip the next.
        let mut outcome = Ok(());
        for handler in &handlers {
            if let Err(err) = self.run_with_redelivery(&runtime, handler, delivery).await {
                outcome = Err(err);
            }
        }
        outcome
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("handler panicked: {message}")
    } else {
        "handler panicked".to_string()
    }
}

// ── Builder ──────────────────────────────────────────────────────────────────

pub struct RuntimeBuilder {
    journal: Option<Arc<dyn EventJournal>>,
    clock: Arc<dyn Clock>,
    dispatch: DispatchTable,
    transport: Option<Arc<dyn BusTransport>>,
    bus_policy: BusPolicy,
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self {
            journal: None,
            clock: Arc::new(SystemClock),
            dispatch: DispatchTable::default(),
            transport: None,
            bus_policy: BusPolicy::default(),
            services: HashMap::new(),
        }
    }
}

impl RuntimeBuilder {
    pub fn journal(mut self, journal: Arc<dyn EventJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn dispatch(mut self, dispatch: DispatchTable) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn BusTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn bus_policy(mut self, policy: BusPolicy) -> Self {
        self.bus_policy = policy;
        self
    }

    /// Register a shared service, replacing any earlier one of the same type.
    pub fn service<T: Any + Send + Sync>(mut self, service: Arc<T>) -> Self {
        self.services.insert(TypeId::of::<T>(), service);
        self
    }

    pub fn build(self) -> AeonResult<Runtime> {
        let journal = self.journal.ok_or_else(|| AeonError::Config {
            reason: "a runtime needs an event journal".to_string(),
        })?;
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(MailboxTransport::new()));

        let inner = Arc::new_cyclic(|me| RuntimeInner {
            me: me.clone(),
            journal,
            clock: self.clock,
            dispatch: self.dispatch,
            transport,
            bus_policy: self.bus_policy,
            subscriptions: Mutex::new(Subscriptions::default()),
            services: self.services,
            activations: Mutex::new(HashMap::new()),
        });
        debug!(dispatch = ?inner.dispatch, "runtime built");
        Ok(Runtime { inner })
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

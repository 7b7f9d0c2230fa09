//! Event bus plumbing: subscriptions, deliveries and the mailbox transport.
//!
//! Publishing never waits for subscribers. Each publish resolves the
//! subscriber set, then hands one `Delivery` per subscriber to the
//! transport. The transport owns ordering: `MailboxTransport` keeps one FIFO
//! mailbox and one worker per subscriber, so everything a subscriber
//! receives from a given origin arrives in publish order.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, PoisonError, Weak,
    },
};

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, trace};

use aeon_contracts::{
    agent::AgentAddress,
    error::{AeonError, AeonResult},
    event::EventEnvelope,
};

/// Redeliveries attempted after a handler's first failure.
pub const DEFAULT_MAX_REDELIVERIES: u32 = 3;

/// One envelope addressed to one subscriber.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub subscriber: AgentAddress,
    pub envelope: EventEnvelope,
}

/// Whoever runs handlers for a delivery. Implemented by the runtime.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Run every matching handler for `delivery`, retrying failures.
    ///
    /// An error here means the delivery was abandoned; it has already been
    /// logged and is never reported to the publisher.
    async fn deliver(&self, delivery: &Delivery) -> AeonResult<()>;
}

/// Moves deliveries from publishers to subscribers.
#[async_trait]
pub trait BusTransport: Send + Sync {
    /// Queue `delivery`. Must not block on the subscriber.
    fn enqueue(&self, delivery: Delivery, sink: Weak<dyn DeliverySink>) -> AeonResult<()>;

    /// Refuse further deliveries. Already queued ones still run.
    fn close(&self);

    /// Wait until every queued delivery, including any published while
    /// draining, has been handled.
    async fn drain(&self);

    /// Drop per-subscriber resources of `subscriber`. Later deliveries to it
    /// must still work.
    fn release(&self, _subscriber: &AgentAddress) {}
}

/// Retry policy applied to every handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusPolicy {
    pub max_redeliveries: u32,
}

impl Default for BusPolicy {
    fn default() -> Self {
        Self {
            max_redeliveries: DEFAULT_MAX_REDELIVERIES,
        }
    }
}

// ── Subscriptions ────────────────────────────────────────────────────────────

/// Who listens to whom.
///
/// A subscriber is listed at most once per origin; subscribing twice is a
/// no-op rather than a double delivery.
#[derive(Debug, Default)]
pub struct Subscriptions {
    by_origin: HashMap<AgentAddress, BTreeSet<AgentAddress>>,
    any_origin: BTreeSet<AgentAddress>,
}

impl Subscriptions {
    /// Returns false if `subscriber` already listened to `origin`.
    pub fn subscribe(&mut self, origin: AgentAddress, subscriber: AgentAddress) -> bool {
        self.by_origin.entry(origin).or_default().insert(subscriber)
    }

    /// Listen to every origin.
    pub fn subscribe_all(&mut self, subscriber: AgentAddress) -> bool {
        self.any_origin.insert(subscriber)
    }

    pub fn unsubscribe(&mut self, origin: &AgentAddress, subscriber: &AgentAddress) -> bool {
        let Some(subscribers) = self.by_origin.get_mut(origin) else {
            return false;
        };
        let removed = subscribers.remove(subscriber);
        if subscribers.is_empty() {
            self.by_origin.remove(origin);
        }
        removed
    }

    /// Every subscriber of `origin`, each listed once.
    pub fn matching(&self, origin: &AgentAddress) -> Vec<AgentAddress> {
        let mut matched: BTreeSet<&AgentAddress> = self.any_origin.iter().collect();
        if let Some(subscribers) = self.by_origin.get(origin) {
            matched.extend(subscribers.iter());
        }
        matched.into_iter().cloned().collect()
    }
}

// ── Mailbox transport ────────────────────────────────────────────────────────

struct Queued {
    delivery: Delivery,
    sink: Weak<dyn DeliverySink>,
}

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn start(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

struct Mailbox {
    sender: mpsc::UnboundedSender<Queued>,
    /// Deliveries queued or running in this mailbox.
    pending: Arc<AtomicUsize>,
}

/// In-process transport with one ordered mailbox per subscriber.
///
/// A slow or failing subscriber only delays its own mailbox. Releasing a
/// subscriber removes its mailbox only while that mailbox is empty, so a
/// subscriber never has two workers at once.
#[derive(Default)]
pub struct MailboxTransport {
    mailboxes: Mutex<HashMap<AgentAddress, Mailbox>>,
    in_flight: Arc<InFlight>,
    closed: AtomicBool,
}

impl MailboxTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliveries queued or running right now.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Mailboxes currently open.
    pub fn mailbox_count(&self) -> usize {
        self.lock_mailboxes().len()
    }

    fn lock_mailboxes(&self) -> std::sync::MutexGuard<'_, HashMap<AgentAddress, Mailbox>> {
        self.mailboxes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_mailbox(&self, subscriber: &AgentAddress) -> Mailbox {
        let (tx, mut rx) = mpsc::unbounded_channel::<Queued>();
        let in_flight = Arc::clone(&self.in_flight);
        let pending = Arc::new(AtomicUsize::new(0));
        let worker_pending = Arc::clone(&pending);
        let owner = subscriber.clone();

        tokio::spawn(async move {
            while let Some(Queued { delivery, sink }) = rx.recv().await {
                match sink.upgrade() {
                    // Failures were already logged by the sink.
                    Some(sink) => {
                        let _ = sink.deliver(&delivery).await;
                    }
                    None => trace!(subscriber = %owner, "runtime gone, delivery dropped"),
                }
                worker_pending.fetch_sub(1, Ordering::SeqCst);
                in_flight.finish();
            }
            debug!(subscriber = %owner, "mailbox closed");
        });

        debug!(subscriber = %subscriber, "mailbox opened");
        Mailbox { sender: tx, pending }
    }
}

#[async_trait]
impl BusTransport for MailboxTransport {
    fn enqueue(&self, delivery: Delivery, sink: Weak<dyn DeliverySink>) -> AeonResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AeonError::Bus {
                reason: "transport is closed".to_string(),
            });
        }

        let mut mailboxes = self.lock_mailboxes();
        if !mailboxes
            .get(&delivery.subscriber)
            .is_some_and(|mailbox| !mailbox.sender.is_closed())
        {
            let mailbox = self.open_mailbox(&delivery.subscriber);
            mailboxes.insert(delivery.subscriber.clone(), mailbox);
        }
        let Some(mailbox) = mailboxes.get(&delivery.subscriber) else {
            return Err(AeonError::Bus {
                reason: format!("no mailbox for '{}'", delivery.subscriber),
            });
        };
        // Counted under the lock so `release` never sees an empty mailbox
        // that is about to receive.
        mailbox.pending.fetch_add(1, Ordering::SeqCst);
        let pending = Arc::clone(&mailbox.pending);
        let sender = mailbox.sender.clone();
        drop(mailboxes);

        let subscriber = delivery.subscriber.clone();
        self.in_flight.start();
        if sender.send(Queued { delivery, sink }).is_err() {
            pending.fetch_sub(1, Ordering::SeqCst);
            self.in_flight.finish();
            return Err(AeonError::Bus {
                reason: format!("mailbox of '{subscriber}' is gone"),
            });
        }
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Dropping the senders lets each worker finish its backlog and exit.
        self.lock_mailboxes().clear();
    }

    async fn drain(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    fn release(&self, subscriber: &AgentAddress) {
        let mut mailboxes = self.lock_mailboxes();
        let idle = mailboxes
            .get(subscriber)
            .is_some_and(|mailbox| mailbox.pending.load(Ordering::SeqCst) == 0);
        if idle {
            // The worker sees the closed channel and exits.
            mailboxes.remove(subscriber);
            debug!(subscriber = %subscriber, "idle mailbox released");
        }
    }
}

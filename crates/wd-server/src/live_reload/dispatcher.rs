//! Reload dispatcher.
//!
//! Copies every upstream [`ChangeEvent`] into the outbox of each registered
//! subscriber. The fan-out task is started by the first registration and
//! stops when the upstream stream closes, at which point every remaining
//! outbox is closed and no new subscriber is accepted.
//!
//! ```text
//! Idle ──first register──► Running ──upstream closed──► Draining
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;
use wd_mirror::ChangeEvent;

/// Identity of one connected reload client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Allocate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ws-{}", self.0)
    }
}

/// Sending half of a subscriber's bounded event queue.
///
/// Dropping every sender closes the queue, which is how a subscriber is told
/// to go away.
pub type Outbox = mpsc::Sender<ChangeEvent>;

/// A registered subscriber's receiving side.
#[derive(Debug)]
pub struct Subscription {
    /// Registry key.
    pub id: SubscriberId,
    /// Events for this subscriber; yields `None` once evicted or drained.
    pub outbox: mpsc::Receiver<ChangeEvent>,
}

/// Lifecycle of the fan-out task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DispatcherState {
    /// No subscriber has registered yet.
    Idle = 0,
    /// Fan-out task is delivering events.
    Running = 1,
    /// Upstream closed; terminal.
    Draining = 2,
}

impl DispatcherState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            _ => Self::Draining,
        }
    }
}

/// Dispatch error.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The upstream stream has ended.
    #[error("Reload dispatcher is shutting down")]
    Draining,
}

/// Fans one upstream change stream out to many subscribers.
pub struct ReloadDispatcher {
    state: AtomicU8,
    /// Taken by whichever registration wins the Idle to Running transition.
    /// Only that winner ever locks it, once, so the lock is never contended.
    upstream: Mutex<Option<mpsc::Receiver<ChangeEvent>>>,
    subscribers: DashMap<SubscriberId, Outbox>,
}

impl ReloadDispatcher {
    /// Create a dispatcher for `upstream`. Nothing runs until the first
    /// subscriber registers.
    #[must_use]
    pub fn new(upstream: mpsc::Receiver<ChangeEvent>) -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(DispatcherState::Idle as u8),
            upstream: Mutex::new(Some(upstream)),
            subscribers: DashMap::new(),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DispatcherState {
        DispatcherState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Register `outbox` under `id`.
    ///
    /// Registering an id that is already present keeps the existing outbox.
    /// The first registration starts the fan-out task. Must be called from
    /// within a tokio runtime.
    pub fn register(self: &Arc<Self>, id: SubscriberId, outbox: Outbox) -> Result<(), DispatchError> {
        if self.state() == DispatcherState::Draining {
            return Err(DispatchError::Draining);
        }

        self.subscribers.entry(id).or_insert(outbox);

        // Draining may have started between the check and the insert, and
        // its clear may already be done.
        if self.state() == DispatcherState::Draining {
            self.subscribers.remove(&id);
            return Err(DispatchError::Draining);
        }

        self.start();
        Ok(())
    }

    /// Allocate a fresh subscriber with an outbox of `capacity` events and
    /// register it.
    pub fn subscribe(self: &Arc<Self>, capacity: usize) -> Result<Subscription, DispatchError> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = SubscriberId::new();
        self.register(id, tx)?;
        Ok(Subscription { id, outbox: rx })
    }

    /// Remove `id` from the registry. No-op if it is not registered.
    pub fn deregister(&self, id: &SubscriberId) {
        if self.subscribers.remove(id).is_some() {
            tracing::debug!(subscriber = %id, "Subscriber deregistered");
        }
    }

    /// Start the fan-out task if this is the first registration.
    fn start(self: &Arc<Self>) {
        if self
            .state
            .compare_exchange(
                DispatcherState::Idle as u8,
                DispatcherState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return;
        }

        let upstream = match self.upstream.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(upstream) = upstream {
            tokio::spawn(Arc::clone(self).fan_out(upstream));
        }
    }

    async fn fan_out(self: Arc<Self>, mut upstream: mpsc::Receiver<ChangeEvent>) {
        tracing::debug!("Reload dispatcher started");

        while let Some(event) = upstream.recv().await {
            self.deliver(&event);
        }

        self.state
            .store(DispatcherState::Draining as u8, Ordering::SeqCst);
        let remaining = self.subscribers.len();
        self.subscribers.clear();
        tracing::debug!(subscribers = remaining, "Change stream closed, subscribers released");
    }

    /// Deliver one event to every subscriber without waiting on any of them.
    fn deliver(&self, event: &ChangeEvent) {
        let snapshot: Vec<(SubscriberId, Outbox)> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        tracing::debug!(path = %event, subscribers = snapshot.len(), "Dispatching change");

        for (id, outbox) in snapshot {
            match outbox.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(subscriber = %id, "Subscriber is not keeping up, disconnecting");
                    self.evict(id, &outbox);
                }
                Err(TrySendError::Closed(_)) => {
                    self.evict(id, &outbox);
                }
            }
        }
    }

    /// Remove `id` if it still maps to `outbox`.
    fn evict(&self, id: SubscriberId, outbox: &Outbox) {
        self.subscribers
            .remove_if(&id, |_, registered| registered.same_channel(outbox));
    }
}

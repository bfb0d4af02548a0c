//! Refresh signals between coordinators.
//!
//! Every coordinator subscribes to a shared [`SyncBus`] and gets a
//! [`SyncEndpoint`]. After persisting a mutation it publishes a
//! [`SyncSignal`]; the others drain their endpoint and reload everything from
//! the store. Signals carry no state, only which keys changed, so the store
//! stays the single source of truth (last writer wins).

use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use ulid::Ulid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(Ulid);

impl InstanceId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalKind {
    /// Stored state changed; reload.
    Refresh,
    /// An item moved between columns. Receivers reload and may notify.
    PhaseChanged {
        item_id: String,
        from: String,
        to: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSignal {
    pub origin: InstanceId,
    pub kind: SignalKind,
    pub keys: Vec<String>,
}

#[derive(Clone, Default)]
pub struct SyncBus {
    subscribers: Arc<Mutex<Vec<(InstanceId, Sender<SyncSignal>)>>>,
}

impl SyncBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> SyncEndpoint {
        let id = InstanceId::new();
        let (sender, receiver) = mpsc::channel();
        self.lock().push((id, sender));
        tracing::debug!(instance = %id, "Subscribed to sync bus");
        SyncEndpoint {
            id,
            bus: self.clone(),
            receiver,
        }
    }

    /// Delivers `signal` to every subscriber except its origin. Subscribers
    /// whose endpoint was dropped are removed. Returns how many received it.
    pub fn broadcast(&self, signal: SyncSignal) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|(id, sender)| *id == signal.origin || sender.send(signal.clone()).is_ok());
        subscribers.iter().filter(|(id, _)| *id != signal.origin).count()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(InstanceId, Sender<SyncSignal>)>> {
        self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct SyncEndpoint {
    id: InstanceId,
    bus: SyncBus,
    receiver: Receiver<SyncSignal>,
}

impl SyncEndpoint {
    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn publish(&self, kind: SignalKind, keys: &[&str]) -> usize {
        let signal = SyncSignal {
            origin: self.id,
            kind,
            keys: keys.iter().map(|key| key.to_string()).collect(),
        };
        let delivered = self.bus.broadcast(signal);
        tracing::debug!(instance = %self.id, delivered, "Published sync signal");
        delivered
    }

    /// Pending signals from other instances. Own signals are dropped.
    pub fn drain(&self) -> Vec<SyncSignal> {
        self.receiver
            .try_iter()
            .filter(|signal| signal.origin != self.id)
            .collect()
    }
}

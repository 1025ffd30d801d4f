//! Broadcast locks: named, diagram-scoped waitable signals behind the
//! "wait until broadcast received" semantics of hat blocks.

use crate::diagram::Block;
use crate::value::Value;
use ahash::AHashMap;
use itertools::Itertools;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Subscriber {
    block: Arc<Block>,
    tx: mpsc::UnboundedSender<Value>,
}

/// The receiving half of one subscription. Dropping it unsubscribes; the
/// closed sender is pruned on the next signal.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Value>,
}

impl Subscription {
    /// Waits for the next signal. Resolves to `None` once the lock is
    /// released or the given token is cancelled.
    pub async fn recv(&mut self, cancel: &CancellationToken) -> Option<Value> {
        tokio::select! {
            _ = cancel.cancelled() => None,
            value = self.rx.recv() => value,
        }
    }
}

/// One named signal. Idle until a subscriber arms it; each `signal` call
/// delivers to every current subscriber exactly once, in subscription order.
pub struct BroadcastLock {
    name: String,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl BroadcastLock {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers `block` as a waiter. Signal payloads are written into the
    /// block's local value map before its subscription wakes.
    pub fn subscribe(&self, block: Arc<Block>) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .expect("lock subscribers poisoned")
            .push(Subscriber { block, tx });
        Subscription { rx }
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock().expect("lock subscribers poisoned");
        subscribers.retain(|sub| !sub.tx.is_closed());
        subscribers.len()
    }

    /// Delivers `payload` to every current subscriber. A list payload of
    /// even length greater than one is interpreted as alternating key/value
    /// pairs and written into each awaiting block's value map, supporting
    /// blocks that expect several named outputs from one event. The whole
    /// payload is always stored under `"value"`.
    pub fn signal(&self, payload: &Value) {
        let mut subscribers = self.subscribers.lock().expect("lock subscribers poisoned");
        subscribers.retain(|sub| !sub.tx.is_closed());
        for sub in subscribers.iter() {
            if let Value::List(items) = payload {
                if items.len() > 1 && items.len() % 2 == 0 {
                    for (key, value) in items.iter().tuples() {
                        sub.block.set_value(&key.string_value(), value.clone());
                    }
                }
            }
            sub.block.set_value("value", payload.clone());
            let _ = sub.tx.send(payload.clone());
        }
    }

    fn clear(&self) {
        self.subscribers
            .lock()
            .expect("lock subscribers poisoned")
            .clear();
    }
}

/// Per-diagram registry of broadcast locks. Safe for concurrent
/// subscribe/signal/release from different tasks.
pub struct LockManager {
    tab_id: String,
    locks: Mutex<AHashMap<String, Arc<BroadcastLock>>>,
    released: AtomicBool,
}

impl LockManager {
    pub(crate) fn new(tab_id: &str) -> Self {
        Self {
            tab_id: tab_id.to_string(),
            locks: Mutex::new(AHashMap::new()),
            released: AtomicBool::new(false),
        }
    }

    /// Idempotent lock lookup; first reference creates the lock.
    pub fn get_or_create(&self, name: &str) -> Arc<BroadcastLock> {
        self.locks
            .lock()
            .expect("lock registry poisoned")
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(BroadcastLock::new(name)))
            .clone()
    }

    /// Signals the named lock. A name with no lock, a lock with no
    /// subscribers, or a released manager are all no-ops.
    pub fn signal(&self, name: &str, payload: Value) {
        if self.released.load(Ordering::Acquire) {
            return;
        }
        let lock = self
            .locks
            .lock()
            .expect("lock registry poisoned")
            .get(name)
            .cloned();
        if let Some(lock) = lock {
            tracing::debug!(tab = %self.tab_id, lock = %name, "signaling broadcast lock");
            lock.signal(&payload);
        }
    }

    /// Unregisters every subscriber; their pending `recv` calls resolve to
    /// `None`. Idempotent, and no signal is delivered afterward.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        let locks: AHashMap<String, Arc<BroadcastLock>> =
            std::mem::take(&mut *self.locks.lock().expect("lock registry poisoned"));
        for lock in locks.values() {
            lock.clear();
        }
        tracing::debug!(tab = %self.tab_id, "lock manager released");
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

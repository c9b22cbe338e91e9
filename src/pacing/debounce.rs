//! Trailing-edge debounce.
//!
//! Each call (re)arms a timer; the callback runs once the timer survives
//! `wait` without another call for the same key. Only the last arguments are
//! delivered. A superseded timer is aborted, never executed.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::util::lock::mutex_lock;

const SOURCE: &str = "pacing::debounce";

type KeyedCallback<K, A> = Arc<dyn Fn(K, A) -> BoxFuture<'static, ()> + Send + Sync>;

struct Slot<A> {
    generation: u64,
    pending: A,
    timer: JoinHandle<()>,
}

struct Slots<K, A> {
    next_generation: u64,
    by_key: HashMap<K, Slot<A>>,
}

/// Debounce with an independent timer per key.
///
/// Bursts on one key never cancel the pending call of another key.
pub struct KeyedDebounce<K, A> {
    wait: Duration,
    callback: KeyedCallback<K, A>,
    slots: Arc<Mutex<Slots<K, A>>>,
}

impl<K, A> KeyedDebounce<K, A>
where
    K: Eq + Hash + Clone + Send + 'static,
    A: Send + 'static,
{
    pub fn new<F, Fut>(wait: Duration, callback: F) -> Self
    where
        F: Fn(K, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            wait,
            callback: Arc::new(move |key, args| Box::pin(callback(key, args))),
            slots: Arc::new(Mutex::new(Slots {
                next_generation: 0,
                by_key: HashMap::new(),
            })),
        }
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Replace the pending arguments for `key` and restart its timer.
    pub fn call(&self, key: K, args: A) {
        self.call_with(key, |_| args);
    }

    /// Restart the timer for `key`, computing the new pending arguments from
    /// the ones still waiting (if any).
    pub fn call_with(&self, key: K, merge: impl FnOnce(Option<A>) -> A) {
        let mut slots = mutex_lock(&self.slots, SOURCE, "call_with");
        slots.next_generation += 1;
        let generation = slots.next_generation;

        let previous = slots.by_key.remove(&key).map(|slot| {
            slot.timer.abort();
            slot.pending
        });
        let superseded = previous.is_some();
        let pending = merge(previous);

        // Spawned while holding the lock so the timer cannot observe the map
        // before its own slot is in place.
        let timer = self.spawn_timer(key.clone(), generation);
        slots.by_key.insert(
            key,
            Slot {
                generation,
                pending,
                timer,
            },
        );

        trace!(generation, superseded, "Debounce timer armed");
    }

    /// Run the pending call for `key` immediately. Returns false when nothing
    /// was pending.
    pub async fn flush(&self, key: &K) -> bool {
        let slot = mutex_lock(&self.slots, SOURCE, "flush").by_key.remove(key);
        match slot {
            Some(slot) => {
                slot.timer.abort();
                (self.callback)(key.clone(), slot.pending).await;
                true
            }
            None => false,
        }
    }

    /// Run every pending call immediately, in no particular order.
    pub async fn flush_all(&self) -> usize {
        let drained: Vec<(K, Slot<A>)> = mutex_lock(&self.slots, SOURCE, "flush_all")
            .by_key
            .drain()
            .collect();

        let count = drained.len();
        for (key, slot) in drained {
            slot.timer.abort();
            (self.callback)(key, slot.pending).await;
        }
        count
    }

    /// Drop the pending call for `key` without running it.
    pub fn cancel(&self, key: &K) -> bool {
        match mutex_lock(&self.slots, SOURCE, "cancel").by_key.remove(key) {
            Some(slot) => {
                slot.timer.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let mut slots = mutex_lock(&self.slots, SOURCE, "cancel_all");
        for (_, slot) in slots.by_key.drain() {
            slot.timer.abort();
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        mutex_lock(&self.slots, SOURCE, "is_pending")
            .by_key
            .contains_key(key)
    }

    pub fn pending_len(&self) -> usize {
        mutex_lock(&self.slots, SOURCE, "pending_len").by_key.len()
    }

    fn spawn_timer(&self, key: K, generation: u64) -> JoinHandle<()> {
        let slots = Arc::clone(&self.slots);
        let callback = Arc::clone(&self.callback);
        let wait = self.wait;

        tokio::spawn(async move {
            tokio::time::sleep(wait).await;

            let due = {
                let mut slots = mutex_lock(&slots, SOURCE, "fire");
                let current = slots
                    .by_key
                    .get(&key)
                    .is_some_and(|slot| slot.generation == generation);
                if current {
                    slots.by_key.remove(&key).map(|slot| slot.pending)
                } else {
                    None
                }
            };

            if let Some(args) = due {
                callback(key, args).await;
            }
        })
    }
}

/// Single-slot debounce: the classic `debounce(f, wait)`.
pub struct Debounce<A> {
    inner: KeyedDebounce<(), A>,
}

impl<A: Send + 'static> Debounce<A> {
    pub fn new<F, Fut>(wait: Duration, callback: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            inner: KeyedDebounce::new(wait, move |(), args| callback(args)),
        }
    }

    pub fn call(&self, args: A) {
        self.inner.call((), args);
    }

    pub async fn flush(&self) -> bool {
        self.inner.flush(&()).await
    }

    pub fn cancel(&self) -> bool {
        self.inner.cancel(&())
    }

    pub fn is_pending(&self) -> bool {
        self.inner.is_pending(&())
    }
}

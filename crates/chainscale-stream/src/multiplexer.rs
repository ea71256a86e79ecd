//! `Multiplexer` — ref-counted sharing of upstream subscriptions.
//!
//! Each key (an RPC method plus its encoded parameters) maps to at most one
//! live upstream. The first subscriber runs the factory; later subscribers
//! join the running entry and get the latest value replayed. When the last
//! subscriber leaves, teardown is delayed so that a quick resubscribe reuses
//! the upstream instead of paying for a new one.

use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::MultiplexerConfig;
use crate::error::{StreamError, SubscriptionCallbackError};

pub const DEFAULT_TEARDOWN_DELAY: Duration = Duration::from_millis(1_750);

/// What a subscriber callback receives.
pub type Update<T> = Result<T, StreamError>;

/// A running upstream: its update stream and the future that cancels it.
pub struct Upstream<T> {
    pub updates: BoxStream<'static, Update<T>>,
    pub teardown: BoxFuture<'static, Result<(), StreamError>>,
}

impl<T> Upstream<T> {
    pub fn new(
        updates: BoxStream<'static, Update<T>>,
        teardown: BoxFuture<'static, Result<(), StreamError>>,
    ) -> Self {
        Self { updates, teardown }
    }
}

/// Starts an upstream. Called at most once per live entry.
pub type Factory<T> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Upstream<T>, StreamError>> + Send + Sync>;

/// Wrap an async closure as a [`Factory`].
pub fn factory<T, F, Fut>(f: F) -> Factory<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Upstream<T>, StreamError>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Counters for the multiplexer's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiplexerStats {
    pub upstream_starts: u64,
    pub upstream_failures: u64,
    pub teardowns: u64,
    pub cancelled_teardowns: u64,
    pub shared_joins: u64,
    pub callback_failures: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Starting,
    Live,
}

struct Entry<T> {
    id: u64,
    phase: Phase,
    latest: Option<Update<T>>,
    listeners: HashMap<u64, mpsc::UnboundedSender<Update<T>>>,
    teardown: Option<BoxFuture<'static, Result<(), StreamError>>>,
    task: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
}

impl<T: Clone> Entry<T> {
    fn broadcast(&self, update: &Update<T>) {
        for tx in self.listeners.values() {
            let _ = tx.send(update.clone());
        }
    }

    /// Stop the entry's tasks once it has left the map.
    ///
    /// A starting upstream is detached rather than aborted: it finishes the
    /// factory, finds itself evicted and runs the upstream teardown.
    fn stop_tasks(&mut self) {
        if let Some(task) = self.task.take() {
            if self.phase == Phase::Live {
                task.abort();
            }
        }
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct State<T> {
    entries: HashMap<String, Entry<T>>,
    next_id: u64,
    stats: MultiplexerStats,
}

impl<T> State<T> {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

struct Inner<T> {
    delay: Duration,
    state: Mutex<State<T>>,
}

/// Shares upstream subscriptions between identical subscribers.
///
/// Cloning is cheap; clones share entries. Must be used from within a Tokio
/// runtime since subscribing spawns the upstream and delivery tasks.
pub struct Multiplexer<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Multiplexer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Multiplexer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_TEARDOWN_DELAY)
    }
}

impl<T: Clone + Send + 'static> Multiplexer<T> {
    pub fn new(teardown_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                delay: teardown_delay,
                state: Mutex::new(State {
                    entries: HashMap::new(),
                    next_id: 0,
                    stats: MultiplexerStats::default(),
                }),
            }),
        }
    }

    pub fn from_config(config: &MultiplexerConfig) -> Self {
        Self::new(config.teardown_delay())
    }

    pub fn teardown_delay(&self) -> Duration {
        self.inner.delay
    }

    /// A handle that subscribes to `key`, starting `factory` when no entry
    /// is live.
    pub fn memoize(&self, key: impl Into<String>, factory: Factory<T>) -> Shared<T> {
        Shared {
            mux: self.clone(),
            key: key.into(),
            factory,
        }
    }

    /// Shorthand for `memoize(key, factory).subscribe(callback)`.
    pub fn subscribe<F>(&self, key: impl Into<String>, factory: Factory<T>, callback: F) -> Subscription
    where
        F: FnMut(Update<T>) + Send + 'static,
    {
        self.attach(key.into(), &factory, callback)
    }

    fn attach<F>(&self, key: String, factory: &Factory<T>, callback: F) -> Subscription
    where
        F: FnMut(Update<T>) + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut guard = self.inner.state.lock().unwrap();
        let state = &mut *guard;
        let listener_id = state.next_id();

        let entry_id = match state.entries.get_mut(&key) {
            Some(entry) => {
                if let Some(timer) = entry.timer.take() {
                    timer.abort();
                    state.stats.cancelled_teardowns += 1;
                    debug!(%key, "pending teardown cancelled by new subscriber");
                }
                if let Some(latest) = &entry.latest {
                    let _ = tx.send(latest.clone());
                }
                entry.listeners.insert(listener_id, tx);
                state.stats.shared_joins += 1;
                trace!(%key, listeners = entry.listeners.len(), "joined shared upstream");
                entry.id
            }
            None => {
                let id = state.next_id();
                let task = tokio::spawn(run_upstream(
                    Arc::downgrade(&self.inner),
                    key.clone(),
                    id,
                    Arc::clone(factory),
                ));
                let mut listeners = HashMap::new();
                listeners.insert(listener_id, tx);
                state.entries.insert(
                    key.clone(),
                    Entry {
                        id,
                        phase: Phase::Starting,
                        latest: None,
                        listeners,
                        teardown: None,
                        task: Some(task),
                        timer: None,
                    },
                );
                state.stats.upstream_starts += 1;
                debug!(%key, "starting upstream");
                id
            }
        };
        drop(guard);

        let delivery = tokio::spawn(deliver(
            Arc::downgrade(&self.inner),
            key.clone(),
            rx,
            callback,
        ));
        let weak = Arc::downgrade(&self.inner);
        let release_key = key.clone();
        Subscription {
            key,
            release: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    release(&inner, &release_key, entry_id, listener_id);
                }
            })),
            delivery: Some(delivery),
        }
    }

    /// Number of subscribers currently attached to `key`.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.inner
            .state
            .lock()
            .unwrap()
            .entries
            .get(key)
            .map_or(0, |e| e.listeners.len())
    }

    /// Whether an entry (starting, live, or awaiting teardown) exists for `key`.
    pub fn is_active(&self, key: &str) -> bool {
        self.inner.state.lock().unwrap().entries.contains_key(key)
    }

    /// Whether the upstream for `key` has started successfully.
    pub fn is_live(&self, key: &str) -> bool {
        self.inner
            .state
            .lock()
            .unwrap()
            .entries
            .get(key)
            .is_some_and(|e| e.phase == Phase::Live)
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> MultiplexerStats {
        self.inner.state.lock().unwrap().stats.clone()
    }

    /// Tear down every entry now, without waiting for the grace period.
    /// Subscribers receive [`StreamError::Closed`].
    pub async fn shutdown(&self) {
        let entries: Vec<(String, Entry<T>)> = {
            let mut state = self.inner.state.lock().unwrap();
            let drained: Vec<_> = state.entries.drain().collect();
            state.stats.teardowns += drained.len() as u64;
            drained
        };
        debug!(entries = entries.len(), "multiplexer shutting down");
        for (key, mut entry) in entries {
            entry.stop_tasks();
            entry.broadcast(&Err(StreamError::Closed));
            if let Some(teardown) = entry.teardown.take() {
                if let Err(err) = teardown.await {
                    warn!(%key, error = %err, "upstream teardown failed");
                }
            }
        }
    }
}

/// A memoized subscription source for one key.
pub struct Shared<T> {
    mux: Multiplexer<T>,
    key: String,
    factory: Factory<T>,
}

impl<T: Clone + Send + 'static> Shared<T> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(Update<T>) + Send + 'static,
    {
        self.mux.attach(self.key.clone(), &self.factory, callback)
    }
}

/// A live subscriber. Dropping it stops delivery and releases its share of
/// the upstream.
pub struct Subscription {
    key: String,
    release: Option<Box<dyn FnOnce() + Send>>,
    delivery: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(delivery) = self.delivery.take() {
            delivery.abort();
        }
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("key", &self.key).finish()
    }
}

async fn run_upstream<T: Clone + Send + 'static>(
    inner: Weak<Inner<T>>,
    key: String,
    entry_id: u64,
    factory: Factory<T>,
) {
    let result = factory().await;

    let mut updates = {
        let Some(strong) = inner.upgrade() else {
            if let Ok(upstream) = result {
                spawn_teardown(key, upstream.teardown);
            }
            return;
        };
        let mut guard = strong.state.lock().unwrap();
        let state = &mut *guard;
        let current = matches!(state.entries.get(&key), Some(e) if e.id == entry_id);
        match result {
            Ok(upstream) if current => {
                if let Some(entry) = state.entries.get_mut(&key) {
                    entry.phase = Phase::Live;
                    entry.teardown = Some(upstream.teardown);
                }
                debug!(%key, "upstream live");
                upstream.updates
            }
            Ok(upstream) => {
                spawn_teardown(key, upstream.teardown);
                return;
            }
            Err(err) => {
                warn!(%key, error = %err, "upstream failed to start");
                state.stats.upstream_failures += 1;
                if current {
                    if let Some(mut entry) = state.entries.remove(&key) {
                        entry.broadcast(&Err(err));
                        if let Some(timer) = entry.timer.take() {
                            timer.abort();
                        }
                    }
                }
                return;
            }
        }
    };

    while let Some(update) = updates.next().await {
        let Some(strong) = inner.upgrade() else {
            return;
        };
        let mut state = strong.state.lock().unwrap();
        let Some(entry) = state.entries.get_mut(&key).filter(|e| e.id == entry_id) else {
            return;
        };
        trace!(%key, listeners = entry.listeners.len(), "upstream update");
        entry.broadcast(&update);
        entry.latest = Some(update);
    }

    if let Some(strong) = inner.upgrade() {
        let mut state = strong.state.lock().unwrap();
        if matches!(state.entries.get(&key), Some(e) if e.id == entry_id) {
            if let Some(mut entry) = state.entries.remove(&key) {
                entry.broadcast(&Err(StreamError::Closed));
                if let Some(timer) = entry.timer.take() {
                    timer.abort();
                }
            }
            debug!(%key, "upstream ended, entry evicted");
        }
    }
}

async fn deliver<T, F>(
    inner: Weak<Inner<T>>,
    key: String,
    mut rx: mpsc::UnboundedReceiver<Update<T>>,
    mut callback: F,
) where
    F: FnMut(Update<T>) + Send + 'static,
{
    while let Some(update) = rx.recv().await {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(update))) {
            let err = SubscriptionCallbackError::from_panic(&key, payload);
            warn!(%key, error = %err, "subscription callback panicked");
            if let Some(inner) = inner.upgrade() {
                inner.state.lock().unwrap().stats.callback_failures += 1;
            }
        }
    }
}

fn release<T: Clone + Send + 'static>(inner: &Arc<Inner<T>>, key: &str, entry_id: u64, listener_id: u64) {
    let mut state = inner.state.lock().unwrap();
    let Some(entry) = state.entries.get_mut(key).filter(|e| e.id == entry_id) else {
        return;
    };
    entry.listeners.remove(&listener_id);
    if !entry.listeners.is_empty() || entry.timer.is_some() {
        return;
    }

    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        // No runtime to run the grace timer on; tear down in place.
        if let Some(mut entry) = state.entries.remove(key) {
            entry.stop_tasks();
            state.stats.teardowns += 1;
            if entry.teardown.is_some() {
                warn!(key, "released outside a runtime; upstream teardown skipped");
            }
        }
        return;
    };

    debug!(key, delay_ms = inner.delay.as_millis() as u64, "last subscriber left, teardown scheduled");
    let weak = Arc::downgrade(inner);
    let delay = inner.delay;
    let owned_key = key.to_string();
    entry.timer = Some(handle.spawn(async move {
        tokio::time::sleep(delay).await;
        if let Some(inner) = weak.upgrade() {
            expire(inner, owned_key, entry_id).await;
        }
    }));
}

async fn expire<T: Clone + Send + 'static>(inner: Arc<Inner<T>>, key: String, entry_id: u64) {
    let teardown = {
        let mut state = inner.state.lock().unwrap();
        let idle = matches!(
            state.entries.get(&key),
            Some(e) if e.id == entry_id && e.listeners.is_empty()
        );
        if !idle {
            return;
        }
        let Some(mut entry) = state.entries.remove(&key) else {
            return;
        };
        state.stats.teardowns += 1;
        // The running timer is this task; dropping its handle detaches it.
        entry.timer.take();
        entry.stop_tasks();
        entry.teardown.take()
    };
    debug!(%key, "grace period elapsed, upstream torn down");
    if let Some(teardown) = teardown {
        if let Err(err) = teardown.await {
            warn!(%key, error = %err, "upstream teardown failed");
        }
    }
}

fn spawn_teardown(key: String, teardown: BoxFuture<'static, Result<(), StreamError>>) {
    tokio::spawn(async move {
        if let Err(err) = teardown.await {
            warn!(%key, error = %err, "upstream teardown failed");
        }
    });
}

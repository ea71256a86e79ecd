//! `Combinator` — joins N subscriptions into one aggregated callback.
//!
//! The aggregated callback first fires once every source has produced a
//! value, then again on every subsequent update from any source, always with
//! the latest value of each source in source order.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::{StreamError, SubscriptionCallbackError};
use crate::multiplexer::Subscription;

/// A child subscription the combinator can cancel.
pub trait Cancel: Send {
    fn cancel(self: Box<Self>) -> Result<(), StreamError>;
}

impl Cancel for Subscription {
    fn cancel(self: Box<Self>) -> Result<(), StreamError> {
        drop(self);
        Ok(())
    }
}

/// Adapts a closure into a [`Cancel`].
pub struct CancelFn<F>(pub F);

impl<F> Cancel for CancelFn<F>
where
    F: FnOnce() -> Result<(), StreamError> + Send,
{
    fn cancel(self: Box<Self>) -> Result<(), StreamError> {
        (self.0)()
    }
}

struct CombineState<T> {
    /// Sources that have not produced a value yet.
    pending: usize,
    latest: Vec<Option<T>>,
    active: bool,
}

type Aggregated<T> = Box<dyn FnMut(Vec<T>) + Send>;

pub struct Combinator<T> {
    key: String,
    state: Arc<Mutex<CombineState<T>>>,
    callback: Arc<Mutex<Aggregated<T>>>,
    failures: Arc<AtomicU64>,
    children: Mutex<Vec<Box<dyn Cancel>>>,
}

impl<T: Clone + Send + 'static> Combinator<T> {
    pub fn new<F>(key: impl Into<String>, sources: usize, callback: F) -> Self
    where
        F: FnMut(Vec<T>) + Send + 'static,
    {
        Self {
            key: key.into(),
            state: Arc::new(Mutex::new(CombineState {
                pending: sources,
                latest: vec![None; sources],
                active: true,
            })),
            callback: Arc::new(Mutex::new(Box::new(callback))),
            failures: Arc::new(AtomicU64::new(0)),
            children: Mutex::new(Vec::new()),
        }
    }

    /// The setter for source `index`. Out-of-range indices are ignored.
    pub fn updater(&self, index: usize) -> impl FnMut(T) + Send + 'static {
        let key = self.key.clone();
        let state = Arc::clone(&self.state);
        let callback = Arc::clone(&self.callback);
        let failures = Arc::clone(&self.failures);
        move |value| {
            // Held across snapshot and delivery so snapshots arrive in order.
            let mut guard = callback.lock().unwrap();
            let snapshot = {
                let mut state = state.lock().unwrap();
                if !state.active || index >= state.latest.len() {
                    return;
                }
                if state.latest[index].replace(value).is_none() {
                    state.pending -= 1;
                }
                if state.pending > 0 {
                    return;
                }
                state.latest.iter().flatten().cloned().collect::<Vec<T>>()
            };

            let aggregated: &mut (dyn FnMut(Vec<T>) + Send) = &mut **guard;
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| aggregated(snapshot))) {
                let err = SubscriptionCallbackError::from_panic(&key, payload);
                warn!(key = %key, error = %err, "combined callback panicked");
                failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Hand a child subscription to the combinator; it is cancelled with
    /// [`Combinator::cancel`].
    pub fn attach(&self, child: impl Cancel + 'static) {
        self.children.lock().unwrap().push(Box::new(child));
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether every source has produced at least one value.
    pub fn is_ready(&self) -> bool {
        self.state.lock().unwrap().pending == 0
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().unwrap().active
    }

    /// Number of aggregated-callback panics caught so far.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Stop delivering and cancel every child. A failing child does not stop
    /// the others; all failures are returned.
    pub fn cancel(&self) -> Vec<StreamError> {
        self.state.lock().unwrap().active = false;
        let children: Vec<_> = self.children.lock().unwrap().drain(..).collect();
        let total = children.len();
        let errors: Vec<StreamError> = children
            .into_iter()
            .filter_map(|child| child.cancel().err())
            .collect();
        for err in &errors {
            warn!(key = %self.key, error = %err, "child cancel failed");
        }
        debug!(key = %self.key, children = total, failed = errors.len(), "combinator cancelled");
        errors
    }
}

impl<T> Drop for Combinator<T> {
    fn drop(&mut self) {
        if let Ok(children) = self.children.get_mut() {
            for child in children.drain(..) {
                let _ = child.cancel();
            }
        }
    }
}

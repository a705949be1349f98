//! Coalescing of rapid value-change intents into one delayed command
//!
//! One `Debouncer` guards one logical control (volume slider, seek bar).
//! Every intent updates local state synchronously elsewhere; only the
//! network send goes through here. A newer intent re-arms the timer from its
//! own arrival time, so a burst produces exactly one command carrying the
//! final value.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

pub struct Debouncer {
    delay: Duration,
    generation: Arc<AtomicU64>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Schedule `action` to run after the quiet period. Any earlier pending
    /// action for this control is superseded and never runs.
    pub fn call<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let armed = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = self.generation.clone();
        // The quiet period runs from the intent's arrival, not from whenever
        // the spawned task first gets polled.
        let deadline = Instant::now() + self.delay;
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if generation.load(Ordering::SeqCst) == armed {
                action().await;
            } else {
                tracing::trace!(generation = armed, "debounced action superseded");
            }
        });
    }

    /// Disarm the pending action, if any, without running it.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

//! Leading-edge throttle.
//!
//! The first call runs immediately; calls arriving less than `interval` after
//! the last execution started are dropped. There is no trailing call.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::Instant;
use tracing::trace;

use crate::util::lock::mutex_lock;

const SOURCE: &str = "pacing::throttle";

type Callback<A, R> = Arc<dyn Fn(A) -> BoxFuture<'static, R> + Send + Sync>;

pub struct Throttle<A, R> {
    interval: Duration,
    last_run: Mutex<Option<Instant>>,
    callback: Callback<A, R>,
}

impl<A, R> Throttle<A, R>
where
    A: Send + 'static,
    R: Send + 'static,
{
    pub fn new<F, Fut>(interval: Duration, callback: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        Self {
            interval,
            last_run: Mutex::new(None),
            callback: Arc::new(move |args| Box::pin(callback(args))),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run the callback unless the window is still closed.
    ///
    /// Returns `None` when the call was dropped. Whatever the callback
    /// returns, errors included, is handed back untouched.
    pub async fn call(&self, args: A) -> Option<R> {
        if !self.try_acquire() {
            trace!(interval_ms = self.interval.as_millis() as u64, "Throttled call dropped");
            return None;
        }
        Some((self.callback)(args).await)
    }

    fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut last_run = mutex_lock(&self.last_run, SOURCE, "try_acquire");
        match *last_run {
            Some(previous) if now.duration_since(previous) < self.interval => false,
            _ => {
                *last_run = Some(now);
                true
            }
        }
    }
}

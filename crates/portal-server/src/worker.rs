//! Background execution unit shared by every listener and sender.
//!
//! A [`Worker`] is one dedicated OS thread plus the cancellation token that
//! asks it to exit. WebSocket workers run a private current-thread tokio
//! runtime inside that thread, so callers never see which concurrency
//! primitive a transport uses.

use std::future::Future;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, ServerError};

pub struct Worker {
    name: String,
    handle: Option<JoinHandle<()>>,
    token: CancellationToken,
}

impl Worker {
    /// Run `f` on a new named thread with a fresh cancellation token.
    pub fn spawn<F>(name: &str, f: F) -> Result<Self>
    where
        F: FnOnce(CancellationToken) + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || f(child))
            .map_err(ServerError::Spawn)?;
        debug!(worker = name, "worker spawned");
        Ok(Self {
            name: name.to_string(),
            handle: Some(handle),
            token,
        })
    }

    /// Run the future returned by `f` to completion on a private
    /// current-thread runtime owned by the worker thread.
    pub fn spawn_async<F, Fut>(name: &str, f: F) -> Result<Self>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()>,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ServerError::Runtime)?;
        Self::spawn(name, move |token| runtime.block_on(f(token)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the thread is still executing.
    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Wait for the thread to exit.
    ///
    /// Returns `Err(WorkerPanicked)` if it panicked. Joining twice is a no-op.
    pub fn join(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| {
                warn!(worker = %self.name, "worker panicked");
                ServerError::WorkerPanicked(self.name.clone())
            }),
            None => Ok(()),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.cancel();
        let _ = self.join();
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("alive", &self.is_alive())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Exponential retry delay, doubling from `initial` up to `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            next: initial.min(max),
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.initial.min(self.max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn cancel_stops_thread_loop() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let mut worker = Worker::spawn("test-loop", move |token| {
            while !token.is_cancelled() {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(1));
            }
        })
        .unwrap();

        assert!(worker.is_alive());
        assert_eq!(worker.name(), "test-loop");
        worker.cancel();
        worker.join().unwrap();
        assert!(!worker.is_alive());
        assert!(worker.is_cancelled());
        assert!(ticks.load(Ordering::SeqCst) > 0);
        worker.join().unwrap();
    }

    #[test]
    fn async_worker_observes_cancellation() {
        let mut worker = Worker::spawn_async("test-async", |token| async move {
            token.cancelled().await;
        })
        .unwrap();

        std::thread::sleep(Duration::from_millis(10));
        assert!(worker.is_alive());
        worker.cancel();
        worker.join().unwrap();
        assert!(!worker.is_alive());
    }

    #[test]
    fn panic_is_reported_on_join() {
        let mut worker = Worker::spawn("test-panic", |_| panic!("boom")).unwrap();
        let err = worker.join().unwrap_err();
        assert!(matches!(err, ServerError::WorkerPanicked(name) if name == "test-panic"));
    }

    #[test]
    fn drop_cancels_and_joins() {
        let exited = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&exited);
        let worker = Worker::spawn("test-drop", move |token| {
            while !token.is_cancelled() {
                std::thread::sleep(Duration::from_millis(1));
            }
            flag.store(1, Ordering::SeqCst);
        })
        .unwrap();
        drop(worker);
        assert_eq!(exited.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_doubles_to_cap() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }
}

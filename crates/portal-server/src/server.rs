//! The uniform listener/sender contract and the machinery behind it.

use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use bytes::Bytes;
use portal_frame::{open_text, seal_text, text_checksum, Packet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::connection::{ConnectionId, ConnectionSettings, Direction, TransportKind};
use crate::error::{ErrorClass, Result, ServerError};
use crate::fault::{ErrorSlot, Fault};
use crate::queue::MessageQueue;
use crate::state::{ServerState, StateCell};
use crate::worker::{Backoff, Worker};

const PAUSE_SLICE: Duration = Duration::from_millis(10);

/// Contract shared by all eight listener and sender variants.
///
/// Listeners fill [`Server::queue`] with decoded text; senders drain it.
pub trait Server: Send {
    /// Launch the background worker. A no-op while already running.
    fn start(&mut self) -> Result<()>;

    /// Cancel the worker, wait for it to exit and clear the queue.
    fn stop(&mut self);

    /// Whether the worker thread is alive.
    fn is_running(&self) -> bool;

    /// Whether cancellation has been requested (or the server never started).
    fn is_shutdown(&self) -> bool;

    fn state(&self) -> ServerState;

    fn kind(&self) -> TransportKind;

    fn direction(&self) -> Direction;

    fn id(&self) -> &ConnectionId;

    fn queue(&self) -> &MessageQueue;

    /// Last fault recorded by the worker.
    fn error(&self) -> Option<Fault>;

    fn clear_error(&self);
}

/// State and worker handle common to every variant.
pub(crate) struct ServerCore {
    id: ConnectionId,
    kind: TransportKind,
    direction: Direction,
    settings: ConnectionSettings,
    queue: MessageQueue,
    errors: ErrorSlot,
    state: StateCell,
    worker: Option<Worker>,
}

impl ServerCore {
    pub(crate) fn new(
        id: ConnectionId,
        kind: TransportKind,
        direction: Direction,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            id,
            kind,
            direction,
            settings,
            queue: MessageQueue::new(),
            errors: ErrorSlot::new(),
            state: StateCell::new(),
            worker: None,
        }
    }

    /// Start `run` on a dedicated thread.
    pub(crate) fn start_thread<F>(&mut self, name: &str, run: F) -> Result<()>
    where
        F: FnOnce(WorkerContext) + Send + 'static,
    {
        if !self.prepare_start() {
            return Ok(());
        }
        let seed = self.seed();
        let spawned = Worker::spawn(name, move |token| run(seed.into_context(token)));
        self.finish_start(spawned)
    }

    /// Start the future returned by `run` on a dedicated thread with its own
    /// runtime.
    pub(crate) fn start_async<F, Fut>(&mut self, name: &str, run: F) -> Result<()>
    where
        F: FnOnce(WorkerContext) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()>,
    {
        if !self.prepare_start() {
            return Ok(());
        }
        let seed = self.seed();
        let spawned = Worker::spawn_async(name, move |token| run(seed.into_context(token)));
        self.finish_start(spawned)
    }

    fn prepare_start(&mut self) -> bool {
        if self.is_running() {
            debug!(connection = %self.id, "start ignored, already running");
            return false;
        }
        // A worker that exited on its own (Error state) still needs joining.
        self.reap();
        self.queue.clear();
        self.errors.clear();
        self.state.set(ServerState::Starting);
        true
    }

    fn finish_start(&mut self, spawned: Result<Worker>) -> Result<()> {
        match spawned {
            Ok(worker) => {
                self.worker = Some(worker);
                self.state.set(ServerState::Running);
                info!(
                    connection = %self.id,
                    kind = %self.kind,
                    direction = %self.direction,
                    "server started"
                );
                Ok(())
            }
            Err(err) => {
                self.errors.record(&err);
                self.state.set(ServerState::Error);
                Err(err)
            }
        }
    }

    pub(crate) fn stop(&mut self) {
        let Some(mut worker) = self.worker.take() else {
            self.state.set(ServerState::Stopped);
            self.queue.clear();
            return;
        };
        self.state.set(ServerState::Stopping);
        worker.cancel();
        if let Err(err) = worker.join() {
            self.errors.record(&err);
        }
        // Keep the worker so `is_shutdown` keeps reporting the cancelled token.
        self.worker = Some(worker);
        let dropped = self.queue.clear();
        self.state.set(ServerState::Stopped);
        info!(connection = %self.id, dropped, "server stopped");
    }

    fn reap(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.cancel();
            if let Err(err) = worker.join() {
                self.errors.record(&err);
            }
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(Worker::is_alive)
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.worker.as_ref().map_or(true, Worker::is_cancelled)
    }

    pub(crate) fn state(&self) -> ServerState {
        let state = self.state.get();
        if state == ServerState::Running && !self.is_running() {
            // The thread died without recording a fault (panic).
            return ServerState::Error;
        }
        state
    }

    pub(crate) fn kind(&self) -> TransportKind {
        self.kind
    }

    pub(crate) fn direction(&self) -> Direction {
        self.direction
    }

    pub(crate) fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub(crate) fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    pub(crate) fn errors(&self) -> &ErrorSlot {
        &self.errors
    }

    fn seed(&self) -> ContextSeed {
        ContextSeed {
            id: self.id.clone(),
            kind: self.kind,
            settings: self.settings.clone(),
            queue: self.queue.clone(),
            errors: self.errors.clone(),
            state: self.state.clone(),
        }
    }
}

impl Drop for ServerCore {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

/// Implements the delegating half of [`Server`] for a type with a `core`
/// field. The variant still writes its own `start`.
macro_rules! delegate_server {
    () => {
        fn stop(&mut self) {
            self.core.stop()
        }

        fn is_running(&self) -> bool {
            self.core.is_running()
        }

        fn is_shutdown(&self) -> bool {
            self.core.is_shutdown()
        }

        fn state(&self) -> $crate::state::ServerState {
            self.core.state()
        }

        fn kind(&self) -> $crate::connection::TransportKind {
            self.core.kind()
        }

        fn direction(&self) -> $crate::connection::Direction {
            self.core.direction()
        }

        fn id(&self) -> &$crate::connection::ConnectionId {
            self.core.id()
        }

        fn queue(&self) -> &$crate::queue::MessageQueue {
            self.core.queue()
        }

        fn error(&self) -> Option<$crate::fault::Fault> {
            self.core.errors().get()
        }

        fn clear_error(&self) {
            self.core.errors().clear()
        }
    };
}
pub(crate) use delegate_server;

struct ContextSeed {
    id: ConnectionId,
    kind: TransportKind,
    settings: ConnectionSettings,
    queue: MessageQueue,
    errors: ErrorSlot,
    state: StateCell,
}

impl ContextSeed {
    fn into_context(self, token: CancellationToken) -> WorkerContext {
        WorkerContext {
            id: self.id,
            kind: self.kind,
            settings: self.settings,
            queue: self.queue,
            errors: self.errors,
            state: self.state,
            token,
        }
    }
}

/// Everything a worker loop needs, owned by the worker thread.
pub(crate) struct WorkerContext {
    pub(crate) id: ConnectionId,
    pub(crate) kind: TransportKind,
    pub(crate) settings: ConnectionSettings,
    pub(crate) queue: MessageQueue,
    errors: ErrorSlot,
    state: StateCell,
    pub(crate) token: CancellationToken,
}

impl WorkerContext {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Sleep for `duration` in short slices. Returns `false` if cancelled.
    pub(crate) fn pause(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(PAUSE_SLICE.min(deadline - now));
        }
    }

    pub(crate) fn backoff(&self) -> Backoff {
        Backoff::new(
            self.settings.worker.retry_initial,
            self.settings.worker.retry_max,
        )
    }

    /// Store a fault without stopping the loop.
    pub(crate) fn record(&self, err: &ServerError) {
        let fault = self.errors.record(err);
        warn!(connection = %self.id, kind = %self.kind, class = %fault.class, error = %err, "fault recorded");
    }

    /// Store a fault and move to `Error`. The caller must exit its loop.
    pub(crate) fn fail(&self, err: &ServerError) {
        self.errors.record(err);
        self.state.fail();
        error!(connection = %self.id, kind = %self.kind, error = %err, "worker failed");
    }

    /// Apply the error policy: record framing/format faults, log transient
    /// ones, fail on anything unrecoverable.
    pub(crate) fn handle(&self, err: ServerError) -> ControlFlow<()> {
        match err.class() {
            ErrorClass::Framing | ErrorClass::Format => {
                self.record(&err);
                ControlFlow::Continue(())
            }
            ErrorClass::Transient => {
                warn!(connection = %self.id, kind = %self.kind, error = %err, "transient error, retrying");
                ControlFlow::Continue(())
            }
            ErrorClass::Unrecoverable => {
                self.fail(&err);
                ControlFlow::Break(())
            }
        }
    }

    /// Open a received packet and push its text onto the queue.
    pub(crate) fn deliver(&self, packet: &Packet) -> ControlFlow<()> {
        match self.try_deliver(packet) {
            ControlFlow::Continue(_) => ControlFlow::Continue(()),
            ControlFlow::Break(()) => ControlFlow::Break(()),
        }
    }

    /// Like [`WorkerContext::deliver`], also reporting whether the text
    /// reached the queue.
    pub(crate) fn try_deliver(&self, packet: &Packet) -> ControlFlow<(), bool> {
        match open_text(packet) {
            Ok(text) => {
                debug!(
                    connection = %self.id,
                    checksum = packet.header.checksum,
                    size = text.len(),
                    "payload received"
                );
                self.queue.push(text);
                ControlFlow::Continue(true)
            }
            Err(err) => match self.handle(err.into()) {
                ControlFlow::Continue(()) => ControlFlow::Continue(false),
                ControlFlow::Break(()) => ControlFlow::Break(()),
            },
        }
    }

    /// Frame `text` unless it matches the last payload sent.
    ///
    /// `Continue(None)` means there is nothing to write.
    pub(crate) fn frame_outbound(
        &self,
        text: &str,
        last: &LastSent,
    ) -> ControlFlow<(), Option<Outbound>> {
        let checksum = text_checksum(text);
        if last.matches(checksum) {
            debug!(connection = %self.id, checksum, "unchanged payload skipped");
            return ControlFlow::Continue(None);
        }
        match seal_text(text, checksum, self.settings.compress) {
            Ok(wire) => ControlFlow::Continue(Some(Outbound { checksum, wire })),
            Err(err) => match self.handle(err.into()) {
                ControlFlow::Continue(()) => ControlFlow::Continue(None),
                ControlFlow::Break(()) => ControlFlow::Break(()),
            },
        }
    }

    /// Retry `op` with backoff while it fails transiently.
    ///
    /// Returns `None` when cancelled or after recording an unrecoverable
    /// failure.
    pub(crate) fn retry<T>(
        &self,
        what: &str,
        mut op: impl FnMut() -> std::result::Result<T, portal_transport::TransportError>,
    ) -> Option<T> {
        let mut backoff = self.backoff();
        while !self.is_cancelled() {
            match op() {
                Ok(value) => return Some(value),
                Err(err) if err.is_transient() => {
                    let delay = backoff.next_delay();
                    debug!(connection = %self.id, %what, error = %err, ?delay, "not available yet, retrying");
                    if !self.pause(delay) {
                        return None;
                    }
                }
                Err(err) => {
                    self.fail(&err.into());
                    return None;
                }
            }
        }
        None
    }
}

/// A framed payload ready for the medium.
pub(crate) struct Outbound {
    pub(crate) checksum: u16,
    pub(crate) wire: Bytes,
}

/// Checksum of the last payload a sender actually wrote.
#[derive(Debug, Default)]
pub(crate) struct LastSent(Option<u16>);

impl LastSent {
    pub(crate) fn matches(&self, checksum: u16) -> bool {
        self.0 == Some(checksum)
    }

    pub(crate) fn sent(&mut self, checksum: u16) {
        self.0 = Some(checksum);
    }
}

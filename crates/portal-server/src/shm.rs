//! Shared-memory listener and sender.
//!
//! The sender overwrites the frame at offset 0 of the segment; the listener
//! re-reads it every poll tick. Shared memory has no "new data" signal, so
//! the listener compares the header checksum with the last one delivered
//! and only decodes when it changed.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, PoisonError};

use portal_frame::{decode, peek_header, PREFIX_SIZE};
use portal_transport::SharedSegment;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionId, ConnectionSettings, Direction, TransportKind};
use crate::error::Result;
use crate::server::{delegate_server, LastSent, Server, ServerCore, WorkerContext};

/// Polls a shared-memory segment for new frames.
///
/// What was already delivered is kept across restarts, so a stop/start over
/// an unchanged segment does not queue the old frame again.
pub struct ShmListener {
    core: ServerCore,
    seen: Arc<Mutex<PollState>>,
}

impl ShmListener {
    pub fn new(id: ConnectionId, settings: ConnectionSettings) -> Self {
        Self {
            core: ServerCore::new(id, TransportKind::SharedMemory, Direction::Recv, settings),
            seen: Arc::default(),
        }
    }
}

impl Server for ShmListener {
    fn start(&mut self) -> Result<()> {
        let seen = Arc::clone(&self.seen);
        self.core
            .start_thread("portal-shm-listener", move |ctx| run_listener(ctx, &seen))
    }

    delegate_server!();
}

/// What the listener has already seen in the segment.
#[derive(Debug, Default)]
struct PollState {
    /// Checksum of the last frame delivered to the queue.
    delivered: Option<u16>,
    /// Prefix of the last frame that failed to decode, so it is reported once.
    rejected: Option<[u8; PREFIX_SIZE]>,
}

/// Map the connection's segment, failing the worker if that is impossible.
fn open_segment(ctx: &WorkerContext) -> Option<SharedSegment> {
    match SharedSegment::open(&ctx.settings.name, ctx.settings.buffer_bytes()) {
        Ok(segment) => Some(segment),
        Err(err) => {
            ctx.fail(&err.into());
            None
        }
    }
}

/// Re-open the tag if the file this handle maps was removed or replaced.
fn follow_tag(ctx: &WorkerContext, segment: &mut SharedSegment) -> bool {
    if !segment.is_detached() {
        return true;
    }
    warn!(connection = %ctx.id, path = ?segment.path(), "segment file replaced, re-opening");
    match open_segment(ctx) {
        Some(fresh) => {
            *segment = fresh;
            true
        }
        None => false,
    }
}

fn run_listener(ctx: WorkerContext, seen: &Mutex<PollState>) {
    let Some(mut segment) = open_segment(&ctx) else {
        return;
    };
    info!(connection = %ctx.id, path = ?segment.path(), "polling shared-memory segment");

    loop {
        if !follow_tag(&ctx, &mut segment) {
            return;
        }
        let flow = {
            let mut seen = seen.lock().unwrap_or_else(PoisonError::into_inner);
            poll_segment(&ctx, segment.as_slice(), &mut seen)
        };
        if flow.is_break() {
            return;
        }
        if !ctx.pause(ctx.settings.poll_interval) {
            return;
        }
    }
}

fn poll_segment(ctx: &WorkerContext, bytes: &[u8], seen: &mut PollState) -> ControlFlow<()> {
    let Some(prefix) = bytes.get(..PREFIX_SIZE) else {
        return ControlFlow::Continue(());
    };
    if prefix.iter().all(|b| *b == 0) {
        debug!(connection = %ctx.id, "segment is blank");
        return ControlFlow::Continue(());
    }
    let mut key = [0u8; PREFIX_SIZE];
    key.copy_from_slice(prefix);
    if seen.rejected == Some(key) {
        return ControlFlow::Continue(());
    }

    let outcome = peek_header(bytes).and_then(|header| {
        if seen.delivered == Some(header.checksum) {
            Ok(None)
        } else {
            decode(bytes).map(Some)
        }
    });

    match outcome {
        Ok(None) => ControlFlow::Continue(()),
        Ok(Some(packet)) => match ctx.try_deliver(&packet) {
            ControlFlow::Continue(true) => {
                seen.delivered = Some(packet.header.checksum);
                seen.rejected = None;
                ControlFlow::Continue(())
            }
            ControlFlow::Continue(false) => {
                seen.rejected = Some(key);
                ControlFlow::Continue(())
            }
            ControlFlow::Break(()) => ControlFlow::Break(()),
        },
        Err(err) => {
            seen.rejected = Some(key);
            ctx.handle(err.into())
        }
    }
}

/// Writes each queued payload into a shared-memory segment.
pub struct ShmSender {
    core: ServerCore,
}

impl ShmSender {
    pub fn new(id: ConnectionId, settings: ConnectionSettings) -> Self {
        Self {
            core: ServerCore::new(id, TransportKind::SharedMemory, Direction::Send, settings),
        }
    }
}

impl Server for ShmSender {
    fn start(&mut self) -> Result<()> {
        self.core.start_thread("portal-shm-sender", run_sender)
    }

    delegate_server!();
}

fn run_sender(ctx: WorkerContext) {
    let Some(mut segment) = open_segment(&ctx) else {
        return;
    };
    info!(connection = %ctx.id, path = ?segment.path(), "writing shared-memory segment");

    let mut last = LastSent::default();
    while !ctx.is_cancelled() {
        let Some(text) = ctx.queue.pop_timeout(ctx.settings.worker.queue_timeout) else {
            continue;
        };
        let outbound = match ctx.frame_outbound(&text, &last) {
            ControlFlow::Continue(Some(outbound)) => outbound,
            ControlFlow::Continue(None) => continue,
            ControlFlow::Break(()) => return,
        };
        if !follow_tag(&ctx, &mut segment) {
            return;
        }
        match segment.write_frame(&outbound.wire) {
            Ok(()) => last.sent(outbound.checksum),
            Err(err) => {
                if ctx.handle(err.into()).is_break() {
                    return;
                }
            }
        }
    }
}

//! The error slot shared between a worker and the host.
//!
//! Workers never propagate errors across the thread boundary. They write a
//! [`Fault`] into the slot and the host reads it on its next poll.

use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{ErrorClass, ServerError};

/// The last error a worker recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub class: ErrorClass,
    pub message: String,
    /// The rendered source chain, one cause per line.
    pub trace: String,
}

impl Fault {
    pub fn from_error(err: &ServerError) -> Self {
        Self {
            class: err.class(),
            message: err.to_string(),
            trace: render_chain(err),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.class, self.message)
    }
}

fn render_chain(err: &(dyn StdError + 'static)) -> String {
    let mut lines = vec![format!("0: {err}")];
    let mut source = err.source();
    while let Some(cause) = source {
        lines.push(format!("{}: caused by: {cause}", lines.len()));
        source = cause.source();
    }
    lines.join("\n")
}

/// Mutex-guarded slot holding at most one [`Fault`].
#[derive(Debug, Clone, Default)]
pub struct ErrorSlot {
    inner: Arc<Mutex<Option<Fault>>>,
}

impl ErrorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `err`, replacing any earlier fault.
    pub fn record(&self, err: &ServerError) -> Fault {
        let fault = Fault::from_error(err);
        *self.lock() = Some(fault.clone());
        fault
    }

    /// Copy of the current fault.
    pub fn get(&self) -> Option<Fault> {
        self.lock().clone()
    }

    /// Remove and return the current fault.
    pub fn take(&self) -> Option<Fault> {
        self.lock().take()
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    pub fn is_set(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Fault>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

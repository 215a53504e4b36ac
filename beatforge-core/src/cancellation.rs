//! A plain, non-async cancellation signal consulted at stage boundaries.
//!
//! The core crate stays synchronous end to end, so this is a bare
//! `AtomicBool` behind a cheap-to-clone handle rather than a tokio
//! `CancellationToken` — the server crate is the only place async enters,
//! and it checks this same token from its request-handling task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

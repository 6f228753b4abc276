//! The host-facing half of a site: the platform pushes received bytes into
//! `handle_incoming` and drains bytes to deliver from `handle_outgoing`.
//! The inbox is the only state shared between the platform callbacks and the
//! driver; a mutex with a single writer and a single reader guards it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
pub struct Mailbox {
    inbox: Arc<Mutex<Vec<Vec<u8>>>>,
    outgoing: Arc<Mutex<VecDeque<Vec<u8>>>>,
    cancel: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform callback: a payload arrived for this site.
    pub fn handle_incoming(&self, bytes: Vec<u8>) {
        lock(&self.inbox).push(bytes);
    }

    /// Platform callback: the next payload this site wants delivered, if any.
    pub fn handle_outgoing(&self) -> Option<Vec<u8>> {
        lock(&self.outgoing).pop_front()
    }

    /// Externally settable abort; the driver observes it between states and
    /// inside every wait.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_finished(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }

    pub(crate) fn mark_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    pub(crate) fn enqueue_outgoing(&self, bytes: Vec<u8>) {
        lock(&self.outgoing).push_back(bytes);
    }

    pub(crate) fn outgoing_len(&self) -> usize {
        lock(&self.outgoing).len()
    }

    pub(crate) fn inbox_len(&self) -> usize {
        lock(&self.inbox).len()
    }

    pub(crate) fn drain_inbox(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *lock(&self.inbox))
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/protocol/mailbox.rs"]
mod tests;

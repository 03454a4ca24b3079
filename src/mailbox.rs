// ============================================================================
// LATEST-VALUE MAILBOX — single-slot, overwrite-on-publish handoff
// ============================================================================
//
// A fast producer (slider ticks) publishes parameter sets; a slow consumer
// (the pixel worker) takes them. Only the newest payload is kept. The
// "data ready" notification fires once per idle→busy transition: the first
// publish after a `take()` notifies, later publishes before the next `take()`
// just overwrite.
// ============================================================================

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

type Notifier = Box<dyn Fn() + Send + Sync>;

struct Slot<T> {
    payload: Option<T>,
    /// A ready notification is outstanding (no `take()` since it fired).
    notified: bool,
    closed: bool,
}

pub struct Mailbox<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
    notifier: Option<Notifier>,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot { payload: None, notified: false, closed: false }),
            ready: Condvar::new(),
            notifier: None,
        }
    }

    /// Mailbox that additionally calls `notifier` on every ready event.
    /// The callback runs on the publishing thread, outside the internal lock.
    pub fn with_notifier<F>(notifier: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self { notifier: Some(Box::new(notifier)), ..Self::new() }
    }

    fn slot(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `payload`, replacing anything not yet taken.
    ///
    /// Returns `true` when this call emitted the ready event. Publishing into
    /// a closed mailbox drops the payload and returns `false`.
    pub fn publish(&self, payload: T) -> bool {
        let emit = {
            let mut slot = self.slot();
            if slot.closed {
                return false;
            }
            slot.payload = Some(payload);
            let emit = !slot.notified;
            slot.notified = true;
            emit
        };
        if emit {
            self.ready.notify_all();
            if let Some(notify) = &self.notifier {
                notify();
            }
        }
        emit
    }

    /// Take the pending payload without blocking. Re-arms the ready event
    /// whether or not anything was pending.
    pub fn take(&self) -> Option<T> {
        let mut slot = self.slot();
        slot.notified = false;
        slot.payload.take()
    }

    /// Block until a payload is available and take it. Returns `None` once
    /// the mailbox is closed.
    pub fn wait_take(&self) -> Option<T> {
        let mut slot = self.slot();
        loop {
            if slot.closed {
                return None;
            }
            if let Some(payload) = slot.payload.take() {
                slot.notified = false;
                return Some(payload);
            }
            slot = self.ready.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Drop any pending payload and re-arm the ready event.
    pub fn discard(&self) {
        let mut slot = self.slot();
        slot.payload = None;
        slot.notified = false;
    }

    /// Close the mailbox, waking any consumer blocked in `wait_take`.
    pub fn close(&self) {
        {
            let mut slot = self.slot();
            slot.closed = true;
            slot.payload = None;
        }
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.slot().closed
    }

    pub fn has_pending(&self) -> bool {
        self.slot().payload.is_some()
    }
}

//! Producer/consumer handshake between the acquisition thread and the
//! render side.
//!
//! Two binary wake signals move one [`CaptureSet`] back and forth: "ready"
//! hands it to the consumer, "processed" hands it back. Whoever holds the set
//! is the only one touching its buffers, so no copy is ever made.
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::types::CaptureSet;

/// Binary wake primitive that optionally carries a payload.
///
/// `signal` latches a value and wakes a blocked thread. It does not count: a
/// second signal before anyone blocks replaces the first. `block` waits for a
/// latched value and takes it, which resets the signal.
pub struct Signal<T> {
    state: Mutex<Option<T>>,
    cond: Condvar,
}

/// Signal without a payload.
pub type WakeSignal = Signal<()>;

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    // Poison only means another thread panicked while holding the lock; the
    // Option inside is still coherent.
    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn signal(&self, value: T) {
        let mut state = self.lock();
        *state = Some(value);
        self.cond.notify_all();
    }

    /// Blocks until signaled. No timeout.
    pub fn block(&self) -> T {
        let mut state = self.lock();
        loop {
            if let Some(value) = state.take() {
                return value;
            }
            state = self
                .cond
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Takes a latched value without blocking.
    pub fn peek(&self) -> Option<T> {
        self.lock().take()
    }

    pub fn is_signaled(&self) -> bool {
        self.lock().is_some()
    }
}

/// Shared context wiring one acquisition loop to one consumer.
pub struct Handshake {
    ready: Signal<CaptureSet>,
    processed: Signal<CaptureSet>,
    shutdown: AtomicBool,
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

impl Handshake {
    pub fn new() -> Self {
        Self {
            ready: Signal::new(),
            processed: Signal::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Producer side: publish a freshly downloaded set and wait until the
    /// consumer is finished with it.
    pub fn publish_and_wait(&self, captures: CaptureSet) -> CaptureSet {
        self.ready.signal(captures);
        self.processed.block()
    }

    /// Consumer side: block until a capture is ready.
    pub fn wait_ready(&self) -> ReadyCapture<'_> {
        let captures = self.ready.block();
        ReadyCapture {
            handshake: self,
            captures,
        }
    }

    /// Consumer side: non-blocking poll, for render loops that check once per
    /// frame.
    pub fn try_ready(&self) -> Option<ReadyCapture<'_>> {
        self.ready.peek().map(|captures| ReadyCapture {
            handshake: self,
            captures,
        })
    }

    /// Hands a set that was published but never picked up back to the
    /// producer. Returns `false` if nothing was parked in "ready".
    pub(crate) fn reclaim_unconsumed(&self) -> bool {
        match self.ready.peek() {
            Some(captures) => {
                self.processed.signal(captures);
                true
            }
            None => false,
        }
    }
}

/// Read access to the captures between "ready" and "processed".
///
/// Dropping the guard signals "processed".
pub struct ReadyCapture<'a> {
    handshake: &'a Handshake,
    captures: CaptureSet,
}

impl ReadyCapture<'_> {
    /// Explicit form of dropping the guard.
    pub fn processed(self) {}
}

impl Deref for ReadyCapture<'_> {
    type Target = CaptureSet;

    fn deref(&self) -> &CaptureSet {
        &self.captures
    }
}

impl Drop for ReadyCapture<'_> {
    fn drop(&mut self) {
        let captures = std::mem::take(&mut self.captures);
        self.handshake.processed.signal(captures);
    }
}

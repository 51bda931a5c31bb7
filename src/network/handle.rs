//! Request handle - the async ticket shared between the UI thread and a worker
//!
//! The state byte and cancel flag are atomics; the response and error slots
//! sit behind short-held mutexes. Workers write the response slot before the
//! state transition, so a reader that observes `Completed` (Acquire) sees the
//! finished response.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::models::Response;

/// Lifecycle of a dispatched request. `Pending` is the only non-terminal
/// state; every terminal state is absorbing.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleState {
    Pending = 0,
    Completed = 1,
    Error = 2,
    Timeout = 3,
    Cancelled = 4,
}

impl HandleState {
    pub fn is_terminal(self) -> bool {
        self != HandleState::Pending
    }

    fn from_u8(raw: u8) -> HandleState {
        match raw {
            0 => HandleState::Pending,
            1 => HandleState::Completed,
            2 => HandleState::Error,
            3 => HandleState::Timeout,
            _ => HandleState::Cancelled,
        }
    }
}

/// Shared between the session and the worker; lifetime is the longer of the
/// two holders (both keep an `Arc`).
pub struct RequestHandle {
    id: u64,
    started: Instant,
    state: AtomicU8,
    cancel: AtomicBool,
    bytes_now: AtomicU64,
    bytes_total: AtomicU64,
    response: Mutex<Option<Response>>,
    error: Mutex<Option<String>>,
}

impl RequestHandle {
    pub fn new(id: u64) -> Self {
        RequestHandle {
            id,
            started: Instant::now(),
            state: AtomicU8::new(HandleState::Pending as u8),
            cancel: AtomicBool::new(false),
            bytes_now: AtomicU64::new(0),
            bytes_total: AtomicU64::new(0),
            response: Mutex::new(None),
            error: Mutex::new(None),
        }
    }

    /// A handle born in `Error`, used when pre-dispatch validation fails
    pub fn failed(id: u64, message: impl Into<String>) -> Self {
        let handle = Self::new(id);
        handle
            .state
            .store(HandleState::Error as u8, Ordering::Release);
        *handle.error.lock().unwrap() = Some(message.into());
        handle
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn state(&self) -> HandleState {
        HandleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// CAS `Pending` into a terminal state. Returns false when another
    /// terminal transition already won; terminal states never change.
    pub fn try_finish(&self, terminal: HandleState) -> bool {
        debug_assert!(terminal.is_terminal());
        self.state
            .compare_exchange(
                HandleState::Pending as u8,
                terminal as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Advisory: the worker observes this inside the progress callback
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Progress counters are relaxed and may momentarily overshoot
    pub fn set_progress(&self, now: u64, total: u64) {
        self.bytes_now.store(now, Ordering::Relaxed);
        self.bytes_total.store(total, Ordering::Relaxed);
    }

    /// (bytes received so far, expected total)
    pub fn progress(&self) -> (u64, u64) {
        (
            self.bytes_now.load(Ordering::Relaxed),
            self.bytes_total.load(Ordering::Relaxed),
        )
    }

    /// Worker side: park the finished response before transitioning state
    pub fn put_response(&self, response: Response) {
        *self.response.lock().unwrap() = Some(response);
    }

    /// Transfer the response out. Idempotent: the second call returns `None`.
    pub fn take_response(&self) -> Option<Response> {
        self.response.lock().unwrap().take()
    }

    pub fn set_error(&self, message: impl Into<String>) {
        *self.error.lock().unwrap() = Some(message.into());
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_are_absorbing() {
        let handle = RequestHandle::new(1);
        assert_eq!(handle.state(), HandleState::Pending);
        assert!(handle.try_finish(HandleState::Cancelled));
        // a worker completing afterwards loses the race and changes nothing
        assert!(!handle.try_finish(HandleState::Completed));
        assert_eq!(handle.state(), HandleState::Cancelled);
    }

    #[test]
    fn test_failed_handle_is_born_in_error() {
        let handle = RequestHandle::failed(7, "URL is empty");
        assert_eq!(handle.state(), HandleState::Error);
        assert_eq!(handle.error_message().as_deref(), Some("URL is empty"));
    }

    #[test]
    fn test_take_response_is_idempotent() {
        let handle = RequestHandle::new(2);
        handle.put_response(Response::default());
        assert!(handle.try_finish(HandleState::Completed));
        assert!(handle.take_response().is_some());
        assert!(handle.take_response().is_none());
    }

    #[test]
    fn test_progress_roundtrip() {
        let handle = RequestHandle::new(3);
        handle.set_progress(512, 2048);
        assert_eq!(handle.progress(), (512, 2048));
    }
}

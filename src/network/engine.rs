//! Async engine - dispatches requests onto worker threads and hands the UI
//! thread poll-based handles
//!
//! The engine owns a small tokio runtime (4 worker threads) and a table of
//! live handles. Nothing here blocks: `poll`, `take_response`, `cancel`, and
//! `free` are all safe to call from the UI thread every frame.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::constants::MAX_WORKERS;
use crate::models::{Request, Response};
use crate::network::client::{self, Limits, TransportError};
use crate::network::handle::{HandleState, RequestHandle};
use crate::validate::validate_request;

/// Construction failures are fatal to the caller (exit code 1)
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transport initialization failed: {0}")]
    TransportInit(String),
}

/// Worker pool plus the table of live request handles
pub struct AsyncEngine {
    runtime: tokio::runtime::Runtime,
    client: reqwest::Client,
    limits: Limits,
    handles: HashMap<u64, Arc<RequestHandle>>,
    next_id: u64,
}

impl AsyncEngine {
    pub fn new(limits: Limits) -> Result<Self, EngineError> {
        let limits = limits.clamped();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(MAX_WORKERS)
            .thread_name("tinyrequest-worker")
            .enable_all()
            .build()
            .map_err(|e| EngineError::TransportInit(e.to_string()))?;
        let client = client::create_client(&limits)
            .map_err(|e| EngineError::TransportInit(e.to_string()))?;
        Ok(AsyncEngine {
            runtime,
            client,
            limits,
            handles: HashMap::new(),
            next_id: 1,
        })
    }

    pub fn with_defaults() -> Result<Self, EngineError> {
        Self::new(Limits::default())
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Validate and enqueue a request. On validation failure the returned
    /// handle is already in `Error` and no worker runs. `cookie_header`,
    /// when present, rides along for the transport call only.
    pub fn dispatch(
        &mut self,
        request: Request,
        cookie_header: Option<String>,
    ) -> Arc<RequestHandle> {
        let id = self.next_id;
        self.next_id += 1;

        if let Err(err) = validate_request(&request) {
            tracing::warn!(id, %err, "rejecting invalid request");
            let handle = Arc::new(RequestHandle::failed(id, err.to_string()));
            self.handles.insert(id, Arc::clone(&handle));
            return handle;
        }

        let handle = Arc::new(RequestHandle::new(id));
        self.handles.insert(id, Arc::clone(&handle));

        tracing::info!(id, url = %request.url, method = %request.method, "dispatching request");
        let worker = Arc::clone(&handle);
        let client = self.client.clone();
        let limits = self.limits.clone();
        self.runtime.spawn(async move {
            let result = client::send(
                &client,
                &request,
                &limits,
                cookie_header.as_deref(),
                |total, now| {
                    worker.set_progress(now, total);
                    worker.is_cancelled()
                },
            )
            .await;

            match result {
                Ok(response) => {
                    tracing::info!(id, status = response.status, elapsed_ms = response.elapsed_ms, "request completed");
                    // response lands in the slot before the state flips
                    worker.put_response(response);
                    worker.try_finish(HandleState::Completed);
                }
                Err(err) => {
                    tracing::info!(id, %err, "request failed");
                    let terminal = match err {
                        TransportError::Cancelled => HandleState::Cancelled,
                        TransportError::Timeout => HandleState::Timeout,
                        _ => HandleState::Error,
                    };
                    worker.set_error(err.to_string());
                    worker.try_finish(terminal);
                }
            }
        });
        handle
    }

    /// Read the current state without blocking. Detects an overdue request
    /// and transitions it to `Timeout`, signalling the worker to abort.
    pub fn poll(&self, handle: &RequestHandle) -> HandleState {
        let state = handle.state();
        if state == HandleState::Pending
            && handle.started().elapsed() > self.limits.total_timeout
        {
            handle.request_cancel();
            handle.set_error(format!(
                "request timed out after {}s",
                self.limits.total_timeout.as_secs()
            ));
            if handle.try_finish(HandleState::Timeout) {
                tracing::info!(id = handle.id(), "request timed out");
            }
            return handle.state();
        }
        state
    }

    /// (bytes received, expected total) as last reported by the worker
    pub fn poll_progress(&self, handle: &RequestHandle) -> (u64, u64) {
        handle.progress()
    }

    /// Transfer the response out of a completed handle. Second call: `None`.
    pub fn take_response(&self, handle: &RequestHandle) -> Option<Response> {
        handle.take_response()
    }

    /// Set the cancel flag; flips the state only when still `Pending`. A
    /// worker whose response already arrived keeps its `Completed`.
    pub fn cancel(&self, handle: &RequestHandle) {
        handle.request_cancel();
        if handle.try_finish(HandleState::Cancelled) {
            handle.set_error("request cancelled");
            tracing::info!(id = handle.id(), "request cancelled");
        }
    }

    /// Release the slot. A worker still running is detached; its eventual
    /// result is discarded with its copy of the handle.
    pub fn free(&mut self, handle: &RequestHandle) {
        self.handles.remove(&handle.id());
    }

    pub fn live_handles(&self) -> usize {
        self.handles.len()
    }

    /// Tear down the worker pool without waiting on in-flight transfers
    pub fn shutdown(self) {
        self.runtime.shutdown_background();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HttpMethod;
    use crate::testutil::{canned, serve};
    use std::thread;
    use std::time::{Duration, Instant};

    fn get(url: &str) -> Request {
        Request {
            method: HttpMethod::GET,
            url: url.to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    fn wait_terminal(engine: &AsyncEngine, handle: &RequestHandle) -> HandleState {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let state = engine.poll(handle);
            if state.is_terminal() {
                return state;
            }
            assert!(Instant::now() < deadline, "request never settled");
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn short_limits() -> Limits {
        Limits {
            max_response_size: 1024,
            total_timeout: Duration::from_secs(5),
            ..Limits::default()
        }
    }

    #[test]
    fn test_get_completes() {
        let (url, _rx) = serve(canned(b"hello", ""), Duration::ZERO);
        let mut engine = AsyncEngine::new(short_limits()).unwrap();
        let handle = engine.dispatch(get(&url), None);

        assert_eq!(wait_terminal(&engine, &handle), HandleState::Completed);
        let response = engine.take_response(&handle).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.status_text, "OK");
        assert_eq!(response.body, b"hello");
        assert!(!response.truncated);
        assert_eq!(response.total_size, 5);
        // ownership transferred out exactly once
        assert!(engine.take_response(&handle).is_none());
        engine.free(&handle);
        assert_eq!(engine.live_handles(), 0);
    }

    #[test]
    fn test_invalid_url_fails_before_transport() {
        let mut engine = AsyncEngine::new(short_limits()).unwrap();
        let handle = engine.dispatch(get("example.com"), None);
        assert_eq!(engine.poll(&handle), HandleState::Error);
        assert!(handle
            .error_message()
            .unwrap()
            .contains("http"));
    }

    #[test]
    fn test_cancel_pending_request() {
        let (url, _rx) = serve(canned(b"late", ""), Duration::from_secs(3));
        let mut engine = AsyncEngine::new(short_limits()).unwrap();
        let handle = engine.dispatch(get(&url), None);

        engine.cancel(&handle);
        assert_eq!(engine.poll(&handle), HandleState::Cancelled);
        // absorbing: still cancelled after the worker gives up
        thread::sleep(Duration::from_millis(50));
        assert_eq!(engine.poll(&handle), HandleState::Cancelled);
        engine.free(&handle);
    }

    #[test]
    fn test_timeout_transitions_handle() {
        let (url, _rx) = serve(canned(b"slow", ""), Duration::from_secs(10));
        let limits = Limits {
            total_timeout: Duration::from_millis(300),
            ..short_limits()
        };
        let mut engine = AsyncEngine::new(limits).unwrap();
        let handle = engine.dispatch(get(&url), None);

        assert_eq!(wait_terminal(&engine, &handle), HandleState::Timeout);
        assert!(handle.error_message().unwrap().contains("timed out"));
        engine.free(&handle);
    }

    #[test]
    fn test_truncation_at_cap() {
        let big = vec![b'x'; 8192];
        let (url, _rx) = serve(canned(&big, ""), Duration::ZERO);
        let mut engine = AsyncEngine::new(short_limits()).unwrap();
        let handle = engine.dispatch(get(&url), None);

        assert_eq!(wait_terminal(&engine, &handle), HandleState::Completed);
        let response = engine.take_response(&handle).unwrap();
        assert_eq!(response.status, 200);
        assert!(response.truncated);
        assert_eq!(response.body.len(), 1024);
        assert_eq!(response.total_size, 8192);
        engine.free(&handle);
    }

    #[test]
    fn test_cookie_header_rides_along() {
        let (url, rx) = serve(canned(b"ok", ""), Duration::ZERO);
        let mut engine = AsyncEngine::new(short_limits()).unwrap();
        let handle = engine.dispatch(get(&url), Some("sid=abc".to_string()));

        assert_eq!(wait_terminal(&engine, &handle), HandleState::Completed);
        let captured = rx.recv().unwrap().to_ascii_lowercase();
        assert!(captured.contains("cookie: sid=abc"));
        engine.free(&handle);
    }

    #[test]
    fn test_set_cookie_headers_survive_on_response() {
        let (url, _rx) = serve(
            canned(b"ok", "Set-Cookie: sid=abc; Path=/\r\n"),
            Duration::ZERO,
        );
        let mut engine = AsyncEngine::new(short_limits()).unwrap();
        let handle = engine.dispatch(get(&url), None);

        assert_eq!(wait_terminal(&engine, &handle), HandleState::Completed);
        let response = engine.take_response(&handle).unwrap();
        assert_eq!(response.header("set-cookie"), Some("sid=abc; Path=/"));
        engine.free(&handle);
    }

    #[test]
    fn test_progress_counters_reach_body_size() {
        let (url, _rx) = serve(canned(b"hello", ""), Duration::ZERO);
        let mut engine = AsyncEngine::new(short_limits()).unwrap();
        let handle = engine.dispatch(get(&url), None);

        wait_terminal(&engine, &handle);
        assert_eq!(engine.poll_progress(&handle), (5, 5));
        engine.free(&handle);
    }
}

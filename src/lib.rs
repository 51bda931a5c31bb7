//! # tinyrequest
//!
//! The non-UI core of an interactive HTTP client workbench: compose
//! requests, dispatch them on background workers, inspect responses, and
//! persist sessions. A GUI shell drives the core through the [`Session`]
//! command surface and polls it once per frame.
//!
//! ## Features
//! - Typed request/response model with URL, header, method, and body validation
//! - Async engine: poll-based handles, progress, cancellation, timeouts,
//!   response-size truncation
//! - Per-collection cookie jars with RFC-6265-style matching
//! - Crash-safe persistence with debounced autosave
//! - cURL import/export
//!
//! ## Architecture
//! Mixed scheduling:
//! - Session, autosaver, and error bus - synchronous, ticked by the UI thread
//! - Async engine - tokio worker pool, shares only `RequestHandle`s with the
//!   UI thread

pub mod app;
pub mod bus;
pub mod constants;
pub mod cookies;
pub mod curl;
pub mod logging;
pub mod models;
pub mod network;
pub mod storage;
pub mod validate;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export commonly used types
pub use app::{Session, ShellCommand};
pub use bus::{ErrorBus, ErrorKind, Severity};
pub use cookies::{CookieJar, StoredCookie};
pub use curl::{parse_curl, to_curl};
pub use models::{
    Collection, Header, HistoryEntry, HttpMethod, Request, RequestDraft, Response, SavedRequest,
};
pub use network::{AsyncEngine, HandleState, Limits, RequestHandle, TransportError};
pub use storage::Storage;
pub use validate::{validate_header_line, validate_json, validate_method, validate_url};

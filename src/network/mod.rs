//! Network layer - async request engine and HTTP transport adapter

pub mod client;
pub mod engine;
pub mod handle;

pub use client::{Limits, TransportError};
pub use engine::{AsyncEngine, EngineError};
pub use handle::{HandleState, RequestHandle};

//! Session state - the active collection, the draft, and the in-flight ticket
//!
//! Everything here runs on the UI thread. Network I/O only ever happens on
//! the engine's workers; the session talks to them through a shared
//! [`RequestHandle`] it polls each frame.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Context;

use crate::bus::ErrorBus;
use crate::models::{Collection, HistoryEntry, Request, RequestDraft, Response};
use crate::network::{AsyncEngine, HandleState, Limits, RequestHandle};
use crate::storage::{Autosaver, Storage};

/// Visibility flags for the save/load dialogs the shell renders
#[derive(Clone, Copy, Debug, Default)]
pub struct DialogState {
    pub show_save: bool,
    pub show_open: bool,
    pub selection: usize,
}

/// One user-facing workbench session
pub struct Session {
    pub draft: RequestDraft,
    pub response: Option<Response>,
    pub collections: Vec<Collection>,
    pub active_collection: Option<u64>,
    pub active_request: Option<usize>,
    pub history: VecDeque<HistoryEntry>,
    pub bus: ErrorBus,
    pub dialogs: DialogState,

    pub(crate) engine: AsyncEngine,
    pub(crate) storage: Storage,
    pub(crate) autosaver: Autosaver,
    /// At most one request in flight per session
    pub(crate) in_flight: Option<Arc<RequestHandle>>,
    /// The request behind `in_flight`, kept for history and cookie routing
    pub(crate) last_sent: Option<Request>,
    pub(crate) next_collection_id: u64,
}

impl Session {
    /// Build a session against the default state directory. Errors here are
    /// the fatal startup cases (transport init, unwritable state directory);
    /// the shell maps them to exit code 1.
    pub fn new() -> anyhow::Result<Self> {
        Self::with_parts(Limits::default(), Storage::new())
    }

    /// Build against explicit limits and storage root
    pub fn with_parts(limits: Limits, storage: Storage) -> anyhow::Result<Self> {
        storage.init()?;
        let engine = AsyncEngine::new(limits).context("engine startup")?;

        let collections = storage.load_collections();
        let next_collection_id = collections.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        let draft = storage.load_request_state().unwrap_or_default();
        let active_collection = collections.first().map(|c| c.id);

        Ok(Session {
            draft,
            response: None,
            collections,
            active_collection,
            active_request: None,
            history: VecDeque::new(),
            bus: ErrorBus::new(),
            dialogs: DialogState::default(),
            engine,
            storage,
            autosaver: Autosaver::new(),
            in_flight: None,
            last_sent: None,
            next_collection_id,
        })
    }

    pub fn active_collection(&self) -> Option<&Collection> {
        let id = self.active_collection?;
        self.collections.iter().find(|c| c.id == id)
    }

    pub fn active_collection_mut(&mut self) -> Option<&mut Collection> {
        let id = self.active_collection?;
        self.collections.iter_mut().find(|c| c.id == id)
    }

    /// The latest completed response, if any
    pub fn get_response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    /// Current state of the in-flight request
    pub fn get_handle_state(&self) -> Option<HandleState> {
        self.in_flight.as_deref().map(|h| self.engine.poll(h))
    }

    /// (bytes received, expected total) of the in-flight request
    pub fn get_progress(&self) -> Option<(u64, u64)> {
        self.in_flight
            .as_deref()
            .map(|h| self.engine.poll_progress(h))
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub(crate) fn next_id(&mut self) -> u64 {
        let id = self.next_collection_id;
        self.next_collection_id += 1;
        id
    }
}

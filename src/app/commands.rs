//! Command handlers - business logic the shell invokes on the session

use chrono::Utc;

use crate::app::state::{DialogState, Session};
use crate::bus::{ErrorKind, Severity};
use crate::constants::MAX_HISTORY;
use crate::models::{
    Collection, Header, HistoryEntry, HttpMethod, Request, RequestDraft, Response, SavedRequest,
};
use crate::network::{HandleState, RequestHandle};
use crate::validate::validate_request;

/// UI-independent semantics of the keyboard contract. The shell binds keys;
/// the session defines what they do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShellCommand {
    SendRequest,
    Save,
    Open,
    Quit,
    DismissDialog,
}

impl Session {
    // ========================
    // Draft mutators
    // ========================

    fn mark_edited(&mut self) {
        self.draft.edited = true;
        if let Some(collection) = self.active_collection_mut() {
            collection.touch();
        }
    }

    pub fn draft_set_method(&mut self, method: HttpMethod) {
        self.draft.method = method;
        self.mark_edited();
    }

    pub fn draft_set_url(&mut self, url: impl Into<String>) {
        self.draft.url = url.into();
        self.mark_edited();
    }

    pub fn draft_set_body(&mut self, body: impl Into<String>) {
        self.draft.body = body.into();
        self.mark_edited();
    }

    pub fn draft_add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.draft.headers.push(Header::new(name, value));
        self.mark_edited();
    }

    pub fn draft_edit_header(
        &mut self,
        index: usize,
        name: impl Into<String>,
        value: impl Into<String>,
    ) {
        if let Some(header) = self.draft.headers.get_mut(index) {
            header.name = name.into();
            header.value = value.into();
            self.mark_edited();
        }
    }

    pub fn draft_remove_header(&mut self, index: usize) {
        if index < self.draft.headers.len() {
            self.draft.headers.remove(index);
            self.mark_edited();
        }
    }

    // ========================
    // Sending
    // ========================

    /// Freeze the draft, validate, and dispatch. Validation failures stay
    /// local: they publish to the bus and nothing reaches the transport.
    pub fn send(&mut self) {
        if self.in_flight.is_some() {
            self.bus.publish(
                ErrorKind::General,
                Severity::Warning,
                "a request is already in flight",
            );
            return;
        }

        let request = self.draft.freeze();
        if let Err(err) = validate_request(&request) {
            self.bus
                .publish(ErrorKind::Validation, Severity::Error, err.to_string());
            return;
        }

        let cookie_header = {
            let is_secure = request.is_secure();
            let url = request.url.clone();
            self.active_collection_mut().and_then(|collection| {
                collection.jar.cleanup_expired();
                collection.jar.build_cookie_header(&url, is_secure)
            })
        };

        let handle = self.engine.dispatch(request.clone(), cookie_header);
        self.last_sent = Some(request);
        self.in_flight = Some(handle);
    }

    /// Request cancellation of the in-flight transfer. The terminal state is
    /// merged on a later `tick`.
    pub fn cancel(&mut self) {
        if let Some(handle) = &self.in_flight {
            self.engine.cancel(handle);
        }
    }

    /// Per-frame heartbeat: poll the in-flight handle, merge terminal
    /// results, autosync the draft, autosave dirty collections, and age out
    /// bus notices.
    pub fn tick(&mut self) {
        if let Some(handle) = self.in_flight.clone() {
            let state = self.engine.poll(&handle);
            if state.is_terminal() {
                self.in_flight = None;
                self.finish_in_flight(&handle, state);
                self.engine.free(&handle);
            }
        } else {
            self.autosync_draft();
        }
        self.autosave();
        self.bus.tick();
    }

    fn finish_in_flight(&mut self, handle: &RequestHandle, state: HandleState) {
        let request = self.last_sent.take();
        match state {
            HandleState::Completed => {
                if let Some(response) = self.engine.take_response(handle) {
                    self.absorb_response(request, response);
                }
            }
            HandleState::Error | HandleState::Timeout | HandleState::Cancelled => {
                let message = handle
                    .error_message()
                    .unwrap_or_else(|| "request failed".to_string());
                let severity = if state == HandleState::Cancelled {
                    Severity::Warning
                } else {
                    Severity::Error
                };
                self.bus.publish(ErrorKind::Network, severity, message);
                if let Some(request) = request {
                    self.push_history(HistoryEntry {
                        request,
                        status: None,
                        elapsed_ms: 0,
                        timestamp: Utc::now(),
                    });
                }
            }
            HandleState::Pending => {}
        }
    }

    /// Merge a completed response: route Set-Cookie lines into the owning
    /// jar, record history, publish the outcome, and swap the response slot
    /// (releasing the previous response).
    fn absorb_response(&mut self, request: Option<Request>, response: Response) {
        if let Some(request) = &request {
            let set_cookies: Vec<String> =
                response.header_all("set-cookie").map(String::from).collect();
            if !set_cookies.is_empty() {
                let origin = request.url.clone();
                let mut rejected = Vec::new();
                let mut stored = 0usize;
                if let Some(collection) = self.active_collection_mut() {
                    for line in &set_cookies {
                        match collection.jar.parse_set_cookie(line, &origin) {
                            Ok(_) => stored += 1,
                            Err(err) => rejected.push(err),
                        }
                    }
                    if stored > 0 {
                        collection.touch();
                    }
                }
                for err in rejected {
                    self.bus.publish(
                        ErrorKind::Parsing,
                        Severity::Warning,
                        format!("cookie rejected: {err}"),
                    );
                }
            }
        }

        let severity = if response.is_success() {
            Severity::Success
        } else {
            Severity::Warning
        };
        self.bus.publish(
            ErrorKind::Network,
            severity,
            format!(
                "{} {} in {} ms",
                response.status, response.status_text, response.elapsed_ms
            ),
        );

        if let Some(request) = request {
            self.push_history(HistoryEntry {
                request,
                status: Some(response.status),
                elapsed_ms: response.elapsed_ms,
                timestamp: Utc::now(),
            });
        }

        self.response = Some(response);
    }

    fn push_history(&mut self, entry: HistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.pop_back();
        }
        self.history.push_front(entry);
    }

    /// Refresh an unedited draft from the stored active request, so external
    /// collection changes show up without clobbering user input.
    fn autosync_draft(&mut self) {
        if self.draft.edited {
            return;
        }
        let Some(index) = self.active_request else {
            return;
        };
        let Some(stored) = self
            .active_collection()
            .and_then(|c| c.requests.get(index))
            .map(|s| s.request.clone())
        else {
            return;
        };
        if self.draft.freeze() != stored {
            self.draft = RequestDraft::from_request(&stored);
        }
    }

    // ========================
    // Persistence
    // ========================

    fn autosave(&mut self) {
        for collection in &mut self.collections {
            if self.autosaver.due(collection) {
                match self.storage.save_collection(collection) {
                    Ok(()) => {
                        collection.dirty = false;
                        self.autosaver.mark_saved(collection.id);
                    }
                    Err(err) => {
                        tracing::error!(id = collection.id, %err, "autosave failed");
                        self.bus.publish(
                            ErrorKind::General,
                            Severity::Error,
                            format!("autosave failed: {err}"),
                        );
                    }
                }
            }
        }
    }

    /// Save every dirty collection immediately, ignoring the debounce
    pub fn flush_saves(&mut self) {
        for collection in &mut self.collections {
            if collection.dirty {
                match self.storage.save_collection(collection) {
                    Ok(()) => {
                        collection.dirty = false;
                        self.autosaver.mark_saved(collection.id);
                    }
                    Err(err) => tracing::error!(id = collection.id, %err, "save failed"),
                }
            }
        }
    }

    /// Persist the single-request snapshot
    pub fn save_snapshot(&mut self) {
        if let Err(err) = self.storage.save_request_state(&self.draft) {
            tracing::error!(%err, "state snapshot failed");
            self.bus.publish(
                ErrorKind::General,
                Severity::Error,
                format!("could not save state: {err}"),
            );
        }
    }

    /// Clean shutdown: flush everything, then tear the worker pool down
    pub fn shutdown(mut self) {
        self.flush_saves();
        if let Err(err) = self.storage.save_request_state(&self.draft) {
            tracing::error!(%err, "state snapshot failed at shutdown");
        }
        self.engine.shutdown();
    }

    // ========================
    // Collections
    // ========================

    pub fn create_collection(&mut self, name: impl Into<String>) -> u64 {
        let id = self.next_id();
        let mut collection = Collection::new(id, name);
        collection.dirty = true;
        self.collections.push(collection);
        if self.active_collection.is_none() {
            self.active_collection = Some(id);
        }
        id
    }

    pub fn delete_collection(&mut self, id: u64) {
        self.collections.retain(|c| c.id != id);
        self.autosaver.forget(id);
        if self.active_collection == Some(id) {
            self.active_collection = self.collections.first().map(|c| c.id);
            self.active_request = None;
        }
        if let Err(err) = self.storage.delete_collection(id) {
            tracing::error!(id, %err, "could not delete collection");
        }
    }

    /// Switch the active request and replace the draft. Never dispatches.
    pub fn activate_request(&mut self, collection_id: u64, index: usize) -> bool {
        let Some(request) = self
            .collections
            .iter()
            .find(|c| c.id == collection_id)
            .and_then(|c| c.requests.get(index))
            .map(|s| s.request.clone())
        else {
            tracing::warn!(collection_id, index, "no such saved request");
            return false;
        };
        self.active_collection = Some(collection_id);
        self.active_request = Some(index);
        // from_request leaves the edit flag cleared
        self.draft = RequestDraft::from_request(&request);
        true
    }

    /// Append the frozen draft to the active collection under `name`
    pub fn save_draft_as(&mut self, name: impl Into<String>) {
        let request = self.draft.freeze();
        let Some(collection) = self.active_collection_mut() else {
            self.bus.publish(
                ErrorKind::General,
                Severity::Warning,
                "no active collection to save into",
            );
            return;
        };
        collection.requests.push(SavedRequest {
            name: name.into(),
            request,
        });
        let index = collection.requests.len() - 1;
        collection.touch();
        self.active_request = Some(index);
        self.draft.edited = false;
    }

    /// Write the draft back over the stored active request
    pub fn update_active_request(&mut self) {
        let Some(index) = self.active_request else {
            return;
        };
        let request = self.draft.freeze();
        if let Some(collection) = self.active_collection_mut() {
            if let Some(saved) = collection.requests.get_mut(index) {
                saved.request = request;
                collection.touch();
            }
        }
        self.draft.edited = false;
    }

    // ========================
    // Shell commands
    // ========================

    pub fn dismiss_dialog(&mut self) {
        self.dialogs = DialogState::default();
    }

    /// Handle a bound command; returns true when the shell should quit
    pub fn handle_command(&mut self, command: ShellCommand) -> bool {
        match command {
            ShellCommand::SendRequest => self.send(),
            ShellCommand::Save => {
                self.save_snapshot();
                self.flush_saves();
            }
            ShellCommand::Open => {
                self.dialogs.show_open = true;
                self.dialogs.selection = 0;
            }
            ShellCommand::DismissDialog => self.dismiss_dialog(),
            ShellCommand::Quit => return true,
        }
        false
    }
}

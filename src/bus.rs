//! Error bus - typed failure messages surfaced to the shell
//!
//! Each error kind owns one slot; publishing overwrites the slot and stamps
//! a display window. The status bar shows the most recently published
//! visible notice; tooltips only ever show validation errors.

use std::time::{Duration, Instant};

use crate::constants::DEFAULT_NOTICE_DURATION;

/// What broke
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Validation,
    Parsing,
    General,
}

const KINDS: usize = 4;

impl ErrorKind {
    fn slot(self) -> usize {
        match self {
            ErrorKind::Network => 0,
            ErrorKind::Validation => 1,
            ErrorKind::Parsing => 2,
            ErrorKind::General => 3,
        }
    }
}

/// How loudly to surface it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// A published message with its display window
#[derive(Clone, Debug)]
pub struct Notice {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    pub shown_at: Instant,
    pub duration: Duration,
}

impl Notice {
    pub fn is_visible(&self) -> bool {
        self.shown_at.elapsed() < self.duration
    }
}

#[derive(Debug, Default)]
pub struct ErrorBus {
    slots: [Option<Notice>; KINDS],
}

impl ErrorBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&mut self, kind: ErrorKind, severity: Severity, message: impl Into<String>) {
        self.publish_for(kind, severity, message, DEFAULT_NOTICE_DURATION);
    }

    pub fn publish_for(
        &mut self,
        kind: ErrorKind,
        severity: Severity,
        message: impl Into<String>,
        duration: Duration,
    ) {
        let message = message.into();
        tracing::debug!(?kind, ?severity, %message, "publishing notice");
        self.slots[kind.slot()] = Some(Notice {
            kind,
            severity,
            message,
            shown_at: Instant::now(),
            duration,
        });
    }

    /// Drop notices whose display window has elapsed. Called each frame.
    pub fn tick(&mut self) {
        for slot in &mut self.slots {
            if matches!(slot, Some(notice) if !notice.is_visible()) {
                *slot = None;
            }
        }
    }

    /// The notice currently shown in the status bar: most recent visible wins
    pub fn status_line(&self) -> Option<&Notice> {
        self.slots
            .iter()
            .flatten()
            .filter(|n| n.is_visible())
            .max_by_key(|n| n.shown_at)
    }

    /// Tooltip text, rendered for validation errors only
    pub fn validation_tooltip(&self) -> Option<&str> {
        self.current(ErrorKind::Validation)
            .map(|n| n.message.as_str())
    }

    pub fn current(&self, kind: ErrorKind) -> Option<&Notice> {
        self.slots[kind.slot()]
            .as_ref()
            .filter(|n| n.is_visible())
    }

    pub fn clear(&mut self, kind: ErrorKind) {
        self.slots[kind.slot()] = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_most_recent_visible_wins() {
        let mut bus = ErrorBus::new();
        bus.publish(ErrorKind::Network, Severity::Error, "connection failed");
        bus.publish(ErrorKind::Validation, Severity::Warning, "bad url");
        assert_eq!(bus.status_line().unwrap().message, "bad url");
    }

    #[test]
    fn test_tooltip_only_shows_validation() {
        let mut bus = ErrorBus::new();
        bus.publish(ErrorKind::Network, Severity::Error, "timeout");
        assert_eq!(bus.validation_tooltip(), None);
        bus.publish(ErrorKind::Validation, Severity::Error, "bad scheme");
        assert_eq!(bus.validation_tooltip(), Some("bad scheme"));
    }

    #[test]
    fn test_tick_expires_notices() {
        let mut bus = ErrorBus::new();
        bus.publish_for(
            ErrorKind::General,
            Severity::Info,
            "done",
            Duration::ZERO,
        );
        assert!(bus.status_line().is_none());
        bus.tick();
        assert!(bus.current(ErrorKind::General).is_none());
    }

    #[test]
    fn test_publish_replaces_slot() {
        let mut bus = ErrorBus::new();
        bus.publish(ErrorKind::Network, Severity::Error, "first");
        bus.publish(ErrorKind::Network, Severity::Info, "second");
        assert_eq!(bus.current(ErrorKind::Network).unwrap().message, "second");
    }
}

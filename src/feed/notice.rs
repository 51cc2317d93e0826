//! User-visible alerts raised by the pagination controller.
//!
//! Failures raise one notice each and expire after a fixed TTL. The stall
//! notice is advisory: at most one is active at a time and it is withdrawn as
//! soon as the fetch that caused it settles.

use std::time::Duration;

use tokio::time::Instant;

use super::errors::FailureClass;

/// Default lifetime of a notice before it is auto-dismissed.
pub const DEFAULT_NOTICE_TTL: Duration = Duration::from_secs(5);

pub const STALL_MESSAGE: &str = "This is taking longer than usual. Your network may be slow.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Failure(FailureClass),
    /// A page fetch has not settled within the advisory deadline.
    Stall,
}

impl NoticeKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Failure(class) => class.code(),
            Self::Stall => "stall_warning",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Failure(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub raised_at: Instant,
}

#[derive(Debug)]
pub struct NoticeBoard {
    ttl: Duration,
    notices: Vec<Notice>,
}

impl Default for NoticeBoard {
    fn default() -> Self {
        Self::new(DEFAULT_NOTICE_TTL)
    }
}

impl NoticeBoard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            notices: Vec::new(),
        }
    }

    pub fn raise_failure(&mut self, class: FailureClass, now: Instant) {
        self.notices.push(Notice {
            kind: NoticeKind::Failure(class),
            message: format!("{} {}", class.message(), class.suggestion()),
            raised_at: now,
        });
    }

    /// Returns false when a stall notice is already showing.
    pub fn raise_stall(&mut self, now: Instant) -> bool {
        if self.has_stall() {
            return false;
        }
        self.notices.push(Notice {
            kind: NoticeKind::Stall,
            message: STALL_MESSAGE.to_string(),
            raised_at: now,
        });
        true
    }

    pub fn clear_stall(&mut self) {
        self.notices.retain(|n| n.kind != NoticeKind::Stall);
    }

    pub fn has_stall(&self) -> bool {
        self.notices.iter().any(|n| n.kind == NoticeKind::Stall)
    }

    /// Drop expired notices and return the rest, oldest first.
    ///
    /// A stall notice does not expire on its own; it lasts until the fetch settles.
    pub fn active(&mut self, now: Instant) -> &[Notice] {
        let ttl = self.ttl;
        self.notices.retain(|n| {
            n.kind == NoticeKind::Stall || now.saturating_duration_since(n.raised_at) < ttl
        });
        &self.notices
    }

    pub fn clear(&mut self) {
        self.notices.clear();
    }

    pub fn len(&self) -> usize {
        self.notices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }
}

//! Failure classification and per-item render isolation.
//!
//! Fetch failures are sorted into two kinds. Transient failures (network,
//! timeout, 5xx) offer a manual retry; terminal failures (validation, not
//! found, undecodable responses) show a fixed message and are never retried.
//! Where a failure surfaces depends on which page failed: the first page of
//! a filter takes over the whole feed, a later page only replaces the
//! load-more row.
//!
//! Render failures are isolated per item: a malformed item becomes a
//! placeholder slot and its siblings render normally.

use crate::source::SourceError;
use std::fmt;
use thiserror::Error;

/// Message shown for every terminal failure.
pub const TERMINAL_MESSAGE: &str = "This feed could not be loaded.";

/// Message shown for transient failures alongside the retry affordance.
pub const TRANSIENT_MESSAGE: &str = "Couldn't reach the server. Press r to try again.";

// ============================================================================
// Fetch Failures
// ============================================================================

/// Classification of a failed page fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network or timeout failure. Manual retry only.
    Transient,
    /// Validation or not-found failure. Not retryable.
    Terminal,
}

impl ErrorKind {
    pub fn classify(error: &SourceError) -> Self {
        match error {
            SourceError::Network(_)
            | SourceError::Timeout
            | SourceError::Server { .. }
            | SourceError::Unavailable(_) => Self::Transient,
            SourceError::Validation(_) | SourceError::NotFound | SourceError::Decode(_) => {
                Self::Terminal
            }
        }
    }

    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Fixed user-facing message for this kind.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::Transient => TRANSIENT_MESSAGE,
            Self::Terminal => TERMINAL_MESSAGE,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => f.write_str("transient"),
            Self::Terminal => f.write_str("terminal"),
        }
    }
}

/// Which request of the current filter failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    /// Page 0, issued by a reset
    First,
    /// A subsequent page, issued by load-more
    Next,
}

/// Where a failure is shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// The whole feed shows an error state.
    Feed,
    /// Only the load-more row shows the error; loaded items stay visible.
    LoadMore,
}

/// A classified fetch failure, as stored in the feed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedError {
    pub kind: ErrorKind,
    pub phase: LoadPhase,
    /// Underlying error text, for logs and the status bar.
    pub detail: String,
}

impl FeedError {
    pub fn new(source: &SourceError, phase: LoadPhase) -> Self {
        Self {
            kind: ErrorKind::classify(source),
            phase,
            detail: source.to_string(),
        }
    }

    pub fn surface(&self) -> Surface {
        match self.phase {
            LoadPhase::First => Surface::Feed,
            LoadPhase::Next => Surface::LoadMore,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }
}

// ============================================================================
// Render Isolation
// ============================================================================

/// Failure to build one item's renderable representation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("item {id:?} is malformed: {reason}")]
    Malformed { id: String, reason: &'static str },
}

/// Outcome of rendering one slot of the window.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot<R> {
    Rendered(R),
    /// The item failed to render; draw a placeholder in its place.
    Placeholder { reason: String },
}

impl<R> Slot<R> {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder { .. })
    }
}

/// Build one item, substituting a placeholder if construction fails.
///
/// The failure is logged and contained to this slot.
pub fn render_isolated<T, R, E, F>(index: usize, item: &T, render: F) -> Slot<R>
where
    E: fmt::Display,
    F: FnOnce(&T) -> Result<R, E>,
{
    match render(item) {
        Ok(rendered) => Slot::Rendered(rendered),
        Err(e) => {
            tracing::warn!(index, error = %e, "Item render failed, showing placeholder");
            Slot::Placeholder {
                reason: e.to_string(),
            }
        }
    }
}

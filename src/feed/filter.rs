//! Debounced filter input.
//!
//! Raw field edits (search text, category, sort) arrive as the user types.
//! [`FilterController`] records the latest draft and only turns it into an
//! effective [`FilterCriteria`] once input has been quiet for the debounce
//! window. A criteria equal to the last emitted one is swallowed so a quiet
//! tick never restarts identical work.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Quiet period that ends a burst of filter edits.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(300);

// ============================================================================
// Filter Criteria
// ============================================================================

/// Sort order requested from the data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Newest,
    Oldest,
    Title,
}

impl SortKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Newest => "newest",
            Self::Oldest => "oldest",
            Self::Title => "title",
        }
    }

    /// Parse a sort key name (case-insensitive).
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "newest" => Some(Self::Newest),
            "oldest" => Some(Self::Oldest),
            "title" => Some(Self::Title),
            _ => None,
        }
    }

    /// Cycle: newest -> oldest -> title -> newest.
    pub fn next(self) -> Self {
        match self {
            Self::Newest => Self::Oldest,
            Self::Oldest => Self::Title,
            Self::Title => Self::Newest,
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effective filter applied to the feed. Immutable value, structural equality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FilterCriteria {
    pub category_id: Option<String>,
    pub search_text: Option<String>,
    pub sort_key: Option<SortKey>,
}

impl FilterCriteria {
    /// Build criteria, dropping empty category ids and blank search text.
    ///
    /// Newest is the default order, so `Some(SortKey::Newest)` is stored as
    /// `None` and both spellings compare equal.
    pub fn new(
        category_id: Option<String>,
        search_text: Option<String>,
        sort_key: Option<SortKey>,
    ) -> Self {
        Self {
            category_id: category_id.filter(|c| !c.is_empty()),
            search_text: search_text.filter(|s| !s.trim().is_empty()),
            sort_key: sort_key.filter(|k| *k != SortKey::Newest),
        }
    }

    pub fn for_category(category_id: impl Into<String>) -> Self {
        Self::new(Some(category_id.into()), None, None)
    }
}

// ============================================================================
// Filter Controller
// ============================================================================

/// Coalesces raw filter edits into debounced, deduplicated criteria.
///
/// The controller is driven from the UI loop: edits call the `set_*`
/// methods, and every loop tick calls [`tick`](Self::tick). Time is read
/// from `tokio::time::Instant` so tests can pause and advance the clock.
#[derive(Debug)]
pub struct FilterController {
    /// Category the feed is scoped to when no explicit selection is made.
    base_category: Option<String>,
    search_text: String,
    selected_category: Option<String>,
    sort_key: Option<SortKey>,
    last_input: Option<Instant>,
    quiet_period: Duration,
    emitted: FilterCriteria,
}

impl FilterController {
    /// Create a controller whose initial criteria counts as already emitted.
    pub fn new(initial: FilterCriteria, quiet_period: Duration) -> Self {
        Self {
            base_category: initial.category_id.clone(),
            search_text: initial.search_text.clone().unwrap_or_default(),
            selected_category: None,
            sort_key: initial.sort_key,
            last_input: None,
            quiet_period,
            emitted: initial,
        }
    }

    pub fn set_search_text(&mut self, text: impl Into<String>) {
        self.search_text = text.into();
        self.touch();
    }

    /// Select a category. `None` falls back to the base category.
    pub fn set_category(&mut self, category_id: Option<String>) {
        self.selected_category = category_id;
        self.touch();
    }

    pub fn set_sort_key(&mut self, sort_key: Option<SortKey>) {
        self.sort_key = sort_key;
        self.touch();
    }

    fn touch(&mut self) {
        self.last_input = Some(Instant::now());
    }

    /// Criteria described by the current, possibly unsettled, input.
    pub fn draft(&self) -> FilterCriteria {
        let category = self
            .selected_category
            .clone()
            .filter(|c| !c.is_empty())
            .or_else(|| self.base_category.clone());
        FilterCriteria::new(category, Some(self.search_text.clone()), self.sort_key)
    }

    /// Emit the draft if the quiet period has elapsed and it differs from
    /// the previously emitted criteria.
    pub fn tick(&mut self) -> Option<FilterCriteria> {
        let last_input = self.last_input?;
        if last_input.elapsed() < self.quiet_period {
            return None;
        }
        self.last_input = None;
        self.accept()
    }

    /// Emit the draft immediately, skipping the rest of the quiet period.
    pub fn flush(&mut self) -> Option<FilterCriteria> {
        self.last_input = None;
        self.accept()
    }

    fn accept(&mut self) -> Option<FilterCriteria> {
        let next = self.draft();
        if next == self.emitted {
            tracing::debug!(filter = ?next, "Filter settled unchanged, not emitting");
            return None;
        }
        tracing::debug!(filter = ?next, "Filter changed");
        self.emitted = next.clone();
        Some(next)
    }

    /// Last emitted (effective) criteria.
    pub fn current(&self) -> &FilterCriteria {
        &self.emitted
    }

    /// True while edits are waiting for the quiet period to end.
    pub fn is_pending(&self) -> bool {
        self.last_input.is_some()
    }

    pub fn search_text(&self) -> &str {
        &self.search_text
    }

    pub fn selected_category(&self) -> Option<&str> {
        self.selected_category.as_deref()
    }

    pub fn base_category(&self) -> Option<&str> {
        self.base_category.as_deref()
    }

    pub fn sort_key(&self) -> Option<SortKey> {
        self.sort_key
    }
}

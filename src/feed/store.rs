//! Pagination state for one feed instance.
//!
//! [`FeedStore`] owns the cursor, the accumulated item list and the loading
//! flags. It never performs I/O itself: `reset`, `load_next_page` and
//! `retry` hand back a [`PageRequest`] describing the fetch to issue, and
//! [`FeedStore::complete`] applies the result when it arrives.
//!
//! Every request is tagged with the `filter_version` active when it was
//! issued. A completion whose version no longer matches is discarded, which
//! is the only cancellation mechanism the store relies on.

use super::filter::FilterCriteria;
use super::recovery::{FeedError, LoadPhase};
use crate::source::{Page, SourceError};
use std::collections::HashSet;

/// Page size used when none is configured.
pub const DEFAULT_PAGE_SIZE: usize = 12;

/// Anything the store can accumulate. `item_id` must be unique per item.
pub trait FeedItem {
    fn item_id(&self) -> &str;
}

// ============================================================================
// Requests and Outcomes
// ============================================================================

/// A page fetch the caller must execute and report back via `complete`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub version: u64,
    pub filter: FilterCriteria,
    pub offset: usize,
    pub limit: usize,
    pub phase: LoadPhase,
}

/// Result of asking the store for the next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A new fetch must be issued.
    Issued(PageRequest),
    /// A fetch is already running; this is it. Nothing new to issue.
    InFlight(PageRequest),
    /// Nothing to fetch.
    Skipped(SkipReason),
}

impl Dispatch {
    /// The request to execute, if this dispatch issued one.
    pub fn issued(self) -> Option<PageRequest> {
        match self {
            Self::Issued(request) => Some(request),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The last page came back short.
    Exhausted,
    /// The last fetch failed; only an explicit retry may fetch again.
    AwaitingRetry,
}

/// What applying a completion did to the state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Appended { added: usize, duplicates: usize },
    Failed(FeedError),
    /// Completion belonged to a superseded request and was dropped.
    Stale,
}

// ============================================================================
// Feed State
// ============================================================================

/// Observable state of the feed.
///
/// `items` holds unique ids in fetch order. `has_more` is false exactly when
/// the most recent page came back shorter than the page size.
#[derive(Debug, Clone)]
pub struct FeedState<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    pub is_loading: bool,
    pub is_fetching_more: bool,
    pub filter_version: u64,
    pub last_error: Option<FeedError>,
}

impl<T> Default for FeedState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            has_more: false,
            is_loading: false,
            is_fetching_more: false,
            filter_version: 0,
            last_error: None,
        }
    }
}

impl<T> FeedState<T> {
    pub fn is_busy(&self) -> bool {
        self.is_loading || self.is_fetching_more
    }

    /// True when a scroll-triggered load could start right now.
    pub fn can_load_more(&self) -> bool {
        self.has_more && !self.is_busy()
    }
}

// ============================================================================
// Feed Store
// ============================================================================

/// Single-owner pagination store. At most one fetch is live at a time.
#[derive(Debug)]
pub struct FeedStore<T> {
    state: FeedState<T>,
    filter: FilterCriteria,
    page_size: usize,
    seen: HashSet<String>,
    in_flight: Option<PageRequest>,
    failed: Option<PageRequest>,
}

impl<T: FeedItem> FeedStore<T> {
    pub fn new(page_size: usize) -> Self {
        Self {
            state: FeedState::default(),
            filter: FilterCriteria::default(),
            page_size: page_size.max(1),
            seen: HashSet::new(),
            in_flight: None,
            failed: None,
        }
    }

    pub fn state(&self) -> &FeedState<T> {
        &self.state
    }

    pub fn items(&self) -> &[T] {
        &self.state.items
    }

    pub fn filter(&self) -> &FilterCriteria {
        &self.filter
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn in_flight(&self) -> Option<&PageRequest> {
        self.in_flight.as_ref()
    }

    /// Start over with a new filter.
    ///
    /// The state is replaced wholesale before the page-0 request is built,
    /// so the caller observes an empty feed with `has_more` set before any
    /// fetch for the new filter exists. A fetch still running for the old
    /// filter is superseded by the version bump.
    pub fn reset(&mut self, filter: FilterCriteria) -> PageRequest {
        let version = self.state.filter_version.wrapping_add(1);
        if let Some(previous) = self.in_flight.take() {
            tracing::debug!(
                superseded = previous.version,
                version,
                "Reset while a fetch is in flight"
            );
        }

        self.state = FeedState {
            items: Vec::new(),
            has_more: true,
            is_loading: true,
            is_fetching_more: false,
            filter_version: version,
            last_error: None,
        };
        self.seen.clear();
        self.failed = None;
        self.filter = filter;

        let request = PageRequest {
            version,
            filter: self.filter.clone(),
            offset: 0,
            limit: self.page_size,
            phase: LoadPhase::First,
        };
        tracing::debug!(version, filter = ?request.filter, "Feed reset");
        self.in_flight = Some(request.clone());
        request
    }

    /// Ask for the next page.
    ///
    /// Collapses to [`Dispatch::InFlight`] while anything is loading, so a
    /// burst of calls issues exactly one fetch.
    pub fn load_next_page(&mut self) -> Dispatch {
        if let Some(request) = &self.in_flight {
            return Dispatch::InFlight(request.clone());
        }
        if self.state.last_error.is_some() {
            return Dispatch::Skipped(SkipReason::AwaitingRetry);
        }
        if !self.state.has_more {
            return Dispatch::Skipped(SkipReason::Exhausted);
        }

        self.state.is_fetching_more = true;
        let request = PageRequest {
            version: self.state.filter_version,
            filter: self.filter.clone(),
            offset: self.state.items.len(),
            limit: self.page_size,
            phase: LoadPhase::Next,
        };
        tracing::debug!(
            version = request.version,
            offset = request.offset,
            "Issuing next page"
        );
        self.in_flight = Some(request.clone());
        Dispatch::Issued(request)
    }

    /// Apply the result of a previously issued request.
    pub fn complete(
        &mut self,
        request: &PageRequest,
        result: Result<Page<T>, SourceError>,
    ) -> PageOutcome {
        if request.version != self.state.filter_version {
            tracing::debug!(
                expected = self.state.filter_version,
                got = request.version,
                offset = request.offset,
                "Ignoring stale page (version mismatch)"
            );
            return PageOutcome::Stale;
        }
        if self.in_flight.as_ref() != Some(request) {
            tracing::debug!(offset = request.offset, "Ignoring completion for a request not in flight");
            return PageOutcome::Stale;
        }

        self.in_flight = None;
        self.state.is_loading = false;
        self.state.is_fetching_more = false;

        match result {
            Ok(page) => {
                let returned = page.items.len();
                let mut added = 0;
                for item in page.items {
                    if self.seen.insert(item.item_id().to_string()) {
                        self.state.items.push(item);
                        added += 1;
                    }
                }
                let duplicates = returned - added;
                self.state.has_more = returned >= request.limit;
                self.state.last_error = None;
                tracing::debug!(
                    version = request.version,
                    offset = request.offset,
                    returned,
                    added,
                    duplicates,
                    has_more = self.state.has_more,
                    "Page applied"
                );
                PageOutcome::Appended { added, duplicates }
            }
            Err(e) => {
                let error = FeedError::new(&e, request.phase);
                tracing::warn!(
                    version = request.version,
                    offset = request.offset,
                    kind = %error.kind,
                    error = %e,
                    "Page fetch failed"
                );
                self.state.last_error = Some(error.clone());
                self.failed = Some(request.clone());
                PageOutcome::Failed(error)
            }
        }
    }

    /// Re-issue the exact request that failed.
    ///
    /// Returns `None` when nothing failed, a fetch is running, or the
    /// failure was terminal.
    pub fn retry(&mut self) -> Option<PageRequest> {
        if self.in_flight.is_some() {
            return None;
        }
        let error = self.state.last_error.as_ref()?;
        if !error.is_retryable() {
            tracing::debug!(kind = %error.kind, "Refusing to retry terminal failure");
            return None;
        }
        let request = self.failed.take()?;

        self.state.last_error = None;
        match request.phase {
            LoadPhase::First => self.state.is_loading = true,
            LoadPhase::Next => self.state.is_fetching_more = true,
        }
        tracing::debug!(
            version = request.version,
            offset = request.offset,
            "Retrying failed page"
        );
        self.in_flight = Some(request.clone());
        Some(request)
    }
}

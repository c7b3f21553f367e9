//! Scroll-driven load-more.
//!
//! A one-row sentinel sits right after the last item while more pages
//! exist. [`ScrollTrigger`] checks the sentinel against the viewport
//! (expanded by `root_margin` rows of lookahead) on every scroll, resize or
//! render. When enough of the sentinel is inside, it asks the store for the
//! next page once, then stays latched until that load settles.
//!
//! Observers are registered with an [`ObserverRegistry`] through an RAII
//! handle, so unmounting (or dropping the trigger) always releases them.

use super::store::{Dispatch, FeedItem, FeedStore, PageRequest};
use super::window::ViewportWindow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Fraction of the sentinel that must be inside the root to fire.
pub const DEFAULT_THRESHOLD: f32 = 0.1;

/// Rows of lookahead beyond the bottom of the viewport.
pub const DEFAULT_ROOT_MARGIN: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerOptions {
    pub threshold: f32,
    pub root_margin: u32,
}

impl Default for TriggerOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            root_margin: DEFAULT_ROOT_MARGIN,
        }
    }
}

/// Position of the sentinel in list coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sentinel {
    pub top: u64,
    pub height: u32,
}

/// Fraction of `sentinel` inside the viewport expanded by `root_margin` on
/// both edges, or `None` when they don't touch.
///
/// A zero-height sentinel counts as fully visible when it lies on or inside
/// the root's edges.
pub fn intersection_ratio(
    sentinel: Sentinel,
    viewport: &ViewportWindow,
    root_margin: u32,
) -> Option<f32> {
    let margin = u64::from(root_margin);
    let root_top = viewport.scroll_offset.saturating_sub(margin);
    let root_bottom = viewport
        .scroll_offset
        .saturating_add(u64::from(viewport.container_height))
        .saturating_add(margin);

    let top = sentinel.top;
    let bottom = sentinel.top.saturating_add(u64::from(sentinel.height));

    if sentinel.height == 0 {
        return (root_top..=root_bottom).contains(&top).then_some(1.0);
    }

    let overlap_top = top.max(root_top);
    let overlap_bottom = bottom.min(root_bottom);
    if overlap_bottom <= overlap_top {
        return None;
    }
    Some((overlap_bottom - overlap_top) as f32 / sentinel.height as f32)
}

// ============================================================================
// Observer Registry
// ============================================================================

/// Tracks live sentinel observers.
#[derive(Debug, Clone, Default)]
pub struct ObserverRegistry {
    active: Arc<AtomicUsize>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self) -> ObserverHandle {
        let now = self.active.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        tracing::trace!(active = now, "Sentinel observer registered");
        ObserverHandle {
            active: Arc::clone(&self.active),
        }
    }

    /// Number of observers currently registered.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }
}

/// Registration of one observer. Dropping it unregisters.
#[derive(Debug)]
pub struct ObserverHandle {
    active: Arc<AtomicUsize>,
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        tracing::trace!("Sentinel observer released");
    }
}

// ============================================================================
// Scroll Trigger
// ============================================================================

#[derive(Debug)]
pub struct ScrollTrigger {
    options: TriggerOptions,
    handle: Option<ObserverHandle>,
    /// Set when this trigger issued a load that has not settled yet.
    is_fetching: bool,
}

impl ScrollTrigger {
    pub fn new(options: TriggerOptions) -> Self {
        Self {
            options,
            handle: None,
            is_fetching: false,
        }
    }

    pub fn options(&self) -> &TriggerOptions {
        &self.options
    }

    /// Start observing. Mounting an already mounted trigger replaces its
    /// registration.
    pub fn mount(&mut self, registry: &ObserverRegistry) {
        self.unmount();
        self.handle = Some(registry.observe());
    }

    pub fn unmount(&mut self) {
        self.handle = None;
        self.is_fetching = false;
    }

    pub fn is_mounted(&self) -> bool {
        self.handle.is_some()
    }

    pub fn is_fetching(&self) -> bool {
        self.is_fetching
    }

    /// Evaluate the sentinel against the viewport and load the next page if
    /// it is in range.
    ///
    /// Returns the request to execute when one was issued.
    pub fn check<T: FeedItem>(
        &mut self,
        sentinel: Option<Sentinel>,
        viewport: &ViewportWindow,
        store: &mut FeedStore<T>,
    ) -> Option<PageRequest> {
        if !self.is_mounted() || self.is_fetching {
            return None;
        }
        let sentinel = sentinel?;
        let ratio = intersection_ratio(sentinel, viewport, self.options.root_margin)?;
        if ratio < self.options.threshold {
            return None;
        }
        if !store.state().can_load_more() {
            return None;
        }

        match store.load_next_page() {
            Dispatch::Issued(request) => {
                tracing::debug!(
                    offset = request.offset,
                    ratio,
                    "Sentinel in range, loading next page"
                );
                self.is_fetching = true;
                Some(request)
            }
            Dispatch::InFlight(_) | Dispatch::Skipped(_) => None,
        }
    }

    /// Release the latch once the load this trigger issued has settled
    /// (applied, failed, discarded, or superseded by a reset).
    pub fn settle(&mut self) {
        self.is_fetching = false;
    }
}

impl Default for ScrollTrigger {
    fn default() -> Self {
        Self::new(TriggerOptions::default())
    }
}

//! Windowed rendering of the feed.
//!
//! Only the items intersecting the viewport (plus `overscan` on each side)
//! are built. Positions are computed from the fixed item height instead of
//! being measured, so the cost of a frame depends on the window size and
//! not on how many items the feed holds.
//!
//! All distances are in rows.

use super::recovery::{render_isolated, Slot};
use std::fmt;

/// Overscan used when none is configured.
pub const DEFAULT_OVERSCAN: usize = 2;

/// Inclusive index range of the items to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleRange {
    pub start_index: usize,
    pub end_index: usize,
}

impl VisibleRange {
    /// Number of items in the range.
    pub fn count(&self) -> usize {
        self.end_index - self.start_index + 1
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.start_index..=self.end_index).contains(&index)
    }
}

/// Geometry of the scroll surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportWindow {
    pub scroll_offset: u64,
    pub container_height: u32,
    pub item_height: u32,
    pub overscan: usize,
}

impl ViewportWindow {
    pub fn new(item_height: u32, overscan: usize) -> Self {
        Self {
            scroll_offset: 0,
            container_height: 0,
            item_height,
            overscan,
        }
    }

    /// Items to build for a list of `count` items.
    ///
    /// ```text
    /// start = clamp(floor(S / H) - O, 0, N - 1)
    /// end   = clamp(ceil((S + C) / H) + O, 0, N - 1)
    /// ```
    ///
    /// `None` for an empty list or a zero item height.
    pub fn visible_range(&self, count: usize) -> Option<VisibleRange> {
        if count == 0 || self.item_height == 0 {
            return None;
        }
        let height = u64::from(self.item_height);
        let last = count - 1;

        let first_visible = self.scroll_offset / height;
        let bottom = self
            .scroll_offset
            .saturating_add(u64::from(self.container_height));
        let past_visible = bottom.div_ceil(height);

        let overscan = self.overscan as u64;
        let start = clamp_index(first_visible.saturating_sub(overscan), last);
        let end = clamp_index(past_visible.saturating_add(overscan), last);

        Some(VisibleRange {
            start_index: start,
            end_index: end.max(start),
        })
    }

    /// Absolute offset of the item at `index`.
    pub fn offset_of(&self, index: usize) -> u64 {
        (index as u64).saturating_mul(u64::from(self.item_height))
    }

    /// Total scrollable extent of `count` items.
    pub fn total_extent(&self, count: usize) -> u64 {
        self.offset_of(count)
    }

    /// Largest scroll offset that still fills the container.
    pub fn max_scroll_offset(&self, extent: u64) -> u64 {
        extent.saturating_sub(u64::from(self.container_height))
    }

    /// Scroll the minimum distance needed to bring `index` fully into view.
    pub fn scroll_into_view(&mut self, index: usize) {
        let top = self.offset_of(index);
        let bottom = top.saturating_add(u64::from(self.item_height));
        let view_bottom = self
            .scroll_offset
            .saturating_add(u64::from(self.container_height));

        if top < self.scroll_offset {
            self.scroll_offset = top;
        } else if bottom > view_bottom {
            self.scroll_offset = bottom.saturating_sub(u64::from(self.container_height));
        }
    }
}

/// Clamp an index computed in `u64` to `[0, last]`.
fn clamp_index(index: u64, last: usize) -> usize {
    usize::try_from(index).map_or(last, |i| i.min(last))
}

// ============================================================================
// Window Renderer
// ============================================================================

/// Placement handed to the item builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemPosition {
    pub index: usize,
    /// Absolute offset from the top of the list.
    pub top: u64,
    pub height: u32,
}

/// One built item of the window.
#[derive(Debug, Clone, PartialEq)]
pub struct Positioned<R> {
    pub position: ItemPosition,
    pub slot: Slot<R>,
}

/// Output of one render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedWindow<R> {
    pub range: Option<VisibleRange>,
    pub range_changed: bool,
    pub total_extent: u64,
    pub items: Vec<Positioned<R>>,
}

type RangeListener = Box<dyn FnMut(Option<VisibleRange>) + Send>;

/// Builds only the visible slice of a list.
pub struct WindowRenderer {
    window: ViewportWindow,
    last_range: Option<VisibleRange>,
    on_range_change: Option<RangeListener>,
}

impl fmt::Debug for WindowRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowRenderer")
            .field("window", &self.window)
            .field("last_range", &self.last_range)
            .finish_non_exhaustive()
    }
}

impl WindowRenderer {
    pub fn new(window: ViewportWindow) -> Self {
        Self {
            window,
            last_range: None,
            on_range_change: None,
        }
    }

    pub fn window(&self) -> &ViewportWindow {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut ViewportWindow {
        &mut self.window
    }

    pub fn last_range(&self) -> Option<VisibleRange> {
        self.last_range
    }

    /// Called whenever a render pass produces a different range.
    pub fn set_on_range_change(&mut self, f: impl FnMut(Option<VisibleRange>) + Send + 'static) {
        self.on_range_change = Some(Box::new(f));
    }

    pub fn set_container_height(&mut self, height: u32) {
        self.window.container_height = height;
    }

    /// Set the scroll offset, clamped so the container stays within `extent`.
    pub fn set_scroll_offset(&mut self, offset: u64, extent: u64) {
        self.window.scroll_offset = offset.min(self.window.max_scroll_offset(extent));
    }

    pub fn scroll_by(&mut self, delta: i64, extent: u64) {
        let target = if delta.is_negative() {
            self.window.scroll_offset.saturating_sub(delta.unsigned_abs())
        } else {
            self.window.scroll_offset.saturating_add(delta.unsigned_abs())
        };
        self.set_scroll_offset(target, extent);
    }

    /// Build the items in the current window.
    ///
    /// Each item goes through `render_item`; an `Err` becomes a placeholder
    /// for that slot only.
    pub fn render<T, R, E, F>(&mut self, items: &[T], mut render_item: F) -> RenderedWindow<R>
    where
        E: fmt::Display,
        F: FnMut(&T, ItemPosition) -> Result<R, E>,
    {
        let range = self.window.visible_range(items.len());
        let range_changed = range != self.last_range;
        if range_changed {
            tracing::trace!(?range, count = items.len(), "Visible range changed");
            self.last_range = range;
            if let Some(listener) = self.on_range_change.as_mut() {
                listener(range);
            }
        }

        let built = match range {
            Some(range) => (range.start_index..=range.end_index)
                .map(|index| {
                    let position = ItemPosition {
                        index,
                        top: self.window.offset_of(index),
                        height: self.window.item_height,
                    };
                    let slot = render_isolated(index, &items[index], |item| {
                        render_item(item, position)
                    });
                    Positioned { position, slot }
                })
                .collect(),
            None => Vec::new(),
        };

        RenderedWindow {
            range,
            range_changed,
            total_extent: self.window.total_extent(items.len()),
            items: built,
        }
    }
}

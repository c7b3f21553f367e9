//! Incremental feed loading and windowed rendering.
//!
//! The feed core is split along the lifecycle of a list query:
//!
//! - [`filter`] - debounces raw filter edits into effective criteria
//! - [`store`] - pagination state, deduplication and stale rejection
//! - [`trigger`] - sentinel observation that requests the next page
//! - [`window`] - computes and builds only the visible slice of the list
//! - [`recovery`] - failure classification and per-item render isolation
//! - [`loader`] - runs page requests on background tasks
//!
//! Everything except the loader is synchronous and free of I/O, so the
//! whole state machine can be driven directly from tests.
//!
//! # Example
//!
//! ```ignore
//! use postfeed::feed::{FeedStore, FilterCriteria};
//!
//! let mut store = FeedStore::new(12);
//! let request = store.reset(FilterCriteria::for_category("C1"));
//! let page = source.fetch_page(&request.filter, request.offset, request.limit).await;
//! store.complete(&request, page);
//! ```

pub mod filter;
pub mod loader;
pub mod recovery;
pub mod store;
pub mod trigger;
pub mod window;

pub use filter::{FilterController, FilterCriteria, SortKey, DEFAULT_QUIET_PERIOD};
pub use loader::{spawn_category_load, FeedLoader, LoadEvent};
pub use recovery::{
    render_isolated, ErrorKind, FeedError, LoadPhase, RenderError, Slot, Surface,
};
pub use store::{
    Dispatch, FeedItem, FeedState, FeedStore, PageOutcome, PageRequest, SkipReason,
    DEFAULT_PAGE_SIZE,
};
pub use trigger::{ObserverRegistry, ScrollTrigger, Sentinel, TriggerOptions};
pub use window::{
    ItemPosition, Positioned, RenderedWindow, ViewportWindow, VisibleRange, WindowRenderer,
    DEFAULT_OVERSCAN,
};

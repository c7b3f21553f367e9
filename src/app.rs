//! Application state for the post browser.
//!
//! [`App`] wires the feed core together: filter edits flow through the
//! [`FilterController`], settled criteria reset the [`FeedStore`], and page
//! requests are executed by the [`FeedLoader`]. Completions come back as
//! [`AppEvent`]s on the UI loop's channel and are applied here.

use crate::config::Config;
use crate::feed::{
    FeedLoader, FeedStore, FilterController, FilterCriteria, LoadEvent, LoadPhase,
    ObserverRegistry, PageOutcome, PageRequest, ScrollTrigger, Sentinel, SortKey, Surface,
    TriggerOptions, ViewportWindow, WindowRenderer,
};
use crate::source::{Category, Page, Post, SourceError};
use crate::util::MAX_SEARCH_LENGTH;
use std::borrow::Cow;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// How long a status message stays visible.
const STATUS_TTL: Duration = Duration::from_secs(3);

/// Label of the option that clears the category selection.
pub const ALL_CATEGORIES: &str = "All categories";

// ============================================================================
// Events
// ============================================================================

/// Completions delivered to the UI loop by background tasks.
#[derive(Debug)]
pub enum AppEvent {
    /// A page fetch finished. Applied only if `request` is still current.
    PageLoaded {
        request: PageRequest,
        result: Result<Page<Post>, SourceError>,
    },
    /// The category directory finished loading.
    CategoriesLoaded(Result<Vec<Category>, SourceError>),
}

impl From<LoadEvent> for AppEvent {
    fn from(event: LoadEvent) -> Self {
        match event {
            LoadEvent::PageLoaded { request, result } => Self::PageLoaded { request, result },
            LoadEvent::CategoriesLoaded(result) => Self::CategoriesLoaded(result),
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Feed tuning resolved from the config file and command line.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub page_size: usize,
    pub quiet_period: Duration,
    pub item_height: u32,
    pub overscan: usize,
    pub trigger: TriggerOptions,
    pub site_url: Option<String>,
}

impl FeedSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_size: config.page_size,
            quiet_period: Duration::from_millis(config.debounce_ms),
            item_height: u32::from(config.item_height),
            overscan: config.overscan,
            trigger: TriggerOptions {
                threshold: config.threshold,
                root_margin: config.root_margin,
            },
            site_url: config.site_url.clone(),
        }
    }
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// One entry of the category selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryOption {
    pub id: Option<String>,
    pub label: String,
}

// ============================================================================
// App
// ============================================================================

pub struct App {
    pub store: FeedStore<Post>,
    pub filter: FilterController,
    pub trigger: ScrollTrigger,
    observers: ObserverRegistry,
    pub renderer: WindowRenderer,
    loader: FeedLoader,

    pub categories: Vec<Category>,
    category_cursor: usize,

    /// Keystrokes go to the search field.
    pub search_mode: bool,
    /// Index of the selected post.
    pub selected: usize,

    pub status_message: Option<(Cow<'static, str>, Instant)>,
    pub needs_redraw: bool,
    pub spinner_tick: usize,
    site_url: Option<String>,
}

impl App {
    pub fn new(settings: FeedSettings, initial: FilterCriteria, loader: FeedLoader) -> Self {
        Self {
            store: FeedStore::new(settings.page_size),
            filter: FilterController::new(initial, settings.quiet_period),
            trigger: ScrollTrigger::new(settings.trigger),
            observers: ObserverRegistry::new(),
            renderer: WindowRenderer::new(ViewportWindow::new(
                settings.item_height,
                settings.overscan,
            )),
            loader,
            categories: Vec::new(),
            category_cursor: 0,
            search_mode: false,
            selected: 0,
            status_message: None,
            needs_redraw: true,
            spinner_tick: 0,
            site_url: settings.site_url,
        }
    }

    pub fn source_name(&self) -> &str {
        self.loader.source_name()
    }

    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    /// Mount the scroll trigger and load the first page of the initial filter.
    pub fn start(&mut self, tx: &mpsc::Sender<AppEvent>) {
        self.trigger.mount(&self.observers);
        let criteria = self.filter.current().clone();
        self.reset_feed(criteria, tx);
    }

    /// Unmount the trigger and abort any running fetch.
    pub fn shutdown(&mut self) {
        self.trigger.unmount();
        self.loader.cancel();
    }

    fn reset_feed(&mut self, criteria: FilterCriteria, tx: &mpsc::Sender<AppEvent>) {
        tracing::info!(filter = ?criteria, "Loading feed");
        self.trigger.settle();
        self.selected = 0;
        self.renderer.set_scroll_offset(0, 0);
        let request = self.store.reset(criteria);
        self.loader.spawn(request, tx);
        self.needs_redraw = true;
    }

    // ========================================================================
    // Loop Hooks
    // ========================================================================

    /// Periodic work: debounce expiry, spinner animation, status expiry.
    pub fn on_tick(&mut self, tx: &mpsc::Sender<AppEvent>) {
        if self.store.state().is_busy() {
            self.spinner_tick = self.spinner_tick.wrapping_add(1);
            self.needs_redraw = true;
        }
        if let Some(criteria) = self.filter.tick() {
            self.reset_feed(criteria, tx);
        }
        if self.clear_expired_status() {
            self.needs_redraw = true;
        }
    }

    pub fn handle_event(&mut self, event: AppEvent, tx: &mpsc::Sender<AppEvent>) {
        match event {
            AppEvent::PageLoaded { request, result } => {
                let outcome = self.store.complete(&request, result);
                match &outcome {
                    PageOutcome::Stale => return,
                    PageOutcome::Appended { duplicates, .. } if *duplicates > 0 => {
                        tracing::debug!(duplicates, "Dropped posts already in the feed");
                    }
                    PageOutcome::Appended { .. } => {}
                    PageOutcome::Failed(error) => {
                        if error.surface() == Surface::LoadMore {
                            self.set_status(error.user_message());
                        }
                    }
                }
                if request.phase == LoadPhase::Next {
                    self.trigger.settle();
                }
                self.clamp_selection();
                self.needs_redraw = true;
                self.check_trigger(tx);
            }
            AppEvent::CategoriesLoaded(Ok(categories)) => {
                tracing::debug!(count = categories.len(), "Categories loaded");
                self.categories = categories;
                self.needs_redraw = true;
            }
            AppEvent::CategoriesLoaded(Err(e)) => {
                self.set_status(format!("Categories unavailable: {}", e));
            }
        }
    }

    // ========================================================================
    // Scrolling and the Load-More Sentinel
    // ========================================================================

    /// The load-more row, present while more pages may exist.
    pub fn sentinel(&self) -> Option<Sentinel> {
        let state = self.store.state();
        if state.items.is_empty() || !state.has_more {
            return None;
        }
        Some(Sentinel {
            top: self.renderer.window().total_extent(state.items.len()),
            height: 1,
        })
    }

    /// Scrollable height of the list, sentinel included.
    pub fn list_extent(&self) -> u64 {
        let items = self.renderer.window().total_extent(self.store.items().len());
        items + self.sentinel().map_or(0, |s| u64::from(s.height))
    }

    /// Ask the trigger whether the sentinel is in range.
    pub fn check_trigger(&mut self, tx: &mpsc::Sender<AppEvent>) {
        let sentinel = self.sentinel();
        let window = *self.renderer.window();
        if let Some(request) = self.trigger.check(sentinel, &window, &mut self.store) {
            self.loader.spawn(request, tx);
            self.needs_redraw = true;
        }
    }

    pub fn set_viewport_height(&mut self, rows: u32) {
        if self.renderer.window().container_height == rows {
            return;
        }
        self.renderer.set_container_height(rows);
        self.keep_selection_visible();
    }

    /// Posts that fit in one screen, at least one.
    fn posts_per_screen(&self) -> usize {
        let window = self.renderer.window();
        (window.container_height / window.item_height.max(1)).max(1) as usize
    }

    /// Scroll so the selection is on screen. Selecting the last post scrolls
    /// to the very end, bringing the load-more sentinel into view.
    fn keep_selection_visible(&mut self) {
        let count = self.store.items().len();
        if count > 0 {
            self.renderer.window_mut().scroll_into_view(self.selected);
        }
        let extent = self.list_extent();
        let offset = if count > 0 && self.selected + 1 == count {
            self.renderer.window().max_scroll_offset(extent)
        } else {
            self.renderer.window().scroll_offset
        };
        self.renderer.set_scroll_offset(offset, extent);
    }

    fn clamp_selection(&mut self) {
        let count = self.store.items().len();
        if count == 0 {
            self.selected = 0;
        } else if self.selected >= count {
            self.selected = count - 1;
        }
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    pub fn selected_post(&self) -> Option<&Post> {
        self.store.items().get(self.selected)
    }

    pub fn move_selection(&mut self, delta: isize) {
        let count = self.store.items().len();
        if count == 0 {
            return;
        }
        self.selected = self.selected.saturating_add_signed(delta).min(count - 1);
        self.keep_selection_visible();
    }

    pub fn page_down(&mut self) {
        let step = isize::try_from(self.posts_per_screen()).unwrap_or(isize::MAX);
        self.move_selection(step);
    }

    pub fn page_up(&mut self) {
        let step = isize::try_from(self.posts_per_screen()).unwrap_or(isize::MAX);
        self.move_selection(-step);
    }

    pub fn select_first(&mut self) {
        self.selected = 0;
        self.keep_selection_visible();
    }

    pub fn select_last(&mut self) {
        self.selected = self.store.items().len().saturating_sub(1);
        self.keep_selection_visible();
    }

    /// Browser URL of a post, if a site URL is configured.
    pub fn post_url(&self, post: &Post) -> Option<url::Url> {
        let base = self.site_url.as_deref()?;
        let base = if base.ends_with('/') {
            Cow::Borrowed(base)
        } else {
            Cow::Owned(format!("{}/", base))
        };
        let base = url::Url::parse(&base).ok()?;
        base.join(post.detail_path().trim_start_matches('/')).ok()
    }

    // ========================================================================
    // Filter Editing
    // ========================================================================

    /// Selector entries: "All categories", then the base category's
    /// subcategories, or every top-level category when there is no base.
    pub fn category_options(&self) -> Vec<CategoryOption> {
        let mut options = vec![CategoryOption {
            id: None,
            label: ALL_CATEGORIES.to_string(),
        }];

        let find = |id: &str| self.categories.iter().find(|c| c.id == id);
        match self.filter.base_category() {
            Some(base) => {
                if let Some(parent) = find(base) {
                    options.extend(parent.subcategory_ids.iter().filter_map(|id| {
                        find(id).map(|c| CategoryOption {
                            id: Some(c.id.clone()),
                            label: c.name.clone(),
                        })
                    }));
                }
            }
            None => options.extend(
                self.categories
                    .iter()
                    .filter(|c| c.parent_id.is_none())
                    .map(|c| CategoryOption {
                        id: Some(c.id.clone()),
                        label: c.name.clone(),
                    }),
            ),
        }
        options
    }

    pub fn selected_category_label(&self) -> String {
        self.category_options()
            .into_iter()
            .nth(self.category_cursor)
            .map_or_else(|| ALL_CATEGORIES.to_string(), |o| o.label)
    }

    pub fn cycle_category(&mut self, forward: bool) {
        let options = self.category_options();
        let len = options.len();
        if len <= 1 {
            self.set_status("No categories to choose from");
            return;
        }
        self.category_cursor = if forward {
            (self.category_cursor + 1) % len
        } else {
            (self.category_cursor + len - 1) % len
        };
        let choice = options[self.category_cursor].id.clone();
        self.filter.set_category(choice);
    }

    /// newest → oldest → title → newest. Newest is the source default, so
    /// it is sent as "no sort key".
    pub fn cycle_sort(&mut self) {
        let next = self.filter.sort_key().unwrap_or(SortKey::Newest).next();
        let key = (next != SortKey::Newest).then_some(next);
        self.filter.set_sort_key(key);
    }

    pub fn begin_search(&mut self) {
        self.search_mode = true;
    }

    pub fn push_search_char(&mut self, c: char) {
        let mut text = self.filter.search_text().to_string();
        if text.chars().count() >= MAX_SEARCH_LENGTH {
            self.set_status(format!("Search text too long (max {} chars)", MAX_SEARCH_LENGTH));
            return;
        }
        text.push(c);
        self.filter.set_search_text(text);
    }

    pub fn pop_search_char(&mut self) {
        let mut text = self.filter.search_text().to_string();
        if text.pop().is_some() {
            self.filter.set_search_text(text);
        }
    }

    pub fn clear_search(&mut self) {
        if !self.filter.search_text().is_empty() {
            self.filter.set_search_text(String::new());
        }
    }

    /// Leave search mode. Committing applies the edit without waiting for
    /// the quiet period.
    pub fn end_search(&mut self, commit: bool, tx: &mpsc::Sender<AppEvent>) {
        self.search_mode = false;
        if commit {
            if let Some(criteria) = self.filter.flush() {
                self.reset_feed(criteria, tx);
            }
        }
    }

    // ========================================================================
    // Recovery
    // ========================================================================

    /// Re-issue the failed request, if it may be retried.
    pub fn retry(&mut self, tx: &mpsc::Sender<AppEvent>) {
        match self.store.retry() {
            Some(request) => {
                self.set_status("Retrying...");
                self.loader.spawn(request, tx);
            }
            None => {
                if let Some(error) = &self.store.state().last_error {
                    if !error.is_retryable() {
                        self.set_status("This error can't be retried");
                    }
                }
            }
        }
    }

    // ========================================================================
    // Status Bar
    // ========================================================================

    pub fn set_status(&mut self, msg: impl Into<Cow<'static, str>>) {
        self.status_message = Some((msg.into(), Instant::now()));
        self.needs_redraw = true;
    }

    /// Clear the status message once it has expired. Returns true if cleared.
    pub fn clear_expired_status(&mut self) -> bool {
        if let Some((_, time)) = &self.status_message {
            if time.elapsed() >= STATUS_TTL {
                self.status_message = None;
                return true;
            }
        }
        false
    }
}

//! Integration tests for incremental loading: store, scroll trigger and
//! loader driven together against an in-process data source.

use async_trait::async_trait;
use postfeed::feed::{
    FeedLoader, FeedStore, FilterCriteria, LoadEvent, ObserverRegistry, PageOutcome, PageRequest,
    ScrollTrigger, Sentinel, TriggerOptions, ViewportWindow, DEFAULT_PAGE_SIZE,
};
use postfeed::source::{DataSource, Page, Post, SourceError};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Serves `total` posts and can be told to fail the next call.
struct Scripted {
    total: usize,
    calls: AtomicUsize,
    fail_next: Mutex<Option<SourceError>>,
}

impl Scripted {
    fn new(total: usize) -> Arc<Self> {
        Arc::new(Self {
            total,
            calls: AtomicUsize::new(0),
            fail_next: Mutex::new(None),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataSource for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_page(
        &self,
        filter: &FilterCriteria,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Post>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_next.lock().unwrap().take() {
            return Err(err);
        }
        let prefix = filter.category_id.clone().unwrap_or_default();
        let end = (offset + limit).min(self.total);
        let posts = (offset.min(end)..end)
            .map(|i| Post {
                id: format!("{}-{}", prefix, i),
                title: format!("Post {}", i),
                content: String::new(),
                slug: None,
                published_at: None,
                updated_at: None,
                status: None,
                categories: Vec::new(),
            })
            .collect();
        Ok(Page::new(offset, limit, posts))
    }
}

struct Harness {
    store: FeedStore<Post>,
    trigger: ScrollTrigger,
    window: ViewportWindow,
    loader: FeedLoader,
    tx: mpsc::Sender<LoadEvent>,
    rx: mpsc::Receiver<LoadEvent>,
    _registry: ObserverRegistry,
}

impl Harness {
    fn new(source: Arc<Scripted>) -> Self {
        let registry = ObserverRegistry::new();
        let mut trigger = ScrollTrigger::new(TriggerOptions::default());
        trigger.mount(&registry);
        let mut window = ViewportWindow::new(4, 2);
        window.container_height = 20;
        let (tx, rx) = mpsc::channel(8);
        Self {
            store: FeedStore::new(DEFAULT_PAGE_SIZE),
            trigger,
            window,
            loader: FeedLoader::new(source),
            tx,
            rx,
            _registry: registry,
        }
    }

    fn reset(&mut self, filter: FilterCriteria) {
        self.trigger.settle();
        self.window.scroll_offset = 0;
        let request = self.store.reset(filter);
        self.loader.spawn(request, &self.tx);
    }

    fn sentinel(&self) -> Option<Sentinel> {
        let state = self.store.state();
        (!state.items.is_empty() && state.has_more).then(|| Sentinel {
            top: self.window.total_extent(state.items.len()),
            height: 1,
        })
    }

    fn scroll_to_end(&mut self) {
        let extent = self.window.total_extent(self.store.items().len()) + 1;
        self.window.scroll_offset = self.window.max_scroll_offset(extent);
    }

    /// Returns true if the trigger issued a fetch.
    fn check(&mut self) -> bool {
        let sentinel = self.sentinel();
        match self.trigger.check(sentinel, &self.window, &mut self.store) {
            Some(request) => {
                self.loader.spawn(request, &self.tx);
                true
            }
            None => false,
        }
    }

    async fn next_completion(&mut self) -> (PageRequest, PageOutcome) {
        match self.rx.recv().await.unwrap() {
            LoadEvent::PageLoaded { request, result } => {
                let outcome = self.store.complete(&request, result);
                if outcome != PageOutcome::Stale {
                    self.trigger.settle();
                }
                (request, outcome)
            }
            LoadEvent::CategoriesLoaded(_) => panic!("unexpected category event"),
        }
    }
}

#[tokio::test]
async fn loads_pages_until_a_short_page_arrives() {
    let source = Scripted::new(17);
    let mut h = Harness::new(source.clone());
    h.reset(FilterCriteria::for_category("C1"));

    let (request, outcome) = h.next_completion().await;
    assert_eq!(request.offset, 0);
    assert_eq!(outcome, PageOutcome::Appended { added: 12, duplicates: 0 });
    assert!(h.store.state().has_more);

    // Sentinel sits below the fold.
    assert!(!h.check());

    h.scroll_to_end();
    assert!(h.check());
    assert!(!h.check(), "trigger stays latched while the page loads");

    let (request, outcome) = h.next_completion().await;
    assert_eq!((request.offset, request.limit), (12, 12));
    assert_eq!(outcome, PageOutcome::Appended { added: 5, duplicates: 0 });
    assert_eq!(h.store.items().len(), 17);
    assert!(!h.store.state().has_more);

    h.scroll_to_end();
    assert!(!h.check());
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn filter_change_discards_the_old_page() {
    let source = Scripted::new(30);
    let mut h = Harness::new(source.clone());
    h.reset(FilterCriteria::for_category("C1"));
    h.reset(FilterCriteria::for_category("C2"));

    // Whichever task won the race, only C2 posts may land.
    let (_, outcome) = h.next_completion().await;
    if outcome == PageOutcome::Stale {
        h.next_completion().await;
    }

    let state = h.store.state();
    assert_eq!(state.items.len(), 12);
    assert!(state.items.iter().all(|p| p.id.starts_with("C2-")));
    assert_eq!(state.filter_version, 2);
}

#[tokio::test]
async fn failed_next_page_waits_for_retry() {
    let source = Scripted::new(30);
    let mut h = Harness::new(source.clone());
    h.reset(FilterCriteria::default());
    h.next_completion().await;

    *source.fail_next.lock().unwrap() = Some(SourceError::Server { status: 503 });
    h.scroll_to_end();
    assert!(h.check());
    let (_, outcome) = h.next_completion().await;
    assert!(matches!(outcome, PageOutcome::Failed(ref e) if e.is_retryable()));
    assert_eq!(h.store.items().len(), 12, "loaded posts survive the failure");

    // Scrolling alone does not hammer a failing backend.
    assert!(!h.check());
    assert_eq!(source.calls(), 2);

    let request = h.store.retry().unwrap();
    assert_eq!(request.offset, 12);
    h.loader.spawn(request, &h.tx);
    let (_, outcome) = h.next_completion().await;
    assert_eq!(outcome, PageOutcome::Appended { added: 12, duplicates: 0 });
    assert_eq!(h.store.items().len(), 24);
    assert!(h.store.state().last_error.is_none());
}

#[tokio::test]
async fn terminal_first_page_failure_has_no_retry() {
    let source = Scripted::new(30);
    *source.fail_next.lock().unwrap() = Some(SourceError::Validation("bad filter".into()));
    let mut h = Harness::new(source.clone());
    h.reset(FilterCriteria::default());

    let (_, outcome) = h.next_completion().await;
    assert!(matches!(outcome, PageOutcome::Failed(ref e) if !e.is_retryable()));
    assert!(h.store.items().is_empty());
    assert_eq!(h.store.retry(), None);
    assert_eq!(h.sentinel(), None);
}

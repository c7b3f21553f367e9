//! Background execution of page requests.
//!
//! The store decides *what* to fetch; [`FeedLoader`] runs it on a tokio task
//! and reports the outcome through the event channel. Only one page task is
//! kept alive: starting a new one aborts the previous handle. Aborting only
//! saves work; correctness comes from the store's version check, so a task
//! that finishes anyway is harmless.

use super::store::PageRequest;
use crate::source::{Category, CategoryDirectory, DataSource, Page, Post, SourceError};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Completion events produced by loader tasks.
#[derive(Debug)]
pub enum LoadEvent {
    PageLoaded {
        request: PageRequest,
        result: Result<Page<Post>, SourceError>,
    },
    CategoriesLoaded(Result<Vec<Category>, SourceError>),
}

/// Runs page fetches against a [`DataSource`].
pub struct FeedLoader {
    source: Arc<dyn DataSource>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for FeedLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedLoader")
            .field("source", &self.source.name())
            .field("running", &self.is_running())
            .finish()
    }
}

impl FeedLoader {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self {
            source,
            handle: None,
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn a task executing `request`. Any previous page task is aborted.
    ///
    /// A panicking fetch is reported as a failed page so the store never
    /// waits on a request that cannot complete.
    pub fn spawn<E>(&mut self, request: PageRequest, tx: &mpsc::Sender<E>)
    where
        E: From<LoadEvent> + Send + 'static,
    {
        self.cancel();

        let source = Arc::clone(&self.source);
        let tx = tx.clone();
        tracing::debug!(
            source = source.name(),
            version = request.version,
            offset = request.offset,
            limit = request.limit,
            "Spawning page fetch"
        );

        self.handle = Some(tokio::spawn(async move {
            let fetch = source.fetch_page(&request.filter, request.offset, request.limit);
            let result = match AssertUnwindSafe(fetch).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(task = "page_fetch", error = %message, "Background task panicked");
                    Err(SourceError::Network(format!("fetch task panicked: {}", message)))
                }
            };

            if let Err(e) = tx.send(E::from(LoadEvent::PageLoaded { request, result })).await {
                tracing::warn!(error = %e, event = "PageLoaded", "Channel send failed (receiver dropped)");
            }
        }));
    }

    /// Abort the running page task, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                handle.abort();
                tracing::debug!("Aborted previous page fetch");
            }
        }
    }
}

impl Drop for FeedLoader {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Load the category list in the background.
pub fn spawn_category_load<E>(directory: Arc<dyn CategoryDirectory>, tx: &mpsc::Sender<E>)
where
    E: From<LoadEvent> + Send + 'static,
{
    let tx = tx.clone();
    tokio::spawn(async move {
        let result = directory.list_categories().await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Failed to load categories");
        }
        if let Err(e) = tx.send(E::from(LoadEvent::CategoriesLoaded(result))).await {
            tracing::warn!(error = %e, event = "CategoriesLoaded", "Channel send failed (receiver dropped)");
        }
    });
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::filter::FilterCriteria;
    use crate::feed::recovery::LoadPhase;
    use async_trait::async_trait;
    use std::time::Duration;

    struct SlowSource {
        delay: Duration,
    }

    #[async_trait]
    impl DataSource for SlowSource {
        fn name(&self) -> &str {
            "slow"
        }

        async fn fetch_page(
            &self,
            _filter: &FilterCriteria,
            offset: usize,
            limit: usize,
        ) -> Result<Page<Post>, SourceError> {
            tokio::time::sleep(self.delay).await;
            Ok(Page::new(offset, limit, Vec::new()))
        }
    }

    struct PanickingSource;

    #[async_trait]
    impl DataSource for PanickingSource {
        fn name(&self) -> &str {
            "panics"
        }

        async fn fetch_page(
            &self,
            _filter: &FilterCriteria,
            _offset: usize,
            _limit: usize,
        ) -> Result<Page<Post>, SourceError> {
            panic!("backend exploded");
        }
    }

    fn request(version: u64) -> PageRequest {
        PageRequest {
            version,
            filter: FilterCriteria::default(),
            offset: 0,
            limit: 12,
            phase: LoadPhase::First,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn new_spawn_aborts_previous_task() {
        let (tx, mut rx) = mpsc::channel::<LoadEvent>(8);
        let mut loader = FeedLoader::new(Arc::new(SlowSource {
            delay: Duration::from_secs(1),
        }));

        loader.spawn(request(1), &tx);
        loader.spawn(request(2), &tx);
        drop(tx);

        let mut versions = Vec::new();
        while let Some(LoadEvent::PageLoaded { request, .. }) = rx.recv().await {
            versions.push(request.version);
        }
        assert_eq!(versions, vec![2]);
    }

    #[tokio::test]
    async fn panicking_fetch_reports_failure() {
        let (tx, mut rx) = mpsc::channel::<LoadEvent>(8);
        let mut loader = FeedLoader::new(Arc::new(PanickingSource));
        loader.spawn(request(1), &tx);

        match rx.recv().await {
            Some(LoadEvent::PageLoaded { request, result }) => {
                assert_eq!(request.version, 1);
                let err = result.unwrap_err();
                assert!(err.to_string().contains("backend exploded"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}

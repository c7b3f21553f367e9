//! Input handling for the TUI.
//!
//! Keys go to the search field while search mode is active, otherwise to
//! list navigation and filter shortcuts.

use crate::app::{App, AppEvent};
use anyhow::{Context, Result};
use crossterm::event::{KeyCode, KeyModifiers};
use tokio::sync::mpsc;

use super::Action;

/// Main input dispatch function.
pub(super) fn handle_input(
    app: &mut App,
    code: KeyCode,
    modifiers: KeyModifiers,
    event_tx: &mpsc::Sender<AppEvent>,
) -> Result<Action> {
    if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
        return Ok(Action::Quit);
    }

    if app.search_mode {
        handle_search_input(app, code, modifiers, event_tx);
        return Ok(Action::Continue);
    }

    handle_browse_input(app, code, event_tx)
}

/// Search field editing. Every edit restarts the debounce window.
fn handle_search_input(
    app: &mut App,
    code: KeyCode,
    modifiers: KeyModifiers,
    event_tx: &mpsc::Sender<AppEvent>,
) {
    match code {
        KeyCode::Enter => app.end_search(true, event_tx),
        KeyCode::Esc => app.end_search(false, event_tx),
        KeyCode::Backspace => app.pop_search_char(),
        KeyCode::Char('u') if modifiers.contains(KeyModifiers::CONTROL) => app.clear_search(),
        KeyCode::Char(c) => app.push_search_char(c),
        _ => {}
    }
}

fn handle_browse_input(
    app: &mut App,
    code: KeyCode,
    event_tx: &mpsc::Sender<AppEvent>,
) -> Result<Action> {
    match code {
        KeyCode::Char('q') | KeyCode::Esc => return Ok(Action::Quit),

        KeyCode::Char('j') | KeyCode::Down => app.move_selection(1),
        KeyCode::Char('k') | KeyCode::Up => app.move_selection(-1),
        KeyCode::PageDown => app.page_down(),
        KeyCode::PageUp => app.page_up(),
        KeyCode::Char('g') | KeyCode::Home => app.select_first(),
        KeyCode::Char('G') | KeyCode::End => app.select_last(),

        KeyCode::Char('/') => app.begin_search(),
        KeyCode::Char('c') => app.cycle_category(true),
        KeyCode::Char('C') => app.cycle_category(false),
        KeyCode::Char('s') => app.cycle_sort(),
        KeyCode::Char('r') => app.retry(event_tx),

        KeyCode::Enter | KeyCode::Char('o') => open_selected(app)?,
        _ => {}
    }
    Ok(Action::Continue)
}

fn open_selected(app: &mut App) -> Result<()> {
    let Some(post) = app.selected_post() else {
        return Ok(());
    };
    let Some(url) = app.post_url(post) else {
        app.set_status("Set site_url in config.toml to open posts");
        return Ok(());
    };

    tracing::debug!(url = %url, "Opening post in browser");
    open::that(url.as_str()).with_context(|| format!("Failed to open {}", url))?;
    app.set_status(format!("Opened {}", url));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::FeedSettings;
    use crate::feed::{FeedLoader, FilterCriteria};
    use crate::source::{DataSource, Page, Post, SourceError};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Empty;

    #[async_trait]
    impl DataSource for Empty {
        fn name(&self) -> &str {
            "empty"
        }

        async fn fetch_page(
            &self,
            _filter: &FilterCriteria,
            offset: usize,
            limit: usize,
        ) -> Result<Page<Post>, SourceError> {
            Ok(Page::new(offset, limit, Vec::new()))
        }
    }

    fn app() -> App {
        App::new(
            FeedSettings::default(),
            FilterCriteria::default(),
            FeedLoader::new(Arc::new(Empty)),
        )
    }

    #[tokio::test]
    async fn quit_keys() {
        let (tx, _rx) = mpsc::channel(4);
        let mut app = app();
        for code in [KeyCode::Char('q'), KeyCode::Esc] {
            let action = handle_input(&mut app, code, KeyModifiers::NONE, &tx).unwrap();
            assert!(matches!(action, Action::Quit));
        }
        let action = handle_input(&mut app, KeyCode::Char('c'), KeyModifiers::CONTROL, &tx).unwrap();
        assert!(matches!(action, Action::Quit));
    }

    #[tokio::test]
    async fn search_mode_captures_letters() {
        let (tx, _rx) = mpsc::channel(4);
        let mut app = app();
        handle_input(&mut app, KeyCode::Char('/'), KeyModifiers::NONE, &tx).unwrap();
        assert!(app.search_mode);

        for c in "qs".chars() {
            let action = handle_input(&mut app, KeyCode::Char(c), KeyModifiers::NONE, &tx).unwrap();
            assert!(matches!(action, Action::Continue), "q must not quit while searching");
        }
        assert_eq!(app.filter.search_text(), "qs");

        handle_input(&mut app, KeyCode::Backspace, KeyModifiers::NONE, &tx).unwrap();
        assert_eq!(app.filter.search_text(), "q");

        handle_input(&mut app, KeyCode::Esc, KeyModifiers::NONE, &tx).unwrap();
        assert!(!app.search_mode);
        assert_eq!(app.filter.search_text(), "q", "Esc keeps the pending edit");
    }

    #[tokio::test]
    async fn open_without_site_url_sets_status() {
        let mut app = app();
        app.store.reset(FilterCriteria::default());
        let request = app.store.in_flight().cloned().unwrap();
        let post = Post {
            id: "p1".into(),
            title: "Hello".into(),
            content: String::new(),
            slug: None,
            published_at: None,
            updated_at: None,
            status: None,
            categories: Vec::new(),
        };
        app.store.complete(&request, Ok(Page::new(0, 12, vec![post])));

        open_selected(&mut app).unwrap();
        let (msg, _) = app.status_message.as_ref().unwrap();
        assert!(msg.contains("site_url"));
    }
}

//! Render functions for the TUI.
//!
//! The screen is a filter bar, the windowed post list and a status bar.

use crate::app::App;
use crate::theme;
use crate::util::truncate_to_width;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use super::{posts, status};

/// Minimum terminal dimensions required for normal operation.
pub(super) const MIN_WIDTH: u16 = 40;
pub(super) const MIN_HEIGHT: u16 = 8;

/// Main render function.
///
/// Handles terminal size validation before rendering.
pub(super) fn render(f: &mut Frame, app: &mut App) {
    let area = f.area();

    if area.width < 1 || area.height < 1 {
        return;
    }

    if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
        let msg = if area.height < 3 || area.width < 20 {
            Paragraph::new("Too small")
        } else {
            Paragraph::new(format!(
                "Terminal too small\n\nMinimum: {}x{}\nCurrent: {}x{}",
                MIN_WIDTH, MIN_HEIGHT, area.width, area.height
            ))
            .alignment(Alignment::Center)
        };
        f.render_widget(msg, area);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);

    render_filter_bar(f, app, chunks[0]);
    posts::render(f, app, chunks[1]);
    status::render(f, app, chunks[2]);
}

/// One-line summary of the filter being edited.
fn render_filter_bar(f: &mut Frame, app: &App, area: Rect) {
    let palette = &theme::current().palette;

    let search = app.filter.search_text();
    let search_text = if app.search_mode {
        format!("/{}_", search)
    } else if search.is_empty() {
        "/ search".to_string()
    } else {
        format!("/{}", search)
    };
    let search_style = if app.search_mode {
        palette.filter_active
    } else {
        palette.filter_bar
    };
    let search_width = usize::from(area.width / 3);

    let sort = app.filter.sort_key().map_or("newest", |k| k.as_str());
    let pending = if app.filter.is_pending() { " …" } else { "" };

    let line = Line::from(vec![
        Span::styled(
            format!(" {} ", truncate_to_width(&search_text, search_width)),
            search_style,
        ),
        Span::styled(
            format!(
                "| {} | sort: {} | {}{}",
                app.selected_category_label(),
                sort,
                app.source_name(),
                pending
            ),
            palette.filter_bar,
        ),
    ]);

    f.render_widget(Paragraph::new(line).style(palette.filter_bar), area);
}

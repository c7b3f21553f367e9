//! The windowed post list.
//!
//! Only the cards inside the renderer's window are built. Each card is
//! drawn at its absolute offset minus the scroll offset and clipped to the
//! list area, so partially visible cards at either edge show only the rows
//! that fit.

use crate::app::App;
use crate::feed::{FeedError, ItemPosition, RenderError, Slot, Surface};
use crate::source::Post;
use crate::theme::{self, Theme};
use crate::util::{excerpt, sanitize_line, truncate_to_width, EXCERPT_CHARS};
use chrono::{DateTime, Utc};
use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

/// Skeleton cards shown while the first page loads.
const SKELETON_CARDS: usize = 4;

/// Render the post list into `area`.
pub(super) fn render(f: &mut Frame, app: &mut App, area: Rect) {
    if area.width < 1 || area.height < 1 {
        return;
    }
    app.set_viewport_height(u32::from(area.height));

    let theme = theme::current();
    let state = app.store.state();

    if state.items.is_empty() {
        if state.is_loading {
            render_skeleton(f, app, area, theme);
        } else if let Some(error) = state.last_error.as_ref().filter(|e| e.surface() == Surface::Feed) {
            render_error_panel(f, error, area, theme);
        } else {
            let empty = Paragraph::new("No posts found.").style(theme.palette.empty);
            f.render_widget(empty, area);
        }
        return;
    }

    let width = area.width;
    let rendered = app
        .renderer
        .render(app.store.items(), |post, position| build_card(post, position, width));
    let scroll = app.renderer.window().scroll_offset;

    for positioned in &rendered.items {
        let lines = match &positioned.slot {
            Slot::Rendered(lines) => lines.clone(),
            Slot::Placeholder { .. } => placeholder_card(theme),
        };
        let selected = positioned.position.index == app.selected;
        draw_card(f, area, scroll, positioned.position, lines, selected, theme);
    }

    if let Some(sentinel) = app.sentinel() {
        if let Some(row) = visible_row(sentinel.top, scroll, area.height) {
            let line = sentinel_line(app, theme);
            let rect = Rect::new(area.x, area.y + row, area.width, 1);
            f.render_widget(Paragraph::new(line), rect);
        }
    }
}

/// Build the lines of one post card: title, meta, excerpt.
///
/// Fails for posts that carry nothing displayable, which the renderer turns
/// into a placeholder for that slot.
pub(super) fn build_card(
    post: &Post,
    position: ItemPosition,
    width: u16,
) -> Result<Vec<Line<'static>>, RenderError> {
    if post.id.trim().is_empty() {
        return Err(RenderError::Malformed {
            id: post.id.clone(),
            reason: "missing id",
        });
    }
    let title = sanitize_line(&post.title);
    let body = excerpt(&post.content, EXCERPT_CHARS);
    if title.is_empty() && body.is_empty() {
        return Err(RenderError::Malformed {
            id: post.id.clone(),
            reason: "no title or content",
        });
    }

    let palette = &theme::current().palette;
    let width = usize::from(width);
    let mut lines = Vec::with_capacity(3);

    let mut title_spans = Vec::new();
    let mut title_width = width;
    if position.index == 0 {
        const BADGE: &str = "Featured ";
        title_spans.push(Span::styled(BADGE, palette.featured_badge));
        title_width = title_width.saturating_sub(BADGE.len());
    }
    let title = if title.is_empty() { "(untitled)".to_string() } else { title };
    title_spans.push(Span::styled(
        truncate_to_width(&title, title_width).into_owned(),
        palette.post_title,
    ));
    lines.push(Line::from(title_spans));

    let meta = meta_text(post);
    lines.push(Line::styled(
        truncate_to_width(&meta, width).into_owned(),
        palette.post_meta,
    ));

    if !body.is_empty() {
        lines.push(Line::styled(
            truncate_to_width(&body, width).into_owned(),
            palette.post_excerpt,
        ));
    }

    Ok(lines)
}

/// "Jun 01, 2024 · Youth, Camps". The date is the last update, falling back
/// to the publication date.
fn meta_text(post: &Post) -> String {
    let date = format_date(post.updated_at.or(post.published_at));
    let categories: Vec<&str> = post.categories.iter().map(|c| c.name.as_str()).collect();
    match (date.is_empty(), categories.is_empty()) {
        (true, true) => String::new(),
        (false, true) => date,
        (true, false) => categories.join(", "),
        (false, false) => format!("{} · {}", date, categories.join(", ")),
    }
}

pub(super) fn format_date(published: Option<DateTime<Utc>>) -> String {
    published
        .map(|dt| dt.format("%b %d, %Y").to_string())
        .unwrap_or_default()
}

fn placeholder_card(theme: &Theme) -> Vec<Line<'static>> {
    vec![Line::styled("This post couldn't be displayed.", theme.palette.placeholder)]
}

/// Row of `top` inside a viewport scrolled to `scroll`, if it is on screen.
fn visible_row(top: u64, scroll: u64, height: u16) -> Option<u16> {
    let row = top.checked_sub(scroll)?;
    u16::try_from(row).ok().filter(|r| *r < height)
}

/// Draw a card clipped to `area`. The last row of every card is a spacer.
fn draw_card(
    f: &mut Frame,
    area: Rect,
    scroll: u64,
    position: ItemPosition,
    lines: Vec<Line<'static>>,
    selected: bool,
    theme: &Theme,
) {
    let content_rows = position.height.saturating_sub(1) as usize;
    for (offset, line) in lines.into_iter().take(content_rows).enumerate() {
        let Some(row) = visible_row(position.top + offset as u64, scroll, area.height) else {
            continue;
        };
        let line = if selected {
            line.patch_style(theme.palette.post_selected)
        } else {
            line
        };
        let rect = Rect::new(area.x, area.y + row, area.width, 1);
        let mut paragraph = Paragraph::new(line);
        if selected {
            paragraph = paragraph.style(theme.palette.post_selected);
        }
        f.render_widget(paragraph, rect);
    }
}

fn sentinel_line(app: &App, theme: &Theme) -> Line<'static> {
    let state = app.store.state();
    if state.is_fetching_more {
        return Line::styled(
            format!("{} Loading more...", theme.spinner_frame(app.spinner_tick)),
            theme.palette.sentinel,
        );
    }
    match state.last_error.as_ref().filter(|e| e.surface() == Surface::LoadMore) {
        Some(error) => Line::styled(error.user_message(), theme.palette.error_detail),
        None => Line::styled("···", theme.palette.sentinel),
    }
}

fn render_skeleton(f: &mut Frame, app: &App, area: Rect, theme: &Theme) {
    let window = app.renderer.window();
    let height = window.item_height.max(2);
    let bar = |len: u16| "▒".repeat(usize::from(len));

    for card in 0..SKELETON_CARDS {
        let top = card as u64 * u64::from(height);
        let rows = [
            bar(area.width.saturating_mul(2) / 3),
            bar(area.width / 3),
        ];
        for (offset, text) in rows.into_iter().enumerate() {
            if offset as u32 >= height - 1 {
                break;
            }
            if let Some(row) = visible_row(top + offset as u64, 0, area.height) {
                let rect = Rect::new(area.x, area.y + row, area.width, 1);
                f.render_widget(Paragraph::new(text).style(theme.palette.skeleton), rect);
            }
        }
    }

    if area.height > 0 {
        let spinner = format!("{} Loading posts...", theme.spinner_frame(app.spinner_tick));
        let row = area.y + area.height - 1;
        let rect = Rect::new(area.x, row, area.width, 1);
        f.render_widget(Paragraph::new(spinner).style(theme.palette.sentinel), rect);
    }
}

fn render_error_panel(f: &mut Frame, error: &FeedError, area: Rect, theme: &Theme) {
    let mut lines = vec![
        Line::styled("Failed to load content", theme.palette.error_title),
        Line::default(),
        Line::styled(error.user_message(), Style::default()),
    ];
    if !error.detail.is_empty() {
        lines.push(Line::styled(sanitize_line(&error.detail), theme.palette.error_detail));
    }
    if error.is_retryable() {
        lines.push(Line::default());
        lines.push(Line::styled("[r] Try again", theme.palette.retry_hint));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme.palette.panel_border)
        .title(" Error ");
    let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}

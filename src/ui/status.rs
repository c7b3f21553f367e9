use crate::app::App;
use crate::theme;
use ratatui::{layout::Rect, widgets::Paragraph, Frame};
use std::borrow::Cow;

/// Render the status bar
pub fn render(f: &mut Frame, app: &App, area: Rect) {
    if area.width < 1 || area.height < 1 {
        return;
    }

    let text: Cow<'_, str> = if let Some((msg, _)) = &app.status_message {
        Cow::Borrowed(msg.as_ref())
    } else if app.search_mode {
        Cow::Borrowed("Type to search | ESC done | ENTER apply now | Ctrl+U clear")
    } else {
        Cow::Borrowed("[j/k]move [/]search [c/C]category [s]ort [o]pen [r]etry [q]uit")
    };

    let paragraph = Paragraph::new(text).style(theme::current().palette.status_bar);
    f.render_widget(paragraph, area);
}

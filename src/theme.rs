//! Theme system for the TUI.
//!
//! Provides semantic color roles that map to ratatui `Style` values. The
//! theme is installed once at startup into a process-wide slot; every later
//! install is a no-op, so widgets can read it without threading it through.

use ratatui::style::{Color, Modifier, Style};
use std::sync::OnceLock;

/// Braille spinner shown while a page loads.
pub const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

// ============================================================================
// Theme Variant
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThemeVariant {
    #[default]
    Dark,
    Light,
}

impl ThemeVariant {
    /// Parse a variant name (case-insensitive).
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dark" => Some(Self::Dark),
            "light" => Some(Self::Light),
            _ => None,
        }
    }

    pub fn palette(self) -> ColorPalette {
        match self {
            Self::Dark => ColorPalette::dark(),
            Self::Light => ColorPalette::light(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Dark => "Dark",
            Self::Light => "Light",
        }
    }
}

// ============================================================================
// Color Palette
// ============================================================================

#[derive(Debug, Clone)]
pub struct ColorPalette {
    // -- Post list --
    pub post_title: Style,
    pub post_meta: Style,
    pub post_excerpt: Style,
    pub post_selected: Style,
    pub featured_badge: Style,
    pub placeholder: Style,
    pub skeleton: Style,

    // -- Feed states --
    pub sentinel: Style,
    pub empty: Style,
    pub error_title: Style,
    pub error_detail: Style,
    pub retry_hint: Style,

    // -- Chrome --
    pub filter_bar: Style,
    pub filter_active: Style,
    pub status_bar: Style,
    pub panel_border: Style,
}

impl ColorPalette {
    fn dark() -> Self {
        Self {
            post_title: Style::default().add_modifier(Modifier::BOLD),
            post_meta: Style::default().fg(Color::DarkGray),
            post_excerpt: Style::default().fg(Color::Gray),
            post_selected: Style::default().bg(Color::DarkGray).fg(Color::White),
            featured_badge: Style::default()
                .fg(Color::Black)
                .bg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
            placeholder: Style::default()
                .fg(Color::Red)
                .add_modifier(Modifier::ITALIC),
            skeleton: Style::default().fg(Color::DarkGray),

            sentinel: Style::default().fg(Color::Cyan),
            empty: Style::default().fg(Color::Gray),
            error_title: Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            error_detail: Style::default().fg(Color::Gray),
            retry_hint: Style::default().fg(Color::Yellow),

            filter_bar: Style::default(),
            filter_active: Style::default().fg(Color::Cyan),
            status_bar: Style::default().bg(Color::DarkGray).fg(Color::White),
            panel_border: Style::default(),
        }
    }

    fn light() -> Self {
        Self {
            post_title: Style::default()
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
            post_meta: Style::default().fg(Color::DarkGray),
            post_excerpt: Style::default().fg(Color::Black),
            post_selected: Style::default().bg(Color::Blue).fg(Color::White),
            featured_badge: Style::default()
                .fg(Color::White)
                .bg(Color::Magenta)
                .add_modifier(Modifier::BOLD),
            placeholder: Style::default()
                .fg(Color::Red)
                .add_modifier(Modifier::ITALIC),
            skeleton: Style::default().fg(Color::Gray),

            sentinel: Style::default().fg(Color::Blue),
            empty: Style::default().fg(Color::DarkGray),
            error_title: Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            error_detail: Style::default().fg(Color::DarkGray),
            retry_hint: Style::default().fg(Color::Magenta),

            filter_bar: Style::default().fg(Color::Black),
            filter_active: Style::default().fg(Color::Blue),
            status_bar: Style::default().bg(Color::White).fg(Color::Black),
            panel_border: Style::default().fg(Color::DarkGray),
        }
    }
}

// ============================================================================
// Installed Theme
// ============================================================================

#[derive(Debug, Clone)]
pub struct Theme {
    pub variant: ThemeVariant,
    pub palette: ColorPalette,
    pub spinner: &'static [&'static str],
}

impl Theme {
    pub fn new(variant: ThemeVariant) -> Self {
        Self {
            variant,
            palette: variant.palette(),
            spinner: &SPINNER_FRAMES,
        }
    }

    /// Spinner frame for a monotonically increasing tick counter.
    pub fn spinner_frame(&self, tick: usize) -> &'static str {
        self.spinner[tick % self.spinner.len()]
    }
}

static THEME: OnceLock<Theme> = OnceLock::new();

/// Install the process-wide theme. Returns `false` if one was already
/// installed, in which case nothing changes.
pub fn install(variant: ThemeVariant) -> bool {
    let installed = THEME.set(Theme::new(variant)).is_ok();
    if installed {
        tracing::debug!(theme = variant.name(), "Theme installed");
    } else {
        tracing::trace!(requested = variant.name(), "Theme already installed, ignoring");
    }
    installed
}

/// The installed theme, installing the default on first use.
pub fn current() -> &'static Theme {
    THEME.get_or_init(|| Theme::new(ThemeVariant::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_names_parse_case_insensitively() {
        assert_eq!(ThemeVariant::from_str_name("LIGHT"), Some(ThemeVariant::Light));
        assert_eq!(ThemeVariant::from_str_name("solarized"), None);
    }

    #[test]
    fn install_happens_once() {
        // The slot is process-wide; whichever call wins, the rest are no-ops.
        let first = install(ThemeVariant::Light);
        let winner = current().variant;
        assert!(!install(ThemeVariant::Dark));
        assert!(!install(ThemeVariant::Light));
        assert_eq!(current().variant, winner);
        if first {
            assert_eq!(winner, ThemeVariant::Light);
        }
    }

    #[test]
    fn spinner_wraps() {
        let theme = Theme::new(ThemeVariant::Dark);
        assert_eq!(theme.spinner_frame(0), theme.spinner_frame(SPINNER_FRAMES.len()));
    }
}

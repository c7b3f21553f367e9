//! Terminal-safe text helpers.
//!
//! Post titles and bodies come from a remote backend, so everything shown in
//! the list passes through [`sanitize_line`] before it reaches the terminal.

use std::borrow::Cow;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ELLIPSIS: &str = "…";

/// Characters of post content shown in a card excerpt.
pub const EXCERPT_CHARS: usize = 120;

/// Display width of `s` in terminal columns.
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Truncate `s` to at most `max_width` columns, ending in "…" when cut.
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if display_width(s) <= max_width {
        return Cow::Borrowed(s);
    }
    if max_width == 0 {
        return Cow::Borrowed("");
    }

    let budget = max_width - 1;
    let mut width = 0;
    let mut end = 0;
    for (idx, c) in s.char_indices() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if width + w > budget {
            break;
        }
        width += w;
        end = idx + c.len_utf8();
    }
    Cow::Owned(format!("{}{}", &s[..end], ELLIPSIS))
}

/// Flatten `s` to one terminal-safe line.
///
/// Control characters and escape sequences are dropped, and every run of
/// whitespace (newlines included) becomes a single space.
pub fn sanitize_line(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    let mut pending_space = false;

    while let Some(c) = chars.next() {
        if c == '\x1b' {
            // Skip a CSI sequence (ESC [ ... final byte) or a lone ESC + 1 char.
            if chars.peek() == Some(&'[') {
                chars.next();
                for next in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&next) {
                        break;
                    }
                }
            } else {
                chars.next();
            }
            continue;
        }
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if c.is_control() {
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(c);
    }
    out
}

/// Card excerpt: the first `max_chars` characters of the sanitized content,
/// followed by "..." when anything was cut.
pub fn excerpt(content: &str, max_chars: usize) -> String {
    let clean = sanitize_line(content);
    match clean.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &clean[..cut]),
        None => clean,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_borrowed() {
        assert!(matches!(truncate_to_width("hello", 10), Cow::Borrowed("hello")));
    }

    #[test]
    fn truncation_respects_wide_chars() {
        assert_eq!(truncate_to_width("Hello World", 8), "Hello W…");
        // Each CJK char is two columns wide.
        assert_eq!(truncate_to_width("世界世界世界", 5), "世界…");
        assert_eq!(truncate_to_width("abc", 0), "");
    }

    #[test]
    fn sanitize_strips_escapes_and_collapses_whitespace() {
        assert_eq!(
            sanitize_line("  Title\x1b[31m red\x1b[0m\n\tnext\x07 "),
            "Title red next"
        );
    }

    #[test]
    fn excerpt_cuts_at_character_count() {
        let content = "a".repeat(130);
        let out = excerpt(&content, EXCERPT_CHARS);
        assert_eq!(out.len(), 123);
        assert!(out.ends_with("..."));

        assert_eq!(excerpt("short body", EXCERPT_CHARS), "short body");
        assert_eq!(excerpt(&"é".repeat(120), EXCERPT_CHARS), "é".repeat(120));
    }
}

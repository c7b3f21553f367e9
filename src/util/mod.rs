//! Utility functions shared by the UI.
//!
//! - **Text processing**: sanitizing backend text and fitting it to the terminal
//!
//! # Examples
//!
//! ```
//! use postfeed::util::{excerpt, truncate_to_width};
//!
//! assert_eq!(truncate_to_width("Long post title", 9), "Long pos…");
//! assert_eq!(excerpt("Short body", 120), "Short body");
//! ```

mod text;

pub use text::{display_width, excerpt, sanitize_line, truncate_to_width, EXCERPT_CHARS};

/// Maximum accepted search text length.
pub const MAX_SEARCH_LENGTH: usize = 256;

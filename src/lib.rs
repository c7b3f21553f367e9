//! Incremental post browser.
//!
//! Loads a filtered list of posts page by page from a [`source::DataSource`],
//! fetches the next page when the end of the list scrolls into view, and
//! renders only the posts inside the visible window.

pub mod app;
pub mod config;
pub mod feed;
pub mod source;
pub mod theme;
pub mod ui;
pub mod util;

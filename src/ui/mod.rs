//! Terminal UI: event loop, key handling and rendering.

mod input;
mod loop_runner;
mod posts;
mod render;
mod status;

pub use loop_runner::{run, Action};

//! View-side state that outlives a single load.

pub mod cache;

pub use cache::{ViewportCache, DEFAULT_MAX_CACHED_LINES};

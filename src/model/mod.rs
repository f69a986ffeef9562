//! Domain model: value types, encodings, and the error taxonomy.

pub mod encoding;
pub mod error;
pub mod types;

pub use encoding::TextEncoding;
pub use error::{AppError, ViewerError};
pub use types::{FileStreamInfo, SearchResult, Substitution, TextSegment, ViewportState};

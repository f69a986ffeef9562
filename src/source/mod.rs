//! File access: analysis, bounded segment reads, and cancellation.
//!
//! - [`analyze_file`] inspects a file once (size, encoding, line estimate)
//! - [`SegmentLoader`] serves decoded byte ranges on demand
//! - [`CancelToken`] and [`ReadGate`] coordinate concurrent readers

pub mod analyzer;
pub mod boundary;
pub mod cancel;
pub mod gate;
pub mod segment;

pub use analyzer::{analyze_file, AnalyzerConfig};
pub use cancel::CancelToken;
pub use gate::{ReadGate, ReadPermit};
pub use segment::{LoaderLimits, SegmentLoader, SegmentSource};

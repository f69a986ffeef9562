//! streamview
//!
//! A streaming virtual text buffer: view and search text files far larger than
//! memory by loading only the segments a viewport needs.
//!
//! - `source`: file analysis and boundary-safe segment loading
//! - `search`: overlapping-segment full-file search
//! - `view_state`: bounded line cache
//! - `state`: the viewport controller and its error recovery

pub mod config;
pub mod logging;
pub mod model;
pub mod search;
pub mod source;
pub mod state;
pub mod view_state;

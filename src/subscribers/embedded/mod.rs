//! # Built-in subscribers
//!
//! Small, self-contained implementations useful for demos.
//!
//! - [`LogWriter`]: writes events as structured log lines (demo/debug).

mod log;

pub use log::LogWriter;

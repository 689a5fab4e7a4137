//! Output formatters for duplicate scan results.
//!
//! This module provides different output formats for scan results:
//! - Plain text, one line per duplicate group
//! - JSON for automation and scripting
//!
//! # Example
//!
//! ```no_run
//! use dupfind::duplicates::DuplicateFinder;
//! use dupfind::output::TextOutput;
//! use std::path::Path;
//!
//! let finder = DuplicateFinder::with_defaults();
//! let report = finder.run(Path::new(".")).into_result().unwrap();
//!
//! TextOutput::new(&report).write_to(&mut std::io::stdout()).unwrap();
//! ```

pub mod json;
pub mod text;

// Re-export main types
pub use json::{JsonOutput, JsonOutputError};
pub use text::{format_group, TextOutput};

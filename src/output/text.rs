//! Plain-text output: one line per duplicate group.
//!
//! ```text
//! 9dd4e461268c8034f5c8564e155c67a6: [/data/a/1.txt, /data/a/b/2.txt]
//! ```
//!
//! Groups come out in digest order, so two runs over the same tree print the
//! same lines (paths inside a group follow hashing completion order).

use std::io::{self, Write};

use crate::duplicates::{DuplicateGroup, ScanReport};

/// Render one group as `<hex-digest>: [path1, path2, ...]`.
#[must_use]
pub fn format_group(group: &DuplicateGroup) -> String {
    let paths: Vec<String> = group
        .paths
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    format!("{}: [{}]", group.digest, paths.join(", "))
}

/// Text renderer for a completed scan.
#[derive(Debug)]
pub struct TextOutput<'a> {
    report: &'a ScanReport,
}

impl<'a> TextOutput<'a> {
    /// Wrap a report for rendering.
    #[must_use]
    pub fn new(report: &'a ScanReport) -> Self {
        Self { report }
    }

    /// Write every group, one per line.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for group in &self.report.groups {
            writeln!(writer, "{}", format_group(group))?;
        }
        Ok(())
    }
}

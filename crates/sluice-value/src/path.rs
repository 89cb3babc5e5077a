//! Dotted key paths (e.g. `order.items.0.sku`)

use crate::{Error, Result};

/// Parse a dotted path into its segments.
///
/// An empty string is the root path and yields no segments. Empty segments
/// (`a..b`, a leading or trailing dot) are rejected.
pub fn parse_path(path: &str) -> Result<Vec<String>> {
    if path.is_empty() {
        return Ok(Vec::new());
    }

    path.split('.')
        .map(|segment| {
            if segment.is_empty() {
                Err(Error::invalid_path(path, "empty path segment"))
            } else {
                Ok(segment.to_string())
            }
        })
        .collect()
}

/// Format path segments back into dotted form.
pub fn format_path(segments: &[String]) -> String {
    segments.join(".")
}

//! Plain-text operational logs.
//!
//! `recovery.log` records every recovery attempt; `event_sync.log`
//! records propagation faults. Both are append-only operator artifacts,
//! separate from structured tracing output.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use tracing::warn;

/// Append one timestamped line. Failures are logged, never propagated:
/// an unwritable operator log must not take the node down.
pub fn append_line(path: &Path, line: &str) {
    let stamped = format!("{} {}\n", chrono::Utc::now().to_rfc3339(), line);
    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| file.write_all(stamped.as_bytes()));
    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "operational log write failed");
    }
}

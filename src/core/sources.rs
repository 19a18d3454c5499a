//! Resolves command-line inputs into the ordered list of source files.
//!
//! Explicit files are kept in the order given. Directories are searched
//! recursively for files with the source extension and their matches are
//! sorted by path. A file reached twice is only converted once.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use glob::{glob_with, MatchOptions, Pattern};
use tracing::{debug, warn};

use crate::domain::SourceItem;

use super::error::PipelineError;

/// Expand `inputs` into source items with the given extension
pub fn collect_sources(inputs: &[PathBuf], extension: &str) -> Result<Vec<SourceItem>, PipelineError> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();

    for input in inputs {
        let metadata = std::fs::metadata(input).map_err(|e| {
            PipelineError::configuration(format!("cannot read input {}: {}", input.display(), e))
        })?;

        let found = if metadata.is_dir() {
            scan_directory(input, extension)?
        } else {
            vec![input.clone()]
        };

        for path in found {
            let canonical = std::fs::canonicalize(&path).unwrap_or(path);
            if seen.insert(canonical.clone()) {
                sources.push(SourceItem::new(canonical));
            } else {
                debug!(path = %canonical.display(), "Skipping duplicate input");
            }
        }
    }

    Ok(sources)
}

/// Recursive, case-insensitive search for `*.<extension>` under `dir`, sorted
fn scan_directory(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, PipelineError> {
    let pattern = format!(
        "{}/**/*.{}",
        Pattern::escape(&dir.to_string_lossy()),
        Pattern::escape(extension.trim_start_matches('.'))
    );
    let options = MatchOptions {
        case_sensitive: false,
        ..Default::default()
    };

    let entries = glob_with(&pattern, options)
        .map_err(|e| PipelineError::configuration(format!("invalid source pattern: {}", e)))?;

    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Skipping unreadable path"),
        }
    }

    files.sort();
    Ok(files)
}

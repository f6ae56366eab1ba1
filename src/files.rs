//! Migration file layout.
//!
//! Each generation writes a pair beside each other in the output
//! directory: `<UTC %Y%m%d%H%M%S>_<label>.up.sql` and `.down.sql`. The up
//! file holds statements separated by blank lines; the down file holds
//! their inverses in reverse order with warning comments inline.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::{Error, Result};

/// Paths of one written migration pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPair {
    pub up_path: PathBuf,
    pub down_path: PathBuf,
}

/// Current UTC timestamp in the migration filename format.
pub fn timestamp_now() -> String {
    Utc::now().format("%Y%m%d%H%M%S").to_string()
}

/// Reduce a label to filename-safe form: lowercase alphanumerics with
/// single underscores.
pub fn slugify(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut last_was_sep = true;
    for c in label.chars() {
        if c.is_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    let trimmed = out.trim_end_matches('_').to_string();
    if trimmed.is_empty() { "migration".to_string() } else { trimmed }
}

/// Write an up/down pair. The output directory is created when missing.
pub fn write_pair(
    output_dir: &Path,
    timestamp: &str,
    label: &str,
    up_text: &str,
    down_text: &str,
) -> Result<MigrationPair> {
    std::fs::create_dir_all(output_dir).map_err(|e| Error::io(output_dir, e))?;

    let slug = slugify(label);
    let up_path = output_dir.join(format!("{timestamp}_{slug}.up.sql"));
    let down_path = output_dir.join(format!("{timestamp}_{slug}.down.sql"));

    std::fs::write(&up_path, ensure_trailing_newline(up_text))
        .map_err(|e| Error::io(&up_path, e))?;
    std::fs::write(&down_path, ensure_trailing_newline(down_text))
        .map_err(|e| Error::io(&down_path, e))?;

    tracing::info!(up = %up_path.display(), down = %down_path.display(), "migration pair written");
    Ok(MigrationPair { up_path, down_path })
}

/// Write an empty pair for hand-editing (the `create` command).
pub fn write_empty_pair(output_dir: &Path, timestamp: &str, label: &str) -> Result<MigrationPair> {
    let header = |direction: &str| {
        format!("-- {label} ({direction})\n-- Add statements here, separated by blank lines.\n")
    };
    write_pair(output_dir, timestamp, label, &header("up"), &header("down"))
}

fn ensure_trailing_newline(text: &str) -> String {
    if text.is_empty() || text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{text}\n")
    }
}

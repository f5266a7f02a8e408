//! Cassette file storage

mod format;
mod reader;
mod writer;

pub use format::{decode, encode, CassetteFile, FORMAT_VERSION};
pub use reader::CassetteReader;
pub use writer::CassetteWriter;

use std::path::{Path, PathBuf};

/// File extension for cassette files
pub const CASSETTE_EXTENSION: &str = "yml";

/// Turn a cassette name into a path-safe file key
///
/// Every run of characters outside `[A-Za-z0-9_/-]` becomes a single `_`.
/// Path separators are kept so names can organize cassettes in
/// subdirectories.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    let mut in_run = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/') {
            sanitized.push(c);
            in_run = false;
        } else if !in_run {
            sanitized.push('_');
            in_run = true;
        }
    }

    sanitized
}

/// File name (relative to the library dir) for a cassette name
#[must_use]
pub fn cassette_file_name(name: &str) -> String {
    format!("{}.{CASSETTE_EXTENSION}", sanitize_name(name))
}

/// Full path of a cassette inside a library directory
#[must_use]
pub fn cassette_path(library_dir: &Path, name: &str) -> PathBuf {
    library_dir.join(cassette_file_name(name))
}

//! Enumeration of cache candidates.
//!
//! Only the top level of the cache directory is read. Entries are kept if
//! their name starts with the cache prefix and their length equals one of
//! the wanted lengths; nothing is opened at this stage.

use std::path::Path;
use std::time::SystemTime;

use walkdir::WalkDir;

use super::{CacheCandidate, ScanError};

/// List prefix-named files of `dir` whose length is in `lengths`, most
/// recently modified first.
///
/// # Arguments
///
/// * `dir` - Cache directory
/// * `prefix` - Required file name prefix (e.g. `f_`)
/// * `lengths` - Accepted file lengths in bytes
///
/// # Errors
///
/// Returns [`ScanError::Io`] if `dir` itself cannot be read. Errors on
/// individual entries are logged and skipped; cache entries come and go
/// while the host is running.
pub fn collect_candidates(
    dir: &Path,
    prefix: &str,
    lengths: &[u64],
) -> Result<Vec<CacheCandidate>, ScanError> {
    let mut candidates = Vec::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
                return Err(ScanError::Io {
                    path: dir.to_path_buf(),
                    source,
                });
            }
            Err(e) => {
                log::debug!("Skipping cache entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        if !entry.file_name().to_string_lossy().starts_with(prefix) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                log::debug!("Failed to stat {}: {}", entry.path().display(), e);
                continue;
            }
        };

        let len = metadata.len();
        if !lengths.contains(&len) {
            continue;
        }

        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        candidates.push(CacheCandidate::new(entry.into_path(), len, modified));
    }

    candidates.sort_by(|a, b| b.modified.cmp(&a.modified));
    Ok(candidates)
}

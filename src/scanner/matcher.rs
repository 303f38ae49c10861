//! Parallel content comparison of cache candidates.
//!
//! Each worker reads one candidate in full, rejects it unless it carries a
//! gzip header, then compares it against the original and patched bytes.
//! The first worker to match the original claims the stop flag with a
//! compare-and-swap; only that worker hands the file to the match handler,
//! and every worker checks the flag before picking up another candidate.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use rayon::prelude::*;

use super::{CacheCandidate, ScanError, ScanOutcome};
use crate::asset::{decompress, is_gzip, Asset};
use crate::events::EventSink;
use crate::patcher::PatchError;

/// Classification of one candidate's bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Byte-identical to the original asset. Carries the bytes read.
    Original(Vec<u8>),
    /// Byte-identical to the patched asset.
    Patched,
    /// Anything else.
    Unrelated,
}

/// Classify raw candidate bytes against `asset`.
#[must_use]
pub fn classify_bytes(bytes: Vec<u8>, asset: &Asset) -> Classification {
    if !is_gzip(&bytes) {
        return Classification::Unrelated;
    }
    if bytes.as_slice() == asset.original() {
        Classification::Original(bytes)
    } else if bytes.as_slice() == asset.patched() {
        Classification::Patched
    } else {
        Classification::Unrelated
    }
}

fn classify_file(path: &Path, asset: &Asset) -> io::Result<Classification> {
    Ok(classify_bytes(fs::read(path)?, asset))
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Compare `candidates` against `asset` on a pool of `io_threads` workers.
///
/// `on_match` runs inside the winning worker with the matched path and the
/// decompressed original stylesheet.
///
/// # Errors
///
/// Returns [`ScanError::ThreadPool`] if the pool cannot be built and
/// [`ScanError::Patch`] if `on_match` fails.
pub fn compare_candidates<F>(
    candidates: &[CacheCandidate],
    asset: &Asset,
    io_threads: usize,
    events: &dyn EventSink,
    on_match: F,
) -> Result<ScanOutcome, ScanError>
where
    F: Fn(&Path, &[u8]) -> Result<(), PatchError> + Sync,
{
    let stop = AtomicBool::new(false);
    let patched_seen = AtomicBool::new(false);
    let winner: Mutex<Option<PathBuf>> = Mutex::new(None);
    let failure: Mutex<Option<PatchError>> = Mutex::new(None);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(io_threads.max(1))
        .build()
        .map_err(|e| ScanError::ThreadPool(e.to_string()))?;

    pool.install(|| {
        candidates.par_iter().for_each(|candidate| {
            if stop.load(Ordering::SeqCst) {
                return;
            }

            let classification = match classify_file(&candidate.path, asset) {
                Ok(c) => c,
                Err(e) => {
                    events.debug(&format!(
                        "{} could not be opened: {}",
                        candidate.path.display(),
                        e
                    ));
                    return;
                }
            };

            match classification {
                Classification::Original(bytes) => {
                    if stop
                        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                        .is_err()
                    {
                        return;
                    }
                    *lock(&winner) = Some(candidate.path.clone());
                    events.info(&format!(
                        "Found matching stylesheet at {}.",
                        candidate.path.display()
                    ));

                    let result = decompress(&bytes)
                        .map_err(PatchError::from)
                        .and_then(|css| on_match(&candidate.path, &css));
                    if let Err(e) = result {
                        *lock(&failure) = Some(e);
                    }
                }
                Classification::Patched => {
                    log::debug!("Already patched: {}", candidate.path.display());
                    patched_seen.store(true, Ordering::SeqCst);
                }
                Classification::Unrelated => {
                    log::trace!("No match: {}", candidate.path.display());
                }
            }
        });
    });

    if let Some(e) = failure.into_inner().unwrap_or_else(PoisonError::into_inner) {
        return Err(ScanError::Patch(e));
    }

    Ok(ScanOutcome {
        matched: winner.into_inner().unwrap_or_else(PoisonError::into_inner),
        patched_already_present: patched_seen.load(Ordering::SeqCst),
        candidates: candidates.len(),
    })
}

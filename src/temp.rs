use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::ResolverError;

type ReleaseAction = Box<dyn FnOnce() -> io::Result<()> + Send>;

/// Temporary directory registered with a [`TempLedger`].
///
/// The directory stays on disk until the ledger releases it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempHandle {
    id: u64,
    path: PathBuf,
}

impl TempHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

struct Entry {
    id: u64,
    path: PathBuf,
    release: ReleaseAction,
}

/// Registry of temporary directories and their cleanup actions for one
/// pipeline run.
///
/// Acquisition takes `&self`, so concurrent steps of the same run can share a
/// ledger. Each release action runs at most once: either through
/// [`TempLedger::release`], [`TempLedger::release_all`], or when the ledger is
/// dropped.
pub struct TempLedger {
    root: Option<PathBuf>,
    prefix: String,
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry>>,
}

impl TempLedger {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root,
            prefix: "snp-resolver".to_string(),
            next_id: AtomicU64::new(0),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Creates a fresh temporary directory and registers its removal.
    pub fn acquire(&self) -> Result<TempHandle, ResolverError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(&self.prefix);
        let dir = match &self.root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|err| ResolverError::Filesystem(format!("create temp dir: {err}")))?;
        let path = dir.path().to_path_buf();
        let handle = self.register(path, move || dir.close());
        tracing::debug!(path = %handle.path.display(), "acquired temp dir");
        Ok(handle)
    }

    /// Registers an externally created resource with its release action.
    pub fn register<F>(&self, path: PathBuf, release: F) -> TempHandle
    where
        F: FnOnce() -> io::Result<()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push(Entry {
            id,
            path: path.clone(),
            release: Box::new(release),
        });
        TempHandle { id, path }
    }

    /// Releases a single handle. Returns `false` if it was already released.
    pub fn release(&self, handle: &TempHandle) -> Result<bool, ResolverError> {
        let entry = {
            let mut entries = self.lock();
            let Some(position) = entries.iter().position(|entry| entry.id == handle.id) else {
                return Ok(false);
            };
            entries.remove(position)
        };
        run_release(entry)?;
        Ok(true)
    }

    /// Releases every registered resource in acquisition order and empties the
    /// registry. Every action runs even if an earlier one fails; the first
    /// failure is returned.
    pub fn release_all(&self) -> Result<usize, ResolverError> {
        let entries = std::mem::take(&mut *self.lock());
        let count = entries.len();
        let mut first_error = None;
        for entry in entries {
            if let Err(err) = run_release(entry) {
                first_error.get_or_insert(err);
            }
        }
        if count > 0 {
            tracing::debug!(count, "released temp resources");
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(count),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Entry>> {
        // Entries stay consistent even if a holder panicked.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for TempLedger {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Drop for TempLedger {
    fn drop(&mut self) {
        if let Err(err) = self.release_all() {
            tracing::warn!(error = %err, "failed to release temp resources");
        }
    }
}

fn run_release(entry: Entry) -> Result<(), ResolverError> {
    (entry.release)().map_err(|err| {
        ResolverError::Filesystem(format!("release {}: {err}", entry.path.display()))
    })
}

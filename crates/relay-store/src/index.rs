use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use relay_core::now_unix_seconds;

use crate::error::StoreError;

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);
const LOCK_WAIT_BUDGET: Duration = Duration::from_secs(5);
const APPEND_WAIT_BUDGET: Duration = Duration::from_secs(2);

/// Append-only expiry index and its crash-safe compaction procedure.
///
/// The on-disk state (`index`, `index.new`, `index.lock`) is wire-compatible
/// with the reference store. Coordination against the compactor is via the
/// `index.lock` marker file, as in the source; this type additionally holds
/// an in-process mutex so two `expire()` calls from the same process never
/// race each other even before either touches the filesystem.
pub struct ExpiryIndex {
    root: PathBuf,
    compaction: Mutex<()>,
}

impl ExpiryIndex {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            compaction: Mutex::new(()),
        }
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index")
    }

    fn new_path(&self) -> PathBuf {
        self.root.join("index.new")
    }

    fn lock_path(&self) -> PathBuf {
        self.root.join("index.lock")
    }

    /// Best-effort coordination, not mutual exclusion: wait for the lock
    /// marker to be absent, then append one line. A compaction that starts
    /// concurrently may still race this append; the worst case is a
    /// dangling file with no index entry, which is an accepted operational
    /// cost (see the store's design notes).
    pub fn append_entry(&self, path: &Path, expiration: u64) -> Result<(), StoreError> {
        let lock_path = self.lock_path();
        let mut waited = Duration::ZERO;
        while lock_path.exists() {
            if waited >= APPEND_WAIT_BUDGET {
                break;
            }
            thread::sleep(LOCK_POLL_INTERVAL);
            waited += LOCK_POLL_INTERVAL;
        }

        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.index_path())?;
        writeln!(file, "{} {}", path.display(), expiration)?;
        file.sync_all()?;
        Ok(())
    }

    /// Compacts the index, deleting files whose expiration has passed, and
    /// returns the number of entries expired. A no-op (returns `0`) if the
    /// index does not yet exist.
    pub fn expire(&self) -> Result<usize, StoreError> {
        let index_path = self.index_path();
        if !index_path.exists() {
            return Ok(0);
        }

        let _guard = self
            .compaction
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.acquire_file_lock()?;
        let result = self.compact(&index_path);
        self.release_file_lock();
        result
    }

    fn acquire_file_lock(&self) -> Result<(), StoreError> {
        let lock_path = self.lock_path();
        let mut waited = Duration::ZERO;
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(mut f) => {
                    let _ = write!(f, "{}", std::process::id());
                    let _ = f.sync_all();
                    return Ok(());
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if waited >= LOCK_WAIT_BUDGET {
                        return Err(StoreError::LockTimedOut);
                    }
                    thread::sleep(LOCK_POLL_INTERVAL);
                    waited += LOCK_POLL_INTERVAL;
                }
                Err(e) => return Err(StoreError::Io(e)),
            }
        }
    }

    fn release_file_lock(&self) {
        let _ = fs::remove_file(self.lock_path());
    }

    fn compact(&self, index_path: &Path) -> Result<usize, StoreError> {
        let new_path = self.new_path();
        let infile = match File::open(index_path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut outfile = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&new_path)?;

        let now = now_unix_seconds();
        let mut expired_count = 0usize;

        for line in BufReader::new(infile).lines() {
            let line = line?;
            let mut parts = line.splitn(2, ' ');
            let (path_str, expiration_str) = match (parts.next(), parts.next()) {
                (Some(p), Some(e)) if !p.is_empty() && !e.is_empty() => (p, e),
                _ => continue,
            };
            if !self.is_safe_path(path_str) {
                continue;
            }
            let expiration: u64 = match expiration_str.trim().parse() {
                Ok(v) => v,
                Err(_) => continue,
            };
            if now >= expiration {
                match fs::remove_file(path_str) {
                    Ok(()) => expired_count += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => expired_count += 1,
                    Err(e) => {
                        tracing::warn!(path = %path_str, error = %e, "failed to remove expired message");
                    }
                }
            } else {
                writeln!(outfile, "{path_str} {expiration}")?;
            }
        }

        outfile.sync_all()?;
        drop(outfile);
        fs::remove_file(index_path)?;
        fs::rename(&new_path, index_path)?;
        Ok(expired_count)
    }

    /// A line is processed only if its path is rooted under the store and
    /// contains no `..` path segment. Implemented by component, not naive
    /// string-prefix comparison, so it also rejects a path that merely
    /// shares a string prefix with the root without actually being nested
    /// under it.
    fn is_safe_path(&self, candidate: &str) -> bool {
        let candidate_path = Path::new(candidate);
        if candidate_path
            .components()
            .any(|c| c == std::path::Component::ParentDir)
        {
            return false;
        }
        candidate_path.starts_with(&self.root)
    }
}

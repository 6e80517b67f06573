use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use relay_core::Message;

use crate::error::StoreError;
use crate::index::ExpiryIndex;
use crate::paths::{bucket_names, decode_hash, encode_hash, mktemp, skiplist_for};

/// Default duration added to a file's mtime when synthesizing the
/// `expiration` shown to clients during iteration. This is a store-wide
/// display value, not the literal per-message TTL recorded at admission —
/// the store never reads the index back to answer a query, by design (see
/// the store's module-level design notes).
pub const DEFAULT_EXPIRE_DISPLAY_DURATION: Duration = Duration::from_secs(60 * 60);

/// Content-addressed, per-recipient store on the filesystem.
///
/// Root layout:
/// - `<root>/<bucket>/<dir>/<hash>` — one immutable message file.
/// - `<root>/index`, `<root>/index.new`, `<root>/index.lock` — the expiry
///   index and its compaction scratch/lock files (see [`crate::index`]).
/// - `<root>/tmp-<nanos>-<rand>` — ingest temp files, owned by callers until
///   a successful [`SkiplistStore::put_message_for`] transfers ownership.
pub struct SkiplistStore {
    root: PathBuf,
    expire_display_duration: Duration,
    index: ExpiryIndex,
}

impl SkiplistStore {
    /// Opens (creating if needed) a store rooted at `root`, pre-creating
    /// the 32 top-level buckets. Equivalent to the reference protocol's
    /// `Init()` plus construction, since a store with no on-disk state yet
    /// is never useful on its own.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        Self::ensure_dir_at(&root)?;
        let root = fs::canonicalize(&root)?;

        for bucket in bucket_names() {
            Self::ensure_dir_at(&root.join(bucket))?;
        }

        Ok(Self {
            index: ExpiryIndex::new(root.clone()),
            root,
            expire_display_duration: DEFAULT_EXPIRE_DISPLAY_DURATION,
        })
    }

    /// Overrides the display TTL used when synthesizing `expiration`
    /// during iteration (default: [`DEFAULT_EXPIRE_DISPLAY_DURATION`]).
    #[must_use]
    pub fn with_expire_display_duration(mut self, duration: Duration) -> Self {
        self.expire_display_duration = duration;
        self
    }

    fn ensure_dir_at(dir: &Path) -> Result<(), StoreError> {
        match fs::metadata(dir) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(dir)?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn ensure_bucket_dir(&self, bucket: &str, dir: &str) -> Result<PathBuf, StoreError> {
        let path = self.root.join(bucket).join(dir);
        Self::ensure_dir_at(&path)?;
        Ok(path)
    }

    fn filename_for(&self, bucket: &str, dir: &str, hash: &[u8]) -> PathBuf {
        self.root.join(bucket).join(dir).join(encode_hash(hash))
    }

    /// Returns a fresh, collision-free temp-file path under the store root.
    /// Callers own the file until a successful `put_message_for` transfers
    /// ownership, or must remove it themselves on any failure path.
    pub fn mktemp(&self) -> PathBuf {
        mktemp(&self.root)
    }

    /// Atomically promotes `temp_path` to its content-addressed location
    /// for `owner`, recording the expiry index entry first. Returns
    /// `Ok(true)` on success, `Ok(false)` if a message with the same hash
    /// already exists (the caller must remove `temp_path` itself in that
    /// case — see module docs on temp-file ownership).
    ///
    /// The index entry is appended *before* the rename, matching the
    /// reference protocol: a crash in between leaks an index entry
    /// pointing at nothing, which compaction silently tolerates, rather
    /// than leaking a file the index never learns about.
    ///
    /// Promotion itself uses `hard_link` rather than a plain `rename`: two
    /// concurrent puts for the same `(owner, hash)` both pass the
    /// existence check, but only one `hard_link` can win once the
    /// destination exists, giving real first-writer-wins exclusivity
    /// instead of a `rename`'s silent overwrite-on-race.
    ///
    /// Takes `hash`/`expiration` directly rather than a full [`Message`]:
    /// the write path never needs the body bytes again once they are
    /// durably on disk under `temp_path`, so there is no reason to make
    /// callers populate an unused `data` field just to satisfy the type.
    pub fn put_message_for(
        &self,
        owner: &str,
        hash: &[u8; 64],
        expiration: u64,
        temp_path: &Path,
    ) -> Result<bool, StoreError> {
        let (bucket, dir) = skiplist_for(owner);
        self.ensure_bucket_dir(&bucket, &dir)?;
        let final_path = self.filename_for(&bucket, &dir, hash);

        if final_path.exists() {
            return Ok(false);
        }

        self.index.append_entry(&final_path, expiration)?;

        match fs::hard_link(temp_path, &final_path) {
            Ok(()) => {
                let _ = fs::remove_file(temp_path);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Opens the file stored for `owner` at `hash` and invokes `visit`
    /// with it; `Ok(None)` if no such message is present.
    pub fn visit_by_hash_for<F, T>(
        &self,
        owner: &str,
        hash: &[u8],
        visit: F,
    ) -> Result<Option<T>, StoreError>
    where
        F: FnOnce(File) -> Result<T, StoreError>,
    {
        let (bucket, dir) = skiplist_for(owner);
        let path = self.filename_for(&bucket, &dir, hash);
        match File::open(&path) {
            Ok(f) => Ok(Some(visit(f)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Iterates every message currently stored for `owner`, in whatever
    /// order the filesystem returns directory entries (unspecified).
    pub fn iter_all_for(&self, owner: &str) -> Result<MessageIter, StoreError> {
        self.iter_since(owner, UNIX_EPOCH)
    }

    /// Iterates every message for `owner` whose mtime is not before the
    /// mtime of the message named by `hash` (the anchor message itself is
    /// included, by design, so repeated polls converge). `hash = None` is
    /// equivalent to [`SkiplistStore::iter_all_for`].
    ///
    /// If `hash` is given but no such message exists, this returns the
    /// underlying not-found error rather than an empty iterator — matching
    /// the reference store, which propagates the `stat` failure on the
    /// anchor lookup instead of treating a stale `lastHash` as "everything".
    pub fn iter_since_hash_for(
        &self,
        owner: &str,
        hash: Option<&[u8]>,
    ) -> Result<MessageIter, StoreError> {
        let Some(hash) = hash else {
            return self.iter_all_for(owner);
        };
        let (bucket, dir) = skiplist_for(owner);
        let anchor_path = self.filename_for(&bucket, &dir, hash);
        let since = fs::metadata(&anchor_path)?.modified()?;
        self.iter_since(owner, since)
    }

    fn iter_since(&self, owner: &str, since: SystemTime) -> Result<MessageIter, StoreError> {
        let (bucket, dir) = skiplist_for(owner);
        let dir_path = self.ensure_bucket_dir(&bucket, &dir)?;
        let entries = match fs::read_dir(&dir_path) {
            Ok(rd) => Some(rd),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        Ok(MessageIter {
            entries,
            since,
            expire_display_duration: self.expire_display_duration,
        })
    }

    /// Compacts the expiry index and deletes files whose expiration has
    /// passed; returns the number of entries expired. See [`crate::index`].
    pub fn expire(&self) -> Result<usize, StoreError> {
        self.index.expire()
    }
}

/// A lazy iterator over stored messages, yielding `Err` only for I/O
/// failures that are not simply "this file disappeared mid-iteration"
/// (that race is an accepted empty contribution, not an error, since
/// `Expire()` may run concurrently with a scan).
pub struct MessageIter {
    entries: Option<fs::ReadDir>,
    since: SystemTime,
    expire_display_duration: Duration,
}

impl Iterator for MessageIter {
    type Item = Result<Message, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let entries = self.entries.as_mut()?;
        loop {
            let entry = match entries.next()? {
                Ok(e) => e,
                Err(e) => return Some(Err(e.into())),
            };

            let path = entry.path();
            let metadata = match entry.metadata() {
                Ok(m) => m,
                // Disappeared between readdir and stat: treat as empty.
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Some(Err(e.into())),
            };

            let modified = match metadata.modified() {
                Ok(m) => m,
                Err(e) => return Some(Err(e.into())),
            };
            if modified < self.since {
                continue;
            }

            let name = match entry.file_name().into_string() {
                Ok(n) => n,
                Err(_) => continue,
            };
            let Some(hash) = decode_hash(&name) else {
                continue;
            };
            let Ok(hash) = <[u8; 64]>::try_from(hash.as_slice()) else {
                continue;
            };

            let data = match fs::read(&path) {
                Ok(d) => d,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Some(Err(e.into())),
            };

            let expiration = modified
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
                .saturating_add(self.expire_display_duration.as_secs());

            return Some(Ok(Message {
                hash,
                expiration,
                data,
            }));
        }
    }
}

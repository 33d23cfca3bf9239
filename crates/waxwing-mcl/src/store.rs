//! Path-keyed file store with staleness detection.
//!
//! A [`MclRegistry`] caches the decoded content of every file it opens,
//! keyed by absolute path. A cached entry is reused only while the file's
//! last-write time is unchanged; otherwise the file is re-read and
//! re-decoded. Reads are fail-soft: a missing, unreadable, or undecodable
//! file opens as empty content, so callers always get a usable (possibly
//! fresh) model to start from.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use crate::codec::{self, BlobCodec, NonceLayout, StoreKey};

/// How a file's content was obtained on open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provenance {
    /// Read from disk (or the up-to-date cache) and decoded.
    Disk,
    /// The file does not exist; content is empty.
    Missing,
    /// The file exists but could not be read or decoded; content is empty.
    Failed,
}

/// Open options for a container file.
#[derive(Clone, Debug, Default)]
pub struct MclOptions {
    pub codec: BlobCodec,
    pub password: Option<String>,
    pub nonce_layout: NonceLayout,
    /// Reuse the registry's cached content while the file is unchanged.
    pub use_cache: bool,
}

/// An open container file: decoded content plus the options to re-encode it.
#[derive(Clone, Debug)]
pub struct MclFile {
    path: PathBuf,
    options: MclOptions,
    pub content: Vec<u8>,
    pub provenance: Provenance,
}

impl MclFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &MclOptions {
        &self.options
    }
}

#[derive(Clone)]
struct CacheEntry {
    content: Vec<u8>,
    modified: Option<SystemTime>,
}

/// Process-wide store of open container files.
///
/// Owned explicitly by whoever drives persistence (no global state); one
/// registry per process is the expected shape, and its lock is what keeps
/// two saves from interleaving on the same path.
#[derive(Default)]
pub struct MclRegistry {
    files: Mutex<HashMap<PathBuf, CacheEntry>>,
}

impl MclRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a container file, decoding through the configured codec.
    ///
    /// Never fails: I/O and decode errors degrade to empty content with the
    /// failure recorded in [`MclFile::provenance`] and logged.
    pub fn open(&self, path: &Path, options: MclOptions) -> MclFile {
        let path = absolute(path);
        let key = StoreKey::derive(options.password.as_deref());
        let modified = modified_time(&path);

        if options.use_cache {
            let mut files = self.lock();
            let fresh = files
                .get(&path)
                .filter(|entry| modified.is_some() && entry.modified == modified)
                .map(|entry| entry.content.clone());
            match fresh {
                Some(content) => {
                    return MclFile {
                        content,
                        provenance: Provenance::Disk,
                        path,
                        options,
                    };
                }
                // Stale or absent: the file changed behind us.
                None => {
                    files.remove(&path);
                }
            }
        }

        let (content, provenance) = match std::fs::read(&path) {
            Ok(image) => match codec::decode(&image, &key, options.nonce_layout) {
                Ok(content) => (content, Provenance::Disk),
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "undecodable container file");
                    (Vec::new(), Provenance::Failed)
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                (Vec::new(), Provenance::Missing)
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "unreadable container file");
                (Vec::new(), Provenance::Failed)
            }
        };

        if options.use_cache && provenance == Provenance::Disk {
            self.lock().insert(
                path.clone(),
                CacheEntry {
                    content: content.clone(),
                    modified,
                },
            );
        }

        MclFile {
            path,
            options,
            content,
            provenance,
        }
    }

    /// A fresh handle for writing, without reading what is on disk.
    pub fn create(&self, path: &Path, options: MclOptions) -> MclFile {
        MclFile {
            path: absolute(path),
            options,
            content: Vec::new(),
            provenance: Provenance::Missing,
        }
    }

    /// Encode and write a file's content back to disk, replacing the file
    /// wholesale. A read-only permission bit is cleared first.
    ///
    /// Returns `false` (after logging) instead of propagating I/O errors.
    pub fn save(&self, file: &MclFile) -> bool {
        let key = StoreKey::derive(file.options.password.as_deref());
        let image = match codec::encode(
            &file.content,
            file.options.codec,
            &key,
            file.options.nonce_layout,
        ) {
            Ok(image) => image,
            Err(err) => {
                tracing::warn!(path = %file.path.display(), %err, "container encode failed");
                return false;
            }
        };

        let mut files = self.lock();
        clear_readonly(&file.path);
        if let Err(err) = std::fs::write(&file.path, &image) {
            tracing::warn!(path = %file.path.display(), %err, "container write dropped");
            return false;
        }
        files.insert(
            file.path.clone(),
            CacheEntry {
                content: file.content.clone(),
                modified: modified_time(&file.path),
            },
        );
        tracing::debug!(
            path = %file.path.display(),
            bytes = image.len(),
            codec = ?file.options.codec,
            "container file written"
        );
        true
    }

    /// Drop any cached entry for a path.
    pub fn evict(&self, path: &Path) {
        self.lock().remove(&absolute(path));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, CacheEntry>> {
        match self.files.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn clear_readonly(path: &Path) {
    if let Ok(metadata) = std::fs::metadata(path) {
        let mut permissions = metadata.permissions();
        if permissions.readonly() {
            #[allow(clippy::permissions_set_readonly_false)]
            permissions.set_readonly(false);
            if let Err(err) = std::fs::set_permissions(path, permissions) {
                tracing::warn!(path = %path.display(), %err, "could not clear read-only flag");
            }
        }
    }
}

//! On-disk cache of synthesized audio.
//!
//! Every key owns two files in a single flat directory:
//!
//! | Artifact | Path                          |
//! |----------|-------------------------------|
//! | final    | `<root>/<prefix>_<key>.wav`     |
//! | raw      | `<root>/<prefix>_<key>_raw.wav` |
//!
//! The final file existing *is* the cache record; there is no index.
//!
//! Writers never touch those paths directly. Output is produced into a
//! uniquely named staging file in the same directory ([`CacheStore::stage`])
//! and moved into place with a no-clobber rename ([`CacheStore::commit`]).
//! Readers therefore see either a complete artifact or none, and when two
//! processes race on the same key the first commit wins.

use std::{
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::{error::StoreError, key::CacheKey};

/// Which of a key's two artifacts a staging file is destined for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Raw,
    Final,
}

/// A staging file that has not been committed yet.
///
/// Backends write to [`Staged::path`]. Dropping it without calling
/// [`CacheStore::commit`] deletes the file.
#[derive(Debug)]
pub struct Staged {
    key: CacheKey,
    kind: ArtifactKind,
    file: NamedTempFile,
}

impl Staged {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Key-addressed artifact store rooted at an explicit directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    prefix: String,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self { root: root.into(), prefix: prefix.into() }
    }

    // ── Paths ────────────────────────────────────────────────────────────────

    pub fn final_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}_{}.wav", self.prefix, key))
    }

    pub fn raw_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}_{}_raw.wav", self.prefix, key))
    }

    fn path_for(&self, key: &CacheKey, kind: ArtifactKind) -> PathBuf {
        match kind {
            ArtifactKind::Raw => self.raw_path(key),
            ArtifactKind::Final => self.final_path(key),
        }
    }

    // ── Lookup ───────────────────────────────────────────────────────────────

    /// `true` iff the final artifact for `key` is a regular file we can open.
    pub fn exists(&self, key: &CacheKey) -> bool {
        is_readable_file(&self.final_path(key))
    }

    /// `true` iff the raw artifact for `key` is a regular file we can open.
    pub fn raw_exists(&self, key: &CacheKey) -> bool {
        is_readable_file(&self.raw_path(key))
    }

    /// Path of the final artifact.
    ///
    /// Nothing stops another process from deleting the file after this
    /// returns.
    pub fn read_final(&self, key: &CacheKey) -> Result<PathBuf, StoreError> {
        let path = self.final_path(key);
        if is_readable_file(&path) {
            Ok(path)
        } else {
            Err(StoreError::Missing { path })
        }
    }

    // ── Writes ───────────────────────────────────────────────────────────────

    /// Create an empty staging file next to the artifact `kind` of `key`.
    ///
    /// The `.wav` suffix is kept so that tools which sniff the format from the
    /// extension (SoX does) handle the staging path like the real one.
    pub fn stage(&self, key: &CacheKey, kind: ArtifactKind) -> Result<Staged, StoreError> {
        fs::create_dir_all(&self.root).map_err(|e| StoreError::io(&self.root, e))?;
        let prefix = match kind {
            ArtifactKind::Raw => format!(".{}_{}_raw.", self.prefix, key),
            ArtifactKind::Final => format!(".{}_{}.", self.prefix, key),
        };
        let file = shared_builder()
            .prefix(&prefix)
            .suffix(".tmp.wav")
            .tempfile_in(&self.root)
            .map_err(|e| StoreError::io(&self.root, e))?;
        debug!(path = %file.path().display(), "staging");
        Ok(Staged { key: key.clone(), kind, file })
    }

    /// Move a staging file to its key-derived path without clobbering.
    ///
    /// If the target already exists another writer got there first; its file
    /// is kept, ours is discarded, and the call still succeeds.
    pub fn commit(&self, staged: Staged) -> Result<PathBuf, StoreError> {
        let target = self.path_for(&staged.key, staged.kind);
        match staged.file.persist_noclobber(&target) {
            Ok(_) => {
                debug!(path = %target.display(), "committed");
                Ok(target)
            }
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                debug!(path = %target.display(), "already committed by another writer");
                Ok(target)
            }
            Err(e) => Err(StoreError::io(&target, e.error)),
        }
    }

    /// Copy `src` into the raw artifact slot of `key`.
    pub fn write_raw(&self, key: &CacheKey, src: &Path) -> Result<PathBuf, StoreError> {
        self.write_from(key, ArtifactKind::Raw, src)
    }

    /// Copy `src` into the final artifact slot of `key`.
    pub fn write_final(&self, key: &CacheKey, src: &Path) -> Result<PathBuf, StoreError> {
        self.write_from(key, ArtifactKind::Final, src)
    }

    fn write_from(
        &self,
        key: &CacheKey,
        kind: ArtifactKind,
        src: &Path,
    ) -> Result<PathBuf, StoreError> {
        let staged = self.stage(key, kind)?;
        fs::copy(src, staged.path()).map_err(|e| StoreError::io(src, e))?;
        self.commit(staged)
    }

    // ── Delivery ─────────────────────────────────────────────────────────────

    /// Copy the final artifact of `key` to `dest`, creating parent
    /// directories as needed. Returns the number of bytes copied.
    ///
    /// The copy goes to a temporary file beside `dest` first and is renamed
    /// over it, so `dest` never holds a partial file.
    pub fn deliver(&self, key: &CacheKey, dest: &Path) -> Result<u64, StoreError> {
        let src = self.read_final(key)?;
        let parent = parent_dir(dest);
        fs::create_dir_all(&parent).map_err(|e| StoreError::io(&parent, e))?;

        let mut reader = fs::File::open(&src).map_err(|e| StoreError::io(&src, e))?;
        let mut tmp = shared_builder()
            .tempfile_in(&parent)
            .map_err(|e| StoreError::io(&parent, e))?;
        let bytes = io::copy(&mut reader, tmp.as_file_mut()).map_err(|e| StoreError::io(dest, e))?;
        tmp.as_file().sync_all().map_err(|e| StoreError::io(dest, e))?;
        tmp.persist(dest).map_err(|e| StoreError::io(dest, e.error))?;
        Ok(bytes)
    }
}

/// A temp-file builder whose files get the mode of a plain `File::create`
/// (`0666 & !umask`) instead of tempfile's owner-only `0600`. The cache root
/// is shared between users, and a persisted staging file keeps its mode.
fn shared_builder<'a, 'b>() -> tempfile::Builder<'a, 'b> {
    let mut builder = tempfile::Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    builder
}

/// Parent directory of `path`, treating a bare file name as the current dir.
fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn is_readable_file(path: &Path) -> bool {
    path.is_file() && fs::File::open(path).is_ok()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

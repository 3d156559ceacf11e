//! Durable trader snapshots and the per-account run lock.
//!
//! The snapshot is an opaque binary at `persistence/<account>.storage`: one
//! schema version byte followed by a MessagePack body. It is rewritten
//! atomically (temp file, then rename); schema changes bump the version and
//! invalidate old files.

use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::debug;

use crate::errors::{Error, Result};
use crate::trader::{Checkpoint, Trader};

const SCHEMA_VERSION: u8 = 1;

pub fn persistence_file_name(account: &str) -> PathBuf {
    PathBuf::from(format!("persistence/{account}.storage"))
}

/// Handle on one account's snapshot file.
pub struct Snapshot {
    path: PathBuf,
}

impl Snapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_account(account: &str) -> Self {
        Self::new(persistence_file_name(account))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize the trader (sans exchange port) and atomically replace the
    /// snapshot file.
    pub fn store(&self, trader: &Trader) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| Error::Snapshot(e.to_string()))?;
        }

        let body = rmp_serde::to_vec_named(trader)?;
        let mut bytes = Vec::with_capacity(body.len() + 1);
        bytes.push(SCHEMA_VERSION);
        bytes.extend_from_slice(&body);

        let tmp = self.path.with_extension("storage.tmp");
        fs::write(&tmp, &bytes).map_err(|e| Error::Snapshot(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| Error::Snapshot(e.to_string()))?;
        debug!(
            "stored {} byte snapshot at {}",
            bytes.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Load the last stored trader. A missing file means `--init` has never
    /// run for this account and is fatal to `--monitor`.
    pub fn retrieve(&self) -> Result<Trader> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::SnapshotMissing(self.path.clone()))
            }
            Err(e) => return Err(Error::Snapshot(e.to_string())),
        };

        match bytes.split_first() {
            Some((&SCHEMA_VERSION, body)) => Ok(rmp_serde::from_slice(body)?),
            Some((&version, _)) => Err(Error::Snapshot(format!(
                "unsupported snapshot version {version} (expected {SCHEMA_VERSION})"
            ))),
            None => Err(Error::Snapshot("empty snapshot file".into())),
        }
    }
}

impl Checkpoint for Snapshot {
    fn save(&self, trader: &Trader) -> Result<()> {
        self.store(trader)
    }
}

/// Exclusive advisory lock serialising invocations per account. Two
/// concurrent runs for the same account would double-place orders; the
/// second fails fast instead. Released when dropped.
pub struct RunLock {
    _file: File,
}

impl RunLock {
    pub fn acquire(account: &str) -> Result<Self> {
        Self::acquire_path(
            PathBuf::from(format!("persistence/{account}.lock")),
            account,
        )
    }

    fn acquire_path(path: PathBuf, account: &str) -> Result<Self> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| Error::Io(e.to_string()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::Io(e.to_string()))?;
        match file.try_lock() {
            Ok(()) => Ok(Self { _file: file }),
            Err(TryLockError::WouldBlock) => Err(Error::Locked(account.to_string())),
            Err(TryLockError::Error(e)) => Err(Error::Io(e.to_string())),
        }
    }
}

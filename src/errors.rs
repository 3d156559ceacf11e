//! Error taxonomy shared across the crate.

use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong during one invocation.
///
/// `NotEnoughCoin` and `DustTrade` are recovered per rung while placing a
/// ladder; every other kind unwinds to the dispatcher, which logs it and
/// hands it to the admin notifier.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("not enough coin: {0}")]
    NotEnoughCoin(String),

    #[error("dust trade rejected by venue: {0}")]
    DustTrade(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("no snapshot at {}; run --init first", .0.display())]
    SnapshotMissing(PathBuf),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("another invocation holds the lock for account {0}")]
    Locked(String),

    #[error("i/o error: {0}")]
    Io(String),
}

impl Error {
    /// Placement failures a ladder absorbs by dropping the rung.
    pub fn is_recoverable_placement(&self) -> bool {
        matches!(self, Error::NotEnoughCoin(_) | Error::DustTrade(_))
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::InvalidConfig(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Error::Snapshot(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Error::Snapshot(err.to_string())
    }
}

/// Result type for grid trading operations.
pub type Result<T> = std::result::Result<T, Error>;

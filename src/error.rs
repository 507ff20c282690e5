//! Centralized error handling for Nestore.
//!
//! Every failure in the crate is a [`NestoreError`]. Nothing is retried
//! internally: the store surfaces each error to the immediate caller and the
//! write lock is released on every exit path before the error propagates.
//!
//! ## Error Categories
//!
//! - **Lock** ([`NestoreError::LockHeld`]): a mutating call found the sentinel
//!   of another writer.
//! - **Lookup** ([`NestoreError::NotFound`]): a delete or path read named a
//!   key the container does not hold.
//! - **I/O** ([`NestoreError::Io`]): permissions, disk full, missing files.
//! - **Encoding** ([`NestoreError::Serialization`], [`NestoreError::Compression`],
//!   [`NestoreError::Format`]): payload codec failures and file corruption.
//! - **Coercion** ([`NestoreError::Shape`], [`NestoreError::Unsupported`]):
//!   a value could not be turned into something the container can hold.
//!
//! ## Usage
//!
//! ```rust
//! use nestore::{Nestore, NestoreError};
//!
//! # let dir = tempfile::tempdir()?;
//! # let path = dir.path().join("missing.nst");
//! match Nestore::delete(&path, "absent") {
//!     Err(NestoreError::NotFound(key)) => println!("nothing stored under {key}"),
//!     Err(e) => eprintln!("other error: {e}"),
//!     Ok(_) => unreachable!(),
//! }
//! # Ok::<(), NestoreError>(())
//! ```

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

/// A specialized `Result` type for Nestore operations.
pub type Result<T> = std::result::Result<T, NestoreError>;

/// The master error enum covering all failure domains in Nestore.
///
/// The type is `Clone`; I/O errors are wrapped in an `Arc` so that errors raised
/// on rayon workers can be captured once and handed back to the caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NestoreError {
    /// A mutating operation found an existing lock sentinel.
    ///
    /// The payload is the sentinel path. The call did not touch the container.
    #[error("container is locked by another writer (sentinel {})", .0.display())]
    LockHeld(PathBuf),

    /// The requested key or path is not present in the container.
    #[error("key not found: {0}")]
    NotFound(String),

    /// Low-level filesystem failure, surfaced verbatim.
    #[error("I/O error: {0}")]
    Io(#[source] Arc<io::Error>),

    /// A payload record could not be encoded or decoded (bincode).
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A compression backend failed or an unknown algorithm id was found.
    #[error("compression error: {0}")]
    Compression(String),

    /// The file does not follow the container layout or is corrupted.
    #[error("format error: {0}")]
    Format(String),

    /// A sequence could not be turned into a fixed-shape array.
    #[error("shape error: {0}")]
    Shape(String),

    /// A value has no storable representation.
    #[error("unsupported value: {0}")]
    Unsupported(String),

    /// Logic error inside the chunk executor. Should not occur.
    #[error("internal error: {0}")]
    Internal(String),
}

impl NestoreError {
    /// Returns true for the `NotFound` condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if a writer lock blocked the operation.
    pub fn is_lock_held(&self) -> bool {
        matches!(self, Self::LockHeld(_))
    }
}

impl From<io::Error> for NestoreError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<bincode::error::EncodeError> for NestoreError {
    fn from(err: bincode::error::EncodeError) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for NestoreError {
    fn from(err: bincode::error::DecodeError) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for NestoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

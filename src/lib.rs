//! # Nestore
//!
//! Persistence for nested dictionaries of scalars, strings and numeric arrays
//! in a single hierarchical container file.
//!
//! ## Overview
//!
//! A container is a tree: groups hold named children, leaves hold one value.
//! Each top-level key of a written [`Dict`] becomes one subtree and is
//! replaced wholesale on every write. Values go through a fixed set of
//! coercions on the way in (see [`normalize`]): sequences become arrays,
//! user objects are resolved through the [`Storable`] capabilities, and
//! byte strings come back as text.
//!
//! *   **Fail-fast locking:** mutating calls create a sentinel file next to the
//!     container (`data.nst` → `data.lock`) and fail with
//!     [`NestoreError::LockHeld`] while it exists. Reads never lock.
//! *   **Parallel encoding:** chunks of one write are encoded and compressed
//!     concurrently using Rayon, bottom-up.
//! *   **Zero-copy reads:** the reader memory-maps the file and decodes only
//!     the subtrees that are asked for.
//! *   **Summaries:** [`summarize`] and [`render`] print a compact view of a
//!     nested structure with shapes and formatted numbers.
//!
//! ## File Format
//!
//! The physical layout follows a "children-first" ordering:
//! ```text
//! [Leaf Chunk] [Leaf Chunk] ... [Group Chunk] [Root Group Chunk] [Global Header]
//! ```
//!
//! Each chunk is self-contained:
//! ```text
//! [Payload] [Children Table + Count (groups only)] [MetaByte]
//! ```
//!
//! The Global Header at the end of the file points to the root group and
//! carries a checksum of it. Since the layout is append-only, every write
//! produces a new file: untouched subtrees are copied over chunk by chunk
//! without decoding, then the new file is renamed over the old one.
//!
//! ## Usage
//!
//! ```rust
//! use nestore::{dict, Nestore, Value};
//!
//! # let dir = tempfile::tempdir()?;
//! let path = dir.path().join("run.nst");
//!
//! Nestore::write(&path, dict([("x", vec![1i64, 2, 3]), ("y", vec![4, 5, 6])]))?;
//! Nestore::write(&path, dict([("y", Value::None)]))?;
//!
//! let keys = Nestore::list_keys(&path)?;
//! assert_eq!(keys.into_iter().collect::<Vec<_>>(), ["x"]);
//!
//! let data = Nestore::read(&path, "x")?;
//! let x = data["x"].as_array().and_then(|a| a.as_i64());
//! assert_eq!(x, Some(&[1i64, 2, 3][..]));
//! # Ok::<(), nestore::NestoreError>(())
//! ```
//!
//! ### Safety and Error Handling
//!
//! * **Encapsulated Unsafe:** the only `unsafe` is the memory map in the
//!   `reader` module.
//! * **No Panics:** no `unwrap()` or `panic!()` in the library (enforced by
//!   clippy lints).
//! * **Comprehensive Errors:** all failures correspond to a [`NestoreError`].

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// --- PUBLIC API MODULES ---
pub mod api;
pub mod array;
pub mod compression;
pub mod error;
pub mod format;
pub mod inspector;
pub mod lock;
pub mod normalize;
pub mod reader;
pub mod summary;
pub mod value;

// --- INTERNAL IMPLEMENTATION MODULES (Hidden from Docs) ---
#[doc(hidden)]
pub mod executor;
#[doc(hidden)]
pub mod graph;
#[doc(hidden)]
pub mod io;

mod writer;

// --- RE-EXPORTS ---

#[cfg(feature = "lz4_flex")]
pub use compression::Lz4Compressor;
pub use compression::{Compressor, NoCompression};

pub use api::{Nestore, NestoreOptions};
pub use array::{Array, ArrayData, DType};
pub use error::{NestoreError, Result};
pub use inspector::{ContainerReport, NodeInfo};
pub use lock::{LockFile, LockGuard};
pub use normalize::{normalize, normalized};
pub use reader::{ContainerReader, KeySelection};
pub use summary::{Summary, render, summarize};
pub use value::{Dict, Storable, Value, dict};

//! Core graph definitions for the chunk writer.
//!
//! A write call turns the new container tree into a `TaskGraph`: one node per
//! group or leaf, edges from children to their parent group. The executor
//! runs it bottom-up so every group is written after all of its children.

/// Defines the `TaskGraph` and `Node` structures.
pub mod core;
/// Defines the `ChunkId` type.
pub mod id;
/// Defines the `ChunkJob` trait and `JobConfig`.
pub mod job;

pub use core::{Node, TaskGraph};
pub use id::ChunkId;
pub use job::{ChunkJob, JobConfig};

use std::borrow::Cow;

use crate::error::Result;
use crate::format::NodeKind;

/// Execution configuration for a specific node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobConfig {
    /// Compression algorithm ID.
    /// 0 = No Compression (Default)
    /// 1 = Lz4 (if feature enabled)
    pub compression_id: u8,
    /// The payload is already encoded with `compression_id`; the executor
    /// must write it as-is. Used for chunks carried over from a previous file.
    pub precompressed: bool,
}

/// A unit of work: one chunk's payload.
///
/// # Lifetimes
/// * `'a`: The lifetime of the data being written. Jobs borrow the caller's
///   values or the previous file's mapped bytes instead of copying them.
pub trait ChunkJob<'a>: Send + Sync {
    /// Group or leaf.
    fn kind(&self) -> NodeKind;

    /// Produces the raw (uncompressed unless `precompressed`) payload bytes.
    fn execute(&self) -> Result<Cow<'a, [u8]>>;

    /// Returns an estimated size in bytes for logging and scheduling.
    fn estimated_size(&self) -> usize;

    /// Returns the specific configuration for this job.
    fn config(&self) -> JobConfig {
        JobConfig::default()
    }
}

impl<'a> std::fmt::Debug for Box<dyn ChunkJob<'a> + 'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ChunkJob(kind={:?}, size={}, algo={})",
            self.kind(),
            self.estimated_size(),
            self.config().compression_id
        )
    }
}

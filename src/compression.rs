//! Pluggable compression backend.
//!
//! Array leaves are compressed before they hit the disk; scalars and group
//! headers are stored raw. The algorithm id lives in the chunk's `MetaByte`,
//! so a file written with one backend can be read by any build that has it
//! registered.

use crate::error::{NestoreError, Result};
use std::borrow::Cow;

/// Interface for compression algorithms.
///
/// Each compressor is identified by a unique ID (0-7).
pub trait Compressor: Send + Sync + std::fmt::Debug {
    /// Returns the unique ID stored in the `MetaByte` (Bits 1-3).
    /// 0 is reserved for No-Compression.
    fn id(&self) -> u8;

    /// Human-readable algorithm name.
    fn name(&self) -> &'static str;

    /// Compresses the data.
    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>>;

    /// Decompresses the data.
    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>>;
}

// --- No Compression (Pass-through) ---

/// A compressor that performs no compression (ID 0).
#[derive(Debug, Clone, Copy)]
pub struct NoCompression;

impl Compressor for NoCompression {
    fn id(&self) -> u8 {
        0
    }

    fn name(&self) -> &'static str {
        "None"
    }

    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        Ok(Cow::Borrowed(data))
    }

    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        Ok(Cow::Borrowed(data))
    }
}

// --- LZ4 Implementation ---

#[cfg(feature = "lz4_flex")]
/// A compressor using the LZ4 block format with a size prefix (ID 1).
#[derive(Debug, Clone, Copy)]
pub struct Lz4Compressor;

#[cfg(feature = "lz4_flex")]
impl Compressor for Lz4Compressor {
    fn id(&self) -> u8 {
        1
    }

    fn name(&self) -> &'static str {
        "LZ4"
    }

    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        Ok(Cow::Owned(lz4_flex::compress_prepend_size(data)))
    }

    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        let vec = lz4_flex::decompress_size_prepended(data)
            .map_err(|e| NestoreError::Compression(e.to_string()))?;
        Ok(Cow::Owned(vec))
    }
}

// --- REGISTRY ---

/// Maps algorithm IDs stored in the file to `Compressor` implementations.
#[derive(Debug)]
pub struct CompressorRegistry {
    algorithms: Vec<Option<Box<dyn Compressor>>>,
}

impl CompressorRegistry {
    /// Creates a new registry with default algorithms registered.
    ///
    /// *   ID 0: `NoCompression`
    /// *   ID 1: `Lz4Compressor` (if `lz4_flex` feature is enabled)
    pub fn new() -> Self {
        let mut reg = Self {
            algorithms: (0..8).map(|_| None).collect(),
        };

        reg.register(Box::new(NoCompression));

        #[cfg(feature = "lz4_flex")]
        reg.register(Box::new(Lz4Compressor));

        reg
    }

    /// Registers a compressor in the slot given by its ID, replacing any
    /// previous entry.
    pub fn register(&mut self, algo: Box<dyn Compressor>) {
        let id = usize::from(algo.id());
        if id >= self.algorithms.len() {
            self.algorithms.resize_with(id + 1, || None);
        }
        if let Some(slot) = self.algorithms.get_mut(id) {
            *slot = Some(algo);
        }
    }

    /// Retrieves a compressor by its ID.
    ///
    /// # Errors
    /// Returns `NestoreError::Compression` if the ID is not registered.
    pub fn get(&self, id: u8) -> Result<&dyn Compressor> {
        if let Some(algo) = self
            .algorithms
            .get(usize::from(id))
            .and_then(|opt| opt.as_ref())
        {
            return Ok(algo.as_ref());
        }

        Err(NestoreError::Compression(format!(
            "Algorithm ID {} is not registered or available",
            id
        )))
    }

    /// ID of the best available compressor for array payloads.
    pub fn preferred_id(&self) -> u8 {
        #[cfg(feature = "lz4_flex")]
        {
            Lz4Compressor.id()
        }
        #[cfg(not(feature = "lz4_flex"))]
        {
            NoCompression.id()
        }
    }

    /// Display name for an algorithm ID, including unregistered ones.
    pub fn name_of(&self, id: u8) -> String {
        match self.get(id) {
            Ok(algo) => algo.name().to_string(),
            Err(_) => format!("Unknown({id})"),
        }
    }
}

impl Default for CompressorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_id_is_rejected() {
        let reg = CompressorRegistry::new();
        assert!(matches!(reg.get(7), Err(NestoreError::Compression(_))));
        assert_eq!(reg.name_of(7), "Unknown(7)");
    }

    #[test]
    fn passthrough_borrows() -> Result<()> {
        let reg = CompressorRegistry::new();
        let algo = reg.get(0)?;
        assert!(matches!(algo.compress(b"abc")?, Cow::Borrowed(_)));
        Ok(())
    }

    #[cfg(feature = "lz4_flex")]
    #[test]
    fn lz4_shrinks_repetitive_payloads() -> Result<()> {
        let reg = CompressorRegistry::new();
        let algo = reg.get(reg.preferred_id())?;
        let data = vec![7u8; 4096];
        let packed = algo.compress(&data)?;
        assert!(packed.len() < data.len());
        assert_eq!(algo.decompress(&packed)?.as_ref(), &data[..]);
        Ok(())
    }
}

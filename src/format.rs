//! Defines the physical binary layout of Nestore container files.
//!
//! # Layout Strategy
//! The file consists of a sequence of chunks written bottom-up (children first),
//! followed by a Global Header at the very end of the file.
//!
//! File: `[Chunk 0] [Chunk 1] ... [Root Group Chunk] [Global Header]`
//!
//! ## Chunk Anatomy
//! Group chunk: `[ Payload ] [ ChildRef * N ] [ u32 N ] [ MetaByte ]`
//!
//! Leaf chunk: `[ Payload ] [ MetaByte ]`
//!
//! A group payload is the bincode-encoded [`GroupRecord`]: the child keys in
//! the same order as the children table. A leaf payload is a possibly
//! compressed bincode-encoded [`LeafRecord`].

use std::hash::Hasher;

use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use crate::array::Array;
use crate::error::{NestoreError, Result};

/// Magic bytes identifying the file format: "NST1".
pub const MAGIC_BYTES: [u8; 4] = *b"NST1";

/// Current format version.
pub const FORMAT_VERSION: u16 = 1;

/// The fixed size of the Global Header.
/// Magic(4) + Version(2) + RootOffset(8) + RootLength(8) + Checksum(4) = 26
pub const GLOBAL_HEADER_SIZE: usize = 26;

/// Kind of node a chunk holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeKind {
    /// Named children, no value.
    Group,
    /// A scalar or array value, no children.
    Leaf,
}

/// Configuration flags for a specific chunk, stored in its last byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaByte(u8);

impl MetaByte {
    const GROUP_MASK: u8 = 0b0000_0001; // Bit 0
    const COMPRESSION_MASK: u8 = 0b0000_1110; // Bits 1-3

    /// Creates a new MetaByte.
    pub fn new(kind: NodeKind, compression_id: u8) -> Self {
        let mut byte = 0;
        if kind == NodeKind::Group {
            byte |= Self::GROUP_MASK;
        }
        byte |= (compression_id & 0x07) << 1;
        Self(byte)
    }

    /// Decodes the byte.
    pub fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    /// Node kind. Groups carry a children table.
    pub fn kind(&self) -> NodeKind {
        if (self.0 & Self::GROUP_MASK) != 0 {
            NodeKind::Group
        } else {
            NodeKind::Leaf
        }
    }

    /// Returns the compression algorithm ID (0-7).
    pub fn compression_method(&self) -> u8 {
        (self.0 & Self::COMPRESSION_MASK) >> 1
    }

    /// Returns the raw byte representation.
    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

/// Reference to a child chunk stored within a group chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildRef {
    /// Absolute offset in the file where the child chunk starts.
    pub offset: u64,
    /// Total length of the child chunk (including meta-byte).
    pub length: u64,
}

impl ChildRef {
    /// The size in bytes of a serialized ChildRef.
    pub const SIZE: usize = 16;

    /// Serializes to a fixed-size byte array (Little Endian).
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.offset.to_le_bytes());
        buf[8..16].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    /// Deserializes from a byte slice of at least [`ChildRef::SIZE`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            offset: read_u64(bytes, 0)?,
            length: read_u64(bytes, 8)?,
        })
    }
}

/// The Global Header located at the very end of the file.
/// It points to the root group chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalHeader {
    /// Format identifier.
    pub magic: [u8; 4],
    /// Format version.
    pub version: u16,
    /// Offset of the root group chunk.
    pub root_offset: u64,
    /// Length of the root group chunk.
    pub root_length: u64,
    /// [`chunk_checksum`] of the root chunk bytes.
    pub checksum: u32,
}

impl GlobalHeader {
    /// Creates a header for a root chunk.
    pub fn new(root: ChildRef, checksum: u32) -> Self {
        Self {
            magic: MAGIC_BYTES,
            version: FORMAT_VERSION,
            root_offset: root.offset,
            root_length: root.length,
            checksum,
        }
    }

    /// Location of the root chunk.
    pub fn root(&self) -> ChildRef {
        ChildRef {
            offset: self.root_offset,
            length: self.root_length,
        }
    }

    /// Serializes the header to bytes.
    pub fn to_bytes(&self) -> [u8; GLOBAL_HEADER_SIZE] {
        let mut buf = [0u8; GLOBAL_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6..14].copy_from_slice(&self.root_offset.to_le_bytes());
        buf[14..22].copy_from_slice(&self.root_length.to_le_bytes());
        buf[22..26].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Parses and validates magic and version.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < GLOBAL_HEADER_SIZE {
            return Err(NestoreError::Format("Buffer too small for header".into()));
        }
        if bytes[0..4] != MAGIC_BYTES {
            return Err(NestoreError::Format("Invalid Magic Bytes".into()));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(NestoreError::Format(format!(
                "Unsupported version: {version}"
            )));
        }
        Ok(Self {
            magic: MAGIC_BYTES,
            version,
            root_offset: read_u64(bytes, 6)?,
            root_length: read_u64(bytes, 14)?,
            checksum: read_u32(bytes, 22)?,
        })
    }
}

/// Payload of a group chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    /// Child keys, parallel to the children table.
    pub keys: Vec<String>,
}

/// Payload of a leaf chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LeafRecord {
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Float scalar.
    Float(f64),
    /// Text scalar.
    Str(String),
    /// Byte-string scalar; decoded to text on read.
    Bytes(Vec<u8>),
    /// Fixed-shape array.
    Array(Array),
}

/// Checksum stored in the header: low 32 bits of xxHash64 over the root chunk.
pub fn chunk_checksum(bytes: &[u8]) -> u32 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(bytes);
    (hasher.finish() & u64::from(u32::MAX)) as u32
}

/// Encodes a payload record with the crate-wide bincode configuration.
pub fn encode_record<T: Serialize>(record: &T) -> Result<Vec<u8>> {
    Ok(bincode::serde::encode_to_vec(
        record,
        bincode::config::standard(),
    )?)
}

/// Decodes a payload record.
pub fn decode_record<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let (record, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(record)
}

pub(crate) fn read_u64(bytes: &[u8], at: usize) -> Result<u64> {
    bytes
        .get(at..at + 8)
        .and_then(|s| s.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or_else(|| NestoreError::Format(format!("truncated u64 at byte {at}")))
}

pub(crate) fn read_u32(bytes: &[u8], at: usize) -> Result<u32> {
    bytes
        .get(at..at + 4)
        .and_then(|s| s.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| NestoreError::Format(format!("truncated u32 at byte {at}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_byte_packs_kind_and_algorithm() {
        let m = MetaByte::new(NodeKind::Group, 1);
        assert_eq!(m.kind(), NodeKind::Group);
        assert_eq!(m.compression_method(), 1);
        let decoded = MetaByte::from_byte(MetaByte::new(NodeKind::Leaf, 0).as_u8());
        assert_eq!(decoded.kind(), NodeKind::Leaf);
        assert_eq!(decoded.compression_method(), 0);
    }

    #[test]
    fn header_rejects_foreign_magic() {
        let mut bytes = GlobalHeader::new(ChildRef { offset: 0, length: 5 }, 7).to_bytes();
        assert_eq!(GlobalHeader::from_bytes(&bytes).map(|h| h.checksum).ok(), Some(7));
        bytes[0] = b'X';
        assert!(matches!(
            GlobalHeader::from_bytes(&bytes),
            Err(NestoreError::Format(_))
        ));
    }

    #[test]
    fn truncated_child_ref_is_format_error() {
        assert!(ChildRef::from_bytes(&[0u8; 10]).is_err());
    }
}

//! The Read-Side Engine.
//!
//! Memory-maps a container, validates the global header and gives random
//! access to groups and leaves. Reads never take the write lock: a reader
//! keeps its own mapping, so a writer replacing the file underneath it does
//! not disturb a read already in progress.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::debug;

use crate::array::Array;
use crate::compression::CompressorRegistry;
use crate::error::{NestoreError, Result};
use crate::format::{
    ChildRef, GLOBAL_HEADER_SIZE, GlobalHeader, GroupRecord, LeafRecord, MetaByte, NodeKind,
    chunk_checksum, decode_record, read_u32,
};
use crate::value::{Dict, Value};

/// Which top-level keys a read should return.
///
/// The filter applies to the first level only; a selected group is always
/// read in full.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KeySelection {
    /// Every top-level key.
    #[default]
    All,
    /// A single key.
    One(String),
    /// Any key in the set.
    Many(BTreeSet<String>),
}

impl KeySelection {
    /// True if `key` passes the filter.
    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::All => true,
            Self::One(k) => k == key,
            Self::Many(set) => set.contains(key),
        }
    }
}

impl From<&str> for KeySelection {
    fn from(key: &str) -> Self {
        Self::One(key.to_owned())
    }
}

impl From<String> for KeySelection {
    fn from(key: String) -> Self {
        Self::One(key)
    }
}

impl From<BTreeSet<String>> for KeySelection {
    fn from(keys: BTreeSet<String>) -> Self {
        Self::Many(keys)
    }
}

impl From<Vec<&str>> for KeySelection {
    fn from(keys: Vec<&str>) -> Self {
        Self::Many(keys.into_iter().map(str::to_owned).collect())
    }
}

impl<T: Into<KeySelection>> From<Option<T>> for KeySelection {
    fn from(keys: Option<T>) -> Self {
        keys.map_or(Self::All, Into::into)
    }
}

/// The main handle for reading a container file.
#[derive(Debug)]
pub struct ContainerReader {
    path: PathBuf,
    mmap: Mmap,
    header: GlobalHeader,
    file_size: u64,
    registry: CompressorRegistry,
}

/// A view into a specific chunk within the file.
/// Lightweight: it points into the mapping, it does not own data.
#[derive(Debug, Clone)]
pub struct ChunkNode<'a> {
    reader: &'a ContainerReader,
    offset: u64,
    length: u64,
    meta: MetaByte,
    child_count: u32,
    payload_end_offset: u64,
}

impl ContainerReader {
    /// Opens a container file and validates its header and root checksum.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < GLOBAL_HEADER_SIZE as u64 {
            return Err(NestoreError::Format("File smaller than header".into()));
        }

        // Safety: the mapping is read-only. Writers never modify a published
        // container in place; they rename a fresh file over it.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };

        let header_start = mmap.len() - GLOBAL_HEADER_SIZE;
        let header = GlobalHeader::from_bytes(&mmap[header_start..])?;

        let reader = Self {
            path: path.to_path_buf(),
            mmap,
            header,
            file_size,
            registry: CompressorRegistry::new(),
        };

        let root = reader.chunk_bytes(header.root())?;
        if chunk_checksum(root) != header.checksum {
            return Err(NestoreError::Format("Root chunk checksum mismatch".into()));
        }
        debug!(path = %reader.path.display(), file_size, "container opened");
        Ok(reader)
    }

    /// Path this reader was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total size of the file on disk.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// The parsed global header.
    pub fn header(&self) -> &GlobalHeader {
        &self.header
    }

    /// Decompression backends.
    pub fn registry(&self) -> &CompressorRegistry {
        &self.registry
    }

    /// Returns a view of the root group.
    pub fn root(&self) -> Result<ChunkNode<'_>> {
        let root = self.get_chunk(self.header.root())?;
        if root.kind() != NodeKind::Group {
            return Err(NestoreError::Format("Root chunk is not a group".into()));
        }
        Ok(root)
    }

    /// Top-level keys, read from the root group header only.
    pub fn list_keys(&self) -> Result<BTreeSet<String>> {
        Ok(self.root()?.keys()?.into_iter().collect())
    }

    /// Reconstructs the container contents, filtered at the top level.
    pub fn read(&self, selection: &KeySelection) -> Result<Dict> {
        let mut data = Dict::new();
        for (key, node) in self.root()?.entries()? {
            if !selection.matches(&key) {
                continue;
            }
            data.insert(key, node.to_value()?);
        }
        Ok(data)
    }

    /// Reads the node at a slash-separated path such as `"scan/trace/x"`.
    ///
    /// An empty path (or `"/"`) returns the whole container as a dict.
    pub fn read_path(&self, node_path: &str) -> Result<Value> {
        self.node_at(node_path)?.to_value()
    }

    /// Locates the chunk at a slash-separated path.
    pub fn node_at(&self, node_path: &str) -> Result<ChunkNode<'_>> {
        let mut node = self.root()?;
        for segment in node_path.split('/').filter(|s| !s.is_empty()) {
            node = node
                .child(segment)?
                .ok_or_else(|| NestoreError::NotFound(node_path.to_string()))?;
        }
        Ok(node)
    }

    /// Retrieves any chunk by its physical reference.
    pub fn get_chunk(&self, loc: ChildRef) -> Result<ChunkNode<'_>> {
        let bytes = self.chunk_bytes(loc)?;
        let (&meta_byte_val, _) = bytes
            .split_last()
            .ok_or_else(|| NestoreError::Format("Empty chunk".into()))?;
        let meta = MetaByte::from_byte(meta_byte_val);

        // Layout: [Payload] ... [ChildRef * N] [u32 Count] [MetaByte]
        let mut child_count = 0;
        let mut payload_len = loc.length - 1;

        if meta.kind() == NodeKind::Group {
            if loc.length < 5 {
                return Err(NestoreError::Format("Chunk too small for metadata".into()));
            }
            let count_start = bytes.len() - 5;
            child_count = read_u32(bytes, count_start)?;

            let table = u64::from(child_count) * ChildRef::SIZE as u64 + 5;
            if loc.length < table {
                return Err(NestoreError::Format(
                    "Invalid child count for chunk size".into(),
                ));
            }
            payload_len = loc.length - table;
        }

        Ok(ChunkNode {
            reader: self,
            offset: loc.offset,
            length: loc.length,
            meta,
            child_count,
            payload_end_offset: loc.offset + payload_len,
        })
    }

    fn chunk_bytes(&self, loc: ChildRef) -> Result<&[u8]> {
        let data_end = self.file_size - GLOBAL_HEADER_SIZE as u64;
        let end = loc
            .offset
            .checked_add(loc.length)
            .filter(|end| *end <= data_end && loc.length > 0)
            .ok_or_else(|| NestoreError::Format("Chunk out of file bounds".into()))?;
        Ok(&self.mmap[loc.offset as usize..end as usize])
    }
}

impl<'a> ChunkNode<'a> {
    /// Absolute offset of the chunk.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Total length of the chunk on disk.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// The chunk's flag byte.
    pub fn meta(&self) -> MetaByte {
        self.meta
    }

    /// Group or leaf.
    pub fn kind(&self) -> NodeKind {
        self.meta.kind()
    }

    /// Number of children (0 for leaves).
    pub fn child_count(&self) -> u32 {
        self.child_count
    }

    /// Size of the stored (possibly compressed) payload.
    pub fn payload_len(&self) -> u64 {
        self.payload_end_offset - self.offset
    }

    /// Stored payload bytes, still compressed.
    pub fn raw_payload(&self) -> &'a [u8] {
        &self.reader.mmap[self.offset as usize..self.payload_end_offset as usize]
    }

    /// Decompresses and returns the payload.
    pub fn read_payload(&self) -> Result<Cow<'a, [u8]>> {
        let algo = self.reader.registry.get(self.meta.compression_method())?;
        algo.decompress(self.raw_payload())
    }

    /// Keys of a group, parallel to [`children`](Self::children).
    pub fn keys(&self) -> Result<Vec<String>> {
        self.expect_group()?;
        let record: GroupRecord = decode_record(&self.read_payload()?)?;
        if record.keys.len() != self.child_count as usize {
            return Err(NestoreError::Format(format!(
                "Group lists {} keys but has {} children",
                record.keys.len(),
                self.child_count
            )));
        }
        Ok(record.keys)
    }

    /// Views of all children, in table order.
    pub fn children(&self) -> Result<Vec<ChunkNode<'a>>> {
        (0..self.child_count as usize)
            .map(|i| self.get_child(i))
            .collect()
    }

    /// Key/child pairs of a group.
    pub fn entries(&self) -> Result<Vec<(String, ChunkNode<'a>)>> {
        let keys = self.keys()?;
        let children = self.children()?;
        Ok(keys.into_iter().zip(children).collect())
    }

    /// The child stored under `key`, if any.
    pub fn child(&self, key: &str) -> Result<Option<ChunkNode<'a>>> {
        if self.kind() != NodeKind::Group {
            return Ok(None);
        }
        match self.keys()?.iter().position(|k| k == key) {
            Some(index) => self.get_child(index).map(Some),
            None => Ok(None),
        }
    }

    /// O(1) access to the n-th child without parsing the whole table.
    pub fn get_child(&self, index: usize) -> Result<ChunkNode<'a>> {
        if index >= self.child_count as usize {
            return Err(NestoreError::Format("Index out of bounds".into()));
        }
        let entry_start = self.payload_end_offset as usize + index * ChildRef::SIZE;
        let entry_bytes = self
            .reader
            .mmap
            .get(entry_start..entry_start + ChildRef::SIZE)
            .ok_or_else(|| NestoreError::Format("Children table out of bounds".into()))?;
        let child_ref = ChildRef::from_bytes(entry_bytes)?;
        // Children are always written before their parent. Anything else is a
        // corrupt table and could loop back to an ancestor.
        let child_end = child_ref.offset.checked_add(child_ref.length);
        if child_end.is_none_or(|end| end > self.offset) {
            return Err(NestoreError::Format(format!(
                "Child {index} of chunk at {} does not precede its parent",
                self.offset
            )));
        }
        self.reader.get_chunk(child_ref)
    }

    /// Decodes a leaf payload.
    pub fn leaf_record(&self) -> Result<LeafRecord> {
        if self.kind() != NodeKind::Leaf {
            return Err(NestoreError::Format(format!(
                "Chunk at {} is a group, not a leaf",
                self.offset
            )));
        }
        decode_record(&self.read_payload()?)
    }

    /// Recursively reconstructs this node: groups become dicts, leaves their
    /// native value. Byte-string leaves are decoded to text.
    pub fn to_value(&self) -> Result<Value> {
        match self.kind() {
            NodeKind::Group => {
                let mut data = Dict::new();
                for (key, child) in self.entries()? {
                    data.insert(key, child.to_value()?);
                }
                Ok(Value::Dict(data))
            }
            NodeKind::Leaf => leaf_to_value(self.leaf_record()?),
        }
    }

    fn expect_group(&self) -> Result<()> {
        match self.kind() {
            NodeKind::Group => Ok(()),
            NodeKind::Leaf => Err(NestoreError::Format(format!(
                "Chunk at {} is a leaf, not a group",
                self.offset
            ))),
        }
    }
}

fn leaf_to_value(record: LeafRecord) -> Result<Value> {
    Ok(match record {
        LeafRecord::Bool(b) => Value::Bool(b),
        LeafRecord::Int(i) => Value::Int(i),
        LeafRecord::Float(f) => Value::Float(f),
        LeafRecord::Str(s) => Value::Str(s),
        LeafRecord::Bytes(b) => Value::Str(
            String::from_utf8(b)
                .map_err(|e| NestoreError::Format(format!("byte leaf is not UTF-8: {e}")))?,
        ),
        LeafRecord::Array(a) => {
            let (shape, data) = a.into_parts();
            Value::Array(Array::from_shape(shape, data)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_conversions() {
        assert!(KeySelection::from("x").matches("x"));
        assert!(!KeySelection::from("x").matches("y"));
        let many = KeySelection::from(vec!["a", "b"]);
        assert!(many.matches("b") && !many.matches("c"));
        assert_eq!(KeySelection::from(None::<&str>), KeySelection::All);
    }

    #[test]
    fn byte_leaves_decode_to_text() {
        let v = leaf_to_value(LeafRecord::Bytes(b"volts".to_vec())).ok();
        assert_eq!(v, Some(Value::Str("volts".into())));
        assert!(leaf_to_value(LeafRecord::Bytes(vec![0xff, 0xfe])).is_err());
    }

    #[test]
    fn cyclic_children_table_is_format_error() -> Result<()> {
        use crate::format::{MetaByte, encode_record};

        // A root group whose only child points back at the root itself.
        let payload = encode_record(&GroupRecord {
            keys: vec!["loop".into()],
        })?;
        let length = (payload.len() + ChildRef::SIZE + 4 + 1) as u64;
        let mut chunk = payload;
        chunk.extend_from_slice(&ChildRef { offset: 0, length }.to_bytes());
        chunk.extend_from_slice(&1u32.to_le_bytes());
        chunk.push(MetaByte::new(NodeKind::Group, 0).as_u8());

        let header = GlobalHeader::new(ChildRef { offset: 0, length }, chunk_checksum(&chunk));
        let mut file = chunk;
        file.extend_from_slice(&header.to_bytes());

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cycle.nst");
        std::fs::write(&path, file)?;

        let reader = ContainerReader::open(&path)?;
        assert_eq!(reader.list_keys()?.len(), 1);
        assert!(matches!(
            reader.read(&KeySelection::All),
            Err(NestoreError::Format(_))
        ));
        assert!(matches!(
            reader.read_path("loop/loop"),
            Err(NestoreError::Format(_))
        ));
        Ok(())
    }

    #[test]
    fn garbage_file_is_format_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("junk.nst");
        std::fs::write(&path, vec![0u8; 64])?;
        assert!(matches!(
            ContainerReader::open(&path),
            Err(NestoreError::Format(_))
        ));
        Ok(())
    }
}

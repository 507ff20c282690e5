//! Tools for inspecting the physical structure of a container file.
//! Useful for checking what got compressed and where the bytes went.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::array::format_shape;
use crate::error::Result;
use crate::format::{LeafRecord, NodeKind};
use crate::reader::{ChunkNode, ContainerReader};

/// A structural report of a container file.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerReport {
    /// Total size of the file on disk.
    pub file_size: u64,
    /// Offset where the root chunk starts.
    pub root_offset: u64,
    /// Format version from the global header.
    pub version: u16,
    /// The hierarchical tree of nodes.
    pub tree: NodeInfo,
}

/// Metadata for a single stored node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeInfo {
    /// Key under which the node is stored; `/` for the root.
    pub key: String,
    /// Group or leaf.
    pub kind: NodeKind,
    /// Size of the (possibly compressed) payload.
    pub payload_size: u64,
    /// Compression algorithm used for the payload.
    pub compression_algo: String,
    /// Number of children.
    pub child_count: u32,
    /// What a leaf holds, e.g. `Array<float64> shape (3,)`.
    pub description: Option<String>,
    /// Child nodes, in key order.
    pub children: Vec<NodeInfo>,
}

/// Analyzes a file and returns a structural report.
pub fn inspect<P: AsRef<Path>>(path: P) -> Result<ContainerReport> {
    let reader = ContainerReader::open(path)?;
    let root = reader.root()?;
    let tree = inspect_node(&reader, "/".to_string(), &root)?;

    Ok(ContainerReport {
        file_size: reader.file_size(),
        root_offset: root.offset(),
        version: reader.header().version,
        tree,
    })
}

fn inspect_node(reader: &ContainerReader, key: String, node: &ChunkNode<'_>) -> Result<NodeInfo> {
    let kind = node.kind();
    let (description, children) = match kind {
        NodeKind::Leaf => (Some(describe_leaf(&node.leaf_record()?)), Vec::new()),
        NodeKind::Group => {
            let mut children = Vec::with_capacity(node.child_count() as usize);
            for (child_key, child) in node.entries()? {
                children.push(inspect_node(reader, child_key, &child)?);
            }
            (None, children)
        }
    };

    Ok(NodeInfo {
        key,
        kind,
        payload_size: node.payload_len(),
        compression_algo: reader.registry().name_of(node.meta().compression_method()),
        child_count: node.child_count(),
        description,
        children,
    })
}

fn describe_leaf(record: &LeafRecord) -> String {
    match record {
        LeafRecord::Bool(b) => format!("bool = {b}"),
        LeafRecord::Int(i) => format!("int = {i}"),
        LeafRecord::Float(f) => format!("float = {f}"),
        LeafRecord::Str(s) => format!("str ({} bytes)", s.len()),
        LeafRecord::Bytes(b) => format!("bytes ({} bytes)", b.len()),
        LeafRecord::Array(a) => format!("Array<{}> shape {}", a.dtype(), format_shape(a.shape())),
    }
}

impl fmt::Display for ContainerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== NESTORE CONTAINER REPORT ===")?;
        writeln!(f, "File Size:      {}b", self.file_size)?;
        writeln!(f, "Root Offset:    {}", self.root_offset)?;
        writeln!(f, "Version:        {}", self.version)?;
        writeln!(f, "\n[LAYOUT]")?;
        self.tree.fmt_recursive(f, "", true)
    }
}

impl NodeInfo {
    fn fmt_recursive(&self, f: &mut fmt::Formatter<'_>, prefix: &str, is_last: bool) -> fmt::Result {
        let connector = if is_last { "└── " } else { "├── " };
        let child_prefix = if is_last { "    " } else { "│   " };
        let detail = self
            .description
            .as_deref()
            .map(|d| format!(" [{d}]"))
            .unwrap_or_default();

        match self.kind {
            NodeKind::Group => writeln!(
                f,
                "{prefix}{connector}{} (group) Size: {}b | Algo: {} | Children: {}",
                self.key, self.payload_size, self.compression_algo, self.child_count
            )?,
            NodeKind::Leaf => writeln!(
                f,
                "{prefix}{connector}{} Size: {}b | Algo: {}{detail}",
                self.key, self.payload_size, self.compression_algo
            )?,
        }

        for (i, child) in self.children.iter().enumerate() {
            let is_last_child = i + 1 == self.children.len();
            child.fmt_recursive(f, &format!("{prefix}{child_prefix}"), is_last_child)?;
        }
        Ok(())
    }
}

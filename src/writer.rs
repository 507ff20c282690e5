//! The Write-Side Engine.
//!
//! Every mutating call follows the same path:
//!
//! 1. take the sentinel lock for the container;
//! 2. open the current file (if any) read-only;
//! 3. build a `TaskGraph` for the new root group: untouched top-level keys are
//!    carried over as raw chunks, replaced keys are rebuilt from the caller's
//!    values, deleted keys are simply left out;
//! 4. run the graph into a temporary file next to the container, close the
//!    old file and rename the new one over it;
//! 5. release the lock and report the new modification time.
//!
//! Carried chunks are copied byte for byte, compressed payloads included; only
//! the children tables of carried groups are regenerated, because offsets
//! change.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::time::{Instant, SystemTime};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use crate::api::NestoreOptions;
use crate::array::Array;
use crate::compression::{Compressor, CompressorRegistry, NoCompression};
use crate::error::{NestoreError, Result};
use crate::executor::execute_graph;
use crate::format::{GlobalHeader, GroupRecord, NodeKind, encode_record};
use crate::graph::{ChunkId, ChunkJob, JobConfig, TaskGraph};
use crate::io::SeqWriter;
use crate::lock::LockFile;
use crate::normalize::normalize;
use crate::reader::{ChunkNode, ContainerReader};
use crate::value::{Dict, Value};

/// Writes `data` into the container at `path`, replacing each top-level key.
///
/// A `Value::None` entry deletes its key (and is a no-op if the key is absent).
/// The parent directory is created if needed.
#[instrument(skip_all, fields(path = %path.display(), keys = data.len()))]
pub fn write_dict(path: &Path, data: Dict, options: &NestoreOptions) -> Result<SystemTime> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let guard = LockFile::acquire(path)?;

    let mut replaced = BTreeSet::new();
    let mut fresh = BTreeMap::new();
    for (key, mut value) in data {
        replaced.insert(key.clone());
        if value.is_none() {
            continue;
        }
        normalize(&mut value)?;
        fresh.insert(key, prepare_for_storage(value)?);
    }

    let existing = open_existing(path)?;
    let staged = rewrite(path, existing.as_ref(), &replaced, &fresh, options)?;
    drop(existing);
    publish(staged, path)?;

    let modified = fs::metadata(path)?.modified()?;
    guard.release()?;
    Ok(modified)
}

/// Removes the node stored under `key`.
///
/// # Errors
/// [`NestoreError::NotFound`] if the container or the key does not exist.
#[instrument(skip_all, fields(path = %path.display(), key = %key))]
pub fn delete_key(path: &Path, key: &str, options: &NestoreOptions) -> Result<SystemTime> {
    if !path.exists() {
        return Err(NestoreError::NotFound(key.to_string()));
    }
    let guard = LockFile::acquire(path)?;

    let existing =
        open_existing(path)?.ok_or_else(|| NestoreError::NotFound(key.to_string()))?;
    if !existing.list_keys()?.contains(key) {
        return Err(NestoreError::NotFound(key.to_string()));
    }

    let removed = BTreeSet::from([key.to_string()]);
    let staged = rewrite(path, Some(&existing), &removed, &BTreeMap::new(), options)?;
    drop(existing);
    publish(staged, path)?;

    let modified = fs::metadata(path)?.modified()?;
    guard.release()?;
    Ok(modified)
}

/// Renames the staged file over the container. The old file must no longer be
/// mapped.
fn publish(staged: NamedTempFile, path: &Path) -> Result<()> {
    staged
        .persist(path)
        .map_err(|e| NestoreError::from(e.error))?;
    Ok(())
}

fn open_existing(path: &Path) -> Result<Option<ContainerReader>> {
    if path.exists() {
        ContainerReader::open(path).map(Some)
    } else {
        Ok(None)
    }
}

/// Resolves everything normalization leaves in place (objects inside opaque
/// values, raw sequences) into dicts, arrays and scalars.
///
/// Nested `None` values are dropped: their keys end up absent.
fn prepare_for_storage(value: Value) -> Result<Value> {
    match value {
        Value::Object(obj) => {
            if let Some(dict) = obj.as_dict() {
                prepare_for_storage(Value::Dict(dict))
            } else if let Some(array) = obj.as_array() {
                Ok(Value::Array(array))
            } else {
                Err(NestoreError::Unsupported(format!(
                    "object of type {} exposes neither a dict nor an array",
                    obj.type_name()
                )))
            }
        }
        Value::Dict(dict) => {
            let mut out = Dict::new();
            for (key, child) in dict {
                if child.is_none() {
                    continue;
                }
                out.insert(key, prepare_for_storage(child)?);
            }
            Ok(Value::Dict(out))
        }
        Value::List(items) | Value::Tuple(items) | Value::Set(items) => {
            Ok(Value::Array(Array::from_sequence(&items)?))
        }
        Value::None => Err(NestoreError::Unsupported(
            "None cannot be stored as a leaf".into(),
        )),
        other => Ok(other),
    }
}

enum Entry<'a> {
    Carried(ChunkNode<'a>),
    Fresh(&'a Value),
}

fn rewrite(
    path: &Path,
    existing: Option<&ContainerReader>,
    replaced: &BTreeSet<String>,
    fresh: &BTreeMap<String, Value>,
    options: &NestoreOptions,
) -> Result<NamedTempFile> {
    let started = Instant::now();
    let registry = CompressorRegistry::new();
    let array_compression = if options.compression {
        registry.preferred_id()
    } else {
        NoCompression.id()
    };

    let mut entries: BTreeMap<String, Entry<'_>> = BTreeMap::new();
    if let Some(reader) = existing {
        for (key, node) in reader.root()?.entries()? {
            if !replaced.contains(&key) {
                entries.insert(key, Entry::Carried(node));
            }
        }
    }
    for (key, value) in fresh {
        entries.insert(key.clone(), Entry::Fresh(value));
    }

    // 1. Build the Task Graph.
    let mut graph = TaskGraph::new();
    let root = graph.add_node(
        Box::new(GroupJob::new(entries.keys().cloned().collect())),
        None,
    )?;
    let mut carried = 0usize;
    for entry in entries.values() {
        match entry {
            Entry::Carried(node) => {
                carried += 1;
                add_carried(&mut graph, node, root)?;
            }
            Entry::Fresh(value) => add_value(&mut graph, *value, root, array_compression)?,
        }
    }

    // 2. Setup I/O next to the container so the final rename stays on one filesystem.
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = tempfile::Builder::new()
        .prefix(".nestore-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    let writer = SeqWriter::new(tmp.as_file().try_clone()?);

    // 3. Execute Graph (Parallel Phase).
    let root_chunk = execute_graph(&graph, &writer, &registry)?;

    // 4. Finalize: Global Header and sync.
    let header = GlobalHeader::new(root_chunk.location, root_chunk.checksum);
    writer.write_all(&header.to_bytes())?;
    let size = writer.current_offset()?;
    writer.finish()?;

    debug!(
        chunks = graph.len(),
        top_level = entries.len(),
        carried,
        bytes = size,
        elapsed_us = started.elapsed().as_micros() as u64,
        "container staged"
    );
    Ok(tmp)
}

fn add_carried<'a>(graph: &mut TaskGraph<'a>, node: &ChunkNode<'a>, parent: ChunkId) -> Result<()> {
    let id = graph.add_node(
        Box::new(RawJob {
            kind: node.kind(),
            payload: node.raw_payload(),
            compression_id: node.meta().compression_method(),
        }),
        Some(parent),
    )?;
    if node.kind() == NodeKind::Group {
        for child in node.children()? {
            add_carried(graph, &child, id)?;
        }
    }
    Ok(())
}

fn add_value<'a>(
    graph: &mut TaskGraph<'a>,
    value: &'a Value,
    parent: ChunkId,
    array_compression: u8,
) -> Result<()> {
    match value {
        Value::Dict(dict) => {
            let id = graph.add_node(
                Box::new(GroupJob::new(dict.keys().cloned().collect())),
                Some(parent),
            )?;
            for child in dict.values() {
                add_value(graph, child, id, array_compression)?;
            }
        }
        Value::Array(_) => {
            graph.add_node(
                Box::new(LeafJob {
                    value,
                    compression_id: array_compression,
                }),
                Some(parent),
            )?;
        }
        _ => {
            graph.add_node(
                Box::new(LeafJob {
                    value,
                    compression_id: NoCompression.id(),
                }),
                Some(parent),
            )?;
        }
    }
    Ok(())
}

// --- JOBS ---

/// Group header: just the child keys.
#[derive(Debug)]
struct GroupJob {
    record: GroupRecord,
}

impl GroupJob {
    fn new(keys: Vec<String>) -> Self {
        Self {
            record: GroupRecord { keys },
        }
    }
}

impl<'a> ChunkJob<'a> for GroupJob {
    fn kind(&self) -> NodeKind {
        NodeKind::Group
    }

    fn execute(&self) -> Result<Cow<'a, [u8]>> {
        encode_record(&self.record).map(Cow::Owned)
    }

    fn estimated_size(&self) -> usize {
        self.record.keys.iter().map(|k| k.len() + 1).sum()
    }
}

/// Borrowed mirror of [`LeafRecord`](crate::format::LeafRecord). Variant order
/// and field types match, so bincode produces identical bytes without cloning
/// the value.
#[derive(Serialize)]
enum LeafRef<'a> {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(&'a String),
    Bytes(&'a Vec<u8>),
    Array(&'a Array),
}

/// A scalar or array leaf borrowed from the caller's prepared data.
#[derive(Debug)]
struct LeafJob<'a> {
    value: &'a Value,
    compression_id: u8,
}

impl<'a> ChunkJob<'a> for LeafJob<'a> {
    fn kind(&self) -> NodeKind {
        NodeKind::Leaf
    }

    fn execute(&self) -> Result<Cow<'a, [u8]>> {
        let record = match self.value {
            Value::Bool(b) => LeafRef::Bool(*b),
            Value::Int(i) => LeafRef::Int(*i),
            Value::Float(f) => LeafRef::Float(*f),
            Value::Str(s) => LeafRef::Str(s),
            Value::Bytes(b) => LeafRef::Bytes(b),
            Value::Array(a) => LeafRef::Array(a),
            other => {
                return Err(NestoreError::Unsupported(format!(
                    "{} cannot be stored as a leaf",
                    other.type_name()
                )));
            }
        };
        encode_record(&record).map(Cow::Owned)
    }

    fn estimated_size(&self) -> usize {
        match self.value {
            Value::Array(a) => a.len() * 8,
            Value::Str(s) => s.len(),
            Value::Bytes(b) => b.len(),
            _ => 8,
        }
    }

    fn config(&self) -> JobConfig {
        JobConfig {
            compression_id: self.compression_id,
            precompressed: false,
        }
    }
}

/// A chunk copied verbatim from the previous file.
#[derive(Debug)]
struct RawJob<'a> {
    kind: NodeKind,
    payload: &'a [u8],
    compression_id: u8,
}

impl<'a> ChunkJob<'a> for RawJob<'a> {
    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn execute(&self) -> Result<Cow<'a, [u8]>> {
        Ok(Cow::Borrowed(self.payload))
    }

    fn estimated_size(&self) -> usize {
        self.payload.len()
    }

    fn config(&self) -> JobConfig {
        JobConfig {
            compression_id: self.compression_id,
            precompressed: true,
        }
    }
}

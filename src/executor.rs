//! The parallel chunk executor.
//!
//! Execution is bottom-up and purely reactive: leaves are spawned first, and
//! the last child of a group to finish schedules that group. There is no
//! central polling loop. The root group is the only node without a parent;
//! its location and checksum are what the global header needs.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::trace;

use crate::compression::CompressorRegistry;
use crate::error::{NestoreError, Result};
use crate::format::{ChildRef, MetaByte, NodeKind, chunk_checksum};
use crate::graph::{Node, TaskGraph};
use crate::io::SeqWriter;

/// Location and checksum of the written root chunk.
#[derive(Debug, Clone, Copy)]
pub struct RootChunk {
    /// Where the root chunk landed.
    pub location: ChildRef,
    /// Checksum over the root chunk bytes.
    pub checksum: u32,
}

/// Context shared among all worker threads.
struct ExecutionContext<'a, 'graph> {
    graph: &'graph TaskGraph<'a>,
    writer: &'graph SeqWriter,
    registry: &'graph CompressorRegistry,
    abort_flag: AtomicBool,
    error_capture: Mutex<Option<NestoreError>>,
    root_result: Mutex<Option<RootChunk>>,
}

impl<'a, 'graph> ExecutionContext<'a, 'graph> {
    fn signal_error(&self, err: NestoreError) {
        let mut guard = self.error_capture.lock().unwrap_or_else(|p| p.into_inner());
        if guard.is_none() {
            *guard = Some(err);
            self.abort_flag.store(true, Ordering::SeqCst);
        }
    }

    fn should_abort(&self) -> bool {
        self.abort_flag.load(Ordering::Relaxed)
    }

    fn capture_root_result(&self, result: RootChunk) {
        let mut guard = self.root_result.lock().unwrap_or_else(|p| p.into_inner());
        *guard = Some(result);
    }
}

/// Runs the graph, writing every chunk through `writer`.
///
/// Returns the root chunk, which is needed to write the Global Header.
pub fn execute_graph<'a>(
    graph: &TaskGraph<'a>,
    writer: &SeqWriter,
    registry: &CompressorRegistry,
) -> Result<RootChunk> {
    let ctx = ExecutionContext {
        graph,
        writer,
        registry,
        abort_flag: AtomicBool::new(false),
        error_capture: Mutex::new(None),
        root_result: Mutex::new(None),
    };

    let leaves: Vec<&Node<'a>> = graph
        .nodes()
        .iter()
        .filter(|n| n.atomic_deps.load(Ordering::SeqCst) == 0)
        .collect();

    if leaves.is_empty() && !graph.is_empty() {
        return Err(NestoreError::Internal(
            "Graph has nodes but no leaves. Cyclic dependency detected.".into(),
        ));
    }

    rayon::scope(|s| {
        let ctx_ref = &ctx;
        for leaf in leaves {
            s.spawn(move |s| process_node(s, ctx_ref, leaf));
        }
    });

    if ctx.should_abort() {
        let guard = ctx.error_capture.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(err) = guard.as_ref() {
            return Err(err.clone());
        }
        return Err(NestoreError::Internal("Unknown execution error".into()));
    }

    let root_guard = ctx
        .root_result
        .lock()
        .map_err(|_| NestoreError::Internal("Root result mutex poisoned".into()))?;

    root_guard
        .as_ref()
        .copied()
        .ok_or_else(|| NestoreError::Internal("Graph execution incomplete".into()))
}

/// The worker function executed by rayon threads.
/// Payload -> Compression -> Framing -> Writing -> Notification.
fn process_node<'scope, 'a>(
    scope: &rayon::Scope<'scope>,
    ctx: &'scope ExecutionContext<'a, 'scope>,
    node: &'scope Node<'a>,
) {
    if ctx.should_abort() {
        return;
    }
    if let Err(e) = write_node(scope, ctx, node) {
        ctx.signal_error(e);
    }
}

fn write_node<'scope, 'a>(
    scope: &rayon::Scope<'scope>,
    ctx: &'scope ExecutionContext<'a, 'scope>,
    node: &'scope Node<'a>,
) -> Result<()> {
    let kind = node.job.kind();
    let children_refs = node.take_children()?;
    if kind == NodeKind::Leaf && !children_refs.is_empty() {
        return Err(NestoreError::Internal(format!(
            "Leaf node {:?} has children",
            node.id
        )));
    }

    // --- STEP 1: PAYLOAD ---
    let raw_payload = node.job.execute()?;

    // --- STEP 2: COMPRESSION ---
    let config = node.job.config();
    let compressor = ctx.registry.get(config.compression_id)?;
    let payload = if config.precompressed {
        raw_payload
    } else {
        std::borrow::Cow::Owned(compressor.compress(&raw_payload)?.into_owned())
    };

    // --- STEP 3: FRAMING ---
    // [Payload] + [Children Table + Count (groups only)] + [MetaByte]
    let footer_size = match kind {
        NodeKind::Group => children_refs.len() * ChildRef::SIZE + 4,
        NodeKind::Leaf => 0,
    };
    let total_size = payload.len() + footer_size + 1;
    let mut final_buffer = Vec::with_capacity(total_size);
    final_buffer.extend_from_slice(&payload);

    if kind == NodeKind::Group {
        for child in &children_refs {
            final_buffer.extend_from_slice(&child.to_bytes());
        }
        let count = u32::try_from(children_refs.len())
            .map_err(|_| NestoreError::Internal("Too many children in one group".into()))?;
        final_buffer.extend_from_slice(&count.to_le_bytes());
    }
    final_buffer.push(MetaByte::new(kind, compressor.id()).as_u8());

    // --- STEP 4: WRITING ---
    let offset = ctx.writer.write_all(&final_buffer)?;
    let my_ref = ChildRef {
        offset,
        length: total_size as u64,
    };
    trace!(node = %node.id, ?kind, offset, length = total_size, "chunk written");

    // --- STEP 5: PROPAGATION ---
    match (node.parent, node.parent_slot) {
        (Some(parent_id), Some(slot)) => {
            let parent_node = ctx.graph.get_node(parent_id)?;
            parent_node.register_child_result(slot, my_ref)?;

            // `fetch_sub` returns the previous value: 1 means we were the last child.
            let prev_deps = parent_node.atomic_deps.fetch_sub(1, Ordering::SeqCst);
            if prev_deps == 1 {
                scope.spawn(move |s| process_node(s, ctx, parent_node));
            }
        }
        (None, _) => ctx.capture_root_result(RootChunk {
            location: my_ref,
            checksum: chunk_checksum(&final_buffer),
        }),
        (Some(_), None) => {
            return Err(NestoreError::Internal(format!(
                "Node {:?} has a parent but no slot",
                node.id
            )));
        }
    }
    Ok(())
}

use super::id::ChunkId;
use super::job::ChunkJob;
use crate::error::{NestoreError, Result};
use crate::format::ChildRef;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A single node in the dependency graph.
#[derive(Debug)]
pub struct Node<'a> {
    /// The unique identifier for this node.
    pub id: ChunkId,
    /// The parent group, `None` for the root.
    pub parent: Option<ChunkId>,
    /// The slot index in the parent's `completed_children` vector, so a child
    /// writes its result straight into the position matching its key.
    pub parent_slot: Option<usize>,
    /// Children that must complete before this node can run.
    pub atomic_deps: AtomicUsize,
    /// The job to execute.
    pub job: Box<dyn ChunkJob<'a> + 'a>,
    /// Results from completed children, one slot per linked child.
    pub completed_children: Mutex<Vec<Option<ChildRef>>>,
}

impl<'a> Node<'a> {
    /// Creates a new Node.
    pub fn new(id: ChunkId, job: Box<dyn ChunkJob<'a> + 'a>) -> Self {
        Self {
            id,
            parent: None,
            parent_slot: None,
            atomic_deps: AtomicUsize::new(0),
            job,
            completed_children: Mutex::new(Vec::new()),
        }
    }

    /// Registers a completed child's result in its reserved slot.
    pub fn register_child_result(&self, slot: usize, child_ref: ChildRef) -> Result<()> {
        let mut lock = self
            .completed_children
            .lock()
            .map_err(|_| NestoreError::Internal(format!("Mutex poisoned on node {:?}", self.id)))?;

        let entry = lock.get_mut(slot).ok_or_else(|| {
            NestoreError::Internal(format!(
                "Slot {} out of bounds for node {:?}",
                slot, self.id
            ))
        })?;
        *entry = Some(child_ref);
        Ok(())
    }

    /// Takes the children table, failing if any child did not report.
    pub fn take_children(&self) -> Result<Vec<ChildRef>> {
        let mut guard = self
            .completed_children
            .lock()
            .map_err(|_| NestoreError::Internal(format!("Mutex poisoned on node {:?}", self.id)))?;
        std::mem::take(&mut *guard)
            .into_iter()
            .enumerate()
            .map(|(slot, r)| {
                r.ok_or_else(|| {
                    NestoreError::Internal(format!(
                        "Child slot {} of node {:?} never completed",
                        slot, self.id
                    ))
                })
            })
            .collect()
    }
}

/// The container for the entire dependency graph.
///
/// Acts as an arena for Nodes. The lifetime `'a` ties jobs to the values and
/// mapped bytes they borrow.
#[derive(Debug)]
pub struct TaskGraph<'a> {
    nodes: Vec<Node<'a>>,
}

impl<'a> TaskGraph<'a> {
    /// Creates a new, empty `TaskGraph`.
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Adds a new node, optionally linked under `parent`.
    pub fn add_node(
        &mut self,
        job: Box<dyn ChunkJob<'a> + 'a>,
        parent: Option<ChunkId>,
    ) -> Result<ChunkId> {
        let raw = u32::try_from(self.nodes.len())
            .map_err(|_| NestoreError::Internal("Too many chunks in one container".into()))?;
        let id = ChunkId::new(raw);
        self.nodes.push(Node::new(id, job));
        if let Some(parent_id) = parent {
            self.link_parent_child(parent_id, id)?;
        }
        Ok(id)
    }

    /// Links a parent node to a child node.
    ///
    /// This increments the parent's dependency count, reserves the next slot
    /// of its children table and sets the child's parent pointer.
    pub fn link_parent_child(&mut self, parent_id: ChunkId, child_id: ChunkId) -> Result<()> {
        let parent_node = self.get_node(parent_id)?;
        parent_node.atomic_deps.fetch_add(1, Ordering::SeqCst);

        let slot = {
            let mut guard = parent_node
                .completed_children
                .lock()
                .map_err(|_| NestoreError::Internal("Mutex poisoned while linking".into()))?;
            guard.push(None);
            guard.len() - 1
        };

        let child_node = self
            .nodes
            .get_mut(child_id.index())
            .ok_or_else(|| NestoreError::Internal(format!("Child node {child_id} not found")))?;
        child_node.parent = Some(parent_id);
        child_node.parent_slot = Some(slot);
        Ok(())
    }

    /// Retrieves a reference to a node by its ID.
    pub fn get_node(&self, id: ChunkId) -> Result<&Node<'a>> {
        self.nodes
            .get(id.index())
            .ok_or_else(|| NestoreError::Internal(format!("Node {id} out of bounds")))
    }

    /// Returns true if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns a slice containing all nodes in the graph.
    pub fn nodes(&self) -> &[Node<'a>] {
        &self.nodes
    }
}

impl<'a> Default for TaskGraph<'a> {
    fn default() -> Self {
        Self::new()
    }
}

use std::collections::HashMap;
use std::fmt;

use generational_arena::{Arena, Index};
use tracing::instrument;

use crate::domain::entities::DocumentRecord;

/// Tree node in the arena-based forest.
#[derive(Debug)]
pub struct TreeNode {
    /// Document this node wraps
    pub record: DocumentRecord,
    /// Position of the record in the scan input
    pub order: usize,
    /// Declared parent id was not part of the input; promoted to root
    pub orphaned: bool,
    /// Index of parent node in the arena, None for roots
    pub parent: Option<Index>,
    /// Indices of child nodes, in input order
    pub children: Vec<Index>,
}

impl TreeNode {
    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

impl fmt::Display for TreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.record.title(), self.record.id)
    }
}

/// Immutable forest of documents.
///
/// Nodes live in one generational arena; roots keep input order, and so do
/// the children of every node. Only the hierarchy builder can assemble one.
#[derive(Debug)]
pub struct Forest {
    arena: Arena<TreeNode>,
    roots: Vec<Index>,
    by_id: HashMap<String, Index>,
}

impl Forest {
    pub(crate) fn with_capacity(n: usize) -> Self {
        Self {
            arena: Arena::with_capacity(n),
            roots: Vec::new(),
            by_id: HashMap::with_capacity(n),
        }
    }

    /// Insert a node without linking it. Returns `None` if the id is taken.
    pub(crate) fn insert_detached(&mut self, record: DocumentRecord, order: usize) -> Option<Index> {
        if self.by_id.contains_key(&record.id) {
            return None;
        }
        let id = record.id.clone();
        let idx = self.arena.insert(TreeNode {
            record,
            order,
            orphaned: false,
            parent: None,
            children: Vec::new(),
        });
        self.by_id.insert(id, idx);
        Some(idx)
    }

    pub(crate) fn attach(&mut self, child: Index, parent: Index) {
        if let Some(node) = self.arena.get_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.arena.get_mut(parent) {
            node.children.push(child);
        }
    }

    pub(crate) fn push_root(&mut self, idx: Index, orphaned: bool) {
        if let Some(node) = self.arena.get_mut(idx) {
            node.orphaned = orphaned;
        }
        self.roots.push(idx);
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn roots(&self) -> &[Index] {
        &self.roots
    }

    #[instrument(level = "trace", skip(self))]
    pub fn get_node(&self, idx: Index) -> Option<&TreeNode> {
        self.arena.get(idx)
    }

    pub fn index_of(&self, id: &str) -> Option<Index> {
        self.by_id.get(id).copied()
    }

    pub fn find(&self, id: &str) -> Option<&TreeNode> {
        self.index_of(id).and_then(|idx| self.arena.get(idx))
    }

    /// Depth-first pre-order walk over all trees, children in input order.
    pub fn iter(&self) -> TreeIterator<'_> {
        TreeIterator::new(self)
    }

    /// Records in scan input order; rebuilding from them yields the same forest
    /// with the same `order` on every node.
    pub fn records(&self) -> Vec<DocumentRecord> {
        let mut nodes: Vec<&TreeNode> = self.arena.iter().map(|(_, node)| node).collect();
        nodes.sort_by_key(|node| node.order);
        nodes.into_iter().map(|node| node.record.clone()).collect()
    }
}

pub struct TreeIterator<'a> {
    forest: &'a Forest,
    stack: Vec<(Index, usize)>,
}

impl<'a> TreeIterator<'a> {
    fn new(forest: &'a Forest) -> Self {
        let stack = forest.roots.iter().rev().map(|&root| (root, 0)).collect();
        Self { forest, stack }
    }
}

impl<'a> Iterator for TreeIterator<'a> {
    /// (arena index, depth below its root, node)
    type Item = (Index, usize, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current_idx, depth)) = self.stack.pop() {
            if let Some(node) = self.forest.get_node(current_idx) {
                // Push children in reverse order for left-to-right traversal
                for &child in node.children.iter().rev() {
                    self.stack.push((child, depth + 1));
                }
                return Some((current_idx, depth, node));
            }
        }
        None
    }
}

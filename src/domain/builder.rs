//! Hierarchy builder: flat document records to an immutable forest.

use std::collections::HashSet;

use generational_arena::Index;
use tracing::{debug, instrument};

use crate::domain::arena::Forest;
use crate::domain::entities::DocumentRecord;
use crate::domain::error::DomainError;

/// Result type for tree operations.
pub type TreeResult<T> = Result<T, DomainError>;

/// Build a forest from records in scan order.
///
/// Children keep input order. A record whose parent id is not part of the
/// input becomes an orphaned root instead of being dropped. Duplicate or
/// empty ids and cyclic parent links reject the whole input.
#[instrument(level = "debug", skip_all, fields(records = records.len()))]
pub fn build_forest(records: Vec<DocumentRecord>) -> TreeResult<Forest> {
    let mut forest = Forest::with_capacity(records.len());
    let mut pending: Vec<(Index, Option<String>)> = Vec::with_capacity(records.len());

    for (order, record) in records.into_iter().enumerate() {
        if record.id.trim().is_empty() {
            return Err(DomainError::EmptyId(order));
        }
        let id = record.id.clone();
        let parent = record.parent_id.clone();
        let idx = forest
            .insert_detached(record, order)
            .ok_or(DomainError::DuplicateId(id))?;
        pending.push((idx, parent));
    }

    check_acyclic(&forest, &pending)?;

    let mut orphans = 0usize;
    for (idx, parent) in pending {
        match parent.as_deref().map(|p| forest.index_of(p)) {
            Some(Some(parent_idx)) => forest.attach(idx, parent_idx),
            Some(None) => {
                orphans += 1;
                forest.push_root(idx, true);
            }
            None => forest.push_root(idx, false),
        }
    }

    debug!(
        nodes = forest.len(),
        roots = forest.roots().len(),
        orphans,
        "forest built"
    );
    Ok(forest)
}

/// Walk each node's declared ancestor chain; revisiting a node means a cycle.
///
/// Chains already proven to end in a root are remembered, so every node is
/// walked at most once overall.
fn check_acyclic(forest: &Forest, pending: &[(Index, Option<String>)]) -> TreeResult<()> {
    let parent_of = |idx: Index| -> Option<Index> {
        forest
            .get_node(idx)
            .and_then(|n| n.record.parent_id.as_deref())
            .and_then(|p| forest.index_of(p))
    };

    let mut verified: HashSet<Index> = HashSet::with_capacity(pending.len());
    for &(start, _) in pending {
        let mut chain: Vec<Index> = Vec::new();
        let mut seen: HashSet<Index> = HashSet::new();
        let mut current = Some(start);

        while let Some(idx) = current {
            if verified.contains(&idx) {
                break;
            }
            if !seen.insert(idx) {
                let id = forest
                    .get_node(idx)
                    .map(|n| n.record.id.clone())
                    .unwrap_or_default();
                return Err(DomainError::CyclicHierarchy { id });
            }
            chain.push(idx);
            current = parent_of(idx);
        }
        verified.extend(chain);
    }
    Ok(())
}

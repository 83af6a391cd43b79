//! Path resolution: every node of a forest gets one directory below the
//! output root.
//!
//! The primary root is the output root itself. Every other node lives in a
//! directory named after its sanitized title inside its parent's directory.
//! Siblings whose names collide (case-insensitively, or with a reserved file
//! name) get a `NN. ` prefix counted among the colliding siblings only.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use generational_arena::Index;
use tracing::{debug, instrument};

use crate::domain::arena::Forest;
use crate::domain::classifier::CategoryClassifier;
use crate::domain::entities::Layout;
use crate::domain::sanitize::sanitize;

/// Navigable index written to the output root.
pub const INDEX_FILE: &str = "INDEX.md";
/// Structure snapshot written to the output root.
pub const SNAPSHOT_FILE: &str = "structure.json";
pub const SNAPSHOT_BACKUP_FILE: &str = "structure.json.bak";
/// Export history written to the output root.
pub const METADATA_FILE: &str = ".export_metadata.json";

/// Immutable mapping from document id to its directory, relative to the
/// output root. Produced once per run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathPlan {
    dirs: HashMap<String, PathBuf>,
    primary_root: Option<String>,
    entry_file_name: String,
}

impl PathPlan {
    pub fn get(&self, id: &str) -> Option<&Path> {
        self.dirs.get(id).map(PathBuf::as_path)
    }

    /// Canonical entry file of a node, relative to the output root.
    pub fn entry_file(&self, id: &str) -> Option<PathBuf> {
        self.get(id).map(|dir| dir.join(&self.entry_file_name))
    }

    pub fn entry_file_name(&self) -> &str {
        &self.entry_file_name
    }

    /// Id of the document mapped onto the output root, if any.
    pub fn primary_root(&self) -> Option<&str> {
        self.primary_root.as_deref()
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.dirs.iter().map(|(id, dir)| (id.as_str(), dir.as_path()))
    }
}

/// Computes a [`PathPlan`] for a forest.
#[derive(Debug, Clone)]
pub struct PathResolver<'a> {
    layout: Layout,
    classifier: &'a CategoryClassifier,
    entry_file_name: &'a str,
}

impl<'a> PathResolver<'a> {
    pub fn new(layout: Layout, classifier: &'a CategoryClassifier, entry_file_name: &'a str) -> Self {
        Self {
            layout,
            classifier,
            entry_file_name,
        }
    }

    #[instrument(level = "debug", skip_all, fields(layout = ?self.layout, nodes = forest.len()))]
    pub fn resolve(&self, forest: &Forest) -> PathPlan {
        let primary = forest
            .roots()
            .iter()
            .copied()
            .find(|&idx| forest.get_node(idx).is_some_and(|n| !n.orphaned));

        let mut dirs: HashMap<String, PathBuf> = HashMap::with_capacity(forest.len());
        let mut top_level: Vec<Index> = Vec::new();
        if let Some(idx) = primary {
            if let Some(node) = forest.get_node(idx) {
                dirs.insert(node.id().to_string(), PathBuf::new());
                top_level.extend(node.children.iter().copied());
            }
        }
        top_level.extend(forest.roots().iter().copied().filter(|&r| Some(r) != primary));
        top_level.sort_by_key(|&idx| forest.get_node(idx).map(|n| n.order).unwrap_or(usize::MAX));

        // (directory, members) groups still to be named; parents are always
        // named before their children are pushed.
        let mut work: Vec<(PathBuf, Vec<Index>)> = Vec::new();
        let root_reserved = self.reserved(true);
        match self.layout {
            Layout::Hierarchical => {
                let names = self.name_group(forest, &top_level, &root_reserved);
                self.assign(forest, PathBuf::new(), &top_level, names, &mut dirs, &mut work);
            }
            Layout::Classified => {
                self.resolve_buckets(forest, &top_level, &root_reserved, &mut dirs, &mut work);
            }
        }

        let reserved = self.reserved(false);
        while let Some((dir, members)) = work.pop() {
            let names = self.name_group(forest, &members, &reserved);
            self.assign(forest, dir, &members, names, &mut dirs, &mut work);
        }

        debug!(paths = dirs.len(), "path plan resolved");
        PathPlan {
            dirs,
            primary_root: primary
                .and_then(|idx| forest.get_node(idx))
                .map(|n| n.id().to_string()),
            entry_file_name: self.entry_file_name.to_string(),
        }
    }

    /// Group top-level documents into bucket directories, numbered per bucket
    /// in input order.
    fn resolve_buckets(
        &self,
        forest: &Forest,
        top_level: &[Index],
        root_reserved: &HashSet<String>,
        dirs: &mut HashMap<String, PathBuf>,
        work: &mut Vec<(PathBuf, Vec<Index>)>,
    ) {
        let mut buckets: Vec<(String, Vec<Index>)> = Vec::new();
        for &idx in top_level {
            let Some(node) = forest.get_node(idx) else {
                continue;
            };
            let bucket = self.classifier.classify(node.record.title());
            match buckets.iter_mut().find(|(name, _)| name == bucket) {
                Some((_, members)) => members.push(idx),
                None => buckets.push((bucket.to_string(), vec![idx])),
            }
        }

        let bucket_segments: Vec<String> = buckets
            .iter()
            .map(|(name, _)| sanitize(&name.replace('&', "and"), name))
            .collect();
        let bucket_dirs = disambiguate(&bucket_segments, root_reserved);

        let reserved = self.reserved(false);
        for ((_, members), bucket_dir) in buckets.iter().zip(bucket_dirs) {
            let numbered: Vec<String> = members
                .iter()
                .enumerate()
                .map(|(i, &idx)| {
                    let segment = forest
                        .get_node(idx)
                        .map(|n| sanitize(n.record.title(), n.id()))
                        .unwrap_or_default();
                    format!("{:02}. {}", i + 1, segment)
                })
                .collect();
            let names = disambiguate(&numbered, &reserved);
            self.assign(forest, PathBuf::from(bucket_dir), members, names, dirs, work);
        }
    }

    fn name_group(&self, forest: &Forest, members: &[Index], reserved: &HashSet<String>) -> Vec<String> {
        let segments: Vec<String> = members
            .iter()
            .map(|&idx| {
                forest
                    .get_node(idx)
                    .map(|n| sanitize(n.record.title(), n.id()))
                    .unwrap_or_default()
            })
            .collect();
        disambiguate(&segments, reserved)
    }

    fn assign(
        &self,
        forest: &Forest,
        dir: PathBuf,
        members: &[Index],
        names: Vec<String>,
        dirs: &mut HashMap<String, PathBuf>,
        work: &mut Vec<(PathBuf, Vec<Index>)>,
    ) {
        for (&idx, name) in members.iter().zip(names) {
            let Some(node) = forest.get_node(idx) else {
                continue;
            };
            let path = dir.join(name);
            if !node.children.is_empty() {
                work.push((path.clone(), node.children.clone()));
            }
            dirs.insert(node.id().to_string(), path);
        }
    }

    /// Lower-cased names that no document directory may take.
    fn reserved(&self, output_root: bool) -> HashSet<String> {
        let mut names: HashSet<String> = HashSet::new();
        names.insert(self.entry_file_name.to_lowercase());
        if output_root {
            for name in [INDEX_FILE, SNAPSHOT_FILE, SNAPSHOT_BACKUP_FILE, METADATA_FILE] {
                names.insert(name.to_lowercase());
            }
        }
        names
    }
}

/// Resolve collisions within one directory.
///
/// A name collides when another sibling has the same name ignoring case, or
/// when it equals a reserved name. Colliding siblings are prefixed `01. `,
/// `02. `, ... per name, in member order; numbers already taken are skipped.
fn disambiguate(segments: &[String], reserved: &HashSet<String>) -> Vec<String> {
    let mut occurrences: HashMap<String, usize> = HashMap::new();
    for segment in segments {
        *occurrences.entry(segment.to_lowercase()).or_default() += 1;
    }
    let collides = |key: &str| occurrences.get(key).copied().unwrap_or(0) > 1 || reserved.contains(key);

    let mut taken: HashSet<String> = reserved.clone();
    for segment in segments {
        let key = segment.to_lowercase();
        if !collides(&key) {
            taken.insert(key);
        }
    }

    let mut counters: HashMap<String, usize> = HashMap::new();
    segments
        .iter()
        .map(|segment| {
            let key = segment.to_lowercase();
            if !collides(&key) {
                return segment.clone();
            }
            let counter = counters.entry(key).or_insert(0);
            loop {
                *counter += 1;
                let candidate = format!("{:02}. {}", counter, segment);
                if taken.insert(candidate.to_lowercase()) {
                    return candidate;
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn given_unique_names_when_disambiguate_then_unchanged() {
        let result = disambiguate(&names(&["A", "B"]), &HashSet::new());
        assert_eq!(result, names(&["A", "B"]));
    }

    #[test]
    fn given_case_variants_when_disambiguate_then_only_colliding_are_prefixed() {
        let result = disambiguate(&names(&["Notes", "Other", "notes"]), &HashSet::new());
        assert_eq!(result, names(&["01. Notes", "Other", "02. notes"]));
    }

    #[test]
    fn given_prefixed_name_already_taken_when_disambiguate_then_skips_number() {
        let result = disambiguate(&names(&["01. A", "A", "A"]), &HashSet::new());
        assert_eq!(result, names(&["01. A", "02. A", "03. A"]));
    }

    #[test]
    fn given_reserved_name_when_disambiguate_then_prefixed() {
        let reserved: HashSet<String> = ["readme.md".to_string()].into_iter().collect();
        let result = disambiguate(&names(&["README.md"]), &reserved);
        assert_eq!(result, names(&["01. README.md"]));
    }
}

use super::node::{ArenaNode, EntryKind, FileEntry, NodeId, TreeNode};
use super::order::sort_key;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Why a path was rejected by the tree builder
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidPathReason {
    #[error("path is empty")]
    Empty,
    #[error("path has a trailing slash")]
    TrailingSlash,
    #[error("path has an empty segment")]
    EmptySegment,
    #[error("path is used both as a file and as a folder")]
    KindConflict,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath {
        path: String,
        reason: InvalidPathReason,
    },
}

impl TreeError {
    fn invalid(path: &str, reason: InvalidPathReason) -> Self {
        TreeError::InvalidPath {
            path: path.to_string(),
            reason,
        }
    }
}

/// Arena-backed hierarchy built from a flat set of written paths
///
/// Nodes are indexed by [`NodeId`] and looked up by path. Every ancestor of a
/// written path exists as a folder node, each path appears exactly once, and
/// sibling lists are ordered folders-first then by name.
#[derive(Debug, Default)]
pub struct PathTree {
    nodes: Vec<ArenaNode>,
    roots: Vec<NodeId>,
    path_to_node: HashMap<String, NodeId>,
}

/// Build the ordered tree for a set of paths.
///
/// # Errors
///
/// Returns [`TreeError::InvalidPath`] for an empty path, an empty segment, a
/// trailing slash, or a path used both as a file and as a folder.
pub fn build<I, S>(paths: I) -> Result<Vec<TreeNode>, TreeError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    PathTree::build(paths).map(|tree| tree.to_nodes())
}

impl PathTree {
    /// Build an arena tree for a set of paths. All paths are validated before
    /// any node is created.
    pub fn build<I, S>(paths: I) -> Result<Self, TreeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let paths: BTreeSet<String> = paths
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .collect();

        for path in &paths {
            validate_path(path)?;
        }

        let mut tree = Self::default();
        for path in &paths {
            tree.insert(path)?;
        }
        tree.sort();

        tracing::debug!(
            paths = paths.len(),
            nodes = tree.nodes.len(),
            "built file tree"
        );
        Ok(tree)
    }

    /// Number of nodes, synthesized folders included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Top-level node IDs in display order
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn get_entry(&self, id: NodeId) -> Option<&FileEntry> {
        self.nodes.get(id.0).map(|n| &n.entry)
    }

    pub fn get_node_by_path(&self, path: &str) -> Option<NodeId> {
        self.path_to_node.get(path).copied()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    /// Children of a folder in display order
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Convert the arena into owned nested nodes
    pub fn to_nodes(&self) -> Vec<TreeNode> {
        self.roots.iter().map(|&id| self.to_node(id)).collect()
    }

    fn to_node(&self, id: NodeId) -> TreeNode {
        let node = &self.nodes[id.0];
        TreeNode {
            name: node.entry.name.clone(),
            path: node.entry.path.clone(),
            kind: node.entry.kind,
            children: node.children.iter().map(|&c| self.to_node(c)).collect(),
        }
    }

    fn add_node(&mut self, entry: FileEntry, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.path_to_node.insert(entry.path.clone(), id);
        self.nodes.push(ArenaNode {
            entry,
            parent,
            children: Vec::new(),
        });
        match parent {
            Some(parent_id) => self.nodes[parent_id.0].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    fn insert(&mut self, path: &str) -> Result<(), TreeError> {
        let segment_count = path.split('/').count();
        let mut parent = None;
        let mut end = 0;

        for (index, segment) in path.split('/').enumerate() {
            end += segment.len();
            let prefix = &path[..end];
            end += 1;

            let kind = if index + 1 == segment_count {
                EntryKind::File
            } else {
                EntryKind::Folder
            };

            let id = match self.path_to_node.get(prefix) {
                Some(&existing) => {
                    if self.nodes[existing.0].entry.kind != kind {
                        return Err(TreeError::invalid(path, InvalidPathReason::KindConflict));
                    }
                    existing
                }
                None => self.add_node(FileEntry::new(segment, prefix, kind), parent),
            };
            parent = Some(id);
        }
        Ok(())
    }

    fn sort(&mut self) {
        let mut roots = std::mem::take(&mut self.roots);
        self.sort_siblings(&mut roots);
        self.roots = roots;

        for index in 0..self.nodes.len() {
            let mut children = std::mem::take(&mut self.nodes[index].children);
            self.sort_siblings(&mut children);
            self.nodes[index].children = children;
        }
    }

    fn sort_siblings(&self, ids: &mut [NodeId]) {
        ids.sort_by_cached_key(|id| {
            let entry = &self.nodes[id.0].entry;
            sort_key(entry.kind, &entry.name)
        });
    }
}

/// Check that a path is non-empty, has no empty segment and no trailing slash
pub fn validate_path(path: &str) -> Result<(), TreeError> {
    if path.is_empty() {
        return Err(TreeError::invalid(path, InvalidPathReason::Empty));
    }
    if path.ends_with('/') {
        return Err(TreeError::invalid(path, InvalidPathReason::TrailingSlash));
    }
    if path.split('/').any(str::is_empty) {
        return Err(TreeError::invalid(path, InvalidPathReason::EmptySegment));
    }
    Ok(())
}

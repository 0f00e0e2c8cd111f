use std::fmt;

/// Unique identifier for a node inside a [`PathTree`](super::PathTree) arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

/// Kind of entry. Folders sort before files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntryKind {
    Folder,
    File,
}

/// A path observed in the sandbox (or synthesized as one of its ancestors)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Last path segment
    pub name: String,
    /// Full `/`-separated path, unique across the tree
    pub path: String,
    pub kind: EntryKind,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, path: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Arena slot used while the tree is being built
#[derive(Debug, Clone)]
pub(crate) struct ArenaNode {
    pub entry: FileEntry,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Owned, nested node handed to the UI layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    /// Ordered children; always empty for files
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// Depth-first search for a node by path
    pub fn find<'a>(nodes: &'a [TreeNode], path: &str) -> Option<&'a TreeNode> {
        for node in nodes {
            if node.path == path {
                return Some(node);
            }
            if path.starts_with(node.path.as_str())
                && path.as_bytes().get(node.path.len()) == Some(&b'/')
            {
                return Self::find(&node.children, path);
            }
        }
        None
    }
}

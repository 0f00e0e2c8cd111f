// File tree module for the written-path projection
//
// This module turns the flat set of paths written into the sandbox into an
// ordered hierarchy. The tree is a disposable projection: it is rebuilt from
// scratch whenever the path set changes and is never patched in place.

pub mod node;
pub mod order;
pub mod tree;

pub use node::{EntryKind, FileEntry, NodeId, TreeNode};
pub use order::natural_cmp;
pub use tree::{build, validate_path, InvalidPathReason, PathTree, TreeError};

/// Render a tree as indented text, folders suffixed with `/`.
pub fn render(nodes: &[TreeNode]) -> String {
    let mut out = String::new();
    render_into(nodes, 0, &mut out);
    out
}

fn render_into(nodes: &[TreeNode], depth: usize, out: &mut String) {
    for node in nodes {
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push_str(&node.name);
        if node.is_folder() {
            out.push('/');
        }
        out.push('\n');
        render_into(&node.children, depth + 1, out);
    }
}

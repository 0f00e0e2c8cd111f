// Property tests for the written-path tree projection

use proptest::prelude::*;
use sandbox_ide::file_tree::{self, natural_cmp, EntryKind, TreeNode};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Paths whose folder segments never end in `.txt` and whose file names
/// always do, so no path is both a file and a folder
fn path_strategy() -> impl Strategy<Value = String> {
    (
        prop::collection::vec("[a-c]{1,2}", 0..4),
        "[a-c]{1,2}\\.txt",
    )
        .prop_map(|(folders, file)| {
            let mut segments = folders;
            segments.push(file);
            segments.join("/")
        })
}

fn paths_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(path_strategy(), 0..24)
}

fn collect_paths(nodes: &[TreeNode], kind: EntryKind, out: &mut Vec<String>) {
    for node in nodes {
        if node.kind == kind {
            out.push(node.path.clone());
        }
        collect_paths(&node.children, kind, out);
    }
}

fn check_level(nodes: &[TreeNode]) -> Result<(), TestCaseError> {
    let mut names = HashSet::new();
    for node in nodes {
        prop_assert!(names.insert(node.name.clone()), "duplicate {}", node.path);
        if node.is_file() {
            prop_assert!(node.children.is_empty());
        }
    }

    let first_file = nodes.iter().position(TreeNode::is_file).unwrap_or(nodes.len());
    prop_assert!(nodes[first_file..].iter().all(TreeNode::is_file));

    for pair in nodes.windows(2) {
        if pair[0].kind == pair[1].kind {
            prop_assert_ne!(natural_cmp(&pair[0].name, &pair[1].name), Ordering::Greater);
        }
    }

    for node in nodes {
        check_level(&node.children)?;
    }
    Ok(())
}

proptest! {
    #[test]
    fn prop_build_is_idempotent(paths in paths_strategy()) {
        let first = file_tree::build(&paths).unwrap();
        let second = file_tree::build(&paths).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_build_ignores_input_order(paths in paths_strategy()) {
        let mut reversed = paths.clone();
        reversed.reverse();
        prop_assert_eq!(
            file_tree::build(&paths).unwrap(),
            file_tree::build(&reversed).unwrap()
        );
    }

    #[test]
    fn prop_every_path_and_ancestor_appears_once(paths in paths_strategy()) {
        let tree = file_tree::build(&paths).unwrap();

        let mut files = Vec::new();
        collect_paths(&tree, EntryKind::File, &mut files);
        let mut expected_files: Vec<String> = paths.iter().cloned().collect::<HashSet<_>>().into_iter().collect();
        expected_files.sort();
        files.sort();
        prop_assert_eq!(files, expected_files);

        let mut folders = Vec::new();
        collect_paths(&tree, EntryKind::Folder, &mut folders);
        let unique: HashSet<&String> = folders.iter().collect();
        prop_assert_eq!(unique.len(), folders.len());

        let mut expected_folders = HashSet::new();
        for path in &paths {
            let mut prefix = String::new();
            let segments: Vec<&str> = path.split('/').collect();
            for segment in &segments[..segments.len() - 1] {
                if !prefix.is_empty() {
                    prefix.push('/');
                }
                prefix.push_str(segment);
                expected_folders.insert(prefix.clone());
            }
        }
        let actual: HashSet<String> = folders.into_iter().collect();
        prop_assert_eq!(actual, expected_folders);
    }

    #[test]
    fn prop_levels_are_ordered_and_unique(paths in paths_strategy()) {
        let tree = file_tree::build(&paths).unwrap();
        check_level(&tree)?;
    }
}

#[test]
fn test_nested_example_tree() {
    let tree = file_tree::build(["a/b.txt", "a/c/d.txt", "e.txt"]).unwrap();

    assert_eq!(
        file_tree::render(&tree),
        "a/\n  c/\n    d.txt\n  b.txt\ne.txt\n"
    );
    assert_eq!(tree[0].path, "a");
    assert_eq!(tree[0].children[0].path, "a/c");
    assert_eq!(tree[0].children[0].children[0].path, "a/c/d.txt");
    assert_eq!(tree[0].children[1].path, "a/b.txt");
    assert_eq!(tree[1].path, "e.txt");
}

#[test]
fn test_kind_conflict_is_rejected() {
    let err = file_tree::build(["a", "a/b.txt"]).unwrap_err();
    assert!(err.to_string().contains("both as a file and as a folder"));
}

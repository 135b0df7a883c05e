//! Turn flat test names into a namespace tree

use crate::results::KnownResults;

use super::node::TestNode;

/// Split a test name on the dots that are not inside an argument list
///
/// `Ns.Class.Method(value: "My.Dot")` splits into
/// `["Ns", "Class", "Method(value: \"My.Dot\")"]`. Joining the parts with
/// `.` gives back the original name.
pub fn split_name(name: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in name.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '.' if depth == 0 => {
                parts.push(&name[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&name[start..]);
    parts
}

/// Shape of the test tree before results are attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEntry {
    Leaf {
        name: String,
    },
    Folder {
        name: String,
        children: Vec<TreeEntry>,
    },
}

impl TreeEntry {
    pub fn name(&self) -> &str {
        match self {
            TreeEntry::Leaf { name } | TreeEntry::Folder { name, .. } => name,
        }
    }
}

/// Group names by their leading segments into a forest
///
/// Siblings keep the order in which they first appear. A name that is also
/// the prefix of a longer name becomes the folder for that longer name.
pub fn build_tree<S: AsRef<str>>(names: &[S]) -> Vec<TreeEntry> {
    let paths: Vec<Vec<&str>> = names.iter().map(|n| split_name(n.as_ref())).collect();
    let slices: Vec<&[&str]> = paths.iter().map(|p| p.as_slice()).collect();
    group(&slices)
}

fn group(paths: &[&[&str]]) -> Vec<TreeEntry> {
    let mut groups: Vec<(&str, Vec<&[&str]>)> = Vec::new();

    for path in paths {
        let Some((first, rest)) = path.split_first() else {
            continue;
        };
        let index = match groups.iter().position(|(name, _)| name == first) {
            Some(index) => index,
            None => {
                groups.push((*first, Vec::new()));
                groups.len() - 1
            }
        };
        if !rest.is_empty() {
            groups[index].1.push(rest);
        }
    }

    groups
        .into_iter()
        .map(|(name, rests)| {
            if rests.is_empty() {
                TreeEntry::Leaf {
                    name: name.to_string(),
                }
            } else {
                TreeEntry::Folder {
                    name: name.to_string(),
                    children: group(&rests),
                }
            }
        })
        .collect()
}

/// Attach results to a tree, producing display nodes
pub fn to_nodes(
    entries: &[TreeEntry],
    parent_path: &str,
    results: Option<&KnownResults>,
) -> Vec<TestNode> {
    entries
        .iter()
        .map(|entry| match entry {
            TreeEntry::Leaf { name } => TestNode::new(parent_path, name, results, None),
            TreeEntry::Folder { name, children } => {
                let path = join_path(parent_path, name);
                let children = to_nodes(children, &path, results);
                TestNode::new(parent_path, name, results, Some(children))
            }
        })
        .collect()
}

/// Build display nodes for a list of test names
///
/// In flat mode every name becomes a top-level leaf.
pub fn build_nodes<S: AsRef<str>>(
    names: &[S],
    results: Option<&KnownResults>,
    use_tree_view: bool,
) -> Vec<TestNode> {
    if !use_tree_view {
        return names
            .iter()
            .map(|name| TestNode::new("", name.as_ref(), results, None))
            .collect();
    }
    to_nodes(&build_tree(names), "", results)
}

/// Find the node with the given full name
pub fn find_node<'a>(nodes: &'a [TestNode], full_name: &str) -> Option<&'a TestNode> {
    for node in nodes {
        if node.full_name() == full_name {
            return Some(node);
        }
        let below = full_name
            .strip_prefix(node.full_name())
            .is_some_and(|rest| rest.starts_with('.'));
        if below {
            if let Some(found) = find_node(node.children(), full_name) {
                return Some(found);
            }
        }
    }
    None
}

pub(crate) fn join_path(parent_path: &str, name: &str) -> String {
    if parent_path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", parent_path, name)
    }
}

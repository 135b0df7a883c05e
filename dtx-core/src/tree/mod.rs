//! Test tree
//!
//! Fully-qualified names are split into namespace folders and test leaves.
//! The tree is rebuilt wholesale whenever names or results change.

mod builder;
mod node;

pub use builder::{build_nodes, build_tree, find_node, split_name, to_nodes, TreeEntry};
pub use node::{NodeIcon, TestNode};

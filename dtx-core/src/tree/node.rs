//! Display nodes of the test tree

use serde::Serialize;

use crate::filter;
use crate::results::{KnownResults, TestOutcome};

use super::builder::join_path;

/// Icon state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeIcon {
    /// Folder without any results below it
    Namespace,
    NamespacePassed,
    NamespaceFailed,
    NamespaceNotExecuted,
    /// Leaf while no results are known at all
    Run,
    /// Leaf without a result of its own
    TestNotRun,
    TestPassed,
    TestFailed,
    TestNotExecuted,
    /// Leaf that is part of a run in progress
    Running,
}

impl NodeIcon {
    fn for_leaf(outcome: Option<TestOutcome>) -> Self {
        match outcome {
            Some(TestOutcome::Passed) => NodeIcon::TestPassed,
            Some(TestOutcome::Failed) => NodeIcon::TestFailed,
            Some(TestOutcome::NotExecuted) => NodeIcon::TestNotExecuted,
            None => NodeIcon::TestNotRun,
        }
    }

    fn for_folder(worst: Option<TestOutcome>) -> Self {
        match worst {
            Some(TestOutcome::Failed) => NodeIcon::NamespaceFailed,
            Some(TestOutcome::NotExecuted) => NodeIcon::NamespaceNotExecuted,
            Some(TestOutcome::Passed) => NodeIcon::NamespacePassed,
            None => NodeIcon::Namespace,
        }
    }

    /// Outcome this icon stands for, if any
    pub fn outcome(&self) -> Option<TestOutcome> {
        match self {
            NodeIcon::TestPassed | NodeIcon::NamespacePassed => Some(TestOutcome::Passed),
            NodeIcon::TestFailed | NodeIcon::NamespaceFailed => Some(TestOutcome::Failed),
            NodeIcon::TestNotExecuted | NodeIcon::NamespaceNotExecuted => {
                Some(TestOutcome::NotExecuted)
            }
            _ => None,
        }
    }
}

/// A test or namespace in the explorer tree
///
/// Nodes are rebuilt from names and results on every change, so the icon is
/// always derived from the current result set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestNode {
    parent_path: String,
    name: String,
    full_name: String,
    run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    children: Option<Vec<TestNode>>,
    icon: NodeIcon,
}

impl TestNode {
    pub fn new(
        parent_path: &str,
        name: &str,
        results: Option<&KnownResults>,
        children: Option<Vec<TestNode>>,
    ) -> Self {
        let full_name = join_path(parent_path, name);
        let run_id = filter::run_id(&full_name);
        let mut node = Self {
            parent_path: parent_path.to_string(),
            name: name.to_string(),
            full_name,
            run_id,
            children,
            icon: NodeIcon::Namespace,
        };
        node.icon = node.derive_icon(results);
        node
    }

    fn derive_icon(&self, results: Option<&KnownResults>) -> NodeIcon {
        match (self.is_folder(), results) {
            (true, None) => NodeIcon::Namespace,
            (false, None) => NodeIcon::Run,
            (true, Some(results)) => {
                let worst = results
                    .under(&self.full_name)
                    .map(|r| r.outcome)
                    .max_by_key(TestOutcome::severity);
                NodeIcon::for_folder(worst)
            }
            (false, Some(results)) => {
                NodeIcon::for_leaf(results.get(&self.full_name).map(|r| r.outcome))
            }
        }
    }

    pub fn parent_path(&self) -> &str {
        &self.parent_path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dot-joined path of this node
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Identifier used when running this node
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn is_folder(&self) -> bool {
        self.children.as_ref().is_some_and(|c| !c.is_empty())
    }

    pub fn children(&self) -> &[TestNode] {
        self.children.as_deref().unwrap_or(&[])
    }

    pub fn icon(&self) -> NodeIcon {
        self.icon
    }

    pub(crate) fn mark_running(&mut self) {
        self.icon = NodeIcon::Running;
    }

    pub(crate) fn children_mut(&mut self) -> &mut [TestNode] {
        self.children.as_deref_mut().unwrap_or(&mut [])
    }

    /// Visit this node and all of its descendants
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a TestNode)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }
}

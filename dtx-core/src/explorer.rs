//! Explorer model
//!
//! Holds what a tree view needs: the discovered names, the latest known
//! results and which tests are running. Nodes are never stored. Every call
//! to [`TestExplorer::view`] rebuilds them from the current state, so icons
//! always reflect the latest results.

use crate::events::ExplorerEvent;
use crate::filter::{self, TestFilter};
use crate::results::{KnownResults, OutcomeSummary, ResultBatch};
use crate::status::StatusBar;
use crate::tree::{build_nodes, find_node, TestNode};

/// Hint shown when discovery found nothing
pub const NO_TESTS_HINT: &[&str] = &[
    "Please open or set the test project",
    "and ensure your project compiles.",
];

/// What the tree should show
#[derive(Debug, Clone)]
pub enum ExplorerView {
    Discovering,
    /// Discovery found no tests; carries hint lines
    NoTests(&'static [&'static str]),
    Tests(Vec<TestNode>),
}

/// Tree owner fed by orchestrator events
#[derive(Debug, Default)]
pub struct TestExplorer {
    /// `None` while discovering
    discovered: Option<Vec<String>>,
    results: Option<KnownResults>,
    running: Vec<TestFilter>,
    status: StatusBar,
}

impl TestExplorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn discovered_tests(&self) -> Option<&[String]> {
        self.discovered.as_deref()
    }

    pub fn results(&self) -> Option<&KnownResults> {
        self.results.as_ref()
    }

    pub fn status(&self) -> &StatusBar {
        &self.status
    }

    pub fn is_running(&self) -> bool {
        !self.running.is_empty()
    }

    /// Apply an event; returns whether the view changed
    pub fn apply(&mut self, event: &ExplorerEvent) -> bool {
        match event {
            ExplorerEvent::DiscoveryStarted => {
                self.discovered = None;
                self.running.clear();
                self.status.discovering();
            }
            ExplorerEvent::DiscoveryFinished(found) => {
                let mut names: Vec<String> = found
                    .iter()
                    .flat_map(|d| d.test_names.iter().cloned())
                    .collect();
                names.sort();
                names.dedup();
                self.status.discovered(names.len());
                self.discovered = Some(names);
                self.running.clear();
            }
            ExplorerEvent::RunStarted(filter) => {
                self.running.push(filter.clone());
                let count = self.running_count();
                self.status.running(count);
            }
            ExplorerEvent::NewResults(batch) => self.add_results(batch),
            ExplorerEvent::RunFailed { .. } => {
                self.running.clear();
                self.status.idle();
            }
            ExplorerEvent::RunRejected { .. } => return false,
        }
        true
    }

    fn add_results(&mut self, batch: &ResultBatch) {
        let names = batch.results.iter().map(|r| r.full_name.clone());
        let mut discovered = match self.discovered.take() {
            Some(mut discovered) if !batch.clear_previous => {
                discovered.extend(names);
                discovered
            }
            _ => names.collect(),
        };
        discovered.sort();
        discovered.dedup();
        self.status.discovered(discovered.len());
        self.discovered = Some(discovered);

        if batch.clear_previous || self.results.is_none() {
            self.results = Some(KnownResults::new());
        }
        if let Some(known) = self.results.as_mut() {
            known.merge(batch.results.iter().cloned());
        }

        self.running.clear();
        self.status
            .finished(OutcomeSummary::from_results(&batch.results));
    }

    /// Number of discovered tests covered by the running filters
    fn running_count(&self) -> usize {
        self.discovered
            .iter()
            .flatten()
            .filter(|name| self.running.iter().any(|f| is_running(name, f)))
            .count()
    }

    /// Build the view
    ///
    /// `use_tree_view` picks namespace folders or a flat list.
    pub fn view(&self, use_tree_view: bool) -> ExplorerView {
        match &self.discovered {
            None => ExplorerView::Discovering,
            Some(names) if names.is_empty() => ExplorerView::NoTests(NO_TESTS_HINT),
            Some(names) => {
                let mut nodes = build_nodes(names, self.results.as_ref(), use_tree_view);
                if !self.running.is_empty() {
                    mark_running(&mut nodes, &self.running);
                }
                ExplorerView::Tests(nodes)
            }
        }
    }

    /// Filter that runs the node named `name`
    ///
    /// A folder runs everything below it; a leaf runs just that test.
    pub fn filter_for(&self, name: &str) -> TestFilter {
        if name.is_empty() {
            return TestFilter::all();
        }
        let nodes = match self.view(true) {
            ExplorerView::Tests(nodes) => nodes,
            _ => return TestFilter::prefix(name),
        };
        match find_node(&nodes, name) {
            Some(node) if !node.is_folder() => TestFilter::exact(node.run_id()),
            _ => TestFilter::prefix(name),
        }
    }
}

fn is_running(full_name: &str, filter: &TestFilter) -> bool {
    if filter.is_all() {
        true
    } else if filter.exact {
        filter::run_id(full_name) == filter::run_id(&filter.name)
    } else {
        full_name.starts_with(&filter.name)
    }
}

fn mark_running(nodes: &mut [TestNode], running: &[TestFilter]) {
    for node in nodes {
        if node.is_folder() {
            mark_running(node.children_mut(), running);
        } else if running.iter().any(|f| is_running(node.full_name(), f)) {
            node.mark_running();
        }
    }
}

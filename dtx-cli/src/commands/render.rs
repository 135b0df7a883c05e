//! Terminal rendering of the explorer tree

use dtx_core::results::ResultBatch;
use dtx_core::{ExplorerView, NodeIcon, TestNode, TestOutcome};

fn marker(icon: NodeIcon) -> &'static str {
    match icon {
        NodeIcon::Namespace | NodeIcon::Run | NodeIcon::TestNotRun => "[ ]",
        NodeIcon::NamespacePassed | NodeIcon::TestPassed => "[+]",
        NodeIcon::NamespaceFailed | NodeIcon::TestFailed => "[x]",
        NodeIcon::NamespaceNotExecuted | NodeIcon::TestNotExecuted => "[?]",
        NodeIcon::Running => "[~]",
    }
}

fn print_node(node: &TestNode, depth: usize) {
    println!("{}{} {}", "  ".repeat(depth), marker(node.icon()), node.name());
    for child in node.children() {
        print_node(child, depth + 1);
    }
}

/// Print the explorer view
pub fn print_view(view: &ExplorerView) {
    match view {
        ExplorerView::Discovering => println!("Discovering tests"),
        ExplorerView::NoTests(hint) => {
            for line in hint.iter() {
                println!("{}", line);
            }
        }
        ExplorerView::Tests(nodes) => {
            for node in nodes {
                print_node(node, 0);
            }
        }
    }
}

/// Print failure details of a result batch
pub fn print_failures(batch: &ResultBatch) {
    let failed: Vec<_> = batch
        .results
        .iter()
        .filter(|r| r.outcome == TestOutcome::Failed)
        .collect();
    if failed.is_empty() {
        return;
    }

    println!();
    println!("Failed tests:");
    for result in failed {
        println!("  {}", result.full_name);
        if let Some(message) = &result.message {
            for line in message.lines() {
                println!("      {}", line);
            }
        }
    }
}

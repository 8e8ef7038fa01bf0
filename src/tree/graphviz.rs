//! Graphviz DOT export of the symbolic execution tree, for offline
//! inspection of a finished run.

use petgraph::graph::{DiGraph, NodeIndex};

use crate::expr::print::pretty;
use crate::trace::nodes::{ConcreteEvent, TraceNode};

/// Render the tree as Graphviz DOT.
pub fn to_dot(root: &TraceNode) -> String {
    let mut graph: DiGraph<String, String> = DiGraph::new();
    add_node(root, &mut graph);
    format!("{}", petgraph::dot::Dot::new(&graph))
}

fn add_node(node: &TraceNode, graph: &mut DiGraph<String, String>) -> NodeIndex {
    match node {
        TraceNode::Alert { message, next } => {
            annotation(graph, format!("Alert: {message}"), next)
        }
        TraceNode::ConsoleMessage { message, next } => {
            annotation(graph, format!("Console: {message}"), next)
        }
        TraceNode::DomModification {
            amount_modified,
            next,
            ..
        } => annotation(graph, format!("DOM modification ({amount_modified})"), next),
        TraceNode::PageLoad { url, next } => annotation(graph, format!("Load: {url}"), next),
        TraceNode::Marker { label, index, next, .. } => {
            annotation(graph, format!("Marker: {label}/{index}"), next)
        }
        TraceNode::FunctionCall { name, next } => {
            annotation(graph, format!("Call: {name}"), next)
        }
        TraceNode::Branch {
            condition,
            if_true,
            if_false,
        } => {
            let idx = graph.add_node(format!("Branch: {}", pretty(condition)));
            let true_idx = add_node(if_true, graph);
            let false_idx = add_node(if_false, graph);
            graph.add_edge(idx, true_idx, "T".into());
            graph.add_edge(idx, false_idx, "F".into());
            idx
        }
        TraceNode::ConcreteSummary { executions } => {
            let idx = graph.add_node(format!("Concrete ({} executions)", executions.len()));
            for execution in executions {
                let tokens: Vec<&str> = execution
                    .events
                    .iter()
                    .map(|t| match t {
                        ConcreteEvent::BranchFalse => "F",
                        ConcreteEvent::BranchTrue => "T",
                        ConcreteEvent::FunctionCall => "C",
                    })
                    .collect();
                let next_idx = add_node(&execution.next, graph);
                graph.add_edge(idx, next_idx, tokens.join(""));
            }
            idx
        }
        TraceNode::EndSuccess { trace_indices } => {
            graph.add_node(format!("End (success) {trace_indices:?}"))
        }
        TraceNode::EndFailure { trace_indices } => {
            graph.add_node(format!("End (failure) {trace_indices:?}"))
        }
        TraceNode::EndUnknown { trace_indices } => {
            graph.add_node(format!("End (unknown) {trace_indices:?}"))
        }
        TraceNode::Unexplored => graph.add_node("Unexplored".into()),
    }
}

fn annotation(
    graph: &mut DiGraph<String, String>,
    label: String,
    next: &TraceNode,
) -> NodeIndex {
    let idx = graph.add_node(label);
    let next_idx = add_node(next, graph);
    graph.add_edge(idx, next_idx, String::new());
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Expr, StrCmpOp};

    #[test]
    fn dot_export_mentions_every_node() {
        let tree = TraceNode::Branch {
            condition: Expr::str_cmp(StrCmpOp::Eq, Expr::var("x"), Expr::string("42")),
            if_true: Box::new(TraceNode::end_success()),
            if_false: Box::new(TraceNode::Unexplored),
        };
        let dot = to_dot(&tree);
        assert!(dot.starts_with("digraph"));
        assert!(dot.contains("Branch"));
        assert!(dot.contains("End (success)"));
        assert!(dot.contains("Unexplored"));
    }
}

//! Merger tests: grafting linear traces into the shared tree.

mod helpers;

use concolic::events::BrowserEvent;
use concolic::trace::builder;
use concolic::trace::nodes::TraceNode;
use concolic::tree::merge;

use helpers::{page_load, str_eq, sym_branch};

fn build(events: Vec<BrowserEvent>) -> TraceNode {
    let mut events = events;
    events.push(BrowserEvent::EndOfExecution);
    builder::build(&events).unwrap()
}

fn concrete(taken: bool) -> BrowserEvent {
    BrowserEvent::ConcreteBranch { taken }
}

fn function(name: &str) -> BrowserEvent {
    BrowserEvent::FunctionCall { name: name.into() }
}

#[test]
fn first_merge_fills_the_unexplored_root() {
    let mut tree = TraceNode::Unexplored;
    let trace = build(vec![sym_branch(str_eq("x", "1"), false), page_load("u")]);
    merge::merge(&mut tree, trace, 1).unwrap();

    let TraceNode::Branch { if_false, .. } = &tree else {
        panic!("expected branch at root");
    };
    let TraceNode::PageLoad { next, .. } = if_false.as_ref() else {
        panic!("expected page load on the false side");
    };
    assert_eq!(next.trace_indices().unwrap().iter().copied().collect::<Vec<_>>(), vec![1]);
}

#[test]
fn divergent_concrete_executions_share_one_summary() {
    // Two traces share the prefix [BranchFalse, FunctionCall] and diverge on
    // BranchFalse vs BranchTrue: one summary, two executions, indices split
    // across the two terminals.
    let mut tree = TraceNode::Unexplored;
    merge::merge(
        &mut tree,
        build(vec![concrete(false), function("f"), concrete(false)]),
        1,
    )
    .unwrap();
    merge::merge(
        &mut tree,
        build(vec![concrete(false), function("f"), concrete(true)]),
        2,
    )
    .unwrap();

    insta::assert_snapshot!(tree.dump(), @r#"
    ConcreteSummary
    #0 [F C F]:
      EndUnknown {1}
    #1 [F C T]:
      EndUnknown {2}
    "#);
}

#[test]
fn identical_concrete_executions_merge_into_one() {
    let mut tree = TraceNode::Unexplored;
    merge::merge(&mut tree, build(vec![concrete(true), function("f")]), 1).unwrap();
    merge::merge(&mut tree, build(vec![concrete(true), function("f")]), 2).unwrap();

    let TraceNode::ConcreteSummary { executions } = &tree else {
        panic!("expected summary root");
    };
    assert_eq!(executions.len(), 1);
    assert_eq!(
        executions[0].next.trace_indices().unwrap().iter().copied().collect::<Vec<_>>(),
        vec![1, 2]
    );
}

#[test]
fn merge_is_idempotent_across_orders() {
    // Two traces agreeing on all symbolic branches and annotations: merging
    // in either order yields the same tree.
    let t_false = || build(vec![sym_branch(str_eq("x", "1"), false), page_load("u")]);
    let t_true = || build(vec![sym_branch(str_eq("x", "1"), true), page_load("u")]);

    let mut ab = TraceNode::Unexplored;
    merge::merge(&mut ab, t_false(), 1).unwrap();
    merge::merge(&mut ab, t_true(), 2).unwrap();

    let mut ba = TraceNode::Unexplored;
    merge::merge(&mut ba, t_true(), 2).unwrap();
    merge::merge(&mut ba, t_false(), 1).unwrap();

    assert_eq!(ab, ba);
}

#[test]
fn trace_indices_form_a_disjoint_union() {
    let mut tree = TraceNode::Unexplored;
    let traces = vec![
        build(vec![sym_branch(str_eq("x", "1"), false), page_load("u")]),
        build(vec![sym_branch(str_eq("x", "1"), true), page_load("u")]),
        build(vec![sym_branch(str_eq("x", "1"), true), page_load("u")]),
    ];
    for (i, trace) in traces.into_iter().enumerate() {
        merge::merge(&mut tree, trace, (i + 1) as u32).unwrap();
    }

    let mut seen = Vec::new();
    collect_indices(&tree, &mut seen);
    seen.sort_unstable();
    assert_eq!(seen, vec![1, 2, 3]);
}

fn collect_indices(node: &TraceNode, out: &mut Vec<u32>) {
    match node {
        TraceNode::Alert { next, .. }
        | TraceNode::ConsoleMessage { next, .. }
        | TraceNode::DomModification { next, .. }
        | TraceNode::PageLoad { next, .. }
        | TraceNode::Marker { next, .. }
        | TraceNode::FunctionCall { next, .. } => collect_indices(next, out),
        TraceNode::Branch {
            if_true, if_false, ..
        } => {
            collect_indices(if_true, out);
            collect_indices(if_false, out);
        }
        TraceNode::ConcreteSummary { executions } => {
            for execution in executions {
                collect_indices(&execution.next, out);
            }
        }
        _ => {
            if let Some(indices) = node.trace_indices() {
                out.extend(indices.iter().copied());
            }
        }
    }
}

#[test]
fn branch_condition_mismatch_is_tree_corruption() {
    let mut tree = TraceNode::Unexplored;
    merge::merge(
        &mut tree,
        build(vec![sym_branch(str_eq("x", "1"), false), page_load("u")]),
        1,
    )
    .unwrap();

    let err = merge::merge(
        &mut tree,
        build(vec![sym_branch(str_eq("x", "2"), false), page_load("u")]),
        2,
    )
    .unwrap_err();
    assert!(err.invariant);
}

#[test]
fn marker_divergence_is_not_a_merge_point() {
    let marker = |index: &str| BrowserEvent::Marker {
        label: "step".into(),
        index: index.into(),
        select_restriction: None,
    };
    let mut tree = TraceNode::Unexplored;
    merge::merge(&mut tree, build(vec![marker("1")]), 1).unwrap();
    let err = merge::merge(&mut tree, build(vec![marker("2")]), 2).unwrap_err();
    assert!(err.invariant);
}

#[test]
fn prefix_trace_leaves_the_tree_unchanged() {
    let mut tree = TraceNode::Unexplored;
    merge::merge(
        &mut tree,
        build(vec![
            BrowserEvent::ConsoleMessage {
                message: "a".into(),
            },
            page_load("u"),
        ]),
        1,
    )
    .unwrap();
    let reference = tree.clone();

    // A truncated recording of the same run: ends (unknown) where the tree
    // still continues.
    merge::merge(
        &mut tree,
        build(vec![BrowserEvent::ConsoleMessage {
            message: "a".into(),
        }]),
        2,
    )
    .unwrap();
    assert_eq!(tree, reference);
}

#[test]
fn nondeterministic_summary_divergence_is_rejected() {
    let mut tree = TraceNode::Unexplored;
    merge::merge(&mut tree, build(vec![concrete(false), function("f")]), 1).unwrap();
    // Diverges at a function-call position, not a branch pair.
    let err = merge::merge(&mut tree, build(vec![concrete(false), concrete(true)]), 2)
        .unwrap_err();
    assert!(err.invariant);
}

//! Trace merger: graft a classified linear trace into the shared tree.
//!
//! The merger walks tree and trace in lockstep, requiring shallow equality at
//! every step. It never creates cycles: it only replaces `Unexplored` leaves,
//! extends `ConcreteSummary` execution lists, and records trace indices on
//! terminals.

use crate::error::{EngineError, Phase};
use crate::trace::nodes::{SingleExecution, TraceNode};

/// Merge `trace` (a classified linear trace) into the tree rooted at
/// `shared`, recording `trace_index` on the terminal the trace reaches.
pub fn merge(
    shared: &mut TraceNode,
    trace: TraceNode,
    trace_index: u32,
) -> Result<(), EngineError> {
    tracing::debug!(trace_index, "merging trace into symbolic execution tree");
    merge_nodes(shared, trace, trace_index)
}

fn merge_nodes(
    shared: &mut TraceNode,
    trace: TraceNode,
    trace_index: u32,
) -> Result<(), EngineError> {
    // A trace-side Unexplored is the not-taken half of a branch already
    // consumed above; there is nothing left to record.
    if trace.is_unexplored() {
        return Ok(());
    }

    // An unexplored slot in the tree takes the whole remainder of the trace.
    if shared.is_unexplored() {
        let mut grafted = trace;
        stamp_terminals(&mut grafted, trace_index);
        *shared = grafted;
        return Ok(());
    }

    if trace.is_terminal() {
        if shared.is_equal_shallow(&trace) {
            if let Some(indices) = shared.trace_indices_mut() {
                indices.insert(trace_index);
                if let Some(trace_indices) = trace.trace_indices() {
                    indices.extend(trace_indices.iter().copied());
                }
            }
            return Ok(());
        }
        // The trace ended while the tree continues: the trace was a strict
        // prefix of a previous run (a truncated recording), so there is
        // nothing to graft.
        if matches!(trace, TraceNode::EndUnknown { .. }) && !shared.is_terminal() {
            tracing::debug!(trace_index, "trace is a prefix of the existing tree");
            return Ok(());
        }
        return Err(mismatch_error(shared, &trace));
    }

    if !shared.is_equal_shallow(&trace) {
        return Err(mismatch_error(shared, &trace));
    }

    match (shared, trace) {
        (
            TraceNode::Branch {
                if_true, if_false, ..
            },
            TraceNode::Branch {
                if_true: trace_true,
                if_false: trace_false,
                ..
            },
        ) => {
            // A linear trace populates at most one side.
            if !trace_true.is_unexplored() && !trace_false.is_unexplored() {
                return Err(EngineError::invariant(
                    Phase::Merge,
                    "M003",
                    "merged trace has both branch sides populated",
                ));
            }
            merge_nodes(if_true, *trace_true, trace_index)?;
            merge_nodes(if_false, *trace_false, trace_index)
        }
        (
            TraceNode::ConcreteSummary { executions },
            TraceNode::ConcreteSummary {
                executions: mut trace_executions,
            },
        ) => {
            if trace_executions.len() != 1 {
                return Err(EngineError::invariant(
                    Phase::Merge,
                    "M004",
                    format!(
                        "merged trace summary has {} executions, expected 1",
                        trace_executions.len()
                    ),
                ));
            }
            let execution = trace_executions.pop().expect("length checked above");
            merge_execution(executions, execution, trace_index)
        }
        (
            TraceNode::Alert { next, .. }
            | TraceNode::ConsoleMessage { next, .. }
            | TraceNode::DomModification { next, .. }
            | TraceNode::PageLoad { next, .. }
            | TraceNode::Marker { next, .. }
            | TraceNode::FunctionCall { next, .. },
            trace,
        ) => {
            let trace_next = match trace {
                TraceNode::Alert { next, .. }
                | TraceNode::ConsoleMessage { next, .. }
                | TraceNode::DomModification { next, .. }
                | TraceNode::PageLoad { next, .. }
                | TraceNode::Marker { next, .. }
                | TraceNode::FunctionCall { next, .. } => next,
                _ => unreachable!("shallow equality matched distinct variants"),
            };
            merge_nodes(next, *trace_next, trace_index)
        }
        _ => unreachable!("terminals and unexplored handled above"),
    }
}

/// Splice one linear execution into an existing summary: recurse into the
/// execution it matches exactly, or append it as a new divergent execution.
fn merge_execution(
    executions: &mut Vec<SingleExecution>,
    execution: SingleExecution,
    trace_index: u32,
) -> Result<(), EngineError> {
    if let Some(position) = executions
        .iter()
        .position(|e| e.events == execution.events)
    {
        return merge_nodes(&mut executions[position].next, *execution.next, trace_index);
    }

    // New concrete path. Executions of one summary may only diverge at a
    // position where one takes BranchFalse and the other BranchTrue; any
    // other difference means the page behaved non-deterministically under
    // identical concrete inputs, which the model does not admit.
    for existing in executions.iter() {
        let shared_prefix = existing
            .events
            .iter()
            .zip(execution.events.iter())
            .take_while(|(a, b)| a == b)
            .count();
        let diverged_mid = shared_prefix < existing.events.len()
            && shared_prefix < execution.events.len();
        if diverged_mid {
            let a = existing.events[shared_prefix];
            let b = execution.events[shared_prefix];
            if !(a.is_branch() && b.is_branch()) {
                return Err(EngineError::invariant(
                    Phase::Merge,
                    "M005",
                    format!(
                        "summary executions diverge on non-branch tokens {a:?} vs {b:?} \
                         at position {shared_prefix}"
                    ),
                ));
            }
        } else {
            // One token list is a strict prefix of the other: the shorter
            // run hit an interesting node where the longer one kept going.
            return Err(EngineError::invariant(
                Phase::Merge,
                "M005",
                format!(
                    "summary execution of length {} is a prefix of one of length {}",
                    existing.events.len().min(execution.events.len()),
                    existing.events.len().max(execution.events.len())
                ),
            ));
        }
    }

    let mut execution = execution;
    stamp_terminals(&mut execution.next, trace_index);
    executions.push(execution);
    Ok(())
}

/// Record `trace_index` on every terminal of a freshly grafted subtree.
fn stamp_terminals(node: &mut TraceNode, trace_index: u32) {
    match node {
        TraceNode::Alert { next, .. }
        | TraceNode::ConsoleMessage { next, .. }
        | TraceNode::DomModification { next, .. }
        | TraceNode::PageLoad { next, .. }
        | TraceNode::Marker { next, .. }
        | TraceNode::FunctionCall { next, .. } => stamp_terminals(next, trace_index),
        TraceNode::Branch {
            if_true, if_false, ..
        } => {
            stamp_terminals(if_true, trace_index);
            stamp_terminals(if_false, trace_index);
        }
        TraceNode::ConcreteSummary { executions } => {
            for execution in executions.iter_mut() {
                stamp_terminals(&mut execution.next, trace_index);
            }
        }
        TraceNode::EndSuccess { trace_indices }
        | TraceNode::EndFailure { trace_indices }
        | TraceNode::EndUnknown { trace_indices } => {
            trace_indices.insert(trace_index);
        }
        TraceNode::Unexplored => {}
    }
}

fn mismatch_error(shared: &TraceNode, trace: &TraceNode) -> EngineError {
    EngineError::invariant(
        Phase::Merge,
        "M006",
        format!(
            "tree/trace mismatch during merge: tree node {} vs trace node {}",
            variant_name(shared),
            variant_name(trace)
        ),
    )
}

fn variant_name(node: &TraceNode) -> &'static str {
    match node {
        TraceNode::Alert { .. } => "Alert",
        TraceNode::ConsoleMessage { .. } => "ConsoleMessage",
        TraceNode::DomModification { .. } => "DomModification",
        TraceNode::PageLoad { .. } => "PageLoad",
        TraceNode::Marker { .. } => "Marker",
        TraceNode::FunctionCall { .. } => "FunctionCall",
        TraceNode::Branch { .. } => "Branch",
        TraceNode::ConcreteSummary { .. } => "ConcreteSummary",
        TraceNode::EndSuccess { .. } => "EndSuccess",
        TraceNode::EndFailure { .. } => "EndFailure",
        TraceNode::EndUnknown { .. } => "EndUnknown",
        TraceNode::Unexplored => "Unexplored",
    }
}

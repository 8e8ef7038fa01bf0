//! Trace builder: one browser event stream → one linear trace.
//!
//! The builder never merges anything. It produces a single-path chain where
//! each symbolic branch has only the taken side populated and runs of
//! concrete branches and function calls are folded into one
//! `ConcreteSummary` with exactly one execution.

use crate::error::EngineError;
use crate::events::{self, BrowserEvent};
use crate::trace::nodes::{ConcreteEvent, SingleExecution, TraceNode};

/// Build the linear trace for one iteration. The stream is validated first;
/// any protocol corruption aborts the build.
pub fn build(events: &[BrowserEvent]) -> Result<TraceNode, EngineError> {
    events::validate_stream(events)?;

    // Assemble back to front: start from the terminal and wrap each event
    // around the chain built so far. Folding a concrete event into an
    // existing head summary keeps the one-summary-between-interesting-nodes
    // invariant by construction.
    let mut chain = TraceNode::end_unknown();
    for event in events.iter().rev() {
        chain = match event {
            BrowserEvent::EndOfExecution => chain,
            BrowserEvent::SymbolicBranch { condition, taken } => {
                let (if_true, if_false) = if *taken {
                    (chain, TraceNode::Unexplored)
                } else {
                    (TraceNode::Unexplored, chain)
                };
                TraceNode::Branch {
                    condition: condition.clone(),
                    if_true: Box::new(if_true),
                    if_false: Box::new(if_false),
                }
            }
            BrowserEvent::ConcreteBranch { taken } => {
                let token = if *taken {
                    ConcreteEvent::BranchTrue
                } else {
                    ConcreteEvent::BranchFalse
                };
                prepend_concrete(token, chain)
            }
            BrowserEvent::FunctionCall { .. } => {
                prepend_concrete(ConcreteEvent::FunctionCall, chain)
            }
            BrowserEvent::Alert { message } => TraceNode::Alert {
                message: message.clone(),
                next: Box::new(chain),
            },
            BrowserEvent::ConsoleMessage { message } => TraceNode::ConsoleMessage {
                message: message.clone(),
                next: Box::new(chain),
            },
            BrowserEvent::DomModification {
                amount_modified,
                indicator_word_counts,
            } => TraceNode::DomModification {
                amount_modified: *amount_modified,
                indicator_word_counts: indicator_word_counts.clone(),
                next: Box::new(chain),
            },
            BrowserEvent::PageLoad { url } => TraceNode::PageLoad {
                url: url.clone(),
                next: Box::new(chain),
            },
            BrowserEvent::Marker {
                label,
                index,
                select_restriction,
            } => TraceNode::Marker {
                label: label.clone(),
                index: index.clone(),
                select_restriction: select_restriction.clone(),
                next: Box::new(chain),
            },
        };
    }
    Ok(chain)
}

/// Push a concrete token onto the chain head: into the open summary if the
/// head already is one, otherwise by opening a fresh single-execution
/// summary in front of it.
fn prepend_concrete(token: ConcreteEvent, chain: TraceNode) -> TraceNode {
    match chain {
        TraceNode::ConcreteSummary { mut executions } if executions.len() == 1 => {
            executions[0].events.insert(0, token);
            TraceNode::ConcreteSummary { executions }
        }
        other => TraceNode::ConcreteSummary {
            executions: vec![SingleExecution {
                events: vec![token],
                next: Box::new(other),
            }],
        },
    }
}

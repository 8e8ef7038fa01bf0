//! Trace node definitions.
//!
//! A single run of the page produces a linear trace of these nodes; the
//! merger grafts traces into the shared symbolic execution tree, which is the
//! same node type. Children are owned boxes; `Unexplored` is the sentinel for
//! a child slot no run has reached yet.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Phase};
use crate::expr::ExprRef;
use crate::forms::SelectRestriction;

/// One token of concrete execution inside a `ConcreteSummary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConcreteEvent {
    BranchFalse,
    BranchTrue,
    FunctionCall,
}

impl ConcreteEvent {
    pub fn is_branch(self) -> bool {
        matches!(self, ConcreteEvent::BranchFalse | ConcreteEvent::BranchTrue)
    }
}

/// One concrete path through a `ConcreteSummary`: its event tokens and the
/// subtree that execution leads to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleExecution {
    pub events: Vec<ConcreteEvent>,
    pub next: Box<TraceNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node")]
pub enum TraceNode {
    // --- Annotations: one child, `next` ---
    Alert {
        message: String,
        next: Box<TraceNode>,
    },
    ConsoleMessage {
        message: String,
        next: Box<TraceNode>,
    },
    DomModification {
        amount_modified: f64,
        indicator_word_counts: BTreeMap<u32, u32>,
        next: Box<TraceNode>,
    },
    PageLoad {
        url: String,
        next: Box<TraceNode>,
    },
    Marker {
        label: String,
        index: String,
        select_restriction: Option<SelectRestriction>,
        next: Box<TraceNode>,
    },
    FunctionCall {
        name: String,
        next: Box<TraceNode>,
    },

    // --- Symbolic branch: two children ---
    Branch {
        condition: ExprRef,
        if_true: Box<TraceNode>,
        if_false: Box<TraceNode>,
    },

    /// A run of concrete branches and function calls between two interesting
    /// nodes. Never empty; multiple executions share a common prefix and
    /// diverge only where some take `BranchFalse` and some `BranchTrue`.
    ConcreteSummary { executions: Vec<SingleExecution> },

    // --- Terminals: no children, the trace indices that reached them ---
    EndSuccess { trace_indices: BTreeSet<u32> },
    EndFailure { trace_indices: BTreeSet<u32> },
    EndUnknown { trace_indices: BTreeSet<u32> },

    /// Sentinel for a child slot no execution has reached.
    Unexplored,
}

impl TraceNode {
    pub fn end_success() -> TraceNode {
        TraceNode::EndSuccess {
            trace_indices: BTreeSet::new(),
        }
    }

    pub fn end_failure() -> TraceNode {
        TraceNode::EndFailure {
            trace_indices: BTreeSet::new(),
        }
    }

    pub fn end_unknown() -> TraceNode {
        TraceNode::EndUnknown {
            trace_indices: BTreeSet::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TraceNode::EndSuccess { .. }
                | TraceNode::EndFailure { .. }
                | TraceNode::EndUnknown { .. }
        )
    }

    pub fn is_unexplored(&self) -> bool {
        matches!(self, TraceNode::Unexplored)
    }

    /// The trace indices recorded on a terminal; `None` for non-terminals.
    pub fn trace_indices(&self) -> Option<&BTreeSet<u32>> {
        match self {
            TraceNode::EndSuccess { trace_indices }
            | TraceNode::EndFailure { trace_indices }
            | TraceNode::EndUnknown { trace_indices } => Some(trace_indices),
            _ => None,
        }
    }

    pub fn trace_indices_mut(&mut self) -> Option<&mut BTreeSet<u32>> {
        match self {
            TraceNode::EndSuccess { trace_indices }
            | TraceNode::EndFailure { trace_indices }
            | TraceNode::EndUnknown { trace_indices } => Some(trace_indices),
            _ => None,
        }
    }

    /// Replace the child at `position`. For merger use only: annotations have
    /// one position, branches two (false = 0, true = 1), concrete summaries
    /// one per execution. Terminals and `Unexplored` have none and reject the
    /// call with an invariant error.
    pub fn set_child(&mut self, position: usize, node: TraceNode) -> Result<(), EngineError> {
        match self {
            TraceNode::Alert { next, .. }
            | TraceNode::ConsoleMessage { next, .. }
            | TraceNode::DomModification { next, .. }
            | TraceNode::PageLoad { next, .. }
            | TraceNode::Marker { next, .. }
            | TraceNode::FunctionCall { next, .. } => {
                if position != 0 {
                    return Err(EngineError::invariant(
                        Phase::Merge,
                        "M001",
                        format!("annotation child position {position} out of range"),
                    ));
                }
                *next = Box::new(node);
                Ok(())
            }
            TraceNode::Branch {
                if_true, if_false, ..
            } => match position {
                0 => {
                    *if_false = Box::new(node);
                    Ok(())
                }
                1 => {
                    *if_true = Box::new(node);
                    Ok(())
                }
                _ => Err(EngineError::invariant(
                    Phase::Merge,
                    "M001",
                    format!("branch child position {position} out of range"),
                )),
            },
            TraceNode::ConcreteSummary { executions } => {
                if position >= executions.len() {
                    return Err(EngineError::invariant(
                        Phase::Merge,
                        "M001",
                        format!(
                            "summary child position {position} out of range ({} executions)",
                            executions.len()
                        ),
                    ));
                }
                executions[position].next = Box::new(node);
                Ok(())
            }
            TraceNode::EndSuccess { .. }
            | TraceNode::EndFailure { .. }
            | TraceNode::EndUnknown { .. }
            | TraceNode::Unexplored => Err(EngineError::invariant(
                Phase::Merge,
                "M002",
                "set_child on a node without children",
            )),
        }
    }

    /// Variant-local equality, ignoring children. This is the merger's
    /// node-identity check: two branches match only on structurally equal
    /// conditions, and markers only on equal label *and* index (a divergence
    /// in either is an intentional branch, not a merge point).
    pub fn is_equal_shallow(&self, other: &TraceNode) -> bool {
        match (self, other) {
            (TraceNode::Alert { .. }, TraceNode::Alert { .. }) => true,
            (TraceNode::ConsoleMessage { .. }, TraceNode::ConsoleMessage { .. }) => true,
            (TraceNode::DomModification { .. }, TraceNode::DomModification { .. }) => true,
            (TraceNode::PageLoad { .. }, TraceNode::PageLoad { .. }) => true,
            (
                TraceNode::Marker { label, index, .. },
                TraceNode::Marker {
                    label: other_label,
                    index: other_index,
                    ..
                },
            ) => label == other_label && index == other_index,
            (
                TraceNode::FunctionCall { name, .. },
                TraceNode::FunctionCall {
                    name: other_name, ..
                },
            ) => name == other_name,
            (
                TraceNode::Branch { condition, .. },
                TraceNode::Branch {
                    condition: other_condition,
                    ..
                },
            ) => condition == other_condition,
            (TraceNode::ConcreteSummary { .. }, TraceNode::ConcreteSummary { .. }) => true,
            (TraceNode::EndSuccess { .. }, TraceNode::EndSuccess { .. }) => true,
            (TraceNode::EndFailure { .. }, TraceNode::EndFailure { .. }) => true,
            (TraceNode::EndUnknown { .. }, TraceNode::EndUnknown { .. }) => true,
            (TraceNode::Unexplored, TraceNode::Unexplored) => true,
            _ => false,
        }
    }

    /// Number of branch tokens in each execution of a concrete summary.
    pub fn num_branches(&self) -> Vec<usize> {
        match self {
            TraceNode::ConcreteSummary { executions } => executions
                .iter()
                .map(|e| e.events.iter().filter(|t| t.is_branch()).count())
                .collect(),
            _ => vec![],
        }
    }

    /// Number of function-call tokens in each execution of a concrete summary.
    pub fn num_functions(&self) -> Vec<usize> {
        match self {
            TraceNode::ConcreteSummary { executions } => executions
                .iter()
                .map(|e| {
                    e.events
                        .iter()
                        .filter(|t| matches!(t, ConcreteEvent::FunctionCall))
                        .count()
                })
                .collect(),
            _ => vec![],
        }
    }

    /// Render the tree as an indented textual dump, for diagnostics and
    /// snapshot assertions.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_into(&mut out, 0);
        out
    }

    fn dump_into(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        match self {
            TraceNode::Alert { message, next } => {
                out.push_str(&format!("{indent}Alert {message:?}\n"));
                next.dump_into(out, depth);
            }
            TraceNode::ConsoleMessage { message, next } => {
                out.push_str(&format!("{indent}Console {message:?}\n"));
                next.dump_into(out, depth);
            }
            TraceNode::DomModification {
                amount_modified,
                indicator_word_counts,
                next,
            } => {
                out.push_str(&format!(
                    "{indent}DomModification amount={amount_modified} indicators={}\n",
                    indicator_word_counts.len()
                ));
                next.dump_into(out, depth);
            }
            TraceNode::PageLoad { url, next } => {
                out.push_str(&format!("{indent}PageLoad {url}\n"));
                next.dump_into(out, depth);
            }
            TraceNode::Marker { label, index, next, .. } => {
                out.push_str(&format!("{indent}Marker {label}/{index}\n"));
                next.dump_into(out, depth);
            }
            TraceNode::FunctionCall { name, next } => {
                out.push_str(&format!("{indent}FunctionCall {name}\n"));
                next.dump_into(out, depth);
            }
            TraceNode::Branch {
                condition,
                if_true,
                if_false,
            } => {
                out.push_str(&format!(
                    "{indent}Branch {}\n",
                    crate::expr::print::pretty(condition)
                ));
                out.push_str(&format!("{indent}T:\n"));
                if_true.dump_into(out, depth + 1);
                out.push_str(&format!("{indent}F:\n"));
                if_false.dump_into(out, depth + 1);
            }
            TraceNode::ConcreteSummary { executions } => {
                out.push_str(&format!("{indent}ConcreteSummary\n"));
                for (i, execution) in executions.iter().enumerate() {
                    let tokens: Vec<&str> = execution
                        .events
                        .iter()
                        .map(|t| match t {
                            ConcreteEvent::BranchFalse => "F",
                            ConcreteEvent::BranchTrue => "T",
                            ConcreteEvent::FunctionCall => "C",
                        })
                        .collect();
                    out.push_str(&format!("{indent}#{i} [{}]:\n", tokens.join(" ")));
                    execution.next.dump_into(out, depth + 1);
                }
            }
            TraceNode::EndSuccess { trace_indices } => {
                out.push_str(&format!("{indent}EndSuccess {trace_indices:?}\n"));
            }
            TraceNode::EndFailure { trace_indices } => {
                out.push_str(&format!("{indent}EndFailure {trace_indices:?}\n"));
            }
            TraceNode::EndUnknown { trace_indices } => {
                out.push_str(&format!("{indent}EndUnknown {trace_indices:?}\n"));
            }
            TraceNode::Unexplored => {
                out.push_str(&format!("{indent}Unexplored\n"));
            }
        }
    }
}

//! Tree addresses and path-condition extraction.
//!
//! A `TreePath` addresses a node in the symbolic execution tree by the
//! decisions needed to reach it: one step per symbolic branch and one per
//! concrete-summary execution. Annotations consume no step. Paths stay valid
//! across merges because merging only fills `Unexplored` slots and appends
//! summary executions.

use serde::Serialize;

use crate::error::{EngineError, Phase};
use crate::expr::ExprRef;
use crate::trace::nodes::TraceNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum PathStep {
    Branch { taken: bool },
    Execution { index: usize },
}

pub type TreePath = Vec<PathStep>;

/// The ordered branch guards on a root-to-target path, each paired with the
/// direction taken. Offered to the solver conjunctively.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathCondition {
    pub conjuncts: Vec<(ExprRef, bool)>,
}

impl PathCondition {
    pub fn is_empty(&self) -> bool {
        self.conjuncts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conjuncts.len()
    }

    /// Flip the direction of the final conjunct. This is the primitive the
    /// driver uses to aim at the unexplored side of the target branch. A
    /// no-op on the empty condition (the root target has no guard to flip).
    pub fn negate_last(&mut self) {
        if let Some((_, taken)) = self.conjuncts.last_mut() {
            *taken = !*taken;
        }
    }
}

/// Extract the path condition along `path`. One pair per `Branch` on the
/// path, in the order encountered; annotations and concrete-summary tokens
/// contribute nothing.
pub fn extract(root: &TraceNode, path: &[PathStep]) -> Result<PathCondition, EngineError> {
    let mut node = root;
    let mut steps = path.iter();
    let mut conjuncts = Vec::new();

    loop {
        match node {
            TraceNode::Alert { next, .. }
            | TraceNode::ConsoleMessage { next, .. }
            | TraceNode::DomModification { next, .. }
            | TraceNode::PageLoad { next, .. }
            | TraceNode::Marker { next, .. }
            | TraceNode::FunctionCall { next, .. } => node = next,
            TraceNode::Branch {
                condition,
                if_true,
                if_false,
            } => match steps.next() {
                Some(PathStep::Branch { taken }) => {
                    conjuncts.push((condition.clone(), *taken));
                    node = if *taken { if_true } else { if_false };
                }
                Some(PathStep::Execution { .. }) => {
                    return Err(path_mismatch("execution step at a branch node"));
                }
                None => break,
            },
            TraceNode::ConcreteSummary { executions } => match steps.next() {
                Some(PathStep::Execution { index }) => {
                    let Some(execution) = executions.get(*index) else {
                        return Err(path_mismatch(format!(
                            "execution index {index} out of range ({} executions)",
                            executions.len()
                        )));
                    };
                    node = &execution.next;
                }
                Some(PathStep::Branch { .. }) => {
                    return Err(path_mismatch("branch step at a concrete summary"));
                }
                None => break,
            },
            TraceNode::EndSuccess { .. }
            | TraceNode::EndFailure { .. }
            | TraceNode::EndUnknown { .. }
            | TraceNode::Unexplored => {
                if steps.next().is_some() {
                    return Err(path_mismatch("path extends past a leaf"));
                }
                break;
            }
        }
    }

    Ok(PathCondition { conjuncts })
}

fn path_mismatch(detail: impl Into<String>) -> EngineError {
    EngineError::invariant(
        Phase::Frontier,
        "F001",
        format!("path does not address the tree: {}", detail.into()),
    )
}

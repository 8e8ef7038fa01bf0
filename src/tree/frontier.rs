//! Exploration frontier: the catalog of unexplored branches, their
//! per-target status, and the pluggable selection policy.
//!
//! The frontier is re-derived from the tree at the end of every iteration;
//! statuses persist across recomputations, keyed by the target's tree
//! address. An empty (or fully exhausted) frontier is the single source of
//! termination for the driver.

use std::collections::HashMap;

use crate::trace::nodes::TraceNode;
use crate::tree::path::{PathStep, TreePath};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustedReason {
    Unsat,
    Unknown,
    /// The query used an operator no back-end supports.
    Unsolvable,
    SolverFailure,
    /// The solver said SAT but the run did not reach the target, or the
    /// iteration was abandoned.
    Missed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    New,
    /// A SAT solution for this target has been injected; the next merge
    /// decides whether the run actually reached it.
    Attempted,
    Exhausted(ExhaustedReason),
}

impl TargetStatus {
    fn rank(self) -> u8 {
        match self {
            TargetStatus::New => 0,
            TargetStatus::Attempted => 1,
            TargetStatus::Exhausted(_) => 2,
        }
    }

    pub fn is_exhausted(self) -> bool {
        matches!(self, TargetStatus::Exhausted(_))
    }
}

/// One unexplored branch side. `path` runs from the root to the parent
/// branch and ends with the direction already explored; flipping that last
/// step addresses the unexplored leaf itself. An empty path is the
/// unexplored root of a virgin tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorationTarget {
    pub path: TreePath,
}

impl ExplorationTarget {
    /// Address of the `Unexplored` leaf this target wants to reach.
    pub fn unexplored_address(&self) -> TreePath {
        let mut address = self.path.clone();
        if let Some(PathStep::Branch { taken }) = address.last_mut() {
            *taken = !*taken;
        }
        address
    }

    /// Number of symbolic branches between the root and the target.
    pub fn symbolic_depth(&self) -> usize {
        self.path
            .iter()
            .filter(|step| matches!(step, PathStep::Branch { .. }))
            .count()
    }
}

// =============================================================================
// SELECTION POLICY
// =============================================================================

pub trait Selector {
    /// Choose the next target from the unexhausted entries, presented in
    /// stable tree order. `None` ends the run.
    fn next_target(&mut self, possible_targets: &[ExplorationTarget]) -> Option<ExplorationTarget>;
}

/// Depth-first selection: always the first entry in tree order.
#[derive(Debug, Default)]
pub struct DfsSelector;

impl Selector for DfsSelector {
    fn next_target(&mut self, possible_targets: &[ExplorationTarget]) -> Option<ExplorationTarget> {
        possible_targets.first().cloned()
    }
}

// =============================================================================
// FRONTIER
// =============================================================================

#[derive(Debug, Default)]
pub struct Frontier {
    targets: Vec<ExplorationTarget>,
    statuses: HashMap<TreePath, TargetStatus>,
}

impl Frontier {
    pub fn new() -> Self {
        Frontier::default()
    }

    /// Re-derive the target list from the tree. Every `Unexplored` leaf
    /// yields exactly one entry; statuses of surviving entries are kept,
    /// statuses of explored (vanished) leaves are dropped.
    pub fn recompute(&mut self, root: &TraceNode) {
        let mut targets = Vec::new();
        let mut path = Vec::new();
        collect_targets(root, &mut path, &mut targets);

        let mut statuses = HashMap::with_capacity(targets.len());
        for target in &targets {
            let address = target.unexplored_address();
            let status = self
                .statuses
                .get(&address)
                .copied()
                .unwrap_or(TargetStatus::New);
            statuses.insert(address, status);
        }
        self.targets = targets;
        self.statuses = statuses;
    }

    pub fn targets(&self) -> &[ExplorationTarget] {
        &self.targets
    }

    pub fn status(&self, target: &ExplorationTarget) -> TargetStatus {
        self.statuses
            .get(&target.unexplored_address())
            .copied()
            .unwrap_or(TargetStatus::New)
    }

    /// Upgrade a target's status. Downgrades are ignored: once a target is
    /// `Exhausted` it is never retried.
    pub fn mark(&mut self, target: &ExplorationTarget, status: TargetStatus) {
        self.mark_address(&target.unexplored_address(), status);
    }

    /// `mark`, addressed by the unexplored leaf directly.
    pub fn mark_address(&mut self, address: &TreePath, status: TargetStatus) {
        let current = self
            .statuses
            .get(address)
            .copied()
            .unwrap_or(TargetStatus::New);
        if status.rank() >= current.rank() && !current.is_exhausted() {
            self.statuses.insert(address.clone(), status);
        } else {
            tracing::warn!(?address, ?current, ?status, "ignoring status downgrade");
        }
    }

    /// The entries a selection policy may see, in tree order.
    pub fn selectable(&self) -> Vec<ExplorationTarget> {
        self.targets
            .iter()
            .filter(|t| !self.status(t).is_exhausted())
            .cloned()
            .collect()
    }

    pub fn select(&self, selector: &mut dyn Selector) -> Option<ExplorationTarget> {
        let possible = self.selectable();
        if possible.is_empty() {
            return None;
        }
        selector.next_target(&possible)
    }

    /// Whether the leaf at `address` is still unexplored.
    pub fn contains_address(&self, address: &TreePath) -> bool {
        self.statuses.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Depth-first collection of every `Unexplored` leaf, false side before true
/// side, so the target order is a stable tree order.
fn collect_targets(
    node: &TraceNode,
    path: &mut TreePath,
    targets: &mut Vec<ExplorationTarget>,
) {
    match node {
        TraceNode::Alert { next, .. }
        | TraceNode::ConsoleMessage { next, .. }
        | TraceNode::DomModification { next, .. }
        | TraceNode::PageLoad { next, .. }
        | TraceNode::Marker { next, .. }
        | TraceNode::FunctionCall { next, .. } => collect_targets(next, path, targets),
        TraceNode::Branch {
            if_true, if_false, ..
        } => {
            for (taken, child) in [(false, if_false), (true, if_true)] {
                if child.is_unexplored() {
                    let mut target_path = path.clone();
                    target_path.push(PathStep::Branch { taken: !taken });
                    targets.push(ExplorationTarget { path: target_path });
                } else {
                    path.push(PathStep::Branch { taken });
                    collect_targets(child, path, targets);
                    path.pop();
                }
            }
        }
        TraceNode::ConcreteSummary { executions } => {
            for (index, execution) in executions.iter().enumerate() {
                path.push(PathStep::Execution { index });
                collect_targets(&execution.next, path, targets);
                path.pop();
            }
        }
        TraceNode::Unexplored => {
            // Only reachable as the root of a virgin tree; branch-side
            // leaves are handled at their parent.
            targets.push(ExplorationTarget { path: path.clone() });
        }
        TraceNode::EndSuccess { .. }
        | TraceNode::EndFailure { .. }
        | TraceNode::EndUnknown { .. } => {}
    }
}

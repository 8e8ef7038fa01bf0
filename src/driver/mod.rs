//! Iteration driver: the state machine sequencing
//! load → execute → record → merge → select → solve → next-input.
//!
//! The driver owns the shared symbolic execution tree and is the only
//! component that decides whether an error is fatal or recoverable. The
//! frontier is the single source of termination: when it is exhausted (or
//! the iteration budget runs out) the run is over.
//!
//! In reordering mode the actions (fill field X, click Y) are executed in
//! sequence and each action records into its own tree under its raw variable
//! names; position-qualified renaming (`v` → `v#i`) happens only when a
//! query is assembled, so one action's tree stays mergeable across
//! orderings.

pub mod browser;
pub mod stats;

use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::events::BrowserEvent;
use crate::forms::{FormRestrictions, InjectionMap, InjectionValue};
use crate::options::Options;
use crate::reordering::{ActionInfo, ReorderingInfo};
use crate::solver::{Solution, Solver, SolverQuery};
use crate::trace::builder;
use crate::trace::classifier::{self, Classification};
use crate::trace::nodes::TraceNode;
use crate::tree::frontier::{ExhaustedReason, Frontier, Selector, TargetStatus};
use crate::tree::path::{self, PathCondition, TreePath};
use crate::tree::{graphviz, merge};

use browser::{Browser, BrowserError};
use stats::Stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Initial,
    Loading,
    Executing,
    Merging,
    Selecting,
    Solving,
    Injecting,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    FrontierExhausted,
    IterationLimit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub iterations: u32,
    pub termination: TerminationReason,
}

/// One user-level action in reordering mode. Each action owns its symbolic
/// execution tree, recorded under raw variable names.
#[derive(Debug)]
struct Action {
    index: u32,
    variable: String,
    value: InjectionValue,
    tree: TraceNode,
    frontier: Frontier,
}

/// Why the current iteration could not be completed.
enum IterationAbort {
    Browser(BrowserError),
    Engine(EngineError),
}

enum NextStep {
    Inject,
    Terminate(TerminationReason),
}

pub struct ConcolicDriver<B: Browser, S: Solver> {
    options: Options,
    browser: B,
    solver: S,
    selector: Box<dyn Selector>,
    tree: TraceNode,
    frontier: Frontier,
    stats: Stats,
    state: DriverState,
    iteration: u32,
    /// Injections computed from the last SAT solution; empty before the
    /// first solve.
    next_injections: InjectionMap,
    /// The leaf the current iteration tries to reach: its action (reordering
    /// mode only) and its address in that tree.
    attempted: Option<(Option<u32>, TreePath)>,
    /// The most recently solved (already negated) path condition, kept for
    /// the diagnostic final dump.
    last_condition: Option<PathCondition>,
    fields: Vec<crate::forms::FormFieldDescriptor>,
    restrictions: FormRestrictions,
    actions: BTreeMap<u32, Action>,
    current_order: Vec<u32>,
}

impl<B: Browser, S: Solver> ConcolicDriver<B, S> {
    pub fn new(options: Options, browser: B, solver: S) -> Self {
        let selector = options.selection_policy.make_selector();
        ConcolicDriver {
            options,
            browser,
            solver,
            selector,
            tree: TraceNode::Unexplored,
            frontier: Frontier::new(),
            stats: Stats::new(),
            state: DriverState::Initial,
            iteration: 0,
            next_injections: InjectionMap::new(),
            attempted: None,
            last_condition: None,
            fields: Vec::new(),
            restrictions: FormRestrictions::default(),
            actions: BTreeMap::new(),
            current_order: Vec::new(),
        }
    }

    /// Run the concolic loop to completion.
    pub fn run(&mut self) -> Result<RunSummary, EngineError> {
        tracing::info!(url = %self.options.url, "beginning analysis");
        loop {
            if self.options.iteration_limit > 0 && self.iteration >= self.options.iteration_limit
            {
                tracing::info!("iteration limit reached");
                return Ok(self.terminate(TerminationReason::IterationLimit));
            }
            self.iteration += 1;
            self.stats.accumulate("Concolic::Iterations", 1);
            tracing::info!(iteration = self.iteration, "new iteration");

            match self.run_one_iteration() {
                Ok(()) => {}
                Err(IterationAbort::Browser(e)) => {
                    tracing::warn!(error = %e, "iteration abandoned");
                    self.stats.accumulate("Concolic::AbandonedIterations", 1);
                }
                Err(IterationAbort::Engine(e)) => {
                    if e.invariant {
                        self.note_invariant(&e);
                    } else {
                        tracing::warn!(error = %e, "iteration aborted");
                    }
                    self.stats.accumulate("Concolic::AbandonedIterations", 1);
                }
            }

            self.state = DriverState::Selecting;
            self.recompute_frontiers();
            self.check_missed_target();

            match self.select_and_solve()? {
                NextStep::Inject => {}
                NextStep::Terminate(reason) => return Ok(self.terminate(reason)),
            }
        }
    }

    // ---------------------------------------------------------------------
    // Loading / Executing / Merging
    // ---------------------------------------------------------------------

    fn run_one_iteration(&mut self) -> Result<(), IterationAbort> {
        self.state = DriverState::Loading;
        self.browser.reset_cookies();
        let setup_events = self
            .browser
            .load_page(&self.options.url, &self.options.preset_cookies)
            .map_err(IterationAbort::Browser)?;
        tracing::debug!(count = setup_events.len(), "page setup events discarded");
        // Timers deferred during the load fire now, before the trace starts.
        let _ = self
            .clear_async_events()
            .map_err(IterationAbort::Browser)?;

        if self.fields.is_empty() {
            self.fields = self.browser.form_fields();
            self.restrictions = FormRestrictions::from_fields(&self.fields);
            tracing::info!(
                fields = self.fields.len(),
                selects = self.restrictions.selects.len(),
                radio_groups = self.restrictions.radios.len(),
                "discovered form fields"
            );
            if self.options.reordering {
                self.setup_initial_actions();
            }
        }

        self.state = DriverState::Executing;
        if self.options.reordering {
            return self.execute_action_sequence();
        }

        let injections = self.current_injections();
        tracing::debug!(?injections, "injecting and running top-level event");
        let mut events = self
            .browser
            .run_event(&injections)
            .map_err(IterationAbort::Browser)?;
        events.extend(self.clear_async_events().map_err(IterationAbort::Browser)?);
        events.push(BrowserEvent::EndOfExecution);

        self.state = DriverState::Merging;
        let trace = self.build_and_classify(&events)?;
        merge::merge(&mut self.tree, trace, self.iteration).map_err(IterationAbort::Engine)?;
        Ok(())
    }

    /// Build, classify and count one iteration's trace.
    fn build_and_classify(&mut self, events: &[BrowserEvent]) -> Result<TraceNode, IterationAbort> {
        let mut trace = builder::build(events).map_err(IterationAbort::Engine)?;
        let classification = classifier::classify(&mut trace, self.options.indicator_threshold)
            .map_err(IterationAbort::Engine)?;
        tracing::info!(?classification, "trace classified");
        self.stats.accumulate(
            match classification {
                Classification::Success => "Concolic::Traces::Success",
                Classification::Failure => "Concolic::Traces::Failure",
                Classification::Unknown => "Concolic::Traces::Unknown",
            },
            1,
        );
        Ok(trace)
    }

    /// Fire deferred single-shot timers in id order for up to four rounds
    /// (to flush chained timers), then cancel whatever remains.
    fn clear_async_events(&mut self) -> Result<Vec<BrowserEvent>, BrowserError> {
        let mut events = Vec::new();
        for round in 0..4 {
            let mut due: Vec<_> = self
                .browser
                .registered_timers()
                .into_iter()
                .filter(|t| t.single_shot)
                .collect();
            if due.is_empty() {
                break;
            }
            due.sort_by_key(|t| t.id);
            tracing::debug!(round, timers = due.len(), "firing deferred timers");
            for timer in due {
                events.extend(self.browser.fire_timer(timer.id)?);
                self.browser.cancel_timer(timer.id);
                self.stats
                    .accumulate("Concolic::ClearAsyncEvents::TimersTriggered", 1);
            }
        }
        for timer in self.browser.registered_timers() {
            tracing::debug!(id = timer.id, "cancelling leftover timer");
            self.browser.cancel_timer(timer.id);
            self.stats
                .accumulate("Concolic::ClearAsyncEvents::TimersCancelled", 1);
        }
        Ok(events)
    }

    // ---------------------------------------------------------------------
    // Selecting / Solving / Injecting
    // ---------------------------------------------------------------------

    fn recompute_frontiers(&mut self) {
        if self.options.reordering {
            for action in self.actions.values_mut() {
                action.frontier.recompute(&action.tree);
            }
        } else {
            self.frontier.recompute(&self.tree);
        }
    }

    /// A SAT target whose leaf is still unexplored after the merge was
    /// missed; retrying the same query would loop forever.
    fn check_missed_target(&mut self) {
        let Some((action_index, address)) = self.attempted.take() else {
            return;
        };
        let frontier = match action_index {
            Some(index) => match self.actions.get_mut(&index) {
                Some(action) => &mut action.frontier,
                None => return,
            },
            None => &mut self.frontier,
        };
        if frontier.contains_address(&address) {
            tracing::warn!(?address, "intended target was not reached, marking missed");
            self.stats.accumulate("Concolic::MissedTargets", 1);
            frontier.mark_address(&address, TargetStatus::Exhausted(ExhaustedReason::Missed));
        }
    }

    fn select_and_solve(&mut self) -> Result<NextStep, EngineError> {
        if self.options.reordering {
            return self.select_and_solve_reordering();
        }
        loop {
            let Some(target) = self.frontier.select(self.selector.as_mut()) else {
                tracing::info!("frontier exhausted");
                return Ok(NextStep::Terminate(TerminationReason::FrontierExhausted));
            };
            self.state = DriverState::Solving;

            let mut condition = match path::extract(&self.tree, &target.path) {
                Ok(condition) => condition,
                Err(e) => {
                    self.note_invariant(&e);
                    self.frontier
                        .mark(&target, TargetStatus::Exhausted(ExhaustedReason::Missed));
                    continue;
                }
            };
            condition.negate_last();
            self.last_condition = Some(condition.clone());

            let query = SolverQuery::new(condition, self.restrictions.clone());
            match self.solve_target(&query) {
                SolveOutcome::Sat(assignment) => {
                    self.frontier.mark(&target, TargetStatus::Attempted);
                    self.attempted = Some((None, target.unexplored_address()));
                    self.state = DriverState::Injecting;
                    self.next_injections = assignment;
                    return Ok(NextStep::Inject);
                }
                SolveOutcome::Exhausted(reason) => {
                    self.frontier.mark(&target, TargetStatus::Exhausted(reason));
                }
            }
        }
    }

    /// Submit one query and translate the outcome into either an injection
    /// or an exhaustion reason. Non-SAT outcomes are normal control flow.
    fn solve_target(&mut self, query: &SolverQuery) -> SolveOutcome {
        if let Err(e) = query.canonical_key() {
            tracing::info!(error = %e, "target not encodable, giving it up");
            self.stats
                .accumulate("Concolic::Solver::UnsolvableQueries", 1);
            return SolveOutcome::Exhausted(ExhaustedReason::Unsolvable);
        }
        match self.solver.solve(query) {
            Ok(Solution::Sat { assignment }) => {
                tracing::info!(?assignment, "solver returned SAT");
                self.stats.accumulate("Concolic::Solver::SatQueries", 1);
                SolveOutcome::Sat(assignment)
            }
            Ok(Solution::Unsat) => {
                tracing::info!("solver returned UNSAT");
                self.stats.accumulate("Concolic::Solver::UnsatQueries", 1);
                SolveOutcome::Exhausted(ExhaustedReason::Unsat)
            }
            Ok(Solution::Unknown) => {
                tracing::info!("solver returned UNKNOWN");
                self.stats.accumulate("Concolic::Solver::UnknownQueries", 1);
                SolveOutcome::Exhausted(ExhaustedReason::Unknown)
            }
            Ok(Solution::SolverFailure) => {
                tracing::warn!("solver failed");
                self.stats.accumulate("Concolic::Solver::Failures", 1);
                SolveOutcome::Exhausted(ExhaustedReason::SolverFailure)
            }
            Err(e) => {
                tracing::error!(error = %e, "solver call errored");
                self.stats.accumulate("Concolic::Solver::Failures", 1);
                SolveOutcome::Exhausted(ExhaustedReason::SolverFailure)
            }
        }
    }

    /// The injections for the coming iteration: every field's default,
    /// overlaid with presets, overlaid with the last SAT assignment.
    fn current_injections(&self) -> InjectionMap {
        let mut injections = self.default_injections();
        injections.extend(
            self.next_injections
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        injections
    }

    fn default_injections(&self) -> InjectionMap {
        let mut injections = InjectionMap::new();
        for field in &self.fields {
            if let Some(value) = field.current_value() {
                injections.insert(field.variable.clone(), value);
            }
        }
        injections.extend(
            self.options
                .preset_fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        injections
    }

    // ---------------------------------------------------------------------
    // Reordering mode
    // ---------------------------------------------------------------------

    fn setup_initial_actions(&mut self) {
        // One action per injectable field, in DOM order; the first iteration
        // executes them in that order.
        let mut index = 0;
        for field in &self.fields {
            let Some(value) = field.current_value() else {
                continue;
            };
            index += 1;
            self.actions.insert(
                index,
                Action {
                    index,
                    variable: field.variable.clone(),
                    value,
                    tree: TraceNode::Unexplored,
                    frontier: Frontier::new(),
                },
            );
            self.current_order.push(index);
        }
        tracing::info!(actions = self.actions.len(), "initial action sequence set up");
    }

    /// Execute the actions in the current order, recording one trace per
    /// action into that action's own tree.
    fn execute_action_sequence(&mut self) -> Result<(), IterationAbort> {
        let order = self.current_order.clone();
        for (slot, action_index) in order.iter().enumerate() {
            let (variable, value) = {
                let action = &self.actions[action_index];
                (action.variable.clone(), action.value.clone())
            };
            tracing::debug!(
                action = *action_index,
                position = slot + 1,
                variable = %variable,
                "executing action"
            );
            let mut injections = InjectionMap::new();
            injections.insert(variable, value);
            let mut events = self
                .browser
                .run_event(&injections)
                .map_err(IterationAbort::Browser)?;
            events.extend(self.clear_async_events().map_err(IterationAbort::Browser)?);
            events.push(BrowserEvent::EndOfExecution);

            self.state = DriverState::Merging;
            let trace = self.build_and_classify(&events)?;
            let iteration = self.iteration;
            let action = self
                .actions
                .get_mut(action_index)
                .expect("action indices are stable");
            merge::merge(&mut action.tree, trace, iteration).map_err(IterationAbort::Engine)?;
            self.state = DriverState::Executing;
        }
        Ok(())
    }

    /// Walk the actions in execution order and solve the first selectable
    /// target. The path condition is renamed to the action's position in the
    /// current order before it reaches the solver.
    fn select_and_solve_reordering(&mut self) -> Result<NextStep, EngineError> {
        let order = self.current_order.clone();
        for (slot, action_index) in order.iter().enumerate() {
            let position = (slot + 1) as u32;
            loop {
                let target = {
                    let action = self
                        .actions
                        .get(action_index)
                        .expect("action indices are stable");
                    action.frontier.select(self.selector.as_mut())
                };
                let Some(target) = target else {
                    break;
                };
                self.state = DriverState::Solving;

                let extracted = {
                    let action = &self.actions[action_index];
                    path::extract(&action.tree, &target.path)
                };
                let mut condition = match extracted {
                    Ok(condition) => condition,
                    Err(e) => {
                        self.note_invariant(&e);
                        self.actions
                            .get_mut(action_index)
                            .expect("action indices are stable")
                            .frontier
                            .mark(&target, TargetStatus::Exhausted(ExhaustedReason::Missed));
                        continue;
                    }
                };
                condition.negate_last();

                let mut info = self.reordering_info(position);
                let renamed = info.rename_path_condition(&condition);
                self.last_condition = Some(renamed.clone());

                let mut query = SolverQuery::new(renamed, self.restrictions.clone());
                query.reordering = Some(info);

                match self.solve_target(&query) {
                    SolveOutcome::Sat(assignment) => {
                        let action = self
                            .actions
                            .get_mut(action_index)
                            .expect("action indices are stable");
                        action.frontier.mark(&target, TargetStatus::Attempted);
                        self.attempted = Some((Some(*action_index), target.unexplored_address()));
                        self.state = DriverState::Injecting;
                        self.apply_reordering_solution(&assignment);
                        return Ok(NextStep::Inject);
                    }
                    SolveOutcome::Exhausted(reason) => {
                        self.actions
                            .get_mut(action_index)
                            .expect("action indices are stable")
                            .frontier
                            .mark(&target, TargetStatus::Exhausted(reason));
                    }
                }
            }
        }
        tracing::info!("all action frontiers exhausted");
        Ok(NextStep::Terminate(TerminationReason::FrontierExhausted))
    }

    fn reordering_info(&self, pc_index: u32) -> ReorderingInfo {
        let action_variables: BTreeMap<u32, ActionInfo> = self
            .actions
            .values()
            .map(|a| {
                (
                    a.index,
                    ActionInfo {
                        variable: a.variable.clone(),
                        value: a.value.clone(),
                    },
                )
            })
            .collect();
        ReorderingInfo::new(action_variables, BTreeMap::new(), pc_index, 0)
    }

    /// Decode a reordering solution: values come back keyed `v#position`;
    /// positions mentioned in the assignment dictate the new action order,
    /// unmentioned actions keep their relative order behind them.
    fn apply_reordering_solution(&mut self, assignment: &InjectionMap) {
        let per_position = ReorderingInfo::decode_assignment(assignment);
        let mut new_order = Vec::new();
        for values in per_position.values() {
            for (variable, value) in values {
                let Some(action) = self
                    .actions
                    .values_mut()
                    .find(|a| a.variable == *variable)
                else {
                    tracing::warn!(%variable, "solution names an unknown action variable");
                    continue;
                };
                action.value = value.clone();
                if !new_order.contains(&action.index) {
                    new_order.push(action.index);
                }
            }
        }
        for index in &self.current_order {
            if !new_order.contains(index) {
                new_order.push(*index);
            }
        }
        tracing::debug!(?new_order, "action order for next iteration");
        self.current_order = new_order;
    }

    // ---------------------------------------------------------------------
    // Termination & failure handling
    // ---------------------------------------------------------------------

    fn terminate(&mut self, reason: TerminationReason) -> RunSummary {
        self.state = DriverState::Terminated;
        if self.options.negate_last_on_dump {
            if let Some(mut condition) = self.last_condition.clone() {
                condition.negate_last();
                let rendered: Vec<String> = condition
                    .conjuncts
                    .iter()
                    .map(|(e, taken)| format!("{} [{taken}]", crate::expr::print::pretty(e)))
                    .collect();
                tracing::info!(condition = ?rendered, "final path condition (last negated)");
            }
        }
        for (key, value) in self.stats.counters() {
            tracing::info!(%key, value = *value, "run statistic");
        }
        RunSummary {
            iterations: self.iteration,
            termination: reason,
        }
    }

    fn note_invariant(&mut self, e: &EngineError) {
        tracing::error!(error = %e, "invariant violation");
        self.stats.accumulate("Concolic::InvariantViolations", 1);
        debug_assert!(false, "{e}");
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    pub fn tree(&self) -> &TraceNode {
        &self.tree
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// The action execution order scheduled for the next iteration
    /// (reordering mode).
    pub fn action_order(&self) -> &[u32] {
        &self.current_order
    }

    /// Graphviz DOT rendering of the tree, for the final diagnostic dump.
    pub fn dump_dot(&self) -> String {
        graphviz::to_dot(&self.tree)
    }
}

enum SolveOutcome {
    Sat(InjectionMap),
    Exhausted(ExhaustedReason),
}

//! End-to-end driver scenarios against a scripted browser and solver.

mod helpers;

use concolic::driver::browser::BrowserError;
use concolic::driver::{ConcolicDriver, DriverState, TerminationReason};
use concolic::forms::InjectionValue;
use concolic::options::Options;
use concolic::solver::Solution;
use concolic::trace::nodes::TraceNode;
use concolic::tree::frontier::{ExhaustedReason, TargetStatus};

use helpers::{
    alert, injected_str, page_load, sat, select_field, str_eq, sym_branch, text_field,
    ScriptedBrowser, ScriptedSolver,
};

#[test]
fn single_symbolic_if_is_fully_explored_in_two_runs() {
    let browser = ScriptedBrowser::new(vec![text_field("x", "")], |injections| {
        let taken = injected_str(injections, "x") == "42";
        Ok(vec![
            sym_branch(str_eq("x", "42"), taken),
            page_load("http://example.com/done"),
        ])
    });
    let injections = browser.injection_log();
    let solver = ScriptedSolver::new(vec![sat(&[("x", "42")])]);
    let queries = solver.query_log();

    let mut driver = ConcolicDriver::new(Options::new("http://example.com/form"), browser, solver);
    let summary = driver.run().unwrap();

    assert_eq!(summary.iterations, 2);
    assert_eq!(summary.termination, TerminationReason::FrontierExhausted);
    assert_eq!(driver.state(), DriverState::Terminated);

    // Run 1 used the default value, run 2 the solver's answer.
    let log = injections.borrow();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0]["x"], InjectionValue::Str("".into()));
    assert_eq!(log[1]["x"], InjectionValue::Str("42".into()));

    // One query, asking for the unexplored true side.
    let queries = queries.borrow();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].contains("(assert (= |x| \"42\"))"));

    insta::assert_snapshot!(driver.tree().dump(), @r#"
    Branch (str.== (var x) "42")
    T:
      PageLoad http://example.com/done
      EndSuccess {2}
    F:
      PageLoad http://example.com/done
      EndSuccess {1}
    "#);
}

#[test]
fn unconditional_alert_terminates_after_one_failing_run() {
    let browser = ScriptedBrowser::new(vec![], |_| Ok(vec![alert("bad")]));
    let solver = ScriptedSolver::new(vec![]);

    let mut driver = ConcolicDriver::new(Options::new("http://example.com/"), browser, solver);
    let summary = driver.run().unwrap();

    assert_eq!(summary.iterations, 1);
    assert_eq!(summary.termination, TerminationReason::FrontierExhausted);
    assert_eq!(driver.stats().get("Concolic::Traces::Failure"), 1);

    let TraceNode::Alert { next, .. } = driver.tree() else {
        panic!("expected alert at root");
    };
    assert!(matches!(next.as_ref(), TraceNode::EndFailure { .. }));
}

#[test]
fn select_restriction_reaches_the_gated_branch() {
    let browser = ScriptedBrowser::new(
        vec![select_field("s", &["A", "B", "C"], "A")],
        |injections| {
            let taken = injected_str(injections, "s") == "B";
            Ok(vec![
                sym_branch(str_eq("s", "B"), taken),
                page_load("http://example.com/done"),
            ])
        },
    );
    let injections = browser.injection_log();
    let solver = ScriptedSolver::new(vec![sat(&[("s", "B")])]);
    let queries = solver.query_log();

    let mut driver = ConcolicDriver::new(Options::new("http://example.com/form"), browser, solver);
    let summary = driver.run().unwrap();
    assert_eq!(summary.iterations, 2);

    // The query carried the admissible value set.
    assert!(queries.borrow()[0]
        .contains("(assert (or (= |s| \"A\") (= |s| \"B\") (= |s| \"C\")))"));

    // The injected value is the solver's answer and is admissible.
    let log = injections.borrow();
    let injected = match &log[1]["s"] {
        InjectionValue::Str(s) => s.clone(),
        other => panic!("expected string injection, got {other:?}"),
    };
    assert_eq!(injected, "B");
    assert!(["A", "B", "C"].contains(&injected.as_str()));
}

#[test]
fn unknown_solution_exhausts_the_entry_and_the_run_ends() {
    // The page gates on a hash the solver cannot invert.
    let browser = ScriptedBrowser::new(vec![text_field("x", "")], |_| {
        Ok(vec![sym_branch(
            str_eq("x", "d41d8cd98f00b204e9800998ecf8427e"),
            false,
        )])
    });
    let solver = ScriptedSolver::new(vec![Solution::Unknown]);

    let mut driver = ConcolicDriver::new(Options::new("http://example.com/"), browser, solver);
    let summary = driver.run().unwrap();

    assert_eq!(summary.iterations, 1);
    assert_eq!(summary.termination, TerminationReason::FrontierExhausted);

    let frontier = driver.frontier();
    assert_eq!(frontier.targets().len(), 1);
    assert_eq!(
        frontier.status(&frontier.targets()[0]),
        TargetStatus::Exhausted(ExhaustedReason::Unknown)
    );
}

#[test]
fn unencodable_condition_is_given_up_without_calling_the_solver() {
    use concolic::expr::Expr;

    let browser = ScriptedBrowser::new(vec![text_field("x", "")], |_| {
        let condition = Expr::str_cmp(
            concolic::expr::StrCmpOp::Eq,
            Expr::str_regex_replace(Expr::var("x"), "[0-9]+", Expr::string("")),
            Expr::string(""),
        );
        Ok(vec![sym_branch(condition, false)])
    });
    let solver = ScriptedSolver::new(vec![sat(&[("x", "1")])]);
    let queries = solver.query_log();

    let mut driver = ConcolicDriver::new(Options::new("http://example.com/"), browser, solver);
    let summary = driver.run().unwrap();

    assert_eq!(summary.iterations, 1);
    assert!(queries.borrow().is_empty());
    let frontier = driver.frontier();
    assert_eq!(
        frontier.status(&frontier.targets()[0]),
        TargetStatus::Exhausted(ExhaustedReason::Unsolvable)
    );
}

#[test]
fn nested_branches_need_three_runs() {
    let browser = ScriptedBrowser::new(
        vec![text_field("u", ""), text_field("p", "")],
        |injections| {
            let mut events = Vec::new();
            if injected_str(injections, "u") == "a" {
                events.push(sym_branch(str_eq("u", "a"), true));
                let inner = injected_str(injections, "p") == "b";
                events.push(sym_branch(str_eq("p", "b"), inner));
            } else {
                events.push(sym_branch(str_eq("u", "a"), false));
            }
            events.push(page_load("http://example.com/done"));
            Ok(events)
        },
    );
    let solver = ScriptedSolver::new(vec![
        sat(&[("u", "a")]),
        sat(&[("u", "a"), ("p", "b")]),
    ]);

    let mut driver = ConcolicDriver::new(Options::new("http://example.com/form"), browser, solver);
    let summary = driver.run().unwrap();

    assert_eq!(summary.iterations, 3);
    assert_eq!(summary.termination, TerminationReason::FrontierExhausted);
    assert!(driver.frontier().is_empty());
    assert_eq!(driver.stats().get("Concolic::Traces::Success"), 3);
}

#[test]
fn iteration_limit_stops_the_loop() {
    let browser = ScriptedBrowser::new(vec![text_field("x", "")], |injections| {
        let taken = injected_str(injections, "x") == "42";
        Ok(vec![
            sym_branch(str_eq("x", "42"), taken),
            page_load("http://example.com/done"),
        ])
    });
    let solver = ScriptedSolver::new(vec![sat(&[("x", "42")])]);

    let mut options = Options::new("http://example.com/form");
    options.iteration_limit = 1;
    let mut driver = ConcolicDriver::new(options, browser, solver);
    let summary = driver.run().unwrap();

    assert_eq!(summary.iterations, 1);
    assert_eq!(summary.termination, TerminationReason::IterationLimit);
}

#[test]
fn browser_crash_marks_the_attempted_target_missed() {
    let mut calls = 0u32;
    let browser = ScriptedBrowser::new(vec![text_field("x", "")], move |_| {
        calls += 1;
        if calls == 1 {
            Ok(vec![
                sym_branch(str_eq("x", "42"), false),
                page_load("http://example.com/done"),
            ])
        } else {
            Err(BrowserError::Crashed("renderer died".into()))
        }
    });
    let solver = ScriptedSolver::new(vec![sat(&[("x", "42")])]);

    let mut driver = ConcolicDriver::new(Options::new("http://example.com/form"), browser, solver);
    let summary = driver.run().unwrap();

    assert_eq!(summary.iterations, 2);
    assert_eq!(summary.termination, TerminationReason::FrontierExhausted);
    assert_eq!(driver.stats().get("Concolic::AbandonedIterations"), 1);
    assert_eq!(driver.stats().get("Concolic::MissedTargets"), 1);

    let frontier = driver.frontier();
    assert_eq!(
        frontier.status(&frontier.targets()[0]),
        TargetStatus::Exhausted(ExhaustedReason::Missed)
    );
}

#[test]
fn empty_trace_collapses_the_frontier() {
    let browser = ScriptedBrowser::new(vec![], |_| Ok(vec![]));
    let solver = ScriptedSolver::new(vec![]);

    let mut driver = ConcolicDriver::new(Options::new("http://example.com/"), browser, solver);
    let summary = driver.run().unwrap();

    assert_eq!(summary.iterations, 1);
    assert!(driver.frontier().is_empty());
    let TraceNode::EndUnknown { trace_indices } = driver.tree() else {
        panic!("expected unknown terminal at root");
    };
    assert_eq!(trace_indices.iter().copied().collect::<Vec<_>>(), vec![1]);
}

#[test]
fn dot_dump_renders_the_final_tree() {
    let browser = ScriptedBrowser::new(vec![], |_| Ok(vec![alert("bad")]));
    let solver = ScriptedSolver::new(vec![]);
    let mut driver = ConcolicDriver::new(Options::new("http://example.com/"), browser, solver);
    driver.run().unwrap();

    let dot = driver.dump_dot();
    assert!(dot.starts_with("digraph"));
    assert!(dot.contains("Alert"));
    assert!(dot.contains("End (failure)"));
}

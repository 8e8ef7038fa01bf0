//! Trace classification: decide whether a recorded run got past the page's
//! client-side validation, and rewrite the trace terminal accordingly.
//!
//! Rules, scanned head to terminal:
//!   * alert → failure
//!   * DOM modification matching indicator words → failure
//!   * new page load → success
//!   * otherwise → unknown
//!
//! The first deciding annotation wins: a terminal is inserted right behind it
//! and the rest of the trace is discarded.

use crate::error::{EngineError, Phase};
use crate::trace::nodes::TraceNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    Failure,
    Unknown,
}

/// Classify a freshly built trace in place. `indicator_threshold` is the
/// minimum count of any single indicator word that makes a DOM modification
/// count as failure.
///
/// Classifying a trace that already carries a success or failure terminal is
/// an invariant breach.
pub fn classify(
    trace: &mut TraceNode,
    indicator_threshold: u32,
) -> Result<Classification, EngineError> {
    let result = classify_node(trace, indicator_threshold)?;
    Ok(result.unwrap_or(Classification::Unknown))
}

fn classify_node(
    node: &mut TraceNode,
    indicator_threshold: u32,
) -> Result<Option<Classification>, EngineError> {
    match node {
        TraceNode::Alert { next, .. } => {
            **next = TraceNode::end_failure();
            Ok(Some(Classification::Failure))
        }
        TraceNode::DomModification {
            indicator_word_counts,
            next,
            ..
        } => {
            if indicator_word_counts
                .values()
                .any(|count| *count >= indicator_threshold)
            {
                **next = TraceNode::end_failure();
                Ok(Some(Classification::Failure))
            } else {
                classify_node(next, indicator_threshold)
            }
        }
        TraceNode::PageLoad { next, .. } => {
            **next = TraceNode::end_success();
            Ok(Some(Classification::Success))
        }
        TraceNode::ConsoleMessage { next, .. }
        | TraceNode::Marker { next, .. }
        | TraceNode::FunctionCall { next, .. } => classify_node(next, indicator_threshold),
        TraceNode::Branch {
            if_true, if_false, ..
        } => {
            // Only reachable with both sides populated on fully concrete
            // subtraces; freshly built traces have one side Unexplored, which
            // classifies to None.
            let true_side = classify_node(if_true, indicator_threshold)?;
            let false_side = classify_node(if_false, indicator_threshold)?;
            Ok(false_side.or(true_side))
        }
        TraceNode::ConcreteSummary { executions } => {
            let mut result = None;
            for execution in executions.iter_mut() {
                result = classify_node(&mut execution.next, indicator_threshold)?.or(result);
            }
            Ok(result)
        }
        TraceNode::EndUnknown { .. } => Ok(Some(Classification::Unknown)),
        TraceNode::EndSuccess { .. } | TraceNode::EndFailure { .. } => Err(EngineError::invariant(
            Phase::Classify,
            "C001",
            "classifying a trace which has already been classified",
        )),
        TraceNode::Unexplored => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BrowserEvent;
    use crate::trace::builder;

    fn classify_stream(events: &[BrowserEvent]) -> (Classification, TraceNode) {
        let mut trace = builder::build(events).unwrap();
        let result = classify(&mut trace, 1).unwrap();
        (result, trace)
    }

    #[test]
    fn alert_classifies_as_failure_and_truncates() {
        let (result, trace) = classify_stream(&[
            BrowserEvent::Alert {
                message: "bad".into(),
            },
            BrowserEvent::ConsoleMessage {
                message: "after".into(),
            },
            BrowserEvent::EndOfExecution,
        ]);
        assert_eq!(result, Classification::Failure);
        match trace {
            TraceNode::Alert { next, .. } => {
                assert_eq!(*next, TraceNode::end_failure());
            }
            other => panic!("expected Alert head, got {other:?}"),
        }
    }

    #[test]
    fn page_load_classifies_as_success() {
        let (result, trace) = classify_stream(&[
            BrowserEvent::PageLoad {
                url: "http://example.com/submitted".into(),
            },
            BrowserEvent::EndOfExecution,
        ]);
        assert_eq!(result, Classification::Success);
        match trace {
            TraceNode::PageLoad { next, .. } => assert_eq!(*next, TraceNode::end_success()),
            other => panic!("expected PageLoad head, got {other:?}"),
        }
    }

    #[test]
    fn dom_modification_respects_threshold() {
        let event = |count: u32| BrowserEvent::DomModification {
            amount_modified: 0.1,
            indicator_word_counts: [(0u32, count)].into_iter().collect(),
        };

        let (result, _) = classify_stream(&[event(1), BrowserEvent::EndOfExecution]);
        assert_eq!(result, Classification::Failure);

        let mut trace = builder::build(&[event(1), BrowserEvent::EndOfExecution]).unwrap();
        assert_eq!(classify(&mut trace, 3).unwrap(), Classification::Unknown);
    }

    #[test]
    fn undecided_trace_stays_unknown() {
        let (result, trace) = classify_stream(&[
            BrowserEvent::ConsoleMessage {
                message: "hello".into(),
            },
            BrowserEvent::EndOfExecution,
        ]);
        assert_eq!(result, Classification::Unknown);
        match trace {
            TraceNode::ConsoleMessage { next, .. } => assert_eq!(*next, TraceNode::end_unknown()),
            other => panic!("expected ConsoleMessage head, got {other:?}"),
        }
    }

    #[test]
    fn reclassification_is_an_invariant_breach() {
        let mut trace = builder::build(&[
            BrowserEvent::Alert {
                message: "bad".into(),
            },
            BrowserEvent::EndOfExecution,
        ])
        .unwrap();
        classify(&mut trace, 1).unwrap();
        let err = classify(&mut trace, 1).unwrap_err();
        assert!(err.invariant);
        assert_eq!(err.code, "C001");
    }
}

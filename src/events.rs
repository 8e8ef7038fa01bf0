//! Inbound browser event protocol.
//!
//! The instrumented browser reports one strictly ordered stream of events per
//! top-level execution. The stream is the only channel between the browser
//! and the core; everything the trace builder knows comes through here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::expr::visit::free_variables;
use crate::expr::ExprRef;
use crate::forms::SelectRestriction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BrowserEvent {
    /// A branch on a symbolically tagged condition, with the direction taken.
    #[serde(rename_all = "camelCase")]
    SymbolicBranch { condition: ExprRef, taken: bool },
    /// A branch whose condition carried no symbolic information.
    #[serde(rename_all = "camelCase")]
    ConcreteBranch { taken: bool },
    #[serde(rename_all = "camelCase")]
    FunctionCall { name: String },
    #[serde(rename_all = "camelCase")]
    Alert { message: String },
    #[serde(rename_all = "camelCase")]
    ConsoleMessage { message: String },
    /// A DOM mutation, with the fraction of the page modified and the count
    /// of each matched indicator word (keyed by indicator index).
    #[serde(rename_all = "camelCase")]
    DomModification {
        amount_modified: f64,
        indicator_word_counts: BTreeMap<u32, u32>,
    },
    /// A new page load was initiated (navigation, form POST, ...).
    #[serde(rename_all = "camelCase")]
    PageLoad { url: String },
    /// An analysis marker injected by the driver or the instrumentation.
    #[serde(rename_all = "camelCase")]
    Marker {
        label: String,
        index: String,
        select_restriction: Option<SelectRestriction>,
    },
    EndOfExecution,
}

/// Deserialize one event stream from its JSON form.
pub fn parse_stream(json: &str) -> Result<Vec<BrowserEvent>, EngineError> {
    serde_json::from_str::<Vec<BrowserEvent>>(json)
        .map_err(|e| EngineError::protocol("P001", format!("failed to parse event stream: {e}")))
}

/// Check the ordering rules of the protocol. A violation means the stream is
/// corrupt and the whole iteration must be abandoned.
pub fn validate_stream(events: &[BrowserEvent]) -> Result<(), EngineError> {
    let Some(last) = events.last() else {
        return Err(EngineError::protocol("P002", "empty event stream"));
    };
    if *last != BrowserEvent::EndOfExecution {
        return Err(EngineError::protocol(
            "P003",
            "event stream does not end with endOfExecution",
        ));
    }
    for (i, event) in events.iter().enumerate() {
        if *event == BrowserEvent::EndOfExecution && i + 1 != events.len() {
            return Err(EngineError::protocol(
                "P004",
                format!("event at position {} follows endOfExecution", i + 1),
            ));
        }
        if let BrowserEvent::SymbolicBranch { condition, .. } = event {
            if free_variables(condition).is_empty() {
                return Err(EngineError::protocol(
                    "P005",
                    format!(
                        "branch at position {i} is tagged symbolic but its condition \
                         contains no symbolic variable"
                    ),
                ));
            }
        }
    }
    Ok(())
}

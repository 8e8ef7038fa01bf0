//! Driver configuration.
//!
//! CLI parsing belongs to the embedding binary; this is the already-parsed
//! form it hands the driver.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::forms::InjectionMap;
use crate::solver::SolverBackend;
use crate::tree::frontier::{DfsSelector, Selector};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectionPolicy {
    #[default]
    Dfs,
}

impl SelectionPolicy {
    pub fn make_selector(self) -> Box<dyn Selector> {
        match self {
            SelectionPolicy::Dfs => Box::new(DfsSelector),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    /// Entry URL of the page under test.
    pub url: String,
    /// Maximum number of concolic iterations; 0 means unlimited.
    #[serde(default)]
    pub iteration_limit: u32,
    #[serde(default)]
    pub selection_policy: SelectionPolicy,
    #[serde(default)]
    pub solver_backend: SolverBackend,
    /// Diagnostic: negate the last constraint once more in the final tree
    /// dump, mirroring what the next query would have asked.
    #[serde(default)]
    pub negate_last_on_dump: bool,
    /// Cookies set before every iteration.
    #[serde(default)]
    pub preset_cookies: BTreeMap<String, String>,
    /// Field values forced on the first iteration (and whenever the solver
    /// leaves the field unconstrained).
    #[serde(default)]
    pub preset_fields: InjectionMap,
    /// Minimum per-word indicator count at which a DOM modification
    /// classifies the trace as a failure.
    #[serde(default = "default_indicator_threshold")]
    pub indicator_threshold: u32,
    /// Explore action orderings as well as values.
    #[serde(default)]
    pub reordering: bool,
}

fn default_indicator_threshold() -> u32 {
    1
}

impl Options {
    pub fn new(url: impl Into<String>) -> Self {
        Options {
            url: url.into(),
            iteration_limit: 0,
            selection_policy: SelectionPolicy::default(),
            solver_backend: SolverBackend::default(),
            negate_last_on_dump: false,
            preset_cookies: BTreeMap::new(),
            preset_fields: InjectionMap::new(),
            indicator_threshold: default_indicator_threshold(),
            reordering: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_deserialize_with_defaults() {
        let options: Options =
            serde_json::from_str(r#"{"url": "http://example.com/form"}"#).unwrap();
        assert_eq!(options.url, "http://example.com/form");
        assert_eq!(options.iteration_limit, 0);
        assert_eq!(options.selection_policy, SelectionPolicy::Dfs);
        assert_eq!(options.solver_backend, SolverBackend::Z3Str);
        assert_eq!(options.indicator_threshold, 1);
        assert!(!options.reordering);
    }
}

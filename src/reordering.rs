//! Reordering mode support: variable renaming across action positions.
//!
//! In reordering mode the user-level actions (fill field X, click Y) are an
//! exploration dimension of their own. Every symbolic variable observed
//! while action `i` executes is renamed `v` → `v#i`, so one path condition
//! can mention the same field at different positions; solutions come back
//! keyed by the renamed names and are decoded into per-position injections.

use std::collections::BTreeMap;

use crate::forms::{InjectionMap, InjectionValue};
use crate::tree::path::PathCondition;

/// Default value and variable name of one action, keyed by its index.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionInfo {
    pub variable: String,
    pub value: InjectionValue,
}

/// Carries the variable/index bookkeeping for one reordering query.
#[derive(Debug, Clone, Default)]
pub struct ReorderingInfo {
    action_variables: BTreeMap<u32, ActionInfo>,
    action_index_variables: BTreeMap<u32, ActionInfo>,
    index: u32,
    pc_index: u32,
    /// 0 when no submit-button constraints should be generated.
    submit_button_index: u32,
    /// Renamings performed so far: encoded name → original name.
    encoded: BTreeMap<String, String>,
}

impl ReorderingInfo {
    pub fn new(
        action_variables: BTreeMap<u32, ActionInfo>,
        action_index_variables: BTreeMap<u32, ActionInfo>,
        pc_index: u32,
        submit_button_index: u32,
    ) -> Self {
        ReorderingInfo {
            action_variables,
            action_index_variables,
            index: pc_index,
            pc_index,
            submit_button_index,
            encoded: BTreeMap::new(),
        }
    }

    /// Switch the renaming to the given action position.
    pub fn set_index(&mut self, index: u32) {
        self.index = index;
    }

    /// Reset the renaming to the position of the action under analysis.
    pub fn set_pc_index(&mut self) {
        self.index = self.pc_index;
    }

    /// Rename a variable at the current action position, recording the
    /// renaming so `decode` can reverse it.
    pub fn encode(&mut self, name: &str) -> String {
        let encoded = Self::encode_with_explicit_index(name, self.index);
        self.encoded.insert(encoded.clone(), name.to_string());
        encoded
    }

    pub fn encode_with_explicit_index(name: &str, index: u32) -> String {
        format!("{name}#{index}")
    }

    /// Reverse a renaming: the original variable name and the action
    /// position it was used at.
    pub fn decode(name: &str) -> Option<(&str, u32)> {
        let (base, index) = name.rsplit_once('#')?;
        let index = index.parse().ok()?;
        Some((base, index))
    }

    pub fn action_variables(&self) -> &BTreeMap<u32, ActionInfo> {
        &self.action_variables
    }

    pub fn action_index_variables(&self) -> &BTreeMap<u32, ActionInfo> {
        &self.action_index_variables
    }

    pub fn submit_button_index(&self) -> u32 {
        self.submit_button_index
    }

    /// Rewrite a path condition for the current action position.
    pub fn rename_path_condition(&mut self, condition: &PathCondition) -> PathCondition {
        let index = self.index;
        let renamed = PathCondition {
            conjuncts: condition
                .conjuncts
                .iter()
                .map(|(expr, taken)| {
                    (
                        crate::expr::visit::rename_variables(expr, &|name| {
                            Self::encode_with_explicit_index(name, index)
                        }),
                        *taken,
                    )
                })
                .collect(),
        };
        for (expr, _) in &condition.conjuncts {
            for name in crate::expr::visit::free_variables(expr) {
                let encoded = Self::encode_with_explicit_index(&name, index);
                self.encoded.insert(encoded, name);
            }
        }
        renamed
    }

    /// Split a solver assignment keyed by renamed variables into one
    /// injection map per action position.
    pub fn decode_assignment(assignment: &InjectionMap) -> BTreeMap<u32, InjectionMap> {
        let mut per_position: BTreeMap<u32, InjectionMap> = BTreeMap::new();
        for (name, value) in assignment {
            let Some((base, position)) = Self::decode(name) else {
                continue;
            };
            per_position
                .entry(position)
                .or_default()
                .insert(base.to_string(), value.clone());
        }
        per_position
    }
}

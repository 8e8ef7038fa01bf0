//! Form field descriptors, injection values and solver-facing restrictions.
//!
//! Field discovery and DOM writes belong to the browser collaborator; the
//! core only consumes the descriptors it reports and hands back an injection
//! map per iteration.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

// =============================================================================
// INJECTION VALUES
// =============================================================================

/// A value written into a form field: text fields take strings, checkboxes
/// and radio buttons take booleans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum InjectionValue {
    Str(String),
    Bool(bool),
}

impl std::fmt::Display for InjectionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InjectionValue::Str(s) => write!(f, "{s:?}"),
            InjectionValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Per-iteration mapping from variable name to injected value.
pub type InjectionMap = BTreeMap<String, InjectionValue>;

// =============================================================================
// FIELD DESCRIPTORS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FormFieldType {
    Text,
    Boolean,
    /// Select elements: the input is fixed to one of an enumerated set.
    FixedInput,
    NoInput,
}

/// A form field as reported by the discovery collaborator. The `variable`
/// name is the DOM id or name (or a synthetic one) and is stable across
/// iterations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormFieldDescriptor {
    pub variable: String,
    pub field_type: FormFieldType,
    /// Legal values for `FixedInput` fields, in DOM order.
    #[serde(default)]
    pub options: Vec<String>,
    /// Radio group name, when the field is a radio button.
    #[serde(default)]
    pub radio_group: Option<String>,
    /// Whether the field is initially checked (radio/checkbox).
    #[serde(default)]
    pub checked: bool,
    /// The field's value in the freshly loaded DOM.
    #[serde(default)]
    pub default_value: Option<String>,
}

impl FormFieldDescriptor {
    /// The value the field holds before any injection, used for the first
    /// iteration and for fields the solver left unconstrained.
    pub fn current_value(&self) -> Option<InjectionValue> {
        match self.field_type {
            FormFieldType::Text | FormFieldType::FixedInput => Some(InjectionValue::Str(
                self.default_value.clone().unwrap_or_default(),
            )),
            FormFieldType::Boolean => Some(InjectionValue::Bool(self.checked)),
            FormFieldType::NoInput => None,
        }
    }
}

// =============================================================================
// RESTRICTIONS
// =============================================================================

/// Closed set of admissible string values for a select-like field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectRestriction {
    pub variable: String,
    pub values: Vec<String>,
}

/// A radio group: of the member variables at most one may hold, and at least
/// one must when `always_set` (a member was initially checked, so the group
/// can never become empty again).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RadioRestriction {
    pub group_name: String,
    pub variables: BTreeSet<String>,
    pub always_set: bool,
}

/// All admissibility rules for the current page, passed to the solver with
/// every query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormRestrictions {
    pub selects: Vec<SelectRestriction>,
    pub radios: Vec<RadioRestriction>,
}

impl FormRestrictions {
    /// Derive the restrictions from the discovered form fields: one
    /// `SelectRestriction` per fixed-input field, one `RadioRestriction` per
    /// radio group.
    pub fn from_fields(fields: &[FormFieldDescriptor]) -> Self {
        let mut selects = Vec::new();
        let mut radios: BTreeMap<String, RadioRestriction> = BTreeMap::new();

        for field in fields {
            if field.field_type == FormFieldType::FixedInput {
                selects.push(SelectRestriction {
                    variable: field.variable.clone(),
                    values: field.options.clone(),
                });
            } else if let Some(group) = &field.radio_group {
                let entry = radios.entry(group.clone()).or_insert_with(|| RadioRestriction {
                    group_name: group.clone(),
                    variables: BTreeSet::new(),
                    always_set: false,
                });
                entry.variables.insert(field.variable.clone());
                entry.always_set = entry.always_set || field.checked;
            }
        }

        FormRestrictions {
            selects,
            radios: radios.into_values().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.selects.is_empty() && self.radios.is_empty()
    }
}

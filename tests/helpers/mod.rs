//! Shared test doubles: a scripted browser and a scripted solver, plus
//! builders for the event streams the scripted pages emit.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use concolic::driver::browser::{Browser, BrowserError, TimerInfo};
use concolic::error::EngineError;
use concolic::events::BrowserEvent;
use concolic::expr::{Expr, ExprRef, StrCmpOp};
use concolic::forms::{
    FormFieldDescriptor, FormFieldType, InjectionMap, InjectionValue,
};
use concolic::solver::{Solution, Solver, SolverQuery};

// =============================================================================
// Field builders
// =============================================================================

pub fn text_field(variable: &str, default: &str) -> FormFieldDescriptor {
    FormFieldDescriptor {
        variable: variable.into(),
        field_type: FormFieldType::Text,
        options: vec![],
        radio_group: None,
        checked: false,
        default_value: Some(default.into()),
    }
}

pub fn select_field(variable: &str, options: &[&str], default: &str) -> FormFieldDescriptor {
    FormFieldDescriptor {
        variable: variable.into(),
        field_type: FormFieldType::FixedInput,
        options: options.iter().map(|o| o.to_string()).collect(),
        radio_group: None,
        checked: false,
        default_value: Some(default.into()),
    }
}

// =============================================================================
// Event builders
// =============================================================================

pub fn str_eq(variable: &str, value: &str) -> ExprRef {
    Expr::str_cmp(StrCmpOp::Eq, Expr::var(variable), Expr::string(value))
}

pub fn sym_branch(condition: ExprRef, taken: bool) -> BrowserEvent {
    BrowserEvent::SymbolicBranch { condition, taken }
}

pub fn page_load(url: &str) -> BrowserEvent {
    BrowserEvent::PageLoad { url: url.into() }
}

pub fn alert(message: &str) -> BrowserEvent {
    BrowserEvent::Alert {
        message: message.into(),
    }
}

/// The injected string value for `variable`, or "" when absent.
pub fn injected_str(injections: &InjectionMap, variable: &str) -> String {
    match injections.get(variable) {
        Some(InjectionValue::Str(s)) => s.clone(),
        _ => String::new(),
    }
}

// =============================================================================
// Scripted browser
// =============================================================================

type PageScript = Box<dyn FnMut(&InjectionMap) -> Result<Vec<BrowserEvent>, BrowserError>>;

/// A browser double whose page behavior is a closure from the injected
/// values to the recorded event stream. The injection log is shared so tests
/// keep access after the driver takes ownership.
pub struct ScriptedBrowser {
    page: PageScript,
    fields: Vec<FormFieldDescriptor>,
    pub injections_seen: Rc<RefCell<Vec<InjectionMap>>>,
}

impl ScriptedBrowser {
    pub fn new(
        fields: Vec<FormFieldDescriptor>,
        page: impl FnMut(&InjectionMap) -> Result<Vec<BrowserEvent>, BrowserError> + 'static,
    ) -> Self {
        ScriptedBrowser {
            page: Box::new(page),
            fields,
            injections_seen: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn injection_log(&self) -> Rc<RefCell<Vec<InjectionMap>>> {
        Rc::clone(&self.injections_seen)
    }
}

impl Browser for ScriptedBrowser {
    fn load_page(
        &mut self,
        _url: &str,
        _cookies: &BTreeMap<String, String>,
    ) -> Result<Vec<BrowserEvent>, BrowserError> {
        Ok(vec![])
    }

    fn run_event(&mut self, injections: &InjectionMap) -> Result<Vec<BrowserEvent>, BrowserError> {
        self.injections_seen.borrow_mut().push(injections.clone());
        (self.page)(injections)
    }

    fn registered_timers(&mut self) -> Vec<TimerInfo> {
        vec![]
    }

    fn fire_timer(&mut self, _id: u32) -> Result<Vec<BrowserEvent>, BrowserError> {
        Ok(vec![])
    }

    fn cancel_timer(&mut self, _id: u32) {}

    fn form_fields(&mut self) -> Vec<FormFieldDescriptor> {
        self.fields.clone()
    }

    fn reset_cookies(&mut self) {}
}

// =============================================================================
// Scripted solver
// =============================================================================

/// A solver double that replays a queue of solutions (UNSAT once the queue
/// is empty) and logs the canonical text of every query it receives.
pub struct ScriptedSolver {
    solutions: VecDeque<Solution>,
    pub queries: Rc<RefCell<Vec<String>>>,
}

impl ScriptedSolver {
    pub fn new(solutions: Vec<Solution>) -> Self {
        ScriptedSolver {
            solutions: solutions.into(),
            queries: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn query_log(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.queries)
    }
}

impl Solver for ScriptedSolver {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn solve(&mut self, query: &SolverQuery) -> Result<Solution, EngineError> {
        let text = query
            .canonical_key()
            .unwrap_or_else(|e| format!("<unsupported: {e}>"));
        self.queries.borrow_mut().push(text);
        Ok(self.solutions.pop_front().unwrap_or(Solution::Unsat))
    }
}

pub fn sat(pairs: &[(&str, &str)]) -> Solution {
    Solution::Sat {
        assignment: pairs
            .iter()
            .map(|(k, v)| (k.to_string(), InjectionValue::Str(v.to_string())))
            .collect(),
    }
}

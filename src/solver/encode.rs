//! Lowering of path conditions and form restrictions to the canonical
//! SMT-LIB text form.
//!
//! Operators outside the supported fragment (regex rewriting, submatch
//! extraction, boolean/string coercions) are rejected with `Unsupported` so
//! the caller can answer UNKNOWN; the encoder never miscompiles silently.

use std::collections::BTreeMap;

use crate::expr::visit::{Accept, ExprVisitor};
use crate::expr::{BoolBinOp, Expr, IntBinOp, IntCmpOp, Literal, StrCmpOp, ValueKind};
use crate::solver::SolverQuery;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("unsupported construct for solver encoding: {0}")]
    Unsupported(String),
    #[error("variable '{variable}' used at both {first:?} and {second:?}")]
    SortConflict {
        variable: String,
        first: ValueKind,
        second: ValueKind,
    },
}

/// Encode a full query: sorted declarations, restriction constraints, then
/// one assertion per path-condition conjunct in path order.
pub fn encode_query(query: &SolverQuery) -> Result<String, EncodeError> {
    let sorts = infer_sorts(query)?;

    let mut out = String::new();
    for (name, kind) in &sorts {
        out.push_str(&format!(
            "(declare-const |{name}| {})\n",
            sort_name(*kind)
        ));
    }

    for select in &query.restrictions.selects {
        let alternatives: Vec<String> = select
            .values
            .iter()
            .map(|v| format!("(= |{}| {})", select.variable, smt_string(v)))
            .collect();
        out.push_str(&format!("(assert (or {}))\n", alternatives.join(" ")));
    }

    for radio in &query.restrictions.radios {
        let members: Vec<&String> = radio.variables.iter().collect();
        // At most one member holds.
        for (i, a) in members.iter().enumerate() {
            for b in &members[i + 1..] {
                out.push_str(&format!("(assert (not (and |{a}| |{b}|)))\n"));
            }
        }
        if radio.always_set && !members.is_empty() {
            let disjuncts: Vec<String> = members.iter().map(|m| format!("|{m}|")).collect();
            out.push_str(&format!("(assert (or {}))\n", disjuncts.join(" ")));
        }
    }

    for (condition, taken) in query
        .path_condition
        .conjuncts
        .iter()
        .chain(query.reachable_constraints.iter())
    {
        let term = lower(condition)?;
        if *taken {
            out.push_str(&format!("(assert {term})\n"));
        } else {
            out.push_str(&format!("(assert (not {term}))\n"));
        }
    }

    out.push_str("(check-sat)\n");
    Ok(out)
}

/// Lower one expression to an SMT term.
pub fn lower(expr: &Expr) -> Result<String, EncodeError> {
    let mut lowering = SmtLower {
        stack: Vec::new(),
        error: None,
    };
    expr.accept(&mut lowering);
    if let Some(error) = lowering.error {
        return Err(error);
    }
    Ok(lowering
        .stack
        .pop()
        .expect("lowering a node leaves one term"))
}

/// Accumulating visitor: every hook pushes the term for its node, consuming
/// the terms its children pushed.
struct SmtLower {
    stack: Vec<String>,
    error: Option<EncodeError>,
}

impl SmtLower {
    fn pop2(&mut self) -> (String, String) {
        let rhs = self.stack.pop().unwrap_or_default();
        let lhs = self.stack.pop().unwrap_or_default();
        (lhs, rhs)
    }

    fn fail(&mut self, construct: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(EncodeError::Unsupported(construct.into()));
        }
        self.stack.push(String::new());
    }
}

impl ExprVisitor for SmtLower {
    fn visit_const(&mut self, value: &Literal) {
        let term = match value {
            Literal::Int { value } if *value < 0 => format!("(- {})", -value),
            Literal::Int { value } => value.to_string(),
            Literal::Bool { value } => value.to_string(),
            Literal::Str { value } => smt_string(value),
        };
        self.stack.push(term);
    }

    fn visit_var(&mut self, name: &str) {
        self.stack.push(format!("|{name}|"));
    }

    fn visit_int_bin(&mut self, op: IntBinOp, lhs: &crate::expr::ExprRef, rhs: &crate::expr::ExprRef) {
        lhs.accept(self);
        rhs.accept(self);
        let (lhs, rhs) = self.pop2();
        let op = match op {
            IntBinOp::Add => "+",
            IntBinOp::Sub => "-",
            IntBinOp::Mul => "*",
            IntBinOp::Mod => "mod",
        };
        self.stack.push(format!("({op} {lhs} {rhs})"));
    }

    fn visit_int_cmp(&mut self, op: IntCmpOp, lhs: &crate::expr::ExprRef, rhs: &crate::expr::ExprRef) {
        lhs.accept(self);
        rhs.accept(self);
        let (lhs, rhs) = self.pop2();
        let term = match op {
            IntCmpOp::Eq => format!("(= {lhs} {rhs})"),
            IntCmpOp::Neq => format!("(distinct {lhs} {rhs})"),
            IntCmpOp::Lt => format!("(< {lhs} {rhs})"),
            IntCmpOp::Le => format!("(<= {lhs} {rhs})"),
            IntCmpOp::Gt => format!("(> {lhs} {rhs})"),
            IntCmpOp::Ge => format!("(>= {lhs} {rhs})"),
        };
        self.stack.push(term);
    }

    fn visit_bool_bin(&mut self, op: BoolBinOp, lhs: &crate::expr::ExprRef, rhs: &crate::expr::ExprRef) {
        lhs.accept(self);
        rhs.accept(self);
        let (lhs, rhs) = self.pop2();
        let term = match op {
            BoolBinOp::And => format!("(and {lhs} {rhs})"),
            BoolBinOp::Or => format!("(or {lhs} {rhs})"),
            BoolBinOp::Eq | BoolBinOp::Seq => format!("(= {lhs} {rhs})"),
            BoolBinOp::Neq | BoolBinOp::Sneq => format!("(distinct {lhs} {rhs})"),
        };
        self.stack.push(term);
    }

    fn visit_bool_not(&mut self, inner: &crate::expr::ExprRef) {
        inner.accept(self);
        let inner = self.stack.pop().unwrap_or_default();
        self.stack.push(format!("(not {inner})"));
    }

    fn visit_str_concat(&mut self, lhs: &crate::expr::ExprRef, rhs: &crate::expr::ExprRef) {
        lhs.accept(self);
        rhs.accept(self);
        let (lhs, rhs) = self.pop2();
        self.stack.push(format!("(str.++ {lhs} {rhs})"));
    }

    fn visit_str_cmp(&mut self, op: StrCmpOp, lhs: &crate::expr::ExprRef, rhs: &crate::expr::ExprRef) {
        lhs.accept(self);
        rhs.accept(self);
        let (lhs, rhs) = self.pop2();
        let term = match op {
            StrCmpOp::Eq => format!("(= {lhs} {rhs})"),
            StrCmpOp::Neq => format!("(distinct {lhs} {rhs})"),
            // `a in b`: a occurs in b.
            StrCmpOp::In => format!("(str.contains {rhs} {lhs})"),
            StrCmpOp::NotIn => format!("(not (str.contains {rhs} {lhs}))"),
        };
        self.stack.push(term);
    }

    fn visit_str_char_at(&mut self, string: &crate::expr::ExprRef, index: &crate::expr::ExprRef) {
        string.accept(self);
        index.accept(self);
        let (string, index) = self.pop2();
        self.stack.push(format!("(str.at {string} {index})"));
    }

    fn visit_str_replace(
        &mut self,
        string: &crate::expr::ExprRef,
        pattern: &crate::expr::ExprRef,
        replacement: &crate::expr::ExprRef,
    ) {
        string.accept(self);
        pattern.accept(self);
        replacement.accept(self);
        let replacement = self.stack.pop().unwrap_or_default();
        let (string, pattern) = self.pop2();
        self.stack
            .push(format!("(str.replace {string} {pattern} {replacement})"));
    }

    fn visit_str_regex_replace(
        &mut self,
        _string: &crate::expr::ExprRef,
        regex: &str,
        _replacement: &crate::expr::ExprRef,
    ) {
        self.fail(format!("regex replace /{regex}/"));
    }

    fn visit_str_regex_submatch_array(&mut self, _string: &crate::expr::ExprRef, regex: &str) {
        self.fail(format!("regex submatch extraction /{regex}/"));
    }

    fn visit_str_length(&mut self, string: &crate::expr::ExprRef) {
        string.accept(self);
        let string = self.stack.pop().unwrap_or_default();
        self.stack.push(format!("(str.len {string})"));
    }

    fn visit_coercion(&mut self, from: ValueKind, to: ValueKind, inner: &crate::expr::ExprRef) {
        match (from, to) {
            (ValueKind::Str, ValueKind::Int) => {
                inner.accept(self);
                let inner = self.stack.pop().unwrap_or_default();
                self.stack.push(format!("(str.to_int {inner})"));
            }
            (ValueKind::Int, ValueKind::Str) => {
                inner.accept(self);
                let inner = self.stack.pop().unwrap_or_default();
                self.stack.push(format!("(str.from_int {inner})"));
            }
            (from, to) => self.fail(format!("coercion {}->{}", from.name(), to.name())),
        }
    }
}

// =============================================================================
// SORT INFERENCE
// =============================================================================

/// Assign a sort to every free variable. Form restrictions pin select
/// variables to String and radio members to Bool; everything else follows
/// the position the variable occupies in the condition.
fn infer_sorts(query: &SolverQuery) -> Result<BTreeMap<String, ValueKind>, EncodeError> {
    let mut sorts = BTreeMap::new();

    for select in &query.restrictions.selects {
        sorts.insert(select.variable.clone(), ValueKind::Str);
    }
    for radio in &query.restrictions.radios {
        for member in &radio.variables {
            assign(member, ValueKind::Bool, &mut sorts)?;
        }
    }

    for (condition, _) in query
        .path_condition
        .conjuncts
        .iter()
        .chain(query.reachable_constraints.iter())
    {
        infer_expr(condition, ValueKind::Bool, &mut sorts)?;
    }

    Ok(sorts)
}

fn infer_expr(
    expr: &Expr,
    expected: ValueKind,
    sorts: &mut BTreeMap<String, ValueKind>,
) -> Result<(), EncodeError> {
    match expr {
        Expr::Const { .. } => Ok(()),
        Expr::Var { name } => assign(name, expected, sorts),
        Expr::IntBin { lhs, rhs, .. } | Expr::IntCmp { lhs, rhs, .. } => {
            infer_expr(lhs, ValueKind::Int, sorts)?;
            infer_expr(rhs, ValueKind::Int, sorts)
        }
        Expr::BoolBin { lhs, rhs, .. } => {
            infer_expr(lhs, ValueKind::Bool, sorts)?;
            infer_expr(rhs, ValueKind::Bool, sorts)
        }
        Expr::BoolNot { inner } => infer_expr(inner, ValueKind::Bool, sorts),
        Expr::StrConcat { lhs, rhs } | Expr::StrCmp { lhs, rhs, .. } => {
            infer_expr(lhs, ValueKind::Str, sorts)?;
            infer_expr(rhs, ValueKind::Str, sorts)
        }
        Expr::StrCharAt { string, index } => {
            infer_expr(string, ValueKind::Str, sorts)?;
            infer_expr(index, ValueKind::Int, sorts)
        }
        Expr::StrReplace {
            string,
            pattern,
            replacement,
        } => {
            infer_expr(string, ValueKind::Str, sorts)?;
            infer_expr(pattern, ValueKind::Str, sorts)?;
            infer_expr(replacement, ValueKind::Str, sorts)
        }
        Expr::StrRegexReplace {
            string,
            replacement,
            ..
        } => {
            infer_expr(string, ValueKind::Str, sorts)?;
            infer_expr(replacement, ValueKind::Str, sorts)
        }
        Expr::StrRegexSubmatchArray { string, .. } => infer_expr(string, ValueKind::Str, sorts),
        Expr::StrLength { string } => infer_expr(string, ValueKind::Str, sorts),
        Expr::Coercion { from, inner, .. } => infer_expr(inner, *from, sorts),
    }
}

fn assign(
    name: &str,
    kind: ValueKind,
    sorts: &mut BTreeMap<String, ValueKind>,
) -> Result<(), EncodeError> {
    match sorts.get(name) {
        None => {
            sorts.insert(name.to_string(), kind);
            Ok(())
        }
        Some(existing) if *existing == kind => Ok(()),
        Some(existing) => Err(EncodeError::SortConflict {
            variable: name.to_string(),
            first: *existing,
            second: kind,
        }),
    }
}

fn sort_name(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Int => "Int",
        ValueKind::Bool => "Bool",
        ValueKind::Str => "String",
    }
}

fn smt_string(value: &str) -> String {
    // SMT-LIB string literals escape '"' by doubling it.
    format!("\"{}\"", value.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Expr, StrCmpOp};
    use crate::forms::{FormRestrictions, RadioRestriction, SelectRestriction};
    use crate::tree::path::PathCondition;

    fn query_for(conjuncts: Vec<(crate::expr::ExprRef, bool)>) -> SolverQuery {
        SolverQuery::new(PathCondition { conjuncts }, FormRestrictions::default())
    }

    #[test]
    fn negated_conjuncts_are_wrapped_in_not() {
        let condition = Expr::str_cmp(StrCmpOp::Eq, Expr::var("x"), Expr::string("42"));
        let query = query_for(vec![(condition, false)]);
        let text = encode_query(&query).unwrap();
        assert!(text.contains("(declare-const |x| String)"));
        assert!(text.contains("(assert (not (= |x| \"42\")))"));
    }

    #[test]
    fn select_restriction_becomes_a_disjunction() {
        let mut query = query_for(vec![(
            Expr::str_cmp(StrCmpOp::Eq, Expr::var("s"), Expr::string("B")),
            true,
        )]);
        query.restrictions = FormRestrictions {
            selects: vec![SelectRestriction {
                variable: "s".into(),
                values: vec!["A".into(), "B".into(), "C".into()],
            }],
            radios: vec![],
        };
        let text = encode_query(&query).unwrap();
        assert!(text.contains("(assert (or (= |s| \"A\") (= |s| \"B\") (= |s| \"C\")))"));
    }

    #[test]
    fn radio_restriction_is_at_most_one_plus_always_set() {
        let mut query = query_for(vec![]);
        query.restrictions = FormRestrictions {
            selects: vec![],
            radios: vec![RadioRestriction {
                group_name: "g".into(),
                variables: ["r1".to_string(), "r2".to_string()].into_iter().collect(),
                always_set: true,
            }],
        };
        let text = encode_query(&query).unwrap();
        assert!(text.contains("(declare-const |r1| Bool)"));
        assert!(text.contains("(assert (not (and |r1| |r2|)))"));
        assert!(text.contains("(assert (or |r1| |r2|))"));
    }

    #[test]
    fn regex_operators_are_unsupported() {
        let condition = Expr::str_cmp(
            StrCmpOp::Eq,
            Expr::str_regex_replace(Expr::var("x"), "[0-9]", Expr::string("")),
            Expr::string(""),
        );
        let query = query_for(vec![(condition, true)]);
        assert!(matches!(
            encode_query(&query),
            Err(EncodeError::Unsupported(_))
        ));
    }

    #[test]
    fn sort_conflicts_are_rejected() {
        let as_string = Expr::str_cmp(StrCmpOp::Eq, Expr::var("x"), Expr::string("a"));
        let as_bool = Expr::bool_bin(
            crate::expr::BoolBinOp::And,
            Expr::var("x"),
            Expr::boolean(true),
        );
        let query = query_for(vec![(as_string, true), (as_bool, true)]);
        assert!(matches!(
            encode_query(&query),
            Err(EncodeError::SortConflict { .. })
        ));
    }

    #[test]
    fn coercion_lowers_to_str_to_int() {
        let condition = Expr::int_cmp(
            crate::expr::IntCmpOp::Gt,
            Expr::coercion(ValueKind::Str, ValueKind::Int, Expr::var("age")),
            Expr::int(17),
        );
        let query = query_for(vec![(condition, true)]);
        let text = encode_query(&query).unwrap();
        assert!(text.contains("(declare-const |age| String)"));
        assert!(text.contains("(assert (> (str.to_int |age|) 17))"));
    }
}

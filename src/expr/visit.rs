//! Double-dispatch visitor over expression trees.
//!
//! The visitor exposes one hook per variant; default hooks recurse into
//! children, so an implementation only overrides the variants it cares about.

use std::collections::BTreeSet;
use std::rc::Rc;

use super::types::*;

pub trait ExprVisitor {
    fn visit_const(&mut self, _value: &Literal) {}

    fn visit_var(&mut self, _name: &str) {}

    fn visit_int_bin(&mut self, _op: IntBinOp, lhs: &ExprRef, rhs: &ExprRef)
    where
        Self: Sized,
    {
        lhs.accept(self);
        rhs.accept(self);
    }

    fn visit_int_cmp(&mut self, _op: IntCmpOp, lhs: &ExprRef, rhs: &ExprRef)
    where
        Self: Sized,
    {
        lhs.accept(self);
        rhs.accept(self);
    }

    fn visit_bool_bin(&mut self, _op: BoolBinOp, lhs: &ExprRef, rhs: &ExprRef)
    where
        Self: Sized,
    {
        lhs.accept(self);
        rhs.accept(self);
    }

    fn visit_bool_not(&mut self, inner: &ExprRef)
    where
        Self: Sized,
    {
        inner.accept(self);
    }

    fn visit_str_concat(&mut self, lhs: &ExprRef, rhs: &ExprRef)
    where
        Self: Sized,
    {
        lhs.accept(self);
        rhs.accept(self);
    }

    fn visit_str_cmp(&mut self, _op: StrCmpOp, lhs: &ExprRef, rhs: &ExprRef)
    where
        Self: Sized,
    {
        lhs.accept(self);
        rhs.accept(self);
    }

    fn visit_str_char_at(&mut self, string: &ExprRef, index: &ExprRef)
    where
        Self: Sized,
    {
        string.accept(self);
        index.accept(self);
    }

    fn visit_str_replace(&mut self, string: &ExprRef, pattern: &ExprRef, replacement: &ExprRef)
    where
        Self: Sized,
    {
        string.accept(self);
        pattern.accept(self);
        replacement.accept(self);
    }

    fn visit_str_regex_replace(&mut self, string: &ExprRef, _regex: &str, replacement: &ExprRef)
    where
        Self: Sized,
    {
        string.accept(self);
        replacement.accept(self);
    }

    fn visit_str_regex_submatch_array(&mut self, string: &ExprRef, _regex: &str)
    where
        Self: Sized,
    {
        string.accept(self);
    }

    fn visit_str_length(&mut self, string: &ExprRef)
    where
        Self: Sized,
    {
        string.accept(self);
    }

    fn visit_coercion(&mut self, _from: ValueKind, _to: ValueKind, inner: &ExprRef)
    where
        Self: Sized,
    {
        inner.accept(self);
    }
}

/// Dispatch half of the double dispatch: route one node to its visitor hook.
pub trait Accept {
    fn accept<V: ExprVisitor>(&self, visitor: &mut V);
}

impl Accept for Expr {
    fn accept<V: ExprVisitor>(&self, visitor: &mut V) {
        match self {
            Expr::Const { value } => visitor.visit_const(value),
            Expr::Var { name } => visitor.visit_var(name),
            Expr::IntBin { op, lhs, rhs } => visitor.visit_int_bin(*op, lhs, rhs),
            Expr::IntCmp { op, lhs, rhs } => visitor.visit_int_cmp(*op, lhs, rhs),
            Expr::BoolBin { op, lhs, rhs } => visitor.visit_bool_bin(*op, lhs, rhs),
            Expr::BoolNot { inner } => visitor.visit_bool_not(inner),
            Expr::StrConcat { lhs, rhs } => visitor.visit_str_concat(lhs, rhs),
            Expr::StrCmp { op, lhs, rhs } => visitor.visit_str_cmp(*op, lhs, rhs),
            Expr::StrCharAt { string, index } => visitor.visit_str_char_at(string, index),
            Expr::StrReplace {
                string,
                pattern,
                replacement,
            } => visitor.visit_str_replace(string, pattern, replacement),
            Expr::StrRegexReplace {
                string,
                regex,
                replacement,
            } => visitor.visit_str_regex_replace(string, regex, replacement),
            Expr::StrRegexSubmatchArray { string, regex } => {
                visitor.visit_str_regex_submatch_array(string, regex);
            }
            Expr::StrLength { string } => visitor.visit_str_length(string),
            Expr::Coercion { from, to, inner } => visitor.visit_coercion(*from, *to, inner),
        }
    }
}

// =============================================================================
// FREE VARIABLE COLLECTION
// =============================================================================

#[derive(Default)]
pub struct FreeVariables {
    pub names: BTreeSet<String>,
}

impl ExprVisitor for FreeVariables {
    fn visit_var(&mut self, name: &str) {
        self.names.insert(name.to_string());
    }
}

/// All variable names occurring in `expr`, in sorted order.
pub fn free_variables(expr: &Expr) -> BTreeSet<String> {
    let mut collector = FreeVariables::default();
    expr.accept(&mut collector);
    collector.names
}

// =============================================================================
// VARIABLE RENAMING
// =============================================================================

/// Rebuild `expr` with every variable renamed through `rename`. Subtrees
/// without variables are shared with the input, not copied.
pub fn rename_variables<F>(expr: &ExprRef, rename: &F) -> ExprRef
where
    F: Fn(&str) -> String,
{
    match expr.as_ref() {
        Expr::Const { .. } => Rc::clone(expr),
        Expr::Var { name } => Expr::var(rename(name)),
        Expr::IntBin { op, lhs, rhs } => {
            Expr::int_bin(*op, rename_variables(lhs, rename), rename_variables(rhs, rename))
        }
        Expr::IntCmp { op, lhs, rhs } => {
            Expr::int_cmp(*op, rename_variables(lhs, rename), rename_variables(rhs, rename))
        }
        Expr::BoolBin { op, lhs, rhs } => {
            Expr::bool_bin(*op, rename_variables(lhs, rename), rename_variables(rhs, rename))
        }
        Expr::BoolNot { inner } => Expr::not(rename_variables(inner, rename)),
        Expr::StrConcat { lhs, rhs } => {
            Expr::str_concat(rename_variables(lhs, rename), rename_variables(rhs, rename))
        }
        Expr::StrCmp { op, lhs, rhs } => {
            Expr::str_cmp(*op, rename_variables(lhs, rename), rename_variables(rhs, rename))
        }
        Expr::StrCharAt { string, index } => Expr::str_char_at(
            rename_variables(string, rename),
            rename_variables(index, rename),
        ),
        Expr::StrReplace {
            string,
            pattern,
            replacement,
        } => Expr::str_replace(
            rename_variables(string, rename),
            rename_variables(pattern, rename),
            rename_variables(replacement, rename),
        ),
        Expr::StrRegexReplace {
            string,
            regex,
            replacement,
        } => Expr::str_regex_replace(
            rename_variables(string, rename),
            regex.clone(),
            rename_variables(replacement, rename),
        ),
        Expr::StrRegexSubmatchArray { string, regex } => {
            Expr::str_regex_submatch_array(rename_variables(string, rename), regex.clone())
        }
        Expr::StrLength { string } => Expr::str_length(rename_variables(string, rename)),
        Expr::Coercion { from, to, inner } => {
            Expr::coercion(*from, *to, rename_variables(inner, rename))
        }
    }
}

//! Expression type definitions.
//!
//! Expressions are immutable and shared by reference (`ExprRef`). Equality is
//! structural. Constructors do not constant-fold: the tree records exactly
//! what the instrumentation observed.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Shared handle to an immutable expression node.
pub type ExprRef = Rc<Expr>;

// =============================================================================
// OPERATORS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntBinOp {
    Add,
    Sub,
    Mul,
    Mod,
}

impl IntBinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            IntBinOp::Add => "+",
            IntBinOp::Sub => "-",
            IntBinOp::Mul => "*",
            IntBinOp::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntCmpOp {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl IntCmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            IntCmpOp::Eq => "==",
            IntCmpOp::Neq => "!=",
            IntCmpOp::Lt => "<",
            IntCmpOp::Le => "<=",
            IntCmpOp::Gt => ">",
            IntCmpOp::Ge => ">=",
        }
    }
}

/// `Seq`/`Sneq` are the strict (`===`/`!==`) comparisons; the instrumentation
/// emits them without an interposed coercion node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoolBinOp {
    And,
    Or,
    Eq,
    Neq,
    Seq,
    Sneq,
}

impl BoolBinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BoolBinOp::And => "&&",
            BoolBinOp::Or => "||",
            BoolBinOp::Eq => "==",
            BoolBinOp::Neq => "!=",
            BoolBinOp::Seq => "===",
            BoolBinOp::Sneq => "!==",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrCmpOp {
    Eq,
    Neq,
    In,
    NotIn,
}

impl StrCmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            StrCmpOp::Eq => "==",
            StrCmpOp::Neq => "!=",
            StrCmpOp::In => "in",
            StrCmpOp::NotIn => "not-in",
        }
    }
}

/// The three value kinds a `Coercion` node can convert between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Int,
    Bool,
    Str,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Int => "int",
            ValueKind::Bool => "bool",
            ValueKind::Str => "str",
        }
    }
}

// =============================================================================
// LITERALS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "literal_type")]
pub enum Literal {
    Int { value: i64 },
    Bool { value: bool },
    Str { value: String },
}

// =============================================================================
// EXPRESSION — tagged union over all node kinds
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Expr {
    /// A literal constant.
    Const { value: Literal },
    /// A symbolic input variable, globally unique by name.
    Var { name: String },
    IntBin {
        op: IntBinOp,
        lhs: ExprRef,
        rhs: ExprRef,
    },
    IntCmp {
        op: IntCmpOp,
        lhs: ExprRef,
        rhs: ExprRef,
    },
    BoolBin {
        op: BoolBinOp,
        lhs: ExprRef,
        rhs: ExprRef,
    },
    BoolNot { inner: ExprRef },
    StrConcat { lhs: ExprRef, rhs: ExprRef },
    StrCmp {
        op: StrCmpOp,
        lhs: ExprRef,
        rhs: ExprRef,
    },
    StrCharAt { string: ExprRef, index: ExprRef },
    StrReplace {
        string: ExprRef,
        pattern: ExprRef,
        replacement: ExprRef,
    },
    /// Regex source is carried verbatim; the solver interface decides whether
    /// a back-end can handle it.
    StrRegexReplace {
        string: ExprRef,
        regex: String,
        replacement: ExprRef,
    },
    StrRegexSubmatchArray { string: ExprRef, regex: String },
    StrLength { string: ExprRef },
    /// Explicit typed coercion inserted by the instrumentation.
    Coercion {
        from: ValueKind,
        to: ValueKind,
        inner: ExprRef,
    },
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

impl Expr {
    pub fn int(value: i64) -> ExprRef {
        Rc::new(Expr::Const {
            value: Literal::Int { value },
        })
    }

    pub fn boolean(value: bool) -> ExprRef {
        Rc::new(Expr::Const {
            value: Literal::Bool { value },
        })
    }

    pub fn string(value: impl Into<String>) -> ExprRef {
        Rc::new(Expr::Const {
            value: Literal::Str {
                value: value.into(),
            },
        })
    }

    pub fn var(name: impl Into<String>) -> ExprRef {
        Rc::new(Expr::Var { name: name.into() })
    }

    pub fn int_bin(op: IntBinOp, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Rc::new(Expr::IntBin { op, lhs, rhs })
    }

    pub fn int_cmp(op: IntCmpOp, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Rc::new(Expr::IntCmp { op, lhs, rhs })
    }

    pub fn bool_bin(op: BoolBinOp, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Rc::new(Expr::BoolBin { op, lhs, rhs })
    }

    pub fn not(inner: ExprRef) -> ExprRef {
        Rc::new(Expr::BoolNot { inner })
    }

    pub fn str_concat(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Rc::new(Expr::StrConcat { lhs, rhs })
    }

    pub fn str_cmp(op: StrCmpOp, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Rc::new(Expr::StrCmp { op, lhs, rhs })
    }

    pub fn str_char_at(string: ExprRef, index: ExprRef) -> ExprRef {
        Rc::new(Expr::StrCharAt { string, index })
    }

    pub fn str_replace(string: ExprRef, pattern: ExprRef, replacement: ExprRef) -> ExprRef {
        Rc::new(Expr::StrReplace {
            string,
            pattern,
            replacement,
        })
    }

    pub fn str_regex_replace(
        string: ExprRef,
        regex: impl Into<String>,
        replacement: ExprRef,
    ) -> ExprRef {
        Rc::new(Expr::StrRegexReplace {
            string,
            regex: regex.into(),
            replacement,
        })
    }

    pub fn str_regex_submatch_array(string: ExprRef, regex: impl Into<String>) -> ExprRef {
        Rc::new(Expr::StrRegexSubmatchArray {
            string,
            regex: regex.into(),
        })
    }

    pub fn str_length(string: ExprRef) -> ExprRef {
        Rc::new(Expr::StrLength { string })
    }

    pub fn coercion(from: ValueKind, to: ValueKind, inner: ExprRef) -> ExprRef {
        Rc::new(Expr::Coercion { from, to, inner })
    }
}

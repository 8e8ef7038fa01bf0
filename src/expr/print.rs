//! Expression pretty-printing and parsing.
//!
//! The printed form is a prefix s-expression with domain-qualified operator
//! heads (`int.==`, `str.++`, ...), so every operator parses back to exactly
//! one variant. `parse(&pretty(e)) == e` holds for all expressions.

use super::types::*;

#[derive(Debug, thiserror::Error)]
#[error("expression parse error at offset {offset}: {message}")]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

// =============================================================================
// PRINTING
// =============================================================================

/// Render an expression in its canonical textual form.
pub fn pretty(expr: &Expr) -> String {
    let mut out = String::with_capacity(64);
    write_expr(expr, &mut out);
    out
}

fn write_expr(expr: &Expr, out: &mut String) {
    match expr {
        Expr::Const { value } => write_literal(value, out),
        Expr::Var { name } => {
            out.push_str("(var ");
            out.push_str(name);
            out.push(')');
        }
        Expr::IntBin { op, lhs, rhs } => write_bin(&format!("int.{}", op.symbol()), lhs, rhs, out),
        Expr::IntCmp { op, lhs, rhs } => write_bin(&format!("int.{}", op.symbol()), lhs, rhs, out),
        Expr::BoolBin { op, lhs, rhs } => {
            write_bin(&format!("bool.{}", op.symbol()), lhs, rhs, out);
        }
        Expr::BoolNot { inner } => {
            out.push_str("(bool.not ");
            write_expr(inner, out);
            out.push(')');
        }
        Expr::StrConcat { lhs, rhs } => write_bin("str.++", lhs, rhs, out),
        Expr::StrCmp { op, lhs, rhs } => write_bin(&format!("str.{}", op.symbol()), lhs, rhs, out),
        Expr::StrCharAt { string, index } => write_bin("str.at", string, index, out),
        Expr::StrReplace {
            string,
            pattern,
            replacement,
        } => {
            out.push_str("(str.replace ");
            write_expr(string, out);
            out.push(' ');
            write_expr(pattern, out);
            out.push(' ');
            write_expr(replacement, out);
            out.push(')');
        }
        Expr::StrRegexReplace {
            string,
            regex,
            replacement,
        } => {
            out.push_str("(str.replace-re ");
            write_expr(string, out);
            out.push(' ');
            write_string(regex, out);
            out.push(' ');
            write_expr(replacement, out);
            out.push(')');
        }
        Expr::StrRegexSubmatchArray { string, regex } => {
            out.push_str("(str.submatch-re ");
            write_expr(string, out);
            out.push(' ');
            write_string(regex, out);
            out.push(')');
        }
        Expr::StrLength { string } => {
            out.push_str("(str.len ");
            write_expr(string, out);
            out.push(')');
        }
        Expr::Coercion { from, to, inner } => {
            out.push_str("(coerce ");
            out.push_str(from.name());
            out.push_str("->");
            out.push_str(to.name());
            out.push(' ');
            write_expr(inner, out);
            out.push(')');
        }
    }
}

fn write_bin(head: &str, lhs: &Expr, rhs: &Expr, out: &mut String) {
    out.push('(');
    out.push_str(head);
    out.push(' ');
    write_expr(lhs, out);
    out.push(' ');
    write_expr(rhs, out);
    out.push(')');
}

fn write_literal(value: &Literal, out: &mut String) {
    match value {
        Literal::Int { value } => out.push_str(&value.to_string()),
        Literal::Bool { value } => out.push_str(if *value { "true" } else { "false" }),
        Literal::Str { value } => write_string(value, out),
    }
}

fn write_string(value: &str, out: &mut String) {
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
}

// =============================================================================
// PARSING
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Str(String),
    Atom(String),
}

struct Tokenizer<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Tokenizer {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn offset(&mut self) -> usize {
        self.chars.peek().map_or(self.input.len(), |(i, _)| *i)
    }

    fn next_token(&mut self) -> Result<Option<(usize, Token)>, ParseError> {
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
            } else {
                break;
            }
        }
        let Some(&(start, c)) = self.chars.peek() else {
            return Ok(None);
        };
        match c {
            '(' => {
                self.chars.next();
                Ok(Some((start, Token::Open)))
            }
            ')' => {
                self.chars.next();
                Ok(Some((start, Token::Close)))
            }
            '"' => {
                self.chars.next();
                let mut value = String::new();
                loop {
                    match self.chars.next() {
                        Some((_, '"')) => return Ok(Some((start, Token::Str(value)))),
                        Some((i, '\\')) => match self.chars.next() {
                            Some((_, '"')) => value.push('"'),
                            Some((_, '\\')) => value.push('\\'),
                            Some((_, 'n')) => value.push('\n'),
                            Some((_, 't')) => value.push('\t'),
                            other => {
                                return Err(ParseError {
                                    offset: i,
                                    message: format!("invalid escape {:?}", other.map(|(_, c)| c)),
                                });
                            }
                        },
                        Some((_, other)) => value.push(other),
                        None => {
                            return Err(ParseError {
                                offset: start,
                                message: "unterminated string literal".into(),
                            });
                        }
                    }
                }
            }
            _ => {
                let mut atom = String::new();
                while let Some(&(_, c)) = self.chars.peek() {
                    if c.is_whitespace() || c == '(' || c == ')' || c == '"' {
                        break;
                    }
                    atom.push(c);
                    self.chars.next();
                }
                Ok(Some((start, Token::Atom(atom))))
            }
        }
    }
}

/// Parse the canonical textual form back into an expression.
pub fn parse(input: &str) -> Result<ExprRef, ParseError> {
    let mut tokens = Tokenizer::new(input);
    let expr = parse_expr(&mut tokens)?;
    if let Some((offset, _)) = tokens.next_token()? {
        return Err(ParseError {
            offset,
            message: "trailing input after expression".into(),
        });
    }
    Ok(expr)
}

fn parse_expr(tokens: &mut Tokenizer<'_>) -> Result<ExprRef, ParseError> {
    let offset = tokens.offset();
    let Some((offset, token)) = tokens.next_token()? else {
        return Err(ParseError {
            offset,
            message: "unexpected end of input".into(),
        });
    };
    match token {
        Token::Str(value) => Ok(Expr::string(value)),
        Token::Atom(atom) => parse_atom(&atom, offset),
        Token::Open => {
            let Some((head_offset, head)) = tokens.next_token()? else {
                return Err(ParseError {
                    offset,
                    message: "unexpected end of input after '('".into(),
                });
            };
            let Token::Atom(head) = head else {
                return Err(ParseError {
                    offset: head_offset,
                    message: "expected operator head".into(),
                });
            };
            let expr = parse_form(&head, head_offset, tokens)?;
            expect_close(tokens)?;
            Ok(expr)
        }
        Token::Close => Err(ParseError {
            offset,
            message: "unexpected ')'".into(),
        }),
    }
}

fn parse_atom(atom: &str, offset: usize) -> Result<ExprRef, ParseError> {
    if atom == "true" {
        return Ok(Expr::boolean(true));
    }
    if atom == "false" {
        return Ok(Expr::boolean(false));
    }
    if let Ok(value) = atom.parse::<i64>() {
        return Ok(Expr::int(value));
    }
    Err(ParseError {
        offset,
        message: format!("unrecognized atom '{atom}'"),
    })
}

fn parse_form(
    head: &str,
    offset: usize,
    tokens: &mut Tokenizer<'_>,
) -> Result<ExprRef, ParseError> {
    match head {
        "var" => {
            let Some((_, Token::Atom(name))) = tokens.next_token()? else {
                return Err(ParseError {
                    offset,
                    message: "expected variable name".into(),
                });
            };
            Ok(Expr::var(name))
        }
        "int.+" => parse_int_bin(IntBinOp::Add, tokens),
        "int.-" => parse_int_bin(IntBinOp::Sub, tokens),
        "int.*" => parse_int_bin(IntBinOp::Mul, tokens),
        "int.%" => parse_int_bin(IntBinOp::Mod, tokens),
        "int.==" => parse_int_cmp(IntCmpOp::Eq, tokens),
        "int.!=" => parse_int_cmp(IntCmpOp::Neq, tokens),
        "int.<" => parse_int_cmp(IntCmpOp::Lt, tokens),
        "int.<=" => parse_int_cmp(IntCmpOp::Le, tokens),
        "int.>" => parse_int_cmp(IntCmpOp::Gt, tokens),
        "int.>=" => parse_int_cmp(IntCmpOp::Ge, tokens),
        "bool.&&" => parse_bool_bin(BoolBinOp::And, tokens),
        "bool.||" => parse_bool_bin(BoolBinOp::Or, tokens),
        "bool.==" => parse_bool_bin(BoolBinOp::Eq, tokens),
        "bool.!=" => parse_bool_bin(BoolBinOp::Neq, tokens),
        "bool.===" => parse_bool_bin(BoolBinOp::Seq, tokens),
        "bool.!==" => parse_bool_bin(BoolBinOp::Sneq, tokens),
        "bool.not" => Ok(Expr::not(parse_expr(tokens)?)),
        "str.++" => {
            let lhs = parse_expr(tokens)?;
            let rhs = parse_expr(tokens)?;
            Ok(Expr::str_concat(lhs, rhs))
        }
        "str.==" => parse_str_cmp(StrCmpOp::Eq, tokens),
        "str.!=" => parse_str_cmp(StrCmpOp::Neq, tokens),
        "str.in" => parse_str_cmp(StrCmpOp::In, tokens),
        "str.not-in" => parse_str_cmp(StrCmpOp::NotIn, tokens),
        "str.at" => {
            let string = parse_expr(tokens)?;
            let index = parse_expr(tokens)?;
            Ok(Expr::str_char_at(string, index))
        }
        "str.replace" => {
            let string = parse_expr(tokens)?;
            let pattern = parse_expr(tokens)?;
            let replacement = parse_expr(tokens)?;
            Ok(Expr::str_replace(string, pattern, replacement))
        }
        "str.replace-re" => {
            let string = parse_expr(tokens)?;
            let regex = parse_regex(tokens)?;
            let replacement = parse_expr(tokens)?;
            Ok(Expr::str_regex_replace(string, regex, replacement))
        }
        "str.submatch-re" => {
            let string = parse_expr(tokens)?;
            let regex = parse_regex(tokens)?;
            Ok(Expr::str_regex_submatch_array(string, regex))
        }
        "str.len" => Ok(Expr::str_length(parse_expr(tokens)?)),
        "coerce" => {
            let Some((kinds_offset, Token::Atom(kinds))) = tokens.next_token()? else {
                return Err(ParseError {
                    offset,
                    message: "expected coercion kinds".into(),
                });
            };
            let Some((from, to)) = kinds.split_once("->") else {
                return Err(ParseError {
                    offset: kinds_offset,
                    message: format!("invalid coercion kinds '{kinds}'"),
                });
            };
            let from = parse_kind(from, kinds_offset)?;
            let to = parse_kind(to, kinds_offset)?;
            Ok(Expr::coercion(from, to, parse_expr(tokens)?))
        }
        other => Err(ParseError {
            offset,
            message: format!("unknown operator '{other}'"),
        }),
    }
}

fn parse_int_bin(op: IntBinOp, tokens: &mut Tokenizer<'_>) -> Result<ExprRef, ParseError> {
    let lhs = parse_expr(tokens)?;
    let rhs = parse_expr(tokens)?;
    Ok(Expr::int_bin(op, lhs, rhs))
}

fn parse_int_cmp(op: IntCmpOp, tokens: &mut Tokenizer<'_>) -> Result<ExprRef, ParseError> {
    let lhs = parse_expr(tokens)?;
    let rhs = parse_expr(tokens)?;
    Ok(Expr::int_cmp(op, lhs, rhs))
}

fn parse_bool_bin(op: BoolBinOp, tokens: &mut Tokenizer<'_>) -> Result<ExprRef, ParseError> {
    let lhs = parse_expr(tokens)?;
    let rhs = parse_expr(tokens)?;
    Ok(Expr::bool_bin(op, lhs, rhs))
}

fn parse_str_cmp(op: StrCmpOp, tokens: &mut Tokenizer<'_>) -> Result<ExprRef, ParseError> {
    let lhs = parse_expr(tokens)?;
    let rhs = parse_expr(tokens)?;
    Ok(Expr::str_cmp(op, lhs, rhs))
}

fn parse_regex(tokens: &mut Tokenizer<'_>) -> Result<String, ParseError> {
    match tokens.next_token()? {
        Some((_, Token::Str(regex))) => Ok(regex),
        Some((offset, _)) => Err(ParseError {
            offset,
            message: "expected regex string literal".into(),
        }),
        None => Err(ParseError {
            offset: 0,
            message: "expected regex string literal".into(),
        }),
    }
}

fn parse_kind(name: &str, offset: usize) -> Result<ValueKind, ParseError> {
    match name {
        "int" => Ok(ValueKind::Int),
        "bool" => Ok(ValueKind::Bool),
        "str" => Ok(ValueKind::Str),
        other => Err(ParseError {
            offset,
            message: format!("unknown value kind '{other}'"),
        }),
    }
}

fn expect_close(tokens: &mut Tokenizer<'_>) -> Result<(), ParseError> {
    match tokens.next_token()? {
        Some((_, Token::Close)) => Ok(()),
        Some((offset, _)) => Err(ParseError {
            offset,
            message: "expected ')'".into(),
        }),
        None => Err(ParseError {
            offset: 0,
            message: "expected ')', found end of input".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(expr: &ExprRef) {
        let printed = pretty(expr);
        let reparsed = parse(&printed).unwrap_or_else(|e| panic!("parse of '{printed}': {e}"));
        assert_eq!(*expr, reparsed, "round-trip changed '{printed}'");
    }

    #[test]
    fn literals_roundtrip() {
        roundtrip(&Expr::int(42));
        roundtrip(&Expr::int(-7));
        roundtrip(&Expr::boolean(true));
        roundtrip(&Expr::string("hello \"quoted\" \\ world"));
        roundtrip(&Expr::string(""));
    }

    #[test]
    fn comparisons_roundtrip() {
        roundtrip(&Expr::str_cmp(
            StrCmpOp::Eq,
            Expr::var("x"),
            Expr::string("42"),
        ));
        roundtrip(&Expr::int_cmp(
            IntCmpOp::Le,
            Expr::coercion(ValueKind::Str, ValueKind::Int, Expr::var("age")),
            Expr::int(120),
        ));
    }

    #[test]
    fn nested_booleans_roundtrip() {
        let e = Expr::bool_bin(
            BoolBinOp::And,
            Expr::not(Expr::str_cmp(StrCmpOp::Eq, Expr::var("a"), Expr::string(""))),
            Expr::bool_bin(
                BoolBinOp::Seq,
                Expr::var("chk"),
                Expr::boolean(false),
            ),
        );
        roundtrip(&e);
    }

    #[test]
    fn string_operations_roundtrip() {
        roundtrip(&Expr::str_length(Expr::var("s")));
        roundtrip(&Expr::str_char_at(Expr::var("s"), Expr::int(0)));
        roundtrip(&Expr::str_replace(
            Expr::var("s"),
            Expr::string("-"),
            Expr::string(""),
        ));
        roundtrip(&Expr::str_regex_replace(
            Expr::var("s"),
            "[0-9]+",
            Expr::string("N"),
        ));
        roundtrip(&Expr::str_regex_submatch_array(Expr::var("s"), "(a|b)*"));
        roundtrip(&Expr::str_concat(Expr::var("s"), Expr::string("!")));
    }

    #[test]
    fn distinct_domains_print_distinct_heads() {
        let int_eq = pretty(&Expr::int_cmp(IntCmpOp::Eq, Expr::int(1), Expr::int(1)));
        let str_eq = pretty(&Expr::str_cmp(
            StrCmpOp::Eq,
            Expr::string("a"),
            Expr::string("a"),
        ));
        assert_eq!(int_eq, "(int.== 1 1)");
        assert_eq!(str_eq, "(str.== \"a\" \"a\")");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse("(").is_err());
        assert!(parse("(frob 1 2)").is_err());
        assert!(parse("(int.== 1 2) extra").is_err());
        assert!(parse("\"unterminated").is_err());
    }
}

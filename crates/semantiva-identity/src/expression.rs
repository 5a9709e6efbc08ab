//! Arithmetic expression normalization
//!
//! Parameter sweeps declare values as arithmetic expressions over sweep
//! variables (`"3 * t"`, `"2 * (t + 5)"`). Two algebraically-commutative
//! spellings must contribute the same bytes to identity hashing, so this
//! module parses expressions into an AST and canonicalizes `+` and `*`
//! subtrees: nested same-operator chains are flattened into one operand list,
//! each operand is normalized recursively, and the list is sorted by its
//! canonical rendering.
//!
//! Number literals keep their source lexeme: `3 * t` and `t * 3` collapse to
//! one signature while `3.0 * t` and `3.1 * t` stay distinct.

use crate::error::IdentityError;
use std::fmt::{self, Display, Formatter};

/// Canonical signature of a normalized expression
///
/// Byte equality of two signatures means the source expressions are
/// equivalent under commutativity/associativity of `+` and `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ExprSignature(String);

impl ExprSignature {
    /// The canonical rendering backing this signature
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ExprSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse `expr` and return its canonical commutativity-aware signature.
///
/// # Errors
/// Returns [`IdentityError::ExpressionParse`] when the expression is not
/// well-formed arithmetic.
pub fn normalize_expression_signature(expr: &str) -> Result<ExprSignature, IdentityError> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser { tokens, pos: 0 };
    let ast = parser.parse_expr()?;
    parser.expect_end()?;
    Ok(ExprSignature(normalize(ast).render()))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, IdentityError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '+' => push_simple(&mut tokens, &mut i, Token::Plus),
            '-' => push_simple(&mut tokens, &mut i, Token::Minus),
            '*' => push_simple(&mut tokens, &mut i, Token::Star),
            '/' => push_simple(&mut tokens, &mut i, Token::Slash),
            '^' => push_simple(&mut tokens, &mut i, Token::Caret),
            '(' => push_simple(&mut tokens, &mut i, Token::LParen),
            ')' => push_simple(&mut tokens, &mut i, Token::RParen),
            ',' => push_simple(&mut tokens, &mut i, Token::Comma),
            '0'..='9' | '.' => {
                let start = i;
                let mut seen_exp = false;
                while i < bytes.len() {
                    let d = bytes[i] as char;
                    let continues = d.is_ascii_digit()
                        || d == '.'
                        || d == 'e'
                        || d == 'E'
                        || (seen_exp
                            && (d == '+' || d == '-')
                            && matches!(bytes[i - 1] as char, 'e' | 'E'));
                    if !continues {
                        break;
                    }
                    if d == 'e' || d == 'E' {
                        seen_exp = true;
                    }
                    i += 1;
                }
                let lexeme = &input[start..i];
                // Validate the lexeme is an actual number, not e.g. "1.2.3".
                if lexeme.parse::<f64>().is_err() {
                    return Err(IdentityError::ExpressionParse {
                        position: start,
                        message: format!("invalid number literal '{lexeme}'"),
                    });
                }
                tokens.push((start, Token::Number(lexeme.to_string())));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < bytes.len() {
                    let d = bytes[i] as char;
                    if !(d.is_ascii_alphanumeric() || d == '_') {
                        break;
                    }
                    i += 1;
                }
                tokens.push((start, Token::Ident(input[start..i].to_string())));
            }
            other => {
                return Err(IdentityError::ExpressionParse {
                    position: i,
                    message: format!("unexpected character '{other}'"),
                })
            }
        }
    }
    Ok(tokens)
}

fn push_simple(tokens: &mut Vec<(usize, Token)>, i: &mut usize, token: Token) {
    tokens.push((*i, token));
    *i += 1;
}

/// Expression AST
///
/// `+` is n-ary (subtraction folds into `Neg` operands); `*` is n-ary;
/// division and power stay binary because they are not commutative.
#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(String),
    Var(String),
    Neg(Box<Expr>),
    Add(Vec<Expr>),
    Mul(Vec<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn bump(&mut self) -> Option<(usize, Token)> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn error_here(&self, message: impl Into<String>) -> IdentityError {
        let position = self
            .tokens
            .get(self.pos)
            .map(|(p, _)| *p)
            .unwrap_or_else(|| self.tokens.last().map(|(p, _)| *p + 1).unwrap_or(0));
        IdentityError::ExpressionParse {
            position,
            message: message.into(),
        }
    }

    fn expect_end(&self) -> Result<(), IdentityError> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(self.error_here("trailing tokens after expression"))
        }
    }

    /// expr := term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<Expr, IdentityError> {
        let mut operands = vec![self.parse_term()?];
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.bump();
                    operands.push(self.parse_term()?);
                }
                Some(Token::Minus) => {
                    self.bump();
                    operands.push(Expr::Neg(Box::new(self.parse_term()?)));
                }
                _ => break,
            }
        }
        Ok(if operands.len() == 1 {
            operands.pop().unwrap_or(Expr::Number("0".into()))
        } else {
            Expr::Add(operands)
        })
    }

    /// term := factor (('*' | '/') factor)*
    fn parse_term(&mut self) -> Result<Expr, IdentityError> {
        let mut node = self.parse_factor()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.bump();
                    let rhs = self.parse_factor()?;
                    node = match node {
                        Expr::Mul(mut ops) => {
                            ops.push(rhs);
                            Expr::Mul(ops)
                        }
                        other => Expr::Mul(vec![other, rhs]),
                    };
                }
                Some(Token::Slash) => {
                    self.bump();
                    let rhs = self.parse_factor()?;
                    node = Expr::Div(Box::new(node), Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(node)
    }

    /// factor := unary ('^' factor)?   (right-associative power)
    fn parse_factor(&mut self) -> Result<Expr, IdentityError> {
        let base = self.parse_unary()?;
        if matches!(self.peek(), Some(Token::Caret)) {
            self.bump();
            let exp = self.parse_factor()?;
            return Ok(Expr::Pow(Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    /// unary := '-' unary | primary
    fn parse_unary(&mut self) -> Result<Expr, IdentityError> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.bump();
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        if matches!(self.peek(), Some(Token::Plus)) {
            self.bump();
            return self.parse_unary();
        }
        self.parse_primary()
    }

    /// primary := number | ident ('(' args ')')? | '(' expr ')'
    fn parse_primary(&mut self) -> Result<Expr, IdentityError> {
        match self.bump() {
            Some((_, Token::Number(lexeme))) => Ok(Expr::Number(lexeme)),
            Some((_, Token::Ident(name))) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.bump();
                    let mut args = Vec::new();
                    if !matches!(self.peek(), Some(Token::RParen)) {
                        loop {
                            args.push(self.parse_expr()?);
                            match self.peek() {
                                Some(Token::Comma) => {
                                    self.bump();
                                }
                                _ => break,
                            }
                        }
                    }
                    match self.bump() {
                        Some((_, Token::RParen)) => Ok(Expr::Call(name, args)),
                        _ => Err(self.error_here("expected ')' after call arguments")),
                    }
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Some((_, Token::LParen)) => {
                let inner = self.parse_expr()?;
                match self.bump() {
                    Some((_, Token::RParen)) => Ok(inner),
                    _ => Err(self.error_here("expected ')'")),
                }
            }
            _ => Err(self.error_here("expected number, identifier, or '('")),
        }
    }
}

/// Canonicalize commutative subtrees.
fn normalize(expr: Expr) -> Expr {
    match expr {
        Expr::Add(ops) => {
            let mut flat = Vec::new();
            flatten_add(ops, &mut flat);
            let mut flat: Vec<Expr> = flat.into_iter().map(normalize).collect();
            flat.sort_by(|a, b| a.render().cmp(&b.render()));
            Expr::Add(flat)
        }
        Expr::Mul(ops) => {
            let mut flat = Vec::new();
            flatten_mul(ops, &mut flat);
            let mut flat: Vec<Expr> = flat.into_iter().map(normalize).collect();
            flat.sort_by(|a, b| a.render().cmp(&b.render()));
            Expr::Mul(flat)
        }
        Expr::Neg(inner) => Expr::Neg(Box::new(normalize(*inner))),
        Expr::Div(num, den) => Expr::Div(Box::new(normalize(*num)), Box::new(normalize(*den))),
        Expr::Pow(base, exp) => Expr::Pow(Box::new(normalize(*base)), Box::new(normalize(*exp))),
        Expr::Call(name, args) => Expr::Call(name, args.into_iter().map(normalize).collect()),
        leaf @ (Expr::Number(_) | Expr::Var(_)) => leaf,
    }
}

fn flatten_add(ops: Vec<Expr>, out: &mut Vec<Expr>) {
    for op in ops {
        match op {
            Expr::Add(inner) => flatten_add(inner, out),
            other => out.push(other),
        }
    }
}

fn flatten_mul(ops: Vec<Expr>, out: &mut Vec<Expr>) {
    for op in ops {
        match op {
            Expr::Mul(inner) => flatten_mul(inner, out),
            other => out.push(other),
        }
    }
}

impl Expr {
    /// Deterministic prefix rendering, e.g. `(* (+ 5 t) 2)`.
    fn render(&self) -> String {
        match self {
            Expr::Number(lexeme) => lexeme.clone(),
            Expr::Var(name) => name.clone(),
            Expr::Neg(inner) => format!("(neg {})", inner.render()),
            Expr::Add(ops) => render_chain("+", ops),
            Expr::Mul(ops) => render_chain("*", ops),
            Expr::Div(num, den) => format!("(/ {} {})", num.render(), den.render()),
            Expr::Pow(base, exp) => format!("(^ {} {})", base.render(), exp.render()),
            Expr::Call(name, args) => {
                if args.is_empty() {
                    format!("({name})")
                } else {
                    format!("({name} {})", render_list(args))
                }
            }
        }
    }
}

fn render_chain(op: &str, ops: &[Expr]) -> String {
    format!("({op} {})", render_list(ops))
}

fn render_list(ops: &[Expr]) -> String {
    ops.iter()
        .map(Expr::render)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(expr: &str) -> ExprSignature {
        normalize_expression_signature(expr).unwrap()
    }

    #[test]
    fn commutative_product() {
        assert_eq!(sig("3 * t"), sig("t * 3"));
    }

    #[test]
    fn commutative_sum_under_product() {
        assert_eq!(sig("2 * (t + 5)"), sig("(5 + t) * 2"));
    }

    #[test]
    fn numerically_distinct_literals_stay_distinct() {
        assert_ne!(sig("3.0 * t"), sig("3.1 * t"));
    }

    #[test]
    fn literal_lexeme_is_preserved() {
        // 3 and 3.0 are numerically equal but textually distinct declarations.
        assert_ne!(sig("3 * t"), sig("3.0 * t"));
    }

    #[test]
    fn associative_chains_flatten() {
        assert_eq!(sig("a + (b + c)"), sig("(a + b) + c"));
        assert_eq!(sig("a * (b * c)"), sig("(a * b) * c"));
    }

    #[test]
    fn division_is_not_commutative() {
        assert_ne!(sig("a / b"), sig("b / a"));
    }

    #[test]
    fn power_is_not_commutative() {
        assert_ne!(sig("a ^ b"), sig("b ^ a"));
    }

    #[test]
    fn subtraction_folds_into_negated_sum() {
        assert_eq!(sig("t - 3"), sig("-3 + t"));
        assert_ne!(sig("t - 3"), sig("t + 3"));
    }

    #[test]
    fn call_arguments_keep_order() {
        assert_ne!(sig("f(a, b)"), sig("f(b, a)"));
        assert_eq!(sig("f(a + b)"), sig("f(b + a)"));
    }

    #[test]
    fn whitespace_is_irrelevant() {
        assert_eq!(sig("2*(t+5)"), sig("  2 * ( t + 5 ) "));
    }

    #[test]
    fn scientific_notation_parses() {
        assert_eq!(sig("1e-3 * t"), sig("t * 1e-3"));
    }

    #[test]
    fn rejects_malformed_expression() {
        assert!(normalize_expression_signature("3 *").is_err());
        assert!(normalize_expression_signature("(t + 5").is_err());
        assert!(normalize_expression_signature("1.2.3").is_err());
        assert!(normalize_expression_signature("a $ b").is_err());
    }

    #[test]
    fn parse_error_carries_position() {
        let err = normalize_expression_signature("a $ b").unwrap_err();
        assert!(matches!(err, IdentityError::ExpressionParse { position: 2, .. }));
    }

    #[test]
    fn signature_is_stable_across_calls() {
        assert_eq!(sig("2 * (t + 5) - f(u) / 3"), sig("2 * (t + 5) - f(u) / 3"));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn operand() -> impl Strategy<Value = String> {
            prop_oneof![
                "[a-z]{1,4}".prop_map(|v| v),
                (0u32..1000).prop_map(|n| n.to_string()),
            ]
        }

        proptest! {
            #[test]
            fn commutative_operand_swap_preserves_signature(
                a in operand(),
                b in operand(),
                op in prop_oneof![Just('+'), Just('*')],
            ) {
                let forward = sig(&format!("{a} {op} {b}"));
                let swapped = sig(&format!("{b} {op} {a}"));
                prop_assert_eq!(forward, swapped);
            }

            #[test]
            fn signature_of_rendered_form_is_a_fixed_point(
                a in operand(),
                b in operand(),
                c in operand(),
            ) {
                let first = sig(&format!("{a} * ({b} + {c})"));
                let second = sig(&format!("({c} + {b}) * {a}"));
                prop_assert_eq!(first, second);
            }
        }
    }
}

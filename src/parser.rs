//! Expression text parser.
//!
//! Parses the expression strings used in rule values and `Require`
//! clauses into [`Expr`] trees. The grammar, loosest binding first:
//!
//! ```text
//! expr    := or ( '?' expr ':' expr )?
//! or      := and ( '||' and )*
//! and     := eq ( '&&' eq )*
//! eq      := rel ( ( '==' | '!=' | '=~' | '!~' ) rel )*
//! rel     := sum ( ( '<' | '<=' | '>' | '>=' ) sum )*
//! sum     := product ( ( '+' | '-' ) product )*
//! product := unary ( ( '*' | '/' | '%' ) unary )*
//! unary   := ( '-' | '!' ) unary | primary
//! primary := number | string | 'source' | 'null' | 'true' | 'false'
//!          | func '(' expr ( ',' expr )* ')' | attribute | '(' expr ')'
//! ```
//!
//! Attribute names are bare (`levels.Fighter`) or braced
//! (`{selectableFeatures.Shifter - Longtooth}`). A bare name that contains
//! a dot continues across single spaces followed by an uppercase letter, so
//! `features.Power Attack >= 1` reads the attribute `features.Power Attack`.
//! It also takes in a parenthesised qualifier after a space, as in
//! `features.Weapon Focus (Longsword)`.

use crate::attr_id::AttrId;
use crate::error::ExprError;
use crate::expr::{BinaryOp, Expr, Func, UnaryOp};
use crate::value::AttrValue;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
}

const OPERATORS: [&str; 21] = [
    "==", "!=", "<=", ">=", "=~", "!~", "&&", "||", "<", ">", "+", "-", "*", "/", "%", "!", "?",
    ":", "(", ")", ",",
];

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, ExprError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos] as char;
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        let start = pos;

        if c.is_ascii_digit() || (c == '.' && bytes.get(pos + 1).map_or(false, u8::is_ascii_digit)) {
            while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                pos += 1;
            }
            let text = &input[start..pos];
            let n = text
                .parse::<f64>()
                .map_err(|_| ExprError::new(input, start, format!("invalid number '{}'", text)))?;
            tokens.push((Token::Number(n), start));
            continue;
        }

        if c == '\'' || c == '"' {
            let close = input[pos + 1..]
                .find(c)
                .ok_or_else(|| ExprError::new(input, start, "unterminated string"))?;
            let text = &input[pos + 1..pos + 1 + close];
            tokens.push((Token::Str(text.to_string()), start));
            pos += close + 2;
            continue;
        }

        if c == '{' {
            let close = input[pos + 1..]
                .find('}')
                .ok_or_else(|| ExprError::new(input, start, "unterminated '{'"))?;
            let name = input[pos + 1..pos + 1 + close].trim();
            if name.is_empty() {
                return Err(ExprError::new(input, start, "empty attribute name"));
            }
            tokens.push((Token::Ident(name.to_string()), start));
            pos += close + 2;
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            pos = scan_identifier(bytes, pos);
            tokens.push((Token::Ident(input[start..pos].to_string()), start));
            continue;
        }

        match OPERATORS.iter().find(|op| input[pos..].starts_with(**op)) {
            Some(op) => {
                tokens.push((Token::Op(op), start));
                pos += op.len();
            }
            None => {
                let found = input[pos..].chars().next().unwrap_or(c);
                return Err(ExprError::new(
                    input,
                    start,
                    format!("unexpected character '{}'", found),
                ));
            }
        }
    }

    Ok(tokens)
}

/// Scan a bare identifier starting at `start`, returning its end offset.
fn scan_identifier(bytes: &[u8], start: usize) -> usize {
    let is_ident_byte = |b: u8| b.is_ascii_alphanumeric() || b == b'_' || b == b'.';
    let mut pos = start;
    let mut dotted = false;
    loop {
        while pos < bytes.len() && (is_ident_byte(bytes[pos]) || (dotted && bytes[pos] == b'\'')) {
            if bytes[pos] == b'.' {
                dotted = true;
            }
            pos += 1;
        }
        if !dotted || pos + 1 >= bytes.len() || bytes[pos] != b' ' {
            return pos;
        }
        if bytes[pos + 1].is_ascii_uppercase() {
            pos += 1;
        } else if bytes[pos + 1] == b'(' {
            // qualifier group: `features.Weapon Focus (Longsword)`
            match qualifier_end(bytes, pos + 2) {
                Some(end) => pos = end,
                None => return pos,
            }
        } else {
            return pos;
        }
    }
}

/// End offset (past the `)`) of a name qualifier whose text starts at
/// `start`. The text must be non-empty and free of brackets and quotes.
fn qualifier_end(bytes: &[u8], start: usize) -> Option<usize> {
    let len = bytes[start..]
        .iter()
        .position(|&b| matches!(b, b')' | b'(' | b'"' | b'\'' | b'{' | b'}'))?;
    let text = &bytes[start..start + len];
    if bytes[start + len] != b')' || text.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    Some(start + len + 1)
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.input.len(), |(_, offset)| *offset)
    }

    fn error(&self, message: impl Into<String>) -> ExprError {
        ExprError::new(self.input, self.offset(), message)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Token::Op(o)) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), ExprError> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", op)))
        }
    }

    fn expr(&mut self) -> Result<Expr, ExprError> {
        let cond = self.binary(0)?;
        if self.eat_op("?") {
            let then = self.expr()?;
            self.expect_op(":")?;
            let otherwise = self.expr()?;
            return Ok(Expr::if_else(cond, then, otherwise));
        }
        Ok(cond)
    }

    /// Precedence climbing over the binary operator levels.
    fn binary(&mut self, level: usize) -> Result<Expr, ExprError> {
        const LEVELS: [&[(&str, BinaryOp)]; 6] = [
            &[("||", BinaryOp::Or)],
            &[("&&", BinaryOp::And)],
            &[
                ("==", BinaryOp::Eq),
                ("!=", BinaryOp::Ne),
                ("=~", BinaryOp::Contains),
                ("!~", BinaryOp::NotContains),
            ],
            &[
                ("<", BinaryOp::Lt),
                ("<=", BinaryOp::Le),
                (">", BinaryOp::Gt),
                (">=", BinaryOp::Ge),
            ],
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
            &[("*", BinaryOp::Mul), ("/", BinaryOp::Div), ("%", BinaryOp::Rem)],
        ];

        if level == LEVELS.len() {
            return self.unary();
        }
        let mut lhs = self.binary(level + 1)?;
        loop {
            let op = match self.peek() {
                Some(Token::Op(sym)) => LEVELS[level]
                    .iter()
                    .find(|(s, _)| s == sym)
                    .map(|(_, op)| *op),
                _ => None,
            };
            let Some(op) = op else {
                return Ok(lhs);
            };
            self.pos += 1;
            let rhs = self.binary(level + 1)?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat_op("-") {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?)));
        }
        if self.eat_op("!") {
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| self.error("expected operand"))?;
        match token {
            Token::Number(n) => {
                self.pos += 1;
                Ok(Expr::num(n))
            }
            Token::Str(s) => {
                self.pos += 1;
                Ok(Expr::text(s))
            }
            Token::Op("(") => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect_op(")")?;
                Ok(inner)
            }
            Token::Op(op) => Err(self.error(format!("unexpected '{}'", op))),
            Token::Ident(name) => {
                self.pos += 1;
                match name.as_str() {
                    "source" => return Ok(Expr::Source),
                    "null" | "undefined" => return Ok(Expr::Null),
                    "true" => return Ok(Expr::Literal(AttrValue::Bool(true))),
                    "false" => return Ok(Expr::Literal(AttrValue::Bool(false))),
                    _ => {}
                }
                let func = Func::from_name(name.strip_prefix("Math.").unwrap_or(&name));
                match func {
                    Some(func) if self.eat_op("(") => self.call(func, &name),
                    _ => Ok(Expr::Attr(AttrId::from(name))),
                }
            }
        }
    }

    fn call(&mut self, func: Func, name: &str) -> Result<Expr, ExprError> {
        let mut args = Vec::new();
        if !self.eat_op(")") {
            loop {
                args.push(self.expr()?);
                if self.eat_op(")") {
                    break;
                }
                self.expect_op(",")?;
            }
        }
        let (min, max) = func.arity();
        if args.len() < min || args.len() > max {
            return Err(self.error(format!(
                "{} takes {} argument(s), got {}",
                name,
                if min == max { min.to_string() } else { format!("at least {}", min) },
                args.len()
            )));
        }
        Ok(Expr::Call(func, args))
    }
}

/// Parse an expression string.
///
/// # Examples
///
/// ```rust
/// use rulechain::parser::parse_expr;
/// use rulechain::{AttrId, AttrValue};
/// use std::collections::BTreeMap;
///
/// let expr = parse_expr("source >= 3 ? floor(source / 2) : null").unwrap();
///
/// let values = BTreeMap::new();
/// assert_eq!(expr.eval(Some(&AttrValue::from(7)), &values), Some(AttrValue::from(3)));
/// assert_eq!(expr.eval(Some(&AttrValue::from(2)), &values), None);
///
/// let req = parse_expr("features.Power Attack && strength >= 13").unwrap();
/// assert_eq!(
///     req.references(),
///     vec![AttrId::new("features.Power Attack"), AttrId::new("strength")]
/// );
/// ```
pub fn parse_expr(input: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ExprError::new(input, 0, "empty expression"));
    }
    let mut parser = Parser {
        input,
        tokens,
        pos: 0,
    };
    let expr = parser.expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

/// Parse a rule value: a plain number becomes a literal, anything else is
/// parsed as an expression.
pub fn parse_value(input: &str) -> Result<Expr, ExprError> {
    match input.trim().parse::<f64>() {
        Ok(n) => Ok(Expr::num(n)),
        Err(_) => parse_expr(input),
    }
}

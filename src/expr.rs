//! Rule value expressions.
//!
//! A rule's value is a small expression tree evaluated with the rule's
//! source value bound to `source`. Expressions can read other attributes,
//! and every attribute they read becomes a dependency of the rule's target.
//!
//! Evaluation never fails. Arithmetic on undefined operands, division by
//! zero and arithmetic on non-numeric text all produce "undefined" (`None`).

use crate::attr_id::AttrId;
use crate::value::{is_truthy, AttrValue};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Read access to attribute values during evaluation.
pub trait AttrLookup {
    fn lookup(&self, id: &AttrId) -> Option<&AttrValue>;
}

impl AttrLookup for BTreeMap<AttrId, AttrValue> {
    fn lookup(&self, id: &AttrId) -> Option<&AttrValue> {
        self.get(id)
    }
}

impl AttrLookup for HashMap<AttrId, AttrValue> {
    fn lookup(&self, id: &AttrId) -> Option<&AttrValue> {
        self.get(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// `=~`: left's text contains right's text.
    Contains,
    /// `!~`
    NotContains,
    /// `&&`, returns the deciding operand.
    And,
    /// `||`, returns the deciding operand.
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Contains => "=~",
            BinaryOp::NotContains => "!~",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// Built-in functions callable from expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Floor,
    Ceil,
    Round,
    Abs,
    Min,
    Max,
    /// `clamp(value, min, max)`; an undefined bound is no bound.
    Clamp,
}

impl Func {
    pub fn name(self) -> &'static str {
        match self {
            Func::Floor => "floor",
            Func::Ceil => "ceil",
            Func::Round => "round",
            Func::Abs => "abs",
            Func::Min => "min",
            Func::Max => "max",
            Func::Clamp => "clamp",
        }
    }

    pub fn from_name(name: &str) -> Option<Func> {
        match name {
            "floor" => Some(Func::Floor),
            "ceil" => Some(Func::Ceil),
            "round" => Some(Func::Round),
            "abs" => Some(Func::Abs),
            "min" => Some(Func::Min),
            "max" => Some(Func::Max),
            "clamp" => Some(Func::Clamp),
            _ => None,
        }
    }

    /// Accepted argument counts as (min, max).
    pub fn arity(self) -> (usize, usize) {
        match self {
            Func::Floor | Func::Ceil | Func::Round | Func::Abs => (1, 1),
            Func::Min | Func::Max => (1, usize::MAX),
            Func::Clamp => (3, 3),
        }
    }
}

/// An expression tree.
///
/// # Examples
///
/// ```rust
/// use rulechain::expr::{BinaryOp, Expr};
/// use rulechain::{AttrId, AttrValue};
/// use std::collections::BTreeMap;
///
/// // floor(source / 2) + charismaModifier
/// let expr = Expr::binary(
///     BinaryOp::Add,
///     Expr::floor(Expr::binary(BinaryOp::Div, Expr::Source, Expr::num(2.0))),
///     Expr::attr("charismaModifier"),
/// );
///
/// let mut values = BTreeMap::new();
/// values.insert(AttrId::new("charismaModifier"), AttrValue::from(3));
///
/// let result = expr.eval(Some(&AttrValue::from(7)), &values);
/// assert_eq!(result, Some(AttrValue::from(6)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// The rule's source value, unchanged. A rule value of `null` means this.
    Source,
    /// Explicitly undefined.
    Null,
    Literal(AttrValue),
    /// Value of another attribute.
    Attr(AttrId),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call(Func, Vec<Expr>),
    /// Step table: the value of the highest step whose threshold is at
    /// most `key`. Undefined below the first threshold.
    Table {
        key: Box<Expr>,
        steps: Vec<(f64, AttrValue)>,
    },
}

impl Expr {
    pub fn num(n: f64) -> Expr {
        Expr::Literal(AttrValue::Number(n))
    }

    pub fn text(s: impl Into<String>) -> Expr {
        Expr::Literal(AttrValue::Text(s.into()))
    }

    pub fn attr(id: impl Into<AttrId>) -> Expr {
        Expr::Attr(id.into())
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn not(expr: Expr) -> Expr {
        Expr::Unary(UnaryOp::Not, Box::new(expr))
    }

    pub fn floor(expr: Expr) -> Expr {
        Expr::Call(Func::Floor, vec![expr])
    }

    pub fn if_else(cond: Expr, then: Expr, otherwise: Expr) -> Expr {
        Expr::If {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    /// `cond ? value : null`
    pub fn when(cond: Expr, value: Expr) -> Expr {
        Expr::if_else(cond, value, Expr::Null)
    }

    /// Evaluate with `source` bound to the rule's source value.
    pub fn eval(&self, source: Option<&AttrValue>, values: &dyn AttrLookup) -> Option<AttrValue> {
        match self {
            Expr::Source => source.cloned(),
            Expr::Null => None,
            Expr::Literal(value) => Some(value.clone()),
            Expr::Attr(id) => values.lookup(id).cloned(),
            Expr::Unary(UnaryOp::Neg, inner) => inner
                .eval(source, values)?
                .as_number()
                .map(|n| AttrValue::Number(-n)),
            Expr::Unary(UnaryOp::Not, inner) => {
                Some(AttrValue::Bool(!is_truthy(inner.eval(source, values).as_ref())))
            }
            Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, source, values),
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                if is_truthy(cond.eval(source, values).as_ref()) {
                    then.eval(source, values)
                } else {
                    otherwise.eval(source, values)
                }
            }
            Expr::Call(func, args) => {
                let args: Vec<Option<AttrValue>> =
                    args.iter().map(|arg| arg.eval(source, values)).collect();
                call(*func, &args)
            }
            Expr::Table { key, steps } => {
                let key = key.eval(source, values)?.as_number()?;
                steps
                    .iter()
                    .take_while(|(threshold, _)| *threshold <= key)
                    .last()
                    .map(|(_, value)| value.clone())
            }
        }
    }

    /// Attributes this expression reads, in first-occurrence order.
    pub fn references(&self) -> Vec<AttrId> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references(&self, out: &mut Vec<AttrId>) {
        match self {
            Expr::Attr(id) => {
                if !out.contains(id) {
                    out.push(id.clone());
                }
            }
            Expr::Unary(_, inner) => inner.collect_references(out),
            Expr::Binary(_, lhs, rhs) => {
                lhs.collect_references(out);
                rhs.collect_references(out);
            }
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                cond.collect_references(out);
                then.collect_references(out);
                otherwise.collect_references(out);
            }
            Expr::Call(_, args) => args.iter().for_each(|arg| arg.collect_references(out)),
            Expr::Table { key, .. } => key.collect_references(out),
            Expr::Source | Expr::Null | Expr::Literal(_) => {}
        }
    }
}

fn numbers(lhs: Option<AttrValue>, rhs: Option<AttrValue>) -> Option<(f64, f64)> {
    Some((lhs?.as_number()?, rhs?.as_number()?))
}

fn eval_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    source: Option<&AttrValue>,
    values: &dyn AttrLookup,
) -> Option<AttrValue> {
    // Short-circuit operators evaluate the right side lazily.
    match op {
        BinaryOp::And => {
            let left = lhs.eval(source, values);
            return if is_truthy(left.as_ref()) {
                rhs.eval(source, values)
            } else {
                left.or(Some(AttrValue::Bool(false)))
            };
        }
        BinaryOp::Or => {
            let left = lhs.eval(source, values);
            return if is_truthy(left.as_ref()) {
                left
            } else {
                rhs.eval(source, values)
            };
        }
        _ => {}
    }

    let left = lhs.eval(source, values);
    let right = rhs.eval(source, values);
    match op {
        BinaryOp::Add => Some(left?.add(&right?)),
        BinaryOp::Sub => numbers(left, right).map(|(a, b)| AttrValue::Number(a - b)),
        BinaryOp::Mul => numbers(left, right).map(|(a, b)| AttrValue::Number(a * b)),
        BinaryOp::Div => match numbers(left, right) {
            Some((_, b)) if b == 0.0 => None,
            Some((a, b)) => Some(AttrValue::Number(a / b)),
            None => None,
        },
        BinaryOp::Rem => match numbers(left, right) {
            Some((_, b)) if b == 0.0 => None,
            Some((a, b)) => Some(AttrValue::Number(a % b)),
            None => None,
        },
        BinaryOp::Eq => Some(AttrValue::Bool(loose_eq(&left, &right))),
        BinaryOp::Ne => Some(AttrValue::Bool(!loose_eq(&left, &right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let holds = match (left, right) {
                (Some(a), Some(b)) => {
                    let ord = a.compare(&b);
                    match op {
                        BinaryOp::Lt => ord.is_lt(),
                        BinaryOp::Le => ord.is_le(),
                        BinaryOp::Gt => ord.is_gt(),
                        _ => ord.is_ge(),
                    }
                }
                _ => false,
            };
            Some(AttrValue::Bool(holds))
        }
        BinaryOp::Contains => Some(AttrValue::Bool(contains(&left, &right))),
        BinaryOp::NotContains => Some(AttrValue::Bool(!contains(&left, &right))),
        BinaryOp::And | BinaryOp::Or => None,
    }
}

fn loose_eq(left: &Option<AttrValue>, right: &Option<AttrValue>) -> bool {
    match (left, right) {
        (Some(a), Some(b)) => a.loose_eq(b),
        (None, None) => true,
        _ => false,
    }
}

fn contains(left: &Option<AttrValue>, right: &Option<AttrValue>) -> bool {
    match (left, right) {
        (Some(a), Some(b)) => a.to_string().contains(&b.to_string()),
        _ => false,
    }
}

fn call(func: Func, args: &[Option<AttrValue>]) -> Option<AttrValue> {
    let number = |idx: usize| args.get(idx).and_then(|v| v.as_ref()).and_then(AttrValue::as_number);
    match func {
        Func::Floor => number(0).map(|n| AttrValue::Number(n.floor())),
        Func::Ceil => number(0).map(|n| AttrValue::Number(n.ceil())),
        Func::Round => number(0).map(|n| AttrValue::Number(n.round())),
        Func::Abs => number(0).map(|n| AttrValue::Number(n.abs())),
        Func::Min | Func::Max => {
            let mut defined = args.iter().flatten();
            let first = defined.next()?.clone();
            Some(defined.fold(first, |best, next| {
                let ord = next.compare(&best);
                let better = if func == Func::Min { ord.is_lt() } else { ord.is_gt() };
                if better {
                    next.clone()
                } else {
                    best
                }
            }))
        }
        Func::Clamp => {
            let mut value = number(0)?;
            if let Some(min) = number(1) {
                value = value.max(min);
            }
            if let Some(max) = number(2) {
                value = value.min(max);
            }
            Some(AttrValue::Number(value))
        }
    }
}

/// Whether `s` can be written as a bare attribute name in expression text.
fn is_bare_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Source => f.write_str("source"),
            Expr::Null => f.write_str("null"),
            Expr::Literal(AttrValue::Text(s)) => write!(f, "'{}'", s),
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::Attr(id) if is_bare_identifier(id.as_str()) => write!(f, "{}", id),
            Expr::Attr(id) => write!(f, "{{{}}}", id),
            Expr::Unary(UnaryOp::Neg, inner) => write!(f, "-{}", inner),
            Expr::Unary(UnaryOp::Not, inner) => write!(f, "!{}", inner),
            Expr::Binary(op, lhs, rhs) => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Expr::If {
                cond,
                then,
                otherwise,
            } => write!(f, "({} ? {} : {})", cond, then, otherwise),
            Expr::Call(func, args) => {
                write!(f, "{}(", func.name())?;
                for (idx, arg) in args.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            Expr::Table { key, steps } => {
                write!(f, "table({}", key)?;
                for (threshold, value) in steps {
                    write!(f, ", {}={}", AttrValue::Number(*threshold), value)?;
                }
                f.write_str(")")
            }
        }
    }
}

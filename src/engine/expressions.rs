//! Expression evaluation
//!
//! Implements SPARQL-style value semantics over the rule AST: given an
//! expression tree and a solution mapping, evaluation produces a ground
//! term, an unbound marker, or a type error. Type errors are not fatal;
//! they are resolved at the nearest FILTER or BIND boundary.
//!
//! `NOW()` is read from an [`EvalContext`] captured once per fixpoint
//! iteration, so time-dependent comparisons are stable within a round.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

use crate::ast::{BinaryOperator, Expression, TermPattern, UnaryOperator};
use crate::term::ns::xsd;
use crate::term::Term;

use super::builtins::BuiltinRegistry;
use super::solutions::SolutionMapping;

/// A non-fatal expression evaluation error
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvalError {
    pub message: String,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        EvalError { message: message.into() }
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type error: {}", self.message)
    }
}

/// Result of evaluating an expression against one solution mapping
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Evaluated {
    /// A ground term value
    Value(Term),
    /// The expression referenced a variable outside the mapping's domain
    Unbound,
    /// A type error, neither true nor false
    Error(EvalError),
}

impl Evaluated {
    pub fn error(message: impl Into<String>) -> Self {
        Evaluated::Error(EvalError::new(message))
    }

    pub fn as_value(&self) -> Option<&Term> {
        match self {
            Evaluated::Value(t) => Some(t),
            _ => None,
        }
    }
}

/// Per-iteration evaluation context
///
/// Captured once per fixpoint iteration; `now` stays fixed across every
/// rule in the round.
pub struct EvalContext<'a> {
    pub now: DateTime<Utc>,
    pub builtins: &'a BuiltinRegistry,
}

impl<'a> EvalContext<'a> {
    pub fn new(builtins: &'a BuiltinRegistry, now: DateTime<Utc>) -> Self {
        EvalContext { now, builtins }
    }
}

/// Evaluate an expression against a solution mapping
pub fn eval_expr(expr: &Expression, mu: &SolutionMapping, ctx: &EvalContext) -> Evaluated {
    match expr {
        Expression::Term(slot) => eval_slot(slot, mu),
        Expression::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, mu, ctx),
        Expression::Unary(op, arg) => eval_unary(*op, arg, mu, ctx),
        Expression::Call(name, args) => eval_call(name, args, mu, ctx),
    }
}

fn eval_slot(slot: &TermPattern, mu: &SolutionMapping) -> Evaluated {
    match slot {
        TermPattern::Variable(v) => match mu.get(v) {
            Some(term) => Evaluated::Value(term.clone()),
            None => Evaluated::Unbound,
        },
        TermPattern::Iri(iri) => Evaluated::Value(Term::iri(iri.as_str())),
        TermPattern::Literal(lit) => Evaluated::Value(Term::Literal(std::sync::Arc::new(lit.clone()))),
        TermPattern::Blank(label) => Evaluated::Value(Term::blank(label.clone())),
    }
}

/// Effective boolean value of a ground term
///
/// Booleans, numerics, and strings have a truth value; everything else
/// (IRIs, blank nodes, other literals) is a type error, not false.
pub fn ebv(term: &Term) -> Result<bool, EvalError> {
    let lit = match term.as_literal() {
        Some(lit) => lit,
        None => return Err(EvalError::new("EBV of a non-literal term")),
    };
    if lit.datatype_iri() == xsd::BOOLEAN {
        // Invalid boolean lexical forms have EBV false
        return Ok(lit.as_boolean().unwrap_or(false));
    }
    if lit.is_numeric() {
        return Ok(match lit.as_float() {
            Some(n) => n != 0.0 && !n.is_nan(),
            None => false,
        });
    }
    if lit.is_string() {
        return Ok(!lit.value().is_empty());
    }
    Err(EvalError::new(format!("EBV undefined for {}", lit)))
}

/// Effective boolean value of an evaluation result; Unbound and Error
/// both surface as errors
pub fn ebv_of(evaluated: &Evaluated) -> Result<bool, EvalError> {
    match evaluated {
        Evaluated::Value(term) => ebv(term),
        Evaluated::Unbound => Err(EvalError::new("EBV of an unbound value")),
        Evaluated::Error(e) => Err(e.clone()),
    }
}

fn eval_binary(
    op: BinaryOperator,
    lhs: &Expression,
    rhs: &Expression,
    mu: &SolutionMapping,
    ctx: &EvalContext,
) -> Evaluated {
    // Three-valued logical connectives: a definite false (for &&) or
    // true (for ||) wins even when the other side errors.
    match op {
        BinaryOperator::And => {
            return match ebv_of(&eval_expr(lhs, mu, ctx)) {
                Ok(false) => Evaluated::Value(Term::boolean(false)),
                Ok(true) => match ebv_of(&eval_expr(rhs, mu, ctx)) {
                    Ok(b) => Evaluated::Value(Term::boolean(b)),
                    Err(e) => Evaluated::Error(e),
                },
                Err(e) => match ebv_of(&eval_expr(rhs, mu, ctx)) {
                    Ok(false) => Evaluated::Value(Term::boolean(false)),
                    _ => Evaluated::Error(e),
                },
            };
        }
        BinaryOperator::Or => {
            return match ebv_of(&eval_expr(lhs, mu, ctx)) {
                Ok(true) => Evaluated::Value(Term::boolean(true)),
                Ok(false) => match ebv_of(&eval_expr(rhs, mu, ctx)) {
                    Ok(b) => Evaluated::Value(Term::boolean(b)),
                    Err(e) => Evaluated::Error(e),
                },
                Err(e) => match ebv_of(&eval_expr(rhs, mu, ctx)) {
                    Ok(true) => Evaluated::Value(Term::boolean(true)),
                    _ => Evaluated::Error(e),
                },
            };
        }
        _ => {}
    }

    let left = match eval_expr(lhs, mu, ctx) {
        Evaluated::Value(t) => t,
        Evaluated::Unbound => return Evaluated::error("unbound operand"),
        err @ Evaluated::Error(_) => return err,
    };
    let right = match eval_expr(rhs, mu, ctx) {
        Evaluated::Value(t) => t,
        Evaluated::Unbound => return Evaluated::error("unbound operand"),
        err @ Evaluated::Error(_) => return err,
    };

    match op {
        BinaryOperator::Eq => wrap_bool(value_equal(&left, &right)),
        BinaryOperator::Ne => wrap_bool(value_equal(&left, &right).map(|b| !b)),
        BinaryOperator::Lt => wrap_bool(value_compare(&left, &right).map(|o| o == Ordering::Less)),
        BinaryOperator::Le => wrap_bool(value_compare(&left, &right).map(|o| o != Ordering::Greater)),
        BinaryOperator::Gt => wrap_bool(value_compare(&left, &right).map(|o| o == Ordering::Greater)),
        BinaryOperator::Ge => wrap_bool(value_compare(&left, &right).map(|o| o != Ordering::Less)),
        BinaryOperator::Add | BinaryOperator::Sub | BinaryOperator::Mul | BinaryOperator::Div => {
            match numeric_binop(op, &left, &right) {
                Ok(term) => Evaluated::Value(term),
                Err(e) => Evaluated::Error(e),
            }
        }
        BinaryOperator::And | BinaryOperator::Or => unreachable!("handled above"),
    }
}

fn wrap_bool(result: Result<bool, EvalError>) -> Evaluated {
    match result {
        Ok(b) => Evaluated::Value(Term::boolean(b)),
        Err(e) => Evaluated::Error(e),
    }
}

fn eval_unary(op: UnaryOperator, arg: &Expression, mu: &SolutionMapping, ctx: &EvalContext) -> Evaluated {
    match op {
        UnaryOperator::Not => match ebv_of(&eval_expr(arg, mu, ctx)) {
            Ok(b) => Evaluated::Value(Term::boolean(!b)),
            Err(e) => Evaluated::Error(e),
        },
        UnaryOperator::Plus | UnaryOperator::Minus => {
            let value = match eval_expr(arg, mu, ctx) {
                Evaluated::Value(t) => t,
                Evaluated::Unbound => return Evaluated::error("unbound operand"),
                err @ Evaluated::Error(_) => return err,
            };
            let n = match numeric_of(&value) {
                Some(n) => n,
                None => return Evaluated::error(format!("{} is not numeric", value)),
            };
            let n = if op == UnaryOperator::Minus { n.negated() } else { n };
            Evaluated::Value(n.into_term())
        }
    }
}

fn eval_call(name: &str, args: &[Expression], mu: &SolutionMapping, ctx: &EvalContext) -> Evaluated {
    let upper = name.to_ascii_uppercase();

    // Functional forms with non-strict argument evaluation are handled
    // here; everything else goes through the registry.
    match upper.as_str() {
        "BOUND" => {
            // The one builtin that sees bindings rather than values, and
            // never errors.
            if let [Expression::Term(TermPattern::Variable(v))] = args {
                return Evaluated::Value(Term::boolean(mu.contains(v)));
            }
            return Evaluated::Value(Term::boolean(false));
        }
        "IF" => {
            if args.len() != 3 {
                return Evaluated::error("IF expects 3 arguments");
            }
            return match ebv_of(&eval_expr(&args[0], mu, ctx)) {
                Ok(true) => eval_expr(&args[1], mu, ctx),
                Ok(false) => eval_expr(&args[2], mu, ctx),
                Err(e) => Evaluated::Error(e),
            };
        }
        "COALESCE" => {
            for arg in args {
                if let Evaluated::Value(t) = eval_expr(arg, mu, ctx) {
                    return Evaluated::Value(t);
                }
            }
            return Evaluated::error("COALESCE: no argument evaluated to a value");
        }
        "IN" | "NOT IN" => {
            if args.is_empty() {
                return Evaluated::error("IN expects a test expression");
            }
            let test = match eval_expr(&args[0], mu, ctx) {
                Evaluated::Value(t) => t,
                Evaluated::Unbound => return Evaluated::error("unbound operand"),
                err @ Evaluated::Error(_) => return err,
            };
            let mut found = false;
            for candidate in &args[1..] {
                if let Evaluated::Value(c) = eval_expr(candidate, mu, ctx) {
                    if value_equal(&test, &c).unwrap_or(false) {
                        found = true;
                        break;
                    }
                }
            }
            let result = if upper == "IN" { found } else { !found };
            return Evaluated::Value(Term::boolean(result));
        }
        _ => {}
    }

    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        match eval_expr(arg, mu, ctx) {
            Evaluated::Value(t) => values.push(t),
            Evaluated::Unbound => return Evaluated::error(format!("{}: unbound argument", upper)),
            err @ Evaluated::Error(_) => return err,
        }
    }

    match ctx.builtins.invoke(&upper, &values, ctx) {
        Ok(term) => Evaluated::Value(term),
        Err(e) => Evaluated::Error(e),
    }
}

// ===========================================================================
// Value comparison
// ===========================================================================

/// SPARQL-style value equality
///
/// IRIs and blank nodes compare by term identity; literals compare by
/// value within the numeric, boolean, string, and dateTime domains.
pub fn value_equal(a: &Term, b: &Term) -> Result<bool, EvalError> {
    if a == b {
        return Ok(true);
    }
    let (la, lb) = match (a.as_literal(), b.as_literal()) {
        (Some(la), Some(lb)) => (la, lb),
        // Different term kinds, or identical kinds already covered above
        _ => return Ok(false),
    };

    if la.is_numeric() && lb.is_numeric() {
        if let (Some(x), Some(y)) = (numeric_of(a), numeric_of(b)) {
            return Ok(x.as_f64() == y.as_f64());
        }
        return Err(EvalError::new("invalid numeric lexical form"));
    }
    if la.datatype_iri() == xsd::BOOLEAN && lb.datatype_iri() == xsd::BOOLEAN {
        return match (la.as_boolean(), lb.as_boolean()) {
            (Some(x), Some(y)) => Ok(x == y),
            _ => Err(EvalError::new("invalid boolean lexical form")),
        };
    }
    if la.datatype_iri() == xsd::DATE_TIME && lb.datatype_iri() == xsd::DATE_TIME {
        return match (parse_datetime(la.value()), parse_datetime(lb.value())) {
            (Some(x), Some(y)) => Ok(x == y),
            _ => Err(EvalError::new("invalid dateTime lexical form")),
        };
    }
    // Same datatype: term equality already failed above
    Ok(false)
}

/// SPARQL-style value ordering for the relational operators
pub fn value_compare(a: &Term, b: &Term) -> Result<Ordering, EvalError> {
    let (la, lb) = match (a.as_literal(), b.as_literal()) {
        (Some(la), Some(lb)) => (la, lb),
        _ => return Err(EvalError::new("only literals are order-comparable")),
    };

    if la.is_numeric() && lb.is_numeric() {
        let (x, y) = match (numeric_of(a), numeric_of(b)) {
            (Some(x), Some(y)) => (x.as_f64(), y.as_f64()),
            _ => return Err(EvalError::new("invalid numeric lexical form")),
        };
        return x
            .partial_cmp(&y)
            .ok_or_else(|| EvalError::new("NaN is not order-comparable"));
    }
    if la.is_string() && lb.is_string() {
        return Ok(la.value().cmp(lb.value()));
    }
    if la.datatype_iri() == xsd::BOOLEAN && lb.datatype_iri() == xsd::BOOLEAN {
        return match (la.as_boolean(), lb.as_boolean()) {
            (Some(x), Some(y)) => Ok(x.cmp(&y)),
            _ => Err(EvalError::new("invalid boolean lexical form")),
        };
    }
    if la.datatype_iri() == xsd::DATE_TIME && lb.datatype_iri() == xsd::DATE_TIME {
        return match (parse_datetime(la.value()), parse_datetime(lb.value())) {
            (Some(x), Some(y)) => Ok(x.cmp(&y)),
            _ => Err(EvalError::new("invalid dateTime lexical form")),
        };
    }
    Err(EvalError::new(format!("{} and {} are not comparable", a, b)))
}

// ===========================================================================
// Numerics
// ===========================================================================

/// Position in the numeric promotion lattice: integer < decimal < float < double
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum NumericKind {
    Integer,
    Decimal,
    Float,
    Double,
}

/// A numeric value paired with its promotion kind
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Numeric {
    Integer(i64),
    Decimal(f64),
    Float(f64),
    Double(f64),
}

impl Numeric {
    pub(crate) fn kind(&self) -> NumericKind {
        match self {
            Numeric::Integer(_) => NumericKind::Integer,
            Numeric::Decimal(_) => NumericKind::Decimal,
            Numeric::Float(_) => NumericKind::Float,
            Numeric::Double(_) => NumericKind::Double,
        }
    }

    pub(crate) fn as_f64(&self) -> f64 {
        match *self {
            Numeric::Integer(n) => n as f64,
            Numeric::Decimal(n) | Numeric::Float(n) | Numeric::Double(n) => n,
        }
    }

    pub(crate) fn negated(self) -> Numeric {
        match self {
            Numeric::Integer(n) => Numeric::Integer(-n),
            Numeric::Decimal(n) => Numeric::Decimal(-n),
            Numeric::Float(n) => Numeric::Float(-n),
            Numeric::Double(n) => Numeric::Double(-n),
        }
    }

    pub(crate) fn from_f64(kind: NumericKind, value: f64) -> Numeric {
        match kind {
            NumericKind::Integer => Numeric::Decimal(value),
            NumericKind::Decimal => Numeric::Decimal(value),
            NumericKind::Float => Numeric::Float(value),
            NumericKind::Double => Numeric::Double(value),
        }
    }

    /// Render as a typed literal term
    pub(crate) fn into_term(self) -> Term {
        match self {
            Numeric::Integer(n) => Term::typed_literal(n.to_string(), xsd::INTEGER),
            Numeric::Decimal(n) => Term::typed_literal(n.to_string(), xsd::DECIMAL),
            Numeric::Float(n) => Term::typed_literal(n.to_string(), xsd::FLOAT),
            Numeric::Double(n) => Term::typed_literal(n.to_string(), xsd::DOUBLE),
        }
    }
}

/// Read a numeric value out of a term, if it is a numeric literal with a
/// valid lexical form
pub(crate) fn numeric_of(term: &Term) -> Option<Numeric> {
    let lit = term.as_literal()?;
    if !lit.is_numeric() {
        return None;
    }
    match lit.datatype_iri() {
        xsd::DOUBLE => lit.as_float().map(Numeric::Double),
        xsd::FLOAT => lit.as_float().map(Numeric::Float),
        xsd::DECIMAL => lit.as_float().map(Numeric::Decimal),
        // The integer family
        _ => lit.as_integer().map(Numeric::Integer),
    }
}

fn numeric_binop(op: BinaryOperator, left: &Term, right: &Term) -> Result<Term, EvalError> {
    let a = numeric_of(left)
        .ok_or_else(|| EvalError::new(format!("{} is not numeric", left)))?;
    let b = numeric_of(right)
        .ok_or_else(|| EvalError::new(format!("{} is not numeric", right)))?;

    let kind = a.kind().max(b.kind());

    // Integer arithmetic stays exact except for division, which promotes
    // to decimal.
    if kind == NumericKind::Integer && op != BinaryOperator::Div {
        if let (Numeric::Integer(x), Numeric::Integer(y)) = (a, b) {
            let result = match op {
                BinaryOperator::Add => x.checked_add(y),
                BinaryOperator::Sub => x.checked_sub(y),
                BinaryOperator::Mul => x.checked_mul(y),
                _ => unreachable!(),
            };
            return result
                .map(|n| Numeric::Integer(n).into_term())
                .ok_or_else(|| EvalError::new("integer overflow"));
        }
    }

    let x = a.as_f64();
    let y = b.as_f64();
    let value = match op {
        BinaryOperator::Add => x + y,
        BinaryOperator::Sub => x - y,
        BinaryOperator::Mul => x * y,
        BinaryOperator::Div => {
            if y == 0.0 && kind <= NumericKind::Decimal {
                return Err(EvalError::new("division by zero"));
            }
            x / y
        }
        _ => unreachable!(),
    };
    Ok(Numeric::from_f64(kind, value).into_term())
}

// ===========================================================================
// dateTime support
// ===========================================================================

/// Parse an `xsd:dateTime` lexical form; timezone-less forms are read as UTC
pub(crate) fn parse_datetime(s: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive).fixed_offset())
}

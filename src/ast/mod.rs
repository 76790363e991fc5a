//! Rule set abstract syntax
//!
//! The parser (a collaborator of this crate) produces an immutable
//! [`RuleSet`]: a prologue of resolved prefixes, a list of rules whose
//! bodies are graph patterns and whose heads are triple templates, plus
//! optional data blocks and predicate declarations. Everything here is
//! plain data; evaluation semantics live in [`crate::engine`].

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::term::{Iri, Literal, Variable};

/// A slot in a triple pattern, triple template, or expression leaf
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TermPattern {
    /// A concrete IRI
    Iri(Iri),
    /// A concrete literal
    Literal(Literal),
    /// A blank node label; pattern-scoped variable in bodies, fresh-node
    /// marker in heads
    Blank(String),
    /// A variable
    Variable(Variable),
}

impl TermPattern {
    /// Create an IRI slot
    pub fn iri(s: impl Into<String>) -> Self {
        TermPattern::Iri(Iri::new(s))
    }

    /// Create a simple literal slot
    pub fn literal(s: impl Into<String>) -> Self {
        TermPattern::Literal(Literal::plain(s))
    }

    /// Create a typed literal slot
    pub fn typed_literal(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        TermPattern::Literal(Literal::typed(value, datatype))
    }

    /// Create an `xsd:integer` literal slot
    pub fn integer(value: i64) -> Self {
        TermPattern::Literal(Literal::integer(value))
    }

    /// Create an `xsd:boolean` literal slot
    pub fn boolean(value: bool) -> Self {
        TermPattern::Literal(Literal::boolean(value))
    }

    /// Create a blank node slot
    pub fn blank(label: impl Into<String>) -> Self {
        TermPattern::Blank(label.into())
    }

    /// Create a variable slot
    pub fn var(name: impl Into<String>) -> Self {
        TermPattern::Variable(Variable::new(name))
    }

    /// Get the variable if this slot is one
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            TermPattern::Variable(v) => Some(v),
            _ => None,
        }
    }

    /// Check if this slot is concrete (not a variable or blank label)
    pub fn is_concrete(&self) -> bool {
        matches!(self, TermPattern::Iri(_) | TermPattern::Literal(_))
    }
}

impl fmt::Display for TermPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TermPattern::Iri(iri) => write!(f, "{}", iri),
            TermPattern::Literal(lit) => write!(f, "{}", lit),
            TermPattern::Blank(label) => write!(f, "_:{}", label),
            TermPattern::Variable(v) => write!(f, "{}", v),
        }
    }
}

/// A triple pattern (body) or triple template (head)
///
/// The same shape serves both positions; the well-formedness validator
/// enforces the positional constraints that differ between them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriplePattern {
    pub subject: TermPattern,
    pub predicate: TermPattern,
    pub object: TermPattern,
}

impl TriplePattern {
    pub fn new(subject: TermPattern, predicate: TermPattern, object: TermPattern) -> Self {
        TriplePattern { subject, predicate, object }
    }

    /// Iterate over the three slots in subject, predicate, object order
    pub fn slots(&self) -> impl Iterator<Item = &TermPattern> {
        [&self.subject, &self.predicate, &self.object].into_iter()
    }
}

impl fmt::Display for TriplePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

/// Binary operators for expressions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOperator {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Or => "||",
            BinaryOperator::And => "&&",
            BinaryOperator::Eq => "=",
            BinaryOperator::Ne => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Gt => ">",
            BinaryOperator::Le => "<=",
            BinaryOperator::Ge => ">=",
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
        }
    }
}

/// Unary operators for expressions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOperator {
    Not,
    Plus,
    Minus,
}

impl UnaryOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOperator::Not => "!",
            UnaryOperator::Plus => "+",
            UnaryOperator::Minus => "-",
        }
    }
}

/// An expression tree evaluated against a solution mapping
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expression {
    /// A constant term or variable reference
    Term(TermPattern),
    /// A binary operation
    Binary(BinaryOperator, Box<Expression>, Box<Expression>),
    /// A unary operation
    Unary(UnaryOperator, Box<Expression>),
    /// A call to a named built-in function
    Call(String, Vec<Expression>),
}

impl Expression {
    /// Create a variable reference
    pub fn var(name: impl Into<String>) -> Self {
        Expression::Term(TermPattern::var(name))
    }

    /// Create an IRI constant
    pub fn iri(s: impl Into<String>) -> Self {
        Expression::Term(TermPattern::iri(s))
    }

    /// Create a simple literal constant
    pub fn literal(s: impl Into<String>) -> Self {
        Expression::Term(TermPattern::literal(s))
    }

    /// Create an `xsd:integer` constant
    pub fn integer(value: i64) -> Self {
        Expression::Term(TermPattern::integer(value))
    }

    /// Create a binary operation
    pub fn binary(op: BinaryOperator, lhs: Expression, rhs: Expression) -> Self {
        Expression::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    /// Create a unary operation
    pub fn unary(op: UnaryOperator, arg: Expression) -> Self {
        Expression::Unary(op, Box::new(arg))
    }

    /// Create a built-in call
    pub fn call(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::Call(name.into(), args)
    }

    /// Collect every variable referenced by this expression
    pub fn variables(&self) -> Vec<Variable> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut Vec<Variable>) {
        match self {
            Expression::Term(TermPattern::Variable(v)) => {
                if !out.contains(v) {
                    out.push(v.clone());
                }
            }
            Expression::Term(_) => {}
            Expression::Binary(_, lhs, rhs) => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
            Expression::Unary(_, arg) => arg.collect_variables(out),
            Expression::Call(_, args) => {
                for arg in args {
                    arg.collect_variables(out);
                }
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Term(t) => write!(f, "{}", t),
            Expression::Binary(op, lhs, rhs) => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Expression::Unary(op, arg) => write!(f, "{}({})", op.symbol(), arg),
            Expression::Call(name, args) => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// One element of a rule body, evaluated left to right
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyElement {
    /// A triple pattern joined against the working graph
    Pattern(TriplePattern),
    /// A FILTER over the current solution multiset
    Filter(Expression),
    /// A BIND extending each mapping with a computed value
    Bind(Variable, Expression),
    /// A NOT sub-pattern removed by anti-join
    Not(Vec<BodyElement>),
}

impl fmt::Display for BodyElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyElement::Pattern(p) => write!(f, "{}", p),
            BodyElement::Filter(e) => write!(f, "FILTER ({})", e),
            BodyElement::Bind(v, e) => write!(f, "BIND ({} AS {})", e, v),
            BodyElement::Not(body) => {
                write!(f, "NOT {{")?;
                for el in body {
                    write!(f, " {}", el)?;
                }
                write!(f, " }}")
            }
        }
    }
}

/// A rule: head templates derived whenever the body matches
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Name for diagnostics (optional)
    pub name: Option<String>,
    /// Head: non-empty list of triple templates
    pub head: Vec<TriplePattern>,
    /// Body: non-empty sequence of body elements
    pub body: Vec<BodyElement>,
}

impl Rule {
    /// Create a new anonymous rule
    pub fn new(head: Vec<TriplePattern>, body: Vec<BodyElement>) -> Self {
        Rule { name: None, head, body }
    }

    /// Create a named rule
    pub fn named(name: impl Into<String>, head: Vec<TriplePattern>, body: Vec<BodyElement>) -> Self {
        Rule {
            name: Some(name.into()),
            head,
            body,
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RULE {{")?;
        for t in &self.head {
            write!(f, " {}", t)?;
        }
        write!(f, " }} WHERE {{")?;
        for el in &self.body {
            write!(f, " {}", el)?;
        }
        write!(f, " }}")
    }
}

/// A block of ground triples asserted before evaluation
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataBlock {
    pub triples: Vec<TriplePattern>,
}

impl DataBlock {
    pub fn new(triples: Vec<TriplePattern>) -> Self {
        DataBlock { triples }
    }
}

/// A predicate property declaration, desugared into rules by the engine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Declaration {
    /// `TRANSITIVE(p)`
    Transitive(Iri),
    /// `SYMMETRIC(p)`
    Symmetric(Iri),
    /// `INVERSE(p, q)`
    Inverse(Iri, Iri),
}

/// A complete rule set as produced by the parser
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RuleSet {
    /// Base IRI, if declared
    pub base: Option<Iri>,
    /// Prefix label to IRI mapping (informational; rules carry resolved IRIs)
    pub prefixes: IndexMap<String, Iri>,
    /// The rules, in authored order
    pub rules: Vec<Rule>,
    /// Ground facts asserted before stratum 0 runs
    pub data: Vec<DataBlock>,
    /// Predicate declarations desugared at engine construction
    pub declarations: Vec<Declaration>,
}

impl RuleSet {
    /// Create a rule set holding only rules
    pub fn from_rules(rules: Vec<Rule>) -> Self {
        RuleSet { rules, ..Default::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_variables() {
        let expr = Expression::call(
            "CONCAT",
            vec![
                Expression::var("f"),
                Expression::literal(" "),
                Expression::var("l"),
            ],
        );
        let vars = expr.variables();
        assert_eq!(vars, vec![Variable::new("f"), Variable::new("l")]);
    }

    #[test]
    fn test_rule_display() {
        let rule = Rule::new(
            vec![TriplePattern::new(
                TermPattern::var("x"),
                TermPattern::iri("http://example.org/ancestor"),
                TermPattern::var("y"),
            )],
            vec![BodyElement::Pattern(TriplePattern::new(
                TermPattern::var("x"),
                TermPattern::iri("http://example.org/parent"),
                TermPattern::var("y"),
            ))],
        );
        let text = format!("{}", rule);
        assert!(text.starts_with("RULE {"));
        assert!(text.contains("WHERE {"));
    }

    #[test]
    fn test_slot_predicates() {
        assert!(TermPattern::iri("http://example.org/p").is_concrete());
        assert!(!TermPattern::var("x").is_concrete());
        assert!(!TermPattern::blank("b").is_concrete());
    }
}

//! RDF term representations
//!
//! This module defines the ground data types the engine derives over:
//! - IRIs (named nodes)
//! - Literals (with optional language tag or datatype)
//! - Blank nodes (anonymous nodes)
//! - Triples over those terms
//!
//! Variables live alongside them because solution mappings and rule
//! patterns refer to terms and variables with the same machinery, but a
//! [`Term`] itself is always ground.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub mod ns;

mod blank;
mod iri;
mod literal;
mod variable;

pub use blank::BlankNode;
pub use iri::Iri;
pub use literal::{Datatype, Literal};
pub use variable::Variable;

/// A ground RDF term
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    /// An IRI reference (named node)
    Iri(Arc<Iri>),
    /// A literal value
    Literal(Arc<Literal>),
    /// A blank node
    Blank(BlankNode),
}

impl Term {
    /// Create an IRI term
    pub fn iri(s: impl Into<String>) -> Self {
        Term::Iri(Arc::new(Iri::new(s)))
    }

    /// Create a simple literal term
    pub fn literal(s: impl Into<String>) -> Self {
        Term::Literal(Arc::new(Literal::plain(s)))
    }

    /// Create a typed literal term
    pub fn typed_literal(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal(Arc::new(Literal::typed(value, datatype)))
    }

    /// Create a language-tagged literal term
    pub fn lang_literal(value: impl Into<String>, lang: impl Into<String>) -> Self {
        Term::Literal(Arc::new(Literal::with_language(value, lang)))
    }

    /// Create an `xsd:boolean` literal term
    pub fn boolean(value: bool) -> Self {
        Term::Literal(Arc::new(Literal::boolean(value)))
    }

    /// Create an `xsd:integer` literal term
    pub fn integer(value: i64) -> Self {
        Term::Literal(Arc::new(Literal::integer(value)))
    }

    /// Create an `xsd:double` literal term
    pub fn double(value: f64) -> Self {
        Term::Literal(Arc::new(Literal::double(value)))
    }

    /// Create a blank node term with an explicit identifier
    pub fn blank(id: impl Into<String>) -> Self {
        Term::Blank(BlankNode::labeled(id))
    }

    /// Create a fresh blank node term
    pub fn fresh_blank() -> Self {
        Term::Blank(BlankNode::fresh())
    }

    /// Check if this term is an IRI
    pub fn is_iri(&self) -> bool {
        matches!(self, Term::Iri(_))
    }

    /// Check if this term is a literal
    pub fn is_literal(&self) -> bool {
        matches!(self, Term::Literal(_))
    }

    /// Check if this term is a blank node
    pub fn is_blank(&self) -> bool {
        matches!(self, Term::Blank(_))
    }

    /// Get the IRI if this is an IRI term
    pub fn as_iri(&self) -> Option<&Iri> {
        match self {
            Term::Iri(iri) => Some(iri),
            _ => None,
        }
    }

    /// Get the literal if this is a literal term
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Term::Literal(lit) => Some(lit),
            _ => None,
        }
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "{:?}", iri),
            Term::Literal(lit) => write!(f, "{:?}", lit),
            Term::Blank(b) => write!(f, "{:?}", b),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "{}", iri),
            Term::Literal(lit) => write!(f, "{}", lit),
            Term::Blank(b) => write!(f, "{}", b),
        }
    }
}

/// A triple (statement) over ground terms
///
/// The predicate must be an IRI and the subject an IRI or blank node;
/// construction sites that cannot guarantee this validate first (see
/// head instantiation).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Triple { subject, predicate, object }
    }

    /// Check the positional constraints: IRI-or-blank subject, IRI predicate
    pub fn is_well_formed(&self) -> bool {
        !self.subject.is_literal() && self.predicate.is_iri()
    }
}

impl fmt::Debug for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {:?} {:?} .", self.subject, self.predicate, self.object)
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_creation() {
        let iri = Term::iri("http://example.org/foo");
        assert!(iri.is_iri());

        let lit = Term::literal("hello");
        assert!(lit.is_literal());

        let blank = Term::blank("b1");
        assert!(blank.is_blank());
    }

    #[test]
    fn test_literal_equality_needs_all_components() {
        assert_eq!(Term::literal("a"), Term::literal("a"));
        assert_ne!(Term::literal("a"), Term::lang_literal("a", "en"));
        assert_ne!(
            Term::typed_literal("1", ns::xsd::INTEGER),
            Term::typed_literal("1", ns::xsd::DECIMAL)
        );
    }

    #[test]
    fn test_triple_well_formedness() {
        let good = Triple::new(
            Term::iri("http://example.org/s"),
            Term::iri("http://example.org/p"),
            Term::literal("o"),
        );
        assert!(good.is_well_formed());

        let bad_subject = Triple::new(
            Term::literal("s"),
            Term::iri("http://example.org/p"),
            Term::literal("o"),
        );
        assert!(!bad_subject.is_well_formed());

        let bad_predicate = Triple::new(
            Term::iri("http://example.org/s"),
            Term::blank("p"),
            Term::literal("o"),
        );
        assert!(!bad_predicate.is_well_formed());
    }
}

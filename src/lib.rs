//! SRL - Shape Rule Language engine
//!
//! A rule-based RDF reasoner: rules whose bodies are graph patterns and
//! whose heads are triple templates derive new triples from an input
//! graph until a fixed point is reached.
//!
//! # Architecture
//!
//! The crate is a short pipeline over an immutable rule set and a
//! mutable working graph:
//!
//! - [`term`] - the ground RDF term model (IRIs, literals, blank nodes)
//! - [`ast`] - the rule set abstract syntax consumed from a parser
//! - [`graph`] - an indexed in-memory triple set
//! - [`engine`] - solution mappings, expression evaluation, the built-in
//!   registry, stratification, and the fixpoint driver
//!
//! # Features
//!
//! - Pattern matching with joins, FILTER, BIND, and stratified NOT
//! - SPARQL-style expression semantics with effective boolean values and
//!   a registry of 40+ built-in functions
//! - Predicate-level stratification with safe-negation checking
//! - Semi-naive-style fixpoint iteration with snapshot visibility
//! - Deterministic Skolem blank nodes for existential rule heads
//! - Iteration and derived-triple budgets, statistics, diagnostics, and
//!   provenance tracking
//!
//! # Example
//!
//! ```rust
//! use srl::{evaluate_rules, BodyElement, Graph, Rule, RuleSet, Term, TermPattern, Triple, TriplePattern};
//!
//! // ?x ex:parent ?y  =>  ?x ex:ancestor ?y
//! let rule = Rule::new(
//!     vec![TriplePattern::new(
//!         TermPattern::var("x"),
//!         TermPattern::iri("http://example.org/ancestor"),
//!         TermPattern::var("y"),
//!     )],
//!     vec![BodyElement::Pattern(TriplePattern::new(
//!         TermPattern::var("x"),
//!         TermPattern::iri("http://example.org/parent"),
//!         TermPattern::var("y"),
//!     ))],
//! );
//!
//! let mut graph = Graph::new();
//! graph.insert(Triple::new(
//!     Term::iri("http://example.org/alice"),
//!     Term::iri("http://example.org/parent"),
//!     Term::iri("http://example.org/bob"),
//! ));
//!
//! let stats = evaluate_rules(&RuleSet::from_rules(vec![rule]), &mut graph).unwrap();
//! assert_eq!(stats.triples_derived, 1);
//! ```

pub mod ast;
pub mod engine;
pub mod error;
pub mod graph;
pub mod term;

// Re-export term types
pub use term::{BlankNode, Datatype, Iri, Literal, Term, Triple, Variable};

// Re-export AST types
pub use ast::{
    BinaryOperator, BodyElement, DataBlock, Declaration, Expression, Rule, RuleSet, TermPattern,
    TriplePattern, UnaryOperator,
};

// Re-export the graph
pub use graph::Graph;

// Re-export engine types
pub use engine::builtins::BuiltinRegistry;
pub use engine::expressions::{ebv, eval_expr, EvalContext, EvalError, Evaluated};
pub use engine::solutions::SolutionMapping;
pub use engine::stratification::Stratification;
pub use engine::{
    evaluate_rules, Diagnostic, EngineConfig, EvalOutput, EvalStats, Provenance, ProvenanceRecord,
    RuleEngine, RuleEngineBuilder, StratumStats,
};

// Re-export error types
pub use error::{ErrorCode, SrlError, SrlResult};

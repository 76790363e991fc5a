//! The rule evaluation engine
//!
//! Drives a stratified rule set to fixpoint over a working graph:
//!
//! 1. Well-formedness validation and stratification (cached per engine)
//! 2. Per stratum, semi-naive-style iteration: every rule is evaluated
//!    against a frozen snapshot of the graph, the delta of genuinely new
//!    triples is computed, and only then merged, so all rules in a round
//!    see the same state
//! 3. Head instantiation with deterministic Skolem blank nodes, so a
//!    repeated derivation reproduces the same node instead of minting a
//!    fresh one forever
//!
//! The engine owns no persistent state; callers hand in a graph and get
//! back statistics, diagnostics, and (optionally) provenance records.

pub mod builtins;
pub mod expressions;
pub mod rules;
pub mod solutions;
pub mod stratification;

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fnv::{FnvHashMap, FnvHashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::ast::{BodyElement, Declaration, Rule, RuleSet, TermPattern, TriplePattern};
use crate::error::{ErrorCode, SrlError, SrlResult};
use crate::graph::Graph;
use crate::term::{Term, Triple};

use builtins::BuiltinRegistry;
use expressions::EvalContext;
use rules::eval_rule_body;
use solutions::SolutionMapping;
use stratification::{stratify, validate_rules, Stratification};

/// Engine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum fixpoint iterations per stratum (0 = unlimited)
    pub max_iterations: usize,
    /// Maximum derived triples across the whole evaluation (0 = unlimited)
    pub max_derived: usize,
    /// Record which rule derived each triple, in which stratum and iteration
    pub track_provenance: bool,
    /// Fixed clock for NOW(); defaults to the wall clock, captured once
    /// per fixpoint iteration
    pub clock: Option<DateTime<Utc>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_iterations: 1000,
            max_derived: 0,
            track_provenance: false,
            clock: None,
        }
    }
}

/// Per-stratum fixpoint statistics
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StratumStats {
    /// Fixpoint rounds run (the final, empty-delta round included)
    pub iterations: usize,
    /// Triples derived in this stratum
    pub derived: usize,
}

/// Evaluation statistics
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EvalStats {
    /// One entry per stratum, in evaluation order
    pub strata: Vec<StratumStats>,
    /// Total derived triples
    pub triples_derived: usize,
    /// Wall-clock time spent in evaluation
    pub elapsed: Duration,
}

/// A non-fatal issue recorded during evaluation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub message: String,
    /// Name or index of the rule involved
    pub rule: Option<String>,
}

/// Where a derived triple came from
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub triple: Triple,
    pub rule_index: usize,
    pub stratum: usize,
    pub iteration: usize,
}

/// Provenance of an evaluation run
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Provenance {
    pub records: Vec<ProvenanceRecord>,
}

/// Result of a copy-mode evaluation
#[derive(Debug)]
pub struct EvalOutput {
    pub graph: Graph,
    pub stats: EvalStats,
    pub diagnostics: Vec<Diagnostic>,
}

/// The rule engine
///
/// Construction desugars predicate declarations into ordinary rules and
/// materializes data blocks; stratification is computed lazily and
/// cached for the lifetime of the engine.
#[derive(Debug)]
pub struct RuleEngine {
    rules: Vec<Rule>,
    data: Vec<Triple>,
    config: EngineConfig,
    builtins: BuiltinRegistry,
    strata: Option<Stratification>,
    stats: EvalStats,
    diagnostics: Vec<Diagnostic>,
    provenance: Option<Provenance>,
}

impl RuleEngine {
    /// Create an engine with the default configuration
    pub fn new(rule_set: &RuleSet) -> SrlResult<Self> {
        Self::with_config(rule_set, EngineConfig::default())
    }

    /// Create an engine with a custom configuration
    pub fn with_config(rule_set: &RuleSet, config: EngineConfig) -> SrlResult<Self> {
        let mut rules = rule_set.rules.clone();
        rules.extend(rule_set.declarations.iter().flat_map(desugar_declaration));

        let mut data = Vec::new();
        for block in &rule_set.data {
            materialize_data_block(block, &mut data)?;
        }

        Ok(RuleEngine {
            rules,
            data,
            config,
            builtins: BuiltinRegistry::new(),
            strata: None,
            stats: EvalStats::default(),
            diagnostics: Vec::new(),
            provenance: None,
        })
    }

    /// Start building an engine with a fluent configuration
    pub fn builder() -> RuleEngineBuilder {
        RuleEngineBuilder::default()
    }

    /// Validate and stratify the rule set, caching the result
    pub fn stratify(&mut self) -> SrlResult<&Stratification> {
        if self.strata.is_none() {
            validate_rules(&self.rules)?;
            self.strata = Some(stratify(&self.rules)?);
        }
        Ok(self.strata.as_ref().unwrap())
    }

    /// Evaluate the rule set against a graph, mutating it in place
    ///
    /// On budget exhaustion the graph holds the partial result and the
    /// error carries the counters; [`RuleEngine::stats`] stays valid.
    pub fn evaluate(&mut self, graph: &mut Graph) -> SrlResult<&EvalStats> {
        let strata = self.stratify()?.clone();

        let mut stats = EvalStats::default();
        let mut diagnostics = Vec::new();
        let mut provenance = self.config.track_provenance.then(Provenance::default);

        let started = Instant::now();
        graph.extend(self.data.iter().cloned());
        let result = run_fixpoint(
            &self.rules,
            &self.builtins,
            &self.config,
            &strata,
            graph,
            &mut stats,
            &mut diagnostics,
            provenance.as_mut(),
        );
        stats.elapsed = started.elapsed();

        self.stats = stats;
        self.diagnostics = diagnostics;
        self.provenance = provenance;

        result?;
        Ok(&self.stats)
    }

    /// Evaluate without mutating the input: returns input plus derivations
    pub fn evaluate_new(&mut self, graph: &Graph) -> SrlResult<EvalOutput> {
        let mut working = graph.clone();
        self.evaluate(&mut working)?;
        Ok(EvalOutput {
            graph: working,
            stats: self.stats.clone(),
            diagnostics: self.diagnostics.clone(),
        })
    }

    /// Evaluate and return only the derived triples
    pub fn derived_only(&mut self, graph: &Graph) -> SrlResult<Graph> {
        let output = self.evaluate_new(graph)?;
        Ok(output.graph.difference(graph))
    }

    /// Statistics of the most recent evaluation
    pub fn stats(&self) -> &EvalStats {
        &self.stats
    }

    /// Diagnostics of the most recent evaluation
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Provenance of the most recent evaluation, if tracking was enabled
    pub fn provenance(&self) -> Option<&Provenance> {
        self.provenance.as_ref()
    }

    /// Take ownership of the provenance records
    pub fn take_provenance(&mut self) -> Option<Provenance> {
        self.provenance.take()
    }

    /// The rules the engine evaluates (including desugared declarations)
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// The built-in registry
    pub fn builtins(&self) -> &BuiltinRegistry {
        &self.builtins
    }
}

/// Fluent engine construction
///
/// ```ignore
/// let engine = RuleEngine::builder()
///     .max_iterations(50)
///     .track_provenance(true)
///     .build(&rule_set)?;
/// ```
#[derive(Clone, Debug, Default)]
pub struct RuleEngineBuilder {
    config: EngineConfig,
}

impl RuleEngineBuilder {
    /// Cap fixpoint iterations per stratum
    pub fn max_iterations(mut self, limit: usize) -> Self {
        self.config.max_iterations = limit;
        self
    }

    /// Cap total derived triples
    pub fn max_derived(mut self, limit: usize) -> Self {
        self.config.max_derived = limit;
        self
    }

    /// Enable provenance tracking
    pub fn track_provenance(mut self, enabled: bool) -> Self {
        self.config.track_provenance = enabled;
        self
    }

    /// Pin NOW() to a fixed instant
    pub fn clock(mut self, now: DateTime<Utc>) -> Self {
        self.config.clock = Some(now);
        self
    }

    /// Build the engine
    pub fn build(self, rule_set: &RuleSet) -> SrlResult<RuleEngine> {
        RuleEngine::with_config(rule_set, self.config)
    }
}

/// Convenience entry point: evaluate a rule set in place with defaults
pub fn evaluate_rules(rule_set: &RuleSet, graph: &mut Graph) -> SrlResult<EvalStats> {
    let mut engine = RuleEngine::new(rule_set)?;
    engine.evaluate(graph)?;
    Ok(engine.stats().clone())
}

// ===========================================================================
// Fixpoint driver
// ===========================================================================

#[allow(clippy::too_many_arguments)]
fn run_fixpoint(
    rules: &[Rule],
    builtins: &BuiltinRegistry,
    config: &EngineConfig,
    strata: &Stratification,
    graph: &mut Graph,
    stats: &mut EvalStats,
    diagnostics: &mut Vec<Diagnostic>,
    mut provenance: Option<&mut Provenance>,
) -> SrlResult<()> {
    let mut total_derived = 0usize;
    // An ill-formed head triple is diagnosed once, not once per round
    let mut diagnosed: FnvHashSet<Triple> = FnvHashSet::default();

    for (stratum_index, rule_indices) in strata.strata.iter().enumerate() {
        let mut stratum_stats = StratumStats::default();

        loop {
            if config.max_iterations > 0 && stratum_stats.iterations >= config.max_iterations {
                stats.strata.push(stratum_stats);
                stats.triples_derived = total_derived;
                return Err(SrlError::budget_exhausted(
                    "stratum did not reach a fixpoint within the iteration budget",
                )
                .with_field("stratum", stratum_index)
                .with_field("iterations", config.max_iterations)
                .with_field("derived", total_derived));
            }
            stratum_stats.iterations += 1;

            // NOW() is captured once per iteration so every rule in the
            // round sees the same instant.
            let now = config.clock.unwrap_or_else(Utc::now);
            let ctx = EvalContext::new(builtins, now);

            // All rules evaluate against the same snapshot; the delta
            // lands only after the round completes.
            let mut delta: Vec<(Triple, usize)> = Vec::new();
            let mut delta_seen: FnvHashSet<Triple> = FnvHashSet::default();

            for &rule_index in rule_indices {
                let rule = &rules[rule_index];
                let omega = eval_rule_body(&rule.body, graph, &ctx)?;

                for mu in &omega {
                    let mut skolems: FnvHashMap<&str, Term> = FnvHashMap::default();
                    for template in &rule.head {
                        let triple =
                            match instantiate_template(template, mu, rule_index, &mut skolems) {
                                Some(t) => t,
                                // An unbound head variable skips this
                                // template but not its siblings
                                None => continue,
                            };
                        if !triple.is_well_formed() {
                            if diagnosed.insert(triple.clone()) {
                                diagnostics.push(Diagnostic {
                                    code: ErrorCode::InvalidTripleConstruction,
                                    message: format!("discarded ill-formed triple {}", triple),
                                    rule: Some(
                                        rule.name.clone().unwrap_or_else(|| rule_index.to_string()),
                                    ),
                                });
                            }
                            continue;
                        }
                        if !graph.contains(&triple) && !delta_seen.contains(&triple) {
                            delta_seen.insert(triple.clone());
                            delta.push((triple, rule_index));
                        }
                    }
                }
            }

            if delta.is_empty() {
                break;
            }

            trace!(
                stratum = stratum_index,
                iteration = stratum_stats.iterations,
                new_triples = delta.len(),
                "fixpoint round"
            );

            for (triple, rule_index) in delta {
                if let Some(prov) = provenance.as_deref_mut() {
                    prov.records.push(ProvenanceRecord {
                        triple: triple.clone(),
                        rule_index,
                        stratum: stratum_index,
                        iteration: stratum_stats.iterations,
                    });
                }
                graph.insert(triple);
                total_derived += 1;
                stratum_stats.derived += 1;

                if config.max_derived > 0 && total_derived > config.max_derived {
                    stats.strata.push(stratum_stats);
                    stats.triples_derived = total_derived;
                    return Err(SrlError::budget_exhausted(
                        "derived-triple budget exceeded",
                    )
                    .with_field("stratum", stratum_index)
                    .with_field("max_derived", config.max_derived));
                }
            }
        }

        debug!(
            stratum = stratum_index,
            iterations = stratum_stats.iterations,
            derived = stratum_stats.derived,
            "stratum converged"
        );
        stats.strata.push(stratum_stats);
    }

    stats.triples_derived = total_derived;
    Ok(())
}

// ===========================================================================
// Head instantiation
// ===========================================================================

/// Substitute a head template under one solution mapping
///
/// Returns `None` when a head variable is unbound (the template is
/// skipped for this mapping). Head blank-node labels resolve through the
/// per-mapping Skolem table: same label, same node; distinct mappings,
/// distinct nodes; and the same mapping in a later iteration reproduces
/// the same node, which is what makes recursive existential rules reach
/// a fixpoint.
fn instantiate_template<'a>(
    template: &'a TriplePattern,
    mu: &SolutionMapping,
    rule_index: usize,
    skolems: &mut FnvHashMap<&'a str, Term>,
) -> Option<Triple> {
    let mut resolve = |slot: &'a TermPattern| -> Option<Term> {
        match slot {
            TermPattern::Variable(v) => mu.get(v).cloned(),
            TermPattern::Iri(iri) => Some(Term::iri(iri.as_str())),
            TermPattern::Literal(lit) => Some(Term::Literal(std::sync::Arc::new(lit.clone()))),
            TermPattern::Blank(label) => Some(
                skolems
                    .entry(label.as_str())
                    .or_insert_with(|| Term::blank(skolem_id(rule_index, label, mu)))
                    .clone(),
            ),
        }
    };

    let subject = resolve(&template.subject)?;
    let predicate = resolve(&template.predicate)?;
    let object = resolve(&template.object)?;
    Some(Triple::new(subject, predicate, object))
}

/// Deterministic Skolem identifier for (rule, head label, mapping)
fn skolem_id(rule_index: usize, label: &str, mu: &SolutionMapping) -> String {
    use std::hash::{Hash, Hasher};

    let mut hasher = fnv::FnvHasher::default();
    // Bindings iterate in variable order, so the digest is stable for
    // equal mappings.
    for (var, term) in mu.iter() {
        var.hash(&mut hasher);
        term.hash(&mut hasher);
    }
    format!("sk{}_{}_{:016x}", rule_index, label, hasher.finish())
}

// ===========================================================================
// Rule-set desugaring
// ===========================================================================

fn desugar_declaration(declaration: &Declaration) -> Vec<Rule> {
    let pattern = |s: &str, p: &crate::term::Iri, o: &str| {
        TriplePattern::new(TermPattern::var(s), TermPattern::Iri(p.clone()), TermPattern::var(o))
    };

    match declaration {
        Declaration::Transitive(p) => vec![Rule::named(
            format!("transitive({})", p.local_name()),
            vec![pattern("x", p, "z")],
            vec![
                BodyElement::Pattern(pattern("x", p, "y")),
                BodyElement::Pattern(pattern("y", p, "z")),
            ],
        )],
        Declaration::Symmetric(p) => vec![Rule::named(
            format!("symmetric({})", p.local_name()),
            vec![pattern("y", p, "x")],
            vec![BodyElement::Pattern(pattern("x", p, "y"))],
        )],
        Declaration::Inverse(p, q) => vec![
            Rule::named(
                format!("inverse({},{})", p.local_name(), q.local_name()),
                vec![pattern("y", q, "x")],
                vec![BodyElement::Pattern(pattern("x", p, "y"))],
            ),
            Rule::named(
                format!("inverse({},{})", q.local_name(), p.local_name()),
                vec![pattern("y", p, "x")],
                vec![BodyElement::Pattern(pattern("x", q, "y"))],
            ),
        ],
    }
}

fn materialize_data_block(block: &crate::ast::DataBlock, out: &mut Vec<Triple>) -> SrlResult<()> {
    // One fresh node per blank label per block
    let mut blanks: FnvHashMap<String, Term> = FnvHashMap::default();

    for template in &block.triples {
        let mut resolve = |slot: &TermPattern| -> SrlResult<Term> {
            match slot {
                TermPattern::Iri(iri) => Ok(Term::iri(iri.as_str())),
                TermPattern::Literal(lit) => Ok(Term::Literal(std::sync::Arc::new(lit.clone()))),
                TermPattern::Blank(label) => Ok(blanks
                    .entry(label.clone())
                    .or_insert_with(Term::fresh_blank)
                    .clone()),
                TermPattern::Variable(v) => Err(SrlError::new(
                    ErrorCode::NonGroundData,
                    format!("data block contains variable {}", v),
                )),
            }
        };

        let subject = resolve(&template.subject)?;
        let predicate = resolve(&template.predicate)?;
        let object = resolve(&template.object)?;
        let triple = Triple::new(subject, predicate, object);
        if !triple.is_well_formed() {
            return Err(SrlError::parse(format!(
                "data block triple is ill-formed: {}",
                triple
            )));
        }
        out.push(triple);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOperator, Expression};
    use crate::term::Variable;
    use chrono::TimeZone;

    const EX: &str = "http://example.org/";

    fn iri(name: &str) -> Term {
        Term::iri(format!("{}{}", EX, name))
    }

    fn slot(text: &str) -> TermPattern {
        if let Some(name) = text.strip_prefix('?') {
            TermPattern::var(name)
        } else {
            TermPattern::iri(format!("{}{}", EX, text))
        }
    }

    fn tp(s: &str, p: &str, o: &str) -> TriplePattern {
        TriplePattern::new(slot(s), slot(p), slot(o))
    }

    fn fact(s: &str, p: &str, o: &str) -> Triple {
        Triple::new(iri(s), iri(p), iri(o))
    }

    #[test]
    fn test_simple_inference() {
        // S1: every parent edge yields an ancestor edge
        let mut graph: Graph = vec![
            fact("alice", "parent", "bob"),
            fact("bob", "parent", "charlie"),
        ]
        .into_iter()
        .collect();

        let rule_set = RuleSet::from_rules(vec![Rule::new(
            vec![tp("?x", "ancestor", "?y")],
            vec![BodyElement::Pattern(tp("?x", "parent", "?y"))],
        )]);

        let stats = evaluate_rules(&rule_set, &mut graph).unwrap();
        assert_eq!(stats.triples_derived, 2);
        assert_eq!(graph.len(), 4);
        assert!(graph.contains(&fact("alice", "ancestor", "bob")));
        assert!(graph.contains(&fact("bob", "ancestor", "charlie")));
    }

    #[test]
    fn test_transitive_closure() {
        // S2: base + recursive rule, 6 ancestor triples, fixpoint fast
        let mut graph: Graph = vec![
            fact("a", "parent", "b"),
            fact("b", "parent", "c"),
            fact("c", "parent", "d"),
        ]
        .into_iter()
        .collect();

        let rule_set = RuleSet::from_rules(vec![
            Rule::new(
                vec![tp("?x", "anc", "?y")],
                vec![BodyElement::Pattern(tp("?x", "parent", "?y"))],
            ),
            Rule::new(
                vec![tp("?x", "anc", "?z")],
                vec![
                    BodyElement::Pattern(tp("?x", "anc", "?y")),
                    BodyElement::Pattern(tp("?y", "anc", "?z")),
                ],
            ),
        ]);

        let mut engine = RuleEngine::new(&rule_set).unwrap();
        let stats = engine.evaluate(&mut graph).unwrap();

        let anc = iri("anc");
        let ancestors = graph.matching(None, Some(&anc), None);
        assert_eq!(ancestors.len(), 6);
        // Convergence within a handful of rounds (plus the empty closing one)
        assert!(stats.strata[0].iterations <= 4);
    }

    #[test]
    fn test_filter_scenario() {
        // S3: adults only
        let mut graph = Graph::new();
        for (person, age) in [("p1", 25), ("p2", 16), ("p3", 30), ("p4", 12)] {
            graph.insert(Triple::new(iri(person), iri("age"), Term::integer(age)));
        }

        let rule_set = RuleSet::from_rules(vec![Rule::new(
            vec![TriplePattern::new(
                TermPattern::var("p"),
                slot("isAdult"),
                TermPattern::boolean(true),
            )],
            vec![
                BodyElement::Pattern(tp("?p", "age", "?a")),
                BodyElement::Filter(Expression::binary(
                    BinaryOperator::Ge,
                    Expression::var("a"),
                    Expression::integer(18),
                )),
            ],
        )]);

        let stats = evaluate_rules(&rule_set, &mut graph).unwrap();
        assert_eq!(stats.triples_derived, 2);
        assert!(graph.contains(&Triple::new(iri("p1"), iri("isAdult"), Term::boolean(true))));
        assert!(graph.contains(&Triple::new(iri("p3"), iri("isAdult"), Term::boolean(true))));
    }

    #[test]
    fn test_bind_concat_scenario() {
        // S4: BIND(CONCAT(...)) into the head
        let mut graph = Graph::new();
        graph.insert(Triple::new(iri("p1"), iri("first"), Term::literal("John")));
        graph.insert(Triple::new(iri("p1"), iri("last"), Term::literal("Doe")));

        let rule_set = RuleSet::from_rules(vec![Rule::new(
            vec![tp("?p", "fullName", "?n")],
            vec![
                BodyElement::Pattern(tp("?p", "first", "?f")),
                BodyElement::Pattern(tp("?p", "last", "?l")),
                BodyElement::Bind(
                    Variable::new("n"),
                    Expression::call(
                        "CONCAT",
                        vec![
                            Expression::var("f"),
                            Expression::literal(" "),
                            Expression::var("l"),
                        ],
                    ),
                ),
            ],
        )]);

        evaluate_rules(&rule_set, &mut graph).unwrap();
        assert!(graph.contains(&Triple::new(
            iri("p1"),
            iri("fullName"),
            Term::literal("John Doe")
        )));
    }

    #[test]
    fn test_stratified_negation_scenario() {
        // S5: childless via NOT, evaluated after hasChild stabilizes
        let mut graph: Graph = vec![
            fact("p1", "type", "Person"),
            fact("p2", "type", "Person"),
            fact("p1", "hasChild", "k"),
        ]
        .into_iter()
        .collect();

        let rule_set = RuleSet::from_rules(vec![
            Rule::new(
                vec![tp("?y", "childOf", "?x")],
                vec![BodyElement::Pattern(tp("?x", "hasChild", "?y"))],
            ),
            Rule::new(
                vec![TriplePattern::new(
                    TermPattern::var("p"),
                    slot("childless"),
                    TermPattern::boolean(true),
                )],
                vec![
                    BodyElement::Pattern(tp("?p", "type", "Person")),
                    BodyElement::Not(vec![BodyElement::Pattern(tp("?p", "hasChild", "?c"))]),
                ],
            ),
        ]);

        let mut engine = RuleEngine::new(&rule_set).unwrap();
        assert_eq!(engine.stratify().unwrap().len(), 2);

        engine.evaluate(&mut graph).unwrap();
        assert!(graph.contains(&Triple::new(iri("p2"), iri("childless"), Term::boolean(true))));
        assert!(!graph.contains(&Triple::new(iri("p1"), iri("childless"), Term::boolean(true))));
    }

    #[test]
    fn test_unsafe_negation_scenario() {
        // S6: a :- NOT b, b :- NOT a must fail before evaluation
        let rule_set = RuleSet::from_rules(vec![
            Rule::new(
                vec![tp("?x", "a", "?x")],
                vec![
                    BodyElement::Pattern(tp("?x", "seed", "?x")),
                    BodyElement::Not(vec![BodyElement::Pattern(tp("?x", "b", "?x"))]),
                ],
            ),
            Rule::new(
                vec![tp("?x", "b", "?x")],
                vec![
                    BodyElement::Pattern(tp("?x", "seed", "?x")),
                    BodyElement::Not(vec![BodyElement::Pattern(tp("?x", "a", "?x"))]),
                ],
            ),
        ]);

        let mut graph: Graph = vec![fact("s", "seed", "s")].into_iter().collect();
        let mut engine = RuleEngine::new(&rule_set).unwrap();
        let err = engine.evaluate(&mut graph).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsafeNegation);
        // Nothing ran
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_empty_rule_set_is_identity() {
        let mut graph: Graph = vec![fact("a", "p", "b")].into_iter().collect();
        let before = graph.clone();
        let stats = evaluate_rules(&RuleSet::default(), &mut graph).unwrap();
        assert_eq!(graph, before);
        assert_eq!(stats.triples_derived, 0);
    }

    #[test]
    fn test_idempotence() {
        let rule_set = RuleSet::from_rules(vec![
            Rule::new(
                vec![tp("?x", "anc", "?y")],
                vec![BodyElement::Pattern(tp("?x", "parent", "?y"))],
            ),
            Rule::new(
                vec![tp("?x", "anc", "?z")],
                vec![
                    BodyElement::Pattern(tp("?x", "anc", "?y")),
                    BodyElement::Pattern(tp("?y", "anc", "?z")),
                ],
            ),
        ]);

        let mut graph: Graph = vec![fact("a", "parent", "b"), fact("b", "parent", "c")]
            .into_iter()
            .collect();

        evaluate_rules(&rule_set, &mut graph).unwrap();
        let first = graph.clone();
        let stats = evaluate_rules(&rule_set, &mut graph).unwrap();
        assert_eq!(graph, first);
        assert_eq!(stats.triples_derived, 0);
    }

    #[test]
    fn test_rule_order_within_stratum_is_irrelevant() {
        let base = Rule::new(
            vec![tp("?x", "anc", "?y")],
            vec![BodyElement::Pattern(tp("?x", "parent", "?y"))],
        );
        let recursive = Rule::new(
            vec![tp("?x", "anc", "?z")],
            vec![
                BodyElement::Pattern(tp("?x", "anc", "?y")),
                BodyElement::Pattern(tp("?y", "anc", "?z")),
            ],
        );

        let facts = || -> Graph {
            vec![fact("a", "parent", "b"), fact("b", "parent", "c"), fact("c", "parent", "d")]
                .into_iter()
                .collect()
        };

        let mut g1 = facts();
        evaluate_rules(&RuleSet::from_rules(vec![base.clone(), recursive.clone()]), &mut g1).unwrap();
        let mut g2 = facts();
        evaluate_rules(&RuleSet::from_rules(vec![recursive, base]), &mut g2).unwrap();
        assert_eq!(g1, g2);
    }

    #[test]
    fn test_iteration_budget() {
        // An endless existential chain: ?x knows ?y derives a fresh node
        // knowing ?y's friend ... kept finite only by the budget.
        let rule_set = RuleSet::from_rules(vec![Rule::new(
            vec![TriplePattern::new(
                TermPattern::blank("friend"),
                slot("knows"),
                TermPattern::var("x"),
            )],
            vec![BodyElement::Pattern(tp("?x", "knows", "?y"))],
        )]);

        let mut graph: Graph = vec![fact("a", "knows", "b")].into_iter().collect();
        let mut engine = RuleEngine::builder()
            .max_iterations(5)
            .build(&rule_set)
            .unwrap();
        let err = engine.evaluate(&mut graph).unwrap_err();
        assert_eq!(err.code, ErrorCode::BudgetExhausted);
        // Partial results are in the graph and the stats survive
        assert!(graph.len() > 1);
        assert_eq!(engine.stats().strata[0].iterations, 5);
    }

    #[test]
    fn test_derived_triple_budget() {
        let rule_set = RuleSet::from_rules(vec![
            Rule::new(
                vec![tp("?x", "anc", "?y")],
                vec![BodyElement::Pattern(tp("?x", "parent", "?y"))],
            ),
            Rule::new(
                vec![tp("?x", "anc", "?z")],
                vec![
                    BodyElement::Pattern(tp("?x", "anc", "?y")),
                    BodyElement::Pattern(tp("?y", "anc", "?z")),
                ],
            ),
        ]);

        let mut graph: Graph = (0..10)
            .map(|i| fact(&format!("n{}", i), "parent", &format!("n{}", i + 1)))
            .collect();

        let mut engine = RuleEngine::builder().max_derived(3).build(&rule_set).unwrap();
        let err = engine.evaluate(&mut graph).unwrap_err();
        assert_eq!(err.code, ErrorCode::BudgetExhausted);
    }

    #[test]
    fn test_skolem_nodes_are_deterministic() {
        // head blank node: one fresh node per mapping, stable across
        // iterations, so this converges immediately
        let rule_set = RuleSet::from_rules(vec![Rule::new(
            vec![
                TriplePattern::new(TermPattern::var("x"), slot("address"), TermPattern::blank("addr")),
                TriplePattern::new(TermPattern::blank("addr"), slot("city"), TermPattern::var("c")),
            ],
            vec![BodyElement::Pattern(tp("?x", "cityName", "?c"))],
        )]);

        let mut graph: Graph = vec![
            fact("alice", "cityName", "paris"),
            fact("bob", "cityName", "lyon"),
        ]
        .into_iter()
        .collect();

        let stats = evaluate_rules(&rule_set, &mut graph).unwrap();
        // Two templates per person, one shared node per mapping
        assert_eq!(stats.triples_derived, 4);

        let address = iri("address");
        let city = iri("city");
        let alice_addr = graph.matching(Some(&iri("alice")), Some(&address), None);
        assert_eq!(alice_addr.len(), 1);
        let node = alice_addr[0].object.clone();
        assert!(node.is_blank());
        // Same node links to the city
        assert_eq!(graph.matching(Some(&node), Some(&city), Some(&iri("paris"))).len(), 1);

        // Distinct mappings never collide on a head blank node
        let bob_addr = graph.matching(Some(&iri("bob")), Some(&address), None);
        assert_ne!(bob_addr[0].object, node);
    }

    #[test]
    fn test_evaluate_new_leaves_input_untouched() {
        let input: Graph = vec![fact("a", "parent", "b")].into_iter().collect();
        let rule_set = RuleSet::from_rules(vec![Rule::new(
            vec![tp("?x", "anc", "?y")],
            vec![BodyElement::Pattern(tp("?x", "parent", "?y"))],
        )]);

        let mut engine = RuleEngine::new(&rule_set).unwrap();
        let output = engine.evaluate_new(&input).unwrap();
        assert_eq!(input.len(), 1);
        assert_eq!(output.graph.len(), 2);

        let derived = engine.derived_only(&input).unwrap();
        assert_eq!(derived.len(), 1);
        assert!(derived.contains(&fact("a", "anc", "b")));
    }

    #[test]
    fn test_provenance_records() {
        let rule_set = RuleSet::from_rules(vec![Rule::named(
            "ancestors",
            vec![tp("?x", "anc", "?y")],
            vec![BodyElement::Pattern(tp("?x", "parent", "?y"))],
        )]);

        let mut graph: Graph = vec![fact("a", "parent", "b")].into_iter().collect();
        let mut engine = RuleEngine::builder()
            .track_provenance(true)
            .build(&rule_set)
            .unwrap();
        engine.evaluate(&mut graph).unwrap();

        let provenance = engine.provenance().unwrap();
        assert_eq!(provenance.records.len(), 1);
        let record = &provenance.records[0];
        assert_eq!(record.rule_index, 0);
        assert_eq!(record.stratum, 0);
        assert_eq!(record.iteration, 1);
        assert_eq!(record.triple, fact("a", "anc", "b"));
    }

    #[test]
    fn test_transitive_declaration() {
        let mut rule_set = RuleSet::default();
        rule_set
            .declarations
            .push(Declaration::Transitive(crate::term::Iri::new(format!("{}sub", EX))));

        let mut graph: Graph = vec![fact("a", "sub", "b"), fact("b", "sub", "c")]
            .into_iter()
            .collect();
        evaluate_rules(&rule_set, &mut graph).unwrap();
        assert!(graph.contains(&fact("a", "sub", "c")));
    }

    #[test]
    fn test_symmetric_and_inverse_declarations() {
        let mut rule_set = RuleSet::default();
        rule_set
            .declarations
            .push(Declaration::Symmetric(crate::term::Iri::new(format!("{}spouse", EX))));
        rule_set.declarations.push(Declaration::Inverse(
            crate::term::Iri::new(format!("{}hasChild", EX)),
            crate::term::Iri::new(format!("{}hasParent", EX)),
        ));

        let mut graph: Graph = vec![fact("a", "spouse", "b"), fact("p", "hasChild", "c")]
            .into_iter()
            .collect();
        evaluate_rules(&rule_set, &mut graph).unwrap();
        assert!(graph.contains(&fact("b", "spouse", "a")));
        assert!(graph.contains(&fact("c", "hasParent", "p")));
    }

    #[test]
    fn test_data_blocks_are_asserted() {
        let mut rule_set = RuleSet::from_rules(vec![Rule::new(
            vec![tp("?x", "anc", "?y")],
            vec![BodyElement::Pattern(tp("?x", "parent", "?y"))],
        )]);
        rule_set.data.push(crate::ast::DataBlock::new(vec![tp("a", "parent", "b")]));

        let mut graph = Graph::new();
        evaluate_rules(&rule_set, &mut graph).unwrap();
        assert!(graph.contains(&fact("a", "parent", "b")));
        assert!(graph.contains(&fact("a", "anc", "b")));
    }

    #[test]
    fn test_data_block_rejects_variables() {
        let mut rule_set = RuleSet::default();
        rule_set
            .data
            .push(crate::ast::DataBlock::new(vec![tp("?x", "p", "b")]));
        let err = RuleEngine::new(&rule_set).unwrap_err();
        assert_eq!(err.code, ErrorCode::NonGroundData);
    }

    #[test]
    fn test_invalid_head_triple_is_diagnosed_not_fatal() {
        // ?o can be a literal, which is invalid in subject position
        let rule_set = RuleSet::from_rules(vec![Rule::new(
            vec![tp("?o", "flagged", "?s")],
            vec![BodyElement::Pattern(tp("?s", "note", "?o"))],
        )]);

        let mut graph = Graph::new();
        graph.insert(Triple::new(iri("doc"), iri("note"), Term::literal("text")));
        graph.insert(Triple::new(iri("doc"), iri("note"), iri("other")));

        let mut engine = RuleEngine::new(&rule_set).unwrap();
        engine.evaluate(&mut graph).unwrap();

        // The IRI-object mapping derived; the literal-subject one was
        // discarded with a diagnostic.
        assert!(graph.contains(&fact("other", "flagged", "doc")));
        assert_eq!(engine.diagnostics().len(), 1);
        assert_eq!(engine.diagnostics()[0].code, ErrorCode::InvalidTripleConstruction);
    }

    #[test]
    fn test_fixed_clock_is_visible_to_now() {
        let fixed = Utc.with_ymd_and_hms(2030, 5, 1, 0, 0, 0).unwrap();
        let rule_set = RuleSet::from_rules(vec![Rule::new(
            vec![tp("?x", "stamped", "?t")],
            vec![
                BodyElement::Pattern(tp("?x", "event", "?e")),
                BodyElement::Bind(
                    Variable::new("t"),
                    Expression::call("YEAR", vec![Expression::call("NOW", vec![])]),
                ),
            ],
        )]);

        let mut graph: Graph = vec![fact("e1", "event", "x")].into_iter().collect();
        let mut engine = RuleEngine::builder().clock(fixed).build(&rule_set).unwrap();
        engine.evaluate(&mut graph).unwrap();
        assert!(graph.contains(&Triple::new(iri("e1"), iri("stamped"), Term::integer(2030))));
    }

    #[test]
    fn test_monotonicity_without_not() {
        let rule_set = RuleSet::from_rules(vec![Rule::new(
            vec![tp("?x", "anc", "?y")],
            vec![BodyElement::Pattern(tp("?x", "parent", "?y"))],
        )]);

        let input: Graph = vec![fact("a", "parent", "b"), fact("x", "unrelated", "y")]
            .into_iter()
            .collect();
        let mut graph = input.clone();
        evaluate_rules(&rule_set, &mut graph).unwrap();
        for triple in &input {
            assert!(graph.contains(triple));
        }
    }
}

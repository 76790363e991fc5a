//! Rule body evaluation
//!
//! Walks a body pattern left to right, threading a multiset of solution
//! mappings through triple patterns (join against the working graph),
//! FILTER (keep mappings whose condition is definitely true), BIND
//! (extend with a computed value), and NOT (anti-join against the
//! sub-pattern's matches).

use crate::ast::{BodyElement, Expression, TermPattern, TriplePattern};
use crate::error::{SrlError, SrlResult};
use crate::graph::Graph;
use crate::term::{Term, Variable};

use super::expressions::{ebv_of, eval_expr, EvalContext, Evaluated};
use super::solutions::{minus, SolutionMapping};

/// Evaluate a rule body against a graph, producing the solution multiset
///
/// The empty body yields the multiset holding just the empty mapping;
/// bodies are validated to be non-empty upstream, so in practice the seed
/// is immediately joined against the first pattern.
pub fn eval_rule_body(
    body: &[BodyElement],
    graph: &Graph,
    ctx: &EvalContext,
) -> SrlResult<Vec<SolutionMapping>> {
    let mut omega = vec![SolutionMapping::new()];

    for element in body {
        omega = eval_body_element(element, omega, graph, ctx)?;
        if omega.is_empty() {
            break;
        }
    }

    Ok(omega)
}

fn eval_body_element(
    element: &BodyElement,
    omega: Vec<SolutionMapping>,
    graph: &Graph,
    ctx: &EvalContext,
) -> SrlResult<Vec<SolutionMapping>> {
    match element {
        BodyElement::Pattern(pattern) => Ok(eval_triple_pattern(pattern, &omega, graph)),
        BodyElement::Filter(condition) => Ok(eval_filter(condition, omega, ctx)),
        BodyElement::Bind(var, expression) => eval_bind(var, expression, omega, ctx),
        BodyElement::Not(body) => eval_negation(body, omega, graph, ctx),
    }
}

/// A pattern slot resolved for matching: either a concrete term or a
/// variable to bind
enum Slot {
    Const(Term),
    Var(Variable),
}

fn resolve_slot(slot: &TermPattern) -> Slot {
    match slot {
        TermPattern::Iri(iri) => Slot::Const(Term::iri(iri.as_str())),
        TermPattern::Literal(lit) => Slot::Const(Term::Literal(std::sync::Arc::new(lit.clone()))),
        TermPattern::Variable(v) => Slot::Var(v.clone()),
        // Blank node labels in a body are variables scoped to the
        // pattern: same label, same variable. The "_:" prefix keeps them
        // out of the user-visible variable namespace.
        TermPattern::Blank(label) => Slot::Var(Variable::new(format!("_:{}", label))),
    }
}

fn eval_triple_pattern(
    pattern: &TriplePattern,
    omega: &[SolutionMapping],
    graph: &Graph,
) -> Vec<SolutionMapping> {
    let slots = [
        resolve_slot(&pattern.subject),
        resolve_slot(&pattern.predicate),
        resolve_slot(&pattern.object),
    ];

    let mut result = Vec::new();

    for mu in omega {
        // A slot constrains the lookup when it is concrete or already
        // bound; otherwise it binds from the candidate triple.
        let constraint = |slot: &Slot| -> Option<Term> {
            match slot {
                Slot::Const(term) => Some(term.clone()),
                Slot::Var(v) => mu.get(v).cloned(),
            }
        };
        let s = constraint(&slots[0]);
        let p = constraint(&slots[1]);
        let o = constraint(&slots[2]);

        for triple in graph.matching(s.as_ref(), p.as_ref(), o.as_ref()) {
            let fields = [&triple.subject, &triple.predicate, &triple.object];
            let mut candidate = mu.clone();
            let mut consistent = true;

            for (slot, term) in slots.iter().zip(fields) {
                if let Slot::Var(v) = slot {
                    match candidate.get(v) {
                        Some(bound) if bound == term => {}
                        Some(_) => {
                            // Repeated variable bound differently within
                            // this triple
                            consistent = false;
                            break;
                        }
                        None => candidate.bind(v.clone(), term.clone()),
                    }
                }
            }

            if consistent {
                result.push(candidate);
            }
        }
    }

    result
}

/// Keep mappings whose condition has effective boolean value true;
/// false and error both drop the mapping
fn eval_filter(
    condition: &Expression,
    omega: Vec<SolutionMapping>,
    ctx: &EvalContext,
) -> Vec<SolutionMapping> {
    omega
        .into_iter()
        .filter(|mu| ebv_of(&eval_expr(condition, mu, ctx)).unwrap_or(false))
        .collect()
}

/// Extend each mapping with the bound value
///
/// Binding an already-bound variable is an error. When the expression
/// errors or is unbound, the mapping passes through unchanged with the
/// variable left out of the domain.
fn eval_bind(
    var: &Variable,
    expression: &Expression,
    omega: Vec<SolutionMapping>,
    ctx: &EvalContext,
) -> SrlResult<Vec<SolutionMapping>> {
    let mut result = Vec::with_capacity(omega.len());

    for mu in omega {
        if mu.contains(var) {
            return Err(SrlError::malformed_rule(format!(
                "BIND target {} is already bound",
                var
            )));
        }
        match eval_expr(expression, &mu, ctx) {
            Evaluated::Value(term) => result.push(mu.extended(var.clone(), term)),
            Evaluated::Unbound | Evaluated::Error(_) => result.push(mu),
        }
    }

    Ok(result)
}

/// Anti-join: evaluate the sub-pattern seeded with the current multiset,
/// then remove every mapping compatible with (and sharing a variable
/// with) one of its matches
fn eval_negation(
    body: &[BodyElement],
    omega: Vec<SolutionMapping>,
    graph: &Graph,
    ctx: &EvalContext,
) -> SrlResult<Vec<SolutionMapping>> {
    if omega.is_empty() {
        return Ok(omega);
    }

    let mut negated = omega.clone();
    for element in body {
        negated = eval_body_element(element, negated, graph, ctx)?;
        if negated.is_empty() {
            break;
        }
    }

    Ok(minus(&omega, &negated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::builtins::BuiltinRegistry;
    use chrono::Utc;

    const EX: &str = "http://example.org/";

    fn iri(name: &str) -> Term {
        Term::iri(format!("{}{}", EX, name))
    }

    fn pattern(s: &str, p: &str, o: &str) -> TriplePattern {
        let slot = |text: &str| {
            if let Some(name) = text.strip_prefix('?') {
                TermPattern::var(name)
            } else {
                TermPattern::iri(format!("{}{}", EX, text))
            }
        };
        TriplePattern::new(slot(s), slot(p), slot(o))
    }

    fn family_graph() -> Graph {
        let mut graph = Graph::new();
        graph.insert(crate::term::Triple::new(iri("alice"), iri("parent"), iri("bob")));
        graph.insert(crate::term::Triple::new(iri("bob"), iri("parent"), iri("charlie")));
        graph
    }

    fn eval(body: &[BodyElement], graph: &Graph) -> Vec<SolutionMapping> {
        let builtins = BuiltinRegistry::new();
        let ctx = EvalContext::new(&builtins, Utc::now());
        eval_rule_body(body, graph, &ctx).unwrap()
    }

    #[test]
    fn test_single_pattern_binds_variables() {
        let graph = family_graph();
        let body = vec![BodyElement::Pattern(pattern("?x", "parent", "?y"))];
        let omega = eval(&body, &graph);
        assert_eq!(omega.len(), 2);
        for mu in &omega {
            assert!(mu.contains(&Variable::new("x")));
            assert!(mu.contains(&Variable::new("y")));
        }
    }

    #[test]
    fn test_two_patterns_join_on_shared_variable() {
        let graph = family_graph();
        let body = vec![
            BodyElement::Pattern(pattern("?x", "parent", "?y")),
            BodyElement::Pattern(pattern("?y", "parent", "?z")),
        ];
        let omega = eval(&body, &graph);
        assert_eq!(omega.len(), 1);
        assert_eq!(omega[0].get(&Variable::new("x")), Some(&iri("alice")));
        assert_eq!(omega[0].get(&Variable::new("z")), Some(&iri("charlie")));
    }

    #[test]
    fn test_repeated_variable_in_one_pattern() {
        let mut graph = family_graph();
        graph.insert(crate::term::Triple::new(iri("dave"), iri("parent"), iri("dave")));

        let body = vec![BodyElement::Pattern(pattern("?x", "parent", "?x"))];
        let omega = eval(&body, &graph);
        assert_eq!(omega.len(), 1);
        assert_eq!(omega[0].get(&Variable::new("x")), Some(&iri("dave")));
    }

    #[test]
    fn test_blank_label_acts_as_scoped_variable() {
        let graph = family_graph();
        // _:p joins across the two patterns like a variable would
        let body = vec![
            BodyElement::Pattern(TriplePattern::new(
                TermPattern::var("x"),
                TermPattern::iri(format!("{}parent", EX)),
                TermPattern::blank("mid"),
            )),
            BodyElement::Pattern(TriplePattern::new(
                TermPattern::blank("mid"),
                TermPattern::iri(format!("{}parent", EX)),
                TermPattern::var("z"),
            )),
        ];
        let omega = eval(&body, &graph);
        assert_eq!(omega.len(), 1);
        assert_eq!(omega[0].get(&Variable::new("z")), Some(&iri("charlie")));
    }

    #[test]
    fn test_filter_drops_false_and_error() {
        let mut graph = Graph::new();
        graph.insert(crate::term::Triple::new(iri("p1"), iri("age"), Term::integer(25)));
        graph.insert(crate::term::Triple::new(iri("p2"), iri("age"), Term::integer(16)));
        graph.insert(crate::term::Triple::new(iri("p3"), iri("age"), Term::literal("unknown")));

        let body = vec![
            BodyElement::Pattern(pattern("?p", "age", "?a")),
            BodyElement::Filter(Expression::binary(
                crate::ast::BinaryOperator::Ge,
                Expression::var("a"),
                Expression::integer(18),
            )),
        ];
        // p2 fails the comparison, p3 errors on it; both drop
        let omega = eval(&body, &graph);
        assert_eq!(omega.len(), 1);
        assert_eq!(omega[0].get(&Variable::new("p")), Some(&iri("p1")));
    }

    #[test]
    fn test_filter_over_empty_multiset() {
        let graph = Graph::new();
        let body = vec![
            BodyElement::Pattern(pattern("?x", "parent", "?y")),
            BodyElement::Filter(Expression::Term(TermPattern::boolean(true))),
        ];
        assert!(eval(&body, &graph).is_empty());
    }

    #[test]
    fn test_bind_extends_mappings() {
        let graph = family_graph();
        let body = vec![
            BodyElement::Pattern(pattern("?x", "parent", "?y")),
            BodyElement::Bind(
                Variable::new("label"),
                Expression::call("STR", vec![Expression::var("x")]),
            ),
        ];
        let omega = eval(&body, &graph);
        assert_eq!(omega.len(), 2);
        for mu in &omega {
            assert!(mu.contains(&Variable::new("label")));
        }
    }

    #[test]
    fn test_bind_error_passes_mapping_through_unbound() {
        let graph = family_graph();
        let body = vec![
            BodyElement::Pattern(pattern("?x", "parent", "?y")),
            // STRLEN of an IRI is a type error
            BodyElement::Bind(
                Variable::new("n"),
                Expression::call("STRLEN", vec![Expression::var("x")]),
            ),
        ];
        let omega = eval(&body, &graph);
        assert_eq!(omega.len(), 2);
        for mu in &omega {
            assert!(!mu.contains(&Variable::new("n")));
        }
    }

    #[test]
    fn test_bind_to_bound_variable_is_error() {
        let graph = family_graph();
        let body = vec![
            BodyElement::Pattern(pattern("?x", "parent", "?y")),
            BodyElement::Bind(Variable::new("x"), Expression::literal("clash")),
        ];
        let builtins = BuiltinRegistry::new();
        let ctx = EvalContext::new(&builtins, Utc::now());
        assert!(eval_rule_body(&body, &graph, &ctx).is_err());
    }

    #[test]
    fn test_negation_removes_matching_mappings() {
        let mut graph = Graph::new();
        graph.insert(crate::term::Triple::new(iri("p1"), iri("type"), iri("Person")));
        graph.insert(crate::term::Triple::new(iri("p2"), iri("type"), iri("Person")));
        graph.insert(crate::term::Triple::new(iri("p1"), iri("hasChild"), iri("k")));

        let body = vec![
            BodyElement::Pattern(pattern("?p", "type", "Person")),
            BodyElement::Not(vec![BodyElement::Pattern(pattern("?p", "hasChild", "?c"))]),
        ];
        let omega = eval(&body, &graph);
        assert_eq!(omega.len(), 1);
        assert_eq!(omega[0].get(&Variable::new("p")), Some(&iri("p2")));
    }

    #[test]
    fn test_negation_over_empty_multiset_stays_empty() {
        let mut graph = Graph::new();
        graph.insert(crate::term::Triple::new(iri("p1"), iri("hasChild"), iri("k")));

        let body = vec![
            // No matches: the multiset is empty going into the NOT
            BodyElement::Pattern(pattern("?p", "type", "Person")),
            BodyElement::Not(vec![BodyElement::Pattern(pattern("?p", "hasChild", "?c"))]),
        ];
        assert!(eval(&body, &graph).is_empty());
    }

    #[test]
    fn test_negation_with_filter_inside() {
        let mut graph = Graph::new();
        graph.insert(crate::term::Triple::new(iri("p1"), iri("age"), Term::integer(25)));
        graph.insert(crate::term::Triple::new(iri("p2"), iri("age"), Term::integer(12)));

        // Keep people without an adult age record
        let body = vec![
            BodyElement::Pattern(pattern("?p", "age", "?a")),
            BodyElement::Not(vec![
                BodyElement::Pattern(pattern("?p", "age", "?b")),
                BodyElement::Filter(Expression::binary(
                    crate::ast::BinaryOperator::Ge,
                    Expression::var("b"),
                    Expression::integer(18),
                )),
            ]),
        ];
        let omega = eval(&body, &graph);
        assert_eq!(omega.len(), 1);
        assert_eq!(omega[0].get(&Variable::new("p")), Some(&iri("p2")));
    }
}

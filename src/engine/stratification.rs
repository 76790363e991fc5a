//! Stratification analysis
//!
//! Organizes a rule set into evaluation layers over a predicate
//! dependency graph: an edge p -> q (positive or negative) records that
//! some rule deriving q reads p in its body, negatively when the read is
//! inside a NOT sub-pattern. A rule set is safely stratifiable iff no
//! strongly connected component contains a negative edge.
//!
//! Also hosts the rule well-formedness checks that run regardless of
//! stratification: head-variable safety and the positional and
//! variable-scoping conditions on bodies.

use fnv::{FnvHashMap, FnvHashSet};
use tracing::debug;

use crate::ast::{BodyElement, Rule, TermPattern, TriplePattern};
use crate::error::{SrlError, SrlResult};
use crate::term::Variable;

/// Node key for a predicate slot: the IRI, or the wildcard for variable
/// predicates, which overlap every predicate
const WILDCARD: &str = "*";

/// Result of stratifying a rule set
#[derive(Clone, Debug)]
pub struct Stratification {
    /// Rule indices grouped by stratum, lowest first
    pub strata: Vec<Vec<usize>>,
}

impl Stratification {
    /// Total number of strata
    pub fn len(&self) -> usize {
        self.strata.len()
    }

    /// Whether there are no strata (empty rule set)
    pub fn is_empty(&self) -> bool {
        self.strata.is_empty()
    }

    /// Find the stratum of a rule index
    pub fn stratum_of(&self, rule_index: usize) -> Option<usize> {
        self.strata
            .iter()
            .position(|stratum| stratum.contains(&rule_index))
    }
}

/// Stratify a rule set, failing on negation cycles
pub fn stratify(rules: &[Rule]) -> SrlResult<Stratification> {
    if rules.is_empty() {
        return Ok(Stratification { strata: Vec::new() });
    }

    let graph = DependencyGraph::build(rules);
    let scc_of = graph.tarjan_scc();

    // A negative edge inside one component means the negated predicate
    // can never reach a stable extension first.
    for (from, targets) in graph.edges.iter().enumerate() {
        for &(to, negative) in targets {
            if negative && scc_of[from] == scc_of[to] {
                return Err(SrlError::unsafe_negation(format!(
                    "negation cycle through predicate {}",
                    graph.nodes[to]
                ))
                .with_field("predicate", &graph.nodes[to]));
            }
        }
    }

    let node_stratum = graph.layer(&scc_of);

    // A rule evaluates in the stratum of its head predicate; with several
    // head templates, the highest one wins.
    let mut rule_stratum = Vec::with_capacity(rules.len());
    for rule in rules {
        let stratum = head_predicate_keys(rule)
            .into_iter()
            .filter_map(|key| graph.index.get(key.as_str()).map(|&i| node_stratum[i]))
            .max()
            .unwrap_or(0);
        rule_stratum.push(stratum);
    }

    // Compact to dense stratum numbers
    let mut used: Vec<usize> = rule_stratum.iter().copied().collect::<FnvHashSet<_>>().into_iter().collect();
    used.sort_unstable();
    let dense: FnvHashMap<usize, usize> = used.iter().enumerate().map(|(i, &s)| (s, i)).collect();

    let mut strata = vec![Vec::new(); used.len()];
    for (rule_index, &stratum) in rule_stratum.iter().enumerate() {
        strata[dense[&stratum]].push(rule_index);
    }

    debug!(strata = strata.len(), rules = rules.len(), "stratification complete");
    Ok(Stratification { strata })
}

/// Validate every rule's well-formedness conditions
///
/// Checks, per rule:
/// - head and body are non-empty
/// - predicate slots are IRIs or variables; head subjects are not literals
/// - every head variable is bound by a positive body element (safety)
/// - FILTER and BIND expressions only reference already-bound variables
/// - each BIND target is assigned once and does not reappear in a later
///   triple pattern of the same scope
pub fn validate_rules(rules: &[Rule]) -> SrlResult<()> {
    for (index, rule) in rules.iter().enumerate() {
        validate_rule(rule).map_err(|e| e.with_field("rule", rule_label(rule, index)))?;
    }
    Ok(())
}

fn rule_label(rule: &Rule, index: usize) -> String {
    rule.name.clone().unwrap_or_else(|| index.to_string())
}

fn validate_rule(rule: &Rule) -> SrlResult<()> {
    if rule.head.is_empty() {
        return Err(SrlError::malformed_rule("rule head is empty"));
    }
    if rule.body.is_empty() {
        return Err(SrlError::malformed_rule("rule body is empty"));
    }

    for template in &rule.head {
        validate_predicate_slot(&template.predicate)?;
        if matches!(template.subject, TermPattern::Literal(_)) {
            return Err(SrlError::malformed_rule(format!(
                "head template has a literal subject: {}",
                template
            )));
        }
    }

    let mut defined: FnvHashSet<Variable> = FnvHashSet::default();
    let mut assigned: FnvHashSet<Variable> = FnvHashSet::default();
    validate_body(&rule.body, &mut defined, &mut assigned)?;

    // Safety: every head variable must be bound by a positive body
    // element (a top-level triple pattern or BIND target).
    for template in &rule.head {
        for slot in template.slots() {
            if let TermPattern::Variable(v) = slot {
                if !defined.contains(v) {
                    return Err(SrlError::unsafe_rule(format!(
                        "head variable {} is never bound by a positive body element",
                        v
                    )));
                }
            }
        }
    }

    Ok(())
}

fn validate_predicate_slot(slot: &TermPattern) -> SrlResult<()> {
    match slot {
        TermPattern::Iri(_) | TermPattern::Variable(_) => Ok(()),
        other => Err(SrlError::malformed_rule(format!(
            "predicate slot must be an IRI or variable, got {}",
            other
        ))),
    }
}

/// Walk one body scope, accumulating the variables it defines
///
/// NOT sub-patterns validate against a copy of the enclosing scope:
/// bindings made inside them stay local.
fn validate_body(
    body: &[BodyElement],
    defined: &mut FnvHashSet<Variable>,
    assigned: &mut FnvHashSet<Variable>,
) -> SrlResult<()> {
    for element in body {
        match element {
            BodyElement::Pattern(pattern) => {
                validate_predicate_slot(&pattern.predicate)?;
                for slot in pattern.slots() {
                    if let TermPattern::Variable(v) = slot {
                        if assigned.contains(v) {
                            return Err(SrlError::malformed_rule(format!(
                                "BIND variable {} reappears in a triple pattern",
                                v
                            )));
                        }
                        defined.insert(v.clone());
                    }
                }
            }
            BodyElement::Filter(expression) => {
                for v in expression.variables() {
                    if !defined.contains(&v) {
                        return Err(SrlError::malformed_rule(format!(
                            "FILTER references unbound variable {}",
                            v
                        )));
                    }
                }
            }
            BodyElement::Bind(var, expression) => {
                if assigned.contains(var) || defined.contains(var) {
                    return Err(SrlError::malformed_rule(format!(
                        "BIND variable {} is assigned more than once",
                        var
                    )));
                }
                for v in expression.variables() {
                    if !defined.contains(&v) {
                        return Err(SrlError::malformed_rule(format!(
                            "BIND expression references unbound variable {}",
                            v
                        )));
                    }
                }
                assigned.insert(var.clone());
                defined.insert(var.clone());
            }
            BodyElement::Not(inner) => {
                let mut inner_defined = defined.clone();
                let mut inner_assigned = assigned.clone();
                validate_body(inner, &mut inner_defined, &mut inner_assigned)?;
            }
        }
    }
    Ok(())
}

// ===========================================================================
// Predicate dependency graph
// ===========================================================================

struct DependencyGraph {
    nodes: Vec<String>,
    index: FnvHashMap<String, usize>,
    /// Adjacency list: edges[from] = (to, negative)
    edges: Vec<Vec<(usize, bool)>>,
}

impl DependencyGraph {
    fn build(rules: &[Rule]) -> Self {
        // Raw (body predicate, head predicate, negative) references
        let mut raw: Vec<(String, String, bool)> = Vec::new();
        let mut keys: FnvHashSet<String> = FnvHashSet::default();

        for rule in rules {
            let heads = head_predicate_keys(rule);
            keys.extend(heads.iter().cloned());

            let mut positive = Vec::new();
            let mut negative = Vec::new();
            collect_body_predicates(&rule.body, false, &mut positive, &mut negative);
            keys.extend(positive.iter().cloned());
            keys.extend(negative.iter().cloned());

            for head in &heads {
                for p in &positive {
                    raw.push((p.clone(), head.clone(), false));
                }
                for p in &negative {
                    raw.push((p.clone(), head.clone(), true));
                }
            }
        }

        let mut nodes: Vec<String> = keys.into_iter().collect();
        nodes.sort_unstable();
        let index: FnvHashMap<String, usize> =
            nodes.iter().enumerate().map(|(i, k)| (k.clone(), i)).collect();

        let wildcard_derived = rules.iter().any(|r| {
            head_predicate_keys(r).iter().any(|k| k == WILDCARD)
        });

        let mut edges: Vec<Vec<(usize, bool)>> = vec![Vec::new(); nodes.len()];
        let mut seen: FnvHashSet<(usize, usize, bool)> = FnvHashSet::default();
        let mut add = |edges: &mut Vec<Vec<(usize, bool)>>, from: usize, to: usize, neg: bool| {
            if seen.insert((from, to, neg)) {
                edges[from].push((to, neg));
            }
        };

        for (p, q, neg) in raw {
            // A wildcard slot overlaps every predicate, so its edges fan
            // out across the whole node set.
            let sources: Vec<usize> = if p == WILDCARD {
                (0..nodes.len()).collect()
            } else if wildcard_derived {
                vec![index[&p], index[WILDCARD]]
            } else {
                vec![index[&p]]
            };
            let targets: Vec<usize> = if q == WILDCARD {
                (0..nodes.len()).collect()
            } else {
                vec![index[&q]]
            };
            for &from in &sources {
                for &to in &targets {
                    add(&mut edges, from, to, neg);
                }
            }
        }

        DependencyGraph { nodes, index, edges }
    }

    /// Tarjan's strongly connected components; returns the component id
    /// of each node
    fn tarjan_scc(&self) -> Vec<usize> {
        struct State<'a> {
            graph: &'a DependencyGraph,
            counter: usize,
            index: Vec<Option<usize>>,
            lowlink: Vec<usize>,
            on_stack: Vec<bool>,
            stack: Vec<usize>,
            scc_of: Vec<usize>,
            scc_count: usize,
        }

        fn visit(st: &mut State, v: usize) {
            st.index[v] = Some(st.counter);
            st.lowlink[v] = st.counter;
            st.counter += 1;
            st.stack.push(v);
            st.on_stack[v] = true;

            for &(w, _) in &st.graph.edges[v] {
                if st.index[w].is_none() {
                    visit(st, w);
                    st.lowlink[v] = st.lowlink[v].min(st.lowlink[w]);
                } else if st.on_stack[w] {
                    st.lowlink[v] = st.lowlink[v].min(st.index[w].unwrap());
                }
            }

            if st.lowlink[v] == st.index[v].unwrap() {
                loop {
                    let w = st.stack.pop().unwrap();
                    st.on_stack[w] = false;
                    st.scc_of[w] = st.scc_count;
                    if w == v {
                        break;
                    }
                }
                st.scc_count += 1;
            }
        }

        let n = self.nodes.len();
        let mut st = State {
            graph: self,
            counter: 0,
            index: vec![None; n],
            lowlink: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            scc_of: vec![0; n],
            scc_count: 0,
        };

        for v in 0..n {
            if st.index[v].is_none() {
                visit(&mut st, v);
            }
        }

        st.scc_of
    }

    /// Assign a stratum to every node: positive edges allow the same
    /// layer, negative edges force a strictly higher one
    fn layer(&self, scc_of: &[usize]) -> Vec<usize> {
        let scc_count = scc_of.iter().copied().max().map_or(0, |m| m + 1);

        // Tarjan emits components in reverse topological order of the
        // condensation, so walking components from high id to low id
        // relaxes each edge after its source is final.
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); scc_count];
        for (node, &scc) in scc_of.iter().enumerate() {
            members[scc].push(node);
        }

        let mut scc_stratum = vec![0usize; scc_count];
        for scc in (0..scc_count).rev() {
            for &node in &members[scc] {
                for &(to, negative) in &self.edges[node] {
                    let target = scc_of[to];
                    if target == scc {
                        continue;
                    }
                    let required = scc_stratum[scc] + usize::from(negative);
                    if scc_stratum[target] < required {
                        scc_stratum[target] = required;
                    }
                }
            }
        }

        scc_of.iter().map(|&scc| scc_stratum[scc]).collect()
    }
}

fn predicate_key(slot: &TermPattern) -> Option<String> {
    match slot {
        TermPattern::Iri(iri) => Some(iri.as_str().to_string()),
        TermPattern::Variable(_) => Some(WILDCARD.to_string()),
        // Literal/blank predicates are rejected by validation
        _ => None,
    }
}

fn head_predicate_keys(rule: &Rule) -> Vec<String> {
    let mut keys = Vec::new();
    for template in &rule.head {
        if let Some(key) = predicate_key(&template.predicate) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    keys
}

fn collect_body_predicates(
    body: &[BodyElement],
    negated: bool,
    positive: &mut Vec<String>,
    negative: &mut Vec<String>,
) {
    for element in body {
        match element {
            BodyElement::Pattern(TriplePattern { predicate, .. }) => {
                if let Some(key) = predicate_key(predicate) {
                    let bucket = if negated { &mut *negative } else { &mut *positive };
                    if !bucket.contains(&key) {
                        bucket.push(key);
                    }
                }
            }
            // Anything under a NOT is a negative reference, however deep
            BodyElement::Not(inner) => collect_body_predicates(inner, true, positive, negative),
            BodyElement::Filter(_) | BodyElement::Bind(_, _) => {}
        }
    }
}

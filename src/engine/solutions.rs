//! Solution mappings and the multiset algebra over them
//!
//! A solution mapping is a partial function from variables to ground
//! terms. "Unbound" means "not in the domain": a mapping never carries a
//! placeholder binding. Mappings are value types; once emitted by the
//! pattern engine they are never mutated.
//!
//! Most mappings carry only a handful of bindings, so the representation
//! is a by-variable sorted array rather than a hash map. That also gives
//! a canonical ordering, which head instantiation relies on when it
//! derives Skolem identifiers from a mapping's contents.

use std::fmt;

use crate::term::{Term, Variable};

/// A partial function from variables to ground terms
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SolutionMapping {
    /// Bindings sorted by variable name
    bindings: Vec<(Variable, Term)>,
}

impl SolutionMapping {
    /// The mapping with empty domain
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the binding for a variable
    pub fn get(&self, var: &Variable) -> Option<&Term> {
        self.bindings
            .binary_search_by(|(v, _)| v.cmp(var))
            .ok()
            .map(|i| &self.bindings[i].1)
    }

    /// Check whether a variable is in the domain
    pub fn contains(&self, var: &Variable) -> bool {
        self.get(var).is_some()
    }

    /// Add a binding in place; the variable must not already be bound
    pub fn bind(&mut self, var: Variable, term: Term) {
        match self.bindings.binary_search_by(|(v, _)| v.cmp(&var)) {
            Ok(_) => debug_assert!(false, "variable {} already bound", var),
            Err(pos) => self.bindings.insert(pos, (var, term)),
        }
    }

    /// Return a copy of this mapping extended with one more binding
    pub fn extended(&self, var: Variable, term: Term) -> SolutionMapping {
        let mut next = self.clone();
        next.bind(var, term);
        next
    }

    /// Iterate over the domain
    pub fn domain(&self) -> impl Iterator<Item = &Variable> {
        self.bindings.iter().map(|(v, _)| v)
    }

    /// Iterate over bindings in variable order
    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Term)> {
        self.bindings.iter().map(|(v, t)| (v, t))
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the domain is empty
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl fmt::Display for SolutionMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (var, term)) in self.bindings.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", var, term)?;
        }
        write!(f, "}}")
    }
}

/// Check if two mappings agree on the intersection of their domains
pub fn compatible(a: &SolutionMapping, b: &SolutionMapping) -> bool {
    let mut i = 0;
    let mut j = 0;
    while i < a.bindings.len() && j < b.bindings.len() {
        match a.bindings[i].0.cmp(&b.bindings[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                if a.bindings[i].1 != b.bindings[j].1 {
                    return false;
                }
                i += 1;
                j += 1;
            }
        }
    }
    true
}

/// Check if two mappings have at least one variable in common
pub fn shares_variable(a: &SolutionMapping, b: &SolutionMapping) -> bool {
    let mut i = 0;
    let mut j = 0;
    while i < a.bindings.len() && j < b.bindings.len() {
        match a.bindings[i].0.cmp(&b.bindings[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => return true,
        }
    }
    false
}

/// Merge two compatible mappings, or `None` if they conflict
pub fn merge(a: &SolutionMapping, b: &SolutionMapping) -> Option<SolutionMapping> {
    let mut out = Vec::with_capacity(a.bindings.len() + b.bindings.len());
    let mut i = 0;
    let mut j = 0;
    while i < a.bindings.len() && j < b.bindings.len() {
        match a.bindings[i].0.cmp(&b.bindings[j].0) {
            std::cmp::Ordering::Less => {
                out.push(a.bindings[i].clone());
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(b.bindings[j].clone());
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                if a.bindings[i].1 != b.bindings[j].1 {
                    return None;
                }
                out.push(a.bindings[i].clone());
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a.bindings[i..]);
    out.extend_from_slice(&b.bindings[j..]);
    Some(SolutionMapping { bindings: out })
}

/// Join two multisets: every compatible pair merged
///
/// The seed multiset for body evaluation is `[SolutionMapping::new()]`,
/// not the empty multiset.
pub fn join(left: &[SolutionMapping], right: &[SolutionMapping]) -> Vec<SolutionMapping> {
    let mut result = Vec::new();
    for mu1 in left {
        for mu2 in right {
            if let Some(merged) = merge(mu1, mu2) {
                result.push(merged);
            }
        }
    }
    result
}

/// Anti-join with SPARQL MINUS semantics
///
/// A mapping from `left` survives unless some mapping in `right` is
/// compatible with it *and* shares at least one variable. Disjoint-domain
/// mappings never remove anything.
pub fn minus(left: &[SolutionMapping], right: &[SolutionMapping]) -> Vec<SolutionMapping> {
    left.iter()
        .filter(|mu1| {
            !right
                .iter()
                .any(|mu2| compatible(mu1, mu2) && shares_variable(mu1, mu2))
        })
        .cloned()
        .collect()
}

//! RDF graph implementation
//!
//! A [`Graph`] is a set of triples (duplicates eliminated by term
//! equality) with hash indexes for pattern lookup. Insertion order is
//! preserved so iteration is deterministic for a fixed insertion
//! sequence, which keeps rule evaluation reproducible.

use fnv::{FnvBuildHasher, FnvHashMap};
use indexmap::IndexSet;

use crate::term::{Term, Triple};

/// A set of RDF triples with subject and predicate indexes
#[derive(Clone, Default)]
pub struct Graph {
    /// The triples, insertion-ordered
    triples: IndexSet<Triple, FnvBuildHasher>,
    /// Triple positions by subject term
    by_subject: FnvHashMap<Term, Vec<usize>>,
    /// Triple positions by predicate term
    by_predicate: FnvHashMap<Term, Vec<usize>>,
}

impl Graph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a triple, returning whether it was newly added
    pub fn insert(&mut self, triple: Triple) -> bool {
        if self.triples.contains(&triple) {
            return false;
        }
        let idx = self.triples.len();
        self.by_subject
            .entry(triple.subject.clone())
            .or_default()
            .push(idx);
        self.by_predicate
            .entry(triple.predicate.clone())
            .or_default()
            .push(idx);
        self.triples.insert(triple);
        true
    }

    /// Insert multiple triples
    pub fn extend(&mut self, triples: impl IntoIterator<Item = Triple>) {
        for triple in triples {
            self.insert(triple);
        }
    }

    /// Check if the graph contains a triple
    pub fn contains(&self, triple: &Triple) -> bool {
        self.triples.contains(triple)
    }

    /// Get the number of triples
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    /// Check if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Iterate over all triples in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    /// Find all triples matching the given slots, where `None` is a wildcard
    ///
    /// Lookup is served from the predicate index when the predicate is
    /// concrete, else from the subject index when the subject is, else by
    /// a full scan.
    pub fn matching(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
    ) -> Vec<&Triple> {
        let accept = |t: &Triple| {
            subject.map_or(true, |s| &t.subject == s)
                && predicate.map_or(true, |p| &t.predicate == p)
                && object.map_or(true, |o| &t.object == o)
        };

        let bucket = match (subject, predicate) {
            (_, Some(p)) => Some(self.by_predicate.get(p)),
            (Some(s), None) => Some(self.by_subject.get(s)),
            (None, None) => None,
        };

        match bucket {
            Some(Some(indices)) => indices
                .iter()
                .filter_map(|&i| self.triples.get_index(i))
                .filter(|t| accept(t))
                .collect(),
            // Indexed slot has no entry at all
            Some(None) => Vec::new(),
            None => self.triples.iter().filter(|t| accept(t)).collect(),
        }
    }

    /// Triples of `self` not present in `other`
    pub fn difference(&self, other: &Graph) -> Graph {
        self.iter()
            .filter(|t| !other.contains(t))
            .cloned()
            .collect()
    }
}

impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|t| other.contains(t))
    }
}

impl Eq for Graph {}

impl FromIterator<Triple> for Graph {
    fn from_iter<I: IntoIterator<Item = Triple>>(iter: I) -> Self {
        let mut graph = Graph::new();
        graph.extend(iter);
        graph
    }
}

impl<'a> IntoIterator for &'a Graph {
    type Item = &'a Triple;
    type IntoIter = indexmap::set::Iter<'a, Triple>;

    fn into_iter(self) -> Self::IntoIter {
        self.triples.iter()
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Graph {{")?;
        for triple in &self.triples {
            writeln!(f, "  {:?}", triple)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(s: &str, p: &str, o: &str) -> Triple {
        Triple::new(Term::iri(s), Term::iri(p), Term::iri(o))
    }

    #[test]
    fn test_insert_and_contains() {
        let mut graph = Graph::new();
        let t = triple("http://example.org/s", "http://example.org/p", "http://example.org/o");

        assert!(graph.insert(t.clone()));
        assert!(graph.contains(&t));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_no_duplicates() {
        let mut graph = Graph::new();
        let t = triple("http://example.org/s", "http://example.org/p", "http://example.org/o");

        assert!(graph.insert(t.clone()));
        assert!(!graph.insert(t));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_match_by_predicate() {
        let mut graph = Graph::new();
        graph.insert(triple("http://example.org/a", "http://example.org/knows", "http://example.org/b"));
        graph.insert(triple("http://example.org/a", "http://example.org/knows", "http://example.org/c"));
        graph.insert(triple("http://example.org/a", "http://example.org/likes", "http://example.org/b"));

        let knows = Term::iri("http://example.org/knows");
        let matches = graph.matching(None, Some(&knows), None);
        assert_eq!(matches.len(), 2);

        let a = Term::iri("http://example.org/a");
        let b = Term::iri("http://example.org/b");
        let matches = graph.matching(Some(&a), Some(&knows), Some(&b));
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn test_match_by_subject() {
        let mut graph = Graph::new();
        graph.insert(triple("http://example.org/a", "http://example.org/p", "http://example.org/b"));
        graph.insert(triple("http://example.org/c", "http://example.org/p", "http://example.org/d"));

        let a = Term::iri("http://example.org/a");
        let matches = graph.matching(Some(&a), None, None);
        assert_eq!(matches.len(), 1);

        let missing = Term::iri("http://example.org/nope");
        assert!(graph.matching(Some(&missing), None, None).is_empty());
    }

    #[test]
    fn test_set_equality_ignores_order() {
        let t1 = triple("http://example.org/a", "http://example.org/p", "http://example.org/b");
        let t2 = triple("http://example.org/c", "http://example.org/p", "http://example.org/d");

        let g1: Graph = vec![t1.clone(), t2.clone()].into_iter().collect();
        let g2: Graph = vec![t2, t1].into_iter().collect();
        assert_eq!(g1, g2);
    }

    #[test]
    fn test_difference() {
        let t1 = triple("http://example.org/a", "http://example.org/p", "http://example.org/b");
        let t2 = triple("http://example.org/c", "http://example.org/p", "http://example.org/d");

        let big: Graph = vec![t1.clone(), t2.clone()].into_iter().collect();
        let small: Graph = vec![t1].into_iter().collect();
        let diff = big.difference(&small);
        assert_eq!(diff.len(), 1);
        assert!(diff.contains(&t2));
    }
}

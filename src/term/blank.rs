//! Blank node representation

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counter for generating unique blank node identifiers
static BLANK_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A blank node (anonymous node)
///
/// Equality is identifier equality: two blank nodes denote the same node
/// within a graph iff their identifiers match.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlankNode {
    id: String,
}

impl BlankNode {
    /// Create a fresh blank node with a process-unique identifier
    pub fn fresh() -> Self {
        let n = BLANK_COUNTER.fetch_add(1, Ordering::SeqCst);
        BlankNode { id: format!("b{}", n) }
    }

    /// Create a blank node with an explicit identifier
    pub fn labeled(id: impl Into<String>) -> Self {
        BlankNode { id: id.into() }
    }

    /// Get the identifier
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Debug for BlankNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_:{}", self.id)
    }
}

impl fmt::Display for BlankNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_:{}", self.id)
    }
}

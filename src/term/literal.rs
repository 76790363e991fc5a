//! Literal value representation

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ns::{rdf, xsd};

/// Datatype of a literal
///
/// A plain literal is equivalent to an `xsd:string` typed one; the
/// constructors normalize so that the two compare equal.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Datatype {
    /// Simple literal (implicitly `xsd:string`)
    Plain,
    /// Language-tagged literal (implicitly `rdf:langString`)
    Language(String),
    /// Typed literal with an explicit datatype IRI
    Typed(String),
}

/// An RDF literal value
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Literal {
    value: String,
    datatype: Datatype,
}

impl Literal {
    /// Create a simple literal
    pub fn plain(value: impl Into<String>) -> Self {
        Literal {
            value: value.into(),
            datatype: Datatype::Plain,
        }
    }

    /// Create a typed literal
    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        let datatype = datatype.into();
        // Explicit xsd:string folds into the plain form so term equality
        // sees a single representation.
        if datatype == xsd::STRING {
            return Literal::plain(value);
        }
        Literal {
            value: value.into(),
            datatype: Datatype::Typed(datatype),
        }
    }

    /// Create a language-tagged literal (tags are normalized to lowercase)
    pub fn with_language(value: impl Into<String>, lang: impl Into<String>) -> Self {
        Literal {
            value: value.into(),
            datatype: Datatype::Language(lang.into().to_lowercase()),
        }
    }

    /// Create an `xsd:boolean` literal
    pub fn boolean(value: bool) -> Self {
        Literal::typed(if value { "true" } else { "false" }, xsd::BOOLEAN)
    }

    /// Create an `xsd:integer` literal
    pub fn integer(value: i64) -> Self {
        Literal::typed(value.to_string(), xsd::INTEGER)
    }

    /// Create an `xsd:double` literal
    pub fn double(value: f64) -> Self {
        Literal::typed(value.to_string(), xsd::DOUBLE)
    }

    /// Get the lexical value
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Get the datatype
    pub fn datatype(&self) -> &Datatype {
        &self.datatype
    }

    /// Get the datatype IRI, with plain and language-tagged literals
    /// resolving to `xsd:string` and `rdf:langString`
    pub fn datatype_iri(&self) -> &str {
        match &self.datatype {
            Datatype::Plain => xsd::STRING,
            Datatype::Language(_) => rdf::LANG_STRING,
            Datatype::Typed(iri) => iri,
        }
    }

    /// Check if this is a plain (simple) literal
    pub fn is_plain(&self) -> bool {
        matches!(self.datatype, Datatype::Plain)
    }

    /// Check if this literal carries a string value (simple or language-tagged)
    pub fn is_string(&self) -> bool {
        matches!(self.datatype, Datatype::Plain | Datatype::Language(_))
    }

    /// Get the language tag if present
    pub fn language(&self) -> Option<&str> {
        match &self.datatype {
            Datatype::Language(lang) => Some(lang),
            _ => None,
        }
    }

    /// Check if the datatype is one of the XSD numeric types
    pub fn is_numeric(&self) -> bool {
        matches!(
            self.datatype_iri(),
            xsd::INTEGER
                | xsd::DECIMAL
                | xsd::FLOAT
                | xsd::DOUBLE
                | xsd::INT
                | xsd::LONG
                | xsd::SHORT
                | xsd::BYTE
                | xsd::NON_NEGATIVE_INTEGER
                | xsd::POSITIVE_INTEGER
                | xsd::NON_POSITIVE_INTEGER
                | xsd::NEGATIVE_INTEGER
                | xsd::UNSIGNED_LONG
                | xsd::UNSIGNED_INT
                | xsd::UNSIGNED_SHORT
                | xsd::UNSIGNED_BYTE
        )
    }

    /// Try to parse the lexical form as an integer
    pub fn as_integer(&self) -> Option<i64> {
        self.value.parse().ok()
    }

    /// Try to parse the lexical form as a float
    pub fn as_float(&self) -> Option<f64> {
        self.value.parse().ok()
    }

    /// Try to parse the lexical form as a boolean
    pub fn as_boolean(&self) -> Option<bool> {
        match self.value.as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }
}

impl fmt::Debug for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.datatype {
            Datatype::Plain => write!(f, "\"{}\"", self.value),
            Datatype::Language(lang) => write!(f, "\"{}\"@{}", self.value, lang),
            Datatype::Typed(dt) => write!(f, "\"{}\"^^<{}>", self.value, dt),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

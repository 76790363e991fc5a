//! Structured error handling for the rule engine
//!
//! Provides a unified error type with:
//! - Error codes for programmatic handling
//! - Structured, JSON-friendly error values
//! - Context fields preserved through the evaluation pipeline
//!
//! # Error categories
//!
//! - `ParseError` / `MalformedRule` - AST contract violations, caught before evaluation
//! - `UnsafeNegation` / `UnsafeRule` - stratification failures
//! - `TypeError` - expression evaluation type mismatches (local to one mapping)
//! - `InvalidTripleConstruction` - a head template produced an ill-formed triple
//! - `BudgetExhausted` - iteration or derived-triple cap hit mid-evaluation

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique error codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // AST contract errors (1xxx)
    /// Generic parse / AST contract error
    ParseError = 1000,
    /// A rule violates a well-formedness condition
    MalformedRule = 1001,
    /// A data block contains a non-ground triple
    NonGroundData = 1002,

    // Stratification errors (2xxx)
    /// A dependency cycle passes through negation
    UnsafeNegation = 2000,
    /// A head variable is never bound by a positive body element
    UnsafeRule = 2001,

    // Evaluation errors (3xxx)
    /// Expression evaluation type mismatch
    TypeError = 3000,
    /// A head template produced an invalid subject or predicate
    InvalidTripleConstruction = 3001,

    // Budget errors (4xxx)
    /// Iteration or derived-triple cap exceeded
    BudgetExhausted = 4000,

    // Internal errors (9xxx)
    /// Internal invariant violation
    InternalError = 9000,
}

impl ErrorCode {
    /// Get the numeric code value
    pub fn code(&self) -> u32 {
        *self as u32
    }

    /// Get a short description of the error code
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "Parse error",
            ErrorCode::MalformedRule => "Malformed rule",
            ErrorCode::NonGroundData => "Non-ground data block",
            ErrorCode::UnsafeNegation => "Unsafe negation",
            ErrorCode::UnsafeRule => "Unsafe rule",
            ErrorCode::TypeError => "Type error",
            ErrorCode::InvalidTripleConstruction => "Invalid triple construction",
            ErrorCode::BudgetExhausted => "Budget exhausted",
            ErrorCode::InternalError => "Internal error",
        }
    }

    /// Whether an error with this code aborts evaluation
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ErrorCode::TypeError | ErrorCode::InvalidTripleConstruction)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// The main error type for the rule engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrlError {
    /// Error code for programmatic handling
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Key-value context fields (stratum, iteration, rule index, ...)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub fields: HashMap<String, String>,
    /// Hint for resolving the error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl SrlError {
    /// Create a new error with a code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            fields: HashMap::new(),
            hint: None,
        }
    }

    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, message)
    }

    /// Create a malformed-rule error
    pub fn malformed_rule(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedRule, message)
    }

    /// Create an unsafe-negation error
    pub fn unsafe_negation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnsafeNegation, message)
    }

    /// Create an unsafe-rule error
    pub fn unsafe_rule(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnsafeRule, message)
    }

    /// Create a budget-exhausted error
    pub fn budget_exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BudgetExhausted, message)
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Attach a context field
    pub fn with_field(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.fields.insert(key.into(), value.to_string());
        self
    }

    /// Attach a resolution hint
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for SrlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.description(), self.message)?;
        if !self.fields.is_empty() {
            let mut keys: Vec<&String> = self.fields.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}={}", k, self.fields[k]))
                .collect();
            write!(f, " ({})", parts.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for SrlError {}

/// Convenience result alias
pub type SrlResult<T> = Result<T, SrlError>;

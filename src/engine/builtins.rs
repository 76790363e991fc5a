//! Built-in function registry
//!
//! Implements the closed set of SPARQL-style built-ins:
//! - string: CONCAT, STRLEN, SUBSTR, UCASE, LCASE, STRSTARTS, STRENDS,
//!   CONTAINS, STRBEFORE, STRAFTER, REPLACE, REGEX, LANGMATCHES,
//!   ENCODE_FOR_URI
//! - numeric: ABS, ROUND, CEIL, FLOOR, RAND
//! - RDF term: STR, LANG, DATATYPE, IRI, BNODE, STRDT, STRLANG, isIRI,
//!   isBLANK, isLITERAL, isNUMERIC, UUID, STRUUID
//! - date/time: NOW, YEAR, MONTH, DAY, HOURS, MINUTES, SECONDS, TZ
//! - hash: MD5, SHA1, SHA256, SHA384, SHA512
//!
//! Each entry carries its arity bounds and an invocation callback, so new
//! built-ins register here without touching the evaluator. BOUND, IF,
//! COALESCE, and IN are functional forms with non-strict arguments and
//! live in the evaluator instead.

use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use fnv::FnvHashMap;
use md5::Md5;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use uuid::Uuid;

use crate::term::ns::xsd;
use crate::term::{Literal, Term};

use super::expressions::{numeric_of, parse_datetime, EvalContext, EvalError, Numeric};

/// Implementation callback for a built-in: arguments are already
/// evaluated to ground terms
pub type BuiltinFn = fn(&[Term], &EvalContext) -> Result<Term, EvalError>;

/// Registry entry: arity contract plus the callback
#[derive(Debug)]
pub struct BuiltinEntry {
    pub min_args: usize,
    pub max_args: usize,
    func: BuiltinFn,
}

/// Registry of built-in functions keyed by uppercase name
#[derive(Debug)]
pub struct BuiltinRegistry {
    entries: FnvHashMap<String, BuiltinEntry>,
}

impl BuiltinRegistry {
    /// Create a registry holding the standard built-ins
    pub fn new() -> Self {
        let mut registry = BuiltinRegistry {
            entries: FnvHashMap::default(),
        };

        registry.register_string();
        registry.register_numeric();
        registry.register_term();
        registry.register_time();
        registry.register_hash();

        registry
    }

    /// Register a built-in function
    pub fn register(&mut self, name: &str, min_args: usize, max_args: usize, func: BuiltinFn) {
        self.entries.insert(
            name.to_ascii_uppercase(),
            BuiltinEntry { min_args, max_args, func },
        );
    }

    /// Check if a name resolves to a built-in
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_uppercase())
    }

    /// Number of registered built-ins
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invoke a built-in by name, checking its arity contract
    pub fn invoke(&self, name: &str, args: &[Term], ctx: &EvalContext) -> Result<Term, EvalError> {
        let name = name.to_ascii_uppercase();
        let entry = self
            .entries
            .get(&name)
            .ok_or_else(|| EvalError::new(format!("unknown function {}", name)))?;
        if args.len() < entry.min_args || args.len() > entry.max_args {
            return Err(EvalError::new(format!(
                "{} expects {}..{} arguments, got {}",
                name, entry.min_args, entry.max_args, args.len()
            )));
        }
        (entry.func)(args, ctx)
    }

    fn register_string(&mut self) {
        self.register("CONCAT", 0, usize::MAX, |args, _| {
            let mut out = String::new();
            for arg in args {
                out.push_str(string_value(arg)?);
            }
            Ok(Term::literal(out))
        });

        self.register("STRLEN", 1, 1, |args, _| {
            let s = string_value(&args[0])?;
            Ok(Term::integer(s.chars().count() as i64))
        });

        // 1-indexed start, char-based, optional length
        self.register("SUBSTR", 2, 3, |args, _| {
            let s = string_value(&args[0])?;
            let start = integer_value(&args[1])?;
            let skip = (start - 1).max(0) as usize;
            let chars = s.chars().skip(skip);
            let result: String = match args.get(2) {
                Some(len_term) => {
                    let len = integer_value(len_term)?.max(0) as usize;
                    chars.take(len).collect()
                }
                None => chars.collect(),
            };
            Ok(Term::literal(result))
        });

        self.register("UCASE", 1, 1, |args, _| {
            Ok(Term::literal(string_value(&args[0])?.to_uppercase()))
        });

        self.register("LCASE", 1, 1, |args, _| {
            Ok(Term::literal(string_value(&args[0])?.to_lowercase()))
        });

        self.register("STRSTARTS", 2, 2, |args, _| {
            Ok(Term::boolean(string_value(&args[0])?.starts_with(string_value(&args[1])?)))
        });

        self.register("STRENDS", 2, 2, |args, _| {
            Ok(Term::boolean(string_value(&args[0])?.ends_with(string_value(&args[1])?)))
        });

        self.register("CONTAINS", 2, 2, |args, _| {
            Ok(Term::boolean(string_value(&args[0])?.contains(string_value(&args[1])?)))
        });

        self.register("STRBEFORE", 2, 2, |args, _| {
            let s = string_value(&args[0])?;
            let needle = string_value(&args[1])?;
            let result = match s.find(needle) {
                Some(idx) => &s[..idx],
                None => "",
            };
            Ok(Term::literal(result))
        });

        self.register("STRAFTER", 2, 2, |args, _| {
            let s = string_value(&args[0])?;
            let needle = string_value(&args[1])?;
            let result = match s.find(needle) {
                Some(idx) => &s[idx + needle.len()..],
                None => "",
            };
            Ok(Term::literal(result))
        });

        self.register("REPLACE", 3, 4, |args, _| {
            let s = string_value(&args[0])?;
            let pattern = string_value(&args[1])?;
            let replacement = string_value(&args[2])?;
            let flags = match args.get(3) {
                Some(t) => string_value(t)?,
                None => "",
            };
            let re = compile_regex(pattern, flags)?;
            Ok(Term::literal(re.replace_all(s, replacement).into_owned()))
        });

        self.register("REGEX", 2, 3, |args, _| {
            let s = string_value(&args[0])?;
            let pattern = string_value(&args[1])?;
            let flags = match args.get(2) {
                Some(t) => string_value(t)?,
                None => "",
            };
            let re = compile_regex(pattern, flags)?;
            Ok(Term::boolean(re.is_match(s)))
        });

        // Simplified RFC 4647 basic filtering: "*" matches any non-empty
        // tag, otherwise prefix match on subtag boundaries
        self.register("LANGMATCHES", 2, 2, |args, _| {
            let tag = string_value(&args[0])?.to_ascii_lowercase();
            let range = string_value(&args[1])?.to_ascii_lowercase();
            if range == "*" {
                return Ok(Term::boolean(!tag.is_empty()));
            }
            let matches = tag == range || tag.starts_with(&format!("{}-", range));
            Ok(Term::boolean(matches))
        });

        self.register("ENCODE_FOR_URI", 1, 1, |args, _| {
            let s = string_value(&args[0])?;
            Ok(Term::literal(utf8_percent_encode(s, URI_COMPONENT).to_string()))
        });
    }

    fn register_numeric(&mut self) {
        self.register("ABS", 1, 1, |args, _| {
            match numeric_arg(&args[0])? {
                Numeric::Integer(n) => n
                    .checked_abs()
                    .map(|n| Numeric::Integer(n).into_term())
                    .ok_or_else(|| EvalError::new("integer overflow")),
                Numeric::Decimal(n) => Ok(Numeric::Decimal(n.abs()).into_term()),
                Numeric::Float(n) => Ok(Numeric::Float(n.abs()).into_term()),
                Numeric::Double(n) => Ok(Numeric::Double(n.abs()).into_term()),
            }
        });

        self.register("ROUND", 1, 1, |args, _| {
            Ok(Term::integer(round_half_to_even(numeric_arg(&args[0])?.as_f64()) as i64))
        });

        self.register("CEIL", 1, 1, |args, _| {
            Ok(Term::integer(numeric_arg(&args[0])?.as_f64().ceil() as i64))
        });

        self.register("FLOOR", 1, 1, |args, _| {
            Ok(Term::integer(numeric_arg(&args[0])?.as_f64().floor() as i64))
        });

        // One draw per call
        self.register("RAND", 0, 0, |_, _| Ok(Term::double(rand::random::<f64>())));
    }

    fn register_term(&mut self) {
        self.register("STR", 1, 1, |args, _| {
            let s = match &args[0] {
                Term::Iri(iri) => iri.as_str().to_string(),
                Term::Literal(lit) => lit.value().to_string(),
                Term::Blank(b) => b.id().to_string(),
            };
            Ok(Term::literal(s))
        });

        self.register("LANG", 1, 1, |args, _| {
            let lit = literal_value(&args[0])?;
            Ok(Term::literal(lit.language().unwrap_or("")))
        });

        self.register("DATATYPE", 1, 1, |args, _| {
            let lit = literal_value(&args[0])?;
            Ok(Term::iri(lit.datatype_iri()))
        });

        self.register("IRI", 1, 1, builtin_iri);
        self.register("URI", 1, 1, builtin_iri);

        self.register("BNODE", 0, 1, |args, _| match args.first() {
            None => Ok(Term::fresh_blank()),
            Some(t) => Ok(Term::blank(string_value(t)?)),
        });

        self.register("STRDT", 2, 2, |args, _| {
            let lex = string_value(&args[0])?;
            let datatype = args[1]
                .as_iri()
                .ok_or_else(|| EvalError::new("STRDT: datatype must be an IRI"))?;
            Ok(Term::typed_literal(lex, datatype.as_str()))
        });

        self.register("STRLANG", 2, 2, |args, _| {
            let lex = string_value(&args[0])?;
            let lang = string_value(&args[1])?;
            if lang.is_empty() {
                return Err(EvalError::new("STRLANG: empty language tag"));
            }
            Ok(Term::lang_literal(lex, lang))
        });

        self.register("ISIRI", 1, 1, |args, _| Ok(Term::boolean(args[0].is_iri())));
        self.register("ISURI", 1, 1, |args, _| Ok(Term::boolean(args[0].is_iri())));
        self.register("ISBLANK", 1, 1, |args, _| Ok(Term::boolean(args[0].is_blank())));
        self.register("ISLITERAL", 1, 1, |args, _| Ok(Term::boolean(args[0].is_literal())));
        self.register("ISNUMERIC", 1, 1, |args, _| {
            Ok(Term::boolean(numeric_of(&args[0]).is_some()))
        });

        self.register("UUID", 0, 0, |_, _| {
            Ok(Term::iri(format!("urn:uuid:{}", Uuid::new_v4())))
        });

        self.register("STRUUID", 0, 0, |_, _| {
            Ok(Term::literal(Uuid::new_v4().to_string()))
        });
    }

    fn register_time(&mut self) {
        self.register("NOW", 0, 0, |_, ctx| {
            Ok(Term::typed_literal(ctx.now.to_rfc3339(), xsd::DATE_TIME))
        });

        self.register("YEAR", 1, 1, |args, _| {
            Ok(Term::integer(datetime_arg(&args[0])?.year() as i64))
        });

        self.register("MONTH", 1, 1, |args, _| {
            Ok(Term::integer(datetime_arg(&args[0])?.month() as i64))
        });

        self.register("DAY", 1, 1, |args, _| {
            Ok(Term::integer(datetime_arg(&args[0])?.day() as i64))
        });

        self.register("HOURS", 1, 1, |args, _| {
            Ok(Term::integer(datetime_arg(&args[0])?.hour() as i64))
        });

        self.register("MINUTES", 1, 1, |args, _| {
            Ok(Term::integer(datetime_arg(&args[0])?.minute() as i64))
        });

        self.register("SECONDS", 1, 1, |args, _| {
            let dt = datetime_arg(&args[0])?;
            let seconds = dt.second() as f64 + dt.nanosecond() as f64 / 1e9;
            Ok(Term::typed_literal(seconds.to_string(), xsd::DECIMAL))
        });

        self.register("TZ", 1, 1, |args, _| {
            let lit = literal_value(&args[0])?;
            if lit.datatype_iri() != xsd::DATE_TIME {
                return Err(EvalError::new("TZ expects an xsd:dateTime"));
            }
            // A parseable RFC 3339 form carries an explicit offset;
            // timezone-less forms yield the empty string.
            let tz = match DateTime::parse_from_rfc3339(lit.value()) {
                Ok(dt) => {
                    let offset = dt.offset().local_minus_utc();
                    if offset == 0 && lit.value().ends_with('Z') {
                        "Z".to_string()
                    } else {
                        format!("{}", dt.offset())
                    }
                }
                Err(_) => match parse_datetime(lit.value()) {
                    Some(_) => String::new(),
                    None => return Err(EvalError::new("invalid dateTime lexical form")),
                },
            };
            Ok(Term::literal(tz))
        });
    }

    fn register_hash(&mut self) {
        self.register("MD5", 1, 1, |args, _| {
            let mut hasher = Md5::new();
            hasher.update(string_value(&args[0])?.as_bytes());
            Ok(Term::literal(format!("{:x}", hasher.finalize())))
        });

        self.register("SHA1", 1, 1, |args, _| {
            let mut hasher = Sha1::new();
            hasher.update(string_value(&args[0])?.as_bytes());
            Ok(Term::literal(format!("{:x}", hasher.finalize())))
        });

        self.register("SHA256", 1, 1, |args, _| {
            let mut hasher = Sha256::new();
            hasher.update(string_value(&args[0])?.as_bytes());
            Ok(Term::literal(format!("{:x}", hasher.finalize())))
        });

        self.register("SHA384", 1, 1, |args, _| {
            let mut hasher = Sha384::new();
            hasher.update(string_value(&args[0])?.as_bytes());
            Ok(Term::literal(format!("{:x}", hasher.finalize())))
        });

        self.register("SHA512", 1, 1, |args, _| {
            let mut hasher = Sha512::new();
            hasher.update(string_value(&args[0])?.as_bytes());
            Ok(Term::literal(format!("{:x}", hasher.finalize())))
        });
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Unreserved characters (RFC 3986) survive ENCODE_FOR_URI unescaped
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn builtin_iri(args: &[Term], _ctx: &EvalContext) -> Result<Term, EvalError> {
    match &args[0] {
        Term::Iri(_) => Ok(args[0].clone()),
        Term::Literal(lit) if lit.is_string() => Ok(Term::iri(lit.value())),
        other => Err(EvalError::new(format!("IRI: cannot construct from {}", other))),
    }
}

// ===========================================================================
// Argument extraction helpers
// ===========================================================================

fn literal_value(term: &Term) -> Result<&Literal, EvalError> {
    term.as_literal()
        .ok_or_else(|| EvalError::new(format!("expected a literal, got {}", term)))
}

fn string_value(term: &Term) -> Result<&str, EvalError> {
    let lit = literal_value(term)?;
    if lit.is_string() {
        Ok(lit.value())
    } else {
        Err(EvalError::new(format!("expected a string literal, got {}", lit)))
    }
}

fn integer_value(term: &Term) -> Result<i64, EvalError> {
    match numeric_arg(term)? {
        Numeric::Integer(n) => Ok(n),
        other => Ok(other.as_f64() as i64),
    }
}

fn numeric_arg(term: &Term) -> Result<Numeric, EvalError> {
    numeric_of(term).ok_or_else(|| EvalError::new(format!("expected a numeric literal, got {}", term)))
}

fn datetime_arg(term: &Term) -> Result<DateTime<FixedOffset>, EvalError> {
    let lit = literal_value(term)?;
    if lit.datatype_iri() != xsd::DATE_TIME {
        return Err(EvalError::new(format!("expected an xsd:dateTime, got {}", lit)));
    }
    parse_datetime(lit.value()).ok_or_else(|| EvalError::new("invalid dateTime lexical form"))
}

fn compile_regex(pattern: &str, flags: &str) -> Result<Regex, EvalError> {
    let mut inline = String::new();
    for c in flags.chars() {
        match c {
            'i' => inline.push('i'),
            'm' => inline.push('m'),
            's' => inline.push('s'),
            'x' => inline.push('x'),
            _ => return Err(EvalError::new(format!("unsupported regex flag '{}'", c))),
        }
    }
    let full = if inline.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{}){}", inline, pattern)
    };
    Regex::new(&full).map_err(|e| EvalError::new(format!("invalid regex: {}", e)))
}

/// Round halfway cases to the nearest even integer
fn round_half_to_even(n: f64) -> f64 {
    let floor = n.floor();
    let diff = n - floor;
    if diff > 0.5 {
        floor + 1.0
    } else if diff < 0.5 {
        floor
    } else if (floor as i64) % 2 == 0 {
        floor
    } else {
        floor + 1.0
    }
}

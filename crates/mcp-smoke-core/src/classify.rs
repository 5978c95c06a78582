//! Line-shape classification for captured wrapper stdout.
//!
//! A line is *allowed* when a framing parser would tolerate it: blank,
//! a `Content-*` header, the start of a JSON value, or (as a last resort)
//! a line that parses as standalone JSON. Everything else is offending.

use once_cell::sync::Lazy;
use regex::Regex;

/// Verdict for a single stdout line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineVerdict {
    /// The line is tolerable on a protocol stream.
    pub allowed: bool,
    /// The line has the shape of a protocol frame start (header or JSON
    /// opener). A line that is merely JSON-parseable does not count: a
    /// bare `42` is tolerated but proves no handshake happened.
    pub protocol_indicating: bool,
}

static BLANK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*$").unwrap());
static HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*Content-(Length|Type):").unwrap());
static OBJECT_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\{").unwrap());
static ARRAY_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*\[\s*["{\[\]0-9tfn-]"#).unwrap());

struct LineRule {
    pattern: &'static Lazy<Regex>,
    protocol_indicating: bool,
}

/// Ordered rule table; first match wins. New framing conventions go here
/// without touching the aggregation logic in the evaluator.
static RULES: &[LineRule] = &[
    LineRule {
        pattern: &BLANK,
        protocol_indicating: false,
    },
    LineRule {
        pattern: &HEADER,
        protocol_indicating: true,
    },
    LineRule {
        pattern: &OBJECT_START,
        protocol_indicating: true,
    },
    LineRule {
        pattern: &ARRAY_START,
        protocol_indicating: true,
    },
];

/// Classify one captured stdout line.
pub fn classify(line: &str) -> LineVerdict {
    for rule in RULES {
        if rule.pattern.is_match(line) {
            return LineVerdict {
                allowed: true,
                protocol_indicating: rule.protocol_indicating,
            };
        }
    }

    // Last resort: tolerate a line that is valid JSON by itself. This
    // allowance deliberately does NOT set the protocol flag.
    if serde_json::from_str::<serde_json::Value>(line).is_ok() {
        return LineVerdict {
            allowed: true,
            protocol_indicating: false,
        };
    }

    LineVerdict {
        allowed: false,
        protocol_indicating: false,
    }
}

//! Lexical pre-filter. Trusts no structure: it runs before any parser so that
//! obfuscated payloads are caught on the raw text.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{RejectReason, Rejection};

static COMMENT_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"--|/\*|\*/").unwrap());

static UNION_SELECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bunion\b\s*(?:(?:all|distinct)\b\s*)?\(?\s*select\b").unwrap()
});

// `replace` alone is SQLite's read-only string function; only `REPLACE INTO`
// writes.
static MUTATING_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:insert|update|delete|drop|alter|create|truncate|merge|upsert|attach|detach|pragma|vacuum|reindex|grant|revoke|exec|execute|replace\s+into)\b",
    )
    .unwrap()
});

static PROCEDURE_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(?:xp|sp)_").unwrap());

/// Scan `query` for injection markers. Returns the first hit, in order:
/// statement separator, comment marker, `UNION SELECT`, mutating keyword,
/// stored-procedure prefix.
pub fn check(query: &str) -> Result<(), Rejection> {
    if let Some(token) = find_separator(query) {
        return Err(suspected(token));
    }
    if let Some(m) = COMMENT_MARKER.find(query) {
        return Err(suspected(m.as_str()));
    }
    if let Some(m) = UNION_SELECT.find(query) {
        return Err(suspected(&normalize(m.as_str())));
    }
    if let Some(m) = MUTATING_KEYWORD.find(query) {
        return Err(suspected(&normalize(m.as_str())));
    }
    if let Some(m) = PROCEDURE_PREFIX.find(query) {
        return Err(suspected(&m.as_str().to_lowercase()));
    }
    Ok(())
}

/// A single trailing `;` terminates the one statement; any other `;`
/// separates statements.
fn find_separator(query: &str) -> Option<&'static str> {
    let trimmed = query.trim();
    let body = trimmed.strip_suffix(';').unwrap_or(trimmed);
    body.contains(';').then_some(";")
}

fn suspected(token: &str) -> Rejection {
    Rejection::new(RejectReason::InjectionSuspected, token)
}

/// Lower-case and collapse internal whitespace so `DROP\n\tTABLE` reports as
/// `drop table`.
fn normalize(matched: &str) -> String {
    matched
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

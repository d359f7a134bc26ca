//! Safety judge for generated queries.
//!
//! A candidate query is accepted only when it passes three independent checks
//! run in fixed order, cheapest first, stopping at the first failure:
//!
//! 1. [`pattern`]: lexical scan of the raw text for mutating keywords,
//!    statement separators, comment markers and `UNION SELECT`.
//! 2. [`structure`]: parse with a SQL grammar; exactly one read-only query.
//! 3. [`references`]: every table and column must exist in the registry.
//!
//! The judge is pure: no I/O, no mutation of the query, same input same
//! verdict.

pub mod pattern;
pub mod references;
pub mod structure;

use serde::{Deserialize, Serialize};

use crate::schema::SchemaDescriptor;

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Closed set of reasons a candidate query can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    InjectionSuspected,
    MalformedSyntax,
    NotReadOnly,
    UnknownTable,
    UnknownColumn,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::InjectionSuspected => "injection_suspected",
            RejectReason::MalformedSyntax => "malformed_syntax",
            RejectReason::NotReadOnly => "not_read_only",
            RejectReason::UnknownTable => "unknown_table",
            RejectReason::UnknownColumn => "unknown_column",
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            RejectReason::InjectionSuspected => "Security violation",
            RejectReason::MalformedSyntax => "SQL parsing error",
            RejectReason::NotReadOnly => "Only SELECT queries are allowed",
            RejectReason::UnknownTable => "Invalid table referenced",
            RejectReason::UnknownColumn => "Invalid column referenced",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub reason: RejectReason,
    /// The offending token, parser message, statement kind or identifier.
    pub detail: String,
    /// Non-fatal findings accumulated before the rejection.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Rejection {
    pub fn new(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
            warnings: Vec::new(),
        }
    }

    /// Structured feedback for the next generation attempt: the exact reason,
    /// the rules the query must follow and the schema it must stay within.
    pub fn feedback(&self, schema: &SchemaDescriptor) -> String {
        let mut message = format!(
            "SQL Validation Failed: {} ({}): {}\n\n",
            self.reason.describe(),
            self.reason,
            self.detail
        );

        if !self.warnings.is_empty() {
            message.push_str("Warnings:\n");
            for warning in &self.warnings {
                message.push_str(&format!("- {warning}\n"));
            }
            message.push('\n');
        }

        message.push_str("Please revise your query following these guidelines:\n");
        message.push_str("1. Only SELECT statements are allowed\n");
        message.push_str("2. Use only tables and columns from the schema\n");
        message.push_str("3. No multiple statements, comments or dangerous commands\n\n");
        message.push_str(&schema.documentation());
        message
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.reason, self.detail)
    }
}

/// Outcome of judging one candidate query. There is no path from a failed
/// check to `Accepted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Accepted { warnings: Vec<String> },
    Rejected(Rejection),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted { .. })
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Verdict::Rejected(r) => Some(r),
            Verdict::Accepted { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<RejectReason> {
        self.rejection().map(|r| r.reason)
    }

    pub fn warnings(&self) -> &[String] {
        match self {
            Verdict::Accepted { warnings } => warnings,
            Verdict::Rejected(r) => &r.warnings,
        }
    }
}

// ---------------------------------------------------------------------------
// Judge
// ---------------------------------------------------------------------------

/// What to do with unqualified columns that cannot be pinned to a single
/// table (ambiguous across joins, or hidden behind a derived table).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmbiguityPolicy {
    /// Accept and report the finding as a warning.
    #[default]
    Warn,
    /// Treat the finding as `UnknownColumn`.
    Reject,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Judge {
    policy: AmbiguityPolicy,
}

impl Judge {
    pub fn new(policy: AmbiguityPolicy) -> Self {
        Self { policy }
    }

    pub fn judge(&self, query: &str, schema: &SchemaDescriptor) -> Verdict {
        if let Err(rejection) = pattern::check(query) {
            return Verdict::Rejected(rejection);
        }

        let statement = match structure::check(query) {
            Ok(statement) => statement,
            Err(rejection) => return Verdict::Rejected(rejection),
        };

        match references::check(&statement, schema, self.policy) {
            Ok(warnings) => Verdict::Accepted { warnings },
            Err(rejection) => Verdict::Rejected(rejection),
        }
    }
}

/// Judge `query` with the default (warn-only) ambiguity policy.
pub fn judge(query: &str, schema: &SchemaDescriptor) -> Verdict {
    Judge::default().judge(query, schema)
}

//! Authoritative read-only check: the text must parse as exactly one query
//! statement, and nothing inside that query may write.

use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

use super::{RejectReason, Rejection};

/// Parse `query` and return its single statement if it is a read.
pub fn check(query: &str) -> Result<Statement, Rejection> {
    let mut statements = Parser::parse_sql(&SQLiteDialect {}, query)
        .map_err(|e| Rejection::new(RejectReason::MalformedSyntax, e.to_string()))?;

    match statements.len() {
        0 => Err(Rejection::new(RejectReason::MalformedSyntax, "empty query")),
        1 => {
            let statement = statements.remove(0);
            match &statement {
                Statement::Query(query) => {
                    check_query(query)
                        .map_err(|kind| Rejection::new(RejectReason::NotReadOnly, kind))?;
                }
                other => {
                    return Err(Rejection::new(
                        RejectReason::NotReadOnly,
                        statement_kind(other),
                    ))
                }
            }
            Ok(statement)
        }
        n => Err(Rejection::new(
            RejectReason::InjectionSuspected,
            format!("{n} statements"),
        )),
    }
}

fn check_query(query: &Query) -> Result<(), String> {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            check_query(&cte.query)?;
        }
    }
    check_set_expr(&query.body)
}

fn check_set_expr(body: &SetExpr) -> Result<(), String> {
    match body {
        SetExpr::Select(select) => {
            if select.into.is_some() {
                return Err("SELECT INTO".to_string());
            }
            Ok(())
        }
        SetExpr::Query(query) => check_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            check_set_expr(left)?;
            check_set_expr(right)
        }
        SetExpr::Values(_) => Ok(()),
        other => Err(leading_keyword(&other.to_string())),
    }
}

/// Leading keyword of a statement, e.g. `EXPLAIN` or `COMMIT`.
fn statement_kind(statement: &Statement) -> String {
    leading_keyword(&statement.to_string())
}

fn leading_keyword(text: &str) -> String {
    text.split_whitespace()
        .next()
        .unwrap_or("statement")
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_parses() {
        let stmt = check("SELECT name FROM recipes WHERE id = 1").unwrap();
        assert!(matches!(stmt, Statement::Query(_)));
    }

    #[test]
    fn garbage_is_malformed() {
        let err = check("SELEC name FROM").unwrap_err();
        assert_eq!(err.reason, RejectReason::MalformedSyntax);
        let err = check("   ").unwrap_err();
        assert_eq!(err.reason, RejectReason::MalformedSyntax);
    }

    #[test]
    fn non_query_statements_are_not_read_only() {
        let err = check("COMMIT").unwrap_err();
        assert_eq!(err.reason, RejectReason::NotReadOnly);
        assert_eq!(err.detail, "COMMIT");

        let err = check("EXPLAIN SELECT name FROM recipes").unwrap_err();
        assert_eq!(err.reason, RejectReason::NotReadOnly);
        assert_eq!(err.detail, "EXPLAIN");
    }
}

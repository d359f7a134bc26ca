//! Schema check: every table and column the statement touches must come from
//! the registry.
//!
//! Resolution is best-effort. Bindings from every `FROM`/`JOIN` in the
//! statement (including subqueries) form a single scope, so correlated
//! subqueries resolve without tracking nesting. Derived tables and CTEs
//! expose the names of their select list when it has no wildcard; table
//! functions and wildcard projections stay opaque, so anything qualified by
//! them is accepted and unresolved bare columns only warn.
//!
//! A select-list alias stands in for a column only as a bare name in the
//! `WHERE`, `GROUP BY`, `HAVING` or `ORDER BY` of the query that defines it.

use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;

use sqlparser::ast::{
    Expr, Ident, Query, SelectItem, SetExpr, Statement, TableFactor, TableWithJoins, Visit,
    Visitor,
};

use super::{AmbiguityPolicy, RejectReason, Rejection};
use crate::schema::{SchemaDescriptor, TableSchema};

// ---------------------------------------------------------------------------
// Collected references
// ---------------------------------------------------------------------------

/// Output columns of a derived source, `None` when they cannot be named.
type Outputs = Option<HashSet<String>>;

#[derive(Debug)]
enum Source {
    /// Named table or CTE, lower-cased.
    Table(String),
    Derived(Outputs),
}

#[derive(Debug)]
struct Binding {
    /// Alias or table name, lower-cased.
    name: String,
    source: Source,
}

#[derive(Debug)]
struct ColumnReference {
    qualifier: Option<String>,
    column: String,
}

impl ColumnReference {
    fn display(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{q}.{}", self.column),
            None => self.column.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct ReferenceCollector {
    bindings: Vec<Binding>,
    ctes: HashMap<String, Outputs>,
    /// Bare alias uses per name that may skip registry resolution.
    alias_uses: HashMap<String, usize>,
    wildcard_qualifiers: Vec<String>,
    columns: Vec<ColumnReference>,
}

fn lower(ident: &Ident) -> String {
    ident.value.to_lowercase()
}

/// Names a query's result columns carry, following the left arm of set
/// operations the way SQLite does.
fn output_columns(body: &SetExpr) -> Outputs {
    match body {
        SetExpr::Select(select) => {
            let mut names = HashSet::new();
            for item in &select.projection {
                match item {
                    SelectItem::ExprWithAlias { alias, .. } => {
                        names.insert(lower(alias));
                    }
                    SelectItem::UnnamedExpr(Expr::Identifier(ident)) => {
                        names.insert(lower(ident));
                    }
                    SelectItem::UnnamedExpr(Expr::CompoundIdentifier(parts)) => {
                        if let Some(last) = parts.last() {
                            names.insert(lower(last));
                        }
                    }
                    SelectItem::UnnamedExpr(_) => {}
                    SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..) => return None,
                }
            }
            Some(names)
        }
        SetExpr::Query(query) => output_columns(&query.body),
        SetExpr::SetOperation { left, .. } => output_columns(left),
        _ => None,
    }
}

fn declared_or_projected(declared: &[Ident], query: &Query) -> Outputs {
    if declared.is_empty() {
        output_columns(&query.body)
    } else {
        Some(declared.iter().map(lower).collect())
    }
}

impl ReferenceCollector {
    fn collect_set_expr(&mut self, body: &SetExpr) {
        match body {
            SetExpr::Select(select) => {
                for item in &select.projection {
                    if let SelectItem::QualifiedWildcard(name, _) = item {
                        if let Some(qualifier) = name.0.last() {
                            self.wildcard_qualifiers.push(lower(qualifier));
                        }
                    }
                }
                for table in &select.from {
                    self.collect_table_with_joins(table);
                }
            }
            SetExpr::SetOperation { left, right, .. } => {
                self.collect_set_expr(left);
                self.collect_set_expr(right);
            }
            // Nested queries are reached by the visitor on their own.
            _ => {}
        }
    }

    /// Record bare uses of this query's own aliases in the clauses SQLite
    /// resolves them in. Subqueries are left to their own level.
    fn collect_alias_uses(&mut self, query: &Query) {
        let SetExpr::Select(select) = query.body.as_ref() else {
            return;
        };
        let aliases: HashSet<String> = select
            .projection
            .iter()
            .filter_map(|item| match item {
                SelectItem::ExprWithAlias { alias, .. } => Some(lower(alias)),
                _ => None,
            })
            .collect();
        if aliases.is_empty() {
            return;
        }

        let mut bare = BareIdentifiers::default();
        walk(&select.selection, &mut bare);
        walk(&select.group_by, &mut bare);
        walk(&select.having, &mut bare);
        walk(&query.order_by, &mut bare);

        for name in bare.names {
            if aliases.contains(&name) {
                *self.alias_uses.entry(name).or_default() += 1;
            }
        }
    }

    fn collect_table_with_joins(&mut self, table: &TableWithJoins) {
        self.collect_factor(&table.relation);
        for join in &table.joins {
            self.collect_factor(&join.relation);
        }
    }

    fn collect_factor(&mut self, factor: &TableFactor) {
        match factor {
            TableFactor::Table {
                name, alias, args, ..
            } => {
                let Some(table) = name.0.last().map(lower) else {
                    return;
                };
                // Table-valued function such as `json_each(...)`.
                if args.is_some() {
                    let name = alias.as_ref().map_or(table, |a| lower(&a.name));
                    self.push_derived(Some(name), None);
                    return;
                }
                if let Some(alias) = alias {
                    self.bindings.push(Binding {
                        name: lower(&alias.name),
                        source: Source::Table(table.clone()),
                    });
                }
                self.bindings.push(Binding {
                    name: table.clone(),
                    source: Source::Table(table),
                });
            }
            TableFactor::Derived {
                subquery, alias, ..
            } => {
                let outputs = match alias {
                    Some(alias) => declared_or_projected(&alias.columns, subquery),
                    None => output_columns(&subquery.body),
                };
                self.push_derived(alias.as_ref().map(|a| lower(&a.name)), outputs);
            }
            TableFactor::NestedJoin {
                table_with_joins,
                alias,
            } => {
                self.collect_table_with_joins(table_with_joins);
                if let Some(alias) = alias {
                    self.push_derived(Some(lower(&alias.name)), None);
                }
            }
            _ => self.push_derived(None, None),
        }
    }

    fn push_derived(&mut self, name: Option<String>, outputs: Outputs) {
        self.bindings.push(Binding {
            name: name.unwrap_or_default(),
            source: Source::Derived(outputs),
        });
    }
}

impl Visitor for ReferenceCollector {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                let outputs = declared_or_projected(&cte.alias.columns, &cte.query);
                self.ctes.insert(lower(&cte.alias.name), outputs);
            }
        }
        self.collect_set_expr(&query.body);
        self.collect_alias_uses(query);
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        match expr {
            Expr::Identifier(ident) => self.columns.push(ColumnReference {
                qualifier: None,
                column: lower(ident),
            }),
            Expr::CompoundIdentifier(parts) if parts.len() >= 2 => {
                let n = parts.len();
                self.columns.push(ColumnReference {
                    qualifier: Some(lower(&parts[n - 2])),
                    column: lower(&parts[n - 1]),
                });
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }
}

/// Bare identifiers of one query level, skipping nested subqueries.
#[derive(Default)]
struct BareIdentifiers {
    depth: usize,
    names: Vec<String>,
}

impl Visitor for BareIdentifiers {
    type Break = ();

    fn pre_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.depth += 1;
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.depth -= 1;
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        if let (0, Expr::Identifier(ident)) = (self.depth, expr) {
            self.names.push(lower(ident));
        }
        ControlFlow::Continue(())
    }
}

/// Drive a collector over `node`. Collectors always continue, so the walk
/// covers the whole tree.
fn walk<N: Visit, V: Visitor<Break = ()>>(node: &N, visitor: &mut V) {
    let flow = node.visit(visitor);
    debug_assert!(flow.is_continue());
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

enum Resolved<'s> {
    Table(&'s TableSchema),
    Derived(Outputs),
}

impl Resolved<'_> {
    fn exposes(&self, column: &str) -> bool {
        match self {
            Resolved::Table(table) => table.has_column(column),
            Resolved::Derived(None) => true,
            Resolved::Derived(Some(outputs)) => outputs.contains(column),
        }
    }
}

struct Scope<'s> {
    bindings: Vec<(String, Resolved<'s>)>,
}

impl<'s> Scope<'s> {
    fn is_bound(&self, name: &str) -> bool {
        self.bindings.iter().any(|(n, _)| n == name)
    }

    fn has_unnamed_outputs(&self) -> bool {
        self.bindings
            .iter()
            .any(|(_, r)| matches!(r, Resolved::Derived(None)))
    }

    /// Candidate sources for a bare `column`: distinct registry tables that
    /// own it, or failing that the derived sources that expose it by name.
    fn owners(&self, column: &str) -> Vec<String> {
        let mut tables: Vec<String> = Vec::new();
        let mut derived: Vec<String> = Vec::new();
        for (name, resolved) in &self.bindings {
            match resolved {
                Resolved::Table(table) if table.has_column(column) => {
                    if !tables.contains(&table.name) {
                        tables.push(table.name.clone());
                    }
                }
                Resolved::Derived(Some(outputs)) if outputs.contains(column) => {
                    if !derived.contains(name) {
                        derived.push(name.clone());
                    }
                }
                _ => {}
            }
        }
        if tables.is_empty() {
            derived
        } else {
            tables
        }
    }
}

/// Check every table and column reference in `statement` against `schema`.
/// Returns the accumulated warnings when the statement is acceptable.
pub fn check(
    statement: &Statement,
    schema: &SchemaDescriptor,
    policy: AmbiguityPolicy,
) -> Result<Vec<String>, Rejection> {
    let mut collector = ReferenceCollector::default();
    walk(statement, &mut collector);

    let scope = resolve_tables(&collector, schema)?;

    for qualifier in &collector.wildcard_qualifiers {
        if !scope.is_bound(qualifier) {
            return Err(unknown_column(format!("{qualifier}.*"), Vec::new()));
        }
    }

    let mut alias_uses = collector.alias_uses;
    let mut findings = Findings::default();
    for column in &collector.columns {
        match &column.qualifier {
            Some(qualifier) => {
                let known = scope
                    .bindings
                    .iter()
                    .filter(|(name, _)| name == qualifier)
                    .any(|(_, resolved)| resolved.exposes(&column.column));
                if !known {
                    return Err(unknown_column(column.display(), findings.warnings));
                }
            }
            None => {
                let owners = scope.owners(&column.column);
                if owners.len() == 1 {
                    continue;
                }
                if let Some(uses) = alias_uses.get_mut(&column.column).filter(|n| **n > 0) {
                    *uses -= 1;
                    continue;
                }
                match owners.len() {
                    0 if scope.has_unnamed_outputs() => findings.warn(
                        column,
                        format!(
                            "Column '{}' could not be resolved against a known table",
                            column.column
                        ),
                    ),
                    0 => return Err(unknown_column(column.display(), findings.warnings)),
                    _ => findings.warn(
                        column,
                        format!(
                            "Column '{}' is ambiguous between tables: {}",
                            column.column,
                            owners.join(", ")
                        ),
                    ),
                }
            }
        }
    }

    if policy == AmbiguityPolicy::Reject {
        if let Some(column) = findings.first_unresolved {
            return Err(unknown_column(column, findings.warnings));
        }
    }

    Ok(findings.warnings)
}

#[derive(Default)]
struct Findings {
    warnings: Vec<String>,
    first_unresolved: Option<String>,
}

impl Findings {
    fn warn(&mut self, column: &ColumnReference, message: String) {
        if self.first_unresolved.is_none() {
            self.first_unresolved = Some(column.display());
        }
        if !self.warnings.contains(&message) {
            self.warnings.push(message);
        }
    }
}

fn resolve_tables<'s>(
    collector: &ReferenceCollector,
    schema: &'s SchemaDescriptor,
) -> Result<Scope<'s>, Rejection> {
    let mut bindings = Vec::with_capacity(collector.bindings.len());
    for binding in &collector.bindings {
        let resolved = match &binding.source {
            Source::Derived(outputs) => Resolved::Derived(outputs.clone()),
            Source::Table(name) => match collector.ctes.get(name) {
                Some(outputs) => Resolved::Derived(outputs.clone()),
                None => match schema.table(name) {
                    Some(table) => Resolved::Table(table),
                    None => {
                        return Err(Rejection::new(RejectReason::UnknownTable, name.clone()))
                    }
                },
            },
        };
        bindings.push((binding.name.clone(), resolved));
    }
    Ok(Scope { bindings })
}

fn unknown_column(column: String, warnings: Vec<String>) -> Rejection {
    Rejection {
        reason: RejectReason::UnknownColumn,
        detail: column,
        warnings,
    }
}

use pantry_core::judge::{judge, AmbiguityPolicy, Judge, RejectReason, Verdict};
use pantry_core::schema::SchemaDescriptor;

fn schema() -> SchemaDescriptor {
    SchemaDescriptor::recipes()
}

fn reason(query: &str) -> Option<RejectReason> {
    judge(query, &schema()).reason()
}

fn rejection_detail(query: &str) -> String {
    match judge(query, &schema()) {
        Verdict::Rejected(r) => r.detail,
        Verdict::Accepted { .. } => panic!("expected rejection for {query}"),
    }
}

// ---------------------------------------------------------------------------
// 1. Mutating keywords are rejected in any case or spacing
// ---------------------------------------------------------------------------
#[test]
fn test_mutating_keywords_rejected() {
    let queries = [
        "DROP TABLE recipes",
        "drop table recipes",
        "DrOp\n\tTaBlE recipes",
        "DELETE FROM recipes WHERE id = 1",
        "UPDATE recipes SET name = 'x'",
        "INSERT INTO users (name) VALUES ('eve')",
        "SELECT name FROM recipes WHERE id IN (DELETE FROM recipes)",
        "ALTER TABLE recipes ADD COLUMN x TEXT",
        "CREATE TABLE t (id INTEGER)",
        "ATTACH DATABASE 'x.db' AS x",
        "PRAGMA table_info(recipes)",
        "REPLACE  INTO users (id, name) VALUES (1, 'x')",
        "TRUNCATE TABLE recipes",
        "EXEC xp_cmdshell 'dir'",
    ];
    for q in queries {
        assert_eq!(
            reason(q),
            Some(RejectReason::InjectionSuspected),
            "query not flagged: {q}"
        );
    }
}

#[test]
fn test_mutating_keyword_detail_is_normalized() {
    assert_eq!(rejection_detail("SELECT 1 FROM recipes WHERE\nDROP"), "drop");
    assert_eq!(
        rejection_detail("REPLACE\n   INTO users VALUES (1, 'x')"),
        "replace into"
    );
}

#[test]
fn test_keyword_substrings_are_not_flagged() {
    let verdict = judge(
        "SELECT name, created_at FROM recipes WHERE description LIKE '%crisp%'",
        &schema(),
    );
    assert!(verdict.is_accepted(), "got {verdict:?}");

    // The string function `replace` is read-only.
    let verdict = judge(
        "SELECT replace(name, 'a', 'b') AS renamed FROM recipes",
        &schema(),
    );
    assert!(verdict.is_accepted(), "got {verdict:?}");
}

// ---------------------------------------------------------------------------
// 2. Separators, comments, UNION, procedure prefixes
// ---------------------------------------------------------------------------
#[test]
fn test_stacked_statements_rejected_on_separator() {
    let q = "SELECT * FROM recipes; DROP TABLE recipes;";
    match judge(q, &schema()) {
        Verdict::Rejected(r) => {
            assert_eq!(r.reason, RejectReason::InjectionSuspected);
            assert_eq!(r.detail, ";");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[test]
fn test_single_trailing_semicolon_allowed() {
    assert!(judge("SELECT COUNT(*) FROM recipes;", &schema()).is_accepted());
    assert_eq!(
        reason("SELECT COUNT(*) FROM recipes;;"),
        Some(RejectReason::InjectionSuspected)
    );
}

#[test]
fn test_comment_markers_rejected() {
    assert_eq!(rejection_detail("SELECT name FROM recipes --"), "--");
    assert_eq!(rejection_detail("SELECT name /* x */ FROM recipes"), "/*");
    assert_eq!(rejection_detail("SELECT name FROM recipes */"), "*/");
    // Comment splitting a keyword is still caught, on the comment.
    assert_eq!(reason("DR/**/OP TABLE recipes"), Some(RejectReason::InjectionSuspected));
}

#[test]
fn test_union_rejected_before_schema_check() {
    // `users` has no `password` column, but the pattern check fires first.
    let q = "SELECT name FROM recipes UNION SELECT password FROM users";
    match judge(q, &schema()) {
        Verdict::Rejected(r) => {
            assert_eq!(r.reason, RejectReason::InjectionSuspected);
            assert_eq!(r.detail, "union select");
        }
        other => panic!("expected rejection, got {other:?}"),
    }

    assert_eq!(
        rejection_detail("SELECT name FROM recipes UNION ALL (SELECT name FROM users)"),
        "union all (select"
    );
}

#[test]
fn test_procedure_prefix_rejected() {
    assert_eq!(
        reason("SELECT sp_password FROM users"),
        Some(RejectReason::InjectionSuspected)
    );
}

// ---------------------------------------------------------------------------
// 3. Structure
// ---------------------------------------------------------------------------
#[test]
fn test_syntactically_invalid_is_malformed() {
    let queries = [
        "SELEC name FROM recipes",
        "SELECT name FROM",
        "SELECT (name FROM recipes",
        "",
        "   ",
        "give me all the recipes",
    ];
    for q in queries {
        let verdict = judge(q, &schema());
        assert!(!verdict.is_accepted(), "accepted invalid query: {q:?}");
        assert_eq!(
            verdict.reason(),
            Some(RejectReason::MalformedSyntax),
            "query: {q:?}"
        );
    }
}

#[test]
fn test_non_select_statements_are_not_read_only() {
    assert_eq!(reason("BEGIN TRANSACTION"), Some(RejectReason::NotReadOnly));
    assert_eq!(reason("ROLLBACK"), Some(RejectReason::NotReadOnly));
    assert_eq!(
        reason("EXPLAIN SELECT name FROM recipes"),
        Some(RejectReason::NotReadOnly)
    );
}

// ---------------------------------------------------------------------------
// 4. Schema references
// ---------------------------------------------------------------------------
#[test]
fn test_known_selects_accepted() {
    let queries = [
        "SELECT COUNT(*) FROM recipes",
        "SELECT name, prep_time + cook_time AS total_time FROM recipes ORDER BY total_time",
        "SELECT cuisine_type, COUNT(*) AS n FROM recipes GROUP BY cuisine_type ORDER BY n DESC",
        "SELECT r.name, i.name FROM recipes r \
         JOIN recipe_ingredients ri ON ri.recipe_id = r.id \
         JOIN ingredients i ON i.id = ri.ingredient_id \
         WHERE i.category = 'dairy'",
        "SELECT name FROM recipes WHERE id IN \
         (SELECT recipe_id FROM recipe_ingredients WHERE quantity IS NOT NULL)",
        "SELECT AVG(prep_time) FROM recipes WHERE difficulty = 'easy' LIMIT 10",
        "SELECT RECIPES.NAME FROM RECIPES",
    ];
    for q in queries {
        let verdict = judge(q, &schema());
        assert!(verdict.is_accepted(), "rejected {q}: {verdict:?}");
    }
}

#[test]
fn test_unknown_table_rejected() {
    for (q, table) in [
        ("SELECT name FROM favorites", "favorites"),
        ("SELECT * FROM starred_recipes", "starred_recipes"),
        (
            "SELECT r.name FROM recipes r JOIN ratings x ON x.recipe_id = r.id",
            "ratings",
        ),
        (
            "SELECT name FROM recipes WHERE id IN (SELECT recipe_id FROM reviews)",
            "reviews",
        ),
    ] {
        match judge(q, &schema()) {
            Verdict::Rejected(r) => {
                assert_eq!(r.reason, RejectReason::UnknownTable, "query: {q}");
                assert_eq!(r.detail, table);
            }
            other => panic!("expected UnknownTable for {q}, got {other:?}"),
        }
    }
}

#[test]
fn test_unknown_column_rejected() {
    match judge("SELECT rating FROM recipes", &schema()) {
        Verdict::Rejected(r) => {
            assert_eq!(r.reason, RejectReason::UnknownColumn);
            assert_eq!(r.detail, "rating");
        }
        other => panic!("expected UnknownColumn, got {other:?}"),
    }

    match judge("SELECT r.calories FROM recipes r", &schema()) {
        Verdict::Rejected(r) => {
            assert_eq!(r.reason, RejectReason::UnknownColumn);
            assert_eq!(r.detail, "r.calories");
        }
        other => panic!("expected UnknownColumn, got {other:?}"),
    }

    // Qualifier that names nothing in scope.
    assert_eq!(
        reason("SELECT z.name FROM recipes r"),
        Some(RejectReason::UnknownColumn)
    );
}

#[test]
fn test_alias_does_not_hide_unknown_column() {
    for (q, column) in [
        ("SELECT AVG(rating) AS rating FROM recipes", "rating"),
        ("SELECT password AS password FROM users", "password"),
        ("SELECT AVG(rating) AS rating FROM recipes ORDER BY rating", "rating"),
        // An alias from a subquery does not leak into the outer WHERE.
        (
            "SELECT name AS n FROM recipes \
             WHERE calories = 1 OR n = calories AND 1 = (SELECT 1 AS calories)",
            "calories",
        ),
    ] {
        match judge(q, &schema()) {
            Verdict::Rejected(r) => {
                assert_eq!(r.reason, RejectReason::UnknownColumn, "query: {q}");
                assert_eq!(r.detail, column, "query: {q}");
            }
            other => panic!("expected UnknownColumn for {q}, got {other:?}"),
        }
    }
}

#[test]
fn test_alias_usable_in_its_own_query() {
    for q in [
        "SELECT name AS n FROM recipes ORDER BY n",
        "SELECT name AS n FROM recipes WHERE n LIKE 'a%'",
        "SELECT cuisine_type AS c, COUNT(*) AS total FROM recipes GROUP BY c HAVING total > 1",
    ] {
        assert_eq!(
            judge(q, &schema()),
            Verdict::Accepted { warnings: vec![] },
            "query: {q}"
        );
    }
}

#[test]
fn test_qualified_wildcard_needs_binding() {
    match judge("SELECT nosuch.* FROM recipes", &schema()) {
        Verdict::Rejected(r) => {
            assert_eq!(r.reason, RejectReason::UnknownColumn);
            assert_eq!(r.detail, "nosuch.*");
        }
        other => panic!("expected UnknownColumn, got {other:?}"),
    }

    assert!(judge("SELECT r.* FROM recipes r", &schema()).is_accepted());
    assert!(judge("SELECT recipes.*, u.name FROM recipes JOIN users u ON u.id = recipes.id", &schema())
        .is_accepted());
}

// ---------------------------------------------------------------------------
// 5. Ambiguity policy
// ---------------------------------------------------------------------------
const AMBIGUOUS: &str = "SELECT name FROM recipes r \
    JOIN recipe_ingredients ri ON ri.recipe_id = r.id \
    JOIN ingredients i ON i.id = ri.ingredient_id";

#[test]
fn test_ambiguous_column_warns_by_default() {
    let verdict = judge(AMBIGUOUS, &schema());
    assert!(verdict.is_accepted(), "got {verdict:?}");
    let warnings = verdict.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("'name'"), "{warnings:?}");
    assert!(warnings[0].contains("recipes"));
    assert!(warnings[0].contains("ingredients"));
}

#[test]
fn test_ambiguous_column_rejected_under_strict_policy() {
    let judge = Judge::new(AmbiguityPolicy::Reject);
    match judge.judge(AMBIGUOUS, &schema()) {
        Verdict::Rejected(r) => {
            assert_eq!(r.reason, RejectReason::UnknownColumn);
            assert_eq!(r.detail, "name");
            assert_eq!(r.warnings.len(), 1);
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[test]
fn test_derived_tables_and_ctes_expose_their_select_list() {
    let derived = "SELECT t.total FROM (SELECT COUNT(*) AS total FROM recipes) t";
    assert!(judge(derived, &schema()).is_accepted());

    let cte = "WITH quick AS (SELECT id, name FROM recipes WHERE prep_time < 15) \
               SELECT quick.name FROM quick";
    assert!(judge(cte, &schema()).is_accepted());

    let named = "WITH quick(recipe_name) AS (SELECT name FROM recipes) \
                 SELECT recipe_name FROM quick";
    let verdict = judge(named, &schema());
    assert_eq!(verdict, Verdict::Accepted { warnings: vec![] });

    let hidden = "SELECT minutes FROM (SELECT prep_time AS minutes FROM recipes) t";
    assert_eq!(judge(hidden, &schema()), Verdict::Accepted { warnings: vec![] });

    // Names the derived select list does not produce.
    assert_eq!(
        reason("SELECT t.calories FROM (SELECT name FROM recipes) t"),
        Some(RejectReason::UnknownColumn)
    );
    assert_eq!(
        reason("SELECT servings_label FROM (SELECT servings FROM recipes) t"),
        Some(RejectReason::UnknownColumn)
    );
}

#[test]
fn test_wildcard_sources_stay_opaque() {
    // A `*` select list hides the derived columns, so bare names only warn.
    let q = "SELECT servings_label FROM (SELECT * FROM recipes) t";
    let verdict = judge(q, &schema());
    assert!(verdict.is_accepted(), "got {verdict:?}");
    assert_eq!(verdict.warnings().len(), 1);
    assert!(judge("SELECT t.anything FROM (SELECT * FROM recipes) t", &schema()).is_accepted());

    let strict = Judge::new(AmbiguityPolicy::Reject);
    let verdict = strict.judge(q, &schema());
    assert_eq!(verdict.reason(), Some(RejectReason::UnknownColumn));
}

// ---------------------------------------------------------------------------
// 6. Scenario: synthesized answer to an injection-laden question
// ---------------------------------------------------------------------------
#[test]
fn test_sanitized_count_query_accepted() {
    let verdict = judge("SELECT COUNT(*) FROM recipes", &schema());
    assert_eq!(verdict, Verdict::Accepted { warnings: vec![] });
}

#[test]
fn test_rejection_feedback_carries_reason_and_schema() {
    let verdict = judge("SELECT rating FROM recipes", &schema());
    let rejection = verdict.rejection().unwrap();
    let feedback = rejection.feedback(&schema());
    assert!(feedback.starts_with("SQL Validation Failed:"));
    assert!(feedback.contains("unknown_column"));
    assert!(feedback.contains("rating"));
    assert!(feedback.contains("Table: recipes"));
}

#[test]
fn test_verdict_serializes_with_tag() {
    let verdict = judge("DROP TABLE recipes", &schema());
    let json = serde_json::to_value(&verdict).unwrap();
    assert_eq!(json["verdict"], "rejected");
    assert_eq!(json["reason"], "injection_suspected");
}

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use pantry_core::assistant::{Assistant, RecipeCatalog, SqliteCatalog};
use pantry_core::classify::Mode;
use pantry_core::db::Database;
use pantry_core::error::GenerationError;
use pantry_core::executor::SqliteExecutor;
use pantry_core::generate::{prompts, GenerationRequest, TextGenerator};
use pantry_core::matcher::Recipe;
use pantry_core::retry::{FailureCode, Outcome};
use pantry_core::schema::SchemaDescriptor;

// ---------------------------------------------------------------------------
// Stand-ins
// ---------------------------------------------------------------------------

/// Fixed reply per task prompt. `recommend: None` makes recommendation
/// requests fail.
struct FakeModel {
    mode: &'static str,
    ingredients: &'static str,
    search_term: &'static str,
    sql: &'static str,
    recommend: Option<&'static str>,
    seen: Mutex<Vec<String>>,
}

impl FakeModel {
    fn new(mode: &'static str) -> Self {
        Self {
            mode,
            ingredients: "",
            search_term: "",
            sql: "SELECT COUNT(*) FROM recipes",
            recommend: Some("Try the Roast Chicken!"),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn prompts_seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl TextGenerator for FakeModel {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let task = request.task_prompt.as_str();
        self.seen.lock().unwrap().push(task.to_string());
        let reply = if task == prompts::CLASSIFY_QUERY {
            self.mode
        } else if task == prompts::EXTRACT_INGREDIENTS {
            self.ingredients
        } else if task == prompts::EXTRACT_SEARCH_TERM {
            self.search_term
        } else if task == prompts::GENERATE_SQL {
            self.sql
        } else if task == prompts::ANALYZE_SQL_RESULTS {
            "You have 5 recipes."
        } else if task == prompts::RECOMMEND_RECIPES {
            return self
                .recommend
                .map(str::to_string)
                .ok_or_else(|| GenerationError::Transport("timeout".into()));
        } else {
            panic!("unexpected task prompt: {task}");
        };
        Ok(reply.to_string())
    }
}

struct StaticCatalog(Vec<Recipe>);

impl RecipeCatalog for StaticCatalog {
    fn recipes(&self) -> anyhow::Result<Vec<Recipe>> {
        Ok(self.0.clone())
    }
}

fn recipe(id: i64, name: &str, ingredients: &[&str]) -> Recipe {
    Recipe {
        id,
        name: name.to_string(),
        ingredients: ingredients.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

fn catalog() -> Arc<StaticCatalog> {
    Arc::new(StaticCatalog(vec![
        recipe(1, "Garlic Chicken", &["chicken", "garlic", "olive oil"]),
        recipe(2, "Roast Chicken", &["chicken", "garlic"]),
        recipe(3, "Plain Rice", &["rice", "water"]),
    ]))
}

fn seeded_db() -> (TempDir, Database, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("recipes.db");
    let db = Database::open(path.to_str().unwrap()).unwrap();
    db.seed_sample_recipes().unwrap();
    (dir, db, path)
}

fn assistant(model: Arc<FakeModel>, path: &PathBuf, catalog: Arc<dyn RecipeCatalog>) -> Assistant {
    Assistant::new(
        Arc::new(SchemaDescriptor::recipes()),
        model,
        Arc::new(SqliteExecutor::new(path)),
        catalog,
    )
}

// ---------------------------------------------------------------------------
// 1. Routing
// ---------------------------------------------------------------------------
#[test]
fn test_analytics_goes_through_retry_controller() {
    let (_dir, _db, path) = seeded_db();
    let model = Arc::new(FakeModel::new("analytics"));
    let assistant = assistant(model.clone(), &path, catalog());

    let answer = assistant.answer("How many recipes do I have?").unwrap();

    assert_eq!(answer.mode, Mode::Analytics);
    assert_eq!(answer.text, "You have 5 recipes.");
    assert!(matches!(
        answer.outcome,
        Some(Outcome::Succeeded { row_count: 1, .. })
    ));
    assert!(answer.matches.is_empty());
    assert!(!model.prompts_seen().iter().any(|p| p == prompts::RECOMMEND_RECIPES));
}

#[test]
fn test_analytics_failure_is_user_safe() {
    let (_dir, _db, path) = seeded_db();
    let mut model = FakeModel::new("analytics");
    model.sql = "SELECT * FROM recipes; DROP TABLE recipes;";
    let assistant = assistant(Arc::new(model), &path, catalog());

    let answer = assistant.answer("delete my recipes").unwrap();

    match answer.outcome {
        Some(Outcome::Failed { reason, .. }) => {
            assert_eq!(reason, FailureCode::InjectionSuspected)
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!answer.text.contains("DROP"));
}

#[test]
fn test_ingredient_mode_uses_matcher() {
    let (_dir, _db, path) = seeded_db();
    let mut model = FakeModel::new("ingredients");
    model.ingredients = "Chicken\nGarlic";
    let model = Arc::new(model);
    let assistant = assistant(model.clone(), &path, catalog());

    let answer = assistant.answer("I have chicken and garlic").unwrap();

    assert_eq!(answer.mode, Mode::Ingredients);
    assert_eq!(answer.text, "Try the Roast Chicken!");
    assert!(answer.outcome.is_none());
    let ids: Vec<i64> = answer.matches.iter().map(|m| m.recipe_id).collect();
    assert_eq!(ids, vec![2, 1]);
    // No SQL is ever generated for search modes.
    assert!(!model.prompts_seen().iter().any(|p| p == prompts::GENERATE_SQL));
}

#[test]
fn test_ingredient_extraction_falls_back_to_raw_text() {
    let (_dir, _db, path) = seeded_db();
    let model = FakeModel::new("ingredients");
    let assistant = assistant(Arc::new(model), &path, catalog());

    let answer = assistant.answer("rice, water").unwrap();
    assert_eq!(answer.matches.len(), 1);
    assert_eq!(answer.matches[0].recipe_id, 3);
}

#[test]
fn test_name_mode() {
    let (_dir, _db, path) = seeded_db();
    let mut model = FakeModel::new("name");
    model.search_term = "\"Roast\"";
    let assistant = assistant(Arc::new(model), &path, catalog());

    let answer = assistant.answer("show me the roast recipe").unwrap();
    assert_eq!(answer.mode, Mode::Name);
    assert_eq!(answer.matches.len(), 1);
    assert_eq!(answer.matches[0].recipe_id, 2);
}

#[test]
fn test_no_matches_skip_recommendation() {
    let (_dir, _db, path) = seeded_db();
    let mut model = FakeModel::new("name");
    model.search_term = "lasagna";
    let model = Arc::new(model);
    let assistant = assistant(model.clone(), &path, catalog());

    let answer = assistant.answer("lasagna please").unwrap();
    assert!(answer.matches.is_empty());
    assert!(answer.text.contains("couldn't find"));
    assert!(!model.prompts_seen().iter().any(|p| p == prompts::RECOMMEND_RECIPES));
}

#[test]
fn test_recommendation_failure_falls_back_to_summary() {
    let (_dir, _db, path) = seeded_db();
    let mut model = FakeModel::new("general");
    model.recommend = None;
    let assistant = assistant(Arc::new(model), &path, catalog());

    let answer = assistant.answer("what can I cook?").unwrap();
    assert_eq!(answer.mode, Mode::General);
    assert_eq!(answer.matches.len(), 3);
    assert!(answer.text.starts_with("Found 3 recipe(s)."), "{}", answer.text);
}

// ---------------------------------------------------------------------------
// 2. Direct entry points against a real catalog
// ---------------------------------------------------------------------------
#[test]
fn test_search_against_sqlite_catalog() {
    let (_dir, _db, path) = seeded_db();
    let model = Arc::new(FakeModel::new("general"));
    let assistant = assistant(model, &path, Arc::new(SqliteCatalog::new(&path)));

    let have: BTreeSet<String> = ["chicken breast", "soy sauce", "rice", "garlic", "onion"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let answer = assistant.search_ingredients("stir fry?", &have).unwrap();
    assert_eq!(answer.matches.len(), 1);
    assert!((answer.matches[0].match_percentage - 62.5).abs() < 1e-9);

    let answer = assistant.search_name("risotto", "risotto").unwrap();
    assert_eq!(answer.matches.len(), 1);
}

#[test]
fn test_sqlite_catalog_carries_busy_timeout() {
    let (_dir, _db, path) = seeded_db();
    let catalog = SqliteCatalog::new(&path);
    assert_eq!(catalog.busy_timeout(), Duration::from_millis(5000));

    let catalog = catalog.with_busy_timeout(Duration::from_millis(250));
    assert_eq!(catalog.busy_timeout(), Duration::from_millis(250));
    assert_eq!(catalog.recipes().unwrap().len(), 5);
}

#[test]
fn test_answer_as_skips_classification() {
    let (_dir, _db, path) = seeded_db();
    let model = Arc::new(FakeModel::new("name"));
    let assistant = assistant(model.clone(), &path, catalog());

    let answer = assistant.answer_as("How many recipes?", Mode::Analytics).unwrap();
    assert!(answer.outcome.unwrap().is_success());
    assert!(!model.prompts_seen().iter().any(|p| p == prompts::CLASSIFY_QUERY));
}

#[test]
fn test_concurrent_requests_share_one_assistant() {
    let (_dir, _db, path) = seeded_db();
    let model = Arc::new(FakeModel::new("analytics"));
    let assistant = Arc::new(assistant(model, &path, catalog()));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let assistant = Arc::clone(&assistant);
            std::thread::spawn(move || assistant.answer(&format!("question {i}")).unwrap())
        })
        .collect();
    for handle in handles {
        let answer = handle.join().unwrap();
        assert!(answer.outcome.unwrap().is_success());
    }
}

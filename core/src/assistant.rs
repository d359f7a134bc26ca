use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::classify::{Classifier, Mode};
use crate::db::Database;
use crate::executor::QueryExecutor;
use crate::generate::{prompts, GenerationRequest, TextGenerator};
use crate::judge::Judge;
use crate::matcher::{self, MatchCandidate, MatchOptions, Recipe};
use crate::retry::{ControllerSettings, Outcome, RetryController, SessionReport};
use crate::schema::SchemaDescriptor;

// ---------------------------------------------------------------------------
// Recipe catalog
// ---------------------------------------------------------------------------

/// Source of candidate recipes for the search modes.
pub trait RecipeCatalog: Send + Sync {
    fn recipes(&self) -> Result<Vec<Recipe>>;
}

/// Reads the catalog through a read-only connection scoped to each call.
pub struct SqliteCatalog {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_millis(5000),
        }
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        self.busy_timeout
    }
}

impl RecipeCatalog for SqliteCatalog {
    fn recipes(&self) -> Result<Vec<Recipe>> {
        let path = self.path.to_string_lossy();
        let db = Database::open_read_only(&path, self.busy_timeout)?;
        db.all_recipes()
    }
}

// ---------------------------------------------------------------------------
// Answers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub mode: Mode,
    pub text: String,
    /// Set for analytics requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    /// Set for search requests.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<MatchCandidate>,
}

const NO_MATCHES: &str = "I couldn't find any recipes matching that. \
Try different ingredients or another dish name.";

// ---------------------------------------------------------------------------
// Assistant
// ---------------------------------------------------------------------------

/// Routes one user request to the analytics pipeline or the matcher. Holds
/// only shared, immutable collaborators, so one instance serves concurrent
/// requests; each request gets its own session.
pub struct Assistant {
    schema: Arc<SchemaDescriptor>,
    generator: Arc<dyn TextGenerator>,
    executor: Arc<dyn QueryExecutor>,
    catalog: Arc<dyn RecipeCatalog>,
    judge: Judge,
    settings: ControllerSettings,
    match_options: MatchOptions,
}

impl Assistant {
    pub fn new(
        schema: Arc<SchemaDescriptor>,
        generator: Arc<dyn TextGenerator>,
        executor: Arc<dyn QueryExecutor>,
        catalog: Arc<dyn RecipeCatalog>,
    ) -> Self {
        Self {
            schema,
            generator,
            executor,
            catalog,
            judge: Judge::default(),
            settings: ControllerSettings::default(),
            match_options: MatchOptions::default(),
        }
    }

    pub fn with_judge(mut self, judge: Judge) -> Self {
        self.judge = judge;
        self
    }

    pub fn with_settings(mut self, settings: ControllerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_match_options(mut self, options: MatchOptions) -> Self {
        self.match_options = options;
        self
    }

    /// Classify `text`, then answer it.
    pub fn answer(&self, text: &str) -> Result<Answer> {
        let mode = Classifier::new(self.generator.as_ref())
            .classify(text)
            .context("failed to classify request")?;
        self.answer_as(text, mode)
    }

    /// Answer `text` in an already-known mode.
    pub fn answer_as(&self, text: &str, mode: Mode) -> Result<Answer> {
        tracing::info!(mode = mode.as_str(), "answering request");
        let classifier = Classifier::new(self.generator.as_ref());
        match mode {
            Mode::Analytics => {
                let report = self.analytics(text);
                Ok(Answer {
                    mode,
                    text: report.outcome.message().to_string(),
                    outcome: Some(report.outcome),
                    matches: Vec::new(),
                })
            }
            Mode::Ingredients => {
                let ingredients = classifier
                    .extract_ingredients(text)
                    .context("failed to extract ingredients")?;
                self.search_ingredients(text, &ingredients)
            }
            Mode::Name => {
                let term = classifier
                    .extract_search_term(text)
                    .context("failed to extract search term")?;
                self.search_name(text, &term)
            }
            Mode::General => self.browse(text),
        }
    }

    /// Run one analytics session: synthesize, judge, execute, narrate.
    pub fn analytics(&self, question: &str) -> SessionReport {
        RetryController::new(&self.schema, self.generator.as_ref(), self.executor.as_ref())
            .with_judge(self.judge)
            .with_settings(self.settings)
            .run(question)
    }

    pub fn search_ingredients(&self, text: &str, ingredients: &BTreeSet<String>) -> Result<Answer> {
        let recipes = self.catalog.recipes()?;
        let matches = matcher::match_ingredients(ingredients, &recipes, &self.match_options);
        tracing::info!(
            ingredients = ingredients.len(),
            matches = matches.len(),
            "ingredient search complete"
        );
        let context = format!(
            "\nUser's Available Ingredients: {}\n",
            ingredients.iter().cloned().collect::<Vec<_>>().join(", ")
        );
        Ok(self.recommend(text, Mode::Ingredients, matches, &recipes, &context))
    }

    pub fn search_name(&self, text: &str, term: &str) -> Result<Answer> {
        let recipes = self.catalog.recipes()?;
        let matches = matcher::match_name(term, &recipes, self.match_options.max_results);
        tracing::info!(term, matches = matches.len(), "name search complete");
        Ok(self.recommend(text, Mode::Name, matches, &recipes, ""))
    }

    fn browse(&self, text: &str) -> Result<Answer> {
        let recipes = self.catalog.recipes()?;
        let matches: Vec<MatchCandidate> = recipes
            .iter()
            .take(self.match_options.max_results)
            .map(|r| MatchCandidate {
                recipe_id: r.id,
                match_percentage: 100.0,
                matched: 0,
                total: r.ingredients.len(),
            })
            .collect();
        Ok(self.recommend(text, Mode::General, matches, &recipes, ""))
    }

    /// Friendly recommendations over the match summary. Falls back to the
    /// plain summary if the generation service is unavailable.
    fn recommend(
        &self,
        text: &str,
        mode: Mode,
        matches: Vec<MatchCandidate>,
        recipes: &[Recipe],
        extra_context: &str,
    ) -> Answer {
        if matches.is_empty() {
            return Answer {
                mode,
                text: NO_MATCHES.to_string(),
                outcome: None,
                matches,
            };
        }

        let summary = matcher::summarize(&matches, recipes, self.match_options.max_results);
        let message = format!(
            "User Query: {text}\n\nAvailable Recipes:\n{summary}\n{extra_context}\n\
             Please provide personalized recipe recommendations based on the user's query \
             and the available recipes."
        );
        let request = GenerationRequest::new(prompts::RECOMMEND_RECIPES, message)
            .with_temperature(self.settings.narration_temperature);
        let text = match self.generator.generate(&request) {
            Ok(reply) => reply.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "recommendation generation failed; returning summary");
                summary
            }
        };

        Answer {
            mode,
            text,
            outcome: None,
            matches,
        }
    }
}

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::GenerationError;
use crate::generate::{prompts, GenerationRequest, TextGenerator};
use crate::matcher::parse_user_ingredients;

/// How a request should be served. Only `Analytics` goes through generated
/// SQL; the rest are answered by the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Ingredients,
    Name,
    Analytics,
    General,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Ingredients => "ingredients",
            Mode::Name => "name",
            Mode::Analytics => "analytics",
            Mode::General => "general",
        }
    }

    /// Parse the classifier's reply. Anything unrecognised is `General`.
    pub fn from_reply(reply: &str) -> Self {
        let word = reply
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        match word.as_str() {
            "ingredients" => Mode::Ingredients,
            "name" => Mode::Name,
            "analytics" => Mode::Analytics,
            _ => Mode::General,
        }
    }
}

pub struct Classifier<'a> {
    generator: &'a dyn TextGenerator,
}

impl<'a> Classifier<'a> {
    pub fn new(generator: &'a dyn TextGenerator) -> Self {
        Self { generator }
    }

    pub fn classify(&self, text: &str) -> Result<Mode, GenerationError> {
        let request = GenerationRequest::new(
            prompts::CLASSIFY_QUERY,
            format!("User query: {text}\n\nClassification:"),
        );
        let reply = self.generator.generate(&request)?;
        let mode = Mode::from_reply(&reply);
        tracing::debug!(mode = mode.as_str(), "request classified");
        Ok(mode)
    }

    /// Normalised ingredient set, one per reply line. Falls back to the
    /// comma/"and" heuristic over the raw text when the reply has none.
    pub fn extract_ingredients(&self, text: &str) -> Result<BTreeSet<String>, GenerationError> {
        let request = GenerationRequest::new(
            prompts::EXTRACT_INGREDIENTS,
            format!("User message: {text}\n\nIngredients:"),
        );
        let reply = self.generator.generate(&request)?;
        let ingredients = parse_ingredient_reply(&reply);
        if ingredients.is_empty() {
            return Ok(parse_user_ingredients(text));
        }
        Ok(ingredients)
    }

    pub fn extract_search_term(&self, text: &str) -> Result<String, GenerationError> {
        let request = GenerationRequest::new(
            prompts::EXTRACT_SEARCH_TERM,
            format!("User message: {text}\n\nSearch term:"),
        );
        let reply = self.generator.generate(&request)?;
        Ok(reply.trim().trim_matches('"').to_lowercase())
    }
}

fn parse_ingredient_reply(reply: &str) -> BTreeSet<String> {
    reply
        .lines()
        .map(|line| line.trim().trim_start_matches(['-', '*']).trim().to_lowercase())
        .filter(|line| !line.is_empty() && line != "none")
        .collect()
}

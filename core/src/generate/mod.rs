//! Boundary to the text-generation service, plus the two components that
//! wrap it on the analytics path: the query synthesizer and the result
//! narrator.
//!
//! The service is an untrusted oracle. Nothing it returns is executed without
//! passing the judge.

pub mod openai;
pub mod prompts;

use serde::Serialize;

use crate::error::GenerationError;
use crate::executor::ResultSet;
use crate::schema::SchemaDescriptor;

// ---------------------------------------------------------------------------
// Service boundary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    /// System instructions for this task.
    pub task_prompt: String,
    pub schema_description: Option<String>,
    pub user_message: String,
    /// Prior rejection and error feedback for this session, oldest first.
    pub feedback: Vec<String>,
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn new(task_prompt: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self {
            task_prompt: task_prompt.into(),
            schema_description: None,
            user_message: user_message.into(),
            feedback: Vec::new(),
            temperature: 0.0,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema_description = Some(schema.into());
        self
    }

    pub fn with_feedback(mut self, feedback: Vec<String>) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A single `generate(prompt) -> text` capability. Implemented over HTTP by
/// [`openai::OpenAiGenerator`] and by scripted stand-ins in tests.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

// ---------------------------------------------------------------------------
// Synthesizer
// ---------------------------------------------------------------------------

/// One generated query awaiting judgement. Not trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateQuery {
    pub sql: String,
    /// 1-based generation attempt within the session.
    pub attempt: u32,
    pub user_text: String,
    /// Reason the previous attempt failed, if this is a retry.
    pub prior_rejection: Option<String>,
}

pub struct Synthesizer<'a> {
    generator: &'a dyn TextGenerator,
    temperature: f32,
}

impl<'a> Synthesizer<'a> {
    pub fn new(generator: &'a dyn TextGenerator, temperature: f32) -> Self {
        Self {
            generator,
            temperature,
        }
    }

    /// Ask the oracle for one candidate query answering `question`. The
    /// whole feedback history of the session rides along.
    pub fn synthesize(
        &self,
        question: &str,
        schema: &SchemaDescriptor,
        feedback: &[String],
        attempt: u32,
        prior_rejection: Option<String>,
    ) -> Result<CandidateQuery, GenerationError> {
        let request = GenerationRequest::new(prompts::GENERATE_SQL, question)
            .with_schema(schema.documentation())
            .with_feedback(feedback.to_vec())
            .with_temperature(self.temperature);
        let reply = self.generator.generate(&request)?;
        Ok(CandidateQuery {
            sql: strip_code_fence(&reply).to_string(),
            attempt,
            user_text: question.to_string(),
            prior_rejection,
        })
    }
}

/// Models like to wrap SQL in Markdown fences. Remove one surrounding fence
/// (with optional language tag) and outer whitespace; leave everything else
/// for the judge.
pub fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (`sql`, `sqlite`, ...) on the opening line.
    match body.split_once('\n') {
        Some((info, code)) if !info.trim().contains(' ') => code.trim(),
        _ => body.trim(),
    }
}

// ---------------------------------------------------------------------------
// Narrator
// ---------------------------------------------------------------------------

pub struct Narrator<'a> {
    generator: &'a dyn TextGenerator,
    temperature: f32,
    max_rows: usize,
}

impl<'a> Narrator<'a> {
    pub fn new(generator: &'a dyn TextGenerator, temperature: f32, max_rows: usize) -> Self {
        Self {
            generator,
            temperature,
            max_rows,
        }
    }

    /// Turn `results` into a conversational answer to `question`.
    pub fn narrate(
        &self,
        question: &str,
        sql: &str,
        results: &ResultSet,
    ) -> Result<String, GenerationError> {
        let message = format!(
            "User Query: {question}\n\nSQL Query Executed:\n{sql}\n\nQuery Results:\n{}\n\n\
             Please provide a clear answer to the user's question based on these results.",
            render_results(results, self.max_rows)
        );
        let request = GenerationRequest::new(prompts::ANALYZE_SQL_RESULTS, message)
            .with_temperature(self.temperature);
        let answer = self.generator.generate(&request)?;
        Ok(answer.trim().to_string())
    }
}

/// Rows as JSON lines, capped at `max_rows`. The cap exists only here, in
/// prompt construction; the executor never truncates.
pub fn render_results(results: &ResultSet, max_rows: usize) -> String {
    if results.is_empty() {
        return "No results found (empty result set)".to_string();
    }
    let shown = results.row_count().min(max_rows);
    let mut lines: Vec<String> = (0..shown).filter_map(|i| results.row_json(i)).collect();
    if results.row_count() > shown {
        lines.push(format!(
            "... and {} more rows ({} total)",
            results.row_count() - shown,
            results.row_count()
        ));
    }
    lines.join("\n")
}

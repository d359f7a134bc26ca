use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{GenerationRequest, TextGenerator};
use crate::error::GenerationError;

/// Chat-completions client for any OpenAI-compatible endpoint.
pub struct OpenAiGenerator {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiGenerator {
    /// Build a client, reading the API key from `api_key_env`.
    pub fn from_env(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key_env: &str,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let api_key = std::env::var(api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GenerationError::MissingApiKey(api_key_env.to_string()))?;
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Ok(Self {
            agent,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
        })
    }
}

/// System turn carries the task and schema; the user turn carries the
/// message followed by every earlier failure, so the model sees the whole
/// history rather than a bare "try again".
fn messages(request: &GenerationRequest) -> Vec<ChatMessage> {
    let mut system = request.task_prompt.clone();
    if let Some(schema) = &request.schema_description {
        system.push_str("\n\n");
        system.push_str(schema);
    }

    let mut user = request.user_message.clone();
    for (i, feedback) in request.feedback.iter().enumerate() {
        user.push_str(&format!(
            "\n\nPrevious attempt {} failed with: {feedback}\nPlease fix the query.",
            i + 1
        ));
    }

    vec![
        ChatMessage {
            role: "system",
            content: system,
        },
        ChatMessage {
            role: "user",
            content: user,
        },
    ]
}

impl TextGenerator for OpenAiGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: request.temperature,
            messages: messages(request),
        };

        let mut response = self
            .agent
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send_json(&body)
            .map_err(|e| GenerationError::Transport(e.to_string()))?;
        let reply: ChatResponse = response
            .body_mut()
            .read_json()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(GenerationError::EmptyResponse)?;
        tracing::debug!(model = %self.model, chars = content.len(), "generation complete");
        Ok(content)
    }
}

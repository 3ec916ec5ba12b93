
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::QaError;
use crate::config::{API_KEY_ENV, CompletionConfig};
use crate::net::{agent_with_timeout, request_with_retry};

const DEFAULT_RETRY_ATTEMPTS: u32 = 2;

/// System instruction keeping answers grounded in the retrieved context
const SYSTEM_INSTRUCTION: &str =
    "Use the provided context to answer the question as clearly as possible. \
     If the context does not contain the answer, say so.";

/// Client for an OpenAI-compatible chat-completions endpoint
#[derive(Debug, Clone)]
pub struct CompletionClient {
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: String,
}

impl CompletionClient {
    /// Build a client from settings plus the credential resolved from the
    /// environment. A missing credential is not an error here: it becomes a
    /// structured per-request error, so the server can start without a key
    /// and report the problem to callers instead of crashing.
    #[inline]
    pub fn new(config: &CompletionConfig, api_key: Option<String>) -> Self {
        Self {
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            agent: agent_with_timeout(Duration::from_secs(config.timeout_secs)),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Whether a credential is configured
    #[inline]
    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    /// Ask the completion service to answer `question` using `context`.
    /// Returns the trimmed answer text.
    #[inline]
    pub fn complete(&self, question: &str, context: &str) -> Result<String, QaError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(QaError::Completion(format!(
                "No completion credential configured; set the {API_KEY_ENV} environment variable"
            )));
        };

        self.request_completion(api_key, question, context)
            .map_err(|e| QaError::Completion(format!("{e:#}")))
    }

    fn request_completion(&self, api_key: &str, question: &str, context: &str) -> Result<String> {
        let user_content = format!("Context:\n{context}\n\nQuestion:\n{question}");
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_INSTRUCTION,
                },
                ChatMessage {
                    role: "user",
                    content: &user_content,
                },
            ],
        };

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize completion request")?;

        debug!(
            "Requesting completion from {} ({} chars of context)",
            self.endpoint,
            context.len()
        );

        let response_text = request_with_retry(self.retry_attempts, || {
            self.agent
                .post(&self.endpoint)
                .header("Authorization", &format!("Bearer {api_key}"))
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .context("Completion request failed")?;

        let parsed: ChatResponse =
            serde_json::from_str(&response_text).context("Failed to parse completion response")?;

        let answer = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .context("Completion response contained no choices")?;

        Ok(answer.trim().to_string())
    }
}

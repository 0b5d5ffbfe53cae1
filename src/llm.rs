//! Language-model replies
//!
//! Builds the reply prompt from the transcript plus whatever situational
//! context was gathered, and sends it to the OpenAI chat completions API.

use async_trait::async_trait;

use crate::context::SituationalContext;
use crate::{Error, Result};

/// Fixed system instruction prefixed to every prompt
const SYSTEM_INSTRUCTION: &str = "You are Chat Hat, an AI assistant in a hat. \
     Answer the user quickly with a response no more than 20 words.";

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(serde::Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(serde::Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Produces a reply for a gated transcript
#[async_trait]
pub trait Responder: Send + Sync {
    /// Generate a reply for the assembled prompt
    async fn respond(&self, prompt: &str) -> Result<String>;
}

/// Generates replies using the OpenAI chat completions API
pub struct ChatClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl ChatClient {
    /// Create a new chat client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for chat".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl Responder for ChatClient {
    async fn respond(&self, prompt: &str) -> Result<String> {
        tracing::debug!(prompt_chars = prompt.len(), "requesting completion");

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "chat request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "chat API error");
            return Err(Error::Llm(format!("chat API error {status}: {body}")));
        }

        let result: ChatResponse = response.json().await?;
        let reply = result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Llm("completion had no choices".to_string()))?;

        tracing::info!(reply = %reply, "completion received");
        Ok(reply)
    }
}

/// Assemble the full prompt: system instruction, sight clause, calendar
/// clause, then the user text
///
/// Empty context falls back to explicit "cannot see" / "no access" phrasing
/// so the model never invents surroundings or events.
#[must_use]
pub fn build_prompt(context: &SituationalContext, input: &str) -> String {
    let sight = if context.objects.is_empty() {
        "If you are asked if you can see, you cannot.".to_string()
    } else {
        let listed = context
            .objects
            .iter()
            .map(|obj| format!("a {obj}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("If you are asked what you see, you see {listed}.")
    };

    let calendar = if context.events.is_empty() {
        "If you are asked about upcoming events, you do not have access.".to_string()
    } else {
        format!(
            "If you are asked about upcoming events, the user has {}.",
            context.events.join(", ")
        )
    };

    format!("{SYSTEM_INSTRUCTION} {sight} {calendar} User input: {input}")
}

use crate::config::OpenAiSettings;
use crate::traits::ChatModel;
use crate::{ChatMessage, LlmError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat model behind the `/chat/completions` endpoint of an OpenAI-compatible API.
pub struct OpenAiChatModel {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiChatModel {
    pub fn new(settings: &OpenAiSettings) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self {
            client,
            endpoint: settings.base_url.join("chat/completions")?,
            api_key: settings.api_key.clone(),
            model: settings.chat_model.clone(),
            temperature: settings.temperature,
        })
    }
}

fn first_completion(model: &str, payload: CompletionResponse) -> Result<String, LlmError> {
    payload
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.unwrap_or_default())
        .ok_or_else(|| LlmError::EmptyCompletion(model.to_string()))
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        debug!(model = %self.model, messages = messages.len(), "requesting completion");
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&CompletionRequest {
                model: &self.model,
                temperature: self.temperature,
                messages,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let details = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                model: self.model.clone(),
                status,
                details,
            });
        }

        let payload: CompletionResponse = response.json().await?;
        first_completion(&self.model, payload)
    }
}

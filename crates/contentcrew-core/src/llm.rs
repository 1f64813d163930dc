//! Model-call boundary.
//!
//! Agents talk to a conversational model through [`LanguageModel`]; the
//! production implementation speaks the OpenAI-compatible chat completions
//! protocol with legacy function calling, which is what the `function` message
//! role of the interpreter loop maps onto.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::agents::AgentRole;
use crate::{ContentError, Result, SecretValue};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Function,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Function => "function",
        }
    }
}

/// One entry of an agent's working memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub content: String,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            name: None,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            name: None,
            content: content.into(),
        }
    }

    pub fn function(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Function,
            name: Some(name.into()),
            content: content.into(),
        }
    }
}

/// A structured request from the model to run a tool.
///
/// `arguments` is kept as raw JSON: providers send either an object or a
/// JSON-encoded string, and the interpreter decides what is acceptable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub function_name: String,
    pub arguments: Value,
}

/// What an agent said on its turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    ToolCall(ToolInvocation),
}

/// Declared tool signature exposed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Model-call settings. Every field is optional here so that a partially
/// configured agent can still be built; missing values fail the call.
#[derive(Debug, Clone, Default)]
pub struct ModelConfig {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub api_key: Option<SecretValue>,
    pub base_url: Option<String>,
}

impl ModelConfig {
    /// Resolve the mandatory fields or name the first one that is missing.
    pub fn require(&self) -> Result<ResolvedModelConfig<'_>> {
        let model = self
            .model
            .as_deref()
            .filter(|model| !model.trim().is_empty())
            .ok_or(ContentError::MissingModelField("model"))?;
        let temperature = self
            .temperature
            .ok_or(ContentError::MissingModelField("temperature"))?;
        let max_tokens = self
            .max_tokens
            .ok_or(ContentError::MissingModelField("max_tokens"))?;
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(ContentError::MissingModelField("api_key"))?;
        Ok(ResolvedModelConfig {
            model,
            temperature,
            max_tokens,
            api_key,
            base_url: self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResolvedModelConfig<'a> {
    pub model: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
    pub api_key: &'a SecretValue,
    pub base_url: &'a str,
}

/// Everything a provider needs for one turn.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub role: AgentRole,
    pub instructions: String,
    pub messages: Vec<ConversationMessage>,
    pub tools: Vec<ToolSchema>,
    pub config: ModelConfig,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Produce the next reply, or `None` when the model had nothing to say.
    async fn reply(&self, request: ModelRequest) -> Result<Option<Reply>>;
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    functions: Vec<&'a ToolSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<&'static str>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    function_call: Option<ChatFunctionCall>,
}

#[derive(Deserialize)]
struct ChatFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// OpenAI-compatible chat completions client.
pub struct OpenAiChatModel {
    http_client: reqwest::Client,
}

impl OpenAiChatModel {
    pub fn new() -> Self {
        Self {
            http_client: reqwest::Client::new(),
        }
    }

    fn build_messages(request: &ModelRequest) -> Vec<Value> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.instructions.is_empty() {
            messages.push(json!({ "role": "system", "content": request.instructions }));
        }
        for message in &request.messages {
            let mut entry = json!({
                "role": message.role.as_str(),
                "content": message.content,
            });
            if let Some(name) = &message.name {
                entry["name"] = Value::String(name.clone());
            }
            messages.push(entry);
        }
        messages
    }

    fn build_body<'a>(
        request: &'a ModelRequest,
        resolved: &ResolvedModelConfig<'a>,
    ) -> ChatCompletionRequest<'a> {
        let functions: Vec<&ToolSchema> = request.tools.iter().collect();
        let function_call = (!functions.is_empty()).then_some("auto");
        ChatCompletionRequest {
            model: resolved.model,
            messages: Self::build_messages(request),
            temperature: resolved.temperature,
            max_tokens: resolved.max_tokens,
            functions,
            function_call,
        }
    }
}

impl Default for OpenAiChatModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Interpret a chat completion body. A function call wins over text content.
pub fn parse_completion(body: Value) -> Result<Option<Reply>> {
    let response: ChatCompletionResponse = serde_json::from_value(body)
        .map_err(|err| ContentError::Model(format!("failed to decode completion: {err}")))?;

    let Some(choice) = response.choices.into_iter().next() else {
        return Ok(None);
    };

    if let Some(call) = choice.message.function_call {
        return Ok(Some(Reply::ToolCall(ToolInvocation {
            function_name: call.name,
            arguments: call.arguments,
        })));
    }

    Ok(choice
        .message
        .content
        .filter(|content| !content.trim().is_empty())
        .map(Reply::Text))
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn reply(&self, request: ModelRequest) -> Result<Option<Reply>> {
        let resolved = request.config.require()?;
        let url = format!(
            "{}/v1/chat/completions",
            resolved.base_url.trim_end_matches('/')
        );
        let body = Self::build_body(&request, &resolved);

        debug!(
            role = request.role.as_str(),
            model = resolved.model,
            messages = request.messages.len(),
            "requesting chat completion"
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(resolved.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|err| ContentError::Model(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ContentError::Model(format!("API error {status}: {text}")));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|err| ContentError::Model(format!("failed to read response: {err}")))?;

        parse_completion(payload)
    }
}

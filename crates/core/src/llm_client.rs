use crate::state::Role;
use anyhow::{Context, Result, anyhow};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use std::time::Duration;

/// One message of a chat-completion prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptMessage {
    System(String),
    User(String),
    Assistant(String),
}

impl PromptMessage {
    /// Maps a history entry onto the prompt: the persona speaks as the assistant.
    pub fn from_turn(role: Role, text: &str) -> Self {
        match role {
            Role::User => PromptMessage::User(text.to_string()),
            Role::Persona => PromptMessage::Assistant(text.to_string()),
        }
    }
}

/// Sampling options applied to every completion request.
#[derive(Debug, Clone, Copy)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// A generic client for interacting with an LLM.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Makes a single, non-streaming completion call and returns the text.
    async fn complete(&self, messages: Vec<PromptMessage>) -> Result<String>;
}

/// An implementation of `LLMClient` for any OpenAI-compatible API.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
    options: CompletionOptions,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The model identifier to use for chat completions (e.g., "gpt-4o").
    /// * `options` - Temperature, token limit and per-call timeout.
    pub fn new(config: OpenAIConfig, model: String, options: CompletionOptions) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            options,
        }
    }
}

fn to_request_message(message: PromptMessage) -> Result<ChatCompletionRequestMessage> {
    Ok(match message {
        PromptMessage::System(content) => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        PromptMessage::User(content) => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        PromptMessage::Assistant(content) => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()?
            .into(),
    })
}

#[async_trait]
impl LLMClient for OpenAICompatibleClient {
    async fn complete(&self, messages: Vec<PromptMessage>) -> Result<String> {
        let messages = messages
            .into_iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>>>()?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(messages)
            .temperature(self.options.temperature);
        if let Some(max_tokens) = self.options.max_tokens {
            args.max_completion_tokens(max_tokens);
        }
        let request = args.build()?;

        let response = tokio::time::timeout(self.options.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| anyhow!("LLM call timed out after {:?}", self.options.timeout))??;

        let content = response
            .choices
            .first()
            .context("No response choice from LLM")?
            .message
            .content
            .clone()
            .context("No content in LLM response")?;

        if content.trim().is_empty() {
            return Err(anyhow!("LLM returned an empty completion"));
        }
        Ok(content)
    }
}

/// An `LLMClient` for development that echoes the last user message.
pub struct EchoLLMClient;

#[async_trait]
impl LLMClient for EchoLLMClient {
    async fn complete(&self, messages: Vec<PromptMessage>) -> Result<String> {
        let last_user = messages.iter().rev().find_map(|m| match m {
            PromptMessage::User(text) => Some(text.as_str()),
            _ => None,
        });
        Ok(format!("(mock) You said: {}", last_user.unwrap_or("nothing")))
    }
}

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionStreamOptions,
        CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
    },
    Client,
};
use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::error::AppError;

/// Options controlling one chat completion call; mirrors the generation
/// parameters a `Session` carries.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub seed: Option<u64>,
    pub max_tokens: u32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: 1.0,
            seed: None,
            max_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub system: Option<String>,
    pub user: String,
}

/// One streamed content delta, plus the usage totals the upstream reports on
/// its final chunk when `stream_options.include_usage` is set.
#[derive(Debug, Clone, Default)]
pub struct StreamDelta {
    pub text: String,
    pub usage_tokens: Option<u32>,
}

/// A remote OpenAI-compatible chat model, addressed by name against a single
/// configured base URL. Upstream failure semantics (timeouts/5xx → upstream
/// unavailable, 401/403 → auth, 404 → not found, 422 → bad request) are
/// folded in by `AppError::kind()` rather than duplicated here.
#[derive(Clone)]
pub struct ChatModel {
    client: Client<OpenAIConfig>,
    model: String,
}

impl ChatModel {
    #[must_use]
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    fn build_messages(
        &self,
        turn: &ChatTurn,
    ) -> Result<Vec<ChatCompletionRequestMessage>, AppError> {
        let mut messages = Vec::new();
        if let Some(system) = &turn.system {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system.clone())
                    .build()?
                    .into(),
            );
        }
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(turn.user.clone())
                .build()?
                .into(),
        );
        Ok(messages)
    }

    /// Non-streaming completion, used for query rewriting and session-title
    /// generation where only the final text matters.
    pub async fn complete(
        &self,
        turn: &ChatTurn,
        options: &ChatOptions,
    ) -> Result<String, AppError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .messages(self.build_messages(turn)?)
            .temperature(options.temperature)
            .top_p(options.top_p)
            .max_tokens(options.max_tokens)
            .build()?;

        let response = self.client.chat().create(request).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::LLMParsing("no choices returned".to_string()))?;
        Ok(content)
    }

    /// Non-streaming completion constrained to a JSON schema, used for
    /// structured extraction (e.g. graph entities/relationships) where the
    /// response must parse as a specific shape rather than free text.
    pub async fn complete_json(
        &self,
        turn: &ChatTurn,
        options: &ChatOptions,
        schema_name: &str,
        schema_description: &str,
        schema: Value,
    ) -> Result<String, AppError> {
        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: Some(schema_description.to_string()),
                name: schema_name.to_string(),
                schema: Some(schema),
                strict: Some(true),
            },
        };

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .messages(self.build_messages(turn)?)
            .temperature(options.temperature)
            .top_p(options.top_p)
            .max_tokens(options.max_tokens)
            .response_format(response_format)
            .build()?;

        let response = self.client.chat().create(request).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::LLMParsing("no choices returned".to_string()))?;
        Ok(content)
    }

    /// Streams content deltas until the upstream signals completion. The
    /// final chunk (no choices, just a usage total) surfaces as a
    /// zero-length delta carrying `usage_tokens`.
    pub async fn stream_complete(
        &self,
        turn: &ChatTurn,
        options: &ChatOptions,
    ) -> Result<impl Stream<Item = Result<StreamDelta, AppError>> + Send, AppError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .messages(self.build_messages(turn)?)
            .temperature(options.temperature)
            .top_p(options.top_p)
            .max_tokens(options.max_tokens)
            .stream(true)
            .stream_options(ChatCompletionStreamOptions {
                include_usage: true,
            })
            .build()?;

        let stream = self.client.chat().create_stream(request).await?;
        Ok(stream.map(|chunk| {
            let chunk = chunk?;
            let text = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .unwrap_or_default();
            let usage_tokens = chunk.usage.map(|usage| usage.total_tokens);
            Ok(StreamDelta { text, usage_tokens })
        }))
    }
}

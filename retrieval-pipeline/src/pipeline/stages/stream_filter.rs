use async_trait::async_trait;
use common::error::AppError;

use crate::pipeline::{
    chat_manage::ChatManage,
    stage::{Stage, StageKind},
};

const THINKING_TAGS: [(&str, &str); 1] = [("<think>", "</think>")];

/// Strips any model "thinking" artifacts from the accumulated response,
/// enforces the no-match prefix when retrieval came up empty, and emits the
/// terminal SSE event: a `done:true` answer event, or a terminal error event
/// if an earlier stage set `ChatManage::error`.
pub struct StreamFilter;

#[async_trait]
impl Stage for StreamFilter {
    fn kind(&self) -> StageKind {
        StageKind::StreamFilter
    }

    async fn run(&self, ctx: &mut ChatManage) -> Result<(), AppError> {
        ctx.chat_response = strip_thinking_tags(&ctx.chat_response);

        if ctx.no_match {
            let prefix = ctx.session.generation.no_match_prefix.clone();
            if !prefix.is_empty() && !ctx.chat_response.starts_with(&prefix) {
                ctx.chat_response = format!("{prefix}{}", ctx.chat_response);
            }
        }

        let event = match ctx.error.clone() {
            Some(message) => crate::sse::SseEvent::terminal_error(&ctx.request_id, message),
            None => crate::sse::SseEvent::done(&ctx.request_id),
        };
        ctx.emit(event).await;

        Ok(())
    }
}

fn strip_thinking_tags(content: &str) -> String {
    let mut result = content.to_string();
    for (open, close) in THINKING_TAGS {
        while let Some(start) = result.find(open) {
            if let Some(end) = result[start..].find(close) {
                result.replace_range(start..start + end + close.len(), "");
            } else {
                break;
            }
        }
    }
    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_thinking_tags_removes_embedded_reasoning() {
        let input = "<think>internal notes</think>The answer is 42.";
        assert_eq!(strip_thinking_tags(input), "The answer is 42.");
    }

    #[test]
    fn strip_thinking_tags_is_noop_without_tags() {
        assert_eq!(strip_thinking_tags("plain text"), "plain text");
    }
}

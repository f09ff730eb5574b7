use async_trait::async_trait;
use common::error::AppError;

use crate::pipeline::{
    chat_manage::ChatManage,
    stage::{Stage, StageKind},
};

/// Renders the prompt the summary model will see: the session's system
/// prompt plus a user message built from `generation.context_template`
/// instantiated once per retrieved chunk, followed by the original query.
pub struct IntoChatMessage;

#[async_trait]
impl Stage for IntoChatMessage {
    fn kind(&self) -> StageKind {
        StageKind::IntoChatMessage
    }

    async fn run(&self, ctx: &mut ChatManage) -> Result<(), AppError> {
        let template = &ctx.session.generation.context_template;
        let context_block = ctx
            .merge_result
            .iter()
            .map(|reference| {
                template
                    .replace("{title}", &reference.title)
                    .replace("{content}", &reference.content)
            })
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");

        let user_content = if ctx.no_match {
            format!(
                "{}\n\nQuestion: {}",
                ctx.session.generation.no_match_prefix, ctx.query
            )
        } else {
            format!("Context:\n{context_block}\n\nQuestion: {}", ctx.query)
        };

        ctx.user_content = Some(user_content);
        Ok(())
    }
}

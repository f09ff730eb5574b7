use tracing::debug;

use common::error::AppError;

use crate::pipeline::{
    context::IngestionContext,
    state::{IngestionMachine, Parsed, Validated},
};

use super::map_guard_error;

/// SPEC_FULL §4.4 step 5: hand the source off to the parser service and
/// stash its text/image output on the context for the chunking stage.
#[tracing::instrument(skip_all, fields(task_id = %ctx.task_id, knowledge_id = %ctx.knowledge.id))]
pub async fn parse(
    machine: IngestionMachine<(), Validated>,
    ctx: &mut IngestionContext<'_>,
) -> Result<IngestionMachine<(), Parsed>, AppError> {
    let raw_bytes = ctx.raw_bytes.clone();
    let document = ctx
        .services
        .parser
        .parse(&ctx.knowledge, &ctx.kb, raw_bytes.as_deref())
        .await?;

    if document.text.trim().is_empty() && document.images.is_empty() {
        return Err(AppError::Validation(
            "parser produced no text or image content".into(),
        ));
    }

    debug!(
        task_id = %ctx.task_id,
        text_chars = document.text.chars().count(),
        image_count = document.images.len(),
        "ingestion parse stage completed"
    );

    ctx.images = document.images;
    ctx.text = Some(document.text);

    machine.parse().map_err(|(_, guard)| map_guard_error("parse", &guard))
}

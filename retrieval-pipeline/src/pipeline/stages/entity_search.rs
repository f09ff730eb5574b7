use async_trait::async_trait;
use common::error::AppError;
use tracing::warn;

use crate::pipeline::{
    chat_manage::ChatManage,
    stage::{Stage, StageKind},
};

/// One-hop graph expansion seeded by the entity mentions `preprocess_query`
/// found in the query. A no-op when the KB has no graph backend configured
/// or nothing was recognized.
pub struct EntitySearch;

#[async_trait]
impl Stage for EntitySearch {
    fn kind(&self) -> StageKind {
        StageKind::EntitySearch
    }

    async fn run(&self, ctx: &mut ChatManage) -> Result<(), AppError> {
        if ctx.entity.is_empty() {
            return Ok(());
        }
        let Some(graph) = ctx.services.engines.graph() else {
            return Ok(());
        };

        match graph.search_node(&ctx.kb.id, &ctx.entity).await {
            Ok(expansion) => ctx.graph_result = expansion,
            Err(err) => warn!(error = %err, "entity_search graph expansion failed"),
        }

        Ok(())
    }
}

#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod graph_extract;
pub mod parser;
pub mod pipeline;
pub mod utils;

use std::sync::Arc;

use tokio::time::{sleep, Duration};
use tracing::{error, info};

use common::task::queue::TaskQueue;
pub use pipeline::{IngestionConfig, IngestionPipeline, IngestionTuning, PipelineServices};

/// Claims ready tasks off the shared `TaskQueue` and drives them through the
/// `IngestionPipeline`, backing off when the queue is empty or a claim
/// itself errors (mirrors the source crate's lease-claim worker loop).
pub async fn run_worker_loop(queue: Arc<TaskQueue>, ingestion_pipeline: Arc<IngestionPipeline>) {
    let idle_backoff = Duration::from_millis(500);

    loop {
        match queue.claim_next_ready().await {
            Ok(Some(task)) => {
                let task_id = task.id.clone();
                info!(task_id = %task_id, attempts = ?task.status, "claimed ingestion task");
                if let Err(err) = ingestion_pipeline.process_task(task).await {
                    error!(task_id = %task_id, error = %err, "ingestion task failed");
                }
            }
            Ok(None) => sleep(idle_backoff).await,
            Err(err) => {
                error!(error = %err, "failed to claim ingestion task");
                sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

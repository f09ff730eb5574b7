use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client};
use fastembed::{InitOptions, TextEmbedding};
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};

use crate::error::AppError;

/// A remote OpenAI-compatible embedding model, addressed by name and a fixed
/// output dimension (validated against the owning KB's `embedding_dimension`
/// at call sites, not here).
#[derive(Clone)]
pub struct RemoteEmbedModel {
    client: Client<OpenAIConfig>,
    model: String,
    dimension: u32,
}

impl RemoteEmbedModel {
    #[must_use]
    pub fn new(client: Client<OpenAIConfig>, model: String, dimension: u32) -> Self {
        Self {
            client,
            model,
            dimension,
        }
    }

    pub async fn embed(&self, input: &str) -> Result<Vec<f32>, AppError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(self.model.clone())
            .dimensions(self.dimension)
            .input([input])
            .build()?;

        let response = self.client.embeddings().create(request).await?;
        let embedding = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| AppError::LLMParsing("no embedding data received".to_string()))?
            .embedding;
        Ok(embedding)
    }
}

/// A small pool of local `fastembed` model instances behind a semaphore,
/// checked out per request and built once at startup — the same shape as
/// the reranker pool in `retrieval-pipeline::reranking`.
pub struct LocalEmbedPool {
    engines: Vec<Arc<Mutex<TextEmbedding>>>,
    semaphore: Arc<Semaphore>,
    next: AtomicUsize,
}

pub struct LocalEmbedLease<'a> {
    _permit: SemaphorePermit<'a>,
    engine: Arc<Mutex<TextEmbedding>>,
}

impl LocalEmbedPool {
    pub fn new(pool_size: usize, init_options: InitOptions) -> Result<Self, AppError> {
        let pool_size = pool_size.max(1);
        let mut engines = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let engine = TextEmbedding::try_new(init_options.clone())
                .map_err(|e| AppError::InternalError(format!("fastembed init failed: {e}")))?;
            engines.push(Arc::new(Mutex::new(engine)));
        }
        Ok(Self {
            engines,
            semaphore: Arc::new(Semaphore::new(pool_size)),
            next: AtomicUsize::new(0),
        })
    }

    pub async fn checkout(&self) -> LocalEmbedLease<'_> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .expect("embed pool semaphore is never closed");
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.engines.len();
        LocalEmbedLease {
            _permit: permit,
            engine: self.engines[idx].clone(),
        }
    }
}

impl LocalEmbedLease<'_> {
    pub async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, AppError> {
        let mut engine = self.engine.lock().await;
        engine
            .embed(texts, None)
            .map_err(|e| AppError::InternalError(format!("fastembed embed failed: {e}")))
    }
}

/// Which embedding backend a KB is bound to, selected by
/// `KnowledgeBase::embedding_model` at startup.
pub enum EmbedModel {
    Remote(RemoteEmbedModel),
    Local(Arc<LocalEmbedPool>),
}

impl EmbedModel {
    pub async fn embed(&self, input: &str) -> Result<Vec<f32>, AppError> {
        match self {
            EmbedModel::Remote(model) => model.embed(input).await,
            EmbedModel::Local(pool) => {
                let lease = pool.checkout().await;
                let mut vectors = lease.embed(vec![input.to_string()]).await?;
                vectors
                    .pop()
                    .ok_or_else(|| AppError::LLMParsing("no embedding produced".to_string()))
            }
        }
    }
}

use std::{collections::HashMap, sync::Arc};

use async_openai::{config::OpenAIConfig, Client};
use fastembed::InitOptions;
use tokio::sync::RwLock;

use crate::{
    error::AppError,
    model::{
        chat::ChatModel,
        embed::{EmbedModel, LocalEmbedPool, RemoteEmbedModel},
    },
    utils::config::AppConfig,
};

/// Lifecycle-scoped registry of model adapters, built once at startup and
/// handed to both pipelines by reference. Avoids per-request client
/// construction and keeps model selection (by name, from `KnowledgeBase`)
/// out of the request path's control flow.
pub struct ModelRegistry {
    client: Client<OpenAIConfig>,
    local_embed_pool: Option<Arc<LocalEmbedPool>>,
    chat_cache: RwLock<HashMap<String, ChatModel>>,
}

impl ModelRegistry {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        let openai_config = OpenAIConfig::new()
            .with_api_key(config.openai_api_key.clone())
            .with_api_base(config.openai_base_url.clone());
        let client = Client::with_config(openai_config);

        let local_embed_pool = if config.reranking_enabled {
            let init_options = InitOptions::new(fastembed::EmbeddingModel::BGESmallENV15)
                .with_cache_dir(config.fastembed_cache_dir.clone().into())
                .with_show_download_progress(config.fastembed_show_download_progress);
            Some(Arc::new(LocalEmbedPool::new(
                config.reranking_pool_size,
                init_options,
            )?))
        } else {
            None
        };

        Ok(Self {
            client,
            local_embed_pool,
            chat_cache: RwLock::new(HashMap::new()),
        })
    }

    pub async fn chat_model(&self, model_name: &str) -> ChatModel {
        if let Some(existing) = self.chat_cache.read().await.get(model_name) {
            return existing.clone();
        }
        let model = ChatModel::new(self.client.clone(), model_name.to_string());
        self.chat_cache
            .write()
            .await
            .insert(model_name.to_string(), model.clone());
        model
    }

    /// Remote embed model bound to `model_name`/`dimension`; `"local"` is
    /// reserved to select the fastembed pool instead of an OpenAI-compatible
    /// call, matching the source crate's local-vs-remote model convention.
    #[must_use]
    pub fn embed_model(&self, model_name: &str, dimension: u32) -> Option<EmbedModel> {
        if model_name == "local" {
            self.local_embed_pool
                .clone()
                .map(EmbedModel::Local)
        } else {
            Some(EmbedModel::Remote(RemoteEmbedModel::new(
                self.client.clone(),
                model_name.to_string(),
                dimension,
            )))
        }
    }

    #[must_use]
    pub fn openai_client(&self) -> &Client<OpenAIConfig> {
        &self.client
    }
}

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    Memory,
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Local
}

/// Process-wide configuration, loaded once at startup from `config.toml` plus
/// environment overrides and handed down to every component that needs it.
#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    pub http_port: u16,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_storage_kind")]
    pub storage: StorageKind,
    #[serde(default)]
    pub pdf_ingest_mode: PdfIngestMode,

    /// Default quota (in bytes) granted to a tenant with no explicit override.
    #[serde(default = "default_tenant_storage_quota_bytes")]
    pub default_tenant_storage_quota_bytes: u64,

    /// Per-pipeline-stage soft timeout, per SPEC_FULL §5.
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,
    /// Soft deadline for an entire request (ingestion task or query pipeline run).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Idle timeout for an open SSE stream with no new deltas.
    #[serde(default = "default_stream_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,
    /// Retention window for a completed stream record before eviction.
    #[serde(default = "default_stream_retention_secs")]
    pub stream_retention_secs: u64,
    /// Re-attach poll interval while catching a reader up to a live stream.
    #[serde(default = "default_stream_reattach_poll_ms")]
    pub stream_reattach_poll_ms: u64,

    /// Relative weights for the critical/default/low task-runtime lanes.
    #[serde(default = "default_task_weight_critical")]
    pub task_weight_critical: u32,
    #[serde(default = "default_task_weight_default")]
    pub task_weight_default: u32,
    #[serde(default = "default_task_weight_low")]
    pub task_weight_low: u32,
    /// Number of ingestion worker loops to run concurrently.
    #[serde(default = "default_ingestion_concurrency")]
    pub ingestion_concurrency: usize,

    /// Max number of files accepted by a single upload request.
    #[serde(default = "default_ingest_max_files")]
    pub ingest_max_files: usize,
    /// Max size of a single uploaded file, in bytes.
    #[serde(default = "default_ingest_max_content_bytes")]
    pub ingest_max_content_bytes: usize,
    /// Body-size limit applied to the multipart upload route.
    #[serde(default = "default_ingest_max_body_bytes")]
    pub ingest_max_body_bytes: usize,

    /// Whether a local `fastembed` reranker pool is built at startup.
    #[serde(default = "default_reranking_enabled")]
    pub reranking_enabled: bool,
    #[serde(default = "default_reranking_pool_size")]
    pub reranking_pool_size: usize,
    #[serde(default = "default_fastembed_cache_dir")]
    pub fastembed_cache_dir: String,
    #[serde(default)]
    pub fastembed_show_download_progress: bool,
    #[serde(default = "default_fastembed_max_length")]
    pub fastembed_max_length: usize,

    /// Dimension of the single global HNSW index backing vector retrieval.
    /// Per-knowledge-base `embedding_dimension` is still tracked for
    /// validation, but SurrealDB's HNSW index is defined once per table, so
    /// every knowledge base sharing the `surreal_relational` engine must
    /// agree on this value until multi-index support is added.
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    /// Directory the local `tantivy_inverted_index` engine persists its
    /// index segments under.
    #[serde(default = "default_tantivy_index_dir")]
    pub tantivy_index_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            surrealdb_address: String::new(),
            surrealdb_username: String::new(),
            surrealdb_password: String::new(),
            surrealdb_namespace: String::new(),
            surrealdb_database: String::new(),
            data_dir: default_data_dir(),
            http_port: 0,
            openai_base_url: default_base_url(),
            storage: default_storage_kind(),
            pdf_ingest_mode: PdfIngestMode::default(),
            default_tenant_storage_quota_bytes: default_tenant_storage_quota_bytes(),
            stage_timeout_secs: default_stage_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            stream_idle_timeout_secs: default_stream_idle_timeout_secs(),
            stream_retention_secs: default_stream_retention_secs(),
            stream_reattach_poll_ms: default_stream_reattach_poll_ms(),
            task_weight_critical: default_task_weight_critical(),
            task_weight_default: default_task_weight_default(),
            task_weight_low: default_task_weight_low(),
            ingestion_concurrency: default_ingestion_concurrency(),
            ingest_max_files: default_ingest_max_files(),
            ingest_max_content_bytes: default_ingest_max_content_bytes(),
            ingest_max_body_bytes: default_ingest_max_body_bytes(),
            reranking_enabled: default_reranking_enabled(),
            reranking_pool_size: default_reranking_pool_size(),
            fastembed_cache_dir: default_fastembed_cache_dir(),
            fastembed_show_download_progress: false,
            fastembed_max_length: default_fastembed_max_length(),
            embedding_dimension: default_embedding_dimension(),
            tantivy_index_dir: default_tantivy_index_dir(),
        }
    }
}

#[derive(Clone, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PdfIngestMode {
    #[default]
    LlmFirst,
    TextOnly,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_tenant_storage_quota_bytes() -> u64 {
    10 * 1024 * 1024 * 1024
}

fn default_stage_timeout_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_stream_idle_timeout_secs() -> u64 {
    60
}

fn default_stream_retention_secs() -> u64 {
    30
}

fn default_stream_reattach_poll_ms() -> u64 {
    100
}

fn default_task_weight_critical() -> u32 {
    6
}

fn default_task_weight_default() -> u32 {
    3
}

fn default_task_weight_low() -> u32 {
    1
}

fn default_ingestion_concurrency() -> usize {
    4
}

fn default_ingest_max_files() -> usize {
    32
}

fn default_ingest_max_content_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_ingest_max_body_bytes() -> usize {
    128 * 1024 * 1024
}

fn default_reranking_enabled() -> bool {
    false
}

fn default_reranking_pool_size() -> usize {
    1
}

fn default_fastembed_cache_dir() -> String {
    "./data/fastembed".to_string()
}

fn default_fastembed_max_length() -> usize {
    512
}

fn default_embedding_dimension() -> usize {
    1536
}

fn default_tantivy_index_dir() -> String {
    "./data/tantivy".to_string()
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

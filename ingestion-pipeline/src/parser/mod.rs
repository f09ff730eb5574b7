pub mod audio_transcription;
pub mod file_text_extraction;
pub mod image_parsing;
pub mod pdf_ingestion;
pub mod url_text_retrieval;

use async_trait::async_trait;
use common::{
    error::AppError,
    model::registry::ModelRegistry,
    storage::types::{chunk::ImageInfo, knowledge::Knowledge, knowledge_base::KnowledgeBase},
    utils::config::AppConfig,
};

/// What a parse produces before chunking: the document's plain text plus any
/// image-derived side content (OCR/caption), each tagged with the character
/// offset range in `text` its source image occupies.
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub text: String,
    pub images: Vec<ImageInfo>,
}

/// External parse contract (SPEC_FULL §4.4 step 5): in the real system this
/// would be an RPC to a standalone parser service; here it is a trait with a
/// local default implementation so the pipeline still runs end to end
/// without inventing novel parsing logic of its own.
#[async_trait]
pub trait ParserService: Send + Sync {
    async fn parse(
        &self,
        knowledge: &Knowledge,
        kb: &KnowledgeBase,
        raw_bytes: Option<&[u8]>,
    ) -> Result<ParsedDocument, AppError>;
}

/// Dispatches by `KnowledgeSource`/MIME type to the file/URL/PDF/image/audio
/// extraction utilities, grounded on the source crate's
/// `extract_text_from_file`/`extract_text_from_url` dispatch.
pub struct DefaultParserService {
    models: std::sync::Arc<ModelRegistry>,
    config: AppConfig,
}

impl DefaultParserService {
    #[must_use]
    pub fn new(models: std::sync::Arc<ModelRegistry>, config: AppConfig) -> Self {
        Self { models, config }
    }
}

#[async_trait]
impl ParserService for DefaultParserService {
    async fn parse(
        &self,
        knowledge: &Knowledge,
        kb: &KnowledgeBase,
        raw_bytes: Option<&[u8]>,
    ) -> Result<ParsedDocument, AppError> {
        use common::storage::types::knowledge::KnowledgeSource;

        match &knowledge.source {
            KnowledgeSource::File {
                mime_type,
                file_name,
                ..
            } => {
                let bytes = raw_bytes.ok_or_else(|| {
                    AppError::InternalError("file source parse called with no bytes".into())
                })?;
                file_text_extraction::extract_text_from_file(
                    bytes,
                    mime_type,
                    file_name,
                    &self.models,
                    kb,
                    &self.config,
                )
                .await
            }
            KnowledgeSource::Url { url } => {
                url_text_retrieval::extract_text_from_url(url, &self.config).await
            }
        }
    }
}

use std::{
    env,
    io::{Error as IoError, ErrorKind},
    path::{Path, PathBuf},
};

use common::{
    error::AppError,
    model::registry::ModelRegistry,
    storage::types::{chunk::ImageInfo, knowledge_base::KnowledgeBase},
    utils::config::AppConfig,
};
use uuid::Uuid;

use crate::parser::ParsedDocument;

use super::{
    audio_transcription::transcribe_audio_file, image_parsing::extract_text_from_image,
    pdf_ingestion::extract_pdf_content,
};

struct TempPathGuard {
    path: PathBuf,
}

impl TempPathGuard {
    fn as_path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempPathGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

async fn materialize_temp_file(
    bytes: &[u8],
    extension: Option<&str>,
) -> Result<TempPathGuard, AppError> {
    let mut path = env::temp_dir();
    let mut file_name = format!("rag-ingest-{}", Uuid::new_v4());

    if let Some(ext) = extension {
        if !ext.is_empty() {
            file_name.push('.');
            file_name.push_str(ext);
        }
    }

    path.push(file_name);
    tokio::fs::write(&path, bytes).await?;

    Ok(TempPathGuard { path })
}

fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_string())
}

/// Dispatches by MIME type to the text/PDF/image/audio extraction paths,
/// grounded on the source crate's `extract_text_from_file`. Image bytes are
/// captioned and returned as a single synthetic image side-channel covering
/// the entire caption text, since a standalone image file has no surrounding
/// document text to anchor offsets against.
pub async fn extract_text_from_file(
    bytes: &[u8],
    mime_type: &str,
    file_name: &str,
    models: &ModelRegistry,
    kb: &KnowledgeBase,
    config: &AppConfig,
) -> Result<ParsedDocument, AppError> {
    match mime_type {
        "text/plain" | "text/markdown" | "application/octet-stream" | "text/x-rust" => {
            let text = String::from_utf8(bytes.to_vec())
                .map_err(|err| AppError::Io(IoError::new(ErrorKind::InvalidData, err)))?;
            Ok(ParsedDocument {
                text,
                images: Vec::new(),
            })
        }
        "application/pdf" => {
            let client = models.openai_client();
            let temp_guard = materialize_temp_file(bytes, Some("pdf")).await?;
            let text = extract_pdf_content(
                temp_guard.as_path(),
                client,
                &kb.chat_model,
                &config.pdf_ingest_mode,
            )
            .await?;
            Ok(ParsedDocument {
                text,
                images: Vec::new(),
            })
        }
        "image/png" | "image/jpeg" => {
            let client = models.openai_client();
            let caption = extract_text_from_image(bytes, client, &kb.chat_model).await?;
            let end_offset = caption.chars().count() as u32;
            Ok(ParsedDocument {
                text: caption.clone(),
                images: vec![ImageInfo {
                    url: file_name.to_string(),
                    caption: Some(caption),
                    ocr_text: None,
                    start_offset: 0,
                    end_offset,
                }],
            })
        }
        "audio/mpeg" | "audio/mp3" | "audio/wav" | "audio/x-wav" | "audio/webm" | "audio/mp4"
        | "audio/ogg" | "audio/flac" => {
            let client = models.openai_client();
            let extension = extension_of(file_name);
            let temp_guard = materialize_temp_file(bytes, extension.as_deref()).await?;
            let path_str = temp_guard.as_path().to_str().ok_or_else(|| {
                AppError::Processing(format!(
                    "Encountered a non-UTF8 path while reading audio file {file_name}"
                ))
            })?;
            let text = transcribe_audio_file(path_str, client, &kb.chat_model).await?;
            Ok(ParsedDocument {
                text,
                images: Vec::new(),
            })
        }
        other => Err(AppError::Validation(format!(
            "unsupported file MIME type: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::utils::config::{AppConfig, StorageKind};

    fn test_kb() -> KnowledgeBase {
        KnowledgeBase::new(
            "tenant-1".into(),
            "kb".into(),
            512,
            64,
            vec!["\n\n".into()],
            false,
            "text-embedding-3-small".into(),
            1536,
            "gpt-4o-mini".into(),
            None,
            common::storage::types::knowledge_base::RetrievalBackendKind::InvertedIndex,
            None,
        )
        .expect("valid kb")
    }

    #[tokio::test]
    async fn extracts_plain_text_directly() {
        let models = ModelRegistry::new(&AppConfig {
            storage: StorageKind::Memory,
            ..Default::default()
        })
        .expect("model registry");
        let kb = test_kb();
        let config = AppConfig::default();

        let doc = extract_text_from_file(
            b"hello world",
            "text/plain",
            "file.txt",
            &models,
            &kb,
            &config,
        )
        .await
        .expect("extract text");

        assert_eq!(doc.text, "hello world");
        assert!(doc.images.is_empty());
    }

    #[tokio::test]
    async fn rejects_unsupported_mime_type() {
        let models = ModelRegistry::new(&AppConfig {
            storage: StorageKind::Memory,
            ..Default::default()
        })
        .expect("model registry");
        let kb = test_kb();
        let config = AppConfig::default();

        let result = extract_text_from_file(
            b"binary",
            "application/zip",
            "file.zip",
            &models,
            &kb,
            &config,
        )
        .await;

        assert!(result.is_err());
    }
}

use async_openai::types::{AudioResponseFormat, CreateTranscriptionRequestArgs};
use common::error::AppError;

/// Transcribes an audio file at `file_path` using the configured OpenAI
/// Whisper-compatible model.
pub async fn transcribe_audio_file(
    file_path: &str,
    client: &async_openai::Client<async_openai::config::OpenAIConfig>,
    model: &str,
) -> Result<String, AppError> {
    let request = CreateTranscriptionRequestArgs::default()
        .file(file_path)
        .model(model)
        .response_format(AudioResponseFormat::Json)
        .build()?;

    let response = client
        .audio()
        .transcribe(request)
        .await
        .map_err(|e| AppError::Processing(format!("Audio transcription failed: {e}")))?;
    Ok(response.text)
}

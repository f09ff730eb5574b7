use async_openai::types::{
    ChatCompletionRequestMessageContentPartImageArgs,
    ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs, ImageDetail, ImageUrlArgs,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::error::AppError;

const IMAGE_CAPTION_PROMPT: &str = "Describe this image in detail, including any text visible in it (OCR). Write the description as plain prose suitable for full-text search.";

/// Captions an image via a vision-capable chat model, grounded on the source
/// crate's image-to-text call. The knowledge base's configured chat model is
/// reused for captioning rather than a dedicated image model, since the
/// schema doesn't carry one.
pub async fn extract_text_from_image(
    image_bytes: &[u8],
    client: &async_openai::Client<async_openai::config::OpenAIConfig>,
    model: &str,
) -> Result<String, AppError> {
    let base64_image = STANDARD.encode(image_bytes);
    let image_url = format!("data:image/png;base64,{base64_image}");

    let request = CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages([ChatCompletionRequestUserMessageArgs::default()
            .content(vec![
                ChatCompletionRequestMessageContentPartTextArgs::default()
                    .text(IMAGE_CAPTION_PROMPT)
                    .build()?
                    .into(),
                ChatCompletionRequestMessageContentPartImageArgs::default()
                    .image_url(
                        ImageUrlArgs::default()
                            .url(image_url)
                            .detail(ImageDetail::High)
                            .build()?,
                    )
                    .build()?
                    .into(),
            ])
            .build()?
            .into()])
        .build()?;

    let response = client.chat().create(request).await?;

    let description = response
        .choices
        .first()
        .and_then(|c| c.message.content.as_ref())
        .cloned()
        .unwrap_or_else(|| "No description found.".to_string());

    Ok(description)
}

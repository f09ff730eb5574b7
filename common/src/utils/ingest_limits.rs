use super::config::AppConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestValidationError {
    PayloadTooLarge(String),
    BadRequest(String),
}

/// Validates a batch of file uploads against the configured limits, before
/// any bytes are persisted or a `Knowledge` row is created for them.
pub fn validate_file_batch(
    config: &AppConfig,
    file_count: usize,
    file_sizes: &[usize],
) -> Result<(), IngestValidationError> {
    if file_count > config.ingest_max_files {
        return Err(IngestValidationError::BadRequest(format!(
            "Too many files. Maximum allowed is {}",
            config.ingest_max_files
        )));
    }

    for size in file_sizes {
        if *size > config.ingest_max_content_bytes {
            return Err(IngestValidationError::PayloadTooLarge(format!(
                "File is too large. Maximum allowed is {} bytes",
                config.ingest_max_content_bytes
            )));
        }
    }

    Ok(())
}

/// Validates a single URL ingestion request's declared content length, once
/// known (e.g. from a `Content-Length` response header).
pub fn validate_url_content_length(
    config: &AppConfig,
    content_length: Option<usize>,
) -> Result<(), IngestValidationError> {
    if let Some(len) = content_length {
        if len > config.ingest_max_content_bytes {
            return Err(IngestValidationError::PayloadTooLarge(format!(
                "Fetched content is too large. Maximum allowed is {} bytes",
                config.ingest_max_content_bytes
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_file_batch_rejects_too_many_files() {
        let config = AppConfig {
            ingest_max_files: 1,
            ..Default::default()
        };
        let result = validate_file_batch(&config, 2, &[10, 10]);

        assert!(matches!(result, Err(IngestValidationError::BadRequest(_))));
    }

    #[test]
    fn validate_file_batch_rejects_oversized_file() {
        let config = AppConfig {
            ingest_max_content_bytes: 4,
            ..Default::default()
        };
        let result = validate_file_batch(&config, 1, &[5]);

        assert!(matches!(
            result,
            Err(IngestValidationError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn validate_file_batch_accepts_valid_batch() {
        let config = AppConfig::default();
        let result = validate_file_batch(&config, 2, &[10, 20]);

        assert!(result.is_ok());
    }

    #[test]
    fn validate_url_content_length_rejects_oversized() {
        let config = AppConfig {
            ingest_max_content_bytes: 4,
            ..Default::default()
        };
        let result = validate_url_content_length(&config, Some(100));

        assert!(matches!(
            result,
            Err(IngestValidationError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn validate_url_content_length_accepts_unknown_length() {
        let config = AppConfig::default();
        let result = validate_url_content_length(&config, None);

        assert!(result.is_ok());
    }
}

use std::net::IpAddr;

use common::{error::AppError, utils::config::AppConfig};
use dom_smoothie::{Article, Readability, TextMode};
use headless_chrome::Browser;
use tracing::{info, warn};

use crate::parser::ParsedDocument;

/// Renders `url` with a headless Chrome tab and extracts the main article
/// text with Readability, grounded on the source crate's screenshot-capture
/// flow minus the screenshot itself: this pipeline only needs text, not a
/// persisted preview image.
pub async fn extract_text_from_url(
    url: &str,
    config: &AppConfig,
) -> Result<ParsedDocument, AppError> {
    let parsed_url =
        url::Url::parse(url).map_err(|_| AppError::Validation("Invalid URL".to_string()))?;
    ensure_ingestion_url_allowed(&parsed_url)?;

    info!(%url, "Fetching URL for ingestion");

    let browser = {
        #[cfg(feature = "docker")]
        {
            let options = headless_chrome::LaunchOptionsBuilder::default()
                .sandbox(false)
                .build()
                .map_err(|e| AppError::Processing(format!("Failed to launch Chrome: {e}")))?;
            Browser::new(options)
                .map_err(|e| AppError::Processing(format!("Failed to start Chrome: {e}")))?
        }
        #[cfg(not(feature = "docker"))]
        {
            Browser::default()
                .map_err(|e| AppError::Processing(format!("Failed to start Chrome: {e}")))?
        }
    };

    let tab = browser
        .new_tab()
        .map_err(|e| AppError::Processing(format!("Failed to create Chrome tab: {e}")))?;
    let page = tab
        .navigate_to(url)
        .map_err(|e| AppError::Processing(format!("Failed to navigate to URL: {e}")))?;
    let loaded_page = page
        .wait_until_navigated()
        .map_err(|e| AppError::Processing(format!("Navigation failed: {e}")))?;
    let raw_content = loaded_page
        .get_content()
        .map_err(|e| AppError::Processing(format!("Failed to read page content: {e}")))?;

    let dom_config = dom_smoothie::Config {
        text_mode: TextMode::Markdown,
        ..Default::default()
    };
    let mut readability = Readability::new(raw_content, None, Some(dom_config))
        .map_err(|e| AppError::Processing(format!("readability init: {e}")))?;
    let article: Article = readability
        .parse()
        .map_err(|e| AppError::Processing(format!("readability parse: {e}")))?;

    common::utils::ingest_limits::validate_url_content_length(
        config,
        Some(article.text_content.len()),
    )
    .map_err(|err| AppError::Validation(format!("{err:?}")))?;

    Ok(ParsedDocument {
        text: article.text_content.into_owned(),
        images: Vec::new(),
    })
}

/// Rejects ingestion URLs that aren't public http(s) endpoints, returning a
/// sanitized domain string on success for use in logs/derived file names.
pub fn ensure_ingestion_url_allowed(url: &url::Url) -> Result<String, AppError> {
    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            warn!(%url, %scheme, "Rejected ingestion URL due to unsupported scheme");
            return Err(AppError::Validation(
                "Unsupported URL scheme for ingestion".to_string(),
            ));
        }
    }

    let Some(host) = url.host_str() else {
        warn!(%url, "Rejected ingestion URL missing host");
        return Err(AppError::Validation(
            "URL is missing a host component".to_string(),
        ));
    };

    if host.eq_ignore_ascii_case("localhost") {
        warn!(%url, host, "Rejected ingestion URL to localhost");
        return Err(AppError::Validation(
            "Ingestion URL host is not allowed".to_string(),
        ));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        let is_disallowed = match ip {
            IpAddr::V4(v4) => v4.is_private() || v4.is_link_local(),
            IpAddr::V6(v6) => v6.is_unique_local() || v6.is_unicast_link_local(),
        };

        if ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() || is_disallowed {
            warn!(%url, host, %ip, "Rejected ingestion URL pointing to restricted network range");
            return Err(AppError::Validation(
                "Ingestion URL host is not allowed".to_string(),
            ));
        }
    }

    Ok(host.replace(|c: char| !c.is_alphanumeric(), "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_scheme() {
        let url = url::Url::parse("ftp://example.com").expect("url");
        assert!(ensure_ingestion_url_allowed(&url).is_err());
    }

    #[test]
    fn rejects_localhost() {
        let url = url::Url::parse("http://localhost/resource").expect("url");
        assert!(ensure_ingestion_url_allowed(&url).is_err());
    }

    #[test]
    fn rejects_private_ipv4() {
        let url = url::Url::parse("http://192.168.1.10/index.html").expect("url");
        assert!(ensure_ingestion_url_allowed(&url).is_err());
    }

    #[test]
    fn allows_public_domain_and_sanitizes() {
        let url = url::Url::parse("https://sub.example.com/path").expect("url");
        let sanitized = ensure_ingestion_url_allowed(&url).expect("allowed");
        assert_eq!(sanitized, "sub_example_com");
    }
}

//! Input validation for profile intake.

use url::Url;

use crate::error::AppError;

/// Extracts the Instagram username from a profile URL.
///
/// Accepts bare hosts (`instagram.com/jane`) and `@`-prefixed handles in the path. Post and
/// embed URLs are rejected because they carry no username.
pub fn extract_instagram_username(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput("URL is required".to_string()));
    }

    let normalized = if trimmed.starts_with("http") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&normalized)
        .map_err(|_| AppError::InvalidInput("Must be a valid URL".to_string()))?;

    let host = url.host_str().unwrap_or_default();
    if !host.contains("instagram.com") {
        return Err(AppError::InvalidInput(
            "Must be an Instagram profile URL".to_string(),
        ));
    }

    let first_segment = url
        .path_segments()
        .and_then(|mut segments| segments.find(|s| !s.is_empty()));

    match first_segment {
        Some(segment) if segment != "embed" && segment != "p" => {
            let username = segment.replacen('@', "", 1);
            let username = username.trim_end_matches('/');
            if username.is_empty() {
                return Err(invalid_profile_url());
            }
            Ok(username.to_string())
        }
        _ => Err(invalid_profile_url()),
    }
}

fn invalid_profile_url() -> AppError {
    AppError::InvalidInput(
        "Must be a valid Instagram profile URL (e.g., https://instagram.com/username)"
            .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(err: AppError) -> String {
        match err {
            AppError::InvalidInput(msg) => msg,
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn extracts_username_from_common_forms() {
        for raw in [
            "https://www.instagram.com/jane.doe/",
            "instagram.com/jane.doe",
            "  https://instagram.com/jane.doe?igshid=abc  ",
            "https://instagram.com/@jane.doe",
        ] {
            assert_eq!(extract_instagram_username(raw).unwrap(), "jane.doe", "{raw}");
        }
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(
            message(extract_instagram_username("   ").unwrap_err()),
            "URL is required"
        );
    }

    #[test]
    fn rejects_other_hosts() {
        assert_eq!(
            message(extract_instagram_username("https://tiktok.com/@jane").unwrap_err()),
            "Must be an Instagram profile URL"
        );
    }

    #[test]
    fn rejects_post_embed_and_root_urls() {
        for raw in [
            "https://instagram.com/p/Cabc123/",
            "https://instagram.com/embed",
            "https://instagram.com/",
        ] {
            let msg = message(extract_instagram_username(raw).unwrap_err());
            assert!(msg.starts_with("Must be a valid Instagram profile URL"), "{raw}");
        }
    }
}

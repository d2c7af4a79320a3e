//! Key and URL helpers shared by every storage backend.

use crate::traits::{StorageError, StorageResult};

/// Rejects keys that could escape the store root.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.contains("..") || key.starts_with('/') {
        return Err(StorageError::InvalidKey(format!(
            "Storage key contains invalid characters: {}",
            key
        )));
    }
    Ok(())
}

/// Public URL of `key` under `public_base`.
pub fn public_url(public_base: &str, key: &str) -> String {
    format!("{}/{}", public_base.trim_end_matches('/'), key)
}

/// Maps a public URL back to its key.
///
/// Returns `None` for URLs outside `public_base`; those point at content the store does not own.
pub fn key_for_url(public_base: &str, url: &str) -> Option<String> {
    let base = public_base.trim_end_matches('/');
    if base.is_empty() {
        return None;
    }
    let key = url.strip_prefix(base)?.strip_prefix('/')?;
    let key = key.split(['?', '#']).next().unwrap_or_default();
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

/// File extension for an upload's content type, `bin` when unknown.
pub fn extension_for_content_type(content_type: &str) -> &str {
    content_type
        .split('/')
        .nth(1)
        .map(|subtype| subtype.split(';').next().unwrap_or(subtype).trim())
        .filter(|ext| !ext.is_empty())
        .unwrap_or("bin")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://pub-123.r2.dev";

    #[test]
    fn key_for_url_strips_public_prefix() {
        assert_eq!(
            key_for_url(BASE, "https://pub-123.r2.dev/anc_1_angle-left_1.jpg"),
            Some("anc_1_angle-left_1.jpg".to_string())
        );
        assert_eq!(
            key_for_url("https://pub-123.r2.dev/", "https://pub-123.r2.dev/frame_a.png?v=2"),
            Some("frame_a.png".to_string())
        );
    }

    #[test]
    fn key_for_url_ignores_foreign_urls() {
        assert_eq!(key_for_url(BASE, "https://scontent.cdninstagram.com/x.jpg"), None);
        assert_eq!(key_for_url(BASE, "https://pub-123.r2.dev"), None);
        assert_eq!(key_for_url("", "https://pub-123.r2.dev/a.jpg"), None);
    }

    #[test]
    fn public_url_joins_without_double_slash() {
        assert_eq!(public_url("https://cdn/", "a.jpg"), "https://cdn/a.jpg");
    }

    #[test]
    fn validate_key_rejects_traversal() {
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("/abs.jpg").is_err());
        assert!(validate_key("").is_err());
        assert!(validate_key("var_1_light-left.jpg").is_ok());
    }

    #[test]
    fn extension_from_content_type() {
        assert_eq!(extension_for_content_type("image/png"), "png");
        assert_eq!(extension_for_content_type("video/mp4; codecs=avc1"), "mp4");
        assert_eq!(extension_for_content_type("garbage"), "bin");
    }
}

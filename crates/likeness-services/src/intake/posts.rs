//! Photo extraction from `/user/posts` pages.

use serde_json::Value;
use std::collections::HashSet;

use likeness_plugins::json::{first_scalar, first_str, unwrap_data};

use super::events::CollectedPhoto;

const CAPTION: &str = "/edge_media_to_caption/edges/0/node/text";

/// Cursor for the next page; `None` ends pagination.
pub fn next_cursor(page: &Value) -> Option<String> {
    first_str(page, &["/data/last_cursor", "/last_cursor"])
}

/// Appends the photos on one posts page to `out`.
///
/// Single images contribute their display URL; carousels contribute their cover plus every
/// image child. Videos are ignored.
pub fn extract_photos(page: &Value, out: &mut Vec<CollectedPhoto>) {
    let Some(posts) = unwrap_data(page).get("posts").and_then(Value::as_array) else {
        return;
    };

    for post in posts {
        let post = post.get("node").unwrap_or(post);
        let typename = post.get("__typename").and_then(Value::as_str);
        if !matches!(typename, Some("GraphImage") | Some("GraphSidecar")) {
            continue;
        }
        let Some(display_url) = first_str(post, &["/display_url"]) else {
            continue;
        };
        let caption = first_str(post, &[CAPTION]).unwrap_or_default();
        let post_id = first_scalar(post, &["/id", "/shortcode"]).unwrap_or_default();

        out.push(CollectedPhoto {
            url: display_url.clone(),
            thumbnail: Some(display_url),
            id: post_id.clone(),
            caption: caption.clone(),
        });

        if typename != Some("GraphSidecar") {
            continue;
        }
        let children = post
            .pointer("/edge_sidecar_to_children/edges")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for edge in children {
            let Some(child) = edge.get("node") else {
                continue;
            };
            if child.get("__typename").and_then(Value::as_str) != Some("GraphImage") {
                continue;
            }
            let Some(url) = first_str(child, &["/display_url"]) else {
                continue;
            };
            let id = first_scalar(child, &["/id"])
                .unwrap_or_else(|| format!("{}_{}", post_id, out.len()));
            out.push(CollectedPhoto {
                url: url.clone(),
                thumbnail: Some(url),
                id,
                caption: caption.clone(),
            });
        }
    }
}

/// Keeps the first occurrence of each URL, preserving order.
pub fn dedup_by_url(photos: Vec<CollectedPhoto>) -> Vec<CollectedPhoto> {
    let mut seen = HashSet::new();
    photos
        .into_iter()
        .filter(|p| seen.insert(p.url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page() -> Value {
        json!({
            "data": {
                "last_cursor": "abc",
                "posts": [
                    {"node": {
                        "__typename": "GraphImage",
                        "id": "1",
                        "display_url": "https://cdn.test/1.jpg",
                        "edge_media_to_caption": {"edges": [{"node": {"text": "beach"}}]}
                    }},
                    {"node": {
                        "__typename": "GraphSidecar",
                        "id": "2",
                        "display_url": "https://cdn.test/2.jpg",
                        "edge_sidecar_to_children": {"edges": [
                            {"node": {"__typename": "GraphImage", "id": "2a", "display_url": "https://cdn.test/2a.jpg"}},
                            {"node": {"__typename": "GraphVideo", "id": "2b", "display_url": "https://cdn.test/2b.jpg"}},
                            {"node": {"__typename": "GraphImage", "display_url": "https://cdn.test/2c.jpg"}}
                        ]}
                    }},
                    {"node": {"__typename": "GraphVideo", "id": "3", "display_url": "https://cdn.test/3.jpg"}},
                    {"__typename": "GraphImage", "shortcode": "XYZ", "display_url": "https://cdn.test/4.jpg"}
                ]
            }
        })
    }

    #[test]
    fn extracts_images_and_carousel_children() {
        let mut photos = Vec::new();
        extract_photos(&page(), &mut photos);

        let urls: Vec<&str> = photos.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://cdn.test/1.jpg",
                "https://cdn.test/2.jpg",
                "https://cdn.test/2a.jpg",
                "https://cdn.test/2c.jpg",
                "https://cdn.test/4.jpg",
            ]
        );
        assert_eq!(photos[0].caption, "beach");
        assert_eq!(photos[3].id, "2_3");
        assert_eq!(photos[4].id, "XYZ");
    }

    #[test]
    fn missing_posts_yields_nothing() {
        let mut photos = Vec::new();
        extract_photos(&json!({"data": {"last_cursor": null}}), &mut photos);
        assert!(photos.is_empty());
    }

    #[test]
    fn next_cursor_absent_or_null() {
        assert_eq!(next_cursor(&page()).as_deref(), Some("abc"));
        assert_eq!(next_cursor(&json!({"data": {"last_cursor": null}})), None);
        assert_eq!(next_cursor(&json!({})), None);
    }

    #[test]
    fn dedup_keeps_first_seen_metadata() {
        let photo = |url: &str, id: &str| CollectedPhoto {
            url: url.to_string(),
            thumbnail: None,
            id: id.to_string(),
            caption: String::new(),
        };
        let unique = dedup_by_url(vec![
            photo("https://cdn.test/a.jpg", "first"),
            photo("https://cdn.test/b.jpg", "b"),
            photo("https://cdn.test/a.jpg", "second"),
        ]);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].id, "first");
        assert_eq!(unique[1].id, "b");
    }
}

//! Reel extraction from `/user/reels` pages, tolerant of several response shapes.

use serde_json::Value;

use likeness_plugins::json::{first_scalar, first_str, unwrap_data};

use super::events::CollectedReel;

const VIDEO_URL: &[&str] = &[
    "/video_versions/0/url",
    "/video_url",
    "/video_versions2/candidates/0/url",
];
const THUMBNAIL_URL: &[&str] = &[
    "/image_versions2/candidates/0/url",
    "/display_url",
    "/thumbnail_src",
    "/thumbnail_url",
    "/image_versions/0/url",
];
const CAPTION: &[&str] = &[
    "/caption/text",
    "/edge_media_to_caption/edges/0/node/text",
    "/caption_text",
];
const ID: &[&str] = &["/code", "/shortcode", "/id", "/pk"];

fn reel_list(page: &Value) -> &[Value] {
    let data = unwrap_data(page);
    ["data", "reels", "posts"]
        .iter()
        .find_map(|key| data.get(*key).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Appends every reel with a video URL on one page to `out`.
pub fn extract_reels(page: &Value, out: &mut Vec<CollectedReel>) {
    for item in reel_list(page) {
        let media = item
            .get("media")
            .or_else(|| item.get("node"))
            .unwrap_or(item);

        let Some(url) = first_str(media, VIDEO_URL) else {
            continue;
        };
        let id = first_scalar(media, ID).unwrap_or_else(|| format!("reel_{}", out.len()));
        out.push(CollectedReel {
            url,
            thumbnail: first_str(media, THUMBNAIL_URL),
            id,
            caption: first_str(media, CAPTION).unwrap_or_default(),
            shortcode: first_str(media, &["/code", "/shortcode"]),
        });
    }
}

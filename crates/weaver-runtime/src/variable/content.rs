//! Multimodal content parts.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A URL payload inside a content part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaUrl {
    /// Remote URL or data URI.
    pub url: String,
}

/// One segment of a multimodal prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// Text content.
        text: String,
    },
    /// An image reference.
    ImageUrl {
        /// Image location.
        image_url: MediaUrl,
    },
    /// A video reference.
    VideoUrl {
        /// Video location.
        video_url: MediaUrl,
    },
}

impl ContentPart {
    /// Creates a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Creates an image part.
    pub fn image(url: impl Into<String>) -> Self {
        Self::ImageUrl {
            image_url: MediaUrl { url: url.into() },
        }
    }

    /// Creates a video part.
    pub fn video(url: impl Into<String>) -> Self {
        Self::VideoUrl {
            video_url: MediaUrl { url: url.into() },
        }
    }
}

const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".webp", ".bmp", ".svg"];
const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".webm", ".mov", ".avi", ".mkv", ".m4v"];

fn media_from_str(s: &str) -> Option<ContentPart> {
    let trimmed = s.trim();
    if trimmed.starts_with("data:image/") {
        return Some(ContentPart::image(trimmed));
    }
    if trimmed.starts_with("data:video/") {
        return Some(ContentPart::video(trimmed));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return None;
    }

    let path = trimmed
        .split(['?', '#'])
        .next()
        .unwrap_or(trimmed)
        .to_ascii_lowercase();
    if IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        Some(ContentPart::image(trimmed))
    } else if VIDEO_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        Some(ContentPart::video(trimmed))
    } else {
        None
    }
}

fn media_from_object(map: &serde_json::Map<String, Value>) -> Option<ContentPart> {
    let kind = map.get("type").and_then(Value::as_str)?;
    let url = |nested: &str| {
        map.get("url")
            .and_then(Value::as_str)
            .or_else(|| map.get(nested)?.get("url")?.as_str())
            .map(str::to_owned)
    };

    match kind {
        "image" | "image_url" => url("image_url").map(ContentPart::image),
        "video" | "video_url" => url("video_url").map(ContentPart::video),
        _ => None,
    }
}

/// Converts a resolved value into media parts, if it is media.
///
/// Recognizes data URIs, URLs with a known media extension, `{type, url}`
/// objects and arrays made up entirely of such items.
pub fn media_parts(value: &Value) -> Option<Vec<ContentPart>> {
    match value {
        Value::String(s) => media_from_str(s).map(|part| vec![part]),
        Value::Object(map) => media_from_object(map).map(|part| vec![part]),
        Value::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| match item {
                Value::String(s) => media_from_str(s),
                Value::Object(map) => media_from_object(map),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

/// Appends a part, merging adjacent text segments.
pub fn push_part(parts: &mut Vec<ContentPart>, part: ContentPart) {
    if let ContentPart::Text { text } = &part {
        if text.is_empty() {
            return;
        }
        if let Some(ContentPart::Text { text: last }) = parts.last_mut() {
            last.push_str(text);
            return;
        }
    }
    parts.push(part);
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_detects_media() {
        assert_eq!(
            media_parts(&json!("https://cdn.example.com/cat.PNG?size=2")),
            Some(vec![ContentPart::image("https://cdn.example.com/cat.PNG?size=2")])
        );
        assert_eq!(
            media_parts(&json!({ "type": "video_url", "video_url": { "url": "https://x/v" } })),
            Some(vec![ContentPart::video("https://x/v")])
        );
        assert_eq!(media_parts(&json!("https://example.com/page")), None);
        assert_eq!(media_parts(&json!(["https://x/a.png", "plain"])), None);
    }

    #[test]
    fn test_adjacent_text_merges() {
        let mut parts = Vec::new();
        push_part(&mut parts, ContentPart::text("Look at "));
        push_part(&mut parts, ContentPart::text("this: "));
        push_part(&mut parts, ContentPart::image("data:image/png;base64,AA"));
        push_part(&mut parts, ContentPart::text(""));
        assert_eq!(
            parts,
            vec![
                ContentPart::text("Look at this: "),
                ContentPart::image("data:image/png;base64,AA"),
            ]
        );
    }

    #[test]
    fn test_part_wire_format() {
        let value = serde_json::to_value(ContentPart::image("https://x/a.png")).expect("serialize");
        assert_eq!(value, json!({ "type": "image_url", "image_url": { "url": "https://x/a.png" } }));
    }
}

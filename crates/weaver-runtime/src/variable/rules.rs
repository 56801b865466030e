//! Alias and projection rules for reference paths.
//!
//! When a path segment is not a literal key of a node's data, the first rule
//! whose keys contain the segment supplies the value instead. Adding an alias
//! means adding a row.

use serde_json::{Map, Value};

use super::value::{is_blank, primary_content};

/// How a rule derives its value from node data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction {
    /// First non-blank field among the synonyms, else the primary content.
    Synonyms(&'static [&'static str]),
    /// URL of the first item of a media list. String items are their own URL.
    FirstMediaUrl(&'static str),
}

/// One row of the rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasRule {
    /// Path segments the rule answers to.
    pub keys: &'static [&'static str],
    /// Extraction applied to the node data.
    pub extraction: Extraction,
}

const TEXT_SYNONYMS: &[&str] = &["result", "结果", "output", "content", "text", "response"];

/// Rules in priority order.
pub const ALIAS_RULES: &[AliasRule] = &[
    AliasRule {
        keys: TEXT_SYNONYMS,
        extraction: Extraction::Synonyms(TEXT_SYNONYMS),
    },
    AliasRule {
        keys: &["imageUrl", "image_url", "图片"],
        extraction: Extraction::FirstMediaUrl("images"),
    },
    AliasRule {
        keys: &["videoUrl", "video_url", "视频"],
        extraction: Extraction::FirstMediaUrl("videos"),
    },
];

impl Extraction {
    fn apply(self, data: &Map<String, Value>) -> Option<Value> {
        match self {
            Self::Synonyms(keys) => keys
                .iter()
                .filter_map(|key| data.get(*key))
                .find(|value| !is_blank(value))
                .cloned()
                .or_else(|| primary_content(data).map(Value::String)),
            Self::FirstMediaUrl(list) => {
                let first = data.get(list)?.as_array()?.first()?;
                match first {
                    Value::String(url) => Some(Value::String(url.clone())),
                    Value::Object(item) => item.get("url").filter(|url| url.is_string()).cloned(),
                    _ => None,
                }
            }
        }
    }
}

/// Applies the first rule answering to `segment`.
pub fn apply_alias(segment: &str, data: &Map<String, Value>) -> Option<Value> {
    ALIAS_RULES
        .iter()
        .find(|rule| rule.keys.contains(&segment))
        .and_then(|rule| rule.extraction.apply(data))
}

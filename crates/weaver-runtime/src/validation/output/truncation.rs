//! Heuristics for outputs cut off mid-generation.

use super::checkers::{Balance, fences_closed};

const CONNECTIVES: &[&str] = &["and", "or", "but", "because", "the", "to", "of", "with"];
const CJK_CONNECTIVES: &[&str] = &["以及", "和", "但是", "因为", "所以", "或者", "并且"];
const TRAILING_PUNCTUATION: &[char] = &[':', ',', '：', '，'];

fn looks_like_json(content: &str) -> bool {
    content.starts_with('{') || content.starts_with('[')
}

fn ends_with_ellipsis(content: &str) -> bool {
    content.ends_with("...") || content.ends_with('…')
}

fn trailing_connective(content: &str) -> Option<&'static str> {
    if let Some(word) = CJK_CONNECTIVES
        .iter()
        .copied()
        .find(|word| content.ends_with(*word))
    {
        return Some(word);
    }

    let last = content
        .rsplit(|c: char| c.is_whitespace())
        .next()?
        .to_lowercase();
    CONNECTIVES.iter().copied().find(|word| *word == last)
}

fn dangling_list_marker(content: &str) -> bool {
    let Some(last_line) = content.lines().last().map(str::trim) else {
        return false;
    };
    if matches!(last_line, "-" | "*" | "+" | "•") {
        return true;
    }
    last_line
        .strip_suffix(['.', ')'])
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
}

/// Returns why `content` looks truncated, or `None` when it looks complete.
///
/// A trailing ellipsis is treated as intentional.
pub fn detect_truncation(content: &str) -> Option<String> {
    let content = content.trim();
    if content.is_empty() {
        return None;
    }

    if !fences_closed(content) {
        return Some("unterminated code fence".to_owned());
    }

    if looks_like_json(content) {
        if let Some(problem) = Balance::scan(content).describe() {
            return Some(format!("structured content appears cut off: {problem}"));
        }
    }

    if ends_with_ellipsis(content) {
        return None;
    }

    if let Some(mark) = content.chars().last().filter(|c| TRAILING_PUNCTUATION.contains(c)) {
        return Some(format!("content ends with a trailing '{mark}'"));
    }

    if let Some(word) = trailing_connective(content) {
        return Some(format!("content ends with the connective '{word}'"));
    }

    if dangling_list_marker(content) {
        return Some("content ends with an empty list item".to_owned());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_colon_is_truncated() {
        let reason = detect_truncation("Please review the following items: ").expect("truncated");
        assert!(reason.contains(':'));
        assert!(detect_truncation("结论如下：").is_some());
        assert!(detect_truncation("first, second,").is_some());
    }

    #[test]
    fn test_ellipsis_is_intentional() {
        assert_eq!(detect_truncation("And so it goes..."), None);
        assert_eq!(detect_truncation("To be continued…"), None);
    }

    #[test]
    fn test_connectives_and_list_markers() {
        assert!(detect_truncation("We compared latency and").is_some());
        assert!(detect_truncation("原因是速度快并且").is_some());
        assert!(detect_truncation("Steps:\n1. install\n2.").is_some());
        assert!(detect_truncation("Items\n- one\n-").is_some());
        assert_eq!(detect_truncation("Rust is a systems language."), None);
        assert_eq!(detect_truncation("Order placed for the Band"), None);
    }

    #[test]
    fn test_structure_checks() {
        assert!(detect_truncation("```python\nprint(1)").is_some());
        assert!(detect_truncation(r#"{"items": [1, 2"#).is_some());
        assert_eq!(detect_truncation(r#"{"items": [1, 2]}"#), None);
    }
}

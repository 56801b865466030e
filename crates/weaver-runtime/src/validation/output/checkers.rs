//! Structural checkers per declared output type.

use std::sync::LazyLock;

use regex::Regex;

/// Checks that content conforms to a declared output type.
pub trait OutputChecker: Send + Sync {
    /// Returns a diagnostic when the content does not conform.
    fn check(&self, content: &str) -> Result<(), String>;
}

impl<F> OutputChecker for F
where
    F: Fn(&str) -> Result<(), String> + Send + Sync,
{
    fn check(&self, content: &str) -> Result<(), String> {
        self(content)
    }
}

/// Removes a surrounding Markdown code fence, if any.
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (```json).
    match body.split_once('\n') {
        Some((_, inner)) => inner.trim(),
        None => body.trim(),
    }
}

/// Delimiter balance of JSON-like text, ignoring string contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Balance {
    /// Unclosed `{` minus stray `}`.
    pub braces: i64,
    /// Unclosed `[` minus stray `]`.
    pub brackets: i64,
    /// Whether a string literal is still open at the end.
    pub open_string: bool,
}

impl Balance {
    /// Scans `content`.
    pub fn scan(content: &str) -> Self {
        let mut balance = Self::default();
        let mut escaped = false;

        for c in content.chars() {
            if balance.open_string {
                match c {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => balance.open_string = false,
                    _ => {}
                }
                continue;
            }
            match c {
                '"' => balance.open_string = true,
                '{' => balance.braces += 1,
                '}' => balance.braces -= 1,
                '[' => balance.brackets += 1,
                ']' => balance.brackets -= 1,
                _ => {}
            }
        }

        balance
    }

    /// Returns whether every delimiter is closed.
    pub fn is_balanced(&self) -> bool {
        self.braces == 0 && self.brackets == 0 && !self.open_string
    }

    /// Describes the first imbalance found.
    pub fn describe(&self) -> Option<String> {
        if self.open_string {
            Some("unterminated string literal".to_owned())
        } else if self.braces > 0 {
            Some(format!("unbalanced braces: {} unclosed '{{'", self.braces))
        } else if self.braces < 0 {
            Some(format!("unbalanced braces: {} unexpected '}}'", -self.braces))
        } else if self.brackets > 0 {
            Some(format!("unbalanced brackets: {} unclosed '['", self.brackets))
        } else if self.brackets < 0 {
            Some(format!("unbalanced brackets: {} unexpected ']'", -self.brackets))
        } else {
            None
        }
    }
}

/// Returns whether fenced code blocks are all closed.
pub fn fences_closed(content: &str) -> bool {
    content
        .lines()
        .filter(|line| line.trim_start().starts_with("```"))
        .count()
        % 2
        == 0
}

/// JSON: must parse after fence stripping.
pub fn check_json(content: &str) -> Result<(), String> {
    let body = strip_code_fence(content);
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(_) => Ok(()),
        Err(error) => Err(Balance::scan(body)
            .describe()
            .unwrap_or_else(|| format!("invalid JSON: {error}"))),
    }
}

const BLOCK_TAGS: &[&str] = &["html", "head", "body", "div", "table", "ul", "ol", "section"];

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<[a-zA-Z][^>]*>").unwrap_or_else(|_| unreachable!("literal pattern"))
});

/// Opening and closing patterns of every block tag.
static BLOCK_TAG_PATTERNS: LazyLock<Vec<(&'static str, Regex, Regex)>> = LazyLock::new(|| {
    BLOCK_TAGS
        .iter()
        .map(|&tag| {
            let open = Regex::new(&format!(r"<{tag}[\s>]"))
                .unwrap_or_else(|_| unreachable!("tag names are plain words"));
            let close = Regex::new(&format!(r"</{tag}\s*>"))
                .unwrap_or_else(|_| unreachable!("tag names are plain words"));
            (tag, open, close)
        })
        .collect()
});

/// HTML: tags present, `<html>` closed, block tags balanced.
pub fn check_html(content: &str) -> Result<(), String> {
    let body = strip_code_fence(content);
    let lower = body.to_ascii_lowercase();

    if !HTML_TAG.is_match(body) {
        return Err("no HTML tags found".to_owned());
    }
    if lower.contains("<html") && !lower.contains("</html>") {
        return Err("missing closing </html> tag".to_owned());
    }

    for (tag, open, close) in BLOCK_TAG_PATTERNS.iter() {
        let opened = open.find_iter(&lower).count();
        let closed = close.find_iter(&lower).count();
        if opened != closed {
            return Err(format!(
                "unbalanced <{tag}> tags ({opened} opened, {closed} closed)"
            ));
        }
    }

    Ok(())
}

const CSV_DELIMITERS: &[char] = &[',', ';', '\t', '|'];

/// Share of ragged rows tolerated before a CSV is rejected.
pub const CSV_RAGGED_TOLERANCE: f64 = 0.2;

fn csv_columns(line: &str, delimiter: char) -> usize {
    let mut columns = 1;
    let mut quoted = false;
    for c in line.chars() {
        match c {
            '"' => quoted = !quoted,
            c if c == delimiter && !quoted => columns += 1,
            _ => {}
        }
    }
    columns
}

/// CSV: detected delimiter, consistent column counts.
pub fn check_csv(content: &str) -> Result<(), String> {
    let body = strip_code_fence(content);
    let mut lines = body.lines().filter(|line| !line.trim().is_empty());
    let Some(header) = lines.next() else {
        return Err("no CSV rows found".to_owned());
    };

    let Some(delimiter) = CSV_DELIMITERS
        .iter()
        .copied()
        .filter(|d| header.contains(*d))
        .max_by_key(|d| header.matches(*d).count())
    else {
        // Single column.
        return Ok(());
    };

    let expected = csv_columns(header, delimiter);
    let rows: Vec<usize> = lines.map(|line| csv_columns(line, delimiter)).collect();
    if rows.is_empty() {
        return Ok(());
    }

    let ragged = rows.iter().filter(|count| **count != expected).count();
    let share = ragged as f64 / rows.len() as f64;
    if share > CSV_RAGGED_TOLERANCE {
        return Err(format!(
            "{ragged} of {} rows do not have {expected} columns",
            rows.len()
        ));
    }

    Ok(())
}

/// Markdown: every code fence closed.
pub fn check_markdown(content: &str) -> Result<(), String> {
    if fences_closed(content) {
        Ok(())
    } else {
        Err("unterminated code fence".to_owned())
    }
}

/// Plain text: no structural requirements.
pub fn check_text(_content: &str) -> Result<(), String> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_diagnoses_unbalanced_brace() {
        let error = check_json(r#"{"a":1, "b":2"#).expect_err("invalid");
        assert!(error.contains("brace"), "{error}");
        assert!(check_json("```json\n{\"a\": [1, 2]}\n```").is_ok());
        assert!(check_json(r#"{"a": "unterminated}"#).is_err());
    }

    #[test]
    fn test_balance_ignores_strings() {
        let balance = Balance::scan(r#"{"text": "a } inside \" quote"}"#);
        assert!(balance.is_balanced());
    }

    #[test]
    fn test_html_checks() {
        assert!(check_html("<html><body><div>ok</div></body></html>").is_ok());
        assert!(check_html("plain words").is_err());
        assert!(check_html("<html><body>").is_err());
        let error = check_html("<div><div>x</div>").expect_err("unbalanced");
        assert!(error.contains("<div>"));
    }

    #[test]
    fn test_html_balances_every_block_tag() {
        assert_eq!(BLOCK_TAG_PATTERNS.len(), BLOCK_TAGS.len());
        for tag in BLOCK_TAGS.iter().filter(|tag| **tag != "html") {
            let error = check_html(&format!("<p>x</p><{tag} class=\"x\">")).expect_err("unclosed");
            assert!(error.contains(&format!("<{tag}>")), "{error}");
            assert!(check_html(&format!("<{tag}>x</{tag}>")).is_ok());
        }
    }

    #[test]
    fn test_csv_tolerates_some_ragged_rows() {
        let mostly_fine = "a,b,c\n1,2,3\n4,5,6\n7,8,9\n10,11,12\n13,14\n";
        assert!(check_csv(mostly_fine).is_ok());

        let ragged = "a,b,c\n1,2\n3,4\n5,6,7\n";
        assert!(check_csv(ragged).is_err());

        assert!(check_csv("name;\"city, state\"\nann;\"austin, tx\"").is_ok());
    }

    #[test]
    fn test_markdown_fences() {
        assert!(check_markdown("# Title\n```rust\nfn main() {}\n```\n").is_ok());
        assert!(check_markdown("```rust\nfn main() {").is_err());
    }
}

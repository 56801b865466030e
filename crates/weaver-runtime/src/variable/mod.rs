//! Variable references between nodes.
//!
//! Text fields reference earlier outputs with `{{NodeName.path}}` tokens. A
//! [`VariableResolver`] substitutes them against an [`ExecutionContext`],
//! either into flat text or into ordered multimodal [`ContentPart`]s.
//! Tokens that cannot be resolved are kept verbatim and reported.
//!
//! [`ExecutionContext`]: crate::context::ExecutionContext

mod content;
mod rules;
mod value;

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

pub use content::{ContentPart, MediaUrl, media_parts};
pub use rules::{ALIAS_RULES, AliasRule, Extraction, apply_alias};
pub use value::{PRIMARY_KEYS, format_value, is_blank, lookup_path, primary_content, split_path};

use crate::context::ExecutionContext;
use crate::definition::NodeDefinition;

/// Tracing target for variable resolution.
pub const TRACING_TARGET: &str = "weaver_runtime::variable";

/// Matches `{{ expression }}` tokens.
static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").unwrap_or_else(|_| unreachable!("literal pattern"))
});

/// A `{{...}}` token found in a text field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableRef {
    /// The token exactly as written, braces included.
    pub raw: String,
    /// The trimmed expression between the braces.
    pub expression: String,
    /// Byte range of the token in the source text.
    pub span: std::ops::Range<usize>,
}

/// Finds every variable token in `text`, in order of appearance.
pub fn parse_references(text: &str) -> Vec<VariableRef> {
    TOKEN
        .captures_iter(text)
        .filter_map(|captures| {
            let whole = captures.get(0)?;
            let inner = captures.get(1)?;
            Some(VariableRef {
                raw: whole.as_str().to_owned(),
                expression: inner.as_str().trim().to_owned(),
                span: whole.range(),
            })
        })
        .collect()
}

/// Returns whether `text` contains at least one variable token.
pub fn has_references(text: &str) -> bool {
    TOKEN.is_match(text)
}

/// Text with its references substituted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolved {
    /// Rendered text. Unresolved tokens are left in place.
    pub text: String,
    /// Raw tokens that could not be resolved, in order, without duplicates.
    pub unresolved: Vec<String>,
}

impl Resolved {
    /// Returns whether every reference resolved.
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Multimodal rendering of a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedParts {
    /// Ordered parts; adjacent text is merged.
    pub parts: Vec<ContentPart>,
    /// Raw tokens that could not be resolved.
    pub unresolved: Vec<String>,
}

/// Resolves variable references against one run's context.
#[derive(Debug, Clone, Copy)]
pub struct VariableResolver<'a> {
    context: &'a ExecutionContext,
    nodes: &'a [NodeDefinition],
}

impl<'a> VariableResolver<'a> {
    /// Creates a resolver over the workflow's nodes and the run context.
    pub fn new(context: &'a ExecutionContext, nodes: &'a [NodeDefinition]) -> Self {
        Self { context, nodes }
    }

    fn find_node(&self, name: &str) -> Option<&'a NodeDefinition> {
        self.nodes
            .iter()
            .find(|node| node.name == name)
            .or_else(|| self.nodes.iter().find(|node| node.id.as_str() == name))
    }

    fn resolve_in_node(&self, node: &NodeDefinition, path: &[String]) -> Option<Value> {
        let output = self.context.output(&node.id)?;
        if !output.status.is_success() {
            return None;
        }

        let Some((head, rest)) = path.split_first() else {
            return output.primary_text().map(Value::String);
        };

        let data = &output.data;
        if let Some(found) = data.get(head) {
            return lookup_path(found, rest).cloned();
        }

        let projected = apply_alias(head, data)?;
        lookup_path(&projected, rest).cloned()
    }

    fn resolve_in_globals(&self, name: &str, path: &[String]) -> Option<Value> {
        let value = self.context.global(name)?;
        lookup_path(value, path).cloned()
    }

    /// Resolves one expression such as `User.name` or `Writer.images.0.url`.
    ///
    /// Node names may contain dots: the longest prefix naming a node wins.
    /// When no node matches, the first segment is looked up among the global
    /// variables.
    pub fn resolve_expression(&self, expression: &str) -> Option<Value> {
        let split_points = expression
            .char_indices()
            .filter(|(_, c)| *c == '.')
            .map(|(index, _)| index)
            .rev();
        for split in std::iter::once(expression.len()).chain(split_points) {
            let (name, rest) = expression.split_at(split);
            if let Some(node) = self.find_node(name.trim()) {
                let path = split_path(rest);
                return self.resolve_in_node(node, &path);
            }
        }

        let mut segments = split_path(expression).into_iter();
        let name = segments.next()?;
        let path: Vec<String> = segments.collect();
        self.resolve_in_globals(&name, &path)
    }

    /// Resolves a parsed reference.
    pub fn resolve_ref(&self, reference: &VariableRef) -> Option<Value> {
        self.resolve_expression(&reference.expression)
    }

    /// Substitutes every token in `text`.
    pub fn resolve_text(&self, text: &str) -> Resolved {
        let mut rendered = String::with_capacity(text.len());
        let mut unresolved: Vec<String> = Vec::new();
        let mut cursor = 0;

        for reference in parse_references(text) {
            rendered.push_str(&text[cursor..reference.span.start]);
            match self.resolve_ref(&reference) {
                Some(value) => rendered.push_str(&format_value(&value)),
                None => {
                    rendered.push_str(&reference.raw);
                    if !unresolved.contains(&reference.raw) {
                        unresolved.push(reference.raw.clone());
                    }
                }
            }
            cursor = reference.span.end;
        }
        rendered.push_str(&text[cursor..]);

        if !unresolved.is_empty() {
            tracing::debug!(
                target: TRACING_TARGET,
                execution_id = %self.context.execution_id(),
                unresolved = ?unresolved,
                "Unresolved variable references"
            );
        }

        Resolved {
            text: rendered,
            unresolved,
        }
    }

    /// Returns the tokens of `text` that cannot be resolved.
    pub fn unresolved(&self, text: &str) -> Vec<String> {
        let mut unresolved: Vec<String> = Vec::new();
        for reference in parse_references(text) {
            if self.resolve_ref(&reference).is_none() && !unresolved.contains(&reference.raw) {
                unresolved.push(reference.raw);
            }
        }
        unresolved
    }

    /// Renders `text` into ordered content parts.
    ///
    /// Media-valued references become image or video parts; everything else
    /// is merged into the surrounding text.
    pub fn resolve_parts(&self, text: &str) -> ResolvedParts {
        let mut parts = Vec::new();
        let mut unresolved: Vec<String> = Vec::new();
        let mut cursor = 0;

        for reference in parse_references(text) {
            content::push_part(
                &mut parts,
                ContentPart::text(&text[cursor..reference.span.start]),
            );
            match self.resolve_ref(&reference) {
                Some(value) => match media_parts(&value) {
                    Some(media) => media
                        .into_iter()
                        .for_each(|part| content::push_part(&mut parts, part)),
                    None => content::push_part(&mut parts, ContentPart::text(format_value(&value))),
                },
                None => {
                    content::push_part(&mut parts, ContentPart::text(reference.raw.as_str()));
                    if !unresolved.contains(&reference.raw) {
                        unresolved.push(reference.raw.clone());
                    }
                }
            }
            cursor = reference.span.end;
        }
        content::push_part(&mut parts, ContentPart::text(&text[cursor..]));

        ResolvedParts { parts, unresolved }
    }
}

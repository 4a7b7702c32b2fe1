//! Reduction of fetched bodies to canonical, comparable content.
//!
//! A body that parses completely as a JSON object or array becomes
//! structured content with recursively sorted keys. Anything else becomes
//! canonical text:
//!
//! 1. a body that looks like markup (a doctype, an `html`/`head`/`body`
//!    start tag or any closing tag) is parsed with the tolerant HTML5
//!    parser; `script`, `style`, `noscript` and `template` subtrees are
//!    ignored. Anything else, and every `text/plain` body, is read as-is
//! 2. every remaining text node is split into lines, in document order
//! 3. lines are trimmed; empty lines, single-character lines and lines
//!    matching a noise pattern are dropped
//!
//! Canonical text carries no markup signature, so normalizing it again goes
//! through the plain path and yields the same text.

use regex::{Regex, RegexBuilder, RegexSet, RegexSetBuilder};
use scraper::{Html, Node};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{Canonical, NormalizeConfig};
use crate::utils::http::ContentKind;

/// Elements whose text is never visible content.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Signature of a markup document.
const MARKUP_SIGNATURE: &str = r"<!doctype\s|<(html|head|body)[\s>]|</[a-z][a-z0-9-]*\s*>";

/// Turns raw bodies into [`Canonical`] content.
#[derive(Debug, Clone)]
pub struct Normalizer {
    noise: RegexSet,
    markup: Regex,
}

impl Normalizer {
    /// Compile the configured noise patterns (case-insensitive).
    pub fn new(config: &NormalizeConfig) -> Result<Self> {
        let markup = RegexBuilder::new(MARKUP_SIGNATURE)
            .case_insensitive(true)
            .build()
            .map_err(|e| AppError::pattern(MARKUP_SIGNATURE, e))?;
        Ok(Self {
            noise: compile_set(&config.noise_patterns)?,
            markup,
        })
    }

    /// Normalize a body. Never fails; malformed input degrades to text.
    pub fn normalize(&self, body: &str, kind: ContentKind) -> Canonical {
        match parse_structured(body) {
            Some(value) => Canonical::Structured(value),
            None => Canonical::Text(self.canonical_text(body, kind)),
        }
    }

    /// Canonical text of a body, ignoring any structured interpretation.
    pub fn canonical_text(&self, body: &str, kind: ContentKind) -> String {
        let body = strip_bom(body);
        let raw_lines: Vec<String> = if self.is_markup(body, kind) {
            visible_text(body)
        } else {
            body.lines().map(str::to_string).collect()
        };

        raw_lines
            .iter()
            .flat_map(|chunk| chunk.lines())
            .map(str::trim)
            .filter(|line| line.chars().count() > 1)
            .filter(|line| !self.noise.is_match(line))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Whether a body should go through the HTML parser.
    pub fn is_markup(&self, body: &str, kind: ContentKind) -> bool {
        kind != ContentKind::PlainText && self.markup.is_match(body)
    }

    /// Number of configured noise patterns.
    pub fn pattern_count(&self) -> usize {
        self.noise.len()
    }
}

/// Compile a case-insensitive, multi-line pattern set, naming the first
/// bad pattern. `^` and `$` anchor at line boundaries.
pub(crate) fn compile_set(patterns: &[String]) -> Result<RegexSet> {
    for pattern in patterns {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .multi_line(true)
            .build()
            .map_err(|e| AppError::pattern(pattern, e))?;
    }
    RegexSetBuilder::new(patterns)
        .case_insensitive(true)
        .multi_line(true)
        .build()
        .map_err(|e| AppError::pattern(patterns.join(" | "), e))
}

fn strip_bom(body: &str) -> &str {
    body.strip_prefix('\u{feff}').unwrap_or(body)
}

/// Parse a body as a JSON object or array, with keys sorted.
fn parse_structured(body: &str) -> Option<Value> {
    let trimmed = strip_bom(body).trim();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(sort_keys(value)),
        _ => None,
    }
}

/// Largest magnitude at which every integer is exact in an `f64`.
const EXACT_F64_INT: f64 = 9_007_199_254_740_992.0;

/// Rebuild a value with every object's keys in ascending order and
/// integral floats written as integers, so `1.0` and `1` compare equal.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, sort_keys(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        Value::Number(number) => match number.as_f64() {
            Some(f) if number.is_f64() && f.fract() == 0.0 && f.abs() <= EXACT_F64_INT => {
                Value::from(f as i64)
            }
            _ => Value::Number(number),
        },
        other => other,
    }
}

/// Text nodes outside skipped subtrees, in document order.
fn visible_text(body: &str) -> Vec<String> {
    let document = Html::parse_document(body);

    document
        .tree
        .root()
        .descendants()
        .filter_map(|node| match node.value() {
            Node::Text(text) => {
                let hidden = node.ancestors().any(|ancestor| {
                    ancestor
                        .value()
                        .as_element()
                        .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
                });
                (!hidden).then(|| text.to_string())
            }
            _ => None,
        })
        .collect()
}

//! `{{TYPE,rN,key=value,...}}` placeholder tokens.
//!
//! This module owns the token grammar: locating tokens in page text,
//! splitting them into field type, recipient tag and metadata, and
//! synthesizing the recipient a tag refers to. Positions are attached by
//! the extractor.

use crate::field::{Field, FieldMeta, FieldType};
use crate::geometry::{absolute_to_percent, Rect};
use crate::PdfError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// A `{{...}}` token. Braces cannot nest, so the inner part excludes them.
pub static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([^{}]*)\}\}").expect("placeholder pattern is valid"));

static RECIPIENT_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^r(\d+)$").expect("recipient tag pattern is valid"));

/// Meta keys coerced from `"true"`/`"false"`
const BOOLEAN_KEYS: &[&str] = &["readOnly", "required"];

/// Meta keys coerced to numbers (dropped when not numeric)
const NUMERIC_KEYS: &[&str] = &["fontSize", "minValue", "maxValue"];

/// Meta keys coerced to non-negative integers (dropped otherwise)
const COUNT_KEYS: &[&str] = &["characterLimit", "validationLength"];

/// The recipient a placeholder's tag stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    /// The `N` of `rN`
    pub index: u32,
    pub email: String,
    pub name: String,
}

impl Recipient {
    /// Resolve `rN` into a deterministic synthetic recipient.
    pub fn from_tag(tag: &str, email_domain: &str) -> Result<Self, PdfError> {
        let index = RECIPIENT_TAG_RE
            .captures(tag.trim())
            .and_then(|caps| caps[1].parse::<u32>().ok())
            .ok_or_else(|| PdfError::InvalidRecipientTag {
                placeholder: String::new(),
                tag: tag.trim().to_string(),
            })?;

        Ok(Self {
            index,
            email: format!("recipient.{}@{}", index, email_domain),
            name: format!("Recipient {}", index),
        })
    }
}

/// The parsed inside of a placeholder token.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToken {
    pub field_type: FieldType,
    pub recipient_tag: String,
    pub field_meta: Option<FieldMeta>,
}

/// A placeholder found in a document, in virtual top-down page units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placeholder {
    /// The raw matched token including braces
    pub placeholder: String,
    pub recipient_tag: String,
    pub recipient: Recipient,
    pub field_type: FieldType,
    pub field_meta: Option<FieldMeta>,
    /// 1-based page number
    pub page: u32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub page_width: f32,
    pub page_height: f32,
    /// Exact extent of the token's glyphs
    pub text_bounds: Rect,
}

impl Placeholder {
    /// The percentage-based field this placeholder turns into.
    pub fn to_field(&self) -> Field {
        let percent = absolute_to_percent(
            Rect::new(self.x, self.y, self.width, self.height),
            self.page_width,
            self.page_height,
        );
        let clamp = |v: f32| v.clamp(0.0, 100.0);

        let mut field = Field::new(
            self.field_type,
            self.page,
            Rect::new(
                clamp(percent.x),
                clamp(percent.y),
                clamp(percent.width),
                clamp(percent.height),
            ),
        );
        field.field_meta = self.field_meta.clone();
        field
    }
}

/// Split a token (with or without braces) into type, tag and meta.
///
/// An unknown type fails with `InvalidPlaceholderType`, a missing or
/// malformed tag with `InvalidRecipientTag`, meta that does not fit the
/// field type with `InvalidFieldMeta`.
pub fn parse_token(token: &str) -> Result<ParsedToken, PdfError> {
    let inner = token
        .trim()
        .trim_start_matches("{{")
        .trim_end_matches("}}");
    let mut parts = inner.split(',').map(str::trim);

    let type_part = parts.next().unwrap_or_default();
    let field_type: FieldType = type_part.parse().map_err(|e| match e {
        PdfError::InvalidPlaceholderType { value, .. } => PdfError::InvalidPlaceholderType {
            placeholder: token.to_string(),
            value,
        },
        other => other,
    })?;

    let recipient_tag = parts.next().unwrap_or_default().to_string();
    if !RECIPIENT_TAG_RE.is_match(&recipient_tag) {
        return Err(PdfError::InvalidRecipientTag {
            placeholder: token.to_string(),
            tag: recipient_tag,
        });
    }

    let pairs: Vec<(&str, &str)> = parts
        .filter(|part| !part.is_empty())
        .filter_map(|part| match part.split_once('=') {
            Some((key, value)) => Some((key.trim(), value.trim())),
            None => {
                log::debug!("ignoring meta entry without '=' in {}: {:?}", token, part);
                None
            }
        })
        .collect();

    let field_meta = if field_type.is_signature() || pairs.is_empty() {
        None
    } else {
        Some(build_meta(field_type, &pairs).map_err(|reason| {
            PdfError::InvalidFieldMeta {
                field_id: token.to_string(),
                reason,
            }
        })?)
    };

    Ok(ParsedToken {
        field_type,
        recipient_tag,
        field_meta,
    })
}

/// Coerce `key=value` pairs and deserialize them as the field type's meta.
fn build_meta(field_type: FieldType, pairs: &[(&str, &str)]) -> Result<FieldMeta, String> {
    let mut map = Map::new();
    map.insert("type".into(), Value::String(field_type.meta_tag().into()));

    for &(key, value) in pairs {
        if let Some(canonical) = find_key(BOOLEAN_KEYS, key) {
            if value.eq_ignore_ascii_case("true") {
                map.insert(canonical.into(), Value::Bool(true));
            } else if value.eq_ignore_ascii_case("false") {
                map.insert(canonical.into(), Value::Bool(false));
            } else {
                log::debug!("dropping non-boolean {}={:?}", canonical, value);
            }
        } else if let Some(canonical) = find_key(COUNT_KEYS, key) {
            match value.parse::<u32>() {
                Ok(count) => {
                    map.insert(canonical.into(), Value::Number(count.into()));
                }
                Err(_) => log::debug!("dropping non-count {}={:?}", canonical, value),
            }
        } else if let Some(canonical) = find_key(NUMERIC_KEYS, key) {
            match parse_number(value) {
                Some(number) => {
                    map.insert(canonical.into(), Value::Number(number));
                }
                None => log::debug!("dropping non-numeric {}={:?}", canonical, value),
            }
        } else {
            map.insert(key.into(), Value::String(value.into()));
        }
    }

    serde_json::from_value(Value::Object(map)).map_err(|e| e.to_string())
}

fn find_key(keys: &[&'static str], key: &str) -> Option<&'static str> {
    keys.iter().copied().find(|k| k.eq_ignore_ascii_case(key))
}

fn parse_number(value: &str) -> Option<Number> {
    if let Ok(int) = value.parse::<i64>() {
        return Some(Number::from(int));
    }
    value
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
}

//! Field records and their type-specific metadata.
//!
//! Positions and sizes are percentages of the virtual page. Metadata is a
//! tagged union keyed by `type`, matching the JSON field records exchanged
//! with the persistence layer.

use crate::geometry::Rect;
use crate::PdfError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    Signature,
    FreeSignature,
    Initials,
    Name,
    Email,
    Date,
    Text,
    Number,
    Radio,
    Checkbox,
    Dropdown,
}

impl FieldType {
    pub const ALL: [FieldType; 11] = [
        FieldType::Signature,
        FieldType::FreeSignature,
        FieldType::Initials,
        FieldType::Name,
        FieldType::Email,
        FieldType::Date,
        FieldType::Text,
        FieldType::Number,
        FieldType::Radio,
        FieldType::Checkbox,
        FieldType::Dropdown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Signature => "SIGNATURE",
            FieldType::FreeSignature => "FREE_SIGNATURE",
            FieldType::Initials => "INITIALS",
            FieldType::Name => "NAME",
            FieldType::Email => "EMAIL",
            FieldType::Date => "DATE",
            FieldType::Text => "TEXT",
            FieldType::Number => "NUMBER",
            FieldType::Radio => "RADIO",
            FieldType::Checkbox => "CHECKBOX",
            FieldType::Dropdown => "DROPDOWN",
        }
    }

    pub fn is_signature(&self) -> bool {
        matches!(self, FieldType::Signature | FieldType::FreeSignature)
    }

    /// Tag of the matching [`FieldMeta`] variant. Signatures share one.
    pub fn meta_tag(&self) -> &'static str {
        match self {
            FieldType::Signature | FieldType::FreeSignature => "signature",
            FieldType::Initials => "initials",
            FieldType::Name => "name",
            FieldType::Email => "email",
            FieldType::Date => "date",
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Radio => "radio",
            FieldType::Checkbox => "checkbox",
            FieldType::Dropdown => "dropdown",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = PdfError;

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        FieldType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| PdfError::InvalidPlaceholderType {
                placeholder: String::new(),
                value: s.trim().to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

/// Layout axis of checkbox and radio options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Vertical,
    Horizontal,
}

/// Settings shared by every meta variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BaseFieldMeta {
    pub label: Option<String>,
    pub placeholder: Option<String>,
    pub required: bool,
    pub read_only: bool,
    pub font_size: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextLikeMeta {
    #[serde(flatten)]
    pub base: BaseFieldMeta,
    pub text_align: TextAlign,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextMeta {
    #[serde(flatten)]
    pub base: BaseFieldMeta,
    /// Authored value, shown when the field is read-only
    pub text: Option<String>,
    pub character_limit: Option<u32>,
    pub text_align: TextAlign,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NumberMeta {
    #[serde(flatten)]
    pub base: BaseFieldMeta,
    pub number_format: Option<String>,
    pub value: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub text_align: TextAlign,
}

/// One selectable option of a radio, checkbox or dropdown field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldOption {
    pub id: Option<u32>,
    pub value: String,
    pub checked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RadioMeta {
    #[serde(flatten)]
    pub base: BaseFieldMeta,
    pub values: Vec<FieldOption>,
    pub direction: Direction,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckboxMeta {
    #[serde(flatten)]
    pub base: BaseFieldMeta,
    pub values: Vec<FieldOption>,
    pub validation_rule: Option<String>,
    pub validation_length: Option<u32>,
    pub direction: Direction,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DropdownMeta {
    #[serde(flatten)]
    pub base: BaseFieldMeta,
    pub values: Vec<FieldOption>,
    pub default_value: Option<String>,
}

/// Type-specific field configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldMeta {
    Signature(BaseFieldMeta),
    Initials(TextLikeMeta),
    Name(TextLikeMeta),
    Email(TextLikeMeta),
    Date(TextLikeMeta),
    Text(TextMeta),
    Number(NumberMeta),
    Radio(RadioMeta),
    Checkbox(CheckboxMeta),
    Dropdown(DropdownMeta),
}

impl FieldMeta {
    pub fn tag(&self) -> &'static str {
        match self {
            FieldMeta::Signature(_) => "signature",
            FieldMeta::Initials(_) => "initials",
            FieldMeta::Name(_) => "name",
            FieldMeta::Email(_) => "email",
            FieldMeta::Date(_) => "date",
            FieldMeta::Text(_) => "text",
            FieldMeta::Number(_) => "number",
            FieldMeta::Radio(_) => "radio",
            FieldMeta::Checkbox(_) => "checkbox",
            FieldMeta::Dropdown(_) => "dropdown",
        }
    }

    pub fn base(&self) -> &BaseFieldMeta {
        match self {
            FieldMeta::Signature(base) => base,
            FieldMeta::Initials(m)
            | FieldMeta::Name(m)
            | FieldMeta::Email(m)
            | FieldMeta::Date(m) => &m.base,
            FieldMeta::Text(m) => &m.base,
            FieldMeta::Number(m) => &m.base,
            FieldMeta::Radio(m) => &m.base,
            FieldMeta::Checkbox(m) => &m.base,
            FieldMeta::Dropdown(m) => &m.base,
        }
    }

    pub fn read_only(&self) -> bool {
        self.base().read_only
    }

    pub fn font_size(&self) -> Option<f32> {
        self.base().font_size.filter(|size| *size > 0.0)
    }

    pub fn text_align(&self) -> TextAlign {
        match self {
            FieldMeta::Initials(m)
            | FieldMeta::Name(m)
            | FieldMeta::Email(m)
            | FieldMeta::Date(m) => m.text_align,
            FieldMeta::Text(m) => m.text_align,
            FieldMeta::Number(m) => m.text_align,
            _ => TextAlign::Left,
        }
    }

    /// Whether this meta variant belongs to fields of `field_type`.
    pub fn matches(&self, field_type: FieldType) -> bool {
        self.tag() == field_type.meta_tag()
    }
}

/// The captured value of a signature field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignatureValue {
    /// PNG or JPEG, raw base64 or a `data:` URL
    pub signature_image_as_base64: Option<String>,
    pub typed_signature: Option<String>,
}

impl SignatureValue {
    pub fn image(&self) -> Option<&str> {
        self.signature_image_as_base64
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }

    pub fn typed(&self) -> Option<&str> {
        self.typed_signature
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }
}

/// A field placed on a document page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// 1-based page number
    pub page: u32,
    pub position_x: f32,
    pub position_y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub custom_text: String,
    /// Set once the recipient has filled the field
    #[serde(default)]
    pub inserted: bool,
    #[serde(default)]
    pub field_meta: Option<FieldMeta>,
    #[serde(default)]
    pub signature: Option<SignatureValue>,
}

impl Field {
    pub fn new(field_type: FieldType, page: u32, percent: Rect) -> Self {
        Self {
            id: String::new(),
            field_type,
            page,
            position_x: percent.x,
            position_y: percent.y,
            width: percent.width,
            height: percent.height,
            custom_text: String::new(),
            inserted: false,
            field_meta: None,
            signature: None,
        }
    }

    /// Position and size as a percentage box.
    pub fn percent_rect(&self) -> Rect {
        Rect::new(self.position_x, self.position_y, self.width, self.height)
    }

    pub fn read_only(&self) -> bool {
        self.field_meta.as_ref().is_some_and(FieldMeta::read_only)
    }

    /// Check geometry bounds and that the meta variant fits the field type.
    pub fn validate(&self) -> Result<(), PdfError> {
        let invalid = |reason: String| PdfError::InvalidFieldMeta {
            field_id: self.id.clone(),
            reason,
        };

        if self.page == 0 {
            return Err(invalid("page numbers start at 1".into()));
        }

        let percent = self.percent_rect();
        for (name, value) in [
            ("positionX", percent.x),
            ("positionY", percent.y),
            ("width", percent.width),
            ("height", percent.height),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(invalid(format!("{} {} is outside 0..=100", name, value)));
            }
        }

        if let Some(meta) = &self.field_meta {
            if !meta.matches(self.field_type) {
                return Err(invalid(format!(
                    "{} meta on a {} field",
                    meta.tag(),
                    self.field_type
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_parsing() {
        assert_eq!(" text ".parse::<FieldType>().unwrap(), FieldType::Text);
        assert_eq!(
            "free_signature".parse::<FieldType>().unwrap(),
            FieldType::FreeSignature
        );
        let err = "STAMP".parse::<FieldType>().unwrap_err();
        assert!(matches!(err, PdfError::InvalidPlaceholderType { value, .. } if value == "STAMP"));
    }

    #[test]
    fn test_field_json_round_trip_shape() {
        let json = r#"{
            "id": "f1",
            "type": "CHECKBOX",
            "page": 2,
            "positionX": 10,
            "positionY": 20.5,
            "width": 30,
            "height": 10,
            "customText": "0,2",
            "inserted": true,
            "fieldMeta": {
                "type": "checkbox",
                "readOnly": false,
                "direction": "horizontal",
                "values": [
                    {"id": 1, "value": "A", "checked": true},
                    {"id": 2, "value": "B"},
                    {"id": 3, "value": "C"}
                ]
            }
        }"#;

        let field: Field = serde_json::from_str(json).unwrap();
        assert_eq!(field.field_type, FieldType::Checkbox);
        assert_eq!(field.page, 2);
        match field.field_meta.as_ref().unwrap() {
            FieldMeta::Checkbox(meta) => {
                assert_eq!(meta.values.len(), 3);
                assert!(meta.values[0].checked);
                assert!(!meta.values[1].checked);
                assert_eq!(meta.direction, Direction::Horizontal);
            }
            other => panic!("unexpected meta {:?}", other),
        }
        assert!(field.validate().is_ok());
    }

    #[test]
    fn test_text_meta_defaults() {
        let meta: FieldMeta =
            serde_json::from_str(r#"{"type": "text", "fontSize": 14, "required": true}"#).unwrap();
        assert_eq!(meta.font_size(), Some(14.0));
        assert_eq!(meta.text_align(), TextAlign::Left);
        assert!(meta.base().required);
        assert!(!meta.read_only());
    }

    #[test]
    fn test_validate_rejects_out_of_range_geometry() {
        let mut field = Field::new(FieldType::Text, 1, Rect::new(10.0, 10.0, 120.0, 5.0));
        assert!(matches!(
            field.validate(),
            Err(PdfError::InvalidFieldMeta { .. })
        ));
        field.width = 20.0;
        field.page = 0;
        assert!(field.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_mismatched_meta() {
        let mut field = Field::new(FieldType::Radio, 1, Rect::new(10.0, 10.0, 20.0, 5.0));
        field.field_meta = Some(FieldMeta::Text(TextMeta::default()));
        assert!(field.validate().is_err());

        let mut sig = Field::new(FieldType::FreeSignature, 1, Rect::new(0.0, 0.0, 10.0, 5.0));
        sig.field_meta = Some(FieldMeta::Signature(BaseFieldMeta::default()));
        assert!(sig.validate().is_ok());
    }

    #[test]
    fn test_signature_value_ignores_blank_entries() {
        let value = SignatureValue {
            signature_image_as_base64: Some("  ".into()),
            typed_signature: Some("Jane".into()),
        };
        assert_eq!(value.image(), None);
        assert_eq!(value.typed(), Some("Jane"));
    }
}

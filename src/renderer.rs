//! Field rendering
//!
//! Turns a field and its value into a [`RenderInstruction`]: the absolute
//! field box, the chosen font size, wrapped lines and a list of primitives
//! already positioned in the page's native space. Nothing here touches the
//! document, so instructions for different fields can be computed in
//! parallel; [`crate::writer`] commits them to the page afterwards.
//!
//! Layout happens in virtual top-down page units. Each primitive is
//! Y-inverted once and then passed through the rotation adjustment when it
//! is placed on the canvas.

use crate::field::{Direction, Field, FieldMeta, FieldOption, FieldType, SignatureValue, TextAlign};
use crate::font::{FontData, FontMetrics, FontResources, FontRole};
use crate::geometry::{invert_y, percent_to_absolute, PageGeometry, Rect, Rotation};
use crate::layout::{fit_font_size, is_multiline, line_height, wrap_text};
use crate::PdfError;
use base64::Engine;
use std::sync::Arc;

/// RGB color with components in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const DEBUG_FIELD: Color = Color::rgb(1.0, 0.0, 0.0);
    pub const DEBUG_DRAW_BOX: Color = Color::rgb(0.0, 0.0, 1.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }
}

/// Configuration for field rendering
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Outline the field box and the effective drawing box
    pub debug: bool,
    /// Font size used when the field meta sets none
    pub default_font_size: f32,
    /// Text is never shrunk below this size
    pub min_font_size: f32,
    /// Upper bound for typed signatures
    pub signature_font_size: f32,
    pub min_signature_font_size: f32,
    /// Distance kept from the page edge when a box is extended
    pub page_padding: f32,
    /// Inner padding of a field box
    pub field_padding: f32,
    /// Edge length of checkbox and radio controls
    pub checkbox_size: f32,
    /// Space between an option's control and its label
    pub option_gap: f32,
    pub text_color: Color,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            debug: false,
            default_font_size: 12.0,
            min_font_size: 8.0,
            signature_font_size: 50.0,
            min_signature_font_size: 20.0,
            page_padding: 10.0,
            field_padding: 2.0,
            checkbox_size: 10.0,
            option_gap: 4.0,
            text_color: Color::BLACK,
        }
    }
}

/// A decoded raster image, split into color and alpha planes.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    /// 8-bit RGB samples
    pub rgb: Vec<u8>,
    /// 8-bit alpha samples, `None` when fully opaque
    pub alpha: Option<Vec<u8>>,
}

impl DecodedImage {
    /// Decode raw base64 or a `data:image/...;base64,` URL.
    pub fn from_base64(source: &str) -> Result<Self, PdfError> {
        let source = source.trim();
        let payload = match source.strip_prefix("data:") {
            Some(rest) => rest
                .split_once(',')
                .map(|(_, data)| data)
                .ok_or_else(|| PdfError::Image("malformed data URL".into()))?,
            None => source,
        };
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| PdfError::Image(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Decode PNG or JPEG bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, PdfError> {
        let decoded = image::load_from_memory(data).map_err(|e| PdfError::Image(e.to_string()))?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Err(PdfError::Image("image has no pixels".into()));
        }

        let pixels = width as usize * height as usize;
        let mut rgb = Vec::with_capacity(pixels * 3);
        let mut alpha = Vec::with_capacity(pixels);
        for px in rgba.as_raw().chunks_exact(4) {
            rgb.extend_from_slice(&px[..3]);
            alpha.push(px[3]);
        }
        let opaque = alpha.iter().all(|&a| a == u8::MAX);

        Ok(Self {
            width,
            height,
            rgb,
            alpha: if opaque { None } else { Some(alpha) },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stroke {
    pub color: Color,
    pub width: f32,
}

/// A drawing primitive in local coordinates: the origin is the primitive's
/// lower-left corner (baseline start for text, center for circles), with
/// the page rotation compensated around it.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Text {
        font: FontRole,
        size: f32,
        text: String,
        color: Color,
    },
    Rectangle {
        width: f32,
        height: f32,
        fill: Option<Color>,
        stroke: Option<Stroke>,
    },
    Circle {
        radius: f32,
        fill: Option<Color>,
        stroke: Option<Stroke>,
    },
    CheckMark {
        size: f32,
        color: Color,
    },
    Image {
        width: f32,
        height: f32,
        image: Arc<DecodedImage>,
    },
}

/// A primitive and its origin in native page space.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawOp {
    pub x: f32,
    pub y: f32,
    pub primitive: Primitive,
}

/// Everything needed to draw one field.
#[derive(Debug, Clone)]
pub struct RenderInstruction {
    pub field_id: String,
    /// 1-based page number
    pub page: u32,
    pub rotation: Rotation,
    /// Field box in absolute virtual top-down units
    pub bounds: Rect,
    /// Box the content may occupy after overflow extension
    pub draw_box: Rect,
    pub font_size: Option<f32>,
    pub lines: Vec<String>,
    pub ops: Vec<DrawOp>,
}

/// Whether a field has something to draw: a filled-in value, or the
/// authored state of a read-only field. Signatures always need a value.
pub fn should_render(field: &Field) -> bool {
    field.inserted || (field.read_only() && !field.field_type.is_signature())
}

/// Compute the drawing instruction for a single field.
pub fn compute_instruction(
    field: &Field,
    page: &PageGeometry,
    fonts: &FontResources,
    config: &RenderConfig,
) -> Result<RenderInstruction, PdfError> {
    field.validate()?;

    let bounds = percent_to_absolute(field.percent_rect(), page.width, page.height);
    let mut renderer = FieldRenderer {
        field,
        fonts,
        config,
        canvas: Canvas {
            page,
            ops: Vec::new(),
        },
    };

    let outcome = match field.field_type {
        FieldType::Signature | FieldType::FreeSignature => renderer.signature(bounds)?,
        FieldType::Checkbox => renderer.checkbox(bounds)?,
        FieldType::Radio => renderer.radio(bounds)?,
        _ => {
            let value = text_value(field);
            renderer.text(&value, bounds)
        }
    };

    if config.debug {
        let outline = |color| {
            Some(Stroke {
                color,
                width: 0.5,
            })
        };
        renderer.canvas.rect(bounds, None, outline(Color::DEBUG_FIELD));
        renderer
            .canvas
            .rect(outcome.draw_box, None, outline(Color::DEBUG_DRAW_BOX));
    }

    log::debug!(
        "field {} ({}) on page {}: {} ops",
        field.id,
        field.field_type,
        field.page,
        renderer.canvas.ops.len()
    );

    Ok(RenderInstruction {
        field_id: field.id.clone(),
        page: field.page,
        rotation: page.rotation,
        bounds,
        draw_box: outcome.draw_box,
        font_size: outcome.font_size,
        lines: outcome.lines,
        ops: renderer.canvas.ops,
    })
}

/// The value a text-like field displays, falling back to the authored
/// value of read-only fields.
pub fn text_value(field: &Field) -> String {
    if !field.custom_text.is_empty() || !field.read_only() {
        return field.custom_text.clone();
    }
    let authored = match &field.field_meta {
        Some(FieldMeta::Text(meta)) => meta.text.clone(),
        Some(FieldMeta::Number(meta)) => meta.value.clone(),
        Some(FieldMeta::Dropdown(meta)) => meta.default_value.clone(),
        _ => None,
    };
    authored.unwrap_or_default()
}

/// Bleed added around masked areas so glyph edges do not show through
const MASK_BLEED: f32 = 1.0;

/// White boxes covering `areas` (virtual top-down units) on one page.
pub fn mask_instruction(page: &PageGeometry, page_num: u32, areas: &[Rect]) -> RenderInstruction {
    let mut canvas = Canvas {
        page,
        ops: Vec::new(),
    };
    let mut bounds: Option<Rect> = None;
    for area in areas {
        let area = area.inset(-MASK_BLEED);
        canvas.rect(area, Some(Color::WHITE), None);
        bounds = Some(match bounds {
            None => area,
            Some(b) => {
                let x = b.x.min(area.x);
                let y = b.y.min(area.y);
                Rect::new(x, y, b.right().max(area.right()) - x, b.bottom().max(area.bottom()) - y)
            }
        });
    }
    let bounds = bounds.unwrap_or_default();

    RenderInstruction {
        field_id: format!("placeholders-page-{}", page_num),
        page: page_num,
        rotation: page.rotation,
        bounds,
        draw_box: bounds,
        font_size: None,
        lines: Vec::new(),
        ops: canvas.ops,
    }
}

/// Box of one checkbox/radio option.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionSlot {
    /// The option's share of the field interior
    pub item: Rect,
    pub control: Rect,
    pub label: Rect,
}

/// Split `inner` evenly along the layout axis, one slot per option.
pub fn layout_options(
    inner: Rect,
    count: usize,
    direction: Direction,
    control_size: f32,
    gap: f32,
) -> Vec<OptionSlot> {
    let n = count as f32;
    (0..count)
        .map(|i| {
            let i = i as f32;
            let item = match direction {
                Direction::Vertical => Rect::new(
                    inner.x,
                    inner.y + inner.height * i / n,
                    inner.width,
                    inner.height / n,
                ),
                Direction::Horizontal => Rect::new(
                    inner.x + inner.width * i / n,
                    inner.y,
                    inner.width / n,
                    inner.height,
                ),
            };

            let side = control_size.min(item.width).min(item.height).max(0.0);
            let control = Rect::new(item.x, item.y + (item.height - side) / 2.0, side, side);
            let gap = gap.min(item.width - side).max(0.0);
            let label_x = control.right() + gap;
            let label = Rect::new(label_x, item.y, (item.right() - label_x).max(0.0), item.height);

            OptionSlot {
                item,
                control,
                label,
            }
        })
        .collect()
}

/// Checked state per checkbox option. `customText` lists 0-based indices
/// or option values, comma separated.
pub fn checked_options(field: &Field, values: &[FieldOption]) -> Vec<bool> {
    if field.read_only() {
        return values.iter().map(|option| option.checked).collect();
    }

    let picks: Vec<&str> = field
        .custom_text
        .split(',')
        .map(str::trim)
        .filter(|pick| !pick.is_empty())
        .collect();

    values
        .iter()
        .enumerate()
        .map(|(index, option)| {
            picks.iter().any(|pick| match pick.parse::<usize>() {
                Ok(n) => n == index,
                Err(_) => *pick == option.value,
            })
        })
        .collect()
}

/// Index of the selected radio option, if any.
pub fn selected_radio(field: &Field, values: &[FieldOption]) -> Option<usize> {
    if field.read_only() {
        return values.iter().position(|option| option.checked);
    }
    let value = field.custom_text.trim();
    if value.is_empty() {
        return None;
    }
    values.iter().position(|option| option.value == value)
}

/// Draw box, font size and lines chosen for a field.
struct Outcome {
    draw_box: Rect,
    font_size: Option<f32>,
    lines: Vec<String>,
}

/// Collects positioned primitives for one page.
struct Canvas<'a> {
    page: &'a PageGeometry,
    ops: Vec<DrawOp>,
}

impl Canvas<'_> {
    /// Place a primitive spanning `height` units below `top` (virtual
    /// top-down); its local origin lands on the bottom-left corner.
    fn place(&mut self, x: f32, top: f32, height: f32, primitive: Primitive) {
        let y = invert_y(top, self.page.height, height);
        let (x, y) = self.page.virtual_to_native(x, y);
        self.ops.push(DrawOp { x, y, primitive });
    }

    fn rect(&mut self, area: Rect, fill: Option<Color>, stroke: Option<Stroke>) {
        self.place(
            area.x,
            area.y,
            area.height,
            Primitive::Rectangle {
                width: area.width,
                height: area.height,
                fill,
                stroke,
            },
        );
    }

    fn circle(
        &mut self,
        cx: f32,
        cy: f32,
        radius: f32,
        fill: Option<Color>,
        stroke: Option<Stroke>,
    ) {
        self.place(
            cx,
            cy,
            0.0,
            Primitive::Circle {
                radius,
                fill,
                stroke,
            },
        );
    }

    fn text(&mut self, x: f32, baseline: f32, font: FontRole, size: f32, text: &str, color: Color) {
        self.place(
            x,
            baseline,
            0.0,
            Primitive::Text {
                font,
                size,
                text: text.to_string(),
                color,
            },
        );
    }
}

struct FieldRenderer<'a> {
    field: &'a Field,
    fonts: &'a FontResources,
    config: &'a RenderConfig,
    canvas: Canvas<'a>,
}

impl FieldRenderer<'_> {
    fn meta_font_size(&self) -> Option<f32> {
        self.field.field_meta.as_ref().and_then(FieldMeta::font_size)
    }

    fn invalid_meta(&self, reason: &str) -> PdfError {
        PdfError::InvalidFieldMeta {
            field_id: self.field.id.clone(),
            reason: reason.to_string(),
        }
    }

    /// Baseline that centers one line of text vertically in `area`.
    fn centered_baseline(font: &FontData, size: f32, area: Rect) -> f32 {
        let ascent = font.ascent_at_size(size);
        let height = font.height_at_size(size);
        area.y + (area.height - height) / 2.0 + ascent
    }

    fn text(&mut self, value: &str, bounds: Rect) -> Outcome {
        let config = self.config;
        let font = self.fonts.get(FontRole::Text);
        let max_size = self.meta_font_size().unwrap_or(config.default_font_size);
        let min_size = config.min_font_size.min(max_size);
        let align = self
            .field
            .field_meta
            .as_ref()
            .map(FieldMeta::text_align)
            .unwrap_or_default();
        let inner = bounds.inset(config.field_padding);

        if value.is_empty() {
            return Outcome {
                draw_box: bounds,
                font_size: None,
                lines: Vec::new(),
            };
        }

        let size = fit_font_size(value, inner.width, inner.height, min_size, max_size, font);
        let page = self.canvas.page;
        let color = config.text_color;

        let x_for = |width: f32, area: Rect| match align {
            TextAlign::Left => area.x,
            TextAlign::Right => area.right() - width,
            TextAlign::Center => area.x + (area.width - width) / 2.0,
        };

        if is_multiline(self.field.field_type, value, inner.width, font, size) {
            // Grow downwards to the bottom page margin
            let bottom = (page.height - config.page_padding).max(bounds.bottom());
            let draw_box = Rect::new(bounds.x, bounds.y, bounds.width, bottom - bounds.y);

            let lines = wrap_text(value, inner.width, font, size);
            let first_baseline = inner.y + font.ascent_at_size(size);
            for (i, line) in lines.iter().enumerate() {
                if line.is_empty() {
                    continue;
                }
                let width = font.width_of_text_at_size(line, size);
                let baseline = first_baseline + i as f32 * line_height(size);
                self.canvas
                    .text(x_for(width, inner), baseline, FontRole::Text, size, line, color);
            }

            return Outcome {
                draw_box,
                font_size: Some(size),
                lines,
            };
        }

        // Grow sideways, away from the alignment origin
        let (left, right) = match align {
            TextAlign::Left => (bounds.x, bounds.right().max(page.width - config.page_padding)),
            TextAlign::Right => (bounds.x.min(config.page_padding), bounds.right()),
            TextAlign::Center => {
                let center = bounds.x + bounds.width / 2.0;
                let nearest_edge = (center - config.page_padding)
                    .min(page.width - config.page_padding - center);
                let half = nearest_edge.max(bounds.width / 2.0);
                (center - half, center + half)
            }
        };
        let draw_box = Rect::new(left, bounds.y, right - left, bounds.height);

        let width = font.width_of_text_at_size(value, size);
        let baseline = Self::centered_baseline(font, size, bounds);
        self.canvas
            .text(x_for(width, inner), baseline, FontRole::Text, size, value, color);

        Outcome {
            draw_box,
            font_size: Some(size),
            lines: vec![value.to_string()],
        }
    }

    fn checkbox(&mut self, bounds: Rect) -> Result<Outcome, PdfError> {
        let field = self.field;
        let Some(FieldMeta::Checkbox(meta)) = &field.field_meta else {
            return Err(self.invalid_meta("checkbox field without options"));
        };
        if meta.values.is_empty() {
            return Err(self.invalid_meta("checkbox field without options"));
        }

        let checked = checked_options(field, &meta.values);
        let slots = self.option_slots(bounds, meta.values.len(), meta.direction);
        let stroke = Some(Stroke {
            color: self.config.text_color,
            width: 1.0,
        });

        for ((slot, option), checked) in slots.iter().zip(&meta.values).zip(checked) {
            self.canvas.rect(slot.control, None, stroke);
            if checked {
                let mark = slot.control.inset(slot.control.width * 0.15);
                self.canvas.place(
                    mark.x,
                    mark.y,
                    mark.height,
                    Primitive::CheckMark {
                        size: mark.width,
                        color: self.config.text_color,
                    },
                );
            }
            self.option_label(&option.value, slot.label);
        }

        Ok(self.options_outcome(bounds))
    }

    fn radio(&mut self, bounds: Rect) -> Result<Outcome, PdfError> {
        let field = self.field;
        let Some(FieldMeta::Radio(meta)) = &field.field_meta else {
            return Err(self.invalid_meta("radio field without options"));
        };
        if meta.values.is_empty() {
            return Err(self.invalid_meta("radio field without options"));
        }

        let selected = selected_radio(field, &meta.values);
        let slots = self.option_slots(bounds, meta.values.len(), meta.direction);
        let color = self.config.text_color;

        for (i, (slot, option)) in slots.iter().zip(&meta.values).enumerate() {
            let radius = slot.control.width / 2.0;
            let cx = slot.control.x + radius;
            let cy = slot.control.y + radius;
            self.canvas
                .circle(cx, cy, radius, None, Some(Stroke { color, width: 1.0 }));
            if selected == Some(i) {
                self.canvas.circle(cx, cy, radius * 0.5, Some(color), None);
            }
            self.option_label(&option.value, slot.label);
        }

        Ok(self.options_outcome(bounds))
    }

    fn option_slots(&self, bounds: Rect, count: usize, direction: Direction) -> Vec<OptionSlot> {
        layout_options(
            bounds.inset(self.config.field_padding),
            count,
            direction,
            self.config.checkbox_size,
            self.config.option_gap,
        )
    }

    fn option_label(&mut self, label: &str, area: Rect) {
        if label.is_empty() || area.width <= 0.0 {
            return;
        }
        let font = self.fonts.get(FontRole::Text);
        let max_size = self.meta_font_size().unwrap_or(self.config.default_font_size);
        let min_size = self.config.min_font_size.min(max_size);
        let size = fit_font_size(label, area.width, area.height, min_size, max_size, font);
        let baseline = Self::centered_baseline(font, size, area);
        self.canvas.text(
            area.x,
            baseline,
            FontRole::Text,
            size,
            label,
            self.config.text_color,
        );
    }

    fn options_outcome(&self, bounds: Rect) -> Outcome {
        Outcome {
            draw_box: bounds,
            font_size: None,
            lines: Vec::new(),
        }
    }

    fn signature(&mut self, bounds: Rect) -> Result<Outcome, PdfError> {
        let value = self.field.signature.as_ref();

        if let Some(source) = value.and_then(SignatureValue::image) {
            let image = DecodedImage::from_base64(source).map_err(|e| {
                PdfError::Image(format!("signature of field {}: {}", self.field.id, e))
            })?;
            let (iw, ih) = (image.width as f32, image.height as f32);
            let scale = (bounds.width / iw).min(bounds.height / ih).min(1.0);
            let (width, height) = (iw * scale, ih * scale);
            let area = Rect::new(
                bounds.x + (bounds.width - width) / 2.0,
                bounds.y + (bounds.height - height) / 2.0,
                width,
                height,
            );
            self.canvas.place(
                area.x,
                area.y,
                area.height,
                Primitive::Image {
                    width,
                    height,
                    image: Arc::new(image),
                },
            );
            return Ok(Outcome {
                draw_box: area,
                font_size: None,
                lines: Vec::new(),
            });
        }

        let Some(typed) = value.and_then(SignatureValue::typed) else {
            return Err(PdfError::MissingSignatureValue {
                field_id: self.field.id.clone(),
            });
        };

        let config = self.config;
        let font = self.fonts.get(FontRole::Signature);
        let max_size = self.meta_font_size().unwrap_or(config.signature_font_size);
        let min_size = config.min_signature_font_size.min(max_size);
        let inner = bounds.inset(config.field_padding);
        let size = fit_font_size(typed, inner.width, inner.height, min_size, max_size, font);

        let width = font.width_of_text_at_size(typed, size);
        let x = bounds.x + (bounds.width - width) / 2.0;
        let baseline = Self::centered_baseline(font, size, bounds);
        self.canvas
            .text(x, baseline, FontRole::Signature, size, typed, config.text_color);

        Ok(Outcome {
            draw_box: bounds,
            font_size: Some(size),
            lines: vec![typed.to_string()],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{CheckboxMeta, DropdownMeta, RadioMeta, TextLikeMeta, TextMeta};
    use crate::font::StandardFont;

    fn page() -> PageGeometry {
        PageGeometry::new([0.0, 0.0, 600.0, 800.0], Rotation::Deg0)
    }

    fn text_field(value: &str, percent: Rect) -> Field {
        let mut field = Field::new(FieldType::Text, 1, percent);
        field.id = "f1".into();
        field.custom_text = value.into();
        field.inserted = true;
        field
    }

    fn render(field: &Field, page: &PageGeometry) -> Result<RenderInstruction, PdfError> {
        compute_instruction(field, page, &FontResources::default(), &RenderConfig::default())
    }

    fn options(values: &[&str]) -> Vec<FieldOption> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| FieldOption {
                id: Some(i as u32),
                value: v.to_string(),
                checked: false,
            })
            .collect()
    }

    fn texts(instruction: &RenderInstruction) -> Vec<(f32, f32, String, f32)> {
        instruction
            .ops
            .iter()
            .filter_map(|op| match &op.primitive {
                Primitive::Text { text, size, .. } => Some((op.x, op.y, text.clone(), *size)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_short_text_left_aligned() {
        let field = text_field("Hello", Rect::new(10.0, 10.0, 20.0, 5.0));
        let fonts = FontResources::default();
        let config = RenderConfig::default();
        let instruction = compute_instruction(&field, &page(), &fonts, &config).unwrap();

        assert_eq!(instruction.bounds, Rect::new(60.0, 80.0, 120.0, 40.0));
        assert_eq!(instruction.font_size, Some(12.0));
        assert_eq!(instruction.lines, vec!["Hello"]);

        let drawn = texts(&instruction);
        assert_eq!(drawn.len(), 1);
        // Padding from the left edge, baseline inside the box (bottom-up)
        assert!((drawn[0].0 - 62.0).abs() < 1e-3);
        assert!(drawn[0].1 > 800.0 - 120.0 && drawn[0].1 < 800.0 - 80.0);
    }

    #[test]
    fn test_overflow_shrinks_then_extends_right() {
        let font = StandardFont::Helvetica;
        let value = "a fairly long line of text";
        let at_min = font.width_of_text_at_size(value, 8.0);
        let at_max = font.width_of_text_at_size(value, 12.0);
        assert!(at_min < 116.0 && at_max > 116.0);

        let field = text_field(value, Rect::new(10.0, 10.0, 20.0, 5.0));
        let instruction = render(&field, &page()).unwrap();

        assert_eq!(instruction.lines.len(), 1);
        let size = instruction.font_size.unwrap();
        assert!((8.0..12.0).contains(&size));
        assert!((instruction.draw_box.right() - 590.0).abs() < 1e-3);
    }

    #[test]
    fn test_multiline_extends_down_to_page_padding() {
        let field = text_field("first line\nsecond line", Rect::new(10.0, 10.0, 40.0, 10.0));
        let instruction = render(&field, &page()).unwrap();
        assert_eq!(instruction.lines, vec!["first line", "second line"]);
        assert!((instruction.draw_box.bottom() - 790.0).abs() < 1e-3);

        let drawn = texts(&instruction);
        assert_eq!(drawn.len(), 2);
        assert!(drawn[0].1 > drawn[1].1, "second line is below the first");
    }

    #[test]
    fn test_right_and_center_extend_toward_edges() {
        let fonts = FontResources::default();
        let config = RenderConfig::default();

        let mut right = text_field("x", Rect::new(50.0, 10.0, 20.0, 5.0));
        right.field_meta = Some(FieldMeta::Text(TextMeta {
            text_align: TextAlign::Right,
            ..Default::default()
        }));
        let instruction = compute_instruction(&right, &page(), &fonts, &config).unwrap();
        assert_eq!(instruction.draw_box.x, 10.0);
        assert!((instruction.draw_box.right() - 420.0).abs() < 1e-3);

        let mut center = text_field("x", Rect::new(10.0, 10.0, 20.0, 5.0));
        center.field_meta = Some(FieldMeta::Text(TextMeta {
            text_align: TextAlign::Center,
            ..Default::default()
        }));
        let instruction = compute_instruction(&center, &page(), &fonts, &config).unwrap();
        // Center at 120, nearest edge is the left one
        assert!((instruction.draw_box.x - 10.0).abs() < 1e-3);
        assert!((instruction.draw_box.right() - 230.0).abs() < 1e-3);
    }

    #[test]
    fn test_read_only_fallback_values() {
        let mut field = text_field("", Rect::new(0.0, 0.0, 10.0, 10.0));
        field.field_meta = Some(FieldMeta::Text(TextMeta {
            text: Some("authored".into()),
            base: crate::field::BaseFieldMeta {
                read_only: true,
                ..Default::default()
            },
            ..Default::default()
        }));
        assert_eq!(text_value(&field), "authored");

        let mut dropdown = Field::new(FieldType::Dropdown, 1, Rect::new(0.0, 0.0, 10.0, 10.0));
        dropdown.field_meta = Some(FieldMeta::Dropdown(DropdownMeta {
            default_value: Some("Blue".into()),
            base: crate::field::BaseFieldMeta {
                read_only: true,
                ..Default::default()
            },
            ..Default::default()
        }));
        assert_eq!(text_value(&dropdown), "Blue");
        assert!(should_render(&dropdown));

        dropdown.custom_text = "Red".into();
        assert_eq!(text_value(&dropdown), "Red");
    }

    #[test]
    fn test_option_layout_never_overlaps() {
        let inner = Rect::new(10.0, 10.0, 200.0, 120.0);
        for direction in [Direction::Vertical, Direction::Horizontal] {
            for count in 1..=20 {
                let slots = layout_options(inner, count, direction, 10.0, 4.0);
                assert_eq!(slots.len(), count);
                for (i, a) in slots.iter().enumerate() {
                    assert!(inner.contains(&a.item), "{:?} {}", direction, count);
                    assert!(a.item.contains(&a.control));
                    assert!(a.item.contains(&a.label));
                    assert!(!a.control.overlaps(&a.label));
                    for b in &slots[i + 1..] {
                        assert!(!a.item.overlaps(&b.item), "{:?} {}", direction, count);
                    }
                }
            }
        }
    }

    #[test]
    fn test_checkbox_selection_from_custom_text() {
        let mut field = Field::new(FieldType::Checkbox, 1, Rect::new(10.0, 10.0, 30.0, 10.0));
        field.custom_text = "0, C".into();
        let values = options(&["A", "B", "C"]);
        assert_eq!(checked_options(&field, &values), vec![true, false, true]);
    }

    #[test]
    fn test_read_only_checkbox_uses_authored_state() {
        let mut values = options(&["A", "B"]);
        values[1].checked = true;
        let mut field = Field::new(FieldType::Checkbox, 1, Rect::new(10.0, 10.0, 30.0, 10.0));
        field.custom_text = "0".into();
        field.field_meta = Some(FieldMeta::Checkbox(CheckboxMeta {
            base: crate::field::BaseFieldMeta {
                read_only: true,
                ..Default::default()
            },
            values: values.clone(),
            ..Default::default()
        }));
        assert_eq!(checked_options(&field, &values), vec![false, true]);

        let instruction = render(&field, &page()).unwrap();
        let marks = instruction
            .ops
            .iter()
            .filter(|op| matches!(op.primitive, Primitive::CheckMark { .. }))
            .count();
        assert_eq!(marks, 1);
    }

    #[test]
    fn test_radio_draws_one_dot() {
        let mut field = Field::new(FieldType::Radio, 1, Rect::new(10.0, 10.0, 30.0, 10.0));
        field.id = "radio".into();
        field.inserted = true;
        field.custom_text = "Maybe".into();
        field.field_meta = Some(FieldMeta::Radio(RadioMeta {
            values: options(&["Yes", "No", "Maybe"]),
            ..Default::default()
        }));

        let instruction = render(&field, &page()).unwrap();
        let filled = instruction
            .ops
            .iter()
            .filter(|op| matches!(op.primitive, Primitive::Circle { fill: Some(_), .. }))
            .count();
        assert_eq!(filled, 1);
        assert_eq!(texts(&instruction).len(), 3);
    }

    #[test]
    fn test_read_only_radio_uses_authored_choice() {
        let mut values = options(&["Yes", "No", "Maybe"]);
        values[2].checked = true;
        let mut field = Field::new(FieldType::Radio, 1, Rect::new(10.0, 10.0, 30.0, 15.0));
        field.id = "radio".into();
        field.custom_text = "No".into();
        field.field_meta = Some(FieldMeta::Radio(RadioMeta {
            base: crate::field::BaseFieldMeta {
                read_only: true,
                ..Default::default()
            },
            values: values.clone(),
            ..Default::default()
        }));
        assert!(should_render(&field));
        assert_eq!(selected_radio(&field, &values), Some(2));

        let instruction = render(&field, &page()).unwrap();
        let outlines: Vec<&DrawOp> = instruction
            .ops
            .iter()
            .filter(|op| matches!(op.primitive, Primitive::Circle { fill: None, .. }))
            .collect();
        let dots: Vec<&DrawOp> = instruction
            .ops
            .iter()
            .filter(|op| matches!(op.primitive, Primitive::Circle { fill: Some(_), .. }))
            .collect();
        assert_eq!(outlines.len(), 3);
        assert_eq!(dots.len(), 1);
        // The dot shares the centre of the third outline
        assert!((dots[0].x - outlines[2].x).abs() < 1e-3);
        assert!((dots[0].y - outlines[2].y).abs() < 1e-3);
    }

    #[test]
    fn test_dropdown_draws_selected_or_default_value() {
        let mut field = Field::new(FieldType::Dropdown, 1, Rect::new(10.0, 10.0, 30.0, 5.0));
        field.id = "colour".into();
        field.inserted = true;
        field.custom_text = "Green".into();
        field.field_meta = Some(FieldMeta::Dropdown(DropdownMeta {
            values: options(&["Red", "Green", "Blue"]),
            default_value: Some("Blue".into()),
            ..Default::default()
        }));

        let instruction = render(&field, &page()).unwrap();
        let drawn = texts(&instruction);
        assert_eq!(drawn.len(), 1);
        assert_eq!(drawn[0].2, "Green");
        assert_eq!(instruction.lines, vec!["Green"]);

        field.inserted = false;
        field.custom_text.clear();
        if let Some(FieldMeta::Dropdown(meta)) = &mut field.field_meta {
            meta.base.read_only = true;
        }
        let instruction = render(&field, &page()).unwrap();
        let drawn = texts(&instruction);
        assert_eq!(drawn.len(), 1);
        assert_eq!(drawn[0].2, "Blue");
    }

    #[test]
    fn test_horizontal_checkbox_lays_options_side_by_side() {
        let mut field = Field::new(FieldType::Checkbox, 1, Rect::new(10.0, 10.0, 60.0, 5.0));
        field.id = "sizes".into();
        field.inserted = true;
        field.custom_text = "1".into();
        field.field_meta = Some(FieldMeta::Checkbox(CheckboxMeta {
            values: options(&["S", "M", "L"]),
            direction: Direction::Horizontal,
            ..Default::default()
        }));

        let instruction = render(&field, &page()).unwrap();
        let boxes: Vec<(f32, f32, f32)> = instruction
            .ops
            .iter()
            .filter_map(|op| match op.primitive {
                Primitive::Rectangle { width, .. } => Some((op.x, op.y, width)),
                _ => None,
            })
            .collect();
        assert_eq!(boxes.len(), 3);
        for pair in boxes.windows(2) {
            assert!(pair[0].0 + pair[0].2 < pair[1].0);
            assert!((pair[0].1 - pair[1].1).abs() < 1e-3);
        }

        let marks: Vec<&DrawOp> = instruction
            .ops
            .iter()
            .filter(|op| matches!(op.primitive, Primitive::CheckMark { .. }))
            .collect();
        assert_eq!(marks.len(), 1);
        let (x, _, width) = boxes[1];
        assert!(marks[0].x > x && marks[0].x < x + width);

        let labels: Vec<String> = texts(&instruction).into_iter().map(|t| t.2).collect();
        assert_eq!(labels, vec!["S", "M", "L"]);
    }

    #[test]
    fn test_choice_without_options_is_invalid() {
        let mut field = Field::new(FieldType::Checkbox, 1, Rect::new(10.0, 10.0, 30.0, 10.0));
        field.id = "empty".into();
        field.field_meta = Some(FieldMeta::Checkbox(CheckboxMeta::default()));
        let err = render(&field, &page()).unwrap_err();
        assert!(matches!(err, PdfError::InvalidFieldMeta { field_id, .. } if field_id == "empty"));
    }

    #[test]
    fn test_typed_signature_uses_signature_font() {
        let mut field = Field::new(FieldType::Signature, 1, Rect::new(10.0, 10.0, 40.0, 10.0));
        field.inserted = true;
        field.signature = Some(SignatureValue {
            signature_image_as_base64: None,
            typed_signature: Some("Jane Doe".into()),
        });
        let instruction = render(&field, &page()).unwrap();
        let size = instruction.font_size.unwrap();
        assert!((20.0..=50.0).contains(&size));
        assert!(instruction.ops.iter().any(|op| matches!(
            op.primitive,
            Primitive::Text {
                font: FontRole::Signature,
                ..
            }
        )));
    }

    #[test]
    fn test_signature_image_is_scaled_and_centered() {
        let mut png = Vec::new();
        image::RgbaImage::from_pixel(400, 100, image::Rgba([0, 0, 0, 128]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let encoded = base64::engine::general_purpose::STANDARD.encode(&png);

        let mut field = Field::new(FieldType::Signature, 1, Rect::new(10.0, 10.0, 40.0, 10.0));
        field.inserted = true;
        field.signature = Some(SignatureValue {
            signature_image_as_base64: Some(format!("data:image/png;base64,{}", encoded)),
            typed_signature: None,
        });

        let instruction = render(&field, &page()).unwrap();
        // Box is 240x80, image 400x100 scales by 0.6
        let area = instruction.draw_box;
        assert!((area.width - 240.0).abs() < 1e-3);
        assert!((area.height - 60.0).abs() < 1e-3);
        assert!((area.y - 90.0).abs() < 1e-3);
        match &instruction.ops[0].primitive {
            Primitive::Image { image, .. } => assert!(image.alpha.is_some()),
            other => panic!("unexpected primitive {:?}", other),
        }
    }

    #[test]
    fn test_signature_without_value_fails() {
        let mut field = Field::new(FieldType::FreeSignature, 1, Rect::new(10.0, 10.0, 40.0, 10.0));
        field.id = "sig".into();
        field.inserted = true;
        let err = render(&field, &page()).unwrap_err();
        assert!(matches!(err, PdfError::MissingSignatureValue { field_id } if field_id == "sig"));
    }

    #[test]
    fn test_rotated_page_positions() {
        let rotated = PageGeometry::new([0.0, 0.0, 800.0, 600.0], Rotation::Deg90);
        let mut field = Field::new(FieldType::Name, 1, Rect::new(0.0, 0.0, 50.0, 50.0));
        field.inserted = true;
        field.custom_text = "Name".into();
        field.field_meta = Some(FieldMeta::Name(TextLikeMeta::default()));

        let instruction = render(&field, &rotated).unwrap();
        assert_eq!(instruction.rotation, Rotation::Deg90);
        // Virtual top-left quadrant maps onto the native left half
        let op = &instruction.ops[0];
        assert!(op.x > 0.0 && op.x < 400.0);
        assert!(op.y > 0.0 && op.y < 300.0);
    }

    #[test]
    fn test_debug_adds_outlines() {
        let field = text_field("Hello", Rect::new(10.0, 10.0, 20.0, 5.0));
        let config = RenderConfig {
            debug: true,
            ..Default::default()
        };
        let instruction =
            compute_instruction(&field, &page(), &FontResources::default(), &config).unwrap();
        let outlines = instruction
            .ops
            .iter()
            .filter(|op| matches!(op.primitive, Primitive::Rectangle { .. }))
            .count();
        assert_eq!(outlines, 2);
    }

    #[test]
    fn test_should_render() {
        let mut field = Field::new(FieldType::Text, 1, Rect::new(0.0, 0.0, 10.0, 10.0));
        assert!(!should_render(&field));
        field.inserted = true;
        assert!(should_render(&field));
    }

    #[test]
    fn test_mask_instruction_covers_areas_in_white() {
        let areas = [
            Rect::new(100.0, 50.0, 80.0, 10.0),
            Rect::new(300.0, 400.0, 20.0, 10.0),
        ];
        let instruction = mask_instruction(&page(), 1, &areas);
        assert_eq!(instruction.ops.len(), 2);

        let first = &instruction.ops[0];
        assert!((first.x - 99.0).abs() < 1e-3);
        assert!((first.y - 739.0).abs() < 1e-3);
        match &first.primitive {
            Primitive::Rectangle { width, height, fill, stroke } => {
                assert!((width - 82.0).abs() < 1e-3);
                assert!((height - 12.0).abs() < 1e-3);
                assert_eq!(*fill, Some(Color::WHITE));
                assert!(stroke.is_none());
            }
            other => panic!("unexpected primitive {:?}", other),
        }
        assert_eq!(instruction.bounds, Rect::new(99.0, 49.0, 222.0, 362.0));
    }
}

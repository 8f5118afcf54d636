//! Font-metric driven text layout: size fitting and line breaking.

use crate::field::FieldType;
use crate::font::FontMetrics;

/// Line advance relative to the font size
pub const LINE_HEIGHT_FACTOR: f32 = 1.2;

/// Text fitted to a box may exceed it by rounding error
const FIT_TOLERANCE: f32 = 1e-3;

/// Distance between consecutive baselines.
pub fn line_height(size: f32) -> f32 {
    size * LINE_HEIGHT_FACTOR
}

/// Largest size in `[min_size, max_size]` at which `text` fits the box.
///
/// Metrics scale linearly with size, so a single measurement at `max_size`
/// is enough. Explicit line breaks are honoured: the widest line sets the
/// width and every line contributes to the height.
pub fn fit_font_size<F: FontMetrics + ?Sized>(
    text: &str,
    box_width: f32,
    box_height: f32,
    min_size: f32,
    max_size: f32,
    font: &F,
) -> f32 {
    let (min_size, max_size) = if min_size <= max_size {
        (min_size, max_size)
    } else {
        (max_size, min_size)
    };

    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return max_size;
    }

    let text_width = lines
        .iter()
        .map(|line| font.width_of_text_at_size(line, max_size))
        .fold(0.0f32, f32::max);
    let text_height = font.height_at_size(max_size)
        + (lines.len() as f32 - 1.0) * line_height(max_size);

    let width_ratio = if text_width > 0.0 {
        box_width.max(0.0) / text_width
    } else {
        f32::INFINITY
    };
    let height_ratio = if text_height > 0.0 {
        box_height.max(0.0) / text_height
    } else {
        f32::INFINITY
    };

    let scale = width_ratio.min(height_ratio).min(1.0);
    (max_size * scale).clamp(min_size, max_size)
}

/// Break `text` into lines no wider than `max_width`.
///
/// Explicit newlines are hard paragraph boundaries. Words are packed
/// greedily; a word that does not fit on a line of its own is split
/// character by character. A single character wider than `max_width` still
/// gets its own line, so the loop always makes progress.
pub fn wrap_text<F: FontMetrics + ?Sized>(
    text: &str,
    max_width: f32,
    font: &F,
    size: f32,
) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    let fits = |candidate: &str| font.width_of_text_at_size(candidate, size) <= max_width;

    let mut lines = Vec::new();

    for paragraph in normalized.split('\n') {
        let mut current = String::new();

        for word in paragraph.split_whitespace() {
            if current.is_empty() {
                if fits(word) {
                    current.push_str(word);
                    continue;
                }
            } else {
                let candidate = format!("{} {}", current, word);
                if fits(&candidate) {
                    current = candidate;
                    continue;
                }
                lines.push(std::mem::take(&mut current));
                if fits(word) {
                    current.push_str(word);
                    continue;
                }
            }

            // Word alone overflows the line: fall back to characters
            for ch in word.chars() {
                let mut candidate = current.clone();
                candidate.push(ch);
                if !current.is_empty() && !fits(&candidate) {
                    lines.push(std::mem::take(&mut current));
                    current.push(ch);
                } else {
                    current = candidate;
                }
            }
        }

        lines.push(current);
    }

    lines
}

/// Only TEXT fields wrap, and only when the value has an explicit newline
/// or is wider than the box.
pub fn is_multiline<F: FontMetrics + ?Sized>(
    field_type: FieldType,
    text: &str,
    box_width: f32,
    font: &F,
    size: f32,
) -> bool {
    if field_type != FieldType::Text {
        return false;
    }
    text.contains('\n') || font.width_of_text_at_size(text, size) > box_width + FIT_TOLERANCE
}

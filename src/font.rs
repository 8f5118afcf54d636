//! Font metrics and font resources used for layout and drawing.
//!
//! Two kinds of fonts are supported:
//! - standard PDF fonts (Helvetica family, Courier), measured from built-in
//!   AFM widths and written with WinAnsi encoding, no embedding needed
//! - TrueType/OpenType fonts supplied by the caller, measured with
//!   `ttf-parser` and embedded as composite (Type0, Identity-H) fonts
//!
//! Fonts are passed into every render call through [`FontResources`];
//! nothing is cached globally.

use crate::PdfError;
use std::collections::HashMap;
use std::sync::Arc;

/// Text measurement, in points for a given font size.
pub trait FontMetrics: Send + Sync {
    fn width_of_text_at_size(&self, text: &str, size: f32) -> f32;

    fn ascent_at_size(&self, size: f32) -> f32;

    /// Distance below the baseline, as a positive number.
    fn descent_at_size(&self, size: f32) -> f32;

    fn height_at_size(&self, size: f32) -> f32 {
        self.ascent_at_size(size) + self.descent_at_size(size)
    }
}

/// Helvetica advance widths for 0x20..=0x7E (1/1000 em).
/// Helvetica-Oblique shares the same widths.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 0..?
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // @..O
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // P.._
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // `..o
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // p..~
];

const HELVETICA_DEFAULT_WIDTH: u16 = 556;
const COURIER_WIDTH: u16 = 600;

/// The standard (non-embedded) fonts this crate draws with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardFont {
    Helvetica,
    HelveticaOblique,
    Courier,
}

impl StandardFont {
    /// The PDF `/BaseFont` name.
    pub fn pdf_name(&self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaOblique => "Helvetica-Oblique",
            StandardFont::Courier => "Courier",
        }
    }

    /// Best matching metrics for a `/BaseFont` name found in a document.
    /// Subset prefixes (`ABCDEF+Arial`) are ignored.
    pub fn from_base_font_name(name: &str) -> Option<StandardFont> {
        let name = name.split_once('+').map_or(name, |(_, rest)| rest);
        let lower = name.to_ascii_lowercase();
        if lower.starts_with("courier") || lower.contains("mono") {
            Some(StandardFont::Courier)
        } else if lower.starts_with("helvetica") || lower.starts_with("arial") {
            if lower.contains("oblique") || lower.contains("italic") {
                Some(StandardFont::HelveticaOblique)
            } else {
                Some(StandardFont::Helvetica)
            }
        } else {
            None
        }
    }

    /// Advance width of a WinAnsi byte in 1/1000 em.
    pub fn code_width(&self, code: u8) -> u16 {
        match self {
            StandardFont::Courier => COURIER_WIDTH,
            StandardFont::Helvetica | StandardFont::HelveticaOblique => {
                if (0x20..=0x7E).contains(&code) {
                    HELVETICA_WIDTHS[(code - 0x20) as usize]
                } else {
                    HELVETICA_DEFAULT_WIDTH
                }
            }
        }
    }

    fn ascent(&self) -> f32 {
        match self {
            StandardFont::Courier => 629.0,
            _ => 718.0,
        }
    }

    fn descent(&self) -> f32 {
        match self {
            StandardFont::Courier => 157.0,
            _ => 207.0,
        }
    }
}

impl FontMetrics for StandardFont {
    fn width_of_text_at_size(&self, text: &str, size: f32) -> f32 {
        let units: u32 = encode_win_ansi(text)
            .into_iter()
            .map(|code| u32::from(self.code_width(code)))
            .sum();
        units as f32 * size / 1000.0
    }

    fn ascent_at_size(&self, size: f32) -> f32 {
        self.ascent() * size / 1000.0
    }

    fn descent_at_size(&self, size: f32) -> f32 {
        self.descent() * size / 1000.0
    }
}

/// Encode text as WinAnsi bytes. Characters outside the encoding become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .filter(|c| *c != '\n' && *c != '\r')
        .map(|c| {
            let cp = c as u32;
            match cp {
                0x20..=0x7E | 0xA0..=0xFF => cp as u8,
                0x20AC => 0x80,
                0x201A => 0x82,
                0x201E => 0x84,
                0x2026 => 0x85,
                0x2018 => 0x91,
                0x2019 => 0x92,
                0x201C => 0x93,
                0x201D => 0x94,
                0x2022 => 0x95,
                0x2013 => 0x96,
                0x2014 => 0x97,
                0x2122 => 0x99,
                _ => b'?',
            }
        })
        .collect()
}

/// Character ranges whose glyph metrics are cached for embedded fonts.
const EMBEDDED_RANGES: &[(u32, u32)] = &[
    (0x0020, 0x007E),
    (0x00A0, 0x024F),
    (0x0370, 0x03FF),
    (0x0400, 0x04FF),
    (0x2000, 0x206F),
    (0x20A0, 0x20CF),
    (0x2100, 0x218F),
];

/// A TrueType/OpenType font supplied by the caller.
#[derive(Debug, Clone)]
pub struct EmbeddedFont {
    name: String,
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    ascender: i16,
    descender: i16,
    bbox: [i16; 4],
    /// char -> (glyph id, advance in font units)
    glyphs: HashMap<char, (u16, u16)>,
    default_advance: u16,
}

impl EmbeddedFont {
    /// Parse font bytes. `name` becomes the `/BaseFont` of the embedded font.
    pub fn from_bytes(name: &str, data: Vec<u8>) -> Result<Self, PdfError> {
        let face = ttf_parser::Face::parse(&data, 0)
            .map_err(|e| PdfError::Font(format!("{}: {}", name, e)))?;

        let units_per_em = face.units_per_em();
        let bbox = face.global_bounding_box();
        let mut glyphs = HashMap::new();
        for &(start, end) in EMBEDDED_RANGES {
            for cp in start..=end {
                let Some(c) = char::from_u32(cp) else {
                    continue;
                };
                if let Some(gid) = face.glyph_index(c) {
                    let advance = face.glyph_hor_advance(gid).unwrap_or(0);
                    glyphs.insert(c, (gid.0, advance));
                }
            }
        }

        let default_advance = glyphs
            .get(&' ')
            .map(|&(_, adv)| adv)
            .filter(|&adv| adv > 0)
            .unwrap_or(units_per_em / 2);

        let ascender = face.ascender();
        let descender = face.descender();
        let bbox = [bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max];

        // PDF names cannot carry whitespace
        let name: String = name.chars().filter(|c| !c.is_whitespace()).collect();

        Ok(Self {
            name: if name.is_empty() { "EmbeddedFont".into() } else { name },
            data: Arc::new(data),
            units_per_em,
            ascender,
            descender,
            bbox,
            glyphs,
            default_advance,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn units_per_em(&self) -> u16 {
        self.units_per_em
    }

    pub fn bbox(&self) -> [i16; 4] {
        self.bbox
    }

    pub fn ascender(&self) -> i16 {
        self.ascender
    }

    pub fn descender(&self) -> i16 {
        self.descender
    }

    /// Glyph id for a character, `.notdef` (0) when unmapped.
    pub fn glyph_id(&self, c: char) -> u16 {
        self.glyphs.get(&c).map_or(0, |&(gid, _)| gid)
    }

    /// Advance of a character in font units.
    pub fn advance(&self, c: char) -> u16 {
        self.glyphs
            .get(&c)
            .map_or(self.default_advance, |&(_, adv)| adv)
    }

    /// Width in the PDF 1000-unit glyph space.
    pub fn pdf_width(&self, c: char) -> i64 {
        i64::from(self.advance(c)) * 1000 / i64::from(self.units_per_em.max(1))
    }

    /// Big-endian glyph ids, the byte form of Identity-H strings.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        text.chars()
            .filter(|c| *c != '\n' && *c != '\r')
            .flat_map(|c| self.glyph_id(c).to_be_bytes())
            .collect()
    }
}

impl FontMetrics for EmbeddedFont {
    fn width_of_text_at_size(&self, text: &str, size: f32) -> f32 {
        let units: u32 = text
            .chars()
            .filter(|c| *c != '\n' && *c != '\r')
            .map(|c| u32::from(self.advance(c)))
            .sum();
        units as f32 * size / f32::from(self.units_per_em.max(1))
    }

    fn ascent_at_size(&self, size: f32) -> f32 {
        f32::from(self.ascender) * size / f32::from(self.units_per_em.max(1))
    }

    fn descent_at_size(&self, size: f32) -> f32 {
        f32::from(self.descender).abs() * size / f32::from(self.units_per_em.max(1))
    }
}

/// A font usable for drawing.
#[derive(Debug, Clone)]
pub enum FontData {
    Standard(StandardFont),
    Embedded(Arc<EmbeddedFont>),
}

impl FontData {
    /// Load a TrueType/OpenType file from disk.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self, PdfError> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(FontData::Embedded(Arc::new(EmbeddedFont::from_bytes(
            &name, data,
        )?)))
    }

    /// Bytes to place inside a PDF string for this font.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            FontData::Standard(_) => encode_win_ansi(text),
            FontData::Embedded(font) => font.encode(text),
        }
    }

    fn metrics(&self) -> &dyn FontMetrics {
        match self {
            FontData::Standard(font) => font,
            FontData::Embedded(font) => font.as_ref(),
        }
    }
}

impl FontMetrics for FontData {
    fn width_of_text_at_size(&self, text: &str, size: f32) -> f32 {
        self.metrics().width_of_text_at_size(text, size)
    }

    fn ascent_at_size(&self, size: f32) -> f32 {
        self.metrics().ascent_at_size(size)
    }

    fn descent_at_size(&self, size: f32) -> f32 {
        self.metrics().descent_at_size(size)
    }
}

/// Which of the injected fonts a text primitive uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontRole {
    Text,
    Signature,
}

/// Fonts injected into a render call.
#[derive(Debug, Clone)]
pub struct FontResources {
    /// Font for every plain text value and option label
    pub text: FontData,
    /// Decorative font for typed signatures
    pub signature: FontData,
}

impl Default for FontResources {
    fn default() -> Self {
        Self {
            text: FontData::Standard(StandardFont::Helvetica),
            signature: FontData::Standard(StandardFont::HelveticaOblique),
        }
    }
}

impl FontResources {
    pub fn get(&self, role: FontRole) -> &FontData {
        match role {
            FontRole::Text => &self.text,
            FontRole::Signature => &self.signature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helvetica_widths() {
        let font = StandardFont::Helvetica;
        // "Hi" = 722 + 222
        let width = font.width_of_text_at_size("Hi", 10.0);
        assert!((width - 9.44).abs() < 1e-4);
        assert_eq!(font.width_of_text_at_size("", 12.0), 0.0);
    }

    #[test]
    fn test_courier_is_monospaced() {
        let font = StandardFont::Courier;
        assert_eq!(
            font.width_of_text_at_size("iiii", 10.0),
            font.width_of_text_at_size("WWWW", 10.0)
        );
    }

    #[test]
    fn test_width_scales_linearly_with_size() {
        let font = StandardFont::Helvetica;
        let small = font.width_of_text_at_size("Signature", 10.0);
        let large = font.width_of_text_at_size("Signature", 20.0);
        assert!((large - 2.0 * small).abs() < 1e-3);
    }

    #[test]
    fn test_base_font_name_matching() {
        assert_eq!(
            StandardFont::from_base_font_name("ABCDEF+Arial-BoldMT"),
            Some(StandardFont::Helvetica)
        );
        assert_eq!(
            StandardFont::from_base_font_name("Helvetica-Oblique"),
            Some(StandardFont::HelveticaOblique)
        );
        assert_eq!(
            StandardFont::from_base_font_name("Courier-Bold"),
            Some(StandardFont::Courier)
        );
        assert_eq!(StandardFont::from_base_font_name("Times-Roman"), None);
    }

    #[test]
    fn test_win_ansi_encoding() {
        assert_eq!(encode_win_ansi("A€é"), vec![b'A', 0x80, 0xE9]);
        assert_eq!(encode_win_ansi("日"), vec![b'?']);
        assert_eq!(encode_win_ansi("a\nb"), vec![b'a', b'b']);
    }

    #[test]
    fn test_invalid_font_bytes_rejected() {
        let err = EmbeddedFont::from_bytes("Broken", vec![0, 1, 2, 3]).unwrap_err();
        assert!(matches!(err, PdfError::Font(_)));
    }

    #[test]
    fn test_default_resources() {
        let fonts = FontResources::default();
        assert!(matches!(
            fonts.get(FontRole::Signature),
            FontData::Standard(StandardFont::HelveticaOblique)
        ));
    }
}

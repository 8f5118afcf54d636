//! Placeholder extraction from PDF using lopdf
//!
//! Extraction runs in two passes per page:
//! 1. walk the content stream and record every shown glyph with its box,
//!    grouped into text runs (one per text-showing operator)
//! 2. flatten the runs into one string with a side table mapping each
//!    character back to its run, then scan the string for `{{...}}` tokens
//!
//! Tokens may span several runs, which is why scanning happens on the
//! flattened text rather than per run. Pages are independent and are
//! scanned in parallel.

use crate::font::StandardFont;
use crate::geometry::{number, resolve, PageGeometry, Rect};
use crate::placeholder::{parse_token, Placeholder, Recipient, PLACEHOLDER_RE};
use crate::tounicode::ToUnicodeCMap;
use crate::PdfError;
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

/// Configuration for placeholder extraction
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Nominal placeholder height in page units; the rendered box is sized
    /// by the renderer, not by the token's text extent
    pub placeholder_height: f32,
    /// Domain of the synthesized `recipient.N@...` addresses
    pub recipient_email_domain: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            placeholder_height: 15.0,
            recipient_email_domain: "placeholder.local".to_string(),
        }
    }
}

/// One shown character, in virtual top-down page units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharBox {
    pub ch: char,
    pub x: f32,
    /// Top edge of the glyph box
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CharBox {
    fn is_finite(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
    }
}

/// Characters shown by a single text operator
#[derive(Debug, Clone)]
pub struct TextRun {
    pub text: String,
    pub chars: Vec<CharBox>,
    /// Font resource name
    pub font: String,
    /// Rendered font size
    pub font_size: f32,
}

/// All text runs of a page, in content stream order
#[derive(Debug, Clone)]
pub struct PageText {
    /// Page number (1-indexed)
    pub page: u32,
    pub geometry: PageGeometry,
    pub runs: Vec<TextRun>,
}

impl PageText {
    /// Concatenated text of all runs.
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }
}

/// Location of a flattened character: `(run index, index within run)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharRef {
    pub run: usize,
    pub offset: usize,
}

/// The page text flattened into one string, with a character -> run map.
#[derive(Debug, Clone)]
pub struct FlatText<'a> {
    pub text: String,
    runs: &'a [TextRun],
    refs: Vec<CharRef>,
    /// Byte offset in `text` where each character starts
    byte_starts: Vec<usize>,
}

impl<'a> FlatText<'a> {
    pub fn new(runs: &'a [TextRun]) -> Self {
        let mut text = String::new();
        let mut refs = Vec::new();
        let mut byte_starts = Vec::new();

        for (run_idx, run) in runs.iter().enumerate() {
            for (offset, char_box) in run.chars.iter().enumerate() {
                byte_starts.push(text.len());
                refs.push(CharRef {
                    run: run_idx,
                    offset,
                });
                text.push(char_box.ch);
            }
        }

        Self {
            text,
            runs,
            refs,
            byte_starts,
        }
    }

    /// Index of the character starting at `byte`.
    pub fn char_index(&self, byte: usize) -> Option<usize> {
        self.byte_starts.binary_search(&byte).ok()
    }

    /// Source character starting at `byte`.
    pub fn char_at(&self, byte: usize) -> Option<&CharBox> {
        self.char_index(byte).and_then(|i| self.char_box(i))
    }

    pub fn char_box(&self, index: usize) -> Option<&CharBox> {
        let r = self.refs.get(index)?;
        self.runs.get(r.run)?.chars.get(r.offset)
    }

    pub fn char_ref(&self, index: usize) -> Option<CharRef> {
        self.refs.get(index).copied()
    }
}

/// A placeholder that could not be turned into a field
#[derive(Debug)]
pub struct SkippedPlaceholder {
    pub placeholder: String,
    pub page: u32,
    pub error: PdfError,
}

/// Result of scanning a document for placeholders
#[derive(Debug, Default)]
pub struct PlaceholderScan {
    /// Placeholders in page order, then text order
    pub placeholders: Vec<Placeholder>,
    pub skipped: Vec<SkippedPlaceholder>,
}

/// Extract placeholders from a PDF file
pub fn extract_placeholders<P: AsRef<Path>>(
    path: P,
    config: &ExtractionConfig,
) -> Result<PlaceholderScan, PdfError> {
    let doc = Document::load(path)?;
    extract_placeholders_from_doc(&doc, config)
}

/// Extract placeholders from a PDF memory buffer
pub fn extract_placeholders_mem(
    buffer: &[u8],
    config: &ExtractionConfig,
) -> Result<PlaceholderScan, PdfError> {
    let doc = Document::load_mem(buffer)?;
    extract_placeholders_from_doc(&doc, config)
}

/// Extract placeholders from a loaded document.
///
/// Per-placeholder problems land in [`PlaceholderScan::skipped`]; an invalid
/// recipient tag or an unreadable page aborts the whole call.
pub fn extract_placeholders_from_doc(
    doc: &Document,
    config: &ExtractionConfig,
) -> Result<PlaceholderScan, PdfError> {
    if doc.is_encrypted() {
        return Err(PdfError::Encrypted);
    }

    let pages: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();
    let page_scans: Vec<Result<PlaceholderScan, PdfError>> = pages
        .par_iter()
        .map(|&(page_num, page_id)| {
            let page_text = extract_page_text(doc, page_id, page_num)?;
            scan_page(&page_text, config)
        })
        .collect();

    let mut scan = PlaceholderScan::default();
    for page_scan in page_scans {
        let page_scan = page_scan?;
        scan.placeholders.extend(page_scan.placeholders);
        scan.skipped.extend(page_scan.skipped);
    }

    log::debug!(
        "found {} placeholders, skipped {}",
        scan.placeholders.len(),
        scan.skipped.len()
    );
    Ok(scan)
}

/// Find placeholder tokens in one page's text.
pub fn scan_page(page: &PageText, config: &ExtractionConfig) -> Result<PlaceholderScan, PdfError> {
    let flat = FlatText::new(&page.runs);
    let mut scan = PlaceholderScan::default();

    for token_match in PLACEHOLDER_RE.find_iter(&flat.text) {
        let raw = token_match.as_str();

        let token = match parse_token(raw) {
            Ok(token) => token,
            Err(err @ PdfError::InvalidRecipientTag { .. }) => return Err(err),
            Err(err) => {
                log::warn!("skipping placeholder {} on page {}: {}", raw, page.page, err);
                scan.skipped.push(SkippedPlaceholder {
                    placeholder: raw.to_string(),
                    page: page.page,
                    error: err,
                });
                continue;
            }
        };

        let recipient = Recipient::from_tag(&token.recipient_tag, &config.recipient_email_domain)
            .map_err(|_| PdfError::InvalidRecipientTag {
                placeholder: raw.to_string(),
                tag: token.recipient_tag.clone(),
            })?;

        let span = flat
            .char_index(token_match.start())
            .zip(flat.char_index(token_match.end().saturating_sub(1)));
        let boxes: Option<Vec<&CharBox>> = span.and_then(|(first, last)| {
            (first..=last)
                .map(|i| flat.char_box(i).filter(|b| b.is_finite()))
                .collect()
        });
        let Some(boxes) = boxes.filter(|b| !b.is_empty()) else {
            log::warn!(
                "could not map placeholder {} on page {} to glyph positions",
                raw,
                page.page
            );
            scan.skipped.push(SkippedPlaceholder {
                placeholder: raw.to_string(),
                page: page.page,
                error: PdfError::PositionMappingFailure {
                    placeholder: raw.to_string(),
                    page: page.page,
                },
            });
            continue;
        };

        let start = boxes[0];
        let end = boxes[boxes.len() - 1];
        let text_bounds = union(&boxes);

        // Pad by a tenth of the last glyph rather than its full width
        let mut width = (end.x + end.width * 0.1) - start.x;
        if width <= 0.0 {
            // Token wrapped onto another line
            width = text_bounds.width;
        }

        scan.placeholders.push(Placeholder {
            placeholder: raw.to_string(),
            recipient_tag: token.recipient_tag,
            recipient,
            field_type: token.field_type,
            field_meta: token.field_meta,
            page: page.page,
            x: start.x,
            y: start.y,
            width,
            height: config.placeholder_height,
            page_width: page.geometry.width,
            page_height: page.geometry.height,
            text_bounds,
        });
    }

    Ok(scan)
}

fn union(boxes: &[&CharBox]) -> Rect {
    let x0 = boxes.iter().map(|b| b.x).fold(f32::INFINITY, f32::min);
    let y0 = boxes.iter().map(|b| b.y).fold(f32::INFINITY, f32::min);
    let x1 = boxes
        .iter()
        .map(|b| b.x + b.width)
        .fold(f32::NEG_INFINITY, f32::max);
    let y1 = boxes
        .iter()
        .map(|b| b.y + b.height)
        .fold(f32::NEG_INFINITY, f32::max);
    Rect::new(x0, y0, x1 - x0, y1 - y0)
}

/// Extract positioned text runs of every page from a PDF file
pub fn extract_text_runs<P: AsRef<Path>>(path: P) -> Result<Vec<PageText>, PdfError> {
    let doc = Document::load(path)?;
    extract_text_runs_from_doc(&doc)
}

/// Extract positioned text runs of every page from a memory buffer
pub fn extract_text_runs_mem(buffer: &[u8]) -> Result<Vec<PageText>, PdfError> {
    let doc = Document::load_mem(buffer)?;
    extract_text_runs_from_doc(&doc)
}

fn extract_text_runs_from_doc(doc: &Document) -> Result<Vec<PageText>, PdfError> {
    doc.get_pages()
        .into_iter()
        .map(|(page_num, page_id)| extract_page_text(doc, page_id, page_num))
        .collect()
}

/// Multiply two 2D transformation matrices
/// Matrix format: [a, b, c, d, e, f] representing:
/// | a  b  0 |
/// | c  d  0 |
/// | e  f  1 |
fn multiply_matrices(m1: &[f32; 6], m2: &[f32; 6]) -> [f32; 6] {
    [
        m1[0] * m2[0] + m1[1] * m2[2],
        m1[0] * m2[1] + m1[1] * m2[3],
        m1[2] * m2[0] + m1[3] * m2[2],
        m1[2] * m2[1] + m1[3] * m2[3],
        m1[4] * m2[0] + m1[5] * m2[2] + m2[4],
        m1[4] * m2[1] + m1[5] * m2[3] + m2[5],
    ]
}

fn translate(tx: f32, ty: f32, m: &[f32; 6]) -> [f32; 6] {
    multiply_matrices(&[1.0, 0.0, 0.0, 1.0, tx, ty], m)
}

fn apply(m: &[f32; 6], x: f32, y: f32) -> (f32, f32) {
    (x * m[0] + y * m[2] + m[4], x * m[1] + y * m[3] + m[5])
}

const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Decoding and width information of one font resource
struct FontInfo {
    two_byte: bool,
    cmap: Option<ToUnicodeCMap>,
    /// Decoded text per byte for simple fonts, from the font's encoding
    byte_map: Option<Vec<Option<String>>>,
    first_char: u32,
    widths: Vec<f32>,
    cid_widths: HashMap<u32, f32>,
    default_width: f32,
    standard: Option<StandardFont>,
}

impl FontInfo {
    fn load(doc: &Document, font: &Dictionary) -> Self {
        let subtype = font
            .get(b"Subtype")
            .and_then(Object::as_name)
            .map(|n| String::from_utf8_lossy(n).to_string())
            .unwrap_or_default();
        let base_font = font
            .get(b"BaseFont")
            .and_then(Object::as_name)
            .map(|n| String::from_utf8_lossy(n).to_string())
            .unwrap_or_default();
        let two_byte = subtype == "Type0";
        let cmap = ToUnicodeCMap::from_font(doc, font);

        let mut info = FontInfo {
            two_byte,
            cmap,
            byte_map: None,
            first_char: 0,
            widths: Vec::new(),
            cid_widths: HashMap::new(),
            default_width: if two_byte { 1000.0 } else { 500.0 },
            standard: StandardFont::from_base_font_name(&base_font),
        };

        if two_byte {
            info.load_cid_widths(doc, font);
        } else {
            info.first_char = font
                .get(b"FirstChar")
                .ok()
                .and_then(|o| number(resolve(doc, o)))
                .map_or(0, |n| n.max(0.0) as u32);
            info.widths = font
                .get(b"Widths")
                .ok()
                .and_then(|o| resolve(doc, o).as_array().ok())
                .map(|arr| {
                    arr.iter()
                        .map(|w| number(resolve(doc, w)).unwrap_or(0.0))
                        .collect()
                })
                .unwrap_or_default();
            if let Some(missing) = font
                .get(b"FontDescriptor")
                .ok()
                .and_then(|o| resolve(doc, o).as_dict().ok())
                .and_then(|d| d.get(b"MissingWidth").ok())
                .and_then(number)
            {
                info.default_width = missing;
            }
            if let Ok(encoding) = font.get_font_encoding(doc) {
                let table = (0u8..=255)
                    .map(|b| Document::decode_text(&encoding, &[b]).ok())
                    .collect();
                info.byte_map = Some(table);
            }
        }

        info
    }

    fn load_cid_widths(&mut self, doc: &Document, font: &Dictionary) {
        let Some(descendant) = font
            .get(b"DescendantFonts")
            .ok()
            .and_then(|o| resolve(doc, o).as_array().ok())
            .and_then(|arr| arr.first())
            .and_then(|o| resolve(doc, o).as_dict().ok())
        else {
            return;
        };

        if let Some(dw) = descendant.get(b"DW").ok().and_then(number) {
            self.default_width = dw;
        }

        let Some(w) = descendant
            .get(b"W")
            .ok()
            .and_then(|o| resolve(doc, o).as_array().ok())
        else {
            return;
        };

        // Entries are `c [w1 w2 ...]` or `c_first c_last w`
        let mut i = 0;
        while i < w.len() {
            let Some(first) = number(resolve(doc, &w[i])) else {
                i += 1;
                continue;
            };
            let first = first.max(0.0) as u32;
            match w.get(i + 1).map(|o| resolve(doc, o)) {
                Some(Object::Array(list)) => {
                    for (offset, width) in list.iter().enumerate() {
                        if let Some(width) = number(resolve(doc, width)) {
                            self.cid_widths.insert(first + offset as u32, width);
                        }
                    }
                    i += 2;
                }
                Some(last) => {
                    let last = number(last).map_or(first, |n| n.max(0.0) as u32);
                    let width = w.get(i + 2).and_then(|o| number(resolve(doc, o)));
                    if let Some(width) = width {
                        for cid in first..=last.min(first.saturating_add(0xFFFF)) {
                            self.cid_widths.insert(cid, width);
                        }
                    }
                    i += 3;
                }
                None => break,
            }
        }
    }

    fn codes(&self, bytes: &[u8]) -> Vec<u32> {
        match (&self.cmap, self.two_byte) {
            (Some(cmap), true) => cmap.codes(bytes),
            (None, true) => bytes
                .chunks(2)
                .map(|c| c.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b)))
                .collect(),
            (_, false) => bytes.iter().map(|&b| u32::from(b)).collect(),
        }
    }

    /// Glyph advance in 1/1000 text space units.
    fn width(&self, code: u32) -> f32 {
        if self.two_byte {
            return self
                .cid_widths
                .get(&code)
                .copied()
                .unwrap_or(self.default_width);
        }

        let index = code.checked_sub(self.first_char).map(|i| i as usize);
        if let Some(width) = index.and_then(|i| self.widths.get(i)) {
            return *width;
        }
        match self.standard {
            Some(font) if code <= 0xFF => f32::from(font.code_width(code as u8)),
            _ => self.default_width,
        }
    }

    fn decode(&self, code: u32) -> String {
        if let Some(text) = self.cmap.as_ref().and_then(|c| c.lookup(code)) {
            return text;
        }
        if !self.two_byte {
            if let Some(Some(text)) = self.byte_map.as_ref().and_then(|m| m.get(code as usize)) {
                return text.clone();
            }
        }
        // Latin-1 / raw code point fallback
        char::from_u32(code).map(String::from).unwrap_or_default()
    }
}

/// Text state parameters, saved and restored with the graphics state
#[derive(Debug, Clone)]
struct TextState {
    font: String,
    size: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
    leading: f32,
    rise: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: String::new(),
            size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

/// Walks a page's content stream, tracking the state needed to position glyphs
struct PageWalker<'a> {
    geometry: PageGeometry,
    fonts: BTreeMap<Vec<u8>, &'a Dictionary>,
    doc: &'a Document,
    loaded: HashMap<String, Arc<FontInfo>>,
    ctm: [f32; 6],
    state: TextState,
    stack: Vec<([f32; 6], TextState)>,
    text_matrix: [f32; 6],
    line_matrix: [f32; 6],
    in_text_block: bool,
    runs: Vec<TextRun>,
}

impl<'a> PageWalker<'a> {
    fn font(&mut self) -> Option<Arc<FontInfo>> {
        if let Some(info) = self.loaded.get(&self.state.font) {
            return Some(Arc::clone(info));
        }
        let dict = *self.fonts.get(self.state.font.as_bytes())?;
        let info = Arc::new(FontInfo::load(self.doc, dict));
        self.loaded
            .insert(self.state.font.clone(), Arc::clone(&info));
        Some(info)
    }

    fn next_line(&mut self) {
        self.line_matrix = translate(0.0, -self.state.leading, &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    /// Show one string operand, advancing the text matrix glyph by glyph.
    fn show(&mut self, bytes: &[u8], run: &mut TextRun) {
        let Some(font) = self.font() else {
            log::debug!("unknown font resource {:?}", self.state.font);
            return;
        };
        let size = self.state.size;
        let h_scale = self.state.horizontal_scale;

        for code in font.codes(bytes) {
            let w0 = font.width(code) / 1000.0;
            let decoded = font.decode(code);
            let glyph_width = w0 * size * h_scale;

            let m = multiply_matrices(&self.text_matrix, &self.ctm);
            let corners = [
                apply(&m, 0.0, self.state.rise),
                apply(&m, glyph_width, self.state.rise),
                apply(&m, 0.0, self.state.rise + size),
                apply(&m, glyph_width, self.state.rise + size),
            ]
            .map(|(x, y)| self.geometry.native_to_virtual_top_down(x, y));

            let x0 = corners.iter().map(|c| c.0).fold(f32::INFINITY, f32::min);
            let x1 = corners.iter().map(|c| c.0).fold(f32::NEG_INFINITY, f32::max);
            let y0 = corners.iter().map(|c| c.1).fold(f32::INFINITY, f32::min);
            let y1 = corners.iter().map(|c| c.1).fold(f32::NEG_INFINITY, f32::max);

            let count = decoded.chars().count().max(1) as f32;
            let share = (x1 - x0) / count;
            for (i, ch) in decoded.chars().enumerate() {
                run.chars.push(CharBox {
                    ch,
                    x: x0 + share * i as f32,
                    y: y0,
                    width: share,
                    height: y1 - y0,
                });
                run.text.push(ch);
            }

            let word_spacing = if !font.two_byte && code == 32 {
                self.state.word_spacing
            } else {
                0.0
            };
            let advance = (w0 * size + self.state.char_spacing + word_spacing) * h_scale;
            self.text_matrix = translate(advance, 0.0, &self.text_matrix);
        }
    }

    fn begin_run(&self) -> TextRun {
        TextRun {
            text: String::new(),
            chars: Vec::new(),
            font: self.state.font.clone(),
            font_size: effective_font_size(self.state.size, &self.text_matrix),
        }
    }

    fn finish_run(&mut self, run: TextRun) {
        if !run.chars.is_empty() {
            self.runs.push(run);
        }
    }
}

/// Extract positioned text runs from a single page
pub fn extract_page_text(
    doc: &Document,
    page_id: ObjectId,
    page_num: u32,
) -> Result<PageText, PdfError> {
    let geometry = PageGeometry::from_page(doc, page_id)?;

    // Get fonts for encoding
    let fonts = doc.get_page_fonts(page_id).unwrap_or_default();

    let content_data = doc
        .get_page_content(page_id)
        .map_err(|e| PdfError::Parse(e.to_string()))?;
    let content = Content::decode(&content_data).map_err(|e| PdfError::Parse(e.to_string()))?;

    let mut walker = PageWalker {
        geometry,
        fonts,
        doc,
        loaded: HashMap::new(),
        ctm: IDENTITY,
        state: TextState::default(),
        stack: Vec::new(),
        text_matrix: IDENTITY,
        line_matrix: IDENTITY,
        in_text_block: false,
        runs: Vec::new(),
    };

    for op in &content.operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            "q" => walker.stack.push((walker.ctm, walker.state.clone())),
            "Q" => {
                if let Some((ctm, state)) = walker.stack.pop() {
                    walker.ctm = ctm;
                    walker.state = state;
                }
            }
            "cm" => {
                if let Some(m) = matrix_operands(operands) {
                    walker.ctm = multiply_matrices(&m, &walker.ctm);
                }
            }
            "BT" => {
                walker.in_text_block = true;
                walker.text_matrix = IDENTITY;
                walker.line_matrix = IDENTITY;
            }
            "ET" => walker.in_text_block = false,
            "Tf" => {
                if operands.len() >= 2 {
                    if let Ok(name) = operands[0].as_name() {
                        walker.state.font = String::from_utf8_lossy(name).to_string();
                    }
                    if let Some(size) = get_number(&operands[1]) {
                        walker.state.size = size;
                    }
                }
            }
            "Tc" => set_from(operands, &mut walker.state.char_spacing),
            "Tw" => set_from(operands, &mut walker.state.word_spacing),
            "TL" => set_from(operands, &mut walker.state.leading),
            "Ts" => set_from(operands, &mut walker.state.rise),
            "Tz" => {
                if let Some(scale) = operands.first().and_then(get_number) {
                    walker.state.horizontal_scale = scale / 100.0;
                }
            }
            "Td" | "TD" => {
                if operands.len() >= 2 {
                    let tx = get_number(&operands[0]).unwrap_or(0.0);
                    let ty = get_number(&operands[1]).unwrap_or(0.0);
                    if op.operator == "TD" {
                        walker.state.leading = -ty;
                    }
                    walker.line_matrix = translate(tx, ty, &walker.line_matrix);
                    walker.text_matrix = walker.line_matrix;
                }
            }
            "Tm" => {
                if let Some(m) = matrix_operands(operands) {
                    walker.text_matrix = m;
                    walker.line_matrix = m;
                }
            }
            "T*" => walker.next_line(),
            "Tj" | "'" | "\"" => {
                if op.operator == "\"" && operands.len() >= 3 {
                    set_from(&operands[0..1], &mut walker.state.word_spacing);
                    set_from(&operands[1..2], &mut walker.state.char_spacing);
                }
                if op.operator != "Tj" {
                    walker.next_line();
                }
                if !walker.in_text_block {
                    continue;
                }
                if let Some(Object::String(bytes, _)) = operands.last() {
                    let mut run = walker.begin_run();
                    walker.show(bytes, &mut run);
                    walker.finish_run(run);
                }
            }
            "TJ" => {
                if !walker.in_text_block {
                    continue;
                }
                if let Some(Ok(array)) = operands.first().map(Object::as_array) {
                    let mut run = walker.begin_run();
                    for item in array {
                        match item {
                            Object::String(bytes, _) => walker.show(bytes, &mut run),
                            other => {
                                if let Some(adjust) = get_number(other) {
                                    let tx = -adjust / 1000.0
                                        * walker.state.size
                                        * walker.state.horizontal_scale;
                                    walker.text_matrix = translate(tx, 0.0, &walker.text_matrix);
                                }
                            }
                        }
                    }
                    walker.finish_run(run);
                }
            }
            _ => {}
        }
    }

    Ok(PageText {
        page: page_num,
        geometry,
        runs: walker.runs,
    })
}

/// Helper to get f32 from Object
fn get_number(obj: &Object) -> Option<f32> {
    number(obj)
}

fn set_from(operands: &[Object], target: &mut f32) {
    if let Some(value) = operands.first().and_then(get_number) {
        *target = value;
    }
}

fn matrix_operands(operands: &[Object]) -> Option<[f32; 6]> {
    if operands.len() < 6 {
        return None;
    }
    let mut m = IDENTITY;
    for (slot, operand) in m.iter_mut().zip(operands.iter()) {
        *slot = get_number(operand)?;
    }
    Some(m)
}

/// Compute effective font size from base size and text matrix
/// Text matrix is [a, b, c, d, tx, ty] where a,d are scale factors
fn effective_font_size(base_size: f32, text_matrix: &[f32; 6]) -> f32 {
    let scale_x = (text_matrix[0].powi(2) + text_matrix[1].powi(2)).sqrt();
    let scale_y = (text_matrix[2].powi(2) + text_matrix[3].powi(2)).sqrt();
    base_size * scale_x.max(scale_y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldType;
    use crate::geometry::Rotation;

    fn run(text: &str, x: f32, y: f32) -> TextRun {
        let chars = text
            .chars()
            .enumerate()
            .map(|(i, ch)| CharBox {
                ch,
                x: x + i as f32 * 6.0,
                y,
                width: 6.0,
                height: 12.0,
            })
            .collect();
        TextRun {
            text: text.to_string(),
            chars,
            font: "F1".into(),
            font_size: 12.0,
        }
    }

    fn page(runs: Vec<TextRun>) -> PageText {
        PageText {
            page: 1,
            geometry: PageGeometry::new([0.0, 0.0, 600.0, 800.0], Rotation::Deg0),
            runs,
        }
    }

    #[test]
    fn test_multiply_identity() {
        let m = [2.0, 0.0, 0.0, 2.0, 10.0, 20.0];
        assert_eq!(multiply_matrices(&IDENTITY, &m), m);
        assert_eq!(translate(5.0, 5.0, &m), [2.0, 0.0, 0.0, 2.0, 20.0, 30.0]);
    }

    #[test]
    fn test_flat_text_maps_back_to_runs() {
        let runs = vec![run("ab", 0.0, 0.0), run("cé", 100.0, 0.0)];
        let flat = FlatText::new(&runs);
        assert_eq!(flat.text, "abcé");
        let e_acute = flat.text.find('é').unwrap();
        assert_eq!(flat.char_index(e_acute), Some(3));
        assert_eq!(flat.char_ref(3), Some(CharRef { run: 1, offset: 1 }));
        assert_eq!(flat.char_at(e_acute).unwrap().x, 106.0);
        // Continuation byte of a multi-byte char is not a char start
        assert_eq!(flat.char_index(e_acute + 1), None);
    }

    #[test]
    fn test_scan_single_placeholder() {
        let text = page(vec![run("Sign here: {{SIGNATURE,r1}}", 100.0, 50.0)]);
        let scan = scan_page(&text, &ExtractionConfig::default()).unwrap();
        assert_eq!(scan.placeholders.len(), 1);
        let p = &scan.placeholders[0];
        assert_eq!(p.field_type, FieldType::Signature);
        assert_eq!(p.recipient_tag, "r1");
        assert_eq!(p.field_meta, None);
        // "Sign here: " is 11 characters of 6 units
        assert_eq!(p.x, 166.0);
        assert_eq!(p.y, 50.0);
        // 16 chars: last starts at +90, padded by a tenth of its width
        assert!((p.width - 90.6).abs() < 1e-3);
        assert_eq!(p.height, 15.0);
        assert_eq!(p.page_width, 600.0);
        assert!((p.text_bounds.width - 96.0).abs() < 1e-3);
    }

    #[test]
    fn test_scan_placeholder_split_across_runs() {
        let text = page(vec![run("{{TEXT,", 10.0, 20.0), run("r2}}", 52.0, 20.0)]);
        let scan = scan_page(&text, &ExtractionConfig::default()).unwrap();
        assert_eq!(scan.placeholders.len(), 1);
        assert_eq!(scan.placeholders[0].placeholder, "{{TEXT,r2}}");
        assert_eq!(scan.placeholders[0].recipient.index, 2);
    }

    #[test]
    fn test_scan_skips_unknown_types_and_continues() {
        let text = page(vec![run("{{STAMP,r1}} {{DATE,r1}}", 0.0, 0.0)]);
        let scan = scan_page(&text, &ExtractionConfig::default()).unwrap();
        assert_eq!(scan.placeholders.len(), 1);
        assert_eq!(scan.placeholders[0].field_type, FieldType::Date);
        assert_eq!(scan.skipped.len(), 1);
        assert!(matches!(
            scan.skipped[0].error,
            PdfError::InvalidPlaceholderType { .. }
        ));
    }

    #[test]
    fn test_scan_skips_unmappable_positions() {
        let mut broken = run("{{NAME,r1}}", 0.0, 0.0);
        broken.chars[3].x = f32::NAN;
        let text = page(vec![broken, run("{{EMAIL,r1}}", 0.0, 40.0)]);
        let scan = scan_page(&text, &ExtractionConfig::default()).unwrap();
        assert_eq!(scan.placeholders.len(), 1);
        assert!(matches!(
            scan.skipped[0].error,
            PdfError::PositionMappingFailure { page: 1, .. }
        ));
    }

    #[test]
    fn test_scan_invalid_recipient_aborts() {
        let text = page(vec![run("{{TEXT,r1}} {{TEXT,bob}}", 0.0, 0.0)]);
        let err = scan_page(&text, &ExtractionConfig::default()).unwrap_err();
        assert!(matches!(err, PdfError::InvalidRecipientTag { tag, .. } if tag == "bob"));
    }
}

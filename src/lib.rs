//! PDF field placement and rendering using lopdf
//!
//! This crate provides:
//! - Discovery of `{{TYPE,rN,key=value}}` placeholders in existing PDFs
//! - Conversion between percentage-based field boxes and page coordinates,
//!   including rotated pages
//! - Rendering of filled-in field values (text, choices, signatures) into
//!   the page content

pub mod extractor;
pub mod field;
pub mod font;
pub mod geometry;
pub mod layout;
pub mod placeholder;
pub mod renderer;
pub mod tounicode;
pub mod writer;

pub use extractor::{
    extract_placeholders, extract_placeholders_from_doc, extract_placeholders_mem,
    ExtractionConfig, PlaceholderScan, SkippedPlaceholder,
};
pub use field::{Field, FieldMeta, FieldType, SignatureValue};
pub use font::{FontData, FontMetrics, FontResources, StandardFont};
pub use geometry::{PageGeometry, Rect, Rotation};
pub use placeholder::{Placeholder, Recipient};
pub use renderer::{RenderConfig, RenderInstruction};

use lopdf::Document;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// A field that could not be rendered
#[derive(Debug)]
pub struct FieldFailure {
    pub field_id: String,
    pub error: PdfError,
}

/// Outcome of rendering a set of fields
#[derive(Debug, Default)]
pub struct RenderReport {
    /// Ids of fields drawn onto their page
    pub rendered: Vec<String>,
    /// Ids of fields with nothing to draw (not filled in, not read-only)
    pub skipped: Vec<String>,
    /// Fields that failed; the rest of the document still rendered
    pub failures: Vec<FieldFailure>,
}

/// Render filled-in fields into a loaded document
///
/// This function will:
/// 1. Check every page reference up front, before the document is touched
/// 2. Compute the drawing instructions of all fields in parallel
/// 3. Apply them page by page, in field order
///
/// Per-field problems are collected in the report; a field pointing past
/// the last page aborts the whole call.
pub fn render_fields(
    doc: &mut Document,
    fields: &[Field],
    fonts: &FontResources,
    config: &RenderConfig,
) -> Result<RenderReport, PdfError> {
    if doc.is_encrypted() {
        return Err(PdfError::Encrypted);
    }

    let pages = doc.get_pages();
    let page_count = pages.len() as u32;

    for field in fields.iter().filter(|f| renderer::should_render(f)) {
        if field.page > page_count {
            return Err(PdfError::PageNotFound {
                field_id: field.id.clone(),
                page: field.page,
                page_count,
            });
        }
    }

    let mut geometries: HashMap<u32, PageGeometry> = HashMap::new();
    for field in fields {
        if geometries.contains_key(&field.page) {
            continue;
        }
        if let Some(&page_id) = pages.get(&field.page) {
            geometries.insert(field.page, PageGeometry::from_page(doc, page_id)?);
        }
    }

    let outcomes: Vec<Option<Result<RenderInstruction, PdfError>>> = fields
        .par_iter()
        .map(|field| {
            if !renderer::should_render(field) {
                return None;
            }
            Some(match geometries.get(&field.page) {
                Some(page) => renderer::compute_instruction(field, page, fonts, config),
                None => Err(field.validate().err().unwrap_or_else(|| {
                    PdfError::PageNotFound {
                        field_id: field.id.clone(),
                        page: field.page,
                        page_count,
                    }
                })),
            })
        })
        .collect();

    let mut report = RenderReport::default();
    let mut by_page: BTreeMap<u32, Vec<RenderInstruction>> = BTreeMap::new();
    for (field, outcome) in fields.iter().zip(outcomes) {
        match outcome {
            None => report.skipped.push(field.id.clone()),
            Some(Ok(instruction)) => {
                report.rendered.push(field.id.clone());
                by_page.entry(field.page).or_default().push(instruction);
            }
            Some(Err(error)) => {
                log::warn!("field {} not rendered: {}", field.id, error);
                report.failures.push(FieldFailure {
                    field_id: field.id.clone(),
                    error,
                });
            }
        }
    }

    for (page, instructions) in by_page {
        if let Some(&page_id) = pages.get(&page) {
            writer::apply_instructions(doc, page_id, &instructions, fonts)?;
        }
    }

    log::debug!(
        "rendered {} fields, skipped {}, failed {}",
        report.rendered.len(),
        report.skipped.len(),
        report.failures.len()
    );
    Ok(report)
}

/// Render fields into a PDF file and save the result to `output`
pub fn insert_fields<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    fields: &[Field],
    fonts: &FontResources,
    config: &RenderConfig,
) -> Result<RenderReport, PdfError> {
    let mut doc = Document::load(input)?;
    let report = render_fields(&mut doc, fields, fonts, config)?;
    doc.save(output)?;
    Ok(report)
}

/// Render fields into a PDF memory buffer, returning the new PDF bytes
pub fn insert_fields_mem(
    buffer: &[u8],
    fields: &[Field],
    fonts: &FontResources,
    config: &RenderConfig,
) -> Result<(Vec<u8>, RenderReport), PdfError> {
    let mut doc = Document::load_mem(buffer)?;
    let report = render_fields(&mut doc, fields, fonts, config)?;
    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok((out, report))
}

/// Paint over the literal text of extracted placeholders
pub fn cover_placeholders(
    doc: &mut Document,
    placeholders: &[Placeholder],
) -> Result<(), PdfError> {
    let pages = doc.get_pages();
    let mut areas: BTreeMap<u32, Vec<Rect>> = BTreeMap::new();
    for placeholder in placeholders {
        areas
            .entry(placeholder.page)
            .or_default()
            .push(placeholder.text_bounds);
    }

    for (page, areas) in areas {
        let Some(&page_id) = pages.get(&page) else {
            continue;
        };
        let geometry = PageGeometry::from_page(doc, page_id)?;
        let instruction = renderer::mask_instruction(&geometry, page, &areas);
        writer::apply_instructions(doc, page_id, &[instruction], &FontResources::default())?;
    }
    Ok(())
}

/// Extract placeholders from a PDF buffer and hide their text, returning
/// the cleaned PDF bytes together with the scan
pub fn strip_placeholders_mem(
    buffer: &[u8],
    config: &ExtractionConfig,
) -> Result<(Vec<u8>, PlaceholderScan), PdfError> {
    let mut doc = Document::load_mem(buffer)?;
    let scan = extract_placeholders_from_doc(&doc, config)?;
    cover_placeholders(&mut doc, &scan.placeholders)?;
    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok((out, scan))
}

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parsing error: {0}")]
    Parse(String),
    #[error("PDF is encrypted")]
    Encrypted,
    #[error("Unknown field type {value:?} in placeholder {placeholder}")]
    InvalidPlaceholderType { placeholder: String, value: String },
    #[error("Invalid recipient tag {tag:?} in placeholder {placeholder}")]
    InvalidRecipientTag { placeholder: String, tag: String },
    #[error("Could not locate placeholder {placeholder} on page {page}")]
    PositionMappingFailure { placeholder: String, page: u32 },
    #[error("Field {field_id} references page {page}, document has {page_count}")]
    PageNotFound {
        field_id: String,
        page: u32,
        page_count: u32,
    },
    #[error("Invalid meta for field {field_id}: {reason}")]
    InvalidFieldMeta { field_id: String, reason: String },
    #[error("Signature field {field_id} has neither an image nor typed text")]
    MissingSignatureValue { field_id: String },
    #[error("Font error: {0}")]
    Font(String),
    #[error("Image error: {0}")]
    Image(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<lopdf::Error> for PdfError {
    fn from(e: lopdf::Error) -> Self {
        PdfError::Parse(e.to_string())
    }
}

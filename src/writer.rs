//! Commit render instructions to a page
//!
//! The page's existing content is wrapped in `q`/`Q` so its graphics state
//! cannot leak into the new marks, then one content stream holding every
//! instruction is appended. Fonts and images are registered as page
//! resources under fresh names.

use crate::font::{EmbeddedFont, FontData, FontResources, FontRole, StandardFont};
use crate::geometry::resolve;
use crate::renderer::{Color, DecodedImage, DrawOp, Primitive, RenderInstruction, Stroke};
use crate::tounicode::build_cmap;
use crate::PdfError;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;

/// Depth limit when walking up the page tree for inherited resources
const MAX_INHERITANCE_DEPTH: usize = 32;

/// Bezier control distance for a quarter circle of radius 1
const CIRCLE_KAPPA: f32 = 0.552_284_8;

/// Draw `instructions` onto a page, in order.
pub fn apply_instructions(
    doc: &mut Document,
    page_id: ObjectId,
    instructions: &[RenderInstruction],
    fonts: &FontResources,
) -> Result<(), PdfError> {
    if instructions.iter().all(|i| i.ops.is_empty()) {
        return Ok(());
    }

    let mut resources = resolve_resources(doc, page_id);
    let mut font_dict = resolve_sub_dictionary(doc, &resources, b"Font");
    let mut xobject_dict = resolve_sub_dictionary(doc, &resources, b"XObject");

    // Register every font role and image the instructions use
    let mut used_chars: HashMap<FontRole, BTreeSet<char>> = HashMap::new();
    let mut images = Vec::new();
    for op in instructions.iter().flat_map(|i| &i.ops) {
        match &op.primitive {
            Primitive::Text { font, text, .. } => {
                used_chars.entry(*font).or_default().extend(text.chars());
            }
            Primitive::Image { image, .. } => images.push(image.as_ref()),
            _ => {}
        }
    }

    let mut font_names: HashMap<FontRole, String> = HashMap::new();
    for role in [FontRole::Text, FontRole::Signature] {
        let Some(chars) = used_chars.get(&role) else {
            continue;
        };
        let font_id = match fonts.get(role) {
            FontData::Standard(font) => add_standard_font(doc, *font),
            FontData::Embedded(font) => embed_font(doc, font, chars),
        };
        let name = unique_name(&font_dict, "PFF");
        font_dict.set(name.as_bytes().to_vec(), Object::Reference(font_id));
        font_names.insert(role, name);
    }

    let mut image_names = Vec::with_capacity(images.len());
    for image in images {
        let image_id = add_image(doc, image)?;
        let name = unique_name(&xobject_dict, "PFImg");
        xobject_dict.set(name.as_bytes().to_vec(), Object::Reference(image_id));
        image_names.push(name);
    }

    let mut operations = vec![Operation::new("Q", vec![])];
    let mut image_names = image_names.into_iter();
    for instruction in instructions {
        let (cos, sin) = instruction.rotation.cos_sin();
        for op in &instruction.ops {
            operations.push(Operation::new("q", vec![]));
            operations.push(Operation::new(
                "cm",
                vec![
                    real(cos),
                    real(sin),
                    real(-sin),
                    real(cos),
                    real(op.x),
                    real(op.y),
                ],
            ));
            draw(&mut operations, op, fonts, &font_names, &mut image_names);
            operations.push(Operation::new("Q", vec![]));
        }
    }

    // Streams are concatenated as-is; keep the first operator separated
    let mut content = b"\n".to_vec();
    content.extend(
        Content { operations }
            .encode()
            .map_err(|e| PdfError::Parse(e.to_string()))?,
    );

    resources.set("Font", Object::Dictionary(font_dict));
    resources.set("XObject", Object::Dictionary(xobject_dict));

    let mut contents = page_content_ids(doc, page_id);
    let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let draw_id = doc.add_object(Stream::new(Dictionary::new(), content));
    contents.insert(0, open_id);
    contents.push(draw_id);

    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page.set(
        "Contents",
        Object::Array(contents.into_iter().map(Object::Reference).collect()),
    );
    page.set("Resources", Object::Dictionary(resources));

    log::debug!(
        "drew {} instructions on page {:?}",
        instructions.len(),
        page_id
    );
    Ok(())
}

fn real(value: f32) -> Object {
    Object::Real(value.into())
}

fn fill_color(color: Color) -> Operation {
    Operation::new("rg", vec![real(color.r), real(color.g), real(color.b)])
}

fn stroke_style(ops: &mut Vec<Operation>, stroke: Stroke) {
    ops.push(Operation::new(
        "RG",
        vec![real(stroke.color.r), real(stroke.color.g), real(stroke.color.b)],
    ));
    ops.push(Operation::new("w", vec![real(stroke.width)]));
}

/// Paint operator for the fill/stroke combination.
fn paint(ops: &mut Vec<Operation>, fill: Option<Color>, stroke: Option<Stroke>) {
    if let Some(color) = fill {
        ops.push(fill_color(color));
    }
    if let Some(stroke) = stroke {
        stroke_style(ops, stroke);
    }
    let operator = match (fill.is_some(), stroke.is_some()) {
        (true, true) => "B",
        (true, false) => "f",
        (false, true) => "S",
        (false, false) => "n",
    };
    ops.push(Operation::new(operator, vec![]));
}

fn draw(
    ops: &mut Vec<Operation>,
    op: &DrawOp,
    fonts: &FontResources,
    font_names: &HashMap<FontRole, String>,
    image_names: &mut impl Iterator<Item = String>,
) {
    match &op.primitive {
        Primitive::Text {
            font,
            size,
            text,
            color,
        } => {
            let Some(name) = font_names.get(font) else {
                return;
            };
            let font_data = fonts.get(*font);
            let format = match font_data {
                FontData::Standard(_) => StringFormat::Literal,
                FontData::Embedded(_) => StringFormat::Hexadecimal,
            };
            ops.push(Operation::new("BT", vec![]));
            ops.push(Operation::new(
                "Tf",
                vec![Object::Name(name.as_bytes().to_vec()), real(*size)],
            ));
            ops.push(fill_color(*color));
            ops.push(Operation::new("Td", vec![real(0.0), real(0.0)]));
            ops.push(Operation::new(
                "Tj",
                vec![Object::String(font_data.encode(text), format)],
            ));
            ops.push(Operation::new("ET", vec![]));
        }
        Primitive::Rectangle {
            width,
            height,
            fill,
            stroke,
        } => {
            ops.push(Operation::new(
                "re",
                vec![real(0.0), real(0.0), real(*width), real(*height)],
            ));
            paint(ops, *fill, *stroke);
        }
        Primitive::Circle {
            radius,
            fill,
            stroke,
        } => {
            let r = *radius;
            let k = r * CIRCLE_KAPPA;
            let curve = |points: [f32; 6]| Operation::new("c", points.map(real).to_vec());
            ops.push(Operation::new("m", vec![real(r), real(0.0)]));
            ops.push(curve([r, k, k, r, 0.0, r]));
            ops.push(curve([-k, r, -r, k, -r, 0.0]));
            ops.push(curve([-r, -k, -k, -r, 0.0, -r]));
            ops.push(curve([k, -r, r, -k, r, 0.0]));
            ops.push(Operation::new("h", vec![]));
            paint(ops, *fill, *stroke);
        }
        Primitive::CheckMark { size, color } => {
            let s = *size;
            stroke_style(
                ops,
                Stroke {
                    color: *color,
                    width: (s * 0.12).max(0.5),
                },
            );
            ops.push(Operation::new("J", vec![Object::Integer(1)]));
            ops.push(Operation::new("j", vec![Object::Integer(1)]));
            ops.push(Operation::new("m", vec![real(s * 0.1), real(s * 0.5)]));
            ops.push(Operation::new("l", vec![real(s * 0.4), real(s * 0.15)]));
            ops.push(Operation::new("l", vec![real(s * 0.9), real(s * 0.85)]));
            ops.push(Operation::new("S", vec![]));
        }
        Primitive::Image { width, height, .. } => {
            let Some(name) = image_names.next() else {
                return;
            };
            ops.push(Operation::new(
                "cm",
                vec![
                    real(*width),
                    real(0.0),
                    real(0.0),
                    real(*height),
                    real(0.0),
                    real(0.0),
                ],
            ));
            ops.push(Operation::new(
                "Do",
                vec![Object::Name(name.into_bytes())],
            ));
        }
    }
}

/// First `prefix<N>` not yet present in `dict`.
fn unique_name(dict: &Dictionary, prefix: &str) -> String {
    let mut index = 0usize;
    loop {
        let name = format!("{}{}", prefix, index);
        if !dict.has(name.as_bytes()) {
            return name;
        }
        index += 1;
    }
}

fn add_standard_font(doc: &mut Document, font: StandardFont) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => font.pdf_name(),
        "Encoding" => "WinAnsiEncoding",
    })
}

/// Embed a TrueType font as a Type0 composite font with Identity-H
/// encoding, a W array and a ToUnicode CMap for the characters used.
fn embed_font(doc: &mut Document, font: &EmbeddedFont, chars: &BTreeSet<char>) -> ObjectId {
    let units = f32::from(font.units_per_em().max(1));
    let scale = |v: i16| Object::Integer((f32::from(v) * 1000.0 / units).round() as i64);
    let name = font.name().to_string();

    let mut file_dict = Dictionary::new();
    file_dict.set("Length1", Object::Integer(font.data().len() as i64));
    let file_id =
        doc.add_object(Stream::new(file_dict, font.data().to_vec()).with_compression(true));

    let bbox = font.bbox();
    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => name.as_str(),
        // Nonsymbolic
        "Flags" => 32,
        "FontBBox" => bbox.iter().map(|&v| scale(v)).collect::<Vec<_>>(),
        "ItalicAngle" => 0,
        "Ascent" => scale(font.ascender()),
        "Descent" => scale(font.descender()),
        "CapHeight" => scale(font.ascender()),
        "StemV" => 80,
        "FontFile2" => Object::Reference(file_id),
    });

    let mut glyphs: BTreeMap<u16, char> = BTreeMap::new();
    for &c in chars {
        let gid = font.glyph_id(c);
        if gid != 0 {
            glyphs.entry(gid).or_insert(c);
        }
    }

    let cid_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => name.as_str(),
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => 0,
        },
        "FontDescriptor" => Object::Reference(descriptor_id),
        "DW" => 1000,
        "W" => widths_array(font, &glyphs),
        "CIDToGIDMap" => "Identity",
    });

    let cmap_id = doc.add_object(Stream::new(Dictionary::new(), build_cmap(&glyphs)));

    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => name.as_str(),
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![Object::Reference(cid_font_id)],
        "ToUnicode" => Object::Reference(cmap_id),
    })
}

/// W array `[gid [w1 w2 ...] ...]`, grouping consecutive glyph ids.
fn widths_array(font: &EmbeddedFont, glyphs: &BTreeMap<u16, char>) -> Vec<Object> {
    let mut result = Vec::new();
    let mut iter = glyphs.iter().peekable();

    while let Some((&first_gid, &c)) = iter.next() {
        let mut widths = vec![Object::Integer(font.pdf_width(c))];
        let mut expected_next = u32::from(first_gid) + 1;

        while let Some(&(&gid, &c)) = iter.peek() {
            if u32::from(gid) != expected_next {
                break;
            }
            widths.push(Object::Integer(font.pdf_width(c)));
            expected_next += 1;
            iter.next();
        }

        result.push(Object::Integer(i64::from(first_gid)));
        result.push(Object::Array(widths));
    }

    result
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, PdfError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Add an image XObject (RGB, with an SMask when the image has alpha).
fn add_image(doc: &mut Document, image: &DecodedImage) -> Result<ObjectId, PdfError> {
    let width = i64::from(image.width);
    let height = i64::from(image.height);

    let smask_id = match &image.alpha {
        Some(alpha) => Some(doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            deflate(alpha)?,
        ))),
        None => None,
    };

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width,
        "Height" => height,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };
    if let Some(smask_id) = smask_id {
        dict.set("SMask", Object::Reference(smask_id));
    }

    Ok(doc.add_object(Stream::new(dict, deflate(&image.rgb)?)))
}

/// Ids of the page's content streams, in order.
fn page_content_ids(doc: &Document, page_id: ObjectId) -> Vec<ObjectId> {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return Vec::new();
    };
    let Ok(contents) = page.get(b"Contents") else {
        return Vec::new();
    };

    let references = |items: &[Object]| {
        items
            .iter()
            .filter_map(|item| item.as_reference().ok())
            .collect::<Vec<_>>()
    };

    match contents {
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => references(items),
            _ => vec![*id],
        },
        Object::Array(items) => references(items),
        _ => Vec::new(),
    }
}

/// The page's resources: its own (inline or referenced), else inherited
/// from the nearest ancestor, else empty. Returned as an owned copy that
/// is written back inline on the page.
fn resolve_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut node = doc.get_dictionary(page_id).ok();
    for _ in 0..MAX_INHERITANCE_DEPTH {
        let Some(dict) = node else {
            break;
        };
        if let Ok(resources) = dict.get(b"Resources") {
            if let Ok(resources) = resolve(doc, resources).as_dict() {
                return resources.clone();
            }
        }
        node = dict
            .get(b"Parent")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id))
            .ok();
    }
    Dictionary::new()
}

fn resolve_sub_dictionary(doc: &Document, resources: &Dictionary, key: &[u8]) -> Dictionary {
    resources
        .get(key)
        .ok()
        .and_then(|obj| resolve(doc, obj).as_dict().ok())
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Rect, Rotation};

    fn single_page_doc(
        resources: Option<Object>,
        inherited: Option<Object>,
    ) -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.5");
        let content_id =
            doc.add_object(Stream::new(Dictionary::new(), b"0 0 m 10 10 l S".to_vec()));
        let pages_id = doc.new_object_id();
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 600.into(), 800.into()],
            "Contents" => content_id,
        };
        if let Some(resources) = resources {
            page.set("Resources", resources);
        }
        let page_id = doc.add_object(page);
        let mut pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        };
        if let Some(inherited) = inherited {
            pages.set("Resources", inherited);
        }
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        (doc, page_id)
    }

    fn text_instruction(text: &str) -> RenderInstruction {
        RenderInstruction {
            field_id: "f1".into(),
            page: 1,
            rotation: Rotation::Deg0,
            bounds: Rect::new(10.0, 10.0, 100.0, 20.0),
            draw_box: Rect::new(10.0, 10.0, 100.0, 20.0),
            font_size: Some(12.0),
            lines: vec![text.into()],
            ops: vec![DrawOp {
                x: 12.0,
                y: 770.0,
                primitive: Primitive::Text {
                    font: FontRole::Text,
                    size: 12.0,
                    text: text.into(),
                    color: Color::BLACK,
                },
            }],
        }
    }

    fn page_fonts(doc: &Document, page_id: ObjectId) -> Dictionary {
        let page = doc.get_dictionary(page_id).unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        resources.get(b"Font").unwrap().as_dict().unwrap().clone()
    }

    #[test]
    fn test_wraps_existing_content_and_appends() {
        let (mut doc, page_id) = single_page_doc(None, None);
        apply_instructions(
            &mut doc,
            page_id,
            &[text_instruction("Hello")],
            &FontResources::default(),
        )
        .unwrap();

        let ids = page_content_ids(&doc, page_id);
        assert_eq!(ids.len(), 3);
        let content = doc.get_page_content(page_id).unwrap();
        let content = String::from_utf8_lossy(&content);
        assert!(content.starts_with("q\n"));
        assert!(content.contains("(Hello) Tj"));
    }

    #[test]
    fn test_inherited_resources_are_kept() {
        let inherited = dictionary! {
            "Font" => dictionary! {
                "PFF0" => dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => "Times-Roman",
                },
            },
        };
        let (mut doc, page_id) = single_page_doc(None, Some(Object::Dictionary(inherited)));
        apply_instructions(
            &mut doc,
            page_id,
            &[text_instruction("Hi")],
            &FontResources::default(),
        )
        .unwrap();

        let fonts = page_fonts(&doc, page_id);
        assert!(fonts.has(b"PFF0"));
        // The new font did not clobber the inherited one
        assert!(fonts.has(b"PFF1"));
    }

    #[test]
    fn test_referenced_resources_are_resolved() {
        let (mut doc, page_id) = single_page_doc(None, None);
        let resources_id = doc.add_object(dictionary! {
            "ProcSet" => vec![Object::Name(b"PDF".to_vec())],
        });
        doc.get_object_mut(page_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("Resources", resources_id);

        apply_instructions(
            &mut doc,
            page_id,
            &[text_instruction("Hi")],
            &FontResources::default(),
        )
        .unwrap();
        let page = doc.get_dictionary(page_id).unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        assert!(resources.has(b"ProcSet"));
        assert!(resources.has(b"Font"));
    }

    #[test]
    fn test_image_gets_smask() {
        let (mut doc, page_id) = single_page_doc(None, None);
        let image = DecodedImage {
            width: 2,
            height: 1,
            rgb: vec![0, 0, 0, 255, 255, 255],
            alpha: Some(vec![255, 0]),
        };
        let mut instruction = text_instruction("x");
        instruction.ops = vec![DrawOp {
            x: 0.0,
            y: 0.0,
            primitive: Primitive::Image {
                width: 20.0,
                height: 10.0,
                image: std::sync::Arc::new(image),
            },
        }];
        apply_instructions(&mut doc, page_id, &[instruction], &FontResources::default()).unwrap();

        let page = doc.get_dictionary(page_id).unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        let image_id = xobjects.get(b"PFImg0").unwrap().as_reference().unwrap();
        let stream = doc.get_object(image_id).unwrap().as_stream().unwrap();
        assert!(stream.dict.has(b"SMask"));
        assert_eq!(stream.decompressed_content().unwrap(), vec![0, 0, 0, 255, 255, 255]);
    }

    #[test]
    fn test_unique_name_skips_existing() {
        let dict = dictionary! { "PFF0" => 1, "PFF1" => 2 };
        assert_eq!(unique_name(&dict, "PFF"), "PFF2");
    }

    #[test]
    fn test_empty_instructions_leave_page_untouched() {
        let (mut doc, page_id) = single_page_doc(None, None);
        let mut instruction = text_instruction("x");
        instruction.ops.clear();
        apply_instructions(&mut doc, page_id, &[instruction], &FontResources::default()).unwrap();
        assert_eq!(page_content_ids(&doc, page_id).len(), 1);
    }
}

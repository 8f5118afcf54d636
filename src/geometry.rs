//! Page geometry: percentage/absolute conversion, Y inversion and rotation.
//!
//! Fields are stored as percentages of the page as the reader sees it (the
//! *virtual* page, after `/Rotate` is applied). Drawing happens in the
//! page's native, unrotated user space. Everything in between goes through
//! this module so the extractor and the renderer agree on the same math.

use crate::PdfError;
use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};

/// US Letter, used when a page carries no usable box.
const DEFAULT_PAGE_SIZE: (f32, f32) = (612.0, 792.0);

/// Limit for walking `/Parent` links when resolving inherited attributes
const MAX_INHERITANCE_DEPTH: usize = 32;

/// An axis-aligned box. Depending on context the values are percentages,
/// page units or points; `y` grows downwards unless stated otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Shrink by `padding` on every side, never below zero size.
    pub fn inset(&self, padding: f32) -> Rect {
        let pad_x = padding.min(self.width / 2.0);
        let pad_y = padding.min(self.height / 2.0);
        Rect::new(
            self.x + pad_x,
            self.y + pad_y,
            self.width - 2.0 * pad_x,
            self.height - 2.0 * pad_y,
        )
    }

    /// True when the interiors intersect (touching edges do not count).
    pub fn overlaps(&self, other: &Rect) -> bool {
        const EPS: f32 = 1e-3;
        self.x + EPS < other.right()
            && other.x + EPS < self.right()
            && self.y + EPS < other.bottom()
            && other.y + EPS < self.bottom()
    }

    pub fn contains(&self, other: &Rect) -> bool {
        const EPS: f32 = 1e-3;
        other.x + EPS >= self.x
            && other.y + EPS >= self.y
            && other.right() <= self.right() + EPS
            && other.bottom() <= self.bottom() + EPS
    }
}

/// A rotation as declared by a PDF page or a drawing API.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Angle {
    Degrees(f32),
    Radians(f32),
}

/// Page rotation snapped to a quarter turn (clockwise, as `/Rotate`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Width and height trade places between native and virtual space.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }

    /// `(cos, sin)` of the counter-clockwise drawing rotation that makes
    /// content upright once the viewer applies the page rotation.
    pub fn cos_sin(self) -> (f32, f32) {
        match self {
            Rotation::Deg0 => (1.0, 0.0),
            Rotation::Deg90 => (0.0, 1.0),
            Rotation::Deg180 => (-1.0, 0.0),
            Rotation::Deg270 => (0.0, -1.0),
        }
    }
}

/// Linear scaling of a percentage box into absolute page units.
pub fn percent_to_absolute(percent: Rect, page_width: f32, page_height: f32) -> Rect {
    Rect {
        x: page_width * percent.x / 100.0,
        y: page_height * percent.y / 100.0,
        width: page_width * percent.width / 100.0,
        height: page_height * percent.height / 100.0,
    }
}

/// Exact inverse of [`percent_to_absolute`]. Degenerate pages map to zero.
pub fn absolute_to_percent(absolute: Rect, page_width: f32, page_height: f32) -> Rect {
    let scale_x = if page_width > 0.0 { 100.0 / page_width } else { 0.0 };
    let scale_y = if page_height > 0.0 { 100.0 / page_height } else { 0.0 };
    Rect {
        x: absolute.x * scale_x,
        y: absolute.y * scale_y,
        width: absolute.width * scale_x,
        height: absolute.height * scale_y,
    }
}

/// Convert a top-down box origin into the bottom-up origin used for drawing.
pub fn invert_y(y: f32, page_height: f32, height: f32) -> f32 {
    page_height - y - height
}

/// Snap an arbitrary rotation to the nearest quarter turn.
pub fn normalize_rotation(angle: Angle) -> Rotation {
    let degrees = match angle {
        Angle::Degrees(d) => d,
        Angle::Radians(r) => r.to_degrees(),
    };
    if !degrees.is_finite() {
        return Rotation::Deg0;
    }
    let quarter_turns = (degrees / 90.0).round() as i64;
    match quarter_turns.rem_euclid(4) {
        1 => Rotation::Deg90,
        2 => Rotation::Deg180,
        3 => Rotation::Deg270,
        _ => Rotation::Deg0,
    }
}

/// Map a bottom-up point in virtual space to the position to draw at in the
/// page's native space. `page_width`/`page_height` are the *virtual*
/// dimensions. Must run after all percentage and virtual-space math.
pub fn adjust_for_rotation(
    page_width: f32,
    page_height: f32,
    x: f32,
    y: f32,
    rotation: Rotation,
) -> (f32, f32) {
    match rotation {
        Rotation::Deg0 => (x, y),
        Rotation::Deg90 => {
            let y = page_height - y;
            (y, x)
        }
        Rotation::Deg180 => (page_width - x, page_height - y),
        Rotation::Deg270 => {
            let x = page_width - x;
            (y, x)
        }
    }
}

/// Inverse of [`adjust_for_rotation`]: native point back to bottom-up virtual.
pub fn unadjust_for_rotation(
    page_width: f32,
    page_height: f32,
    x: f32,
    y: f32,
    rotation: Rotation,
) -> (f32, f32) {
    match rotation {
        Rotation::Deg0 => (x, y),
        Rotation::Deg90 => (y, page_height - x),
        Rotation::Deg180 => (page_width - x, page_height - y),
        Rotation::Deg270 => (page_width - y, x),
    }
}

/// Resolved geometry of one page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    /// Virtual (reader-visible) width
    pub width: f32,
    /// Virtual (reader-visible) height
    pub height: f32,
    pub rotation: Rotation,
    /// Unrotated width in user space
    pub native_width: f32,
    /// Unrotated height in user space
    pub native_height: f32,
    /// Lower-left corner of the visible box in user space
    pub origin_x: f32,
    pub origin_y: f32,
}

impl PageGeometry {
    /// Geometry for a page box `[x0 y0 x1 y1]` and a raw rotation.
    pub fn new(page_box: [f32; 4], rotation: Rotation) -> Self {
        let x0 = page_box[0].min(page_box[2]);
        let y0 = page_box[1].min(page_box[3]);
        let native_width = (page_box[2] - page_box[0]).abs();
        let native_height = (page_box[3] - page_box[1]).abs();
        let (width, height) = if rotation.swaps_axes() {
            (native_height, native_width)
        } else {
            (native_width, native_height)
        };

        Self {
            width,
            height,
            rotation,
            native_width,
            native_height,
            origin_x: x0,
            origin_y: y0,
        }
    }

    /// Read `/CropBox` (or `/MediaBox`) and `/Rotate`, following inheritance.
    pub fn from_page(doc: &Document, page_id: ObjectId) -> Result<Self, PdfError> {
        let page = doc.get_dictionary(page_id)?;

        let page_box = inherited_attribute(doc, page, b"CropBox")
            .or_else(|| inherited_attribute(doc, page, b"MediaBox"))
            .and_then(|obj| parse_box(doc, obj))
            .unwrap_or([0.0, 0.0, DEFAULT_PAGE_SIZE.0, DEFAULT_PAGE_SIZE.1]);

        let rotation = inherited_attribute(doc, page, b"Rotate")
            .and_then(|obj| number(resolve(doc, obj)))
            .map(|deg| normalize_rotation(Angle::Degrees(deg)))
            .unwrap_or_default();

        Ok(Self::new(page_box, rotation))
    }

    /// Bottom-up virtual point to native user-space point.
    pub fn virtual_to_native(&self, x: f32, y: f32) -> (f32, f32) {
        let (nx, ny) = adjust_for_rotation(self.width, self.height, x, y, self.rotation);
        (nx + self.origin_x, ny + self.origin_y)
    }

    /// Native user-space point to top-down virtual page units.
    pub fn native_to_virtual_top_down(&self, x: f32, y: f32) -> (f32, f32) {
        let (vx, vy) = unadjust_for_rotation(
            self.width,
            self.height,
            x - self.origin_x,
            y - self.origin_y,
            self.rotation,
        );
        (vx, self.height - vy)
    }
}

/// Look up a page attribute, walking up the page tree when absent.
fn inherited_attribute<'a>(
    doc: &'a Document,
    page: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Object> {
    let mut node = page;
    for _ in 0..MAX_INHERITANCE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        let parent_id = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_dictionary(parent_id).ok()?;
    }
    None
}

fn parse_box(doc: &Document, obj: &Object) -> Option<[f32; 4]> {
    let array = resolve(doc, obj).as_array().ok()?;
    if array.len() < 4 {
        return None;
    }
    let mut out = [0.0f32; 4];
    for (slot, value) in out.iter_mut().zip(array.iter()) {
        *slot = number(resolve(doc, value))?;
    }
    if (out[2] - out[0]).abs() < f32::EPSILON || (out[3] - out[1]).abs() < f32::EPSILON {
        return None;
    }
    Some(out)
}

/// Follow a single indirect reference, returning the object itself otherwise.
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Numeric value of an Integer or Real object.
pub(crate) fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

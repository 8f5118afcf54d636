//! ToUnicode CMaps
//!
//! Parsing maps glyph codes of composite fonts back to text during
//! placeholder extraction; building produces the CMap written next to
//! embedded fonts so drawn values stay searchable and copyable.

use flate2::read::ZlibDecoder;
use lopdf::{Document, Object};
use std::collections::{BTreeMap, HashMap};
use std::io::Read;

/// A parsed ToUnicode CMap mapping character codes to Unicode strings.
#[derive(Debug, Default, Clone)]
pub struct ToUnicodeCMap {
    /// Direct code mappings
    pub char_map: HashMap<u32, String>,
    /// `(start, end, base)` ranges mapping to consecutive code points
    pub ranges: Vec<(u32, u32, u32)>,
    /// Code width in bytes, from the codespace range (defaults to 2)
    pub code_bytes: usize,
}

impl ToUnicodeCMap {
    /// Parse a CMap from its decompressed content.
    pub fn parse(content: &[u8]) -> Option<Self> {
        let text = String::from_utf8_lossy(content);
        let mut cmap = ToUnicodeCMap {
            code_bytes: 2,
            ..Default::default()
        };

        if let Some(section) = sections(&text, "begincodespacerange", "endcodespacerange").next() {
            if let Some(Token::Hex(first)) = tokenize(section).into_iter().next() {
                cmap.code_bytes = (first.len() / 2).clamp(1, 4);
            }
        }

        for section in sections(&text, "beginbfchar", "endbfchar") {
            let tokens = tokenize(section);
            for pair in tokens.chunks_exact(2) {
                if let (Token::Hex(src), Token::Hex(dst)) = (&pair[0], &pair[1]) {
                    if let (Some(code), Some(value)) = (parse_code(src), utf16_hex_to_string(dst))
                    {
                        cmap.char_map.insert(code, value);
                    }
                }
            }
        }

        for section in sections(&text, "beginbfrange", "endbfrange") {
            let tokens = tokenize(section);
            let mut i = 0;
            while i + 2 < tokens.len() {
                let (Token::Hex(start), Token::Hex(end)) = (&tokens[i], &tokens[i + 1]) else {
                    i += 1;
                    continue;
                };
                let (Some(start), Some(end)) = (parse_code(start), parse_code(end)) else {
                    i += 3;
                    continue;
                };
                match &tokens[i + 2] {
                    Token::Hex(base) => {
                        if let Some(base) = utf16_hex_to_string(base)
                            .and_then(|s| s.chars().next())
                            .map(u32::from)
                        {
                            cmap.ranges.push((start, end, base));
                        }
                    }
                    Token::Array(items) => {
                        for (offset, item) in items.iter().enumerate() {
                            if let Some(value) = utf16_hex_to_string(item) {
                                cmap.char_map.insert(start + offset as u32, value);
                            }
                        }
                    }
                }
                i += 3;
            }
        }

        if cmap.char_map.is_empty() && cmap.ranges.is_empty() {
            None
        } else {
            Some(cmap)
        }
    }

    /// Load the CMap referenced by a font's `/ToUnicode` entry.
    pub fn from_font(doc: &Document, font: &lopdf::Dictionary) -> Option<Self> {
        let stream_id = font.get(b"ToUnicode").ok()?.as_reference().ok()?;
        let stream = match doc.get_object(stream_id).ok()? {
            Object::Stream(stream) => stream,
            _ => return None,
        };
        let content = stream
            .decompressed_content()
            .ok()
            .or_else(|| inflate(&stream.content))
            .unwrap_or_else(|| stream.content.clone());
        Self::parse(&content)
    }

    /// Look up a code.
    pub fn lookup(&self, code: u32) -> Option<String> {
        if let Some(s) = self.char_map.get(&code) {
            return Some(s.clone());
        }

        self.ranges
            .iter()
            .find(|&&(start, end, _)| code >= start && code <= end)
            .and_then(|&(start, _, base)| char::from_u32(base + (code - start)))
            .map(|c| c.to_string())
    }

    /// Split a string operand into codes of `code_bytes` each.
    pub fn codes(&self, bytes: &[u8]) -> Vec<u32> {
        bytes
            .chunks(self.code_bytes.max(1))
            .map(|chunk| chunk.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b)))
            .collect()
    }
}

/// Build a CMap mapping 2-byte glyph ids to the characters they render.
pub fn build_cmap(mapping: &BTreeMap<u16, char>) -> Vec<u8> {
    let mut out = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );

    let entries: Vec<(&u16, &char)> = mapping.iter().collect();
    // A bfchar block holds at most 100 entries
    for block in entries.chunks(100) {
        out.push_str(&format!("{} beginbfchar\n", block.len()));
        for (gid, c) in block {
            let mut units = [0u16; 2];
            let hex: String = c
                .encode_utf16(&mut units)
                .iter()
                .map(|u| format!("{:04X}", u))
                .collect();
            out.push_str(&format!("<{:04X}> <{}>\n", gid, hex));
        }
        out.push_str("endbfchar\n");
    }

    out.push_str(
        "endcmap\n\
         CMapName currentdict /CMap defineresource pop\n\
         end\n\
         end\n",
    );
    out.into_bytes()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Hex(String),
    Array(Vec<String>),
}

/// Bodies between every `begin ... end` keyword pair.
fn sections<'a>(text: &'a str, begin: &'a str, end: &'a str) -> impl Iterator<Item = &'a str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        let start = rest.find(begin)? + begin.len();
        let len = rest[start..].find(end)?;
        let section = &rest[start..start + len];
        rest = &rest[start + len + end.len()..];
        Some(section)
    })
}

/// Hex strings and arrays of hex strings; everything else is skipped.
fn tokenize(section: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut array: Option<Vec<String>> = None;
    let mut chars = section.chars();

    while let Some(c) = chars.next() {
        match c {
            '<' => {
                let hex: String = chars
                    .by_ref()
                    .take_while(|&c| c != '>')
                    .filter(|c| !c.is_whitespace())
                    .collect();
                match array.as_mut() {
                    Some(items) => items.push(hex),
                    None => tokens.push(Token::Hex(hex)),
                }
            }
            '[' => array = Some(Vec::new()),
            ']' => {
                if let Some(items) = array.take() {
                    tokens.push(Token::Array(items));
                }
            }
            _ => {}
        }
    }

    tokens
}

/// Raw zlib inflate, for streams whose filter entry is missing or wrong.
fn inflate(data: &[u8]) -> Option<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed).ok()?;
    Some(decompressed)
}

fn parse_code(hex: &str) -> Option<u32> {
    u32::from_str_radix(hex, 16).ok()
}

/// Decode UTF-16BE hex (surrogate pairs allowed) into a string.
fn utf16_hex_to_string(hex: &str) -> Option<String> {
    let units: Vec<u16> = hex
        .as_bytes()
        .chunks(4)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .filter_map(|chunk| u16::from_str_radix(chunk, 16).ok())
        .collect();
    let decoded = String::from_utf16_lossy(&units);
    if decoded.is_empty() {
        None
    } else {
        Some(decoded)
    }
}

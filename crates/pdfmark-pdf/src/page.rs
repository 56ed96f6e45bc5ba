//! Page tree helpers and PDF primitive conversions.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use kurbo::{Point, Rect, Size};
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};

/// US Letter, used when no MediaBox can be found.
pub const DEFAULT_PAGE_SIZE: Size = Size::new(612.0, 792.0);

/// Guard against cyclic `Parent` chains.
const MAX_INHERITANCE_DEPTH: usize = 32;

/// A page's MediaBox: lower-left origin plus size, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub origin: Point,
    pub size: Size,
}

impl PageBox {
    /// Translate a rectangle from page-local PDF space (origin at 0,0) into the MediaBox.
    pub fn to_document(&self, rect: Rect) -> Rect {
        rect + self.origin.to_vec2()
    }

    /// Inverse of [`PageBox::to_document`].
    pub fn to_local(&self, rect: Rect) -> Rect {
        rect - self.origin.to_vec2()
    }
}

impl Default for PageBox {
    fn default() -> Self {
        Self {
            origin: Point::ZERO,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Follow a reference to its object; other objects are returned as-is.
pub fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    resolve(doc, object).and_then(|o| o.as_dict().ok())
}

/// Numeric array entries, resolving references. `None` if any entry is not a number.
pub fn read_numbers(doc: &Document, object: &Object) -> Option<Vec<f64>> {
    let array = resolve(doc, object)?.as_array().ok()?;
    array
        .iter()
        .map(|item| resolve(doc, item)?.as_float().ok().map(f64::from))
        .collect()
}

/// A normalized rectangle from a 4-number array.
pub fn read_rect(doc: &Document, object: &Object) -> Option<Rect> {
    match read_numbers(doc, object)?.as_slice() {
        [x0, y0, x1, y1] => Some(Rect::new(*x0, *y0, *x1, *y1).abs()),
        _ => None,
    }
}

pub fn rect_object(rect: Rect) -> Object {
    number_array(&[rect.x0, rect.y0, rect.x1, rect.y1])
}

pub fn number_array(values: &[f64]) -> Object {
    Object::Array(values.iter().map(|v| Object::Real(*v as f32)).collect())
}

/// MediaBox of a page, inherited through the page tree, defaulting to Letter.
pub fn page_box(doc: &Document, page_id: ObjectId) -> PageBox {
    let mut current = doc.get_dictionary(page_id).ok();
    for _ in 0..MAX_INHERITANCE_DEPTH {
        let Some(dict) = current else { break };
        if let Some(rect) = dict.get(b"MediaBox").ok().and_then(|o| read_rect(doc, o)) {
            if rect.width() > 0.0 && rect.height() > 0.0 {
                return PageBox {
                    origin: Point::new(rect.x0, rect.y0),
                    size: rect.size(),
                };
            }
        }
        current = dict.get(b"Parent").ok().and_then(|p| resolve_dict(doc, p));
    }
    log::debug!("page {:?} has no usable MediaBox, assuming Letter", page_id);
    PageBox::default()
}

/// An entry of a page's `Annots` array.
pub enum AnnotRef<'a> {
    Indirect(ObjectId, &'a Dictionary),
    Inline(&'a Dictionary),
}

impl<'a> AnnotRef<'a> {
    pub fn dict(&self) -> &'a Dictionary {
        match self {
            AnnotRef::Indirect(_, dict) | AnnotRef::Inline(dict) => dict,
        }
    }
}

/// Annotation dictionaries attached to a page. Entries that don't resolve are dropped.
pub fn annotations(doc: &Document, page_id: ObjectId) -> Vec<AnnotRef<'_>> {
    let Some(annots) = doc
        .get_dictionary(page_id)
        .ok()
        .and_then(|page| page.get(b"Annots").ok())
        .and_then(|annots| resolve(doc, annots))
        .and_then(|annots| annots.as_array().ok())
    else {
        return Vec::new();
    };

    annots
        .iter()
        .filter_map(|entry| match entry {
            Object::Reference(id) => doc
                .get_dictionary(*id)
                .ok()
                .map(|dict| AnnotRef::Indirect(*id, dict)),
            Object::Dictionary(dict) => Some(AnnotRef::Inline(dict)),
            _ => None,
        })
        .collect()
}

/// Append an annotation reference to a page, following an indirect `Annots` array.
pub fn append_annotation(doc: &mut Document, page_id: ObjectId, annot_id: ObjectId) -> lopdf::Result<()> {
    let indirect = match doc.get_dictionary(page_id)?.get(b"Annots") {
        Ok(Object::Reference(id)) => Some(*id),
        _ => None,
    };
    if let Some(array_id) = indirect {
        if let Ok(array) = doc.get_object_mut(array_id).and_then(Object::as_array_mut) {
            array.push(Object::Reference(annot_id));
            return Ok(());
        }
    }

    let page = doc.get_dictionary_mut(page_id)?;
    if let Ok(Object::Array(array)) = page.get_mut(b"Annots") {
        array.push(Object::Reference(annot_id));
    } else {
        page.set("Annots", Object::Array(vec![Object::Reference(annot_id)]));
    }
    Ok(())
}

/// Name value of a dictionary key.
pub fn name<'a>(dict: &'a Dictionary, key: &[u8]) -> Option<&'a [u8]> {
    match dict.get(key).ok()? {
        Object::Name(name) => Some(name.as_slice()),
        _ => None,
    }
}

/// Encode a PDF text string: literal when ASCII, UTF-16BE with BOM otherwise.
pub fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::String(text.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Decode a PDF text string (UTF-16BE with BOM, UTF-8 with BOM, or byte-per-char).
pub fn read_text(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<String> {
    match resolve(doc, dict.get(key).ok()?)? {
        Object::String(bytes, _) => Some(decode_text(bytes)),
        _ => None,
    }
}

fn decode_text(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        String::from_utf8_lossy(rest).into_owned()
    } else {
        bytes.iter().map(|b| char::from(*b)).collect()
    }
}

/// `D:YYYYMMDDHHmmSSZ`
pub fn format_date(date: DateTime<Utc>) -> Object {
    Object::String(date.format("D:%Y%m%d%H%M%SZ").to_string().into_bytes(), StringFormat::Literal)
}

/// Parse a PDF date (`D:YYYY[MM[DD[HH[mm[SS]]]]][Z|+HH'mm'|-HH'mm']`).
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let value = value.strip_prefix("D:").unwrap_or(value);
    let digits_len = value.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits_len < 4 {
        return None;
    }
    let (digits, zone) = value.split_at(digits_len);
    let field = |start: usize, default: u32| -> Option<u32> {
        match digits.get(start..start + 2) {
            Some(s) => s.parse().ok(),
            None => Some(default),
        }
    };
    let year: i32 = digits.get(0..4)?.parse().ok()?;
    let naive = NaiveDate::from_ymd_opt(year, field(4, 1)?, field(6, 1)?)?
        .and_hms_opt(field(8, 0)?, field(10, 0)?, field(12, 0)?)?;

    let offset_seconds = match zone.chars().next() {
        Some(sign @ ('+' | '-')) => {
            let rest: String = zone[1..].chars().filter(char::is_ascii_digit).collect();
            let hours: i32 = rest.get(0..2)?.parse().ok()?;
            let minutes: i32 = rest.get(2..4).and_then(|m| m.parse().ok()).unwrap_or(0);
            let seconds = hours * 3600 + minutes * 60;
            if sign == '-' { -seconds } else { seconds }
        }
        _ => 0,
    };
    let offset = FixedOffset::east_opt(offset_seconds)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|date| date.with_timezone(&Utc))
}

pub fn read_date(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<DateTime<Utc>> {
    read_text(doc, dict, key).and_then(|s| parse_date(&s))
}

//! Font resolution, metrics and embedding
//!
//! Text annotations name a logical family ("Arial", "serif", ...) plus bold
//! and italic flags. `FontCache::resolve` turns that request into a font
//! resource inside one output document: a TrueType font embedded from bytes
//! supplied by a `FontLookup`, or one of the PDF standard 14 fonts when the
//! lookup has nothing usable.

use crate::error::{InkmarkError, Result};
use crate::output::{OutputDocId, OutputDocument};
use lopdf::{dictionary, Object, ObjectId, Stream};
use std::collections::HashMap;

/// Measures rendered text width in the same units as the font size.
pub trait TextMeasurer {
    fn text_width(&self, text: &str, font_size: f64) -> f64;
}

/// The Latin standard fonts every PDF reader provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    HelveticaBoldOblique,
    TimesRoman,
    TimesBold,
    TimesItalic,
    TimesBoldItalic,
    Courier,
    CourierBold,
    CourierOblique,
    CourierBoldOblique,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BaseFamily {
    Helvetica,
    Times,
    Courier,
}

impl StandardFont {
    /// Pick the standard font for a family name and style flags.
    ///
    /// Handles CSS generic families ("serif", "sans-serif", "monospace") as
    /// well as concrete names ("Times New Roman", "Arial", "Consolas").
    pub fn for_family(family: &str, bold: bool, italic: bool) -> Self {
        match (map_font_family_to_base(family), bold, italic) {
            (BaseFamily::Times, true, true) => StandardFont::TimesBoldItalic,
            (BaseFamily::Times, true, false) => StandardFont::TimesBold,
            (BaseFamily::Times, false, true) => StandardFont::TimesItalic,
            (BaseFamily::Times, false, false) => StandardFont::TimesRoman,
            (BaseFamily::Helvetica, true, true) => StandardFont::HelveticaBoldOblique,
            (BaseFamily::Helvetica, true, false) => StandardFont::HelveticaBold,
            (BaseFamily::Helvetica, false, true) => StandardFont::HelveticaOblique,
            (BaseFamily::Helvetica, false, false) => StandardFont::Helvetica,
            (BaseFamily::Courier, true, true) => StandardFont::CourierBoldOblique,
            (BaseFamily::Courier, true, false) => StandardFont::CourierBold,
            (BaseFamily::Courier, false, true) => StandardFont::CourierOblique,
            (BaseFamily::Courier, false, false) => StandardFont::Courier,
        }
    }

    /// PostScript name used as BaseFont
    pub fn base_name(&self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaBold => "Helvetica-Bold",
            StandardFont::HelveticaOblique => "Helvetica-Oblique",
            StandardFont::HelveticaBoldOblique => "Helvetica-BoldOblique",
            StandardFont::TimesRoman => "Times-Roman",
            StandardFont::TimesBold => "Times-Bold",
            StandardFont::TimesItalic => "Times-Italic",
            StandardFont::TimesBoldItalic => "Times-BoldItalic",
            StandardFont::Courier => "Courier",
            StandardFont::CourierBold => "Courier-Bold",
            StandardFont::CourierOblique => "Courier-Oblique",
            StandardFont::CourierBoldOblique => "Courier-BoldOblique",
        }
    }

    /// Advance width of a character in 1/1000 em.
    ///
    /// Obliques share the upright widths. Times bold faces reuse the roman table.
    pub fn char_width(&self, ch: char) -> u16 {
        let code = ch as u32;
        let table: &[u16; 95] = match self {
            StandardFont::Courier
            | StandardFont::CourierBold
            | StandardFont::CourierOblique
            | StandardFont::CourierBoldOblique => return 600,
            StandardFont::Helvetica | StandardFont::HelveticaOblique => &HELVETICA_WIDTHS,
            StandardFont::HelveticaBold | StandardFont::HelveticaBoldOblique => {
                &HELVETICA_BOLD_WIDTHS
            }
            _ => &TIMES_WIDTHS,
        };
        if (32..=126).contains(&code) {
            table[(code - 32) as usize]
        } else {
            // Non-ASCII glyphs: use the width of 'n'
            table[(b'n' - 32) as usize]
        }
    }
}

impl TextMeasurer for StandardFont {
    fn text_width(&self, text: &str, font_size: f64) -> f64 {
        let units: u32 = text.chars().map(|c| self.char_width(c) as u32).sum();
        units as f64 * font_size / 1000.0
    }
}

/// Map font family name to base PDF font (without style variants)
fn map_font_family_to_base(name: &str) -> BaseFamily {
    let lower = name.trim().to_lowercase();

    // Handle CSS generic font families
    match lower.as_str() {
        "serif" => return BaseFamily::Times,
        "sans-serif" | "sans" => return BaseFamily::Helvetica,
        "monospace" => return BaseFamily::Courier,
        "cursive" | "fantasy" => return BaseFamily::Helvetica,
        _ => {}
    }

    // Check for Times/serif
    if lower.contains("times") || lower.contains("georgia") || lower.contains("garamond") {
        return BaseFamily::Times;
    }

    // Check for Courier/monospace
    if lower.contains("courier")
        || lower.contains("mono")
        || lower.contains("consolas")
        || lower.contains("monaco")
    {
        return BaseFamily::Courier;
    }

    if lower.contains("serif") && !lower.contains("sans") {
        return BaseFamily::Times;
    }

    // Arial, Helvetica, sans families and everything unknown
    BaseFamily::Helvetica
}

#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    278, 278, 584, 584, 584, 556, 1015,
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833,
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
    278, 278, 278, 469, 556, 333,
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833,
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500,
    334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    333, 333, 584, 584, 584, 611, 975,
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833,
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
    333, 278, 333, 584, 556, 333,
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889,
    611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500,
    389, 280, 389, 584,
];

#[rustfmt::skip]
const TIMES_WIDTHS: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500,
    278, 278, 564, 564, 564, 444, 921,
    722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889,
    722, 722, 556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611,
    333, 278, 333, 469, 500, 333,
    444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778,
    500, 500, 500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444,
    480, 200, 480, 541,
];

/// WinAnsi codes 0x80..=0x9F that differ from Latin-1
const WINANSI_HIGH: [(u8, char); 27] = [
    (0x80, '\u{20AC}'),
    (0x82, '\u{201A}'),
    (0x83, '\u{0192}'),
    (0x84, '\u{201E}'),
    (0x85, '\u{2026}'),
    (0x86, '\u{2020}'),
    (0x87, '\u{2021}'),
    (0x88, '\u{02C6}'),
    (0x89, '\u{2030}'),
    (0x8A, '\u{0160}'),
    (0x8B, '\u{2039}'),
    (0x8C, '\u{0152}'),
    (0x8E, '\u{017D}'),
    (0x91, '\u{2018}'),
    (0x92, '\u{2019}'),
    (0x93, '\u{201C}'),
    (0x94, '\u{201D}'),
    (0x95, '\u{2022}'),
    (0x96, '\u{2013}'),
    (0x97, '\u{2014}'),
    (0x98, '\u{02DC}'),
    (0x99, '\u{2122}'),
    (0x9A, '\u{0161}'),
    (0x9B, '\u{203A}'),
    (0x9C, '\u{0153}'),
    (0x9E, '\u{017E}'),
    (0x9F, '\u{0178}'),
];

/// Character for a WinAnsiEncoding code, if the code is printable
pub fn winansi_char(code: u8) -> Option<char> {
    match code {
        32..=126 | 160..=255 => Some(char::from(code)),
        0x80..=0x9F => WINANSI_HIGH
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, ch)| *ch),
        _ => None,
    }
}

/// Encode text as WinAnsi bytes; unmappable characters become '?'
pub fn encode_winansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| match ch as u32 {
            32..=126 | 160..=255 => ch as u8,
            _ => WINANSI_HIGH
                .iter()
                .find(|(_, c)| *c == ch)
                .map(|(code, _)| *code)
                .unwrap_or(b'?'),
        })
        .collect()
}

/// Width information for a resolved font
#[derive(Debug, Clone, PartialEq)]
pub enum FontMetrics {
    Standard(StandardFont),
    /// Advance widths (1/1000 em) indexed by WinAnsi code
    Embedded { widths: Vec<u16> },
}

impl TextMeasurer for FontMetrics {
    fn text_width(&self, text: &str, font_size: f64) -> f64 {
        match self {
            FontMetrics::Standard(font) => font.text_width(text, font_size),
            FontMetrics::Embedded { widths } => {
                let units: u32 = encode_winansi(text)
                    .into_iter()
                    .map(|code| widths.get(code as usize).copied().unwrap_or(0) as u32)
                    .sum();
                units as f64 * font_size / 1000.0
            }
        }
    }
}

/// A font resource usable in one output document
#[derive(Debug, Clone, PartialEq)]
pub struct FontHandle {
    /// Name under the page's /Font resources, e.g. `InkF2`
    pub resource_name: String,
    pub object_id: ObjectId,
    pub metrics: FontMetrics,
    pub embedded: bool,
}

/// Platform font source, e.g. a system font directory scanner
pub trait FontLookup {
    /// Load font bytes for a variant name such as `Arial-Bold`.
    fn load_font(&self, variant_name: &str) -> Option<Vec<u8>>;
}

/// Lookup that never finds anything; every request uses a standard font
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFontLookup;

impl FontLookup for NoFontLookup {
    fn load_font(&self, _variant_name: &str) -> Option<Vec<u8>> {
        None
    }
}

/// Variant name passed to the lookup service, e.g. `Times New Roman-BoldItalic`
pub fn variant_name(family: &str, bold: bool, italic: bool) -> String {
    let style = match (bold, italic) {
        (true, true) => "BoldItalic",
        (true, false) => "Bold",
        (false, true) => "Italic",
        (false, false) => "Regular",
    };
    format!("{}-{}", family.trim(), style)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FontKey {
    document: OutputDocId,
    family: String,
    bold: bool,
    italic: bool,
}

/// Memoizes resolved fonts per output document
#[derive(Debug, Default)]
pub struct FontCache {
    entries: HashMap<FontKey, FontHandle>,
    lookups: usize,
}

impl FontCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a family and style to a font resource in `output`
    pub fn resolve(
        &mut self,
        output: &mut OutputDocument,
        family: &str,
        bold: bool,
        italic: bool,
        lookup: &dyn FontLookup,
    ) -> FontHandle {
        let key = FontKey {
            document: output.id(),
            family: family.trim().to_lowercase(),
            bold,
            italic,
        };
        if let Some(handle) = self.entries.get(&key) {
            return handle.clone();
        }

        let variant = variant_name(family, bold, italic);
        self.lookups += 1;
        let handle = match lookup.load_font(&variant) {
            Some(bytes) => match embed_truetype(output, &variant, bytes, italic) {
                Ok(handle) => {
                    tracing::debug!(variant = %variant, "Embedded platform font");
                    handle
                }
                Err(e) => {
                    tracing::debug!(variant = %variant, error = %e, "Font unusable, using standard font");
                    add_standard_font(output, StandardFont::for_family(family, bold, italic))
                }
            },
            None => {
                let fallback = StandardFont::for_family(family, bold, italic);
                tracing::debug!(
                    variant = %variant,
                    fallback = fallback.base_name(),
                    "Font not found, using standard font"
                );
                add_standard_font(output, fallback)
            }
        };

        self.entries.insert(key, handle.clone());
        handle
    }

    /// Drop every entry belonging to `document`, returning how many were removed
    pub fn invalidate(&mut self, document: OutputDocId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.document != document);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of lookup-service requests issued (cache misses)
    pub fn lookups(&self) -> usize {
        self.lookups
    }
}

fn add_standard_font(output: &mut OutputDocument, font: StandardFont) -> FontHandle {
    let object_id = output.document_mut().add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => font.base_name(),
        "Encoding" => "WinAnsiEncoding",
    });
    FontHandle {
        resource_name: output.next_resource_name("InkF"),
        object_id,
        metrics: FontMetrics::Standard(font),
        embedded: false,
    }
}

/// Embed a TrueType font program with WinAnsi widths
fn embed_truetype(
    output: &mut OutputDocument,
    variant: &str,
    bytes: Vec<u8>,
    italic: bool,
) -> Result<FontHandle> {
    let face =
        ttf_parser::Face::parse(&bytes, 0).map_err(|e| InkmarkError::FontError(e.to_string()))?;
    let units_per_em = face.units_per_em() as f64;
    if units_per_em <= 0.0 {
        return Err(InkmarkError::FontError("Font has no units per em".into()));
    }
    let scale = |v: f64| (v * 1000.0 / units_per_em).round() as i64;

    let advance = |ch: char| -> Option<u16> {
        face.glyph_index(ch)
            .and_then(|gid| face.glyph_hor_advance(gid))
            .map(|adv| scale(adv as f64) as u16)
    };
    let missing_width = advance('?').unwrap_or(500);
    let mut widths = vec![0u16; 256];
    for code in 32u8..=255 {
        if let Some(ch) = winansi_char(code) {
            widths[code as usize] = advance(ch).unwrap_or(missing_width);
        }
    }

    let bbox = face.global_bounding_box();
    let ascent = scale(face.ascender() as f64);
    let descent = scale(face.descender() as f64);
    let cap_height = scale(face.capital_height().unwrap_or(face.ascender()) as f64);
    let base_font: String = variant.chars().filter(|c| !c.is_whitespace()).collect();
    let length = bytes.len() as i64;

    let doc = output.document_mut();
    let file_id = doc.add_object(Stream::new(dictionary! { "Length1" => length }, bytes));
    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => base_font.as_str(),
        "Flags" => if italic { 32 + 64 } else { 32 },
        "FontBBox" => vec![
            Object::Integer(scale(bbox.x_min as f64)),
            Object::Integer(scale(bbox.y_min as f64)),
            Object::Integer(scale(bbox.x_max as f64)),
            Object::Integer(scale(bbox.y_max as f64)),
        ],
        "ItalicAngle" => if italic { -12 } else { 0 },
        "Ascent" => ascent,
        "Descent" => descent,
        "CapHeight" => cap_height,
        "StemV" => 80,
        "FontFile2" => Object::Reference(file_id),
    });
    let object_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "TrueType",
        "BaseFont" => base_font.as_str(),
        "FirstChar" => 32,
        "LastChar" => 255,
        "Widths" => widths[32..]
            .iter()
            .map(|w| Object::Integer(*w as i64))
            .collect::<Vec<_>>(),
        "FontDescriptor" => Object::Reference(descriptor_id),
        "Encoding" => "WinAnsiEncoding",
    });

    Ok(FontHandle {
        resource_name: output.next_resource_name("InkF"),
        object_id,
        metrics: FontMetrics::Embedded { widths },
        embedded: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Lookup that counts requests and never finds a font
    struct CountingLookup {
        calls: Cell<usize>,
    }

    impl FontLookup for CountingLookup {
        fn load_font(&self, _variant_name: &str) -> Option<Vec<u8>> {
            self.calls.set(self.calls.get() + 1);
            None
        }
    }

    struct GarbageLookup;

    impl FontLookup for GarbageLookup {
        fn load_font(&self, _variant_name: &str) -> Option<Vec<u8>> {
            Some(b"definitely not a font".to_vec())
        }
    }

    struct BytesLookup {
        bytes: Vec<u8>,
        calls: Cell<usize>,
    }

    impl FontLookup for BytesLookup {
        fn load_font(&self, _variant_name: &str) -> Option<Vec<u8>> {
            self.calls.set(self.calls.get() + 1);
            Some(self.bytes.clone())
        }
    }

    /// TrueType font with 27 glyphs: `A`..`Z` map to glyphs 1..26, `A` is
    /// 600 units wide and everything else falls back to 500.
    fn tiny_truetype() -> Vec<u8> {
        let mut head = vec![0u8; 54];
        head[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
        head[12..16].copy_from_slice(&0x5F0F_3CF5u32.to_be_bytes());
        head[18..20].copy_from_slice(&1000u16.to_be_bytes());
        head[38..40].copy_from_slice(&(-200i16).to_be_bytes());
        head[40..42].copy_from_slice(&600i16.to_be_bytes());
        head[42..44].copy_from_slice(&800i16.to_be_bytes());

        let mut hhea = vec![0u8; 36];
        hhea[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
        hhea[4..6].copy_from_slice(&800i16.to_be_bytes());
        hhea[6..8].copy_from_slice(&(-200i16).to_be_bytes());
        hhea[34..36].copy_from_slice(&2u16.to_be_bytes());

        let mut maxp = 0x0000_5000u32.to_be_bytes().to_vec();
        maxp.extend_from_slice(&27u16.to_be_bytes());

        let mut hmtx = Vec::new();
        for advance in [500u16, 600] {
            hmtx.extend_from_slice(&advance.to_be_bytes());
            hmtx.extend_from_slice(&0i16.to_be_bytes());
        }
        hmtx.extend_from_slice(&[0u8; 50]);

        // Windows Unicode BMP, format 4, segments [A-Z] and the 0xFFFF terminator
        let mut cmap = Vec::new();
        for word in [0u16, 1, 3, 1] {
            cmap.extend_from_slice(&word.to_be_bytes());
        }
        cmap.extend_from_slice(&12u32.to_be_bytes());
        for word in [4u16, 32, 0, 4, 4, 1, 0, 0x5A, 0xFFFF, 0, 0x41, 0xFFFF] {
            cmap.extend_from_slice(&word.to_be_bytes());
        }
        for delta in [-64i16, 1] {
            cmap.extend_from_slice(&delta.to_be_bytes());
        }
        cmap.extend_from_slice(&[0u8; 4]);

        let tables: [(&[u8; 4], Vec<u8>); 5] = [
            (b"cmap", cmap),
            (b"head", head),
            (b"hhea", hhea),
            (b"hmtx", hmtx),
            (b"maxp", maxp),
        ];
        let mut font = 0x0001_0000u32.to_be_bytes().to_vec();
        font.extend_from_slice(&(tables.len() as u16).to_be_bytes());
        font.extend_from_slice(&[0u8; 6]);
        let mut offset = 12 + 16 * tables.len();
        for (tag, data) in &tables {
            font.extend_from_slice(*tag);
            font.extend_from_slice(&0u32.to_be_bytes());
            font.extend_from_slice(&(offset as u32).to_be_bytes());
            font.extend_from_slice(&(data.len() as u32).to_be_bytes());
            offset += data.len();
        }
        for (_, data) in &tables {
            font.extend_from_slice(data);
        }
        font
    }

    #[test]
    fn test_font_mapping_css_generic_families() {
        assert_eq!(StandardFont::for_family("serif", false, false), StandardFont::TimesRoman);
        assert_eq!(StandardFont::for_family("sans-serif", false, false), StandardFont::Helvetica);
        assert_eq!(StandardFont::for_family("monospace", false, false), StandardFont::Courier);
    }

    #[test]
    fn test_font_mapping_concrete_names() {
        assert_eq!(StandardFont::for_family("Times New Roman", false, false), StandardFont::TimesRoman);
        assert_eq!(StandardFont::for_family("Arial", true, false), StandardFont::HelveticaBold);
        assert_eq!(StandardFont::for_family("Consolas", false, true), StandardFont::CourierOblique);
        assert_eq!(StandardFont::for_family("Noto Serif", true, true), StandardFont::TimesBoldItalic);
        assert_eq!(StandardFont::for_family("Noto Sans", false, false), StandardFont::Helvetica);
        assert_eq!(StandardFont::for_family("Papyrus", false, false), StandardFont::Helvetica);
    }

    #[test]
    fn test_font_mapping_case_insensitive() {
        assert_eq!(StandardFont::for_family("TIMES", false, false), StandardFont::TimesRoman);
        assert_eq!(StandardFont::for_family("  Courier New ", true, true), StandardFont::CourierBoldOblique);
    }

    #[test]
    fn test_standard_widths() {
        let helvetica = StandardFont::Helvetica;
        // "Hi" = 722 + 222
        assert!((helvetica.text_width("Hi", 10.0) - 9.44).abs() < 1e-9);
        assert_eq!(StandardFont::Courier.text_width("abc", 10.0), 18.0);
        assert!(
            StandardFont::HelveticaBold.text_width("bold", 12.0)
                > StandardFont::Helvetica.text_width("bold", 12.0)
        );
    }

    #[test]
    fn test_winansi_encoding() {
        assert_eq!(encode_winansi("A\u{e9}\u{20AC}\u{4E2D}"), vec![b'A', 0xE9, 0x80, b'?']);
        assert_eq!(winansi_char(0x93), Some('\u{201C}'));
        assert_eq!(winansi_char(0x81), None);
        assert_eq!(winansi_char(10), None);
    }

    #[test]
    fn test_variant_name() {
        assert_eq!(variant_name("Arial", true, false), "Arial-Bold");
        assert_eq!(variant_name(" Times ", true, true), "Times-BoldItalic");
        assert_eq!(variant_name("Inter", false, false), "Inter-Regular");
    }

    #[test]
    fn test_fallback_and_cache_hit() {
        let mut output = OutputDocument::new();
        let mut cache = FontCache::new();
        let lookup = CountingLookup { calls: Cell::new(0) };

        let first = cache.resolve(&mut output, "Arial", true, false, &lookup);
        assert_eq!(first.metrics, FontMetrics::Standard(StandardFont::HelveticaBold));
        assert!(!first.embedded);
        assert_eq!(lookup.calls.get(), 1);

        let second = cache.resolve(&mut output, "arial", true, false, &lookup);
        assert_eq!(second, first);
        assert_eq!(lookup.calls.get(), 1);
        assert_eq!(cache.lookups(), 1);
    }

    #[test]
    fn test_styles_are_cached_separately() {
        let mut output = OutputDocument::new();
        let mut cache = FontCache::new();

        let regular = cache.resolve(&mut output, "Arial", false, false, &NoFontLookup);
        let italic = cache.resolve(&mut output, "Arial", false, true, &NoFontLookup);
        assert_ne!(regular.resource_name, italic.resource_name);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_entries_do_not_leak_across_documents() {
        let mut first_doc = OutputDocument::new();
        let mut second_doc = OutputDocument::new();
        let mut cache = FontCache::new();

        let a = cache.resolve(&mut first_doc, "serif", false, false, &NoFontLookup);
        let b = cache.resolve(&mut second_doc, "serif", false, false, &NoFontLookup);
        assert_eq!(cache.lookups(), 2);
        assert!(second_doc.document().get_object(b.object_id).is_ok());
        assert_eq!(a.metrics, b.metrics);

        assert_eq!(cache.invalidate(first_doc.id()), 1);
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_unparsable_font_falls_back() {
        let mut output = OutputDocument::new();
        let mut cache = FontCache::new();
        let handle = cache.resolve(&mut output, "Georgia", false, true, &GarbageLookup);
        assert_eq!(handle.metrics, FontMetrics::Standard(StandardFont::TimesItalic));

        let font = output
            .document()
            .get_object(handle.object_id)
            .unwrap()
            .as_dict()
            .unwrap();
        assert_eq!(font.get(b"BaseFont").unwrap().as_name().unwrap(), b"Times-Italic");
    }

    #[test]
    fn test_platform_font_is_embedded() {
        let mut output = OutputDocument::new();
        let mut cache = FontCache::new();
        let lookup = BytesLookup {
            bytes: tiny_truetype(),
            calls: Cell::new(0),
        };

        let handle = cache.resolve(&mut output, "Inter", false, false, &lookup);
        assert!(handle.embedded);
        assert!(handle.resource_name.starts_with("InkF"));
        assert_eq!(handle.metrics.text_width("Aa", 10.0), 11.0);

        let doc = output.document();
        let font = doc.get_object(handle.object_id).unwrap().as_dict().unwrap();
        assert_eq!(font.get(b"Subtype").unwrap().as_name().unwrap(), b"TrueType");
        assert_eq!(font.get(b"BaseFont").unwrap().as_name().unwrap(), b"Inter-Regular");
        let widths = font.get(b"Widths").unwrap().as_array().unwrap();
        assert_eq!(widths.len(), 224);
        assert_eq!(widths[(b'A' - 32) as usize].as_i64().unwrap(), 600);
        assert_eq!(widths[(b'a' - 32) as usize].as_i64().unwrap(), 500);

        let descriptor_id = font.get(b"FontDescriptor").unwrap().as_reference().unwrap();
        let descriptor = doc.get_object(descriptor_id).unwrap().as_dict().unwrap();
        let file_id = descriptor.get(b"FontFile2").unwrap().as_reference().unwrap();
        let file = doc.get_object(file_id).unwrap().as_stream().unwrap();
        assert_eq!(file.content, tiny_truetype());

        let again = cache.resolve(&mut output, "Inter", false, false, &lookup);
        assert_eq!(again, handle);
        assert_eq!(lookup.calls.get(), 1);
    }
}

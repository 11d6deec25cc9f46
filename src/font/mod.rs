//! # Font Metrics
//!
//! Text measurement for layout. Typefaces registered with a [`FontContext`]
//! are measured from their own tables via ttf-parser; anything else falls
//! back to Helvetica-class widths, which is what viewers substitute for the
//! usual XFA faces (Myriad Pro, Arial) when they are not embedded.

use std::collections::HashMap;

use crate::config::LayoutConfig;
use crate::dom::props::FontProps;

/// A resolved font request.
#[derive(Debug, Clone, PartialEq)]
pub struct FontDescriptor {
    pub typeface: String,
    /// Size in points.
    pub size: f64,
    pub bold: bool,
    pub italic: bool,
}

impl FontDescriptor {
    /// Fill unset `<font>` properties from the configuration.
    pub fn resolve(props: &FontProps, config: &LayoutConfig) -> Self {
        Self {
            typeface: props
                .typeface
                .clone()
                .unwrap_or_else(|| config.default_typeface.clone()),
            size: props.size.unwrap_or(config.default_font_size),
            bold: props.bold,
            italic: props.italic,
        }
    }
}

/// Size of a single line of text.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TextMetrics {
    pub width: f64,
    pub ascent: f64,
    pub descent: f64,
    /// Baseline-to-baseline distance.
    pub line_height: f64,
}

/// The measurement service consumed by layout.
pub trait FontMetrics {
    /// Advance width of `ch` in points.
    fn char_width(&self, font: &FontDescriptor, ch: char) -> f64;

    /// Vertical metrics in points: (ascent, descent, line height).
    fn vertical(&self, font: &FontDescriptor) -> (f64, f64, f64);

    /// Measure one line of text.
    fn measure(&self, font: &FontDescriptor, text: &str) -> TextMetrics {
        let width = text.chars().map(|c| self.char_width(font, c)).sum();
        let (ascent, descent, line_height) = self.vertical(font);
        TextMetrics {
            width,
            ascent,
            descent,
            line_height,
        }
    }
}

/// Helvetica widths (per 1000 em) for U+0020..=U+007E.
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, 556, 556, 556,
    556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, 1015, 667, 667, 722, 722, 667,
    611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667,
    667, 611, 278, 278, 278, 469, 556, 333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500,
    222, 833, 556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

/// Helvetica-Bold widths (per 1000 em) for U+0020..=U+007E.
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, 556, 556, 556,
    556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, 975, 722, 722, 722, 722, 667,
    611, 778, 722, 278, 556, 722, 611, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667,
    667, 611, 333, 278, 333, 584, 556, 333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556,
    278, 889, 611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

/// Built-in metrics used when no font file is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardFontMetrics;

impl FontMetrics for StandardFontMetrics {
    fn char_width(&self, font: &FontDescriptor, ch: char) -> f64 {
        let table = if font.bold { &HELVETICA_BOLD } else { &HELVETICA };
        let units = match ch {
            '\u{20}'..='\u{7E}' => table[ch as usize - 0x20],
            '\n' | '\r' | '\u{AD}' => 0,
            '\u{A0}' => table[0],
            _ => 556,
        };
        units as f64 / 1000.0 * font.size
    }

    fn vertical(&self, font: &FontDescriptor) -> (f64, f64, f64) {
        (0.718 * font.size, 0.207 * font.size, 1.2 * font.size)
    }
}

/// Parsed metrics from a TrueType/OpenType font via ttf-parser.
#[derive(Debug, Clone)]
pub struct CustomFontMetrics {
    pub units_per_em: u16,
    pub advance_widths: HashMap<char, u16>,
    pub default_advance: u16,
    pub ascender: i16,
    pub descender: i16,
    pub line_gap: i16,
}

impl CustomFontMetrics {
    /// Parse metrics from font data.
    pub fn from_font_data(data: &[u8]) -> Option<Self> {
        let face = ttf_parser::Face::parse(data, 0).ok()?;
        let units_per_em = face.units_per_em();

        let mut advance_widths = HashMap::new();
        let mut default_advance = 0u16;
        for code in 32u32..=0xFFFF {
            let Some(ch) = char::from_u32(code) else {
                continue;
            };
            if let Some(glyph) = face.glyph_index(ch) {
                let advance = face.glyph_hor_advance(glyph).unwrap_or(0);
                advance_widths.insert(ch, advance);
                if ch == ' ' {
                    default_advance = advance;
                }
            }
        }
        if default_advance == 0 {
            default_advance = units_per_em / 2;
        }

        Some(CustomFontMetrics {
            units_per_em,
            advance_widths,
            default_advance,
            ascender: face.ascender(),
            descender: face.descender(),
            line_gap: face.line_gap(),
        })
    }

    fn scale(&self, units: f64, size: f64) -> f64 {
        units / self.units_per_em as f64 * size
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct FontKey {
    family: String,
    bold: bool,
    italic: bool,
}

impl FontKey {
    fn new(family: &str, bold: bool, italic: bool) -> Self {
        Self {
            family: family.trim().to_ascii_lowercase(),
            bold,
            italic,
        }
    }
}

/// Registry of typefaces with real metrics; falls back to the standard
/// metrics for everything else.
#[derive(Debug, Clone, Default)]
pub struct FontContext {
    faces: HashMap<FontKey, CustomFontMetrics>,
    standard: StandardFontMetrics,
}

impl FontContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a font file for a typeface/style. Returns false when the
    /// data cannot be parsed.
    pub fn register(&mut self, family: &str, bold: bool, italic: bool, data: &[u8]) -> bool {
        match CustomFontMetrics::from_font_data(data) {
            Some(metrics) => {
                self.faces.insert(FontKey::new(family, bold, italic), metrics);
                true
            }
            None => {
                tracing::warn!(family, "font data could not be parsed");
                false
            }
        }
    }

    fn face(&self, font: &FontDescriptor) -> Option<&CustomFontMetrics> {
        self.faces
            .get(&FontKey::new(&font.typeface, font.bold, font.italic))
            .or_else(|| self.faces.get(&FontKey::new(&font.typeface, false, false)))
    }
}

impl FontMetrics for FontContext {
    fn char_width(&self, font: &FontDescriptor, ch: char) -> f64 {
        match self.face(font) {
            Some(face) => {
                if matches!(ch, '\n' | '\r' | '\u{AD}') {
                    return 0.0;
                }
                let advance = face.advance_widths.get(&ch).copied().unwrap_or(face.default_advance);
                face.scale(advance as f64, font.size)
            }
            None => self.standard.char_width(font, ch),
        }
    }

    fn vertical(&self, font: &FontDescriptor) -> (f64, f64, f64) {
        match self.face(font) {
            Some(face) => {
                let ascent = face.scale(face.ascender as f64, font.size);
                let descent = face.scale(-(face.descender as f64), font.size);
                let gap = face.scale(face.line_gap as f64, font.size);
                (ascent, descent, ascent + descent + gap)
            }
            None => self.standard.vertical(font),
        }
    }
}

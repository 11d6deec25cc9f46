//! # Text Layout
//!
//! Line breaking and block measurement for field values, draw text and
//! captions, plus the conversion of rich text (`exData` XHTML) into boxes.
//!
//! Break opportunities come from UAX#14 via `unicode-linebreak`; widths come
//! from whatever [`FontMetrics`] the layout run was given.

use std::collections::BTreeMap;

use unicode_linebreak::{linebreaks, BreakOpportunity};

use crate::dom::props::ParaProps;
use crate::dom::{ns, Dom, NodeId};
use crate::font::{FontDescriptor, FontMetrics};
use crate::layout::{BoxKind, LayoutBox};

/// One line after breaking.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub text: String,
    pub width: f64,
}

/// Break opportunities indexed by char position: entry `i` is the
/// opportunity before char `i`.
fn break_opportunities(text: &str) -> Vec<Option<BreakOpportunity>> {
    let char_count = text.chars().count();
    let mut result = vec![None; char_count];

    let mut byte_to_char = vec![0usize; text.len() + 1];
    for (char_idx, (byte_idx, _)) in text.char_indices().enumerate() {
        byte_to_char[byte_idx] = char_idx;
    }
    byte_to_char[text.len()] = char_count;

    for (byte_offset, opp) in linebreaks(text) {
        let char_idx = byte_to_char[byte_offset];
        if char_idx < char_count {
            result[char_idx] = Some(opp);
        }
    }
    result
}

fn is_newline(ch: char) -> bool {
    matches!(ch, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

fn make_line(chars: &[char], widths: &[f64]) -> Line {
    // Trailing spaces do not count toward the width.
    let mut end = chars.len();
    while end > 0 && chars[end - 1] == ' ' {
        end -= 1;
    }
    Line {
        text: chars[..end].iter().filter(|c| !is_newline(**c)).collect(),
        width: widths[..end].iter().sum(),
    }
}

/// Greedy line breaking. `max_width` of `None` only breaks at mandatory
/// breaks. A word longer than the width is broken between characters.
pub fn wrap(
    metrics: &dyn FontMetrics,
    font: &FontDescriptor,
    text: &str,
    max_width: Option<f64>,
) -> Vec<Line> {
    if text.is_empty() {
        return vec![Line {
            text: String::new(),
            width: 0.0,
        }];
    }

    let chars: Vec<char> = text.chars().collect();
    let widths: Vec<f64> = chars
        .iter()
        .map(|c| if is_newline(*c) { 0.0 } else { metrics.char_width(font, *c) })
        .collect();
    let opportunities = break_opportunities(text);
    let limit = max_width.unwrap_or(f64::INFINITY);

    let mut lines = Vec::new();
    let mut line_start = 0;
    let mut line_width = 0.0;
    let mut last_break: Option<usize> = None;

    for i in 0..chars.len() {
        if i > 0 {
            match opportunities[i] {
                Some(BreakOpportunity::Mandatory) => {
                    lines.push(make_line(&chars[line_start..i], &widths[line_start..i]));
                    line_start = i;
                    line_width = 0.0;
                    last_break = None;
                }
                Some(BreakOpportunity::Allowed) => last_break = Some(i),
                None => {}
            }
        }
        if is_newline(chars[i]) {
            continue;
        }

        let width = widths[i];
        let fits = line_width + width <= limit || chars[i] == ' ';
        if !fits && line_start < i {
            let break_at = match last_break {
                Some(bp) if bp > line_start => bp,
                _ => i,
            };
            lines.push(make_line(&chars[line_start..break_at], &widths[line_start..break_at]));
            line_start = break_at;
            line_width = widths[line_start..i].iter().sum();
            last_break = None;
        }
        line_width += width;
    }

    // A trailing newline closes the last line without opening another.
    let tail_is_break = line_start == chars.len() - 1 && is_newline(chars[line_start]);
    if line_start < chars.len() && !tail_is_break {
        lines.push(make_line(&chars[line_start..], &widths[line_start..]));
    }
    if lines.is_empty() {
        lines.push(Line {
            text: String::new(),
            width: 0.0,
        });
    }
    lines
}

/// A measured paragraph.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub lines: Vec<Line>,
    pub width: f64,
    pub height: f64,
}

/// Wrap `text` and compute its extent including paragraph spacing.
pub fn measure_block(
    metrics: &dyn FontMetrics,
    font: &FontDescriptor,
    para: &ParaProps,
    text: &str,
    max_width: Option<f64>,
) -> TextBlock {
    let insets = para.margin_left + para.margin_right;
    let inner = max_width.map(|w| (w - insets - para.text_indent).max(0.0));
    let lines = wrap(metrics, font, text, inner);
    let line_height = para.line_height.unwrap_or_else(|| metrics.vertical(font).2);
    let widest = lines.iter().map(|l| l.width).fold(0.0, f64::max);
    TextBlock {
        width: widest + insets + para.text_indent,
        height: lines.len() as f64 * line_height + para.space_above + para.space_below,
        lines,
    }
}

/// Rich text converted for layout.
#[derive(Debug, Clone, PartialEq)]
pub struct RichText {
    /// Plain text with paragraph and `<br>` boundaries as newlines; used for
    /// measurement.
    pub text: String,
    /// Box tree mirroring the markup.
    pub root: LayoutBox,
}

/// Converts an `exData` subtree into boxes.
pub trait RichTextConverter {
    fn convert(&self, dom: &Dom, ex_data: NodeId) -> RichText;
}

/// Default converter for XHTML `body`/`p`/`span`/`br` markup.
#[derive(Debug, Clone, Copy, Default)]
pub struct XhtmlConverter;

fn parse_style(raw: &str) -> BTreeMap<String, String> {
    raw.split(';')
        .filter_map(|decl| decl.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .collect()
}

impl XhtmlConverter {
    fn walk(&self, dom: &Dom, id: NodeId, text: &mut String) -> Option<LayoutBox> {
        let node = dom.node(id);
        if node.is_text() {
            let content = dom.text(id);
            text.push_str(&content);
            let mut leaf = LayoutBox::new(BoxKind::Text);
            leaf.text = Some(content);
            return Some(leaf);
        }
        if node.namespace != ns::XHTML {
            return None;
        }

        let kind = match node.name.as_str() {
            "br" => {
                text.push('\n');
                return Some(LayoutBox::new(BoxKind::LineBreak));
            }
            "p" | "div" | "li" => BoxKind::Paragraph,
            "html" | "body" => BoxKind::Text,
            _ => BoxKind::Span,
        };
        let mut out = LayoutBox::new(kind);
        if let Some(style) = dom.attr(id, "style") {
            out.style = parse_style(style);
        }
        if !matches!(node.name.as_str(), "span" | "html" | "body" | "p" | "div" | "li") {
            out.style.insert("element".into(), node.name.clone());
        }
        if kind == BoxKind::Paragraph && !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        for &child in dom.children(id) {
            if let Some(child_box) = self.walk(dom, child, text) {
                out.children.push(child_box);
            }
        }
        Some(out)
    }
}

impl RichTextConverter for XhtmlConverter {
    fn convert(&self, dom: &Dom, ex_data: NodeId) -> RichText {
        let mut text = String::new();
        let mut root = LayoutBox::new(BoxKind::Text);
        for &child in dom.children(ex_data) {
            if let Some(child_box) = self.walk(dom, child, &mut text) {
                root.children.push(child_box);
            }
        }
        if root.children.is_empty() {
            text = dom.text(ex_data);
            root.text = Some(text.clone());
        }
        RichText { text, root }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::StandardFontMetrics;
    use crate::loader::parse_xdp;

    fn font() -> FontDescriptor {
        FontDescriptor {
            typeface: "Helvetica".into(),
            size: 10.0,
            bold: false,
            italic: false,
        }
    }

    #[test]
    fn single_line() {
        let lines = wrap(&StandardFontMetrics, &font(), "Hello", Some(200.0));
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "Hello");
    }

    #[test]
    fn breaks_at_spaces() {
        let lines = wrap(&StandardFontMetrics, &font(), "Hello brave new World", Some(40.0));
        assert!(lines.len() >= 3);
        assert_eq!(lines[0].text, "Hello");
        assert!(lines.iter().all(|l| l.width <= 40.0));
    }

    #[test]
    fn explicit_newlines() {
        let lines = wrap(&StandardFontMetrics, &font(), "a\nb\n", None);
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[test]
    fn long_words_are_forced_apart() {
        let lines = wrap(&StandardFontMetrics, &font(), "WWWWWWWW", Some(20.0));
        assert!(lines.len() > 1);
        let joined: String = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(joined, "WWWWWWWW");
    }

    #[test]
    fn block_height_counts_lines_and_spacing() {
        let para = ParaProps {
            space_above: 2.0,
            space_below: 3.0,
            ..ParaProps::default()
        };
        let block = measure_block(&StandardFontMetrics, &font(), &para, "one\ntwo", None);
        assert_eq!(block.lines.len(), 2);
        assert!((block.height - (2.0 * 12.0 + 5.0)).abs() < 1e-9);
    }

    #[test]
    fn xhtml_converts_to_boxes() {
        let xml = r#"<xdp:xdp xmlns:xdp="http://ns.adobe.com/xdp/">
<template xmlns="http://www.xfa.org/schema/xfa-template/3.3/"><subform name="f"><draw name="d"><value>
<exData contentType="text/html"><body xmlns="http://www.w3.org/1999/xhtml"><p>One <span style="font-weight:bold">two</span></p><p>three<br/>four</p></body></exData>
</value></draw></subform></template></xdp:xdp>"#;
        let dom = parse_xdp(xml).unwrap();
        let draw = dom.children(dom.root_subform().unwrap())[0];
        let ex_data = dom.value_node(draw).unwrap();
        let rich = XhtmlConverter.convert(&dom, ex_data);
        assert_eq!(rich.text, "One two\nthree\nfour");
        let body = &rich.root.children[0];
        assert_eq!(body.children.len(), 2);
        let span = &body.children[0].children[1];
        assert_eq!(span.kind, BoxKind::Span);
        assert_eq!(span.style.get("font-weight").map(String::as_str), Some("bold"));
    }
}

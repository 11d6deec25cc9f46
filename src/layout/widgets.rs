//! Field and draw presentation: which control a field shows, what text it
//! displays, and how caption and value share the box.

use crate::dom::props::{CaptionPlacement, Presence};
use crate::dom::{Dom, NodeId, Tag};

use super::measure::{LeafContent, LeafMetrics};
use super::{BoxKind, ChoiceOption, Container, LayoutBox, LayoutEngine, Widget};

/// Style hint for nodes that take space but are not drawn.
pub fn presence_hint(dom: &Dom, node: NodeId) -> Option<&'static str> {
    (dom.presence(node) == Presence::Invisible).then_some("hidden")
}

/// The widget element of a field's `<ui>`; without one the control is
/// inferred from the number of `<items>` lists.
pub fn widget_tag(dom: &Dom, field: NodeId) -> Tag {
    let declared = dom.first_child_by_tag(field, Tag::Ui).and_then(|ui| {
        dom.children(ui)
            .iter()
            .copied()
            .map(|c| dom.tag(c))
            .find(|t| t.is_widget())
    });
    declared.unwrap_or_else(|| match dom.children_by_tag(field, Tag::Items).count() {
        0 => Tag::TextEdit,
        1 => Tag::CheckButton,
        _ => Tag::ChoiceList,
    })
}

/// Display/save pairs of a choice list. The list flagged `save="1"` holds
/// the saved values; without one the second list does.
pub fn choice_options(dom: &Dom, field: NodeId) -> Vec<ChoiceOption> {
    let lists: Vec<NodeId> = dom.children_by_tag(field, Tag::Items).collect();
    let save_index = lists
        .iter()
        .position(|l| dom.flag(*l, "save"))
        .or(if lists.len() > 1 { Some(1) } else { None });
    let display_index = (0..lists.len()).find(|i| Some(*i) != save_index);

    let display = display_index.map(|i| dom.items(field, i)).unwrap_or_default();
    let save = save_index.map(|i| dom.items(field, i));
    match save {
        Some(save) => save
            .into_iter()
            .enumerate()
            .map(|(i, save)| ChoiceOption {
                display: display.get(i).cloned().unwrap_or_else(|| save.clone()),
                save,
            })
            .collect(),
        None => display
            .into_iter()
            .map(|d| ChoiceOption {
                display: d.clone(),
                save: d,
            })
            .collect(),
    }
}

/// Value of a field split into selected entries.
fn selected_values(dom: &Dom, field: NodeId) -> Vec<String> {
    dom.value_text(field)
        .map(|v| {
            v.split('\n')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub fn field_widget(dom: &Dom, field: NodeId) -> Widget {
    match widget_tag(dom, field) {
        Tag::CheckButton => {
            let on_value = dom
                .items(field, 0)
                .into_iter()
                .next()
                .unwrap_or_else(|| "1".to_string());
            let value = dom.value_text(field).unwrap_or_default();
            Widget::CheckButton {
                checked: !value.is_empty() && value.trim() == on_value,
                on_value,
            }
        }
        Tag::ChoiceList => Widget::ChoiceList {
            options: choice_options(dom, field),
            selected: selected_values(dom, field),
            multi_select: dom.is_multi_select(field),
        },
        Tag::Button => Widget::Button {
            url: launch_url(dom, field),
        },
        Tag::NumericEdit => Widget::NumericEdit,
        Tag::DateTimeEdit => Widget::DateTimeEdit,
        Tag::PasswordEdit => Widget::PasswordEdit,
        Tag::ImageEdit => Widget::ImageEdit,
        Tag::Signature => Widget::Signature,
        Tag::Barcode => Widget::Barcode,
        _ => {
            let multi_line = dom
                .first_child_by_tag(field, Tag::Ui)
                .and_then(|ui| dom.first_child_by_tag(ui, Tag::TextEdit))
                .is_some_and(|edit| dom.flag(edit, "multiLine"));
            Widget::TextEdit { multi_line }
        }
    }
}

/// Text a field shows for its current value.
pub fn display_text(dom: &Dom, field: NodeId, widget: &Widget) -> String {
    match widget {
        Widget::ChoiceList {
            options, selected, ..
        } => selected
            .iter()
            .map(|value| {
                options
                    .iter()
                    .find(|o| &o.save == value)
                    .map_or(value.as_str(), |o| o.display.as_str())
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Widget::PasswordEdit => {
            let len = dom.value_text(field).map_or(0, |v| v.chars().count());
            "*".repeat(len)
        }
        Widget::CheckButton { .. } | Widget::Button { .. } => String::new(),
        _ => dom.value_text(field).unwrap_or_default(),
    }
}

fn is_allowed_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    ["http://", "https://", "mailto:", "www."]
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

/// First string literal passed to `app.launchURL` in `script`.
pub fn parse_launch_url(script: &str) -> Option<String> {
    let start = script.find("app.launchURL")?;
    let rest = script[start + "app.launchURL".len()..].trim_start();
    let rest = rest.strip_prefix('(')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let body = &rest[1..];
    let end = body.find(quote)?;
    let url = body[..end].trim();
    is_allowed_url(url).then(|| url.to_string())
}

/// URL opened when the button is clicked, when it is a plain literal.
pub fn launch_url(dom: &Dom, field: NodeId) -> Option<String> {
    dom.children_by_tag(field, Tag::Event)
        .filter(|e| dom.attr(*e, "activity") == Some("click"))
        .filter_map(|e| dom.first_child_by_tag(e, Tag::Script))
        .find_map(|script| parse_launch_url(&dom.text(script)))
}

fn text_box(text: String, x: f64, y: f64, width: f64, height: f64) -> LayoutBox {
    let mut out = LayoutBox::new(BoxKind::Text);
    out.x = x;
    out.y = y;
    out.width = width;
    out.height = height;
    out.text = Some(text);
    out
}

fn joined(lines: &[crate::text::Line]) -> String {
    lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

impl LayoutEngine<'_> {
    /// Assemble the box of a measured field or draw.
    pub(crate) fn leaf_box(&self, node: NodeId, kind: Container, metrics: LeafMetrics) -> LayoutBox {
        let dom = self.dom;
        let mut out = LayoutBox::new(if kind == Container::Field {
            BoxKind::Field
        } else {
            BoxKind::Draw
        });
        out.width = metrics.width;
        out.height = metrics.height;
        self.identify(node, &mut out);
        if kind == Container::Draw {
            out.data = None;
        }

        let font = &metrics.font;
        out.style.insert("font-family".into(), font.typeface.clone());
        out.style.insert("font-size".into(), format!("{}pt", font.size));
        if font.bold {
            out.style.insert("font-weight".into(), "bold".into());
        }
        if font.italic {
            out.style.insert("font-style".into(), "italic".into());
        }
        if let Some(para) = dom.first_child_by_tag(node, Tag::Para) {
            if let Some(align) = dom.attr(para, "hAlign") {
                out.style.insert("text-align".into(), align.to_string());
            }
            if let Some(align) = dom.attr(para, "vAlign") {
                out.style.insert("vertical-align".into(), align.to_string());
            }
        }
        let para = &metrics.para;
        if para.text_indent != 0.0 {
            out.style.insert("text-indent".into(), format!("{}pt", para.text_indent));
        }
        if let Some(line_height) = para.line_height {
            out.style.insert("line-height".into(), format!("{}pt", line_height));
        }

        let margins = metrics.margins;
        let (mut x, mut y) = (margins.left, margins.top);
        let mut w = (metrics.width - margins.horizontal()).max(0.0);
        let mut h = (metrics.height - margins.vertical()).max(0.0);

        if let Some(caption) = &metrics.caption {
            let reserve = caption.reserve;
            let (cx, cy, cw, ch) = match caption.placement {
                CaptionPlacement::Left | CaptionPlacement::Inline => {
                    let frame = (x, y, reserve, h);
                    x += reserve;
                    w = (w - reserve).max(0.0);
                    frame
                }
                CaptionPlacement::Right => {
                    w = (w - reserve).max(0.0);
                    (x + w, y, reserve, h)
                }
                CaptionPlacement::Top => {
                    let frame = (x, y, w, reserve);
                    y += reserve;
                    h = (h - reserve).max(0.0);
                    frame
                }
                CaptionPlacement::Bottom => {
                    h = (h - reserve).max(0.0);
                    (x, y + h, w, reserve)
                }
            };
            let mut caption_box = LayoutBox::new(BoxKind::Caption);
            caption_box.x = cx;
            caption_box.y = cy;
            caption_box.width = cw;
            caption_box.height = ch;
            caption_box.node = Some(caption.node);
            if caption.font != metrics.font {
                caption_box
                    .style
                    .insert("font-family".into(), caption.font.typeface.clone());
                caption_box
                    .style
                    .insert("font-size".into(), format!("{}pt", caption.font.size));
            }
            let label = joined(&caption.block.lines);
            if let Some(Widget::Button { url: Some(url) }) = &metrics.widget {
                let mut link = LayoutBox::new(BoxKind::Link);
                link.width = cw;
                link.height = ch;
                link.style.insert("href".into(), url.clone());
                link.children.push(text_box(label, 0.0, 0.0, cw, ch));
                caption_box.children.push(link);
            } else if !label.is_empty() {
                caption_box.children.push(text_box(label, 0.0, 0.0, cw, ch));
            }
            out.children.push(caption_box);
        } else if let Some(Widget::Button { url: Some(url) }) = &metrics.widget {
            let mut link = LayoutBox::new(BoxKind::Link);
            link.x = x;
            link.y = y;
            link.width = w;
            link.height = h;
            link.style.insert("href".into(), url.clone());
            out.children.push(link);
        }

        match metrics.content {
            LeafContent::Text(block) => {
                let text = joined(&block.lines);
                out.text = Some(text.clone());
                out.children.push(text_box(text, x, y, w, h));
            }
            LeafContent::Rich { rich, .. } => {
                out.text = Some(rich.text);
                let mut root = rich.root;
                root.x = x;
                root.y = y;
                root.width = w;
                root.height = h;
                out.children.push(root);
            }
            LeafContent::Image { href, content_type } => {
                let mut image = LayoutBox::new(BoxKind::Image);
                image.x = x;
                image.y = y;
                image.width = w;
                image.height = h;
                if let Some(href) = href {
                    image.style.insert("href".into(), href);
                }
                if let Some(content_type) = content_type {
                    image.style.insert("content-type".into(), content_type);
                }
                out.children.push(image);
            }
            LeafContent::Graphic(tag) => {
                let mut shape = LayoutBox::new(match tag {
                    Tag::Line => BoxKind::Line,
                    Tag::Arc => BoxKind::Arc,
                    _ => BoxKind::Rectangle,
                });
                shape.x = x;
                shape.y = y;
                shape.width = w;
                shape.height = h;
                out.children.push(shape);
            }
            LeafContent::None => {}
        }

        out.widget = metrics.widget;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_xdp;

    fn field(body: &str) -> (Dom, NodeId) {
        let xml = format!(
            r#"<xdp:xdp xmlns:xdp="http://ns.adobe.com/xdp/">
<template xmlns="http://www.xfa.org/schema/xfa-template/3.3/"><subform name="root"><field name="f">{}</field></subform></template>
</xdp:xdp>"#,
            body
        );
        let dom = parse_xdp(&xml).unwrap();
        let root = dom.root_subform().unwrap();
        let f = dom.first_child_by_tag(root, Tag::Field).unwrap();
        (dom, f)
    }

    #[test]
    fn widget_inferred_from_items() {
        let (dom, f) = field("");
        assert_eq!(widget_tag(&dom, f), Tag::TextEdit);
        let (dom, f) = field("<items><text>on</text></items>");
        assert_eq!(widget_tag(&dom, f), Tag::CheckButton);
        let (dom, f) = field("<items><text>A</text></items><items><text>a</text></items>");
        assert_eq!(widget_tag(&dom, f), Tag::ChoiceList);
        let (dom, f) = field("<ui><numericEdit/></ui><items><text>on</text></items>");
        assert_eq!(widget_tag(&dom, f), Tag::NumericEdit);
    }

    #[test]
    fn check_button_state_follows_on_value() {
        let (dom, f) = field(
            "<ui><checkButton/></ui><items><text>yes</text><text>no</text></items><value><text>yes</text></value>",
        );
        assert_eq!(
            field_widget(&dom, f),
            Widget::CheckButton {
                checked: true,
                on_value: "yes".into()
            }
        );
    }

    #[test]
    fn choice_list_displays_labels() {
        let (dom, f) = field(
            r#"<ui><choiceList/></ui><items><text>Red</text><text>Blue</text></items>
<items save="1"><text>r</text><text>b</text></items><value><text>b</text></value>"#,
        );
        let widget = field_widget(&dom, f);
        assert_eq!(display_text(&dom, f, &widget), "Blue");
        let Widget::ChoiceList { options, .. } = widget else {
            panic!("expected a choice list");
        };
        assert_eq!(options[0], ChoiceOption { display: "Red".into(), save: "r".into() });
    }

    #[test]
    fn password_is_masked() {
        let (dom, f) = field("<ui><passwordEdit/></ui><value><text>abc</text></value>");
        let widget = field_widget(&dom, f);
        assert_eq!(display_text(&dom, f, &widget), "***");
    }

    #[test]
    fn launch_url_literals() {
        assert_eq!(
            parse_launch_url(r#"app.launchURL("https://example.com/a", true);"#),
            Some("https://example.com/a".to_string())
        );
        assert_eq!(
            parse_launch_url("app.launchURL( 'mailto:x@example.com' )"),
            Some("mailto:x@example.com".to_string())
        );
        assert_eq!(parse_launch_url(r#"app.launchURL("javascript:alert(1)")"#), None);
        assert_eq!(parse_launch_url("app.launchURL(url)"), None);
    }

    #[test]
    fn button_click_event_yields_url() {
        let (dom, f) = field(
            r#"<ui><button/></ui><event activity="click"><script contentType="application/x-javascript">app.launchURL("www.example.com", true);</script></event>"#,
        );
        assert_eq!(
            field_widget(&dom, f),
            Widget::Button {
                url: Some("www.example.com".into())
            }
        );
    }
}

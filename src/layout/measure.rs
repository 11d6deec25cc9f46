//! Dimension resolution.
//!
//! Declared `w`/`h` always win. Otherwise a node is as large as its content
//! (wrapped text, rich text, or placed children) plus its caption reserve
//! and margins, clamped to `minW`/`maxW`/`minH`/`maxH`.

use crate::dom::props::{CaptionPlacement, LayoutKind, Margins, ParaProps};
use crate::dom::{NodeId, Tag};
use crate::font::FontDescriptor;
use crate::text::{measure_block, RichText, TextBlock};

use super::widgets;
use super::{BBox, BoxKind, LayoutBox, LayoutEngine, Scratch, Widget};

/// Position and size as written on the node.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct Declared {
    pub x: f64,
    pub y: f64,
    pub w: Option<f64>,
    pub h: Option<f64>,
}

pub(crate) fn clamp(value: f64, min: Option<f64>, max: Option<f64>) -> f64 {
    let capped = max.map_or(value, |m| value.min(m));
    min.map_or(capped, |m| capped.max(m))
}

/// A measured caption.
#[derive(Debug, Clone)]
pub(crate) struct CaptionBlock {
    pub node: NodeId,
    pub placement: CaptionPlacement,
    /// Space taken along the placement axis.
    pub reserve: f64,
    pub block: TextBlock,
    pub font: FontDescriptor,
}

/// What sits in the value area of a field or draw.
#[derive(Debug, Clone)]
pub(crate) enum LeafContent {
    None,
    Text(TextBlock),
    Rich { rich: RichText, block: TextBlock },
    Image {
        href: Option<String>,
        content_type: Option<String>,
    },
    Graphic(Tag),
}

/// Everything needed to build the box of a field or draw.
#[derive(Debug, Clone)]
pub(crate) struct LeafMetrics {
    pub width: f64,
    pub height: f64,
    pub margins: Margins,
    pub caption: Option<CaptionBlock>,
    pub content: LeafContent,
    pub font: FontDescriptor,
    pub para: ParaProps,
    pub widget: Option<Widget>,
}

impl LayoutEngine<'_> {
    pub(crate) fn declared(&self, node: NodeId) -> Declared {
        let dom = self.dom;
        Declared {
            x: dom.measure(node, "x").unwrap_or(0.0),
            y: dom.measure(node, "y").unwrap_or(0.0),
            w: dom.measure(node, "w"),
            h: dom.measure(node, "h"),
        }
    }

    fn font_of(&self, node: NodeId) -> FontDescriptor {
        FontDescriptor::resolve(&self.dom.font_props(node), &self.config)
    }

    /// Anchor the box at its declared position and report the frame the
    /// parent should account for.
    pub(crate) fn place(&self, node: NodeId, declared: &Declared, content: &mut LayoutBox) -> BBox {
        let (ox, oy) = self.dom.anchor(node).offsets();
        content.x = declared.x - ox * content.width;
        content.y = declared.y - oy * content.height;
        let rotate = self.dom.rotate(node);
        let (width, height) = if rotate == 90 || rotate == 270 {
            (content.height, content.width)
        } else {
            (content.width, content.height)
        };
        if rotate != 0 {
            content.style.insert("rotate".into(), rotate.to_string());
        }
        BBox {
            x: content.x,
            y: content.y,
            width,
            height,
        }
    }

    /// Build a container box from its placed children. A `fragment` is the
    /// part of a split container that went into one content area; it is
    /// sized to what it holds.
    pub(crate) fn container_box(
        &self,
        node: NodeId,
        scratch: &mut Scratch,
        declared: &Declared,
        fragment: bool,
    ) -> LayoutBox {
        let dom = self.dom;
        self.commit_line(scratch);
        let margins = scratch.margins;
        let mut children = std::mem::take(&mut scratch.children);

        if scratch.layout == LayoutKind::RlRow {
            let total = if scratch.columns.is_empty() {
                scratch.width
            } else {
                scratch.columns.iter().sum()
            };
            for child in &mut children {
                child.x = total - child.x - child.width;
            }
        }
        for child in &mut children {
            child.x += margins.left;
            child.y += margins.top;
        }

        let content_width = scratch.width + margins.horizontal();
        let content_height = scratch.height + margins.vertical();
        let width = declared.w.unwrap_or_else(|| {
            clamp(content_width, dom.measure(node, "minW"), dom.measure(node, "maxW"))
        });
        let height = match declared.h {
            Some(h) if !fragment => h,
            _ if fragment => content_height,
            _ => clamp(content_height, dom.measure(node, "minH"), dom.measure(node, "maxH")),
        };

        let kind = match dom.tag(node) {
            Tag::Area => BoxKind::Area,
            Tag::ExclGroup => BoxKind::ExclGroup,
            _ => BoxKind::Subform,
        };
        let mut out = LayoutBox::new(kind);
        out.width = width;
        out.height = height;
        out.children = children;
        self.identify(node, &mut out);
        out
    }

    /// Node id, data id, name and presence hints shared by all node boxes.
    pub(crate) fn identify(&self, node: NodeId, out: &mut LayoutBox) {
        let dom = self.dom;
        out.node = Some(node);
        out.data = dom.node(node).binding;
        out.name = dom.name_attr(node).map(str::to_string);
        if let Some(hint) = widgets::presence_hint(dom, node) {
            out.style.insert("visibility".into(), hint.into());
        }
    }

    fn measure_caption(&self, owner: NodeId) -> Option<CaptionBlock> {
        let dom = self.dom;
        let caption = dom.caption(owner)?;
        let font = if dom.first_child_by_tag(caption.node, Tag::Font).is_some() {
            self.font_of(caption.node)
        } else {
            self.font_of(owner)
        };
        let para = dom.para(caption.node);
        let text = match dom.value_node(caption.node) {
            Some(v) if dom.tag(v) == Tag::ExData => self.rich.convert(dom, v).text,
            Some(v) => dom.text(v),
            None => String::new(),
        };
        let wrap = match caption.placement {
            CaptionPlacement::Left | CaptionPlacement::Right => caption.reserve,
            _ => None,
        };
        let block = measure_block(self.fonts, &font, &para, &text, wrap);
        let reserve = caption.reserve.unwrap_or(match caption.placement {
            CaptionPlacement::Top | CaptionPlacement::Bottom => block.height,
            _ => block.width,
        });
        Some(CaptionBlock {
            node: caption.node,
            placement: caption.placement,
            reserve,
            block,
            font,
        })
    }

    /// Measure a field or draw. `wrap_hint` is the width text may wrap at
    /// when the node declares no width of its own.
    pub(crate) fn measure_leaf(&self, node: NodeId, wrap_hint: Option<f64>) -> LeafMetrics {
        let dom = self.dom;
        let declared = self.declared(node);
        let margins = dom.margins(node);
        let font = self.font_of(node);
        let para = dom.para(node);
        let is_field = dom.tag(node) == Tag::Field;
        let widget = is_field.then(|| widgets::field_widget(dom, node));
        let caption = self.measure_caption(node);

        let side_reserve = match &caption {
            Some(c) if !matches!(c.placement, CaptionPlacement::Top | CaptionPlacement::Bottom) => {
                c.reserve
            }
            _ => 0.0,
        };
        let outer = declared.w.or_else(|| dom.measure(node, "maxW")).or(wrap_hint);
        let wrap = outer.map(|w| (w - margins.horizontal() - side_reserve).max(0.0));

        let content = match dom.value_node(node) {
            Some(v) if dom.tag(v) == Tag::ExData => {
                let rich = self.rich.convert(dom, v);
                let block = measure_block(self.fonts, &font, &para, &rich.text, wrap);
                LeafContent::Rich { rich, block }
            }
            Some(v) if dom.tag(v) == Tag::Image => LeafContent::Image {
                href: dom.attr(v, "href").map(str::to_string),
                content_type: dom.attr(v, "contentType").map(str::to_string),
            },
            Some(v) if matches!(dom.tag(v), Tag::Line | Tag::Rectangle | Tag::Arc) => {
                LeafContent::Graphic(dom.tag(v))
            }
            _ => match &widget {
                Some(Widget::CheckButton { .. }) | Some(Widget::Button { .. }) => LeafContent::None,
                Some(w) => {
                    let text = widgets::display_text(dom, node, w);
                    LeafContent::Text(measure_block(self.fonts, &font, &para, &text, wrap))
                }
                None => match dom.value_text(node) {
                    Some(text) if !text.is_empty() => {
                        LeafContent::Text(measure_block(self.fonts, &font, &para, &text, wrap))
                    }
                    _ => LeafContent::None,
                },
            },
        };

        let (content_width, content_height) = match &content {
            LeafContent::Text(block) | LeafContent::Rich { block, .. } => (block.width, block.height),
            LeafContent::Image { .. } | LeafContent::Graphic(_) | LeafContent::None => {
                match &widget {
                    Some(Widget::CheckButton { .. }) => {
                        let size = self.fonts.vertical(&font).2;
                        (size, size)
                    }
                    _ => (0.0, 0.0),
                }
            }
        };
        let (inner_width, inner_height) = match &caption {
            None => (content_width, content_height),
            Some(c) => match c.placement {
                CaptionPlacement::Top | CaptionPlacement::Bottom => (
                    content_width.max(c.block.width),
                    content_height + c.reserve,
                ),
                _ => (
                    content_width + c.reserve,
                    content_height.max(c.block.height),
                ),
            },
        };

        let width = declared.w.unwrap_or_else(|| {
            clamp(
                inner_width + margins.horizontal(),
                dom.measure(node, "minW"),
                dom.measure(node, "maxW"),
            )
        });
        let height = declared.h.unwrap_or_else(|| {
            clamp(
                inner_height + margins.vertical(),
                dom.measure(node, "minH"),
                dom.measure(node, "maxH"),
            )
        });

        LeafMetrics {
            width,
            height,
            margins,
            caption,
            content,
            font,
            para,
            widget,
        }
    }
}

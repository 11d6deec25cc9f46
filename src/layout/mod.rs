//! # Layout Engine
//!
//! Turns a bound template subtree into positioned boxes, one content area at
//! a time. The paginator hands the engine the space of a content area and
//! asks it to lay out the root subform; the engine answers with a
//! [`LayoutResult`]:
//!
//! - `Success`: everything left fitted.
//! - `Failure`: the area filled up. Splittable containers keep their place
//!   in a side table so the next area resumes where this one stopped; the
//!   paginator collects what was placed with [`LayoutEngine::flush`].
//! - `Break`: a `breakBefore`/`breakAfter` fired and the paginator must move
//!   to another area or page.
//! - `Empty`: nothing to draw (hidden or inactive).
//!
//! ## Fitting
//!
//! Every container asks its parent whether it fits before doing any work
//! (see [`flow`]). Line-filling layouts retry a child that did not fit on a
//! fresh line, up to `max_lrtb_attempts`. The first unsplittable node of a
//! content area is placed in no-failure mode: it lands whole even if it
//! overflows, so a node taller than any area cannot stall pagination.
//!
//! Scratch state never touches the tree. It lives in a map keyed by
//! [`NodeId`] owned by the engine, which lives as long as one pagination run.

pub mod flow;
pub mod measure;
pub mod page_break;
pub mod widgets;

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::config::LayoutConfig;
use crate::dom::props::{KeepIntact, LayoutKind};
use crate::dom::{Dom, NodeId, Tag};
use crate::font::FontMetrics;
use crate::som::SomResolver;
use crate::text::RichTextConverter;

pub use flow::Scratch;
pub use page_break::{BreakDirective, Destination, OverflowDirective};

// ── Output tree ─────────────────────────────────────────────────

/// What a [`LayoutBox`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BoxKind {
    Page,
    ContentArea,
    Subform,
    Area,
    ExclGroup,
    Field,
    Draw,
    Caption,
    Text,
    Paragraph,
    Span,
    LineBreak,
    Link,
    Image,
    Line,
    Rectangle,
    Arc,
}

/// One entry of a choice list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoiceOption {
    pub display: String,
    pub save: String,
}

/// The interactive control a field presents.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Widget {
    TextEdit {
        #[serde(rename = "multiLine")]
        multi_line: bool,
    },
    NumericEdit,
    DateTimeEdit,
    PasswordEdit,
    CheckButton {
        checked: bool,
        #[serde(rename = "onValue")]
        on_value: String,
    },
    ChoiceList {
        options: Vec<ChoiceOption>,
        selected: Vec<String>,
        #[serde(rename = "multiSelect")]
        multi_select: bool,
    },
    Button {
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    ImageEdit,
    Signature,
    Barcode,
}

/// A positioned box. `x`/`y` are relative to the parent box.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutBox {
    pub kind: BoxKind,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Template node the box was produced from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeId>,
    /// Data node bound to that template node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Presentation hints (font, alignment, visibility, ...).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub style: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub widget: Option<Widget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<LayoutBox>,
}

impl LayoutBox {
    pub fn new(kind: BoxKind) -> Self {
        Self {
            kind,
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            node: None,
            data: None,
            name: None,
            style: BTreeMap::new(),
            widget: None,
            text: None,
            children: Vec::new(),
        }
    }

    /// Visit the box and all its descendants, depth first.
    pub fn walk<'b>(&'b self, visit: &mut dyn FnMut(&'b LayoutBox)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// All boxes (self included) carrying `name`, in document order.
    pub fn find_named(&self, name: &str) -> Vec<&LayoutBox> {
        let mut found = Vec::new();
        self.walk(&mut |b| {
            if b.name.as_deref() == Some(name) {
                found.push(b);
            }
        });
        found
    }
}

/// Frame of a laid-out node as its parent should see it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BBox {
    pub fn of(content: &LayoutBox) -> Self {
        Self {
            x: content.x,
            y: content.y,
            width: content.width,
            height: content.height,
        }
    }
}

/// Space offered to a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Space {
    pub width: f64,
    pub height: f64,
}

/// Outcome of laying out one node.
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutResult {
    Success { content: LayoutBox, bbox: BBox },
    Empty,
    Failure,
    /// A break directive fired. `content` is the finished box of the
    /// container whose `breakAfter` fired, if any.
    Break {
        directive: BreakDirective,
        content: Option<LayoutBox>,
    },
}

/// The node kinds layout knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Area,
    Subform,
    SubformSet,
    ExclGroup,
    Field,
    Draw,
    PageArea,
    PageSet,
    ContentArea,
}

impl Container {
    pub fn of(tag: Tag) -> Option<Container> {
        Some(match tag {
            Tag::Area => Container::Area,
            Tag::Subform => Container::Subform,
            Tag::SubformSet => Container::SubformSet,
            Tag::ExclGroup => Container::ExclGroup,
            Tag::Field => Container::Field,
            Tag::Draw => Container::Draw,
            Tag::PageArea => Container::PageArea,
            Tag::PageSet => Container::PageSet,
            Tag::ContentArea => Container::ContentArea,
            _ => return None,
        })
    }

    /// Kinds that take part in the content flow.
    pub fn flows(self) -> bool {
        !matches!(
            self,
            Container::PageArea | Container::PageSet | Container::ContentArea
        )
    }
}

/// What a child needs to know about the container placing it.
#[derive(Debug, Clone, Default)]
pub struct Parent {
    pub node: Option<NodeId>,
    /// `None` for the root, which is placed unconditionally.
    pub layout: Option<LayoutKind>,
    pub attempt: usize,
    pub number_in_line: usize,
    /// Some ancestor line still has room to the right.
    pub more_width: bool,
    /// Full inner width of the container.
    pub width: f64,
    /// Column widths a table hands to its rows.
    pub columns: Vec<f64>,
}

impl Parent {
    pub fn none() -> Self {
        Self::default()
    }
}

#[derive(Debug, Default)]
struct RunState {
    scratch: HashMap<NodeId, Scratch>,
    fired: HashSet<NodeId>,
    first_unsplittable: Option<NodeId>,
    no_layout_failure: bool,
    page_area: Option<NodeId>,
    content_area: Option<NodeId>,
    area_height: f64,
    overflow: Option<OverflowDirective>,
}

/// Lays out bound template nodes. One engine serves one pagination run.
pub struct LayoutEngine<'a> {
    dom: &'a Dom,
    som: &'a SomResolver,
    config: LayoutConfig,
    fonts: &'a dyn FontMetrics,
    rich: &'a dyn RichTextConverter,
    state: RunState,
}

impl<'a> LayoutEngine<'a> {
    pub fn new(
        dom: &'a Dom,
        som: &'a SomResolver,
        config: LayoutConfig,
        fonts: &'a dyn FontMetrics,
        rich: &'a dyn RichTextConverter,
    ) -> Self {
        Self {
            dom,
            som,
            config,
            fonts,
            rich,
            state: RunState::default(),
        }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Start filling a new content area.
    pub fn begin_area(&mut self, page_area: NodeId, content_area: Option<NodeId>, height: f64) {
        self.state.page_area = Some(page_area);
        self.state.content_area = content_area;
        self.state.area_height = height;
        self.state.first_unsplittable = None;
        self.state.no_layout_failure = false;
    }

    /// Lay out (or resume) the root subform in the current content area.
    pub fn layout_root(&mut self, root: NodeId, space: Space) -> LayoutResult {
        self.layout_node(root, &Parent::none(), space)
    }

    pub fn layout_node(&mut self, node: NodeId, parent: &Parent, space: Space) -> LayoutResult {
        let Some(kind) = Container::of(self.dom.tag(node)) else {
            return LayoutResult::Empty;
        };
        match kind {
            Container::Subform | Container::SubformSet | Container::Area | Container::ExclGroup => {
                self.layout_container(node, kind, parent, space)
            }
            Container::Field | Container::Draw => self.layout_leaf(node, kind, parent, space),
            Container::PageArea | Container::PageSet | Container::ContentArea => {
                LayoutResult::Empty
            }
        }
    }

    /// Lay out a node outside the flow (leaders, trailers, page-area
    /// furniture). Any resumable state it leaves behind is dropped.
    pub fn layout_standalone(
        &mut self,
        node: NodeId,
        parent: &Parent,
        space: Space,
    ) -> Option<(LayoutBox, BBox)> {
        self.clear_scratch(node);
        let saved = (self.state.first_unsplittable, self.state.no_layout_failure);
        self.state.first_unsplittable = None;
        self.state.no_layout_failure = false;
        let placed = match self.layout_node(node, parent, space) {
            LayoutResult::Success { content, bbox } => Some((content, bbox)),
            LayoutResult::Break {
                content: Some(content),
                ..
            } => {
                let bbox = BBox::of(&content);
                Some((content, bbox))
            }
            _ => None,
        };
        self.clear_scratch(node);
        (self.state.first_unsplittable, self.state.no_layout_failure) = saved;
        placed
    }

    /// Mark a break directive as already handled.
    pub fn mark_fired(&mut self, directive: NodeId) {
        self.state.fired.insert(directive);
    }

    /// Collect what a failed or interrupted container placed so far. The
    /// container keeps its resume position for the next content area.
    pub fn flush(&mut self, node: NodeId) -> Option<LayoutBox> {
        let mut scratch = self.state.scratch.remove(&node)?;
        if let Some(failing) = scratch.failing {
            if let Some(partial) = self.flush(failing) {
                let bbox = BBox::of(&partial);
                let span = self.dom.col_span(failing);
                self.add_box(&mut scratch, partial, bbox, span);
            }
        }
        self.commit_line(&mut scratch);
        let fragment = if scratch.children.is_empty() {
            None
        } else {
            let declared = self.declared(node);
            let mut content = self.container_box(node, &mut scratch, &declared, true);
            content.x = 0.0;
            content.y = 0.0;
            Some(content)
        };
        scratch.reset_fragment();
        self.state.scratch.insert(node, scratch);
        fragment
    }

    /// Whether a layout of `node` is in progress (it was split).
    pub fn is_resuming(&self, node: NodeId) -> bool {
        self.state.scratch.contains_key(&node)
    }

    fn layout_of(&self, node: NodeId) -> LayoutKind {
        match self.dom.tag(node) {
            Tag::Area => LayoutKind::Position,
            Tag::SubformSet => LayoutKind::Tb,
            _ => self.dom.layout_kind(node),
        }
    }

    fn is_splittable(&self, node: NodeId, parent: &Parent) -> bool {
        let dom = self.dom;
        if !matches!(dom.tag(node), Tag::Subform | Tag::SubformSet | Tag::ExclGroup) {
            return false;
        }
        if let Some(h) = dom.measure(node, "h") {
            if self.state.area_height > 0.0 && h >= self.state.area_height {
                return true;
            }
        }
        let layout = self.layout_of(node);
        if layout == LayoutKind::Position || layout.is_row() || layout == LayoutKind::Table {
            return false;
        }
        if dom.keep_intact(node) != KeepIntact::None {
            return false;
        }
        !parent.layout.is_some_and(LayoutKind::is_row)
    }

    fn set_first_unsplittable(&mut self, node: NodeId) {
        if self.state.first_unsplittable.is_none() {
            self.state.first_unsplittable = Some(node);
            self.state.no_layout_failure = true;
        }
    }

    fn unset_first_unsplittable(&mut self, node: NodeId) {
        if self.state.first_unsplittable == Some(node) {
            self.state.no_layout_failure = false;
        }
    }

    fn clear_scratch(&mut self, node: NodeId) {
        self.state.scratch.remove(&node);
        for &child in self.dom.children(node) {
            if Container::of(self.dom.tag(child)).is_some() {
                self.clear_scratch(child);
            }
        }
    }

    fn layout_container(
        &mut self,
        node: NodeId,
        kind: Container,
        parent: &Parent,
        space: Space,
    ) -> LayoutResult {
        let dom = self.dom;
        if !dom.presence(node).takes_space() {
            return LayoutResult::Empty;
        }
        if !self.is_resuming(node) {
            if let Some(directive) = self.pending_break(node, Tag::BreakBefore) {
                return LayoutResult::Break {
                    directive,
                    content: None,
                };
            }
        }

        let splittable = self.is_splittable(node, parent);
        if !splittable {
            self.set_first_unsplittable(node);
        }
        let declared = self.declared(node);
        if !self.check_dimensions(parent, &declared, space, splittable) {
            self.unset_first_unsplittable(node);
            return LayoutResult::Failure;
        }

        let layout = self.layout_of(node);
        let margins = dom.margins(node);
        let outer_width = declared.w.unwrap_or(space.width);
        let outer_height = match declared.h {
            Some(h) if !splittable => h,
            _ => space.height,
        };
        let mut scratch = self
            .state
            .scratch
            .remove(&node)
            .unwrap_or_else(|| Scratch::new(layout, margins));
        scratch.avail = Space {
            width: (outer_width - margins.horizontal()).max(0.0),
            height: (outer_height - margins.vertical()).max(0.0),
        };
        if scratch.columns.is_empty() {
            scratch.columns = self.columns_for(node, layout, parent, scratch.avail.width);
        }
        tracing::trace!(node = node.index(), ?kind, resume = scratch.resume, "layout container");

        let children = dom.children(node);
        while scratch.resume < children.len() {
            let child = children[scratch.resume];
            if !Container::of(dom.tag(child)).is_some_and(Container::flows) {
                scratch.resume += 1;
                continue;
            }
            let context = scratch.context(node, parent);
            let child_space = self.available_space(&scratch, child);
            match self.layout_node(child, &context, child_space) {
                LayoutResult::Success { content, bbox } => {
                    self.add_box(&mut scratch, content, bbox, dom.col_span(child));
                    scratch.resume += 1;
                    scratch.failing = None;
                    scratch.attempt = 0;
                }
                LayoutResult::Empty => scratch.resume += 1,
                LayoutResult::Break { directive, content } => {
                    if let Some(content) = content {
                        let bbox = BBox::of(&content);
                        self.add_box(&mut scratch, content, bbox, dom.col_span(child));
                        scratch.resume += 1;
                        scratch.failing = None;
                    } else {
                        // A break raised inside the child leaves it half placed.
                        scratch.failing = self.is_resuming(child).then_some(child);
                    }
                    self.state.scratch.insert(node, scratch);
                    self.unset_first_unsplittable(node);
                    return LayoutResult::Break {
                        directive,
                        content: None,
                    };
                }
                LayoutResult::Failure => {
                    if layout.is_line_flow()
                        && scratch.number_in_line > 0
                        && scratch.attempt + 1 < self.config.max_lrtb_attempts
                    {
                        self.commit_line(&mut scratch);
                        scratch.attempt += 1;
                        continue;
                    }
                    self.note_overflow(node);
                    self.unset_first_unsplittable(node);
                    if splittable {
                        scratch.failing = Some(child);
                        self.state.scratch.insert(node, scratch);
                    } else {
                        self.clear_scratch(node);
                    }
                    return LayoutResult::Failure;
                }
            }
        }

        self.unset_first_unsplittable(node);
        let mut content = self.container_box(node, &mut scratch, &declared, false);
        let bbox = self.place(node, &declared, &mut content);
        if let Some(directive) = self.pending_break(node, Tag::BreakAfter) {
            return LayoutResult::Break {
                directive,
                content: Some(content),
            };
        }
        LayoutResult::Success { content, bbox }
    }

    fn layout_leaf(
        &mut self,
        node: NodeId,
        kind: Container,
        parent: &Parent,
        space: Space,
    ) -> LayoutResult {
        if !self.dom.presence(node).takes_space() {
            return LayoutResult::Empty;
        }
        self.set_first_unsplittable(node);
        let wrap_hint = match parent.layout {
            Some(LayoutKind::Position) | None => None,
            Some(_) => Some(parent.width),
        };
        let metrics = self.measure_leaf(node, wrap_hint);
        let mut declared = self.declared(node);
        declared.w = Some(metrics.width);
        declared.h = Some(metrics.height);
        let fits = self.check_dimensions(parent, &declared, space, false);
        self.unset_first_unsplittable(node);
        if !fits {
            tracing::trace!(node = node.index(), ?kind, "leaf does not fit");
            return LayoutResult::Failure;
        }
        let mut content = self.leaf_box(node, kind, metrics);
        let bbox = self.place(node, &declared, &mut content);
        LayoutResult::Success { content, bbox }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::{bind, BoundForm};
    use crate::font::StandardFontMetrics;
    use crate::loader::parse_xdp;
    use crate::text::XhtmlConverter;

    fn bound(body: &str) -> BoundForm {
        let xml = format!(
            r#"<xdp:xdp xmlns:xdp="http://ns.adobe.com/xdp/">
<template xmlns="http://www.xfa.org/schema/xfa-template/3.3/">{}</template>
<xfa:datasets xmlns:xfa="http://www.xfa.org/schema/xfa-data/1.0/"><xfa:data/></xfa:datasets>
</xdp:xdp>"#,
            body
        );
        bind(parse_xdp(&xml).unwrap()).unwrap()
    }

    fn engine(form: &BoundForm) -> LayoutEngine<'_> {
        LayoutEngine::new(
            form.dom(),
            form.som(),
            LayoutConfig::default(),
            &StandardFontMetrics,
            &XhtmlConverter,
        )
    }

    fn page_area(form: &BoundForm) -> NodeId {
        let dom = form.dom();
        let set = dom.first_child_by_tag(form.root_subform(), Tag::PageSet).unwrap();
        dom.first_child_by_tag(set, Tag::PageArea).unwrap()
    }

    #[test]
    fn tb_stacks_children() {
        let form = bound(
            r#"<subform name="root" layout="tb">
<draw name="a" w="100pt" h="20pt"/><draw name="b" w="50pt" h="30pt"/></subform>"#,
        );
        let mut engine = engine(&form);
        engine.begin_area(page_area(&form), None, 500.0);
        let result = engine.layout_root(form.root_subform(), Space { width: 500.0, height: 500.0 });
        let LayoutResult::Success { content, .. } = result else {
            panic!("expected success, got {:?}", result);
        };
        let b = content.find_named("b")[0];
        assert_eq!(b.y, 20.0);
        assert_eq!(content.height, 50.0);
        assert_eq!(content.width, 100.0);
    }

    #[test]
    fn position_layout_honors_anchor() {
        let form = bound(
            r#"<subform name="root"><draw name="a" x="100pt" y="100pt" w="40pt" h="20pt" anchorType="bottomRight"/></subform>"#,
        );
        let mut engine = engine(&form);
        engine.begin_area(page_area(&form), None, 500.0);
        let LayoutResult::Success { content, .. } =
            engine.layout_root(form.root_subform(), Space { width: 500.0, height: 500.0 })
        else {
            panic!("expected success");
        };
        let a = content.find_named("a")[0];
        assert_eq!((a.x, a.y), (60.0, 80.0));
    }

    #[test]
    fn lr_tb_wraps_to_a_new_line() {
        let form = bound(
            r#"<subform name="root" layout="lr-tb" w="100pt">
<draw name="a" w="60pt" h="10pt"/><draw name="b" w="60pt" h="10pt"/></subform>"#,
        );
        let mut engine = engine(&form);
        engine.begin_area(page_area(&form), None, 500.0);
        let LayoutResult::Success { content, .. } =
            engine.layout_root(form.root_subform(), Space { width: 500.0, height: 500.0 })
        else {
            panic!("expected success");
        };
        let b = content.find_named("b")[0];
        assert_eq!((b.x, b.y), (0.0, 10.0));
    }

    #[test]
    fn splittable_container_resumes_after_flush() {
        let form = bound(
            r#"<subform name="root" layout="tb">
<draw name="a" w="10pt" h="60pt"/><draw name="b" w="10pt" h="60pt"/></subform>"#,
        );
        let root = form.root_subform();
        let mut engine = engine(&form);
        engine.begin_area(page_area(&form), None, 100.0);
        let space = Space { width: 100.0, height: 100.0 };
        assert_eq!(engine.layout_root(root, space), LayoutResult::Failure);
        let first = engine.flush(root).unwrap();
        assert_eq!(first.children.len(), 1);
        assert!(engine.is_resuming(root));

        engine.begin_area(page_area(&form), None, 100.0);
        let LayoutResult::Success { content, .. } = engine.layout_root(root, space) else {
            panic!("expected the rest to fit");
        };
        assert_eq!(content.children.len(), 1);
        assert_eq!(content.children[0].name.as_deref(), Some("b"));
    }

    #[test]
    fn first_unsplittable_is_forced_into_an_empty_area() {
        let form = bound(
            r#"<subform name="root" layout="tb"><draw name="big" w="10pt" h="300pt"/></subform>"#,
        );
        let mut engine = engine(&form);
        engine.begin_area(page_area(&form), None, 100.0);
        let result = engine.layout_root(form.root_subform(), Space { width: 100.0, height: 100.0 });
        assert!(matches!(result, LayoutResult::Success { .. }));
    }

    #[test]
    fn leaf_style_carries_paragraph_settings() {
        let form = bound(
            r#"<subform name="root" layout="tb"><draw name="d" w="100pt">
<para hAlign="center" textIndent="6pt" lineHeight="14pt"/>
<value><text>Hello</text></value></draw></subform>"#,
        );
        let mut engine = engine(&form);
        engine.begin_area(page_area(&form), None, 500.0);
        let LayoutResult::Success { content, .. } =
            engine.layout_root(form.root_subform(), Space { width: 500.0, height: 500.0 })
        else {
            panic!("expected success");
        };
        let d = content.find_named("d")[0];
        assert_eq!(d.style.get("text-align").map(String::as_str), Some("center"));
        assert_eq!(d.style.get("text-indent").map(String::as_str), Some("6pt"));
        assert_eq!(d.style.get("line-height").map(String::as_str), Some("14pt"));
    }

    #[test]
    fn hidden_nodes_are_empty() {
        let form = bound(
            r#"<subform name="root" layout="tb"><draw name="a" w="10pt" h="10pt" presence="hidden"/></subform>"#,
        );
        let mut engine = engine(&form);
        engine.begin_area(page_area(&form), None, 100.0);
        let LayoutResult::Success { content, .. } =
            engine.layout_root(form.root_subform(), Space { width: 100.0, height: 100.0 })
        else {
            panic!("expected success");
        };
        assert!(content.find_named("a").is_empty());
    }
}

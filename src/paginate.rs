//! # Pagination
//!
//! Drives the layout engine over the page areas of the root page set, one
//! page per [`Iterator::next`] call:
//!
//! ```text
//! select page area ──▶ fill content areas in order ──▶ emit page
//!        ▲                   │ break / overflow              │
//!        └───────────────────┴───────────────────────────────┘
//! ```
//!
//! A page ends when its content areas are used up, when a break or overflow
//! sends the flow to another page, or when the root subform is fully laid
//! out. Pages on which nothing flowed are discarded; after
//! `max_empty_pages` of them in a row the run stops.

use std::collections::HashMap;

use serde::Serialize;

use crate::bind::BoundForm;
use crate::config::LayoutConfig;
use crate::dom::props::{LayoutKind, OddOrEven, PagePosition, Relation, TargetType};
use crate::dom::{Dom, NodeId, Tag};
use crate::error::{Result, XfaError};
use crate::font::{FontMetrics, StandardFontMetrics};
use crate::layout::{
    BBox, BoxKind, Container, Destination, LayoutBox, LayoutEngine, LayoutResult, Parent, Space,
};
use crate::text::{RichTextConverter, XhtmlConverter};

/// One laid-out page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// 1-based position among the emitted pages.
    pub number: usize,
    pub page_area: NodeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub width: f64,
    pub height: f64,
    /// A [`BoxKind::Page`] box holding page-area furniture and one box per
    /// content area that received content.
    pub root: LayoutBox,
}

impl Page {
    /// Pretty-printed JSON of the page, for inspection.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| XfaError::Malformed(format!("page: {}", e)))
    }
}

/// Paginate a bound form with the default configuration and services.
pub fn paginate(form: &BoundForm) -> Paginator<'_> {
    Paginator::with_services(
        form,
        LayoutConfig::default(),
        &StandardFontMetrics,
        &XhtmlConverter,
    )
}

/// How a page ended.
enum PageEnd {
    /// The root subform is completely laid out.
    Done,
    /// The content areas are used up; continue on the next page area.
    Next,
    /// A break or overflow asked for a specific page.
    Jump,
}

/// Forward-only page producer. Stop calling `next()` to cancel.
pub struct Paginator<'a> {
    dom: &'a Dom,
    engine: LayoutEngine<'a>,
    root: NodeId,
    page_set: Option<NodeId>,
    /// Page areas of the root page set (nested sets inlined), in order.
    page_areas: Vec<NodeId>,
    relation: Relation,
    usage: HashMap<NodeId, usize>,
    set_repeats: usize,
    cursor: usize,
    forced_page: Option<NodeId>,
    forced_area: Option<NodeId>,
    /// Leaders, and trailers that did not fit, for the top of the next area.
    insertions: Vec<NodeId>,
    emitted: usize,
    empty_run: usize,
    discarded: usize,
    finished: bool,
}

impl<'a> Paginator<'a> {
    pub fn with_services(
        form: &'a BoundForm,
        config: LayoutConfig,
        fonts: &'a dyn FontMetrics,
        rich: &'a dyn RichTextConverter,
    ) -> Self {
        let dom = form.dom();
        let root = form.root_subform();
        let page_set = dom.first_child_by_tag(root, Tag::PageSet);
        let mut page_areas = Vec::new();
        if let Some(set) = page_set {
            collect_page_areas(dom, set, &mut page_areas);
        }
        let relation = page_set.map_or(Relation::OrderedOccurrence, |set| dom.relation(set));

        let mut paginator = Self {
            dom,
            engine: LayoutEngine::new(dom, form.som(), config, fonts, rich),
            root,
            page_set,
            page_areas,
            relation,
            usage: HashMap::new(),
            set_repeats: 0,
            cursor: 0,
            forced_page: None,
            forced_area: None,
            insertions: Vec::new(),
            emitted: 0,
            empty_run: 0,
            discarded: 0,
            finished: false,
        };
        if paginator.page_areas.is_empty() {
            tracing::warn!("the form has no page area; nothing to paginate");
            paginator.finished = true;
        }
        paginator.initial_page_area();
        paginator
    }

    /// Pages dropped because nothing flowed onto them.
    pub fn discarded_pages(&self) -> usize {
        self.discarded
    }

    /// A `breakBefore` naming a page area on the root subform or its first
    /// child subform picks the first page.
    fn initial_page_area(&mut self) {
        let dom = self.dom;
        let first_child = dom
            .element_children(self.root)
            .find(|c| Container::of(dom.tag(*c)).is_some_and(Container::flows))
            .filter(|c| dom.tag(*c) == Tag::Subform);
        for owner in std::iter::once(self.root).chain(first_child) {
            for directive in dom.children_by_tag(owner, Tag::BreakBefore) {
                if dom.target_type(directive) != TargetType::PageArea {
                    continue;
                }
                let Some(raw) = dom.attr(directive, "target").filter(|t| !t.trim().is_empty())
                else {
                    continue;
                };
                if let Some(page) = self.engine.resolve_target(owner, raw, TargetType::PageArea) {
                    tracing::debug!(page = page.index(), "initial page area from break");
                    self.forced_page = Some(page);
                    self.engine.mark_fired(directive);
                    return;
                }
            }
        }
    }

    fn used(&self, page_area: NodeId) -> usize {
        self.usage.get(&page_area).copied().unwrap_or(0)
    }

    fn available(&self, page_area: NodeId) -> bool {
        self.dom.occur(page_area).allows(self.used(page_area))
    }

    // ── Page area selection ─────────────────────────────────────

    fn select_page_area(&mut self) -> Option<NodeId> {
        if let Some(forced) = self.forced_page.take() {
            if self.available(forced) {
                if let Some(index) = self.page_areas.iter().position(|p| *p == forced) {
                    self.cursor = index;
                }
                return Some(forced);
            }
            tracing::warn!(page = forced.index(), "target page area exhausted its occurrences");
        }
        match self.relation {
            Relation::OrderedOccurrence => self.next_ordered(),
            Relation::SimplexPaginated => self.next_positional(false),
            Relation::DuplexPaginated => self.next_positional(true),
        }
    }

    fn next_ordered(&mut self) -> Option<NodeId> {
        let mut repeated = false;
        loop {
            while let Some(&page) = self.page_areas.get(self.cursor) {
                if self.available(page) {
                    return Some(page);
                }
                self.cursor += 1;
            }
            let set = self.page_set?;
            if repeated || !self.dom.occur(set).allows(self.set_repeats + 1) {
                let last = self.page_areas.last().copied();
                tracing::warn!("page set exhausted its occurrences; reusing the last page area");
                return last;
            }
            self.set_repeats += 1;
            self.usage.clear();
            self.cursor = 0;
            repeated = true;
        }
    }

    fn next_positional(&self, duplex: bool) -> Option<NodeId> {
        let number = self.emitted + 1;
        let positions: &[PagePosition] = if number == 1 {
            &[PagePosition::First, PagePosition::Only]
        } else {
            &[PagePosition::Rest]
        };
        let candidates: Vec<NodeId> = self
            .page_areas
            .iter()
            .copied()
            .filter(|p| {
                self.available(*p) && (!duplex || parity_matches(self.dom.odd_or_even(*p), number))
            })
            .collect();
        let position = |p: &NodeId| self.dom.page_position(*p);
        candidates
            .iter()
            .copied()
            .find(|p| positions.contains(&position(p)))
            .or_else(|| candidates.iter().copied().find(|p| position(p) == PagePosition::Any))
            .or_else(|| candidates.first().copied())
            .or_else(|| self.page_areas.first().copied())
    }

    // ── Filling a page ──────────────────────────────────────────

    /// Lay content into the content areas of `page_area`. Returns the page
    /// box, whether any root content flowed, and how the page ended.
    fn fill_page(&mut self, page_area: NodeId, size: (f64, f64)) -> (LayoutBox, bool, PageEnd) {
        let dom = self.dom;
        let areas: Vec<NodeId> = dom.children_by_tag(page_area, Tag::ContentArea).collect();
        let mut index = match self.forced_area.take() {
            Some(target) => areas.iter().position(|a| *a == target).unwrap_or(0),
            None => 0,
        };
        let mut page = LayoutBox::new(BoxKind::Page);
        page.width = size.0;
        page.height = size.1;
        page.node = Some(page_area);
        page.name = dom.name_attr(page_area).map(str::to_string);
        let mut flowed = false;

        while index < areas.len().max(1) {
            let area = areas.get(index).copied();
            let frame = match area {
                Some(a) => BBox {
                    x: dom.measure(a, "x").unwrap_or(0.0),
                    y: dom.measure(a, "y").unwrap_or(0.0),
                    width: dom.measure(a, "w").unwrap_or(size.0),
                    height: dom.measure(a, "h").unwrap_or(size.1),
                },
                None => BBox {
                    x: 0.0,
                    y: 0.0,
                    width: size.0,
                    height: size.1,
                },
            };
            tracing::debug!(page_area = page_area.index(), area = index, "filling content area");
            self.engine.begin_area(page_area, area, frame.height);

            let mut area_box = LayoutBox::new(BoxKind::ContentArea);
            area_box.x = frame.x;
            area_box.y = frame.y;
            area_box.width = frame.width;
            area_box.height = frame.height;
            area_box.node = area;
            area_box.name = area.and_then(|a| dom.name_attr(a)).map(str::to_string);

            let top = self.place_insertions(&mut area_box, frame);
            let space = Space {
                width: frame.width,
                height: (frame.height - top).max(0.0),
            };
            let outcome = self.engine.layout_root(self.root, space);
            let place = |area_box: &mut LayoutBox, mut content: LayoutBox| {
                content.y += top;
                area_box.children.push(content);
            };

            let destination = match outcome {
                LayoutResult::Success { content, .. } => {
                    place(&mut area_box, content);
                    page.children.push(area_box);
                    return (page, true, PageEnd::Done);
                }
                LayoutResult::Empty => {
                    push_area(&mut page, area_box);
                    return (page, flowed, PageEnd::Done);
                }
                LayoutResult::Break {
                    directive,
                    content: Some(content),
                } => {
                    tracing::debug!(directive = directive.node.index(), "root break after");
                    place(&mut area_box, content);
                    page.children.push(area_box);
                    return (page, true, PageEnd::Done);
                }
                LayoutResult::Break {
                    directive,
                    content: None,
                } => {
                    if let Some(fragment) = self.engine.flush(self.root) {
                        place(&mut area_box, fragment);
                        flowed = true;
                    }
                    self.end_area(&mut area_box, frame, directive.trailer, directive.leader);
                    tracing::debug!(destination = ?directive.destination, "break");
                    directive.destination
                }
                LayoutResult::Failure => {
                    if let Some(fragment) = self.engine.flush(self.root) {
                        place(&mut area_box, fragment);
                        flowed = true;
                    }
                    match self.engine.take_overflow() {
                        Some(overflow) => {
                            self.end_area(&mut area_box, frame, overflow.trailer, overflow.leader);
                            tracing::debug!(destination = ?overflow.destination, "overflow");
                            overflow.destination
                        }
                        None => Destination::Auto,
                    }
                }
            };
            push_area(&mut page, area_box);

            match destination {
                Destination::Auto | Destination::ContentArea(None) => index += 1,
                Destination::ContentArea(Some(target)) => {
                    match areas.iter().position(|a| *a == target) {
                        Some(later) if later > index => index = later,
                        _ => {
                            self.forced_page = dom.ancestor_by_tag(target, Tag::PageArea);
                            self.forced_area = Some(target);
                            return (page, flowed, PageEnd::Jump);
                        }
                    }
                }
                Destination::PageArea(target) => {
                    self.forced_page = target;
                    return (page, flowed, PageEnd::Jump);
                }
            }
        }
        (page, flowed, PageEnd::Next)
    }

    /// Close the area with `trailer` below what flowed into it and keep
    /// `leader` for the top of the next area. A trailer that does not fit
    /// moves to the next area too, ahead of the leader.
    fn end_area(
        &mut self,
        area_box: &mut LayoutBox,
        frame: BBox,
        trailer: Option<NodeId>,
        leader: Option<NodeId>,
    ) {
        if let Some(trailer) = trailer {
            let used = area_box
                .children
                .iter()
                .map(|c| c.y + c.height)
                .fold(0.0, f64::max);
            let parent = Parent {
                layout: Some(LayoutKind::Tb),
                width: frame.width,
                ..Parent::none()
            };
            let space = Space {
                width: frame.width,
                height: (frame.height - used).max(0.0),
            };
            match self.engine.layout_standalone(trailer, &parent, space) {
                Some((mut content, _)) => {
                    content.x = 0.0;
                    content.y = used;
                    area_box.children.push(content);
                }
                None => {
                    tracing::warn!(trailer = trailer.index(), "trailer does not fit, moved to the next area");
                    self.insertions.push(trailer);
                }
            }
        }
        self.insertions.extend(leader);
    }

    /// Lay out pending leaders (and displaced trailers) at the top of the area. Returns the
    /// height they took.
    fn place_insertions(&mut self, area_box: &mut LayoutBox, frame: BBox) -> f64 {
        let mut top = 0.0;
        for node in std::mem::take(&mut self.insertions) {
            let parent = Parent {
                layout: Some(LayoutKind::Tb),
                width: frame.width,
                ..Parent::none()
            };
            let space = Space {
                width: frame.width,
                height: (frame.height - top).max(0.0),
            };
            if let Some((mut content, bbox)) = self.engine.layout_standalone(node, &parent, space) {
                content.x = 0.0;
                content.y = top;
                top += bbox.height;
                area_box.children.push(content);
            }
        }
        top
    }

    /// Draws, fields and subforms that sit directly on the page area.
    fn furniture(&mut self, page_area: NodeId, page: &mut LayoutBox) {
        let dom = self.dom;
        let parent = Parent {
            layout: Some(LayoutKind::Position),
            width: page.width,
            ..Parent::none()
        };
        let space = Space {
            width: page.width,
            height: page.height,
        };
        let mut placed = Vec::new();
        for child in dom.element_children(page_area) {
            if !matches!(
                dom.tag(child),
                Tag::Draw | Tag::Field | Tag::Subform | Tag::Area | Tag::ExclGroup
            ) {
                continue;
            }
            if let Some((mut content, bbox)) = self.engine.layout_standalone(child, &parent, space) {
                content.x = bbox.x;
                content.y = bbox.y;
                placed.push(content);
            }
        }
        placed.append(&mut page.children);
        page.children = placed;
    }
}

fn collect_page_areas(dom: &Dom, set: NodeId, out: &mut Vec<NodeId>) {
    for child in dom.element_children(set) {
        match dom.tag(child) {
            Tag::PageArea => out.push(child),
            Tag::PageSet => collect_page_areas(dom, child, out),
            _ => {}
        }
    }
}

fn parity_matches(parity: OddOrEven, number: usize) -> bool {
    match parity {
        OddOrEven::Any => true,
        OddOrEven::Odd => number % 2 == 1,
        OddOrEven::Even => number % 2 == 0,
    }
}

fn push_area(page: &mut LayoutBox, area_box: LayoutBox) {
    if !area_box.children.is_empty() {
        page.children.push(area_box);
    }
}

impl Iterator for Paginator<'_> {
    type Item = Page;

    fn next(&mut self) -> Option<Page> {
        while !self.finished {
            let Some(page_area) = self.select_page_area() else {
                self.finished = true;
                break;
            };
            let size = self
                .dom
                .page_size(page_area, self.engine.config().default_medium);
            let (mut root, flowed, end) = self.fill_page(page_area, size);
            let done = matches!(end, PageEnd::Done);
            if done {
                self.finished = true;
            }

            if flowed || (done && self.emitted == 0) {
                self.furniture(page_area, &mut root);
                *self.usage.entry(page_area).or_insert(0) += 1;
                self.emitted += 1;
                self.empty_run = 0;
                tracing::debug!(number = self.emitted, page_area = page_area.index(), "page");
                return Some(Page {
                    number: self.emitted,
                    page_area,
                    name: self.dom.name_attr(page_area).map(str::to_string),
                    width: size.0,
                    height: size.1,
                    root,
                });
            }
            if done {
                break;
            }

            self.discarded += 1;
            self.empty_run += 1;
            if self.empty_run >= self.engine.config().max_empty_pages {
                tracing::warn!(
                    discarded = self.empty_run,
                    "nothing fits on consecutive pages; stopping pagination"
                );
                self.finished = true;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::bind;
    use crate::loader::parse_xdp;

    fn form(page_set: &str, body: &str) -> BoundForm {
        let xml = format!(
            r#"<xdp:xdp xmlns:xdp="http://ns.adobe.com/xdp/">
<template xmlns="http://www.xfa.org/schema/xfa-template/3.3/"><subform name="root" layout="tb">
{}{}</subform></template></xdp:xdp>"#,
            page_set, body
        );
        bind(parse_xdp(&xml).unwrap()).unwrap()
    }

    fn names(pages: &[Page]) -> Vec<&str> {
        pages.iter().filter_map(|p| p.name.as_deref()).collect()
    }

    const TWO_AREAS: &str = r#"<pageSet>
<pageArea name="P1"><medium short="200pt" long="300pt"/>
<contentArea name="A" x="10pt" y="10pt" w="100pt" h="100pt"/><contentArea name="B" x="10pt" y="150pt" w="100pt" h="100pt"/>
<draw name="logo" x="0pt" y="0pt" w="5pt" h="5pt"/></pageArea>
<pageArea name="P2"><contentArea name="C" w="100pt" h="100pt"/></pageArea></pageSet>"#;

    #[test]
    fn small_form_is_one_page() {
        let form = form(TWO_AREAS, r#"<draw name="d" w="10pt" h="10pt"/>"#);
        let pages: Vec<Page> = paginate(&form).collect();
        assert_eq!(pages.len(), 1);
        let page = &pages[0];
        assert_eq!((page.width, page.height), (200.0, 300.0));
        assert_eq!(page.name.as_deref(), Some("P1"));
        assert_eq!(page.root.children[0].name.as_deref(), Some("logo"));
        let area = &page.root.children[1];
        assert_eq!(area.kind, BoxKind::ContentArea);
        assert_eq!((area.x, area.y), (10.0, 10.0));
    }

    #[test]
    fn content_flows_into_the_second_area() {
        let form = form(
            TWO_AREAS,
            r#"<draw name="a" w="10pt" h="80pt"/><draw name="b" w="10pt" h="80pt"/>"#,
        );
        let pages: Vec<Page> = paginate(&form).collect();
        assert_eq!(pages.len(), 1);
        let areas: Vec<_> = pages[0]
            .root
            .children
            .iter()
            .filter(|b| b.kind == BoxKind::ContentArea)
            .collect();
        assert_eq!(areas.len(), 2);
        assert_eq!(areas[1].find_named("b").len(), 1);
    }

    #[test]
    fn break_to_page_area_starts_that_page() {
        let form = form(
            TWO_AREAS,
            r#"<draw name="a" w="10pt" h="10pt"/>
<subform name="s" layout="tb"><breakBefore targetType="pageArea" target="P2"/><draw name="b" w="10pt" h="10pt"/></subform>"#,
        );
        let pages: Vec<Page> = paginate(&form).collect();
        assert_eq!(names(&pages), vec!["P1", "P2"]);
        assert_eq!(pages[1].root.find_named("b").len(), 1);
        assert_eq!(pages[1].number, 2);
    }

    #[test]
    fn initial_break_selects_the_first_page() {
        let form = form(
            TWO_AREAS,
            r#"<subform name="s" layout="tb"><breakBefore targetType="pageArea" target="P2"/><draw name="b" w="10pt" h="10pt"/></subform>"#,
        );
        let pages: Vec<Page> = paginate(&form).collect();
        assert_eq!(names(&pages), vec!["P2"]);
    }

    #[test]
    fn overflow_leader_opens_the_next_area() {
        let form = form(
            TWO_AREAS,
            r#"<subform name="s" layout="tb"><overflow leader="head"/>
<draw name="a" w="10pt" h="80pt"/><draw name="b" w="10pt" h="80pt"/></subform>
<subform name="head" layout="tb"><draw w="10pt" h="5pt"/></subform>"#,
        );
        let pages: Vec<Page> = paginate(&form).collect();
        assert_eq!(pages.len(), 1);
        let second = pages[0].root.find_named("B")[0];
        assert_eq!(second.children[0].name.as_deref(), Some("head"));
        assert_eq!(second.children[1].y, 5.0);
        assert_eq!(pages[0].root.find_named("head").len(), 2);
    }

    #[test]
    fn overflow_trailer_closes_the_current_area() {
        let form = form(
            TWO_AREAS,
            r#"<subform name="s" layout="tb"><overflow trailer="tail"/>
<draw name="a" w="10pt" h="80pt"/><draw name="b" w="10pt" h="80pt"/></subform>
<subform name="tail" layout="tb"><draw w="10pt" h="5pt"/></subform>"#,
        );
        let pages: Vec<Page> = paginate(&form).collect();
        assert_eq!(pages.len(), 1);
        let first = pages[0].root.find_named("A")[0];
        assert_eq!(first.children.len(), 2);
        assert_eq!(first.children[1].name.as_deref(), Some("tail"));
        assert_eq!(first.children[1].y, 80.0);
        let second = pages[0].root.find_named("B")[0];
        assert_eq!(second.children[0].y, 0.0);
        assert_eq!(second.children[0].find_named("b").len(), 1);
        assert!(second.children[0].find_named("a").is_empty());
    }

    #[test]
    fn duplex_sets_pick_by_position_and_parity() {
        let form = form(
            r#"<pageSet relation="duplexPaginated">
<pageArea name="front" pagePosition="first"><contentArea w="100pt" h="100pt"/></pageArea>
<pageArea name="odd" oddOrEven="odd" pagePosition="rest"><contentArea w="100pt" h="100pt"/></pageArea>
<pageArea name="even" oddOrEven="even" pagePosition="rest"><contentArea w="100pt" h="100pt"/></pageArea></pageSet>"#,
            r#"<draw w="10pt" h="90pt"/><draw w="10pt" h="90pt"/><draw w="10pt" h="90pt"/>"#,
        );
        let pages: Vec<Page> = paginate(&form).collect();
        assert_eq!(names(&pages), vec!["front", "even", "odd"]);
    }

    #[test]
    fn json_dump_names_the_page() {
        let form = form(TWO_AREAS, r#"<draw name="d" w="10pt" h="10pt"/>"#);
        let page = paginate(&form).next().unwrap();
        let json = page.to_json().unwrap();
        assert!(json.contains("\"kind\": \"page\""));
        assert!(json.contains("\"name\": \"P1\""));
    }
}

//! # Breaks and Overflow
//!
//! `breakBefore`/`breakAfter` move the flow to another content area or page
//! before or after a container. `overflow` says where the rest of a
//! container goes when it does not fit, and which leader/trailer subforms
//! to repeat there.
//!
//! Targets are SOM expressions (or `#id` references) resolved relative to the
//! container that owns the directive. A directive fires at most once per
//! run; `auto` directives never fire.

use crate::dom::props::TargetType;
use crate::dom::{NodeId, Tag};

use super::LayoutEngine;

/// Where the flow continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// The next content area, on this page or the next.
    Auto,
    /// A new page; `None` lets the paginator pick the page area.
    PageArea(Option<NodeId>),
    /// A given content area, or the next one.
    ContentArea(Option<NodeId>),
}

/// A `breakBefore`/`breakAfter` that fired.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakDirective {
    pub node: NodeId,
    pub destination: Destination,
    pub start_new: bool,
    pub leader: Option<NodeId>,
    pub trailer: Option<NodeId>,
}

/// The `overflow` of the innermost container that did not fit.
#[derive(Debug, Clone, PartialEq)]
pub struct OverflowDirective {
    pub owner: NodeId,
    pub destination: Destination,
    pub leader: Option<NodeId>,
    pub trailer: Option<NodeId>,
}

impl LayoutEngine<'_> {
    /// Resolve a page or content area reference. `want` restricts the kind.
    pub(crate) fn resolve_target(&self, owner: NodeId, raw: &str, want: TargetType) -> Option<NodeId> {
        let expr = raw.split_whitespace().next()?;
        let found = self.som.resolve_first(self.dom, owner, expr);
        let accepted = found.filter(|node| match (want, self.dom.tag(*node)) {
            (TargetType::ContentArea, tag) => tag == Tag::ContentArea,
            (TargetType::PageArea, tag) => tag == Tag::PageArea,
            (TargetType::Auto, tag) => matches!(tag, Tag::ContentArea | Tag::PageArea),
        });
        if accepted.is_none() {
            tracing::warn!(expr, "break or overflow target not found");
        }
        accepted
    }

    /// Resolve a leader/trailer reference to a subform.
    fn resolve_subform(&self, owner: NodeId, raw: Option<&str>) -> Option<NodeId> {
        let expr = raw.map(str::trim).filter(|r| !r.is_empty())?;
        let found = self
            .som
            .resolve_first(self.dom, owner, expr)
            .filter(|node| matches!(self.dom.tag(*node), Tag::Subform | Tag::SubformSet));
        if found.is_none() {
            tracing::warn!(reference = expr, "leader or trailer not found");
        }
        found
    }

    fn is_current(&self, destination: Destination) -> bool {
        match destination {
            Destination::PageArea(Some(page)) => self.state.page_area == Some(page),
            Destination::ContentArea(Some(area)) => self.state.content_area == Some(area),
            _ => false,
        }
    }

    /// The first unfired `breakBefore` or `breakAfter` (per `tag`) of
    /// `node` that moves the flow.
    pub(crate) fn pending_break(&mut self, node: NodeId, tag: Tag) -> Option<BreakDirective> {
        let dom = self.dom;
        for directive in dom.children_by_tag(node, tag) {
            if !self.state.fired.insert(directive) {
                continue;
            }
            let target_type = dom.target_type(directive);
            let target = dom
                .attr(directive, "target")
                .filter(|t| !t.trim().is_empty())
                .and_then(|t| self.resolve_target(node, t, target_type));
            let destination = match target_type {
                TargetType::Auto => continue,
                TargetType::ContentArea => Destination::ContentArea(target),
                TargetType::PageArea => Destination::PageArea(target),
            };
            let start_new = dom.flag(directive, "startNew");
            if !start_new && self.is_current(destination) {
                continue;
            }
            tracing::debug!(
                node = node.index(),
                ?destination,
                before = (tag == Tag::BreakBefore),
                "break fired"
            );
            return Some(BreakDirective {
                node: directive,
                destination,
                start_new,
                leader: self.resolve_subform(node, dom.attr(directive, "leader")),
                trailer: self.resolve_subform(node, dom.attr(directive, "trailer")),
            });
        }
        None
    }

    /// Remember the overflow of a container that failed to fit. The
    /// innermost one wins.
    pub(crate) fn note_overflow(&mut self, node: NodeId) {
        if self.state.overflow.is_some() {
            return;
        }
        let dom = self.dom;
        let Some(overflow) = dom.first_child_by_tag(node, Tag::Overflow) else {
            return;
        };
        let destination = match dom
            .attr(overflow, "target")
            .filter(|t| !t.trim().is_empty())
            .and_then(|t| self.resolve_target(node, t, TargetType::Auto))
        {
            Some(target) if dom.tag(target) == Tag::PageArea => Destination::PageArea(Some(target)),
            Some(target) => Destination::ContentArea(Some(target)),
            None => Destination::Auto,
        };
        self.state.overflow = Some(OverflowDirective {
            owner: node,
            destination,
            leader: self.resolve_subform(node, dom.attr(overflow, "leader")),
            trailer: self.resolve_subform(node, dom.attr(overflow, "trailer")),
        });
    }

    /// Hand the pending overflow to the paginator.
    pub fn take_overflow(&mut self) -> Option<OverflowDirective> {
        self.state.overflow.take()
    }
}

#[cfg(test)]
mod tests {
    use super::super::{LayoutResult, Space};
    use super::*;
    use crate::bind::{bind, BoundForm};
    use crate::config::LayoutConfig;
    use crate::font::StandardFontMetrics;
    use crate::loader::parse_xdp;
    use crate::text::XhtmlConverter;

    fn form(body: &str) -> BoundForm {
        let xml = format!(
            r#"<xdp:xdp xmlns:xdp="http://ns.adobe.com/xdp/">
<template xmlns="http://www.xfa.org/schema/xfa-template/3.3/"><subform name="root" layout="tb">
<pageSet><pageArea name="P1"><contentArea name="A1" w="100pt" h="100pt"/><contentArea name="A2" w="100pt" h="100pt"/></pageArea>
<pageArea name="P2"><contentArea name="B1" w="100pt" h="100pt"/></pageArea></pageSet>
{}</subform></template></xdp:xdp>"#,
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

    fn named(form: &BoundForm, name: &str) -> NodeId {
        form.som().resolve_first(form.dom(), form.root_subform(), name).unwrap()
    }

    #[test]
    fn break_before_fires_once() {
        let form = form(
            r#"<draw name="a" w="10pt" h="10pt"/>
<subform name="s" layout="tb"><breakBefore targetType="pageArea" target="P2"/><draw name="b" w="10pt" h="10pt"/></subform>"#,
        );
        let p1 = named(&form, "P1");
        let p2 = named(&form, "P2");
        let mut engine = engine(&form);
        engine.begin_area(p1, None, 100.0);
        let space = Space { width: 100.0, height: 100.0 };
        let LayoutResult::Break { directive, content } = engine.layout_root(form.root_subform(), space)
        else {
            panic!("expected a break");
        };
        assert_eq!(directive.destination, Destination::PageArea(Some(p2)));
        assert!(content.is_none());
        assert_eq!(engine.flush(form.root_subform()).unwrap().children.len(), 1);

        engine.begin_area(p2, None, 100.0);
        let result = engine.layout_root(form.root_subform(), space);
        assert!(matches!(result, LayoutResult::Success { .. }));
    }

    #[test]
    fn nested_break_keeps_earlier_siblings() {
        let form = form(
            r#"<subform name="s1" layout="tb"><draw name="a" w="10pt" h="10pt"/>
<subform name="s2" layout="tb"><breakBefore targetType="pageArea" target="P2"/><draw name="b" w="10pt" h="10pt"/></subform></subform>"#,
        );
        let root = form.root_subform();
        let mut engine = engine(&form);
        engine.begin_area(named(&form, "P1"), None, 100.0);
        let space = Space { width: 100.0, height: 100.0 };
        let result = engine.layout_root(root, space);
        assert!(matches!(result, LayoutResult::Break { content: None, .. }));
        let fragment = engine.flush(root).unwrap();
        assert_eq!(fragment.find_named("a").len(), 1);
        assert!(fragment.find_named("b").is_empty());

        engine.begin_area(named(&form, "P2"), None, 100.0);
        let LayoutResult::Success { content, .. } = engine.layout_root(root, space) else {
            panic!("expected the rest to fit");
        };
        assert!(content.find_named("a").is_empty());
        assert_eq!(content.find_named("b").len(), 1);
    }

    #[test]
    fn break_to_the_current_page_without_start_new_is_ignored() {
        let form = form(
            r#"<subform name="s" layout="tb"><breakBefore targetType="pageArea" target="P1"/><draw name="b" w="10pt" h="10pt"/></subform>"#,
        );
        let mut engine = engine(&form);
        engine.begin_area(named(&form, "P1"), None, 100.0);
        let result = engine.layout_root(form.root_subform(), Space { width: 100.0, height: 100.0 });
        assert!(matches!(result, LayoutResult::Success { .. }));
    }

    #[test]
    fn break_after_carries_finished_content() {
        let form = form(
            r#"<subform name="s" layout="tb"><breakAfter targetType="contentArea"/><draw name="b" w="10pt" h="10pt"/></subform>
<draw name="c" w="10pt" h="10pt"/>"#,
        );
        let mut engine = engine(&form);
        engine.begin_area(named(&form, "P1"), None, 100.0);
        let space = Space { width: 100.0, height: 100.0 };
        let LayoutResult::Break { directive, content } = engine.layout_root(form.root_subform(), space)
        else {
            panic!("expected a break");
        };
        assert_eq!(directive.destination, Destination::ContentArea(None));
        assert!(content.is_none());
        let fragment = engine.flush(form.root_subform()).unwrap();
        assert_eq!(fragment.children[0].name.as_deref(), Some("s"));
    }

    #[test]
    fn overflow_is_reported_on_failure() {
        let form = form(
            r#"<subform name="s" layout="tb"><overflow target="P2.B1"/>
<draw name="a" w="10pt" h="60pt"/><draw name="b" w="10pt" h="60pt"/></subform>"#,
        );
        let mut engine = engine(&form);
        engine.begin_area(named(&form, "P1"), None, 100.0);
        let result = engine.layout_root(form.root_subform(), Space { width: 100.0, height: 100.0 });
        assert_eq!(result, LayoutResult::Failure);
        let overflow = engine.take_overflow().unwrap();
        assert_eq!(overflow.owner, named(&form, "s"));
        assert_eq!(overflow.destination, Destination::ContentArea(Some(named(&form, "P2.B1"))));
        assert!(engine.take_overflow().is_none());
    }
}

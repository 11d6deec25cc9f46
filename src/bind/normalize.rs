//! Template clean-up applied once before the merge.
//!
//! - The deprecated `<break>` element is rewritten into `breakBefore`,
//!   `breakAfter` and `overflow` so later stages only see the modern form.
//! - A form without a page set gets a letter-sized page with a quarter-inch
//!   content inset.

use crate::dom::{Dom, NodeId, Tag};

/// Rewrite every `<break>` under subforms and subform sets.
pub fn upgrade_breaks(dom: &mut Dom, root: NodeId) {
    let mut pending = Vec::new();
    find_breaks(dom, root, &mut pending);
    for legacy in pending {
        upgrade_break(dom, legacy);
    }
}

fn find_breaks(dom: &Dom, id: NodeId, out: &mut Vec<NodeId>) {
    for &child in dom.children(id) {
        match dom.tag(child) {
            Tag::Break => out.push(child),
            Tag::Subform | Tag::SubformSet | Tag::Area | Tag::ExclGroup | Tag::PageSet => {
                find_breaks(dom, child, out)
            }
            _ => {}
        }
    }
}

fn target_type(kind: &str) -> Option<&'static str> {
    match kind {
        "contentArea" => Some("contentArea"),
        "pageArea" | "pageEven" | "pageOdd" => Some("pageArea"),
        _ => None,
    }
}

fn attr_or_empty(dom: &Dom, id: NodeId, name: &str) -> String {
    dom.attr(id, name).unwrap_or("").to_string()
}

fn upgrade_break(dom: &mut Dom, legacy: NodeId) {
    let Some(owner) = dom.parent(legacy) else {
        return;
    };
    let mut position = dom.index_of(owner, legacy).unwrap_or(0);

    for (kind_attr, target_attr, tag) in [
        ("before", "beforeTarget", Tag::BreakBefore),
        ("after", "afterTarget", Tag::BreakAfter),
    ] {
        let Some(kind) = target_type(&attr_or_empty(dom, legacy, kind_attr)) else {
            continue;
        };
        let directive = dom.create_template(tag);
        dom.set_attr(directive, "targetType", kind);
        let target = attr_or_empty(dom, legacy, target_attr);
        if !target.is_empty() {
            dom.set_attr(directive, "target", &target);
        }
        if dom.flag(legacy, "startNew") {
            dom.set_attr(directive, "startNew", "1");
        }
        dom.insert_child(owner, position, directive);
        position += 1;
    }

    let overflow: Vec<(&str, String)> = [
        ("target", attr_or_empty(dom, legacy, "overflowTarget")),
        ("leader", attr_or_empty(dom, legacy, "overflowLeader")),
        ("trailer", attr_or_empty(dom, legacy, "overflowTrailer")),
    ]
    .into_iter()
    .filter(|(_, v)| !v.is_empty())
    .collect();
    if !overflow.is_empty() && dom.first_child_by_tag(owner, Tag::Overflow).is_none() {
        let node = dom.create_template(Tag::Overflow);
        for (name, value) in overflow {
            dom.set_attr(node, name, &value);
        }
        dom.insert_child(owner, position, node);
    }

    dom.detach(legacy);
}

/// Give the root subform a default page set when it has none.
pub fn ensure_page_set(dom: &mut Dom, root: NodeId) {
    if dom.first_child_by_tag(root, Tag::PageSet).is_some() {
        return;
    }
    let page_set = dom.create_template(Tag::PageSet);
    let page_area = dom.create_template(Tag::PageArea);
    dom.set_attr(page_area, "name", "Page1");
    let medium = dom.create_template(Tag::Medium);
    dom.set_attr(medium, "short", "8.5in");
    dom.set_attr(medium, "long", "11in");
    let content_area = dom.create_template(Tag::ContentArea);
    for (name, value) in [("x", "0.25in"), ("y", "0.25in"), ("w", "8in"), ("h", "10.5in")] {
        dom.set_attr(content_area, name, value);
    }
    dom.append_child(page_area, medium);
    dom.append_child(page_area, content_area);
    dom.append_child(page_set, page_area);
    dom.insert_child(root, 0, page_set);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::props::TargetType;

    #[test]
    fn legacy_break_is_split() {
        let mut dom = Dom::new();
        let root = dom.create_template(Tag::Subform);
        let child = dom.create_template(Tag::Subform);
        dom.append_child(root, child);
        let legacy = dom.create_template(Tag::Break);
        dom.set_attr(legacy, "before", "pageArea");
        dom.set_attr(legacy, "beforeTarget", "#Page2");
        dom.set_attr(legacy, "overflowTarget", "#Area2");
        dom.append_child(child, legacy);

        upgrade_breaks(&mut dom, root);

        assert!(dom.first_child_by_tag(child, Tag::Break).is_none());
        let before = dom.first_child_by_tag(child, Tag::BreakBefore).unwrap();
        assert_eq!(dom.target_type(before), TargetType::PageArea);
        assert_eq!(dom.attr(before, "target"), Some("#Page2"));
        assert!(dom.first_child_by_tag(child, Tag::BreakAfter).is_none());
        let overflow = dom.first_child_by_tag(child, Tag::Overflow).unwrap();
        assert_eq!(dom.attr(overflow, "target"), Some("#Area2"));
    }

    #[test]
    fn default_page_set_is_letter() {
        let mut dom = Dom::new();
        let root = dom.create_template(Tag::Subform);
        ensure_page_set(&mut dom, root);
        let page_set = dom.first_child_by_tag(root, Tag::PageSet).unwrap();
        let page_area = dom.first_child_by_tag(page_set, Tag::PageArea).unwrap();
        assert_eq!(dom.page_size(page_area, (0.0, 0.0)), (612.0, 792.0));
        let area = dom.first_child_by_tag(page_area, Tag::ContentArea).unwrap();
        assert_eq!(dom.measure(area, "h"), Some(756.0));
    }
}

//! Prototype resolution.
//!
//! A template node may borrow attributes, content and children from another
//! node of the same kind through `use` or `usehref`:
//!
//! - `use="#id"` / `usehref="#id"`: the node with that id
//! - `use="form1.protos.field1"`: a SOM expression relative to the node
//! - `usehref="#som(expr)"` / `usehref=".#som(expr)"`: the same, spelled out
//!
//! Prototypes are resolved depth first so a prototype that itself uses
//! another one is complete before it is copied. The chain of prototypes being
//! resolved is kept in an ancestor set; a reference back into it is a cycle
//! and is ignored.

use std::collections::HashSet;

use crate::dom::{slot, Dom, NodeId, Slot};
use crate::som::SomResolver;

/// Attributes that never flow from a prototype.
const NOT_INHERITED: [&str; 4] = ["id", "name", "use", "usehref"];

/// Resolve every prototype reference in the template.
pub fn resolve_prototypes(dom: &mut Dom, som: &SomResolver) {
    let Some(template) = dom.template() else {
        return;
    };
    let mut order = Vec::new();
    collect(dom, template, &mut order);
    let mut ancestors = HashSet::new();
    for node in order {
        resolve_node(dom, som, node, &mut ancestors);
    }
}

fn collect(dom: &Dom, id: NodeId, out: &mut Vec<NodeId>) {
    out.push(id);
    for &child in dom.children(id) {
        collect(dom, child, out);
    }
}

fn reference(dom: &Dom, id: NodeId) -> Option<String> {
    ["use", "usehref"]
        .iter()
        .filter_map(|attr| dom.attr(id, attr))
        .find(|r| !r.trim().is_empty())
        .map(|r| r.trim().to_string())
}

fn resolve_node(dom: &mut Dom, som: &SomResolver, id: NodeId, ancestors: &mut HashSet<NodeId>) {
    let Some(reference) = reference(dom, id) else {
        return;
    };
    dom.remove_attr(id, "use");
    dom.remove_attr(id, "usehref");

    let Some(proto) = find_proto(dom, som, id, &reference) else {
        tracing::warn!(reference = %reference, "prototype not found");
        return;
    };
    if dom.tag(proto) != dom.tag(id) {
        tracing::warn!(
            reference = %reference,
            node = dom.tag(id).as_str(),
            proto = dom.tag(proto).as_str(),
            "prototype has a different element type"
        );
        return;
    }
    if proto == id || ancestors.contains(&proto) || dom.is_descendant_of(id, proto) {
        tracing::warn!(reference = %reference, "cyclic prototype reference ignored");
        return;
    }

    ancestors.insert(id);
    resolve_node(dom, som, proto, ancestors);
    merge(dom, som, id, proto, ancestors);
    ancestors.remove(&id);
}

fn find_proto(dom: &Dom, som: &SomResolver, id: NodeId, reference: &str) -> Option<NodeId> {
    let expr = if let Some(inner) = reference
        .strip_prefix(".#som(")
        .or_else(|| reference.strip_prefix("#som("))
    {
        inner.strip_suffix(')')?.to_string()
    } else if reference.starts_with('#') {
        return dom.lookup_id(&reference[1..]);
    } else if reference.contains('#') || reference.contains("://") {
        tracing::warn!(reference, "external prototype references are not supported");
        return None;
    } else {
        reference.to_string()
    };
    som.resolve_first(dom, id, &expr)
}

/// Fill in what `id` lacks from `proto`.
fn merge(dom: &mut Dom, som: &SomResolver, id: NodeId, proto: NodeId, ancestors: &mut HashSet<NodeId>) {
    let inherited: Vec<(String, String)> = dom
        .node(proto)
        .attributes
        .iter()
        .filter(|(key, _)| !NOT_INHERITED.contains(&key.as_str()))
        .cloned()
        .collect();
    for (key, value) in inherited {
        if dom.attr(id, &key).is_none() {
            dom.set_attr(id, &key, &value);
        }
    }
    if dom.content(id).is_none() {
        let content = dom.content(proto).cloned();
        dom.set_content(id, content);
    }

    let parent_tag = dom.tag(id);
    let proto_children: Vec<NodeId> = dom.children(proto).to_vec();
    let mut seen_per_tag: Vec<(crate::dom::Tag, usize)> = Vec::new();
    for proto_child in proto_children {
        let tag = dom.tag(proto_child);
        let rank = match seen_per_tag.iter_mut().find(|(t, _)| *t == tag) {
            Some((_, n)) => {
                *n += 1;
                *n - 1
            }
            None => {
                seen_per_tag.push((tag, 1));
                0
            }
        };
        let own: Vec<NodeId> = dom.children_by_tag(id, tag).collect();
        match slot(parent_tag, tag) {
            Slot::Single => match own.first() {
                Some(&existing) => {
                    // An explicit reference on the child wins over the inherited one.
                    if reference(dom, existing).is_some() {
                        resolve_node(dom, som, existing, ancestors);
                    }
                    merge(dom, som, existing, proto_child, ancestors);
                }
                None => {
                    let copy = dom.clone_subtree(proto_child);
                    dom.append_child(id, copy);
                }
            },
            Slot::Many { max } => {
                if rank >= own.len() && own.len() < max {
                    let copy = dom.clone_subtree(proto_child);
                    dom.append_child(id, copy);
                }
            }
        }
    }
}

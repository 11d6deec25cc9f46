//! # SOM Resolver
//!
//! Evaluates Scripting Object Model path expressions such as
//! `$data.form1.item[*]`, `#PageArea2` or `address.zip` against the node
//! tree.
//!
//! An expression is a chain of segments. Each segment maps every current
//! node to its matching children, then the segment's index either picks the
//! n-th match per node or keeps them all:
//!
//! ```text
//! $record . items . item[*]
//!   │        │       └── every <item> under each <items>
//!   │        └────────── <items> children of the record
//!   └─────────────────── first data record (anchor)
//! ```
//!
//! Template lookups are cached per (node, segment); the cache is dropped as
//! soon as the tree's structural generation changes. Data lookups are never
//! cached since binding keeps inserting data nodes.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::dom::{Dom, NodeId, Tag};

/// A resolved node, or an attribute of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Node(NodeId),
    Attribute { owner: NodeId, name: String },
}

impl Target {
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Target::Node(id) => Some(*id),
            Target::Attribute { .. } => None,
        }
    }
}

/// How a segment is joined to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `a.b`: direct children (through transparent containers).
    Dot,
    /// `a..b`: descendants at any depth.
    DotDot,
    /// `a.#b`: children by class (element name).
    DotHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    All,
    At(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    pub operator: Operator,
    pub index: Index,
}

fn parse_index(raw: &str) -> Option<Index> {
    let raw = raw.trim();
    if raw == "*" {
        return Some(Index::All);
    }
    match raw.parse::<i64>().ok()? {
        n if n < 0 => Some(Index::All),
        n => Some(Index::At(n as usize)),
    }
}

fn name_len(s: &str) -> usize {
    s.find(|c| c == '.' || c == '[').unwrap_or(s.len())
}

/// Split an expression into segments. Returns `None` on a syntax error, on
/// `..` when `allow_dot_dot` is false, and on predicate (`.[`) or script
/// (`.(`) sub-expressions.
pub fn parse_expression(expr: &str, allow_dot_dot: bool) -> Option<Vec<Segment>> {
    let expr = expr.trim();
    let first = name_len(expr);
    if first == 0 {
        return None;
    }
    let mut segments = vec![Segment {
        name: expr[..first].to_string(),
        operator: Operator::Dot,
        index: Index::All,
    }];

    let mut pos = first;
    while pos < expr.len() {
        let rest = &expr[pos..];
        if let Some(after) = rest.strip_prefix('[') {
            let close = after.find(']')?;
            let last = segments.last_mut()?;
            last.index = parse_index(&after[..close])?;
            pos += close + 2;
            continue;
        }

        if !rest.starts_with('.') {
            return None;
        }
        pos += 1;
        let operator = match expr[pos..].chars().next() {
            Some('.') => {
                if !allow_dot_dot {
                    return None;
                }
                pos += 1;
                Operator::DotDot
            }
            Some('#') => {
                pos += 1;
                Operator::DotHash
            }
            Some('[') | Some('(') => return None,
            _ => Operator::Dot,
        };
        let len = name_len(&expr[pos..]);
        if len == 0 {
            return None;
        }
        segments.push(Segment {
            name: expr[pos..pos + len].to_string(),
            operator,
            index: Index::All,
        });
        pos += len;
    }
    Some(segments)
}

enum Anchor {
    Found(NodeId),
    Missing,
    NotAnAnchor,
}

/// Interpret the first segment as an anchor when it is one.
fn anchor(dom: &Dom, container: NodeId, data_root: Option<NodeId>, first: &Segment) -> Anchor {
    let data = || data_root.or_else(|| dom.data());
    let found = |node: Option<NodeId>| node.map_or(Anchor::Missing, Anchor::Found);
    let name = first.name.as_str();
    match name {
        "$" => Anchor::Found(container),
        "$data" => found(data()),
        "$record" => found(data().and_then(|d| dom.element_children(d).next())),
        "$template" | "$form" => found(dom.template()),
        "!" => found(dom.datasets()),
        "xfa" | "$xfa" => found(dom.root()),
        _ if name.starts_with('#') => found(dom.lookup_id(&name[1..])),
        _ if name.starts_with('$') => {
            tracing::debug!(anchor = name, "unsupported SOM anchor");
            Anchor::Missing
        }
        _ => Anchor::NotAnAnchor,
    }
}

/// Containers that SOM looks through without consuming a segment.
fn is_transparent(dom: &Dom, id: NodeId) -> bool {
    match dom.tag(id) {
        Tag::Area | Tag::SubformSet => true,
        Tag::Subform | Tag::ExclGroup | Tag::PageSet => dom.name_attr(id).is_none(),
        _ => false,
    }
}

fn matches_name(dom: &Dom, id: NodeId, name: &str) -> bool {
    let node = dom.node(id);
    if node.is_text() {
        return false;
    }
    node.name == name || (node.tag.is_template() && dom.name_attr(id) == Some(name))
}

fn collect_children(dom: &Dom, id: NodeId, name: &str, descend_all: bool, out: &mut Vec<NodeId>) {
    let template = dom.tag(id).is_template();
    for &child in dom.children(id) {
        if matches_name(dom, child, name) {
            out.push(child);
        }
        if descend_all || (template && is_transparent(dom, child)) {
            collect_children(dom, child, name, descend_all, out);
        }
    }
}

/// Children of `id` matching one segment.
fn segment_children(dom: &Dom, id: NodeId, segment: &Segment) -> Vec<Target> {
    let name = segment.name.as_str();
    match segment.operator {
        Operator::Dot if name == "parent" => dom.parent(id).map(Target::Node).into_iter().collect(),
        Operator::Dot => {
            let mut found = Vec::new();
            collect_children(dom, id, name, false, &mut found);
            if found.is_empty() && dom.attr(id, name).is_some() {
                return vec![Target::Attribute {
                    owner: id,
                    name: name.to_string(),
                }];
            }
            found.into_iter().map(Target::Node).collect()
        }
        Operator::DotDot => {
            let mut found = Vec::new();
            collect_children(dom, id, name, true, &mut found);
            found.into_iter().map(Target::Node).collect()
        }
        Operator::DotHash => dom
            .children(id)
            .iter()
            .copied()
            .filter(|c| dom.node(*c).name == name)
            .map(Target::Node)
            .collect(),
    }
}

/// Resolver with a per-document lookup cache.
#[derive(Debug, Default)]
pub struct SomResolver {
    cache: RefCell<HashMap<(NodeId, Operator, String), Vec<Target>>>,
    generation: Cell<u64>,
}

impl SomResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `expr` starting at `container`. Returns `None` when nothing
    /// matches or the expression cannot be evaluated.
    pub fn resolve(
        &self,
        dom: &Dom,
        container: NodeId,
        expr: &str,
        allow_dot_dot: bool,
        use_cache: bool,
    ) -> Option<Vec<Target>> {
        let Some(segments) = parse_expression(expr, allow_dot_dot) else {
            tracing::debug!(expr, "unparseable SOM expression");
            return None;
        };
        if self.generation.get() != dom.generation() {
            self.cache.borrow_mut().clear();
            self.generation.set(dom.generation());
        }

        let (mut current, mut i, qualified) = match anchor(dom, container, None, &segments[0]) {
            Anchor::Found(node) => (vec![Target::Node(node)], 1, true),
            Anchor::Missing => return None,
            Anchor::NotAnAnchor => (vec![Target::Node(container)], 0, false),
        };
        let mut container = container;

        while i < segments.len() {
            let segment = &segments[i];
            let mut groups: Vec<Vec<Target>> = Vec::new();
            for target in &current {
                let Some(node) = target.node() else {
                    continue;
                };
                let children = self.children(dom, node, segment, use_cache);
                if !children.is_empty() {
                    groups.push(children);
                }
            }

            // An unqualified name searches the container's ancestors.
            if groups.is_empty() && !qualified && i == 0 {
                container = dom.parent(container)?;
                current = vec![Target::Node(container)];
                continue;
            }

            current = match segment.index {
                Index::At(n) => groups.into_iter().filter_map(|g| g.into_iter().nth(n)).collect(),
                Index::All => groups.into_iter().flatten().collect(),
            };
            i += 1;
        }

        if current.is_empty() {
            None
        } else {
            Some(current)
        }
    }

    /// Resolve and keep node targets only.
    pub fn resolve_nodes(&self, dom: &Dom, container: NodeId, expr: &str) -> Vec<NodeId> {
        self.resolve(dom, container, expr, true, true)
            .unwrap_or_default()
            .iter()
            .filter_map(Target::node)
            .collect()
    }

    /// First node matching `expr`, if any.
    pub fn resolve_first(&self, dom: &Dom, container: NodeId, expr: &str) -> Option<NodeId> {
        self.resolve_nodes(dom, container, expr).into_iter().next()
    }

    fn children(&self, dom: &Dom, node: NodeId, segment: &Segment, use_cache: bool) -> Vec<Target> {
        let cacheable = use_cache && dom.tag(node).is_template();
        if !cacheable {
            return segment_children(dom, node, segment);
        }
        let key = (node, segment.operator, segment.name.clone());
        if let Some(hit) = self.cache.borrow().get(&key) {
            return hit.clone();
        }
        let children = segment_children(dom, node, segment);
        self.cache.borrow_mut().insert(key, children.clone());
        children
    }
}

/// Walk `expr` from `container` through the data, creating whatever data
/// nodes are missing. Returns the deepest node of the path, or `None` when
/// the expression uses `..` or a sub-expression, or a step names an
/// attribute.
pub fn create_data_node(
    dom: &mut Dom,
    data_root: NodeId,
    container: NodeId,
    expr: &str,
) -> Option<NodeId> {
    let segments = parse_expression(expr, true)?;
    if segments.iter().any(|s| s.operator == Operator::DotDot) {
        return None;
    }
    let (mut root, start) = match anchor(dom, container, Some(data_root), &segments[0]) {
        Anchor::Found(node) => (node, 1),
        Anchor::Missing => return None,
        Anchor::NotAnAnchor => (container, 0),
    };

    for (i, segment) in segments.iter().enumerate().skip(start) {
        let index = match segment.index {
            Index::At(n) => n,
            Index::All => 0,
        };
        let children: Vec<NodeId> = dom
            .element_children(root)
            .filter(|c| dom.node(*c).name == segment.name)
            .collect();
        if children.is_empty() {
            if dom.attr(root, &segment.name).is_some() {
                tracing::warn!(expr, "cannot create a data node over an attribute");
                return None;
            }
            return Some(create_nodes(dom, root, &segments[i..], index));
        }
        match children.get(index) {
            Some(child) => root = *child,
            None => return Some(create_nodes(dom, root, &segments[i..], index - children.len())),
        }
    }
    Some(root)
}

fn create_nodes(dom: &mut Dom, mut root: NodeId, path: &[Segment], first_extra: usize) -> NodeId {
    for (k, segment) in path.iter().enumerate() {
        let extra = if k == 0 {
            first_extra
        } else {
            match segment.index {
                Index::At(n) => n,
                Index::All => 0,
            }
        };
        let mut node = root;
        for _ in 0..=extra {
            node = dom.create_data_under(root, &segment.name);
        }
        root = node;
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_xdp;

    const FORM: &str = r#"<xdp:xdp xmlns:xdp="http://ns.adobe.com/xdp/">
<template xmlns="http://www.xfa.org/schema/xfa-template/3.3/">
  <subform name="form1">
    <subform name="a">
      <field name="b"/>
      <field name="b"/>
      <subform>
        <field name="c" w="1in"/>
      </subform>
    </subform>
    <pageSet><pageArea name="Page1" id="p1"/></pageSet>
  </subform>
</template>
<xfa:datasets xmlns:xfa="http://www.xfa.org/schema/xfa-data/1.0/">
<xfa:data><form1><x>1</x><x>2</x><y/></form1></xfa:data>
</xfa:datasets>
</xdp:xdp>"#;

    fn setup() -> (Dom, SomResolver, NodeId) {
        let dom = parse_xdp(FORM).unwrap();
        let root = dom.root_subform().unwrap();
        (dom, SomResolver::new(), root)
    }

    #[test]
    fn parse_indices_and_operators() {
        let segs = parse_expression("a.b[1]..c.#field[*]", true).unwrap();
        assert_eq!(segs.len(), 4);
        assert_eq!(segs[1].index, Index::At(1));
        assert_eq!(segs[2].operator, Operator::DotDot);
        assert_eq!(segs[3].operator, Operator::DotHash);
        assert_eq!(segs[3].index, Index::All);
        assert!(parse_expression("a..b", false).is_none());
        assert!(parse_expression("a.[b > 1]", true).is_none());
        assert!(parse_expression("a.(1)", true).is_none());
        assert_eq!(parse_expression("a[-1]", true).unwrap()[0].index, Index::All);
    }

    #[test]
    fn indexed_lookup_is_deterministic() {
        let (dom, som, root) = setup();
        let first = som.resolve(&dom, root, "a.b[1]", false, true).unwrap();
        let second = som.resolve(&dom, root, "a.b[1]", false, true).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        let all = som.resolve(&dom, root, "a.b", false, true).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1], first[0]);
    }

    #[test]
    fn unnamed_subforms_are_transparent() {
        let (dom, som, root) = setup();
        let c = som.resolve_nodes(&dom, root, "a.c");
        assert_eq!(c.len(), 1);
        assert_eq!(dom.name_attr(c[0]), Some("c"));
    }

    #[test]
    fn attributes_and_parent() {
        let (dom, som, root) = setup();
        let w = som.resolve(&dom, root, "a.c.w", false, true).unwrap();
        assert!(matches!(&w[0], Target::Attribute { name, .. } if name == "w"));
        let parent = som.resolve_first(&dom, root, "a.parent").unwrap();
        assert_eq!(parent, root);
    }

    #[test]
    fn anchors() {
        let (dom, som, root) = setup();
        let xs = som.resolve_nodes(&dom, root, "$record.x");
        assert_eq!(xs.len(), 2);
        let page = som.resolve_first(&dom, root, "#p1").unwrap();
        assert_eq!(dom.tag(page), Tag::PageArea);
        assert!(som.resolve(&dom, root, "$bogus.x", true, true).is_none());
        let form = som.resolve_first(&dom, root, "$template.form1").unwrap();
        assert_eq!(form, root);
    }

    #[test]
    fn unqualified_names_walk_up() {
        let (dom, som, root) = setup();
        let c = som.resolve_first(&dom, root, "a.c").unwrap();
        let page = som.resolve_first(&dom, c, "Page1").unwrap();
        assert_eq!(dom.tag(page), Tag::PageArea);
    }

    #[test]
    fn recursive_descent() {
        let (dom, som, root) = setup();
        assert_eq!(som.resolve_nodes(&dom, root, "a..c").len(), 1);
        assert!(parse_expression("..c", true).is_none());
    }

    #[test]
    fn cache_follows_mutations() {
        let (mut dom, som, root) = setup();
        let a = som.resolve_first(&dom, root, "a").unwrap();
        assert_eq!(som.resolve_nodes(&dom, root, "a.b").len(), 2);
        let extra = dom.create_template(Tag::Field);
        dom.set_attr(extra, "name", "b");
        dom.append_child(a, extra);
        assert_eq!(som.resolve_nodes(&dom, root, "a.b").len(), 3);
    }

    #[test]
    fn malformed_indices_are_rejected() {
        assert!(parse_expression("a[0]é", false).is_none());
        assert!(parse_expression("a[0]b", false).is_none());
        assert!(parse_expression("a[abc]", false).is_none());
        assert!(parse_expression("a[1", false).is_none());
        let (dom, som, root) = setup();
        assert!(som.resolve(&dom, root, "a.b[0]é", false, true).is_none());
        assert!(som.resolve(&dom, root, "a.b[x]", false, true).is_none());
    }

    #[test]
    fn cache_follows_renames() {
        let (mut dom, som, root) = setup();
        let bs = som.resolve_nodes(&dom, root, "a.b");
        assert_eq!(bs.len(), 2);
        assert!(som.resolve_nodes(&dom, root, "a.renamed").is_empty());
        dom.set_attr(bs[1], "name", "renamed");
        assert_eq!(som.resolve_nodes(&dom, root, "a.renamed"), vec![bs[1]]);
        assert_eq!(som.resolve_nodes(&dom, root, "a.b"), vec![bs[0]]);
        dom.remove_attr(bs[1], "name");
        assert!(som.resolve_nodes(&dom, root, "a.renamed").is_empty());
    }

    #[test]
    fn create_data_nodes_along_path() {
        let (mut dom, som, _) = setup();
        let data = dom.data().unwrap();
        let record = dom.element_children(data).next().unwrap();

        let existing = create_data_node(&mut dom, data, record, "x[1]").unwrap();
        assert_eq!(dom.text(existing), "2");

        let created = create_data_node(&mut dom, data, record, "x[3].z").unwrap();
        assert_eq!(dom.node(created).name, "z");
        assert_eq!(som.resolve_nodes(&dom, record, "$record.x").len(), 4);

        assert!(create_data_node(&mut dom, data, record, "..x").is_none());
    }
}

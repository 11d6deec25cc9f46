//! # Node Model
//!
//! One arena holds the whole XFA packet: the `xdp` root, the template and the
//! datasets. Nodes are addressed by a copyable [`NodeId`] so the binder can
//! link template nodes to data nodes without fighting the borrow checker, and
//! so layout can keep its scratch state in side tables keyed by id.
//!
//! ```text
//! xdp
//!  ├── template
//!  │    └── subform (root) ── pageSet, subform, field, draw, ...
//!  └── datasets
//!       ├── data ── (user data nodes)
//!       └── dataDescription, signatures, ...
//! ```
//!
//! Structural mutations bump a generation counter; the SOM resolver uses it
//! to drop cached lookups.

pub mod props;
pub mod tag;

use std::collections::HashMap;

use serde::Serialize;

pub use tag::{ns, slot, Slot, Tag};

/// Index of a node in the [`Dom`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Name given to character data children of mixed-content elements.
pub const TEXT_NODE: &str = "#text";

/// A calendar date decoded from an ISO-8601 `YYYY-MM-DD` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Date {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl Date {
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().splitn(3, '-');
        let year = parts.next()?.parse().ok()?;
        let month: u32 = parts.next()?.parse().ok()?;
        let day: u32 = parts.next()?.get(..2)?.parse().ok()?;
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return None;
        }
        Some(Date { year, month, day })
    }
}

/// Scalar content of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(Date),
}

impl Content {
    /// Decode `raw` according to the value element it belongs to, keeping
    /// the raw text when it does not parse.
    pub fn typed(tag: Tag, raw: &str) -> Content {
        let trimmed = raw.trim();
        let decoded = match tag {
            Tag::Integer => trimmed.parse().ok().map(Content::Integer),
            Tag::Decimal | Tag::Float => trimmed.parse().ok().map(Content::Float),
            Tag::Boolean => match trimmed {
                "1" | "true" => Some(Content::Boolean(true)),
                "0" | "false" => Some(Content::Boolean(false)),
                _ => None,
            },
            Tag::Date => Date::parse(trimmed).map(Content::Date),
            _ => None,
        };
        decoded.unwrap_or_else(|| Content::Text(raw.to_string()))
    }

    pub fn to_text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Integer(i) => i.to_string(),
            Content::Float(f) => f.to_string(),
            Content::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
            Content::Date(d) => format!("{:04}-{:02}-{:02}", d.year, d.month, d.day),
        }
    }
}

/// A node in the arena.
#[derive(Debug, Clone)]
pub struct Node {
    /// Namespace id, see [`ns`].
    pub namespace: i32,
    pub tag: Tag,
    /// Local element name as written in the markup.
    pub name: String,
    /// Prefix used when the node is written back out (`xfa:data`).
    pub prefix: Option<String>,
    /// Attributes in document order, names as written (`xfa:dataNode`).
    pub attributes: Vec<(String, String)>,
    pub content: Option<Content>,
    /// Template node → data node it is bound to.
    pub binding: Option<NodeId>,
    /// Data node already matched during a `consumeData` merge.
    pub consumed: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn new(namespace: i32, tag: Tag, name: &str) -> Self {
        Node {
            namespace,
            tag,
            name: name.to_string(),
            prefix: None,
            attributes: Vec::new(),
            content: None,
            binding: None,
            consumed: false,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_text(&self) -> bool {
        self.name == TEXT_NODE
    }

    /// Attribute lookup by local name, ignoring any prefix.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name || local_part(key) == name)
            .map(|(_, value)| value.as_str())
    }
}

fn local_part(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}

/// The node arena.
#[derive(Debug, Clone, Default)]
pub struct Dom {
    nodes: Vec<Node>,
    root: Option<NodeId>,
    ids: HashMap<String, NodeId>,
    generation: u64,
}

impl Dom {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Creation ─────────────────────────────────────────────

    /// Allocate a detached node.
    pub fn create(&mut self, namespace: i32, tag: Tag, name: &str) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(namespace, tag, name));
        id
    }

    /// Allocate a detached template element.
    pub fn create_template(&mut self, tag: Tag) -> NodeId {
        self.create(ns::TEMPLATE, tag, tag.as_str())
    }

    /// Allocate a detached data element. Children of `<xfa:data>` live in
    /// no particular namespace; elsewhere they inherit the parent's.
    pub fn create_data_under(&mut self, parent: NodeId, name: &str) -> NodeId {
        let namespace = match self.node(parent).namespace {
            ns::DATASETS => ns::UNKNOWN,
            other => other,
        };
        let id = self.create(namespace, Tag::Data, name);
        self.append_child(parent, id);
        id
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    // ── Access ───────────────────────────────────────────────

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn tag(&self, id: NodeId) -> Tag {
        self.node(id).tag
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// Element children (character data nodes skipped).
    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(move |c| !self.node(*c).is_text())
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id).attr(name)
    }

    /// The `name` attribute of a template node, when non-empty.
    pub fn name_attr(&self, id: NodeId) -> Option<&str> {
        self.attr(id, "name").filter(|n| !n.is_empty())
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        let attrs = &mut self.node_mut(id).attributes;
        match attrs
            .iter_mut()
            .find(|(key, _)| key == name || local_part(key) == name)
        {
            Some(slot) => slot.1 = value.to_string(),
            None => attrs.push((name.to_string(), value.to_string())),
        }
        // Names and ids feed SOM lookups.
        self.generation += 1;
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        self.node_mut(id)
            .attributes
            .retain(|(key, _)| key != name && local_part(key) != name);
        self.generation += 1;
    }

    pub fn first_child_by_tag(&self, id: NodeId, tag: Tag) -> Option<NodeId> {
        self.children(id).iter().copied().find(|c| self.tag(*c) == tag)
    }

    pub fn children_by_tag(&self, id: NodeId, tag: Tag) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(move |c| self.tag(*c) == tag)
    }

    pub fn index_of(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.children(parent).iter().position(|c| *c == child)
    }

    /// Whether `id` is `ancestor` or lies below it.
    pub fn is_descendant_of(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// Walk up from `id` (exclusive) to the first ancestor with `tag`.
    pub fn ancestor_by_tag(&self, id: NodeId, tag: Tag) -> Option<NodeId> {
        let mut current = self.parent(id);
        while let Some(node) = current {
            if self.tag(node) == tag {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    // ── Packet anchors ───────────────────────────────────────

    pub fn template(&self) -> Option<NodeId> {
        self.first_child_by_tag(self.root?, Tag::Template)
    }

    pub fn datasets(&self) -> Option<NodeId> {
        self.first_child_by_tag(self.root?, Tag::Datasets)
    }

    /// `<xfa:data>` under the datasets packet.
    pub fn data(&self) -> Option<NodeId> {
        let datasets = self.datasets()?;
        self.children(datasets).iter().copied().find(|c| {
            let node = self.node(*c);
            node.namespace == ns::DATASETS && node.name == "data"
        })
    }

    /// The outermost subform of the template.
    pub fn root_subform(&self) -> Option<NodeId> {
        self.first_child_by_tag(self.template()?, Tag::Subform)
    }

    // ── Ids ──────────────────────────────────────────────────

    pub fn register_id(&mut self, id: &str, node: NodeId) {
        self.ids.entry(id.to_string()).or_insert(node);
    }

    pub fn lookup_id(&self, id: &str) -> Option<NodeId> {
        self.ids.get(id).copied()
    }

    // ── Structure ────────────────────────────────────────────

    /// Append `child` to `parent`, detaching it from any previous parent.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[parent.index()].children.push(child);
        self.nodes[child.index()].parent = Some(parent);
        self.generation += 1;
    }

    /// Insert `child` at `index` among `parent`'s children.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.detach(child);
        let children = &mut self.nodes[parent.index()].children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.nodes[child.index()].parent = Some(parent);
        self.generation += 1;
    }

    /// Remove `child` from its parent. The node stays in the arena.
    pub fn detach(&mut self, child: NodeId) {
        if let Some(parent) = self.nodes[child.index()].parent.take() {
            self.nodes[parent.index()].children.retain(|c| *c != child);
            self.generation += 1;
        }
    }

    /// Deep-copy the subtree at `id`. The copy is detached, unbound and
    /// unconsumed.
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let source = self.node(id).clone();
        let copy = self.create(source.namespace, source.tag, &source.name);
        {
            let node = self.node_mut(copy);
            node.prefix = source.prefix;
            node.attributes = source.attributes;
            node.content = source.content;
        }
        for child in source.children {
            let child_copy = self.clone_subtree(child);
            self.nodes[copy.index()].children.push(child_copy);
            self.nodes[child_copy.index()].parent = Some(copy);
        }
        self.generation += 1;
        copy
    }

    // ── Content ──────────────────────────────────────────────

    pub fn content(&self, id: NodeId) -> Option<&Content> {
        self.node(id).content.as_ref()
    }

    pub fn set_content(&mut self, id: NodeId, content: Option<Content>) {
        self.node_mut(id).content = content;
    }

    /// Text of a node: its own content, or the concatenated text of its
    /// descendants for mixed content.
    pub fn text(&self, id: NodeId) -> String {
        if let Some(content) = self.content(id) {
            return content.to_text();
        }
        let mut out = String::new();
        for child in self.children(id) {
            out.push_str(&self.text(*child));
        }
        out
    }

    /// Dataset value/group classification. An explicit `xfa:dataNode`
    /// attribute wins; otherwise a node without element children (or whose
    /// first child is rich text) is a value.
    pub fn is_data_value(&self, id: NodeId) -> bool {
        match self.attr(id, "dataNode") {
            Some("dataValue") => return true,
            Some("dataGroup") => return false,
            _ => {}
        }
        let mut elements = self.element_children(id);
        match elements.next() {
            None => true,
            Some(first) => self.node(first).namespace == ns::XHTML,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_tree() -> (Dom, NodeId, NodeId, NodeId) {
        let mut dom = Dom::new();
        let root = dom.create_template(Tag::Subform);
        let a = dom.create_template(Tag::Field);
        let b = dom.create_template(Tag::Field);
        dom.append_child(root, a);
        dom.append_child(root, b);
        (dom, root, a, b)
    }

    #[test]
    fn reparenting_detaches_first() {
        let (mut dom, root, a, b) = small_tree();
        dom.append_child(a, b);
        assert_eq!(dom.children(root), &[a]);
        assert_eq!(dom.parent(b), Some(a));
    }

    #[test]
    fn insert_child_places_after_original() {
        let (mut dom, root, a, b) = small_tree();
        let c = dom.clone_subtree(a);
        dom.insert_child(root, 1, c);
        assert_eq!(dom.children(root), &[a, c, b]);
    }

    #[test]
    fn clone_is_deep_and_unbound() {
        let (mut dom, root, a, _) = small_tree();
        let value = dom.create_template(Tag::Value);
        dom.append_child(a, value);
        dom.node_mut(a).binding = Some(root);
        let copy = dom.clone_subtree(a);
        assert_eq!(dom.children(copy).len(), 1);
        assert_ne!(dom.children(copy)[0], value);
        assert_eq!(dom.node(copy).binding, None);
        assert_eq!(dom.parent(copy), None);
    }

    #[test]
    fn generation_moves_on_mutation() {
        let (mut dom, root, a, _) = small_tree();
        let before = dom.generation();
        dom.detach(a);
        assert!(dom.generation() > before);
        assert_eq!(dom.children(root).len(), 1);
    }

    #[test]
    fn data_value_classification() {
        let mut dom = Dom::new();
        let group = dom.create(ns::UNKNOWN, Tag::Data, "group");
        let value = dom.create_data_under(group, "value");
        assert!(!dom.is_data_value(group));
        assert!(dom.is_data_value(value));
        dom.set_attr(value, "xfa:dataNode", "dataGroup");
        assert!(!dom.is_data_value(value));
    }

    #[test]
    fn typed_content_decoding() {
        assert_eq!(Content::typed(Tag::Integer, " 42 "), Content::Integer(42));
        assert_eq!(
            Content::typed(Tag::Date, "2024-02-29"),
            Content::Date(Date { year: 2024, month: 2, day: 29 })
        );
        assert_eq!(Content::typed(Tag::Integer, "n/a"), Content::Text("n/a".into()));
        assert_eq!(Content::Boolean(true).to_text(), "1");
    }
}

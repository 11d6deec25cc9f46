//! # Loader
//!
//! Builds a [`Dom`] from XDP markup with quick-xml. Namespace prefixes are
//! resolved through a scope stack of `xmlns` declarations; the namespace
//! decides whether an element becomes a template node, a data node or rich
//! text.
//!
//! Dataset character data is kept verbatim. A data element whose only child
//! is text stores it as content; mixed content keeps `#text` children so the
//! serializer can write it back in order.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::dom::{ns, slot, Content, Dom, NodeId, Slot, Tag, TEXT_NODE};
use crate::error::{Result, XfaError};

/// Parse a complete `<xdp:xdp>` packet. A bare `<template>` root is accepted
/// and wrapped.
pub fn parse_xdp(xml: &str) -> Result<Dom> {
    let mut dom = Dom::new();
    let top = Loader::new(&mut dom).parse(xml, None)?;
    let root = match top {
        Some(node) if dom.tag(node) == Tag::Xdp => node,
        Some(node) => {
            let xdp = create_xdp(&mut dom);
            dom.append_child(xdp, node);
            xdp
        }
        None => return Err(XfaError::Malformed("the document is empty".into())),
    };
    dom.set_root(root);
    finish(dom)
}

/// Parse a template packet and an optional datasets packet given as
/// separate documents. The datasets string may be either
/// `<xfa:datasets>` or a bare `<xfa:data>`.
pub fn parse_parts(template: &str, datasets: Option<&str>) -> Result<Dom> {
    let mut dom = Dom::new();
    let xdp = create_xdp(&mut dom);
    dom.set_root(xdp);
    Loader::new(&mut dom).parse(template, Some(xdp))?;
    if let Some(datasets) = datasets {
        Loader::new(&mut dom).parse(datasets, Some(xdp))?;
    }
    finish(dom)
}

fn create_xdp(dom: &mut Dom) -> NodeId {
    let xdp = dom.create(ns::XDP, Tag::Xdp, "xdp");
    dom.node_mut(xdp).prefix = Some("xdp".into());
    xdp
}

/// Validate the packet and make sure `datasets/data` exists.
fn finish(mut dom: Dom) -> Result<Dom> {
    if dom.template().is_none() {
        return Err(XfaError::MissingTemplate);
    }
    if dom.root_subform().is_none() {
        return Err(XfaError::MissingRootSubform);
    }
    let root = dom.root().ok_or(XfaError::MissingTemplate)?;

    let datasets = match dom.datasets() {
        Some(datasets) => datasets,
        None => {
            let datasets = dom.create(ns::DATASETS, Tag::Datasets, "datasets");
            dom.node_mut(datasets).prefix = Some("xfa".into());
            let strays: Vec<NodeId> = dom
                .children(root)
                .iter()
                .copied()
                .filter(|c| dom.tag(*c) == Tag::Data)
                .collect();
            dom.append_child(root, datasets);
            for stray in strays {
                dom.append_child(datasets, stray);
            }
            datasets
        }
    };
    if dom.data().is_none() {
        let data = dom.create(ns::DATASETS, Tag::Data, "data");
        dom.node_mut(data).prefix = Some("xfa".into());
        dom.append_child(datasets, data);
    }
    Ok(dom)
}

struct Frame {
    node: NodeId,
    scope_len: usize,
}

struct Loader<'d> {
    dom: &'d mut Dom,
    /// (prefix, namespace id); the default namespace has an empty prefix.
    scopes: Vec<(String, i32)>,
    stack: Vec<Frame>,
}

impl<'d> Loader<'d> {
    fn new(dom: &'d mut Dom) -> Self {
        Self {
            dom,
            scopes: Vec::new(),
            stack: Vec::new(),
        }
    }

    /// Parse `xml` under `parent`, returning the document element.
    fn parse(&mut self, xml: &str, parent: Option<NodeId>) -> Result<Option<NodeId>> {
        let mut reader = Reader::from_str(xml);
        let mut top = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let node = self.open(&e, parent)?;
                    top.get_or_insert(node);
                }
                Event::Empty(e) => {
                    let node = self.open(&e, parent)?;
                    top.get_or_insert(node);
                    self.close();
                }
                Event::End(_) => self.close(),
                Event::Text(t) => {
                    let text = t
                        .unescape()
                        .map_err(|e| XfaError::Malformed(e.to_string()))?;
                    self.text(&text, false);
                }
                Event::CData(c) => {
                    let text = String::from_utf8(c.into_inner().into_owned())?;
                    self.text(&text, true);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !self.stack.is_empty() {
            return Err(XfaError::Malformed("unexpected end of document".into()));
        }
        Ok(top)
    }

    fn open(&mut self, e: &BytesStart<'_>, fallback_parent: Option<NodeId>) -> Result<NodeId> {
        let scope_len = self.scopes.len();
        let qname = std::str::from_utf8(e.name().as_ref())
            .map_err(|err| XfaError::Malformed(err.to_string()))?
            .to_string();

        let mut attributes = Vec::new();
        for attr in e.attributes() {
            let attr = attr?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|err| XfaError::Malformed(err.to_string()))?
                .to_string();
            let value = attr
                .unescape_value()
                .map_err(|err| XfaError::Malformed(err.to_string()))?
                .into_owned();
            if key == "xmlns" {
                self.scopes.push((String::new(), ns::from_uri(&value)));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                self.scopes.push((prefix.to_string(), ns::from_uri(&value)));
            }
            attributes.push((key, value));
        }

        let (prefix, local) = match qname.split_once(':') {
            Some((p, l)) => (Some(p.to_string()), l.to_string()),
            None => (None, qname.clone()),
        };
        let parent = self.stack.last().map(|f| f.node).or(fallback_parent);
        let namespace = self.namespace_of(prefix.as_deref(), &local, parent);
        let tag = self.classify(namespace, &local, parent);

        let node = self.dom.create(namespace, tag, &local);
        {
            let n = self.dom.node_mut(node);
            n.prefix = prefix;
            n.attributes = attributes;
        }
        if let Some(id) = self.dom.attr(node, "id").map(str::to_string) {
            self.dom.register_id(&id, node);
        }
        if let Some(parent) = parent {
            self.attach(parent, node);
        }
        self.stack.push(Frame { node, scope_len });
        Ok(node)
    }

    fn namespace_of(&self, prefix: Option<&str>, local: &str, parent: Option<NodeId>) -> i32 {
        let key = prefix.unwrap_or("");
        let declared = self
            .scopes
            .iter()
            .rev()
            .find(|(p, _)| p == key)
            .map(|(_, ns)| *ns);
        match declared {
            Some(ns) if ns != ns::UNKNOWN => ns,
            Some(_) => ns::UNKNOWN,
            None => match (prefix, parent.map(|p| self.dom.node(p))) {
                (Some("xfa"), _) => ns::DATASETS,
                (Some("xdp"), _) => ns::XDP,
                (None, Some(p)) if p.namespace == ns::TEMPLATE => ns::TEMPLATE,
                (None, Some(p)) if p.tag == Tag::Xdp && local == "template" => ns::TEMPLATE,
                (None, None) if local == "template" => ns::TEMPLATE,
                _ => ns::UNKNOWN,
            },
        }
    }

    fn classify(&self, namespace: i32, local: &str, parent: Option<NodeId>) -> Tag {
        let parent_tag = parent.map(|p| self.dom.tag(p));
        match namespace {
            ns::XHTML => Tag::Xhtml,
            ns::XDP if local == "xdp" => Tag::Xdp,
            ns::DATASETS if local == "datasets" => Tag::Datasets,
            ns::TEMPLATE => Tag::from_template_name(local),
            _ if matches!(parent_tag, Some(Tag::Datasets | Tag::Data)) => Tag::Data,
            ns::DATASETS if local == "data" => Tag::Data,
            _ if parent_tag == Some(Tag::Xhtml) => Tag::Xhtml,
            _ => Tag::Unknown,
        }
    }

    /// Attach `child` unless its slot under `parent` is already full.
    fn attach(&mut self, parent: NodeId, child: NodeId) {
        let parent_tag = self.dom.tag(parent);
        let child_tag = self.dom.tag(child);
        if parent_tag.is_template() && child_tag.is_template() {
            let present = self.dom.children_by_tag(parent, child_tag).count();
            let full = match slot(parent_tag, child_tag) {
                Slot::Single => present >= 1,
                Slot::Many { max } => present >= max,
            };
            if full {
                tracing::warn!(
                    parent = parent_tag.as_str(),
                    child = child_tag.as_str(),
                    "extra child element ignored"
                );
                return;
            }
        }
        self.dom.append_child(parent, child);
    }

    fn close(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        self.scopes.truncate(frame.scope_len);

        // A data value holding nothing but text keeps it as content.
        let node = frame.node;
        if self.dom.tag(node) == Tag::Data {
            let children = self.dom.children(node);
            if children.len() == 1 && self.dom.node(children[0]).is_text() {
                let text_node = children[0];
                let content = self.dom.content(text_node).cloned();
                self.dom.detach(text_node);
                self.dom.set_content(node, content);
            }
        }
    }

    fn text(&mut self, text: &str, verbatim: bool) {
        let Some(frame) = self.stack.last() else {
            return;
        };
        let node = frame.node;
        let tag = self.dom.tag(node);
        let blank = text.trim().is_empty();

        match tag {
            Tag::Xhtml | Tag::Data => {
                if blank && !verbatim && tag == Tag::Data {
                    return;
                }
                let namespace = self.dom.node(node).namespace;
                let text_node = self.dom.create(namespace, tag, TEXT_NODE);
                self.dom.set_content(text_node, Some(Content::Text(text.to_string())));
                self.dom.append_child(node, text_node);
            }
            Tag::Datasets | Tag::Xdp | Tag::Template => {}
            _ => {
                if blank && !verbatim {
                    return;
                }
                let joined = match self.dom.content(node) {
                    Some(Content::Text(prev)) => format!("{}{}", prev, text),
                    _ => text.to_string(),
                };
                let content = if tag.is_value_content() {
                    Content::typed(tag, &joined)
                } else {
                    Content::Text(joined)
                };
                self.dom.set_content(node, Some(content));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XDP: &str = r#"<?xml version="1.0"?>
<xdp:xdp xmlns:xdp="http://ns.adobe.com/xdp/">
  <template xmlns="http://www.xfa.org/schema/xfa-template/3.3/">
    <subform name="form1" layout="tb">
      <field name="a" id="fa"><value><integer>42</integer></value></field>
      <field name="b"><items><text>x</text></items><items><text>y</text></items><items><text>z</text></items></field>
    </subform>
  </template>
  <xfa:datasets xmlns:xfa="http://www.xfa.org/schema/xfa-data/1.0/">
    <xfa:data>
      <form1><a>7</a><note>one <b>two</b></note></form1>
    </xfa:data>
  </xfa:datasets>
</xdp:xdp>"#;

    #[test]
    fn packets_are_classified() {
        let dom = parse_xdp(XDP).unwrap();
        let root = dom.root_subform().unwrap();
        assert_eq!(dom.name_attr(root), Some("form1"));
        let data = dom.data().unwrap();
        let record = dom.children(data)[0];
        assert_eq!(dom.node(record).name, "form1");
        assert_eq!(dom.tag(record), Tag::Data);
    }

    #[test]
    fn typed_value_and_ids() {
        let dom = parse_xdp(XDP).unwrap();
        let field = dom.lookup_id("fa").unwrap();
        let value = dom.first_child_by_tag(field, Tag::Value).unwrap();
        let integer = dom.first_child_by_tag(value, Tag::Integer).unwrap();
        assert_eq!(dom.content(integer), Some(&Content::Integer(42)));
    }

    #[test]
    fn items_arity_is_enforced() {
        let dom = parse_xdp(XDP).unwrap();
        let root = dom.root_subform().unwrap();
        let b = dom.children(root)[1];
        assert_eq!(dom.children_by_tag(b, Tag::Items).count(), 2);
    }

    #[test]
    fn mixed_content_keeps_text_nodes() {
        let dom = parse_xdp(XDP).unwrap();
        let record = dom.children(dom.data().unwrap())[0];
        let a = dom.children(record)[0];
        assert_eq!(dom.content(a), Some(&Content::Text("7".into())));
        let note = dom.children(record)[1];
        assert_eq!(dom.children(note).len(), 2);
        assert!(dom.node(dom.children(note)[0]).is_text());
        assert!(!dom.is_data_value(note));
        assert_eq!(dom.text(note), "one two");
    }

    #[test]
    fn missing_pieces_are_errors() {
        let no_template = r#"<xdp:xdp xmlns:xdp="http://ns.adobe.com/xdp/"/>"#;
        assert!(matches!(parse_xdp(no_template), Err(XfaError::MissingTemplate)));
        let no_subform = r#"<template xmlns="http://www.xfa.org/schema/xfa-template/3.3/"/>"#;
        assert!(matches!(parse_parts(no_subform, None), Err(XfaError::MissingRootSubform)));
        assert!(parse_xdp("<a><b></a>").is_err());
    }

    #[test]
    fn parts_create_empty_data() {
        let template = r#"<template><subform name="f"/></template>"#;
        let dom = parse_parts(template, None).unwrap();
        let data = dom.data().unwrap();
        assert!(dom.children(data).is_empty());

        let data_only = r#"<xfa:data xmlns:xfa="http://www.xfa.org/schema/xfa-data/1.0/"><f/></xfa:data>"#;
        let dom = parse_parts(template, Some(data_only)).unwrap();
        assert_eq!(dom.children(dom.data().unwrap()).len(), 1);
    }
}

//! # Dataset serialization
//!
//! Writes the datasets packet back out with field edits applied. Packets
//! other than `<xfa:data>` (connection data, signatures, ...) come first,
//! unchanged; the data subtree follows. Names, prefixes, attributes and
//! child order are preserved.

use std::collections::HashMap;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::dom::{ns, Dom, NodeId};
use crate::error::{Result, XfaError};

/// Serialize the dataset of `dom`, replacing the text of every node in
/// `edits` with the given value.
pub fn serialize_values(dom: &Dom, edits: &HashMap<NodeId, String>) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    let mut start = BytesStart::new("xfa:datasets");
    start.push_attribute(("xmlns:xfa", ns::DATASETS_URI));
    writer.write_event(Event::Start(start))?;

    if let Some(datasets) = dom.datasets() {
        let data = dom.data();
        for &child in dom.children(datasets) {
            if Some(child) != data {
                write_node(&mut writer, dom, child, edits)?;
            }
        }
        if let Some(data) = data {
            write_node(&mut writer, dom, data, edits)?;
        }
    }

    writer.write_event(Event::End(BytesEnd::new("xfa:datasets")))?;
    String::from_utf8(writer.into_inner()).map_err(XfaError::from)
}

fn qualified_name(dom: &Dom, id: NodeId) -> String {
    let node = dom.node(id);
    match &node.prefix {
        Some(prefix) => format!("{}:{}", prefix, node.name),
        None => node.name.clone(),
    }
}

fn write_node(
    writer: &mut Writer<Vec<u8>>,
    dom: &Dom,
    id: NodeId,
    edits: &HashMap<NodeId, String>,
) -> Result<()> {
    let node = dom.node(id);
    if node.is_text() {
        let text = edits
            .get(&id)
            .cloned()
            .or_else(|| node.content.as_ref().map(|c| c.to_text()))
            .unwrap_or_default();
        writer.write_event(Event::Text(BytesText::new(&text)))?;
        return Ok(());
    }

    let name = qualified_name(dom, id);
    let mut start = BytesStart::new(name.as_str());
    for (key, value) in &node.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    let edited = edits.get(&id);
    let text = edited
        .cloned()
        .or_else(|| node.content.as_ref().map(|c| c.to_text()));
    let children = if edited.is_some() { &[][..] } else { dom.children(id) };

    if text.is_none() && children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    if let Some(text) = &text {
        writer.write_event(Event::Text(BytesText::new(text)))?;
    }
    for &child in children {
        write_node(writer, dom, child, edits)?;
    }
    writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_parts;

    const TEMPLATE: &str = r#"<template xmlns="http://www.xfa.org/schema/xfa-template/3.3/"><subform name="form1"/></template>"#;

    fn load(datasets: &str) -> Dom {
        parse_parts(TEMPLATE, Some(datasets)).unwrap()
    }

    #[test]
    fn data_is_written_after_other_packets() {
        let dom = load(
            r#"<xfa:datasets xmlns:xfa="http://www.xfa.org/schema/xfa-data/1.0/"><xfa:data><form1><a>1</a><b/></form1></xfa:data><dd:dataDescription xmlns:dd="urn:dd" name="x"/></xfa:datasets>"#,
        );
        let out = serialize_values(&dom, &HashMap::new()).unwrap();
        assert_eq!(
            out,
            r#"<xfa:datasets xmlns:xfa="http://www.xfa.org/schema/xfa-data/1.0/"><dd:dataDescription xmlns:dd="urn:dd" name="x"/><xfa:data><form1><a>1</a><b/></form1></xfa:data></xfa:datasets>"#
        );
    }

    #[test]
    fn edits_replace_text() {
        let dom = load(
            r#"<xfa:datasets xmlns:xfa="http://www.xfa.org/schema/xfa-data/1.0/"><xfa:data><form1><a>1</a><b/></form1></xfa:data></xfa:datasets>"#,
        );
        let data = dom.data().unwrap();
        let form1 = dom.children(data)[0];
        let a = dom.children(form1)[0];
        let b = dom.children(form1)[1];
        let edits = HashMap::from([(a, "2 < 3".to_string()), (b, "new".to_string())]);
        let out = serialize_values(&dom, &edits).unwrap();
        assert!(out.contains("<a>2 &lt; 3</a><b>new</b>"));
    }

    #[test]
    fn mixed_content_keeps_its_order() {
        let dom = load(
            r#"<xfa:datasets xmlns:xfa="http://www.xfa.org/schema/xfa-data/1.0/"><xfa:data><form1><note>one <i>two</i> three</note></form1></xfa:data></xfa:datasets>"#,
        );
        let out = serialize_values(&dom, &HashMap::new()).unwrap();
        assert!(out.contains("<note>one <i>two</i> three</note>"));
    }
}

//! # Binder
//!
//! Merges the template with the dataset. The walk is depth first over the
//! template, descending into the data in lock step:
//!
//! ```text
//! template                       data
//! subform form1 ───────────────▶ <form1>
//!   subform item (occur 0..*) ─▶   <item> ×3   (template node cloned twice)
//!     field qty ───────────────▶     <qty>
//!   field total (no data) ─────▶   <total/>    (synthesized)
//! ```
//!
//! Each bindable child picks its data by `bind.match`: by name (`once`, the
//! default), from anywhere in the dataset (`global`), through a SOM
//! reference (`dataRef`), or not at all (`none`). `occur` bounds how many data
//! nodes one template node may absorb. In `consumeData` mode a data node is
//! bound at most once.
//!
//! Binding mutates the tree once: it clones repeated nodes, removes excluded
//! ones, creates missing data and writes values. [`bind`] consumes the `Dom`
//! so the merge cannot run twice.

pub mod normalize;

use crate::dom::props::{MatchKind, MergeMode, Occur};
use crate::dom::{ns, Content, Dom, NodeId, Tag};
use crate::error::{Result, XfaError};
use crate::proto::resolve_prototypes;
use crate::som::{create_data_node, SomResolver, Target};

/// A template merged with its data, ready for layout.
#[derive(Debug)]
pub struct BoundForm {
    dom: Dom,
    som: SomResolver,
    root: NodeId,
    data: NodeId,
}

impl BoundForm {
    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    pub fn som(&self) -> &SomResolver {
        &self.som
    }

    /// The outermost subform.
    pub fn root_subform(&self) -> NodeId {
        self.root
    }

    /// `<xfa:data>`.
    pub fn data_root(&self) -> NodeId {
        self.data
    }

    /// Release the merged tree, e.g. to serialize the dataset.
    pub fn into_dom(self) -> Dom {
        self.dom
    }
}

/// Run the merge.
pub fn bind(mut dom: Dom) -> Result<BoundForm> {
    let template = dom.template().ok_or(XfaError::MissingTemplate)?;
    let root = dom.root_subform().ok_or(XfaError::MissingRootSubform)?;
    let datasets = dom
        .datasets()
        .ok_or_else(|| XfaError::Malformed("the document has no datasets packet".into()))?;
    let data = dom
        .data()
        .ok_or_else(|| XfaError::Malformed("the datasets packet has no data".into()))?;

    let som = SomResolver::new();
    resolve_prototypes(&mut dom, &som);
    normalize::upgrade_breaks(&mut dom, root);
    normalize::ensure_page_set(&mut dom, root);

    let empty_merge = dom.element_children(data).next().is_none();
    let mut binder = Binder {
        dom,
        som,
        data,
        datasets,
        empty_merge,
        merge_mode: None,
    };
    binder.bind_element(template, data);

    Ok(BoundForm {
        dom: binder.dom,
        som: binder.som,
        root,
        data,
    })
}

/// A data node an instance binds to; `synthesized` ones were created
/// because the dataset had nothing to offer.
#[derive(Debug, Clone, Copy)]
struct Match {
    data: NodeId,
    synthesized: bool,
}

struct Binder {
    dom: Dom,
    som: SomResolver,
    data: NodeId,
    datasets: NodeId,
    empty_merge: bool,
    merge_mode: Option<MergeMode>,
}

fn is_bindable(tag: Tag) -> bool {
    matches!(
        tag,
        Tag::Subform | Tag::SubformSet | Tag::Area | Tag::ExclGroup | Tag::Field
    )
}

/// Fields and exclusion groups take their value from a data value.
fn has_settable_value(tag: Tag) -> bool {
    matches!(tag, Tag::Field | Tag::ExclGroup)
}

impl Binder {
    fn consume_data(&self) -> bool {
        !self.empty_merge && self.merge_mode == Some(MergeMode::ConsumeData)
    }

    fn data_namespace(&self, parent: NodeId) -> i32 {
        match self.dom.node(parent).namespace {
            ns::DATASETS => ns::UNKNOWN,
            other => other,
        }
    }

    fn synthesize(&mut self, parent: NodeId, name: &str) -> NodeId {
        let namespace = self.data_namespace(parent);
        let node = self.dom.create(namespace, Tag::Data, name);
        self.dom.append_child(parent, node);
        if self.empty_merge || self.consume_data() {
            self.dom.node_mut(node).consumed = true;
        }
        node
    }

    fn occur_info(&self, id: NodeId) -> Occur {
        if self.dom.name_attr(id).is_none() || !self.dom.has_occur(id) {
            return Occur::ONCE;
        }
        self.dom.occur(id)
    }

    fn bind_element(&mut self, form_node: NodeId, data_node: NodeId) {
        let mut excluded = Vec::new();

        let mut i = 0;
        while i < self.dom.children(form_node).len() {
            let child = self.dom.children(form_node)[i];
            i += 1;
            if self.dom.node(child).binding.is_some() {
                continue;
            }
            let tag = self.dom.tag(child);

            if self.merge_mode.is_none() && tag == Tag::Subform {
                self.bind_root(child, data_node);
                continue;
            }
            if !is_bindable(tag) {
                continue;
            }

            let bind = self.dom.bind_props(child);
            let mut global = false;
            match bind.kind {
                MatchKind::None => {
                    self.set_and_bind(child, data_node);
                    continue;
                }
                MatchKind::Global => global = true,
                MatchKind::DataRef if bind.reference.is_none() => {
                    tracing::warn!(node = tag.as_str(), "dataRef binding without a ref");
                    self.set_and_bind(child, data_node);
                    continue;
                }
                MatchKind::DataRef | MatchKind::Once => {}
            }

            let occur = self.occur_info(child);
            let max = occur.max.unwrap_or(usize::MAX);
            let mut matches = Vec::new();
            let mut synth_parent = data_node;

            if let Some(reference) = bind.reference.filter(|_| bind.kind == MatchKind::DataRef) {
                let found = self
                    .som
                    .resolve(&self.dom, data_node, &reference, true, false)
                    .unwrap_or_default();
                let mut nodes: Vec<NodeId> = found.iter().filter_map(Target::node).collect();
                if nodes.is_empty() {
                    let Some(created) = create_data_node(&mut self.dom, self.data, data_node, &reference)
                    else {
                        tracing::warn!(reference = %reference, "cannot create data for reference");
                        continue;
                    };
                    if self.consume_data() {
                        self.dom.node_mut(created).consumed = true;
                    }
                    synth_parent = self.dom.parent(created).unwrap_or(data_node);
                    matches.push(Match { data: created, synthesized: true });
                } else {
                    if self.consume_data() {
                        nodes.retain(|n| !self.dom.node(*n).consumed);
                    }
                    nodes.truncate(max);
                    if let Some(first) = nodes.first() {
                        synth_parent = self.dom.parent(*first).unwrap_or(data_node);
                    }
                    for node in nodes {
                        if self.consume_data() {
                            self.dom.node_mut(node).consumed = true;
                        }
                        matches.push(Match { data: node, synthesized: false });
                    }
                }
            } else {
                let Some(name) = self.dom.name_attr(child).map(str::to_string) else {
                    self.set_and_bind(child, data_node);
                    continue;
                };
                // A multi-select list also accepts a group of values.
                let wants_value = match tag {
                    Tag::Field if self.dom.is_multi_select(child) => None,
                    _ => Some(has_settable_value(tag)),
                };
                if self.consume_data() {
                    while matches.len() < max {
                        let Some(found) = self.find_data_by_name(&name, wants_value, data_node, global)
                        else {
                            break;
                        };
                        if matches.iter().any(|m| m.data == found) {
                            break;
                        }
                        self.dom.node_mut(found).consumed = true;
                        matches.push(Match { data: found, synthesized: false });
                    }
                } else {
                    let limit = if self.empty_merge { 1 } else { max };
                    let found: Vec<NodeId> = self
                        .dom
                        .element_children(data_node)
                        .filter(|c| self.dom.node(*c).name == name)
                        .filter(|c| !self.empty_merge || !self.dom.node(*c).consumed)
                        .take(limit)
                        .collect();
                    for node in found {
                        if self.empty_merge {
                            self.dom.node_mut(node).consumed = true;
                        }
                        matches.push(Match { data: node, synthesized: false });
                    }
                }
            }

            // An empty merge starts with `occur.initial` instances.
            let wanted = if self.empty_merge && self.dom.has_occur(child) {
                occur.min.max(occur.initial)
            } else {
                occur.min
            };
            if matches.is_empty() && wanted == 0 {
                excluded.push(child);
                continue;
            }
            if matches.len() < wanted {
                if !matches.is_empty() {
                    tracing::debug!(
                        node = tag.as_str(),
                        found = matches.len(),
                        min = wanted,
                        "padding occurrences up to the minimum"
                    );
                }
                let name = self
                    .dom
                    .name_attr(child)
                    .map(str::to_string)
                    .unwrap_or_else(|| tag.as_str().to_string());
                while matches.len() < wanted {
                    let created = self.synthesize(synth_parent, &name);
                    matches.push(Match { data: created, synthesized: true });
                }
            }
            self.bind_occurrences(child, &matches);
        }

        for node in excluded {
            self.dom.detach(node);
        }
    }

    /// The outermost subform fixes the merge mode and binds to the first
    /// record, creating one on an empty merge.
    fn bind_root(&mut self, root: NodeId, data_node: NodeId) {
        let mode = self.dom.merge_mode(root);
        self.merge_mode = Some(mode);
        tracing::debug!(?mode, empty_merge = self.empty_merge, "merge started");

        let first = self.dom.element_children(data_node).next();
        match first {
            Some(record) => self.bind_occurrences(root, &[Match { data: record, synthesized: false }]),
            None => {
                let name = self.dom.name_attr(root).unwrap_or("root").to_string();
                let record = self.synthesize(data_node, &name);
                self.dom.node_mut(root).binding = Some(record);
                self.bind_element(root, record);
            }
        }
    }

    /// Bind `form_node` to the first match and a clone of it to every
    /// further match; clones follow the original in document order.
    fn bind_occurrences(&mut self, form_node: NodeId, matches: &[Match]) {
        let Some((first, rest)) = matches.split_first() else {
            return;
        };
        let base = if rest.is_empty() {
            None
        } else {
            Some(self.stripped_clone(form_node))
        };

        self.bind_instance(form_node, *first);

        let (Some(base), Some(parent)) = (base, self.dom.parent(form_node)) else {
            return;
        };
        let position = self.dom.index_of(parent, form_node).unwrap_or(0);
        for (i, m) in rest.iter().enumerate() {
            let clone = self.dom.clone_subtree(base);
            self.dom.insert_child(parent, position + 1 + i, clone);
            self.bind_instance(clone, *m);
        }
    }

    /// A detached copy of `id` without its `occur`, so repeated instances
    /// do not multiply again.
    fn stripped_clone(&mut self, id: NodeId) -> NodeId {
        let clone = self.dom.clone_subtree(id);
        if let Some(occur) = self.dom.first_child_by_tag(clone, Tag::Occur) {
            self.dom.detach(occur);
        }
        clone
    }

    fn bind_instance(&mut self, form_node: NodeId, m: Match) {
        if m.synthesized {
            self.bind_created(form_node, m.data);
        } else {
            self.bind_value(form_node, m.data);
            self.set_properties(form_node, m.data);
            self.bind_items(form_node, m.data);
        }
    }

    /// Bind to a freshly created data node: the template keeps its default
    /// value, which seeds the new data.
    fn bind_created(&mut self, form_node: NodeId, data: NodeId) {
        self.dom.node_mut(form_node).binding = Some(data);
        if has_settable_value(self.dom.tag(form_node)) {
            if let Some(default) = self.dom.value_text(form_node).filter(|v| !v.is_empty()) {
                self.dom.set_content(data, Some(Content::Text(default)));
            }
            self.set_properties(form_node, data);
            self.bind_items(form_node, data);
        } else {
            self.set_and_bind(form_node, data);
        }
    }

    fn set_and_bind(&mut self, form_node: NodeId, data_node: NodeId) {
        self.set_properties(form_node, data_node);
        self.bind_items(form_node, data_node);
        self.bind_element(form_node, data_node);
    }

    fn bind_value(&mut self, form_node: NodeId, data: NodeId) {
        self.dom.node_mut(form_node).binding = Some(data);
        let tag = self.dom.tag(form_node);
        let is_value = self.dom.is_data_value(data);

        if has_settable_value(tag) {
            if is_value {
                self.assign_value(form_node, data);
            } else if tag == Tag::Field && self.dom.is_multi_select(form_node) {
                let joined = self
                    .dom
                    .element_children(data)
                    .map(|c| self.dom.text(c).trim().to_string())
                    .collect::<Vec<_>>()
                    .join("\n");
                self.set_value(form_node, Content::Text(joined));
            } else if self.consume_data() {
                tracing::warn!(node = tag.as_str(), "data group bound to a value container");
            }
        } else {
            if is_value && self.consume_data() {
                tracing::warn!(node = tag.as_str(), "data value bound to a container");
            }
            self.bind_element(form_node, data);
        }
    }

    /// Copy a data value into the node (every member field for an
    /// exclusion group).
    fn assign_value(&mut self, form_node: NodeId, data: NodeId) {
        let rich = self
            .dom
            .element_children(data)
            .next()
            .filter(|c| self.dom.node(*c).namespace == ns::XHTML);
        let targets: Vec<NodeId> = if self.dom.tag(form_node) == Tag::ExclGroup {
            self.dom.children_by_tag(form_node, Tag::Field).collect()
        } else {
            vec![form_node]
        };
        for target in targets {
            match rich {
                Some(xhtml) => self.set_rich_value(target, xhtml),
                None => {
                    let text = self.dom.text(data);
                    self.set_value(target, Content::Text(text));
                }
            }
        }
        if self.dom.tag(form_node) == Tag::ExclGroup {
            let text = self.dom.text(data);
            self.set_value(form_node, Content::Text(text));
        }
    }

    fn value_element(&mut self, form_node: NodeId) -> NodeId {
        match self.dom.first_child_by_tag(form_node, Tag::Value) {
            Some(value) => value,
            None => {
                let value = self.dom.create_template(Tag::Value);
                self.dom.append_child(form_node, value);
                value
            }
        }
    }

    /// Store `content` in the node's value, decoded per the declared kind.
    fn set_value(&mut self, form_node: NodeId, content: Content) {
        let value = self.value_element(form_node);
        let existing = self
            .dom
            .children(value)
            .iter()
            .copied()
            .find(|c| self.dom.tag(*c).is_value_content());
        let text = content.to_text();
        match existing {
            Some(node) if !matches!(self.dom.tag(node), Tag::ExData | Tag::Image) => {
                let tag = self.dom.tag(node);
                self.dom.set_content(node, Some(Content::typed(tag, &text)));
            }
            other => {
                if let Some(node) = other {
                    self.dom.detach(node);
                }
                let node = self.dom.create_template(Tag::Text);
                self.dom.set_content(node, Some(Content::Text(text)));
                self.dom.append_child(value, node);
            }
        }
    }

    fn set_rich_value(&mut self, form_node: NodeId, xhtml: NodeId) {
        let value = self.value_element(form_node);
        let old: Vec<NodeId> = self
            .dom
            .children(value)
            .iter()
            .copied()
            .filter(|c| self.dom.tag(*c).is_value_content())
            .collect();
        for node in old {
            self.dom.detach(node);
        }
        let ex_data = self.dom.create_template(Tag::ExData);
        self.dom.set_attr(ex_data, "contentType", "text/html");
        let body = self.dom.clone_subtree(xhtml);
        self.dom.append_child(ex_data, body);
        self.dom.append_child(value, ex_data);
    }

    /// Name lookup among unconsumed children of `data_node`, widening to its
    /// parent and grandparent, then to the whole dataset for `global`.
    fn find_data_by_name(
        &self,
        name: &str,
        wants_value: Option<bool>,
        data_node: NodeId,
        global: bool,
    ) -> Option<NodeId> {
        let mut current = data_node;
        for _ in 0..3 {
            let hit = self.dom.element_children(current).find(|c| {
                let node = self.dom.node(*c);
                node.name == name
                    && !node.consumed
                    && wants_value.map_or(true, |v| self.dom.is_data_value(*c) == v)
            });
            if hit.is_some() {
                return hit;
            }
            if current == self.data {
                break;
            }
            match self.dom.parent(current) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        if !global {
            return None;
        }
        self.find_descendant(self.data, name, wants_value)
    }

    /// First unconsumed node named `name` anywhere below `id`.
    fn find_descendant(&self, id: NodeId, name: &str, wants_value: Option<bool>) -> Option<NodeId> {
        for child in self.dom.element_children(id) {
            let node = self.dom.node(child);
            if node.name == name
                && !node.consumed
                && wants_value.map_or(true, |v| self.dom.is_data_value(child) == v)
            {
                return Some(child);
            }
            if let Some(found) = self.find_descendant(child, name, wants_value) {
                return Some(found);
            }
        }
        None
    }

    /// Apply `<setProperty ref=... target=...>` directives.
    fn set_properties(&mut self, form_node: NodeId, data_node: NodeId) {
        let directives: Vec<NodeId> = self.dom.children_by_tag(form_node, Tag::SetProperty).collect();
        for directive in directives {
            if self.dom.attr(directive, "connection").is_some_and(|c| !c.is_empty()) {
                continue;
            }
            let Some(reference) = self.dom.attr(directive, "ref").map(str::to_string) else {
                continue;
            };
            let Some(source) = self
                .som
                .resolve(&self.dom, data_node, &reference, false, false)
                .and_then(|t| t.first().and_then(Target::node))
            else {
                tracing::warn!(reference = %reference, "setProperty: invalid reference");
                continue;
            };
            if !self.dom.is_descendant_of(source, self.data) {
                tracing::warn!(reference = %reference, "setProperty: source must be a data node");
                continue;
            }
            let target_expr = self.dom.attr(directive, "target").unwrap_or("").to_string();
            let Some(target) = self
                .som
                .resolve(&self.dom, form_node, &target_expr, false, false)
                .and_then(|t| t.into_iter().next())
            else {
                tracing::warn!(target = %target_expr, "setProperty: invalid target");
                continue;
            };

            let content = self.dom.text(source);
            let (owner, element) = match &target {
                Target::Attribute { owner, .. } => (*owner, None),
                Target::Node(node) => (*node, Some(*node)),
            };
            if !self.dom.is_descendant_of(owner, form_node) {
                tracing::warn!(target = %target_expr, "setProperty: target must be a property of the node");
                continue;
            }
            let owner_parent = self.dom.parent(owner).map(|p| self.dom.tag(p));
            let forbidden = |t: Option<Tag>| matches!(t, Some(Tag::SetProperty | Tag::BindItems));
            if forbidden(Some(self.dom.tag(owner))) || forbidden(owner_parent) {
                tracing::warn!(target = %target_expr, "setProperty: cannot target a directive");
                continue;
            }

            match (target, element) {
                (Target::Attribute { owner, name }, _) => self.dom.set_attr(owner, &name, &content),
                (_, Some(node)) => {
                    let tag = self.dom.tag(node);
                    let holds_content = tag.is_value_content()
                        || matches!(tag, Tag::ToolTip | Tag::Script | Tag::Picture)
                        || self.dom.content(node).is_some();
                    if !holds_content {
                        tracing::warn!(target = %target_expr, "setProperty: target holds no content");
                        continue;
                    }
                    self.dom.set_content(node, Some(Content::typed(tag, &content)));
                }
                _ => {}
            }
        }
    }

    /// Replace a field's items with the label and value lists drawn from
    /// `<bindItems>`.
    fn bind_items(&mut self, form_node: NodeId, data_node: NodeId) {
        let directives: Vec<NodeId> = self.dom.children_by_tag(form_node, Tag::BindItems).collect();
        if directives.is_empty() || self.dom.tag(form_node) != Tag::Field {
            return;
        }
        let old: Vec<NodeId> = self.dom.children_by_tag(form_node, Tag::Items).collect();
        for items in old {
            self.dom.detach(items);
        }
        let labels = self.dom.create_template(Tag::Items);
        let values = self.dom.create_template(Tag::Items);
        self.dom.set_attr(values, "save", "1");
        self.dom.set_attr(values, "presence", "hidden");
        self.dom.append_child(form_node, labels);
        self.dom.append_child(form_node, values);

        for directive in directives {
            if self.dom.attr(directive, "connection").is_some_and(|c| !c.is_empty()) {
                continue;
            }
            let Some(reference) = self.dom.attr(directive, "ref").map(str::to_string) else {
                continue;
            };
            let label_ref = self.dom.attr(directive, "labelRef").unwrap_or("$").to_string();
            let value_ref = self.dom.attr(directive, "valueRef").unwrap_or("$").to_string();
            let Some(nodes) = self.som.resolve(&self.dom, data_node, &reference, false, false) else {
                tracing::warn!(reference = %reference, "bindItems: invalid reference");
                continue;
            };
            for node in nodes.iter().filter_map(Target::node) {
                if !self.dom.is_descendant_of(node, self.datasets) {
                    tracing::warn!(reference = %reference, "bindItems: must be a datasets node");
                    continue;
                }
                let Some(label) = self.lookup_text(node, &label_ref) else {
                    tracing::warn!(label = %label_ref, "bindItems: invalid label");
                    continue;
                };
                let Some(value) = self.lookup_text(node, &value_ref) else {
                    tracing::warn!(value = %value_ref, "bindItems: invalid value");
                    continue;
                };
                for (list, text) in [(labels, label), (values, value)] {
                    let entry = self.dom.create_template(Tag::Text);
                    self.dom.set_content(entry, Some(Content::Text(text)));
                    self.dom.append_child(list, entry);
                }
            }
        }
    }

    fn lookup_text(&self, from: NodeId, expr: &str) -> Option<String> {
        let target = self
            .som
            .resolve(&self.dom, from, expr, true, false)?
            .into_iter()
            .next()?;
        match target {
            Target::Node(node) if self.dom.is_descendant_of(node, self.datasets) => {
                Some(self.dom.text(node))
            }
            Target::Attribute { owner, name } if self.dom.is_descendant_of(owner, self.datasets) => {
                self.dom.attr(owner, &name).map(str::to_string)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_xdp;

    fn xdp(template: &str, data: &str) -> String {
        format!(
            r#"<xdp:xdp xmlns:xdp="http://ns.adobe.com/xdp/"><template xmlns="http://www.xfa.org/schema/xfa-template/3.3/">{}</template><xfa:datasets xmlns:xfa="http://www.xfa.org/schema/xfa-data/1.0/"><xfa:data>{}</xfa:data></xfa:datasets></xdp:xdp>"#,
            template, data
        )
    }

    fn bound(template: &str, data: &str) -> BoundForm {
        bind(parse_xdp(&xdp(template, data)).unwrap()).unwrap()
    }

    fn named(form: &BoundForm, expr: &str) -> Vec<NodeId> {
        form.som().resolve_nodes(form.dom(), form.root_subform(), expr)
    }

    #[test]
    fn occurrences_follow_data() {
        let form = bound(
            r#"<subform name="form1"><subform name="item"><occur min="2" max="4"/><field name="v"/></subform></subform>"#,
            "<form1><item><v>a</v></item><item><v>b</v></item><item><v>c</v></item></form1>",
        );
        let dom = form.dom();
        let items = named(&form, "item");
        assert_eq!(items.len(), 3);
        let data: Vec<NodeId> = items.iter().map(|i| dom.node(*i).binding.unwrap()).collect();
        assert_ne!(data[0], data[1]);
        assert_ne!(data[1], data[2]);
        let values: Vec<String> = named(&form, "item.v")
            .iter()
            .map(|v| dom.value_text(*v).unwrap())
            .collect();
        assert_eq!(values, vec!["a", "b", "c"]);
    }

    #[test]
    fn max_caps_matches_and_data_is_consumed_once() {
        let form = bound(
            r#"<subform name="form1"><field name="x"><occur max="2"/></field><field name="x"/></subform>"#,
            "<form1><x>1</x><x>2</x><x>3</x></form1>",
        );
        let dom = form.dom();
        let fields = named(&form, "x");
        assert_eq!(fields.len(), 3);
        let values: Vec<String> = fields.iter().map(|f| dom.value_text(*f).unwrap()).collect();
        assert_eq!(values, vec!["1", "2", "3"]);
    }

    #[test]
    fn missing_optional_nodes_are_removed() {
        let form = bound(
            r#"<subform name="form1"><subform name="opt"><occur min="0"/></subform><field name="req"><value><text>dflt</text></value></field></subform>"#,
            "<form1/>",
        );
        assert!(named(&form, "opt").is_empty());
        let req = named(&form, "req")[0];
        let data = form.dom().node(req).binding.unwrap();
        assert_eq!(form.dom().node(data).name, "req");
        assert_eq!(form.dom().text(data), "dflt");
        assert_eq!(form.dom().value_text(req).as_deref(), Some("dflt"));
    }

    #[test]
    fn minimum_is_padded() {
        let form = bound(
            r#"<subform name="form1"><subform name="row"><occur min="3" max="-1"/><field name="c"/></subform></subform>"#,
            "<form1><row><c>only</c></row></form1>",
        );
        assert_eq!(named(&form, "row").len(), 3);
        let record = form.dom().element_children(form.data_root()).next().unwrap();
        assert_eq!(form.dom().element_children(record).count(), 3);
    }

    #[test]
    fn empty_merge_creates_records_and_initial_instances() {
        let form = bound(
            r#"<subform name="form1"><subform name="line"><occur min="0" max="5" initial="3"/><field name="q"/></subform></subform>"#,
            "",
        );
        let dom = form.dom();
        let record = dom.node(form.root_subform()).binding.unwrap();
        assert_eq!(dom.node(record).name, "form1");
        assert_eq!(named(&form, "line").len(), 3);
        assert_eq!(dom.element_children(record).count(), 3);
    }

    #[test]
    fn data_ref_and_global() {
        let form = bound(
            r#"<subform name="form1">
                 <field name="a"><bind match="dataRef" ref="$.deep.value"/></field>
                 <subform name="inner"><field name="g"><bind match="global"/></field></subform>
                 <field name="n"><bind match="none"/></field>
               </subform>"#,
            "<form1><deep><value>v</value></deep><g>G</g><n>N</n></form1>",
        );
        let dom = form.dom();
        assert_eq!(dom.value_text(named(&form, "a")[0]).as_deref(), Some("v"));
        assert_eq!(dom.value_text(named(&form, "inner.g")[0]).as_deref(), Some("G"));
        let n = named(&form, "n")[0];
        assert_eq!(dom.node(n).binding, None);
        assert_eq!(dom.value_text(n), None);
    }

    #[test]
    fn global_match_binds_a_data_node_once() {
        for max in ["3", "-1"] {
            let form = bound(
                &format!(
                    r#"<subform name="form1"><subform name="inner"><field name="g"><occur max="{}"/><bind match="global"/></field></subform></subform>"#,
                    max
                ),
                "<form1><g>G</g><inner/></form1>",
            );
            let dom = form.dom();
            let fields = named(&form, "inner.g[*]");
            assert_eq!(fields.len(), 1, "max={}", max);
            let data = dom.node(fields[0]).binding.unwrap();
            assert_eq!(dom.text(data), "G");
        }
    }

    #[test]
    fn match_template_mode_binds_without_consuming() {
        let form = bound(
            r#"<subform name="form1" mergeMode="matchTemplate"><field name="x"/><field name="x"/></subform>"#,
            "<form1><x>1</x></form1>",
        );
        let dom = form.dom();
        let fields = named(&form, "x[*]");
        assert_eq!(fields.len(), 2);
        let first = dom.node(fields[0]).binding.unwrap();
        let second = dom.node(fields[1]).binding.unwrap();
        assert_eq!(first, second);
        assert!(!dom.node(first).consumed);
        assert_eq!(dom.value_text(fields[1]).as_deref(), Some("1"));
    }

    #[test]
    fn data_ref_creates_missing_data() {
        let form = bound(
            r#"<subform name="form1"><field name="a"><bind match="dataRef" ref="$.made.here"/></field></subform>"#,
            "<form1/>",
        );
        let a = named(&form, "a")[0];
        let data = form.dom().node(a).binding.unwrap();
        assert_eq!(form.dom().node(data).name, "here");
    }

    #[test]
    fn excl_group_value_reaches_members() {
        let form = bound(
            r#"<subform name="form1"><exclGroup name="choice">
                 <field name="o1"><items><text>one</text></items></field>
                 <field name="o2"><items><text>two</text></items></field>
               </exclGroup></subform>"#,
            "<form1><choice>two</choice></form1>",
        );
        let dom = form.dom();
        for member in named(&form, "choice.o1").iter().chain(named(&form, "choice.o2").iter()) {
            assert_eq!(dom.value_text(*member).as_deref(), Some("two"));
        }
    }

    #[test]
    fn multi_select_joins_children() {
        let form = bound(
            r#"<subform name="form1"><field name="pick"><ui><choiceList open="multiSelect"/></ui></field></subform>"#,
            "<form1><pick><v> a </v><v>b</v></pick></form1>",
        );
        let pick = named(&form, "pick")[0];
        assert_eq!(form.dom().value_text(pick).as_deref(), Some("a\nb"));
    }

    #[test]
    fn set_property_and_bind_items() {
        let form = bound(
            r#"<subform name="form1"><field name="f" w="1in">
                 <setProperty ref="$record.label" target="caption.value.text"/>
                 <setProperty ref="$record.width" target="w"/>
                 <caption><value><text>old</text></value></caption>
                 <bindItems ref="$record.opts.opt[*]" labelRef="name" valueRef="code"/>
               </field></subform>"#,
            "<form1><f>x</f><label>New</label><width>2in</width><opts><opt><name>Red</name><code>r</code></opt><opt><name>Blue</name><code>b</code></opt></opts></form1>",
        );
        let dom = form.dom();
        let f = named(&form, "f")[0];
        let caption = dom.caption(f).unwrap();
        assert_eq!(dom.value_text(caption.node).as_deref(), Some("New"));
        assert_eq!(dom.measure(f, "w"), Some(144.0));
        assert_eq!(dom.items(f, 0), vec!["Red", "Blue"]);
        assert_eq!(dom.items(f, 1), vec!["r", "b"]);
        assert_eq!(dom.value_text(f).as_deref(), Some("x"));
    }
}

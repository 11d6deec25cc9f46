//! Typed accessors for the layout-relevant template properties.
//!
//! Template attributes are stored as strings; these helpers decode them into
//! enums and points, applying the defaults XFA prescribes.

use super::{Dom, NodeId, Tag};
use crate::units::{parse_measure, parse_measure_list};

/// `presence` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Visible,
    Invisible,
    Hidden,
    Inactive,
}

impl Presence {
    /// Hidden and inactive nodes take no space.
    pub fn takes_space(self) -> bool {
        matches!(self, Presence::Visible | Presence::Invisible)
    }
}

/// `layout` attribute of containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    Position,
    Tb,
    LrTb,
    RlTb,
    Row,
    RlRow,
    Table,
}

impl LayoutKind {
    pub fn is_line_flow(self) -> bool {
        matches!(self, LayoutKind::LrTb | LayoutKind::RlTb)
    }

    pub fn is_row(self) -> bool {
        matches!(self, LayoutKind::Row | LayoutKind::RlRow)
    }

    pub fn is_right_to_left(self) -> bool {
        matches!(self, LayoutKind::RlTb | LayoutKind::RlRow)
    }
}

/// `anchorType`: the point of the node that sits at (x, y).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorType {
    TopLeft,
    TopCenter,
    TopRight,
    MiddleLeft,
    MiddleCenter,
    MiddleRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl AnchorType {
    /// Fractions of (w, h) to subtract from (x, y) to get the top-left corner.
    pub fn offsets(self) -> (f64, f64) {
        match self {
            AnchorType::TopLeft => (0.0, 0.0),
            AnchorType::TopCenter => (0.5, 0.0),
            AnchorType::TopRight => (1.0, 0.0),
            AnchorType::MiddleLeft => (0.0, 0.5),
            AnchorType::MiddleCenter => (0.5, 0.5),
            AnchorType::MiddleRight => (1.0, 0.5),
            AnchorType::BottomLeft => (0.0, 1.0),
            AnchorType::BottomCenter => (0.5, 1.0),
            AnchorType::BottomRight => (1.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Margins {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Margins {
    pub fn horizontal(&self) -> f64 {
        self.left + self.right
    }

    pub fn vertical(&self) -> f64 {
        self.top + self.bottom
    }
}

/// Resolved `occur` bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occur {
    pub min: usize,
    /// `None` means unbounded (`max="-1"`).
    pub max: Option<usize>,
    pub initial: usize,
}

impl Occur {
    pub const ONCE: Occur = Occur { min: 1, max: Some(1), initial: 1 };

    pub fn allows(&self, count: usize) -> bool {
        self.max.map_or(true, |max| count < max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepIntact {
    None,
    ContentArea,
    PageArea,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionPlacement {
    Left,
    Right,
    Top,
    Bottom,
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptionProps {
    pub node: NodeId,
    pub placement: CaptionPlacement,
    /// Declared space reserved for the caption, `None` when sized to content.
    pub reserve: Option<f64>,
}

/// Raw `<font>` settings; unset values fall back to configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FontProps {
    pub typeface: Option<String>,
    pub size: Option<f64>,
    pub bold: bool,
    pub italic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ParaProps {
    pub space_above: f64,
    pub space_below: f64,
    pub margin_left: f64,
    pub margin_right: f64,
    pub text_indent: f64,
    /// Explicit line height, `None` for the font's natural height.
    pub line_height: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Once,
    None,
    Global,
    DataRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BindProps {
    pub kind: MatchKind,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    ConsumeData,
    MatchTemplate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    OrderedOccurrence,
    SimplexPaginated,
    DuplexPaginated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagePosition {
    Any,
    First,
    Last,
    Rest,
    Only,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OddOrEven {
    Any,
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    Auto,
    ContentArea,
    PageArea,
}

impl Dom {
    /// A measurement attribute (`w`, `h`, `x`, `y`, `minW`, ...) in points.
    pub fn measure(&self, id: NodeId, attr: &str) -> Option<f64> {
        self.attr(id, attr).and_then(parse_measure)
    }

    pub fn presence(&self, id: NodeId) -> Presence {
        match self.attr(id, "presence") {
            Some("hidden") => Presence::Hidden,
            Some("invisible") => Presence::Invisible,
            Some("inactive") => Presence::Inactive,
            _ => Presence::Visible,
        }
    }

    pub fn layout_kind(&self, id: NodeId) -> LayoutKind {
        match self.attr(id, "layout") {
            Some("tb") => LayoutKind::Tb,
            Some("lr-tb") => LayoutKind::LrTb,
            Some("rl-tb") => LayoutKind::RlTb,
            Some("row") => LayoutKind::Row,
            Some("rl-row") => LayoutKind::RlRow,
            Some("table") => LayoutKind::Table,
            _ => LayoutKind::Position,
        }
    }

    pub fn anchor(&self, id: NodeId) -> AnchorType {
        match self.attr(id, "anchorType") {
            Some("topCenter") => AnchorType::TopCenter,
            Some("topRight") => AnchorType::TopRight,
            Some("middleLeft") => AnchorType::MiddleLeft,
            Some("middleCenter") => AnchorType::MiddleCenter,
            Some("middleRight") => AnchorType::MiddleRight,
            Some("bottomLeft") => AnchorType::BottomLeft,
            Some("bottomCenter") => AnchorType::BottomCenter,
            Some("bottomRight") => AnchorType::BottomRight,
            _ => AnchorType::TopLeft,
        }
    }

    /// Rotation in degrees, counter-clockwise, snapped to a right angle.
    pub fn rotate(&self, id: NodeId) -> u32 {
        let raw: i64 = self
            .attr(id, "rotate")
            .and_then(|r| r.trim().parse().ok())
            .unwrap_or(0);
        let normalized = raw.rem_euclid(360) as u32;
        normalized - normalized % 90
    }

    /// `colSpan`, `-1` meaning "the rest of the row".
    pub fn col_span(&self, id: NodeId) -> i32 {
        self.attr(id, "colSpan")
            .and_then(|c| c.trim().parse().ok())
            .unwrap_or(1)
    }

    pub fn column_widths(&self, id: NodeId) -> Vec<f64> {
        self.attr(id, "columnWidths")
            .map(parse_measure_list)
            .unwrap_or_default()
    }

    /// Insets from the `<margin>` child, zero when absent.
    pub fn margins(&self, id: NodeId) -> Margins {
        let Some(margin) = self.first_child_by_tag(id, Tag::Margin) else {
            return Margins::default();
        };
        Margins {
            left: self.measure(margin, "leftInset").unwrap_or(0.0),
            top: self.measure(margin, "topInset").unwrap_or(0.0),
            right: self.measure(margin, "rightInset").unwrap_or(0.0),
            bottom: self.measure(margin, "bottomInset").unwrap_or(0.0),
        }
    }

    /// Occurrence bounds of a container. Page areas and page sets default to
    /// `0..unbounded`; everything else to exactly once.
    pub fn occur(&self, id: NodeId) -> Occur {
        let paging = matches!(self.tag(id), Tag::PageArea | Tag::PageSet);
        let occur = self.first_child_by_tag(id, Tag::Occur);
        let int = |name: &str| -> Option<i64> {
            occur
                .and_then(|o| self.attr(o, name))
                .and_then(|v| v.trim().parse().ok())
        };

        let declared_min = int("min").map(|m| m.max(0) as usize);
        let min = declared_min.unwrap_or(if paging { 0 } else { 1 });
        let max = match int("max") {
            Some(m) if m < 0 => None,
            Some(m) => Some((m as usize).max(min)),
            None if declared_min.is_some() => Some(min.max(1)),
            None if paging => None,
            None => Some(min.max(1)),
        };
        let default_initial = if self.parent(id).map(|p| self.tag(p)) == Some(Tag::Template) {
            1
        } else {
            min
        };
        let mut initial = int("initial").map_or(default_initial, |i| i.max(0) as usize);
        initial = initial.max(min);
        if let Some(max) = max {
            initial = initial.min(max);
        }
        Occur { min, max, initial }
    }

    /// Whether the node declared an explicit `<occur>`.
    pub fn has_occur(&self, id: NodeId) -> bool {
        self.first_child_by_tag(id, Tag::Occur).is_some()
    }

    pub fn keep_intact(&self, id: NodeId) -> KeepIntact {
        let keep = self.first_child_by_tag(id, Tag::Keep);
        match keep.and_then(|k| self.attr(k, "intact")) {
            Some("contentArea") => KeepIntact::ContentArea,
            Some("pageArea") => KeepIntact::PageArea,
            _ => KeepIntact::None,
        }
    }

    /// The visible caption of a field, draw or exclGroup.
    pub fn caption(&self, id: NodeId) -> Option<CaptionProps> {
        let node = self.first_child_by_tag(id, Tag::Caption)?;
        if !self.presence(node).takes_space() {
            return None;
        }
        let placement = match self.attr(node, "placement") {
            Some("right") => CaptionPlacement::Right,
            Some("top") => CaptionPlacement::Top,
            Some("bottom") => CaptionPlacement::Bottom,
            Some("inline") => CaptionPlacement::Inline,
            _ => CaptionPlacement::Left,
        };
        let reserve = self.measure(node, "reserve").filter(|r| *r > 0.0);
        Some(CaptionProps { node, placement, reserve })
    }

    pub fn font_props(&self, id: NodeId) -> FontProps {
        let Some(font) = self.first_child_by_tag(id, Tag::Font) else {
            return FontProps::default();
        };
        FontProps {
            typeface: self.attr(font, "typeface").map(str::to_string),
            size: self.measure(font, "size").filter(|s| *s > 0.0),
            bold: self.attr(font, "weight") == Some("bold"),
            italic: self.attr(font, "posture") == Some("italic"),
        }
    }

    pub fn para(&self, id: NodeId) -> ParaProps {
        let Some(para) = self.first_child_by_tag(id, Tag::Para) else {
            return ParaProps::default();
        };
        let get = |name: &str| self.measure(para, name).unwrap_or(0.0);
        ParaProps {
            space_above: get("spaceAbove"),
            space_below: get("spaceBelow"),
            margin_left: get("marginLeft"),
            margin_right: get("marginRight"),
            text_indent: get("textIndent"),
            line_height: self.measure(para, "lineHeight").filter(|h| *h > 0.0),
        }
    }

    pub fn bind_props(&self, id: NodeId) -> BindProps {
        let bind = self.first_child_by_tag(id, Tag::Bind);
        let kind = match bind.and_then(|b| self.attr(b, "match")) {
            Some("none") => MatchKind::None,
            Some("global") => MatchKind::Global,
            Some("dataRef") => MatchKind::DataRef,
            _ => MatchKind::Once,
        };
        let reference = bind
            .and_then(|b| self.attr(b, "ref"))
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        BindProps { kind, reference }
    }

    pub fn merge_mode(&self, id: NodeId) -> MergeMode {
        match self.attr(id, "mergeMode") {
            Some("matchTemplate") => MergeMode::MatchTemplate,
            _ => MergeMode::ConsumeData,
        }
    }

    /// Page size of a page area in points, honoring the medium orientation.
    pub fn page_size(&self, page_area: NodeId, default: (f64, f64)) -> (f64, f64) {
        let Some(medium) = self.first_child_by_tag(page_area, Tag::Medium) else {
            return default;
        };
        let short = self.measure(medium, "short").unwrap_or(default.0);
        let long = self.measure(medium, "long").unwrap_or(default.1);
        if self.attr(medium, "orientation") == Some("landscape") {
            (long, short)
        } else {
            (short, long)
        }
    }

    pub fn relation(&self, page_set: NodeId) -> Relation {
        match self.attr(page_set, "relation") {
            Some("simplexPaginated") => Relation::SimplexPaginated,
            Some("duplexPaginated") => Relation::DuplexPaginated,
            _ => Relation::OrderedOccurrence,
        }
    }

    pub fn page_position(&self, page_area: NodeId) -> PagePosition {
        match self.attr(page_area, "pagePosition") {
            Some("first") => PagePosition::First,
            Some("last") => PagePosition::Last,
            Some("rest") => PagePosition::Rest,
            Some("only") => PagePosition::Only,
            _ => PagePosition::Any,
        }
    }

    pub fn odd_or_even(&self, page_area: NodeId) -> OddOrEven {
        match self.attr(page_area, "oddOrEven") {
            Some("odd") => OddOrEven::Odd,
            Some("even") => OddOrEven::Even,
            _ => OddOrEven::Any,
        }
    }

    pub fn target_type(&self, directive: NodeId) -> TargetType {
        match self.attr(directive, "targetType") {
            Some("contentArea") => TargetType::ContentArea,
            Some("pageArea") => TargetType::PageArea,
            _ => TargetType::Auto,
        }
    }

    /// Boolean attribute written as `0`/`1`.
    pub fn flag(&self, id: NodeId, attr: &str) -> bool {
        matches!(self.attr(id, attr), Some("1") | Some("true"))
    }

    /// The content element (`<text>`, `<integer>`, `<exData>`, ...) inside
    /// the node's `<value>`.
    pub fn value_node(&self, id: NodeId) -> Option<NodeId> {
        let value = self.first_child_by_tag(id, Tag::Value)?;
        self.children(value)
            .iter()
            .copied()
            .find(|c| self.tag(*c).is_value_content())
    }

    /// Plain text of the node's value.
    pub fn value_text(&self, id: NodeId) -> Option<String> {
        self.value_node(id).map(|v| self.text(v))
    }

    /// Text entries of the n-th `<items>` list.
    pub fn items(&self, id: NodeId, n: usize) -> Vec<String> {
        self.children_by_tag(id, Tag::Items)
            .nth(n)
            .map(|items| {
                self.children(items)
                    .iter()
                    .filter(|c| self.tag(**c).is_value_content())
                    .map(|c| self.text(*c))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the field's choice list accepts several selections.
    pub fn is_multi_select(&self, id: NodeId) -> bool {
        self.first_child_by_tag(id, Tag::Ui)
            .and_then(|ui| self.first_child_by_tag(ui, Tag::ChoiceList))
            .and_then(|list| self.attr(list, "open"))
            == Some("multiSelect")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::ns;

    fn node_with_occur(parent_tag: Tag, attrs: &[(&str, &str)]) -> (Dom, NodeId) {
        let mut dom = Dom::new();
        let parent = dom.create_template(Tag::Subform);
        let node = dom.create_template(parent_tag);
        dom.append_child(parent, node);
        let occur = dom.create_template(Tag::Occur);
        for (k, v) in attrs {
            dom.set_attr(occur, k, v);
        }
        dom.append_child(node, occur);
        (dom, node)
    }

    #[test]
    fn occur_defaults() {
        let mut dom = Dom::new();
        let sub = dom.create_template(Tag::Subform);
        assert_eq!(dom.occur(sub), Occur::ONCE);
        let page = dom.create_template(Tag::PageArea);
        let occur = dom.occur(page);
        assert_eq!(occur.min, 0);
        assert_eq!(occur.max, None);
    }

    #[test]
    fn occur_bounds_and_initial() {
        let (dom, node) = node_with_occur(Tag::Subform, &[("min", "2"), ("max", "4")]);
        assert_eq!(dom.occur(node), Occur { min: 2, max: Some(4), initial: 2 });

        let (dom, node) = node_with_occur(Tag::Subform, &[("max", "-1"), ("initial", "9")]);
        let occur = dom.occur(node);
        assert_eq!(occur.max, None);
        assert_eq!(occur.initial, 9);

        let (dom, node) = node_with_occur(Tag::Subform, &[("min", "3"), ("max", "1")]);
        assert_eq!(dom.occur(node).max, Some(3));
    }

    #[test]
    fn medium_orientation_swaps() {
        let mut dom = Dom::new();
        let page = dom.create_template(Tag::PageArea);
        let medium = dom.create_template(Tag::Medium);
        dom.set_attr(medium, "short", "8.5in");
        dom.set_attr(medium, "long", "11in");
        dom.set_attr(medium, "orientation", "landscape");
        dom.append_child(page, medium);
        assert_eq!(dom.page_size(page, (1.0, 1.0)), (792.0, 612.0));
    }

    #[test]
    fn rotation_snaps() {
        let mut dom = Dom::new();
        let node = dom.create(ns::TEMPLATE, Tag::Draw, "draw");
        dom.set_attr(node, "rotate", "-90");
        assert_eq!(dom.rotate(node), 270);
        dom.set_attr(node, "rotate", "100");
        assert_eq!(dom.rotate(node), 90);
    }

    #[test]
    fn layout_and_presence() {
        let mut dom = Dom::new();
        let node = dom.create_template(Tag::Subform);
        assert_eq!(dom.layout_kind(node), LayoutKind::Position);
        dom.set_attr(node, "layout", "rl-tb");
        assert!(dom.layout_kind(node).is_right_to_left());
        dom.set_attr(node, "presence", "inactive");
        assert!(!dom.presence(node).takes_space());
    }
}

//! # Tags, Namespaces and Child Slots
//!
//! Every template element maps to one [`Tag`] variant. Dataset elements are
//! all [`Tag::Data`], rich-text markup is [`Tag::Xhtml`], and template elements
//! this crate has no behavior for are kept as [`Tag::Unknown`] so nothing in
//! the source document is silently dropped.
//!
//! The slot table ([`slot`]) declares, for a (parent, child) pair, whether the
//! child occupies a single-valued property slot or an array-valued one and how
//! many entries the array may hold.

/// Namespace identifiers attached to every node.
pub mod ns {
    /// Unknown or user namespace (plain dataset content).
    pub const UNKNOWN: i32 = -1;
    pub const XDP: i32 = 0;
    pub const TEMPLATE: i32 = 1;
    pub const DATASETS: i32 = 2;
    pub const XHTML: i32 = 3;

    pub const XDP_URI: &str = "http://ns.adobe.com/xdp/";
    pub const TEMPLATE_URI_PREFIX: &str = "http://www.xfa.org/schema/xfa-template/";
    pub const DATASETS_URI: &str = "http://www.xfa.org/schema/xfa-data/1.0/";
    pub const DATASETS_URI_PREFIX: &str = "http://www.xfa.org/schema/xfa-data/";
    pub const XHTML_URI: &str = "http://www.w3.org/1999/xhtml";

    /// Map a namespace URI to its id.
    pub fn from_uri(uri: &str) -> i32 {
        if uri.starts_with(XDP_URI) {
            XDP
        } else if uri.starts_with(TEMPLATE_URI_PREFIX) {
            TEMPLATE
        } else if uri.starts_with(DATASETS_URI_PREFIX) {
            DATASETS
        } else if uri == XHTML_URI {
            XHTML
        } else {
            UNKNOWN
        }
    }
}

macro_rules! template_tags {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// The closed set of element kinds.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Tag {
            /// `<xdp:xdp>` packet root.
            Xdp,
            /// `<xfa:datasets>`.
            Datasets,
            /// Any element of the dataset (including `<xfa:data>` itself).
            Data,
            /// Rich-text markup inside `exData`.
            Xhtml,
            /// A template element without dedicated behavior.
            Unknown,
            $($variant,)*
        }

        impl Tag {
            /// Look up a template element by its local name.
            pub fn from_template_name(name: &str) -> Tag {
                match name {
                    $($name => Tag::$variant,)*
                    _ => Tag::Unknown,
                }
            }

            /// The canonical element name, used when creating nodes.
            pub fn as_str(self) -> &'static str {
                match self {
                    Tag::Xdp => "xdp",
                    Tag::Datasets => "datasets",
                    Tag::Data => "data",
                    Tag::Xhtml => "html",
                    Tag::Unknown => "unknown",
                    $(Tag::$variant => $name,)*
                }
            }
        }
    };
}

template_tags! {
    Template => "template",
    Subform => "subform",
    SubformSet => "subformSet",
    Area => "area",
    ExclGroup => "exclGroup",
    Field => "field",
    Draw => "draw",
    PageSet => "pageSet",
    PageArea => "pageArea",
    ContentArea => "contentArea",
    Medium => "medium",
    Occur => "occur",
    Bind => "bind",
    BindItems => "bindItems",
    SetProperty => "setProperty",
    Items => "items",
    Value => "value",
    Text => "text",
    Integer => "integer",
    Decimal => "decimal",
    Float => "float",
    Boolean => "boolean",
    Date => "date",
    Time => "time",
    DateTime => "dateTime",
    ExData => "exData",
    Image => "image",
    Line => "line",
    Rectangle => "rectangle",
    Arc => "arc",
    Ui => "ui",
    TextEdit => "textEdit",
    NumericEdit => "numericEdit",
    DateTimeEdit => "dateTimeEdit",
    PasswordEdit => "passwordEdit",
    CheckButton => "checkButton",
    ChoiceList => "choiceList",
    Button => "button",
    ImageEdit => "imageEdit",
    Signature => "signature",
    Barcode => "barcode",
    Caption => "caption",
    Font => "font",
    Para => "para",
    Margin => "margin",
    Border => "border",
    Edge => "edge",
    Corner => "corner",
    Fill => "fill",
    Color => "color",
    Break => "break",
    BreakBefore => "breakBefore",
    BreakAfter => "breakAfter",
    Overflow => "overflow",
    Keep => "keep",
    Proto => "proto",
    Event => "event",
    Script => "script",
    Picture => "picture",
    Assist => "assist",
    ToolTip => "toolTip",
    Calculate => "calculate",
    Validate => "validate",
    Format => "format",
    Traversal => "traversal",
    Variables => "variables",
    Desc => "desc",
    Extras => "extras",
    Bookend => "bookend",
    Connect => "connect",
}

impl Tag {
    /// Whether nodes of this tag live in the template.
    pub fn is_template(self) -> bool {
        !matches!(self, Tag::Xdp | Tag::Datasets | Tag::Data | Tag::Xhtml)
    }

    /// Value content kinds that may sit inside `<value>` or `<items>`.
    pub fn is_value_content(self) -> bool {
        matches!(
            self,
            Tag::Text
                | Tag::Integer
                | Tag::Decimal
                | Tag::Float
                | Tag::Boolean
                | Tag::Date
                | Tag::Time
                | Tag::DateTime
                | Tag::ExData
                | Tag::Image
                | Tag::Line
                | Tag::Rectangle
                | Tag::Arc
        )
    }

    /// Widget kinds that may sit inside `<ui>`.
    pub fn is_widget(self) -> bool {
        matches!(
            self,
            Tag::TextEdit
                | Tag::NumericEdit
                | Tag::DateTimeEdit
                | Tag::PasswordEdit
                | Tag::CheckButton
                | Tag::ChoiceList
                | Tag::Button
                | Tag::ImageEdit
                | Tag::Signature
                | Tag::Barcode
        )
    }
}

/// How a child element is held by its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// At most one child of this tag.
    Single,
    /// An ordered list holding at most `max` children.
    Many { max: usize },
}

const UNBOUNDED: Slot = Slot::Many { max: usize::MAX };

/// Declared slot for `child` under `parent`. Combinations the table does not
/// know are unbounded arrays, so foreign content is preserved.
pub fn slot(parent: Tag, child: Tag) -> Slot {
    use Tag::*;
    match (parent, child) {
        (
            Subform,
            Assist | Bind | Bookend | Border | Break | Calculate | Desc | Extras | Keep | Margin
            | Occur | Overflow | PageSet | Para | Traversal | Validate | Variables,
        ) => Slot::Single,
        (
            Field,
            Assist | Bind | Border | Calculate | Caption | Desc | Extras | Font | Format | Keep
            | Margin | Para | Traversal | Ui | Validate | Value,
        ) => Slot::Single,
        (Field, Items) => Slot::Many { max: 2 },
        (
            Draw,
            Assist | Border | Caption | Desc | Extras | Font | Keep | Margin | Para | Traversal
            | Ui | Value,
        ) => Slot::Single,
        (
            ExclGroup,
            Assist | Bind | Border | Calculate | Caption | Desc | Extras | Margin | Para
            | Traversal | Validate,
        ) => Slot::Single,
        (SubformSet, Bookend | Break | Desc | Extras | Occur) => Slot::Single,
        (PageSet, Occur | Desc | Extras) => Slot::Single,
        (PageArea, Medium | Occur | Desc | Extras) => Slot::Single,
        (Caption, Value | Font | Para | Margin) => Slot::Single,
        (Value, c) if c.is_value_content() => Slot::Single,
        (Ui, c) if c.is_widget() => Slot::Single,
        (Border, Edge | Corner) => Slot::Many { max: 4 },
        (Border, Fill | Margin) => Slot::Single,
        (Edge | Corner | Fill, Color) => Slot::Single,
        (BreakBefore | BreakAfter, Script) => Slot::Single,
        (Event, Script) => Slot::Single,
        (Bind, Picture) => Slot::Single,
        (Template, Subform) => Slot::Many { max: 1 },
        _ => UNBOUNDED,
    }
}

//! # xfa-layout
//!
//! Binds XFA form templates to their data and lays them out into pages.
//!
//! An XFA form is a template (subforms, fields, draws, page geometry,
//! break and overflow rules) plus a dataset. Rendering one means merging the
//! two, then flowing the merged template through the page areas of its page
//! set until all content is placed. The page is the unit of layout: every
//! container asks whether it fits in what is left of the current content
//! area, and splittable ones resume in the next area where they stopped.
//!
//! ## Architecture
//!
//! ```text
//! XDP markup
//!       ↓
//!   [loader]    : quick-xml → node arena
//!       ↓
//!   [proto]     : resolve use/usehref prototypes
//!       ↓
//!   [bind]      : merge template with data (uses [som])
//!       ↓
//!   [paginate]  : page areas, breaks, overflow
//!       ↓
//!   [layout]    : fit and place boxes in a content area
//!       ↓
//! Vec<Page>  ──▶ [serialize] writes edited values back
//! ```

pub mod bind;
pub mod config;
pub mod dom;
pub mod error;
pub mod font;
pub mod layout;
pub mod loader;
pub mod paginate;
pub mod proto;
pub mod serialize;
pub mod som;
pub mod text;
pub mod units;

pub use bind::{bind, BoundForm};
pub use config::LayoutConfig;
pub use dom::{Dom, NodeId};
pub use error::{Result, XfaError};
pub use layout::{BoxKind, LayoutBox, Widget};
pub use loader::{parse_parts, parse_xdp};
pub use paginate::{paginate, Page, Paginator};
pub use serialize::serialize_values;

use font::FontContext;
use text::XhtmlConverter;

/// Render an XDP packet to pages.
///
/// This is the primary entry point: load, bind and paginate with the
/// default configuration.
pub fn render(xml: &str) -> Result<Vec<Page>> {
    let form = bind(parse_xdp(xml)?)?;
    let fonts = FontContext::new();
    let pages = Paginator::with_services(&form, LayoutConfig::default(), &fonts, &XhtmlConverter)
        .collect();
    Ok(pages)
}

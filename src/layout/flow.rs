//! Flow placement: where the next child goes, how much room it gets, and
//! whether it fits.

use crate::dom::props::{LayoutKind, Margins};
use crate::dom::{NodeId, Tag};

use super::measure::Declared;
use super::{BBox, LayoutBox, LayoutEngine, Parent, Space};

/// Slack allowed when comparing a size to the space left.
const ERROR: f64 = 2.0;

/// Per-container state of an attempt, kept across content areas while a
/// splittable container is in progress.
#[derive(Debug, Clone)]
pub struct Scratch {
    pub layout: LayoutKind,
    pub margins: Margins,
    /// Inner space of the container in the current area.
    pub avail: Space,
    /// Boxes placed so far (committed lines only).
    pub children: Vec<LayoutBox>,
    /// Boxes of the line being filled (lr-tb, rl-tb).
    pub line: Vec<LayoutBox>,
    pub width: f64,
    pub height: f64,
    /// Height of the line being filled.
    pub prev_height: f64,
    pub line_width: f64,
    pub attempt: usize,
    pub number_in_line: usize,
    pub columns: Vec<f64>,
    pub column: usize,
    /// Index of the next child to lay out.
    pub resume: usize,
    /// Child that failed and may hold partial content of its own.
    pub failing: Option<NodeId>,
}

impl Scratch {
    pub fn new(layout: LayoutKind, margins: Margins) -> Self {
        Self {
            layout,
            margins,
            avail: Space {
                width: 0.0,
                height: 0.0,
            },
            children: Vec::new(),
            line: Vec::new(),
            width: 0.0,
            height: 0.0,
            prev_height: 0.0,
            line_width: 0.0,
            attempt: 0,
            number_in_line: 0,
            columns: Vec::new(),
            column: 0,
            resume: 0,
            failing: None,
        }
    }

    /// Forget placed content but keep the resume position.
    pub fn reset_fragment(&mut self) {
        self.children.clear();
        self.line.clear();
        self.width = 0.0;
        self.height = 0.0;
        self.prev_height = 0.0;
        self.line_width = 0.0;
        self.attempt = 0;
        self.number_in_line = 0;
        self.column = 0;
    }

    /// The view of this container its children get.
    pub fn context(&self, node: NodeId, parent: &Parent) -> Parent {
        let own_more_width =
            self.layout.is_line_flow() && self.attempt == 0 && self.number_in_line > 0;
        Parent {
            node: Some(node),
            layout: Some(self.layout),
            attempt: self.attempt,
            number_in_line: self.number_in_line,
            more_width: own_more_width || parent.more_width,
            width: self.avail.width,
            columns: if self.layout == LayoutKind::Table {
                self.columns.clone()
            } else {
                Vec::new()
            },
        }
    }

    /// Offset and width of the cell starting at the current column.
    fn span(&self, col_span: i32) -> (f64, f64, usize) {
        if self.columns.is_empty() {
            return (self.width, (self.avail.width - self.width).max(0.0), 1);
        }
        let start = self.column.min(self.columns.len());
        let count = if col_span < 0 {
            self.columns.len() - start
        } else {
            (col_span.max(1) as usize).min(self.columns.len() - start)
        };
        let x = self.columns[..start].iter().sum();
        let w = self.columns[start..start + count].iter().sum();
        (x, w, count.max(1))
    }
}

/// Spread `width` over the columns declared as `-1` (or left out).
pub(crate) fn resolve_columns(declared: &[f64], width: f64) -> Vec<f64> {
    let fixed: f64 = declared.iter().filter(|w| **w >= 0.0).sum();
    let open = declared.iter().filter(|w| **w < 0.0).count();
    let share = if open > 0 {
        ((width - fixed) / open as f64).max(0.0)
    } else {
        0.0
    };
    declared
        .iter()
        .map(|w| if *w < 0.0 { share } else { *w })
        .collect()
}

impl LayoutEngine<'_> {
    pub(crate) fn columns_for(
        &self,
        node: NodeId,
        layout: LayoutKind,
        parent: &Parent,
        width: f64,
    ) -> Vec<f64> {
        let dom = self.dom;
        match layout {
            LayoutKind::Table => resolve_columns(&dom.column_widths(node), width),
            LayoutKind::Row | LayoutKind::RlRow => {
                if parent.layout == Some(LayoutKind::Table) && !parent.columns.is_empty() {
                    return parent.columns.clone();
                }
                let cells: usize = dom
                    .element_children(node)
                    .filter(|c| {
                        matches!(
                            dom.tag(*c),
                            Tag::Field | Tag::Draw | Tag::Subform | Tag::ExclGroup | Tag::Area
                        ) && dom.presence(*c).takes_space()
                    })
                    .map(|c| dom.col_span(c).max(1) as usize)
                    .sum();
                if cells == 0 {
                    Vec::new()
                } else {
                    vec![width / cells as f64; cells]
                }
            }
            _ => Vec::new(),
        }
    }

    /// Room offered to `child` at the current position.
    pub(crate) fn available_space(&self, scratch: &Scratch, child: NodeId) -> Space {
        let avail = scratch.avail;
        match scratch.layout {
            LayoutKind::Position => avail,
            LayoutKind::Tb | LayoutKind::Table => Space {
                width: avail.width,
                height: (avail.height - scratch.height).max(0.0),
            },
            LayoutKind::LrTb | LayoutKind::RlTb => Space {
                width: (avail.width - scratch.line_width).max(0.0),
                height: (avail.height - scratch.height).max(0.0),
            },
            LayoutKind::Row | LayoutKind::RlRow => Space {
                width: scratch.span(self.dom.col_span(child)).1,
                height: avail.height,
            },
        }
    }

    /// Place a finished child box in the container's flow.
    pub(crate) fn add_box(
        &self,
        scratch: &mut Scratch,
        mut content: LayoutBox,
        bbox: BBox,
        col_span: i32,
    ) {
        match scratch.layout {
            LayoutKind::Position => {
                content.x = bbox.x;
                content.y = bbox.y;
                scratch.width = scratch.width.max(bbox.x + bbox.width);
                scratch.height = scratch.height.max(bbox.y + bbox.height);
                scratch.children.push(content);
            }
            LayoutKind::Tb | LayoutKind::Table => {
                content.x = 0.0;
                content.y = scratch.height;
                scratch.height += bbox.height;
                scratch.width = scratch.width.max(bbox.width);
                scratch.children.push(content);
            }
            LayoutKind::LrTb | LayoutKind::RlTb => {
                content.x = scratch.line_width;
                content.y = scratch.height;
                scratch.line_width += bbox.width;
                scratch.prev_height = scratch.prev_height.max(bbox.height);
                scratch.number_in_line += 1;
                scratch.width = scratch.width.max(scratch.line_width);
                scratch.line.push(content);
            }
            LayoutKind::Row | LayoutKind::RlRow => {
                let (x, w, count) = scratch.span(col_span);
                content.x = x;
                content.y = 0.0;
                scratch.column += count;
                scratch.height = scratch.height.max(bbox.height);
                scratch.width = scratch.width.max(x + w.max(bbox.width));
                scratch.children.push(content);
            }
        }
    }

    /// Close the line being filled.
    pub(crate) fn commit_line(&self, scratch: &mut Scratch) {
        if scratch.line.is_empty() {
            return;
        }
        if scratch.layout == LayoutKind::RlTb {
            let right = scratch.avail.width;
            for placed in &mut scratch.line {
                placed.x = right - placed.x - placed.width;
            }
            scratch.width = scratch.width.max(right);
        }
        scratch.height += scratch.prev_height;
        scratch.children.append(&mut scratch.line);
        scratch.line_width = 0.0;
        scratch.prev_height = 0.0;
        scratch.number_in_line = 0;
    }

    /// Whether a node of the given size may be placed in `space`, judged by
    /// the parent's layout.
    pub(crate) fn check_dimensions(
        &self,
        parent: &Parent,
        declared: &Declared,
        space: Space,
        splittable: bool,
    ) -> bool {
        if declared.w == Some(0.0) || declared.h == Some(0.0) {
            return true;
        }
        let Some(layout) = parent.layout else {
            return true;
        };
        let no_failure = self.state.no_layout_failure;
        let exceeds = |size: f64, room: f64| (size - room).round() > ERROR;

        match layout {
            LayoutKind::LrTb | LayoutKind::RlTb => {
                if parent.attempt == 0 {
                    if no_failure {
                        return match declared.w {
                            Some(w) => !exceeds(w, space.width),
                            None => space.width > ERROR,
                        };
                    }
                    if declared.h.is_some_and(|h| exceeds(h, space.height)) {
                        return false;
                    }
                    return match declared.w {
                        Some(w) if !exceeds(w, space.width) => true,
                        Some(_) if parent.number_in_line == 0 => space.height > ERROR,
                        Some(_) => false,
                        None => space.width > ERROR,
                    };
                }
                if no_failure {
                    return true;
                }
                if declared.h.is_some_and(|h| exceeds(h, space.height)) {
                    return false;
                }
                if declared.w.map_or(true, |w| !exceeds(w, space.width)) {
                    return space.height > ERROR;
                }
                if parent.more_width {
                    return false;
                }
                space.height > ERROR
            }
            LayoutKind::Tb | LayoutKind::Table => {
                if no_failure {
                    return true;
                }
                if let Some(h) = declared.h {
                    if !splittable {
                        return !exceeds(h, space.height);
                    }
                }
                if declared.w.map_or(true, |w| !exceeds(w, space.width)) {
                    return space.height > ERROR;
                }
                if parent.more_width {
                    return false;
                }
                space.height > ERROR
            }
            LayoutKind::Position => {
                if no_failure {
                    return true;
                }
                let Some(h) = declared.h else {
                    return true;
                };
                if (h + declared.y - space.height).round() <= ERROR {
                    return true;
                }
                // Never fits the area anyway: accept rather than loop.
                h + declared.y > self.state.area_height
            }
            LayoutKind::Row | LayoutKind::RlRow => {
                if no_failure {
                    return true;
                }
                declared.h.map_or(true, |h| !exceeds(h, space.height))
            }
        }
    }
}

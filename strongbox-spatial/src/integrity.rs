//! Structural verification of an index.

use crate::errors::SpatialResult;
use crate::page::IndexPage;
use crate::rect::{Coord, Rect};
use crate::rtree::{IndexHeader, TreeState};
use std::collections::HashSet;
use strongbox::Handle;

/// Result of [`SpatialIndex::check_integrity`](crate::SpatialIndex::check_integrity).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    /// Number of pages visited
    pub pages_checked: u64,
    /// Number of leaf entries reachable from the root
    pub entries_found: u64,
    /// Pages that failed to load or violate a page invariant
    pub corrupted_pages: Vec<Handle>,
    /// One message per violation
    pub errors: Vec<String>,
    pub is_valid: bool,
}

impl IntegrityReport {
    fn new() -> Self {
        Self {
            is_valid: true,
            ..Default::default()
        }
    }

    fn page_error(&mut self, page: Handle, message: String) {
        if !self.corrupted_pages.contains(&page) {
            self.corrupted_pages.push(page);
        }
        self.error(message);
    }

    fn error(&mut self, message: String) {
        log::warn!("Integrity check: {}", message);
        self.errors.push(message);
        self.is_valid = false;
    }
}

/// Walks every page reachable from the root.
///
/// Checked:
/// - every branch rectangle of an internal page encloses its child's cover
/// - non-root pages hold between `min_fill` and `capacity` branches
/// - the root is not empty and holds at most `capacity` branches
/// - no page is reachable twice
/// - every leaf sits at depth `height`: each page was created at the level
///   the walk reaches it at
/// - the entry count matches the header
///
/// Pages that cannot be loaded are reported, not propagated.
pub(crate) fn check<C: Coord, const D: usize>(
    state: &mut TreeState<C, D>,
) -> SpatialResult<IntegrityReport> {
    let mut report = IntegrityReport::new();
    let header = state.header;

    match header.root {
        None if header.height != 0 => {
            report.error(format!("empty index with height {}", header.height));
        }
        Some(_) if header.height == 0 => {
            report.error("root page present at height 0".to_string());
        }
        Some(root) => {
            let mut walker = Walker {
                state,
                report: &mut report,
                seen: HashSet::new(),
            };
            walker.visit(root, header.height, None);
        }
        None => {}
    }

    if report.entries_found != header.count as u64 {
        report.error(format!(
            "header counts {} entries, found {}",
            header.count, report.entries_found
        ));
    }

    log::debug!(
        "Integrity check of {} pages: {}",
        report.pages_checked,
        if report.is_valid { "valid" } else { "invalid" }
    );
    Ok(report)
}

struct Walker<'a, C: Coord, const D: usize> {
    state: &'a mut TreeState<C, D>,
    report: &'a mut IntegrityReport,
    seen: HashSet<Handle>,
}

impl<C: Coord, const D: usize> Walker<'_, C, D> {
    /// `bound` is the parent's branch rectangle, `None` for the root.
    fn visit(&mut self, page: Handle, level: u32, bound: Option<Rect<C, D>>) {
        if !self.seen.insert(page) {
            self.report
                .page_error(page, format!("page {} is reachable more than once", page));
            return;
        }

        let node: IndexPage<C, D> = match self.state.pages.get(page) {
            Ok(node) => node.clone(),
            Err(e) => {
                self.report
                    .page_error(page, format!("page {} cannot be loaded: {}", page, e));
                return;
            }
        };
        self.report.pages_checked += 1;

        let IndexHeader {
            geometry, height, ..
        } = self.state.header;
        let is_root = bound.is_none();
        if node.level() != level {
            self.report.page_error(
                page,
                format!(
                    "page {} was created at level {} but sits at level {}: leaves are not all at depth {}",
                    page,
                    node.level(),
                    level,
                    height
                ),
            );
        }
        if node.is_empty() {
            self.report.page_error(page, format!("page {} is empty", page));
            return;
        }
        if geometry.overflows(node.len()) {
            self.report.page_error(
                page,
                format!(
                    "page {} holds {} branches, capacity is {}",
                    page,
                    node.len(),
                    geometry.capacity
                ),
            );
        }
        if !is_root && geometry.underflows(node.len()) {
            self.report.page_error(
                page,
                format!(
                    "page {} holds {} branches, minimum is {}",
                    page,
                    node.len(),
                    geometry.min_fill
                ),
            );
        }

        if let (Some(bound), Some(cover)) = (bound, node.cover()) {
            if !bound.contains(&cover) {
                self.report.page_error(
                    page,
                    format!("page {} cover {} escapes its branch {}", page, cover, bound),
                );
            }
        }

        if level <= 1 {
            self.report.entries_found += node.len() as u64;
            return;
        }
        for branch in node.branches() {
            self.visit(branch.child, level - 1, Some(branch.rect));
        }
    }
}

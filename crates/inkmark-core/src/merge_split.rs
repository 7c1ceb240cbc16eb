//! Merge, toggle-off and erase planning for markup
//!
//! Planning functions never touch the store. They compute a `MarkupBatch`
//! against a working copy of the affected annotations, then diff the result
//! against the originals, so an id can only ever end up in one of the
//! deletion, update or addition sets. The store applies a batch as a single
//! undoable step.

use crate::annotation::{Annotation, AnnotationId, AnnotationKind, AnnotationVariant};
use crate::config::MarkupConfig;
use crate::geometry::NormRect;
use crate::store::AnnotationStore;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Edits produced by one user gesture
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarkupBatch {
    pub deletions: IndexSet<AnnotationId>,
    /// Replacement annotations for existing ids
    pub updates: IndexMap<AnnotationId, Annotation>,
    pub additions: Vec<Annotation>,
}

impl MarkupBatch {
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty() && self.updates.is_empty() && self.additions.is_empty()
    }
}

/// Which annotations an erase gesture may affect
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EraseFilter {
    pub variant: Option<AnnotationVariant>,
    /// Only erase annotations of this color (case-insensitive)
    pub color: Option<String>,
}

impl EraseFilter {
    /// Eraser tool: same variant, any color
    pub fn variant(variant: AnnotationVariant) -> Self {
        Self {
            variant: Some(variant),
            color: None,
        }
    }

    fn matches(&self, annotation: &Annotation) -> bool {
        if let Some(variant) = self.variant {
            if annotation.variant() != variant {
                return false;
            }
        }
        match &self.color {
            Some(color) => annotation
                .primary_color()
                .is_some_and(|c| c.eq_ignore_ascii_case(color)),
            None => true,
        }
    }
}

/// What a markup gesture turned into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupAction {
    /// Regions were merged into existing markup or created
    Marked,
    /// Every region was already covered; the markup was removed instead
    Removed,
    /// Nothing to do
    Unchanged,
}

/// Working copy entry: the annotation plus whether it existed before the gesture
struct Working {
    annotation: Annotation,
    original: bool,
}

pub struct MarkupEngine {
    config: MarkupConfig,
}

impl Default for MarkupEngine {
    fn default() -> Self {
        Self::new(MarkupConfig::default())
    }
}

impl MarkupEngine {
    pub fn new(config: MarkupConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MarkupConfig {
        &self.config
    }

    /// Plan a selection commit: merge each region into touching markup of the
    /// same variant and color, or create new markup. When every region is
    /// already fully covered the gesture is a toggle-off and the regions are
    /// erased instead.
    pub fn plan_markup<'a>(
        &self,
        existing: impl IntoIterator<Item = &'a Annotation>,
        page_id: &str,
        kind: &AnnotationKind,
        regions: &[NormRect],
    ) -> (MarkupAction, MarkupBatch) {
        let regions: Vec<NormRect> = regions
            .iter()
            .copied()
            .filter(|r| r.is_finite() && r.width > 0.0 && r.height > 0.0)
            .collect();
        if regions.is_empty() {
            return (MarkupAction::Unchanged, MarkupBatch::default());
        }

        let template = Annotation::new(page_id, regions[0], kind.clone());
        let filter = EraseFilter {
            variant: Some(template.variant()),
            color: template.primary_color().map(str::to_string),
        };
        let candidates: Vec<&Annotation> = existing
            .into_iter()
            .filter(|a| a.page_id == page_id && filter.matches(a))
            .collect();

        if self.is_fully_covered(&candidates, &regions) {
            tracing::debug!(regions = regions.len(), "selection already marked, removing");
            let batch = self.plan_erase(candidates, page_id, &regions, &filter);
            return (MarkupAction::Removed, batch);
        }

        let originals = snapshot(&candidates);
        let mut working = working_copy(candidates);

        for region in &regions {
            let matches: Vec<usize> = working
                .iter()
                .enumerate()
                .filter(|(_, w)| self.touches(&w.annotation.rect, region))
                .map(|(i, _)| i)
                .collect();

            let Some((&target, rest)) = matches.split_first() else {
                working.push(Working {
                    annotation: template.clone_with_rect(*region),
                    original: false,
                });
                continue;
            };

            // A region bridging several annotations folds them all into the first
            let mut merged = working[target].annotation.rect.union(region);
            for &i in rest {
                merged = merged.union(&working[i].annotation.rect);
            }
            working[target].annotation.rect = merged;
            tracing::debug!(id = %working[target].annotation.id, absorbed = rest.len(), "merged markup region");
            for &i in rest.iter().rev() {
                working.remove(i);
            }
        }

        (MarkupAction::Marked, diff(&originals, working))
    }

    /// Plan an erase gesture over a page. Full cover deletes, left and right
    /// covers shrink, and a cut strictly inside an annotation splits it into
    /// two. Pen, text and image annotations are only removed on full cover.
    pub fn plan_erase<'a>(
        &self,
        existing: impl IntoIterator<Item = &'a Annotation>,
        page_id: &str,
        regions: &[NormRect],
        filter: &EraseFilter,
    ) -> MarkupBatch {
        let tol = self.config.coverage_tolerance;
        let candidates: Vec<&Annotation> = existing
            .into_iter()
            .filter(|a| a.page_id == page_id && filter.matches(a))
            .collect();
        let originals = snapshot(&candidates);
        let mut working = working_copy(candidates);

        for erase in regions.iter().filter(|r| r.is_finite()) {
            let mut i = 0;
            while i < working.len() {
                let rect = working[i].annotation.rect;
                if !rect.overlaps_vertically(erase) || !rect.overlaps_horizontally(erase) {
                    i += 1;
                    continue;
                }

                let covers_left = erase.x <= rect.x + tol;
                let covers_right = erase.right() >= rect.right() - tol;

                if covers_left && covers_right {
                    tracing::debug!(id = %working[i].annotation.id, "erase removes annotation");
                    working.remove(i);
                    continue;
                }
                if !working[i].annotation.variant().is_splittable() {
                    i += 1;
                    continue;
                }

                let target = &mut working[i].annotation;
                if covers_left {
                    target.rect.x = erase.right();
                    target.rect.width = rect.right() - erase.right();
                } else if covers_right {
                    target.rect.width = erase.x - rect.x;
                } else {
                    target.rect.width = erase.x - rect.x;
                    let remainder = NormRect::new(
                        erase.right(),
                        rect.y,
                        rect.right() - erase.right(),
                        rect.height,
                    );
                    let clone = target.clone_with_rect(remainder);
                    tracing::debug!(id = %target.id, split = %clone.id, "erase splits annotation");
                    working.insert(
                        i + 1,
                        Working {
                            annotation: clone,
                            original: false,
                        },
                    );
                    // The clone lies entirely right of this cut
                    i += 1;
                }
                i += 1;
            }
        }

        diff(&originals, working)
    }

    /// True when every region is covered horizontally, within tolerance, by
    /// the union of candidates sharing its vertical extent
    pub fn is_fully_covered(&self, candidates: &[&Annotation], regions: &[NormRect]) -> bool {
        if regions.is_empty() {
            return false;
        }
        let tol = self.config.coverage_tolerance;
        regions.iter().all(|region| {
            let mut spans: Vec<(f64, f64)> = candidates
                .iter()
                .map(|a| a.rect)
                .filter(|r| r.overlaps_vertically(region))
                .map(|r| (r.x, r.right()))
                .collect();
            spans.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut reach = region.x;
            for (left, right) in spans {
                if left > reach + tol {
                    break;
                }
                reach = reach.max(right);
            }
            reach >= region.right() - tol
        })
    }

    /// Plan and apply a selection commit to the store as one undoable step
    pub fn apply_markup(
        &self,
        store: &mut AnnotationStore,
        page_id: &str,
        kind: &AnnotationKind,
        regions: &[NormRect],
    ) -> MarkupAction {
        let (action, batch) = self.plan_markup(store.iter(), page_id, kind, regions);
        if !store.apply_batch(&batch) {
            return MarkupAction::Unchanged;
        }
        action
    }

    /// Plan and apply an erase gesture to the store as one undoable step
    pub fn apply_erase(
        &self,
        store: &mut AnnotationStore,
        page_id: &str,
        regions: &[NormRect],
        filter: &EraseFilter,
    ) -> bool {
        let batch = self.plan_erase(store.iter(), page_id, regions, filter);
        store.apply_batch(&batch)
    }

    fn touches(&self, a: &NormRect, b: &NormRect) -> bool {
        a.overlaps_vertically(b)
            && (a.overlaps_horizontally(b) || a.horizontal_gap(b) < self.config.adjacency_tolerance)
    }
}

fn snapshot(candidates: &[&Annotation]) -> IndexMap<AnnotationId, Annotation> {
    candidates
        .iter()
        .map(|a| (a.id.clone(), (*a).clone()))
        .collect()
}

fn working_copy(candidates: Vec<&Annotation>) -> Vec<Working> {
    candidates
        .into_iter()
        .map(|a| Working {
            annotation: a.clone(),
            original: true,
        })
        .collect()
}

/// Compare the working copy with the originals to produce a batch. Originals
/// missing from the working copy are deleted; changed ones are updated.
fn diff(originals: &IndexMap<AnnotationId, Annotation>, working: Vec<Working>) -> MarkupBatch {
    let mut batch = MarkupBatch::default();
    let surviving: IndexSet<&AnnotationId> = working
        .iter()
        .filter(|w| w.original)
        .map(|w| &w.annotation.id)
        .collect();
    for id in originals.keys() {
        if !surviving.contains(id) {
            batch.deletions.insert(id.clone());
        }
    }
    for w in working {
        if !w.original {
            batch.additions.push(w.annotation);
        } else if originals.get(&w.annotation.id) != Some(&w.annotation) {
            batch.updates.insert(w.annotation.id.clone(), w.annotation);
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::NO_COLOR;
    use pretty_assertions::assert_eq;

    const EPS: f64 = 1e-9;

    fn yellow() -> AnnotationKind {
        AnnotationKind::Highlight {
            color: "#FFFF00".into(),
        }
    }

    fn line(x: f64, width: f64) -> NormRect {
        NormRect::new(x, 0.50, width, 0.02)
    }

    fn boxed(x: f64, width: f64) -> Annotation {
        Annotation::new(
            "p1",
            line(x, width),
            AnnotationKind::Box {
                stroke_color: "#000000".into(),
                fill_color: NO_COLOR.into(),
                thickness: 1.0,
            },
        )
    }

    fn spans(store: &AnnotationStore) -> Vec<(f64, f64)> {
        let mut out: Vec<(f64, f64)> = store.iter().map(|a| (a.rect.x, a.rect.width)).collect();
        out.sort_by(|a, b| a.0.total_cmp(&b.0));
        out
    }

    fn assert_spans(actual: Vec<(f64, f64)>, expected: &[(f64, f64)]) {
        assert_eq!(actual.len(), expected.len(), "{:?}", actual);
        for ((ax, aw), (ex, ew)) in actual.iter().zip(expected) {
            assert!((ax - ex).abs() < EPS && (aw - ew).abs() < EPS, "{:?}", actual);
        }
    }

    #[test]
    fn test_adjacent_highlight_merges_into_existing() {
        let engine = MarkupEngine::default();
        let mut store = AnnotationStore::default();
        let id = store.add(Annotation::new("p1", line(0.10, 0.10), yellow()));

        let action = engine.apply_markup(&mut store, "p1", &yellow(), &[line(0.20, 0.10)]);

        assert_eq!(action, MarkupAction::Marked);
        assert_eq!(store.len(), 1);
        assert_spans(spans(&store), &[(0.10, 0.20)]);
        assert!(store.get(&id).is_some());
    }

    #[test]
    fn test_distant_or_different_color_creates_new() {
        let engine = MarkupEngine::default();
        let mut store = AnnotationStore::default();
        store.add(Annotation::new("p1", line(0.10, 0.10), yellow()));

        engine.apply_markup(&mut store, "p1", &yellow(), &[line(0.50, 0.10)]);
        assert_eq!(store.len(), 2);

        let red = AnnotationKind::Highlight {
            color: "#FF0000".into(),
        };
        engine.apply_markup(&mut store, "p1", &red, &[line(0.20, 0.10)]);
        assert_eq!(store.len(), 3);

        let underline = AnnotationKind::Underline {
            color: "#FFFF00".into(),
        };
        engine.apply_markup(&mut store, "p1", &underline, &[line(0.20, 0.10)]);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn test_region_bridging_two_highlights_folds_them() {
        let engine = MarkupEngine::default();
        let existing = vec![
            Annotation::new("p1", line(0.10, 0.10), yellow()),
            Annotation::new("p1", line(0.40, 0.10), yellow()),
        ];
        let (action, batch) =
            engine.plan_markup(&existing, "p1", &yellow(), &[line(0.15, 0.30)]);

        assert_eq!(action, MarkupAction::Marked);
        assert_eq!(batch.deletions.len(), 1);
        assert!(batch.deletions.contains(&existing[1].id));
        assert_eq!(batch.updates.len(), 1);
        let merged = &batch.updates[&existing[0].id];
        assert!((merged.rect.x - 0.10).abs() < EPS);
        assert!((merged.rect.right() - 0.50).abs() < EPS);
        assert!(batch.additions.is_empty());
    }

    #[test]
    fn test_multi_line_selection_creates_one_per_line() {
        let engine = MarkupEngine::default();
        let regions = [
            NormRect::new(0.3, 0.10, 0.5, 0.02),
            NormRect::new(0.1, 0.13, 0.7, 0.02),
        ];
        let (_, batch) = engine.plan_markup(std::iter::empty(), "p1", &yellow(), &regions);
        assert_eq!(batch.additions.len(), 2);
        assert!(batch.additions.iter().all(|a| a.page_id == "p1"));
    }

    #[test]
    fn test_reselecting_covered_text_toggles_off() {
        let engine = MarkupEngine::default();
        let mut store = AnnotationStore::default();
        store.add(Annotation::new("p1", line(0.10, 0.30), yellow()));

        let action = engine.apply_markup(&mut store, "p1", &yellow(), &[line(0.10, 0.30)]);
        assert_eq!(action, MarkupAction::Removed);
        assert!(store.is_empty());
    }

    #[test]
    fn test_toggle_off_of_part_shrinks() {
        let engine = MarkupEngine::default();
        let mut store = AnnotationStore::default();
        store.add(Annotation::new("p1", line(0.10, 0.30), yellow()));

        let action = engine.apply_markup(&mut store, "p1", &yellow(), &[line(0.30, 0.10)]);
        assert_eq!(action, MarkupAction::Removed);
        assert_spans(spans(&store), &[(0.10, 0.20)]);
    }

    #[test]
    fn test_partial_coverage_is_not_toggle_off() {
        let engine = MarkupEngine::default();
        let existing = vec![Annotation::new("p1", line(0.10, 0.10), yellow())];
        let candidates: Vec<&Annotation> = existing.iter().collect();
        assert!(!engine.is_fully_covered(&candidates, &[line(0.10, 0.30)]));
        assert!(engine.is_fully_covered(&candidates, &[line(0.1005, 0.0990)]));
        assert!(!engine.is_fully_covered(&candidates, &[]));
    }

    #[test]
    fn test_coverage_by_abutting_annotations() {
        let engine = MarkupEngine::default();
        let existing = vec![
            Annotation::new("p1", line(0.10, 0.10), yellow()),
            Annotation::new("p1", line(0.2005, 0.10), yellow()),
        ];
        let candidates: Vec<&Annotation> = existing.iter().collect();
        assert!(engine.is_fully_covered(&candidates, &[line(0.10, 0.20)]));
    }

    #[test]
    fn test_erase_exact_extent_deletes() {
        let engine = MarkupEngine::default();
        let mut store = AnnotationStore::default();
        store.add(boxed(0.10, 0.40));
        let filter = EraseFilter::variant(AnnotationVariant::Box);
        assert!(engine.apply_erase(&mut store, "p1", &[line(0.10, 0.40)], &filter));
        assert!(store.is_empty());
    }

    #[test]
    fn test_erase_middle_splits_box() {
        let engine = MarkupEngine::default();
        let mut store = AnnotationStore::default();
        let original = store.add(boxed(0.10, 0.40));
        let filter = EraseFilter::variant(AnnotationVariant::Box);

        assert!(engine.apply_erase(&mut store, "p1", &[line(0.20, 0.10)], &filter));

        assert_spans(spans(&store), &[(0.10, 0.10), (0.30, 0.20)]);
        assert!(store.get(&original).is_some());
        assert!(store.undo());
        assert_spans(spans(&store), &[(0.10, 0.40)]);
    }

    #[test]
    fn test_erase_left_and_right_shrink() {
        let engine = MarkupEngine::default();
        let filter = EraseFilter::variant(AnnotationVariant::Box);

        let mut store = AnnotationStore::default();
        store.add(boxed(0.10, 0.40));
        engine.apply_erase(&mut store, "p1", &[line(0.05, 0.15)], &filter);
        assert_spans(spans(&store), &[(0.20, 0.30)]);

        let mut store = AnnotationStore::default();
        store.add(boxed(0.10, 0.40));
        engine.apply_erase(&mut store, "p1", &[line(0.40, 0.20)], &filter);
        assert_spans(spans(&store), &[(0.10, 0.30)]);
    }

    #[test]
    fn test_erase_respects_variant_filter_and_page() {
        let engine = MarkupEngine::default();
        let mut store = AnnotationStore::default();
        store.add(boxed(0.10, 0.40));
        store.add(Annotation::new("p1", line(0.10, 0.40), yellow()));
        store.add(Annotation::new("p2", line(0.10, 0.40), yellow()));

        let filter = EraseFilter::variant(AnnotationVariant::Highlight);
        engine.apply_erase(&mut store, "p1", &[line(0.0, 1.0)], &filter);

        let remaining: Vec<(AnnotationVariant, String)> = store
            .iter()
            .map(|a| (a.variant(), a.page_id.clone()))
            .collect();
        assert_eq!(
            remaining,
            vec![
                (AnnotationVariant::Box, "p1".to_string()),
                (AnnotationVariant::Highlight, "p2".to_string()),
            ]
        );
    }

    #[test]
    fn test_overlapping_erase_regions_never_delete_and_update_same_id() {
        let engine = MarkupEngine::default();
        let existing = vec![boxed(0.10, 0.40)];
        let filter = EraseFilter::variant(AnnotationVariant::Box);
        let batch = engine.plan_erase(
            &existing,
            "p1",
            &[line(0.30, 0.05), line(0.05, 0.50)],
            &filter,
        );
        assert!(batch.deletions.contains(&existing[0].id));
        assert!(!batch.updates.contains_key(&existing[0].id));
        assert!(batch.additions.is_empty());
    }

    #[test]
    fn test_two_cuts_yield_three_pieces() {
        let engine = MarkupEngine::default();
        let existing = vec![boxed(0.10, 0.60)];
        let filter = EraseFilter::variant(AnnotationVariant::Box);
        let batch = engine.plan_erase(
            &existing,
            "p1",
            &[line(0.20, 0.10), line(0.50, 0.10)],
            &filter,
        );
        let mut pieces: Vec<(f64, f64)> = batch
            .updates
            .values()
            .chain(batch.additions.iter())
            .map(|a| (a.rect.x, a.rect.width))
            .collect();
        pieces.sort_by(|a, b| a.0.total_cmp(&b.0));
        assert_spans(pieces, &[(0.10, 0.10), (0.30, 0.20), (0.60, 0.10)]);
    }

    #[test]
    fn test_pen_only_erased_on_full_cover() {
        let engine = MarkupEngine::default();
        let pen = Annotation::new(
            "p1",
            line(0.10, 0.40),
            AnnotationKind::Pen {
                color: "#000000".into(),
                stroke_width: 2.0,
                points: vec![],
            },
        );
        let filter = EraseFilter::variant(AnnotationVariant::Pen);
        let existing = vec![pen];

        let partial = engine.plan_erase(&existing, "p1", &[line(0.20, 0.10)], &filter);
        assert!(partial.is_empty());

        let full = engine.plan_erase(&existing, "p1", &[line(0.0, 1.0)], &filter);
        assert_eq!(full.deletions.len(), 1);
    }
}

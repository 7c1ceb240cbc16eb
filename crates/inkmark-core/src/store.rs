//! Annotation store with undo/redo history
//!
//! The store is the single mutation point for annotations. Insertion order
//! is paint order. Every mutation snapshots the previous state onto a bounded
//! undo stack and clears the redo stack; selection changes are not recorded.

use crate::annotation::{Annotation, AnnotationId, AnnotationUpdate};
use crate::config::HistoryConfig;
use crate::merge_split::MarkupBatch;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

type Annotations = IndexMap<AnnotationId, Annotation>;

/// Z-order changes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReorderOp {
    BringToFront,
    SendToBack,
    Forward,
    Backward,
}

/// Serializable store contents (annotations in paint order)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreSnapshot {
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone)]
pub struct AnnotationStore {
    annotations: Annotations,
    selected: Vec<AnnotationId>,
    past: VecDeque<Annotations>,
    future: Vec<Annotations>,
    capacity: usize,
}

impl Default for AnnotationStore {
    fn default() -> Self {
        Self::new(&HistoryConfig::default())
    }
}

impl AnnotationStore {
    pub fn new(config: &HistoryConfig) -> Self {
        Self {
            annotations: IndexMap::new(),
            selected: Vec::new(),
            past: VecDeque::new(),
            future: Vec::new(),
            capacity: config.capacity,
        }
    }

    // --- queries ---

    pub fn get(&self, id: &str) -> Option<&Annotation> {
        self.annotations.get(id)
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// All annotations in paint order
    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations.values()
    }

    pub fn annotations_for_page(&self, page_id: &str) -> Vec<&Annotation> {
        self.annotations
            .values()
            .filter(|a| a.page_id == page_id)
            .collect()
    }

    /// Position in paint order
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.annotations.get_index_of(id)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            annotations: self.annotations.values().cloned().collect(),
        }
    }

    /// Replace the contents with a snapshot, dropping history and selection
    pub fn restore(&mut self, snapshot: StoreSnapshot) {
        self.annotations = snapshot
            .annotations
            .into_iter()
            .map(|a| (a.id.clone(), a))
            .collect();
        self.selected.clear();
        self.past.clear();
        self.future.clear();
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.snapshot())
    }

    pub fn from_json(json: &str, config: &HistoryConfig) -> Result<Self, serde_json::Error> {
        let snapshot: StoreSnapshot = serde_json::from_str(json)?;
        let mut store = Self::new(config);
        store.restore(snapshot);
        Ok(store)
    }

    // --- mutations ---

    /// Add an annotation at the top of the paint order
    pub fn add(&mut self, annotation: Annotation) -> AnnotationId {
        self.push_history();
        let id = annotation.id.clone();
        self.annotations.shift_remove(&id);
        self.annotations.insert(id.clone(), annotation);
        id
    }

    pub fn update(&mut self, id: &str, update: &AnnotationUpdate) -> bool {
        if !self.annotations.contains_key(id) {
            return false;
        }
        self.push_history();
        if let Some(annotation) = self.annotations.get_mut(id) {
            annotation.apply_update(update);
        }
        true
    }

    /// Replace an existing annotation wholesale, keeping its position
    pub fn replace(&mut self, annotation: Annotation) -> bool {
        if !self.annotations.contains_key(&annotation.id) {
            return false;
        }
        self.push_history();
        self.annotations.insert(annotation.id.clone(), annotation);
        true
    }

    pub fn delete(&mut self, id: &str) -> Option<Annotation> {
        if !self.annotations.contains_key(id) {
            return None;
        }
        self.push_history();
        let removed = self.annotations.shift_remove(id);
        self.prune_selection();
        removed
    }

    /// Remove every annotation on a page as one undoable step
    pub fn discard_page(&mut self, page_id: &str) -> usize {
        let count = self.annotations_for_page(page_id).len();
        if count == 0 {
            return 0;
        }
        self.push_history();
        self.annotations.retain(|_, a| a.page_id != page_id);
        self.prune_selection();
        count
    }

    /// Remove everything as one undoable step
    pub fn discard_all(&mut self) -> usize {
        let count = self.annotations.len();
        if count == 0 {
            return 0;
        }
        self.push_history();
        self.annotations.clear();
        self.selected.clear();
        count
    }

    /// Apply the deletions, updates and additions of one gesture as a single step
    pub fn apply_batch(&mut self, batch: &MarkupBatch) -> bool {
        if batch.is_empty() {
            return false;
        }
        self.push_history();
        for id in &batch.deletions {
            self.annotations.shift_remove(id);
        }
        for (id, annotation) in &batch.updates {
            if let Some(existing) = self.annotations.get_mut(id) {
                *existing = annotation.clone();
            }
        }
        for annotation in &batch.additions {
            self.annotations
                .insert(annotation.id.clone(), annotation.clone());
        }
        self.prune_selection();
        true
    }

    /// Change paint order; geometry is untouched
    pub fn reorder(&mut self, id: &str, op: ReorderOp) -> bool {
        let Some(from) = self.annotations.get_index_of(id) else {
            return false;
        };
        let last = self.annotations.len() - 1;
        let to = match op {
            ReorderOp::BringToFront => last,
            ReorderOp::SendToBack => 0,
            ReorderOp::Forward => (from + 1).min(last),
            ReorderOp::Backward => from.saturating_sub(1),
        };
        if to == from {
            return false;
        }
        self.push_history();
        self.annotations.move_index(from, to);
        true
    }

    // --- selection ---

    /// Select an annotation. Additive selection toggles membership; otherwise
    /// the selection becomes just this annotation.
    pub fn select(&mut self, id: &str, additive: bool) -> bool {
        if !self.annotations.contains_key(id) {
            return false;
        }
        if additive {
            if let Some(pos) = self.selected.iter().position(|s| s == id) {
                self.selected.remove(pos);
            } else {
                self.selected.push(id.to_string());
            }
        } else {
            self.selected = vec![id.to_string()];
        }
        true
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    pub fn selected(&self) -> &[AnnotationId] {
        &self.selected
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.iter().any(|s| s == id)
    }

    // --- history ---

    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.past.pop_back() else {
            return false;
        };
        let current = std::mem::replace(&mut self.annotations, previous);
        self.future.push(current);
        self.prune_selection();
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(next) = self.future.pop() else {
            return false;
        };
        let current = std::mem::replace(&mut self.annotations, next);
        self.past.push_back(current);
        self.trim_past();
        self.prune_selection();
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn history_len(&self) -> usize {
        self.past.len()
    }

    fn push_history(&mut self) {
        self.future.clear();
        if self.capacity == 0 {
            return;
        }
        self.past.push_back(self.annotations.clone());
        self.trim_past();
    }

    fn trim_past(&mut self) {
        while self.past.len() > self.capacity {
            self.past.pop_front();
        }
    }

    fn prune_selection(&mut self) {
        let annotations = &self.annotations;
        self.selected.retain(|id| annotations.contains_key(id));
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::geometry::NormRect;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Action {
        Add(f64),
        DeleteFirst,
        MoveLast(f64),
        FrontFirst,
    }

    fn arb_action() -> impl Strategy<Value = Action> {
        prop_oneof![
            (0.0f64..0.9).prop_map(Action::Add),
            Just(Action::DeleteFirst),
            (0.0f64..0.9).prop_map(Action::MoveLast),
            Just(Action::FrontFirst),
        ]
    }

    fn apply(store: &mut AnnotationStore, action: &Action) {
        match action {
            Action::Add(x) => {
                store.add(Annotation::highlight("p", NormRect::new(*x, 0.1, 0.1, 0.1), "#FF0000"));
            }
            Action::DeleteFirst => {
                let first = store.iter().next().map(|a| a.id.clone());
                if let Some(id) = first {
                    store.delete(&id);
                }
            }
            Action::MoveLast(x) => {
                let last = store.iter().last().map(|a| a.id.clone());
                if let Some(id) = last {
                    store.update(&id, &AnnotationUpdate::rect(NormRect::new(*x, 0.3, 0.1, 0.1)));
                }
            }
            Action::FrontFirst => {
                let first = store.iter().next().map(|a| a.id.clone());
                if let Some(id) = first {
                    store.reorder(&id, ReorderOp::BringToFront);
                }
            }
        }
    }

    proptest! {
        /// Property: undo reverses the latest mutation and redo restores it
        #[test]
        fn undo_redo_round_trip(actions in prop::collection::vec(arb_action(), 1..20)) {
            let mut store = AnnotationStore::default();
            for action in &actions[..actions.len() - 1] {
                apply(&mut store, action);
            }
            let before = store.snapshot();
            let history_before = store.history_len();
            apply(&mut store, &actions[actions.len() - 1]);
            let after = store.snapshot();

            if store.history_len() > history_before || before != after {
                prop_assert!(store.undo());
                prop_assert_eq!(store.snapshot(), before);
                prop_assert!(store.redo());
                prop_assert_eq!(store.snapshot(), after);
                prop_assert!(!store.can_redo());
            }
        }
    }
}

//! Layout session: the current page's reconstructed lines
//!
//! Text extraction runs outside this crate and reports back later. Every
//! request for a (document, page, scale) gets a ticket carrying a generation
//! number and a cancellation token; a newer request cancels the previous
//! token, so results computed for superseded inputs are dropped instead of
//! overwriting the current lines.

use crate::config::LayoutConfig;
use crate::error::Result;
use crate::selection::{find_word_at_point, get_selected_words, SelectedRegion, Selection, WordLocation};
use crate::text_layout::{reconstruct_lines, TextLine, TextRun};
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cooperative cancellation flag shared between a request and its worker
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel this token and every clone of it
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Inputs a layout depends on
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutKey {
    pub document_id: String,
    pub page_index: u32,
    pub scale: f64,
}

impl LayoutKey {
    pub fn new(document_id: impl Into<String>, page_index: u32, scale: f64) -> Self {
        Self {
            document_id: document_id.into(),
            page_index,
            scale,
        }
    }
}

/// Text runs of one page at one scale, with the viewport they are measured in
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageText {
    pub runs: Vec<TextRun>,
    pub viewport_width: f64,
    pub viewport_height: f64,
}

/// Source of positioned text runs, e.g. a PDF text extractor
pub trait PageTextProvider {
    fn text_runs(&self, document_id: &str, page_index: u32, scale: f64) -> Result<PageText>;
}

/// Handle for one in-flight layout request
#[derive(Debug, Clone)]
pub struct LayoutTicket {
    key: LayoutKey,
    generation: u64,
    token: CancellationToken,
}

impl LayoutTicket {
    pub fn key(&self) -> &LayoutKey {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Workers should check this between expensive steps
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    document_id: String,
    page_index: u32,
    scale_bits: u64,
}

impl From<&LayoutKey> for CacheKey {
    fn from(key: &LayoutKey) -> Self {
        Self {
            document_id: key.document_id.clone(),
            page_index: key.page_index,
            scale_bits: key.scale.to_bits(),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedLayout {
    lines: Vec<TextLine>,
    viewport: (f64, f64),
}

/// Reconstructed lines memoized by (document, page, scale)
#[derive(Debug, Default)]
pub struct LayoutCache {
    entries: HashMap<CacheKey, CachedLayout>,
}

impl LayoutCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, key: &LayoutKey) -> Option<&CachedLayout> {
        self.entries.get(&CacheKey::from(key))
    }

    fn insert(&mut self, key: &LayoutKey, layout: CachedLayout) {
        self.entries.insert(CacheKey::from(key), layout);
    }

    pub fn contains(&self, key: &LayoutKey) -> bool {
        self.entries.contains_key(&CacheKey::from(key))
    }

    /// Drop every layout of a document, returning how many were removed
    pub fn invalidate(&mut self, document_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.document_id != document_id);
        before - self.entries.len()
    }

    /// Drop every scale of one page, e.g. after its content changed
    pub fn invalidate_page(&mut self, document_id: &str, page_index: u32) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|key, _| key.document_id != document_id || key.page_index != page_index);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Owns the layout of the page currently on screen
#[derive(Debug, Default)]
pub struct LayoutSession {
    config: LayoutConfig,
    current: Option<LayoutKey>,
    committed: Option<LayoutKey>,
    generation: u64,
    token: CancellationToken,
    lines: Vec<TextLine>,
    viewport: Option<(f64, f64)>,
    cache: LayoutCache,
}

impl LayoutSession {
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Start tracking new inputs. Cancels any in-flight request. A cached
    /// layout for the same inputs is committed immediately.
    pub fn request(&mut self, key: LayoutKey) -> LayoutTicket {
        self.token.cancel();
        self.token = CancellationToken::new();
        self.generation += 1;

        if let Some(cached) = self.cache.get(&key).cloned() {
            tracing::debug!(page = key.page_index, scale = key.scale, "Layout cache hit");
            self.commit(key.clone(), cached);
        }
        self.current = Some(key.clone());

        LayoutTicket {
            key,
            generation: self.generation,
            token: self.token.clone(),
        }
    }

    /// Commit a finished extraction. Returns `false` when the ticket was
    /// superseded or cancelled; its result is discarded.
    pub fn complete(&mut self, ticket: &LayoutTicket, page: PageText) -> bool {
        if ticket.is_cancelled() || ticket.generation != self.generation {
            tracing::debug!(
                generation = ticket.generation,
                current = self.generation,
                "Dropping stale layout result"
            );
            return false;
        }

        let lines = reconstruct_lines(&page.runs, &self.config);
        let layout = CachedLayout {
            lines,
            viewport: (page.viewport_width, page.viewport_height),
        };
        self.cache.insert(&ticket.key, layout.clone());
        self.commit(ticket.key.clone(), layout);
        true
    }

    /// Request and complete synchronously through a text provider
    pub fn load(&mut self, key: LayoutKey, provider: &dyn PageTextProvider) -> Result<bool> {
        let ticket = self.request(key);
        if self.is_ready() {
            return Ok(true);
        }
        let page = provider.text_runs(
            &ticket.key.document_id,
            ticket.key.page_index,
            ticket.key.scale,
        )?;
        Ok(self.complete(&ticket, page))
    }

    /// Cancel everything and forget the current document
    pub fn close(&mut self) {
        self.token.cancel();
        self.generation += 1;
        if let Some(key) = self.current.take() {
            self.cache.invalidate(&key.document_id);
        }
        self.committed = None;
        self.lines.clear();
        self.viewport = None;
    }

    fn commit(&mut self, key: LayoutKey, layout: CachedLayout) {
        tracing::debug!(
            page = key.page_index,
            lines = layout.lines.len(),
            "Committed layout"
        );
        self.lines = layout.lines;
        self.viewport = Some(layout.viewport);
        self.committed = Some(key);
    }

    /// True when the committed lines belong to the current inputs
    pub fn is_ready(&self) -> bool {
        self.current.is_some() && self.committed == self.current
    }

    /// Lines for the current inputs; empty until their layout completes
    pub fn lines(&self) -> &[TextLine] {
        if self.is_ready() {
            &self.lines
        } else {
            &[]
        }
    }

    /// Viewport size the current lines are measured in
    pub fn viewport(&self) -> Option<(f64, f64)> {
        if self.is_ready() {
            self.viewport
        } else {
            None
        }
    }

    pub fn current(&self) -> Option<&LayoutKey> {
        self.current.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cache(&self) -> &LayoutCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut LayoutCache {
        &mut self.cache
    }

    pub fn word_at(&self, x: f64, y: f64) -> Option<WordLocation> {
        find_word_at_point(self.lines(), x, y)
    }

    pub fn selected_regions(&self, selection: &Selection) -> Vec<SelectedRegion> {
        get_selected_words(self.lines(), selection)
    }
}

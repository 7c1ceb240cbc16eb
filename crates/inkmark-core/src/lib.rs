//! Annotation and layout engine for PDF pages
//!
//! This crate turns extracted text runs into selectable reading-order lines,
//! keeps a minimal set of annotations through merge/split rules with undo
//! history, and bakes the annotations into copied pages with lopdf.
//!
//! Typical flow:
//! - `LayoutSession` / `reconstruct_lines`: text runs to lines
//! - `find_word_at_point` / `get_selected_words`: pointer and selection queries
//! - `MarkupEngine` + `AnnotationStore`: commit selections, erase, undo/redo
//! - `bake`: copy pages into a new document and paint annotations onto them

pub mod annotation;
pub mod bake;
pub mod config;
pub mod error;
pub mod fonts;
pub mod geometry;
pub mod image;
pub mod merge_split;
pub mod output;
pub mod selection;
pub mod session;
pub mod store;
pub mod text_layout;

pub use annotation::{
    Annotation, AnnotationId, AnnotationKind, AnnotationUpdate, AnnotationVariant, FontSpec,
    ImageFormat, NO_COLOR,
};
pub use bake::{bake, paint_order, wrap_text, Baker, PageSpec};
pub use config::{BakeConfig, EngineConfig, HistoryConfig, LayoutConfig, MarkupConfig};
pub use error::{InkmarkError, Result};
pub use fonts::{FontCache, FontHandle, FontLookup, NoFontLookup, StandardFont, TextMeasurer};
pub use geometry::{NativeRect, NormRect, PageBox, Point};
pub use merge_split::{EraseFilter, MarkupAction, MarkupBatch, MarkupEngine};
pub use output::{LopdfPageCopier, OutputDocId, OutputDocument, PageCopier, SourceDocuments};
pub use selection::{find_word_at_point, get_selected_words, SelectedRegion, Selection, WordLocation};
pub use session::{
    CancellationToken, LayoutCache, LayoutKey, LayoutSession, LayoutTicket, PageText,
    PageTextProvider,
};
pub use store::{AnnotationStore, ReorderOp, StoreSnapshot};
pub use text_layout::{reconstruct_lines, reconstruct_lines_with, TextLine, TextRun, WordBox};


//! Annotation data model
//!
//! Every annotation carries an id, the page it belongs to and a normalized
//! rectangle. Variant-specific data lives in `AnnotationKind`.

use crate::geometry::{NormRect, Point};
use serde::{Deserialize, Serialize};

pub type AnnotationId = String;

/// Color sentinel meaning "do not paint"
pub const NO_COLOR: &str = "none";

/// Generate a fresh annotation id
pub fn new_annotation_id() -> AnnotationId {
    uuid::Uuid::new_v4().to_string()
}

/// Parse hex color string (e.g., "#FF0000" or "FF0000") to RGB floats (0-1 range).
/// Returns `None` for the "none" sentinel.
pub fn parse_hex_color(color: &str) -> Option<(f32, f32, f32)> {
    if is_no_color(color) {
        return None;
    }
    let hex = color.trim().trim_start_matches('#');
    let channel = |range: std::ops::Range<usize>| {
        hex.get(range)
            .and_then(|digits| u8::from_str_radix(digits, 16).ok())
            .unwrap_or(0) as f32
            / 255.0
    };
    if hex.len() >= 6 && hex.is_ascii() {
        Some((channel(0..2), channel(2..4), channel(4..6)))
    } else {
        Some((0.0, 0.0, 0.0)) // Default to black
    }
}

pub fn is_no_color(color: &str) -> bool {
    color.trim().eq_ignore_ascii_case(NO_COLOR) || color.trim().is_empty()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FontSpec {
    pub family: String,
    /// Font size in points
    pub size: f64,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
}

impl Default for FontSpec {
    fn default() -> Self {
        Self {
            family: "Helvetica".to_string(),
            size: 12.0,
            bold: false,
            italic: false,
            underline: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum AnnotationKind {
    Highlight {
        color: String,
    },
    Underline {
        color: String,
    },
    Strikethrough {
        color: String,
    },
    Box {
        stroke_color: String,
        fill_color: String,
        /// Border width in points
        thickness: f64,
    },
    Ellipse {
        stroke_color: String,
        fill_color: String,
        thickness: f64,
    },
    Pen {
        color: String,
        /// Stroke width in points
        stroke_width: f64,
        /// Normalized page points
        points: Vec<Point>,
    },
    Text {
        content: String,
        color: String,
        font: FontSpec,
    },
    Image {
        /// Base64-encoded image bytes
        data: String,
        format: ImageFormat,
    },
}

/// Variant tag without payload, for matching annotations by type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AnnotationVariant {
    Highlight,
    Underline,
    Strikethrough,
    Box,
    Ellipse,
    Pen,
    Text,
    Image,
}

impl AnnotationVariant {
    /// Markings decorate underlying text
    pub fn is_marking(&self) -> bool {
        matches!(
            self,
            AnnotationVariant::Highlight
                | AnnotationVariant::Underline
                | AnnotationVariant::Strikethrough
        )
    }

    /// Variants whose bounds can be shrunk or split by the eraser
    pub fn is_splittable(&self) -> bool {
        self.is_marking() || matches!(self, AnnotationVariant::Box | AnnotationVariant::Ellipse)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Annotation {
    pub id: AnnotationId,
    pub page_id: String,
    pub rect: NormRect,
    pub kind: AnnotationKind,
}

impl Annotation {
    pub fn new(page_id: impl Into<String>, rect: NormRect, kind: AnnotationKind) -> Self {
        Self {
            id: new_annotation_id(),
            page_id: page_id.into(),
            rect,
            kind,
        }
    }

    pub fn highlight(page_id: impl Into<String>, rect: NormRect, color: &str) -> Self {
        Self::new(
            page_id,
            rect,
            AnnotationKind::Highlight {
                color: color.to_string(),
            },
        )
    }

    pub fn variant(&self) -> AnnotationVariant {
        match &self.kind {
            AnnotationKind::Highlight { .. } => AnnotationVariant::Highlight,
            AnnotationKind::Underline { .. } => AnnotationVariant::Underline,
            AnnotationKind::Strikethrough { .. } => AnnotationVariant::Strikethrough,
            AnnotationKind::Box { .. } => AnnotationVariant::Box,
            AnnotationKind::Ellipse { .. } => AnnotationVariant::Ellipse,
            AnnotationKind::Pen { .. } => AnnotationVariant::Pen,
            AnnotationKind::Text { .. } => AnnotationVariant::Text,
            AnnotationKind::Image { .. } => AnnotationVariant::Image,
        }
    }

    pub fn is_marking(&self) -> bool {
        self.variant().is_marking()
    }

    /// The color used to decide whether two annotations share a style
    pub fn primary_color(&self) -> Option<&str> {
        match &self.kind {
            AnnotationKind::Highlight { color }
            | AnnotationKind::Underline { color }
            | AnnotationKind::Strikethrough { color }
            | AnnotationKind::Pen { color, .. }
            | AnnotationKind::Text { color, .. } => Some(color.as_str()),
            AnnotationKind::Box { stroke_color, .. }
            | AnnotationKind::Ellipse { stroke_color, .. } => Some(stroke_color.as_str()),
            AnnotationKind::Image { .. } => None,
        }
    }

    /// Copy with a new id and rectangle
    pub fn clone_with_rect(&self, rect: NormRect) -> Self {
        Self {
            id: new_annotation_id(),
            page_id: self.page_id.clone(),
            rect,
            kind: self.kind.clone(),
        }
    }

    /// Apply a partial update; fields that do not exist on this variant are ignored
    pub fn apply_update(&mut self, update: &AnnotationUpdate) {
        if let Some(rect) = update.rect {
            self.rect = rect;
        }
        match &mut self.kind {
            AnnotationKind::Highlight { color }
            | AnnotationKind::Underline { color }
            | AnnotationKind::Strikethrough { color } => {
                if let Some(c) = &update.color {
                    *color = c.clone();
                }
            }
            AnnotationKind::Box {
                stroke_color,
                fill_color,
                thickness,
            }
            | AnnotationKind::Ellipse {
                stroke_color,
                fill_color,
                thickness,
            } => {
                if let Some(c) = &update.color {
                    *stroke_color = c.clone();
                }
                if let Some(c) = &update.fill_color {
                    *fill_color = c.clone();
                }
                if let Some(t) = update.thickness {
                    *thickness = t;
                }
            }
            AnnotationKind::Pen {
                color,
                stroke_width,
                points,
            } => {
                if let Some(c) = &update.color {
                    *color = c.clone();
                }
                if let Some(w) = update.thickness {
                    *stroke_width = w;
                }
                if let Some(p) = &update.points {
                    *points = p.clone();
                }
            }
            AnnotationKind::Text {
                content,
                color,
                font,
            } => {
                if let Some(c) = &update.color {
                    *color = c.clone();
                }
                if let Some(text) = &update.content {
                    *content = text.clone();
                }
                if let Some(f) = &update.font {
                    *font = f.clone();
                }
            }
            AnnotationKind::Image { .. } => {}
        }
    }
}

/// Partial update for `AnnotationStore::update`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnnotationUpdate {
    pub rect: Option<NormRect>,
    /// Marking color, box/ellipse stroke, pen or text color
    pub color: Option<String>,
    pub fill_color: Option<String>,
    /// Box/ellipse border width or pen stroke width
    pub thickness: Option<f64>,
    pub points: Option<Vec<Point>>,
    pub content: Option<String>,
    pub font: Option<FontSpec>,
}

impl AnnotationUpdate {
    pub fn rect(rect: NormRect) -> Self {
        Self {
            rect: Some(rect),
            ..Default::default()
        }
    }
}

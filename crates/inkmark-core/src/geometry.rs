//! Coordinate transformation between normalized and PDF coordinate systems
//!
//! Annotations are stored as fractions (0..1) of the page with a top-left
//! origin. PDF pages use points with a bottom-left origin.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Rectangle in normalized page space (top-left origin).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct NormRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NormRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build a rectangle from its left/top and right/bottom edges.
    pub fn from_edges(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self::new(left, top, right - left, bottom - top)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &NormRect) -> NormRect {
        NormRect::from_edges(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    pub fn overlaps_vertically(&self, other: &NormRect) -> bool {
        self.y < other.bottom() && other.y < self.bottom()
    }

    pub fn overlaps_horizontally(&self, other: &NormRect) -> bool {
        self.x < other.right() && other.x < self.right()
    }

    /// Horizontal distance between the two rectangles; negative when they overlap.
    pub fn horizontal_gap(&self, other: &NormRect) -> f64 {
        (other.x - self.right()).max(self.x - other.right())
    }

    pub fn contains_point(&self, point: Point) -> bool {
        point.x >= self.x && point.x <= self.right() && point.y >= self.y && point.y <= self.bottom()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }
}

/// Page dimensions in PDF points, with the MediaBox origin.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PageBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PageBox {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
        }
    }

    /// Build from a MediaBox array `[x0, y0, x1, y1]`.
    pub fn from_media_box(media_box: [f64; 4]) -> Self {
        let [x0, y0, x1, y1] = media_box;
        Self {
            x: x0.min(x1),
            y: y0.min(y1),
            width: (x1 - x0).abs(),
            height: (y1 - y0).abs(),
        }
    }
}

/// Rectangle in PDF space (bottom-left origin, points).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NativeRect {
    pub fn top(&self) -> f64 {
        self.y + self.height
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }
}

/// Convert a normalized rectangle to PDF coordinates (flip Y axis)
pub fn to_native(rect: &NormRect, page: &PageBox) -> NativeRect {
    let height = rect.height * page.height;
    NativeRect {
        x: page.x + rect.x * page.width,
        y: page.y + page.height - rect.y * page.height - height,
        width: rect.width * page.width,
        height,
    }
}

/// Convert a PDF rectangle back to normalized coordinates
pub fn to_normalized(rect: &NativeRect, page: &PageBox) -> NormRect {
    let height = rect.height / page.height;
    NormRect {
        x: (rect.x - page.x) / page.width,
        y: 1.0 - (rect.y - page.y) / page.height - height,
        width: rect.width / page.width,
        height,
    }
}

/// Convert a normalized point to PDF coordinates
pub fn point_to_native(point: Point, page: &PageBox) -> (f64, f64) {
    (
        page.x + point.x * page.width,
        page.y + page.height - point.y * page.height,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_native_letter_page() {
        let page = PageBox::new(612.0, 792.0);
        let rect = NormRect::new(0.1, 0.5, 0.2, 0.05);
        let native = to_native(&rect, &page);
        assert!((native.x - 61.2).abs() < 1e-9);
        assert!((native.width - 122.4).abs() < 1e-9);
        assert!((native.height - 39.6).abs() < 1e-9);
        // 792 - 396 - 39.6
        assert!((native.y - 356.4).abs() < 1e-9);
    }

    #[test]
    fn test_top_left_maps_to_page_top() {
        let page = PageBox::new(612.0, 792.0);
        let native = to_native(&NormRect::new(0.0, 0.0, 1.0, 0.0), &page);
        assert_eq!(native.x, 0.0);
        assert_eq!(native.y, 792.0);
        let (x, y) = point_to_native(Point::new(1.0, 1.0), &page);
        assert_eq!((x, y), (612.0, 0.0));
    }

    #[test]
    fn test_media_box_offset() {
        let page = PageBox::from_media_box([10.0, 20.0, 110.0, 220.0]);
        let native = to_native(&NormRect::new(0.0, 0.0, 1.0, 1.0), &page);
        assert_eq!(native.x, 10.0);
        assert_eq!(native.y, 20.0);
        assert_eq!(native.top(), 220.0);
    }

    #[test]
    fn test_union_and_gap() {
        let a = NormRect::new(0.1, 0.5, 0.1, 0.02);
        let b = NormRect::new(0.25, 0.5, 0.1, 0.02);
        assert!((a.horizontal_gap(&b) - 0.05).abs() < 1e-12);
        assert!((b.horizontal_gap(&a) - 0.05).abs() < 1e-12);
        let u = a.union(&b);
        assert!((u.x - 0.1).abs() < 1e-12);
        assert!((u.right() - 0.35).abs() < 1e-12);
        assert!(a.overlaps_vertically(&b));
        assert!(!a.overlaps_horizontally(&b));
    }
}

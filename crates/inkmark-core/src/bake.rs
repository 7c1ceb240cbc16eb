//! Bake annotations into page content
//!
//! Each source page is copied into a fresh output document, then every
//! annotation on it is rendered as content-stream operators appended to the
//! page. Markings paint first so they never cover ink, shapes or text.
//! A single annotation that fails to render is logged and skipped; only page
//! copy and serialization failures abort the bake.

use crate::annotation::{parse_hex_color, Annotation, AnnotationKind, FontSpec};
use crate::config::BakeConfig;
use crate::error::{InkmarkError, Result};
use crate::fonts::{encode_winansi, FontCache, FontLookup, TextMeasurer};
use crate::geometry::{point_to_native, to_native, NativeRect, PageBox, Point};
use crate::image::{add_image_xobject, decode_image};
use crate::output::{page_box, resolve, LopdfPageCopier, OutputDocument, PageCopier, SourceDocuments};
use indexmap::IndexMap;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use serde::{Deserialize, Serialize};

/// Bezier control point distance for a quarter ellipse
const KAPPA: f64 = 0.5523;

/// One page of the output: which source page to copy and which
/// annotations (by page id) to bake onto it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageSpec {
    pub page_id: String,
    pub source_id: String,
    /// 0-based page index within the source document
    pub page_index: u32,
}

impl PageSpec {
    pub fn new(page_id: impl Into<String>, source_id: impl Into<String>, page_index: u32) -> Self {
        Self {
            page_id: page_id.into(),
            source_id: source_id.into(),
            page_index,
        }
    }
}

/// Resources referenced by the baked content of one page
#[derive(Debug, Default)]
struct PageResources {
    ext_gstate: IndexMap<String, Object>,
    font: IndexMap<String, Object>,
    xobject: IndexMap<String, Object>,
    /// Name of the highlight opacity state, once created
    highlight_gs: Option<String>,
}

impl PageResources {
    fn is_empty(&self) -> bool {
        self.ext_gstate.is_empty() && self.font.is_empty() && self.xobject.is_empty()
    }
}

/// Order annotations for painting: markings first, then everything else,
/// each group keeping its relative order
pub fn paint_order<'a>(annotations: &[&'a Annotation]) -> Vec<&'a Annotation> {
    let (markings, others): (Vec<&Annotation>, Vec<&Annotation>) =
        annotations.iter().partition(|a| a.is_marking());
    markings.into_iter().chain(others).collect()
}

/// Greedy word wrap. Explicit newlines start new lines; a word wider than
/// `max_width` still gets a line of its own.
pub fn wrap_text(
    text: &str,
    max_width: f64,
    measurer: &dyn TextMeasurer,
    font_size: f64,
) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if current.is_empty() {
                current.push_str(word);
                continue;
            }
            let candidate = format!("{} {}", current, word);
            if measurer.text_width(&candidate, font_size) <= max_width {
                current = candidate;
            } else {
                lines.push(std::mem::replace(&mut current, word.to_string()));
            }
        }
        lines.push(current);
    }
    lines
}

/// Renders annotations onto copied pages of an output document
pub struct Baker<C: PageCopier = LopdfPageCopier> {
    copier: C,
    fonts: FontCache,
    config: BakeConfig,
}

impl Baker<LopdfPageCopier> {
    pub fn new(config: BakeConfig) -> Self {
        Self::with_copier(LopdfPageCopier, config)
    }
}

impl Default for Baker<LopdfPageCopier> {
    fn default() -> Self {
        Self::new(BakeConfig::default())
    }
}

impl<C: PageCopier> Baker<C> {
    pub fn with_copier(copier: C, config: BakeConfig) -> Self {
        Self {
            copier,
            fonts: FontCache::new(),
            config,
        }
    }

    pub fn fonts(&self) -> &FontCache {
        &self.fonts
    }

    /// Copy every page in `pages` into a new document, bake the annotations
    /// belonging to each page and serialize the result.
    ///
    /// Pages whose source is unknown are skipped. If that leaves no page at
    /// all, the bake fails with [`InkmarkError::SourceMissing`] rather than
    /// producing an empty document. Font cache entries for the output
    /// document are dropped whether or not the bake succeeds.
    pub fn bake<'a>(
        &mut self,
        pages: &[PageSpec],
        sources: &SourceDocuments,
        annotations: impl IntoIterator<Item = &'a Annotation>,
        lookup: &dyn FontLookup,
    ) -> Result<Vec<u8>> {
        if pages.is_empty() {
            return Err(InkmarkError::OperationError("No pages to bake".into()));
        }
        let annotations: Vec<&Annotation> = annotations.into_iter().collect();

        let mut output = OutputDocument::new();
        let document = output.id();
        let result = self.bake_into(&mut output, pages, sources, &annotations, lookup);
        let dropped = self.fonts.invalidate(document);
        tracing::debug!(document = document.value(), dropped, "Released font cache entries");

        result?;
        if output.page_count() == 0 {
            return Err(InkmarkError::SourceMissing(
                "None of the requested pages have a loaded source".into(),
            ));
        }
        let pages_written = output.page_count();
        let bytes = output.to_bytes()?;
        tracing::info!(pages = pages_written, bytes = bytes.len(), "Bake complete");
        Ok(bytes)
    }

    fn bake_into(
        &mut self,
        output: &mut OutputDocument,
        pages: &[PageSpec],
        sources: &SourceDocuments,
        annotations: &[&Annotation],
        lookup: &dyn FontLookup,
    ) -> Result<()> {
        for spec in pages {
            let Some(source) = sources.get(&spec.source_id) else {
                tracing::warn!(
                    page = %spec.page_id,
                    source = %spec.source_id,
                    "Source document not loaded, skipping page"
                );
                continue;
            };

            let page_object =
                self.copier
                    .copy_page(output, &spec.source_id, source, spec.page_index)?;
            let on_page: Vec<&Annotation> = annotations
                .iter()
                .copied()
                .filter(|a| a.page_id == spec.page_id)
                .collect();
            let painted = self.bake_page(output, page_object, &on_page, lookup)?;
            tracing::debug!(page = %spec.page_id, painted, "Baked page");
        }
        Ok(())
    }

    /// Render annotations onto a page already present in `output`, returning
    /// how many painted anything
    pub fn bake_page(
        &mut self,
        output: &mut OutputDocument,
        page_object: ObjectId,
        annotations: &[&Annotation],
        lookup: &dyn FontLookup,
    ) -> Result<usize> {
        let page = page_box(output.document(), page_object);
        let mut resources = PageResources::default();
        let mut operations = Vec::new();
        let mut painted = 0;

        for annotation in paint_order(annotations) {
            match self.render(output, annotation, &page, lookup, &mut resources) {
                Ok(ops) if ops.is_empty() => {}
                Ok(ops) => {
                    operations.push(Operation::new("q", vec![]));
                    operations.extend(ops);
                    operations.push(Operation::new("Q", vec![]));
                    painted += 1;
                }
                Err(e) => {
                    tracing::warn!(id = %annotation.id, error = %e, "Skipping annotation");
                }
            }
        }

        if operations.is_empty() {
            return Ok(0);
        }

        let content = Content { operations }
            .encode()
            .map_err(|e| InkmarkError::OperationError(format!("Content encoding failed: {}", e)))?;
        append_content(output.document_mut(), page_object, content)?;
        if !resources.is_empty() {
            merge_resources(output.document_mut(), page_object, resources)?;
        }
        Ok(painted)
    }

    fn render(
        &mut self,
        output: &mut OutputDocument,
        annotation: &Annotation,
        page: &PageBox,
        lookup: &dyn FontLookup,
        resources: &mut PageResources,
    ) -> Result<Vec<Operation>> {
        if !annotation.rect.is_finite() {
            return Err(InkmarkError::OperationError("Non-finite geometry".into()));
        }
        let rect = to_native(&annotation.rect, page);

        let ops = match &annotation.kind {
            AnnotationKind::Highlight { color } => {
                let Some(rgb) = parse_hex_color(color) else {
                    return Ok(Vec::new());
                };
                let gs = self.highlight_state(output, resources);
                vec![
                    Operation::new("gs", vec![Object::Name(gs.into_bytes())]),
                    fill_color(rgb),
                    rectangle(&rect),
                    Operation::new("f", vec![]),
                ]
            }
            AnnotationKind::Underline { color } => self.decoration(color, &rect, rect.y),
            AnnotationKind::Strikethrough { color } => {
                let y = rect.top() - rect.height * self.config.strike_position_ratio;
                self.decoration(color, &rect, y)
            }
            AnnotationKind::Box {
                stroke_color,
                fill_color: fill,
                thickness,
            } => shape(stroke_color, fill, *thickness, rectangle(&rect)),
            AnnotationKind::Ellipse {
                stroke_color,
                fill_color: fill,
                thickness,
            } => {
                let mut path = ellipse_path(&rect);
                let paint = shape(stroke_color, fill, *thickness, Operation::new("h", vec![]));
                if paint.is_empty() {
                    return Ok(Vec::new());
                }
                // Color operators must precede path construction
                let split = paint.len() - 2;
                let mut ops: Vec<Operation> = paint[..split].to_vec();
                ops.append(&mut path);
                ops.extend(paint[split..].iter().cloned());
                ops
            }
            AnnotationKind::Pen {
                color,
                stroke_width,
                points,
            } => pen_stroke(color, *stroke_width, points, page),
            AnnotationKind::Text {
                content,
                color,
                font,
            } => self.text(output, &rect, content, color, font, lookup, resources),
            AnnotationKind::Image { data, format } => {
                let image = decode_image(data, *format)?;
                let object_id = add_image_xobject(output, image);
                let name = output.next_resource_name("InkIm");
                resources
                    .xobject
                    .insert(name.clone(), Object::Reference(object_id));
                vec![
                    Operation::new(
                        "cm",
                        vec![
                            real(rect.width),
                            real(0.0),
                            real(0.0),
                            real(rect.height),
                            real(rect.x),
                            real(rect.y),
                        ],
                    ),
                    Operation::new("Do", vec![Object::Name(name.into_bytes())]),
                ]
            }
        };
        Ok(ops)
    }

    fn highlight_state(&mut self, output: &mut OutputDocument, resources: &mut PageResources) -> String {
        if let Some(name) = &resources.highlight_gs {
            return name.clone();
        }
        let name = output.next_resource_name("InkGS");
        let opacity = self.config.highlight_opacity;
        resources.ext_gstate.insert(
            name.clone(),
            Object::Dictionary(dictionary! {
                "Type" => "ExtGState",
                "ca" => real(opacity),
                "CA" => real(opacity),
            }),
        );
        resources.highlight_gs = Some(name.clone());
        name
    }

    fn decoration_thickness(&self, height: f64) -> f64 {
        (height * self.config.decoration_thickness_ratio).max(self.config.min_decoration_thickness)
    }

    /// Horizontal rule across the rectangle at native height `y`
    fn decoration(&self, color: &str, rect: &NativeRect, y: f64) -> Vec<Operation> {
        let Some(rgb) = parse_hex_color(color) else {
            return Vec::new();
        };
        vec![
            stroke_color(rgb),
            Operation::new("w", vec![real(self.decoration_thickness(rect.height))]),
            Operation::new("m", vec![real(rect.x), real(y)]),
            Operation::new("l", vec![real(rect.right()), real(y)]),
            Operation::new("S", vec![]),
        ]
    }

    #[allow(clippy::too_many_arguments)]
    fn text(
        &mut self,
        output: &mut OutputDocument,
        rect: &NativeRect,
        content: &str,
        color: &str,
        font: &FontSpec,
        lookup: &dyn FontLookup,
        resources: &mut PageResources,
    ) -> Vec<Operation> {
        let Some(rgb) = parse_hex_color(color) else {
            return Vec::new();
        };
        if content.trim().is_empty() || font.size.is_nan() || font.size <= 0.0 {
            return Vec::new();
        }

        let handle = self
            .fonts
            .resolve(output, &font.family, font.bold, font.italic, lookup);
        resources.font.insert(
            handle.resource_name.clone(),
            Object::Reference(handle.object_id),
        );

        let size = font.size;
        let line_height = size * self.config.line_height_factor;
        let lines = wrap_text(content, rect.width, &handle.metrics, size);

        let mut ops = vec![
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(handle.resource_name.clone().into_bytes()), real(size)],
            ),
            fill_color(rgb),
        ];
        let mut underlines = Vec::new();
        let mut baseline = rect.top() - size;
        for line in &lines {
            if baseline < rect.y {
                break;
            }
            ops.push(Operation::new(
                "Tm",
                vec![
                    real(1.0),
                    real(0.0),
                    real(0.0),
                    real(1.0),
                    real(rect.x),
                    real(baseline),
                ],
            ));
            ops.push(Operation::new(
                "Tj",
                vec![Object::String(encode_winansi(line), StringFormat::Literal)],
            ));
            if font.underline && !line.is_empty() {
                underlines.push((baseline, handle.metrics.text_width(line, size)));
            }
            baseline -= line_height;
        }
        ops.push(Operation::new("ET", vec![]));

        if !underlines.is_empty() {
            ops.push(stroke_color(rgb));
            ops.push(Operation::new("w", vec![real(self.decoration_thickness(size * 0.5))]));
            for (baseline, width) in underlines {
                let y = baseline - size * 0.12;
                ops.push(Operation::new("m", vec![real(rect.x), real(y)]));
                ops.push(Operation::new("l", vec![real(rect.x + width), real(y)]));
            }
            ops.push(Operation::new("S", vec![]));
        }
        ops
    }
}

/// Bake with a fresh `Baker` using the default page copier.
///
/// Fails with [`InkmarkError::SourceMissing`] when no requested page has a
/// loaded source.
pub fn bake<'a>(
    pages: &[PageSpec],
    sources: &SourceDocuments,
    annotations: impl IntoIterator<Item = &'a Annotation>,
    lookup: &dyn FontLookup,
    config: &BakeConfig,
) -> Result<Vec<u8>> {
    Baker::new(config.clone()).bake(pages, sources, annotations, lookup)
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

fn fill_color((r, g, b): (f32, f32, f32)) -> Operation {
    Operation::new("rg", vec![Object::Real(r), Object::Real(g), Object::Real(b)])
}

fn stroke_color((r, g, b): (f32, f32, f32)) -> Operation {
    Operation::new("RG", vec![Object::Real(r), Object::Real(g), Object::Real(b)])
}

fn rectangle(rect: &NativeRect) -> Operation {
    Operation::new(
        "re",
        vec![real(rect.x), real(rect.y), real(rect.width), real(rect.height)],
    )
}

/// Color setup, the path, then the paint operator. The path operator is
/// always second to last so callers can swap in a multi-operator path.
fn shape(stroke: &str, fill: &str, thickness: f64, path: Operation) -> Vec<Operation> {
    let fill_rgb = parse_hex_color(fill);
    let stroke_rgb = parse_hex_color(stroke).filter(|_| thickness > 0.0);

    let paint = match (fill_rgb.is_some(), stroke_rgb.is_some()) {
        (true, true) => "B",
        (true, false) => "f",
        (false, true) => "S",
        (false, false) => return Vec::new(),
    };

    let mut ops = Vec::new();
    if let Some(rgb) = fill_rgb {
        ops.push(fill_color(rgb));
    }
    if let Some(rgb) = stroke_rgb {
        ops.push(stroke_color(rgb));
        ops.push(Operation::new("w", vec![real(thickness)]));
    }
    ops.push(path);
    ops.push(Operation::new(paint, vec![]));
    ops
}

/// Four Bezier arcs inscribed in the rectangle, ending with `h`
fn ellipse_path(rect: &NativeRect) -> Vec<Operation> {
    let rx = rect.width / 2.0;
    let ry = rect.height / 2.0;
    let cx = rect.x + rx;
    let cy = rect.y + ry;
    let kx = rx * KAPPA;
    let ky = ry * KAPPA;

    let curve = |points: [f64; 6]| Operation::new("c", points.iter().map(|v| real(*v)).collect());
    vec![
        Operation::new("m", vec![real(cx + rx), real(cy)]),
        curve([cx + rx, cy + ky, cx + kx, cy + ry, cx, cy + ry]),
        curve([cx - kx, cy + ry, cx - rx, cy + ky, cx - rx, cy]),
        curve([cx - rx, cy - ky, cx - kx, cy - ry, cx, cy - ry]),
        curve([cx + kx, cy - ry, cx + rx, cy - ky, cx + rx, cy]),
    ]
}

fn pen_stroke(color: &str, stroke_width: f64, points: &[Point], page: &PageBox) -> Vec<Operation> {
    let Some(rgb) = parse_hex_color(color) else {
        return Vec::new();
    };
    let Some((first, rest)) = points.split_first() else {
        return Vec::new();
    };

    let (x, y) = point_to_native(*first, page);
    let mut ops = vec![
        stroke_color(rgb),
        Operation::new("w", vec![real(stroke_width)]),
        Operation::new("J", vec![Object::Integer(1)]),
        Operation::new("j", vec![Object::Integer(1)]),
        Operation::new("m", vec![real(x), real(y)]),
    ];
    if rest.is_empty() {
        // A single tap still leaves a round dot
        ops.push(Operation::new("l", vec![real(x), real(y)]));
    }
    for point in rest {
        let (x, y) = point_to_native(*point, page);
        ops.push(Operation::new("l", vec![real(x), real(y)]));
    }
    ops.push(Operation::new("S", vec![]));
    ops
}

/// Append a content stream to the page, isolating the existing content's
/// graphics state with q/Q
fn append_content(doc: &mut Document, page_id: ObjectId, content: Vec<u8>) -> Result<()> {
    let existing = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|e| InkmarkError::OperationError(e.to_string()))?
        .get(b"Contents")
        .ok()
        .cloned();

    let mut streams = match existing {
        Some(Object::Array(items)) => items,
        Some(Object::Reference(id)) => match doc.get_object(id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(id)],
        },
        _ => Vec::new(),
    };

    let mut ours = content;
    if !streams.is_empty() {
        let open = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        streams.insert(0, Object::Reference(open));
        // Streams are concatenated verbatim, so keep operators apart
        let mut closed = b"\nQ\n".to_vec();
        closed.extend_from_slice(&ours);
        ours = closed;
    }
    let ours_id = doc.add_object(Stream::new(Dictionary::new(), ours));
    streams.push(Object::Reference(ours_id));

    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| InkmarkError::OperationError(e.to_string()))?;
    page.set("Contents", Object::Array(streams));
    Ok(())
}

/// Merge baked resources into the page's Resources. Shared (referenced)
/// resource dictionaries are copied inline so other pages are unaffected.
fn merge_resources(doc: &mut Document, page_id: ObjectId, added: PageResources) -> Result<()> {
    let mut resources = {
        let page = doc
            .get_object(page_id)
            .and_then(Object::as_dict)
            .map_err(|e| InkmarkError::OperationError(e.to_string()))?;
        page.get(b"Resources")
            .ok()
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_dict().ok())
            .cloned()
            .unwrap_or_default()
    };

    let categories: [(&[u8], IndexMap<String, Object>); 3] = [
        (b"ExtGState", added.ext_gstate),
        (b"Font", added.font),
        (b"XObject", added.xobject),
    ];
    for (key, entries) in categories {
        if entries.is_empty() {
            continue;
        }
        let mut category = resources
            .get(key)
            .ok()
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_dict().ok())
            .cloned()
            .unwrap_or_default();
        for (name, value) in entries {
            category.set(name.into_bytes(), value);
        }
        resources.set(key.to_vec(), Object::Dictionary(category));
    }

    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| InkmarkError::OperationError(e.to_string()))?;
    page.set("Resources", Object::Dictionary(resources));
    Ok(())
}

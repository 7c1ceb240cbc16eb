//! Output documents and page copying
//!
//! A bake writes into a fresh `OutputDocument`. Source pages are imported with
//! the same ID-offset remapping used for merging whole documents: every object
//! of the source is copied once per output document with shifted IDs, then
//! each requested page gets its own page dictionary in the output page tree.

use crate::error::{InkmarkError, Result};
use crate::geometry::PageBox;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Guards against cyclic Parent chains in malformed files.
const MAX_TREE_DEPTH: usize = 32;

static NEXT_OUTPUT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one output document; font handles are only valid for the
/// document they were created in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputDocId(u64);

impl OutputDocId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// A PDF document under construction
pub struct OutputDocument {
    id: OutputDocId,
    doc: Document,
    pages_id: ObjectId,
    next_resource: u32,
    /// Source id -> object id offset of that source's imported objects
    imported: HashMap<String, u32>,
}

impl OutputDocument {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => Vec::<Object>::new(),
                "Count" => 0,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        Self {
            id: OutputDocId(NEXT_OUTPUT_ID.fetch_add(1, Ordering::Relaxed)),
            doc,
            pages_id,
            next_resource: 0,
            imported: HashMap::new(),
        }
    }

    pub fn id(&self) -> OutputDocId {
        self.id
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Allocate a resource name (e.g. `InkF3`, `InkIm4`) unique within this document
    pub fn next_resource_name(&mut self, prefix: &str) -> String {
        self.next_resource += 1;
        format!("{}{}", prefix, self.next_resource)
    }

    /// Append an existing page object to the end of the page tree
    pub fn append_page(&mut self, page_id: ObjectId) -> Result<()> {
        let pages_id = self.pages_id;
        if let Ok(page) = self.doc.get_object_mut(page_id).and_then(Object::as_dict_mut) {
            page.set("Parent", Object::Reference(pages_id));
        } else {
            return Err(InkmarkError::PageCopyError(format!(
                "Object {:?} is not a page dictionary",
                page_id
            )));
        }

        let pages = self
            .doc
            .get_object_mut(pages_id)
            .and_then(Object::as_dict_mut)
            .map_err(|_| InkmarkError::PageCopyError("Invalid pages dictionary".into()))?;
        let count = match pages.get_mut(b"Kids") {
            Ok(Object::Array(kids)) => {
                kids.push(Object::Reference(page_id));
                kids.len()
            }
            _ => {
                pages.set("Kids", Object::Array(vec![Object::Reference(page_id)]));
                1
            }
        };
        pages.set("Count", Object::Integer(count as i64));
        Ok(())
    }

    /// Prune, compress and serialize the document
    pub fn to_bytes(mut self) -> Result<Vec<u8>> {
        self.doc.prune_objects();
        self.doc.compress();

        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| InkmarkError::SerializationError(format!("Save failed: {}", e)))?;
        Ok(buffer)
    }
}

impl Default for OutputDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// Loaded source documents keyed by the host's document id
#[derive(Default)]
pub struct SourceDocuments {
    docs: HashMap<String, Document>,
}

impl SourceDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, doc: Document) {
        self.docs.insert(id.into(), doc);
    }

    /// Parse PDF bytes and register them under `id`
    pub fn load_mem(&mut self, id: impl Into<String>, bytes: &[u8]) -> Result<()> {
        let doc = Document::load_mem(bytes).map_err(|e| InkmarkError::ParseError(e.to_string()))?;
        self.insert(id, doc);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.docs.get(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Document> {
        self.docs.remove(id)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// Copies one source page into an output document
pub trait PageCopier {
    /// Copy page `page_index` (0-based) of `source` and append it to `output`.
    /// Returns the new page's object id in the output document.
    fn copy_page(
        &mut self,
        output: &mut OutputDocument,
        source_id: &str,
        source: &Document,
        page_index: u32,
    ) -> Result<ObjectId>;
}

/// Page copier backed by lopdf object remapping
#[derive(Debug, Default)]
pub struct LopdfPageCopier;

impl PageCopier for LopdfPageCopier {
    fn copy_page(
        &mut self,
        output: &mut OutputDocument,
        source_id: &str,
        source: &Document,
        page_index: u32,
    ) -> Result<ObjectId> {
        let pages = source.get_pages();
        let source_page_id = *pages.get(&(page_index + 1)).ok_or_else(|| {
            InkmarkError::PageCopyError(format!(
                "Page {} does not exist (document has {} pages)",
                page_index,
                pages.len()
            ))
        })?;

        let offset = import_objects(output, source_id, source);

        // Collect inherited attributes before the page leaves its original tree
        let mut page_dict = match output
            .doc
            .get_object((source_page_id.0 + offset, source_page_id.1))
            .and_then(Object::as_dict)
        {
            Ok(dict) => dict.clone(),
            Err(e) => return Err(InkmarkError::PageCopyError(e.to_string())),
        };
        for key in INHERITABLE_KEYS {
            if page_dict.has(key) {
                continue;
            }
            if let Some(value) = inherited_attribute(source, source_page_id, key) {
                page_dict.set(key.to_vec(), remap_object_refs(value, offset));
            }
        }

        let new_page_id = output.doc.add_object(Object::Dictionary(page_dict));
        output.append_page(new_page_id)?;
        Ok(new_page_id)
    }
}

/// Import every object of `source` into `output` once, returning the ID offset
fn import_objects(output: &mut OutputDocument, source_id: &str, source: &Document) -> u32 {
    if let Some(offset) = output.imported.get(source_id) {
        return *offset;
    }

    let id_offset = output.doc.max_id;
    for (old_id, object) in source.objects.iter() {
        let new_id = (old_id.0 + id_offset, old_id.1);
        output
            .doc
            .objects
            .insert(new_id, remap_object_refs(object.clone(), id_offset));
    }
    output.doc.max_id = (source.max_id + id_offset).max(output.doc.max_id);
    output.imported.insert(source_id.to_string(), id_offset);

    tracing::debug!(
        source = source_id,
        objects = source.objects.len(),
        offset = id_offset,
        "Imported source document objects"
    );
    id_offset
}

/// Walk the Parent chain of a page looking for an inheritable attribute
fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = doc.get_object(page_id).and_then(Object::as_dict).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value.clone());
        }
        let parent_id = current.get(b"Parent").and_then(Object::as_reference).ok()?;
        current = doc.get_object(parent_id).and_then(Object::as_dict).ok()?;
    }
    None
}

/// Recursively remap object references in an object
fn remap_object_refs(obj: Object, offset: u32) -> Object {
    match obj {
        Object::Reference(id) => Object::Reference((id.0 + offset, id.1)),
        Object::Array(arr) => Object::Array(
            arr.into_iter()
                .map(|o| remap_object_refs(o, offset))
                .collect(),
        ),
        Object::Dictionary(mut dict) => {
            for (_, value) in dict.iter_mut() {
                *value = remap_object_refs(value.clone(), offset);
            }
            Object::Dictionary(dict)
        }
        Object::Stream(mut stream) => {
            for (_, value) in stream.dict.iter_mut() {
                *value = remap_object_refs(value.clone(), offset);
            }
            Object::Stream(stream)
        }
        other => other,
    }
}

/// Follow a single indirect reference
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

pub(crate) fn object_to_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(v) => Some(*v as f64),
        Object::Real(v) => Some(*v as f64),
        _ => None,
    }
}

/// Read the page's MediaBox, defaulting to US Letter when absent or malformed
pub fn page_box(doc: &Document, page_id: ObjectId) -> PageBox {
    let media_box = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .ok()
        .and_then(|page: &Dictionary| page.get(b"MediaBox").ok())
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_array().ok())
        .and_then(|arr| {
            let values: Vec<f64> = arr
                .iter()
                .filter_map(|o| resolve(doc, o).and_then(object_to_f64))
                .collect();
            match values.as_slice() {
                [x0, y0, x1, y1] => Some([*x0, *y0, *x1, *y1]),
                _ => None,
            }
        });

    match media_box {
        Some(mb) => PageBox::from_media_box(mb),
        None => PageBox::new(612.0, 792.0),
    }
}

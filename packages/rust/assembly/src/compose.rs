//! PDF composition.
//!
//! Concatenates whole PDF documents, preserving each document's internal
//! page order, in list order. All inputs are verified before a single
//! output byte is written, and the result lands via a temp-file rename,
//! so a failed compose never leaves a partial artifact on disk.

use std::collections::BTreeMap;
use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId, dictionary};
use tracing::{debug, instrument};

use tenderfold_shared::{Result, TenderfoldError};

/// Compose an ordered list of PDF files into one output PDF.
#[instrument(skip_all, fields(inputs = inputs.len(), out = %out_path.display()))]
pub fn compose(inputs: &[&Path], out_path: &Path) -> Result<()> {
    if inputs.is_empty() {
        return Err(TenderfoldError::compose("no input documents"));
    }

    // Fail before writing anything if any input is missing.
    for input in inputs {
        if !input.is_file() {
            return Err(TenderfoldError::compose(format!(
                "input document missing: {}",
                input.display()
            )));
        }
    }

    let mut max_id = 1u32;
    let mut pages_in_order: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut all_objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for input in inputs {
        let mut doc = Document::load(input)
            .map_err(|e| TenderfoldError::compose(format!("{}: {e}", input.display())))?;

        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        // get_pages keys by page number, so values iterate in page order.
        // Inheritable attributes are resolved here, while the source's
        // Pages tree is still intact.
        for page_id in doc.get_pages().into_values() {
            let dict = inherited_page_dict(&doc, page_id)
                .map_err(|e| TenderfoldError::compose(format!("{}: {e}", input.display())))?;
            pages_in_order.push((page_id, dict));
        }
        all_objects.extend(doc.objects);
        debug!(input = %input.display(), "document loaded");
    }

    let document = merge_objects(pages_in_order, all_objects, max_id)?;
    write_atomically(document, out_path)
}

/// Page attributes a source Pages tree may hold on behalf of its pages.
const INHERITABLE_KEYS: &[&[u8]] = &[b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// A page's dictionary with inherited attributes materialized onto it.
///
/// The source Pages trees are discarded during the merge, so anything a
/// page inherits from an ancestor node has to be pushed down first. The
/// ancestor chain is capped to guard against cyclic Parent references.
fn inherited_page_dict(doc: &Document, page_id: ObjectId) -> lopdf::Result<Dictionary> {
    let mut dict = doc.get_object(page_id)?.as_dict()?.clone();

    let mut cursor = dict.get(b"Parent").ok().cloned();
    let mut depth = 0;
    while let Some(parent_ref) = cursor {
        depth += 1;
        if depth > 32 {
            break;
        }
        let Ok(parent_id) = parent_ref.as_reference() else {
            break;
        };
        let Ok(parent) = doc.get_object(parent_id).and_then(Object::as_dict) else {
            break;
        };
        for key in INHERITABLE_KEYS {
            if !dict.has(key) {
                if let Ok(value) = parent.get(key) {
                    dict.set(*key, value.clone());
                }
            }
        }
        cursor = parent.get(b"Parent").ok().cloned();
    }

    dict.remove(b"Parent");
    Ok(dict)
}

/// Assemble a fresh document from collected pages and objects, building a
/// new flat Pages tree and a new Catalog at `next_id`.
fn merge_objects(
    pages_in_order: Vec<(ObjectId, Dictionary)>,
    all_objects: BTreeMap<ObjectId, Object>,
    next_id: u32,
) -> Result<Document> {
    if pages_in_order.is_empty() {
        return Err(TenderfoldError::compose("inputs contain no pages"));
    }

    let mut document = Document::with_version("1.5");

    for (object_id, object) in all_objects {
        match object.type_name().unwrap_or("") {
            // The source Catalogs and Pages trees are replaced wholesale;
            // pages are re-inserted below with the new parent; outlines
            // are dropped rather than stitched together.
            "Catalog" | "Pages" | "Page" | "Outlines" | "Outline" => {}
            _ => {
                document.objects.insert(object_id, object);
            }
        }
    }

    let pages_id: ObjectId = (next_id, 0);
    let catalog_id: ObjectId = (next_id + 1, 0);

    let kids: Vec<Object> = pages_in_order
        .iter()
        .map(|(id, _)| Object::Reference(*id))
        .collect();
    let count = kids.len() as u32;

    for (page_id, mut dict) in pages_in_order {
        dict.set("Parent", pages_id);
        document.objects.insert(page_id, Object::Dictionary(dict));
    }

    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    document.objects.insert(
        catalog_id,
        Object::Dictionary(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        }),
    );

    document.trailer.set("Root", catalog_id);
    document.max_id = next_id + 1;
    document.renumber_objects();
    document.compress();

    Ok(document)
}

/// Save to a temp sibling, then rename into place.
fn write_atomically(mut document: Document, out_path: &Path) -> Result<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| TenderfoldError::io(parent, e))?;
    }
    let temp = out_path.with_extension("pdf.tmp");

    if let Err(e) = document.save(&temp) {
        let _ = std::fs::remove_file(&temp);
        return Err(TenderfoldError::compose(format!(
            "saving {}: {e}",
            out_path.display()
        )));
    }

    std::fs::rename(&temp, out_path).map_err(|e| TenderfoldError::io(out_path, e))
}

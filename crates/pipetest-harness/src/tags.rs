//! Deterministic processor tags.
//!
//! Engine stats identify processors by tag when one is set; untagged
//! processors of the same type are indistinguishable in the stats output.
//! Tagging hashes the processor's position (parent path plus index) and its
//! canonical body, so re-running the tagger over an already-tagged pipeline
//! changes nothing and distinct copies of the same processor get distinct
//! tags.

use serde_json::Value;

use crate::compare::canonical_render;

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn tag_list(list: &mut Value, parent: &str) {
    let Value::Array(items) = list else {
        return;
    };
    for (index, item) in items.iter_mut().enumerate() {
        let Value::Object(processor) = item else {
            continue;
        };
        let Some((processor_type, body)) = processor.iter_mut().next() else {
            continue;
        };
        let processor_type = processor_type.clone();
        if !body.is_object() {
            continue;
        }

        let already_tagged = matches!(body.get("tag"), Some(Value::String(_)));
        if !already_tagged {
            let seed = format!("{parent}.{index}:{}", canonical_render(body));
            let tag = format!("{processor_type}_{:08x}", fnv1a32(seed.as_bytes()));
            if let Value::Object(fields) = body {
                fields.insert("tag".to_owned(), Value::String(tag));
            }
        }

        if let Some(on_failure) = body.get_mut("on_failure") {
            tag_list(on_failure, &format!("{parent}.{index}.on_failure"));
        }
    }
}

/// Tag every processor in a pipeline document, including `on_failure`
/// handlers. Idempotent: processors that already carry a string tag keep it.
pub fn tag_processors(pipeline: &mut Value) {
    if let Some(processors) = pipeline.get_mut("processors") {
        tag_list(processors, "processors");
    }
}

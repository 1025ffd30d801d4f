use super::block::{Block, FieldValue};
use super::Diagram;
use crate::error::BuildError;
use crate::value::Value;
use ahash::AHashMap;
use serde_json::Value as Json;
use std::sync::Arc;

fn missing(block_id: &str, key: &str) -> BuildError {
    BuildError::MissingBlockKey {
        block_id: block_id.to_string(),
        key: key.to_string(),
    }
}

fn id_ref(entry: &serde_json::Map<String, Json>, key: &str) -> Option<String> {
    entry
        .get(key)
        .and_then(Json::as_str)
        .map(|id| id.to_string())
}

/// Builds a [`Diagram`] from its serialized `{"target": {"blocks": {...}}}`
/// form. Build order is irrelevant: edges are stored as ids and any
/// `parent`/`next` id without an entry of its own becomes a placeholder
/// block. Construction never starts execution.
pub(super) fn parse(tab_id: &str, content: &str) -> Result<Diagram, BuildError> {
    let root: Json =
        serde_json::from_str(content).map_err(|err| BuildError::JsonParse(err.to_string()))?;
    let entries = root
        .get("target")
        .and_then(|target| target.get("blocks"))
        .and_then(Json::as_object)
        .ok_or(BuildError::MissingTarget)?;

    let mut blocks: AHashMap<String, Arc<Block>> = AHashMap::with_capacity(entries.len());
    let mut referenced: Vec<String> = Vec::new();

    for (block_id, raw) in entries {
        // Non-object entries (stray variable declarations) are skipped.
        let Some(entry) = raw.as_object() else {
            continue;
        };

        let opcode = entry
            .get("opcode")
            .and_then(Json::as_str)
            .ok_or_else(|| missing(block_id, "opcode"))?;
        let top_level = entry
            .get("topLevel")
            .and_then(Json::as_bool)
            .ok_or_else(|| missing(block_id, "topLevel"))?;
        let shadow = entry
            .get("shadow")
            .and_then(Json::as_bool)
            .unwrap_or(false);
        let parent = id_ref(entry, "parent");
        let next = id_ref(entry, "next");
        referenced.extend(parent.iter().cloned());
        referenced.extend(next.iter().cloned());

        let mut fields = AHashMap::new();
        if let Some(raw_fields) = entry.get("fields").and_then(Json::as_object) {
            for (name, raw_field) in raw_fields {
                let array = raw_field.as_array().cloned().unwrap_or_default();
                fields.insert(
                    name.clone(),
                    FieldValue {
                        value: array.first().map(Value::from_json).unwrap_or_default(),
                        id: array
                            .get(1)
                            .and_then(Json::as_str)
                            .map(|id| id.to_string()),
                    },
                );
            }
        }

        let mut inputs = AHashMap::new();
        if let Some(raw_inputs) = entry.get("inputs").and_then(Json::as_object) {
            for (name, raw_input) in raw_inputs {
                inputs.insert(name.clone(), raw_input.clone());
            }
        }

        blocks.insert(
            block_id.clone(),
            Arc::new(Block::new(
                block_id.clone(),
                opcode,
                shadow,
                top_level,
                parent,
                next,
                fields,
                inputs,
            )),
        );
    }

    for id in referenced {
        blocks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Block::placeholder(&id)));
    }

    Ok(Diagram {
        tab_id: tab_id.to_string(),
        blocks,
    })
}

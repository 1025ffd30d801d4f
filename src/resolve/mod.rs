//! The value resolution protocol: decoding of the tagged wire encoding the
//! diagram editor emits for block inputs.
//!
//! Each input slot is a small JSON array whose leading integer tag selects
//! the shape. The editor emits different shapes for typed literals and for
//! free block connections, so decoding dispatches on the tag at evaluation
//! time rather than on any static per-input typing.

use crate::error::RunError;
use crate::value::Value;
use serde_json::Value as Json;

/// Primitive kinds carried by tag-1/tag-3 nested arrays, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Undefined,
    SameBlockShadow,
    BlockNoShadow,
    DiffBlockShadow,
    MathNumber,
    PositiveNumber,
    WholeNumber,
    IntegerNumber,
    CheckboxNumber,
    ColorPicker,
    Text,
    Broadcast,
    Variable,
    List,
    Icon,
}

impl PrimitiveKind {
    pub fn from_index(index: u64) -> Option<Self> {
        use PrimitiveKind::*;
        Some(match index {
            0 => Undefined,
            1 => SameBlockShadow,
            2 => BlockNoShadow,
            3 => DiffBlockShadow,
            4 => MathNumber,
            5 => PositiveNumber,
            6 => WholeNumber,
            7 => IntegerNumber,
            8 => CheckboxNumber,
            9 => ColorPicker,
            10 => Text,
            11 => Broadcast,
            12 => Variable,
            13 => List,
            14 => Icon,
            _ => return None,
        })
    }

    /// The "reference only" form: the raw value at this kind's fixed offset,
    /// without dereferencing anything.
    pub fn reference(&self, array: &[Json]) -> Value {
        let index = match self {
            PrimitiveKind::Broadcast => 2,
            _ => 1,
        };
        array.get(index).map(Value::from_json).unwrap_or_default()
    }

    /// The "fetch value" form.
    pub fn fetch(&self, array: &[Json]) -> Value {
        let index = match self {
            PrimitiveKind::CheckboxNumber | PrimitiveKind::Broadcast => 2,
            _ => 1,
        };
        array.get(index).map(Value::from_json).unwrap_or_default()
    }
}

/// How a tagged input slot is satisfied at evaluation time.
#[derive(Debug, Clone, PartialEq)]
pub enum InputForm {
    /// The value is embedded in the slot itself.
    Literal(Value),
    /// The slot names another block by id.
    Reference(String),
    /// A typed primitive payload (nested array under tag 1 or 3).
    Primitive {
        kind: PrimitiveKind,
        array: Vec<Json>,
    },
}

fn tagged_array<'a>(block_id: &str, key: &str, raw: &'a Json) -> Result<&'a Vec<Json>, RunError> {
    raw.as_array()
        .filter(|array| !array.is_empty())
        .ok_or_else(|| RunError::unresolved(block_id, key, "input is not a tagged array"))
}

fn primitive(block_id: &str, key: &str, nested: &[Json]) -> Result<InputForm, RunError> {
    let index = nested.first().and_then(Json::as_u64).ok_or_else(|| {
        RunError::unresolved(block_id, key, "primitive payload has no kind index")
    })?;
    let kind = PrimitiveKind::from_index(index).ok_or_else(|| {
        RunError::unresolved(block_id, key, format!("unknown primitive kind {index}"))
    })?;
    Ok(InputForm::Primitive {
        kind,
        array: nested.to_vec(),
    })
}

/// Decodes one input slot into the form the caller resolves it with.
/// Decoding is pure: the same raw slot always yields the same form.
pub fn decode(block_id: &str, key: &str, raw: &Json) -> Result<InputForm, RunError> {
    let array = tagged_array(block_id, key, raw)?;
    let tag = array
        .first()
        .and_then(Json::as_u64)
        .ok_or_else(|| RunError::unresolved(block_id, key, "input has no integer tag"))?;

    match tag {
        // Direct literal.
        5 => Ok(InputForm::Literal(
            array.get(1).map(Value::from_json).unwrap_or_default(),
        )),
        // Block reference; sometimes a typed primitive instead of an id.
        3 => match array.get(1) {
            Some(Json::Array(nested)) => primitive(block_id, key, nested),
            Some(Json::String(id)) => Ok(InputForm::Reference(id.clone())),
            _ => Err(RunError::unresolved(
                block_id,
                key,
                "block reference is neither an id nor a primitive payload",
            )),
        },
        // Typed literal, or a bare string when no shadow payload exists.
        1 => match array.get(1) {
            Some(Json::Array(nested)) => primitive(block_id, key, nested),
            other => Ok(InputForm::Literal(
                other.map(Value::from_json).unwrap_or_default(),
            )),
        },
        // Plain reference.
        2 => array
            .get(1)
            .and_then(Json::as_str)
            .map(|id| InputForm::Reference(id.to_string()))
            .ok_or_else(|| RunError::unresolved(block_id, key, "reference is not a string")),
        other => Err(RunError::unresolved(
            block_id,
            key,
            format!("unrecognized input tag {other}"),
        )),
    }
}

/// Whether a slot carries a usable payload. Tag 1 may be an empty socket
/// (null payload); unknown tags are an error, matching `decode`.
pub fn has_payload(block_id: &str, key: &str, raw: &Json) -> Result<bool, RunError> {
    let array = tagged_array(block_id, key, raw)?;
    let tag = array
        .first()
        .and_then(Json::as_u64)
        .ok_or_else(|| RunError::unresolved(block_id, key, "input has no integer tag"))?;
    match tag {
        2 | 3 | 5 => Ok(true),
        1 => Ok(array.get(1).map(|slot| !slot.is_null()).unwrap_or(false)),
        other => Err(RunError::unresolved(
            block_id,
            key,
            format!("unrecognized input tag {other}"),
        )),
    }
}

/// Description of a dropdown menu backing one of a block's inputs: the name
/// of the field on the backing block, and whether a real selection is
/// mandatory.
#[derive(Debug, Clone)]
pub struct MenuBlock {
    pub name: String,
    pub required: bool,
}

impl MenuBlock {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            required: false,
        }
    }

    pub fn required(name: &str) -> Self {
        Self {
            name: name.to_string(),
            required: true,
        }
    }
}

//! The parsed, immutable representation of one visual program: a table of
//! blocks with `parent`/`next`/input/field edges.

mod block;
mod builder;

pub use block::{Block, FieldValue};

use crate::error::BuildError;
use ahash::AHashMap;
use std::sync::Arc;

/// One independently loadable and schedulable visual program (a dashboard
/// tab). Owns every block; a reload replaces the whole diagram rather than
/// mutating edges in place.
pub struct Diagram {
    tab_id: String,
    blocks: AHashMap<String, Arc<Block>>,
}

impl Diagram {
    /// Parses diagram JSON of shape `{"target": {"blocks": {...}}}`.
    pub fn parse(tab_id: &str, content: &str) -> Result<Self, BuildError> {
        builder::parse(tab_id, content)
    }

    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    pub fn block(&self, id: &str) -> Option<&Arc<Block>> {
        self.blocks.get(id)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Arc<Block>> {
        self.blocks.values()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl std::fmt::Debug for Diagram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagram")
            .field("tab_id", &self.tab_id)
            .field("blocks", &self.blocks.len())
            .finish()
    }
}

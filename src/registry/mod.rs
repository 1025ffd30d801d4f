//! The extension/opcode registry: maps `(extension id, opcode)` to a block
//! descriptor carrying the handler closures contributed by addons.
//!
//! Lookup happens at execution time, not at diagram build time, so an
//! extension registered after a diagram referencing it was loaded still
//! resolves for subsequent runs.

use crate::error::RunError;
use crate::runtime::BlockScope;
use crate::value::Value;
use ahash::AHashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::{Arc, RwLock};

/// The four block shapes of the diagram language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    /// A statement: runs for effect, then the chain advances to `next`.
    Command,
    /// Begins a chain; re-enters it on each external signal instead of
    /// falling through to `next`.
    Hat,
    /// Produces a value when evaluated.
    Reporter,
    /// A reporter constrained to a boolean result.
    Boolean,
}

pub type Handler =
    Arc<dyn Fn(BlockScope) -> BoxFuture<'static, Result<(), RunError>> + Send + Sync>;
pub type EvalHandler =
    Arc<dyn Fn(BlockScope) -> BoxFuture<'static, Result<Value, RunError>> + Send + Sync>;
pub type LinkHandler = Arc<dyn Fn(&str, BlockScope) -> Result<(), RunError> + Send + Sync>;

/// Descriptor for one opcode: its shape plus the closures that run it.
///
/// `Command`/`Hat` blocks carry `handler`; `Reporter`/`Boolean` blocks carry
/// `evaluate`. The optional link hooks let structural "link variable" blocks
/// attach a dashboard variable to this block.
pub struct BlockSpec {
    pub opcode: String,
    pub block_type: BlockType,
    pub handler: Option<Handler>,
    pub evaluate: Option<EvalHandler>,
    pub link_variable: Option<LinkHandler>,
    pub link_boolean: Option<LinkHandler>,
}

impl BlockSpec {
    fn with_handler<F, Fut>(opcode: &str, block_type: BlockType, f: F) -> Self
    where
        F: Fn(BlockScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RunError>> + Send + 'static,
    {
        Self {
            opcode: opcode.to_string(),
            block_type,
            handler: Some(Arc::new(move |scope| f(scope).boxed())),
            evaluate: None,
            link_variable: None,
            link_boolean: None,
        }
    }

    fn with_evaluate<F, Fut>(opcode: &str, block_type: BlockType, f: F) -> Self
    where
        F: Fn(BlockScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RunError>> + Send + 'static,
    {
        Self {
            opcode: opcode.to_string(),
            block_type,
            handler: None,
            evaluate: Some(Arc::new(move |scope| f(scope).boxed())),
            link_variable: None,
            link_boolean: None,
        }
    }

    pub fn command<F, Fut>(opcode: &str, f: F) -> Self
    where
        F: Fn(BlockScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RunError>> + Send + 'static,
    {
        Self::with_handler(opcode, BlockType::Command, f)
    }

    pub fn hat<F, Fut>(opcode: &str, f: F) -> Self
    where
        F: Fn(BlockScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RunError>> + Send + 'static,
    {
        Self::with_handler(opcode, BlockType::Hat, f)
    }

    pub fn reporter<F, Fut>(opcode: &str, f: F) -> Self
    where
        F: Fn(BlockScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RunError>> + Send + 'static,
    {
        Self::with_evaluate(opcode, BlockType::Reporter, f)
    }

    pub fn boolean<F, Fut>(opcode: &str, f: F) -> Self
    where
        F: Fn(BlockScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RunError>> + Send + 'static,
    {
        Self::with_evaluate(opcode, BlockType::Boolean, f)
    }

    pub fn with_link_variable(
        mut self,
        f: impl Fn(&str, BlockScope) -> Result<(), RunError> + Send + Sync + 'static,
    ) -> Self {
        self.link_variable = Some(Arc::new(f));
        self
    }

    pub fn with_link_boolean(
        mut self,
        f: impl Fn(&str, BlockScope) -> Result<(), RunError> + Send + Sync + 'static,
    ) -> Self {
        self.link_boolean = Some(Arc::new(f));
        self
    }
}

/// One extension namespace and its opcode descriptors.
pub struct Extension {
    id: String,
    blocks: AHashMap<String, Arc<BlockSpec>>,
}

impl Extension {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            blocks: AHashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn add(&mut self, spec: BlockSpec) -> &mut Self {
        self.blocks.insert(spec.opcode.clone(), Arc::new(spec));
        self
    }

    pub fn opcodes(&self) -> impl Iterator<Item = &str> {
        self.blocks.keys().map(String::as_str)
    }
}

/// Process-wide registry of extensions, owned by the engine.
#[derive(Default)]
pub struct ExtensionRegistry {
    extensions: RwLock<AHashMap<String, Extension>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) an extension namespace.
    pub fn register(&self, extension: Extension) {
        tracing::debug!(extension = %extension.id, "registering extension");
        self.extensions
            .write()
            .expect("extension registry poisoned")
            .insert(extension.id.clone(), extension);
    }

    /// Resolves a descriptor, failing with a typed error when either the
    /// extension or the opcode is unknown.
    pub fn resolve(&self, extension_id: &str, opcode: &str) -> Result<Arc<BlockSpec>, RunError> {
        let extensions = self.extensions.read().expect("extension registry poisoned");
        let extension = extensions
            .get(extension_id)
            .ok_or_else(|| RunError::UnknownExtension(extension_id.to_string()))?;
        extension
            .blocks
            .get(opcode)
            .cloned()
            .ok_or_else(|| RunError::UnknownOpcode {
                extension_id: extension_id.to_string(),
                opcode: opcode.to_string(),
            })
    }

    pub fn contains(&self, extension_id: &str) -> bool {
        self.extensions
            .read()
            .expect("extension registry poisoned")
            .contains_key(extension_id)
    }
}

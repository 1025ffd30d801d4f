//! Prelude module for convenient imports
//!
//! This module re-exports the most commonly used types and traits from the kairo crate.
//! Import this module to get access to the core functionality without having to import
//! each type individually.
//!
//! # Example
//!
//! ```rust,no_run
//! // Use the prelude to get easy access to all the core types.
//! use kairo::prelude::*;
//!
//! # async fn run_example() -> Result<()> {
//! // Build an engine with the core extensions and load a diagram
//! let engine = Engine::builder().build();
//! kairo::blocks::register_core(&engine);
//!
//! let content = std::fs::read_to_string("path/to/diagram.json")?;
//! engine.load("tab-main", &content).await?;
//!
//! // Deliver a broadcast into the running diagram
//! engine.signal("tab-main", "door-opened", Value::from(true)).await;
//! # Ok(())
//! # }
//! ```

// Engine and lifecycle
pub use crate::runtime::{BlockScope, Engine, EngineBuilder, LockManager};

// Diagram model
pub use crate::diagram::{Block, Diagram, FieldValue};

// Registry types for extension authors
pub use crate::registry::{BlockSpec, BlockType, Extension, ExtensionRegistry};

// Values and input resolution helpers
pub use crate::resolve::MenuBlock;
pub use crate::value::Value;

// External collaborator traits
pub use crate::context::{DeviceBus, NotificationSink, VariableStore};

// Error types
pub use crate::error::{BuildError, RunError};

// Standard library re-exports commonly used with this crate
pub use std::sync::Arc;

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

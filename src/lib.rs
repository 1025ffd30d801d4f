//! # Kairo - Block Diagram Execution Engine
//!
//! **Kairo** executes node-based automation diagrams: serialized JSON block
//! graphs are parsed into an immutable in-memory model, and every top-level
//! block chain runs as its own asynchronous task. Extensions contribute the
//! actual block behavior through a registry of opcode handlers, so the engine
//! stays agnostic of what any given block does.
//!
//! ## Core Workflow
//!
//! 1.  **Register Extensions**: Build an [`runtime::Engine`] and register the
//!     core extensions (plus your own) into its [`registry::ExtensionRegistry`].
//! 2.  **Load a Diagram**: Call [`runtime::Engine::load`] with the serialized
//!     diagram of a tab. The engine parses it, schedules one task per
//!     top-level chain and keeps them running.
//! 3.  **Interact**: Deliver broadcasts with [`runtime::Engine::signal`],
//!     share state through a [`context::VariableStore`], and receive handler
//!     failures through a [`context::NotificationSink`].
//! 4.  **Reload or Tear Down**: Loading new content for the same tab releases
//!     the old diagram first and waits a grace period so in-flight handlers
//!     can observe cancellation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kairo::prelude::*;
//! use kairo::registry::BlockSpec;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let engine = Engine::builder().build();
//!     kairo::blocks::register_core(&engine);
//!
//!     // Contribute a custom extension.
//!     let mut hardware = Extension::new("hardware");
//!     hardware.add(BlockSpec::command("beep", |scope: BlockScope| async move {
//!         let times = scope.input_integer("TIMES").await?;
//!         println!("beep x{times}");
//!         Ok(())
//!     }));
//!     engine.register(hardware);
//!
//!     // Load a diagram and poke it.
//!     let content = std::fs::read_to_string("diagram.json")?;
//!     engine.load("tab-main", &content).await?;
//!     engine.signal("tab-main", "sunrise", Value::Null).await;
//!
//!     engine.release_all().await;
//!     Ok(())
//! }
//! ```

pub mod blocks;
pub mod context;
pub mod diagram;
pub mod error;
pub mod prelude;
pub mod registry;
pub mod resolve;
pub mod runtime;
pub mod value;

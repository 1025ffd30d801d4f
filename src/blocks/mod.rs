//! Built-in core extensions. Addons contribute further extensions through
//! [`Engine::register`](crate::runtime::Engine::register).

pub mod data;
pub mod event;

use crate::runtime::Engine;

/// Registers the core `event` and `data` extensions.
pub fn register_core(engine: &Engine) {
    engine.register(event::extension());
    engine.register(data::extension());
}

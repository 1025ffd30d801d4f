//! Interfaces to the external collaborators the engine drives side effects
//! through: the dashboard notification surface, the named-variable store and
//! the device command bus. The engine treats all of them as opaque and
//! non-transactional.

use crate::error::RunError;
use crate::value::Value;
use ahash::AHashMap;
use std::sync::Mutex;

/// Where structured failures and warnings are surfaced to the user.
pub trait NotificationSink: Send + Sync {
    fn error(&self, message: &str);
    fn warning(&self, message: &str);
}

/// External key-value store for named diagram variables.
pub trait VariableStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value);
}

/// Outbound device command interface.
pub trait DeviceBus: Send + Sync {
    fn send_command(&self, device_id: &str, command: &str, value: Value) -> Result<(), RunError>;
}

/// Sink that only logs; the default when no dashboard is attached.
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn error(&self, message: &str) {
        tracing::error!("{message}");
    }

    fn warning(&self, message: &str) {
        tracing::warn!("{message}");
    }
}

/// In-process variable store backed by a mutex-guarded map. The default
/// store, and the one the integration tests observe side effects through.
#[derive(Debug, Default)]
pub struct MemoryVariableStore {
    vars: Mutex<AHashMap<String, Value>>,
}

impl MemoryVariableStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VariableStore for MemoryVariableStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.vars
            .lock()
            .expect("variable store lock poisoned")
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) {
        self.vars
            .lock()
            .expect("variable store lock poisoned")
            .insert(key.to_string(), value);
    }
}

/// Device bus that drops every command. The default until an integration
/// provides a real one.
#[derive(Debug, Default)]
pub struct NullDeviceBus;

impl DeviceBus for NullDeviceBus {
    fn send_command(&self, _device_id: &str, _command: &str, _value: Value) -> Result<(), RunError> {
        Ok(())
    }
}

use crate::value::Value;
use ahash::AHashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A field literal plus the optional id of the backing block for
/// dropdown-style fields.
#[derive(Debug, Clone)]
pub struct FieldValue {
    pub value: Value,
    pub id: Option<String>,
}

type ReleaseListener = Box<dyn FnOnce() + Send>;

pub(crate) struct TaskHandle {
    pub cancel: CancellationToken,
    pub join: Option<JoinHandle<()>>,
}

/// One node of a diagram graph.
///
/// The owning [`Diagram`](super::Diagram)'s block table is the sole owner of
/// every block; `parent` and `next` are non-owning ids into that table, so
/// teardown is a single bulk operation. Everything structural is immutable
/// after construction. Only the scratch value map, the last-child-value
/// cache and the task/release state mutate at runtime.
pub struct Block {
    id: String,
    extension_id: String,
    opcode: String,
    shadow: bool,
    top_level: bool,
    parent: Option<String>,
    next: Option<String>,
    fields: AHashMap<String, FieldValue>,
    inputs: AHashMap<String, serde_json::Value>,
    values: Mutex<AHashMap<String, Value>>,
    last_child_value: Mutex<Option<Value>>,
    destroyed: AtomicBool,
    release_listeners: Mutex<Vec<ReleaseListener>>,
    task: Mutex<Option<TaskHandle>>,
}

/// Splits a raw opcode on its first `_` into `(extension_id, opcode)`.
/// An opcode without a namespace gets the empty extension id.
pub(crate) fn split_opcode(raw: &str) -> (String, String) {
    match raw.split_once('_') {
        Some((extension, opcode)) => (extension.to_string(), opcode.to_string()),
        None => (String::new(), raw.to_string()),
    }
}

impl Block {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: String,
        raw_opcode: &str,
        shadow: bool,
        top_level: bool,
        parent: Option<String>,
        next: Option<String>,
        fields: AHashMap<String, FieldValue>,
        inputs: AHashMap<String, serde_json::Value>,
    ) -> Self {
        let (extension_id, opcode) = split_opcode(raw_opcode);
        Self {
            id,
            extension_id,
            opcode,
            shadow,
            top_level,
            parent,
            next,
            fields,
            inputs,
            values: Mutex::new(AHashMap::new()),
            last_child_value: Mutex::new(None),
            destroyed: AtomicBool::new(false),
            release_listeners: Mutex::new(Vec::new()),
            task: Mutex::new(None),
        }
    }

    /// A stand-in for a `parent`/`next` id referenced by some entry but
    /// absent from the source JSON. Never top-level, so never scheduled.
    pub(crate) fn placeholder(id: &str) -> Self {
        Self::new(
            id.to_string(),
            "",
            false,
            false,
            None,
            None,
            AHashMap::new(),
            AHashMap::new(),
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn extension_id(&self) -> &str {
        &self.extension_id
    }

    pub fn opcode(&self) -> &str {
        &self.opcode
    }

    pub fn is_shadow(&self) -> bool {
        self.shadow
    }

    pub fn is_top_level(&self) -> bool {
        self.top_level
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn next_id(&self) -> Option<&str> {
        self.next.as_deref()
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn find_field(&self, predicate: impl Fn(&str) -> bool) -> Option<&str> {
        self.fields
            .keys()
            .find(|name| predicate(name))
            .map(String::as_str)
    }

    pub(crate) fn input_raw(&self, key: &str) -> Option<&serde_json::Value> {
        self.inputs.get(key)
    }

    pub fn input_keys(&self) -> impl Iterator<Item = &str> {
        self.inputs.keys().map(String::as_str)
    }

    /// Writes into this block's local scratch map. Values inherited from the
    /// parent scope are never touched.
    pub fn set_value(&self, key: &str, value: Value) {
        self.values
            .lock()
            .expect("block value map poisoned")
            .insert(key.to_string(), value);
    }

    pub fn local_value(&self, key: &str) -> Option<Value> {
        self.values
            .lock()
            .expect("block value map poisoned")
            .get(key)
            .cloned()
    }

    pub(crate) fn set_last_child_value(&self, value: Value) {
        *self
            .last_child_value
            .lock()
            .expect("last child value poisoned") = Some(value);
    }

    pub(crate) fn last_child_value(&self) -> Option<Value> {
        self.last_child_value
            .lock()
            .expect("last child value poisoned")
            .clone()
    }

    /// Registers a callback to run when this block's diagram is released.
    /// Handlers use this to drop external subscriptions they acquired.
    pub fn on_release(&self, listener: impl FnOnce() + Send + 'static) {
        self.release_listeners
            .lock()
            .expect("release listeners poisoned")
            .push(Box::new(listener));
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Relaxed)
    }

    /// Marks the block destroyed, cancels its task (if it roots one) and
    /// runs all registered release listeners. Idempotent.
    pub(crate) fn release(&self) {
        if self.destroyed.swap(true, Ordering::Relaxed) {
            return;
        }
        if let Some(handle) = self.task.lock().expect("task handle poisoned").as_ref() {
            handle.cancel.cancel();
        }
        let listeners: Vec<ReleaseListener> = std::mem::take(
            &mut *self
                .release_listeners
                .lock()
                .expect("release listeners poisoned"),
        );
        for listener in listeners {
            listener();
        }
    }

    /// Installs the task cancellation token before the task is spawned, so
    /// handlers running on the new task always find it.
    pub(crate) fn install_task(&self, cancel: CancellationToken) {
        *self.task.lock().expect("task handle poisoned") = Some(TaskHandle { cancel, join: None });
    }

    pub(crate) fn attach_join(&self, join: JoinHandle<()>) {
        if let Some(handle) = self.task.lock().expect("task handle poisoned").as_mut() {
            handle.join = Some(join);
        }
    }

    pub(crate) fn take_join(&self) -> Option<JoinHandle<()>> {
        self.task
            .lock()
            .expect("task handle poisoned")
            .as_mut()
            .and_then(|handle| handle.join.take())
    }

    pub(crate) fn task_token(&self) -> Option<CancellationToken> {
        self.task
            .lock()
            .expect("task handle poisoned")
            .as_ref()
            .map(|handle| handle.cancel.clone())
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("id", &self.id)
            .field("extension_id", &self.extension_id)
            .field("opcode", &self.opcode)
            .field("shadow", &self.shadow)
            .field("top_level", &self.top_level)
            .finish()
    }
}

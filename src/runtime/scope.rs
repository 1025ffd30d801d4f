use super::lock::{BroadcastLock, LockManager, Subscription};
use super::TabRuntime;
use crate::context::{DeviceBus, VariableStore};
use crate::diagram::Block;
use crate::error::RunError;
use crate::registry::{BlockSpec, BlockType};
use crate::resolve::{self, InputForm, MenuBlock};
use crate::value::Value;
use serde_json::Value as Json;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Handle to one block plus its tab's runtime services.
///
/// This is the API surface handlers receive: graph navigation, field and
/// input resolution, the scoped value map, lock access and chain execution.
/// Cloning is cheap (two `Arc`s).
#[derive(Clone)]
pub struct BlockScope {
    pub(crate) block: Arc<Block>,
    pub(crate) tab: Arc<TabRuntime>,
}

impl BlockScope {
    pub fn id(&self) -> &str {
        self.block.id()
    }

    pub fn extension_id(&self) -> &str {
        self.block.extension_id()
    }

    pub fn opcode(&self) -> &str {
        self.block.opcode()
    }

    pub fn is_shadow(&self) -> bool {
        self.block.is_shadow()
    }

    pub fn is_top_level(&self) -> bool {
        self.block.is_top_level()
    }

    pub fn tab_id(&self) -> &str {
        self.tab.diagram.tab_id()
    }

    pub fn block(&self) -> &Arc<Block> {
        &self.block
    }

    pub fn is_destroyed(&self) -> bool {
        self.block.is_destroyed() || self.cancellation().is_cancelled()
    }

    // ---- graph navigation ----

    pub fn scope_for(&self, id: &str) -> Option<BlockScope> {
        self.tab.diagram.block(id).map(|block| BlockScope {
            block: block.clone(),
            tab: self.tab.clone(),
        })
    }

    pub fn next(&self) -> Option<BlockScope> {
        self.block.next_id().and_then(|id| self.scope_for(id))
    }

    pub fn parent(&self) -> Option<BlockScope> {
        self.block.parent_id().and_then(|id| self.scope_for(id))
    }

    // ---- fields ----

    pub fn field(&self, name: &str) -> Result<Value, RunError> {
        self.block
            .field(name)
            .map(|field| field.value.clone())
            .ok_or_else(|| RunError::unresolved(self.id(), name, "no such field"))
    }

    pub fn field_bool(&self, name: &str) -> Result<bool, RunError> {
        self.field(name).map(|value| value.bool_value())
    }

    /// The optional backing-block/entity id stored next to a field value.
    pub fn field_id(&self, name: &str) -> Result<Option<String>, RunError> {
        self.block
            .field(name)
            .map(|field| field.id.clone())
            .ok_or_else(|| RunError::unresolved(self.id(), name, "no such field"))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.block.has_field(name)
    }

    pub fn find_field(&self, predicate: impl Fn(&str) -> bool) -> Option<String> {
        self.block.find_field(predicate).map(|name| name.to_string())
    }

    // ---- scoped values ----

    pub fn set_value(&self, key: &str, value: Value) {
        self.block.set_value(key, value);
    }

    /// Reads a value, falling back through the enclosing scope. Ancestor
    /// values are read-only from here.
    pub fn value(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.block.local_value(key) {
            return Some(value);
        }
        self.parent().and_then(|parent| parent.value(key))
    }

    /// The most recent value produced in the enclosing scope: the nearest
    /// ancestor's `"value"` entry, or its cached last-child evaluation.
    pub fn last_value(&self) -> Option<Value> {
        let mut cursor = self.parent();
        while let Some(scope) = cursor {
            if let Some(value) = scope.block.local_value("value") {
                return Some(value);
            }
            if let Some(value) = scope.block.last_child_value() {
                return Some(value);
            }
            cursor = scope.parent();
        }
        None
    }

    // ---- input resolution ----

    pub fn has_input(&self, key: &str) -> Result<bool, RunError> {
        match self.block.input_raw(key) {
            None => Ok(false),
            Some(raw) => resolve::has_payload(self.id(), key, raw),
        }
    }

    /// Resolves an input slot. With `fetch` semantics a block reference is
    /// recursively evaluated (synchronously, within the calling task) and
    /// the result cached as this block's last-child-value; without, the
    /// referenced id comes back unresolved for consumers that dereference
    /// it themselves.
    pub async fn input(&self, key: &str, fetch: bool) -> Result<Value, RunError> {
        let raw = self
            .block
            .input_raw(key)
            .ok_or_else(|| RunError::unresolved(self.id(), key, "no such input"))?;
        match resolve::decode(self.id(), key, raw)? {
            InputForm::Literal(value) => Ok(value),
            InputForm::Primitive { kind, array } => Ok(if fetch {
                kind.fetch(&array)
            } else {
                kind.reference(&array)
            }),
            InputForm::Reference(id) => {
                if !fetch {
                    return Ok(Value::Text(id));
                }
                let target = self.scope_for(&id).ok_or_else(|| {
                    RunError::unresolved(self.id(), key, format!("referenced block '{id}' not found"))
                })?;
                let value = target.evaluate().await?;
                self.block.set_last_child_value(value.clone());
                Ok(value)
            }
        }
    }

    pub async fn input_string(&self, key: &str) -> Result<String, RunError> {
        Ok(self.input(key, true).await?.string_value())
    }

    pub async fn input_float(&self, key: &str, default: f64) -> Result<f64, RunError> {
        Ok(self.input(key, true).await?.float_value(default))
    }

    pub async fn input_integer(&self, key: &str) -> Result<i64, RunError> {
        Ok(self.input(key, true).await?.int_value(0))
    }

    pub async fn input_bytes(&self, key: &str) -> Result<Vec<u8>, RunError> {
        Ok(self.input(key, true).await?.byte_array_value())
    }

    pub async fn input_json(&self, key: &str) -> Result<Json, RunError> {
        match self.input(key, true).await? {
            Value::Json(json) => Ok(json),
            Value::Null => Ok(Json::Null),
            Value::Text(text) => serde_json::from_str(&text)
                .map_err(|err| RunError::unresolved(self.id(), key, err.to_string())),
            other => serde_json::to_value(&other)
                .map_err(|err| RunError::unresolved(self.id(), key, err.to_string())),
        }
    }

    /// A literal boolean comes back directly; a boolean-block connection is
    /// dereferenced and evaluated.
    pub async fn input_bool(&self, key: &str) -> Result<bool, RunError> {
        match self.input(key, false).await? {
            Value::Bool(b) => Ok(b),
            Value::Text(id) => {
                let target = self.scope_for(&id).ok_or_else(|| {
                    RunError::unresolved(self.id(), key, format!("referenced block '{id}' not found"))
                })?;
                Ok(target.evaluate().await?.bool_value())
            }
            other => Ok(other.bool_value()),
        }
    }

    /// The block an input connects to, without evaluating it.
    pub async fn input_block(&self, key: &str) -> Result<BlockScope, RunError> {
        match self.input(key, false).await? {
            Value::Text(id) => self.scope_for(&id).ok_or_else(|| {
                RunError::unresolved(self.id(), key, format!("referenced block '{id}' not found"))
            }),
            other => Err(RunError::unresolved(
                self.id(),
                key,
                format!("input '{other}' is not a block reference"),
            )),
        }
    }

    // ---- menu indirection ----

    /// The backing (usually shadow) block a menu input points at.
    pub fn menu_backing_block(&self, key: &str) -> Result<BlockScope, RunError> {
        let raw = self
            .block
            .input_raw(key)
            .ok_or_else(|| RunError::unresolved(self.id(), key, "no such input"))?;
        let id = raw
            .as_array()
            .and_then(|array| array.get(1))
            .and_then(Json::as_str)
            .ok_or_else(|| {
                RunError::unresolved(self.id(), key, "menu input has no backing block id")
            })?;
        self.scope_for(id).ok_or_else(|| {
            RunError::unresolved(self.id(), key, format!("menu backing block '{id}' not found"))
        })
    }

    /// Reads the dropdown selection stored in the backing block's field. A
    /// required menu resolving to empty or the `-` placeholder fails.
    pub fn menu_value(&self, key: &str, menu: &MenuBlock) -> Result<Value, RunError> {
        let backing = self.menu_backing_block(key)?;
        let value = backing.field(&menu.name)?;
        if menu.required {
            let text = value.string_value();
            if text.is_empty() || text == "-" {
                return Err(RunError::unresolved(
                    self.id(),
                    key,
                    format!("{} menu value not found", menu.name),
                ));
            }
        }
        Ok(value)
    }

    /// Splits the backing field on `delimiter` and parses each token,
    /// skipping tokens with no matching constant, in source order.
    pub fn menu_values<T: FromStr>(
        &self,
        key: &str,
        menu: &MenuBlock,
        delimiter: &str,
    ) -> Result<Vec<T>, RunError> {
        let backing = self.menu_backing_block(key)?;
        let joined = backing.field(&menu.name)?.string_value();
        Ok(joined
            .split(delimiter)
            .filter_map(|token| token.parse().ok())
            .collect())
    }

    // ---- execution ----

    pub fn spec(&self) -> Result<Arc<BlockSpec>, RunError> {
        self.tab
            .services
            .registry
            .resolve(self.extension_id(), self.opcode())
    }

    pub(crate) fn failure(&self, reason: impl Into<String>) -> RunError {
        RunError::HandlerFailure {
            extension_id: self.extension_id().to_string(),
            opcode: self.opcode().to_string(),
            reason: reason.into(),
        }
    }

    /// Runs this block's command chain: each handler in `next` order,
    /// stopping on the first failure or after a hat block. Hat blocks
    /// resume their chain only through their own subscription.
    pub async fn handle(&self) -> Result<(), RunError> {
        let mut cursor = self.clone();
        loop {
            if cursor.is_destroyed() {
                return Err(RunError::Cancelled);
            }
            let spec = cursor.spec()?;
            let handler = spec
                .handler
                .clone()
                .ok_or_else(|| cursor.failure("block has no command handler"))?;
            handler(cursor.clone()).await?;
            if spec.block_type == BlockType::Hat {
                return Ok(());
            }
            match cursor.next() {
                Some(next) => cursor = next,
                None => return Ok(()),
            }
        }
    }

    /// Evaluates this reporter/boolean block, caching the result under
    /// `"value"` in its local map.
    pub async fn evaluate(&self) -> Result<Value, RunError> {
        let spec = self.spec()?;
        let evaluate = spec
            .evaluate
            .clone()
            .ok_or_else(|| self.failure("block has no evaluate handler"))?;
        let value = evaluate(self.clone()).await?;
        self.set_value("value", value.clone());
        Ok(value)
    }

    /// Dispatches to `handle` when the descriptor carries a command handler,
    /// otherwise to `evaluate`.
    pub async fn handle_or_evaluate(&self) -> Result<(), RunError> {
        let spec = self.spec()?;
        if spec.handler.is_some() {
            self.handle().await
        } else {
            self.evaluate().await.map(|_| ())
        }
    }

    // ---- links ----

    pub fn link_variable(&self, variable_id: &str) -> Result<(), RunError> {
        let spec = self.spec()?;
        let link = spec
            .link_variable
            .clone()
            .ok_or_else(|| self.failure("block does not accept a linked variable"))?;
        link(variable_id, self.clone())
    }

    pub fn link_boolean(&self, variable_id: &str) -> Result<(), RunError> {
        let spec = self.spec()?;
        let link = spec
            .link_boolean
            .clone()
            .ok_or_else(|| self.failure("block does not accept a linked boolean variable"))?;
        link(variable_id, self.clone())
    }

    // ---- locks and cancellation ----

    pub fn lock_manager(&self) -> &LockManager {
        &self.tab.locks
    }

    /// Subscribes this block to a lock; signal payloads land in this
    /// block's value map before [`Subscription::recv`] wakes.
    pub fn subscribe(&self, lock: &BroadcastLock) -> Subscription {
        lock.subscribe(self.block.clone())
    }

    /// The nearest enclosing task's cancellation token: the chain root's if
    /// one owns a task, otherwise the diagram token. Handlers select on this
    /// at every suspension point.
    pub fn cancellation(&self) -> CancellationToken {
        let mut cursor = Some(self.clone());
        while let Some(scope) = cursor {
            if let Some(token) = scope.block.task_token() {
                return token;
            }
            cursor = scope.parent();
        }
        self.tab.cancel.clone()
    }

    // ---- collaborators ----

    pub fn variables(&self) -> &Arc<dyn VariableStore> {
        &self.tab.services.variables
    }

    pub fn devices(&self) -> &Arc<dyn DeviceBus> {
        &self.tab.services.devices
    }

    /// Logs and surfaces an error, tagged with this block's extension and
    /// opcode for diagnosis.
    pub fn report_error(&self, message: &str) {
        tracing::error!(
            extension = %self.extension_id(),
            opcode = %self.opcode(),
            "{message}"
        );
        self.tab.services.notifier.error(message);
    }

    pub fn report_warning(&self, message: &str) {
        tracing::warn!(
            extension = %self.extension_id(),
            opcode = %self.opcode(),
            "{message}"
        );
        self.tab.services.notifier.warning(message);
    }

    pub fn report_run_error(&self, err: &RunError) {
        self.report_error(&err.to_string());
    }
}

impl std::fmt::Debug for BlockScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockScope")
            .field("id", &self.id())
            .field("extension_id", &self.extension_id())
            .field("opcode", &self.opcode())
            .finish()
    }
}

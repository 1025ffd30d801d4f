//! The engine: diagram lifecycle (load, hot-reload with a grace period,
//! teardown), the per-tab runtime state and the task scheduler.

mod lock;
mod scheduler;
mod scope;

pub use lock::{BroadcastLock, LockManager, Subscription};
pub use scope::BlockScope;

use crate::context::{
    DeviceBus, LogSink, MemoryVariableStore, NotificationSink, NullDeviceBus, VariableStore,
};
use crate::diagram::Diagram;
use crate::error::BuildError;
use crate::registry::{Extension, ExtensionRegistry};
use crate::value::Value;
use ahash::{AHashMap, AHashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// How long a reload waits after cancelling the old diagram before
/// discarding it, so in-flight handlers can observe cancellation and drop
/// external resources.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);

pub(crate) struct EngineServices {
    pub registry: ExtensionRegistry,
    pub notifier: Arc<dyn NotificationSink>,
    pub variables: Arc<dyn VariableStore>,
    pub devices: Arc<dyn DeviceBus>,
}

/// Runtime state of one loaded diagram: the immutable block graph, its lock
/// manager and the root cancellation token all chain tasks descend from.
pub struct TabRuntime {
    pub(crate) diagram: Diagram,
    pub(crate) locks: LockManager,
    pub(crate) cancel: CancellationToken,
    pub(crate) services: Arc<EngineServices>,
}

impl TabRuntime {
    fn new(diagram: Diagram, services: Arc<EngineServices>) -> Arc<Self> {
        let locks = LockManager::new(diagram.tab_id());
        Arc::new(Self {
            diagram,
            locks,
            cancel: CancellationToken::new(),
            services,
        })
    }

    pub fn diagram(&self) -> &Diagram {
        &self.diagram
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Releases the whole diagram in bulk: lock subscribers first so no
    /// further signals are delivered, then every block (task cancellation
    /// and release listeners). Idempotent.
    pub(crate) fn release(&self) {
        self.locks.release();
        self.cancel.cancel();
        for block in self.diagram.blocks() {
            block.release();
        }
        tracing::info!(tab = %self.diagram.tab_id(), "diagram released");
    }
}

/// The execution engine. Owns the extension registry, the external
/// collaborator handles and the map of active diagrams; constructed once at
/// startup and shared by handle.
pub struct Engine {
    services: Arc<EngineServices>,
    tabs: Mutex<AHashMap<String, Arc<TabRuntime>>>,
    // Serializes load: the grace sleep must not overlap another load's
    // release/insert window for the same tab.
    load_guard: Mutex<()>,
    once_opcodes: AHashSet<String>,
    grace: Duration,
}

pub struct EngineBuilder {
    notifier: Arc<dyn NotificationSink>,
    variables: Arc<dyn VariableStore>,
    devices: Arc<dyn DeviceBus>,
    once_opcodes: AHashSet<String>,
    grace: Duration,
}

impl EngineBuilder {
    pub fn new() -> Self {
        let mut once_opcodes = AHashSet::new();
        once_opcodes.insert("boolean_link".to_string());
        once_opcodes.insert("group_variable_link".to_string());
        Self {
            notifier: Arc::new(LogSink),
            variables: Arc::new(MemoryVariableStore::new()),
            devices: Arc::new(NullDeviceBus),
            once_opcodes,
            grace: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn variables(mut self, variables: Arc<dyn VariableStore>) -> Self {
        self.variables = variables;
        self
    }

    pub fn devices(mut self, devices: Arc<dyn DeviceBus>) -> Self {
        self.devices = devices;
        self
    }

    /// Adds an opcode to the once-execution set: its top-level blocks run
    /// inline at schedule time instead of getting a task.
    pub fn once_opcode(mut self, opcode: &str) -> Self {
        self.once_opcodes.insert(opcode.to_string());
        self
    }

    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            services: Arc::new(EngineServices {
                registry: ExtensionRegistry::new(),
                notifier: self.notifier,
                variables: self.variables,
                devices: self.devices,
            }),
            tabs: Mutex::new(AHashMap::new()),
            load_guard: Mutex::new(()),
            once_opcodes: self.once_opcodes,
            grace: self.grace,
        }
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.services.registry
    }

    pub fn register(&self, extension: Extension) {
        self.services.registry.register(extension);
    }

    /// True when the serialized diagram carries no blocks and no comments.
    /// Malformed JSON and JSON without a `target` object are not empty; they
    /// must reach the parser and fail the load there.
    pub fn is_empty_content(content: &str) -> bool {
        if content.trim().is_empty() {
            return true;
        }
        let Ok(root) = serde_json::from_str::<serde_json::Value>(content) else {
            return false;
        };
        let Some(target) = root.get("target") else {
            return false;
        };
        for key in ["comments", "blocks"] {
            if let Some(map) = target.get(key).and_then(serde_json::Value::as_object) {
                if !map.is_empty() {
                    return false;
                }
            }
        }
        true
    }

    /// (Re)loads one tab from its serialized diagram.
    ///
    /// The new content is parsed first: a malformed diagram fails the load
    /// and leaves any previously running diagram untouched. On success the
    /// old diagram (if any) is released, the grace period elapses so
    /// in-flight handlers observe cancellation, and only then is the new
    /// diagram scheduled. Empty content tears the tab down.
    pub async fn load(&self, tab_id: &str, content: &str) -> Result<(), BuildError> {
        let diagram = if Self::is_empty_content(content) {
            None
        } else {
            Some(Diagram::parse(tab_id, content)?)
        };

        // One load at a time; a concurrent load must not observe the window
        // between releasing the old runtime and inserting the new one.
        let _guard = self.load_guard.lock().await;

        let old = self.tabs.lock().await.remove(tab_id);
        if let Some(old) = old {
            tracing::info!(tab = %tab_id, "releasing old diagram before reload");
            old.release();
            tracing::info!(tab = %tab_id, grace = ?self.grace, "waiting for old diagram to finish");
            tokio::time::sleep(self.grace).await;
        }

        let Some(diagram) = diagram else {
            return Ok(());
        };
        tracing::info!(tab = %tab_id, blocks = diagram.len(), "scheduling diagram");
        let tab = TabRuntime::new(diagram, self.services.clone());
        let displaced = self
            .tabs
            .lock()
            .await
            .insert(tab_id.to_string(), tab.clone());
        if let Some(displaced) = displaced {
            displaced.release();
        }
        scheduler::schedule(&tab, &self.once_opcodes).await;
        Ok(())
    }

    /// Tears down one tab; triggered by entity removal.
    pub async fn remove(&self, tab_id: &str) {
        if let Some(tab) = self.tabs.lock().await.remove(tab_id) {
            tab.release();
        }
    }

    /// Tears down every tab.
    pub async fn release_all(&self) {
        let tabs: Vec<Arc<TabRuntime>> = self.tabs.lock().await.drain().map(|(_, tab)| tab).collect();
        for tab in tabs {
            tab.release();
        }
    }

    /// Delivers a broadcast into one tab's lock manager.
    pub async fn signal(&self, tab_id: &str, name: &str, payload: Value) {
        let tab = self.tabs.lock().await.get(tab_id).cloned();
        if let Some(tab) = tab {
            tab.locks.signal(name, payload);
        }
    }

    /// Delivers a broadcast into every tab's lock manager.
    pub async fn signal_all(&self, name: &str, payload: Value) {
        let tabs: Vec<Arc<TabRuntime>> = self.tabs.lock().await.values().cloned().collect();
        for tab in tabs {
            tab.locks.signal(name, payload.clone());
        }
    }

    /// Looks a block up across the active tab, for collaborators that need
    /// to inspect or poke one directly.
    pub async fn block(&self, tab_id: &str, block_id: &str) -> Option<BlockScope> {
        let tab = self.tabs.lock().await.get(tab_id).cloned()?;
        tab.diagram.block(block_id).map(|block| BlockScope {
            block: block.clone(),
            tab: tab.clone(),
        })
    }

    /// Whether a tab is currently loaded.
    pub async fn is_loaded(&self, tab_id: &str) -> bool {
        self.tabs.lock().await.contains_key(tab_id)
    }

    /// Awaits every chain task of a tab that can finish on its own.
    /// Diagnostic aid: chains blocked on a lock only end via reload/remove.
    pub async fn join_tab(&self, tab_id: &str) {
        let tab = self.tabs.lock().await.get(tab_id).cloned();
        let Some(tab) = tab else {
            return;
        };
        let joins: Vec<_> = tab
            .diagram
            .blocks()
            .filter_map(|block| block.take_join())
            .collect();
        for join in joins {
            let _ = join.await;
        }
    }
}

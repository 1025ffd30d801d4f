//! Common test utilities: diagram JSON builders, a recording notification
//! sink and a test extension whose handlers record what they executed.
use kairo::prelude::*;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

/// Shared execution log the test extension's handlers append to.
#[derive(Clone, Default)]
pub struct Trace(Arc<Mutex<Vec<String>>>);

impl Trace {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().expect("trace poisoned").push(entry.into());
    }

    #[allow(dead_code)]
    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().expect("trace poisoned").clone()
    }
}

/// Notification sink that records instead of logging.
#[derive(Default)]
pub struct RecordingSink {
    errors: Mutex<Vec<String>>,
    warnings: Mutex<Vec<String>>,
}

impl RecordingSink {
    #[allow(dead_code)]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[allow(dead_code)]
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().expect("sink poisoned").clone()
    }

    #[allow(dead_code)]
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().expect("sink poisoned").clone()
    }
}

impl NotificationSink for RecordingSink {
    fn error(&self, message: &str) {
        self.errors
            .lock()
            .expect("sink poisoned")
            .push(message.to_string());
    }

    fn warning(&self, message: &str) {
        self.warnings
            .lock()
            .expect("sink poisoned")
            .push(message.to_string());
    }
}

/// Dropdown constants for the menu parsing tests.
#[derive(Debug, PartialEq)]
#[allow(dead_code)]
pub enum Color {
    Red,
    Green,
    Blue,
}

impl FromStr for Color {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "RED" => Ok(Color::Red),
            "GREEN" => Ok(Color::Green),
            "BLUE" => Ok(Color::Blue),
            _ => Err(()),
        }
    }
}

/// Wraps a `blocks` object into the serialized diagram shape.
#[allow(dead_code)]
pub fn diagram_json(blocks: serde_json::Value) -> String {
    serde_json::json!({ "target": { "blocks": blocks } }).to_string()
}

/// Builds the `test` extension: every handler appends to `trace` so tests
/// can assert on what ran, and in which order.
#[allow(dead_code)]
pub fn test_extension(trace: &Trace) -> Extension {
    let mut ext = Extension::new("test");

    let t = trace.clone();
    ext.add(BlockSpec::command("step", move |scope: BlockScope| {
        let t = t.clone();
        async move {
            t.push(format!("step:{}", scope.id()));
            Ok(())
        }
    }));

    let t = trace.clone();
    ext.add(BlockSpec::command("record", move |scope: BlockScope| {
        let t = t.clone();
        async move {
            let text = scope.input_string("TEXT").await?;
            t.push(text);
            Ok(())
        }
    }));

    ext.add(BlockSpec::reporter("seven", |_scope: BlockScope| async move {
        Ok(Value::from(7.0))
    }));

    ext.add(BlockSpec::reporter("echo", |scope: BlockScope| async move {
        scope.input("TEXT", true).await
    }));

    ext.add(BlockSpec::boolean("yes", |_scope: BlockScope| async move {
        Ok(Value::Bool(true))
    }));

    // Parks on a lock nobody signals; records how it was woken up.
    let t = trace.clone();
    ext.add(BlockSpec::command("wait", move |scope: BlockScope| {
        let t = t.clone();
        async move {
            let lock = scope.lock_manager().get_or_create("never");
            let mut sub = scope.subscribe(&lock);
            let cancel = scope.cancellation();
            t.push("parked");
            match sub.recv(&cancel).await {
                Some(payload) => t.push(format!("woken:{payload}")),
                None => t.push("stopped"),
            }
            Ok(())
        }
    }));

    ext.add(BlockSpec::command("fail", |_scope: BlockScope| async move {
        Err(RunError::HandlerFailure {
            extension_id: "test".to_string(),
            opcode: "fail".to_string(),
            reason: "boom".to_string(),
        })
    }));

    let t = trace.clone();
    ext.add(BlockSpec::command("paint", move |scope: BlockScope| {
        let t = t.clone();
        async move {
            let colors: Vec<Color> = scope.menu_values("COLORS", &MenuBlock::named("COLOR"), ",")?;
            t.push(format!("{colors:?}"));
            Ok(())
        }
    }));

    let t = trace.clone();
    ext.add(
        BlockSpec::command("linkable", |_scope: BlockScope| async move { Ok(()) })
            .with_link_boolean(move |variable_id, _scope| {
                t.push(format!("linked:{variable_id}"));
                Ok(())
            }),
    );

    ext
}

/// Routes engine tracing into the captured test output.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// An engine with the core and test extensions and a short grace period, so
/// reload tests stay fast.
#[allow(dead_code)]
pub fn test_engine(trace: &Trace) -> Engine {
    init_tracing();
    let engine = Engine::builder()
        .grace_period(Duration::from_millis(10))
        .build();
    kairo::blocks::register_core(&engine);
    engine.register(test_extension(trace));
    engine
}

/// Same, but surfacing handler failures into a recording sink.
#[allow(dead_code)]
pub fn test_engine_with_sink(trace: &Trace, sink: Arc<RecordingSink>) -> Engine {
    init_tracing();
    let engine = Engine::builder()
        .notifier(sink)
        .grace_period(Duration::from_millis(10))
        .build();
    kairo::blocks::register_core(&engine);
    engine.register(test_extension(trace));
    engine
}

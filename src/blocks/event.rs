//! The `event` extension: broadcast signalling between chains.

use crate::error::RunError;
use crate::registry::{BlockSpec, Extension};
use crate::runtime::BlockScope;
use crate::value::Value;

pub const EXTENSION_ID: &str = "event";

pub const BROADCAST: &str = "broadcast";
pub const GOT_BROADCAST: &str = "got_broadcast";

pub const BROADCAST_INPUT: &str = "BROADCAST_INPUT";
pub const BROADCAST_OPTION: &str = "BROADCAST_OPTION";

pub fn extension() -> Extension {
    let mut extension = Extension::new(EXTENSION_ID);
    extension.add(BlockSpec::command(BROADCAST, broadcast_handler));
    extension.add(BlockSpec::hat(GOT_BROADCAST, got_broadcast_handler));
    extension
}

async fn broadcast_handler(scope: BlockScope) -> Result<(), RunError> {
    let name = scope.input_string(BROADCAST_INPUT).await?;
    scope
        .lock_manager()
        .signal(&name, Value::Text("event".to_string()));
    Ok(())
}

/// Hat: re-runs its `next` chain on every delivery of the named broadcast
/// until the diagram is released.
async fn got_broadcast_handler(scope: BlockScope) -> Result<(), RunError> {
    let Some(next) = scope.next() else {
        return Ok(());
    };
    let name = match scope.field_id(BROADCAST_OPTION)? {
        Some(id) => id,
        None => scope.field(BROADCAST_OPTION)?.string_value(),
    };
    let lock = scope.lock_manager().get_or_create(&name);
    let mut subscription = scope.subscribe(&lock);
    let cancel = scope.cancellation();
    while let Some(_payload) = subscription.recv(&cancel).await {
        if let Err(err) = next.handle().await {
            next.report_run_error(&err);
        }
    }
    Ok(())
}

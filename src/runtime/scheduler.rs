//! Turns a loaded diagram into running tasks: one tokio task per top-level
//! non-shadow chain, except for the fixed set of once-execution opcodes
//! (structural links) which run inline and never get a task.

use super::{BlockScope, TabRuntime};
use crate::error::RunError;
use ahash::AHashSet;
use std::sync::Arc;

pub(crate) async fn schedule(tab: &Arc<TabRuntime>, once_opcodes: &AHashSet<String>) {
    for block in tab.diagram.blocks() {
        if !block.is_top_level() || block.is_shadow() {
            continue;
        }
        let scope = BlockScope {
            block: block.clone(),
            tab: tab.clone(),
        };
        if once_opcodes.contains(block.opcode()) {
            execute_once(scope).await;
        } else {
            spawn_chain(scope);
        }
    }
}

async fn execute_once(scope: BlockScope) {
    tracing::debug!(block = %scope.id(), "executing once block");
    if let Err(err) = scope.handle().await {
        scope.report_run_error(&err);
    }
}

fn spawn_chain(scope: BlockScope) {
    // The token must be visible on the root before the task body runs, so
    // handlers can find their cancellation point immediately.
    let cancel = scope.tab.cancel.child_token();
    scope.block.install_task(cancel);

    let task_scope = scope.clone();
    let join = tokio::spawn(async move {
        tracing::info!(
            block = %task_scope.id(),
            tab = %task_scope.tab_id(),
            "workspace task started"
        );
        match task_scope.handle_or_evaluate().await {
            Ok(()) => tracing::info!(block = %task_scope.id(), "workspace task finished"),
            Err(RunError::Cancelled) => {
                tracing::debug!(block = %task_scope.id(), "workspace task cancelled");
            }
            Err(err) => task_scope.report_run_error(&err),
        }
    });
    scope.block.attach_join(join);
}

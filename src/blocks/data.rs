//! The `data` extension: named variables and structural variable links.

use crate::error::RunError;
use crate::registry::{BlockSpec, Extension};
use crate::runtime::BlockScope;
use crate::value::Value;

pub const EXTENSION_ID: &str = "data";

pub const SET_VARIABLE: &str = "set_variable";
pub const GET_VARIABLE: &str = "get_variable";
pub const BOOLEAN_LINK: &str = "boolean_link";
pub const GROUP_VARIABLE_LINK: &str = "group_variable_link";

pub const VARIABLE: &str = "VARIABLE";
pub const VALUE: &str = "VALUE";
pub const ITEM: &str = "ITEM";

pub fn extension() -> Extension {
    let mut extension = Extension::new(EXTENSION_ID);
    extension.add(BlockSpec::command(SET_VARIABLE, set_variable));
    extension.add(BlockSpec::reporter(GET_VARIABLE, get_variable));
    extension.add(BlockSpec::command(BOOLEAN_LINK, boolean_link));
    extension.add(BlockSpec::command(GROUP_VARIABLE_LINK, group_variable_link));
    extension
}

fn variable_id(scope: &BlockScope) -> Result<String, RunError> {
    let id = match scope.field_id(VARIABLE)? {
        Some(id) => id,
        None => scope.field(VARIABLE)?.string_value(),
    };
    if id.is_empty() {
        return Err(scope.failure("variable field is empty"));
    }
    Ok(id)
}

async fn set_variable(scope: BlockScope) -> Result<(), RunError> {
    let id = variable_id(&scope)?;
    let value = scope.input(VALUE, true).await?;
    scope.variables().set(&id, value);
    Ok(())
}

async fn get_variable(scope: BlockScope) -> Result<Value, RunError> {
    let id = variable_id(&scope)?;
    Ok(scope.variables().get(&id).unwrap_or_default())
}

/// Once-execution structural link: attaches a boolean dashboard variable to
/// the block connected as this link's item.
async fn boolean_link(scope: BlockScope) -> Result<(), RunError> {
    let id = variable_id(&scope)?;
    let target = scope.input_block(ITEM).await?;
    target.link_boolean(&id)
}

async fn group_variable_link(scope: BlockScope) -> Result<(), RunError> {
    let id = variable_id(&scope)?;
    let target = scope.input_block(ITEM).await?;
    target.link_variable(&id)
}

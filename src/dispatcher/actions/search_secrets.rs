//! `search_secrets`: self-contained. The durability contract
//! exposes secrets only by exact name (`get_secret`), never
//! as an enumerable list — so "search" here is a presence check against
//! one candidate name rather than a substring scan over the whole
//! table. The secret's *value* is never returned.

use crate::action::Params;
use crate::agent::stimulus::ActionOutcome;
use crate::dispatcher::actions::require_str;
use crate::dispatcher::{ok, DispatchScope};
use crate::error::CoreError;

pub async fn run(params: Params, scope: &DispatchScope) -> Result<ActionOutcome, CoreError> {
    let name = require_str(&params, "name")?;
    let found = scope.env.store.get_secret(name).await?.is_some();
    Ok(ok(if found {
        format!("secret '{name}' exists")
    } else {
        format!("secret '{name}' not found")
    }))
}

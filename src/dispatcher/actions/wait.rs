//! `wait`. The
//! dispatcher's half of this action is a no-op acknowledgment; arming
//! (or re-arming) the one wait timer a [`crate::agent::state::AgentState`]
//! is allowed to hold happens in
//! [`crate::agent::core::Agent`], which owns `wait_timer` and is the only
//! writer permitted to mutate it.

use crate::action::Params;
use crate::agent::stimulus::ActionOutcome;
use crate::dispatcher::{ok, DispatchScope};
use crate::error::CoreError;

pub async fn run(_params: Params, _scope: &DispatchScope) -> Result<ActionOutcome, CoreError> {
    Ok(ok("waiting"))
}

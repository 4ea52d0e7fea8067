//! `orient`: a self-contained, side-effect-free context
//! refresh. The agent proposes it to re-read its own `<budget>`/
//! `<children>`/`<todos>` envelope without taking any external action —
//! the envelope itself is assembled by [`crate::agent::prompt`] before
//! the next round, so this executor only needs to acknowledge.

use crate::action::Params;
use crate::agent::stimulus::ActionOutcome;
use crate::dispatcher::{ok, DispatchScope};
use crate::error::CoreError;

pub async fn run(_params: Params, _scope: &DispatchScope) -> Result<ActionOutcome, CoreError> {
    Ok(ok("oriented"))
}

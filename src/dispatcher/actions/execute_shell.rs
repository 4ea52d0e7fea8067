//! `execute_shell`: costly only when it starts a new command
//! (see [`crate::action::is_costly`]); a `check_id` or
//! `terminate` param instead polls or kills an already-running command.
//! All three sub-operations ultimately need a real process supervisor,
//! which is an out-of-scope adapter concern regardless of
//! which sub-operation is requested — so every branch here delegates to
//! [`crate::dispatcher::ExternalAction`] rather than only the
//! long-running start path.

use crate::action::{ActionKind, Params};
use crate::agent::stimulus::ActionOutcome;
use crate::dispatcher::DispatchScope;
use crate::error::{CoreError, ErrorKind};

pub async fn run(params: Params, scope: &DispatchScope) -> Result<ActionOutcome, CoreError> {
    match &scope.env.external_actions {
        Some(adapter) => adapter.call(ActionKind::ExecuteShell, &params).await,
        None => Err(CoreError::new(ErrorKind::ServiceUnavailable)
            .with_context("no execute_shell adapter configured")),
    }
}

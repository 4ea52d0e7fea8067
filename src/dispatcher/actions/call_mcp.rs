//! `call_mcp`: a Model Context Protocol tool-call adapter,
//! out of scope for this crate — that plumbing belongs to
//! the adapter this crate only specifies the contract for.

use crate::action::{ActionKind, Params};
use crate::agent::stimulus::ActionOutcome;
use crate::dispatcher::DispatchScope;
use crate::error::{CoreError, ErrorKind};

pub async fn run(params: Params, scope: &DispatchScope) -> Result<ActionOutcome, CoreError> {
    match &scope.env.external_actions {
        Some(adapter) => adapter.call(ActionKind::CallMcp, &params).await,
        None => Err(CoreError::new(ErrorKind::ServiceUnavailable)
            .with_context("no call_mcp adapter configured")),
    }
}

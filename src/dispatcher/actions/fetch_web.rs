//! `fetch_web`: a network adapter explicitly out of scope
//! for this crate. The
//! only contract this crate owns is delegation to whatever
//! [`crate::dispatcher::ExternalAction`] the embedding application wires
//! into [`crate::config::Environment`]; absent one, the action fails
//! `service_unavailable` rather than silently no-opping.

use crate::action::{ActionKind, Params};
use crate::agent::stimulus::ActionOutcome;
use crate::dispatcher::DispatchScope;
use crate::error::{CoreError, ErrorKind};

pub async fn run(params: Params, scope: &DispatchScope) -> Result<ActionOutcome, CoreError> {
    match &scope.env.external_actions {
        Some(adapter) => adapter.call(ActionKind::FetchWeb, &params).await,
        None => Err(CoreError::new(ErrorKind::ServiceUnavailable)
            .with_context("no fetch_web adapter configured")),
    }
}

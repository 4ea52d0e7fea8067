//! `generate_images`: an image-generation adapter, out of
//! scope for this crate — that body belongs to the
//! adapter this crate only specifies the contract for.

use crate::action::{ActionKind, Params};
use crate::agent::stimulus::ActionOutcome;
use crate::dispatcher::DispatchScope;
use crate::error::{CoreError, ErrorKind};

pub async fn run(params: Params, scope: &DispatchScope) -> Result<ActionOutcome, CoreError> {
    match &scope.env.external_actions {
        Some(adapter) => adapter.call(ActionKind::GenerateImages, &params).await,
        None => Err(CoreError::new(ErrorKind::ServiceUnavailable)
            .with_context("no generate_images adapter configured")),
    }
}

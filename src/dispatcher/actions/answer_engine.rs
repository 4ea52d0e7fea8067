//! `answer_engine`: a hosted question-answering adapter,
//! out of scope for this crate. Delegates to the injected
//! [`crate::dispatcher::ExternalAction`].

use crate::action::{ActionKind, Params};
use crate::agent::stimulus::ActionOutcome;
use crate::dispatcher::DispatchScope;
use crate::error::{CoreError, ErrorKind};

pub async fn run(params: Params, scope: &DispatchScope) -> Result<ActionOutcome, CoreError> {
    match &scope.env.external_actions {
        Some(adapter) => adapter.call(ActionKind::AnswerEngine, &params).await,
        None => Err(CoreError::new(ErrorKind::ServiceUnavailable)
            .with_context("no answer_engine adapter configured")),
    }
}

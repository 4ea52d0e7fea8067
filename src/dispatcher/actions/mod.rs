//! Per-action-kind executors: each one sees only `(params, scope)`,
//! never the agent's mutable state directly.
//!
//! Every executor returns an [`ActionOutcome`] whose `metadata` carries
//! whatever the owning [`crate::agent::core::Agent`] needs to fold back
//! into its own [`crate::agent::state::AgentState`] (new todos, a freshly
//! allocated child id, an adjusted budget ceiling, …). No executor here
//! is ever handed a `&mut AgentState` — the agent persists before
//! dispatch and folds results after, so that single-writer boundary
//! never moves.
//!
//! One file per [`ActionKind`] variant, named for what it does.

mod adjust_budget;
mod answer_engine;
mod batch_async;
mod batch_sync;
mod call_api;
mod call_mcp;
mod create_skill;
mod dismiss_child;
mod execute_shell;
mod fetch_web;
mod file_read;
mod file_write;
mod generate_images;
mod generate_secret;
mod learn_skills;
mod orient;
mod record_cost;
mod search_secrets;
mod send_message;
mod spawn_child;
mod todo;
mod wait;

use futures_util::future::{BoxFuture, FutureExt};

use crate::action::{ActionKind, Params};
use crate::agent::stimulus::ActionOutcome;
use crate::error::{CoreError, ErrorKind};

use super::DispatchScope;

pub(crate) fn require_str<'a>(params: &'a Params, key: &str) -> Result<&'a str, CoreError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| CoreError::new(ErrorKind::MissingRequiredParam(key.to_string())))
}

pub(crate) fn require_f64(params: &Params, key: &str) -> Result<f64, CoreError> {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| CoreError::new(ErrorKind::MissingRequiredParam(key.to_string())))
}

pub(crate) fn optional_str<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

pub(crate) fn optional_f64(params: &Params, key: &str) -> Option<f64> {
    params.get(key).and_then(|v| v.as_f64())
}

/// Delegates `kind` to the matching executor. Called only by
/// [`super::Dispatcher::dispatch`], after the budget gate and secret
/// resolution have already run.
pub(crate) async fn dispatch_action(
    kind: ActionKind,
    params: Params,
    scope: &DispatchScope,
) -> Result<ActionOutcome, CoreError> {
    match kind {
        ActionKind::Orient => orient::run(params, scope).await,
        ActionKind::Wait => wait::run(params, scope).await,
        ActionKind::SendMessage => send_message::run(params, scope).await,
        ActionKind::BatchSync => batch_sync::run(params, scope).await,
        ActionKind::BatchAsync => batch_async::run(params, scope).await,
        ActionKind::FetchWeb => fetch_web::run(params, scope).await,
        ActionKind::FileRead => file_read::run(params, scope).await,
        ActionKind::SearchSecrets => search_secrets::run(params, scope).await,
        ActionKind::LearnSkills => learn_skills::run(params, scope).await,
        ActionKind::AnswerEngine => answer_engine::run(params, scope).await,
        ActionKind::Todo => todo::run(params, scope).await,
        ActionKind::AdjustBudget => adjust_budget::run(params, scope).await,
        ActionKind::GenerateSecret => generate_secret::run(params, scope).await,
        ActionKind::GenerateImages => generate_images::run(params, scope).await,
        ActionKind::RecordCost => record_cost::run(params, scope).await,
        ActionKind::CallMcp => call_mcp::run(params, scope).await,
        ActionKind::CallApi => call_api::run(params, scope).await,
        ActionKind::ExecuteShell => execute_shell::run(params, scope).await,
        ActionKind::FileWrite => file_write::run(params, scope).await,
        ActionKind::DismissChild => dismiss_child::run(params, scope).await,
        ActionKind::CreateSkill => create_skill::run(params, scope).await,
        ActionKind::SpawnChild => spawn_child::run(params, scope).await,
    }
}

/// Boxed entry point into [`dispatch_action`] for `batch_sync`/`batch_async`
/// to call back into, per spec §9's "a small interpreter over the
/// sub-action list, reusing the normal dispatch for each child." Plain
/// recursive `async fn` calls here would give `dispatch_action`'s state
/// machine infinite size (it matches out to `batch_sync::run`, which
/// calls back into `dispatch_action`); boxing the future at this one call
/// site breaks the cycle.
pub(crate) fn dispatch_action_boxed<'a>(
    kind: ActionKind,
    params: Params,
    scope: &'a DispatchScope,
) -> BoxFuture<'a, Result<ActionOutcome, CoreError>> {
    dispatch_action(kind, params, scope).boxed()
}

/// Parse one `batch_sync`/`batch_async` sub-action entry (a JSON object
/// shaped like a top-level decision's `{action, params}`, minus `wait` —
/// batched sub-actions are dispatched directly, not through another
/// consensus round) into `(ActionKind, Params)`.
pub(crate) fn parse_sub_action(value: &serde_json::Value) -> Result<(ActionKind, Params), CoreError> {
    let obj = value.as_object().ok_or_else(|| {
        CoreError::new(ErrorKind::InvalidParam("actions".to_string()))
            .with_context("each sub-action must be a map")
    })?;
    let kind_value = obj.get("action").cloned().ok_or_else(|| {
        CoreError::new(ErrorKind::InvalidParam("actions".to_string()))
            .with_context("sub-action missing `action`")
    })?;
    let kind: ActionKind = serde_json::from_value(kind_value).map_err(|_| {
        CoreError::new(ErrorKind::InvalidParam("actions".to_string()))
            .with_context("sub-action has an unrecognized `action` kind")
    })?;
    let params: Params = obj
        .get("params")
        .and_then(|p| p.as_object())
        .map(|m| m.clone().into_iter().collect())
        .unwrap_or_default();
    Ok((kind, params))
}

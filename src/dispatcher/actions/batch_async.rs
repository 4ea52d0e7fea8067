//! `batch_async`: spec §4.3 "a list of ≥ 2 batchable sub-actions dispatched
//! concurrently in one consensus step; failures are independent, so one
//! sub-action erroring does not stop the rest."
//!
//! Same grounding as [`super::batch_sync`] (spec §9's "small interpreter
//! over the sub-action list, reusing the normal dispatch for each child"),
//! but fans out with [`futures_util::future::join_all`] instead of a
//! sequential loop, since there is no stop-on-first-error contract to
//! respect here.

use std::collections::HashMap;

use futures_util::future::join_all;
use serde_json::Value;

use crate::action::Params;
use crate::agent::stimulus::ActionOutcome;
use crate::dispatcher::actions::parse_sub_action;
use crate::dispatcher::{ok_with_metadata, DispatchScope};
use crate::error::{CoreError, ErrorKind};

pub async fn run(params: Params, scope: &DispatchScope) -> Result<ActionOutcome, CoreError> {
    let actions = params
        .get("actions")
        .and_then(|v| v.as_array())
        .ok_or_else(|| CoreError::new(ErrorKind::MissingRequiredParam("actions".to_string())))?;
    if actions.len() < 2 {
        return Err(CoreError::new(ErrorKind::InvalidParam("actions".to_string()))
            .with_context("batch_async requires at least 2 sub-actions"));
    }

    let parsed: Vec<_> = actions.iter().map(|raw| parse_sub_action(raw)).collect::<Result<_, _>>()?;
    for (kind, _) in &parsed {
        if !kind.is_batchable() {
            return Err(CoreError::new(ErrorKind::InvalidParam("actions".to_string()))
                .with_context(format!("{kind:?} is not a batchable action kind")));
        }
    }

    let calls = parsed.into_iter().map(|(kind, sub_params)| {
        let scope = scope;
        async move {
            match super::dispatch_action_boxed(kind, sub_params, scope).await {
                Ok(outcome) => serde_json::json!({
                    "action": kind,
                    "success": outcome.success,
                    "content": outcome.content,
                }),
                Err(err) => serde_json::json!({
                    "action": kind,
                    "success": false,
                    "error": err.to_string(),
                }),
            }
        }
    });
    let results: Vec<Value> = join_all(calls).await;

    let mut metadata = HashMap::new();
    metadata.insert("results".to_string(), Value::Array(results));
    Ok(ok_with_metadata(format!("batch_async submitted and ran {} sub-action(s) concurrently", actions.len()), metadata))
}

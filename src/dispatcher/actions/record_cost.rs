//! `record_cost`: self-contained, but "free" rather than
//! classified by [`crate::action::is_costly`] — it is how an agent
//! reports spend that already happened (a model call, a metered
//! executor) rather than a request to spend more. Appends a
//! [`crate::persistence::CostRecord`] and broadcasts on both the
//! agent- and task-scoped cost topics.

use std::collections::HashMap;

use crate::action::Params;
use crate::agent::stimulus::ActionOutcome;
use crate::dispatcher::actions::{require_f64, require_str};
use crate::dispatcher::{ok_with_metadata, DispatchScope};
use crate::error::CoreError;
use crate::event::{agent_costs_topic, task_costs_topic, BusEvent};
use crate::persistence::CostRecord;

pub async fn run(params: Params, scope: &DispatchScope) -> Result<ActionOutcome, CoreError> {
    let amount = require_f64(&params, "amount")?;
    let cost_type = require_str(&params, "cost_type")?.to_string();
    let metadata = params
        .get("metadata")
        .and_then(|v| v.as_object())
        .map(|o| o.clone().into_iter().collect())
        .unwrap_or_default();

    let at = chrono::Utc::now();
    scope
        .env
        .store
        .append_cost(CostRecord {
            agent_id: scope.agent_id.clone(),
            task_id: scope.task_id.clone(),
            cost_type,
            amount,
            metadata,
            at,
        })
        .await?;

    scope.env.event_bus.broadcast(
        agent_costs_topic(&scope.agent_id),
        BusEvent::CostRecorded {
            agent_id: scope.agent_id.clone(),
            amount,
            at,
        },
    );
    scope.env.event_bus.broadcast(
        task_costs_topic(&scope.task_id),
        BusEvent::CostRecorded {
            agent_id: scope.agent_id.clone(),
            amount,
            at,
        },
    );

    let mut out_metadata = HashMap::new();
    out_metadata.insert("amount".to_string(), serde_json::json!(amount));
    Ok(ok_with_metadata(format!("recorded cost of {amount}"), out_metadata))
}

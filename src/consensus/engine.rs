//! The consensus engine: N concurrent model proposals → one [`Decision`]
//! (spec §4.2).
//!
//! One round fans out to every model in `state.models` concurrently
//! (grounded on the teacher's `Agent::fork()`-based parallel dispatch
//! idiom, generalized from "clone an agent to run independently" to
//! "call N models independently and reconcile"), parses each reply,
//! majority-votes the action kind with a priority tiebreak, and merges
//! every declared parameter with its schema rule. A parameter
//! disagreement triggers a "please reconcile" refinement round, up to
//! `max_refinement_rounds`; exhausting that budget is a terminal
//! consensus failure (spec §4.2 "Result handling").

use std::collections::HashMap;

use futures_util::future::join_all;
use serde_json::Value;
use tracing::warn;

use crate::action::{ActionKind, Decision, Params, WaitValue};
use crate::agent::prompt::build_messages_for_model;
use crate::agent::state::AgentState;
use crate::config::Environment;
use crate::consensus::rules::{merge, MergeOutcome};
use crate::consensus::schema::schema_for;
use crate::consensus::temperature::temperature_for_round;
use crate::error::{CoreError, ErrorKind};
use crate::model::{CompletionRequest, Message, Role, SamplingOpts};

struct Proposal {
    action: ActionKind,
    params: Params,
    wait_raw: Value,
}

fn parse_reply(content: &str) -> Option<(ActionKind, Params, Value)> {
    let value: Value = serde_json::from_str(content).ok()?;
    let action_value = value.get("action")?.clone();
    let action: ActionKind = serde_json::from_value(action_value).ok()?;
    let params: Params = value
        .get("params")
        .and_then(|p| p.as_object())
        .map(|o| o.clone().into_iter().collect())
        .unwrap_or_default();
    let wait_raw = value.get("wait").cloned().unwrap_or(Value::Bool(false));
    Some((action, params, wait_raw))
}

/// Majority vote over proposed action kinds; ties broken by the declared
/// priority table, lower (more conservative) wins (spec §4.2).
fn merge_action_kind(proposals: &[Proposal]) -> Option<ActionKind> {
    if proposals.is_empty() {
        return None;
    }
    let mut counts: HashMap<ActionKind, usize> = HashMap::new();
    for p in proposals {
        *counts.entry(p.action).or_insert(0) += 1;
    }
    let max_count = *counts.values().max().unwrap();
    counts
        .into_iter()
        .filter(|(_, c)| *c == max_count)
        .map(|(kind, _)| kind)
        .min_by_key(|kind| kind.priority())
}

fn coerce_bool_ish(value: &Value) -> Value {
    match value.as_str() {
        Some("true") => Value::Bool(true),
        Some("false") => Value::Bool(false),
        _ => value.clone(),
    }
}

/// Spec §4.2 "Wait parameter normalization" (i)-(iii).
fn normalize_wait(kind: ActionKind, params: &Params, merged_wait_raw: Value) -> WaitValue {
    let raw = if kind == ActionKind::Wait {
        params.get("wait").cloned().unwrap_or(merged_wait_raw)
    } else {
        merged_wait_raw
    };
    let raw = coerce_bool_ish(&raw);

    let normalized = match raw {
        Value::Bool(true) => WaitValue::Indefinite,
        Value::Bool(false) => WaitValue::Immediate,
        Value::Number(n) => match n.as_u64() {
            Some(0) => WaitValue::Immediate,
            Some(secs) => WaitValue::Seconds(secs),
            None => WaitValue::Immediate,
        },
        _ => WaitValue::Immediate,
    };

    if kind.is_self_contained() && !matches!(normalized, WaitValue::Immediate) {
        warn!(?kind, "self-contained action proposed wait=true; auto-corrected to false");
        return WaitValue::Immediate;
    }
    normalized
}

pub struct ConsensusEngine;

impl ConsensusEngine {
    /// Run the full consensus process for `state` against `env`,
    /// including any refinement rounds, mutating `state`'s conversation
    /// histories with "please reconcile" directives as rounds fail to
    /// agree. On success returns the merged [`Decision`]; on exhausting
    /// `max_refinement_rounds` returns a terminal [`CoreError`].
    pub async fn run_round(state: &mut AgentState, env: &Environment, spent: f64) -> Result<Decision, CoreError> {
        let profile = env.config.profile(&state.profile).clone();
        let max_rounds = profile.max_refinement_rounds as usize;

        for round in 0..=max_rounds {
            let temperature = temperature_for_round(&profile, round, max_rounds);
            let proposals = Self::fan_out(state, env, temperature, spent).await;

            if proposals.is_empty() {
                Self::append_reconcile(state, "no model returned a parseable proposal this round");
                continue;
            }

            let Some(winning_kind) = merge_action_kind(&proposals) else {
                Self::append_reconcile(state, "no majority action kind could be determined");
                continue;
            };

            let matching: Vec<&Proposal> = proposals.iter().filter(|p| p.action == winning_kind).collect();
            let schema = schema_for(winning_kind);

            let mut merged_params = Params::new();
            let mut disagreements: Vec<String> = Vec::new();

            for name in schema.all_param_names() {
                let values: Vec<Value> = matching
                    .iter()
                    .filter_map(|p| p.params.get(name).cloned())
                    .collect();
                if values.is_empty() {
                    if schema.required_params.contains(&name) {
                        disagreements.push(format!("{name} (missing from every proposal)"));
                    }
                    continue;
                }
                let rule = *schema
                    .consensus_rules
                    .get(name)
                    .expect("validate_registry guarantees every param has a rule");
                match merge(rule, &values) {
                    MergeOutcome::Agreed(v) => {
                        merged_params.insert(name.to_string(), v);
                    }
                    MergeOutcome::Disagreement => {
                        disagreements.push(name.to_string());
                    }
                }
            }

            if !disagreements.is_empty() {
                Self::append_reconcile(
                    state,
                    &format!("disagreement on parameter(s): {}", disagreements.join(", ")),
                );
                continue;
            }

            let wait_values: Vec<Value> = matching.iter().map(|p| p.wait_raw.clone()).collect();
            let merged_wait_raw = match merge(crate::consensus::schema::ConsensusRule::ModeSelection, &wait_values) {
                MergeOutcome::Agreed(v) => v,
                MergeOutcome::Disagreement => Value::Bool(false),
            };
            let wait = normalize_wait(winning_kind, &merged_params, merged_wait_raw);

            return Ok(Decision {
                action: winning_kind,
                params: merged_params,
                wait,
            });
        }

        Err(CoreError::new(ErrorKind::ParseFailed)
            .with_context("consensus failed to reach agreement within max_refinement_rounds"))
    }

    /// Fan out to every model and parse each reply into a [`Proposal`].
    /// Spec §4.2 "Failed parses, provider errors in the authentication/
    /// forbidden class, and over-budget actions are filtered out" — the
    /// first two are filtered inline as each call resolves; over-budget
    /// proposals are dropped from the ballot via the same
    /// [`crate::budget::enforcer::check_action`] gate the dispatcher uses
    /// before actually running an executor, so a model that proposes a
    /// costly action the agent can no longer afford never gets counted.
    async fn fan_out(state: &AgentState, env: &Environment, temperature: f32, spent: f64) -> Vec<Proposal> {
        let calls = state.models.iter().map(|model_id| {
            let state = state;
            let env = env;
            let model_id = model_id.clone();
            let temperature = temperature;
            async move {
                let provider = env.model(&model_id)?;
                let messages = build_messages_for_model(state, &model_id, 0.0);
                if messages.is_empty() {
                    return None;
                }
                let request = CompletionRequest {
                    model_id: model_id.clone(),
                    messages,
                    sampling: SamplingOpts { temperature, max_tokens: None },
                };
                match provider.complete(request).await {
                    Ok(response) => {
                        let (action, params, wait_raw) = parse_reply(&response.content)?;
                        if crate::budget::enforcer::check_action(action, &params, &state.budget_data, spent)
                            == crate::budget::enforcer::EnforcementDecision::BlockedOverBudget
                        {
                            return None;
                        }
                        Some(Proposal { action, params, wait_raw })
                    }
                    Err(e) if e.kind.is_fatal_auth() => None,
                    Err(_) => None,
                }
            }
        });
        join_all(calls).await.into_iter().flatten().collect()
    }

    fn append_reconcile(state: &mut AgentState, reason: &str) {
        let directive = format!("please reconcile: {reason}. Re-propose your action.");
        let models: Vec<String> = state.models.clone();
        for model_id in models {
            state
                .conversation_histories
                .entry(model_id)
                .or_default()
                .push(Message::text(Role::User, directive.clone()));
        }
    }
}

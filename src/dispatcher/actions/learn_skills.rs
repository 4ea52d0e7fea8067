//! `learn_skills`: self-contained. Dispatching never writes
//! directly to [`crate::agent::state::AgentState`] (single-writer
//! boundary) — the lesson text is handed back in
//! `metadata` for the owning [`crate::agent::core::Agent`] to fold into
//! its own `downstream_constraints`, the same field
//! [`crate::agent::prompt::render_lessons`] reads from.

use std::collections::HashMap;

use crate::action::Params;
use crate::agent::stimulus::ActionOutcome;
use crate::dispatcher::actions::require_str;
use crate::dispatcher::{ok_with_metadata, DispatchScope};
use crate::error::CoreError;

pub async fn run(params: Params, _scope: &DispatchScope) -> Result<ActionOutcome, CoreError> {
    let lesson = require_str(&params, "lesson")?;
    let mut metadata = HashMap::new();
    metadata.insert("lesson".to_string(), serde_json::json!(lesson));
    Ok(ok_with_metadata(format!("learned: {lesson}"), metadata))
}

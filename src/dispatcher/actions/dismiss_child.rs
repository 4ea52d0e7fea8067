//! `dismiss_child`: costly-by-consequence
//! but cheap to run — sends [`crate::agent::stimulus::Stimulus::Terminate`]
//! to the named child and every descendant beneath it (looked up through
//! the registry, never by direct ownership pointer — parent/child
//! references are id-based everywhere). Escrow release
//! happens on the *parent's* side when each dismissed agent's own
//! `Terminate` handling sends back `ChildTerminated` — this executor
//! never touches `committed` itself.

use crate::action::Params;
use crate::agent::stimulus::{ActionOutcome, Stimulus};
use crate::dispatcher::actions::require_str;
use crate::dispatcher::{ok, DispatchScope};
use crate::error::{CoreError, ErrorKind};

/// Breadth-first collect `child_id` and every descendant beneath it.
fn collect_subtree(scope: &DispatchScope, root: &str) -> Vec<String> {
    let mut subtree = vec![root.to_string()];
    let mut frontier = vec![root.to_string()];
    while let Some(next) = frontier.pop() {
        for grandchild in scope.env.registry.children_of(&next) {
            subtree.push(grandchild.clone());
            frontier.push(grandchild);
        }
    }
    subtree
}

pub async fn run(params: Params, scope: &DispatchScope) -> Result<ActionOutcome, CoreError> {
    let child_id = require_str(&params, "child_id")?;

    let entry = scope
        .env
        .registry
        .get(child_id)
        .ok_or_else(|| CoreError::new(ErrorKind::NotFound).with_context(format!("no live agent {child_id}")))?;
    if entry.parent_id.as_deref() != Some(scope.agent_id.as_str()) {
        return Err(
            CoreError::new(ErrorKind::InvalidParam("child_id".to_string())).with_context("not a direct child")
        );
    }

    let subtree = collect_subtree(scope, child_id);
    let mut dismissed = 0usize;
    for agent_id in &subtree {
        if let Some(mailbox) = scope.env.registry.mailbox(agent_id) {
            let _ = mailbox
                .send(Stimulus::Terminate {
                    reason: "dismissed by parent".to_string(),
                })
                .await;
            dismissed += 1;
        }
    }

    Ok(ok(format!(
        "dismissed subtree rooted at {child_id} ({dismissed} agent(s))"
    )))
}

//! The closed set of stimuli an agent's mailbox accepts (spec §4.1).
//!
//! Stimuli are handled strictly one at a time, in arrival order (spec
//! §5 "stimuli are processed strictly in arrival order; there is no
//! intra-agent concurrency") — this is why [`Stimulus`] is sent through
//! a bounded `mpsc` channel rather than dispatched by direct method call:
//! the channel is what gives the agent its single-writer mailbox.

use crate::action::Params;
use crate::agent::state::TimerRef;
use std::collections::HashMap;

/// A finished executor result, folded back into history by
/// [`crate::agent::core::Agent::handle_action_result`].
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub success: bool,
    pub content: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub enum Stimulus {
    /// A user/parent/sibling message arrives (spec §4.1 first bullet).
    UserMessage { content: String },
    /// An executor reports a result for a pending action.
    ActionResult {
        action_id: String,
        result: ActionOutcome,
        /// `true` when this is a first-result acknowledgement of an
        /// async action (spec §4.3 step 4), not its terminal result.
        is_ack: bool,
    },
    /// A wait timer fired. Must be checked against the currently armed
    /// timer ref (invariant I-A2) before having any effect.
    WaitExpired { timer_ref: TimerRef },
    /// A child agent terminated; its escrowed allocation is released.
    ChildTerminated {
        child_id: String,
        reason: String,
        original_allocation: f64,
    },
    /// A cost row was appended for this agent; `over_budget` must be
    /// recomputed.
    CostRecorded { amount: f64 },
    /// A parent's `adjust_budget` action changed this agent's allocation
    /// (spec §4.3 adjust_budget). Only the owning agent may apply it,
    /// hence delivery through the mailbox rather than a direct mutation.
    BudgetAdjusted { new_allocated: f64 },
    /// Lifecycle control: persist state, cancel timers, stop cleanly.
    Pause,
    Terminate { reason: String },
}

/// A proposed action awaiting dispatch, as handed from consensus to the
/// dispatcher. Kept here (not in [`crate::action`]) because it pairs a
/// decision with the pending-action bookkeeping the agent core owns.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub action_id: String,
    pub kind: crate::action::ActionKind,
    pub params: Params,
    pub wait: crate::action::WaitValue,
}

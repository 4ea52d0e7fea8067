//! The action-kind vocabulary shared by consensus, the dispatcher, and the
//! budget enforcer. Dynamic dispatch on action kind maps naturally to a
//! tagged variant (sum type) over `ActionKind` rather than a string tag
//! re-parsed at every call site.
//!
//! Every subsystem that cares about "which action is this" imports
//! [`ActionKind`] from here rather than re-deriving it, so the priority
//! table (used to break consensus ties) has exactly one definition.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The 22 action kinds an agent can propose, ordered here in their
/// declared priority tiebreak order (lower = more conservative, used to
/// break a consensus vote tie on the action kind itself: majority vote,
/// ties broken by this priority table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Orient,
    Wait,
    SendMessage,
    BatchSync,
    BatchAsync,
    FetchWeb,
    FileRead,
    SearchSecrets,
    LearnSkills,
    AnswerEngine,
    Todo,
    AdjustBudget,
    GenerateSecret,
    GenerateImages,
    RecordCost,
    CallMcp,
    CallApi,
    ExecuteShell,
    FileWrite,
    DismissChild,
    CreateSkill,
    SpawnChild,
}

impl ActionKind {
    /// The full priority table, 1 (most conservative) through 22. Used to
    /// break ties in `mode_selection` merges and in the action-kind
    /// majority vote itself.
    pub fn priority(self) -> u8 {
        use ActionKind::*;
        match self {
            Orient => 1,
            Wait => 2,
            SendMessage => 3,
            BatchSync => 4,
            BatchAsync => 5,
            FetchWeb => 6,
            FileRead => 7,
            SearchSecrets => 8,
            LearnSkills => 9,
            AnswerEngine => 10,
            Todo => 11,
            AdjustBudget => 12,
            GenerateSecret => 13,
            GenerateImages => 14,
            RecordCost => 15,
            CallMcp => 16,
            CallApi => 17,
            ExecuteShell => 18,
            FileWrite => 19,
            DismissChild => 20,
            CreateSkill => 21,
            SpawnChild => 22,
        }
    }

    /// Action kinds that complete without any external responder; a
    /// proposed `wait = true` on one of these is auto-corrected to
    /// `false`.
    pub fn is_self_contained(self) -> bool {
        use ActionKind::*;
        matches!(
            self,
            Orient
                | Todo
                | FileRead
                | FileWrite
                | AdjustBudget
                | GenerateSecret
                | SearchSecrets
                | LearnSkills
                | CreateSkill
                | BatchSync
        )
    }

    /// Kinds classified `costly` by the dispatcher.
    /// `ExecuteShell` is costly only when it starts a new command — that
    /// refinement needs `params`, so it is handled separately by
    /// [`is_costly`].
    fn always_costly(self) -> bool {
        use ActionKind::*;
        matches!(
            self,
            SpawnChild | CallApi | CallMcp | FetchWeb | AnswerEngine | GenerateImages
        )
    }

    /// Excluded from both batch kinds (spec §4.3 "wait, batch_sync,
    /// batch_async are excluded"): `wait` has no synchronous result to
    /// report back into a batch's result list, and nesting either batch
    /// kind inside itself would make "stop on first error"/"independent
    /// failures" ill-defined.
    pub fn is_batchable(self) -> bool {
        !matches!(self, ActionKind::Wait | ActionKind::BatchSync | ActionKind::BatchAsync)
    }

    /// Excluded from `batch_sync` specifically, beyond [`is_batchable`]:
    /// spec §4.3 names "async-heavy kinds" as additionally excluded there,
    /// because `batch_sync`'s sequential stop-on-first-error contract
    /// needs each sub-action's real result inline, and `execute_shell`'s
    /// long-running mode (§4.3 Synchronicity: "Shell may be async") can't
    /// give that synchronously.
    pub fn is_sync_batchable(self) -> bool {
        self.is_batchable() && self != ActionKind::ExecuteShell
    }
}

/// Action parameters as a JSON object.
pub type Params = HashMap<String, serde_json::Value>;

/// Classify `(kind, params)` as costly/free.
/// `execute_shell` is costly only when it starts a new command, i.e. params
/// carries neither `check_id` nor `terminate`.
pub fn is_costly(kind: ActionKind, params: &Params) -> bool {
    if kind == ActionKind::ExecuteShell {
        return !(params.contains_key("check_id") || params.contains_key("terminate"));
    }
    kind.always_costly()
}

/// Normalized `wait` value attached to a consensus decision.
///
/// Externally tagged (the derive default) rather than `#[serde(untagged)]`:
/// `Indefinite` and `Immediate` are both unit variants and an untagged
/// encoding collapses both to JSON `null`, so a persisted `Immediate`
/// would deserialize back as `Indefinite` across a pause/resume
/// round-trip. Tagging keeps them distinct on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitValue {
    Indefinite,
    Immediate,
    Seconds(u64),
}

/// One executable decision produced by the consensus engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub action: ActionKind,
    pub params: Params,
    pub wait: WaitValue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_table_is_total_order_1_through_22() {
        let mut priorities: Vec<u8> = ActionKind_ALL.iter().map(|k| k.priority()).collect();
        priorities.sort_unstable();
        assert_eq!(priorities, (1u8..=22).collect::<Vec<_>>());
    }

    #[test]
    fn shell_costly_only_when_starting_new_command() {
        let mut params = Params::new();
        assert!(is_costly(ActionKind::ExecuteShell, &params));
        params.insert("check_id".into(), serde_json::json!("abc"));
        assert!(!is_costly(ActionKind::ExecuteShell, &params));
    }

    #[test]
    fn wait_value_roundtrip_keeps_immediate_and_indefinite_distinct() {
        for value in [WaitValue::Indefinite, WaitValue::Immediate, WaitValue::Seconds(30)] {
            let encoded = serde_json::to_string(&value).unwrap();
            let decoded: WaitValue = serde_json::from_str(&encoded).unwrap();
            assert_eq!(decoded, value);
        }
        assert_ne!(
            serde_json::to_string(&WaitValue::Immediate).unwrap(),
            serde_json::to_string(&WaitValue::Indefinite).unwrap()
        );
    }

    #[allow(non_upper_case_globals)]
    const ActionKind_ALL: [ActionKind; 22] = [
        ActionKind::Orient,
        ActionKind::Wait,
        ActionKind::SendMessage,
        ActionKind::BatchSync,
        ActionKind::BatchAsync,
        ActionKind::FetchWeb,
        ActionKind::FileRead,
        ActionKind::SearchSecrets,
        ActionKind::LearnSkills,
        ActionKind::AnswerEngine,
        ActionKind::Todo,
        ActionKind::AdjustBudget,
        ActionKind::GenerateSecret,
        ActionKind::GenerateImages,
        ActionKind::RecordCost,
        ActionKind::CallMcp,
        ActionKind::CallApi,
        ActionKind::ExecuteShell,
        ActionKind::FileWrite,
        ActionKind::DismissChild,
        ActionKind::CreateSkill,
        ActionKind::SpawnChild,
    ];
}

//! Context envelope injection (spec §4.2 "build a prompt from the
//! agent's conversation history for m, injecting four context envelopes
//! into specified positions").
//!
//! `<todos>`, `<children>`, and `<budget>` are prepended to the *last*
//! user message of the per-model history; `<lessons>` and `<state>` are
//! prepended to the *first*. Envelopes never mutate the agent's
//! persisted history — they are injected into a throwaway copy built
//! fresh for each model call, exactly the way the teacher's
//! `augment_system_prompt` layers a run-time prefix onto a stored
//! system prompt without rewriting it.

use crate::agent::state::{AgentState, TodoState};
use crate::budget::tracker::Tracker;
use crate::model::{ContentPart, Message, Role};

fn render_todos(state: &AgentState) -> String {
    if state.todos.is_empty() {
        return "<todos>(none)</todos>".to_string();
    }
    let lines: Vec<String> = state
        .todos
        .iter()
        .map(|t| {
            let marker = match t.state {
                TodoState::Todo => "[ ]",
                TodoState::Pending => "[~]",
                TodoState::Done => "[x]",
            };
            format!("{marker} {}", t.content)
        })
        .collect();
    format!("<todos>\n{}\n</todos>", lines.join("\n"))
}

fn render_children(state: &AgentState) -> String {
    if state.children.is_empty() {
        return "<children>(none)</children>".to_string();
    }
    let mut ids: Vec<&String> = state.children.iter().collect();
    ids.sort();
    format!(
        "<children>{}</children>",
        ids.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
    )
}

/// Summarizes budget headroom the way a consensus-round model needs to
/// see it, without leaking raw `BudgetData` internals into the prompt.
fn render_budget(state: &AgentState, spent: f64) -> String {
    let status = Tracker::get_status(&state.budget_data, spent);
    let available = Tracker::calculate_available(&state.budget_data, spent);
    match available {
        Some(a) => format!("<budget>status={status:?} available={a:.2} committed={:.2}</budget>", state.budget_data.committed),
        None => "<budget>status=na (unlimited)</budget>".to_string(),
    }
}

/// Ancestor-accumulated constraints stand in for "lessons learned"; the
/// spec names no dedicated lessons field, so this reuses
/// `downstream_constraints` (spec §4.3 spawn_child).
fn render_lessons(state: &AgentState) -> String {
    if state.downstream_constraints.is_empty() {
        return "<lessons>(none)</lessons>".to_string();
    }
    format!("<lessons>\n{}\n</lessons>", state.downstream_constraints.join("\n"))
}

fn render_agent_state(state: &AgentState) -> String {
    format!(
        "<state>agent_id={} task_id={} profile={} parent={}</state>",
        state.agent_id,
        state.task_id,
        state.profile,
        state.parent_id.as_deref().unwrap_or("none")
    )
}

fn prepend_text(message: &Message, envelope: String) -> Message {
    let mut content = vec![ContentPart::Text { text: envelope }];
    content.extend(message.content.clone());
    Message {
        role: message.role,
        content,
        timestamp: message.timestamp,
    }
}

/// Build the actual message list sent to `model_id`, injecting all four
/// envelopes into fresh copies of the stored history's first/last user
/// turns. Returns the stored history unchanged if it holds no user
/// message yet (nothing to inject into).
pub fn build_messages_for_model(state: &AgentState, model_id: &str, spent: f64) -> Vec<Message> {
    let history = match state.conversation_histories.get(model_id) {
        Some(h) => h,
        None => return Vec::new(),
    };

    let first_user_idx = history.iter().position(|m| m.role == Role::User);
    let last_user_idx = history.iter().rposition(|m| m.role == Role::User);

    let mut out = Vec::with_capacity(history.len());
    for (i, message) in history.iter().enumerate() {
        let mut m = message.clone();
        if Some(i) == last_user_idx {
            m = prepend_text(&m, render_budget(state, spent));
            m = prepend_text(&m, render_children(state));
            m = prepend_text(&m, render_todos(state));
        }
        if Some(i) == first_user_idx {
            m = prepend_text(&m, render_agent_state(state));
            m = prepend_text(&m, render_lessons(state));
        }
        out.push(m);
    }
    out
}

/// Approximate token count for a string (spec §9 supplement: token
/// accounting on conversation histories is a separate axis from the
/// dollar budget `budget` tracks). Grounded on the teacher's
/// `count_tokens` in `llm_session.rs`: one token per four characters,
/// which is accurate enough to bound history growth without pulling in
/// a real tokenizer dependency.
pub fn estimate_tokens(text: &str) -> usize {
    (text.len() / 4).max(1)
}

/// Mirrors the teacher's `count_message_tokens`: content tokens plus one
/// fixed token for the role annotation.
fn estimate_message_tokens(message: &Message) -> usize {
    1 + estimate_tokens(&message.text_content())
}

/// Oldest-first trim to keep a per-model conversation history within
/// `max_tokens`, the same policy as the teacher's
/// `LLMSession::trim_conversation_history`. Called after every append to
/// `state.conversation_histories` so a history never silently grows
/// across an agent's whole lifetime.
pub fn truncate_history(history: &mut Vec<Message>, max_tokens: usize) {
    let mut total: usize = history.iter().map(estimate_message_tokens).sum();
    while total > max_tokens && history.len() > 1 {
        let removed = history.remove(0);
        total -= estimate_message_tokens(&removed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::schema::BudgetData;
    use std::collections::{HashMap, HashSet};

    fn state_with_history(messages: Vec<Message>) -> AgentState {
        let mut state = AgentState::new_root(
            "a1",
            "t1",
            vec!["gpt".to_string()],
            HashSet::new(),
            "default",
            BudgetData::new_root(100.0),
        );
        state.conversation_histories.insert("gpt".to_string(), messages);
        state
    }

    #[test]
    fn single_user_message_gets_all_four_envelopes() {
        let state = state_with_history(vec![Message::text(Role::User, "hello")]);
        let built = build_messages_for_model(&state, "gpt", 0.0);
        assert_eq!(built.len(), 1);
        assert_eq!(built[0].content.len(), 5); // 4 envelopes + original text
    }

    #[test]
    fn envelopes_split_across_first_and_last_when_distinct() {
        let state = state_with_history(vec![
            Message::text(Role::User, "first"),
            Message::text(Role::Assistant, "reply"),
            Message::text(Role::User, "last"),
        ]);
        let built = build_messages_for_model(&state, "gpt", 0.0);
        assert_eq!(built[0].content.len(), 3); // lessons + state + original
        assert_eq!(built[1].content.len(), 1); // assistant turn untouched
        assert_eq!(built[2].content.len(), 4); // todos + children + budget + original
    }

    #[test]
    fn missing_model_history_returns_empty() {
        let state = state_with_history(vec![Message::text(Role::User, "hello")]);
        assert!(build_messages_for_model(&state, "unknown-model", 0.0).is_empty());
    }

    #[test]
    fn truncate_history_drops_oldest_messages_first() {
        let mut history = vec![
            Message::text(Role::User, "a".repeat(40)),
            Message::text(Role::Assistant, "b".repeat(40)),
            Message::text(Role::User, "c".repeat(40)),
        ];
        truncate_history(&mut history, 15);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text_content(), "c".repeat(40));
    }

    #[test]
    fn truncate_history_always_keeps_at_least_one_message() {
        let mut history = vec![Message::text(Role::User, "a".repeat(400))];
        truncate_history(&mut history, 1);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn truncate_history_is_a_no_op_within_budget() {
        let mut history = vec![Message::text(Role::User, "hi")];
        truncate_history(&mut history, 10_000);
        assert_eq!(history.len(), 1);
    }
}

//! The per-agent state machine (spec §4.1) and everything that builds
//! toward a consensus round: persisted [`state`], mailbox [`stimulus`]
//! handling in [`core`], and per-model prompt assembly in [`prompt`].
//!
//! Grounded on the teacher's `Agent` (`agent.rs`) for the builder-style
//! construction and `fork()`-for-fan-out idiom, generalized from a
//! single conversational agent into the tree-structured, budget-aware,
//! mailbox-driven process spec §4.1 and §5 describe.

pub mod core;
pub mod prompt;
pub mod state;
pub mod stimulus;

pub use core::Agent;
pub use state::AgentState;
pub use stimulus::Stimulus;

//! Runtime configuration and the injected "environment" (spec §9
//! "Injected collaborators … should form a single immutable environment
//! struct threaded to each agent and executor at creation").
//!
//! The teacher's own [`crate::agent`]'s ancestor, `cloudllm::config`, is
//! a 64-line `CloudLLMConfig { thought_chain_dir: PathBuf }` with an
//! explicit doc comment: "No TOML, YAML, or other config-file parsing
//! dependencies are introduced." This module keeps that stance —
//! `RuntimeConfig` is a plain struct with `Default`, constructed in code
//! or from environment variables by the embedding application, never
//! from a config file format this crate would need a parser for.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::dispatcher::{ExternalAction, Scrubber, SecretResolver};
use crate::event::EventBus;
use crate::model::ModelProvider;
use crate::persistence::Store;
use crate::registry::AgentRegistry;

/// Per-profile overrides of the otherwise-global defaults (spec §4.2
/// "`max_refinement_rounds` (per-profile, 0–9, default 4)").
#[derive(Debug, Clone)]
pub struct ProfileConfig {
    pub max_refinement_rounds: u8,
    /// The temperature descent schedule's start and floor (spec §9 Open
    /// Question 1: "a function from `K` to a non-increasing sequence,
    /// leaving the specific curve configurable" — this crate's concrete
    /// choice, documented in DESIGN.md).
    pub temperature_start: f32,
    pub temperature_floor: f32,
    /// Per-model conversation history budget, an independent axis from
    /// the dollar budget `budget` tracks (spec §9 supplement, grounded on
    /// the teacher's `LLMSession::max_tokens`). Enforced by
    /// [`crate::agent::prompt::truncate_history`].
    pub max_history_tokens: usize,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            max_refinement_rounds: 4,
            temperature_start: 0.9,
            temperature_floor: 0.2,
            max_history_tokens: 8_000,
        }
    }
}

/// Ambient knobs that do not belong to any one subsystem. Constructed
/// once at process start and shared read-only thereafter.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub default_profile: ProfileConfig,
    pub profiles: HashMap<String, ProfileConfig>,
    /// Default per-action executor timeout (spec §5 "dispatch opts carry
    /// a per-action timeout, default 30 s for I/O-heavy kinds").
    pub default_action_timeout: Duration,
    /// Similarity threshold used when an action's schema does not pin
    /// its own τ for a `semantic_similarity` parameter.
    pub default_similarity_threshold: f32,
    /// Where `create_skill` writes learned-skill files (spec §6.1).
    pub skills_dir: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_profile: ProfileConfig::default(),
            profiles: HashMap::new(),
            default_action_timeout: Duration::from_secs(30),
            default_similarity_threshold: 0.85,
            skills_dir: PathBuf::from("./skills"),
        }
    }
}

impl RuntimeConfig {
    pub fn profile(&self, name: &str) -> &ProfileConfig {
        self.profiles.get(name).unwrap_or(&self.default_profile)
    }
}

/// The single immutable bag of collaborators threaded to every agent and
/// executor at construction time (spec §5 "No process-global state").
/// Nothing in this crate looks any of these up by a global name; they
/// only ever arrive as an `Arc<Environment>` passed into a constructor.
pub struct Environment {
    pub event_bus: Arc<EventBus>,
    pub store: Arc<dyn Store>,
    pub registry: Arc<AgentRegistry>,
    /// `model_id → provider`, the set of models an agent can address.
    pub models: HashMap<String, Arc<dyn ModelProvider>>,
    pub secret_resolver: Arc<dyn SecretResolver>,
    pub scrubber: Arc<dyn Scrubber>,
    /// The single injected interface for adapters this crate specifies
    /// only the contract of (spec §1): fetch_web, call_api, call_mcp,
    /// answer_engine, generate_images, and execute_shell. `None` means
    /// the embedding application has not wired one in yet — those action
    /// kinds then fail `service_unavailable` instead of silently no-opping.
    pub external_actions: Option<Arc<dyn ExternalAction>>,
    pub config: RuntimeConfig,
}

impl Environment {
    pub fn model(&self, model_id: &str) -> Option<Arc<dyn ModelProvider>> {
        self.models.get(model_id).cloned()
    }
}

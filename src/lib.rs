//! A recursive multi-LLM agent orchestrator.
//!
//! This crate implements the agent runtime for a supervised tree of
//! concurrent agent processes: each agent iteratively consults several
//! language models, reconciles their proposed actions into a single
//! consensus decision, executes that decision (which may itself spawn
//! further agents), tracks hierarchical cost budgets, and persists
//! conversation and task state durably enough to pause and resume.
//!
//! # Architecture
//!
//! ```text
//! TaskManager
//!   └─ root Agent
//!        ├─ ConsensusEngine  (N models → one decision)
//!        ├─ Dispatcher       (decision → Executor)
//!        └─ children: Agent, Agent, …
//! ```
//!
//! Five subsystems do the hard engineering and are each their own module:
//! [`agent`] (the per-agent state machine), [`consensus`] (the multi-model
//! merge engine), [`dispatcher`] (action validation + isolated executors),
//! [`budget`] (hierarchical escrow accounting), and [`persistence`] (the
//! durability contract used to pause and resume a task's agent tree).
//!
//! Concrete LLM provider adapters, web/shell/MCP executors, and the
//! dashboard/HTTP presentation layer are explicitly out of scope: this
//! crate specifies and exercises their *contracts* ([`model::ModelProvider`],
//! [`dispatcher::actions`]) without shipping production implementations of
//! them.

pub mod action;
pub mod agent;
pub mod budget;
pub mod config;
pub mod consensus;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod model;
pub mod persistence;
pub mod registry;
pub mod task;

pub use error::{CoreError, ErrorKind};

//! The core error taxonomy.
//!
//! Errors are tagged kinds, not exceptions: every cross-boundary failure
//! (model call, executor, budget check) resolves to a [`CoreError`] whose
//! [`ErrorKind`] tells the caller who is expected to recover — never a
//! reason to retry blindly or to panic. A closed error enum generalized
//! into one taxonomy shared by every subsystem, rather than one ad hoc
//! error type per module.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured detail carried by [`ErrorKind::WouldViolateEscrow`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EscrowViolation {
    pub spent: f64,
    pub committed: f64,
    pub minimum: f64,
    pub requested: f64,
}

/// The tagged error kinds, grouped by who recovers from them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, thiserror::Error)]
pub enum ErrorKind {
    // ---- Credential / ACL — fatal to the action, never retried ----
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("forbidden")]
    Forbidden,

    // ---- Transient upstream — executor may retry with bounded backoff ----
    #[error("rate limit exceeded")]
    RateLimitExceeded,
    #[error("service unavailable")]
    ServiceUnavailable,
    #[error("bad gateway")]
    BadGateway,
    #[error("gateway timeout")]
    GatewayTimeout,
    #[error("request timeout")]
    RequestTimeout,

    // ---- Caller / contract errors — surfaced immediately, logged at warning ----
    #[error("invalid parameter: {0}")]
    InvalidParam(String),
    #[error("missing required parameter: {0}")]
    MissingRequiredParam(String),
    #[error("unsupported auth type: {0}")]
    UnsupportedAuthType(String),
    #[error("invalid response format")]
    InvalidResponseFormat,
    #[error("failed to parse model response")]
    ParseFailed,

    // ---- Budget ----
    #[error("action blocked: over budget")]
    BudgetExceeded,
    #[error("budget decrease would violate escrow: {0:?}")]
    WouldViolateEscrow(EscrowViolation),
    #[error("spawn rejected: insufficient budget")]
    InsufficientBudget,

    // ---- Credential / secret issues ----
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("not found")]
    NotFound,

    // ---- Executor crashes ----
    #[error("executor process exited: {0}")]
    RouterExit(String),
    #[error("action crashed: {0}")]
    ActionCrashed(String),

    // ---- MCP / remote handshake ----
    #[error("initialization timeout: {0}")]
    InitializationTimeout(String),
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}

impl ErrorKind {
    /// Transient upstream errors may be retried with bounded exponential
    /// backoff by the owning executor before being surfaced.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimitExceeded
                | ErrorKind::ServiceUnavailable
                | ErrorKind::BadGateway
                | ErrorKind::GatewayTimeout
                | ErrorKind::RequestTimeout
        )
    }

    /// Authentication/ACL errors are fatal to the action and never retried.
    pub fn is_fatal_auth(&self) -> bool {
        matches!(self, ErrorKind::AuthenticationFailed | ErrorKind::Forbidden)
    }

    /// Budget-related errors are never retried; the agent must recover
    /// budget (dismiss a child, adjust allocation) before trying again.
    pub fn is_budget(&self) -> bool {
        matches!(
            self,
            ErrorKind::BudgetExceeded
                | ErrorKind::WouldViolateEscrow(_)
                | ErrorKind::InsufficientBudget
        )
    }
}

/// The error type threaded across every agent/executor/dispatcher boundary.
#[derive(Debug, Clone)]
pub struct CoreError {
    pub kind: ErrorKind,
    /// Optional free-form context (captured upstream errors, telemetry).
    pub context: Option<String>,
}

impl CoreError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(ctx) => write!(f, "{} ({ctx})", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<ErrorKind> for CoreError {
    fn from(kind: ErrorKind) -> Self {
        CoreError::new(kind)
    }
}

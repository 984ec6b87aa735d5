// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The daemon-wide error taxonomy, paired with the wire shape commands use
//! to report failure to their originator (`command_error{cmd, error}`).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error kinds, not names: each carries its own propagation policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DaemonError {
    Validation { message: String },
    NotFound { message: String },
    Conflict { message: String, sub_code: String },
    Unauthorized { message: String },
    Transient { message: String },
    Permanent { message: String },
    Fatal { message: String },
}

impl DaemonError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into() }
    }

    pub fn conflict(message: impl Into<String>, sub_code: impl Into<String>) -> Self {
        Self::Conflict { message: message.into(), sub_code: sub_code.into() }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized { message: message.into() }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient { message: message.into() }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent { message: message.into() }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal { message: message.into() }
    }

    /// Whether the owning actor should retry this error with backoff rather
    /// than surfacing it as a terminal failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message }
            | Self::NotFound { message }
            | Self::Unauthorized { message }
            | Self::Transient { message }
            | Self::Permanent { message }
            | Self::Fatal { message } => message,
            Self::Conflict { message, .. } => message,
        }
    }

    /// Matching HTTP status for the health/ops HTTP surface.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::Unauthorized { .. } => 401,
            Self::Transient { .. } => 503,
            Self::Permanent { .. } => 502,
            Self::Fatal { .. } => 500,
        }
    }

    /// Process exit code when this error terminates the daemon at startup.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Fatal { .. } => 3,
            Self::Validation { .. } => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for DaemonError {}

/// The `command_error{cmd, error}` wire shape.
#[derive(Debug, Clone, Serialize)]
pub struct CommandErrorBody {
    pub cmd: String,
    pub error: String,
}

impl CommandErrorBody {
    pub fn new(cmd: impl Into<String>, error: &DaemonError) -> Self {
        Self { cmd: cmd.into(), error: error.message().to_owned() }
    }

    pub fn timeout(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into(), error: "timeout".to_owned() }
    }
}

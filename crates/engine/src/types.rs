//! Result envelope shared by commands, probes, scenarios and the daemon.
//!
//! Every invocation produces exactly one [`CommandResult`]. Handlers never
//! build it by hand: a [`Run`] is started when the invocation begins, step
//! timings are recorded against it, and it is consumed into a result with
//! one of [`Run::pass`], [`Run::error`], [`Run::fail`] or [`Run::skip`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub run_id: String,
    /// Invocation kind: `call`, `probe` or `daemon`.
    pub command: String,
    /// Command or probe name.
    pub target: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub timing_ms: TimingInfo,
    /// Username of the session the command ran under, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandResult {
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    /// Attach structured details to the error, if there is one.
    pub fn with_details(mut self, details: Value) -> Self {
        if let Some(info) = self.error.as_mut() {
            info.details = details;
        }
        self
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pass,
    Fail,
    Skip,
    Error,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pass => "pass",
            Status::Fail => "fail",
            Status::Skip => "skip",
            Status::Error => "error",
        }
    }

    /// Pass and skip both count as success for exit codes and scenarios.
    pub fn is_success(self) -> bool {
        matches!(self, Status::Pass | Status::Skip)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    /// German, user-facing message.
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidInput,
    ValidationFailed,
    Unauthenticated,
    PermissionDenied,
    NotFound,
    Conflict,
    ServerError,
    NetworkError,
    Timeout,
    IoError,
    Unsupported,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::Unauthenticated => "UNAUTHENTICATED",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::ServerError => "SERVER_ERROR",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::IoError => "IO_ERROR",
            ErrorCode::Unsupported => "UNSUPPORTED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TimingInfo {
    pub total: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub steps: BTreeMap<String, u64>,
}

/// An invocation in progress.
#[derive(Debug)]
pub struct Run {
    run_id: String,
    command: &'static str,
    target: String,
    started: Instant,
    steps: BTreeMap<String, u64>,
}

impl Run {
    pub fn start(command: &'static str, target: impl Into<String>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            command,
            target: target.into(),
            started: Instant::now(),
            steps: BTreeMap::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Record the time since `since` under `step`.
    pub fn record(&mut self, step: &str, since: Instant) {
        self.steps.insert(step.to_string(), elapsed_ms(since));
    }

    pub fn pass(self) -> CommandResult {
        self.finish(Status::Pass, None)
    }

    pub fn error(self, code: ErrorCode, message: impl Into<String>) -> CommandResult {
        self.finish(Status::Error, Some(error_info(code, message)))
    }

    /// The check ran and found a problem, as opposed to not running at all.
    pub fn fail(self, code: ErrorCode, message: impl Into<String>) -> CommandResult {
        self.finish(Status::Fail, Some(error_info(code, message)))
    }

    pub fn skip(self, reason: impl Into<String>) -> CommandResult {
        self.finish(
            Status::Skip,
            Some(error_info(ErrorCode::Unsupported, reason)),
        )
    }

    fn finish(self, status: Status, error: Option<ErrorInfo>) -> CommandResult {
        CommandResult {
            timing_ms: TimingInfo {
                total: elapsed_ms(self.started),
                steps: self.steps,
            },
            run_id: self.run_id,
            command: self.command.to_string(),
            target: self.target,
            status,
            error,
            user: None,
            data: None,
        }
    }
}

fn error_info(code: ErrorCode, message: impl Into<String>) -> ErrorInfo {
    ErrorInfo {
        code,
        message: message.into(),
        details: Value::Null,
    }
}

/// Milliseconds since `start`, saturating.
pub fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

// Scenarios

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScenarioStep {
    Call {
        call: String,
        #[serde(default)]
        args: Value,
        #[serde(default = "pass_status")]
        expect_status: Status,
        /// When set, the step also has to end with this error code.
        #[serde(default)]
        expect_code: Option<ErrorCode>,
        #[serde(default = "step_timeout_ms")]
        timeout_ms: u64,
    },
    Probe {
        probe: String,
    },
}

fn pass_status() -> Status {
    Status::Pass
}

fn step_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub run_id: String,
    pub name: Option<String>,
    pub overall_status: Status,
    pub step_results: Vec<CommandResult>,
}

// Daemon protocol: one JSON object per line in each direction.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CommandResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl DaemonResponse {
    pub fn answered(id: String, result: CommandResult) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// The request itself was unusable; no command ran.
    pub fn rejected(id: String, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(error_info(ErrorCode::InvalidInput, message)),
        }
    }
}

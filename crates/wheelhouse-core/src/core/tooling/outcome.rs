use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Ok,
    UserError,
    Failure,
}

impl CommandStatus {
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::UserError => 1,
            Self::Failure => 2,
        }
    }

    /// The `status` field of the JSON envelope.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::UserError => "user-error",
            Self::Failure => "error",
        }
    }
}

/// What a command reports back: a one-line (or multi-line) message for
/// humans and a JSON payload for `--json`.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub status: CommandStatus,
    pub message: String,
    pub details: Value,
}

impl ExecutionOutcome {
    fn with_status(status: CommandStatus, message: impl Into<String>, details: Value) -> Self {
        Self {
            status,
            message: message.into(),
            details,
        }
    }

    pub fn success(message: impl Into<String>, details: Value) -> Self {
        Self::with_status(CommandStatus::Ok, message, details)
    }

    pub fn failure(message: impl Into<String>, details: Value) -> Self {
        Self::with_status(CommandStatus::Failure, message, details)
    }

    pub fn user_error(message: impl Into<String>, details: Value) -> Self {
        Self::with_status(CommandStatus::UserError, message, details)
    }
}

/// A failure the operator can fix (bad input, missing credentials, a wheel
/// set that cannot be narrowed down). Commands raise it through `anyhow`;
/// the CLI turns it back into a [`CommandStatus::UserError`] outcome.
#[derive(thiserror::Error, Debug)]
#[error("{message}")]
pub struct UserError {
    message: String,
    details: Value,
}

impl UserError {
    pub fn new(message: impl Into<String>, details: Value) -> Self {
        Self {
            message: message.into(),
            details,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn details(&self) -> &Value {
        &self.details
    }

    #[must_use]
    pub fn to_outcome(&self) -> ExecutionOutcome {
        ExecutionOutcome::user_error(self.message.clone(), self.details.clone())
    }
}

// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::fmt;

pub mod codes {
    pub const AUTHENTICATION_FAILURE: &str = "authentication_failure";
    pub const CONNECTION_FAILURE: &str = "connection_failure";
    pub const TRANSFER_FAILURE: &str = "transfer_failure";
    pub const CONFIGURATION_ERROR: &str = "configuration_error";
    pub const SUBMISSION_PARSE_ERROR: &str = "submission_parse_error";
    pub const INVALID_STATE: &str = "invalid_state";
    pub const PERSISTENCE_ERROR: &str = "persistence_error";
    pub const KEY_GENERATION_ERROR: &str = "key_generation_error";
    pub const CREDENTIAL_LOAD_ERROR: &str = "credential_load_error";
    pub const REMOTE_ERROR: &str = "remote_error";
    pub const LOCAL_ERROR: &str = "local_error";
    pub const INVALID_ARGUMENT: &str = "invalid_argument";
    pub const NOT_FOUND: &str = "not_found";
    pub const CANCELED: &str = "canceled";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppErrorKind {
    /// The remote host rejected the credentials.
    Authentication,
    /// A connection could not be established for any other reason.
    Session,
    /// A file get/put/create/read/list/stat failed.
    Transfer,
    /// A module set, queue preset or host is missing from the host configuration.
    Configuration,
    /// The scheduler's submission output did not carry a job id.
    SubmissionParse,
    /// The operation is not valid for the task's current status.
    State,
    /// Task state could not be written, read or decoded.
    Persistence,
    KeyGeneration,
    CredentialLoad,
    /// A remote command reported an error on stderr.
    Remote,
    LocalIo,
    InvalidArgument,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct AppError {
    kind: AppErrorKind,
    code: &'static str,
    message: String,
    context: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind, code: &'static str) -> Self {
        Self {
            kind,
            code,
            message: code.to_string(),
            context: None,
        }
    }

    pub fn with_message(
        kind: AppErrorKind,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::with_message(
            AppErrorKind::Configuration,
            codes::CONFIGURATION_ERROR,
            message,
        )
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::State, codes::INVALID_STATE, message)
    }

    pub fn transfer(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::Transfer, codes::TRANSFER_FAILURE, message)
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::Remote, codes::REMOTE_ERROR, message)
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::with_message(
            AppErrorKind::Persistence,
            codes::PERSISTENCE_ERROR,
            message,
        )
    }

    pub fn local_io(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::LocalIo, codes::LOCAL_ERROR, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::with_message(
            AppErrorKind::InvalidArgument,
            codes::INVALID_ARGUMENT,
            message,
        )
    }

    pub fn kind(&self) -> AppErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ctx) = &self.context {
            write!(f, "{} ({})", self.message, ctx)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context_when_present() {
        let err = AppError::remote("mkdir failed").with_context("/scratch/task_1");
        assert_eq!(err.to_string(), "mkdir failed (/scratch/task_1)");
        assert_eq!(err.kind(), AppErrorKind::Remote);
        assert_eq!(err.code(), codes::REMOTE_ERROR);
    }

    #[test]
    fn new_uses_code_as_message() {
        let err = AppError::new(AppErrorKind::Cancelled, codes::CANCELED);
        assert_eq!(err.message(), "canceled");
        assert!(err.context().is_none());
    }
}

use std::fmt;

use thiserror::Error;

use crate::workflow::Rejection;

/// Input problems caught before any network call is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("a subject must be selected")]
    MissingSubject,
    #[error("a key concept must be entered")]
    MissingConcept,
    #[error("an answer must be entered")]
    MissingAnswer,
    #[error("a question must be entered")]
    MissingQuery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteCall {
    ListSubjects,
    GenerateQuestion,
    EvaluateResponse,
    UpdateSubjectIndex,
    AskQuestion,
}

impl RemoteCall {
    pub fn as_str(self) -> &'static str {
        match self {
            RemoteCall::ListSubjects => "list_subjects",
            RemoteCall::GenerateQuestion => "generate_question",
            RemoteCall::EvaluateResponse => "evaluate_response",
            RemoteCall::UpdateSubjectIndex => "update_subject_index",
            RemoteCall::AskQuestion => "ask_question",
        }
    }

    /// Message shown to the user when this call fails.
    pub fn failure_notice(self) -> &'static str {
        match self {
            RemoteCall::ListSubjects => "Could not load the subject list",
            RemoteCall::GenerateQuestion => "Could not generate a question",
            RemoteCall::EvaluateResponse => "Could not evaluate the answer",
            RemoteCall::UpdateSubjectIndex => "Could not update the subject index",
            RemoteCall::AskQuestion => "Could not answer the question",
        }
    }
}

impl fmt::Display for RemoteCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
    /// Network failure, non-2xx status, malformed body or `success: false`.
    #[error("{call} failed: {message}")]
    RemoteCallFailed { call: RemoteCall, message: String },
    #[error(transparent)]
    Rejected(#[from] Rejection),
}

impl ClientError {
    pub fn remote(call: RemoteCall, message: impl Into<String>) -> Self {
        Self::RemoteCallFailed {
            call,
            message: message.into(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteCallFailed { .. })
    }

    /// Text suitable for a transient notification.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(failure) => capitalize(&failure.to_string()),
            Self::RemoteCallFailed { call, message } if message.is_empty() => {
                call.failure_notice().to_string()
            }
            Self::RemoteCallFailed { call, message } => {
                format!("{}: {message}", call.failure_notice())
            }
            Self::Rejected(rejection) => capitalize(&rejection.to_string()),
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

//! Reflection workflow state machine.
//!
//! `Idle -> GeneratingQuestion -> QuestionReady -> Evaluating -> Evaluated -> Idle`.
//! Remote calls are split into a `begin_*` half that hands out a
//! [`RequestToken`] and a `complete_*` half that only applies the outcome when
//! the token is still the one in flight.

use std::fmt;

use shared::domain::{
    ConceptKey, EvaluationResult, ReflectionQuestion, StudentAnswer, SubjectId,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    error::{ClientError, RemoteCall, ValidationFailure},
    payload::{normalize, RawQuestionPayload},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WorkflowState {
    #[default]
    Idle,
    GeneratingQuestion {
        subject: SubjectId,
        concept: ConceptKey,
    },
    QuestionReady {
        subject: SubjectId,
        question: ReflectionQuestion,
    },
    Evaluating {
        subject: SubjectId,
        question: ReflectionQuestion,
        answer: StudentAnswer,
    },
    Evaluated {
        subject: SubjectId,
        question: ReflectionQuestion,
        result: EvaluationResult,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    Idle,
    GeneratingQuestion,
    QuestionReady,
    Evaluating,
    Evaluated,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StateKind::Idle => "idle",
            StateKind::GeneratingQuestion => "generating_question",
            StateKind::QuestionReady => "question_ready",
            StateKind::Evaluating => "evaluating",
            StateKind::Evaluated => "evaluated",
        };
        f.write_str(name)
    }
}

impl WorkflowState {
    pub fn kind(&self) -> StateKind {
        match self {
            WorkflowState::Idle => StateKind::Idle,
            WorkflowState::GeneratingQuestion { .. } => StateKind::GeneratingQuestion,
            WorkflowState::QuestionReady { .. } => StateKind::QuestionReady,
            WorkflowState::Evaluating { .. } => StateKind::Evaluating,
            WorkflowState::Evaluated { .. } => StateKind::Evaluated,
        }
    }

    pub fn question(&self) -> Option<&ReflectionQuestion> {
        match self {
            WorkflowState::QuestionReady { question, .. }
            | WorkflowState::Evaluating { question, .. }
            | WorkflowState::Evaluated { question, .. } => Some(question),
            WorkflowState::Idle | WorkflowState::GeneratingQuestion { .. } => None,
        }
    }

    pub fn evaluation(&self) -> Option<&EvaluationResult> {
        match self {
            WorkflowState::Evaluated { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn subject(&self) -> Option<&SubjectId> {
        match self {
            WorkflowState::Idle => None,
            WorkflowState::GeneratingQuestion { subject, .. }
            | WorkflowState::QuestionReady { subject, .. }
            | WorkflowState::Evaluating { subject, .. }
            | WorkflowState::Evaluated { subject, .. } => Some(subject),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            WorkflowState::GeneratingQuestion { .. } | WorkflowState::Evaluating { .. }
        )
    }
}

/// Why an action was refused. The state is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("{0}")]
    Invalid(#[from] ValidationFailure),
    #[error("a request is already in progress")]
    Busy,
    #[error("cannot {action} while {state}")]
    WrongState {
        action: &'static str,
        state: StateKind,
    },
}

/// What happened to a settled request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Applied,
    /// The call failed; the machine is back to its pre-call state.
    RolledBack(ClientError),
    /// The token no longer matches the request in flight; outcome discarded.
    Stale,
}

/// Everything `complete_submit` needs to build the evaluate request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitTicket {
    pub token: RequestToken,
    pub subject: SubjectId,
    pub question_text: String,
    pub answer: StudentAnswer,
}

#[derive(Debug, Clone, Default)]
pub struct InteractionStateMachine {
    state: WorkflowState,
    draft: StudentAnswer,
    last_token: u64,
    in_flight: Option<RequestToken>,
}

impl InteractionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn draft(&self) -> &StudentAnswer {
        &self.draft
    }

    pub fn in_flight(&self) -> Option<RequestToken> {
        self.in_flight
    }

    /// Edits the answer draft. Only meaningful while a question is on screen.
    pub fn set_draft(&mut self, text: impl Into<String>) -> Result<(), Rejection> {
        match self.state.kind() {
            StateKind::QuestionReady => {
                self.draft = StudentAnswer::new(text);
                Ok(())
            }
            state => Err(Rejection::WrongState {
                action: "edit the answer",
                state,
            }),
        }
    }

    pub fn begin_generate(
        &mut self,
        subject: &SubjectId,
        concept: &ConceptKey,
    ) -> Result<RequestToken, Rejection> {
        self.ensure_settled()?;
        if self.state.kind() != StateKind::Idle {
            return Err(Rejection::WrongState {
                action: "generate a question",
                state: self.state.kind(),
            });
        }
        if subject.is_blank() {
            return Err(ValidationFailure::MissingSubject.into());
        }
        if concept.is_blank() {
            return Err(ValidationFailure::MissingConcept.into());
        }

        let token = self.issue_token();
        self.state = WorkflowState::GeneratingQuestion {
            subject: SubjectId::new(subject.as_str().trim()),
            concept: ConceptKey::new(concept.as_str().trim()),
        };
        info!(%token, %subject, %concept, "question generation started");
        Ok(token)
    }

    pub fn complete_generate(
        &mut self,
        token: RequestToken,
        outcome: Result<RawQuestionPayload, ClientError>,
    ) -> Completion {
        let subject = match (&self.state, self.in_flight) {
            (WorkflowState::GeneratingQuestion { subject, .. }, Some(current))
                if current == token =>
            {
                subject.clone()
            }
            _ => {
                debug!(%token, state = %self.state.kind(), "discarding stale generate outcome");
                return Completion::Stale;
            }
        };
        self.in_flight = None;

        let failure = match outcome {
            Ok(raw) => {
                let question = normalize(&raw);
                if question.has_text() {
                    info!(%token, %subject, "question ready");
                    self.draft = StudentAnswer::default();
                    self.state = WorkflowState::QuestionReady { subject, question };
                    return Completion::Applied;
                }
                ClientError::remote(
                    RemoteCall::GenerateQuestion,
                    "the backend returned an empty question",
                )
            }
            Err(err) => err,
        };

        info!(%token, error = %failure, "question generation rolled back");
        self.state = WorkflowState::Idle;
        Completion::RolledBack(failure)
    }

    pub fn begin_submit(&mut self, answer: &StudentAnswer) -> Result<SubmitTicket, Rejection> {
        self.ensure_settled()?;
        let (subject, question) = match &self.state {
            WorkflowState::QuestionReady { subject, question } => {
                (subject.clone(), question.clone())
            }
            other => {
                return Err(Rejection::WrongState {
                    action: "submit an answer",
                    state: other.kind(),
                })
            }
        };
        if answer.is_blank() {
            return Err(ValidationFailure::MissingAnswer.into());
        }

        let token = self.issue_token();
        self.draft = answer.clone();
        let ticket = SubmitTicket {
            token,
            subject: subject.clone(),
            question_text: question.text.clone(),
            answer: answer.clone(),
        };
        self.state = WorkflowState::Evaluating {
            subject,
            question,
            answer: answer.clone(),
        };
        info!(%token, "answer submitted for evaluation");
        Ok(ticket)
    }

    pub fn complete_submit(
        &mut self,
        token: RequestToken,
        outcome: Result<EvaluationResult, ClientError>,
    ) -> Completion {
        let pending = std::mem::take(&mut self.state);
        let (subject, question) = match (pending, self.in_flight) {
            (
                WorkflowState::Evaluating {
                    subject, question, ..
                },
                Some(current),
            ) if current == token => (subject, question),
            (other, _) => {
                self.state = other;
                debug!(%token, state = %self.state.kind(), "discarding stale evaluation outcome");
                return Completion::Stale;
            }
        };
        self.in_flight = None;

        match outcome {
            Ok(result) => {
                info!(%token, score = result.score.value(), "answer evaluated");
                self.draft = StudentAnswer::default();
                self.state = WorkflowState::Evaluated {
                    subject,
                    question,
                    result,
                };
                Completion::Applied
            }
            Err(err) => {
                info!(%token, error = %err, "evaluation rolled back");
                self.state = WorkflowState::QuestionReady { subject, question };
                Completion::RolledBack(err)
            }
        }
    }

    /// Returns to `Idle` from any state. A request still in flight is abandoned
    /// and its outcome will be treated as stale.
    pub fn reset(&mut self) -> StateKind {
        let previous = self.state.kind();
        if let Some(token) = self.in_flight.take() {
            info!(%token, "abandoning request in flight");
        }
        self.state = WorkflowState::Idle;
        self.draft = StudentAnswer::default();
        previous
    }

    fn ensure_settled(&self) -> Result<(), Rejection> {
        if self.in_flight.is_some() || self.state.is_pending() {
            return Err(Rejection::Busy);
        }
        Ok(())
    }

    fn issue_token(&mut self) -> RequestToken {
        self.last_token += 1;
        let token = RequestToken(self.last_token);
        self.in_flight = Some(token);
        token
    }
}

#[cfg(test)]
#[path = "tests/workflow_tests.rs"]
mod tests;

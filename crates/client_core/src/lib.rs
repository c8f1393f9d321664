use async_trait::async_trait;
use shared::{
    domain::SubjectId,
    protocol::{
        AskQuestionRequest, AskQuestionResponse, EvaluateRequest, EvaluationResponse,
        GenerateQuestionRequest, UpdateSubjectRequest, UpdateSubjectResponse,
    },
};

pub mod coordinator;
pub mod error;
pub mod payload;
pub mod presenter;
pub mod rich_text;
pub mod transport;
pub mod workflow;

pub use coordinator::{
    BusyFlags, Notification, NotificationLevel, ReflectionSession, RequestCoordinator,
    SessionEvent, SessionOptions, WorkflowSnapshot,
};
pub use error::{ClientError, RemoteCall, ValidationFailure};
pub use payload::{normalize, RawQuestionPayload};
pub use presenter::{EvaluationPresenter, EvaluationView, QuestionView};
pub use transport::HttpBackend;
pub use workflow::{
    Completion, InteractionStateMachine, Rejection, RequestToken, StateKind, WorkflowState,
};

/// Remote reasoning backend. Every failure mode of a call (transport, status,
/// body, envelope) surfaces as [`ClientError::RemoteCallFailed`].
#[async_trait]
pub trait ReflectionBackend: Send + Sync {
    async fn list_subjects(&self) -> Result<Vec<SubjectId>, ClientError>;
    async fn generate_question(
        &self,
        request: GenerateQuestionRequest,
    ) -> Result<RawQuestionPayload, ClientError>;
    async fn evaluate_response(
        &self,
        request: EvaluateRequest,
    ) -> Result<EvaluationResponse, ClientError>;
    async fn update_subject_index(
        &self,
        request: UpdateSubjectRequest,
    ) -> Result<UpdateSubjectResponse, ClientError>;
    async fn ask_question(
        &self,
        request: AskQuestionRequest,
    ) -> Result<AskQuestionResponse, ClientError>;
}

//! Remote call coordination and the per-session driver.
//!
//! [`RequestCoordinator`] wraps each backend call with a busy flag and uniform
//! logging. [`ReflectionSession`] owns one [`InteractionStateMachine`] and
//! feeds it the coordinator's outcomes, publishing [`SessionEvent`]s.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Instant,
};

use shared::{
    domain::{ConceptKey, StudentAnswer, SubjectId},
    protocol::{
        AskQuestionRequest, AskQuestionResponse, EvaluateRequest, EvaluationResponse,
        GenerateQuestionRequest, UpdateSubjectRequest, UpdateSubjectResponse,
    },
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{ClientError, RemoteCall, ValidationFailure},
    payload::RawQuestionPayload,
    workflow::{
        Completion, InteractionStateMachine, Rejection, RequestToken, StateKind, WorkflowState,
    },
    ReflectionBackend,
};

const SESSION_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusyFlags {
    pub listing_subjects: bool,
    pub generating: bool,
    pub evaluating: bool,
    pub updating_index: bool,
    pub asking: bool,
}

impl BusyFlags {
    pub fn any(&self) -> bool {
        self.listing_subjects
            || self.generating
            || self.evaluating
            || self.updating_index
            || self.asking
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

/// Read-only copy of the session's workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSnapshot {
    pub state: WorkflowState,
    pub draft: StudentAnswer,
    pub in_flight: Option<RequestToken>,
}

impl WorkflowSnapshot {
    fn of(machine: &InteractionStateMachine) -> Self {
        Self {
            state: machine.state().clone(),
            draft: machine.draft().clone(),
            in_flight: machine.in_flight(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(WorkflowSnapshot),
    Notification(Notification),
    BusyChanged(BusyFlags),
}

/// Calls in progress per kind. An abandoned call can overlap a new one.
#[derive(Default)]
struct BusyState {
    listing_subjects: AtomicUsize,
    generating: AtomicUsize,
    evaluating: AtomicUsize,
    updating_index: AtomicUsize,
    asking: AtomicUsize,
}

impl BusyState {
    fn counter(&self, call: RemoteCall) -> &AtomicUsize {
        match call {
            RemoteCall::ListSubjects => &self.listing_subjects,
            RemoteCall::GenerateQuestion => &self.generating,
            RemoteCall::EvaluateResponse => &self.evaluating,
            RemoteCall::UpdateSubjectIndex => &self.updating_index,
            RemoteCall::AskQuestion => &self.asking,
        }
    }

    fn snapshot(&self) -> BusyFlags {
        BusyFlags {
            listing_subjects: self.listing_subjects.load(Ordering::SeqCst) > 0,
            generating: self.generating.load(Ordering::SeqCst) > 0,
            evaluating: self.evaluating.load(Ordering::SeqCst) > 0,
            updating_index: self.updating_index.load(Ordering::SeqCst) > 0,
            asking: self.asking.load(Ordering::SeqCst) > 0,
        }
    }
}

/// Releases the call's busy count when it settles or its future is dropped.
struct BusyGuard<'a> {
    state: &'a BusyState,
    call: RemoteCall,
    events: &'a broadcast::Sender<SessionEvent>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.state.counter(self.call).fetch_sub(1, Ordering::SeqCst);
        let _ = self
            .events
            .send(SessionEvent::BusyChanged(self.state.snapshot()));
    }
}

/// Stateless between calls apart from the busy flags of calls in progress.
/// Never retries; a retry is a new user action.
pub struct RequestCoordinator<B: ReflectionBackend> {
    backend: Arc<B>,
    busy: BusyState,
    events: broadcast::Sender<SessionEvent>,
}

impl<B: ReflectionBackend> RequestCoordinator<B> {
    pub fn new(backend: Arc<B>, events: broadcast::Sender<SessionEvent>) -> Self {
        Self {
            backend,
            busy: BusyState::default(),
            events,
        }
    }

    pub fn busy(&self) -> BusyFlags {
        self.busy.snapshot()
    }

    pub async fn list_subjects(&self) -> Result<Vec<SubjectId>, ClientError> {
        self.run(RemoteCall::ListSubjects, self.backend.list_subjects())
            .await
    }

    pub async fn generate_question(
        &self,
        request: GenerateQuestionRequest,
    ) -> Result<RawQuestionPayload, ClientError> {
        self.run(
            RemoteCall::GenerateQuestion,
            self.backend.generate_question(request),
        )
        .await
    }

    pub async fn evaluate_response(
        &self,
        request: EvaluateRequest,
    ) -> Result<EvaluationResponse, ClientError> {
        self.run(
            RemoteCall::EvaluateResponse,
            self.backend.evaluate_response(request),
        )
        .await
    }

    pub async fn update_subject_index(
        &self,
        request: UpdateSubjectRequest,
    ) -> Result<UpdateSubjectResponse, ClientError> {
        self.run(
            RemoteCall::UpdateSubjectIndex,
            self.backend.update_subject_index(request),
        )
        .await
    }

    pub async fn ask_question(
        &self,
        request: AskQuestionRequest,
    ) -> Result<AskQuestionResponse, ClientError> {
        self.run(RemoteCall::AskQuestion, self.backend.ask_question(request))
            .await
    }

    /// Publishes the user-facing notice for a failure.
    pub fn notify_failure(&self, err: &ClientError) {
        self.notify(Notification::error(err.user_message()));
    }

    pub fn notify(&self, notification: Notification) {
        let _ = self.events.send(SessionEvent::Notification(notification));
    }

    async fn run<T, F>(&self, call: RemoteCall, request: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        let _busy = self.mark_busy(call);
        let started = Instant::now();
        let outcome = request.await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(_) => debug!(call = call.as_str(), elapsed_ms, "remote call succeeded"),
            Err(err) => warn!(call = call.as_str(), elapsed_ms, error = %err, "remote call failed"),
        }
        outcome
    }

    fn mark_busy(&self, call: RemoteCall) -> BusyGuard<'_> {
        self.busy.counter(call).fetch_add(1, Ordering::SeqCst);
        let _ = self
            .events
            .send(SessionEvent::BusyChanged(self.busy.snapshot()));
        BusyGuard {
            state: &self.busy,
            call,
            events: &self.events,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Forwarded as `save_output` on generate requests.
    pub save_output: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { save_output: true }
    }
}

/// One interaction session: a single state machine driven by user actions
/// and by the outcomes of the calls those actions start.
pub struct ReflectionSession<B: ReflectionBackend> {
    id: Uuid,
    options: SessionOptions,
    coordinator: RequestCoordinator<B>,
    machine: Mutex<InteractionStateMachine>,
    events: broadcast::Sender<SessionEvent>,
}

impl<B: ReflectionBackend> ReflectionSession<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_options(backend, SessionOptions::default())
    }

    pub fn with_options(backend: Arc<B>, options: SessionOptions) -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            id: Uuid::new_v4(),
            options,
            coordinator: RequestCoordinator::new(backend, events.clone()),
            machine: Mutex::new(InteractionStateMachine::new()),
            events,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn busy(&self) -> BusyFlags {
        self.coordinator.busy()
    }

    pub async fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot::of(&*self.machine.lock().await)
    }

    pub async fn load_subjects(&self) -> Result<Vec<SubjectId>, ClientError> {
        let subjects = self
            .coordinator
            .list_subjects()
            .await
            .inspect_err(|err| self.coordinator.notify_failure(err))?;
        info!(session = %self.id, count = subjects.len(), "subjects loaded");
        Ok(subjects)
    }

    pub async fn generate(
        &self,
        subject: SubjectId,
        concept: ConceptKey,
    ) -> Result<Completion, ClientError> {
        let (token, request) = {
            let mut machine = self.machine.lock().await;
            let token = machine
                .begin_generate(&subject, &concept)
                .map_err(|rejection| self.rejected("generate", rejection))?;
            let request = GenerateQuestionRequest {
                subject: SubjectId::new(subject.as_str().trim()),
                concept: ConceptKey::new(concept.as_str().trim()),
                output_format: Default::default(),
                save_output: self.options.save_output,
            };
            self.publish_state(&machine);
            (token, request)
        };

        let outcome = self.coordinator.generate_question(request).await;

        let mut machine = self.machine.lock().await;
        let completion = machine.complete_generate(token, outcome);
        self.settle(&machine, token, &completion);
        Ok(completion)
    }

    pub async fn set_draft(&self, text: impl Into<String>) -> Result<(), ClientError> {
        let mut machine = self.machine.lock().await;
        machine
            .set_draft(text)
            .map_err(|rejection| self.rejected("edit_draft", rejection))
    }

    pub async fn submit(&self, answer: StudentAnswer) -> Result<Completion, ClientError> {
        let ticket = {
            let mut machine = self.machine.lock().await;
            let ticket = machine
                .begin_submit(&answer)
                .map_err(|rejection| self.rejected("submit", rejection))?;
            self.publish_state(&machine);
            ticket
        };

        let request = EvaluateRequest {
            subject: ticket.subject.clone(),
            question: ticket.question_text.clone(),
            student_response: ticket.answer.as_str().to_string(),
        };
        let outcome = self
            .coordinator
            .evaluate_response(request)
            .await
            .map(|response| response.evaluation);

        let mut machine = self.machine.lock().await;
        let completion = machine.complete_submit(ticket.token, outcome);
        self.settle(&machine, ticket.token, &completion);
        Ok(completion)
    }

    /// Back to `Idle`, abandoning anything in flight.
    pub async fn reset(&self) -> StateKind {
        let mut machine = self.machine.lock().await;
        let previous = machine.reset();
        info!(session = %self.id, %previous, "session reset");
        self.publish_state(&machine);
        previous
    }

    pub async fn update_subject_index(
        &self,
        subject: SubjectId,
    ) -> Result<UpdateSubjectResponse, ClientError> {
        if subject.is_blank() {
            return Err(self.invalid(ValidationFailure::MissingSubject));
        }
        let report = self
            .coordinator
            .update_subject_index(UpdateSubjectRequest { subject })
            .await
            .inspect_err(|err| self.coordinator.notify_failure(err))?;
        self.coordinator.notify(Notification::info(format!(
            "Index for {} updated: {} documents processed, index size {}",
            report.subject, report.documents_processed, report.index_size
        )));
        Ok(report)
    }

    pub async fn ask_question(
        &self,
        subject: SubjectId,
        query: impl Into<String>,
    ) -> Result<AskQuestionResponse, ClientError> {
        let query = query.into();
        if subject.is_blank() {
            return Err(self.invalid(ValidationFailure::MissingSubject));
        }
        if query.trim().is_empty() {
            return Err(self.invalid(ValidationFailure::MissingQuery));
        }
        self.coordinator
            .ask_question(AskQuestionRequest {
                subject,
                query: query.trim().to_string(),
            })
            .await
            .inspect_err(|err| self.coordinator.notify_failure(err))
    }

    fn settle(
        &self,
        machine: &InteractionStateMachine,
        token: RequestToken,
        completion: &Completion,
    ) {
        match completion {
            Completion::Applied => self.publish_state(machine),
            Completion::RolledBack(err) => {
                self.publish_state(machine);
                self.coordinator.notify_failure(err);
            }
            Completion::Stale => {
                debug!(session = %self.id, %token, "late response ignored");
            }
        }
    }

    fn rejected(&self, action: &'static str, rejection: Rejection) -> ClientError {
        match rejection {
            Rejection::Invalid(failure) => self.invalid(failure),
            other => {
                debug!(session = %self.id, action, reason = %other, "action rejected");
                ClientError::Rejected(other)
            }
        }
    }

    fn invalid(&self, failure: ValidationFailure) -> ClientError {
        let err = ClientError::Validation(failure);
        self.coordinator.notify(Notification::error(err.user_message()));
        err
    }

    fn publish_state(&self, machine: &InteractionStateMachine) {
        let _ = self
            .events
            .send(SessionEvent::StateChanged(WorkflowSnapshot::of(machine)));
    }
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;

use super::*;
use serde_json::json;
use shared::domain::Score;

fn subject() -> SubjectId {
    SubjectId::new("mathematiques")
}

fn concept() -> ConceptKey {
    ConceptKey::new("pythagore")
}

fn raw_question(text: &str) -> RawQuestionPayload {
    RawQuestionPayload::from(json!({ "question": text, "niveau_difficulté": "facile" }))
}

fn evaluation(score: i64) -> EvaluationResult {
    EvaluationResult {
        score: Score::new(score),
        strengths: vec!["clair".into()],
        ..EvaluationResult::default()
    }
}

fn remote_failure(call: RemoteCall) -> ClientError {
    ClientError::remote(call, "HTTP 502 Bad Gateway")
}

fn machine_with_question(text: &str) -> InteractionStateMachine {
    let mut machine = InteractionStateMachine::new();
    let token = machine.begin_generate(&subject(), &concept()).expect("begin");
    assert_eq!(
        machine.complete_generate(token, Ok(raw_question(text))),
        Completion::Applied
    );
    machine
}

#[test]
fn starts_idle_with_nothing_in_flight() {
    let machine = InteractionStateMachine::new();
    assert_eq!(machine.state(), &WorkflowState::Idle);
    assert_eq!(machine.in_flight(), None);
    assert!(machine.draft().is_blank());
}

#[test]
fn submit_without_question_is_rejected() {
    let mut machine = InteractionStateMachine::new();
    let err = machine
        .begin_submit(&StudentAnswer::new("une réponse"))
        .expect_err("should reject");
    assert_eq!(
        err,
        Rejection::WrongState {
            action: "submit an answer",
            state: StateKind::Idle
        }
    );
    assert_eq!(machine.state(), &WorkflowState::Idle);
    assert_eq!(machine.in_flight(), None);
}

#[test]
fn generate_requires_subject_and_concept() {
    let mut machine = InteractionStateMachine::new();
    assert_eq!(
        machine.begin_generate(&SubjectId::new("  "), &concept()),
        Err(Rejection::Invalid(ValidationFailure::MissingSubject))
    );
    assert_eq!(
        machine.begin_generate(&subject(), &ConceptKey::new("")),
        Err(Rejection::Invalid(ValidationFailure::MissingConcept))
    );
    assert_eq!(machine.state(), &WorkflowState::Idle);
    assert_eq!(machine.in_flight(), None);
}

#[test]
fn full_cycle_reaches_evaluated_and_resets() {
    let mut machine = InteractionStateMachine::new();
    let token = machine.begin_generate(&subject(), &concept()).expect("begin");
    assert_eq!(machine.state().kind(), StateKind::GeneratingQuestion);
    assert_eq!(machine.in_flight(), Some(token));

    assert_eq!(
        machine.complete_generate(token, Ok(raw_question("Expliquez le théorème"))),
        Completion::Applied
    );
    let question = machine.state().question().cloned().expect("question");
    assert_eq!(question.text, "Expliquez le théorème");
    assert_eq!(question.difficulty.as_deref(), Some("facile"));

    machine.set_draft("a² + b² = c²").expect("draft");
    let ticket = machine
        .begin_submit(&StudentAnswer::new("a² + b² = c²"))
        .expect("submit");
    assert_eq!(ticket.subject, subject());
    assert_eq!(ticket.question_text, "Expliquez le théorème");
    assert!(ticket.token > token);
    assert_eq!(machine.state().kind(), StateKind::Evaluating);

    assert_eq!(
        machine.complete_submit(ticket.token, Ok(evaluation(87))),
        Completion::Applied
    );
    assert_eq!(machine.state().kind(), StateKind::Evaluated);
    assert_eq!(
        machine.state().evaluation().map(|e| e.score.value()),
        Some(87)
    );
    assert_eq!(machine.state().question(), Some(&question));

    assert_eq!(machine.reset(), StateKind::Evaluated);
    assert_eq!(machine.state(), &WorkflowState::Idle);
}

#[test]
fn generate_failure_rolls_back_to_idle() {
    let mut machine = InteractionStateMachine::new();
    let token = machine.begin_generate(&subject(), &concept()).expect("begin");
    let failure = remote_failure(RemoteCall::GenerateQuestion);

    assert_eq!(
        machine.complete_generate(token, Err(failure.clone())),
        Completion::RolledBack(failure)
    );
    assert_eq!(machine.state(), &WorkflowState::Idle);
    assert_eq!(machine.in_flight(), None);
    assert!(machine.begin_generate(&subject(), &concept()).is_ok());
}

#[test]
fn empty_question_is_treated_as_failed_generation() {
    let mut machine = InteractionStateMachine::new();
    let token = machine.begin_generate(&subject(), &concept()).expect("begin");

    let completion = machine.complete_generate(token, Ok(RawQuestionPayload::from(json!("   "))));
    assert!(matches!(
        completion,
        Completion::RolledBack(ClientError::RemoteCallFailed {
            call: RemoteCall::GenerateQuestion,
            ..
        })
    ));
    assert_eq!(machine.state(), &WorkflowState::Idle);
}

#[test]
fn second_generate_while_generating_is_rejected() {
    let mut machine = InteractionStateMachine::new();
    let first = machine.begin_generate(&subject(), &concept()).expect("begin");

    assert_eq!(
        machine.begin_generate(&SubjectId::new("physique"), &concept()),
        Err(Rejection::Busy)
    );
    assert_eq!(machine.in_flight(), Some(first));
    assert_eq!(
        machine.state(),
        &WorkflowState::GeneratingQuestion {
            subject: subject(),
            concept: concept(),
        }
    );
}

#[test]
fn second_submit_while_evaluating_is_rejected() {
    let mut machine = machine_with_question("Q");
    let ticket = machine
        .begin_submit(&StudentAnswer::new("première"))
        .expect("submit");
    assert_eq!(
        machine.begin_submit(&StudentAnswer::new("seconde")),
        Err(Rejection::Busy)
    );
    assert_eq!(machine.in_flight(), Some(ticket.token));
}

#[test]
fn blank_answer_is_a_validation_failure() {
    let mut machine = machine_with_question("Q");
    assert_eq!(
        machine.begin_submit(&StudentAnswer::new(" \n ")),
        Err(Rejection::Invalid(ValidationFailure::MissingAnswer))
    );
    assert_eq!(machine.state().kind(), StateKind::QuestionReady);
}

#[test]
fn evaluation_failure_returns_to_question_and_keeps_answer() {
    let mut machine = machine_with_question("Pourquoi le ciel est bleu ?");
    let question = machine.state().question().cloned().expect("question");
    let answer = StudentAnswer::new("Diffusion de Rayleigh");
    let ticket = machine.begin_submit(&answer).expect("submit");
    let failure = remote_failure(RemoteCall::EvaluateResponse);

    assert_eq!(
        machine.complete_submit(ticket.token, Err(failure.clone())),
        Completion::RolledBack(failure)
    );
    assert_eq!(
        machine.state(),
        &WorkflowState::QuestionReady {
            subject: subject(),
            question,
        }
    );
    assert_eq!(machine.draft(), &answer);
    assert!(machine.begin_submit(&answer).is_ok());
}

#[test]
fn reset_while_generating_discards_late_response() {
    let mut machine = InteractionStateMachine::new();
    let abandoned = machine.begin_generate(&subject(), &concept()).expect("begin");
    assert_eq!(machine.reset(), StateKind::GeneratingQuestion);
    assert_eq!(machine.in_flight(), None);

    let current = machine.begin_generate(&subject(), &concept()).expect("begin again");
    assert_eq!(
        machine.complete_generate(abandoned, Ok(raw_question("ancienne"))),
        Completion::Stale
    );
    assert_eq!(machine.state().kind(), StateKind::GeneratingQuestion);

    assert_eq!(
        machine.complete_generate(current, Ok(raw_question("nouvelle"))),
        Completion::Applied
    );
    assert_eq!(
        machine.state().question().map(|q| q.text.as_str()),
        Some("nouvelle")
    );
}

#[test]
fn reset_while_evaluating_discards_late_evaluation() {
    let mut machine = machine_with_question("Q");
    let ticket = machine
        .begin_submit(&StudentAnswer::new("réponse"))
        .expect("submit");
    machine.reset();

    assert_eq!(
        machine.complete_submit(ticket.token, Ok(evaluation(50))),
        Completion::Stale
    );
    assert_eq!(machine.state(), &WorkflowState::Idle);
    assert!(machine.draft().is_blank());
}

#[test]
fn late_failure_after_reset_is_stale_not_rolled_back() {
    let mut machine = InteractionStateMachine::new();
    let token = machine.begin_generate(&subject(), &concept()).expect("begin");
    machine.reset();
    assert_eq!(
        machine.complete_generate(token, Err(remote_failure(RemoteCall::GenerateQuestion))),
        Completion::Stale
    );
    assert_eq!(machine.state(), &WorkflowState::Idle);
}

#[test]
fn generate_from_evaluated_requires_reset() {
    let mut machine = machine_with_question("Q");
    let ticket = machine.begin_submit(&StudentAnswer::new("r")).expect("submit");
    machine.complete_submit(ticket.token, Ok(evaluation(10)));

    assert_eq!(
        machine.begin_generate(&subject(), &concept()),
        Err(Rejection::WrongState {
            action: "generate a question",
            state: StateKind::Evaluated
        })
    );
}

#[test]
fn draft_is_only_editable_with_a_question_on_screen() {
    let mut machine = InteractionStateMachine::new();
    assert!(machine.set_draft("trop tôt").is_err());

    let mut machine = machine_with_question("Q");
    machine.set_draft("brouillon").expect("draft");
    assert_eq!(machine.draft().as_str(), "brouillon");
    machine.reset();
    assert!(machine.draft().is_blank());
}

#[test]
fn new_question_clears_previous_draft() {
    let mut machine = machine_with_question("Q1");
    let ticket = machine.begin_submit(&StudentAnswer::new("r1")).expect("submit");
    machine.complete_submit(ticket.token, Err(remote_failure(RemoteCall::EvaluateResponse)));
    assert_eq!(machine.draft().as_str(), "r1");

    machine.reset();
    let token = machine.begin_generate(&subject(), &concept()).expect("begin");
    machine.complete_generate(token, Ok(raw_question("Q2")));
    assert!(machine.draft().is_blank());
}

use super::*;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use shared::domain::ConceptKey;
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct FakeBackendState {
    received: Arc<Mutex<Vec<(String, Value)>>>,
    question_data: Arc<Mutex<Value>>,
}

fn envelope(data: Value) -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "ok",
        "data": data,
        "timestamp": "2024-05-01T10:00:00Z"
    }))
}

async fn list_subjects() -> Json<Value> {
    envelope(json!({ "matieres": ["mathematiques", "histoire"] }))
}

async fn generate(
    State(state): State<FakeBackendState>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state
        .received
        .lock()
        .await
        .push(("generate".to_string(), body));
    let data = state.question_data.lock().await.clone();
    envelope(data)
}

async fn evaluate(
    State(state): State<FakeBackendState>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state
        .received
        .lock()
        .await
        .push(("evaluate".to_string(), body));
    envelope(json!({
        "evaluation": {
            "note": 87,
            "points_forts": ["clair"],
            "points_ameliorer": [],
            "reponse_modele": "Le modèle",
            "justification_note": "Bonne structure",
            "conseil_personnalise": "Continuez"
        },
        "matiere": "mathematiques",
        "logs": ""
    }))
}

async fn update_subject(Json(body): Json<Value>) -> Json<Value> {
    envelope(json!({
        "matiere": body["matiere"],
        "updated": true,
        "documents_processed": 12,
        "index_size": 340
    }))
}

async fn ask_question() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "success": false,
            "message": "Index introuvable pour cette matière",
            "data": null,
            "timestamp": "2024-05-01T10:00:00Z"
        })),
    )
}

async fn spawn_fake_backend(state: FakeBackendState) -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new()
        .route("/api/matieres", get(list_subjects))
        .route("/api/matieres/update", post(update_subject))
        .route("/api/question", post(ask_question))
        .route("/api/question/reflection", post(generate))
        .route("/api/evaluation/response", post(evaluate))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

async fn spawn_single_route(status: StatusCode, body: &'static str) -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new().route(
        "/api/matieres",
        get(move || async move { (status, body) }),
    );
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

fn backend(url: &str) -> HttpBackend {
    HttpBackend::new(url, "/api", Some(Duration::from_secs(5))).expect("backend")
}

#[tokio::test]
async fn lists_subjects_from_envelope() {
    let url = spawn_fake_backend(FakeBackendState::default())
        .await
        .expect("spawn");
    let subjects = backend(&url).list_subjects().await.expect("subjects");
    assert_eq!(
        subjects,
        vec![SubjectId::new("mathematiques"), SubjectId::new("histoire")]
    );
}

#[tokio::test]
async fn generate_posts_backend_field_names_and_returns_raw_payload() {
    let state = FakeBackendState::default();
    *state.question_data.lock().await = json!("Quelle est la capitale ?");
    let url = spawn_fake_backend(state.clone()).await.expect("spawn");

    let payload = backend(&url)
        .generate_question(GenerateQuestionRequest {
            subject: SubjectId::new("geographie"),
            concept: ConceptKey::new("capitales"),
            output_format: Default::default(),
            save_output: false,
        })
        .await
        .expect("generate");
    assert_eq!(
        payload,
        RawQuestionPayload::Text("Quelle est la capitale ?".into())
    );

    let received = state.received.lock().await;
    assert_eq!(received.len(), 1);
    assert_eq!(
        received[0].1,
        json!({
            "matiere": "geographie",
            "concept_cle": "capitales",
            "output_format": "json",
            "save_output": false
        })
    );
}

#[tokio::test]
async fn evaluation_decodes_score_and_lists() {
    let state = FakeBackendState::default();
    let url = spawn_fake_backend(state.clone()).await.expect("spawn");

    let response = backend(&url)
        .evaluate_response(EvaluateRequest {
            subject: SubjectId::new("mathematiques"),
            question: "Expliquez X".into(),
            student_response: "X est...".into(),
        })
        .await
        .expect("evaluate");
    assert_eq!(response.evaluation.score.value(), 87);
    assert_eq!(response.evaluation.strengths, vec!["clair"]);
    assert!(response.evaluation.weaknesses.is_empty());

    let received = state.received.lock().await;
    assert_eq!(received[0].1["student_response"], "X est...");
    assert_eq!(received[0].1["question"], "Expliquez X");
}

#[tokio::test]
async fn update_subject_index_reports_counts() {
    let url = spawn_fake_backend(FakeBackendState::default())
        .await
        .expect("spawn");
    let report = backend(&url)
        .update_subject_index(UpdateSubjectRequest {
            subject: SubjectId::new("histoire"),
        })
        .await
        .expect("update");
    assert!(report.updated);
    assert_eq!(report.subject, SubjectId::new("histoire"));
    assert_eq!(report.documents_processed, 12);
    assert_eq!(report.index_size, 340);
}

#[tokio::test]
async fn unsuccessful_envelope_is_a_failure_despite_http_ok() {
    let url = spawn_fake_backend(FakeBackendState::default())
        .await
        .expect("spawn");
    let err = backend(&url)
        .ask_question(AskQuestionRequest {
            subject: SubjectId::new("histoire"),
            query: "Quand ?".into(),
        })
        .await
        .expect_err("should fail");
    assert_eq!(
        err,
        ClientError::remote(
            RemoteCall::AskQuestion,
            "Index introuvable pour cette matière"
        )
    );
}

#[tokio::test]
async fn error_status_uses_backend_error_body() {
    let url = spawn_single_route(
        StatusCode::UNPROCESSABLE_ENTITY,
        r#"{"success":false,"message":"Requête invalide","error":{"code":"VALIDATION_ERROR","details":"matiere inconnue","field":"matiere","type":"validation"},"timestamp":""}"#,
    )
    .await
    .expect("spawn");
    let err = backend(&url).list_subjects().await.expect_err("should fail");
    assert_eq!(
        err,
        ClientError::remote(
            RemoteCall::ListSubjects,
            "Requête invalide (VALIDATION_ERROR (matiere): matiere inconnue)"
        )
    );
}

#[tokio::test]
async fn error_status_without_body_falls_back_to_status_line() {
    let url = spawn_single_route(StatusCode::BAD_GATEWAY, "upstream down")
        .await
        .expect("spawn");
    let err = backend(&url).list_subjects().await.expect_err("should fail");
    assert_eq!(
        err,
        ClientError::remote(RemoteCall::ListSubjects, "HTTP 502 Bad Gateway")
    );
}

#[tokio::test]
async fn malformed_body_is_a_remote_failure() {
    let url = spawn_single_route(StatusCode::OK, "<html>oops</html>")
        .await
        .expect("spawn");
    let err = backend(&url).list_subjects().await.expect_err("should fail");
    match err {
        ClientError::RemoteCallFailed { call, message } => {
            assert_eq!(call, RemoteCall::ListSubjects);
            assert!(message.starts_with("malformed response body"), "{message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn missing_data_is_a_remote_failure() {
    let url = spawn_single_route(StatusCode::OK, r#"{"success":true,"message":"ok"}"#)
        .await
        .expect("spawn");
    let err = backend(&url).list_subjects().await.expect_err("should fail");
    assert_eq!(
        err,
        ClientError::remote(RemoteCall::ListSubjects, "response carried no data")
    );
}

#[tokio::test]
async fn unreachable_backend_is_a_remote_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let err = backend(&format!("http://{addr}"))
        .list_subjects()
        .await
        .expect_err("should fail");
    assert!(err.is_remote());
}

#[test]
fn api_root_joins_prefix_once() {
    assert_eq!(
        api_root("http://localhost:8000/", "/api/").expect("root"),
        "http://localhost:8000/api"
    );
    assert_eq!(
        api_root("http://localhost:8000", "").expect("root"),
        "http://localhost:8000"
    );
    assert_eq!(
        api_root("https://rag.example.org/v2/", "api").expect("root"),
        "https://rag.example.org/v2/api"
    );
    assert!(api_root("ftp://localhost", "/api").is_err());
    assert!(api_root("not a url", "/api").is_err());
}

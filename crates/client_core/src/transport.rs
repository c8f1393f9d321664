//! HTTP implementation of [`ReflectionBackend`].

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{header::ACCEPT, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::SubjectId,
    protocol::{
        AskQuestionRequest, AskQuestionResponse, Envelope, ErrorResponse, EvaluateRequest,
        EvaluationResponse, GenerateQuestionRequest, SubjectList, UpdateSubjectRequest,
        UpdateSubjectResponse,
    },
};
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::{ClientError, RemoteCall},
    payload::RawQuestionPayload,
    ReflectionBackend,
};

const SUBJECTS_PATH: &str = "/matieres";
const UPDATE_SUBJECT_PATH: &str = "/matieres/update";
const ASK_QUESTION_PATH: &str = "/question";
const REFLECTION_PATH: &str = "/question/reflection";
const EVALUATION_PATH: &str = "/evaluation/response";

pub struct HttpBackend {
    http: Client,
    api_root: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, api_prefix: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("failed to build http client")?;
        Self::with_client(http, base_url, api_prefix)
    }

    pub fn with_client(http: Client, base_url: &str, api_prefix: &str) -> Result<Self> {
        let api_root = api_root(base_url, api_prefix)?;
        Ok(Self { http, api_root })
    }

    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.api_root)
    }

    async fn get<T: DeserializeOwned>(&self, call: RemoteCall, path: &str) -> Result<T, ClientError> {
        let request = self.http.get(self.endpoint(path));
        self.execute(call, request).await
    }

    async fn post<B, T>(&self, call: RemoteCall, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: serde::Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let request = self.http.post(self.endpoint(path)).json(body);
        self.execute(call, request).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        call: RemoteCall,
        request: RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = request
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| {
                warn!(call = call.as_str(), error = %err, "backend unreachable");
                ClientError::remote(call, describe_send_error(&err))
            })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|err| {
            ClientError::remote(call, format!("failed to read response body: {err}"))
        })?;
        debug!(call = call.as_str(), %status, bytes = body.len(), "backend responded");

        if !status.is_success() {
            let message = error_message(status, &body);
            warn!(call = call.as_str(), %status, %message, "backend returned error status");
            return Err(ClientError::remote(call, message));
        }

        let envelope: Envelope<T> = serde_json::from_slice(&body).map_err(|err| {
            warn!(call = call.as_str(), error = %err, "malformed backend response");
            ClientError::remote(call, format!("malformed response body: {err}"))
        })?;
        open_envelope(call, envelope)
    }
}

#[async_trait]
impl ReflectionBackend for HttpBackend {
    async fn list_subjects(&self) -> Result<Vec<SubjectId>, ClientError> {
        let list: SubjectList = self.get(RemoteCall::ListSubjects, SUBJECTS_PATH).await?;
        Ok(list.subjects)
    }

    async fn generate_question(
        &self,
        request: GenerateQuestionRequest,
    ) -> Result<RawQuestionPayload, ClientError> {
        self.post(RemoteCall::GenerateQuestion, REFLECTION_PATH, &request)
            .await
    }

    async fn evaluate_response(
        &self,
        request: EvaluateRequest,
    ) -> Result<EvaluationResponse, ClientError> {
        self.post(RemoteCall::EvaluateResponse, EVALUATION_PATH, &request)
            .await
    }

    async fn update_subject_index(
        &self,
        request: UpdateSubjectRequest,
    ) -> Result<UpdateSubjectResponse, ClientError> {
        self.post(RemoteCall::UpdateSubjectIndex, UPDATE_SUBJECT_PATH, &request)
            .await
    }

    async fn ask_question(
        &self,
        request: AskQuestionRequest,
    ) -> Result<AskQuestionResponse, ClientError> {
        self.post(RemoteCall::AskQuestion, ASK_QUESTION_PATH, &request)
            .await
    }
}

fn api_root(base_url: &str, api_prefix: &str) -> Result<String> {
    let base = Url::parse(base_url.trim())
        .with_context(|| format!("invalid backend url '{base_url}'"))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(anyhow!(
            "backend url '{base_url}' must use http or https"
        ));
    }

    let prefix = api_prefix.trim().trim_matches('/');
    let root = base.as_str().trim_end_matches('/');
    if prefix.is_empty() {
        Ok(root.to_string())
    } else {
        Ok(format!("{root}/{prefix}"))
    }
}

fn open_envelope<T>(call: RemoteCall, envelope: Envelope<T>) -> Result<T, ClientError> {
    if !envelope.success {
        let message = if envelope.message.trim().is_empty() {
            "the backend reported a failure".to_string()
        } else {
            envelope.message
        };
        return Err(ClientError::remote(call, message));
    }
    envelope
        .data
        .ok_or_else(|| ClientError::remote(call, "response carried no data"))
}

fn error_message(status: StatusCode, body: &[u8]) -> String {
    let status_line = match status.canonical_reason() {
        Some(reason) => format!("HTTP {} {reason}", status.as_u16()),
        None => format!("HTTP {}", status.as_u16()),
    };

    let Ok(parsed) = serde_json::from_slice::<ErrorResponse>(body) else {
        return status_line;
    };
    let details = parsed
        .error
        .as_ref()
        .map(|err| err.summary())
        .filter(|summary| !summary.is_empty());
    match (parsed.message.trim(), details) {
        ("", None) => status_line,
        ("", Some(details)) => details,
        (message, None) => message.to_string(),
        (message, Some(details)) => format!("{message} ({details})"),
    }
}

fn describe_send_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "the request timed out".to_string()
    } else if err.is_connect() {
        "could not connect to the backend".to_string()
    } else {
        format!("network error: {err}")
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{ConceptKey, EvaluationResult, SubjectId},
    error::ApiError,
};

/// Wrapper present on every backend response. `success: false` is a failure
/// whatever the HTTP status says.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
    #[serde(default)]
    pub timestamp: String,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: String::new(),
            data: Some(data),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }
}

/// Body returned alongside error statuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error: Option<ApiError>,
    #[serde(default)]
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubjectList {
    #[serde(rename = "matieres", default)]
    pub subjects: Vec<SubjectId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputFormat(pub String);

impl Default for OutputFormat {
    fn default() -> Self {
        Self("json".to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateQuestionRequest {
    #[serde(rename = "matiere")]
    pub subject: SubjectId,
    #[serde(rename = "concept_cle")]
    pub concept: ConceptKey,
    #[serde(rename = "output_format", default)]
    pub output_format: OutputFormat,
    #[serde(rename = "save_output")]
    pub save_output: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateRequest {
    #[serde(rename = "matiere")]
    pub subject: SubjectId,
    pub question: String,
    #[serde(rename = "student_response")]
    pub student_response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResponse {
    pub evaluation: EvaluationResult,
    #[serde(rename = "matiere", default)]
    pub subject: Option<SubjectId>,
    #[serde(default)]
    pub logs: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSubjectRequest {
    #[serde(rename = "matiere")]
    pub subject: SubjectId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSubjectResponse {
    #[serde(rename = "matiere")]
    pub subject: SubjectId,
    #[serde(default)]
    pub updated: bool,
    #[serde(rename = "documents_processed", default)]
    pub documents_processed: u64,
    #[serde(rename = "index_size", default)]
    pub index_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskQuestionRequest {
    #[serde(rename = "matiere")]
    pub subject: SubjectId,
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceExcerpt {
    #[serde(default)]
    pub document: u32,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub section: String,
    #[serde(rename = "contenu", default)]
    pub content: String,
    #[serde(default)]
    pub relevance_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskQuestionResponse {
    #[serde(rename = "response")]
    pub response_text: String,
    #[serde(default)]
    pub sources: Vec<SourceExcerpt>,
    #[serde(rename = "matiere", default)]
    pub subject: Option<SubjectId>,
    #[serde(default)]
    pub query: String,
    #[serde(rename = "processing_time", default)]
    pub processing_time: f64,
    #[serde(rename = "tokens_used", default)]
    pub tokens_used: u64,
}

use serde::{Deserialize, Serialize};

/// Error detail carried by the backend's failure envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            details: details.into(),
            field: None,
            kind: String::new(),
        }
    }

    /// One-line human summary, e.g. `VALIDATION_ERROR (matiere): unknown subject`.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        if !self.code.is_empty() {
            out.push_str(&self.code);
        }
        if let Some(field) = self.field.as_deref().filter(|f| !f.is_empty()) {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&format!("({field})"));
        }
        if !self.details.is_empty() {
            if !out.is_empty() {
                out.push_str(": ");
            }
            out.push_str(&self.details);
        }
        out
    }
}

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

macro_rules! name_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

name_newtype!(SubjectId);
name_newtype!(ConceptKey);
name_newtype!(StudentAnswer);

/// Canonical reflection question. Serializes with the backend's flat field
/// names so a canonical value can be fed back through normalization unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReflectionQuestion {
    #[serde(rename = "question")]
    pub text: String,
    #[serde(rename = "concepts_abordés", default)]
    pub concepts: Vec<String>,
    #[serde(
        rename = "niveau_difficulté",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub difficulty: Option<String>,
    #[serde(rename = "compétences_visées", default)]
    pub target_skills: Vec<String>,
    #[serde(rename = "éléments_réponse", default)]
    pub expected_elements: Vec<String>,
}

impl ReflectionQuestion {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

pub const MAX_SCORE: u8 = 100;

/// Score on the 0..=100 scale. Construction always clamps into range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Score(u8);

impl Score {
    pub fn new(value: i64) -> Self {
        Self(value.clamp(0, i64::from(MAX_SCORE)) as u8)
    }

    pub fn from_f64(value: f64) -> Self {
        if value.is_nan() {
            return Self(0);
        }
        Self(value.round().clamp(0.0, f64::from(MAX_SCORE)) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn ratio(self) -> f32 {
        f32::from(self.0) / f32::from(MAX_SCORE)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0, MAX_SCORE)
    }
}

impl<'de> Deserialize<'de> for Score {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawScore {
            Int(i64),
            Float(f64),
            Text(String),
        }

        match RawScore::deserialize(deserializer)? {
            RawScore::Int(v) => Ok(Score::new(v)),
            RawScore::Float(v) => Ok(Score::from_f64(v)),
            RawScore::Text(v) => v
                .trim()
                .parse::<f64>()
                .map(Score::from_f64)
                .map_err(|_| serde::de::Error::custom(format!("invalid score `{v}`"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EvaluationResult {
    #[serde(rename = "note", default)]
    pub score: Score,
    #[serde(rename = "points_forts", default)]
    pub strengths: Vec<String>,
    #[serde(rename = "points_ameliorer", default)]
    pub weaknesses: Vec<String>,
    #[serde(rename = "reponse_modele", default)]
    pub model_answer: String,
    #[serde(rename = "justification_note", default)]
    pub score_justification: String,
    #[serde(rename = "conseil_personnalise", default)]
    pub personalized_advice: String,
}

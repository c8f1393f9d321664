pub mod domain;
pub mod error;
pub mod protocol;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{
        domain::{EvaluationResult, ReflectionQuestion, Score},
        error::ApiError,
        protocol::{Envelope, GenerateQuestionRequest, SubjectList},
    };

    #[test]
    fn score_clamps_and_rounds() {
        assert_eq!(Score::new(-4).value(), 0);
        assert_eq!(Score::new(140).value(), 100);
        assert_eq!(Score::from_f64(86.6).value(), 87);
        assert_eq!(Score::from_f64(f64::NAN).value(), 0);
        assert_eq!(Score::new(87).to_string(), "87/100");
    }

    #[test]
    fn evaluation_decodes_french_wire_names() {
        let evaluation: EvaluationResult = serde_json::from_value(json!({
            "note": 72.4,
            "points_forts": ["structure"],
            "reponse_modele": "modèle"
        }))
        .expect("decode");
        assert_eq!(evaluation.score.value(), 72);
        assert_eq!(evaluation.strengths, vec!["structure".to_string()]);
        assert!(evaluation.weaknesses.is_empty());
        assert_eq!(evaluation.model_answer, "modèle");
        assert!(evaluation.personalized_advice.is_empty());
    }

    #[test]
    fn score_accepts_numeric_strings() {
        let evaluation: EvaluationResult =
            serde_json::from_value(json!({ "note": "55" })).expect("decode");
        assert_eq!(evaluation.score.value(), 55);
        assert!(serde_json::from_value::<EvaluationResult>(json!({ "note": "bien" })).is_err());
    }

    #[test]
    fn canonical_question_serializes_flat() {
        let question = ReflectionQuestion {
            text: "Pourquoi ?".into(),
            concepts: vec!["a".into()],
            difficulty: None,
            target_skills: Vec::new(),
            expected_elements: Vec::new(),
        };
        let value = serde_json::to_value(&question).expect("encode");
        assert_eq!(value["question"], "Pourquoi ?");
        assert_eq!(value["concepts_abordés"], json!(["a"]));
        assert!(value.get("niveau_difficulté").is_none());
    }

    #[test]
    fn envelope_tolerates_missing_data() {
        let envelope: Envelope<SubjectList> =
            serde_json::from_value(json!({ "success": false, "message": "boom" })).expect("decode");
        assert!(!envelope.success);
        assert!(envelope.data.is_none());
        assert!(envelope.parsed_timestamp().is_none());
    }

    #[test]
    fn generate_request_uses_backend_field_names() {
        let request = GenerateQuestionRequest {
            subject: "maths".into(),
            concept: "pythagore".into(),
            output_format: Default::default(),
            save_output: true,
        };
        let value = serde_json::to_value(&request).expect("encode");
        assert_eq!(
            value,
            json!({
                "matiere": "maths",
                "concept_cle": "pythagore",
                "output_format": "json",
                "save_output": true
            })
        );
    }

    #[test]
    fn api_error_summary_includes_field() {
        let mut err = ApiError::new("VALIDATION_ERROR", "unknown subject");
        err.field = Some("matiere".into());
        assert_eq!(err.summary(), "VALIDATION_ERROR (matiere): unknown subject");
        assert_eq!(ApiError::default().summary(), "");
    }
}

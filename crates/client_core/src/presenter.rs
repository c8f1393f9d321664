//! Display-ready views over canonical values. Pure: no I/O, no mutation.

use shared::domain::{EvaluationResult, ReflectionQuestion};

use crate::rich_text::{strip_controls, RichText};

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationView {
    /// `"{score}/100"`.
    pub score_label: String,
    pub score_ratio: f32,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub model_answer: RichText,
    pub score_justification: RichText,
    pub personalized_advice: RichText,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionView {
    pub text: RichText,
    pub concepts: Vec<String>,
    pub difficulty: Option<String>,
    pub target_skills: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluationPresenter;

impl EvaluationPresenter {
    pub fn present(&self, result: &EvaluationResult) -> EvaluationView {
        EvaluationView {
            score_label: result.score.to_string(),
            score_ratio: result.score.ratio(),
            strengths: non_blank(&result.strengths),
            weaknesses: non_blank(&result.weaknesses),
            model_answer: RichText::parse(&result.model_answer),
            score_justification: RichText::parse(&result.score_justification),
            personalized_advice: RichText::parse(&result.personalized_advice),
        }
    }

    /// Expected answer elements stay hidden while the student is answering.
    pub fn present_question(&self, question: &ReflectionQuestion) -> QuestionView {
        QuestionView {
            text: RichText::parse(&question.text),
            concepts: non_blank(&question.concepts),
            difficulty: question
                .difficulty
                .as_deref()
                .map(|d| strip_controls(d).trim().to_string())
                .filter(|d| !d.is_empty()),
            target_skills: non_blank(&question.target_skills),
        }
    }
}

fn non_blank(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|item| strip_controls(item).trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

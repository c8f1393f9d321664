//! Interactive reflection loop on a line-oriented terminal.

use std::io::Write;

use anyhow::{Context, Result};
use client_core::{
    presenter::{EvaluationView, QuestionView},
    rich_text::{strip_controls, RichText},
    ClientError, Completion, EvaluationPresenter, NotificationLevel, ReflectionBackend,
    ReflectionSession, SessionEvent,
};
use shared::domain::{ConceptKey, StudentAnswer, SubjectId};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::broadcast::{self, error::TryRecvError},
};
use tracing::debug;

enum AfterEvaluation {
    NewQuestion,
    Quit,
}

pub struct Console<'s, B: ReflectionBackend, R, W> {
    session: &'s ReflectionSession<B>,
    events: broadcast::Receiver<SessionEvent>,
    input: R,
    output: W,
    styled: bool,
}

impl<'s, B, R, W> Console<'s, B, R, W>
where
    B: ReflectionBackend,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(session: &'s ReflectionSession<B>, input: R, output: W, styled: bool) -> Self {
        Self {
            events: session.subscribe(),
            session,
            input,
            output,
            styled,
        }
    }

    /// Runs until the user quits or input ends.
    pub async fn run(
        &mut self,
        mut subject: Option<SubjectId>,
        mut concept: Option<ConceptKey>,
    ) -> Result<()> {
        loop {
            let chosen = match subject.take() {
                Some(subject) => subject,
                None => match self.choose_subject().await? {
                    Some(subject) => subject,
                    None => return Ok(()),
                },
            };
            let key = match concept.take() {
                Some(concept) => concept,
                None => match self.prompt("Key concept: ").await? {
                    Some(line) => ConceptKey::new(line),
                    None => return Ok(()),
                },
            };

            let generated = self.session.generate(chosen.clone(), key).await;
            self.flush_notifications()?;
            match generated {
                Ok(Completion::Applied) => {}
                Ok(_) => {
                    subject = Some(chosen);
                    continue;
                }
                Err(ClientError::Validation(_)) => continue,
                Err(err) => {
                    writeln!(self.output, "! {}", err.user_message())?;
                    self.session.reset().await;
                    subject = Some(chosen);
                    continue;
                }
            }

            if !self.show_question().await? || !self.answer_loop().await? {
                return Ok(());
            }

            match self.after_evaluation().await? {
                AfterEvaluation::NewQuestion => {
                    self.session.reset().await;
                    subject = Some(chosen);
                }
                AfterEvaluation::Quit => return Ok(()),
            }
        }
    }

    async fn choose_subject(&mut self) -> Result<Option<SubjectId>> {
        let subjects = self.session.load_subjects().await;
        self.flush_notifications()?;
        let subjects = subjects.unwrap_or_default();
        if !subjects.is_empty() {
            writeln!(self.output, "Subjects:")?;
            for (index, subject) in subjects.iter().enumerate() {
                let name = strip_controls(subject.as_str());
                writeln!(self.output, "  {}. {name}", index + 1)?;
            }
        }

        let Some(line) = self.prompt("Subject: ").await? else {
            return Ok(None);
        };
        let picked = line
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|index| subjects.get(index).cloned())
            .unwrap_or_else(|| SubjectId::new(line));
        Ok(Some(picked))
    }

    async fn show_question(&mut self) -> Result<bool> {
        let snapshot = self.session.snapshot().await;
        let Some(question) = snapshot.state.question() else {
            debug!(state = %snapshot.state.kind(), "no question to show");
            return Ok(false);
        };
        let view = EvaluationPresenter.present_question(question);
        let rendered = render_question(&view, self.styled);
        writeln!(self.output, "\n{rendered}\n")?;
        Ok(true)
    }

    /// Returns `false` when input ended before the answer was settled.
    async fn answer_loop(&mut self) -> Result<bool> {
        let mut answer = match self.read_answer().await? {
            Some(answer) => answer,
            None => return Ok(false),
        };
        loop {
            let submitted = self.session.submit(answer.clone()).await;
            self.flush_notifications()?;
            match submitted {
                Ok(Completion::Applied) => break,
                Ok(_) => {
                    let retry = self
                        .prompt("Resubmit the same answer? [Y/n] ")
                        .await?;
                    match retry.as_deref() {
                        None => return Ok(false),
                        Some(choice) if is_no(choice) => {
                            answer = match self.read_answer().await? {
                                Some(answer) => answer,
                                None => return Ok(false),
                            };
                        }
                        Some(_) => answer = self.session.snapshot().await.draft,
                    }
                }
                Err(ClientError::Validation(_)) => {
                    answer = match self.read_answer().await? {
                        Some(answer) => answer,
                        None => return Ok(false),
                    };
                }
                Err(err) => {
                    writeln!(self.output, "! {}", err.user_message())?;
                    return Ok(true);
                }
            }
        }

        let snapshot = self.session.snapshot().await;
        if let Some(result) = snapshot.state.evaluation() {
            let view = EvaluationPresenter.present(result);
            let rendered = render_evaluation(&view, self.styled);
            writeln!(self.output, "\n{rendered}\n")?;
        }
        Ok(true)
    }

    async fn read_answer(&mut self) -> Result<Option<StudentAnswer>> {
        writeln!(self.output, "Your answer (finish with an empty line):")?;
        self.output.flush()?;
        let mut lines = Vec::new();
        loop {
            match self.read_line().await? {
                Some(line) if line.trim().is_empty() => break,
                Some(line) => lines.push(line),
                None if lines.is_empty() => return Ok(None),
                None => break,
            }
        }
        Ok(Some(StudentAnswer::new(lines.join("\n"))))
    }

    async fn after_evaluation(&mut self) -> Result<AfterEvaluation> {
        loop {
            match self.prompt("[n]ew question or [q]uit: ").await? {
                None => return Ok(AfterEvaluation::Quit),
                Some(choice) => match choice.to_ascii_lowercase().as_str() {
                    "n" | "new" => return Ok(AfterEvaluation::NewQuestion),
                    "q" | "quit" => return Ok(AfterEvaluation::Quit),
                    _ => continue,
                },
            }
        }
    }

    async fn prompt(&mut self, label: &str) -> Result<Option<String>> {
        write!(self.output, "{label}")?;
        self.output.flush()?;
        Ok(self.read_line().await?.map(|line| line.trim().to_string()))
    }

    async fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .await
            .context("failed to read from input")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn flush_notifications(&mut self) -> Result<()> {
        loop {
            match self.events.try_recv() {
                Ok(SessionEvent::Notification(notification)) => {
                    let marker = match notification.level {
                        NotificationLevel::Info => "*",
                        NotificationLevel::Error => "!",
                    };
                    let message = strip_controls(&notification.message);
                    writeln!(self.output, "{marker} {message}")?;
                }
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => {
                    debug!(skipped, "session events lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return Ok(()),
            }
        }
    }
}

fn is_no(choice: &str) -> bool {
    matches!(choice.to_ascii_lowercase().as_str(), "n" | "no")
}

fn rich(text: &RichText, styled: bool) -> String {
    if styled {
        text.to_ansi()
    } else {
        text.to_plain()
    }
}

fn bullet_list(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("\n{title}:\n"));
    for item in items {
        out.push_str(&format!("  - {item}\n"));
    }
}

pub fn render_question(view: &QuestionView, styled: bool) -> String {
    let mut out = rich(&view.text, styled);
    if let Some(difficulty) = &view.difficulty {
        out.push_str(&format!("\n\nDifficulty: {difficulty}"));
    }
    if !view.concepts.is_empty() {
        out.push_str(&format!("\nConcepts: {}", view.concepts.join(", ")));
    }
    if !view.target_skills.is_empty() {
        out.push_str(&format!("\nSkills: {}", view.target_skills.join(", ")));
    }
    out
}

pub fn render_evaluation(view: &EvaluationView, styled: bool) -> String {
    let mut out = format!("Score: {}", view.score_label);
    out.push('\n');
    bullet_list(&mut out, "Strengths", &view.strengths);
    bullet_list(&mut out, "To improve", &view.weaknesses);
    for (title, text) in [
        ("Model answer", &view.model_answer),
        ("Why this score", &view.score_justification),
        ("Advice", &view.personalized_advice),
    ] {
        if !text.is_empty() {
            out.push_str(&format!("\n{title}:\n{}\n", rich(text, styled)));
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
#[path = "tests/console_tests.rs"]
mod tests;

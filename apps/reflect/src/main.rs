use std::{
    io::{self, IsTerminal},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    rich_text::{strip_controls, RichText},
    ClientError, HttpBackend, ReflectionSession, SessionOptions,
};
use shared::domain::{ConceptKey, SubjectId};
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod console;

use config::load_settings;
use console::Console;

#[derive(Parser, Debug)]
#[command(name = "reflect", about = "Guided reflection questions from a course knowledge base")]
struct Args {
    /// Overrides the configured backend url.
    #[arg(long, global = true)]
    backend_url: Option<String>,
    /// TOML settings file (default: ./reflect.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the subjects known to the backend.
    Subjects,
    /// Ask a plain question against a subject's documents.
    Ask {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        query: String,
    },
    /// Rebuild the document index of a subject.
    Update {
        #[arg(long)]
        subject: String,
    },
    /// Interactive question, answer and evaluation loop (default).
    Reflect {
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        concept: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let loaded = load_settings(args.config.as_deref());
    let mut settings = loaded.settings;
    if let Some(url) = args.backend_url {
        settings.backend_url = url;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    for warning in &loaded.warnings {
        warn!("{warning}");
    }

    let backend = HttpBackend::new(
        &settings.backend_url,
        &settings.api_prefix,
        settings.request_timeout(),
    )?;
    info!(api_root = backend.api_root(), "using reasoning backend");
    let session = ReflectionSession::with_options(
        Arc::new(backend),
        SessionOptions {
            save_output: settings.save_output,
        },
    );
    let styled = io::stdout().is_terminal();

    match args.command.unwrap_or(Command::Reflect {
        subject: None,
        concept: None,
    }) {
        Command::Subjects => {
            let subjects = session
                .load_subjects()
                .await
                .map_err(printable)
                .context("could not list subjects")?;
            for subject in subjects {
                println!("{}", strip_controls(subject.as_str()));
            }
        }
        Command::Ask { subject, query } => {
            let answer = session
                .ask_question(SubjectId::new(subject), query)
                .await
                .map_err(printable)
                .context("question failed")?;
            let text = RichText::parse(&answer.response_text);
            println!("{}", if styled { text.to_ansi() } else { text.to_plain() });
            if !answer.sources.is_empty() {
                println!("\nSources:");
                for source in &answer.sources {
                    let relevance = source
                        .relevance_score
                        .map(|score| format!(" ({score:.2})"))
                        .unwrap_or_default();
                    println!(
                        "  [{}] {} / {}{relevance}",
                        source.document,
                        strip_controls(&source.source),
                        strip_controls(&source.section)
                    );
                }
            }
            info!(
                processing_time = answer.processing_time,
                tokens_used = answer.tokens_used,
                "question answered"
            );
        }
        Command::Update { subject } => {
            let report = session
                .update_subject_index(SubjectId::new(subject))
                .await
                .map_err(printable)
                .context("index update failed")?;
            println!(
                "{}: {} documents processed, index size {}",
                strip_controls(report.subject.as_str()),
                report.documents_processed,
                report.index_size
            );
        }
        Command::Reflect { subject, concept } => {
            let stdin = BufReader::new(tokio::io::stdin());
            let mut console = Console::new(&session, stdin, io::stdout(), styled);
            console
                .run(subject.map(SubjectId::new), concept.map(ConceptKey::new))
                .await?;
        }
    }

    Ok(())
}

/// Error messages can carry backend text; strip terminal controls before printing.
fn printable(err: ClientError) -> anyhow::Error {
    anyhow!(strip_controls(&err.to_string()))
}

// src/main.rs

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use exam_session::{
    SessionManager, SessionNotice,
    backend::HttpBackend,
    clock::SystemClock,
    config::Config,
    events::{ChannelEventSource, EnvironmentSignal, InteractionKind, SignalEmitter},
    logging,
    models::exam::{SubmitResult, SubmitTrigger},
    store::{FileStore, KeyValueStore, SnapshotStore},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

/// Headless runner for a timed exam session.
#[derive(Parser)]
#[command(name = "exam-runner", version, about)]
struct Cli {
    /// Exam to start or resume.
    exam_id: i64,

    /// Discard locally stored progress for this exam before starting.
    #[arg(long)]
    fresh: bool,
}

const HELP: &str = "commands: answer <question-id> <option> | clear <question-id> | flag <question-id> \
| goto <n> | next | prev | show | status | submit | quit | abandon";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let _guard = logging::init(&config);

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "exam-runner failed");
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: Config) -> Result<(), Box<dyn Error>> {
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&config.snapshot_dir)?);
    if cli.fresh {
        SnapshotStore::new(Arc::clone(&store)).clear(cli.exam_id)?;
    }

    let backend = HttpBackend::new(
        config.api_url.clone(),
        config.api_token.clone(),
        config.http_timeout,
    )?;
    let source = Arc::new(ChannelEventSource::new());
    let emitter = source.emitter();

    let manager = SessionManager::new(
        config.session.clone(),
        Arc::new(backend),
        store,
        source,
        Arc::new(SystemClock),
    );
    let mut notices = manager.subscribe();

    let started = manager.start(cli.exam_id).await?;
    println!(
        "{} exam {}: {} questions, {} left",
        if started.resumed { "Resumed" } else { "Started" },
        cli.exam_id,
        started.question_count,
        format_remaining(started.remaining_seconds)
    );
    if manager.fullscreen_prompt_pending() {
        println!("Please keep this window in the foreground for the whole exam.");
    }
    println!("{}", HELP);
    show_current(&manager);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    manager.detach();
                    println!("Input closed, progress kept locally.");
                    return Ok(());
                };
                if !handle_line(&manager, &emitter, line.trim()).await {
                    return Ok(());
                }
            }
            notice = notices.recv() => {
                match notice {
                    Ok(notice) => {
                        if !handle_notice(notice) {
                            return Ok(());
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Notice receiver lagged");
                    }
                    Err(RecvError::Closed) => return Ok(()),
                }
            }
        }
    }
}

/// Returns false when the runner should exit.
async fn handle_line(manager: &SessionManager, emitter: &SignalEmitter, line: &str) -> bool {
    emitter.emit(EnvironmentSignal::Interaction(InteractionKind::Keyboard));

    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let question_id = |arg: Option<&str>| arg.and_then(|s| s.parse::<i64>().ok());

    match command {
        "" => {}
        "answer" => {
            let id = question_id(parts.next());
            let option = parts.collect::<Vec<_>>().join(" ");
            match id {
                Some(id) if !option.is_empty() => report(manager.set_answer(id, &option)),
                _ => println!("usage: answer <question-id> <option>"),
            }
        }
        "clear" => match question_id(parts.next()) {
            Some(id) => report(manager.clear_answer(id).map(|_| ())),
            None => println!("usage: clear <question-id>"),
        },
        "flag" => match question_id(parts.next()) {
            Some(id) => match manager.toggle_flag(id) {
                Ok(true) => println!("Question {} flagged.", id),
                Ok(false) => println!("Question {} unflagged.", id),
                Err(e) => println!("{}", e),
            },
            None => println!("usage: flag <question-id>"),
        },
        "goto" => match parts.next().and_then(|s| s.parse::<usize>().ok()) {
            Some(n) if n >= 1 && manager.go_to(n - 1) => show_current(manager),
            _ => println!("No such question."),
        },
        "next" => {
            if manager.next() {
                show_current(manager);
            }
        }
        "prev" => {
            if manager.previous() {
                show_current(manager);
            }
        }
        "show" => show_current(manager),
        "status" => show_status(manager),
        "submit" => match manager.submit(SubmitTrigger::Manual).await {
            Ok(result) => {
                show_result(&result);
                return false;
            }
            Err(e) => println!("{}", e),
        },
        "quit" => {
            manager.detach();
            println!("Progress kept locally, run again to resume.");
            return false;
        }
        "abandon" => {
            manager.abandon();
            println!("Attempt abandoned.");
            return false;
        }
        _ => println!("{}", HELP),
    }
    true
}

/// Returns false when the runner should exit.
fn handle_notice(notice: SessionNotice) -> bool {
    match notice {
        SessionNotice::LowTime {
            remaining_seconds, ..
        } => println!("{} left.", format_remaining(remaining_seconds)),
        SessionNotice::Expired => println!("Time is up, submitting..."),
        SessionNotice::Submitted { result } => {
            show_result(&result);
            return false;
        }
        SessionNotice::SubmissionFailed { trigger, message } => {
            println!("Submission ({}) failed: {}. Your answers are kept.", trigger, message);
        }
        SessionNotice::LocalSaveFailed { message } => {
            println!("Warning: progress could not be saved locally ({}).", message);
        }
        SessionNotice::Security { event } => {
            println!("Recorded: {}", event.event_type().as_str());
        }
        SessionNotice::Tick { .. } | SessionNotice::Saved { .. } => {}
    }
    true
}

fn report(outcome: Result<(), exam_session::error::ActionError>) {
    match outcome {
        Ok(()) => println!("Saved."),
        Err(e) => println!("{}", e),
    }
}

fn show_current(manager: &SessionManager) {
    let (Some(question), Some(progress)) = (manager.current_question(), manager.progress()) else {
        return;
    };
    let session = manager.session();
    let chosen = session
        .as_ref()
        .and_then(|s| s.answers().get(&question.id).cloned());
    let flagged = session
        .as_ref()
        .is_some_and(|s| s.flagged_question_ids().contains(&question.id));

    println!(
        "[{}/{}] #{}{} {}",
        progress.current_index + 1,
        progress.total,
        question.id,
        if flagged { " (flagged)" } else { "" },
        question.content
    );
    for option in &question.options {
        let mark = if chosen.as_deref() == Some(option.as_str()) { "*" } else { " " };
        println!("  {} {}", mark, option);
    }
}

fn show_status(manager: &SessionManager) {
    let Some(progress) = manager.progress() else {
        println!("No active session.");
        return;
    };
    println!(
        "{} left, {}/{} answered, {} flagged",
        format_remaining(manager.remaining_seconds().unwrap_or(0)),
        progress.answered,
        progress.total,
        progress.flagged
    );
    if !progress.unanswered.is_empty() {
        let ids: Vec<String> = progress.unanswered.iter().map(|id| id.to_string()).collect();
        println!("Unanswered: {}", ids.join(", "));
    }
}

fn show_result(result: &SubmitResult) {
    println!(
        "Score {:.1} ({}/{} correct){}",
        result.score,
        result.correct_count,
        result.total_questions,
        if result.passed { ", passed" } else { "" }
    );
    if !result.message.is_empty() {
        println!("{}", result.message);
    }
    for review in &result.review {
        println!(
            "  #{}: correct {}, yours {}",
            review.question_id,
            review.correct_answer,
            review.your_answer.as_deref().unwrap_or("-")
        );
        if let Some(explanation) = &review.explanation {
            println!("      {}", explanation);
        }
    }
}

fn format_remaining(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

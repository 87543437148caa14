use std::io::{BufRead, Write};

use tokio::sync::mpsc;

use crate::api::client::QuizApi;
use crate::api::errors::ApiError;
use crate::core::time::format_remaining;
use crate::schemas::quiz::{QuizConfig, SubmissionResult};
use crate::services::navigator::PrimaryAction;
use crate::services::quiz_session::{FlowEnd, QuestionView, QuizEvent, QuizView};
use crate::services::submission::SubmitTrigger;

/// Commands that only take effect after a `y` answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Submit,
    Quit,
}

impl Pending {
    fn prompt(self) -> &'static str {
        match self {
            Self::Submit => "Submit your answers now? [y/N]",
            Self::Quit => "Leave the quiz? Answers recorded so far will be submitted. [y/N]",
        }
    }

    fn event(self) -> QuizEvent {
        match self {
            Self::Submit => QuizEvent::Submit,
            Self::Quit => QuizEvent::Abandon,
        }
    }

    fn cancelled(self) -> &'static str {
        match self {
            Self::Submit => "Submission cancelled.",
            Self::Quit => "Continuing the quiz.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Event(QuizEvent),
    Confirm(Pending),
    Help,
    Unknown(String),
}

#[derive(Debug, PartialEq, Eq)]
enum Reply {
    Send(QuizEvent),
    Say(String),
    Nothing,
}

fn parse_command(line: &str) -> Option<Command> {
    let command = line.trim().to_ascii_lowercase();
    if command.is_empty() {
        return None;
    }

    if let Ok(number) = command.parse::<usize>() {
        return Some(Command::Event(QuizEvent::Select(number)));
    }

    let parsed = match command.as_str() {
        "n" | "next" => Command::Event(QuizEvent::Next),
        "p" | "prev" | "previous" => Command::Event(QuizEvent::Previous),
        "r" | "reload" => Command::Event(QuizEvent::Reload),
        "s" | "submit" => Command::Confirm(Pending::Submit),
        "q" | "quit" => Command::Confirm(Pending::Quit),
        "h" | "help" | "?" => Command::Help,
        _ => Command::Unknown(command),
    };
    Some(parsed)
}

const HELP: &str = "Commands: 1-4 select an option, n next, p previous, r reload, s submit, q quit";

#[derive(Debug, Default)]
struct InputState {
    pending: Option<Pending>,
}

impl InputState {
    fn feed(&mut self, line: &str) -> Reply {
        if let Some(pending) = self.pending.take() {
            let answer = line.trim().to_ascii_lowercase();
            if matches!(answer.as_str(), "y" | "yes") {
                return Reply::Send(pending.event());
            }
            return Reply::Say(pending.cancelled().to_string());
        }

        match parse_command(line) {
            None => Reply::Nothing,
            Some(Command::Event(event)) => Reply::Send(event),
            Some(Command::Confirm(pending)) => {
                self.pending = Some(pending);
                Reply::Say(pending.prompt().to_string())
            }
            Some(Command::Help) => Reply::Say(HELP.to_string()),
            Some(Command::Unknown(command)) => {
                Reply::Say(format!("Unknown command '{command}'. {HELP}"))
            }
        }
    }
}

/// Reads commands on a dedicated thread so a pending read never holds up shutdown.
/// Submitting and quitting both need a `y` to confirm.
pub(crate) fn spawn_input(events: mpsc::Sender<QuizEvent>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut state = InputState::default();

        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };

            match state.feed(&line) {
                Reply::Send(event) => {
                    if events.blocking_send(event).is_err() {
                        break;
                    }
                }
                Reply::Say(message) => println!("{message}"),
                Reply::Nothing => {}
            }
        }
        tracing::debug!("quiz input closed");
    });
}

pub(crate) struct ConsoleView<W: Write> {
    out: W,
}

impl<W: Write> ConsoleView<W> {
    pub(crate) fn new(out: W) -> Self {
        Self { out }
    }

    fn write_lines(&mut self, lines: &[String]) {
        for line in lines {
            if let Err(err) = writeln!(self.out, "{line}") {
                tracing::warn!(error = %err, "Failed to write to console");
                return;
            }
        }
        let _ = self.out.flush();
    }
}

impl<W: Write> QuizView for ConsoleView<W> {
    fn show_intro(&mut self, config: &QuizConfig) {
        let mut lines = vec![format!(
            "{}: {} question(s), {} minute(s)",
            config.quiz_title, config.total_questions, config.total_time_minutes
        )];
        if !config.description.trim().is_empty() {
            lines.push(config.description.trim().to_string());
        }
        lines.push(HELP.to_string());
        self.write_lines(&lines);
    }

    fn show_question(&mut self, view: QuestionView<'_>) {
        let mut lines = vec![
            String::new(),
            format!(
                "Question {} of {}  [{} left]",
                view.index,
                view.total,
                format_remaining(view.remaining)
            ),
            view.question.text.clone(),
        ];
        for (position, option) in view.question.options().into_iter().enumerate() {
            let marker = if view.selected == Some(option) { "*" } else { " " };
            lines.push(format!(" {marker} {}) {option}", position + 1));
        }
        lines.push(match view.action {
            PrimaryAction::Next => "[n] next  [p] previous".to_string(),
            PrimaryAction::Submit => "[s] submit  [p] previous".to_string(),
        });
        self.write_lines(&lines);
    }

    fn show_remaining(&mut self, seconds: u64) {
        if seconds % 60 == 0 || seconds <= 10 {
            self.write_lines(&[format!("Time left: {}", format_remaining(seconds))]);
        }
    }

    fn show_notice(&mut self, message: &str) {
        self.write_lines(&[format!("! {message}")]);
    }
}

pub(crate) fn describe_end(end: &FlowEnd, route: Option<&str>) -> Vec<String> {
    let mut lines = match end {
        FlowEnd::Submitted(report) => {
            let mut lines = Vec::new();
            if report.trigger == SubmitTrigger::TimerExpired {
                lines.push("Time is up.".to_string());
            }
            if report.is_complete() {
                lines.push(format!("Submitted {} answer(s).", report.posted.len()));
            } else if report.advisory {
                lines.push(format!(
                    "Quiz abandoned. {} of {} answer(s) were sent before closing.",
                    report.posted.len(),
                    report.attempted
                ));
            } else {
                lines.push(format!(
                    "Submission incomplete: {} of {} answer(s) were accepted.",
                    report.posted.len(),
                    report.attempted
                ));
            }
            if let Some(failure) = &report.failure {
                lines.push(format!(
                    "Sending stopped at question {}: {}",
                    failure.question_id,
                    failure.error.user_message()
                ));
            }
            lines
        }
        FlowEnd::AlreadyAttempted { message } => vec![message
            .clone()
            .unwrap_or_else(|| "You have already attempted this quiz.".to_string())],
        FlowEnd::NotAvailable { status, .. } => {
            vec![ApiError::NotAvailable(status.describe().to_string()).user_message()]
        }
        FlowEnd::Unauthorized => vec!["Your session has expired. Please log in again.".to_string()],
        FlowEnd::Failed(err) => vec![err.user_message()],
    };

    if let Some(route) = route {
        lines.push(format!("Continue at {route}"));
    }
    lines
}

pub(crate) fn describe_results(result: &SubmissionResult) -> Vec<String> {
    let mut lines = vec![match result.max_marks {
        Some(max) => format!("Score: {} / {}", result.total_marks, max),
        None => format!("Score: {}", result.total_marks),
    }];
    for outcome in &result.answers {
        let verdict = if outcome.is_correct { "correct" } else { "incorrect" };
        lines.push(format!("  question {}: {verdict}", outcome.question_id));
    }
    lines
}

/// A failed lookup is reported to the student; the quiz itself is already over.
pub(crate) async fn fetch_results(api: &dyn QuizApi, student_id: &str) -> Vec<String> {
    match api.results(student_id).await {
        Ok(result) => describe_results(&result),
        Err(err) => {
            tracing::warn!(student_id = %student_id, error = %err, "Failed to fetch quiz results");
            vec![format!("Results are not available right now. {}", err.user_message())]
        }
    }
}

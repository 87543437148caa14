use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::api::client::QuizApi;
use crate::api::errors::ApiError;
use crate::core::session::AuthContext;
use crate::core::state::AppState;
use crate::core::time::now_utc;
use crate::schemas::quiz::{Question, QuizConfig};
use crate::services::countdown::{self, Countdown, Tick};
use crate::services::navigator::{LoadTicket, NavigationError, PrimaryAction, QuestionNavigator};
use crate::services::quiz_gate::{resolve_and_check, GateOutcome, ResolvedQuiz};
use crate::services::quiz_window::WindowStatus;
use crate::services::submission::{
    SubmissionOrchestrator, SubmissionReport, SubmissionTarget, SubmitTrigger,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QuizPhase {
    InProgress,
    Submitting,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum QuizEvent {
    /// 1-based option number of the displayed question.
    Select(usize),
    Next,
    Previous,
    Reload,
    Submit,
    Abandon,
}

#[derive(Debug)]
pub(crate) enum Step {
    Idle,
    Render,
    Load(LoadTicket),
    Remaining(u64),
    Rejected(NavigationError),
    Notice(String),
    Unauthorized,
    Submit(SubmitTrigger),
}

/// One student's pass through a quiz. Owns the navigator (and so the answers) and the
/// countdown; submission is requested at most once.
#[derive(Debug)]
pub(crate) struct QuizSession {
    target: SubmissionTarget,
    navigator: QuestionNavigator,
    countdown: Countdown,
    phase: QuizPhase,
}

impl QuizSession {
    pub(crate) fn start(resolved: ResolvedQuiz) -> (Self, LoadTicket) {
        let mut navigator =
            QuestionNavigator::new(resolved.course_id.clone(), resolved.config.total_questions);
        let first = navigator.begin_load(1);
        let session = Self {
            target: SubmissionTarget {
                course_id: resolved.course_id,
                student_id: resolved.student_id,
            },
            countdown: Countdown::new(resolved.config.time_budget_seconds()),
            navigator,
            phase: QuizPhase::InProgress,
        };
        (session, first)
    }

    pub(crate) fn phase(&self) -> QuizPhase {
        self.phase
    }

    pub(crate) fn navigator(&self) -> &QuestionNavigator {
        &self.navigator
    }

    pub(crate) fn remaining(&self) -> u64 {
        self.countdown.remaining()
    }

    pub(crate) fn target(&self) -> &SubmissionTarget {
        &self.target
    }

    pub(crate) fn handle(&mut self, event: QuizEvent) -> Step {
        if self.phase != QuizPhase::InProgress {
            return Step::Idle;
        }

        match event {
            QuizEvent::Select(number) => match self.navigator.select_option(number) {
                Ok(()) => Step::Render,
                Err(err) => Step::Rejected(err),
            },
            QuizEvent::Next => match self.navigator.next() {
                Ok(ticket) => Step::Load(ticket),
                Err(err) => Step::Rejected(err),
            },
            QuizEvent::Previous => Step::Load(self.navigator.previous()),
            QuizEvent::Reload => Step::Load(self.navigator.reload()),
            QuizEvent::Submit => match self.navigator.can_submit() {
                Ok(()) => self.begin_submit(SubmitTrigger::Manual),
                Err(err) => Step::Rejected(err),
            },
            QuizEvent::Abandon => self.begin_submit(SubmitTrigger::Abandoned),
        }
    }

    pub(crate) fn tick(&mut self) -> Step {
        if self.phase != QuizPhase::InProgress {
            return Step::Idle;
        }

        match self.countdown.tick() {
            Tick::Running(remaining) => Step::Remaining(remaining),
            Tick::Expired => self.begin_submit(SubmitTrigger::TimerExpired),
            Tick::Stopped => Step::Idle,
        }
    }

    pub(crate) fn question_loaded(
        &mut self,
        ticket: LoadTicket,
        result: Result<Question, ApiError>,
    ) -> Step {
        if self.phase != QuizPhase::InProgress {
            return Step::Idle;
        }

        match result {
            Ok(question) => {
                if self.navigator.apply_loaded(ticket, question) {
                    Step::Render
                } else {
                    Step::Idle
                }
            }
            Err(_) if !self.navigator.is_latest(ticket) => Step::Idle,
            Err(err) if err.is_auth_failure() => Step::Unauthorized,
            Err(err) => {
                tracing::warn!(index = ticket.index, error = %err, "Failed to load question");
                Step::Notice(err.user_message())
            }
        }
    }

    fn begin_submit(&mut self, trigger: SubmitTrigger) -> Step {
        tracing::info!(
            trigger = trigger.as_str(),
            index = self.navigator.current_index(),
            answered = self.navigator.answers().len(),
            "Quiz submission requested"
        );
        self.phase = QuizPhase::Submitting;
        Step::Submit(trigger)
    }

    fn finish(&mut self) {
        self.phase = QuizPhase::Done;
    }
}

pub(crate) struct QuestionView<'a> {
    pub(crate) index: u32,
    pub(crate) total: u32,
    pub(crate) question: &'a Question,
    pub(crate) selected: Option<&'a str>,
    pub(crate) action: PrimaryAction,
    pub(crate) remaining: u64,
}

/// Presentation of a running quiz.
pub(crate) trait QuizView {
    fn show_intro(&mut self, config: &QuizConfig);

    fn show_question(&mut self, view: QuestionView<'_>);

    fn show_remaining(&mut self, seconds: u64);

    fn show_notice(&mut self, message: &str);
}

#[derive(Debug)]
pub(crate) enum FlowEnd {
    Submitted(SubmissionReport),
    AlreadyAttempted { message: Option<String> },
    NotAvailable { status: WindowStatus, results_link: String },
    Unauthorized,
    Failed(ApiError),
}

type LoadResult = (LoadTicket, Result<Question, ApiError>);

#[derive(Clone)]
pub(crate) struct QuizFlow {
    api: Arc<dyn QuizApi>,
    auth: Arc<dyn AuthContext>,
    orchestrator: SubmissionOrchestrator,
    tick_period: Duration,
    results_url: String,
    login_url: String,
}

impl QuizFlow {
    pub(crate) fn new(state: &AppState) -> Self {
        let settings = state.settings();
        Self {
            api: state.api(),
            auth: state.auth(),
            orchestrator: SubmissionOrchestrator::from_settings(state.api(), settings),
            tick_period: settings.quiz().tick_period(),
            results_url: settings.routes().results_url.clone(),
            login_url: settings.routes().login_url.clone(),
        }
    }

    /// Where the student goes once the flow has ended.
    pub(crate) fn route_for<'a>(&'a self, end: &'a FlowEnd) -> Option<&'a str> {
        match end {
            FlowEnd::Submitted(_) | FlowEnd::AlreadyAttempted { .. } => Some(&self.results_url),
            FlowEnd::NotAvailable { results_link, .. } => Some(results_link),
            FlowEnd::Unauthorized => Some(&self.login_url),
            FlowEnd::Failed(_) => None,
        }
    }

    /// Runs the quiz until it is submitted or cannot be entered. `abandon` resolving, or the
    /// event stream closing, forces a best-effort submission of what has been answered.
    pub(crate) async fn run<V, F>(
        &self,
        view: &mut V,
        mut events: mpsc::Receiver<QuizEvent>,
        abandon: F,
    ) -> FlowEnd
    where
        V: QuizView,
        F: Future<Output = ()>,
    {
        let Some(student_id) = self.auth.current_user() else {
            tracing::warn!("No signed-in student; routing to login");
            return FlowEnd::Unauthorized;
        };

        let gate =
            resolve_and_check(self.api.as_ref(), &student_id, now_utc(), &self.results_url).await;
        let resolved = match gate {
            Ok(GateOutcome::Enter(resolved)) => resolved,
            Ok(GateOutcome::RedirectToResults { message }) => {
                return FlowEnd::AlreadyAttempted { message };
            }
            Ok(GateOutcome::NotAvailable { status, results_link }) => {
                return FlowEnd::NotAvailable { status, results_link };
            }
            Err(err) => return self.fail(err),
        };

        tracing::info!(
            course_id = %resolved.course_id,
            quiz = %resolved.config.quiz_title,
            questions = resolved.config.total_questions,
            minutes = resolved.config.total_time_minutes,
            "Quiz started"
        );
        view.show_intro(&resolved.config);

        let (mut session, first) = QuizSession::start(resolved);
        let mut loads: JoinSet<LoadResult> = JoinSet::new();
        self.spawn_load(&mut loads, session.navigator().course_id(), first);

        let mut ticker = countdown::ticker(self.tick_period);
        view.show_remaining(session.remaining());
        tokio::pin!(abandon);

        let trigger = loop {
            let step = tokio::select! {
                _ = &mut abandon => session.handle(QuizEvent::Abandon),
                _ = ticker.tick() => session.tick(),
                Some(joined) = loads.join_next() => match joined {
                    Ok((ticket, result)) => session.question_loaded(ticket, result),
                    Err(err) => {
                        tracing::error!(error = %err, "Question fetch task failed");
                        Step::Idle
                    }
                },
                event = events.recv() => session.handle(event.unwrap_or(QuizEvent::Abandon)),
            };

            match step {
                Step::Submit(trigger) => break trigger,
                Step::Load(ticket) => {
                    self.spawn_load(&mut loads, session.navigator().course_id(), ticket);
                }
                Step::Render => render(view, &session),
                Step::Remaining(seconds) => view.show_remaining(seconds),
                Step::Rejected(err) => view.show_notice(&err.to_string()),
                Step::Notice(message) => view.show_notice(&message),
                Step::Unauthorized => {
                    self.auth.on_unauthorized();
                    return FlowEnd::Unauthorized;
                }
                Step::Idle => {}
            }
        };

        loads.abort_all();
        drop(ticker);

        let report =
            self.orchestrator.submit(session.target(), session.navigator().answers(), trigger).await;
        session.finish();
        tracing::debug!(
            phase = ?session.phase(),
            posted = report.posted.len(),
            complete = report.is_complete(),
            "Quiz session closed"
        );

        if let Some(failure) = &report.failure {
            if failure.error.is_auth_failure() {
                self.auth.on_unauthorized();
            }
            view.show_notice(&failure.error.user_message());
        }

        FlowEnd::Submitted(report)
    }

    fn fail(&self, err: ApiError) -> FlowEnd {
        if err.is_auth_failure() {
            self.auth.on_unauthorized();
            return FlowEnd::Unauthorized;
        }
        tracing::error!(error = %err, "Quiz could not be started");
        FlowEnd::Failed(err)
    }

    fn spawn_load(&self, loads: &mut JoinSet<LoadResult>, course_id: &str, ticket: LoadTicket) {
        let api = Arc::clone(&self.api);
        let course_id = course_id.to_string();
        loads.spawn(async move {
            let result = api.question(&course_id, ticket.index).await;
            (ticket, result)
        });
    }
}

fn render<V: QuizView>(view: &mut V, session: &QuizSession) {
    let navigator = session.navigator();
    let Some(question) = navigator.current() else {
        return;
    };
    view.show_question(QuestionView {
        index: navigator.current_index(),
        total: navigator.total(),
        question,
        selected: navigator.selected_answer(),
        action: navigator.primary_action(),
        remaining: session.remaining(),
    });
}

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use time::{macros::datetime, OffsetDateTime};
use tokio::sync::{mpsc, oneshot, Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::api::client::QuizApi;
use crate::api::errors::ApiError;
use crate::core::config::Settings;
use crate::core::session::StaticSession;
use crate::core::state::AppState;
use crate::schemas::quiz::{
    AnswerOutcome, AttemptStatus, Question, QuestionId, QuizConfig, StudentCourse, StudentRecord,
    SubmissionResult, ValidateAnswerRequest,
};
use crate::services::quiz_session::{QuestionView, QuizEvent, QuizView};

const TEST_COURSE_ID: &str = "7";

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn clear_quiz_env() {
    for (key, _) in std::env::vars() {
        if key.starts_with("QUIZ_") {
            std::env::remove_var(key);
        }
    }
    std::env::remove_var("ENVIRONMENT");
}

pub(crate) fn fixed_time() -> OffsetDateTime {
    datetime!(2026-03-02 09:00 UTC)
}

pub(crate) fn quiz_config(
    total_questions: u32,
    total_time_minutes: u32,
    start_time: OffsetDateTime,
    end_time: OffsetDateTime,
    is_active: bool,
) -> QuizConfig {
    QuizConfig {
        course_id: TEST_COURSE_ID.to_string(),
        quiz_title: "Midterm".to_string(),
        description: String::new(),
        total_questions,
        total_time_minutes,
        start_time,
        end_time,
        is_active,
    }
}

/// Question at `position` carries id `100 + position` and options `A` to `D`.
pub(crate) fn question(position: u32) -> Question {
    Question {
        id: 100 + QuestionId::from(position),
        position: Some(position),
        total_questions: None,
        text: format!("Question {position}"),
        option1: Some("A".to_string()),
        option2: Some("B".to_string()),
        option3: Some("C".to_string()),
        option4: Some("D".to_string()),
    }
}

pub(crate) fn app_state(api: Arc<FakeQuizApi>) -> AppState {
    let settings = Settings::for_tests("http://127.0.0.1:9");
    let session =
        Arc::new(StaticSession::new(Some("test-token".to_string()), Some("42".to_string())));
    AppState::new(settings, api, session)
}

/// In-memory platform for service-level tests. Calls are recorded in order.
pub(crate) struct FakeQuizApi {
    config: Option<QuizConfig>,
    attempt: AttemptStatus,
    unauthorized: bool,
    rejected: Option<QuestionId>,
    transient_failures: AtomicU32,
    validation_delay: Option<Duration>,
    results_unavailable: bool,
    calls: StdMutex<Vec<String>>,
    validations: StdMutex<Vec<ValidateAnswerRequest>>,
}

impl FakeQuizApi {
    pub(crate) fn with_questions(total: u32, start: OffsetDateTime, end: OffsetDateTime) -> Self {
        Self {
            config: Some(quiz_config(total, 30, start, end, true)),
            attempt: AttemptStatus { is_eligible: true, message: None },
            unauthorized: false,
            rejected: None,
            transient_failures: AtomicU32::new(0),
            validation_delay: None,
            results_unavailable: false,
            calls: StdMutex::new(Vec::new()),
            validations: StdMutex::new(Vec::new()),
        }
    }

    /// Quiz window currently open with a `minutes` time budget.
    pub(crate) fn open(total: u32, minutes: u32) -> Self {
        let now = OffsetDateTime::now_utc();
        let start = now - time::Duration::minutes(1);
        let mut api = Self::with_questions(total, start, now + time::Duration::hours(2));
        if let Some(config) = api.config.as_mut() {
            config.total_time_minutes = minutes;
        }
        api
    }

    pub(crate) fn ineligible(mut self, message: &str) -> Self {
        self.attempt = AttemptStatus { is_eligible: false, message: Some(message.to_string()) };
        self
    }

    pub(crate) fn with_active(mut self, is_active: bool) -> Self {
        if let Some(config) = self.config.as_mut() {
            config.is_active = is_active;
        }
        self
    }

    pub(crate) fn without_config(mut self) -> Self {
        self.config = None;
        self
    }

    pub(crate) fn unauthorized(mut self) -> Self {
        self.unauthorized = true;
        self
    }

    pub(crate) fn rejecting(mut self, question_id: QuestionId) -> Self {
        self.rejected = Some(question_id);
        self
    }

    /// The first `count` answer posts fail with a network error.
    pub(crate) fn failing_transiently(self, count: u32) -> Self {
        self.transient_failures.store(count, Ordering::SeqCst);
        self
    }

    pub(crate) fn with_validation_delay(mut self, delay: Duration) -> Self {
        self.validation_delay = Some(delay);
        self
    }

    /// Results lookups fail with a 503.
    pub(crate) fn without_results(mut self) -> Self {
        self.results_unavailable = true;
        self
    }

    /// Lookups and question fetches; answer posts are tracked by `validations`.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub(crate) fn validations(&self) -> Vec<ValidateAnswerRequest> {
        self.validations.lock().expect("validations lock").clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("calls lock").push(call);
    }

    fn check_session(&self) -> Result<(), ApiError> {
        if self.unauthorized {
            return Err(ApiError::Unauthorized);
        }
        Ok(())
    }
}

#[async_trait]
impl QuizApi for FakeQuizApi {
    async fn student(&self, student_id: &str) -> Result<StudentRecord, ApiError> {
        self.record(format!("student:{student_id}"));
        self.check_session()?;
        Ok(StudentRecord { course: StudentCourse { course_id: TEST_COURSE_ID.to_string() } })
    }

    async fn quiz_configs(&self, course_id: &str) -> Result<Vec<QuizConfig>, ApiError> {
        self.record(format!("quiz-config:{course_id}"));
        self.check_session()?;
        Ok(self.config.clone().into_iter().collect())
    }

    async fn attempt_status(&self, student_id: &str) -> Result<AttemptStatus, ApiError> {
        self.record(format!("attempt-status:{student_id}"));
        self.check_session()?;
        Ok(self.attempt.clone())
    }

    async fn question(&self, course_id: &str, position: u32) -> Result<Question, ApiError> {
        self.record(format!("question:{course_id}:{position}"));
        self.check_session()?;
        Ok(question(position))
    }

    async fn validate_answer(
        &self,
        _submission_id: Uuid,
        request: &ValidateAnswerRequest,
    ) -> Result<(), ApiError> {
        self.validations.lock().expect("validations lock").push(request.clone());

        if let Some(delay) = self.validation_delay {
            tokio::time::sleep(delay).await;
        }

        let pending_failures = self.transient_failures.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.transient_failures.store(pending_failures - 1, Ordering::SeqCst);
            return Err(ApiError::Network("connection reset".to_string()));
        }

        if self.rejected == Some(request.question_id) {
            return Err(ApiError::ValidationFailed {
                question_id: request.question_id,
                reason: "rejected".to_string(),
            });
        }

        Ok(())
    }

    async fn results(&self, student_id: &str) -> Result<SubmissionResult, ApiError> {
        self.record(format!("results:{student_id}"));
        self.check_session()?;
        if self.results_unavailable {
            return Err(ApiError::Status { status: 503, detail: "maintenance".to_string() });
        }
        let answers: Vec<AnswerOutcome> = self
            .validations()
            .into_iter()
            .map(|posted| AnswerOutcome {
                question_id: posted.question_id,
                is_correct: posted.selected_answer == "A",
            })
            .collect();
        let total_marks = answers.iter().filter(|outcome| outcome.is_correct).count() as f64;
        Ok(SubmissionResult { total_marks, max_marks: Some(answers.len() as f64), answers })
    }
}

/// View that plays a scripted student. Script steps run in order; a step's events are sent
/// when its question is next shown.
pub(crate) struct ScriptedStudent {
    events: mpsc::Sender<QuizEvent>,
    script: VecDeque<(u32, Vec<QuizEvent>)>,
    abandon: Option<oneshot::Sender<()>>,
    shown: Vec<u32>,
    notices: Vec<String>,
    last_remaining: Option<u64>,
}

impl ScriptedStudent {
    pub(crate) fn new(events: mpsc::Sender<QuizEvent>) -> Self {
        Self {
            events,
            script: VecDeque::new(),
            abandon: None,
            shown: Vec::new(),
            notices: Vec::new(),
            last_remaining: None,
        }
    }

    pub(crate) fn on(mut self, index: u32, events: Vec<QuizEvent>) -> Self {
        self.script.push_back((index, events));
        self
    }

    /// Fires `abandon` the first time a question is shown with an answer selected.
    pub(crate) fn abandon_after_select(mut self, abandon: oneshot::Sender<()>) -> Self {
        self.abandon = Some(abandon);
        self
    }

    pub(crate) fn shown_positions(&self) -> Vec<u32> {
        self.shown.clone()
    }

    pub(crate) fn notices(&self) -> Vec<String> {
        self.notices.clone()
    }

    pub(crate) fn last_remaining(&self) -> Option<u64> {
        self.last_remaining
    }
}

impl QuizView for ScriptedStudent {
    fn show_intro(&mut self, _config: &QuizConfig) {}

    fn show_question(&mut self, view: QuestionView<'_>) {
        self.shown.push(view.index);

        if self.script.front().is_some_and(|(index, _)| *index == view.index) {
            let (_, events) = self.script.pop_front().expect("script step");
            for event in events {
                self.events.try_send(event).expect("scripted event");
            }
        }

        if view.selected.is_some() {
            if let Some(abandon) = self.abandon.take() {
                let _ = abandon.send(());
            }
        }
    }

    fn show_remaining(&mut self, seconds: u64) {
        self.last_remaining = Some(seconds);
    }

    fn show_notice(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct StubScenario {
    /// Answer posts for this question are refused with a 409.
    pub(crate) reject_question: Option<QuestionId>,
    /// Every request is answered with 401.
    pub(crate) unauthorized: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct StubValidation {
    pub(crate) body: Value,
    pub(crate) idempotency_key: Option<String>,
    pub(crate) submission_id: Option<String>,
}

#[derive(Default)]
struct StubRecorder {
    tokens: Vec<String>,
    validations: Vec<StubValidation>,
}

struct StubShared {
    scenario: StubScenario,
    recorder: StdMutex<StubRecorder>,
}

type StubState = State<Arc<StubShared>>;
type StubResponse = Result<Json<Value>, (StatusCode, Json<Value>)>;

/// Course platform served over real HTTP on a loopback port.
pub(crate) struct StubApi {
    base_url: String,
    shared: Arc<StubShared>,
}

impl StubApi {
    pub(crate) async fn spawn(scenario: StubScenario) -> Self {
        let shared =
            Arc::new(StubShared { scenario, recorder: StdMutex::new(StubRecorder::default()) });

        let app = Router::new()
            .route("/api/students/:student_id", get(stub_student))
            .route("/api/quiz-config/:course_id", get(stub_quiz_config))
            .route("/api/quiz/attempt-status/:student_id", get(stub_attempt_status))
            .route("/api/questions/:course_id", get(stub_question))
            .route("/api/quiz/validate", post(stub_validate))
            .route("/api/quiz/results/:student_id", get(stub_results))
            .with_state(shared.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let addr = listener.local_addr().expect("stub addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("stub server");
        });

        Self { base_url: format!("http://{addr}/api"), shared }
    }

    pub(crate) fn base_url(&self) -> String {
        self.base_url.clone()
    }

    pub(crate) fn seen_tokens(&self) -> Vec<String> {
        self.shared.recorder.lock().expect("stub lock").tokens.clone()
    }

    pub(crate) fn validations(&self) -> Vec<StubValidation> {
        self.shared.recorder.lock().expect("stub lock").validations.clone()
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_string)
}

fn authorize(shared: &StubShared, headers: &HeaderMap) -> Result<(), (StatusCode, Json<Value>)> {
    if let Some(token) = header_value(headers, header::AUTHORIZATION.as_str()) {
        shared.recorder.lock().expect("stub lock").tokens.push(token);
    }
    if shared.scenario.unauthorized {
        return Err((StatusCode::UNAUTHORIZED, Json(json!({ "detail": "token expired" }))));
    }
    Ok(())
}

async fn stub_student(
    State(shared): StubState,
    Path(_student_id): Path<String>,
    headers: HeaderMap,
) -> StubResponse {
    authorize(&shared, &headers)?;
    Ok(Json(json!({ "Course": { "courseId": 7 } })))
}

async fn stub_quiz_config(
    State(shared): StubState,
    Path(course_id): Path<String>,
    headers: HeaderMap,
) -> StubResponse {
    authorize(&shared, &headers)?;
    Ok(Json(json!([{
        "courseId": course_id,
        "quizTitle": "Midterm",
        "description": "Chapters 1-3",
        "totalQuestions": 3,
        "totalTimeMinutes": 30,
        "startTime": "2026-03-02T09:00:00",
        "endTime": "2026-03-02T10:00:00Z",
        "isActive": true
    }])))
}

async fn stub_attempt_status(
    State(shared): StubState,
    Path(_student_id): Path<String>,
    headers: HeaderMap,
) -> StubResponse {
    authorize(&shared, &headers)?;
    Ok(Json(json!({ "isEligible": true })))
}

#[derive(Deserialize)]
struct PositionQuery {
    position: u32,
}

async fn stub_question(
    State(shared): StubState,
    Path(_course_id): Path<String>,
    Query(query): Query<PositionQuery>,
    headers: HeaderMap,
) -> StubResponse {
    authorize(&shared, &headers)?;
    let position = query.position;
    Ok(Json(json!({
        "id": 100 + position,
        "position": position,
        "totalQuestions": 3,
        "questionText": format!("Question {position}"),
        "option1": "A",
        "option2": "B",
        "option3": "C",
        "option4": ""
    })))
}

async fn stub_validate(
    State(shared): StubState,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StubResponse {
    authorize(&shared, &headers)?;
    let question_id = body.get("questionId").and_then(Value::as_i64);
    shared.recorder.lock().expect("stub lock").validations.push(StubValidation {
        body,
        idempotency_key: header_value(&headers, "idempotency-key"),
        submission_id: header_value(&headers, "x-submission-id"),
    });

    if question_id.is_some() && question_id == shared.scenario.reject_question {
        return Err((StatusCode::CONFLICT, Json(json!({ "detail": "closed" }))));
    }
    Ok(Json(json!({ "accepted": true })))
}

async fn stub_results(
    State(shared): StubState,
    Path(_student_id): Path<String>,
    headers: HeaderMap,
) -> StubResponse {
    authorize(&shared, &headers)?;
    Ok(Json(json!({
        "totalMarks": 1,
        "maxMarks": 2,
        "answers": [
            { "questionId": 101, "isCorrect": true },
            { "questionId": "102", "isCorrect": false }
        ]
    })))
}

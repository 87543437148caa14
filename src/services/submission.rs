use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::api::client::QuizApi;
use crate::api::errors::ApiError;
use crate::core::config::Settings;
use crate::schemas::quiz::{QuestionId, ValidateAnswerRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubmitTrigger {
    Manual,
    TimerExpired,
    Abandoned,
}

impl SubmitTrigger {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::TimerExpired => "timer_expired",
            Self::Abandoned => "abandoned",
        }
    }

    pub(crate) fn is_forced(self) -> bool {
        !matches!(self, Self::Manual)
    }
}

#[derive(Debug)]
pub(crate) struct SubmissionFailure {
    pub(crate) question_id: QuestionId,
    pub(crate) error: ApiError,
}

#[derive(Debug)]
pub(crate) struct SubmissionReport {
    pub(crate) submission_id: Uuid,
    pub(crate) trigger: SubmitTrigger,
    pub(crate) attempted: usize,
    pub(crate) posted: Vec<QuestionId>,
    pub(crate) failure: Option<SubmissionFailure>,
    /// Abandonment saves are best effort; the server may have seen none of them.
    pub(crate) advisory: bool,
    pub(crate) timed_out: bool,
}

impl SubmissionReport {
    pub(crate) fn is_complete(&self) -> bool {
        self.failure.is_none() && !self.timed_out && self.posted.len() == self.attempted
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SubmissionTarget {
    pub(crate) course_id: String,
    pub(crate) student_id: String,
}

/// Posts recorded answers one by one to the validation endpoint.
#[derive(Clone)]
pub(crate) struct SubmissionOrchestrator {
    api: Arc<dyn QuizApi>,
    max_retries: u32,
    retry_base: Duration,
    abandon_grace: Duration,
}

impl SubmissionOrchestrator {
    pub(crate) fn new(api: Arc<dyn QuizApi>, max_retries: u32, abandon_grace: Duration) -> Self {
        Self { api, max_retries, retry_base: Duration::from_millis(500), abandon_grace }
    }

    pub(crate) fn from_settings(api: Arc<dyn QuizApi>, settings: &Settings) -> Self {
        Self::new(api, settings.quiz().submit_retries, settings.quiz().abandon_grace())
    }

    /// Every call posts every answer again; deduplication is left to the server via the
    /// idempotency key. The loop stops at the first failed post and nothing is rolled back.
    pub(crate) async fn submit(
        &self,
        target: &SubmissionTarget,
        answers: &BTreeMap<QuestionId, String>,
        trigger: SubmitTrigger,
    ) -> SubmissionReport {
        let mut report = SubmissionReport {
            submission_id: Uuid::new_v4(),
            trigger,
            attempted: answers.len(),
            posted: Vec::with_capacity(answers.len()),
            failure: None,
            advisory: trigger == SubmitTrigger::Abandoned,
            timed_out: false,
        };

        if trigger.is_forced() {
            metrics::counter!("quiz_forced_submissions_total", "trigger" => trigger.as_str())
                .increment(1);
        }

        tracing::info!(
            submission_id = %report.submission_id,
            trigger = trigger.as_str(),
            answers = answers.len(),
            "Submitting quiz answers"
        );

        if trigger == SubmitTrigger::Abandoned {
            let drained =
                tokio::time::timeout(self.abandon_grace, self.drain(target, answers, &mut report))
                    .await;
            if drained.is_err() {
                report.timed_out = true;
                tracing::warn!(
                    submission_id = %report.submission_id,
                    posted = report.posted.len(),
                    "Abandonment save did not finish before the grace period"
                );
            }
        } else {
            self.drain(target, answers, &mut report).await;
        }

        report
    }

    async fn drain(
        &self,
        target: &SubmissionTarget,
        answers: &BTreeMap<QuestionId, String>,
        report: &mut SubmissionReport,
    ) {
        for (question_id, answer) in answers {
            let request = ValidateAnswerRequest {
                course_id: target.course_id.clone(),
                student_id: target.student_id.clone(),
                question_id: *question_id,
                selected_answer: answer.clone(),
            };

            match self.post_with_retry(report.submission_id, &request).await {
                Ok(()) => {
                    metrics::counter!("quiz_answers_posted_total").increment(1);
                    report.posted.push(*question_id);
                }
                Err(error) => {
                    metrics::counter!("quiz_answer_failures_total").increment(1);
                    tracing::error!(
                        submission_id = %report.submission_id,
                        question_id = *question_id,
                        error = %error,
                        "Answer submission failed; remaining answers were not sent"
                    );
                    report.failure = Some(SubmissionFailure { question_id: *question_id, error });
                    return;
                }
            }
        }
    }

    async fn post_with_retry(
        &self,
        submission_id: Uuid,
        request: &ValidateAnswerRequest,
    ) -> Result<(), ApiError> {
        let mut attempt = 0;
        loop {
            match self.api.validate_answer(submission_id, request).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let backoff = self.retry_base * 2_u32.pow(attempt);
                    tracing::warn!(
                        question_id = request.question_id,
                        attempt = attempt + 1,
                        error = %err,
                        "Retrying answer submission"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

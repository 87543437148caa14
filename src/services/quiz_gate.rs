use time::OffsetDateTime;
use validator::Validate;

use crate::api::client::QuizApi;
use crate::api::errors::ApiError;
use crate::core::time::format_offset;
use crate::schemas::quiz::QuizConfig;
use crate::services::quiz_window::{check_window, WindowStatus};

#[derive(Debug, Clone)]
pub(crate) struct ResolvedQuiz {
    pub(crate) student_id: String,
    pub(crate) course_id: String,
    pub(crate) config: QuizConfig,
}

#[derive(Debug, Clone)]
pub(crate) enum GateOutcome {
    Enter(ResolvedQuiz),
    RedirectToResults { message: Option<String> },
    NotAvailable { status: WindowStatus, results_link: String },
}

/// Resolves the student's course and quiz, then decides whether the quiz may be entered.
///
/// Lookups are sequential: student, quiz config, attempt status. The eligibility check
/// runs before the time window so a student who already attempted is always redirected.
pub(crate) async fn resolve_and_check(
    api: &dyn QuizApi,
    student_id: &str,
    now: OffsetDateTime,
    results_link: &str,
) -> Result<GateOutcome, ApiError> {
    let student = api.student(student_id).await?;
    let course_id = student.course.course_id;

    let config = resolve_config(api, &course_id).await?;

    let attempt = api.attempt_status(student_id).await?;
    if !attempt.is_eligible {
        tracing::info!(
            student_id = %student_id,
            course_id = %course_id,
            message = attempt.message.as_deref().unwrap_or(""),
            "Student is not eligible for the quiz; redirecting to results"
        );
        return Ok(GateOutcome::RedirectToResults { message: attempt.message });
    }

    let status = check_window(&config, now);
    if !status.is_open() {
        tracing::info!(
            course_id = %course_id,
            status = status.describe(),
            starts = %format_offset(config.start_time),
            ends = %format_offset(config.end_time),
            "Quiz is outside its availability window"
        );
        return Ok(GateOutcome::NotAvailable { status, results_link: results_link.to_string() });
    }

    Ok(GateOutcome::Enter(ResolvedQuiz {
        student_id: student_id.to_string(),
        course_id,
        config,
    }))
}

async fn resolve_config(api: &dyn QuizApi, course_id: &str) -> Result<QuizConfig, ApiError> {
    let config = api
        .quiz_configs(course_id)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::NotConfigured { course_id: course_id.to_string() })?;

    if config.course_id != course_id {
        tracing::debug!(
            course_id = %course_id,
            config_course_id = %config.course_id,
            "Quiz configuration reports a different course"
        );
    }

    if let Err(err) = config.validate() {
        tracing::warn!(course_id = %course_id, error = %err, "Quiz configuration is invalid");
        return Err(ApiError::NotConfigured { course_id: course_id.to_string() });
    }

    Ok(config)
}

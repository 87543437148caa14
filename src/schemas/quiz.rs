use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::{Validate, ValidationError};

use crate::core::time::parse_timestamp_flexible;

pub(crate) type QuestionId = i64;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StudentRecord {
    #[serde(rename = "Course", alias = "course")]
    pub(crate) course: StudentCourse,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StudentCourse {
    #[serde(rename = "courseId", alias = "course_id", deserialize_with = "deserialize_id")]
    pub(crate) course_id: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_quiz_window"))]
pub(crate) struct QuizConfig {
    #[serde(alias = "courseId", deserialize_with = "deserialize_id")]
    pub(crate) course_id: String,
    #[serde(default, alias = "quizTitle")]
    pub(crate) quiz_title: String,
    #[serde(default)]
    pub(crate) description: String,
    #[serde(alias = "totalQuestions")]
    #[validate(range(min = 1, message = "total_questions must be positive"))]
    pub(crate) total_questions: u32,
    #[serde(alias = "totalTimeMinutes")]
    #[validate(range(min = 1, message = "total_time_minutes must be positive"))]
    pub(crate) total_time_minutes: u32,
    #[serde(alias = "startTime", deserialize_with = "deserialize_timestamp")]
    pub(crate) start_time: OffsetDateTime,
    #[serde(alias = "endTime", deserialize_with = "deserialize_timestamp")]
    pub(crate) end_time: OffsetDateTime,
    #[serde(default, alias = "isActive")]
    pub(crate) is_active: bool,
}

impl QuizConfig {
    pub(crate) fn time_budget_seconds(&self) -> u64 {
        u64::from(self.total_time_minutes) * 60
    }
}

fn validate_quiz_window(config: &QuizConfig) -> Result<(), ValidationError> {
    if config.start_time > config.end_time {
        let mut err = ValidationError::new("quiz_window");
        err.message = Some("start_time must not be after end_time".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AttemptStatus {
    #[serde(alias = "isEligible")]
    pub(crate) is_eligible: bool,
    #[serde(default)]
    pub(crate) message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Question {
    #[serde(deserialize_with = "deserialize_question_id")]
    pub(crate) id: QuestionId,
    #[serde(default)]
    pub(crate) position: Option<u32>,
    #[serde(default, alias = "totalQuestions")]
    pub(crate) total_questions: Option<u32>,
    #[serde(alias = "questionText", alias = "question_text")]
    pub(crate) text: String,
    #[serde(default)]
    pub(crate) option1: Option<String>,
    #[serde(default)]
    pub(crate) option2: Option<String>,
    #[serde(default)]
    pub(crate) option3: Option<String>,
    #[serde(default)]
    pub(crate) option4: Option<String>,
}

impl Question {
    /// Non-empty options in display order.
    pub(crate) fn options(&self) -> Vec<&str> {
        [&self.option1, &self.option2, &self.option3, &self.option4]
            .into_iter()
            .filter_map(|option| option.as_deref())
            .filter(|option| !option.trim().is_empty())
            .collect()
    }

    pub(crate) fn option(&self, number: usize) -> Option<&str> {
        self.options().get(number.checked_sub(1)?).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ValidateAnswerRequest {
    pub(crate) course_id: String,
    pub(crate) student_id: String,
    pub(crate) question_id: QuestionId,
    pub(crate) selected_answer: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SubmissionResult {
    #[serde(default, alias = "totalMarks")]
    pub(crate) total_marks: f64,
    #[serde(default, alias = "maxMarks")]
    pub(crate) max_marks: Option<f64>,
    #[serde(default)]
    pub(crate) answers: Vec<AnswerOutcome>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AnswerOutcome {
    #[serde(alias = "questionId", deserialize_with = "deserialize_question_id")]
    pub(crate) question_id: QuestionId,
    #[serde(default, alias = "isCorrect")]
    pub(crate) is_correct: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match RawId::deserialize(deserializer)? {
        RawId::Number(value) => Ok(value.to_string()),
        RawId::Text(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        RawId::Text(_) => Err(D::Error::custom("identifier must not be empty")),
    }
}

fn deserialize_question_id<'de, D>(deserializer: D) -> Result<QuestionId, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match RawId::deserialize(deserializer)? {
        RawId::Number(value) => Ok(value),
        RawId::Text(value) => value
            .trim()
            .parse::<QuestionId>()
            .map_err(|_| D::Error::custom(format!("invalid question id: {value}"))),
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp_flexible(&raw)
        .ok_or_else(|| D::Error::custom(format!("invalid datetime: {raw}")))
}

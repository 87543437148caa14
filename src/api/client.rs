use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::core::config::Settings;
use crate::core::session::AuthContext;
use crate::schemas::quiz::{
    AttemptStatus, Question, QuizConfig, StudentRecord, SubmissionResult, ValidateAnswerRequest,
};

/// Endpoints of the course platform consumed by the quiz flow.
#[async_trait]
pub(crate) trait QuizApi: Send + Sync {
    async fn student(&self, student_id: &str) -> Result<StudentRecord, ApiError>;

    async fn quiz_configs(&self, course_id: &str) -> Result<Vec<QuizConfig>, ApiError>;

    async fn attempt_status(&self, student_id: &str) -> Result<AttemptStatus, ApiError>;

    async fn question(&self, course_id: &str, position: u32) -> Result<Question, ApiError>;

    async fn validate_answer(
        &self,
        submission_id: Uuid,
        request: &ValidateAnswerRequest,
    ) -> Result<(), ApiError>;

    async fn results(&self, student_id: &str) -> Result<SubmissionResult, ApiError>;
}

#[derive(Clone)]
pub(crate) struct HttpQuizApi {
    client: Client,
    base_url: Url,
    auth: Arc<dyn AuthContext>,
}

impl HttpQuizApi {
    pub(crate) fn from_settings(
        settings: &Settings,
        auth: Arc<dyn AuthContext>,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(settings.api().connect_timeout())
            .timeout(settings.api().timeout())
            .build()
            .context("Failed to build quiz API HTTP client")?;
        let base_url = Url::parse(settings.api().base_url.as_str())
            .context("Failed to parse quiz API base url")?;

        Ok(Self { client, base_url, auth })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ApiError::Decode(format!("base url cannot carry a path: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.auth.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, context: &str) -> Result<T, ApiError> {
        let request = self.authorized(self.client.get(url));
        let body = self.send(request, context).await?;
        decode_body(&body, context)
    }

    async fn send(&self, request: RequestBuilder, context: &str) -> Result<String, ApiError> {
        let response = request.send().await.map_err(|err| ApiError::network(err, context))?;

        let status = response.status();
        let body = response.text().await.map_err(|err| ApiError::network(err, context))?;

        if status.is_success() {
            return Ok(body);
        }

        let detail = extract_error_message(&body);
        tracing::debug!(status = status.as_u16(), detail = %detail, "{context} rejected");
        let err = ApiError::from_status(status, detail);
        if err.is_auth_failure() {
            self.auth.on_unauthorized();
        }
        Err(err)
    }
}

#[async_trait]
impl QuizApi for HttpQuizApi {
    async fn student(&self, student_id: &str) -> Result<StudentRecord, ApiError> {
        let url = self.endpoint(&["students", student_id])?;
        self.get_json(url, "Failed to fetch student record").await
    }

    async fn quiz_configs(&self, course_id: &str) -> Result<Vec<QuizConfig>, ApiError> {
        let url = self.endpoint(&["quiz-config", course_id])?;
        self.get_json(url, "Failed to fetch quiz configuration").await
    }

    async fn attempt_status(&self, student_id: &str) -> Result<AttemptStatus, ApiError> {
        let url = self.endpoint(&["quiz", "attempt-status", student_id])?;
        self.get_json(url, "Failed to fetch attempt status").await
    }

    async fn question(&self, course_id: &str, position: u32) -> Result<Question, ApiError> {
        let mut url = self.endpoint(&["questions", course_id])?;
        url.query_pairs_mut().append_pair("position", &position.to_string());
        self.get_json(url, "Failed to fetch question").await
    }

    async fn validate_answer(
        &self,
        submission_id: Uuid,
        request: &ValidateAnswerRequest,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["quiz", "validate"])?;
        let idempotency_key = format!("{}:{}", request.student_id, request.question_id);
        let builder = self
            .client
            .post(url)
            .header("Idempotency-Key", idempotency_key)
            .header("X-Submission-Id", submission_id.to_string())
            .json(request);

        match self.send(self.authorized(builder), "Failed to submit answer").await {
            Ok(_) => Ok(()),
            Err(ApiError::Status { status, detail }) if (400..500).contains(&status) => {
                Err(ApiError::ValidationFailed { question_id: request.question_id, reason: detail })
            }
            Err(err) => Err(err),
        }
    }

    async fn results(&self, student_id: &str) -> Result<SubmissionResult, ApiError> {
        let url = self.endpoint(&["quiz", "results", student_id])?;
        self.get_json(url, "Failed to fetch quiz results").await
    }
}

fn decode_body<T: DeserializeOwned>(body: &str, context: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|err| {
        tracing::warn!(error = %err, "{context}: response body did not match the expected shape");
        ApiError::Decode(format!("{context}: {err}"))
    })
}

fn extract_error_message(body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return body.trim().chars().take(200).collect();
    };

    ["detail", "message", "error"]
        .iter()
        .find_map(|key| parsed.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| parsed.to_string())
}

use super::parsing::{
    env_optional, env_or_default, normalize_route, parse_bool, parse_environment,
    parse_positive_u64, parse_u32, parse_u64,
};
use super::types::{
    ApiSettings, BaseUrl, ConfigError, QuizSettings, RouteSettings, RuntimeSettings,
    SessionSettings, Settings, TelemetrySettings,
};

const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let environment =
            parse_environment(env_optional("QUIZ_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("QUIZ_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let explicit_base_url = env_optional("QUIZ_API_BASE_URL");
        if strict_config && explicit_base_url.is_none() {
            return Err(ConfigError::MissingSetting("QUIZ_API_BASE_URL"));
        }
        let base_url = explicit_base_url.unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let timeout_seconds = parse_positive_u64(
            "QUIZ_API_TIMEOUT_SECONDS",
            env_or_default("QUIZ_API_TIMEOUT_SECONDS", "30"),
        )?;
        let connect_timeout_seconds = parse_positive_u64(
            "QUIZ_API_CONNECT_TIMEOUT_SECONDS",
            env_or_default("QUIZ_API_CONNECT_TIMEOUT_SECONDS", "10"),
        )?;

        let auth_token = env_optional("QUIZ_AUTH_TOKEN");
        let student_id = env_optional("QUIZ_STUDENT_ID");

        let results_url = normalize_route(env_or_default("QUIZ_RESULTS_URL", "/quiz/results"));
        let login_url = normalize_route(env_or_default("QUIZ_LOGIN_URL", "/login"));

        let tick_millis =
            parse_positive_u64("QUIZ_TICK_MILLIS", env_or_default("QUIZ_TICK_MILLIS", "1000"))?;
        let submit_retries =
            parse_u32("QUIZ_SUBMIT_RETRIES", env_or_default("QUIZ_SUBMIT_RETRIES", "0"))?;
        let abandon_grace_seconds = parse_u64(
            "QUIZ_ABANDON_GRACE_SECONDS",
            env_or_default("QUIZ_ABANDON_GRACE_SECONDS", "3"),
        )?;

        let log_level = env_or_default("QUIZ_LOG_LEVEL", "info");
        let json = env_optional("QUIZ_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let metrics_enabled = env_optional("QUIZ_METRICS_ENABLED")
            .map(|value| parse_bool(&value))
            .unwrap_or(false);

        let settings = Self {
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings {
                base_url: BaseUrl::parse(base_url)?,
                timeout_seconds,
                connect_timeout_seconds,
            },
            session: SessionSettings { auth_token, student_id },
            routes: RouteSettings { results_url, login_url },
            quiz: QuizSettings { tick_millis, submit_retries, abandon_grace_seconds },
            telemetry: TelemetrySettings { log_level, json, metrics_enabled },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn session(&self) -> &SessionSettings {
        &self.session
    }

    pub(crate) fn routes(&self) -> &RouteSettings {
        &self.routes
    }

    pub(crate) fn quiz(&self) -> &QuizSettings {
        &self.quiz
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.quiz.submit_retries > 5 {
            return Err(ConfigError::InvalidValue {
                field: "QUIZ_SUBMIT_RETRIES",
                value: self.quiz.submit_retries.to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.session.auth_token.is_none() {
            return Err(ConfigError::MissingSetting("QUIZ_AUTH_TOKEN"));
        }
        if self.session.student_id.is_none() {
            return Err(ConfigError::MissingSetting("QUIZ_STUDENT_ID"));
        }
        let base_url = self.api.base_url.as_str();
        if self.runtime.environment.is_production() && base_url.starts_with("http://") {
            return Err(ConfigError::InvalidBaseUrl(base_url.to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
impl Settings {
    pub(crate) fn for_tests(base_url: &str) -> Self {
        Self {
            runtime: RuntimeSettings {
                environment: super::types::Environment::Test,
                strict_config: false,
            },
            api: ApiSettings {
                base_url: BaseUrl(base_url.trim_end_matches('/').to_string()),
                timeout_seconds: 5,
                connect_timeout_seconds: 2,
            },
            session: SessionSettings {
                auth_token: Some("test-token".to_string()),
                student_id: Some("42".to_string()),
            },
            routes: RouteSettings {
                results_url: "/quiz/results".to_string(),
                login_url: "/login".to_string(),
            },
            quiz: QuizSettings { tick_millis: 1000, submit_retries: 0, abandon_grace_seconds: 3 },
            telemetry: TelemetrySettings {
                log_level: "debug".to_string(),
                json: false,
                metrics_enabled: false,
            },
        }
    }
}

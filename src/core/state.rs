use std::sync::Arc;

use crate::api::client::{HttpQuizApi, QuizApi};
use crate::core::config::Settings;
use crate::core::session::{AuthContext, StaticSession};

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    api: Arc<dyn QuizApi>,
    session: Arc<StaticSession>,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        api: Arc<dyn QuizApi>,
        session: Arc<StaticSession>,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, api, session }) }
    }

    pub(crate) fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let session = Arc::new(StaticSession::from_settings(&settings));
        let api = HttpQuizApi::from_settings(&settings, session.clone())?;
        Ok(Self::new(settings, Arc::new(api), session))
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn api(&self) -> Arc<dyn QuizApi> {
        Arc::clone(&self.inner.api)
    }

    pub(crate) fn auth(&self) -> Arc<dyn AuthContext> {
        self.inner.session.clone()
    }

    #[cfg(test)]
    pub(crate) fn session(&self) -> Arc<StaticSession> {
        Arc::clone(&self.inner.session)
    }
}

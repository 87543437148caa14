use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::config::Settings;

/// Authentication state owned by the login collaborator and lent to the quiz flow.
pub(crate) trait AuthContext: Send + Sync {
    fn token(&self) -> Option<String>;

    fn current_user(&self) -> Option<String>;

    /// Called when the API rejects the session. The flow routes to login afterwards.
    fn on_unauthorized(&self);
}

#[derive(Debug)]
pub(crate) struct StaticSession {
    token: Option<String>,
    student_id: Option<String>,
    revoked: AtomicBool,
}

impl StaticSession {
    pub(crate) fn new(token: Option<String>, student_id: Option<String>) -> Self {
        Self { token, student_id, revoked: AtomicBool::new(false) }
    }

    pub(crate) fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.session().auth_token.clone(), settings.session().student_id.clone())
    }

    pub(crate) fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::SeqCst)
    }
}

impl AuthContext for StaticSession {
    fn token(&self) -> Option<String> {
        if self.is_revoked() {
            return None;
        }
        self.token.clone()
    }

    fn current_user(&self) -> Option<String> {
        if self.is_revoked() {
            return None;
        }
        self.student_id.clone()
    }

    fn on_unauthorized(&self) {
        if !self.revoked.swap(true, Ordering::SeqCst) {
            tracing::warn!("API rejected the session credentials; session revoked");
        }
    }
}

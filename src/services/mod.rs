pub(crate) mod countdown;
pub(crate) mod navigator;
pub(crate) mod quiz_gate;
pub(crate) mod quiz_session;
pub(crate) mod quiz_window;
pub(crate) mod submission;

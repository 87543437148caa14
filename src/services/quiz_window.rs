use time::OffsetDateTime;

use crate::schemas::quiz::QuizConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WindowStatus {
    Open,
    NotStarted,
    Ended,
    Inactive,
}

impl WindowStatus {
    pub(crate) fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    pub(crate) fn describe(self) -> &'static str {
        match self {
            Self::Open => "quiz is open",
            Self::NotStarted => "quiz has not started yet",
            Self::Ended => "quiz has ended",
            Self::Inactive => "quiz is not active",
        }
    }
}

/// Both bounds are inclusive. The time window is checked before `is_active`, so a quiz
/// outside its window is reported as such even when it has been deactivated.
pub(crate) fn check_window(config: &QuizConfig, now: OffsetDateTime) -> WindowStatus {
    if now < config.start_time {
        return WindowStatus::NotStarted;
    }
    if now > config.end_time {
        return WindowStatus::Ended;
    }
    if !config.is_active {
        return WindowStatus::Inactive;
    }
    WindowStatus::Open
}

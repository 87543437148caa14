use std::collections::BTreeMap;

use thiserror::Error;

use crate::schemas::quiz::{Question, QuestionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PrimaryAction {
    Next,
    Submit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub(crate) enum NavigationError {
    #[error("question is still loading")]
    NotLoaded,
    #[error("select an answer before moving on")]
    AnswerRequired,
    #[error("option {0} does not exist for this question")]
    UnknownOption(usize),
    #[error("submit is only available on the last question")]
    NotAtLastQuestion,
    #[error("this is the last question; submit to finish")]
    AtLastQuestion,
}

/// Identifies one question fetch. Only the most recently issued ticket may update the
/// displayed question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LoadTicket {
    pub(crate) seq: u64,
    pub(crate) index: u32,
}

/// Steps through a quiz one question at a time and owns the recorded answers.
#[derive(Debug)]
pub(crate) struct QuestionNavigator {
    course_id: String,
    total: u32,
    current_index: u32,
    current: Option<Question>,
    answers: BTreeMap<QuestionId, String>,
    latest_seq: u64,
}

impl QuestionNavigator {
    pub(crate) fn new(course_id: impl Into<String>, total: u32) -> Self {
        Self {
            course_id: course_id.into(),
            total: total.max(1),
            current_index: 1,
            current: None,
            answers: BTreeMap::new(),
            latest_seq: 0,
        }
    }

    pub(crate) fn course_id(&self) -> &str {
        &self.course_id
    }

    pub(crate) fn total(&self) -> u32 {
        self.total
    }

    pub(crate) fn current_index(&self) -> u32 {
        self.current_index
    }

    pub(crate) fn current(&self) -> Option<&Question> {
        self.current.as_ref()
    }

    pub(crate) fn answers(&self) -> &BTreeMap<QuestionId, String> {
        &self.answers
    }

    pub(crate) fn selected_answer(&self) -> Option<&str> {
        let question = self.current.as_ref()?;
        self.answers.get(&question.id).map(String::as_str)
    }

    pub(crate) fn primary_action(&self) -> PrimaryAction {
        if self.current_index == self.total {
            PrimaryAction::Submit
        } else {
            PrimaryAction::Next
        }
    }

    /// Moves to `index` (clamped) and issues a ticket for fetching it. The displayed question
    /// is cleared until the matching response arrives; nothing is cached.
    pub(crate) fn begin_load(&mut self, index: u32) -> LoadTicket {
        self.current_index = index.clamp(1, self.total);
        self.current = None;
        self.latest_seq += 1;
        LoadTicket { seq: self.latest_seq, index: self.current_index }
    }

    /// Returns `false` when the response belongs to a superseded navigation and was dropped.
    pub(crate) fn apply_loaded(&mut self, ticket: LoadTicket, question: Question) -> bool {
        if !self.is_latest(ticket) {
            tracing::debug!(
                seq = ticket.seq,
                latest = self.latest_seq,
                index = ticket.index,
                "Discarding stale question response"
            );
            metrics::counter!("quiz_stale_question_loads_total").increment(1);
            return false;
        }

        if question.position.is_some_and(|position| position != ticket.index) {
            tracing::debug!(
                requested = ticket.index,
                position = question.position,
                "Question position differs from the requested one"
            );
        }

        if let Some(total) = question.total_questions {
            if total != self.total {
                tracing::debug!(
                    reported = total,
                    configured = self.total,
                    "Question total differs from quiz configuration"
                );
            }
        }

        self.current = Some(question);
        true
    }

    pub(crate) fn is_latest(&self, ticket: LoadTicket) -> bool {
        ticket.seq == self.latest_seq
    }

    /// Last selection wins.
    pub(crate) fn select_answer(&mut self, option_text: &str) -> Result<(), NavigationError> {
        let question = self.current.as_ref().ok_or(NavigationError::NotLoaded)?;
        self.answers.insert(question.id, option_text.to_string());
        Ok(())
    }

    pub(crate) fn select_option(&mut self, number: usize) -> Result<(), NavigationError> {
        let question = self.current.as_ref().ok_or(NavigationError::NotLoaded)?;
        let text = question.option(number).ok_or(NavigationError::UnknownOption(number))?;
        let text = text.to_string();
        self.select_answer(&text)
    }

    /// Advancing requires an answer for the current question. On the last question
    /// submit takes the place of next.
    pub(crate) fn next(&mut self) -> Result<LoadTicket, NavigationError> {
        let question = self.current.as_ref().ok_or(NavigationError::NotLoaded)?;
        if !self.answers.contains_key(&question.id) {
            return Err(NavigationError::AnswerRequired);
        }
        if self.primary_action() == PrimaryAction::Submit {
            return Err(NavigationError::AtLastQuestion);
        }
        Ok(self.begin_load(self.current_index + 1))
    }

    pub(crate) fn previous(&mut self) -> LoadTicket {
        self.begin_load(self.current_index.saturating_sub(1))
    }

    pub(crate) fn reload(&mut self) -> LoadTicket {
        self.begin_load(self.current_index)
    }

    pub(crate) fn can_submit(&self) -> Result<(), NavigationError> {
        match self.primary_action() {
            PrimaryAction::Submit => Ok(()),
            PrimaryAction::Next => Err(NavigationError::NotAtLastQuestion),
        }
    }
}

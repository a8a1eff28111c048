use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::mastery::AttemptOutcome;
use super::DifficultyBand;
use crate::error::{EngineError, EngineResult};

/// Highest hint tier the escalation engine hands out.
pub const MAX_HINT_TIER: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Open,
    Completed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptEvent {
    WrongSubmission,
    Complete { was_skipped: bool },
}

impl AttemptEvent {
    fn operation(self) -> &'static str {
        match self {
            AttemptEvent::WrongSubmission => "log a wrong submission",
            AttemptEvent::Complete { .. } => "complete",
        }
    }
}

impl AttemptStatus {
    /// Transition table. `None` means the event is illegal in this state.
    pub fn transition(self, event: AttemptEvent) -> Option<AttemptStatus> {
        match (self, event) {
            (AttemptStatus::Open, AttemptEvent::WrongSubmission) => Some(AttemptStatus::Open),
            (AttemptStatus::Open, AttemptEvent::Complete { was_skipped: false }) => {
                Some(AttemptStatus::Completed)
            }
            (AttemptStatus::Open, AttemptEvent::Complete { was_skipped: true }) => {
                Some(AttemptStatus::Skipped)
            }
            (AttemptStatus::Completed | AttemptStatus::Skipped, _) => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, AttemptStatus::Open)
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AttemptStatus::Open => "open",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub question_id: String,
    pub topic: String,
    pub difficulty_band: DifficultyBand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub time_taken_sec: Option<f64>,
    pub wrong_attempts: u32,
    pub final_correct: bool,
    pub was_skipped: bool,
    pub error_types: BTreeSet<String>,
    pub hint_tiers_used: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_snapshot: Option<String>,
    /// Set once the outcome has been folded into the topic record. A closed
    /// attempt without it has a pending mastery update.
    #[serde(default)]
    pub mastery_applied: bool,
}

impl Attempt {
    pub fn open(id: String, req: BeginAttemptRequest, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: req.user_id,
            question_id: req.question_id,
            topic: req.topic,
            difficulty_band: req.difficulty_band,
            language: req.language,
            status: AttemptStatus::Open,
            started_at: now,
            ended_at: None,
            time_taken_sec: None,
            wrong_attempts: 0,
            final_correct: false,
            was_skipped: false,
            error_types: BTreeSet::new(),
            hint_tiers_used: Vec::new(),
            code_snapshot: None,
            mastery_applied: false,
        }
    }

    /// Closed but not yet reflected in the topic record.
    pub fn is_mastery_pending(&self) -> bool {
        self.status.is_terminal() && !self.mastery_applied
    }

    /// What the mastery model sees for this attempt; `None` while it is open.
    pub fn outcome(&self) -> Option<AttemptOutcome> {
        if !self.status.is_terminal() {
            return None;
        }
        Some(AttemptOutcome {
            attempt_id: self.id.clone(),
            attempt_band: self.difficulty_band,
            final_correct: self.final_correct,
            time_taken_sec: self.time_taken_sec.unwrap_or_default(),
            was_skipped: self.was_skipped,
        })
    }

    fn advance(&mut self, event: AttemptEvent) -> EngineResult<()> {
        match self.status.transition(event) {
            Some(next) => {
                self.status = next;
                Ok(())
            }
            None => Err(EngineError::InvalidState {
                attempt_id: self.id.clone(),
                status: self.status,
                operation: event.operation(),
            }),
        }
    }

    pub fn record_wrong_submission(&mut self, submission: WrongSubmission) -> EngineResult<()> {
        submission.check()?;
        self.advance(AttemptEvent::WrongSubmission)?;

        self.wrong_attempts += 1;
        self.error_types.extend(submission.error_types);
        if let Some(tier) = submission.hint_tier_used {
            self.hint_tiers_used.push(tier);
        }
        if submission.code_snapshot.is_some() {
            self.code_snapshot = submission.code_snapshot;
        }
        Ok(())
    }

    pub fn close(
        &mut self,
        final_correct: bool,
        was_skipped: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        self.advance(AttemptEvent::Complete { was_skipped })?;

        // Clock skew must not produce a negative duration.
        let elapsed_ms = (now - self.started_at).num_milliseconds().max(0);
        self.ended_at = Some(now);
        self.time_taken_sec = Some(elapsed_ms as f64 / 1000.0);
        self.final_correct = final_correct;
        self.was_skipped = was_skipped;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BeginAttemptRequest {
    #[validate(length(min = 1, max = 128, message = "userId must be 1-128 characters"))]
    pub user_id: String,

    #[validate(length(min = 1, max = 128, message = "questionId must be 1-128 characters"))]
    pub question_id: String,

    pub topic: String,

    pub difficulty_band: DifficultyBand,

    #[validate(length(min = 1, max = 32, message = "language must be 1-32 characters"))]
    pub language: Option<String>,
}

impl BeginAttemptRequest {
    pub fn new(
        user_id: impl Into<String>,
        question_id: impl Into<String>,
        topic: impl Into<String>,
        difficulty_band: DifficultyBand,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            question_id: question_id.into(),
            topic: topic.into(),
            difficulty_band,
            language: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Error signals reported by the UI for one failed submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrongSubmission {
    #[serde(default)]
    pub error_types: Vec<String>,
    pub hint_tier_used: Option<u8>,
    pub code_snapshot: Option<String>,
}

impl WrongSubmission {
    pub fn with_errors<I, S>(error_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            error_types: error_types.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn hint_tier(mut self, tier: u8) -> Self {
        self.hint_tier_used = Some(tier);
        self
    }

    pub fn code(mut self, snapshot: impl Into<String>) -> Self {
        self.code_snapshot = Some(snapshot.into());
        self
    }

    pub(crate) fn check(&self) -> EngineResult<()> {
        if let Some(tier) = self.hint_tier_used {
            if !(1..=MAX_HINT_TIER).contains(&tier) {
                return Err(EngineError::validation(format!(
                    "hintTierUsed must be between 1 and {}, got {}",
                    MAX_HINT_TIER, tier
                )));
            }
        }
        if self.error_types.iter().any(|e| e.trim().is_empty()) {
            return Err(EngineError::validation("errorTypes must not contain blanks"));
        }
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DifficultyBand;

/// Tunables for the per-topic moving averages and band rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryParams {
    pub smoothing_alpha: f64,
    pub failure_streak_cap: u32,
    pub demote_streak: u32,
    pub promote_accuracy: f64,
}

impl Default for MasteryParams {
    fn default() -> Self {
        Self {
            smoothing_alpha: 0.3,
            failure_streak_cap: 10,
            demote_streak: 3,
            promote_accuracy: 0.8,
        }
    }
}

/// How many folded attempt ids a topic record remembers for deduplication.
pub const APPLIED_ATTEMPTS_RETAINED: usize = 32;

/// One finished attempt as seen by the mastery model.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptOutcome {
    pub attempt_id: String,
    pub attempt_band: DifficultyBand,
    pub final_correct: bool,
    pub time_taken_sec: f64,
    pub was_skipped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandTransition {
    Promoted,
    Demoted,
    Unchanged,
}

/// Per (user, topic) record in `topic_stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicMasteryState {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub topic: String,
    pub accuracy_ema: f64,
    pub avg_time_sec_ema: f64,
    pub attempts_count: u32,
    pub correct_count: u32,
    pub recent_failure_streak: u32,
    pub current_difficulty_band: DifficultyBand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_band: Option<DifficultyBand>,
    pub last_updated: DateTime<Utc>,
    /// Optimistic-concurrency counter, bumped on every successful save.
    #[serde(default)]
    pub version: i64,
    /// Most recent attempts already folded in, oldest first.
    #[serde(default)]
    pub applied_attempt_ids: Vec<String>,
}

impl TopicMasteryState {
    pub fn key(user_id: &str, topic: &str) -> String {
        format!("{}:{}", user_id, topic)
    }

    /// Defaults used before the first completed attempt on a topic.
    pub fn fresh(user_id: &str, topic: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Self::key(user_id, topic),
            user_id: user_id.to_string(),
            topic: topic.to_string(),
            accuracy_ema: 0.0,
            avg_time_sec_ema: 0.0,
            attempts_count: 0,
            correct_count: 0,
            recent_failure_streak: 0,
            current_difficulty_band: DifficultyBand::Easy,
            last_attempt_band: None,
            last_updated: now,
            version: 0,
            applied_attempt_ids: Vec::new(),
        }
    }

    pub fn has_applied(&self, attempt_id: &str) -> bool {
        self.applied_attempt_ids.iter().any(|id| id == attempt_id)
    }

    /// Folds one outcome into the state. The returned state keeps the old
    /// `version`; the store bumps it on save.
    pub fn apply(
        &self,
        outcome: &AttemptOutcome,
        params: &MasteryParams,
        now: DateTime<Utc>,
    ) -> (TopicMasteryState, BandTransition) {
        let alpha = params.smoothing_alpha;
        let score = if outcome.final_correct { 1.0 } else { 0.0 };
        let time_taken = outcome.time_taken_sec.max(0.0);

        let accuracy_ema = (alpha * score + (1.0 - alpha) * self.accuracy_ema).clamp(0.0, 1.0);
        let avg_time_sec_ema = (alpha * time_taken + (1.0 - alpha) * self.avg_time_sec_ema).max(0.0);

        let recent_failure_streak = if outcome.final_correct {
            0
        } else {
            (self.recent_failure_streak + 1).min(params.failure_streak_cap)
        };

        let band = self.current_difficulty_band;
        let next_band = if recent_failure_streak >= params.demote_streak {
            band.step_down()
        } else if accuracy_ema >= params.promote_accuracy
            && avg_time_sec_ema <= self.avg_time_sec_ema
        {
            band.step_up()
        } else {
            band
        };

        let transition = match next_band.cmp(&band) {
            std::cmp::Ordering::Greater => BandTransition::Promoted,
            std::cmp::Ordering::Less => BandTransition::Demoted,
            std::cmp::Ordering::Equal => BandTransition::Unchanged,
        };

        let mut applied_attempt_ids = self.applied_attempt_ids.clone();
        applied_attempt_ids.push(outcome.attempt_id.clone());
        if applied_attempt_ids.len() > APPLIED_ATTEMPTS_RETAINED {
            let excess = applied_attempt_ids.len() - APPLIED_ATTEMPTS_RETAINED;
            applied_attempt_ids.drain(..excess);
        }

        let next = TopicMasteryState {
            accuracy_ema,
            avg_time_sec_ema,
            attempts_count: self.attempts_count + 1,
            correct_count: self.correct_count + u32::from(outcome.final_correct),
            recent_failure_streak,
            current_difficulty_band: next_band,
            last_attempt_band: Some(outcome.attempt_band),
            last_updated: now,
            applied_attempt_ids,
            ..self.clone()
        };

        (next, transition)
    }
}

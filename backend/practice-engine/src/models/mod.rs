use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod attempt;
pub mod event;
pub mod hint;
pub mod mastery;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyBand {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl DifficultyBand {
    /// One band up, saturating at `Hard`.
    pub fn step_up(self) -> Self {
        match self {
            DifficultyBand::Easy => DifficultyBand::Medium,
            DifficultyBand::Medium | DifficultyBand::Hard => DifficultyBand::Hard,
        }
    }

    /// One band down, saturating at `Easy`.
    pub fn step_down(self) -> Self {
        match self {
            DifficultyBand::Hard => DifficultyBand::Medium,
            DifficultyBand::Medium | DifficultyBand::Easy => DifficultyBand::Easy,
        }
    }

    /// Bands a learner sitting at `self` may be offered.
    pub fn adjacent(self) -> &'static [DifficultyBand] {
        match self {
            DifficultyBand::Easy => &[DifficultyBand::Easy, DifficultyBand::Medium],
            DifficultyBand::Medium => &[
                DifficultyBand::Easy,
                DifficultyBand::Medium,
                DifficultyBand::Hard,
            ],
            DifficultyBand::Hard => &[DifficultyBand::Medium, DifficultyBand::Hard],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DifficultyBand::Easy => "easy",
            DifficultyBand::Medium => "medium",
            DifficultyBand::Hard => "hard",
        }
    }
}

impl std::fmt::Display for DifficultyBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only catalog entry from the `questions` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub statement: String,
    pub topic: String,
    pub difficulty: DifficultyBand,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starter_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_cases: Option<serde_json::Value>,
}

/// Last time a user was shown a question (`recent_questions` collection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecencyEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub question_id: String,
    pub last_seen: DateTime<Utc>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DifficultyBand;

/// Outbound notifications for the UI layer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EngineEvent {
    AttemptStarted(AttemptStarted),
    AttemptCompleted(AttemptCompleted),
    BandChanged(BandChanged),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AttemptStarted {
    pub attempt_id: String,
    pub user_id: String,
    pub question_id: String,
    pub topic: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AttemptCompleted {
    pub attempt_id: String,
    pub user_id: String,
    pub topic: String,
    pub final_correct: bool,
    pub was_skipped: bool,
    pub time_taken_sec: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BandChanged {
    pub user_id: String,
    pub topic: String,
    pub from: DifficultyBand,
    pub to: DifficultyBand,
    pub timestamp: DateTime<Utc>,
}

impl EngineEvent {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            EngineEvent::AttemptStarted(_) => "attempt-started",
            EngineEvent::AttemptCompleted(_) => "attempt-completed",
            EngineEvent::BandChanged(_) => "band-changed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_type_tag_matches_event_name() {
        let event = EngineEvent::BandChanged(BandChanged {
            user_id: "u-1".to_string(),
            topic: "arrays".to_string(),
            from: DifficultyBand::Easy,
            to: DifficultyBand::Medium,
            timestamp: Utc::now(),
        });
        let json: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(json["type"], event.event_name());
        assert_eq!(json["to"], "medium");
    }
}

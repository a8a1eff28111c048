use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::SelectorSettings;
use crate::error::EngineResult;
use crate::metrics::SELECTIONS_TOTAL;
use crate::models::mastery::TopicMasteryState;
use crate::models::{DifficultyBand, Question};
use crate::services::validate_topic;
use crate::store::PracticeStore;
use crate::utils::retry::{retry_async_with_config, RetryConfig};
use crate::utils::time::{hours_between, Clock};

/// 0 when never seen or seen at least one window ago, approaching 1 as the
/// last sighting approaches `now`.
pub fn recency_penalty(
    last_seen: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window_hours: f64,
) -> f64 {
    match last_seen {
        None => 0.0,
        Some(seen) => {
            let hours = hours_between(seen, now).max(0.0);
            (1.0 - (hours / window_hours).min(1.0)).max(0.0)
        }
    }
}

pub fn score_candidate(
    question: &Question,
    target_band: DifficultyBand,
    last_seen: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    settings: &SelectorSettings,
) -> f64 {
    let exact_match = if question.difficulty == target_band { 1.0 } else { 0.0 };
    settings.exact_band_weight * exact_match + settings.tag_weight * question.tags.len() as f64
        - settings.recency_weight
            * recency_penalty(last_seen, now, settings.recency_window_hours)
}

/// Topic with the lowest accuracy EMA; ties go to the alphabetically first topic.
fn weakest_topic(states: &[TopicMasteryState]) -> Option<&TopicMasteryState> {
    states.iter().min_by(|a, b| {
        a.accuracy_ema
            .total_cmp(&b.accuracy_ema)
            .then_with(|| a.topic.cmp(&b.topic))
    })
}

pub struct SelectorService {
    store: Arc<dyn PracticeStore>,
    clock: Arc<dyn Clock>,
    settings: SelectorSettings,
    retry: RetryConfig,
}

impl SelectorService {
    pub fn new(
        store: Arc<dyn PracticeStore>,
        clock: Arc<dyn Clock>,
        settings: SelectorSettings,
        retry: RetryConfig,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
            retry,
        }
    }

    /// Picks the next exercise for `user_id`, or `None` when the catalog has
    /// nothing in the allowed bands for the target topic.
    pub async fn select_next(
        &self,
        user_id: &str,
        topic_preference: Option<&str>,
    ) -> EngineResult<Option<Question>> {
        if let Some(topic) = topic_preference {
            validate_topic(topic)?;
        }

        let (topic, band) = self.resolve_target(user_id, topic_preference).await?;
        let allowed = band.adjacent();

        let candidates: Vec<Question> =
            retry_async_with_config(&self.retry, "questions_by_topic", || async {
                self.store.questions_by_topic(&topic).await
            })
            .await?
            .into_iter()
            .filter(|q| allowed.contains(&q.difficulty))
            .collect();

        if candidates.is_empty() {
            SELECTIONS_TOTAL.with_label_values(&["empty"]).inc();
            tracing::info!(
                "No candidates for user={}, topic={}, band={} (allowed {:?})",
                user_id,
                topic,
                band,
                allowed
            );
            return Ok(None);
        }

        let recent: HashMap<String, DateTime<Utc>> =
            retry_async_with_config(&self.retry, "recent_questions", || async {
                self.store.recent_questions(user_id).await
            })
            .await?;

        let now = self.clock.now();
        let mut best: Option<(f64, Question)> = None;
        for question in candidates {
            let score = score_candidate(
                &question,
                band,
                recent.get(&question.id).copied(),
                now,
                &self.settings,
            );
            tracing::debug!("Candidate {} scored {:.3}", question.id, score);
            // Strict comparison keeps the earliest candidate on ties.
            if best.as_ref().map_or(true, |(top, _)| score > *top) {
                best = Some((score, question));
            }
        }

        let Some((score, chosen)) = best else {
            return Ok(None);
        };

        retry_async_with_config(&self.retry, "touch_recency", || async {
            self.store.touch_recency(user_id, &chosen.id, now).await
        })
        .await?;

        SELECTIONS_TOTAL.with_label_values(&["selected"]).inc();
        tracing::info!(
            "Selected question={} for user={}, topic={}, band={}, score={:.3}",
            chosen.id,
            user_id,
            topic,
            band,
            score
        );

        Ok(Some(chosen))
    }

    async fn resolve_target(
        &self,
        user_id: &str,
        topic_preference: Option<&str>,
    ) -> EngineResult<(String, DifficultyBand)> {
        if let Some(topic) = topic_preference {
            let state = retry_async_with_config(&self.retry, "get_topic_state", || async {
                self.store.get_topic_state(user_id, topic).await
            })
            .await?;
            let band = state
                .map(|s| s.current_difficulty_band)
                .unwrap_or_default();
            return Ok((topic.to_string(), band));
        }

        let states = retry_async_with_config(&self.retry, "list_topic_states", || async {
            self.store.list_topic_states(user_id).await
        })
        .await?;

        Ok(match weakest_topic(&states) {
            Some(state) => (state.topic.clone(), state.current_difficulty_band),
            None => (self.settings.fallback_topic.clone(), DifficultyBand::Easy),
        })
    }
}

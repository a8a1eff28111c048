use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::MasterySettings;
use crate::error::{EngineError, EngineResult};
use crate::metrics::BAND_TRANSITIONS_TOTAL;
use crate::models::event::{BandChanged, EngineEvent};
use crate::models::mastery::{AttemptOutcome, BandTransition, MasteryParams, TopicMasteryState};
use crate::store::PracticeStore;
use crate::utils::retry::{retry_async_with_config, RetryConfig};
use crate::utils::time::Clock;

pub struct MasteryService {
    store: Arc<dyn PracticeStore>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<EngineEvent>,
    params: MasteryParams,
    max_conflict_retries: u32,
    retry: RetryConfig,
}

impl MasteryService {
    pub fn new(
        store: Arc<dyn PracticeStore>,
        clock: Arc<dyn Clock>,
        events: broadcast::Sender<EngineEvent>,
        settings: &MasterySettings,
        retry: RetryConfig,
    ) -> Self {
        Self {
            store,
            clock,
            events,
            params: settings.params(),
            max_conflict_retries: settings.max_conflict_retries,
            retry,
        }
    }

    /// Folds one completed attempt into the (user, topic) record, at most once
    /// per attempt id.
    ///
    /// Read-modify-write guarded by the store's version check: if another
    /// completion for the same key lands in between, the state is re-read and
    /// the outcome applied again on top of it. A failed write is not retried
    /// blindly, since it may have landed; the next read decides.
    pub async fn update(
        &self,
        user_id: &str,
        topic: &str,
        outcome: &AttemptOutcome,
    ) -> EngineResult<TopicMasteryState> {
        if !outcome.time_taken_sec.is_finite() || outcome.time_taken_sec < 0.0 {
            return Err(EngineError::validation(format!(
                "timeTakenSec must be a non-negative number, got {}",
                outcome.time_taken_sec
            )));
        }

        let mut conflicts = 0;
        let mut write_failures = 0;
        loop {
            let prior = retry_async_with_config(&self.retry, "get_topic_state", || async {
                self.store.get_topic_state(user_id, topic).await
            })
            .await?;

            if let Some(state) = prior.as_ref() {
                if state.has_applied(&outcome.attempt_id) {
                    tracing::debug!(
                        "Attempt {} already folded into topic state {}:{}",
                        outcome.attempt_id,
                        user_id,
                        topic
                    );
                    return Ok(state.clone());
                }
            }

            let now = self.clock.now();
            let expected_version = prior.as_ref().map(|s| s.version);
            let base = prior.unwrap_or_else(|| TopicMasteryState::fresh(user_id, topic, now));
            let (next, transition) = base.apply(outcome, &self.params, now);

            let write_once = RetryConfig::no_retry();
            let saved = retry_async_with_config(&write_once, "save_topic_state", || async {
                self.store.save_topic_state(&next, expected_version).await
            })
            .await;

            match saved {
                Ok(true) => {
                    tracing::debug!(
                        "Topic state updated: user={}, topic={}, accuracy_ema={:.3}, avg_time_ema={:.1}s, streak={}, skipped={}",
                        user_id,
                        topic,
                        next.accuracy_ema,
                        next.avg_time_sec_ema,
                        next.recent_failure_streak,
                        outcome.was_skipped
                    );
                    self.announce_transition(&base, &next, transition);
                    let mut stored = next;
                    stored.version = expected_version.map_or(1, |v| v + 1);
                    return Ok(stored);
                }
                Ok(false) => {
                    conflicts += 1;
                    if conflicts > self.max_conflict_retries {
                        tracing::error!(
                            "Giving up on topic state update after {} conflicts: user={}, topic={}",
                            conflicts,
                            user_id,
                            topic
                        );
                        return Err(EngineError::TransientIo(anyhow::anyhow!(
                            "concurrent updates to topic state {}:{} kept conflicting",
                            user_id,
                            topic
                        )));
                    }
                    tracing::warn!(
                        "Concurrent topic state update detected (user={}, topic={}); retrying ({}/{})",
                        user_id,
                        topic,
                        conflicts,
                        self.max_conflict_retries
                    );
                }
                Err(e) => {
                    write_failures += 1;
                    if write_failures >= self.retry.max_attempts {
                        return Err(e.into());
                    }
                    tracing::warn!(
                        "Topic state write for {}:{} failed ({:#}); re-reading before retrying",
                        user_id,
                        topic,
                        e
                    );
                    tokio::time::sleep(self.retry.base_backoff).await;
                }
            }
        }
    }

    fn announce_transition(
        &self,
        before: &TopicMasteryState,
        after: &TopicMasteryState,
        transition: BandTransition,
    ) {
        let direction = match transition {
            BandTransition::Promoted => "up",
            BandTransition::Demoted => "down",
            BandTransition::Unchanged => return,
        };

        BAND_TRANSITIONS_TOTAL.with_label_values(&[direction]).inc();
        tracing::info!(
            "Difficulty band changed: user={}, topic={}, {} -> {}",
            after.user_id,
            after.topic,
            before.current_difficulty_band,
            after.current_difficulty_band
        );

        // No subscribers is fine.
        let _ = self.events.send(EngineEvent::BandChanged(BandChanged {
            user_id: after.user_id.clone(),
            topic: after.topic.clone(),
            from: before.current_difficulty_band,
            to: after.current_difficulty_band,
            timestamp: after.last_updated,
        }));
    }

    pub async fn get_state(
        &self,
        user_id: &str,
        topic: &str,
    ) -> EngineResult<Option<TopicMasteryState>> {
        Ok(
            retry_async_with_config(&self.retry, "get_topic_state", || async {
                self.store.get_topic_state(user_id, topic).await
            })
            .await?,
        )
    }

    pub async fn list_states(&self, user_id: &str) -> EngineResult<Vec<TopicMasteryState>> {
        Ok(
            retry_async_with_config(&self.retry, "list_topic_states", || async {
                self.store.list_topic_states(user_id).await
            })
            .await?,
        )
    }
}

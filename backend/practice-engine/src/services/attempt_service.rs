use std::sync::Arc;

use tokio::sync::broadcast;
use uuid::Uuid;
use validator::Validate;

use super::mastery_service::MasteryService;
use super::validate_topic;
use crate::config::AttemptSettings;
use crate::error::{EngineError, EngineResult};
use crate::metrics::{ATTEMPTS_TOTAL, WRONG_SUBMISSIONS_TOTAL};
use crate::models::attempt::{Attempt, AttemptStatus, BeginAttemptRequest, WrongSubmission};
use crate::models::event::{AttemptCompleted, AttemptStarted, EngineEvent};
use crate::store::PracticeStore;
use crate::utils::retry::{retry_async_with_config, RetryConfig};
use crate::utils::time::Clock;

pub struct AttemptService {
    store: Arc<dyn PracticeStore>,
    clock: Arc<dyn Clock>,
    mastery: Arc<MasteryService>,
    events: broadcast::Sender<EngineEvent>,
    settings: AttemptSettings,
    retry: RetryConfig,
}

impl AttemptService {
    pub fn new(
        store: Arc<dyn PracticeStore>,
        clock: Arc<dyn Clock>,
        mastery: Arc<MasteryService>,
        events: broadcast::Sender<EngineEvent>,
        settings: AttemptSettings,
        retry: RetryConfig,
    ) -> Self {
        Self {
            store,
            clock,
            mastery,
            events,
            settings,
            retry,
        }
    }

    /// Opens a new attempt and returns its id.
    pub async fn begin(&self, req: BeginAttemptRequest) -> EngineResult<String> {
        req.validate()?;
        validate_topic(&req.topic)?;

        if self.settings.enforce_single_open {
            let open = retry_async_with_config(&self.retry, "find_open_attempt", || async {
                self.store.find_open_attempt(&req.user_id).await
            })
            .await?;
            if let Some(existing) = open {
                tracing::warn!(
                    "User {} already has open attempt {}; refusing to begin another",
                    req.user_id,
                    existing.id
                );
                return Err(EngineError::InvalidState {
                    attempt_id: existing.id,
                    status: AttemptStatus::Open,
                    operation: "begin another attempt while this one is open",
                });
            }
        }

        let attempt = Attempt::open(Uuid::new_v4().to_string(), req, self.clock.now());

        retry_async_with_config(&self.retry, "insert_attempt", || async {
            match self.store.insert_attempt(&attempt).await {
                Ok(()) => Ok(()),
                // The insert may have landed with only the acknowledgement lost.
                Err(e) => match self.store.get_attempt(&attempt.id).await {
                    Ok(Some(_)) => {
                        tracing::warn!(
                            "Insert of attempt {} reported failure but the record exists: {:#}",
                            attempt.id,
                            e
                        );
                        Ok(())
                    }
                    _ => Err(e),
                },
            }
        })
        .await?;

        ATTEMPTS_TOTAL.with_label_values(&["started"]).inc();
        tracing::info!(
            "Attempt opened: id={}, user={}, question={}, topic={}, band={}",
            attempt.id,
            attempt.user_id,
            attempt.question_id,
            attempt.topic,
            attempt.difficulty_band
        );

        let _ = self.events.send(EngineEvent::AttemptStarted(AttemptStarted {
            attempt_id: attempt.id.clone(),
            user_id: attempt.user_id.clone(),
            question_id: attempt.question_id.clone(),
            topic: attempt.topic.clone(),
            timestamp: attempt.started_at,
        }));

        Ok(attempt.id)
    }

    /// Records one failed submission against an open attempt.
    pub async fn log_wrong_submission(
        &self,
        attempt_id: &str,
        submission: WrongSubmission,
    ) -> EngineResult<Attempt> {
        let mut attempt = self.load(attempt_id).await?;
        attempt.record_wrong_submission(submission)?;
        self.save(&attempt).await?;

        WRONG_SUBMISSIONS_TOTAL.inc();
        tracing::info!(
            "Wrong submission logged: attempt={}, wrong_attempts={}, error_types={:?}",
            attempt.id,
            attempt.wrong_attempts,
            attempt.error_types
        );

        Ok(attempt)
    }

    /// Closes an open attempt and pushes its outcome into the mastery model.
    ///
    /// If an earlier call closed the attempt but failed before the topic record
    /// was updated, calling again finishes that update with the recorded
    /// outcome instead of failing with `InvalidState`.
    pub async fn complete(
        &self,
        attempt_id: &str,
        final_correct: bool,
        was_skipped: bool,
    ) -> EngineResult<Attempt> {
        let mut attempt = self.load(attempt_id).await?;

        if attempt.is_mastery_pending() {
            tracing::warn!(
                "Resuming completion of attempt {}: status={}, recorded correct={}, skipped={}",
                attempt.id,
                attempt.status,
                attempt.final_correct,
                attempt.was_skipped
            );
        } else {
            attempt.close(final_correct, was_skipped, self.clock.now())?;
            self.save(&attempt).await?;
        }

        let Some(outcome) = attempt.outcome() else {
            return Err(EngineError::InvalidState {
                attempt_id: attempt.id,
                status: attempt.status,
                operation: "complete",
            });
        };
        self.mastery
            .update(&attempt.user_id, &attempt.topic, &outcome)
            .await?;

        attempt.mastery_applied = true;
        self.save(&attempt).await?;

        let label = match attempt.status {
            AttemptStatus::Skipped => "skipped",
            _ if outcome.final_correct => "correct",
            _ => "incorrect",
        };
        ATTEMPTS_TOTAL.with_label_values(&[label]).inc();
        tracing::info!(
            "Attempt closed: id={}, status={}, correct={}, time_taken={:.1}s, wrong_attempts={}",
            attempt.id,
            attempt.status,
            outcome.final_correct,
            outcome.time_taken_sec,
            attempt.wrong_attempts
        );

        let _ = self
            .events
            .send(EngineEvent::AttemptCompleted(AttemptCompleted {
                attempt_id: attempt.id.clone(),
                user_id: attempt.user_id.clone(),
                topic: attempt.topic.clone(),
                final_correct: outcome.final_correct,
                was_skipped: outcome.was_skipped,
                time_taken_sec: outcome.time_taken_sec,
                timestamp: attempt.ended_at.unwrap_or_else(|| self.clock.now()),
            }));

        Ok(attempt)
    }

    pub async fn get_attempt(&self, attempt_id: &str) -> EngineResult<Attempt> {
        self.load(attempt_id).await
    }

    async fn save(&self, attempt: &Attempt) -> EngineResult<()> {
        retry_async_with_config(&self.retry, "replace_attempt", || async {
            self.store.replace_attempt(attempt).await
        })
        .await?;
        Ok(())
    }

    async fn load(&self, attempt_id: &str) -> EngineResult<Attempt> {
        retry_async_with_config(&self.retry, "get_attempt", || async {
            self.store.get_attempt(attempt_id).await
        })
        .await?
        .ok_or_else(|| EngineError::not_found("attempt", attempt_id))
    }
}

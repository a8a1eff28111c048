use std::sync::Arc;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::models::attempt::{Attempt, BeginAttemptRequest, WrongSubmission};
use crate::models::event::EngineEvent;
use crate::models::hint::{HintRequest, HintResponse};
use crate::models::mastery::TopicMasteryState;
use crate::models::Question;
use crate::store::{MongoStore, PracticeStore};
use crate::utils::retry::RetryConfig;
use crate::utils::time::{Clock, SystemClock};

pub mod attempt_service;
pub mod hint_provider;
pub mod hint_service;
pub mod mastery_service;
pub mod selector_service;

use attempt_service::AttemptService;
use hint_provider::{HintProvider, HttpHintProvider};
use hint_service::HintService;
use mastery_service::MasteryService;
use selector_service::SelectorService;

const EVENT_CHANNEL_CAPACITY: usize = 256;

lazy_static! {
    static ref TOPIC_REGEX: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 _-]{0,63}$").unwrap();
}

pub fn validate_topic(topic: &str) -> EngineResult<()> {
    if TOPIC_REGEX.is_match(topic) {
        Ok(())
    } else {
        Err(EngineError::validation(format!(
            "topic '{}' must be 1-64 letters, digits, spaces, '_' or '-'",
            topic
        )))
    }
}

/// Entry point for the UI layer: wires the four components over one store.
pub struct PracticeEngine {
    pub attempts: AttemptService,
    pub mastery: Arc<MasteryService>,
    pub selector: SelectorService,
    pub hints: HintService,
    events: broadcast::Sender<EngineEvent>,
}

impl PracticeEngine {
    pub fn new(
        config: &Config,
        store: Arc<dyn PracticeStore>,
        hint_provider: Option<Arc<dyn HintProvider>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let retry = RetryConfig::from(&config.retry);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let mastery = Arc::new(MasteryService::new(
            store.clone(),
            clock.clone(),
            events.clone(),
            &config.mastery,
            retry.clone(),
        ));
        let attempts = AttemptService::new(
            store.clone(),
            clock.clone(),
            mastery.clone(),
            events.clone(),
            config.attempts.clone(),
            retry.clone(),
        );
        let selector =
            SelectorService::new(store.clone(), clock, config.selector.clone(), retry.clone());
        let hints = HintService::new(store, hint_provider, &config.hints, retry);

        Self {
            attempts,
            mastery,
            selector,
            hints,
            events,
        }
    }

    /// Production wiring: MongoDB store, HTTP hint provider when configured,
    /// wall clock.
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let store: Arc<dyn PracticeStore> =
            Arc::new(MongoStore::connect(&config.database).await?);

        let provider: Option<Arc<dyn HintProvider>> = match &config.hints.remote_url {
            Some(url) => {
                tracing::info!("Remote hint provider enabled: {}", url);
                Some(Arc::new(HttpHintProvider::new(
                    url.clone(),
                    Duration::from_millis(config.hints.remote_timeout_ms),
                )?))
            }
            None => {
                tracing::info!("Remote hint provider disabled; using local rules only");
                None
            }
        };

        Ok(Self::new(config, store, provider, Arc::new(SystemClock)))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub async fn begin(&self, req: BeginAttemptRequest) -> EngineResult<String> {
        self.attempts.begin(req).await
    }

    pub async fn log_wrong_submission(
        &self,
        attempt_id: &str,
        submission: WrongSubmission,
    ) -> EngineResult<Attempt> {
        self.attempts
            .log_wrong_submission(attempt_id, submission)
            .await
    }

    pub async fn complete(
        &self,
        attempt_id: &str,
        final_correct: bool,
        was_skipped: bool,
    ) -> EngineResult<Attempt> {
        self.attempts
            .complete(attempt_id, final_correct, was_skipped)
            .await
    }

    pub async fn select_next(
        &self,
        user_id: &str,
        topic_preference: Option<&str>,
    ) -> EngineResult<Option<Question>> {
        self.selector.select_next(user_id, topic_preference).await
    }

    pub async fn get_hint(&self, req: &HintRequest) -> EngineResult<HintResponse> {
        self.hints.get_hint(req).await
    }

    pub async fn topic_state(
        &self,
        user_id: &str,
        topic: &str,
    ) -> EngineResult<Option<TopicMasteryState>> {
        self.mastery.get_state(user_id, topic).await
    }

    /// Every tracked topic for the user, ordered by topic name.
    pub async fn topic_states(&self, user_id: &str) -> EngineResult<Vec<TopicMasteryState>> {
        self.mastery.list_states(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_format() {
        assert!(validate_topic("arrays").is_ok());
        assert!(validate_topic("dynamic-programming").is_ok());
        assert!(validate_topic("Two Pointers").is_ok());
        assert!(validate_topic("").is_err());
        assert!(validate_topic("-leading-dash").is_err());
        assert!(validate_topic("users/../admin").is_err());
        assert!(validate_topic(&"x".repeat(65)).is_err());
    }
}

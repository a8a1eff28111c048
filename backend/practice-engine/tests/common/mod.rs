#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use practice_engine::config::Config;
use practice_engine::models::attempt::Attempt;
use practice_engine::models::mastery::TopicMasteryState;
use practice_engine::models::{DifficultyBand, Question};
use practice_engine::services::hint_provider::HintProvider;
use practice_engine::store::{InMemoryStore, PracticeStore};
use practice_engine::utils::time::ManualClock;
use practice_engine::PracticeEngine;

pub struct TestHarness {
    pub engine: PracticeEngine,
    pub store: Arc<InMemoryStore>,
    pub clock: ManualClock,
    pub config: Config,
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    // Keep retries fast; the sleeps are real.
    config.retry.max_attempts = 3;
    config.retry.base_backoff_ms = 1;
    config.retry.max_backoff_ms = 4;
    config.retry.jitter_max_ms = 0;
    config
}

pub fn create_harness() -> TestHarness {
    create_harness_with(test_config(), catalog(), None)
}

pub fn create_harness_with(
    config: Config,
    questions: Vec<Question>,
    provider: Option<Arc<dyn HintProvider>>,
) -> TestHarness {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let store = Arc::new(InMemoryStore::with_questions(questions));
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap());
    let engine = PracticeEngine::new(&config, store.clone(), provider, Arc::new(clock.clone()));

    TestHarness {
        engine,
        store,
        clock,
        config,
    }
}

pub fn question(id: &str, topic: &str, band: DifficultyBand, tags: &[&str]) -> Question {
    Question {
        id: id.to_string(),
        title: format!("Question {}", id),
        statement: format!("Solve {}.", id),
        topic: topic.to_string(),
        difficulty: band,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        hints: Vec::new(),
        starter_code: None,
        test_cases: None,
    }
}

pub fn with_hints(mut question: Question, hints: &[&str]) -> Question {
    question.hints = hints.iter().map(|h| h.to_string()).collect();
    question
}

pub fn catalog() -> Vec<Question> {
    vec![
        with_hints(
            question("two-sum", "arrays", DifficultyBand::Easy, &["hash-map"]),
            &[
                "What value would pair with the current number?",
                "Store numbers you have already seen in a map.",
                "For each x, look up target - x before inserting x.",
            ],
        ),
        question("max-subarray", "arrays", DifficultyBand::Medium, &["dp"]),
        question("trapping-rain", "arrays", DifficultyBand::Hard, &["two-pointers"]),
        question("reverse-string", "strings", DifficultyBand::Easy, &[]),
        question("longest-palindrome", "strings", DifficultyBand::Medium, &["dp"]),
        question("word-ladder", "graphs", DifficultyBand::Hard, &["bfs"]),
    ]
}

fn take(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// In-memory store with targeted faults. "Lost ack" operations are applied
/// and then reported as failed, like a connection reset after the write.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: InMemoryStore,
    pub topic_read_failures: AtomicUsize,
    pub lost_save_acks: AtomicUsize,
    pub lost_insert_acks: AtomicUsize,
}

impl FaultyStore {
    pub fn with_questions(questions: Vec<Question>) -> Self {
        Self {
            inner: InMemoryStore::with_questions(questions),
            ..Self::default()
        }
    }
}

#[async_trait]
impl PracticeStore for FaultyStore {
    async fn insert_attempt(&self, attempt: &Attempt) -> Result<()> {
        self.inner.insert_attempt(attempt).await?;
        if take(&self.lost_insert_acks) {
            bail!("connection reset after inserting attempt {}", attempt.id);
        }
        Ok(())
    }

    async fn get_attempt(&self, attempt_id: &str) -> Result<Option<Attempt>> {
        self.inner.get_attempt(attempt_id).await
    }

    async fn replace_attempt(&self, attempt: &Attempt) -> Result<()> {
        self.inner.replace_attempt(attempt).await
    }

    async fn find_open_attempt(&self, user_id: &str) -> Result<Option<Attempt>> {
        self.inner.find_open_attempt(user_id).await
    }

    async fn get_topic_state(
        &self,
        user_id: &str,
        topic: &str,
    ) -> Result<Option<TopicMasteryState>> {
        if take(&self.topic_read_failures) {
            bail!("topic_stats unavailable");
        }
        self.inner.get_topic_state(user_id, topic).await
    }

    async fn list_topic_states(&self, user_id: &str) -> Result<Vec<TopicMasteryState>> {
        self.inner.list_topic_states(user_id).await
    }

    async fn save_topic_state(
        &self,
        state: &TopicMasteryState,
        expected_version: Option<i64>,
    ) -> Result<bool> {
        let saved = self.inner.save_topic_state(state, expected_version).await?;
        if saved && take(&self.lost_save_acks) {
            bail!("connection reset after saving topic state {}", state.id);
        }
        Ok(saved)
    }

    async fn recent_questions(&self, user_id: &str) -> Result<HashMap<String, DateTime<Utc>>> {
        self.inner.recent_questions(user_id).await
    }

    async fn touch_recency(
        &self,
        user_id: &str,
        question_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.inner.touch_recency(user_id, question_id, at).await
    }

    async fn questions_by_topic(&self, topic: &str) -> Result<Vec<Question>> {
        self.inner.questions_by_topic(topic).await
    }

    async fn get_question(&self, question_id: &str) -> Result<Option<Question>> {
        self.inner.get_question(question_id).await
    }
}

pub struct FaultyHarness {
    pub engine: PracticeEngine,
    pub store: Arc<FaultyStore>,
    pub clock: ManualClock,
}

pub fn create_faulty_harness() -> FaultyHarness {
    let store = Arc::new(FaultyStore::with_questions(catalog()));
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap());
    let engine = PracticeEngine::new(&test_config(), store.clone(), None, Arc::new(clock.clone()));
    FaultyHarness {
        engine,
        store,
        clock,
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{recency_key, PracticeStore};
use crate::models::attempt::{Attempt, AttemptStatus};
use crate::models::mastery::TopicMasteryState;
use crate::models::{Question, RecencyEntry};

#[derive(Default)]
struct Collections {
    attempts: HashMap<String, Attempt>,
    topic_stats: HashMap<String, TopicMasteryState>,
    recent_questions: HashMap<String, RecencyEntry>,
    questions: Vec<Question>,
}

/// Process-local store with the same contract as [`super::MongoStore`].
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Collections>,
    failures_pending: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_questions(questions: Vec<Question>) -> Self {
        Self {
            inner: Mutex::new(Collections {
                questions,
                ..Collections::default()
            }),
            failures_pending: AtomicUsize::new(0),
        }
    }

    pub async fn add_question(&self, question: Question) {
        self.inner.lock().await.questions.push(question);
    }

    /// Writes a topic record as-is, bypassing the version check.
    pub async fn seed_topic_state(&self, state: TopicMasteryState) {
        self.inner
            .lock()
            .await
            .topic_stats
            .insert(state.id.clone(), state);
    }

    /// Makes the next `n` operations fail as if the connection dropped.
    pub fn fail_next_operations(&self, n: usize) {
        self.failures_pending.store(n, Ordering::SeqCst);
    }

    fn check_fault(&self, operation: &str) -> Result<()> {
        let injected = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            bail!("injected store failure during {}", operation);
        }
        Ok(())
    }
}

#[async_trait]
impl PracticeStore for InMemoryStore {
    async fn insert_attempt(&self, attempt: &Attempt) -> Result<()> {
        self.check_fault("insert_attempt")?;
        let mut inner = self.inner.lock().await;
        if inner.attempts.contains_key(&attempt.id) {
            bail!("duplicate attempt id {}", attempt.id);
        }
        inner.attempts.insert(attempt.id.clone(), attempt.clone());
        Ok(())
    }

    async fn get_attempt(&self, attempt_id: &str) -> Result<Option<Attempt>> {
        self.check_fault("get_attempt")?;
        Ok(self.inner.lock().await.attempts.get(attempt_id).cloned())
    }

    async fn replace_attempt(&self, attempt: &Attempt) -> Result<()> {
        self.check_fault("replace_attempt")?;
        let mut inner = self.inner.lock().await;
        match inner.attempts.get_mut(&attempt.id) {
            Some(slot) => {
                *slot = attempt.clone();
                Ok(())
            }
            None => bail!("attempt {} vanished before replace", attempt.id),
        }
    }

    async fn find_open_attempt(&self, user_id: &str) -> Result<Option<Attempt>> {
        self.check_fault("find_open_attempt")?;
        Ok(self
            .inner
            .lock()
            .await
            .attempts
            .values()
            .find(|a| a.user_id == user_id && a.status == AttemptStatus::Open)
            .cloned())
    }

    async fn get_topic_state(
        &self,
        user_id: &str,
        topic: &str,
    ) -> Result<Option<TopicMasteryState>> {
        self.check_fault("get_topic_state")?;
        Ok(self
            .inner
            .lock()
            .await
            .topic_stats
            .get(&TopicMasteryState::key(user_id, topic))
            .cloned())
    }

    async fn list_topic_states(&self, user_id: &str) -> Result<Vec<TopicMasteryState>> {
        self.check_fault("list_topic_states")?;
        let inner = self.inner.lock().await;
        let mut states: Vec<TopicMasteryState> = inner
            .topic_stats
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        states.sort_by(|a, b| a.topic.cmp(&b.topic));
        Ok(states)
    }

    async fn save_topic_state(
        &self,
        state: &TopicMasteryState,
        expected_version: Option<i64>,
    ) -> Result<bool> {
        self.check_fault("save_topic_state")?;
        let mut inner = self.inner.lock().await;
        let current = inner.topic_stats.get(&state.id).map(|s| s.version);
        if current != expected_version {
            return Ok(false);
        }

        let mut next = state.clone();
        next.version = expected_version.map_or(1, |v| v + 1);
        inner.topic_stats.insert(next.id.clone(), next);
        Ok(true)
    }

    async fn recent_questions(&self, user_id: &str) -> Result<HashMap<String, DateTime<Utc>>> {
        self.check_fault("recent_questions")?;
        Ok(self
            .inner
            .lock()
            .await
            .recent_questions
            .values()
            .filter(|e| e.user_id == user_id)
            .map(|e| (e.question_id.clone(), e.last_seen))
            .collect())
    }

    async fn touch_recency(
        &self,
        user_id: &str,
        question_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.check_fault("touch_recency")?;
        let id = recency_key(user_id, question_id);
        self.inner.lock().await.recent_questions.insert(
            id.clone(),
            RecencyEntry {
                id,
                user_id: user_id.to_string(),
                question_id: question_id.to_string(),
                last_seen: at,
            },
        );
        Ok(())
    }

    async fn questions_by_topic(&self, topic: &str) -> Result<Vec<Question>> {
        self.check_fault("questions_by_topic")?;
        Ok(self
            .inner
            .lock()
            .await
            .questions
            .iter()
            .filter(|q| q.topic == topic)
            .cloned()
            .collect())
    }

    async fn get_question(&self, question_id: &str) -> Result<Option<Question>> {
        self.check_fault("get_question")?;
        Ok(self
            .inner
            .lock()
            .await
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DifficultyBand;

    fn question(id: &str, topic: &str) -> Question {
        Question {
            id: id.to_string(),
            title: String::new(),
            statement: String::new(),
            topic: topic.to_string(),
            difficulty: DifficultyBand::Easy,
            tags: Vec::new(),
            hints: Vec::new(),
            starter_code: None,
            test_cases: None,
        }
    }

    #[tokio::test]
    async fn save_topic_state_is_compare_and_swap() {
        let store = InMemoryStore::new();
        let state = TopicMasteryState::fresh("u-1", "arrays", Utc::now());

        assert!(store.save_topic_state(&state, None).await.unwrap());
        // Someone else already created it.
        assert!(!store.save_topic_state(&state, None).await.unwrap());

        let stored = store.get_topic_state("u-1", "arrays").await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert!(!store.save_topic_state(&stored, Some(0)).await.unwrap());
        assert!(store.save_topic_state(&stored, Some(1)).await.unwrap());
        assert_eq!(
            store
                .get_topic_state("u-1", "arrays")
                .await
                .unwrap()
                .unwrap()
                .version,
            2
        );
    }

    #[tokio::test]
    async fn injected_faults_are_consumed_one_per_operation() {
        let store = InMemoryStore::with_questions(vec![question("q1", "arrays")]);
        store.fail_next_operations(2);

        assert!(store.get_question("q1").await.is_err());
        assert!(store.get_question("q1").await.is_err());
        assert!(store.get_question("q1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn catalog_order_is_preserved() {
        let store = InMemoryStore::with_questions(vec![
            question("b", "arrays"),
            question("x", "graphs"),
            question("a", "arrays"),
        ]);
        let ids: Vec<String> = store
            .questions_by_topic("arrays")
            .await
            .unwrap()
            .into_iter()
            .map(|q| q.id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}

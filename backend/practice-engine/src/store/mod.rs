//! Persistence seam. Services only talk to the document store through
//! [`PracticeStore`]; `MongoStore` backs production and `InMemoryStore`
//! backs tests and embedded use.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::attempt::Attempt;
use crate::models::mastery::TopicMasteryState;
use crate::models::Question;

pub mod memory;
pub mod mongo;

pub use memory::InMemoryStore;
pub use mongo::MongoStore;

pub const ATTEMPTS_COLLECTION: &str = "attempts";
pub const TOPIC_STATS_COLLECTION: &str = "topic_stats";
pub const RECENT_QUESTIONS_COLLECTION: &str = "recent_questions";
pub const QUESTIONS_COLLECTION: &str = "questions";

pub fn recency_key(user_id: &str, question_id: &str) -> String {
    format!("{}:{}", user_id, question_id)
}

#[async_trait]
pub trait PracticeStore: Send + Sync {
    async fn insert_attempt(&self, attempt: &Attempt) -> Result<()>;

    async fn get_attempt(&self, attempt_id: &str) -> Result<Option<Attempt>>;

    async fn replace_attempt(&self, attempt: &Attempt) -> Result<()>;

    async fn find_open_attempt(&self, user_id: &str) -> Result<Option<Attempt>>;

    async fn get_topic_state(&self, user_id: &str, topic: &str)
        -> Result<Option<TopicMasteryState>>;

    async fn list_topic_states(&self, user_id: &str) -> Result<Vec<TopicMasteryState>>;

    /// Compare-and-swap write. `expected_version` is the version the caller
    /// read, `None` if it saw no record. Returns `false` if another writer got
    /// there first. The stored version becomes `expected + 1` (1 for a new record).
    async fn save_topic_state(
        &self,
        state: &TopicMasteryState,
        expected_version: Option<i64>,
    ) -> Result<bool>;

    async fn recent_questions(&self, user_id: &str) -> Result<HashMap<String, DateTime<Utc>>>;

    async fn touch_recency(&self, user_id: &str, question_id: &str, at: DateTime<Utc>)
        -> Result<()>;

    /// Catalog entries for a topic, in catalog order.
    async fn questions_by_topic(&self, topic: &str) -> Result<Vec<Question>>;

    async fn get_question(&self, question_id: &str) -> Result<Option<Question>>;
}

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::options::{FindOptions, ReplaceOptions};
use mongodb::{Client, Collection, Database, IndexModel};

use super::{
    recency_key, PracticeStore, ATTEMPTS_COLLECTION, QUESTIONS_COLLECTION,
    RECENT_QUESTIONS_COLLECTION, TOPIC_STATS_COLLECTION,
};
use crate::config::DatabaseSettings;
use crate::metrics::track_store_operation;
use crate::models::attempt::{Attempt, AttemptStatus};
use crate::models::mastery::TopicMasteryState;
use crate::models::{Question, RecencyEntry};

const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Clone)]
pub struct MongoStore {
    mongo: Database,
}

impl MongoStore {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let client = Client::with_uri_str(&settings.mongo_uri)
            .await
            .context("Failed to connect to MongoDB")?;
        let store = Self::new(client.database(&settings.mongo_database));
        store.ensure_indexes().await?;
        tracing::info!("MongoDB connected: database={}", settings.mongo_database);
        Ok(store)
    }

    pub async fn ensure_indexes(&self) -> Result<()> {
        self.attempts()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "userId": 1, "status": 1 })
                    .build(),
            )
            .await
            .context("Failed to create attempts index")?;
        self.topic_stats()
            .create_index(IndexModel::builder().keys(doc! { "userId": 1 }).build())
            .await
            .context("Failed to create topic_stats index")?;
        self.recent()
            .create_index(IndexModel::builder().keys(doc! { "userId": 1 }).build())
            .await
            .context("Failed to create recent_questions index")?;
        self.questions()
            .create_index(IndexModel::builder().keys(doc! { "topic": 1 }).build())
            .await
            .context("Failed to create questions index")?;
        Ok(())
    }

    fn attempts(&self) -> Collection<Attempt> {
        self.mongo.collection(ATTEMPTS_COLLECTION)
    }

    fn topic_stats(&self) -> Collection<TopicMasteryState> {
        self.mongo.collection(TOPIC_STATS_COLLECTION)
    }

    fn recent(&self) -> Collection<RecencyEntry> {
        self.mongo.collection(RECENT_QUESTIONS_COLLECTION)
    }

    fn questions(&self) -> Collection<Question> {
        self.mongo.collection(QUESTIONS_COLLECTION)
    }
}

fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    matches!(
        *error.kind,
        mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(ref we))
            if we.code == DUPLICATE_KEY_CODE
    )
}

#[async_trait]
impl PracticeStore for MongoStore {
    async fn insert_attempt(&self, attempt: &Attempt) -> Result<()> {
        track_store_operation("insert_attempt", async {
            self.attempts()
                .insert_one(attempt)
                .await
                .context("Failed to insert attempt")?;
            Ok(())
        })
        .await
    }

    async fn get_attempt(&self, attempt_id: &str) -> Result<Option<Attempt>> {
        track_store_operation("get_attempt", async {
            self.attempts()
                .find_one(doc! { "_id": attempt_id })
                .await
                .context("Failed to query attempts collection")
        })
        .await
    }

    async fn replace_attempt(&self, attempt: &Attempt) -> Result<()> {
        track_store_operation("replace_attempt", async {
            let result = self
                .attempts()
                .replace_one(doc! { "_id": &attempt.id }, attempt)
                .await
                .context("Failed to replace attempt")?;
            if result.matched_count == 0 {
                bail!("attempt {} vanished before replace", attempt.id);
            }
            Ok(())
        })
        .await
    }

    async fn find_open_attempt(&self, user_id: &str) -> Result<Option<Attempt>> {
        let open = mongodb::bson::to_bson(&AttemptStatus::Open)?;
        track_store_operation("find_open_attempt", async {
            self.attempts()
                .find_one(doc! { "userId": user_id, "status": open })
                .await
                .context("Failed to query open attempts")
        })
        .await
    }

    async fn get_topic_state(
        &self,
        user_id: &str,
        topic: &str,
    ) -> Result<Option<TopicMasteryState>> {
        let id = TopicMasteryState::key(user_id, topic);
        track_store_operation("get_topic_state", async {
            self.topic_stats()
                .find_one(doc! { "_id": &id })
                .await
                .context("Failed to query topic_stats collection")
        })
        .await
    }

    async fn list_topic_states(&self, user_id: &str) -> Result<Vec<TopicMasteryState>> {
        track_store_operation("list_topic_states", async {
            let cursor = self
                .topic_stats()
                .find(doc! { "userId": user_id })
                .with_options(FindOptions::builder().sort(doc! { "topic": 1 }).build())
                .await
                .context("Failed to query topic_stats collection")?;
            cursor
                .try_collect()
                .await
                .context("Failed to read topic_stats cursor")
        })
        .await
    }

    async fn save_topic_state(
        &self,
        state: &TopicMasteryState,
        expected_version: Option<i64>,
    ) -> Result<bool> {
        let mut next = state.clone();
        track_store_operation("save_topic_state", async {
            match expected_version {
                None => {
                    next.version = 1;
                    match self.topic_stats().insert_one(&next).await {
                        Ok(_) => Ok(true),
                        Err(e) if is_duplicate_key(&e) => Ok(false),
                        Err(e) => Err(e).context("Failed to insert topic state"),
                    }
                }
                Some(version) => {
                    next.version = version + 1;
                    let result = self
                        .topic_stats()
                        .replace_one(doc! { "_id": &next.id, "version": version }, &next)
                        .await
                        .context("Failed to replace topic state")?;
                    Ok(result.matched_count == 1)
                }
            }
        })
        .await
    }

    async fn recent_questions(&self, user_id: &str) -> Result<HashMap<String, DateTime<Utc>>> {
        track_store_operation("recent_questions", async {
            let entries: Vec<RecencyEntry> = self
                .recent()
                .find(doc! { "userId": user_id })
                .await
                .context("Failed to query recent_questions collection")?
                .try_collect()
                .await
                .context("Failed to read recent_questions cursor")?;
            Ok(entries
                .into_iter()
                .map(|e| (e.question_id, e.last_seen))
                .collect())
        })
        .await
    }

    async fn touch_recency(
        &self,
        user_id: &str,
        question_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let id = recency_key(user_id, question_id);
        let entry = RecencyEntry {
            id: id.clone(),
            user_id: user_id.to_string(),
            question_id: question_id.to_string(),
            last_seen: at,
        };
        track_store_operation("touch_recency", async {
            self.recent()
                .replace_one(doc! { "_id": &id }, &entry)
                .with_options(ReplaceOptions::builder().upsert(true).build())
                .await
                .context("Failed to upsert recency entry")?;
            Ok(())
        })
        .await
    }

    async fn questions_by_topic(&self, topic: &str) -> Result<Vec<Question>> {
        track_store_operation("questions_by_topic", async {
            // Natural order is catalog order; selection ties depend on it.
            self.questions()
                .find(doc! { "topic": topic })
                .await
                .context("Failed to query questions collection")?
                .try_collect()
                .await
                .context("Failed to read questions cursor")
        })
        .await
    }

    async fn get_question(&self, question_id: &str) -> Result<Option<Question>> {
        track_store_operation("get_question", async {
            self.questions()
                .find_one(doc! { "_id": question_id })
                .await
                .context("Failed to query questions collection")
        })
        .await
    }
}

mod common;

use chrono::Duration;
use practice_engine::models::mastery::TopicMasteryState;
use practice_engine::models::DifficultyBand;
use practice_engine::store::PracticeStore;
use practice_engine::utils::time::Clock;
use practice_engine::EngineError;

fn tracked(
    user_id: &str,
    topic: &str,
    band: DifficultyBand,
    accuracy: f64,
    h: &common::TestHarness,
) -> TopicMasteryState {
    let mut state = TopicMasteryState::fresh(user_id, topic, h.clock.now());
    state.current_difficulty_band = band;
    state.accuracy_ema = accuracy;
    state.attempts_count = 5;
    state.version = 1;
    state
}

#[tokio::test]
async fn test_new_user_starts_on_easy_fallback_topic() {
    let h = common::create_harness();

    let chosen = h.engine.select_next("new-user", None).await.unwrap().unwrap();

    assert_eq!(chosen.topic, "arrays");
    assert!(matches!(
        chosen.difficulty,
        DifficultyBand::Easy | DifficultyBand::Medium
    ));
    // Exact band match plus one tag beats the medium neighbour.
    assert_eq!(chosen.id, "two-sum");
}

#[tokio::test]
async fn test_never_seen_candidate_beats_recently_seen_one() {
    let questions = vec![
        common::question("seen", "arrays", DifficultyBand::Easy, &["x"]),
        common::question("unseen", "arrays", DifficultyBand::Easy, &["y"]),
    ];
    let h = common::create_harness_with(common::test_config(), questions, None);
    h.store
        .touch_recency("u-1", "seen", h.clock.now() - Duration::hours(1))
        .await
        .unwrap();

    let chosen = h.engine.select_next("u-1", Some("arrays")).await.unwrap().unwrap();
    assert_eq!(chosen.id, "unseen");
}

#[tokio::test]
async fn test_ties_keep_catalog_order() {
    let questions = vec![
        common::question("first", "arrays", DifficultyBand::Easy, &["x"]),
        common::question("second", "arrays", DifficultyBand::Easy, &["y"]),
    ];
    let h = common::create_harness_with(common::test_config(), questions, None);

    let chosen = h.engine.select_next("u-2", Some("arrays")).await.unwrap().unwrap();
    assert_eq!(chosen.id, "first");
}

#[tokio::test]
async fn test_selection_stays_within_adjacent_bands() {
    for band in [DifficultyBand::Easy, DifficultyBand::Medium, DifficultyBand::Hard] {
        let h = common::create_harness();
        h.store
            .seed_topic_state(tracked("u-3", "arrays", band, 0.5, &h))
            .await;

        for _ in 0..5 {
            let chosen = h.engine.select_next("u-3", Some("arrays")).await.unwrap().unwrap();
            assert!(
                band.adjacent().contains(&chosen.difficulty),
                "{} chosen for band {}",
                chosen.difficulty,
                band
            );
            h.clock.advance(Duration::minutes(10));
        }
    }
}

#[tokio::test]
async fn test_no_candidates_yields_none() {
    let h = common::create_harness();

    // graphs only has a hard problem; an untracked topic targets easy.
    assert!(h.engine.select_next("u-4", Some("graphs")).await.unwrap().is_none());
    assert!(h.engine.select_next("u-4", Some("trees")).await.unwrap().is_none());
    assert!(h.store.recent_questions("u-4").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_weakest_tracked_topic_is_targeted() {
    let h = common::create_harness();
    h.store
        .seed_topic_state(tracked("u-5", "arrays", DifficultyBand::Easy, 0.7, &h))
        .await;
    h.store
        .seed_topic_state(tracked("u-5", "strings", DifficultyBand::Medium, 0.2, &h))
        .await;

    let chosen = h.engine.select_next("u-5", None).await.unwrap().unwrap();
    assert_eq!(chosen.topic, "strings");
    assert_eq!(chosen.id, "longest-palindrome");
}

#[tokio::test]
async fn test_selection_refreshes_recency() {
    let h = common::create_harness();

    let first = h.engine.select_next("u-6", Some("arrays")).await.unwrap().unwrap();
    let seen = h.store.recent_questions("u-6").await.unwrap();
    assert_eq!(seen.get(&first.id), Some(&h.clock.now()));

    h.clock.advance(Duration::hours(30));
    let second = h.engine.select_next("u-6", Some("arrays")).await.unwrap().unwrap();
    assert_eq!(second.id, first.id);
    let seen = h.store.recent_questions("u-6").await.unwrap();
    assert_eq!(seen.get(&first.id), Some(&h.clock.now()));
    assert_eq!(seen.len(), 1);
}

#[tokio::test]
async fn test_recent_pick_is_rotated_out_when_scores_are_close() {
    let questions = vec![
        common::question("a", "arrays", DifficultyBand::Easy, &[]),
        common::question("b", "arrays", DifficultyBand::Easy, &[]),
    ];
    let h = common::create_harness_with(common::test_config(), questions, None);

    let first = h.engine.select_next("u-7", Some("arrays")).await.unwrap().unwrap();
    let second = h.engine.select_next("u-7", Some("arrays")).await.unwrap().unwrap();
    assert_eq!(first.id, "a");
    assert_eq!(second.id, "b");
}

#[tokio::test]
async fn test_malformed_topic_preference_is_rejected() {
    let h = common::create_harness();
    let err = h
        .engine
        .select_next("u-8", Some("../arrays"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn test_selection_survives_a_transient_store_failure() {
    let h = common::create_harness();
    h.store.fail_next_operations(1);

    let chosen = h.engine.select_next("u-9", None).await.unwrap();
    assert!(chosen.is_some());
}

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use practice_engine::models::hint::{HintProviderRequest, HintRequest, HintSource};
use practice_engine::models::DifficultyBand;
use practice_engine::services::hint_provider::HintProvider;
use practice_engine::EngineError;

enum Reply {
    Hint(&'static str),
    Empty,
    Fail,
    Hang,
}

struct FakeProvider {
    reply: Reply,
    calls: AtomicUsize,
    requests: Mutex<Vec<HintProviderRequest>>,
}

impl FakeProvider {
    fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HintProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate(&self, request: &HintProviderRequest) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        match self.reply {
            Reply::Hint(hint) => Ok(Some(hint.to_string())),
            Reply::Empty => Ok(None),
            Reply::Fail => anyhow::bail!("provider unavailable"),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Some("too late".to_string()))
            }
        }
    }
}

fn harness_with_provider(provider: Arc<FakeProvider>, timeout_ms: u64) -> common::TestHarness {
    let mut config = common::test_config();
    config.hints.remote_timeout_ms = timeout_ms;
    let provider: Arc<dyn HintProvider> = provider;
    common::create_harness_with(config, common::catalog(), Some(provider))
}

#[tokio::test]
async fn test_seventh_attempt_gets_final_tier() {
    let h = common::create_harness();

    let response = h
        .engine
        .get_hint(&HintRequest::new("two-sum", 7))
        .await
        .unwrap();

    assert_eq!(response.tier, 4);
    assert!(response.is_last_hint);
    assert_eq!(
        response.encouragement,
        "Don't give up. Take a breath and walk through one example by hand."
    );
    // Past the end of the static list: the last static hint.
    assert_eq!(response.source, HintSource::StaticHint);
    assert_eq!(response.hint, "For each x, look up target - x before inserting x.");
}

#[tokio::test]
async fn test_static_hints_escalate_with_attempt_number() {
    let h = common::create_harness();

    let first = h.engine.get_hint(&HintRequest::new("two-sum", 1)).await.unwrap();
    assert_eq!(first.tier, 1);
    assert!(!first.is_last_hint);
    assert_eq!(first.hint, "What value would pair with the current number?");
    assert_eq!(first.encouragement, "Good start. Read the feedback carefully and try again.");

    let second = h.engine.get_hint(&HintRequest::new("two-sum", 2)).await.unwrap();
    assert_eq!(second.tier, 2);
    assert_eq!(second.hint, "Store numbers you have already seen in a map.");
    assert!(!second.is_last_hint);

    // Three static hints: tier 3 already exhausts them.
    let third = h.engine.get_hint(&HintRequest::new("two-sum", 3)).await.unwrap();
    assert!(third.is_last_hint);
}

#[tokio::test]
async fn test_error_pattern_beats_static_hints() {
    let h = common::create_harness();

    let response = h
        .engine
        .get_hint(
            &HintRequest::new("two-sum", 2)
                .errors(["wrong_answer", "Index-Out-Of-Range"])
                .language("python"),
        )
        .await
        .unwrap();

    assert_eq!(response.source, HintSource::ErrorPattern);
    assert!(response.hint.contains("len(xs) - 1"));
}

#[tokio::test]
async fn test_question_without_hints_gets_generic_strategy() {
    let h = common::create_harness();

    let response = h
        .engine
        .get_hint(&HintRequest::new("max-subarray", 1))
        .await
        .unwrap();

    assert_eq!(response.source, HintSource::Generic);
    // tier 1 >= zero static hints
    assert!(response.is_last_hint);
}

#[tokio::test]
async fn test_attempt_zero_is_clamped_and_negative_is_rejected() {
    let h = common::create_harness();

    let response = h.engine.get_hint(&HintRequest::new("two-sum", 0)).await.unwrap();
    assert_eq!(response.tier, 1);

    let err = h
        .engine
        .get_hint(&HintRequest::new("two-sum", -1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn test_unknown_question_is_not_found() {
    let h = common::create_harness();
    let err = h
        .engine
        .get_hint(&HintRequest::new("no-such-question", 2))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { entity: "question", .. }));
}

#[tokio::test]
async fn test_remote_hint_used_from_tier_two() {
    let provider = FakeProvider::new(Reply::Hint("Try a hash map keyed by value."));
    let h = harness_with_provider(provider.clone(), 500);

    let tier_one = h.engine.get_hint(&HintRequest::new("two-sum", 1)).await.unwrap();
    assert_eq!(tier_one.source, HintSource::StaticHint);
    assert_eq!(provider.calls(), 0);

    let response = h
        .engine
        .get_hint(
            &HintRequest::new("two-sum", 3)
                .errors(["Off-By-One"])
                .language("java"),
        )
        .await
        .unwrap();
    assert_eq!(response.source, HintSource::Remote);
    assert_eq!(response.hint, "Try a hash map keyed by value.");
    assert_eq!(response.tier, 3);
    assert_eq!(provider.calls(), 1);

    let requests = provider.requests.lock().unwrap();
    let sent = &requests[0];
    assert_eq!(sent.tier, 3);
    assert_eq!(sent.question.title, "Question two-sum");
    assert_eq!(sent.question.hints.len(), 3);
    assert_eq!(sent.user_context.language.as_deref(), Some("java"));
    assert_eq!(sent.user_context.error_types, vec!["off_by_one".to_string()]);
}

#[tokio::test]
async fn test_failing_remote_falls_back_to_local_rules() {
    let provider = FakeProvider::new(Reply::Fail);
    let h = harness_with_provider(provider.clone(), 500);

    let response = h
        .engine
        .get_hint(&HintRequest::new("two-sum", 2).errors(["off_by_one"]))
        .await
        .unwrap();

    assert_eq!(provider.calls(), 1);
    assert_eq!(response.source, HintSource::ErrorPattern);
}

#[tokio::test]
async fn test_empty_remote_reply_falls_back_to_local_rules() {
    let provider = FakeProvider::new(Reply::Empty);
    let h = harness_with_provider(provider.clone(), 500);

    let response = h.engine.get_hint(&HintRequest::new("two-sum", 2)).await.unwrap();

    assert_eq!(provider.calls(), 1);
    assert_eq!(response.source, HintSource::StaticHint);
    assert_eq!(response.hint, "Store numbers you have already seen in a map.");
}

#[tokio::test]
async fn test_slow_remote_is_cut_off_by_timeout() {
    let provider = FakeProvider::new(Reply::Hang);
    let h = harness_with_provider(provider.clone(), 50);

    let started = std::time::Instant::now();
    let response = h.engine.get_hint(&HintRequest::new("two-sum", 4)).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(response.source, HintSource::StaticHint);
    assert!(response.is_last_hint);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_hints_for_added_question() {
    let h = common::create_harness();
    h.store
        .add_question(common::with_hints(
            common::question("bfs-grid", "graphs", DifficultyBand::Medium, &["bfs"]),
            &["Think of each cell as a node.", "Use a queue.", "Track visited cells.", "Stop at the target."],
        ))
        .await;

    let response = h.engine.get_hint(&HintRequest::new("bfs-grid", 3)).await.unwrap();
    assert_eq!(response.hint, "Track visited cells.");
    assert!(!response.is_last_hint);
}

use std::sync::Arc;
use std::time::Duration;

use crate::config::HintSettings;
use crate::error::{EngineError, EngineResult};
use crate::metrics::record_hint_served;
use crate::models::attempt::MAX_HINT_TIER;
use crate::models::hint::{
    HintProviderRequest, HintRequest, HintResponse, HintSource, QuestionContext, UserContext,
};
use crate::models::Question;
use crate::services::hint_provider::HintProvider;
use crate::store::PracticeStore;
use crate::utils::retry::{retry_async_with_config, RetryConfig};

/// Tiers at or above this may be delegated to the remote provider.
const REMOTE_MIN_TIER: u8 = 2;

const GENERIC_STRATEGY_HINT: &str =
    "Work through a small example by hand, then compare each step with what your code does.";

const ENCOURAGEMENTS: [&str; 5] = [
    "Good start. Read the feedback carefully and try again.",
    "You're getting closer. Small adjustments often fix it.",
    "Keep going. Every failed run tells you something new.",
    "Persistence pays off. Break the problem into smaller pieces.",
    "Don't give up. Take a breath and walk through one example by hand.",
];

/// Error signals the local rules know how to address, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorPattern {
    OutOfBounds,
    OffByOne,
    NullReference,
    InfiniteLoop,
    TimeLimitExceeded,
}

const PATTERN_PRIORITY: [ErrorPattern; 5] = [
    ErrorPattern::OutOfBounds,
    ErrorPattern::OffByOne,
    ErrorPattern::NullReference,
    ErrorPattern::InfiniteLoop,
    ErrorPattern::TimeLimitExceeded,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Language {
    Python,
    Java,
    Cpp,
    JavaScript,
    Other,
}

impl Language {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|l| l.trim().to_ascii_lowercase()).as_deref() {
            Some("python" | "python3" | "py") => Language::Python,
            Some("java") => Language::Java,
            Some("cpp" | "c++" | "cxx") => Language::Cpp,
            Some("javascript" | "js" | "typescript" | "ts") => Language::JavaScript,
            _ => Language::Other,
        }
    }
}

/// Trims, lower-cases and turns `-`/spaces into `_`.
pub fn normalize_error_type(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect()
}

impl ErrorPattern {
    fn from_signal(raw: &str) -> Option<Self> {
        match normalize_error_type(raw).as_str() {
            "out_of_bounds"
            | "index_out_of_range"
            | "index_error"
            | "out_of_range"
            | "array_index_out_of_bounds" => Some(ErrorPattern::OutOfBounds),
            "off_by_one" => Some(ErrorPattern::OffByOne),
            "null_reference" | "null_pointer" | "none_type" | "undefined" => {
                Some(ErrorPattern::NullReference)
            }
            "infinite_loop" => Some(ErrorPattern::InfiniteLoop),
            "time_limit_exceeded" | "timeout" | "tle" => Some(ErrorPattern::TimeLimitExceeded),
            _ => None,
        }
    }

    fn micro_hint(self, language: Language) -> &'static str {
        match (self, language) {
            (ErrorPattern::OutOfBounds, Language::Python) => {
                "An IndexError means you read past the end of a list. Valid indices run from 0 to len(xs) - 1."
            }
            (ErrorPattern::OutOfBounds, Language::Java) => {
                "ArrayIndexOutOfBoundsException: check every index against array.length before using it."
            }
            (ErrorPattern::OutOfBounds, Language::Cpp) => {
                "Reading past the end of a vector is undefined behavior. Compare indices against size() or use .at() while debugging."
            }
            (ErrorPattern::OutOfBounds, Language::JavaScript) => {
                "Reading past the end of an array yields undefined. Valid indices run from 0 to arr.length - 1."
            }
            (ErrorPattern::OutOfBounds, Language::Other) => {
                "You are accessing an index outside the collection. Check loop bounds and any index arithmetic."
            }
            (ErrorPattern::OffByOne, Language::Python) => {
                "range(n) stops at n - 1. Check whether your loop should include the last element."
            }
            (ErrorPattern::OffByOne, _) => {
                "Look at your loop boundaries: should the comparison be < or <=, and does the loop start at 0 or 1?"
            }
            (ErrorPattern::NullReference, Language::Python) => {
                "Something is None where you expected a value. Check what your helper functions return on every path."
            }
            (ErrorPattern::NullReference, Language::Java) => {
                "A NullPointerException means an object was never initialized. Check fields and return values before dereferencing."
            }
            (ErrorPattern::NullReference, Language::JavaScript) => {
                "You are reading a property of undefined or null. Check that the value exists before using it."
            }
            (ErrorPattern::NullReference, _) => {
                "A value is missing where your code expects one. Handle the empty or null case explicitly."
            }
            (ErrorPattern::InfiniteLoop, _) => {
                "Your loop may never terminate. Make sure the loop variable moves toward the exit condition on every iteration."
            }
            (ErrorPattern::TimeLimitExceeded, _) => {
                "Your solution is correct in shape but too slow. Look for repeated work you can cache or a nested loop you can remove."
            }
        }
    }
}

pub fn tier_for(attempt_number: i32) -> u8 {
    attempt_number.clamp(1, i32::from(MAX_HINT_TIER)) as u8
}

pub fn encouragement_for(attempt_number: i32) -> &'static str {
    let index = (attempt_number.max(1) - 1) as usize;
    ENCOURAGEMENTS[index.min(ENCOURAGEMENTS.len() - 1)]
}

fn detect_pattern(error_types: &[String]) -> Option<ErrorPattern> {
    let seen: Vec<ErrorPattern> = error_types
        .iter()
        .filter_map(|e| ErrorPattern::from_signal(e))
        .collect();
    PATTERN_PRIORITY.into_iter().find(|p| seen.contains(p))
}

/// Rule-based fallback: error pattern, then static hint list, then generic.
fn local_hint(
    question: &Question,
    attempt_number: i32,
    error_types: &[String],
    language: Option<&str>,
) -> (String, HintSource) {
    if let Some(pattern) = detect_pattern(error_types) {
        return (
            pattern.micro_hint(Language::parse(language)).to_string(),
            HintSource::ErrorPattern,
        );
    }

    if !question.hints.is_empty() {
        let index = ((attempt_number.max(1) - 1) as usize).min(question.hints.len() - 1);
        return (question.hints[index].clone(), HintSource::StaticHint);
    }

    (GENERIC_STRATEGY_HINT.to_string(), HintSource::Generic)
}

pub struct HintService {
    store: Arc<dyn PracticeStore>,
    provider: Option<Arc<dyn HintProvider>>,
    remote_timeout: Duration,
    retry: RetryConfig,
}

impl HintService {
    pub fn new(
        store: Arc<dyn PracticeStore>,
        provider: Option<Arc<dyn HintProvider>>,
        settings: &HintSettings,
        retry: RetryConfig,
    ) -> Self {
        Self {
            store,
            provider,
            remote_timeout: Duration::from_millis(settings.remote_timeout_ms),
            retry,
        }
    }

    pub async fn get_hint(&self, req: &HintRequest) -> EngineResult<HintResponse> {
        if req.attempt_number < 0 {
            return Err(EngineError::validation(format!(
                "attemptNumber must not be negative, got {}",
                req.attempt_number
            )));
        }

        let question = retry_async_with_config(&self.retry, "get_question", || async {
            self.store.get_question(&req.question_id).await
        })
        .await?
        .ok_or_else(|| EngineError::not_found("question", &req.question_id))?;

        let tier = tier_for(req.attempt_number);
        tracing::info!(
            "Processing hint request: question={}, attempt={}, tier={}",
            req.question_id,
            req.attempt_number,
            tier
        );

        let remote = if tier >= REMOTE_MIN_TIER {
            self.try_remote(&question, req, tier).await
        } else {
            None
        };

        let (hint, source) = match remote {
            Some(hint) => (hint, HintSource::Remote),
            None => local_hint(
                &question,
                req.attempt_number,
                &req.error_types,
                req.language.as_deref(),
            ),
        };

        record_hint_served(tier, source.as_str());
        tracing::debug!(
            "Hint served: question={}, tier={}, source={:?}",
            req.question_id,
            tier,
            source
        );

        Ok(HintResponse {
            hint,
            tier,
            is_last_hint: tier >= MAX_HINT_TIER || usize::from(tier) >= question.hints.len(),
            encouragement: encouragement_for(req.attempt_number).to_string(),
            source,
        })
    }

    /// Never fails: any provider problem yields `None` and the local rule takes over.
    async fn try_remote(&self, question: &Question, req: &HintRequest, tier: u8) -> Option<String> {
        let provider = self.provider.as_ref()?;

        let request = HintProviderRequest {
            question: QuestionContext {
                title: question.title.clone(),
                statement: question.statement.clone(),
                hints: question.hints.clone(),
            },
            user_context: UserContext {
                language: req.language.clone(),
                error_types: req
                    .error_types
                    .iter()
                    .map(|e| normalize_error_type(e))
                    .collect(),
            },
            tier,
        };

        match tokio::time::timeout(self.remote_timeout, provider.generate(&request)).await {
            Ok(Ok(Some(hint))) => {
                tracing::debug!(
                    "Hint fetched from {} provider for question={}",
                    provider.name(),
                    question.id
                );
                Some(hint)
            }
            Ok(Ok(None)) => {
                tracing::warn!(
                    "{} provider returned no hint for question={}; using local rules",
                    provider.name(),
                    question.id
                );
                None
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    "{} provider failed for question={}: {:#}; using local rules",
                    provider.name(),
                    question.id,
                    e
                );
                None
            }
            Err(_) => {
                tracing::warn!(
                    "{} provider timed out after {:?} for question={}; using local rules",
                    provider.name(),
                    self.remote_timeout,
                    question.id
                );
                None
            }
        }
    }
}

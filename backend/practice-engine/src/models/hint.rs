use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintRequest {
    pub question_id: String,
    pub attempt_number: i32,
    #[serde(default)]
    pub error_types: Vec<String>,
    pub language: Option<String>,
}

impl HintRequest {
    pub fn new(question_id: impl Into<String>, attempt_number: i32) -> Self {
        Self {
            question_id: question_id.into(),
            attempt_number,
            ..Self::default()
        }
    }

    pub fn errors<I, S>(mut self, error_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.error_types = error_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintResponse {
    pub hint: String,
    pub tier: u8,
    pub is_last_hint: bool,
    pub encouragement: String,
    pub source: HintSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintSource {
    Remote,
    ErrorPattern,
    StaticHint,
    Generic,
}

impl HintSource {
    pub fn as_str(self) -> &'static str {
        match self {
            HintSource::Remote => "remote",
            HintSource::ErrorPattern => "error_pattern",
            HintSource::StaticHint => "static_hint",
            HintSource::Generic => "generic",
        }
    }
}

/// Body sent to the remote hint provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintProviderRequest {
    pub question: QuestionContext,
    pub user_context: UserContext,
    pub tier: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionContext {
    pub title: String,
    pub statement: String,
    pub hints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub language: Option<String>,
    pub error_types: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct HintProviderResponse {
    #[serde(default)]
    pub hint: Option<String>,
}

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::models::hint::{HintProviderRequest, HintProviderResponse};

/// External hint generation capability. `Ok(None)` means "nothing useful",
/// which the hint engine treats the same as an error.
#[async_trait]
pub trait HintProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &HintProviderRequest) -> Result<Option<String>>;
}

pub struct HttpHintProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpHintProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build hint provider HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/hints", self.base_url)
    }
}

#[async_trait]
impl HintProvider for HttpHintProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate(&self, request: &HintProviderRequest) -> Result<Option<String>> {
        let response = self
            .client
            .post(self.endpoint())
            .json(request)
            .send()
            .await
            .context("Failed to call hint provider")?;

        if !response.status().is_success() {
            anyhow::bail!("Hint provider returned status: {}", response.status());
        }

        let body: HintProviderResponse = response
            .json()
            .await
            .context("Failed to parse hint provider response")?;

        Ok(body
            .hint
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_ignores_trailing_slash() {
        let provider =
            HttpHintProvider::new("http://hints.local:8000/", Duration::from_millis(100)).unwrap();
        assert_eq!(provider.endpoint(), "http://hints.local:8000/v1/hints");
    }
}

//! Remote face comparison service client.

use async_trait::async_trait;
use presence_core::{FaceTemplate, Probe, ScoreError, Scorer};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct CompareRequest<'a> {
    template: &'a str,
    probe: &'a str,
}

#[derive(Deserialize)]
struct CompareResponse {
    score: f32,
}

/// Scores by `POST {url}` with `{template, probe}`, expecting `{score}`.
/// Every transport, status or body problem is a per-call failure.
pub struct HttpScorer {
    client: reqwest::Client,
    url: String,
}

impl HttpScorer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Scorer for HttpScorer {
    async fn compare(&self, template: &FaceTemplate, probe: &Probe) -> Result<f32, ScoreError> {
        let response = self
            .client
            .post(&self.url)
            .json(&CompareRequest {
                template: template.as_str(),
                probe: &probe.data,
            })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ScoreError::Unavailable(e.to_string()))?;

        let body: CompareResponse = response
            .json()
            .await
            .map_err(|e| ScoreError::Decode(format!("scorer response: {e}")))?;
        Ok(body.score)
    }
}

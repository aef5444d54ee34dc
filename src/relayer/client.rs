//! HTTP client for the relayer API.
//!
//! Request failures split along the error taxonomy: anything before an HTTP
//! response (connect, DNS, timeout) is a transport error; a non-success
//! response with a body is a relayer verdict and surfaces as such.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;

use crate::error::{ClientError, Result};
use crate::relayer::types::{JobCreated, RelayerJob, RelayerStatus, WithdrawalSubmission};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Relayer operations the withdrawal pipeline consumes.
#[async_trait]
pub trait RelayerApi: Send + Sync {
    /// `GET /status`.
    async fn status(&self, relayer_url: &str) -> Result<RelayerStatus>;

    /// `POST /v1/<method>` with the proof payload. Returns the job id.
    async fn submit_withdrawal(
        &self,
        relayer_url: &str,
        method: &str,
        submission: &WithdrawalSubmission,
    ) -> Result<String>;

    /// `GET /v1/jobs/:id`.
    async fn job(&self, relayer_url: &str, job_id: &str) -> Result<RelayerJob>;
}

/// Relayers frequently wrap errors as `{"error": "..."}`.
#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Clone)]
pub struct RelayerClient {
    http: reqwest::Client,
}

impl RelayerClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http })
    }

    fn endpoint(relayer_url: &str, path: &str) -> String {
        format!("{}/{}", relayer_url.trim_end_matches('/'), path)
    }

    async fn relayer_verdict(response: reqwest::Response) -> ClientError {
        let raw = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&raw)
            .map(|body| body.error)
            .unwrap_or(raw);
        ClientError::Relayer(message)
    }
}

#[async_trait]
impl RelayerApi for RelayerClient {
    async fn status(&self, relayer_url: &str) -> Result<RelayerStatus> {
        let url = Self::endpoint(relayer_url, "status");
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Self::relayer_verdict(response).await);
        }
        Ok(response.json().await?)
    }

    async fn submit_withdrawal(
        &self,
        relayer_url: &str,
        method: &str,
        submission: &WithdrawalSubmission,
    ) -> Result<String> {
        let url = Self::endpoint(relayer_url, &format!("v1/{}", method));
        debug!("submitting withdrawal to {}", url);

        let response = self.http.post(&url).json(submission).send().await?;
        if !response.status().is_success() {
            return Err(Self::relayer_verdict(response).await);
        }
        let created: JobCreated = response.json().await?;
        Ok(created.id)
    }

    async fn job(&self, relayer_url: &str, job_id: &str) -> Result<RelayerJob> {
        let url = Self::endpoint(relayer_url, &format!("v1/jobs/{}", job_id));
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Self::relayer_verdict(response).await);
        }
        Ok(response.json().await?)
    }
}

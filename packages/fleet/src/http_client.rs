//! HTTP adapter for a JSON queue service.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::client::{ClientError, ClientFuture, JobDescription, QueueClient, SubmitJobRequest};

#[derive(Debug, Deserialize)]
struct SubmitJobResponse {
    job_id: String,
}

#[derive(Debug, Serialize)]
struct DescribeJobsRequest {
    job_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DescribeJobsResponse {
    jobs: Vec<JobDescription>,
}

/// Queue client speaking JSON over HTTP.
///
/// - `POST {base}/jobs` with a [`SubmitJobRequest`] returns `{"job_id": ...}`
/// - `POST {base}/jobs/describe` with `{"job_ids": [...]}` returns `{"jobs": [...]}`
#[derive(Debug, Clone)]
pub struct HttpQueueClient {
    client: Client,
    base_url: String,
}

impl HttpQueueClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ClientError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ClientError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}

impl QueueClient for HttpQueueClient {
    fn submit_job(&self, request: SubmitJobRequest) -> ClientFuture<'_, String> {
        Box::pin(async move {
            let response: SubmitJobResponse = self.post("/jobs", &request).await?;
            Ok(response.job_id)
        })
    }

    fn describe_jobs(&self, job_ids: Vec<String>) -> ClientFuture<'_, Vec<JobDescription>> {
        Box::pin(async move {
            let response: DescribeJobsResponse = self
                .post("/jobs/describe", &DescribeJobsRequest { job_ids })
                .await?;
            Ok(response.jobs)
        })
    }
}

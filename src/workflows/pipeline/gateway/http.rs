use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use super::{EvaluationGateway, EvaluationRequest, GatewayError, RunAccepted, RunSnapshot};
use crate::config::AiServiceConfig;
use crate::workflows::pipeline::domain::RunId;

/// reqwest-backed client for the AI scoring service.
///
/// Shares one pooled `Client`; cheap to clone behind an `Arc`.
#[derive(Debug, Clone)]
pub struct HttpEvaluationGateway {
    base_url: String,
    http_client: Client,
}

impl HttpEvaluationGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| GatewayError::Unreachable(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    pub fn from_config(config: &AiServiceConfig) -> Result<Self, GatewayError> {
        Self::new(config.base_url.clone(), config.timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Unreachable(format!("request timed out: {err}"))
    } else if err.is_connect() {
        GatewayError::Unreachable(format!("connection failed: {err}"))
    } else {
        GatewayError::Unreachable(err.to_string())
    }
}

#[async_trait]
impl EvaluationGateway for HttpEvaluationGateway {
    async fn submit(&self, request: &EvaluationRequest) -> Result<RunAccepted, GatewayError> {
        let url = format!("{}/evaluate", self.base_url);
        debug!(%url, application_id = %request.application_id, "submitting evaluation");

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), %body, "AI service rejected evaluation");
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<RunAccepted>()
            .await
            .map_err(|err| GatewayError::Decode(err.to_string()))
    }

    async fn fetch_run(&self, run_id: &RunId) -> Result<RunSnapshot, GatewayError> {
        let url = format!("{}/runs/{}", self.base_url, run_id);
        debug!(%url, "fetching run status");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::RunNotFound(run_id.clone()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), run_id = %run_id, "AI service failed to report run");
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<RunSnapshot>()
            .await
            .map_err(|err| GatewayError::Decode(err.to_string()))
    }
}

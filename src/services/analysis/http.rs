use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::Client;

use super::{AnalysisError, AnalysisPipeline, AnalysisRequest};
use crate::state::report::Report;

/// Remote analysis pipeline reached with a JSON POST per completed room.
#[derive(Clone)]
pub struct HttpPipeline {
    client: Client,
    endpoint: Arc<str>,
}

impl HttpPipeline {
    /// Build a client for `endpoint`; each call is bounded by `timeout`.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, AnalysisError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| AnalysisError::ClientBuilder { source })?;
        Ok(Self {
            client,
            endpoint: Arc::from(endpoint),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl AnalysisPipeline for HttpPipeline {
    fn analyze(&self, request: AnalysisRequest) -> BoxFuture<'static, Result<Report, AnalysisError>> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        Box::pin(async move {
            let response = client
                .post(endpoint.as_ref())
                .json(&request)
                .send()
                .await
                .map_err(|source| AnalysisError::RequestSend {
                    endpoint: endpoint.to_string(),
                    source,
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(AnalysisError::RequestStatus {
                    status: status.as_u16(),
                });
            }

            response
                .json::<Report>()
                .await
                .map_err(|source| AnalysisError::DecodeResponse { source })
        })
    }
}

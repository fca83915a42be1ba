//! HTTP DVD Transport
//!
//! Implements DvdTransport by POSTing the JSON wire contract to the DVD
//! service.

use crate::domain::errors::ServiceError;
use crate::domain::ports::{DvdTransport, RemoteMethod, WireRequest, WireResponse};
use crate::infrastructure::CallContext;
use async_trait::async_trait;

/// reqwest-backed transport to a DVD service at `base_url`.
pub struct HttpDvdTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDvdTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, ctx: &CallContext, url: &str, request: &WireRequest) -> Result<WireResponse, ServiceError> {
        let mut builder = self.client.post(url).json(request);
        if let Some(remaining) = ctx.remaining() {
            builder = builder.timeout(remaining);
        }

        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::infra(format!(
                "dvd service returned {} - {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl DvdTransport for HttpDvdTransport {
    async fn invoke(
        &self,
        ctx: &CallContext,
        method: RemoteMethod,
        request: WireRequest,
    ) -> Result<WireResponse, ServiceError> {
        let url = format!("{}{}", self.base_url, method.path());
        tracing::debug!(%url, id = %request.id, "invoking dvd service");
        ctx.run(self.post(ctx, &url, &request)).await
    }
}

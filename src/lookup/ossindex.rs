use super::{Credentials, LookupTransport};
use crate::error::TransportError;
use crate::model::AuditedPackage;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "https://ossindex.sonatype.org/api/v3";

const TIMEOUT_SECONDS: u64 = 30;

/// Client for the OSS Index `component-report` endpoint.
pub struct OssIndexClient {
    client: reqwest::Client,
    api_url: String,
}

#[derive(Serialize)]
struct ComponentReportRequest<'a> {
    coordinates: &'a [String],
}

impl OssIndexClient {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_api_url(DEFAULT_API_URL)
    }

    pub fn with_api_url(api_url: impl Into<String>) -> Result<Self, TransportError> {
        let user_agent = format!("ossaudit/{}", env!("CARGO_PKG_VERSION"));
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECONDS))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            api_url: api_url.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/component-report", self.api_url.trim_end_matches('/'))
    }
}

fn check_status(status: StatusCode) -> Result<(), TransportError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(TransportError::RateLimited);
    }
    if !status.is_success() {
        return Err(TransportError::Status {
            code: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("unknown status").to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl LookupTransport for OssIndexClient {
    async fn bulk_lookup(
        &self,
        coordinates: &[String],
        credentials: Option<&Credentials>,
    ) -> Result<Vec<AuditedPackage>, TransportError> {
        if coordinates.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Requesting {} component reports", coordinates.len());
        let mut request = self
            .client
            .post(self.endpoint())
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .json(&ComponentReportRequest { coordinates });
        if let Some(credentials) = credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.token));
        }

        let response = request.send().await?;
        check_status(response.status())?;

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

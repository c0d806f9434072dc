//! Batched, cached resolution of coordinates to vulnerability reports.

mod ossindex;
mod service;

pub use ossindex::{OssIndexClient, DEFAULT_API_URL};
pub use service::{LookupService, RunPhase};

use crate::error::TransportError;
use crate::model::AuditedPackage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Username and API token for the vulnerability service.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub token: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// The bulk lookup contract of a vulnerability service.
///
/// Implementations receive the canonical coordinate strings of one batch and
/// return one report per coordinate the service knows about.
#[async_trait]
pub trait LookupTransport: Send + Sync {
    async fn bulk_lookup(
        &self,
        coordinates: &[String],
        credentials: Option<&Credentials>,
    ) -> Result<Vec<AuditedPackage>, TransportError>;
}

//! Outbound trial requests to the license issuing authority.
//!
//! Submitting a request does not install anything: an issued trial license
//! arrives later through the normal load path.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::LicenseResult;

/// Trial request sent to the issuing authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialLicenseRequest {
    pub server_id: String,
    pub name: String,
    pub email: String,
    pub site_name: String,
    pub site_url: String,
    pub users: u32,
    pub terms_accepted: bool,
    pub receive_emails_accepted: bool,
}

/// Delivers trial requests. Implementations own transport and timeouts.
#[async_trait]
pub trait TrialRequestSink: Send + Sync {
    async fn submit_trial_request(&self, request: &TrialLicenseRequest) -> LicenseResult<()>;
}

#[cfg(feature = "trial-http")]
pub use http::HttpTrialClient;

#[cfg(feature = "trial-http")]
mod http {
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::Client;
    use serde::Deserialize;
    use tracing::warn;

    use super::{TrialLicenseRequest, TrialRequestSink};
    use crate::config::TrialConfig;
    use crate::errors::{LicenseError, LicenseResult};

    /// Error body returned by the issuing authority.
    #[derive(Debug, Deserialize)]
    struct UpstreamError {
        #[serde(default)]
        message: String,
    }

    /// Posts trial requests as JSON with a bounded timeout.
    #[derive(Debug, Clone)]
    pub struct HttpTrialClient {
        client: Client,
        url: String,
    }

    impl HttpTrialClient {
        pub fn new(url: impl Into<String>, timeout: Duration) -> LicenseResult<Self> {
            let client = Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| LicenseError::ConfigError(format!("failed to build HTTP client: {e}")))?;

            Ok(Self {
                client,
                url: url.into(),
            })
        }

        pub fn from_config(config: &TrialConfig) -> LicenseResult<Self> {
            Self::new(
                config.request_url.clone(),
                Duration::from_secs(config.timeout_secs),
            )
        }

        pub fn url(&self) -> &str {
            &self.url
        }
    }

    #[async_trait]
    impl TrialRequestSink for HttpTrialClient {
        async fn submit_trial_request(&self, request: &TrialLicenseRequest) -> LicenseResult<()> {
            let resp = self.client.post(&self.url).json(request).send().await?; // → UpstreamUnavailable

            let status = resp.status();
            if status.is_success() {
                return Ok(());
            }

            let message = resp
                .json::<UpstreamError>()
                .await
                .map(|body| body.message)
                .unwrap_or_default();
            warn!(status = %status.as_u16(), message = %message, "Trial request rejected");

            Err(LicenseError::UpstreamUnavailable(if message.is_empty() {
                format!("trial request failed with HTTP status {status}")
            } else {
                format!("trial request failed with HTTP status {status}: {message}")
            }))
        }
    }
}

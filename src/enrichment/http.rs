//! HTTP client for the enrichment provider.
//!
//! `POST {base_url}/validate-email {"email"} -> {"valid"}` and
//! `POST {base_url}/company-info {"company"} -> {"company", "domain", "size", "location"}`.
//! Any failure on the wire becomes [`LookupOutcome::Unavailable`].

use super::{CompanyProfile, EmailLookup, EnrichmentClient, LookupOutcome};
use crate::config::ProviderConfig;
use crate::error::{EnrichmentError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct HttpEnrichmentClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct EmailRequest<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct CompanyRequest<'a> {
    company: &'a str,
}

impl HttpEnrichmentClient {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| {
                EnrichmentError::ConfigurationError(format!(
                    "Failed to build enrichment HTTP client: {e}"
                ))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name)
    }

    async fn post<B, T>(&self, endpoint: &str, body: &B) -> LookupOutcome<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = self.endpoint(endpoint);

        let response = match self.client.post(&url).json(body).send().await {
            Ok(response) => response,
            Err(e) => {
                let reason = if e.is_timeout() {
                    format!("{endpoint} timed out")
                } else {
                    format!("{endpoint} request failed: {e}")
                };
                warn!(endpoint = %endpoint, error = %e, "Enrichment provider unreachable");
                return LookupOutcome::unavailable(reason);
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(endpoint = %endpoint, status = %status, "Enrichment provider returned error status");
            return LookupOutcome::unavailable(format!("{endpoint} returned {status}"));
        }

        match response.json::<T>().await {
            Ok(value) => {
                debug!(endpoint = %endpoint, "Enrichment lookup resolved");
                LookupOutcome::Resolved(value)
            }
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "Malformed enrichment provider response");
                LookupOutcome::unavailable(format!("{endpoint} returned a malformed body: {e}"))
            }
        }
    }
}

#[async_trait]
impl EnrichmentClient for HttpEnrichmentClient {
    async fn validate_email(&self, email: &str) -> Result<LookupOutcome<EmailLookup>> {
        Ok(self.post("validate-email", &EmailRequest { email }).await)
    }

    async fn lookup_company(&self, company: &str) -> Result<LookupOutcome<CompanyProfile>> {
        Ok(self.post("company-info", &CompanyRequest { company }).await)
    }
}

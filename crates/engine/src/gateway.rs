//! Narrow contracts for the orchestrator's external collaborators.
//!
//! The orchestrator talks to every backend through [`DrsGateway`] so tests
//! can stand in fakes; [`HttpGateway`] is the production implementation
//! driving the resilient client from `drshub-api`.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use drshub_api::{ApiError, HttpClient, RetryPolicy};
use drshub_types::CredentialBroker;

use crate::config::DrsHubConfig;

/// Authorization material for one access-URL request, per the resolved
/// method's policy.
#[derive(Debug)]
pub enum AccessAuth<'a> {
    /// Forward the caller's Authorization header verbatim.
    CurrentRequest(&'a str),
    /// Bearer auth with a broker-issued Fence token.
    FenceToken(&'a str),
    /// POST the caller's passports, over client mTLS when material is
    /// available.
    Passports {
        passports: &'a [Value],
        identity_pem: Option<&'a [u8]>,
    },
}

#[async_trait]
pub trait DrsGateway: Send + Sync {
    /// Object metadata from the DRS provider.
    async fn drs_metadata(&self, url: &str, authorization: Option<&str>) -> Result<Value, ApiError>;

    /// Time-limited access URL from the provider's `access` endpoint.
    async fn drs_access_url(&self, endpoint: &str, auth: AccessAuth<'_>) -> Result<Value, ApiError>;

    /// The user's service account key from the credential broker.
    async fn service_account_key(
        &self,
        broker: CredentialBroker,
        authorization: &str,
    ) -> Result<Value, ApiError>;

    /// A Fence token from the credential broker; `Ok(None)` when the user
    /// has no linked account there.
    async fn broker_access_token(
        &self,
        broker: CredentialBroker,
        authorization: &str,
    ) -> Result<Option<String>, ApiError>;

    /// The caller's passport from the issuer; `Ok(None)` when they have
    /// none.
    async fn passport(&self, authorization: &str) -> Result<Option<Value>, ApiError>;

    /// Fetch a named secret by reference; `Ok(None)` when it is not
    /// provisioned.
    async fn secret(&self, reference: &str) -> Result<Option<String>, ApiError>;
}

/// Production gateway over HTTP.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: HttpClient,
    config: DrsHubConfig,
}

impl HttpGateway {
    pub fn new(config: DrsHubConfig) -> Result<Self, ApiError> {
        Ok(HttpGateway {
            client: HttpClient::new(RetryPolicy::default())?,
            config,
        })
    }

    fn broker_url(&self, broker: CredentialBroker, endpoint: &str) -> String {
        format!(
            "{}/api/link/v1/{}/{}",
            self.config.broker_base_url,
            broker.path_segment(),
            endpoint
        )
    }
}

#[async_trait]
impl DrsGateway for HttpGateway {
    async fn drs_metadata(&self, url: &str, authorization: Option<&str>) -> Result<Value, ApiError> {
        self.client.get_json(url, authorization).await
    }

    async fn drs_access_url(&self, endpoint: &str, auth: AccessAuth<'_>) -> Result<Value, ApiError> {
        match auth {
            AccessAuth::CurrentRequest(header) => self.client.get_json(endpoint, Some(header)).await,
            AccessAuth::FenceToken(token) => {
                let bearer = format!("Bearer {token}");
                self.client.get_json(endpoint, Some(&bearer)).await
            }
            AccessAuth::Passports {
                passports,
                identity_pem,
            } => {
                let body = json!({ "passports": passports });
                match identity_pem {
                    Some(pem) => self.client.post_json_with_identity(endpoint, &body, pem).await,
                    None => self.client.post_json(endpoint, None, &body).await,
                }
            }
        }
    }

    async fn service_account_key(
        &self,
        broker: CredentialBroker,
        authorization: &str,
    ) -> Result<Value, ApiError> {
        let url = self.broker_url(broker, "serviceaccount/key");
        self.client.get_json(&url, Some(authorization)).await
    }

    async fn broker_access_token(
        &self,
        broker: CredentialBroker,
        authorization: &str,
    ) -> Result<Option<String>, ApiError> {
        let url = self.broker_url(broker, "accesstoken");
        match self.client.get_json(&url, Some(authorization)).await {
            Ok(value) => Ok(value.get("token").and_then(Value::as_str).map(str::to_string)),
            Err(error) if error.status() == Some(404) => {
                info!(broker = broker.path_segment(), "user has no linked broker account");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    async fn passport(&self, authorization: &str) -> Result<Option<Value>, ApiError> {
        let url = format!(
            "{}/api/oidc/v1/ras/passport",
            self.config.passport_issuer_base_url
        );
        match self.client.get_json(&url, Some(authorization)).await {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.status() == Some(404) => {
                info!("user has no passport");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    async fn secret(&self, reference: &str) -> Result<Option<String>, ApiError> {
        Ok(std::env::var(reference).ok().filter(|value| !value.is_empty()))
    }
}

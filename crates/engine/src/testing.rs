//! Shared test double for the backend gateway.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use drshub_api::ApiError;
use drshub_types::CredentialBroker;

use crate::gateway::{AccessAuth, DrsGateway};

/// Records every backend call and answers from canned data; per-call delays
/// and error statuses drive the deadline and failure tests.
#[derive(Default)]
pub(crate) struct FakeGateway {
    metadata: Option<Value>,
    metadata_delay: Option<Duration>,
    metadata_error: Option<u16>,
    access_url: Option<Value>,
    access_delay: Option<Duration>,
    access_error: Option<u16>,
    broker_token: Option<String>,
    service_account: Option<Value>,
    passport: Option<Value>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeGateway {
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_metadata_delay(mut self, delay: Duration) -> Self {
        self.metadata_delay = Some(delay);
        self
    }

    pub fn with_metadata_error(mut self, status: u16) -> Self {
        self.metadata_error = Some(status);
        self
    }

    pub fn with_access_url(mut self, access_url: Value) -> Self {
        self.access_url = Some(access_url);
        self
    }

    pub fn with_access_delay(mut self, delay: Duration) -> Self {
        self.access_delay = Some(delay);
        self
    }

    pub fn with_access_error(mut self, status: u16) -> Self {
        self.access_error = Some(status);
        self
    }

    pub fn with_broker_token(mut self, token: &str) -> Self {
        self.broker_token = Some(token.to_string());
        self
    }

    pub fn with_service_account(mut self, key: Value) -> Self {
        self.service_account = Some(key);
        self
    }

    #[allow(dead_code)]
    pub fn with_passport(mut self, passport: Value) -> Self {
        self.passport = Some(passport);
        self
    }

    /// Handle onto the call log, taken before the gateway moves into a
    /// resolver.
    pub fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }

    fn record(&self, name: &str) {
        self.calls.lock().expect("calls lock").push(name.to_string());
    }
}

fn status_error(status: u16) -> ApiError {
    ApiError::Status {
        status,
        body: json!({"error": {"message": "upstream is unhappy"}}).to_string(),
    }
}

#[async_trait]
impl DrsGateway for FakeGateway {
    async fn drs_metadata(&self, _url: &str, _authorization: Option<&str>) -> Result<Value, ApiError> {
        self.record("metadata");
        if let Some(delay) = self.metadata_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(status) = self.metadata_error {
            return Err(status_error(status));
        }
        Ok(self.metadata.clone().unwrap_or_else(|| json!({})))
    }

    async fn drs_access_url(&self, _endpoint: &str, _auth: AccessAuth<'_>) -> Result<Value, ApiError> {
        self.record("access_url");
        if let Some(delay) = self.access_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(status) = self.access_error {
            return Err(status_error(status));
        }
        Ok(self
            .access_url
            .clone()
            .unwrap_or_else(|| json!({"url": "https://signed.example.org/unset"})))
    }

    async fn service_account_key(
        &self,
        _broker: CredentialBroker,
        _authorization: &str,
    ) -> Result<Value, ApiError> {
        self.record("service_account_key");
        Ok(self.service_account.clone().unwrap_or_else(|| json!({})))
    }

    async fn broker_access_token(
        &self,
        _broker: CredentialBroker,
        _authorization: &str,
    ) -> Result<Option<String>, ApiError> {
        self.record("broker_access_token");
        Ok(self.broker_token.clone())
    }

    async fn passport(&self, _authorization: &str) -> Result<Option<Value>, ApiError> {
        self.record("passport");
        Ok(self.passport.clone())
    }

    async fn secret(&self, _reference: &str) -> Result<Option<String>, ApiError> {
        self.record("secret");
        Ok(None)
    }
}

//! Orchestration of a single resolution request.
//!
//! State machine per request: validate, resolve the provider, fetch
//! metadata, evaluate the fetch plan, then run the credential fetch and the
//! access-URL chain concurrently, all under a request-wide "pencils down"
//! deadline. Progress lands in a per-request accumulator owned by exactly
//! this request and discarded at response time; nothing is cached across
//! requests, because resolved access URLs are credential-bearing and
//! time-limited.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{info, warn};

use drshub_api::ApiError;
use drshub_types::{
    AccessMethodType, AccessUrl, AccessUrlAuth, DrsField, DrsObject, ProviderProfile, ResolveError,
};

use crate::config::DrsHubConfig;
use crate::gateway::{AccessAuth, DrsGateway};
use crate::normalize::{self, ResponseSource};
use crate::plan;
use crate::providers;
use crate::uri::{self, UrlParts};

/// Hosting environments typically give us 60 seconds end to end; use most
/// of it for fetching and keep a little for assembling the response.
pub const DEFAULT_PENCILS_DOWN: Duration = Duration::from_secs(58);

const STEP_RESOLVE: &str = "Received error while resolving DRS URL.";
const STEP_BROKER: &str = "Received error contacting the credential broker.";
const STEP_ISSUER: &str = "Received error contacting the passport issuer.";
const STEP_ACCESS: &str = "Received error contacting DRS provider.";
const METADATA_PENDING: &str = "Could not fetch DRS metadata.";

/// One resolution request, shape-validated at the service boundary.
#[derive(Debug, Clone)]
pub struct ResolutionRequest {
    pub url: String,
    pub fields: Vec<DrsField>,
    /// The caller's Authorization header, forwarded verbatim where a
    /// profile says to.
    pub authorization: Option<String>,
    pub force_access_url: bool,
}

/// Per-request accumulator. The `Option<Option<_>>` fields distinguish "not
/// finished" (outer `None`, omitted from the response) from "resolved to no
/// value" (inner `None`, rendered as `null`).
#[derive(Debug, Default, Clone)]
struct Progress {
    /// Timeout error detail while a required call is still in flight.
    required_pending: Option<&'static str>,
    object: Option<DrsObject>,
    method_type: Option<AccessMethodType>,
    access_id: Option<String>,
    service_account: Option<Option<Value>>,
    access_url: Option<Option<AccessUrl>>,
}

pub struct Resolver {
    gateway: Arc<dyn DrsGateway>,
    config: DrsHubConfig,
    pencils_down: Duration,
}

impl Resolver {
    pub fn new(gateway: Arc<dyn DrsGateway>, config: DrsHubConfig) -> Self {
        Resolver {
            gateway,
            config,
            pencils_down: DEFAULT_PENCILS_DOWN,
        }
    }

    /// Overrides the request-wide deadline; a constructor parameter rather
    /// than process state so concurrent callers stay isolated.
    pub fn with_pencils_down(mut self, deadline: Duration) -> Self {
        self.pencils_down = deadline;
        self
    }

    /// Resolves one DRS URI into exactly the requested fields.
    pub async fn resolve(
        &self,
        request: &ResolutionRequest,
    ) -> Result<Map<String, Value>, ResolveError> {
        if request.url.is_empty() {
            return Err(ResolveError::Request("'url' is missing.".into()));
        }
        if !request.fields.is_empty() && request.authorization.is_none() {
            return Err(ResolveError::Request("Authorization header is missing.".into()));
        }

        let parts = uri::parse_drs_uri(&request.url, &self.config)?;
        let profile = providers::determine_provider(
            &request.url,
            &parts,
            request.force_access_url,
            &self.config,
        )?;
        info!(
            url = %request.url,
            provider = profile.name,
            field_count = request.fields.len(),
            "resolving DRS URI"
        );

        if request.fields.is_empty() {
            return Ok(Map::new());
        }

        let progress = Arc::new(Mutex::new(Progress::default()));
        let fetch = self.fetch_all(request, &parts, &profile, Arc::clone(&progress));
        tokio::pin!(fetch);

        let snapshot = tokio::select! {
            result = &mut fetch => {
                result?;
                progress.lock().expect("progress lock").clone()
            }
            _ = tokio::time::sleep(self.pencils_down) => {
                let snapshot = progress.lock().expect("progress lock").clone();
                if let Some(detail) = snapshot.required_pending {
                    return Err(ResolveError::Timeout(detail.into()));
                }
                // Dropping the fetch future cancels whatever was still in
                // flight; its fields are omitted rather than errored.
                info!(url = %request.url, "pencils down: abandoning outstanding optional calls");
                snapshot
            }
        };

        let source = ResponseSource {
            object: snapshot.object.as_ref(),
            service_account: snapshot.service_account.as_ref().map(Option::as_ref),
            access_url: snapshot.access_url.as_ref().map(Option::as_ref),
        };
        normalize::project_response(&request.fields, &profile, &source)
    }

    async fn fetch_all(
        &self,
        request: &ResolutionRequest,
        parts: &UrlParts,
        profile: &ProviderProfile,
        progress: Arc<Mutex<Progress>>,
    ) -> Result<(), ResolveError> {
        let fields = &request.fields;
        let Some(authorization) = request.authorization.as_deref() else {
            return Err(ResolveError::Request("Authorization header is missing.".into()));
        };

        if plan::should_request_metadata(fields) {
            progress.lock().expect("progress lock").required_pending = Some(METADATA_PENDING);
            let metadata_url = uri::metadata_url(parts);
            info!(
                url = %metadata_url,
                metadata_auth = profile.metadata_auth,
                "requesting DRS metadata"
            );
            let raw = self
                .gateway
                .drs_metadata(&metadata_url, profile.metadata_auth.then_some(authorization))
                .await
                .map_err(|error| upstream(STEP_RESOLVE, error))?;
            let object = normalize::parse_provider_object(raw)?;
            let selected = select_access_method(profile, &object);

            let mut locked = progress.lock().expect("progress lock");
            locked.required_pending = None;
            locked.method_type = selected.as_ref().map(|(method_type, _)| *method_type);
            locked.access_id = selected.and_then(|(_, access_id)| access_id);
            locked.object = Some(object);
        }

        let (method_type, access_id) = {
            let locked = progress.lock().expect("progress lock");
            (locked.method_type, locked.access_id.clone())
        };

        let fetch_service_account =
            plan::should_fetch_user_service_account(profile, method_type, fields);
        let fetch_access_url = plan::should_fetch_access_url(profile, method_type, fields);
        {
            // Sources the plan rules out are settled now: they resolved to
            // "no value", which is distinct from never finishing.
            let mut locked = progress.lock().expect("progress lock");
            if !fetch_service_account {
                locked.service_account = Some(None);
            }
            if !fetch_access_url {
                locked.access_url = Some(None);
            }
        }

        // The service account key and the access-URL chain are causally
        // independent; run them concurrently and join.
        let service_account_task = async {
            if !fetch_service_account {
                return Ok(());
            }
            let Some(broker) = profile.broker else {
                return Ok(());
            };
            info!(broker = broker.path_segment(), "requesting user service account key");
            let key = self
                .gateway
                .service_account_key(broker, authorization)
                .await
                .map_err(|error| upstream(STEP_BROKER, error))?;
            progress.lock().expect("progress lock").service_account = Some(Some(key));
            Ok(())
        };

        let access_url_task = async {
            if !fetch_access_url {
                return Ok(());
            }
            let outcome = self
                .fetch_access_url(
                    fields,
                    parts,
                    profile,
                    method_type,
                    access_id.as_deref(),
                    authorization,
                )
                .await;
            match outcome {
                Ok(result) => {
                    progress.lock().expect("progress lock").access_url = Some(result);
                    Ok(())
                }
                Err(error) if plan::should_fail_on_access_url_fail(method_type) => Err(error),
                Err(error) => {
                    // Object-storage data still has a native URI clients can
                    // use; degrade to omission.
                    warn!(%error, "ignoring access URL failure");
                    Ok(())
                }
            }
        };

        let (service_account_result, access_url_result) =
            tokio::join!(service_account_task, access_url_task);
        service_account_result?;
        access_url_result
    }

    async fn fetch_access_url(
        &self,
        fields: &[DrsField],
        parts: &UrlParts,
        profile: &ProviderProfile,
        method_type: Option<AccessMethodType>,
        access_id: Option<&str>,
        authorization: &str,
    ) -> Result<Option<AccessUrl>, ResolveError> {
        let Some(method_type) = method_type else {
            warn!("no usable access method in the object's metadata; skipping access URL fetch");
            return Ok(None);
        };
        let Some(policy) = profile.method_of_type(method_type) else {
            return Ok(None);
        };
        let Some(access_id) = access_id else {
            warn!(
                method_type = method_type.as_str(),
                "resolved access method has no access id; skipping access URL fetch"
            );
            return Ok(None);
        };
        let endpoint = uri::access_endpoint_url(parts, access_id);

        // The broker token and the passport are independent inputs to the
        // access call; fetch them together.
        let token_task = async {
            if !plan::should_fetch_fence_access_token(profile, Some(method_type), fields, false) {
                return Ok(None);
            }
            self.broker_token(profile, authorization).await
        };
        let passports_task = async {
            if !plan::should_fetch_passports(profile, Some(method_type), fields) {
                return Ok(None);
            }
            info!("requesting passport from the issuer");
            let passport = self
                .gateway
                .passport(authorization)
                .await
                .map_err(|error| upstream(STEP_ISSUER, error))?;
            Ok(passport.map(|value| vec![value]))
        };
        let (token, passports) = tokio::join!(token_task, passports_task);
        let (token, passports): (Option<String>, Option<Vec<Value>>) = (token?, passports?);

        info!(endpoint = %endpoint, auth = ?policy.auth, "requesting access URL");
        let primary = self
            .request_access_url(
                &endpoint,
                policy.auth,
                token.as_deref(),
                passports.as_deref(),
                profile,
                authorization,
            )
            .await;

        let needs_fallback = matches!(primary, Ok(None) | Err(_));
        let Some(fallback_auth) = policy.fallback_auth.filter(|_| needs_fallback) else {
            return primary;
        };

        if let Err(error) = &primary {
            warn!(%error, "primary access URL auth failed; retrying with fallback auth");
        } else {
            info!("primary access URL auth produced nothing; retrying with fallback auth");
        }
        let mut fallback_token = None;
        if plan::should_fetch_fence_access_token(profile, Some(method_type), fields, true) {
            fallback_token = self.broker_token(profile, authorization).await?;
        }
        self.request_access_url(
            &endpoint,
            fallback_auth,
            fallback_token.as_deref(),
            passports.as_deref(),
            profile,
            authorization,
        )
        .await
    }

    async fn broker_token(
        &self,
        profile: &ProviderProfile,
        authorization: &str,
    ) -> Result<Option<String>, ResolveError> {
        let Some(broker) = profile.broker else {
            return Ok(None);
        };
        info!(broker = broker.path_segment(), "requesting broker access token");
        self.gateway
            .broker_access_token(broker, authorization)
            .await
            .map_err(|error| upstream(STEP_BROKER, error))
    }

    async fn request_access_url(
        &self,
        endpoint: &str,
        auth_mode: AccessUrlAuth,
        token: Option<&str>,
        passports: Option<&[Value]>,
        profile: &ProviderProfile,
        authorization: &str,
    ) -> Result<Option<AccessUrl>, ResolveError> {
        let raw = match auth_mode {
            AccessUrlAuth::CurrentRequest => self
                .gateway
                .drs_access_url(endpoint, AccessAuth::CurrentRequest(authorization))
                .await
                .map_err(|error| upstream(STEP_ACCESS, error))?,
            AccessUrlAuth::FenceToken => {
                let Some(token) = token else {
                    return Err(ResolveError::Request(format!(
                        "Fence access token required for '{endpoint}' but is missing. \
                         Does the user have an account linked with the credential broker?"
                    )));
                };
                self.gateway
                    .drs_access_url(endpoint, AccessAuth::FenceToken(token))
                    .await
                    .map_err(|error| upstream(STEP_ACCESS, error))?
            }
            AccessUrlAuth::Passport => {
                let Some(passports) = passports.filter(|list| !list.is_empty()) else {
                    info!("no passports available to authorize the access call");
                    return Ok(None);
                };
                let identity_pem = self.mtls_identity(profile).await?;
                let attempt = self
                    .gateway
                    .drs_access_url(
                        endpoint,
                        AccessAuth::Passports {
                            passports,
                            identity_pem: identity_pem.as_deref(),
                        },
                    )
                    .await;
                match attempt {
                    Ok(raw) => raw,
                    Err(error) => {
                        // A provider may refuse a passport it does not
                        // trust; the fallback auth mode still gets its turn.
                        warn!(%error, endpoint = %endpoint, "passport-authorized access URL request failed");
                        return Ok(None);
                    }
                }
            }
        };

        let access: AccessUrl = serde_json::from_value(raw)
            .map_err(|error| ResolveError::upstream(None, STEP_ACCESS, error.to_string()))?;
        Ok(Some(access))
    }

    /// Client mTLS material for passport-authorized providers, fetched by
    /// secret reference. Absent secrets mean plain TLS.
    async fn mtls_identity(&self, profile: &ProviderProfile) -> Result<Option<Vec<u8>>, ResolveError> {
        let Some(secrets) = &profile.mtls_secrets else {
            return Ok(None);
        };
        let key = self
            .gateway
            .secret(&secrets.client_private_key)
            .await
            .map_err(|error| upstream(STEP_ACCESS, error))?;
        let cert = self
            .gateway
            .secret(&secrets.client_cert)
            .await
            .map_err(|error| upstream(STEP_ACCESS, error))?;
        Ok(match (key, cert) {
            (Some(key), Some(cert)) => Some(format!("{key}\n{cert}").into_bytes()),
            _ => None,
        })
    }
}

/// First profile method type that also appears in the object's advertised
/// access methods, with that method's access id.
fn select_access_method(
    profile: &ProviderProfile,
    object: &DrsObject,
) -> Option<(AccessMethodType, Option<String>)> {
    let advertised = object.access_methods.as_deref()?;
    profile.access_methods.iter().find_map(|policy| {
        advertised.iter().find_map(|method| {
            (AccessMethodType::from_drs_type(&method.r#type) == Some(policy.r#type))
                .then(|| (policy.r#type, method.access_id.clone()))
        })
    })
}

fn upstream(step: &'static str, error: ApiError) -> ResolveError {
    let status = error.status();
    let message = match &error {
        ApiError::Status { body, .. } if !body.trim().is_empty() => extract_error_text(body),
        other => other.to_string(),
    };
    ResolveError::upstream(status, step, message)
}

/// Backends often wrap their message in a JSON error envelope; prefer that
/// to the raw body.
fn extract_error_text(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value
            .get("error")
            .and_then(|error| error.get("message"))
            .and_then(Value::as_str)
        {
            return message.to_string();
        }
    }
    body.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGateway;
    use serde_json::json;

    fn resolver(gateway: FakeGateway) -> Resolver {
        Resolver::new(Arc::new(gateway), DrsHubConfig::default())
            .with_pencils_down(Duration::from_secs(3))
    }

    fn request(url: &str, fields: &[DrsField]) -> ResolutionRequest {
        ResolutionRequest {
            url: url.into(),
            fields: fields.to_vec(),
            authorization: Some("Bearer caller-token".into()),
            force_access_url: false,
        }
    }

    fn gs_metadata() -> Value {
        json!({
            "name": "file.bam",
            "size": 42,
            "created_time": "2020-04-27T15:56:09.696Z",
            "checksums": [{"type": "md5", "checksum": "abc"}],
            "access_methods": [
                {"type": "gs", "access_url": {"url": "gs://bucket/dir/file.bam"}, "access_id": "gcp-us"}
            ]
        })
    }

    fn s3_metadata() -> Value {
        json!({
            "name": "file.cram",
            "size": 7,
            "access_methods": [
                {"type": "s3", "access_id": "s3-east"}
            ]
        })
    }

    #[tokio::test]
    async fn empty_field_set_issues_zero_backend_calls() {
        let gateway = FakeGateway::default();
        let calls = gateway.calls();
        let resolver = resolver(gateway);
        let mut req = request("drs://dg.4503/abc", &[]);
        req.authorization = None;

        let response = resolver.resolve(&req).await.expect("resolve");
        assert!(response.is_empty());
        assert!(calls.lock().expect("calls lock").is_empty());
    }

    #[tokio::test]
    async fn metadata_fields_issue_exactly_one_backend_call() {
        let gateway = FakeGateway::default().with_metadata(gs_metadata());
        let calls = gateway.calls();
        let resolver = resolver(gateway);

        let response = resolver
            .resolve(&request("drs://dg.4503/abc", &[DrsField::Size, DrsField::Hashes]))
            .await
            .expect("resolve");

        assert_eq!(response["size"], json!(42));
        assert_eq!(response["hashes"], json!({"md5": "abc"}));
        assert_eq!(*calls.lock().expect("calls lock"), vec!["metadata".to_string()]);
    }

    #[tokio::test]
    async fn disabled_access_url_policy_means_no_access_call_and_null_field() {
        // BDC's object-storage policy has the access fetch off.
        let gateway = FakeGateway::default().with_metadata(gs_metadata());
        let calls = gateway.calls();
        let resolver = resolver(gateway);

        let response = resolver
            .resolve(&request("drs://dg.4503/abc", &[DrsField::AccessUrl]))
            .await
            .expect("resolve");

        assert_eq!(response["accessUrl"], Value::Null);
        let recorded = calls.lock().expect("calls lock").clone();
        assert!(!recorded.iter().any(|call| call == "access_url"), "calls: {recorded:?}");
    }

    #[tokio::test]
    async fn service_account_key_is_fetched_for_broker_backed_object_storage() {
        let key = json!({"type": "service_account", "client_email": "user@example.iam"});
        let gateway = FakeGateway::default()
            .with_metadata(gs_metadata())
            .with_service_account(key.clone());
        let resolver = resolver(gateway);

        let response = resolver
            .resolve(&request(
                "drs://dg.4503/abc",
                &[DrsField::GoogleServiceAccount, DrsField::BondProvider],
            ))
            .await
            .expect("resolve");

        assert_eq!(response["googleServiceAccount"], key);
        assert_eq!(response["bondProvider"], json!("fence"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_access_url_is_omitted_at_the_deadline() {
        let gateway = FakeGateway::default()
            .with_metadata(s3_metadata())
            .with_broker_token("fence-token")
            .with_access_url(json!({"url": "https://signed.example.org/file"}))
            .with_access_delay(Duration::from_secs(600));
        let resolver = resolver(gateway);

        let response = resolver
            .resolve(&request(
                "drs://data.kidsfirstdrc.org/obj",
                &[DrsField::Size, DrsField::AccessUrl],
            ))
            .await
            .expect("must degrade, not fail");

        assert_eq!(response["size"], json!(7));
        assert!(
            !response.contains_key("accessUrl"),
            "a timed-out field is omitted, not null"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_metadata_is_a_timeout_error() {
        let gateway = FakeGateway::default()
            .with_metadata(gs_metadata())
            .with_metadata_delay(Duration::from_secs(600));
        let resolver = resolver(gateway);

        let error = resolver
            .resolve(&request("drs://dg.4503/abc", &[DrsField::Size]))
            .await
            .expect_err("metadata timeout is terminal");

        assert!(matches!(error, ResolveError::Timeout(_)));
        assert_eq!(error.http_status(), 500);
        assert!(error.to_string().contains("Could not fetch DRS metadata."));
    }

    #[tokio::test]
    async fn failed_access_url_for_s3_is_terminal() {
        let gateway = FakeGateway::default()
            .with_metadata(s3_metadata())
            .with_broker_token("fence-token")
            .with_access_error(503);
        let resolver = resolver(gateway);

        let error = resolver
            .resolve(&request("drs://data.kidsfirstdrc.org/obj", &[DrsField::AccessUrl]))
            .await
            .expect_err("s3 has no native fallback");

        match error {
            ResolveError::Upstream { status, step, .. } => {
                assert_eq!(status, 503);
                assert_eq!(step, STEP_ACCESS);
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_access_url_for_object_storage_degrades_to_omission() {
        // Forcing the access fetch on a provider whose gs policy has it off.
        let gateway = FakeGateway::default()
            .with_metadata(gs_metadata())
            .with_broker_token("fence-token")
            .with_access_error(500);
        let resolver = resolver(gateway);
        let mut req = request("drs://dg.4503/abc", &[DrsField::GsUri, DrsField::AccessUrl]);
        req.force_access_url = true;

        let response = resolver.resolve(&req).await.expect("gs degrades");
        assert_eq!(response["gsUri"], json!("gs://bucket/dir/file.bam"));
        assert!(!response.contains_key("accessUrl"));
    }

    #[tokio::test]
    async fn missing_fence_account_link_is_terminal_for_s3() {
        // Broker answers 404: no linked account, so no token, and s3 has no
        // fallback auth.
        let gateway = FakeGateway::default().with_metadata(s3_metadata());
        let resolver = resolver(gateway);

        let error = resolver
            .resolve(&request("drs://data.kidsfirstdrc.org/obj", &[DrsField::AccessUrl]))
            .await
            .expect_err("token required");

        assert!(matches!(error, ResolveError::Request(_)));
        assert!(error.to_string().contains("Fence access token required"));
    }

    #[tokio::test]
    async fn missing_passport_falls_back_to_fence_token() {
        let signed = json!({"url": "https://signed.example.org/file", "headers": {"x": "y"}});
        let gateway = FakeGateway::default()
            .with_metadata(gs_metadata())
            .with_broker_token("fence-token")
            .with_access_url(signed.clone());
        let calls = gateway.calls();
        let resolver = resolver(gateway);

        let response = resolver
            .resolve(&request("drs://dg.test0:abc", &[DrsField::AccessUrl]))
            .await
            .expect("fallback succeeds");

        assert_eq!(response["accessUrl"], signed);
        let recorded = calls.lock().expect("calls lock").clone();
        assert!(recorded.iter().any(|call| call == "passport"), "calls: {recorded:?}");
        assert!(recorded.iter().any(|call| call == "broker_access_token"), "calls: {recorded:?}");
    }

    #[tokio::test]
    async fn missing_auth_header_is_rejected_before_any_backend_call() {
        let gateway = FakeGateway::default();
        let calls = gateway.calls();
        let resolver = resolver(gateway);
        let mut req = request("drs://dg.4503/abc", &[DrsField::Size]);
        req.authorization = None;

        let error = resolver.resolve(&req).await.expect_err("auth required");
        assert!(matches!(error, ResolveError::Request(_)));
        assert!(calls.lock().expect("calls lock").is_empty());
    }

    #[tokio::test]
    async fn identical_requests_yield_byte_identical_responses() {
        let gateway = FakeGateway::default().with_metadata(gs_metadata());
        let resolver = resolver(gateway);
        let req = request("drs://dg.4503/abc", DrsField::DEFAULT_FIELDS);

        let first = resolver.resolve(&req).await.expect("first");
        let second = resolver.resolve(&req).await.expect("second");
        let first_bytes = serde_json::to_string(&first).expect("serialize first");
        let second_bytes = serde_json::to_string(&second).expect("serialize second");
        assert_eq!(first_bytes, second_bytes);
    }

    #[tokio::test]
    async fn upstream_metadata_failure_names_the_resolving_step() {
        let gateway = FakeGateway::default()
            .with_metadata(gs_metadata())
            .with_metadata_error(502);
        let resolver = resolver(gateway);

        let error = resolver
            .resolve(&request("drs://dg.4503/abc", &[DrsField::Size]))
            .await
            .expect_err("metadata failure is terminal");

        match error {
            ResolveError::Upstream { status, step, .. } => {
                assert_eq!(status, 502);
                assert_eq!(step, STEP_RESOLVE);
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }
}

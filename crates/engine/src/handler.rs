//! Service-boundary request handling.
//!
//! The hosting listener hands over the raw JSON body plus the two headers
//! this service cares about; everything else (routing, content negotiation,
//! transport) stays outside. Validation failures short-circuit here with
//! zero backend calls, and every error leaves as the
//! `{status, response: {status, text}}` failure shape.

use serde_json::{Value, json};
use tracing::{error, warn};

use drshub_types::{DrsField, FailureBody, ResolveError};

use crate::resolve::{ResolutionRequest, Resolver};

/// What the listener writes back: an HTTP status and a JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveResponse {
    pub status: u16,
    pub body: Value,
}

/// Handles one resolution request end to end.
///
/// `authorization` is the raw Authorization header, if any;
/// `force_access_url` is the caller's header flag overriding per-method
/// access-URL policy.
pub async fn handle_resolve(
    resolver: &Resolver,
    body: &Value,
    authorization: Option<&str>,
    force_access_url: bool,
) -> ResolveResponse {
    let request = match build_request(body, authorization, force_access_url) {
        Ok(request) => request,
        Err(request_error) => return failure(request_error),
    };

    match resolver.resolve(&request).await {
        Ok(fields) => ResolveResponse {
            status: 200,
            body: Value::Object(fields),
        },
        Err(resolve_error) => failure(resolve_error),
    }
}

fn build_request(
    body: &Value,
    authorization: Option<&str>,
    force_access_url: bool,
) -> Result<ResolutionRequest, ResolveError> {
    let url = body
        .get("url")
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ResolveError::Request("'url' is missing.".into()))?;
    let fields = parse_fields(body.get("fields"))?;
    Ok(ResolutionRequest {
        url,
        fields,
        authorization: authorization.map(str::to_string),
        force_access_url,
    })
}

fn parse_fields(fields: Option<&Value>) -> Result<Vec<DrsField>, ResolveError> {
    let Some(fields) = fields else {
        return Ok(DrsField::DEFAULT_FIELDS.to_vec());
    };
    let Value::Array(entries) = fields else {
        return Err(ResolveError::Request("'fields' was not an array.".into()));
    };

    let mut parsed = Vec::with_capacity(entries.len());
    let mut unsupported = Vec::new();
    for entry in entries {
        match entry.as_str().map(str::parse::<DrsField>) {
            Some(Ok(field)) => parsed.push(field),
            Some(Err(_)) | None => unsupported.push(format!("'{}'", text_of(entry))),
        }
    }
    if !unsupported.is_empty() {
        return Err(ResolveError::Request(format!(
            "Fields {} are not supported. Supported fields are {}.",
            unsupported.join(", "),
            DrsField::supported_names()
        )));
    }
    Ok(parsed)
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn failure(resolve_error: ResolveError) -> ResolveResponse {
    match &resolve_error {
        ResolveError::Request(_) => warn!(%resolve_error, "rejecting request"),
        other => error!(%other, "resolution failed"),
    }
    let body = FailureBody::from_error(&resolve_error);
    let status = body.status;
    let body = serde_json::to_value(&body).unwrap_or_else(|_| {
        json!({"status": 500, "response": {"status": 500, "text": "error body serialization failed"}})
    });
    ResolveResponse { status, body }
}

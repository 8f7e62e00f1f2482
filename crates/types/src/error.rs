use serde::Serialize;
use thiserror::Error;

/// Everything a resolution can fail with, mapped at the orchestrator
/// boundary. Nothing outside this taxonomy reaches the response writer.
///
/// Each variant's message names the proximate failing step so operators can
/// tell which backend misbehaved.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The caller's fault: malformed URI, unknown field, missing auth,
    /// unrecognized provider. Always rejected before any backend call.
    #[error("Request is invalid. {0}")]
    Request(String),

    /// A backend call failed with a non-retryable status or exhausted its
    /// retries. Carries the upstream status so the response can reproduce
    /// it.
    #[error("{step} {message}")]
    Upstream {
        status: u16,
        step: &'static str,
        message: String,
    },

    /// The metadata fetch did not complete before the request-wide
    /// deadline.
    #[error("Timed out resolving DRS URI. {0}")]
    Timeout(String),

    /// Self-contradictory backend data or another bug-shaped failure.
    #[error("{0}")]
    Internal(String),
}

impl ResolveError {
    pub fn upstream(status: Option<u16>, step: &'static str, message: String) -> Self {
        ResolveError::Upstream {
            status: status.filter(|code| (400..=599).contains(code)).unwrap_or(500),
            step,
            message,
        }
    }

    /// The HTTP status the response should carry.
    pub fn http_status(&self) -> u16 {
        match self {
            ResolveError::Request(_) => 400,
            ResolveError::Upstream { status, .. } => *status,
            ResolveError::Timeout(_) | ResolveError::Internal(_) => 500,
        }
    }
}

/// Error body shape: the proximate failure's status is reproduced both at
/// the top level and inside `response`, alongside the human-readable text.
#[derive(Debug, Serialize)]
pub struct FailureBody {
    pub status: u16,
    pub response: FailureDetail,
}

#[derive(Debug, Serialize)]
pub struct FailureDetail {
    pub status: u16,
    pub text: String,
}

impl FailureBody {
    pub fn from_error(error: &ResolveError) -> Self {
        let status = error.http_status();
        FailureBody {
            status,
            response: FailureDetail {
                status,
                text: error.to_string(),
            },
        }
    }
}

//! Shared data model for DRSHub.
//!
//! Everything that crosses a crate boundary lives here: the response field
//! vocabulary callers may request, the declarative provider profiles the
//! resolver selects from, the wire DTOs for provider metadata and access
//! URLs, and the error taxonomy every failure is mapped into before it
//! reaches the response writer.

mod error;
mod fields;
mod metadata;
mod profile;

pub use error::{FailureBody, FailureDetail, ResolveError};
pub use fields::{DrsField, UnknownFieldError};
pub use metadata::{AccessUrl, DrsAccessMethod, DrsChecksum, DrsObject};
pub use profile::{
    AccessMethodPolicy, AccessMethodType, AccessUrlAuth, CredentialBroker, MtlsSecretNames,
    ProviderProfile,
};

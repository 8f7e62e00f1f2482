use serde::{Deserialize, Serialize};

/// The kind of access method a provider advertises for an object.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMethodType {
    Gs,
    S3,
    Https,
}

impl AccessMethodType {
    /// Maps the `type` discriminator of a provider access method. Unknown
    /// discriminators yield `None` and the method is skipped.
    pub fn from_drs_type(value: &str) -> Option<Self> {
        match value {
            "gs" => Some(AccessMethodType::Gs),
            "s3" => Some(AccessMethodType::S3),
            "https" => Some(AccessMethodType::Https),
            _ => None,
        }
    }

    /// Object-storage methods have a cloud-native URI clients can fall back
    /// on when no access URL could be fetched.
    pub fn is_object_storage(self) -> bool {
        matches!(self, AccessMethodType::Gs)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccessMethodType::Gs => "gs",
            AccessMethodType::S3 => "s3",
            AccessMethodType::Https => "https",
        }
    }
}

/// How an access-URL request to the provider's `access` endpoint is
/// authorized.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessUrlAuth {
    /// Forward the caller's own Authorization header.
    CurrentRequest,
    /// Use a Fence token obtained from the credential broker.
    FenceToken,
    /// POST the caller's passports, optionally over client mTLS.
    Passport,
}

/// The credential broker account a provider's objects are linked under.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialBroker {
    Fence,
    DcfFence,
    Anvil,
    KidsFirst,
}

impl CredentialBroker {
    /// Path segment used on the broker's link API, also the wire value of
    /// the `bondProvider` response field.
    pub fn path_segment(self) -> &'static str {
        match self {
            CredentialBroker::Fence => "fence",
            CredentialBroker::DcfFence => "dcf-fence",
            CredentialBroker::Anvil => "anvil",
            CredentialBroker::KidsFirst => "kids-first",
        }
    }
}

/// Per-method-type policy for access-URL requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessMethodPolicy {
    pub r#type: AccessMethodType,
    /// Auth mode for the first access-URL attempt.
    pub auth: AccessUrlAuth,
    /// Whether the `access` endpoint should be called at all for this
    /// method type. Providers with this off return only cloud-native URIs.
    pub fetch_access_url: bool,
    /// Auth mode for the single retry after a failed first attempt.
    pub fallback_auth: Option<AccessUrlAuth>,
}

/// Secret-store references for the client certificate and private key some
/// passport-authorized providers require.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MtlsSecretNames {
    pub client_cert: String,
    pub client_private_key: String,
}

/// Declarative description of one DRS provider.
///
/// Profiles are plain configuration records built fresh per request from the
/// static host rules; the orchestrator never mutates one. `force_access_url`
/// is the only per-request value, threaded in from the caller's header flag.
#[derive(Clone, Debug)]
pub struct ProviderProfile {
    pub name: &'static str,
    /// Whether metadata requests forward the caller's Authorization header.
    pub metadata_auth: bool,
    pub broker: Option<CredentialBroker>,
    /// Ordered by preference; the first type also present in the object's
    /// metadata wins.
    pub access_methods: Vec<AccessMethodPolicy>,
    pub force_access_url: bool,
    /// Providers without a DRS-spec field for localization paths publish the
    /// path as the object's first alias.
    pub use_aliases_for_localization_path: bool,
    pub mtls_secrets: Option<MtlsSecretNames>,
}

impl ProviderProfile {
    pub fn method_of_type(&self, method_type: AccessMethodType) -> Option<&AccessMethodPolicy> {
        self.access_methods.iter().find(|m| m.r#type == method_type)
    }

    pub fn supports_method_type(&self, method_type: AccessMethodType) -> bool {
        self.method_of_type(method_type).is_some()
    }
}

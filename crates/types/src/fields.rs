use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A response field a caller may request by name.
///
/// The wire names are fixed; anything outside this vocabulary is a request
/// error. Field groups below drive the fetch planner: a backend call is only
/// issued when at least one requested field depends on it.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DrsField {
    GsUri,
    Bucket,
    Name,
    FileName,
    LocalizationPath,
    ContentType,
    Size,
    Hashes,
    TimeCreated,
    TimeUpdated,
    GoogleServiceAccount,
    BondProvider,
    AccessUrl,
}

impl DrsField {
    /// Fields sourced from the provider's object metadata.
    pub const CORE_FIELDS: &'static [DrsField] = &[
        DrsField::GsUri,
        DrsField::Bucket,
        DrsField::Name,
        DrsField::FileName,
        DrsField::LocalizationPath,
        DrsField::ContentType,
        DrsField::Size,
        DrsField::Hashes,
        DrsField::TimeCreated,
        DrsField::TimeUpdated,
    ];

    /// Every field a response can carry, in canonical response order.
    pub const ALL_FIELDS: &'static [DrsField] = &[
        DrsField::GsUri,
        DrsField::Bucket,
        DrsField::Name,
        DrsField::FileName,
        DrsField::LocalizationPath,
        DrsField::ContentType,
        DrsField::Size,
        DrsField::Hashes,
        DrsField::TimeCreated,
        DrsField::TimeUpdated,
        DrsField::GoogleServiceAccount,
        DrsField::BondProvider,
        DrsField::AccessUrl,
    ];

    /// Applied when a request omits `fields` entirely.
    pub const DEFAULT_FIELDS: &'static [DrsField] = &[
        DrsField::GsUri,
        DrsField::Bucket,
        DrsField::Name,
        DrsField::FileName,
        DrsField::LocalizationPath,
        DrsField::ContentType,
        DrsField::Size,
        DrsField::Hashes,
        DrsField::TimeCreated,
        DrsField::TimeUpdated,
        DrsField::GoogleServiceAccount,
    ];

    /// Fields that require a metadata call to the DRS provider.
    pub const METADATA_FIELDS: &'static [DrsField] = &[
        DrsField::GsUri,
        DrsField::Bucket,
        DrsField::Name,
        DrsField::FileName,
        DrsField::LocalizationPath,
        DrsField::ContentType,
        DrsField::Size,
        DrsField::Hashes,
        DrsField::TimeCreated,
        DrsField::TimeUpdated,
        DrsField::AccessUrl,
    ];

    /// Fields that require the user's service account key from the broker.
    pub const SERVICE_ACCOUNT_FIELDS: &'static [DrsField] = &[DrsField::GoogleServiceAccount];

    /// Fields that require the provider's `access` endpoint.
    pub const ACCESS_URL_FIELDS: &'static [DrsField] = &[DrsField::AccessUrl];

    pub fn as_str(self) -> &'static str {
        match self {
            DrsField::GsUri => "gsUri",
            DrsField::Bucket => "bucket",
            DrsField::Name => "name",
            DrsField::FileName => "fileName",
            DrsField::LocalizationPath => "localizationPath",
            DrsField::ContentType => "contentType",
            DrsField::Size => "size",
            DrsField::Hashes => "hashes",
            DrsField::TimeCreated => "timeCreated",
            DrsField::TimeUpdated => "timeUpdated",
            DrsField::GoogleServiceAccount => "googleServiceAccount",
            DrsField::BondProvider => "bondProvider",
            DrsField::AccessUrl => "accessUrl",
        }
    }

    /// True when any requested field belongs to the given service group.
    pub fn overlaps(requested: &[DrsField], group: &[DrsField]) -> bool {
        requested.iter().any(|field| group.contains(field))
    }

    /// The supported vocabulary, rendered for error messages.
    pub fn supported_names() -> String {
        let names: Vec<&str> = Self::ALL_FIELDS.iter().map(|f| f.as_str()).collect();
        format!("'{}'", names.join("', '"))
    }
}

impl fmt::Display for DrsField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFieldError(pub String);

impl fmt::Display for UnknownFieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown field '{}'", self.0)
    }
}

impl std::error::Error for UnknownFieldError {}

impl FromStr for DrsField {
    type Err = UnknownFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL_FIELDS
            .iter()
            .copied()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| UnknownFieldError(s.to_string()))
    }
}

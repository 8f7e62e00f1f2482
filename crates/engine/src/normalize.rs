//! Response normalization.
//!
//! Providers answer in one of two metadata schema generations; both are
//! projected here into one canonical field set. Checksum lists become a
//! type-keyed map, native object-storage URIs split into bucket/name pairs,
//! and provider timestamps are rendered as RFC 3339 UTC.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use drshub_types::{
    AccessUrl, DrsAccessMethod, DrsChecksum, DrsField, DrsObject, ProviderProfile, ResolveError,
};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const PARSE_STEP: &str = "Received error while parsing response from DRS URL.";

static GS_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^gs://([^/]+)/(.+)$").expect("gs uri pattern"));

/// The legacy schema generation nests everything under `data_object` and
/// lists plain URLs instead of typed access methods.
#[derive(Debug, Deserialize)]
struct LegacyEnvelope {
    data_object: LegacyDataObject,
}

#[derive(Debug, Deserialize)]
struct LegacyDataObject {
    #[serde(default)]
    urls: Option<Vec<LegacyUrl>>,
    #[serde(default)]
    checksums: Option<Vec<DrsChecksum>>,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    updated: Option<String>,
    #[serde(default, rename = "mimeType")]
    mime_type: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    size: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct LegacyUrl {
    url: String,
}

/// Parses a provider metadata response of either schema generation into the
/// canonical [`DrsObject`].
pub fn parse_provider_object(raw: Value) -> Result<DrsObject, ResolveError> {
    if raw.get("data_object").is_some() {
        let envelope: LegacyEnvelope = serde_json::from_value(raw)
            .map_err(|error| ResolveError::Internal(format!("{PARSE_STEP} {error}")))?;
        let legacy = envelope.data_object;

        // Only object-storage URLs become access methods; the legacy schema
        // has no access ids or method types of its own.
        let access_methods: Vec<DrsAccessMethod> = legacy
            .urls
            .unwrap_or_default()
            .into_iter()
            .filter(|entry| entry.url.starts_with("gs://"))
            .map(|entry| DrsAccessMethod {
                r#type: "gs".into(),
                access_url: Some(AccessUrl {
                    url: entry.url,
                    headers: None,
                }),
                access_id: None,
            })
            .collect();

        return Ok(DrsObject {
            name: legacy.name,
            size: coerce_size(legacy.size),
            created_time: legacy.created,
            updated_time: legacy.updated,
            mime_type: legacy.mime_type,
            checksums: legacy.checksums,
            access_methods: (!access_methods.is_empty()).then_some(access_methods),
            aliases: None,
        });
    }

    serde_json::from_value(raw).map_err(|error| ResolveError::Internal(format!("{PARSE_STEP} {error}")))
}

// The legacy schema shares the current generation's habit of returning
// sizes as either numbers or numeric strings.
fn coerce_size(size: Option<Value>) -> Option<i64> {
    match size? {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Converts a checksum list into a type-keyed map. Two entries for the same
/// hash type are self-contradictory source data and a hard error.
pub fn hashes_map(
    checksums: Option<&[DrsChecksum]>,
) -> Result<Option<IndexMap<String, String>>, ResolveError> {
    let checksums = match checksums {
        Some(list) if !list.is_empty() => list,
        _ => return Ok(None),
    };

    let mut map = IndexMap::new();
    for entry in checksums {
        if map.insert(entry.r#type.clone(), entry.checksum.clone()).is_some() {
            return Err(ResolveError::Internal(format!(
                "Response from DRS Resolution server contained duplicate checksum values \
                 for hash type '{}' in checksums array!",
                entry.r#type
            )));
        }
    }
    Ok(Some(map))
}

/// Splits a `gs://bucket/name` URI into its bucket and object name.
pub fn parse_gs_uri(uri: &str) -> Option<(String, String)> {
    let captures = GS_URI.captures(uri)?;
    Some((captures[1].to_string(), captures[2].to_string()))
}

/// Renders a provider timestamp as RFC 3339 UTC with millisecond precision.
/// Some providers return time without a timezone; those are taken as UTC
/// rather than local time.
pub fn to_utc_rfc3339(timestamp: &str) -> Option<String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(timestamp) {
        return Some(parsed.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Millis, true));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(timestamp, format) {
            return Some(naive.and_utc().to_rfc3339_opts(SecondsFormat::Millis, true));
        }
    }
    None
}

/// The object's native `gs://` URI, when it advertises one.
pub fn gs_uri_of(object: &DrsObject) -> Option<&str> {
    object
        .access_methods
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|method| method.r#type == "gs")
        .and_then(|method| method.access_url.as_ref())
        .map(|access| access.url.as_str())
}

/// Best-effort file name: the object's own name, else the basename of the
/// first advertised access URL. May legitimately be absent when the
/// uploader populated neither.
pub fn file_name_of(object: &DrsObject) -> Option<String> {
    if let Some(name) = object.name.as_deref().filter(|n| !n.is_empty()) {
        return Some(name.to_string());
    }
    let first_url = object
        .access_methods
        .as_deref()
        .unwrap_or_default()
        .first()
        .and_then(|method| method.access_url.as_ref())?;
    let path = url::Url::parse(&first_url.url).ok()?.path().to_string();
    Some(basename(&path)).filter(|n| !n.is_empty())
}

/// Localization path, for providers that publish it as the first alias.
pub fn localization_path_of(profile: &ProviderProfile, object: &DrsObject) -> Option<String> {
    if !profile.use_aliases_for_localization_path {
        return None;
    }
    object.aliases.as_deref().unwrap_or_default().first().cloned()
}

fn basename(path: &str) -> String {
    path.rsplit(['/', '\\']).next().unwrap_or_default().to_string()
}

/// Everything a response can be assembled from. `Option<Option<_>>` fields
/// distinguish "source never finished" (outer `None`, field omitted) from
/// "source resolved to no value" (inner `None`, field is `null`).
#[derive(Debug, Default)]
pub struct ResponseSource<'a> {
    pub object: Option<&'a DrsObject>,
    pub service_account: Option<Option<&'a Value>>,
    pub access_url: Option<Option<&'a AccessUrl>>,
}

/// Projects the accumulated resolution state onto exactly the requested
/// fields, in canonical field order.
pub fn project_response(
    requested: &[DrsField],
    profile: &ProviderProfile,
    source: &ResponseSource<'_>,
) -> Result<Map<String, Value>, ResolveError> {
    let mut response = Map::new();
    let object = source.object;
    let gs_uri = object.and_then(gs_uri_of);
    let gs_parts = gs_uri.and_then(parse_gs_uri);

    for field in DrsField::ALL_FIELDS {
        if !requested.contains(field) {
            continue;
        }
        let value = match field {
            DrsField::GsUri => opt_string(gs_uri.map(str::to_string)),
            DrsField::Bucket => opt_string(gs_parts.as_ref().map(|(bucket, _)| bucket.clone())),
            DrsField::Name => opt_string(gs_parts.as_ref().map(|(_, name)| name.clone())),
            DrsField::FileName => {
                let from_object = object.and_then(file_name_of);
                let from_gs_name = gs_parts.as_ref().map(|(_, name)| basename(name));
                opt_string(from_object.or(from_gs_name).filter(|n| !n.is_empty()))
            }
            DrsField::LocalizationPath => {
                opt_string(object.and_then(|o| localization_path_of(profile, o)))
            }
            DrsField::ContentType => opt_string(Some(
                object
                    .and_then(|o| o.mime_type.clone())
                    .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.into()),
            )),
            DrsField::Size => object
                .and_then(|o| o.size)
                .map(Value::from)
                .unwrap_or(Value::Null),
            DrsField::Hashes => match hashes_map(object.and_then(|o| o.checksums.as_deref()))? {
                Some(map) => serde_json::to_value(map)
                    .map_err(|error| ResolveError::Internal(error.to_string()))?,
                None => Value::Null,
            },
            DrsField::TimeCreated => {
                opt_string(object.and_then(|o| o.created_time.as_deref()).and_then(to_utc_rfc3339))
            }
            DrsField::TimeUpdated => {
                opt_string(object.and_then(|o| o.updated_time.as_deref()).and_then(to_utc_rfc3339))
            }
            DrsField::GoogleServiceAccount => match source.service_account {
                None => continue,
                Some(None) => Value::Null,
                Some(Some(key)) => {
                    // An empty key object means the broker had nothing.
                    if key.as_object().is_some_and(|o| o.is_empty()) {
                        Value::Null
                    } else {
                        key.clone()
                    }
                }
            },
            DrsField::BondProvider => match profile.broker {
                Some(broker) => Value::String(broker.path_segment().into()),
                None => Value::Null,
            },
            DrsField::AccessUrl => match source.access_url {
                None => continue,
                Some(None) => Value::Null,
                Some(Some(access)) => serde_json::to_value(access)
                    .map_err(|error| ResolveError::Internal(error.to_string()))?,
            },
        };
        response.insert(field.as_str().to_string(), value);
    }

    Ok(response)
}

fn opt_string(value: Option<String>) -> Value {
    value.map(Value::String).unwrap_or(Value::Null)
}

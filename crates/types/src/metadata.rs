use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A URL (plus any required headers) that can be used to fetch the object's
/// bytes, as returned by a provider's `access` endpoint or embedded in its
/// metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccessUrl {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Value>,
}

/// One way the provider offers to fetch the object's bytes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DrsAccessMethod {
    pub r#type: String,
    #[serde(default)]
    pub access_url: Option<AccessUrl>,
    #[serde(default)]
    pub access_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DrsChecksum {
    pub r#type: String,
    pub checksum: String,
}

/// Provider metadata for one object, in the current schema generation.
///
/// The legacy generation (everything nested under `data_object`, different
/// field names, access URLs as a flat `urls` list) is projected into this
/// shape by the normalizer before anything else looks at it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DrsObject {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_size")]
    pub size: Option<i64>,
    #[serde(default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub updated_time: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub checksums: Option<Vec<DrsChecksum>>,
    #[serde(default)]
    pub access_methods: Option<Vec<DrsAccessMethod>>,
    #[serde(default)]
    pub aliases: Option<Vec<String>>,
}

/// Some providers return `size` as a JSON string rather than a number.
fn lenient_size<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MaybeNumber {
        Number(i64),
        Float(f64),
        Text(String),
    }

    let value: Option<MaybeNumber> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(MaybeNumber::Number(n)) => Some(n),
        Some(MaybeNumber::Float(f)) => Some(f as i64),
        Some(MaybeNumber::Text(text)) => text.trim().parse::<i64>().ok(),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn size_accepts_numbers_and_numeric_strings() {
        let numeric: DrsObject = serde_json::from_value(json!({"size": 39830})).expect("number");
        assert_eq!(numeric.size, Some(39830));

        let text: DrsObject = serde_json::from_value(json!({"size": "148"})).expect("string");
        assert_eq!(text.size, Some(148));

        let garbage: DrsObject = serde_json::from_value(json!({"size": "huge"})).expect("garbage");
        assert_eq!(garbage.size, None);
    }

    #[test]
    fn access_methods_tolerate_missing_optional_parts() {
        let object: DrsObject = serde_json::from_value(json!({
            "access_methods": [
                {"type": "gs", "access_url": {"url": "gs://bucket/key"}},
                {"type": "s3", "access_id": "s3-east"}
            ]
        }))
        .expect("access methods");

        let methods = object.access_methods.expect("methods present");
        assert_eq!(methods[0].access_url.as_ref().map(|u| u.url.as_str()), Some("gs://bucket/key"));
        assert_eq!(methods[0].access_id, None);
        assert_eq!(methods[1].access_id.as_deref(), Some("s3-east"));
    }

    #[test]
    fn access_url_headers_are_omitted_when_absent() {
        let access = AccessUrl {
            url: "https://signed.example.org/object".into(),
            headers: None,
        };
        let encoded = serde_json::to_value(&access).expect("serialize");
        assert_eq!(encoded, json!({"url": "https://signed.example.org/object"}));
    }
}

//! Static host-matching rules pairing a URI with its provider profile.
//!
//! Profiles are immutable configuration records (no polymorphism); the
//! per-request `force_access_url` override is the only caller-supplied
//! value threaded into them. Rules are evaluated in fixed priority order
//! and select exactly one profile or fail.

use once_cell::sync::Lazy;
use regex::Regex;

use drshub_types::{
    AccessMethodPolicy, AccessMethodType, AccessUrlAuth, CredentialBroker, MtlsSecretNames,
    ProviderProfile, ResolveError,
};

use crate::config::DrsHubConfig;
use crate::uri::UrlParts;

// Terra Data Repo hosts across deployments, e.g. data.terra.bio or
// jade-data-repo.datarepo-dev.broadinstitute.org.
static DATA_REPO_HOST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i).*data.*[-.](broadinstitute\.org|terra\.bio)$").expect("data repo host pattern")
});

/// Selects the provider profile for a parsed DRS URI.
///
/// `raw_url` is only used in error messages; matching runs on the expanded
/// host, case-insensitively.
pub fn determine_provider(
    raw_url: &str,
    parts: &UrlParts,
    force_access_url: bool,
    config: &DrsHubConfig,
) -> Result<ProviderProfile, ResolveError> {
    let host = parts.host.to_lowercase();

    // BioData Catalyst, but skip compact URIs that may be legacy aliases
    // merely resolving through the BDC host.
    if (host.ends_with(".biodatacatalyst.nhlbi.nih.gov") || host == config.mock_drs_host.to_lowercase())
        && !parts.legacy_ambiguous
    {
        return Ok(bio_data_catalyst(force_access_url));
    }

    if host.ends_with(".theanvil.io") {
        return Ok(anvil(force_access_url));
    }

    if DATA_REPO_HOST.is_match(&host) {
        return Ok(terra_data_repo(force_access_url));
    }

    if host.ends_with(".datacommons.io") {
        return Ok(crdc(force_access_url));
    }

    if host.ends_with(".kidsfirstdrc.org") {
        return Ok(kids_first(force_access_url));
    }

    if host == config.passport_test_host.to_lowercase() {
        return Ok(passport_test(force_access_url, config));
    }

    // Retired namespace: objects were migrated off dataguids.org.
    if host.ends_with("dataguids.org") {
        return Err(ResolveError::Request(
            "dataguids.org data has moved. See: https://support.terra.bio/hc/en-us/articles/360060681132"
                .into(),
        ));
    }

    Err(ResolveError::Request(format!(
        "Could not determine DRS provider for id '{raw_url}'"
    )))
}

fn bio_data_catalyst(force_access_url: bool) -> ProviderProfile {
    ProviderProfile {
        name: "BioData Catalyst (BDC)",
        metadata_auth: false,
        broker: Some(CredentialBroker::Fence),
        access_methods: vec![AccessMethodPolicy {
            r#type: AccessMethodType::Gs,
            auth: AccessUrlAuth::FenceToken,
            fetch_access_url: false,
            fallback_auth: None,
        }],
        force_access_url,
        use_aliases_for_localization_path: false,
        mtls_secrets: None,
    }
}

fn anvil(force_access_url: bool) -> ProviderProfile {
    ProviderProfile {
        name: "NHGRI Analysis Visualization and Informatics Lab-space (The AnVIL)",
        metadata_auth: false,
        broker: Some(CredentialBroker::Anvil),
        access_methods: vec![AccessMethodPolicy {
            r#type: AccessMethodType::Gs,
            auth: AccessUrlAuth::FenceToken,
            fetch_access_url: false,
            fallback_auth: None,
        }],
        force_access_url,
        use_aliases_for_localization_path: false,
        mtls_secrets: None,
    }
}

fn terra_data_repo(force_access_url: bool) -> ProviderProfile {
    ProviderProfile {
        name: "Terra Data Repo (TDR)",
        metadata_auth: true,
        broker: None,
        access_methods: vec![AccessMethodPolicy {
            r#type: AccessMethodType::Gs,
            auth: AccessUrlAuth::CurrentRequest,
            fetch_access_url: false,
            fallback_auth: None,
        }],
        force_access_url,
        use_aliases_for_localization_path: true,
        mtls_secrets: None,
    }
}

fn crdc(force_access_url: bool) -> ProviderProfile {
    ProviderProfile {
        name: "NCI Cancer Research / Proteomics Data Commons (CRDC / PDC)",
        metadata_auth: false,
        broker: Some(CredentialBroker::DcfFence),
        access_methods: vec![
            AccessMethodPolicy {
                r#type: AccessMethodType::Gs,
                auth: AccessUrlAuth::FenceToken,
                fetch_access_url: false,
                fallback_auth: None,
            },
            AccessMethodPolicy {
                r#type: AccessMethodType::S3,
                auth: AccessUrlAuth::FenceToken,
                fetch_access_url: true,
                fallback_auth: None,
            },
        ],
        force_access_url,
        use_aliases_for_localization_path: false,
        mtls_secrets: None,
    }
}

fn kids_first(force_access_url: bool) -> ProviderProfile {
    ProviderProfile {
        name: "Gabriella Miller Kids First DRC",
        metadata_auth: false,
        broker: Some(CredentialBroker::KidsFirst),
        access_methods: vec![AccessMethodPolicy {
            r#type: AccessMethodType::S3,
            auth: AccessUrlAuth::FenceToken,
            fetch_access_url: true,
            fallback_auth: None,
        }],
        force_access_url,
        use_aliases_for_localization_path: false,
        mtls_secrets: None,
    }
}

fn passport_test(force_access_url: bool, config: &DrsHubConfig) -> ProviderProfile {
    ProviderProfile {
        name: "Passport Test",
        metadata_auth: false,
        broker: Some(CredentialBroker::DcfFence),
        access_methods: vec![AccessMethodPolicy {
            r#type: AccessMethodType::Gs,
            auth: AccessUrlAuth::Passport,
            fetch_access_url: true,
            fallback_auth: Some(AccessUrlAuth::FenceToken),
        }],
        force_access_url,
        use_aliases_for_localization_path: false,
        mtls_secrets: Some(MtlsSecretNames {
            client_cert: config.passport_client_cert_secret.clone(),
            client_private_key: config.passport_client_key_secret.clone(),
        }),
    }
}

//! Fetch planning: pure predicates over the provider profile, the resolved
//! access method, and the requested fields.
//!
//! These decide which backend calls a request needs; the orchestrator only
//! executes what they approve, so adding requested fields can only ever add
//! calls. No I/O, directly unit-testable.

use drshub_types::{AccessMethodType, AccessUrlAuth, DrsField, ProviderProfile};

/// A metadata call is needed whenever any requested field is derived from
/// the provider's object description.
pub fn should_request_metadata(requested: &[DrsField]) -> bool {
    DrsField::overlaps(requested, DrsField::METADATA_FIELDS)
}

/// The user's service account key lives with the broker and is only
/// meaningful for object-storage data. An unresolved method ("not
/// definitely not object storage") still qualifies because a key-only
/// request issues no metadata call.
pub fn should_fetch_user_service_account(
    profile: &ProviderProfile,
    method_type: Option<AccessMethodType>,
    requested: &[DrsField],
) -> bool {
    profile.broker.is_some()
        && method_type.is_none_or(|t| t == AccessMethodType::Gs)
        && profile.supports_method_type(AccessMethodType::Gs)
        && DrsField::overlaps(requested, DrsField::SERVICE_ACCOUNT_FIELDS)
}

/// A broker (Fence) token is needed when the access-URL call will
/// authenticate with one. With `use_fallback_auth` the method's fallback
/// mode is consulted instead of its primary mode.
pub fn should_fetch_fence_access_token(
    profile: &ProviderProfile,
    method_type: Option<AccessMethodType>,
    requested: &[DrsField],
    use_fallback_auth: bool,
) -> bool {
    profile.broker.is_some()
        && DrsField::overlaps(requested, DrsField::ACCESS_URL_FIELDS)
        && (profile.force_access_url
            || method_type.is_some_and(|t| {
                profile.access_methods.iter().any(|m| {
                    m.r#type == t
                        && (!use_fallback_auth || m.fallback_auth == Some(AccessUrlAuth::FenceToken))
                        && (use_fallback_auth || m.auth == AccessUrlAuth::FenceToken)
                        && m.fetch_access_url
                })
            }))
}

/// Whether to call the provider's `access` endpoint at all.
pub fn should_fetch_access_url(
    profile: &ProviderProfile,
    method_type: Option<AccessMethodType>,
    requested: &[DrsField],
) -> bool {
    DrsField::overlaps(requested, DrsField::ACCESS_URL_FIELDS)
        && (profile.force_access_url
            || method_type.is_some_and(|t| {
                profile
                    .access_methods
                    .iter()
                    .any(|m| m.r#type == t && m.fetch_access_url)
            }))
}

/// Passports are fetched when the resolved method authorizes its access
/// call with one.
pub fn should_fetch_passports(
    profile: &ProviderProfile,
    method_type: Option<AccessMethodType>,
    requested: &[DrsField],
) -> bool {
    DrsField::overlaps(requested, DrsField::ACCESS_URL_FIELDS)
        && method_type.is_some_and(|t| {
            profile
                .access_methods
                .iter()
                .any(|m| m.r#type == t && m.auth == AccessUrlAuth::Passport)
        })
}

/// A failed access-URL fetch is terminal only when the resolved method is
/// not object storage: there is no cloud-native URI for clients to fall
/// back on.
pub fn should_fail_on_access_url_fail(method_type: Option<AccessMethodType>) -> bool {
    method_type.is_some_and(|t| !t.is_object_storage())
}

#[cfg(test)]
mod tests {
    use super::*;
    use drshub_types::{AccessMethodPolicy, CredentialBroker};

    fn profile(
        broker: Option<CredentialBroker>,
        methods: Vec<AccessMethodPolicy>,
        force: bool,
    ) -> ProviderProfile {
        ProviderProfile {
            name: "test",
            metadata_auth: false,
            broker,
            access_methods: methods,
            force_access_url: force,
            use_aliases_for_localization_path: false,
            mtls_secrets: None,
        }
    }

    fn gs_policy(auth: AccessUrlAuth, fetch: bool, fallback: Option<AccessUrlAuth>) -> AccessMethodPolicy {
        AccessMethodPolicy {
            r#type: AccessMethodType::Gs,
            auth,
            fetch_access_url: fetch,
            fallback_auth: fallback,
        }
    }

    const ACCESS_ONLY: &[DrsField] = &[DrsField::AccessUrl];
    const SA_ONLY: &[DrsField] = &[DrsField::GoogleServiceAccount];

    #[test]
    fn metadata_is_requested_only_for_metadata_fields() {
        assert!(should_request_metadata(&[DrsField::Hashes]));
        assert!(should_request_metadata(&[DrsField::AccessUrl]));
        assert!(!should_request_metadata(SA_ONLY));
        assert!(!should_request_metadata(&[DrsField::BondProvider]));
        assert!(!should_request_metadata(&[]));
    }

    #[test]
    fn service_account_needs_broker_and_object_storage() {
        let p = profile(
            Some(CredentialBroker::Fence),
            vec![gs_policy(AccessUrlAuth::FenceToken, false, None)],
            false,
        );
        assert!(should_fetch_user_service_account(&p, Some(AccessMethodType::Gs), SA_ONLY));
        // No metadata call made yet: "not definitely not object storage".
        assert!(should_fetch_user_service_account(&p, None, SA_ONLY));
        assert!(!should_fetch_user_service_account(&p, Some(AccessMethodType::S3), SA_ONLY));
        assert!(!should_fetch_user_service_account(&p, Some(AccessMethodType::Gs), ACCESS_ONLY));

        let brokerless = profile(None, vec![gs_policy(AccessUrlAuth::CurrentRequest, false, None)], false);
        assert!(!should_fetch_user_service_account(&brokerless, None, SA_ONLY));
    }

    #[test]
    fn fence_token_follows_the_primary_auth_mode() {
        let fenced = profile(
            Some(CredentialBroker::DcfFence),
            vec![gs_policy(AccessUrlAuth::FenceToken, true, None)],
            false,
        );
        assert!(should_fetch_fence_access_token(&fenced, Some(AccessMethodType::Gs), ACCESS_ONLY, false));
        // Fetch disabled for the method: no token either.
        let disabled = profile(
            Some(CredentialBroker::DcfFence),
            vec![gs_policy(AccessUrlAuth::FenceToken, false, None)],
            false,
        );
        assert!(!should_fetch_fence_access_token(&disabled, Some(AccessMethodType::Gs), ACCESS_ONLY, false));
        // Forwarded-auth providers never need a broker token.
        let forwarded = profile(
            Some(CredentialBroker::Fence),
            vec![gs_policy(AccessUrlAuth::CurrentRequest, true, None)],
            false,
        );
        assert!(!should_fetch_fence_access_token(&forwarded, Some(AccessMethodType::Gs), ACCESS_ONLY, false));
    }

    #[test]
    fn fence_token_fallback_mode_consults_the_fallback_auth() {
        let passport_with_fence_fallback = profile(
            Some(CredentialBroker::DcfFence),
            vec![gs_policy(AccessUrlAuth::Passport, true, Some(AccessUrlAuth::FenceToken))],
            false,
        );
        assert!(!should_fetch_fence_access_token(
            &passport_with_fence_fallback,
            Some(AccessMethodType::Gs),
            ACCESS_ONLY,
            false
        ));
        assert!(should_fetch_fence_access_token(
            &passport_with_fence_fallback,
            Some(AccessMethodType::Gs),
            ACCESS_ONLY,
            true
        ));
    }

    #[test]
    fn force_access_url_overrides_method_policy() {
        let p = profile(
            Some(CredentialBroker::Fence),
            vec![gs_policy(AccessUrlAuth::FenceToken, false, None)],
            true,
        );
        assert!(should_fetch_access_url(&p, Some(AccessMethodType::Gs), ACCESS_ONLY));
        assert!(should_fetch_fence_access_token(&p, Some(AccessMethodType::Gs), ACCESS_ONLY, false));
        // Still nothing without the accessUrl field requested.
        assert!(!should_fetch_access_url(&p, Some(AccessMethodType::Gs), SA_ONLY));
    }

    #[test]
    fn access_url_fetch_respects_the_method_policy() {
        let off = profile(None, vec![gs_policy(AccessUrlAuth::CurrentRequest, false, None)], false);
        assert!(!should_fetch_access_url(&off, Some(AccessMethodType::Gs), ACCESS_ONLY));

        let on = profile(None, vec![gs_policy(AccessUrlAuth::CurrentRequest, true, None)], false);
        assert!(should_fetch_access_url(&on, Some(AccessMethodType::Gs), ACCESS_ONLY));
        assert!(!should_fetch_access_url(&on, None, ACCESS_ONLY));
    }

    #[test]
    fn passports_only_for_passport_authorized_methods() {
        let passport = profile(
            None,
            vec![gs_policy(AccessUrlAuth::Passport, true, None)],
            false,
        );
        assert!(should_fetch_passports(&passport, Some(AccessMethodType::Gs), ACCESS_ONLY));
        assert!(!should_fetch_passports(&passport, None, ACCESS_ONLY));
        assert!(!should_fetch_passports(&passport, Some(AccessMethodType::Gs), SA_ONLY));

        let fenced = profile(None, vec![gs_policy(AccessUrlAuth::FenceToken, true, None)], false);
        assert!(!should_fetch_passports(&fenced, Some(AccessMethodType::Gs), ACCESS_ONLY));
    }

    #[test]
    fn only_non_object_storage_methods_fail_hard_on_access_url_failure() {
        assert!(should_fail_on_access_url_fail(Some(AccessMethodType::S3)));
        assert!(should_fail_on_access_url_fail(Some(AccessMethodType::Https)));
        assert!(!should_fail_on_access_url_fail(Some(AccessMethodType::Gs)));
        assert!(!should_fail_on_access_url_fail(None));
    }

    #[test]
    fn planned_calls_grow_monotonically_with_requested_fields() {
        let p = profile(
            Some(CredentialBroker::DcfFence),
            vec![gs_policy(AccessUrlAuth::FenceToken, true, None)],
            false,
        );
        let method = Some(AccessMethodType::Gs);

        let planned = |fields: &[DrsField]| -> usize {
            [
                should_request_metadata(fields),
                should_fetch_user_service_account(&p, method, fields),
                should_fetch_fence_access_token(&p, method, fields, false),
                should_fetch_access_url(&p, method, fields),
                should_fetch_passports(&p, method, fields),
            ]
            .iter()
            .filter(|&&on| on)
            .count()
        };

        let mut fields: Vec<DrsField> = Vec::new();
        let mut previous = planned(&fields);
        assert_eq!(previous, 0);
        for field in DrsField::ALL_FIELDS {
            fields.push(*field);
            let current = planned(&fields);
            assert!(current >= previous, "adding {field} must not remove calls");
            previous = current;
        }
    }
}

//! Deployment endpoints for the resolver and its collaborators.
//!
//! Production defaults, each overridable from the environment so non-prod
//! deployments and local mocks can redirect individual backends without a
//! config file.

use std::env;

#[derive(Debug, Clone)]
pub struct DrsHubConfig {
    /// BioData Catalyst production Gen3 host (compact namespace `dg.4503`).
    pub bdc_prod_host: String,
    /// BioData Catalyst staging Gen3 host (compact namespace `dg.712c`).
    pub bdc_staging_host: String,
    /// The AnVIL Gen3 host (compact namespace `dg.anv0`).
    pub anvil_host: String,
    /// Terra Data Repo host (compact namespace `drs.anv0`).
    pub terra_data_repo_host: String,
    /// CRDC / PDC Gen3 host (compact namespace `dg.4dfc`).
    pub crdc_host: String,
    /// Kids First host (compact namespace `dg.f82a1a`).
    pub kids_first_host: String,
    /// Passport interop test bench host (compact namespace `dg.test0`).
    pub passport_test_host: String,
    /// Mock DRS host used by non-prod environments; treated as BioData
    /// Catalyst for profile matching.
    pub mock_drs_host: String,
    /// Credential broker (link API) base URL.
    pub broker_base_url: String,
    /// Passport issuer base URL.
    pub passport_issuer_base_url: String,
    /// Secret references for the passport provider's client mTLS material.
    pub passport_client_cert_secret: String,
    pub passport_client_key_secret: String,
}

impl Default for DrsHubConfig {
    fn default() -> Self {
        DrsHubConfig {
            bdc_prod_host: "gen3.biodatacatalyst.nhlbi.nih.gov".into(),
            bdc_staging_host: "staging.gen3.biodatacatalyst.nhlbi.nih.gov".into(),
            anvil_host: "gen3.theanvil.io".into(),
            terra_data_repo_host: "data.terra.bio".into(),
            crdc_host: "nci-crdc.datacommons.io".into(),
            kids_first_host: "data.kidsfirstdrc.org".into(),
            passport_test_host: "ctds-test-env.planx-pla.net".into(),
            mock_drs_host: "wb-mock-drs-dev.storage.googleapis.com".into(),
            broker_base_url: "https://broad-bond-prod.appspot.com".into(),
            passport_issuer_base_url: "https://externalcreds.dsde-prod.broadinstitute.org".into(),
            passport_client_cert_secret: "DRSHUB_PASSPORT_CLIENT_CERT".into(),
            passport_client_key_secret: "DRSHUB_PASSPORT_CLIENT_KEY".into(),
        }
    }
}

impl DrsHubConfig {
    /// Production defaults with `DRSHUB_*` environment overrides applied.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        DrsHubConfig {
            bdc_prod_host: env_or("DRSHUB_BDC_PROD_HOST", defaults.bdc_prod_host),
            bdc_staging_host: env_or("DRSHUB_BDC_STAGING_HOST", defaults.bdc_staging_host),
            anvil_host: env_or("DRSHUB_ANVIL_HOST", defaults.anvil_host),
            terra_data_repo_host: env_or("DRSHUB_TDR_HOST", defaults.terra_data_repo_host),
            crdc_host: env_or("DRSHUB_CRDC_HOST", defaults.crdc_host),
            kids_first_host: env_or("DRSHUB_KIDS_FIRST_HOST", defaults.kids_first_host),
            passport_test_host: env_or("DRSHUB_PASSPORT_TEST_HOST", defaults.passport_test_host),
            mock_drs_host: env_or("DRSHUB_MOCK_DRS_HOST", defaults.mock_drs_host),
            broker_base_url: env_or("DRSHUB_BROKER_BASE_URL", defaults.broker_base_url),
            passport_issuer_base_url: env_or(
                "DRSHUB_PASSPORT_ISSUER_BASE_URL",
                defaults.passport_issuer_base_url,
            ),
            passport_client_cert_secret: env_or(
                "DRSHUB_PASSPORT_CLIENT_CERT_SECRET",
                defaults.passport_client_cert_secret,
            ),
            passport_client_key_secret: env_or(
                "DRSHUB_PASSPORT_CLIENT_KEY_SECRET",
                defaults.passport_client_key_secret,
            ),
        }
    }
}

fn env_or(name: &str, default: String) -> String {
    env::var(name).ok().filter(|value| !value.is_empty()).unwrap_or(default)
}

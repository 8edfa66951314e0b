pub mod commands {
    pub const DEDUPE: &str = "WH101";
    pub const DISAMBIGUATE: &str = "WH102";
    pub const INSPECT: &str = "WH103";
    pub const NORMALIZE: &str = "WH201";
    pub const PIN: &str = "WH202";
    pub const FILTER: &str = "WH301";
    pub const DOWNLOAD: &str = "WH302";
    pub const INDEX: &str = "WH401";
    pub const UPLOAD: &str = "WH402";
}

/// Machine-readable `reason` values carried in outcome details.
pub mod reasons {
    pub const MISSING_DIRECTORY: &str = "missing_directory";
    pub const MISSING_BASE_WHEEL: &str = "missing_base_wheel";
    pub const MISSING_PIN_REFERENCE: &str = "missing_pin_reference";
    pub const NO_PINNED_CANDIDATE: &str = "no_pinned_candidate";
    pub const AMBIGUOUS_CANDIDATES: &str = "ambiguous_candidates";
    pub const MISSING_WHEEL: &str = "missing_wheel";
    pub const INVALID_METADATA: &str = "invalid_metadata";
    pub const RENAME_CONFLICTS: &str = "rename_conflicts";
    pub const NO_CUSTOM_WHEELS: &str = "no_custom_wheels";
    pub const MISSING_INPUT: &str = "missing_input";
    pub const MISSING_CRITICAL_PACKAGES: &str = "missing_critical_packages";
    pub const NO_WHEELS: &str = "no_wheels";
    pub const INVALID_URL: &str = "invalid_url";
    pub const MISSING_CREDENTIALS: &str = "missing_credentials";
    pub const AWS_CLI_MISSING: &str = "aws_cli_missing";
    pub const BUCKET_INACCESSIBLE: &str = "bucket_inaccessible";
    pub const INVALID_CONFIG: &str = "invalid_config";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

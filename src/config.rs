//! Configuration loading via `ortho-config`.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::ownership::{Fingerprint, FingerprintError};
use crate::session::{Credential, Credentials};

const CONFIG_FILE: &str = "flotilla.toml";
const SECTION: &str = "openstack";

/// OpenStack session settings derived from environment variables,
/// configuration files, and CLI flags.
#[derive(Clone, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "OS",
    discovery(
        app_name = "flotilla",
        env_var = "FLOTILLA_CONFIG_PATH",
        config_file_name = "flotilla.toml",
        dotfile_name = ".flotilla.toml",
        project_file_name = "flotilla.toml"
    )
)]
pub struct OpenstackConfig {
    /// Identity service URL. A path ending in `/v3` selects Keystone v3.
    pub endpoint: String,
    /// Compound `user:project` identity.
    pub identity: String,
    /// Password for the identity.
    pub credential: String,
    /// Region to pick endpoints from. Optional.
    pub region: Option<String>,
    /// Base URL of the controlling orchestrator, stamped on every server.
    pub fingerprint: Option<String>,
    /// Upper bound for a boot to reach `ACTIVE`, in seconds.
    #[ortho_config(default = 600)]
    pub boot_timeout_secs: u64,
    /// Interval between status polls while booting, in seconds.
    #[ortho_config(default = 5)]
    pub poll_interval_secs: u64,
}

impl std::fmt::Debug for OpenstackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenstackConfig")
            .field("endpoint", &self.endpoint)
            .field("identity", &self.identity)
            .field("credential", &"***")
            .field("region", &self.region)
            .field("fingerprint", &self.fingerprint)
            .field("boot_timeout_secs", &self.boot_timeout_secs)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .finish()
    }
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to [{SECTION}] in {CONFIG_FILE}",
            self.description, self.env_var, self.toml_key
        ))
    }
}

const ENDPOINT: FieldMetadata =
    FieldMetadata::new("identity endpoint", "OS_ENDPOINT", "endpoint");
const IDENTITY: FieldMetadata =
    FieldMetadata::new("user:project identity", "OS_IDENTITY", "identity");
const CREDENTIAL: FieldMetadata = FieldMetadata::new("password", "OS_CREDENTIAL", "credential");
const FINGERPRINT: FieldMetadata =
    FieldMetadata::new("orchestrator base URL", "OS_FINGERPRINT", "fingerprint");

impl OpenstackConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(metadata.missing());
        }
        Ok(())
    }

    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("flotilla")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields. Error messages name
    /// the environment variable and configuration key to set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty,
    /// or [`ConfigError::Invalid`] when the poll interval is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(&self.endpoint, &ENDPOINT)?;
        Self::require_field(&self.identity, &IDENTITY)?;
        Self::require_field(&self.credential, &CREDENTIAL)?;
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(String::from(
                "poll_interval_secs must be at least 1",
            )));
        }
        Ok(())
    }

    /// Session credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        self.validate()?;
        Ok(Credentials::new(
            self.endpoint.trim(),
            self.identity.trim(),
            Credential::new(self.credential.clone()),
            self.region.clone(),
        ))
    }

    /// Orchestrator identity for ownership tagging.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when no fingerprint is configured.
    pub fn fingerprint(&self) -> Result<Fingerprint, ConfigError> {
        Fingerprint::resolve(self.fingerprint.as_deref())
            .map_err(|FingerprintError::Unknown| FINGERPRINT.missing())
    }

    /// Boot wait bound.
    #[must_use]
    pub const fn boot_timeout(&self) -> Duration {
        Duration::from_secs(self.boot_timeout_secs)
    }

    /// Interval between status polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds an unusable value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::EnvGuard;
    use rstest::{fixture, rstest};

    #[fixture]
    fn valid_config() -> OpenstackConfig {
        OpenstackConfig {
            endpoint: String::from("https://keystone.example.com:5000/v3"),
            identity: String::from("alice:ci"),
            credential: String::from("hunter2"),
            region: Some(String::from("RegionOne")),
            fingerprint: Some(String::from("https://ci.example.com/")),
            boot_timeout_secs: 600,
            poll_interval_secs: 5,
        }
    }

    #[rstest]
    #[case::endpoint(|cfg: &mut OpenstackConfig| cfg.endpoint.clear(), "OS_ENDPOINT", "endpoint")]
    #[case::identity(|cfg: &mut OpenstackConfig| cfg.identity = String::from("  "), "OS_IDENTITY", "identity")]
    #[case::credential(|cfg: &mut OpenstackConfig| cfg.credential.clear(), "OS_CREDENTIAL", "credential")]
    fn validation_names_env_var_and_key(
        valid_config: OpenstackConfig,
        #[case] mutate: fn(&mut OpenstackConfig),
        #[case] env_var: &str,
        #[case] toml_key: &str,
    ) {
        let mut cfg = valid_config;
        mutate(&mut cfg);
        let message = cfg
            .validate()
            .err()
            .map(|err| err.to_string())
            .unwrap_or_else(|| panic!("validation should fail"));
        assert!(message.contains(env_var), "missing env var: {message}");
        assert!(message.contains(toml_key), "missing key: {message}");
        assert!(message.contains("flotilla.toml"), "missing file: {message}");
    }

    #[rstest]
    fn zero_poll_interval_is_rejected(valid_config: OpenstackConfig) {
        let cfg = OpenstackConfig {
            poll_interval_secs: 0,
            ..valid_config
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[rstest]
    fn credentials_split_identity(valid_config: OpenstackConfig) {
        let credentials = valid_config
            .credentials()
            .unwrap_or_else(|err| panic!("credentials: {err}"));
        assert_eq!(credentials.identity.principal, "alice");
        assert_eq!(credentials.identity.project, "ci");
        assert_eq!(credentials.region.as_deref(), Some("RegionOne"));
    }

    #[rstest]
    fn missing_fingerprint_is_actionable(valid_config: OpenstackConfig) {
        let cfg = OpenstackConfig {
            fingerprint: None,
            ..valid_config
        };
        let message = cfg
            .fingerprint()
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert!(message.contains("OS_FINGERPRINT"), "unexpected: {message}");
    }

    #[rstest]
    fn debug_hides_credential(valid_config: OpenstackConfig) {
        assert!(!format!("{valid_config:?}").contains("hunter2"));
    }

    #[tokio::test]
    async fn environment_fills_fields_and_defaults_apply() {
        let _guard = EnvGuard::set_vars(&[
            ("OS_ENDPOINT", "https://keystone.example.com:5000/v2.0"),
            ("OS_IDENTITY", "alice:ci"),
            ("OS_CREDENTIAL", "hunter2"),
            ("OS_FINGERPRINT", "https://ci.example.com/"),
        ])
        .await;

        let cfg = OpenstackConfig::load_without_cli_args()
            .unwrap_or_else(|err| panic!("load: {err}"));
        assert_eq!(cfg.endpoint, "https://keystone.example.com:5000/v2.0");
        assert_eq!(cfg.boot_timeout(), Duration::from_secs(600));
        assert_eq!(cfg.poll_interval(), Duration::from_secs(5));
        assert!(cfg.validate().is_ok());
    }
}

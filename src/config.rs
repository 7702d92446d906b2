use crate::error::{AppError, AppResult};
use crate::nexus::credentials::PasswordParams;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// A Keeper that Nexus replicates the root key to.
#[derive(Debug, Deserialize, Clone)]
pub struct KeeperEndpointConfig {
    /// Workload identity of the Keeper
    pub id: String,
    /// Base URL of the Keeper's custody API
    pub url: String,
}

/// Helper to get a Keeper URL with proper trailing slash handling
impl KeeperEndpointConfig {
    pub fn endpoint(&self, path: &str) -> String {
        let base = self.url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/{}", base, path)
    }
}

/// Password hashing parameters. Shared by bootstrap and login.
#[derive(Debug, Deserialize, Clone)]
pub struct PasswordConfig {
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_hash_length")]
    pub hash_length: usize,
}

fn default_iterations() -> u32 {
    PasswordParams::MIN_ITERATIONS
}

fn default_hash_length() -> usize {
    PasswordParams::MIN_HASH_LENGTH
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            hash_length: default_hash_length(),
        }
    }
}

/// Nexus process configuration
#[derive(Debug, Deserialize, Clone)]
pub struct NexusConfig {
    #[serde(default = "default_nexus_listen")]
    pub listen: String,
    /// Identity presented to Keepers
    #[serde(default = "default_nexus_identity")]
    pub identity: String,
    pub keepers: Vec<KeeperEndpointConfig>,
    #[serde(default = "default_replication_interval_secs")]
    pub replication_interval_secs: u64,
    /// Per-call timeout for Keeper push and show
    #[serde(default = "default_keeper_timeout_secs")]
    pub keeper_timeout_secs: u64,
    #[serde(default = "default_recovery_retry_secs")]
    pub recovery_retry_secs: u64,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    #[serde(default)]
    pub password: PasswordConfig,
    /// Where the admin credential record is persisted
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
}

fn default_nexus_listen() -> String {
    "0.0.0.0:8553".to_string()
}

fn default_nexus_identity() -> String {
    "spiffe://spike.ist/spike/nexus".to_string()
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("data/nexus/admin-credential.json")
}

fn default_replication_interval_secs() -> u64 {
    300
}

fn default_keeper_timeout_secs() -> u64 {
    5
}

fn default_recovery_retry_secs() -> u64 {
    30
}

fn default_session_ttl_secs() -> u64 {
    3600
}

impl NexusConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> AppResult<Self> {
        let config: Self = Config::builder()
            .add_source(File::with_name("config/nexus").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., SPIKE_NEXUS_LISTEN, SPIKE_NEXUS_PASSWORD__ITERATIONS
            .add_source(
                Environment::with_prefix("SPIKE_NEXUS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.keepers.is_empty() {
            return Err(AppError::invalid_config("at least one keeper must be configured"));
        }
        let mut ids: Vec<&str> = self.keepers.iter().map(|k| k.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != self.keepers.len() {
            return Err(AppError::invalid_config("keeper ids must be unique"));
        }
        if self.replication_interval_secs == 0 || self.recovery_retry_secs == 0 {
            return Err(AppError::invalid_config("intervals must be non-zero"));
        }
        if self.keeper_timeout_secs == 0 {
            return Err(AppError::invalid_config("keeper_timeout_secs must be non-zero"));
        }
        if self.credentials_path.as_os_str().is_empty() {
            return Err(AppError::invalid_config("credentials_path must not be empty"));
        }
        self.password_params()?;
        Ok(())
    }

    pub fn password_params(&self) -> AppResult<PasswordParams> {
        PasswordParams::new(self.password.iterations, self.password.hash_length)
    }

    pub fn replication_interval(&self) -> Duration {
        Duration::from_secs(self.replication_interval_secs)
    }

    pub fn keeper_timeout(&self) -> Duration {
        Duration::from_secs(self.keeper_timeout_secs)
    }

    pub fn recovery_retry(&self) -> Duration {
        Duration::from_secs(self.recovery_retry_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

/// Keeper process configuration
#[derive(Debug, Deserialize, Clone)]
pub struct KeeperConfig {
    #[serde(default = "default_keeper_listen")]
    pub listen: String,
    /// Nexus identities allowed to push and read the root key
    pub trusted_nexus: Vec<String>,
}

fn default_keeper_listen() -> String {
    "0.0.0.0:8443".to_string()
}

impl KeeperConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/keeper").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("SPIKE_KEEPER")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("trusted_nexus")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nexus_config(keepers: Vec<KeeperEndpointConfig>) -> NexusConfig {
        NexusConfig {
            listen: default_nexus_listen(),
            identity: default_nexus_identity(),
            keepers,
            replication_interval_secs: 300,
            keeper_timeout_secs: 5,
            recovery_retry_secs: 30,
            session_ttl_secs: 3600,
            password: PasswordConfig::default(),
            credentials_path: default_credentials_path(),
        }
    }

    fn keeper(id: &str) -> KeeperEndpointConfig {
        KeeperEndpointConfig {
            id: id.to_string(),
            url: format!("http://{}:8443/", id),
        }
    }

    #[test]
    fn test_keeper_endpoint() {
        let config = keeper("k1");
        assert_eq!(config.endpoint("/key"), "http://k1:8443/key");
        assert_eq!(config.endpoint("key"), "http://k1:8443/key");
    }

    #[test]
    fn test_validate_accepts_defaults() {
        let config = nexus_config(vec![keeper("k1"), keeper("k2"), keeper("k3")]);
        assert!(config.validate().is_ok());
        assert_eq!(config.password_params().unwrap().iterations(), 600_000);
    }

    #[test]
    fn test_validate_rejects_no_keepers() {
        assert!(nexus_config(vec![]).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_credentials_path() {
        let mut config = nexus_config(vec![keeper("k1")]);
        config.credentials_path = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credentials_path_defaults_when_unset() {
        let toml = r#"
            [[keepers]]
            id = "k1"
            url = "http://k1:8443"
        "#;
        let config: NexusConfig = Config::builder()
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.credentials_path, default_credentials_path());
    }

    #[test]
    fn test_validate_rejects_duplicate_keepers() {
        assert!(nexus_config(vec![keeper("k1"), keeper("k1")]).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_weak_password_params() {
        let mut config = nexus_config(vec![keeper("k1")]);
        config.password.iterations = 10_000;
        assert!(config.validate().is_err());

        let mut config = nexus_config(vec![keeper("k1")]);
        config.password.hash_length = 16;
        assert!(config.validate().is_err());
    }
}

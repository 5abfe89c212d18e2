use ::config::{ConfigError, Map, Source, Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use surfs_core::{Result, SurfsError};

/// Environment variables with this prefix override file settings,
/// e.g. `SURFS_BLOCK_STORE__PORT=6000`
pub const ENV_PREFIX: &str = "SURFS";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub block_store: BlockStoreConfig,
    pub metadata_store: MetadataStoreConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockStoreConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// `disk` or `memory`
    pub engine: String,
}

impl Default for BlockStoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5678,
            data_dir: PathBuf::from("./data"),
            engine: "disk".to_string(),
        }
    }
}

impl BlockStoreConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataStoreConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// `sqlite` or `memory`
    pub engine: String,
    pub presence_check_concurrency: usize,
}

impl Default for MetadataStoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5679,
            data_dir: PathBuf::from("./meta"),
            engine: "sqlite".to_string(),
            presence_check_concurrency: surfs_core::DEFAULT_PRESENCE_CHECK_CONCURRENCY,
        }
    }
}

impl MetadataStoreConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub chunk_size: usize,
    pub max_attempts: u32,
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            chunk_size: surfs_core::DEFAULT_BLOCK_SIZE,
            max_attempts: surfs_core::DEFAULT_MAX_ATTEMPTS,
            request_timeout_ms: 10_000,
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Config {
    /// Load defaults, then the optional config file, then `SURFS_*` environment overrides.
    ///
    /// File keys may be written kebab-case (`block-store`, `data-dir`).
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(SnakeCaseKeys(::config::File::with_name(path)));
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| SurfsError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| SurfsError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_store.host.trim().is_empty() || self.metadata_store.host.trim().is_empty() {
            return Err(SurfsError::Config("host cannot be empty".to_string()));
        }
        if self.block_store.port == 0 || self.metadata_store.port == 0 {
            return Err(SurfsError::Config("port cannot be 0".to_string()));
        }
        if self.client.chunk_size == 0 {
            return Err(SurfsError::Config(
                "client.chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.client.max_attempts == 0 {
            return Err(SurfsError::Config(
                "client.max_attempts must be greater than zero".to_string(),
            ));
        }
        if self.metadata_store.presence_check_concurrency == 0 {
            return Err(SurfsError::Config(
                "metadata_store.presence_check_concurrency must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Rewrites `-` to `_` in every key of the wrapped source, so kebab-case
/// file sections land on the same paths as environment overrides
#[derive(Debug, Clone)]
struct SnakeCaseKeys<S>(S);

impl<S> Source for SnakeCaseKeys<S>
where
    S: Source + Clone + Send + Sync + 'static,
{
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> std::result::Result<Map<String, Value>, ConfigError> {
        Ok(snake_case_table(self.0.collect()?))
    }
}

fn snake_case_table(table: Map<String, Value>) -> Map<String, Value> {
    table
        .into_iter()
        .map(|(key, value)| (key.replace('-', "_"), snake_case_value(value)))
        .collect()
}

fn snake_case_value(mut value: Value) -> Value {
    value.kind = match value.kind {
        ValueKind::Table(table) => ValueKind::Table(snake_case_table(table)),
        ValueKind::Array(items) => {
            ValueKind::Array(items.into_iter().map(snake_case_value).collect())
        }
        other => other,
    };
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.block_store.address(), "localhost:5678");
        assert_eq!(config.metadata_store.address(), "localhost:5679");
        assert_eq!(config.client.chunk_size, 4096);
        assert_eq!(config.client.max_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_kebab_case_file() {
        let file = write_config(
            r#"
[block-store]
host = "blocks.internal"
port = 7000

[metadata-store]
host = "meta.internal"
port = 7001
data-dir = "/var/lib/surfs/meta"
"#,
        );

        let config = Config::load(file.path().to_str()).unwrap();
        assert_eq!(config.block_store.address(), "blocks.internal:7000");
        assert_eq!(config.metadata_store.address(), "meta.internal:7001");
        assert_eq!(
            config.metadata_store.data_dir,
            PathBuf::from("/var/lib/surfs/meta")
        );
        // Unspecified keys keep their defaults
        assert_eq!(config.block_store.engine, "disk");
        assert_eq!(config.client.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_env_overrides_kebab_case_file() {
        let file = write_config(
            r#"
[metadata-store]
host = "meta.internal"
presence-check-concurrency = 32
"#,
        );

        // No other test asserts this setting, so loads running in parallel are unaffected
        let key = "SURFS_METADATA_STORE__PRESENCE_CHECK_CONCURRENCY";
        unsafe { std::env::set_var(key, "3") };
        let loaded = Config::load(file.path().to_str());
        unsafe { std::env::remove_var(key) };

        let config = loaded.unwrap();
        assert_eq!(config.metadata_store.presence_check_concurrency, 3);
        assert_eq!(config.metadata_store.host, "meta.internal");
    }

    #[test]
    fn test_load_snake_case_file() {
        let file = write_config(
            r#"
[block_store]
engine = "memory"

[client]
chunk_size = 1024
max_attempts = 2
"#,
        );

        let config = Config::load(file.path().to_str()).unwrap();
        assert_eq!(config.block_store.engine, "memory");
        assert_eq!(config.client.chunk_size, 1024);
        assert_eq!(config.client.max_attempts, 2);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let file = write_config(
            r#"
[client]
chunk_size = 0
"#,
        );
        assert!(matches!(
            Config::load(file.path().to_str()),
            Err(SurfsError::Config(_))
        ));

        assert!(matches!(
            Config::load(Some("/nonexistent/surfs-config.toml")),
            Err(SurfsError::Config(_))
        ));
    }
}

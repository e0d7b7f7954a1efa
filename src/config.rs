use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::db::{DatabaseConfig, DatabaseEndpoint, RetryPolicy};
use crate::error::{WaypointError, WaypointResult};
use crate::model::KpId;
use crate::path::PathPolicy;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub graph: GraphConfig,
    pub model: ModelConfig,
    pub policy: PolicyConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Static bearer token for `/generate-path`. Unset rejects every request.
    pub api_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphBackend {
    /// Adjacency lists held in process memory.
    Memory,
    /// SurrealDB, either embedded (`url = "memory"`) or remote.
    Surreal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub backend: GraphBackend,
    pub url: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
    pub connect_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Curriculum document loaded into the stores at start-up. The built-in
    /// demo curriculum is used when unset.
    pub curriculum_path: Option<PathBuf>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backend: GraphBackend::Memory,
            url: "memory".to_string(),
            username: "root".to_string(),
            password: "root".to_string(),
            namespace: "waypoint".to_string(),
            database: "curriculum".to_string(),
            connect_attempts: 5,
            backoff_base_ms: 2_000,
            backoff_max_ms: 60_000,
            curriculum_path: None,
        }
    }
}

impl GraphConfig {
    pub fn database_config(&self) -> DatabaseConfig {
        let endpoint = if self.url == "memory" {
            DatabaseEndpoint::Memory
        } else {
            DatabaseEndpoint::Remote {
                url: self.url.clone(),
                username: self.username.clone(),
                password: self.password.clone(),
            }
        };

        DatabaseConfig {
            endpoint,
            namespace: self.namespace.clone(),
            database: self.database.clone(),
            retry: RetryPolicy {
                max_attempts: self.connect_attempts,
                base_delay: Duration::from_millis(self.backoff_base_ms),
                max_delay: Duration::from_millis(self.backoff_max_ms),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory holding the classifier artifacts. Unset means the
    /// fallback rule is always used.
    pub artifacts_dir: Option<PathBuf>,
    pub model_file: String,
    pub scaler_file: String,
    pub metadata_file: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: Some(PathBuf::from("models")),
            model_file: "model.json".to_string(),
            scaler_file: "feature_scaler.json".to_string(),
            metadata_file: "metadata.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Goal used when neither a forced KP nor a history is given.
    pub default_kp_id: KpId,
    pub max_items_per_module: Option<usize>,
    pub max_follow_ups: Option<usize>,
    pub downstream_max_hops: usize,
    pub placeholder_items: usize,
    pub placeholder_seed: Option<u64>,
    pub lookup_timeout_ms: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let policy = PathPolicy::default();
        Self {
            default_kp_id: 1,
            max_items_per_module: policy.max_items_per_module,
            max_follow_ups: policy.max_follow_ups,
            downstream_max_hops: policy.downstream_max_hops,
            placeholder_items: policy.placeholder_items,
            placeholder_seed: policy.placeholder_seed,
            lookup_timeout_ms: policy.lookup_timeout.as_millis() as u64,
        }
    }
}

impl PolicyConfig {
    pub fn path_policy(&self) -> PathPolicy {
        PathPolicy {
            max_items_per_module: self.max_items_per_module,
            max_follow_ups: self.max_follow_ups,
            downstream_max_hops: self.downstream_max_hops,
            placeholder_items: self.placeholder_items,
            placeholder_seed: self.placeholder_seed,
            lookup_timeout: Duration::from_millis(self.lookup_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> WaypointResult<AppConfig> {
    let mut builder = Config::builder()
        .add_source(File::with_name("waypoint").required(false))
        .add_source(Environment::with_prefix("WAYPOINT").separator("__"));

    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }

    let config = builder
        .build()
        .map_err(|err| WaypointError::Config(err.to_string()))?;

    let parsed: AppConfig = config
        .try_deserialize()
        .map_err(|err| WaypointError::Config(err.to_string()))?;

    if parsed.policy.default_kp_id <= 0 {
        return Err(WaypointError::Config(format!(
            "policy.default_kp_id must be positive, got {}",
            parsed.policy.default_kp_id
        )));
    }
    if parsed.policy.downstream_max_hops == 0 {
        return Err(WaypointError::Config(
            "policy.downstream_max_hops must be at least 1".to_string(),
        ));
    }

    Ok(parsed)
}

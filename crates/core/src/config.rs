//! # Catalog Configuration
//!
//! Store connection parameters are a fixed set of literal constants, except
//! the API key which comes from the environment. A persisted JSON file under
//! the runtime directory (`.catalog/config.json`) may override any field,
//! and environment variables override both.
//!
//! Precedence: defaults < config file < environment.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs;

pub const API_KEY_ENV: &str = "CATALOG_API_KEY";
pub const DATABASE_URL_ENV: &str = "CATALOG_DATABASE_URL";
pub const AUTH_TOKEN_ENV: &str = "CATALOG_AUTH_TOKEN";
pub const COLLECTION_ENV: &str = "CATALOG_COLLECTION";
pub const RUNTIME_PATH_ENV: &str = "CATALOG_RUNTIME_PATH";

/// Which store backs the catalog
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Hosted real-time database
    #[default]
    Realtime,
    /// Local SQLite file
    Sqlite,
    /// In-process only, nothing persisted
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Realtime => "realtime",
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "realtime" => Ok(Self::Realtime),
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(format!(
                "unknown backend '{}' (expected realtime, sqlite or memory)",
                other
            )),
        }
    }
}

/// Connection parameters for the hosted database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Credential key; only ever read from the environment
    pub api_key: Option<String>,
    pub auth_domain: String,
    pub database_url: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
    pub app_id: String,
    /// Collection path holding one record per entry
    pub collection: String,
    /// Database auth token appended to every request
    pub auth_token: Option<String>,
    /// Exchange the API key for an anonymous token at startup
    pub anonymous_auth: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            auth_domain: "productmanagement-fea17.firebaseapp.com".to_string(),
            database_url: "https://productmanagement-fea17-default-rtdb.firebaseio.com".to_string(),
            project_id: "productmanagement-fea17".to_string(),
            storage_bucket: "productmanagement-fea17.appspot.com".to_string(),
            messaging_sender_id: "246834564903".to_string(),
            app_id: "1:246834564903:web:7584e31112a442de2ce302".to_string(),
            collection: "products".to_string(),
            auth_token: None,
            anonymous_auth: false,
        }
    }
}

/// Everything needed to open a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    pub backend: BackendKind,
    pub store: StoreConfig,
    /// Database file for the sqlite backend
    pub sqlite_path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            store: StoreConfig::default(),
            sqlite_path: get_runtime_path().join("catalog.db"),
        }
    }
}

impl CatalogConfig {
    /// Defaults, then the config file (if any), then the process environment
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| get_runtime_path().join("config.json"));
        config.apply(PersistedConfig::load(&path).await?);
        config.apply_env(|key| std::env::var(key).ok());

        Ok(config)
    }

    /// Overlay the fields a persisted config sets
    pub fn apply(&mut self, persisted: PersistedConfig) {
        if let Some(backend) = persisted.backend {
            self.backend = backend;
        }
        if let Some(path) = persisted.sqlite_path {
            self.sqlite_path = path;
        }
        if let Some(url) = persisted.database_url {
            self.store.database_url = url;
        }
        if let Some(collection) = persisted.collection {
            self.store.collection = collection;
        }
        if let Some(anonymous) = persisted.anonymous_auth {
            self.store.anonymous_auth = anonymous;
        }
    }

    /// Overlay environment variables, looked up through `var`
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(API_KEY_ENV) {
            self.store.api_key = Some(key);
        }
        if let Some(url) = non_empty(DATABASE_URL_ENV) {
            self.store.database_url = url;
        }
        if let Some(token) = non_empty(AUTH_TOKEN_ENV) {
            self.store.auth_token = Some(token);
        }
        if let Some(collection) = non_empty(COLLECTION_ENV) {
            self.store.collection = collection;
        }
    }
}

/// On-disk overrides; every field optional
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct PersistedConfig {
    pub backend: Option<BackendKind>,
    pub sqlite_path: Option<PathBuf>,
    pub database_url: Option<String>,
    pub collection: Option<String>,
    pub anonymous_auth: Option<bool>,
}

impl PersistedConfig {
    /// Read the file; a missing file is an empty config
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config: {:?}", path))
    }
}

/// Runtime directory (`.catalog` under the working directory)
pub fn get_runtime_path() -> PathBuf {
    if let Ok(path) = std::env::var(RUNTIME_PATH_ENV) {
        return PathBuf::from(path);
    }

    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".catalog")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_literal_constants() {
        let config = StoreConfig::default();
        assert_eq!(config.collection, "products");
        assert!(config.database_url.starts_with("https://"));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("SQLite".parse::<BackendKind>(), Ok(BackendKind::Sqlite));
        assert!("postgres".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Memory.as_str(), "memory");
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = CatalogConfig::default();
        config.apply(PersistedConfig {
            backend: Some(BackendKind::Sqlite),
            collection: Some("from_file".to_string()),
            ..Default::default()
        });

        let env: HashMap<&str, &str> = [
            (API_KEY_ENV, "secret"),
            (COLLECTION_ENV, "from_env"),
            (AUTH_TOKEN_ENV, "  "),
        ]
        .into_iter()
        .collect();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.backend, BackendKind::Sqlite);
        assert_eq!(config.store.collection, "from_env");
        assert_eq!(config.store.api_key.as_deref(), Some("secret"));
        assert!(config.store.auth_token.is_none());
    }

    #[tokio::test]
    async fn test_persisted_config_load() {
        let path = std::env::temp_dir().join(format!(
            "catalog_config_{}.json",
            std::process::id()
        ));

        tokio_test::assert_ok!(
            fs::write(&path, r#"{ "backend": "memory", "anonymous_auth": true }"#).await
        );
        let loaded = PersistedConfig::load(&path).await.unwrap();
        assert_eq!(
            loaded,
            PersistedConfig {
                backend: Some(BackendKind::Memory),
                anonymous_auth: Some(true),
                ..Default::default()
            }
        );

        let _ = fs::remove_file(&path).await;
        assert_eq!(
            PersistedConfig::load(&path).await.unwrap(),
            PersistedConfig::default()
        );
    }
}

use crate::auth::{ADMIN_SALT, SALT};
use crate::store::StoreSettings;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub log_file: Option<String>,
    pub store_url: Option<String>, // None selects the in-process store
    pub store_db: i16,
    pub store_retries: u32,
    pub store_timeout_secs: u64,
    pub auth_salt: String,
    pub admin_salt: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source, e.g. a map in tests.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let config = Self {
            port: var("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            log_file: var("LOG_FILE"),
            store_url: var("STORE_URL")
                .map(|url| {
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("STORE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })
                .transpose()?,
            store_db: var("STORE_DB")
                .unwrap_or_else(|| "1".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("STORE_DB must be a small integer"))?,
            store_retries: var("STORE_RETRIES")
                .unwrap_or_else(|| "3".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("STORE_RETRIES must be a positive integer"))
                .and_then(|retries: u32| {
                    if retries == 0 {
                        anyhow::bail!("STORE_RETRIES must be at least 1");
                    }
                    Ok(retries)
                })?,
            store_timeout_secs: var("STORE_TIMEOUT_SECS")
                .unwrap_or_else(|| "3".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("STORE_TIMEOUT_SECS must be a positive integer"))
                .and_then(|secs: u64| {
                    if secs == 0 {
                        anyhow::bail!("STORE_TIMEOUT_SECS must be at least 1");
                    }
                    Ok(secs)
                })?,
            auth_salt: var("AUTH_SALT").unwrap_or_else(|| SALT.to_string()),
            admin_salt: var("ADMIN_SALT").unwrap_or_else(|| ADMIN_SALT.to_string()),
        };

        // Log successful configuration load (without sensitive values)
        tracing::debug!("Server Port: {}", config.port);
        tracing::debug!(
            "Store: {} (db {}, {} retries, {}s timeout)",
            if config.store_url.is_some() { "postgres" } else { "memory" },
            config.store_db,
            config.store_retries,
            config.store_timeout_secs
        );

        Ok(config)
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            endpoint: self
                .store_url
                .clone()
                .unwrap_or_else(|| crate::store::MemoryBackend::ENDPOINT.to_string()),
            db: self.store_db,
            retries: self.store_retries,
            timeout: Duration::from_secs(self.store_timeout_secs),
        }
    }
}

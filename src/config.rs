use crate::payments::providers::AcquirerConfig;
use anyhow::{anyhow, Context, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub elavon: AcquirerConfig,
    pub notifier: NotifierConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    /// Where the browser is sent after a callback without `return_url`
    pub default_return_url: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Mail relay endpoint; confirmations are only logged when unset
    pub url: Option<String>,
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let server = ServerConfig {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8069".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            default_return_url: env::var("DEFAULT_RETURN_URL")
                .unwrap_or_else(|_| "/shop".to_string()),
        };

        let database = DatabaseConfig {
            url: env::var("DATABASE_URL").context("DATABASE_URL not set")?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a valid number")?,
        };

        let elavon = AcquirerConfig::from_env().context("Elavon acquirer configuration")?;

        let notifier = NotifierConfig {
            url: env::var("NOTIFY_URL").ok().filter(|s| !s.trim().is_empty()),
            timeout: Duration::from_secs(
                env::var("NOTIFY_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .context("NOTIFY_TIMEOUT_SECS must be a valid number")?,
            ),
        };

        let config = Config {
            server,
            database,
            elavon,
            notifier,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port < 1024 {
            return Err(anyhow!(
                "Port must be at least 1024, got {}",
                self.server.port
            ));
        }

        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        if !self.server.default_return_url.starts_with('/') {
            return Err(anyhow!(
                "DEFAULT_RETURN_URL must be a local path, got {}",
                self.server.default_return_url
            ));
        }

        if self.database.url.trim().is_empty() {
            return Err(anyhow!("DATABASE_URL cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(anyhow!("DATABASE_MAX_CONNECTIONS must be greater than 0"));
        }

        if let Some(url) = &self.notifier.url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(anyhow!("NOTIFY_URL must be an http(s) URL, got {}", url));
            }
        }

        self.elavon
            .validate()
            .map_err(|e| anyhow!("Invalid Elavon configuration: {}", e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::{AcquirerEnvironment, Currency};

    fn create_test_config() -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8069,
                environment: "development".to_string(),
                default_return_url: "/shop".to_string(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/elavon".to_string(),
                max_connections: 5,
            },
            elavon: AcquirerConfig {
                merchant_id: "M1".to_string(),
                account: None,
                currency: Currency::Eur,
                auto_settle: true,
                return_tss: false,
                secret_key: "s3cr3t".to_string(),
                environment: AcquirerEnvironment::Test,
            },
            notifier: NotifierConfig {
                url: None,
                timeout: Duration::from_secs(10),
            },
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(create_test_config().validate().is_ok());
    }

    #[test]
    fn test_rejects_privileged_port() {
        let mut config = create_test_config();
        config.server.port = 80;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_environment() {
        let mut config = create_test_config();
        config.server.environment = "qa".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_external_default_return_url() {
        let mut config = create_test_config();
        config.server.default_return_url = "https://evil.example".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_non_http_notify_url() {
        let mut config = create_test_config();
        config.notifier.url = Some("smtp://relay".to_string());
        assert!(config.validate().is_err());

        config.notifier.url = Some("https://relay.internal/notify".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_secret() {
        let mut config = create_test_config();
        config.elavon.secret_key.clear();
        assert!(config.validate().is_err());
    }
}

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::payments::providers::AcquirerConfig;
use sqlx::{FromRow, PgPool};
use tracing::info;

pub const ELAVON_PROVIDER: &str = "elavon";

/// Payment provider configuration entity
#[derive(Debug, Clone, FromRow)]
pub struct PaymentProviderConfig {
    pub provider: String,
    pub is_enabled: bool,
    pub settings: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl PaymentProviderConfig {
    /// Decode the stored settings as an Elavon acquirer configuration
    pub fn acquirer_config(&self) -> Result<AcquirerConfig, DatabaseError> {
        let config: AcquirerConfig = serde_json::from_value(self.settings.clone()).map_err(|e| {
            DatabaseError::new(DatabaseErrorKind::DecodeError {
                message: e.to_string(),
            })
            .with_context(format!("settings of provider '{}'", self.provider))
        })?;

        config.validate().map_err(|e| {
            DatabaseError::new(DatabaseErrorKind::ConfigError {
                message: e.to_string(),
            })
        })?;

        Ok(config)
    }
}

/// Repository for persisted acquirer settings
pub struct AcquirerConfigRepository {
    pool: PgPool,
}

impl AcquirerConfigRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a provider configuration by provider name
    pub async fn get_provider_config(
        &self,
        provider: &str,
    ) -> Result<Option<PaymentProviderConfig>, DatabaseError> {
        sqlx::query_as::<_, PaymentProviderConfig>(
            "SELECT provider, is_enabled, settings, created_at, updated_at
             FROM payment_provider_configs WHERE provider = $1",
        )
        .bind(provider)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Enabled Elavon configuration, if one is stored
    pub async fn load_elavon_config(&self) -> Result<Option<AcquirerConfig>, DatabaseError> {
        match self.get_provider_config(ELAVON_PROVIDER).await? {
            Some(row) if row.is_enabled => {
                info!("Using persisted Elavon acquirer configuration");
                row.acquirer_config().map(Some)
            }
            Some(_) => {
                info!("Persisted Elavon acquirer configuration is disabled");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Store or replace the Elavon configuration
    pub async fn save_elavon_config(&self, config: &AcquirerConfig) -> Result<(), DatabaseError> {
        let settings = serde_json::to_value(config).map_err(|e| {
            DatabaseError::new(DatabaseErrorKind::Unknown {
                message: e.to_string(),
            })
        })?;

        sqlx::query(
            "INSERT INTO payment_provider_configs (provider, is_enabled, settings, created_at, updated_at)
             VALUES ($1, true, $2, NOW(), NOW())
             ON CONFLICT (provider) DO UPDATE SET settings = EXCLUDED.settings, updated_at = NOW()",
        )
        .bind(ELAVON_PROVIDER)
        .bind(settings)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::Currency;

    fn stored(settings: serde_json::Value) -> PaymentProviderConfig {
        PaymentProviderConfig {
            provider: ELAVON_PROVIDER.to_string(),
            is_enabled: true,
            settings,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_decode_stored_settings() {
        let row = stored(serde_json::json!({
            "merchant_id": "M1",
            "account": "internet",
            "currency": "USD",
            "secret_key": "s3cr3t"
        }));
        let config = row.acquirer_config().unwrap();
        assert_eq!(config.currency, Currency::Usd);
        assert_eq!(config.account.as_deref(), Some("internet"));
    }

    #[test]
    fn test_invalid_stored_settings() {
        let missing_secret = stored(serde_json::json!({ "merchant_id": "M1" }));
        assert!(missing_secret.acquirer_config().is_err());

        let bad_currency = stored(serde_json::json!({
            "merchant_id": "M1",
            "secret_key": "s3cr3t",
            "currency": "NGN"
        }));
        assert!(bad_currency.acquirer_config().is_err());

        let empty_merchant = stored(serde_json::json!({
            "merchant_id": "",
            "secret_key": "s3cr3t"
        }));
        assert!(matches!(
            empty_merchant.acquirer_config().unwrap_err().kind,
            DatabaseErrorKind::ConfigError { .. }
        ));
    }
}

//! Payment confirmation notifiers

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::traits::Notifier;
use crate::payments::types::PaymentTransaction;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

/// Mail template used for the order confirmation
pub const CONFIRMATION_TEMPLATE: &str = "sale_order_confirmation";

#[derive(Debug, Serialize)]
struct ConfirmationRequest<'a> {
    template: &'a str,
    reference: &'a str,
    amount: String,
    currency: &'a str,
    acquirer_txn_id: Option<&'a str>,
}

/// Posts the order confirmation to a mail relay over HTTP
pub struct HttpNotifier {
    url: String,
    client: Client,
}

impl HttpNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> PaymentResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            PaymentError::config_error(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, transaction: &PaymentTransaction) -> PaymentResult<()> {
        let body = ConfirmationRequest {
            template: CONFIRMATION_TEMPLATE,
            reference: &transaction.reference,
            amount: transaction.amount.round(2).with_scale(2).to_string(),
            currency: &transaction.currency,
            acquirer_txn_id: transaction.acquirer_txn_id.as_deref(),
        };

        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PaymentError::notification_error(format!(
                "HTTP {}: {}",
                status, text
            )));
        }

        info!(
            reference = %transaction.reference,
            "Payment confirmation sent"
        );
        Ok(())
    }
}

/// Notifier that only records the confirmation in the log
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, transaction: &PaymentTransaction) -> PaymentResult<()> {
        info!(
            reference = %transaction.reference,
            template = CONFIRMATION_TEMPLATE,
            "No mail relay configured; payment confirmation not sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::TransactionState;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn transaction() -> PaymentTransaction {
        PaymentTransaction {
            id: "tx-1".to_string(),
            reference: "SO042".to_string(),
            amount: BigDecimal::from_str("12.5").unwrap(),
            currency: "EUR".to_string(),
            state: TransactionState::Done,
            acquirer_reference: None,
            acquirer_txn_id: Some("P1".to_string()),
            state_message: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_confirmation_request_body() {
        let tx = transaction();
        let body = ConfirmationRequest {
            template: CONFIRMATION_TEMPLATE,
            reference: &tx.reference,
            amount: tx.amount.round(2).with_scale(2).to_string(),
            currency: &tx.currency,
            acquirer_txn_id: tx.acquirer_txn_id.as_deref(),
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["amount"], "12.50");
        assert_eq!(json["reference"], "SO042");
        assert_eq!(json["acquirer_txn_id"], "P1");
    }

    #[tokio::test]
    async fn test_http_notifier_unreachable_relay() {
        let notifier =
            HttpNotifier::new("http://127.0.0.1:1/notify", Duration::from_secs(1)).unwrap();
        let result = notifier.notify(&transaction()).await;
        assert!(matches!(result, Err(PaymentError::NotificationError { .. })));
    }

    #[tokio::test]
    async fn test_log_notifier_succeeds() {
        assert!(LogNotifier.notify(&transaction()).await.is_ok());
    }
}

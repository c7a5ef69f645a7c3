//! Elavon hosted payment page provider
//!
//! Builds the signed field set the customer's browser posts to the acquirer and
//! checks the signature of the fields the acquirer posts back.

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::signature::{self, SignDirection};
use crate::payments::traits::Clock;
use crate::payments::types::{AcquirerEnvironment, CallbackData, Currency, Fields, PaymentOrder};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info};

const MERCHANT_ID_MAX_LEN: usize = 50;
const ACCOUNT_MAX_LEN: usize = 30;
const ORDER_ID_MAX_LEN: usize = 40;
const COMMENT1_LEN: usize = 254;
const COMMENT2_START: usize = 255;
const COMMENT2_END: usize = 510;

/// Elavon acquirer configuration
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquirerConfig {
    /// Supplied by Elavon, not the merchant number supplied by the bank
    pub merchant_id: String,
    /// Sub-account; Elavon falls back to `internet` when empty
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub currency: Currency,
    /// Capture in the next batch once authorised
    #[serde(default = "default_true")]
    pub auto_settle: bool,
    /// Ask for a transaction suitability score
    #[serde(default)]
    pub return_tss: bool,
    pub secret_key: String,
    #[serde(default)]
    pub environment: AcquirerEnvironment,
}

fn default_true() -> bool {
    true
}

impl fmt::Debug for AcquirerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquirerConfig")
            .field("merchant_id", &self.merchant_id)
            .field("account", &self.account)
            .field("currency", &self.currency)
            .field("auto_settle", &self.auto_settle)
            .field("return_tss", &self.return_tss)
            .field("secret_key", &"<redacted>")
            .field("environment", &self.environment)
            .finish()
    }
}

impl AcquirerConfig {
    /// Create config from environment variables
    pub fn from_env() -> PaymentResult<Self> {
        let merchant_id = std::env::var("ELAVON_MERCHANT_ID").map_err(|_| {
            PaymentError::config_error("ELAVON_MERCHANT_ID environment variable is required")
        })?;

        let secret_key = std::env::var("ELAVON_SECRET_KEY").map_err(|_| {
            PaymentError::config_error("ELAVON_SECRET_KEY environment variable is required")
        })?;

        let account = std::env::var("ELAVON_ACCOUNT")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let currency = match std::env::var("ELAVON_CURRENCY") {
            Ok(value) => value.parse()?,
            Err(_) => Currency::default(),
        };

        let environment = match std::env::var("ELAVON_ENVIRONMENT") {
            Ok(value) => value.parse()?,
            Err(_) => AcquirerEnvironment::default(),
        };

        let auto_settle = env_flag("ELAVON_AUTO_SETTLE", true)?;
        let return_tss = env_flag("ELAVON_RETURN_TSS", false)?;

        let config = Self {
            merchant_id,
            account,
            currency,
            auto_settle,
            return_tss,
            secret_key,
            environment,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PaymentResult<()> {
        if self.merchant_id.trim().is_empty() {
            return Err(PaymentError::config_error("Merchant ID cannot be empty"));
        }

        if self.merchant_id.chars().count() > MERCHANT_ID_MAX_LEN {
            return Err(PaymentError::config_error(format!(
                "Merchant ID must be at most {} characters",
                MERCHANT_ID_MAX_LEN
            )));
        }

        if let Some(account) = &self.account {
            if account.chars().count() > ACCOUNT_MAX_LEN {
                return Err(PaymentError::config_error(format!(
                    "Account must be at most {} characters",
                    ACCOUNT_MAX_LEN
                )));
            }
        }

        if self.secret_key.is_empty() {
            return Err(PaymentError::config_error("Secret key cannot be empty"));
        }

        Ok(())
    }
}

fn env_flag(name: &str, default: bool) -> PaymentResult<bool> {
    match std::env::var(name) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(PaymentError::config_error(format!(
                "{} must be a boolean, got {}",
                name, other
            ))),
        },
        Err(_) => Ok(default),
    }
}

/// Signed values ready to be posted to the hosted payment page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormValues {
    pub action_url: String,
    pub fields: Fields,
}

impl FormValues {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// HTML page that posts the fields to the acquirer as soon as it loads
    pub fn render_html(&self) -> String {
        let mut html = String::from(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\"/>\n\
             <title>Redirecting to payment</title>\n</head>\n\
             <body onload=\"document.forms[0].submit()\">\n",
        );
        html.push_str(&format!(
            "<form method=\"post\" action=\"{}\">\n",
            escape_html(&self.action_url)
        ));
        for (name, value) in &self.fields {
            html.push_str(&format!(
                "<input type=\"hidden\" name=\"{}\" value=\"{}\"/>\n",
                escape_html(name),
                escape_html(value)
            ));
        }
        html.push_str(
            "<noscript><button type=\"submit\">Continue to payment</button></noscript>\n\
             </form>\n</body>\n</html>\n",
        );
        html
    }
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Elavon provider
pub struct ElavonProvider {
    config: AcquirerConfig,
}

impl ElavonProvider {
    pub fn new(config: AcquirerConfig) -> Self {
        Self { config }
    }

    /// Create provider from environment variables
    pub fn from_env() -> PaymentResult<Self> {
        let config = AcquirerConfig::from_env()?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &AcquirerConfig {
        &self.config
    }

    pub fn form_action_url(&self) -> &'static str {
        self.config.environment.form_url()
    }

    /// Build the signed field set for a pending order
    pub fn build_form_values(
        &self,
        order: &PaymentOrder,
        clock: &dyn Clock,
    ) -> PaymentResult<FormValues> {
        if order.reference.trim().is_empty() {
            return Err(PaymentError::invalid_order("Order reference is required"));
        }

        if order.amount < BigDecimal::from(0) {
            return Err(PaymentError::invalid_order(format!(
                "Order amount cannot be negative, got {}",
                order.amount
            )));
        }

        // Stored amounts carry two decimals; anything finer would sign a
        // different AMOUNT than the one kept on the transaction
        if order.amount.with_scale(2) != order.amount {
            return Err(PaymentError::invalid_order(format!(
                "Order amount has more than 2 decimals, got {}",
                order.amount
            )));
        }

        let description = order.lines.join("|");
        let (comment1, comment2) = split_description(&description);
        let flag = |on: bool| if on { "1" } else { "0" };
        let text = |value: &Option<String>| value.clone().unwrap_or_default();

        let mut fields = Fields::new();
        fields.insert("MERCHANT_ID".into(), self.config.merchant_id.clone());
        fields.insert("ACCOUNT".into(), text(&self.config.account));
        fields.insert(
            "ORDER_ID".into(),
            order.reference.chars().take(ORDER_ID_MAX_LEN).collect(),
        );
        fields.insert("AMOUNT".into(), minor_units(&order.amount));
        fields.insert("CURRENCY".into(), self.config.currency.as_str().into());
        fields.insert(
            "TIMESTAMP".into(),
            clock.now().format("%Y%m%d%H%M%S").to_string(),
        );
        fields.insert("AUTO_SETTLE_FLAG".into(), flag(self.config.auto_settle).into());
        fields.insert("COMMENT1".into(), comment1);
        fields.insert("COMMENT2".into(), comment2);
        fields.insert("RETURN_TSS".into(), flag(self.config.return_tss).into());
        fields.insert("SHIPPING_CODE".into(), text(&order.shipping_zip));
        fields.insert("SHIPPING_CO".into(), text(&order.shipping_country));
        fields.insert("BILLING_CODE".into(), text(&order.billing_zip));
        fields.insert("BILLING_CO".into(), text(&order.billing_country));
        fields.insert("CUST_NUM".into(), text(&order.customer_number));
        fields.insert("VAR_REF".into(), text(&order.customer_order_ref));
        if let Some(return_url) = &order.return_url {
            fields.insert("return_url".into(), return_url.clone());
        }

        let hash = signature::sign(SignDirection::Outbound, &fields, &self.config.secret_key);
        fields.insert("SHA1HASH".into(), hash);

        info!(
            reference = %order.reference,
            amount = %order.amount,
            currency = %self.config.currency,
            "Elavon form values generated"
        );

        Ok(FormValues {
            action_url: self.form_action_url().to_string(),
            fields,
        })
    }

    /// Check the `SHA1HASH` of a callback against the inbound signature
    pub fn validate_callback_signature(&self, data: &CallbackData) -> PaymentResult<()> {
        let received = data.get("SHA1HASH").unwrap_or_default();
        let computed =
            signature::sign(SignDirection::Inbound, data.fields(), &self.config.secret_key);

        if signature::eq_ignore_case_constant_time(&computed, received) {
            return Ok(());
        }

        error!(
            received = %received,
            computed = %computed,
            payload = ?data.fields(),
            "Elavon: invalid shasign"
        );
        Err(PaymentError::SignatureMismatch {
            received: received.to_string(),
            computed,
        })
    }
}

/// Amount in minor units, truncated toward zero
pub fn minor_units(amount: &BigDecimal) -> String {
    let (digits, _) = (amount.clone() * BigDecimal::from(100))
        .with_scale(0)
        .into_bigint_and_exponent();
    digits.to_string()
}

/// Split the product description over the two comment fields.
///
/// `COMMENT1` carries characters `[0, 254)` and `COMMENT2` characters
/// `[255, 510)`. The character at 254 and anything past 510 are not sent.
pub fn split_description(description: &str) -> (String, String) {
    let comment1 = description.chars().take(COMMENT1_LEN).collect();
    let comment2 = description
        .chars()
        .skip(COMMENT2_START)
        .take(COMMENT2_END - COMMENT2_START)
        .collect();
    (comment1, comment2)
}

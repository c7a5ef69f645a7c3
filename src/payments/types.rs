//! Payment types and data structures
//!
//! Value types shared by the signature codec, the form builder and the
//! callback reconciler.

use crate::payments::error::PaymentError;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Named string fields exchanged with the acquirer.
pub type Fields = BTreeMap<String, String>;

/// Currencies accepted by the Elavon hosted payment page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Eur,
    Gbp,
    Usd,
    Sek,
    Chf,
    Hkd,
    Jpy,
}

impl Currency {
    pub const ALL: [Currency; 7] = [
        Currency::Eur,
        Currency::Gbp,
        Currency::Usd,
        Currency::Sek,
        Currency::Chf,
        Currency::Hkd,
        Currency::Jpy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Usd => "USD",
            Currency::Sek => "SEK",
            Currency::Chf => "CHF",
            Currency::Hkd => "HKD",
            Currency::Jpy => "JPY",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        Currency::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == code)
            .ok_or_else(|| {
                PaymentError::config_error(format!("Unsupported currency '{}'", s))
            })
    }
}

/// Acquirer environment, selects the hosted payment page host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquirerEnvironment {
    Prod,
    #[default]
    Test,
}

impl AcquirerEnvironment {
    pub fn form_url(&self) -> &'static str {
        match self {
            AcquirerEnvironment::Prod => "https://hpp.santanderelavontpvvirtual.es/pay",
            AcquirerEnvironment::Test => "https://hpp.prueba.santanderelavontpvvirtual.es/pay",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AcquirerEnvironment::Prod => "prod",
            AcquirerEnvironment::Test => "test",
        }
    }
}

impl FromStr for AcquirerEnvironment {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Ok(AcquirerEnvironment::Prod),
            "test" => Ok(AcquirerEnvironment::Test),
            other => Err(PaymentError::config_error(format!(
                "Acquirer environment must be 'prod' or 'test', got {}",
                other
            ))),
        }
    }
}

/// Transaction state. `Done` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionState {
    Pending,
    Done,
    Error,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Pending => "pending",
            TransactionState::Done => "done",
            TransactionState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionState::Pending)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionState {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionState::Pending),
            "done" => Ok(TransactionState::Done),
            "error" => Ok(TransactionState::Error),
            other => Err(PaymentError::store_error(format!(
                "Unknown transaction state '{}'",
                other
            ))),
        }
    }
}

/// Payment transaction as seen by the reconciler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: String,
    /// Merchant reference, sent to the acquirer as `ORDER_ID`
    pub reference: String,
    /// Expected amount in major units
    pub amount: BigDecimal,
    pub currency: String,
    pub state: TransactionState,
    /// Reference the acquirer knows this transaction by, when already assigned
    pub acquirer_reference: Option<String>,
    /// `PASREF` returned on callback
    pub acquirer_txn_id: Option<String>,
    pub state_message: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Terminal write applied by the reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionUpdate {
    pub state: TransactionState,
    pub acquirer_txn_id: Option<String>,
    pub state_message: Option<String>,
}

/// Pending order submitted for payment on the hosted page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentOrder {
    pub reference: String,
    /// Order total in major units
    pub amount: BigDecimal,
    #[serde(default)]
    pub shipping_zip: Option<String>,
    #[serde(default)]
    pub shipping_country: Option<String>,
    #[serde(default)]
    pub billing_zip: Option<String>,
    #[serde(default)]
    pub billing_country: Option<String>,
    /// Commercial partner reference (`CUST_NUM`)
    #[serde(default)]
    pub customer_number: Option<String>,
    /// Customer's own order reference (`VAR_REF`)
    #[serde(default)]
    pub customer_order_ref: Option<String>,
    /// Order line names, joined into the product description
    #[serde(default)]
    pub lines: Vec<String>,
    #[serde(default)]
    pub return_url: Option<String>,
}

/// Raw fields posted back by the acquirer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackData(Fields);

impl CallbackData {
    pub fn new(fields: Fields) -> Self {
        Self(fields)
    }

    /// Non-empty value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn fields(&self) -> &Fields {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }
}

impl From<HashMap<String, String>> for CallbackData {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map.into_iter().collect())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CallbackData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Callback value that disagrees with the stored transaction.
///
/// Informational only: it never blocks the state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMismatch {
    pub field: String,
    pub received: String,
    pub expected: String,
}

impl FieldMismatch {
    pub fn new(
        field: impl Into<String>,
        received: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            received: received.into(),
            expected: expected.into(),
        }
    }
}

impl fmt::Display for FieldMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: received '{}', expected '{}'",
            self.field, self.received, self.expected
        )
    }
}

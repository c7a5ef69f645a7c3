use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Elavon: received data with missing reference")]
    MissingReference,

    #[error("Elavon: received data for reference {reference}; no order found")]
    NotFound { reference: String },

    #[error("Elavon: received data for reference {reference}; multiple order found ({count})")]
    AmbiguousReference { reference: String, count: usize },

    #[error("Elavon: invalid shasign, received {received}, computed {computed}")]
    SignatureMismatch { received: String, computed: String },

    #[error("Invalid order: {message}")]
    InvalidOrder { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Transaction store error: {message}")]
    StoreError { message: String, is_retryable: bool },

    #[error("Notification failed: {message}")]
    NotificationError { message: String },
}

impl PaymentError {
    pub fn not_found(reference: impl Into<String>) -> Self {
        Self::NotFound {
            reference: reference.into(),
        }
    }

    pub fn ambiguous_reference(reference: impl Into<String>, count: usize) -> Self {
        Self::AmbiguousReference {
            reference: reference.into(),
            count,
        }
    }

    pub fn invalid_order(message: impl Into<String>) -> Self {
        Self::InvalidOrder {
            message: message.into(),
        }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn store_error(message: impl Into<String>) -> Self {
        Self::StoreError {
            message: message.into(),
            is_retryable: false,
        }
    }

    pub fn notification_error(message: impl Into<String>) -> Self {
        Self::NotificationError {
            message: message.into(),
        }
    }

    /// Errors that reject an acquirer callback outright. The transaction is
    /// never touched when one of these is returned.
    pub fn is_callback_rejection(&self) -> bool {
        matches!(
            self,
            Self::MissingReference
                | Self::NotFound { .. }
                | Self::AmbiguousReference { .. }
                | Self::SignatureMismatch { .. }
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreError {
                is_retryable: true,
                ..
            }
        )
    }
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        PaymentError::notification_error(format!("Request error: {}", err))
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        PaymentError::config_error(format!("JSON error: {}", err))
    }
}

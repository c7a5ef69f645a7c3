//! Payment acquirer integration module
//!
//! Signs the hosted payment page form sent to Elavon and reconciles the
//! callbacks Elavon posts back against stored transactions.

pub mod error;
pub mod memory;
pub mod notification;
pub mod providers;
pub mod reconciler;
pub mod signature;
pub mod traits;
pub mod types;

pub use error::{PaymentError, PaymentResult};
pub use reconciler::{CallbackOutcome, CallbackReconciler, Reconciliation};

//! Capabilities injected into the payment flow
//!
//! The reconciler and the form builder never reach for persistence, mail or the
//! system clock directly; they are handed these traits instead.

use crate::payments::error::PaymentResult;
use crate::payments::types::{PaymentTransaction, TransactionUpdate};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};

/// Storage of payment transactions
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// All transactions whose reference matches exactly
    ///
    /// More than one match is a data-integrity violation; callers decide how to
    /// report it, so every match is returned.
    async fn find_by_reference(&self, reference: &str) -> PaymentResult<Vec<PaymentTransaction>>;

    /// Apply a terminal update to a pending transaction
    ///
    /// The write only happens if the transaction is still `pending`.
    ///
    /// # Returns
    /// * `Some(transaction)` - the updated transaction
    /// * `None` - the transaction had already left `pending`
    async fn finalize(
        &self,
        id: &str,
        update: &TransactionUpdate,
    ) -> PaymentResult<Option<PaymentTransaction>>;

    /// Pending transaction for `reference`, created if none is open
    ///
    /// Concurrent calls for one reference resolve to the same transaction.
    async fn create_pending(
        &self,
        reference: &str,
        amount: &BigDecimal,
        currency: &str,
    ) -> PaymentResult<PaymentTransaction>;
}

/// Sends the customer confirmation once a payment is done
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, transaction: &PaymentTransaction) -> PaymentResult<()>;
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a given instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

//! In-process transaction store
//!
//! Backs local runs without Postgres and the test suites.

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::traits::TransactionStore;
use crate::payments::types::{PaymentTransaction, TransactionState, TransactionUpdate};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
pub struct InMemoryTransactionStore {
    transactions: Mutex<Vec<PaymentTransaction>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a transaction as-is, duplicates included
    pub fn insert(&self, transaction: PaymentTransaction) -> PaymentResult<()> {
        self.lock()?.push(transaction);
        Ok(())
    }

    pub fn get(&self, id: &str) -> PaymentResult<Option<PaymentTransaction>> {
        Ok(self.lock()?.iter().find(|tx| tx.id == id).cloned())
    }

    fn lock(&self) -> PaymentResult<MutexGuard<'_, Vec<PaymentTransaction>>> {
        self.transactions
            .lock()
            .map_err(|_| PaymentError::store_error("In-memory store lock poisoned"))
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn find_by_reference(&self, reference: &str) -> PaymentResult<Vec<PaymentTransaction>> {
        Ok(self
            .lock()?
            .iter()
            .filter(|tx| tx.reference == reference)
            .cloned()
            .collect())
    }

    async fn finalize(
        &self,
        id: &str,
        update: &TransactionUpdate,
    ) -> PaymentResult<Option<PaymentTransaction>> {
        let mut transactions = self.lock()?;
        let Some(tx) = transactions.iter_mut().find(|tx| tx.id == id) else {
            return Err(PaymentError::store_error(format!(
                "Transaction with ID '{}' not found",
                id
            )));
        };

        if tx.state != TransactionState::Pending {
            return Ok(None);
        }

        tx.state = update.state;
        tx.acquirer_txn_id = update.acquirer_txn_id.clone();
        tx.state_message = update.state_message.clone();
        tx.updated_at = Utc::now();
        Ok(Some(tx.clone()))
    }

    async fn create_pending(
        &self,
        reference: &str,
        amount: &BigDecimal,
        currency: &str,
    ) -> PaymentResult<PaymentTransaction> {
        let mut transactions = self.lock()?;
        if let Some(open) = transactions
            .iter()
            .find(|tx| tx.reference == reference && tx.state == TransactionState::Pending)
        {
            return Ok(open.clone());
        }

        let now = Utc::now();
        let transaction = PaymentTransaction {
            id: format!("tx-{}", transactions.len() + 1),
            reference: reference.to_string(),
            amount: amount.clone(),
            currency: currency.to_string(),
            state: TransactionState::Pending,
            acquirer_reference: Some(reference.to_string()),
            acquirer_txn_id: None,
            state_message: None,
            created_at: now,
            updated_at: now,
        };
        transactions.push(transaction.clone());
        Ok(transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[tokio::test]
    async fn test_update_only_leaves_pending_once() {
        let store = InMemoryTransactionStore::new();
        let tx = store
            .create_pending("SO001", &BigDecimal::from_str("10.00").unwrap(), "EUR")
            .await
            .unwrap();

        let update = TransactionUpdate {
            state: TransactionState::Done,
            acquirer_txn_id: Some("P1".to_string()),
            state_message: None,
        };

        let first = store.finalize(&tx.id, &update).await.unwrap();
        assert_eq!(first.map(|t| t.state), Some(TransactionState::Done));

        let second = store.finalize(&tx.id, &update).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_find_by_reference_returns_all_matches() {
        let store = InMemoryTransactionStore::new();
        let amount = BigDecimal::from_str("1.00").unwrap();
        let first = store.create_pending("DUP", &amount, "EUR").await.unwrap();
        let mut second = first.clone();
        second.id = "tx-dup".to_string();
        store.insert(second).unwrap();
        store.create_pending("OTHER", &amount, "EUR").await.unwrap();

        assert_eq!(store.find_by_reference("DUP").await.unwrap().len(), 2);
        assert!(store.find_by_reference("dup").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_pending_reuses_open_transaction() {
        let store = InMemoryTransactionStore::new();
        let amount = BigDecimal::from_str("10.00").unwrap();

        let first = store.create_pending("SO002", &amount, "EUR").await.unwrap();
        let again = store.create_pending("SO002", &amount, "EUR").await.unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(first.acquirer_reference.as_deref(), Some("SO002"));
        assert_eq!(store.find_by_reference("SO002").await.unwrap().len(), 1);

        let done = TransactionUpdate {
            state: TransactionState::Error,
            acquirer_txn_id: None,
            state_message: None,
        };
        store.finalize(&first.id, &done).await.unwrap();

        let retry = store.create_pending("SO002", &amount, "EUR").await.unwrap();
        assert_ne!(retry.id, first.id);
        assert_eq!(retry.state, TransactionState::Pending);
    }
}

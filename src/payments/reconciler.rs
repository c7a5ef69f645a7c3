//! Callback reconciliation
//!
//! Matches an acquirer callback to its transaction, authenticates it and moves
//! the transaction from `pending` to `done` or `error`. Each transaction is
//! moved at most once; later deliveries are reported as duplicates.

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::providers::ElavonProvider;
use crate::payments::traits::{Notifier, TransactionStore};
use crate::payments::types::{
    CallbackData, FieldMismatch, PaymentTransaction, TransactionState, TransactionUpdate,
};
use bigdecimal::BigDecimal;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result code assumed when the callback carries none
const DEFAULT_RESULT_CODE: &str = "29999";

/// What the callback did to the transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CallbackOutcome {
    /// `RESULT` was 0, the transaction is now `done`
    Approved,
    /// Any other result code, the transaction is now `error`
    Declined {
        code: String,
        message: Option<String>,
    },
    /// The transaction had already reached a terminal state; nothing was written
    Duplicate { state: TransactionState },
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub transaction: PaymentTransaction,
    pub outcome: CallbackOutcome,
    pub mismatches: Vec<FieldMismatch>,
}

pub struct CallbackReconciler {
    provider: Arc<ElavonProvider>,
    store: Arc<dyn TransactionStore>,
    notifier: Arc<dyn Notifier>,
}

impl CallbackReconciler {
    pub fn new(
        provider: Arc<ElavonProvider>,
        store: Arc<dyn TransactionStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            provider,
            store,
            notifier,
        }
    }

    pub async fn reconcile(&self, data: &CallbackData) -> PaymentResult<Reconciliation> {
        let transaction = self.find_transaction(data).await?;
        self.provider.validate_callback_signature(data)?;

        let mismatches = field_mismatches(&transaction, data);
        for mismatch in &mismatches {
            warn!(
                reference = %transaction.reference,
                field = %mismatch.field,
                received = %mismatch.received,
                expected = %mismatch.expected,
                "Elavon: callback value does not match transaction"
            );
        }

        if transaction.state.is_terminal() {
            info!(
                reference = %transaction.reference,
                state = %transaction.state,
                "Elavon: duplicate callback for finished transaction"
            );
            let state = transaction.state;
            return Ok(Reconciliation {
                transaction,
                outcome: CallbackOutcome::Duplicate { state },
                mismatches,
            });
        }

        self.apply_result(transaction, data, mismatches).await
    }

    /// Find the single transaction a callback refers to
    async fn find_transaction(&self, data: &CallbackData) -> PaymentResult<PaymentTransaction> {
        let Some(reference) = data.get("ORDER_ID") else {
            error!(payload = ?data.fields(), "Elavon: received data with missing reference");
            return Err(PaymentError::MissingReference);
        };

        let mut matches = self.store.find_by_reference(reference).await?;
        match matches.len() {
            1 => Ok(matches.remove(0)),
            0 => {
                error!(
                    reference = %reference,
                    payload = ?data.fields(),
                    "Elavon: received data for reference; no order found"
                );
                Err(PaymentError::not_found(reference))
            }
            count => {
                error!(
                    reference = %reference,
                    count,
                    payload = ?data.fields(),
                    "Elavon: received data for reference; multiple order found"
                );
                Err(PaymentError::ambiguous_reference(reference, count))
            }
        }
    }

    async fn apply_result(
        &self,
        transaction: PaymentTransaction,
        data: &CallbackData,
        mismatches: Vec<FieldMismatch>,
    ) -> PaymentResult<Reconciliation> {
        let code = data.get("RESULT").unwrap_or(DEFAULT_RESULT_CODE);
        let message = data.get("MESSAGE").map(str::to_string);
        let approved = code.trim().parse::<i64>().map(|c| c == 0).unwrap_or(false);

        let update = if approved {
            TransactionUpdate {
                state: TransactionState::Done,
                acquirer_txn_id: data.get("PASREF").map(str::to_string),
                state_message: Some(format!("Ok: {}", message.as_deref().unwrap_or_default())),
            }
        } else {
            TransactionUpdate {
                state: TransactionState::Error,
                acquirer_txn_id: data.get("PASREF").map(str::to_string),
                state_message: message.clone(),
            }
        };

        let Some(updated) = self.store.finalize(&transaction.id, &update).await? else {
            // Lost the race to a concurrent delivery of the same callback
            info!(
                reference = %transaction.reference,
                "Elavon: transaction finished by a concurrent callback"
            );
            let state = self
                .store
                .find_by_reference(&transaction.reference)
                .await?
                .into_iter()
                .find(|tx| tx.id == transaction.id)
                .map(|tx| tx.state)
                .unwrap_or(update.state);
            return Ok(Reconciliation {
                transaction,
                outcome: CallbackOutcome::Duplicate { state },
                mismatches,
            });
        };

        let outcome = if approved {
            info!(
                reference = %updated.reference,
                pasref = ?updated.acquirer_txn_id,
                "Elavon: payment approved"
            );
            if let Err(e) = self.notifier.notify(&updated).await {
                error!(
                    reference = %updated.reference,
                    "Elavon: payment confirmation could not be sent: {}",
                    e
                );
            }
            CallbackOutcome::Approved
        } else {
            info!(
                reference = %updated.reference,
                code = %code,
                message = ?message,
                "Elavon: payment declined"
            );
            CallbackOutcome::Declined {
                code: code.to_string(),
                message,
            }
        };

        Ok(Reconciliation {
            transaction: updated,
            outcome,
            mismatches,
        })
    }
}

/// Compare the callback's reference and amount with the stored transaction
pub fn field_mismatches(transaction: &PaymentTransaction, data: &CallbackData) -> Vec<FieldMismatch> {
    let mut mismatches = Vec::new();

    if let Some(acquirer_reference) = &transaction.acquirer_reference {
        let received = data.get("ORDER_ID").unwrap_or_default();
        if received != acquirer_reference {
            mismatches.push(FieldMismatch::new(
                "Transaction Id",
                received,
                acquirer_reference.as_str(),
            ));
        }
    }

    let expected = transaction.amount.round(2).with_scale(2);
    let received_raw = data.get("AMOUNT").unwrap_or_default();
    let received = BigDecimal::from_str(if received_raw.is_empty() { "0" } else { received_raw })
        .ok()
        .map(|minor| (minor / BigDecimal::from(100)).round(2));

    if received.as_ref() != Some(&expected) {
        mismatches.push(FieldMismatch::new(
            "Amount",
            received_raw,
            expected.to_string(),
        ));
    }

    mismatches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::memory::InMemoryTransactionStore;
    use crate::payments::providers::elavon::AcquirerConfig;
    use crate::payments::signature::{sign, SignDirection};
    use crate::payments::types::{AcquirerEnvironment, Currency};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SECRET: &str = "s3cr3t";

    #[derive(Default)]
    struct CountingNotifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn notify(&self, _transaction: &PaymentTransaction) -> PaymentResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _transaction: &PaymentTransaction) -> PaymentResult<()> {
            Err(PaymentError::notification_error("relay unavailable"))
        }
    }

    fn provider() -> Arc<ElavonProvider> {
        Arc::new(ElavonProvider::new(AcquirerConfig {
            merchant_id: "M1".to_string(),
            account: None,
            currency: Currency::Eur,
            auto_settle: true,
            return_tss: false,
            secret_key: SECRET.to_string(),
            environment: AcquirerEnvironment::Test,
        }))
    }

    fn transaction(id: &str, reference: &str, amount: &str) -> PaymentTransaction {
        PaymentTransaction {
            id: id.to_string(),
            reference: reference.to_string(),
            amount: BigDecimal::from_str(amount).unwrap(),
            currency: "EUR".to_string(),
            state: TransactionState::Pending,
            acquirer_reference: None,
            acquirer_txn_id: None,
            state_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn signed_callback(pairs: &[(&str, &str)]) -> CallbackData {
        let data: CallbackData = pairs.iter().copied().collect();
        let mut fields = data.fields().clone();
        fields.insert(
            "SHA1HASH".to_string(),
            sign(SignDirection::Inbound, &fields, SECRET),
        );
        CallbackData::new(fields)
    }

    fn callback(result: &str) -> CallbackData {
        signed_callback(&[
            ("TIMESTAMP", "20161008120000"),
            ("MERCHANT_ID", "M1"),
            ("ORDER_ID", "R1"),
            ("AMOUNT", "10000"),
            ("CURRENCY", "EUR"),
            ("RESULT", result),
            ("MESSAGE", "[ test system ] Authorised"),
            ("PASREF", "14610544313177922"),
            ("AUTHCODE", "12345"),
        ])
    }

    fn setup() -> (
        CallbackReconciler,
        Arc<InMemoryTransactionStore>,
        Arc<CountingNotifier>,
    ) {
        let store = Arc::new(InMemoryTransactionStore::new());
        store.insert(transaction("tx-1", "R1", "100.00")).unwrap();
        let notifier = Arc::new(CountingNotifier::default());
        let reconciler = CallbackReconciler::new(provider(), store.clone(), notifier.clone());
        (reconciler, store, notifier)
    }

    #[tokio::test]
    async fn test_approved_callback_marks_done_and_notifies_once() {
        let (reconciler, store, notifier) = setup();

        let result = reconciler.reconcile(&callback("0")).await.unwrap();

        assert_eq!(result.outcome, CallbackOutcome::Approved);
        assert!(result.mismatches.is_empty());
        assert_eq!(result.transaction.state, TransactionState::Done);
        assert_eq!(
            result.transaction.acquirer_txn_id.as_deref(),
            Some("14610544313177922")
        );
        assert_eq!(
            result.transaction.state_message.as_deref(),
            Some("Ok: [ test system ] Authorised")
        );
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.get("tx-1").unwrap().unwrap().state,
            TransactionState::Done
        );
    }

    #[tokio::test]
    async fn test_declined_callback_marks_error_without_notification() {
        let (reconciler, store, notifier) = setup();

        let result = reconciler.reconcile(&callback("2")).await.unwrap();

        assert_eq!(
            result.outcome,
            CallbackOutcome::Declined {
                code: "2".to_string(),
                message: Some("[ test system ] Authorised".to_string()),
            }
        );
        assert_eq!(result.transaction.state, TransactionState::Error);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            store.get("tx-1").unwrap().unwrap().state,
            TransactionState::Error
        );
    }

    #[tokio::test]
    async fn test_missing_result_defaults_to_failure_code() {
        let (reconciler, _store, notifier) = setup();
        let data = signed_callback(&[
            ("TIMESTAMP", "20161008120000"),
            ("MERCHANT_ID", "M1"),
            ("ORDER_ID", "R1"),
            ("AMOUNT", "10000"),
            ("CURRENCY", "EUR"),
        ]);

        let result = reconciler.reconcile(&data).await.unwrap();

        assert!(matches!(
            result.outcome,
            CallbackOutcome::Declined { ref code, .. } if code == "29999"
        ));
        assert_eq!(result.transaction.state, TransactionState::Error);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_padded_result_is_approved() {
        let (reconciler, _store, _notifier) = setup();
        let result = reconciler.reconcile(&callback("00")).await.unwrap();
        assert_eq!(result.outcome, CallbackOutcome::Approved);
    }

    #[tokio::test]
    async fn test_unknown_reference_is_not_found() {
        let (reconciler, store, notifier) = setup();
        let data = signed_callback(&[
            ("TIMESTAMP", "20161008120000"),
            ("MERCHANT_ID", "M1"),
            ("ORDER_ID", "NOPE"),
            ("AMOUNT", "10000"),
            ("CURRENCY", "EUR"),
            ("RESULT", "0"),
        ]);

        let err = reconciler.reconcile(&data).await.unwrap_err();

        assert!(matches!(err, PaymentError::NotFound { ref reference } if reference == "NOPE"));
        assert_eq!(
            store.get("tx-1").unwrap().unwrap().state,
            TransactionState::Pending
        );
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_duplicate_reference_is_ambiguous() {
        let (reconciler, store, _notifier) = setup();
        store.insert(transaction("tx-2", "R1", "100.00")).unwrap();

        let err = reconciler.reconcile(&callback("0")).await.unwrap_err();

        assert!(matches!(
            err,
            PaymentError::AmbiguousReference { count: 2, .. }
        ));
        assert_eq!(
            store.get("tx-1").unwrap().unwrap().state,
            TransactionState::Pending
        );
    }

    #[tokio::test]
    async fn test_missing_reference_rejected() {
        let (reconciler, _store, _notifier) = setup();
        let data: CallbackData = [("RESULT", "0"), ("ORDER_ID", "")].into_iter().collect();

        let err = reconciler.reconcile(&data).await.unwrap_err();
        assert!(matches!(err, PaymentError::MissingReference));
    }

    #[tokio::test]
    async fn test_tampered_amount_rejected_without_state_change() {
        let (reconciler, store, notifier) = setup();
        let mut fields = callback("0").fields().clone();
        fields.insert("AMOUNT".to_string(), "10001".to_string());

        let err = reconciler
            .reconcile(&CallbackData::new(fields))
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::SignatureMismatch { .. }));
        assert_eq!(
            store.get("tx-1").unwrap().unwrap().state,
            TransactionState::Pending
        );
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_uppercase_signature_accepted() {
        let (reconciler, _store, _notifier) = setup();
        let mut fields = callback("0").fields().clone();
        let upper = fields["SHA1HASH"].to_ascii_uppercase();
        fields.insert("SHA1HASH".to_string(), upper);

        let result = reconciler.reconcile(&CallbackData::new(fields)).await.unwrap();
        assert_eq!(result.outcome, CallbackOutcome::Approved);
    }

    #[tokio::test]
    async fn test_second_delivery_is_duplicate() {
        let (reconciler, _store, notifier) = setup();

        reconciler.reconcile(&callback("0")).await.unwrap();
        let again = reconciler.reconcile(&callback("2")).await.unwrap();

        assert_eq!(
            again.outcome,
            CallbackOutcome::Duplicate {
                state: TransactionState::Done
            }
        );
        assert_eq!(again.transaction.state, TransactionState::Done);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_amount_mismatch_is_reported_but_not_blocking() {
        let store = Arc::new(InMemoryTransactionStore::new());
        store.insert(transaction("tx-1", "R1", "99.99")).unwrap();
        let notifier = Arc::new(CountingNotifier::default());
        let reconciler = CallbackReconciler::new(provider(), store.clone(), notifier.clone());

        let result = reconciler.reconcile(&callback("0")).await.unwrap();

        assert_eq!(result.outcome, CallbackOutcome::Approved);
        assert_eq!(
            result.mismatches,
            vec![FieldMismatch::new("Amount", "10000", "99.99")]
        );
    }

    #[tokio::test]
    async fn test_notification_failure_keeps_transaction_done() {
        let store = Arc::new(InMemoryTransactionStore::new());
        store.insert(transaction("tx-1", "R1", "100.00")).unwrap();
        let reconciler =
            CallbackReconciler::new(provider(), store.clone(), Arc::new(FailingNotifier));

        let result = reconciler.reconcile(&callback("0")).await.unwrap();

        assert_eq!(result.outcome, CallbackOutcome::Approved);
        assert_eq!(
            store.get("tx-1").unwrap().unwrap().state,
            TransactionState::Done
        );
    }

    #[test]
    fn test_field_mismatches() {
        let mut tx = transaction("tx-1", "R1", "100");
        let data: CallbackData = [("ORDER_ID", "R1"), ("AMOUNT", "10000")].into_iter().collect();
        assert!(field_mismatches(&tx, &data).is_empty());

        tx.acquirer_reference = Some("R0".to_string());
        assert_eq!(
            field_mismatches(&tx, &data),
            vec![FieldMismatch::new("Transaction Id", "R1", "R0")]
        );

        let tx = transaction("tx-1", "R1", "100.00");
        let missing: CallbackData = [("ORDER_ID", "R1")].into_iter().collect();
        assert_eq!(
            field_mismatches(&tx, &missing),
            vec![FieldMismatch::new("Amount", "", "100.00")]
        );

        let garbage: CallbackData = [("ORDER_ID", "R1"), ("AMOUNT", "ten")].into_iter().collect();
        assert_eq!(
            field_mismatches(&tx, &garbage),
            vec![FieldMismatch::new("Amount", "ten", "100.00")]
        );
    }
}

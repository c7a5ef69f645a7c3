use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::payments::error::PaymentResult;
use crate::payments::traits::TransactionStore;
use crate::payments::types::{PaymentTransaction, TransactionState, TransactionUpdate};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

const TRANSACTION_COLUMNS: &str = "id, reference, amount, currency, state, acquirer_reference, \
     acquirer_txn_id, state_message, created_at, updated_at";

/// Payment transaction row
#[derive(Debug, Clone, FromRow)]
pub struct TransactionRow {
    pub id: String,
    pub reference: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub state: String,
    pub acquirer_reference: Option<String>,
    pub acquirer_txn_id: Option<String>,
    pub state_message: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<TransactionRow> for PaymentTransaction {
    type Error = DatabaseError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let state = row.state.parse::<TransactionState>().map_err(|e| {
            DatabaseError::new(DatabaseErrorKind::DecodeError {
                message: e.to_string(),
            })
            .with_context(format!("transaction {}", row.id))
        })?;

        Ok(PaymentTransaction {
            id: row.id,
            reference: row.reference,
            amount: row.amount,
            currency: row.currency,
            state,
            acquirer_reference: row.acquirer_reference,
            acquirer_txn_id: row.acquirer_txn_id,
            state_message: row.state_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Postgres-backed payment transaction repository
pub struct PaymentTransactionRepository {
    pool: PgPool,
}

impl PaymentTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find every transaction carrying `reference`
    pub async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Vec<PaymentTransaction>, DatabaseError> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM payment_transactions WHERE reference = $1 ORDER BY created_at ASC",
            TRANSACTION_COLUMNS
        ))
        .bind(reference)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        rows.into_iter().map(PaymentTransaction::try_from).collect()
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<PaymentTransaction>, DatabaseError> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM payment_transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.map(PaymentTransaction::try_from).transpose()
    }

    /// Move a pending transaction to a terminal state.
    ///
    /// The `state = 'pending'` guard makes the write happen at most once per
    /// transaction; `None` means another callback got there first.
    pub async fn finalize(
        &self,
        id: &str,
        update: &TransactionUpdate,
    ) -> Result<Option<PaymentTransaction>, DatabaseError> {
        debug!(transaction_id = %id, state = %update.state, "Finalizing transaction");

        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "UPDATE payment_transactions
             SET state = $1, acquirer_txn_id = $2, state_message = $3, updated_at = NOW()
             WHERE id = $4 AND state = 'pending'
             RETURNING {}",
            TRANSACTION_COLUMNS
        ))
        .bind(update.state.as_str())
        .bind(&update.acquirer_txn_id)
        .bind(&update.state_message)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.map(PaymentTransaction::try_from).transpose()
    }

    /// Open a pending transaction for `reference`, or return the one already open.
    ///
    /// The partial unique index on pending references turns a concurrent
    /// insert into a no-op; the winner's row is then read back.
    pub async fn create_transaction(
        &self,
        reference: &str,
        amount: &BigDecimal,
        currency: &str,
    ) -> Result<PaymentTransaction, DatabaseError> {
        let transaction_id = Uuid::new_v4().to_string();

        let inserted = sqlx::query_as::<_, TransactionRow>(&format!(
            "INSERT INTO payment_transactions
             (id, reference, amount, currency, state, acquirer_reference, created_at, updated_at)
             VALUES ($1, $2, $3, $4, 'pending', $2, NOW(), NOW())
             ON CONFLICT (reference) WHERE state = 'pending' DO NOTHING
             RETURNING {}",
            TRANSACTION_COLUMNS
        ))
        .bind(&transaction_id)
        .bind(reference)
        .bind(amount)
        .bind(currency)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if let Some(row) = inserted {
            return PaymentTransaction::try_from(row);
        }

        debug!(reference = %reference, "Pending transaction already open");
        let open = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM payment_transactions WHERE reference = $1 AND state = 'pending'",
            TRANSACTION_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        match open {
            Some(row) => PaymentTransaction::try_from(row),
            None => {
                // Finished between the insert and the read; a retry opens a new one
                let mut err = DatabaseError::new(DatabaseErrorKind::NotFound {
                    entity: "pending transaction".to_string(),
                    id: reference.to_string(),
                });
                err.is_retryable = true;
                Err(err)
            }
        }
    }
}

#[async_trait]
impl TransactionStore for PaymentTransactionRepository {
    async fn find_by_reference(&self, reference: &str) -> PaymentResult<Vec<PaymentTransaction>> {
        Ok(PaymentTransactionRepository::find_by_reference(self, reference).await?)
    }

    async fn finalize(
        &self,
        id: &str,
        update: &TransactionUpdate,
    ) -> PaymentResult<Option<PaymentTransaction>> {
        Ok(PaymentTransactionRepository::finalize(self, id, update).await?)
    }

    async fn create_pending(
        &self,
        reference: &str,
        amount: &BigDecimal,
        currency: &str,
    ) -> PaymentResult<PaymentTransaction> {
        Ok(self.create_transaction(reference, amount, currency).await?)
    }
}

use crate::api::AppState;
use crate::payments::error::PaymentError;
use crate::payments::types::{CallbackData, PaymentOrder, TransactionState};
use axum::{
    extract::{Form, MatchedPath, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use std::collections::HashMap;
use tracing::{error, info, warn};

/// Payment error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub PaymentError);

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            PaymentError::MissingReference
            | PaymentError::SignatureMismatch { .. }
            | PaymentError::InvalidOrder { .. } => StatusCode::BAD_REQUEST,
            PaymentError::NotFound { .. } => StatusCode::NOT_FOUND,
            PaymentError::AmbiguousReference { .. } => StatusCode::CONFLICT,
            PaymentError::StoreError { .. } if self.0.is_retryable() => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            PaymentError::NotificationError { .. } => StatusCode::BAD_GATEWAY,
            PaymentError::StoreError { .. } | PaymentError::ConfigError { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Text returned to the caller. The computed hash stays in the logs.
    pub fn public_message(&self) -> String {
        match &self.0 {
            PaymentError::SignatureMismatch { .. } => "Elavon: invalid shasign".to_string(),
            PaymentError::StoreError { .. } | PaymentError::ConfigError { .. } => {
                "Internal error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.public_message()).into_response()
    }
}

/// Only same-site paths are followed; anything else falls back to the default
fn safe_return_url(candidate: Option<String>, default: &str) -> String {
    match candidate {
        Some(url) if url.starts_with('/') && !url.starts_with("//") => url,
        Some(url) if !url.is_empty() => {
            warn!(return_url = %url, "Ignoring non-local return_url");
            default.to_string()
        }
        _ => default.to_string(),
    }
}

/// Browser return from the hosted payment page, shared by the
/// return/cancel/error/reject routes
pub async fn elavon_return(
    State(state): State<AppState>,
    matched: MatchedPath,
    Form(post): Form<HashMap<String, String>>,
) -> Result<Redirect, ApiError> {
    let route = matched.as_str().to_string();
    let mut data = CallbackData::from(post);
    info!(route = %route, payload = ?data.fields(), "Elavon: entering form_feedback");

    let return_url = safe_return_url(data.remove("return_url"), &state.default_return_url);
    if data.is_empty() {
        return Ok(Redirect::to(&return_url));
    }

    let event_id = match &state.callbacks {
        Some(callbacks) => {
            let payload = serde_json::to_value(data.fields()).map_err(PaymentError::from)?;
            match callbacks
                .log_event(&route, data.get("ORDER_ID"), payload)
                .await
            {
                Ok(event) => Some(event.id),
                Err(e) => {
                    warn!(error = %e, "Failed to record callback event");
                    None
                }
            }
        }
        None => None,
    };

    match state.reconciler.reconcile(&data).await {
        Ok(result) => {
            info!(
                reference = %result.transaction.reference,
                outcome = ?result.outcome,
                mismatches = result.mismatches.len(),
                "Elavon callback processed"
            );
            if let (Some(callbacks), Some(id)) = (&state.callbacks, &event_id) {
                let outcome = serde_json::to_value(&result.outcome).map_err(PaymentError::from)?;
                if let Err(e) = callbacks.mark_processed(id, outcome).await {
                    warn!(error = %e, event_id = %id, "Failed to mark callback event processed");
                }
            }
            Ok(Redirect::to(&return_url))
        }
        Err(err) => {
            if let (Some(callbacks), Some(id)) = (&state.callbacks, &event_id) {
                if let Err(e) = callbacks.record_failure(id, &err.to_string()).await {
                    warn!(error = %e, event_id = %id, "Failed to record callback failure");
                }
            }
            if !err.is_callback_rejection() {
                error!(error = %err, route = %route, "Elavon callback processing failed");
            }
            Err(ApiError(err))
        }
    }
}

/// Render the auto-submitting hosted payment form for an order
pub async fn payment_form(
    State(state): State<AppState>,
    Json(order): Json<PaymentOrder>,
) -> Result<Html<String>, ApiError> {
    let form = state
        .provider
        .build_form_values(&order, state.clock.as_ref())?;

    // Callbacks come back keyed on ORDER_ID, which may be a truncated reference
    let order_id = form
        .get("ORDER_ID")
        .unwrap_or(order.reference.as_str())
        .to_string();
    let existing = state.store.find_by_reference(&order_id).await?;
    if !existing.is_empty() && !existing.iter().any(|tx| tx.state == TransactionState::Pending) {
        return Err(ApiError(PaymentError::invalid_order(format!(
            "Order {} already has a finished transaction",
            order_id
        ))));
    }

    let currency = state.provider.config().currency.as_str();
    let transaction = state
        .store
        .create_pending(&order_id, &order.amount, currency)
        .await?;

    // The signed AMOUNT must be the amount the transaction expects
    if transaction.amount.round(2) != order.amount.round(2) {
        warn!(
            reference = %order_id,
            expected = %transaction.amount,
            requested = %order.amount,
            "Refusing payment form with a different amount than the open transaction"
        );
        return Err(ApiError(PaymentError::invalid_order(format!(
            "Order {} is open for {}, got {}",
            order_id, transaction.amount, order.amount
        ))));
    }

    info!(
        transaction_id = %transaction.id,
        reference = %order_id,
        "Payment form issued"
    );

    Ok(Html(form.render_html()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_return_url() {
        assert_eq!(safe_return_url(None, "/shop"), "/shop");
        assert_eq!(safe_return_url(Some(String::new()), "/shop"), "/shop");
        assert_eq!(
            safe_return_url(Some("/shop/confirmation".to_string()), "/shop"),
            "/shop/confirmation"
        );
        assert_eq!(
            safe_return_url(Some("https://evil.example".to_string()), "/shop"),
            "/shop"
        );
        assert_eq!(
            safe_return_url(Some("//evil.example".to_string()), "/shop"),
            "/shop"
        );
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (PaymentError::MissingReference, StatusCode::BAD_REQUEST),
            (PaymentError::not_found("SO1"), StatusCode::NOT_FOUND),
            (
                PaymentError::ambiguous_reference("SO1", 2),
                StatusCode::CONFLICT,
            ),
            (
                PaymentError::store_error("boom"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }

    #[test]
    fn test_signature_mismatch_hides_computed_hash() {
        let err = ApiError(PaymentError::SignatureMismatch {
            received: "abc".to_string(),
            computed: "4f6d15c37aa9958ba884adf0e1c3eb3b86cff92f".to_string(),
        });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(!err.public_message().contains("4f6d15c3"));
    }
}

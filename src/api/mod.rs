//! HTTP surface: acquirer callbacks, the payment form and health

pub mod callback;
pub mod health;

use crate::database::callback_repository::CallbackRepository;
use crate::payments::providers::ElavonProvider;
use crate::payments::reconciler::CallbackReconciler;
use crate::payments::traits::{Clock, TransactionStore};
use axum::{
    routing::{get, post},
    Router,
};
use http::HeaderName;
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub const CALLBACK_ROUTES: [&str; 4] = [
    "/payment/elavon/return",
    "/payment/elavon/cancel",
    "/payment/elavon/error",
    "/payment/elavon/reject",
];

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<ElavonProvider>,
    pub reconciler: Arc<CallbackReconciler>,
    pub store: Arc<dyn TransactionStore>,
    pub clock: Arc<dyn Clock>,
    /// Audit log of received callbacks; absent when running without Postgres
    pub callbacks: Option<Arc<CallbackRepository>>,
    pub pool: Option<PgPool>,
    pub environment: String,
    pub default_return_url: String,
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health::health_check))
        .route("/payment/elavon/form", post(callback::payment_form));

    for path in CALLBACK_ROUTES {
        router = router.route(
            path,
            get(callback::elavon_return).post(callback::elavon_return),
        );
    }

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
        .with_state(state)
}

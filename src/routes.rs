// src/routes.rs

use axum::{
    routing::{get, patch, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{config::AppState, docs::ApiDoc, handlers};

pub fn build_router(app_state: AppState) -> Router {
    let payment_routes = Router::new()
        .route("/batch", post(handlers::payments::record_payments))
        .route("/{payment_id}/allocations", post(handlers::payments::match_payment));

    let invoice_routes = Router::new()
        .route(
            "/{invoice_id}",
            patch(handlers::invoices::correct_invoice)
                .delete(handlers::invoices::delete_invoice),
        )
        .route("/{invoice_id}/schedule", post(handlers::invoices::adjust_schedule))
        .route("/{invoice_id}/recompute", post(handlers::invoices::recompute_status));

    let contract_routes = Router::new()
        .route(
            "/{contract_id}/unallocated-payments",
            get(handlers::payments::list_unallocated_payments),
        )
        .route("/{contract_id}/billing", get(handlers::ledger::contract_billing));

    // Combina tudo no router principal
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/ledger", get(handlers::ledger::query_ledger))
        .route("/api/payments", post(handlers::payments::allocate_payment))
        .nest("/api/payments", payment_routes)
        .nest("/api/invoices", invoice_routes)
        .nest("/api/contracts", contract_routes)
        .with_state(app_state)
}

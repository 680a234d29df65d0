// src/handlers/ledger.rs

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::caller::CallerContext,
    models::billing::{InvoiceDetail, LedgerFilters, LedgerRow, LedgerScope},
};

// GET /api/ledger
#[utoipa::path(
    get,
    path = "/api/ledger",
    tag = "Ledger",
    responses(
        (status = 200, description = "Uma linha por fatura visível ao chamador, mais recente primeiro", body = Vec<LedgerRow>),
        (status = 400, description = "Cabeçalhos de identidade ausentes ou inválidos")
    ),
    params(
        LedgerFilters,
        ("x-caller-role" = String, Header, description = "admin | landlord | tenant"),
        ("x-caller-id" = i64, Header, description = "ID do usuário chamador")
    )
)]
pub async fn query_ledger(
    State(app_state): State<AppState>,
    caller: CallerContext,
    Query(filters): Query<LedgerFilters>,
) -> Result<impl IntoResponse, AppError> {
    let scope = LedgerScope {
        role: caller.role,
        caller_id: caller.caller_id,
        filters,
    };

    let rows = app_state.ledger_service.query_ledger(&scope).await?;
    Ok(Json(rows))
}

// GET /api/contracts/{contract_id}/billing
#[utoipa::path(
    get,
    path = "/api/contracts/{contract_id}/billing",
    tag = "Ledger",
    responses(
        (status = 200, description = "Faturas do contrato com os pagamentos conciliados", body = Vec<InvoiceDetail>),
        (status = 404, description = "Contrato inexistente")
    ),
    params(
        ("contract_id" = i64, Path, description = "ID do Contrato")
    )
)]
pub async fn contract_billing(
    State(app_state): State<AppState>,
    Path(contract_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let details = app_state.ledger_service.contract_billing(contract_id).await?;
    Ok(Json(details))
}

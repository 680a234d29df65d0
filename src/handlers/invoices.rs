// src/handlers/invoices.rs

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    models::{
        billing::{DeletionOutcome, Invoice, InvoiceCorrection, ScheduleMode, ScheduleOutcome},
        billing_month::BillingMonth,
    },
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CorrectInvoicePayload {
    #[validate(range(min = 1, message = "deve ser positivo"))]
    #[schema(example = 450000)]
    pub amount: Option<i64>,

    #[schema(value_type = Option<String>, format = Date, example = "2024-01-15")]
    pub due_date: Option<NaiveDate>,
}

// PATCH /api/invoices/{invoice_id}
#[utoipa::path(
    patch,
    path = "/api/invoices/{invoice_id}",
    tag = "Invoices",
    request_body = CorrectInvoicePayload,
    responses(
        (status = 200, description = "Fatura corrigida, status recalculado", body = Invoice),
        (status = 404, description = "Fatura inexistente")
    ),
    params(
        ("invoice_id" = i64, Path, description = "ID da Fatura")
    )
)]
pub async fn correct_invoice(
    State(app_state): State<AppState>,
    Path(invoice_id): Path<i64>,
    Json(payload): Json<CorrectInvoicePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let invoice = app_state
        .status_service
        .correct_invoice(
            invoice_id,
            InvoiceCorrection { amount: payload.amount, due_date: payload.due_date },
        )
        .await?;

    Ok(Json(invoice))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdjustSchedulePayload {
    /// Obrigatório só no modo `single`.
    #[schema(example = "2024-02")]
    pub new_month: Option<String>,

    pub mode: ScheduleMode,
}

// POST /api/invoices/{invoice_id}/schedule
#[utoipa::path(
    post,
    path = "/api/invoices/{invoice_id}/schedule",
    tag = "Invoices",
    request_body = AdjustSchedulePayload,
    responses(
        (status = 200, description = "Competências ajustadas", body = ScheduleOutcome),
        (status = 404, description = "Fatura inexistente"),
        (status = 409, description = "Duas faturas do contrato ficariam no mesmo mês")
    ),
    params(
        ("invoice_id" = i64, Path, description = "ID da Fatura")
    )
)]
pub async fn adjust_schedule(
    State(app_state): State<AppState>,
    Path(invoice_id): Path<i64>,
    Json(payload): Json<AdjustSchedulePayload>,
) -> Result<impl IntoResponse, AppError> {
    let new_month = payload
        .new_month
        .as_deref()
        .map(str::parse::<BillingMonth>)
        .transpose()?;

    let outcome = app_state
        .schedule_service
        .adjust_schedule(invoice_id, new_month, payload.mode)
        .await?;

    Ok(Json(outcome))
}

// POST /api/invoices/{invoice_id}/recompute
#[utoipa::path(
    post,
    path = "/api/invoices/{invoice_id}/recompute",
    tag = "Invoices",
    responses(
        (status = 200, description = "Status recalculado a partir das alocações", body = Invoice),
        (status = 404, description = "Fatura inexistente")
    ),
    params(
        ("invoice_id" = i64, Path, description = "ID da Fatura")
    )
)]
pub async fn recompute_status(
    State(app_state): State<AppState>,
    Path(invoice_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let invoice = app_state.status_service.recompute(invoice_id).await?;
    Ok(Json(invoice))
}

// DELETE /api/invoices/{invoice_id}
#[utoipa::path(
    delete,
    path = "/api/invoices/{invoice_id}",
    tag = "Invoices",
    responses(
        (status = 200, description = "Fatura excluída com alocações e pagamentos órfãos", body = DeletionOutcome),
        (status = 404, description = "Fatura inexistente")
    ),
    params(
        ("invoice_id" = i64, Path, description = "ID da Fatura")
    )
)]
pub async fn delete_invoice(
    State(app_state): State<AppState>,
    Path(invoice_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = app_state.deletion_service.delete_invoice(invoice_id).await?;
    Ok(Json(outcome))
}

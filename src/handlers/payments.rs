// src/handlers/payments.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    models::billing::{
        AllocatePayment, AllocationEntry, AllocationTarget, InvoiceType, MatchReceipt, NewPayment,
        Payment, PaymentReceipt, PaymentType, UnallocatedPayment,
    },
};

// =============================================================================
//  1. PAGAMENTO COM ALOCAÇÃO
// =============================================================================

/// Uma parcela do pagamento: ou `invoiceId` (fatura existente) ou `billingMonth` (fatura nova).
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AllocationEntryPayload {
    #[schema(example = 12)]
    pub invoice_id: Option<i64>,

    #[validate(range(min = 1, message = "deve ser positivo"))]
    #[schema(example = 300000)]
    pub amount: i64,

    // Campos abaixo só valem para fatura nova
    #[schema(example = "2024-03")]
    pub billing_month: Option<String>,

    pub invoice_type: Option<InvoiceType>,

    #[schema(value_type = Option<String>, format = Date, example = "2024-03-10")]
    pub due_date: Option<NaiveDate>,

    #[validate(range(min = 1, message = "deve ser positivo"))]
    #[schema(example = 400000)]
    pub due_total: Option<i64>,
}

impl AllocationEntryPayload {
    fn into_entry(self) -> Result<AllocationEntry, AppError> {
        let target = match (self.invoice_id, self.billing_month) {
            (Some(invoice_id), None) => AllocationTarget::Existing { invoice_id },
            (None, Some(month)) => AllocationTarget::New {
                kind: self.invoice_type.unwrap_or(InvoiceType::Combined),
                billing_month: month.parse()?,
                due_date: self.due_date,
                due_total: self.due_total,
            },
            _ => {
                return Err(AppError::InvalidInput(
                    "cada alocação deve informar exatamente um entre invoiceId e billingMonth".into(),
                ))
            }
        };

        Ok(AllocationEntry { target, amount: self.amount })
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AllocatePaymentPayload {
    #[validate(range(min = 1, message = "required"))]
    #[schema(example = 1)]
    pub contract_id: i64,

    #[validate(range(min = 1, message = "deve ser positivo"))]
    #[schema(example = 400000)]
    pub amount: i64,

    // Ausente = agora
    pub paid_at: Option<DateTime<Utc>>,

    #[validate(length(max = 255))]
    #[schema(example = "TED KIM 01")]
    pub memo: Option<String>,

    #[serde(default)]
    pub payment_type: PaymentType,

    #[serde(default)]
    #[validate(nested)]
    pub entries: Vec<AllocationEntryPayload>,
}

// POST /api/payments
#[utoipa::path(
    post,
    path = "/api/payments",
    tag = "Payments",
    request_body = AllocatePaymentPayload,
    responses(
        (status = 201, description = "Pagamento registrado e alocado", body = PaymentReceipt),
        (status = 404, description = "Contrato ou fatura inexistente"),
        (status = 409, description = "Competência já ocupada por outra fatura"),
        (status = 422, description = "Fatura de outro contrato ou saldo insuficiente")
    )
)]
pub async fn allocate_payment(
    State(app_state): State<AppState>,
    Json(payload): Json<AllocatePaymentPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let entries = payload
        .entries
        .into_iter()
        .map(AllocationEntryPayload::into_entry)
        .collect::<Result<Vec<_>, _>>()?;

    let receipt = app_state
        .allocation_service
        .allocate(AllocatePayment {
            contract_id: payload.contract_id,
            amount: payload.amount,
            paid_at: payload.paid_at.unwrap_or_else(Utc::now),
            memo: payload.memo,
            kind: payload.payment_type,
            entries,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

// =============================================================================
//  2. IMPORTAÇÃO EM LOTE / CONCILIAÇÃO
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordPaymentPayload {
    #[validate(range(min = 1, message = "required"))]
    pub contract_id: i64,

    #[validate(range(min = 1, message = "deve ser positivo"))]
    #[schema(example = 400000)]
    pub amount: i64,

    pub paid_at: Option<DateTime<Utc>>,

    #[validate(length(max = 255))]
    pub memo: Option<String>,

    #[serde(default)]
    pub payment_type: PaymentType,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordPaymentsPayload {
    #[validate(nested)]
    pub payments: Vec<RecordPaymentPayload>,
}

// POST /api/payments/batch
#[utoipa::path(
    post,
    path = "/api/payments/batch",
    tag = "Payments",
    request_body = RecordPaymentsPayload,
    responses(
        (status = 201, description = "Pagamentos registrados sem alocação", body = Vec<Payment>),
        (status = 404, description = "Algum contrato não existe (nada é gravado)")
    )
)]
pub async fn record_payments(
    State(app_state): State<AppState>,
    Json(payload): Json<RecordPaymentsPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let now = Utc::now();
    let payments = payload
        .payments
        .into_iter()
        .map(|p| NewPayment {
            contract_id: p.contract_id,
            amount: p.amount,
            paid_at: p.paid_at.unwrap_or(now),
            memo: p.memo,
            kind: p.payment_type,
        })
        .collect();

    let recorded = app_state.allocation_service.record_payments(payments).await?;

    Ok((StatusCode::CREATED, Json(recorded)))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchPaymentPayload {
    #[validate(range(min = 1, message = "required"))]
    #[schema(example = 12)]
    pub invoice_id: i64,

    #[validate(range(min = 1, message = "deve ser positivo"))]
    #[schema(example = 100000)]
    pub amount: i64,
}

// POST /api/payments/{payment_id}/allocations
#[utoipa::path(
    post,
    path = "/api/payments/{payment_id}/allocations",
    tag = "Payments",
    request_body = MatchPaymentPayload,
    responses(
        (status = 201, description = "Saldo do pagamento conciliado com a fatura", body = MatchReceipt),
        (status = 404, description = "Pagamento ou fatura inexistente"),
        (status = 422, description = "Contratos diferentes ou saldo insuficiente")
    ),
    params(
        ("payment_id" = i64, Path, description = "ID do Pagamento")
    )
)]
pub async fn match_payment(
    State(app_state): State<AppState>,
    Path(payment_id): Path<i64>,
    Json(payload): Json<MatchPaymentPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let receipt = app_state
        .allocation_service
        .match_payment(payment_id, payload.invoice_id, payload.amount)
        .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

// GET /api/contracts/{contract_id}/unallocated-payments
#[utoipa::path(
    get,
    path = "/api/contracts/{contract_id}/unallocated-payments",
    tag = "Payments",
    responses(
        (status = 200, description = "Pagamentos com saldo ainda não alocado", body = Vec<UnallocatedPayment>),
        (status = 404, description = "Contrato inexistente")
    ),
    params(
        ("contract_id" = i64, Path, description = "ID do Contrato")
    )
)]
pub async fn list_unallocated_payments(
    State(app_state): State<AppState>,
    Path(contract_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let payments = app_state.ledger_service.unallocated_payments(contract_id).await?;
    Ok(Json(payments))
}

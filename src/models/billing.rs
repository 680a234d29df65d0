// src/models/billing.rs

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use super::billing_month::{BillingMonth, MonthParseError};

// --- Enums (Mapeando o Postgres) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "invoice_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    Rent,
    Maintenance,
    Combined, // Aluguel + Condomínio na mesma fatura
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "invoice_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    #[default]
    Unpaid,
    Partial,
    Paid,
}

impl InvoiceStatus {
    /// Status de uma fatura a partir do total alocado contra o valor devido.
    pub fn derive(allocated: i64, due: i64) -> Self {
        if allocated <= 0 {
            InvoiceStatus::Unpaid
        } else if allocated >= due {
            InvoiceStatus::Paid
        } else {
            InvoiceStatus::Partial
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "payment_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    #[default]
    Rent,
    Deposit,
    Other,
}

// Periodicidade do contrato: pré-pago vence dentro da competência, pós-pago no mês seguinte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "payment_cadence", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum PaymentCadence {
    Prepaid,
    Postpaid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "user_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Pending,
    Active,
    Terminated,
}

// --- Contrato (externo, somente leitura) ---

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContractTerms {
    pub id: i64,
    pub tenant_id: i64,
    pub building_id: i64,
    pub payment_type: PaymentCadence,
    #[schema(value_type = String, format = Date, example = "2024-01-10")]
    pub contract_start_date: NaiveDate,
}

impl ContractTerms {
    /// Vencimento padrão de uma competência: o dia de início do contrato,
    /// no próprio mês (pré-pago) ou no mês seguinte (pós-pago).
    pub fn due_date_for(&self, month: BillingMonth) -> Result<NaiveDate, MonthParseError> {
        let day = self.contract_start_date.day();
        Ok(match self.payment_type {
            PaymentCadence::Prepaid => month.day_clamped(day),
            PaymentCadence::Postpaid => month.next()?.day_clamped(day),
        })
    }
}

// --- Registros do núcleo ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    #[schema(example = 1)]
    pub id: i64,
    pub contract_id: i64,

    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: InvoiceType,

    #[schema(value_type = String, example = "2024-01")]
    pub billing_month: BillingMonth,

    #[schema(value_type = Option<String>, format = Date, example = "2024-01-10")]
    pub due_date: Option<NaiveDate>,

    #[schema(example = 400000)]
    pub amount: i64,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: i64,
    pub contract_id: i64,
    #[schema(example = 300000)]
    pub amount: i64,
    pub paid_at: DateTime<Utc>,
    #[schema(example = "TED KIM 01")]
    pub memo: Option<String>,

    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: PaymentType,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub id: i64,
    pub payment_id: i64,
    pub invoice_id: i64,
    #[schema(example = 300000)]
    pub amount: i64,
}

// --- Entradas de escrita (usadas pelos repositórios) ---

#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub contract_id: i64,
    pub kind: InvoiceType,
    pub billing_month: BillingMonth,
    pub due_date: Option<NaiveDate>,
    pub amount: i64,
    pub status: InvoiceStatus,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub contract_id: i64,
    pub amount: i64,
    pub paid_at: DateTime<Utc>,
    pub memo: Option<String>,
    pub kind: PaymentType,
}

// --- Comandos dos serviços ---

/// Para onde vai cada parcela de um pagamento.
#[derive(Debug, Clone)]
pub enum AllocationTarget {
    /// Fatura já existente.
    Existing { invoice_id: i64 },
    /// Fatura criada na hora, com obrigação total `due_total` (padrão: o valor da parcela).
    New {
        kind: InvoiceType,
        billing_month: BillingMonth,
        due_date: Option<NaiveDate>,
        due_total: Option<i64>,
    },
}

#[derive(Debug, Clone)]
pub struct AllocationEntry {
    pub target: AllocationTarget,
    pub amount: i64,
}

#[derive(Debug, Clone)]
pub struct AllocatePayment {
    pub contract_id: i64,
    pub amount: i64,
    pub paid_at: DateTime<Utc>,
    pub memo: Option<String>,
    pub kind: PaymentType,
    pub entries: Vec<AllocationEntry>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub allocations: Vec<Allocation>,
    /// Faturas tocadas, já com o status recalculado.
    pub invoices: Vec<Invoice>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchReceipt {
    pub allocation: Allocation,
    pub invoice: Invoice,
    /// Saldo do pagamento ainda não alocado depois desta conciliação.
    pub payment_remaining: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    Single,
    ShiftForward,  // Um mês mais cedo
    ShiftBackward, // Um mês mais tarde
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MovedInvoice {
    pub invoice_id: i64,
    #[schema(value_type = String, example = "2024-01")]
    pub from: BillingMonth,
    #[schema(value_type = String, example = "2023-12")]
    pub to: BillingMonth,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleOutcome {
    pub affected_count: u64,
    pub moved: Vec<MovedInvoice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeletionOutcome {
    pub invoice_deleted: bool,
    pub orphaned_payments_deleted: Vec<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct InvoiceCorrection {
    pub amount: Option<i64>,
    pub due_date: Option<NaiveDate>,
}

// --- Projeções de leitura ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CallerRole {
    Admin,
    Landlord,
    Tenant,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct LedgerFilters {
    pub landlord_id: Option<i64>,
    pub building_id: Option<i64>,
    pub tenant_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerScope {
    pub role: CallerRole,
    pub caller_id: i64,
    pub filters: LedgerFilters,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRow {
    pub landlord_id: i64,
    pub landlord_name: String,
    pub tenant_id: i64,
    pub tenant_name: String,
    pub building_id: i64,
    pub building_name: String,
    pub room_number: Option<String>,

    pub contract_id: i64,
    #[schema(value_type = String, format = Date, example = "2024-01-10")]
    pub contract_start_date: NaiveDate,
    pub payment_type: PaymentCadence,

    pub invoice_id: i64,
    pub invoice_type: InvoiceType,
    #[schema(value_type = String, example = "2024-01")]
    pub billing_month: BillingMonth,
    #[schema(value_type = Option<String>, format = Date)]
    pub due_date: Option<NaiveDate>,
    pub due_amount: i64,
    pub paid_amount: i64,
    pub last_paid_date: Option<DateTime<Utc>>,

    // Derivado de paid_amount x due_amount depois da leitura
    #[sqlx(skip)]
    pub status: InvoiceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnallocatedPayment {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub payment: Payment,
    pub allocated_amount: i64,
    pub remaining_amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchedPayment {
    #[serde(skip)]
    pub invoice_id: i64,
    pub allocation_id: i64,
    pub payment_id: i64,
    pub matched_amount: i64,
    pub payment_amount: i64,
    pub paid_at: DateTime<Utc>,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub paid_amount: i64,
    pub payments: Vec<MatchedPayment>,
}

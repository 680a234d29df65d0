// src/docs.rs

use utoipa::OpenApi;
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Payments ---
        handlers::payments::allocate_payment,
        handlers::payments::record_payments,
        handlers::payments::match_payment,
        handlers::payments::list_unallocated_payments,

        // --- Invoices ---
        handlers::invoices::correct_invoice,
        handlers::invoices::adjust_schedule,
        handlers::invoices::recompute_status,
        handlers::invoices::delete_invoice,

        // --- Ledger ---
        handlers::ledger::query_ledger,
        handlers::ledger::contract_billing,
    ),
    components(
        schemas(
            // --- Enums ---
            models::billing::InvoiceType,
            models::billing::InvoiceStatus,
            models::billing::PaymentType,
            models::billing::PaymentCadence,
            models::billing::ScheduleMode,

            // --- Registros ---
            models::billing::Invoice,
            models::billing::Payment,
            models::billing::Allocation,

            // --- Resultados ---
            models::billing::PaymentReceipt,
            models::billing::MatchReceipt,
            models::billing::MovedInvoice,
            models::billing::ScheduleOutcome,
            models::billing::DeletionOutcome,

            // --- Leitura ---
            models::billing::LedgerRow,
            models::billing::UnallocatedPayment,
            models::billing::MatchedPayment,
            models::billing::InvoiceDetail,

            // --- Payloads ---
            handlers::payments::AllocationEntryPayload,
            handlers::payments::AllocatePaymentPayload,
            handlers::payments::RecordPaymentPayload,
            handlers::payments::RecordPaymentsPayload,
            handlers::payments::MatchPaymentPayload,
            handlers::invoices::CorrectInvoicePayload,
            handlers::invoices::AdjustSchedulePayload,
        )
    ),
    tags(
        (name = "Payments", description = "Registro, alocação e conciliação de pagamentos"),
        (name = "Invoices", description = "Correção, cronograma, status e exclusão de faturas"),
        (name = "Ledger", description = "Livro-razão e extrato por contrato")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/payments",
            "/api/payments/batch",
            "/api/payments/{payment_id}/allocations",
            "/api/contracts/{contract_id}/unallocated-payments",
            "/api/contracts/{contract_id}/billing",
            "/api/invoices/{invoice_id}",
            "/api/invoices/{invoice_id}/schedule",
            "/api/invoices/{invoice_id}/recompute",
            "/api/ledger",
        ] {
            assert!(doc.paths.paths.contains_key(path), "rota sem documentação: {path}");
        }
    }
}

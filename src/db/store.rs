// src/db/store.rs

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    common::error::AppError,
    models::{
        billing::{
            Allocation, ContractTerms, Invoice, InvoiceDetail, InvoiceStatus, LedgerRow,
            LedgerScope, NewInvoice, NewPayment, Payment, UnallocatedPayment,
        },
        billing_month::BillingMonth,
    },
};

/// Ponto de entrada do armazenamento de cobrança.
///
/// Os serviços recebem um `Arc<dyn BillingStore>` em vez de um pool global:
/// em produção é o `PgBillingStore`, nos testes o `MemoryBillingStore`.
/// Toda escrita passa por um `BillingTx`; as projeções de leitura ficam aqui.
#[async_trait]
pub trait BillingStore: Send + Sync + 'static {
    /// Abre uma unidade de trabalho. Se o `BillingTx` for descartado sem `commit`, nada é gravado.
    async fn begin(&self) -> Result<Box<dyn BillingTx>, AppError>;

    async fn contract_exists(&self, contract_id: i64) -> Result<bool, AppError>;

    async fn query_ledger(&self, scope: &LedgerScope) -> Result<Vec<LedgerRow>, AppError>;

    async fn unallocated_payments(&self, contract_id: i64) -> Result<Vec<UnallocatedPayment>, AppError>;

    async fn contract_billing(&self, contract_id: i64) -> Result<Vec<InvoiceDetail>, AppError>;
}

/// Operações de linha dentro de uma transação.
///
/// Os métodos `lock_*` seguram a linha até o fim da transação (`FOR UPDATE` no Postgres),
/// serializando leitura-cálculo-escrita por fatura e por pagamento.
#[async_trait]
pub trait BillingTx: Send {
    // --- Contratos (externos) ---
    async fn find_contract(&mut self, contract_id: i64) -> Result<Option<ContractTerms>, AppError>;

    /// Trava o contrato para quem cria ou move competências das suas faturas.
    /// Sempre tomada antes das travas de fatura.
    async fn lock_contract(&mut self, contract_id: i64) -> Result<Option<ContractTerms>, AppError>;

    // --- Faturas ---
    /// Leitura sem trava.
    async fn find_invoice(&mut self, invoice_id: i64) -> Result<Option<Invoice>, AppError>;

    async fn lock_invoice(&mut self, invoice_id: i64) -> Result<Option<Invoice>, AppError>;

    /// Todas as faturas do contrato, travadas, em ordem de competência.
    async fn lock_contract_invoices(&mut self, contract_id: i64) -> Result<Vec<Invoice>, AppError>;

    async fn find_invoice_by_month(
        &mut self,
        contract_id: i64,
        billing_month: BillingMonth,
    ) -> Result<Option<Invoice>, AppError>;

    async fn insert_invoice(&mut self, new: &NewInvoice) -> Result<Invoice, AppError>;

    async fn set_invoice_status(&mut self, invoice_id: i64, status: InvoiceStatus) -> Result<(), AppError>;

    async fn set_billing_month(&mut self, invoice_id: i64, billing_month: BillingMonth) -> Result<(), AppError>;

    async fn update_invoice_terms(
        &mut self,
        invoice_id: i64,
        amount: i64,
        due_date: Option<NaiveDate>,
    ) -> Result<Invoice, AppError>;

    /// Remove a fatura; `false` se ela não existia.
    async fn delete_invoice(&mut self, invoice_id: i64) -> Result<bool, AppError>;

    // --- Pagamentos ---
    async fn lock_payment(&mut self, payment_id: i64) -> Result<Option<Payment>, AppError>;

    async fn insert_payment(&mut self, new: &NewPayment) -> Result<Payment, AppError>;

    async fn delete_payment(&mut self, payment_id: i64) -> Result<(), AppError>;

    // --- Alocações ---
    async fn insert_allocation(
        &mut self,
        payment_id: i64,
        invoice_id: i64,
        amount: i64,
    ) -> Result<Allocation, AppError>;

    /// Soma das alocações feitas contra a fatura.
    async fn allocated_to_invoice(&mut self, invoice_id: i64) -> Result<i64, AppError>;

    /// Soma das alocações feitas a partir do pagamento.
    async fn allocated_from_payment(&mut self, payment_id: i64) -> Result<i64, AppError>;

    /// IDs distintos dos pagamentos que financiam a fatura, em ordem crescente.
    async fn payment_ids_for_invoice(&mut self, invoice_id: i64) -> Result<Vec<i64>, AppError>;

    async fn delete_allocations_for_invoice(&mut self, invoice_id: i64) -> Result<u64, AppError>;

    async fn count_allocations_for_payment(&mut self, payment_id: i64) -> Result<i64, AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;
}

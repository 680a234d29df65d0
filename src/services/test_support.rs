// src/services/test_support.rs

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::{
    db::{memory_store::MemoryBillingStore, BillingStore},
    models::{
        billing::{
            AllocatePayment, AllocationEntry, AllocationTarget, Invoice, InvoiceType,
            PaymentCadence, PaymentReceipt, PaymentType, TenantStatus,
        },
        billing_month::BillingMonth,
    },
    services::allocation_service::AllocationService,
};

/// Um proprietário, um prédio, um inquilino ativo e um contrato pré-pago iniciado em 2023-11-10.
pub struct Fixture {
    pub memory: MemoryBillingStore,
    pub landlord_id: i64,
    pub tenant_id: i64,
    pub building_id: i64,
    pub contract_id: i64,
}

impl Fixture {
    pub async fn new() -> Self {
        let memory = MemoryBillingStore::new();
        let landlord_id = memory.add_user("Sr. Park", TenantStatus::Active).await;
        let tenant_id = memory.add_user("Kim", TenantStatus::Active).await;
        let building_id = memory.add_building(landlord_id, "Edifício Aurora").await;
        let contract_id = memory
            .add_contract(
                tenant_id,
                building_id,
                PaymentCadence::Prepaid,
                NaiveDate::from_ymd_opt(2023, 11, 10).unwrap(),
                Some("301"),
            )
            .await;

        Self { memory, landlord_id, tenant_id, building_id, contract_id }
    }

    pub fn store(&self) -> Arc<dyn BillingStore> {
        Arc::new(self.memory.clone())
    }

    pub async fn invoice(&self, month: &str, amount: i64) -> Invoice {
        self.memory
            .add_invoice(self.contract_id, InvoiceType::Combined, month_of(month), amount)
            .await
    }

    /// Pagamento de exatamente `amount` aplicado inteiro na fatura.
    pub async fn allocate_existing(&self, invoice_id: i64, amount: i64) -> PaymentReceipt {
        AllocationService::new(self.store())
            .allocate(self.payment(amount, vec![existing(invoice_id, amount)]))
            .await
            .unwrap()
    }

    pub fn payment(&self, amount: i64, entries: Vec<AllocationEntry>) -> AllocatePayment {
        AllocatePayment {
            contract_id: self.contract_id,
            amount,
            paid_at: paid_at(2024, 1, 10),
            memo: Some("TED KIM".into()),
            kind: PaymentType::Rent,
            entries,
        }
    }
}

pub fn month_of(token: &str) -> BillingMonth {
    token.parse().unwrap()
}

pub fn paid_at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
}

pub fn existing(invoice_id: i64, amount: i64) -> AllocationEntry {
    AllocationEntry { target: AllocationTarget::Existing { invoice_id }, amount }
}

pub fn new_invoice(month: &str, amount: i64, due_total: Option<i64>) -> AllocationEntry {
    AllocationEntry {
        target: AllocationTarget::New {
            kind: InvoiceType::Combined,
            billing_month: month_of(month),
            due_date: None,
            due_total,
        },
        amount,
    }
}

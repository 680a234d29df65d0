// src/services/ledger_service.rs

use std::sync::Arc;

use crate::{
    common::error::AppError,
    db::BillingStore,
    models::billing::{InvoiceDetail, LedgerRow, LedgerScope, UnallocatedPayment},
};

/// Consultas somente leitura sobre faturas, pagamentos e alocações.
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn BillingStore>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    /// Uma linha por fatura visível ao chamador, mais recente primeiro.
    pub async fn query_ledger(&self, scope: &LedgerScope) -> Result<Vec<LedgerRow>, AppError> {
        let rows = self.store.query_ledger(scope).await?;
        tracing::debug!("Livro-razão para {:?} {}: {} linha(s)", scope.role, scope.caller_id, rows.len());
        Ok(rows)
    }

    pub async fn unallocated_payments(&self, contract_id: i64) -> Result<Vec<UnallocatedPayment>, AppError> {
        self.ensure_contract(contract_id).await?;
        self.store.unallocated_payments(contract_id).await
    }

    /// Faturas do contrato com os pagamentos conciliados a cada uma.
    pub async fn contract_billing(&self, contract_id: i64) -> Result<Vec<InvoiceDetail>, AppError> {
        self.ensure_contract(contract_id).await?;
        self.store.contract_billing(contract_id).await
    }

    async fn ensure_contract(&self, contract_id: i64) -> Result<(), AppError> {
        if !self.store.contract_exists(contract_id).await? {
            return Err(AppError::ContractNotFound(contract_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::billing::{CallerRole, InvoiceStatus, LedgerFilters, PaymentCadence, TenantStatus},
        services::{
            allocation_service::AllocationService,
            test_support::{existing, month_of, Fixture},
        },
    };
    use chrono::NaiveDate;

    fn scope(role: CallerRole, caller_id: i64) -> LedgerScope {
        LedgerScope { role, caller_id, filters: LedgerFilters::default() }
    }

    #[tokio::test]
    async fn ledger_rows_carry_paid_amount_and_derived_status() {
        let fx = Fixture::new().await;
        let jan = fx.invoice("2024-01", 400_000).await;
        let feb = fx.invoice("2024-02", 400_000).await;
        fx.allocate_existing(jan.id, 300_000).await;
        let service = LedgerService::new(fx.store());

        let rows = service.query_ledger(&scope(CallerRole::Admin, 0)).await.unwrap();

        assert_eq!(rows.len(), 2);
        // Mais recente primeiro
        assert_eq!(rows[0].invoice_id, feb.id);
        assert_eq!(rows[0].status, InvoiceStatus::Unpaid);
        assert_eq!(rows[0].last_paid_date, None);

        assert_eq!(rows[1].invoice_id, jan.id);
        assert_eq!(rows[1].paid_amount, 300_000);
        assert_eq!(rows[1].status, InvoiceStatus::Partial);
        assert_eq!(rows[1].tenant_name, "Kim");
        assert_eq!(rows[1].room_number.as_deref(), Some("301"));
        assert!(rows[1].last_paid_date.is_some());
    }

    #[tokio::test]
    async fn roles_only_see_their_own_contracts() {
        let fx = Fixture::new().await;
        fx.invoice("2024-01", 400_000).await;

        let other_landlord = fx.memory.add_user("Sra. Lee", TenantStatus::Active).await;
        let other_tenant = fx.memory.add_user("Choi", TenantStatus::Active).await;
        let other_building = fx.memory.add_building(other_landlord, "Residencial Sol").await;
        let other_contract = fx
            .memory
            .add_contract(
                other_tenant,
                other_building,
                PaymentCadence::Postpaid,
                NaiveDate::from_ymd_opt(2023, 5, 1).unwrap(),
                None,
            )
            .await;
        fx.memory
            .add_invoice(other_contract, crate::models::billing::InvoiceType::Rent, month_of("2024-01"), 300_000)
            .await;

        let service = LedgerService::new(fx.store());

        let admin = service.query_ledger(&scope(CallerRole::Admin, 0)).await.unwrap();
        assert_eq!(admin.len(), 2);

        let landlord = service.query_ledger(&scope(CallerRole::Landlord, fx.landlord_id)).await.unwrap();
        assert_eq!(landlord.len(), 1);
        assert_eq!(landlord[0].contract_id, fx.contract_id);

        let tenant = service.query_ledger(&scope(CallerRole::Tenant, other_tenant)).await.unwrap();
        assert_eq!(tenant.len(), 1);
        assert_eq!(tenant[0].contract_id, other_contract);

        let filtered = service
            .query_ledger(&LedgerScope {
                role: CallerRole::Admin,
                caller_id: 0,
                filters: LedgerFilters { building_id: Some(other_building), ..Default::default() },
            })
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].building_name, "Residencial Sol");
    }

    #[tokio::test]
    async fn terminated_tenants_are_hidden_from_everyone_but_admins() {
        let fx = Fixture::new().await;
        fx.invoice("2024-01", 400_000).await;
        fx.memory.set_user_status(fx.tenant_id, TenantStatus::Terminated).await;
        let service = LedgerService::new(fx.store());

        let landlord = service.query_ledger(&scope(CallerRole::Landlord, fx.landlord_id)).await.unwrap();
        assert!(landlord.is_empty());

        let admin = service.query_ledger(&scope(CallerRole::Admin, 0)).await.unwrap();
        assert_eq!(admin.len(), 1);
    }

    #[tokio::test]
    async fn contract_billing_lists_matched_payments() {
        let fx = Fixture::new().await;
        let jan = fx.invoice("2024-01", 400_000).await;
        let feb = fx.invoice("2024-02", 400_000).await;
        let receipt = AllocationService::new(fx.store())
            .allocate(fx.payment(600_000, vec![existing(jan.id, 400_000), existing(feb.id, 100_000)]))
            .await
            .unwrap();
        let service = LedgerService::new(fx.store());

        let details = service.contract_billing(fx.contract_id).await.unwrap();

        assert_eq!(details.len(), 2);
        assert_eq!(details[0].invoice.id, feb.id);
        assert_eq!(details[0].paid_amount, 100_000);
        assert_eq!(details[1].paid_amount, 400_000);
        assert_eq!(details[1].payments[0].payment_id, receipt.payment.id);
        assert_eq!(details[1].payments[0].payment_amount, 600_000);

        let open = service.unallocated_payments(fx.contract_id).await.unwrap();
        assert_eq!(open[0].remaining_amount, 100_000);
    }

    #[tokio::test]
    async fn unknown_contract_is_not_found() {
        let fx = Fixture::new().await;
        let service = LedgerService::new(fx.store());

        let err = service.contract_billing(9_999).await.unwrap_err();
        assert!(matches!(err, AppError::ContractNotFound(9_999)));

        let err = service.unallocated_payments(9_999).await.unwrap_err();
        assert!(matches!(err, AppError::ContractNotFound(9_999)));
    }
}

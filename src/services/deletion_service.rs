// src/services/deletion_service.rs

use std::sync::Arc;

use crate::{common::error::AppError, db::BillingStore, models::billing::DeletionOutcome};

#[derive(Clone)]
pub struct DeletionService {
    store: Arc<dyn BillingStore>,
}

impl DeletionService {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    /// Remove a fatura, as alocações contra ela e os pagamentos que ficarem sem nenhuma alocação.
    /// Pagamentos que ainda financiam outras faturas são preservados.
    pub async fn delete_invoice(&self, invoice_id: i64) -> Result<DeletionOutcome, AppError> {
        let mut tx = self.store.begin().await?;

        tx.lock_invoice(invoice_id)
            .await?
            .ok_or(AppError::InvoiceNotFound(invoice_id))?;

        // 1. Pagamentos que financiam esta fatura
        let payment_ids = tx.payment_ids_for_invoice(invoice_id).await?;

        // 2. Alocações da fatura
        let removed_allocations = tx.delete_allocations_for_invoice(invoice_id).await?;

        // 3. A fatura em si
        if !tx.delete_invoice(invoice_id).await? {
            return Err(AppError::InvoiceNotFound(invoice_id));
        }

        // 4. Pagamentos órfãos. A trava (ids em ordem crescente) espera quem estiver mexendo no
        //    mesmo pagamento; a contagem depois dela já enxerga o que essa transação gravou.
        let mut orphaned_payments_deleted = Vec::new();
        for payment_id in payment_ids {
            if tx.lock_payment(payment_id).await?.is_none() {
                continue;
            }
            if tx.count_allocations_for_payment(payment_id).await? == 0 {
                tx.delete_payment(payment_id).await?;
                orphaned_payments_deleted.push(payment_id);
            }
        }

        tx.commit().await?;

        tracing::info!(
            "🗑️ Fatura {} excluída: {} alocação(ões) e {} pagamento(s) órfão(s) removidos",
            invoice_id, removed_allocations, orphaned_payments_deleted.len()
        );

        Ok(DeletionOutcome { invoice_deleted: true, orphaned_payments_deleted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::memory_store::FailPoint,
        models::billing::InvoiceStatus,
        services::{
            allocation_service::AllocationService,
            test_support::{existing, Fixture},
        },
    };

    #[tokio::test]
    async fn shared_payment_survives_and_exclusive_payment_goes() {
        let fx = Fixture::new().await;
        let jan = fx.invoice("2024-01", 400_000).await;
        let feb = fx.invoice("2024-02", 400_000).await;
        let service = AllocationService::new(fx.store());

        // P1 financia jan e feb; P2 financia só jan
        let p1 = service
            .allocate(fx.payment(500_000, vec![existing(jan.id, 200_000), existing(feb.id, 300_000)]))
            .await
            .unwrap()
            .payment;
        let p2 = service
            .allocate(fx.payment(200_000, vec![existing(jan.id, 200_000)]))
            .await
            .unwrap()
            .payment;

        let outcome = DeletionService::new(fx.store()).delete_invoice(jan.id).await.unwrap();

        assert!(outcome.invoice_deleted);
        assert_eq!(outcome.orphaned_payments_deleted, vec![p2.id]);
        assert!(fx.memory.invoice(jan.id).await.is_none());
        assert!(fx.memory.payment(p1.id).await.is_some());
        assert!(fx.memory.payment(p2.id).await.is_none());

        let remaining = fx.memory.allocations().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].invoice_id, feb.id);
        assert_eq!(fx.memory.invoice(feb.id).await.unwrap().status, InvoiceStatus::Partial);
    }

    #[tokio::test]
    async fn concurrent_deletes_of_a_split_payment_remove_it_exactly_once() {
        let fx = Fixture::new().await;
        let jan = fx.invoice("2024-01", 100_000).await;
        let feb = fx.invoice("2024-02", 100_000).await;
        let payment = AllocationService::new(fx.store())
            .allocate(fx.payment(200_000, vec![existing(jan.id, 100_000), existing(feb.id, 100_000)]))
            .await
            .unwrap()
            .payment;

        let service = DeletionService::new(fx.store());
        let (a, b) = tokio::join!(service.delete_invoice(jan.id), service.delete_invoice(feb.id));
        let (a, b) = (a.unwrap(), b.unwrap());

        let mut orphaned = a.orphaned_payments_deleted;
        orphaned.extend(b.orphaned_payments_deleted);
        assert_eq!(orphaned, vec![payment.id]);
        assert!(fx.memory.payment(payment.id).await.is_none());
        assert!(fx.memory.allocations().await.is_empty());
    }

    #[tokio::test]
    async fn unfunded_invoice_deletes_cleanly() {
        let fx = Fixture::new().await;
        let jan = fx.invoice("2024-01", 400_000).await;

        let outcome = DeletionService::new(fx.store()).delete_invoice(jan.id).await.unwrap();

        assert!(outcome.invoice_deleted);
        assert!(outcome.orphaned_payments_deleted.is_empty());
        assert!(fx.memory.invoices().await.is_empty());
    }

    #[tokio::test]
    async fn second_delete_reports_not_found() {
        let fx = Fixture::new().await;
        let jan = fx.invoice("2024-01", 400_000).await;
        let service = DeletionService::new(fx.store());

        service.delete_invoice(jan.id).await.unwrap();
        let err = service.delete_invoice(jan.id).await.unwrap_err();

        assert!(matches!(err, AppError::InvoiceNotFound(id) if id == jan.id));
    }

    #[tokio::test]
    async fn failure_while_removing_payments_keeps_the_invoice() {
        let fx = Fixture::new().await;
        let jan = fx.invoice("2024-01", 400_000).await;
        fx.allocate_existing(jan.id, 400_000).await;
        fx.memory.fail_on(FailPoint::DeletePayment).await;

        let err = DeletionService::new(fx.store()).delete_invoice(jan.id).await.unwrap_err();

        assert!(matches!(err, AppError::DatabaseError(_)));
        assert_eq!(fx.memory.invoice(jan.id).await.unwrap().status, InvoiceStatus::Paid);
        assert_eq!(fx.memory.allocations().await.len(), 1);
        assert_eq!(fx.memory.payments().await.len(), 1);
    }
}

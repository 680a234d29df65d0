// src/services/status_service.rs

use std::sync::Arc;

use crate::{
    common::error::AppError,
    db::{BillingStore, BillingTx},
    models::billing::{Invoice, InvoiceCorrection, InvoiceStatus},
};

/// Recalcula o status da fatura a partir das alocações atuais, dentro da transação do chamador.
///
/// Idempotente: só escreve quando o status muda, e não toca em nada além do campo `status`.
/// Deve rodar depois de qualquer inserção/remoção de alocação ou ajuste de valor da fatura.
pub async fn recompute_status(tx: &mut dyn BillingTx, invoice_id: i64) -> Result<Invoice, AppError> {
    let mut invoice = tx
        .lock_invoice(invoice_id)
        .await?
        .ok_or(AppError::InvoiceNotFound(invoice_id))?;

    let allocated = tx.allocated_to_invoice(invoice_id).await?;
    let status = InvoiceStatus::derive(allocated, invoice.amount);

    if status != invoice.status {
        tx.set_invoice_status(invoice_id, status).await?;
        tracing::debug!(
            "Fatura {}: {:?} -> {:?} ({} de {})",
            invoice_id, invoice.status, status, allocated, invoice.amount
        );
        invoice.status = status;
    }

    Ok(invoice)
}

#[derive(Clone)]
pub struct StatusService {
    store: Arc<dyn BillingStore>,
}

impl StatusService {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    pub async fn recompute(&self, invoice_id: i64) -> Result<Invoice, AppError> {
        let mut tx = self.store.begin().await?;
        let invoice = recompute_status(tx.as_mut(), invoice_id).await?;
        tx.commit().await?;

        Ok(invoice)
    }

    /// Correção explícita de valor e/ou vencimento; o status é recalculado na mesma transação.
    pub async fn correct_invoice(
        &self,
        invoice_id: i64,
        correction: InvoiceCorrection,
    ) -> Result<Invoice, AppError> {
        if correction.amount.is_none() && correction.due_date.is_none() {
            return Err(AppError::InvalidInput(
                "informe ao menos o valor ou o vencimento a corrigir".into(),
            ));
        }
        if let Some(amount) = correction.amount {
            if amount <= 0 {
                return Err(AppError::InvalidInput(format!(
                    "valor da fatura deve ser positivo (recebido {})",
                    amount
                )));
            }
        }

        let mut tx = self.store.begin().await?;

        let current = tx
            .lock_invoice(invoice_id)
            .await?
            .ok_or(AppError::InvoiceNotFound(invoice_id))?;

        tx.update_invoice_terms(
            invoice_id,
            correction.amount.unwrap_or(current.amount),
            correction.due_date.or(current.due_date),
        )
            .await?;

        let invoice = recompute_status(tx.as_mut(), invoice_id).await?;

        tx.commit().await?;

        tracing::info!(
            "✏️ Fatura {} corrigida: valor {} -> {}, status {:?}",
            invoice_id, current.amount, invoice.amount, invoice.status
        );
        Ok(invoice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::memory_store::FailPoint,
        services::test_support::Fixture,
    };
    use chrono::NaiveDate;

    #[tokio::test]
    async fn recompute_is_idempotent_and_follows_allocations() {
        let fx = Fixture::new().await;
        let invoice = fx.invoice("2024-01", 400_000).await;
        fx.allocate_existing(invoice.id, 400_000).await;

        let service = StatusService::new(fx.store());
        let first = service.recompute(invoice.id).await.unwrap();
        let second = service.recompute(invoice.id).await.unwrap();

        assert_eq!(first.status, InvoiceStatus::Paid);
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn recompute_unknown_invoice_is_not_found() {
        let fx = Fixture::new().await;
        let service = StatusService::new(fx.store());

        let err = service.recompute(9_999).await.unwrap_err();
        assert!(matches!(err, AppError::InvoiceNotFound(9_999)));
    }

    #[tokio::test]
    async fn raising_the_amount_reopens_a_paid_invoice() {
        let fx = Fixture::new().await;
        let invoice = fx.invoice("2024-01", 400_000).await;
        fx.allocate_existing(invoice.id, 400_000).await;
        assert_eq!(fx.memory.invoice(invoice.id).await.unwrap().status, InvoiceStatus::Paid);

        let service = StatusService::new(fx.store());
        let corrected = service
            .correct_invoice(invoice.id, InvoiceCorrection { amount: Some(450_000), due_date: None })
            .await
            .unwrap();

        assert_eq!(corrected.amount, 450_000);
        assert_eq!(corrected.status, InvoiceStatus::Partial);
    }

    #[tokio::test]
    async fn lowering_the_amount_below_allocations_marks_paid() {
        let fx = Fixture::new().await;
        let invoice = fx.invoice("2024-01", 400_000).await;
        fx.allocate_existing(invoice.id, 300_000).await;

        let service = StatusService::new(fx.store());
        let due = NaiveDate::from_ymd_opt(2024, 1, 20).unwrap();
        let corrected = service
            .correct_invoice(invoice.id, InvoiceCorrection { amount: Some(300_000), due_date: Some(due) })
            .await
            .unwrap();

        assert_eq!(corrected.status, InvoiceStatus::Paid);
        assert_eq!(corrected.due_date, Some(due));
    }

    #[tokio::test]
    async fn empty_or_non_positive_corrections_are_rejected() {
        let fx = Fixture::new().await;
        let invoice = fx.invoice("2024-01", 400_000).await;
        let service = StatusService::new(fx.store());

        let err = service.correct_invoice(invoice.id, InvoiceCorrection::default()).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let err = service
            .correct_invoice(invoice.id, InvoiceCorrection { amount: Some(0), due_date: None })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn failed_status_write_rolls_back_the_correction() {
        let fx = Fixture::new().await;
        let invoice = fx.invoice("2024-01", 400_000).await;
        fx.allocate_existing(invoice.id, 400_000).await;
        fx.memory.fail_on(FailPoint::SetInvoiceStatus).await;

        let service = StatusService::new(fx.store());
        let err = service
            .correct_invoice(invoice.id, InvoiceCorrection { amount: Some(500_000), due_date: None })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::DatabaseError(_)));
        let stored = fx.memory.invoice(invoice.id).await.unwrap();
        assert_eq!(stored.amount, 400_000);
        assert_eq!(stored.status, InvoiceStatus::Paid);
    }
}

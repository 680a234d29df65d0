// src/services/schedule_service.rs

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    common::error::AppError,
    db::BillingStore,
    models::{
        billing::{MovedInvoice, ScheduleMode, ScheduleOutcome},
        billing_month::BillingMonth,
    },
};

#[derive(Clone)]
pub struct ScheduleService {
    store: Arc<dyn BillingStore>,
}

impl ScheduleService {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    /// Move a competência de uma fatura (`single`) ou desloca em cascata a fatura e todas as
    /// posteriores do mesmo contrato em um mês (`shift_forward` = mais cedo, `shift_backward` = mais tarde).
    ///
    /// Se o resultado deixar duas faturas do contrato no mesmo mês, nada é gravado.
    pub async fn adjust_schedule(
        &self,
        invoice_id: i64,
        new_month: Option<BillingMonth>,
        mode: ScheduleMode,
    ) -> Result<ScheduleOutcome, AppError> {
        let mut tx = self.store.begin().await?;

        // 1. Contrato antes da fatura, na mesma ordem de travas da alocação
        let contract_id = tx
            .find_invoice(invoice_id)
            .await?
            .ok_or(AppError::InvoiceNotFound(invoice_id))?
            .contract_id;
        tx.lock_contract(contract_id).await?;

        let invoice = tx
            .lock_invoice(invoice_id)
            .await?
            .ok_or(AppError::InvoiceNotFound(invoice_id))?;

        let outcome = match mode {
            ScheduleMode::Single => {
                let target = new_month.ok_or_else(|| {
                    AppError::InvalidInput("newMonth é obrigatório no modo single".into())
                })?;

                let mut moved = Vec::new();
                if target != invoice.billing_month {
                    if let Some(occupied) = tx.find_invoice_by_month(invoice.contract_id, target).await? {
                        tracing::warn!(
                            "⚠️ Fatura {} não pode ir para {}: ocupada pela fatura {}",
                            invoice.id, target, occupied.id
                        );
                        return Err(AppError::MonthCollision {
                            contract_id: invoice.contract_id,
                            billing_month: target,
                            invoice_ids: vec![invoice.id, occupied.id],
                        });
                    }

                    tx.set_billing_month(invoice.id, target).await?;
                    moved.push(MovedInvoice { invoice_id: invoice.id, from: invoice.billing_month, to: target });
                }

                ScheduleOutcome { affected_count: 1, moved }
            }
            ScheduleMode::ShiftForward | ScheduleMode::ShiftBackward => {
                if let Some(ignored) = new_month {
                    tracing::debug!("newMonth {} ignorado no modo {:?}", ignored, mode);
                }
                let delta = if mode == ScheduleMode::ShiftForward { -1 } else { 1 };
                let pivot = invoice.billing_month;

                // 2. Trava todas as faturas do contrato e separa as que andam (competência >= pivô)
                let contract_invoices = tx.lock_contract_invoices(invoice.contract_id).await?;

                let mut final_months: BTreeMap<BillingMonth, Vec<i64>> = BTreeMap::new();
                let mut moved = Vec::new();
                for current in &contract_invoices {
                    if current.billing_month >= pivot {
                        let to = current.billing_month.shift(delta)?;
                        moved.push(MovedInvoice { invoice_id: current.id, from: current.billing_month, to });
                        final_months.entry(to).or_default().push(current.id);
                    } else {
                        final_months.entry(current.billing_month).or_default().push(current.id);
                    }
                }

                // 3. Verifica colisões no estado final antes de gravar qualquer coisa
                if let Some((month, ids)) = final_months.iter().find(|(_, ids)| ids.len() > 1) {
                    tracing::warn!(
                        "⚠️ Deslocamento a partir da fatura {} colide em {} (faturas {:?})",
                        invoice.id, month, ids
                    );
                    return Err(AppError::MonthCollision {
                        contract_id: invoice.contract_id,
                        billing_month: *month,
                        invoice_ids: ids.clone(),
                    });
                }

                // 4. Aplica (a constraint de unicidade é verificada só no commit)
                for m in &moved {
                    tx.set_billing_month(m.invoice_id, m.to).await?;
                }

                ScheduleOutcome { affected_count: moved.len() as u64, moved }
            }
        };

        // Se outra escrita ocupou a competência por fora das travas, o banco recusa aqui
        tx.commit().await.map_err(|err| match outcome.moved.first() {
            Some(first) => err.or_month_collision(invoice.contract_id, first.to, vec![first.invoice_id]),
            None => err,
        })?;

        tracing::info!(
            "📅 Cronograma ajustado a partir da fatura {} ({:?}): {} fatura(s) afetada(s)",
            invoice_id, mode, outcome.affected_count
        );
        Ok(outcome)
    }
}

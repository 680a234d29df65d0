// src/services/allocation_service.rs

use std::{collections::HashMap, sync::Arc};

use crate::{
    common::error::AppError,
    db::BillingStore,
    models::{
        billing::{
            AllocatePayment, AllocationTarget, InvoiceStatus, MatchReceipt, NewInvoice, NewPayment,
            Payment, PaymentReceipt,
        },
        billing_month::BillingMonth,
    },
    services::status_service::recompute_status,
};

#[derive(Clone)]
pub struct AllocationService {
    store: Arc<dyn BillingStore>,
}

impl AllocationService {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    /// Registra um pagamento e distribui o valor entre faturas existentes e/ou novas.
    ///
    /// Tudo acontece numa única transação: qualquer falha desfaz pagamento, faturas criadas
    /// e alocações. O que sobrar do pagamento fica como saldo não alocado.
    pub async fn allocate(&self, cmd: AllocatePayment) -> Result<PaymentReceipt, AppError> {
        validate_allocation(&cmd)?;

        // 1. Inicia Transação e trava o contrato (serializa a criação de competências)
        let mut tx = self.store.begin().await?;

        let contract = tx
            .lock_contract(cmd.contract_id)
            .await?
            .ok_or(AppError::ContractNotFound(cmd.contract_id))?;

        // 2. Trava as faturas existentes (ordem crescente de id) e calcula o saldo de cada uma
        let mut existing_ids: Vec<i64> = cmd
            .entries
            .iter()
            .filter_map(|e| match e.target {
                AllocationTarget::Existing { invoice_id } => Some(invoice_id),
                AllocationTarget::New { .. } => None,
            })
            .collect();
        existing_ids.sort_unstable();
        existing_ids.dedup();

        let mut outstanding: HashMap<i64, i64> = HashMap::with_capacity(existing_ids.len());
        for invoice_id in existing_ids {
            let invoice = tx
                .lock_invoice(invoice_id)
                .await?
                .ok_or(AppError::InvoiceNotFound(invoice_id))?;

            if invoice.contract_id != contract.id {
                return Err(AppError::ContractMismatch {
                    invoice_id,
                    invoice_contract_id: invoice.contract_id,
                    contract_id: contract.id,
                });
            }

            let allocated = tx.allocated_to_invoice(invoice_id).await?;
            outstanding.insert(invoice_id, invoice.amount - allocated);
        }

        // 3. Grava o pagamento
        let payment = tx
            .insert_payment(&NewPayment {
                contract_id: contract.id,
                amount: cmd.amount,
                paid_at: cmd.paid_at,
                memo: cmd.memo.clone(),
                kind: cmd.kind,
            })
            .await?;

        // 4. Resolve (ou cria) a fatura de cada parcela e grava a alocação
        let mut allocations = Vec::with_capacity(cmd.entries.len());
        let mut touched: Vec<i64> = Vec::new();
        let mut created: Vec<(BillingMonth, i64)> = Vec::new();

        for entry in &cmd.entries {
            let invoice_id = match &entry.target {
                AllocationTarget::Existing { invoice_id } => {
                    let available = outstanding.entry(*invoice_id).or_insert(0);
                    if entry.amount > *available {
                        return Err(AppError::OverAllocated {
                            entity: "fatura",
                            id: *invoice_id,
                            available: (*available).max(0),
                            requested: entry.amount,
                        });
                    }
                    *available -= entry.amount;
                    *invoice_id
                }
                AllocationTarget::New { kind, billing_month, due_date, due_total } => {
                    if let Some(occupied) = tx.find_invoice_by_month(contract.id, *billing_month).await? {
                        tracing::warn!(
                            "⚠️ Contrato {} já possui a fatura {} em {}",
                            contract.id, occupied.id, billing_month
                        );
                        return Err(AppError::MonthCollision {
                            contract_id: contract.id,
                            billing_month: *billing_month,
                            invoice_ids: vec![occupied.id],
                        });
                    }

                    let amount = due_total.unwrap_or(entry.amount);
                    let due_date = match due_date {
                        Some(date) => *date,
                        None => contract.due_date_for(*billing_month)?,
                    };
                    let invoice = tx
                        .insert_invoice(&NewInvoice {
                            contract_id: contract.id,
                            kind: *kind,
                            billing_month: *billing_month,
                            due_date: Some(due_date),
                            amount,
                            status: InvoiceStatus::derive(entry.amount, amount),
                        })
                        .await?;

                    tracing::debug!("Fatura avulsa {} criada em {}", invoice.id, billing_month);
                    created.push((*billing_month, invoice.id));
                    invoice.id
                }
            };

            let allocation = tx.insert_allocation(payment.id, invoice_id, entry.amount).await?;
            allocations.push(allocation);

            if !touched.contains(&invoice_id) {
                touched.push(invoice_id);
            }
        }

        // 5. Recalcula o status de cada fatura tocada
        let mut invoices = Vec::with_capacity(touched.len());
        for invoice_id in touched {
            invoices.push(recompute_status(tx.as_mut(), invoice_id).await?);
        }

        // 6. Commit (a unicidade por competência é conferida aqui pelo banco)
        tx.commit().await.map_err(|err| match created.first() {
            Some((month, invoice_id)) => err.or_month_collision(contract.id, *month, vec![*invoice_id]),
            None => err,
        })?;

        let allocated: i64 = allocations.iter().map(|a| a.amount).sum();
        tracing::info!(
            "💰 Pagamento {} registrado no contrato {}: {} alocado de {} em {} fatura(s)",
            payment.id, contract.id, allocated, payment.amount, invoices.len()
        );

        Ok(PaymentReceipt { payment, allocations, invoices })
    }

    /// Concilia parte do saldo de um pagamento já registrado com uma fatura.
    pub async fn match_payment(
        &self,
        payment_id: i64,
        invoice_id: i64,
        amount: i64,
    ) -> Result<MatchReceipt, AppError> {
        if amount <= 0 {
            return Err(AppError::InvalidInput(format!(
                "valor da conciliação deve ser positivo (recebido {})",
                amount
            )));
        }

        let mut tx = self.store.begin().await?;

        // Fatura antes do pagamento: mesma ordem de travas da exclusão de faturas
        let invoice = tx
            .lock_invoice(invoice_id)
            .await?
            .ok_or(AppError::InvoiceNotFound(invoice_id))?;
        let payment = tx
            .lock_payment(payment_id)
            .await?
            .ok_or(AppError::PaymentNotFound(payment_id))?;

        if invoice.contract_id != payment.contract_id {
            return Err(AppError::ContractMismatch {
                invoice_id,
                invoice_contract_id: invoice.contract_id,
                contract_id: payment.contract_id,
            });
        }

        let payment_available = payment.amount - tx.allocated_from_payment(payment_id).await?;
        if amount > payment_available {
            return Err(AppError::OverAllocated {
                entity: "pagamento",
                id: payment_id,
                available: payment_available.max(0),
                requested: amount,
            });
        }

        let invoice_available = invoice.amount - tx.allocated_to_invoice(invoice_id).await?;
        if amount > invoice_available {
            return Err(AppError::OverAllocated {
                entity: "fatura",
                id: invoice_id,
                available: invoice_available.max(0),
                requested: amount,
            });
        }

        let allocation = tx.insert_allocation(payment_id, invoice_id, amount).await?;
        let invoice = recompute_status(tx.as_mut(), invoice_id).await?;

        tx.commit().await?;

        tracing::info!(
            "🔗 Pagamento {} conciliado com a fatura {} ({}), status {:?}",
            payment_id, invoice_id, amount, invoice.status
        );

        Ok(MatchReceipt {
            allocation,
            invoice,
            payment_remaining: payment_available - amount,
        })
    }

    /// Registra vários pagamentos sem alocação (ex.: importação de extrato), tudo ou nada.
    pub async fn record_payments(&self, payments: Vec<NewPayment>) -> Result<Vec<Payment>, AppError> {
        if payments.is_empty() {
            return Err(AppError::InvalidInput("nenhum pagamento informado".into()));
        }
        if let Some(bad) = payments.iter().find(|p| p.amount <= 0) {
            return Err(AppError::InvalidInput(format!(
                "valor do pagamento deve ser positivo (recebido {} no contrato {})",
                bad.amount, bad.contract_id
            )));
        }

        let mut tx = self.store.begin().await?;

        let mut known_contracts: Vec<i64> = Vec::new();
        let mut recorded = Vec::with_capacity(payments.len());

        for new in &payments {
            if !known_contracts.contains(&new.contract_id) {
                tx.find_contract(new.contract_id)
                    .await?
                    .ok_or(AppError::ContractNotFound(new.contract_id))?;
                known_contracts.push(new.contract_id);
            }
            recorded.push(tx.insert_payment(new).await?);
        }

        tx.commit().await?;

        tracing::info!("📥 {} pagamento(s) registrados em lote", recorded.len());
        Ok(recorded)
    }
}

fn validate_allocation(cmd: &AllocatePayment) -> Result<(), AppError> {
    if cmd.amount <= 0 {
        return Err(AppError::InvalidInput(format!(
            "valor do pagamento deve ser positivo (recebido {})",
            cmd.amount
        )));
    }

    let mut total: i64 = 0;
    for entry in &cmd.entries {
        if entry.amount <= 0 {
            return Err(AppError::InvalidInput(format!(
                "valor de cada alocação deve ser positivo (recebido {})",
                entry.amount
            )));
        }
        if let AllocationTarget::New { due_total: Some(due_total), billing_month, .. } = &entry.target {
            if *due_total < entry.amount {
                return Err(AppError::InvalidInput(format!(
                    "total devido da nova fatura {} ({}) é menor que a parcela alocada ({})",
                    billing_month, due_total, entry.amount
                )));
            }
        }
        total = total
            .checked_add(entry.amount)
            .ok_or_else(|| AppError::InvalidInput("soma das alocações estoura o limite".into()))?;
    }

    if total > cmd.amount {
        return Err(AppError::InvalidInput(format!(
            "alocações somam {} e excedem o pagamento de {}",
            total, cmd.amount
        )));
    }

    Ok(())
}

// src/db/billing_repo.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, Transaction};

use crate::{
    common::error::AppError,
    db::store::{BillingStore, BillingTx},
    models::{
        billing::{
            Allocation, CallerRole, ContractTerms, Invoice, InvoiceDetail, InvoiceStatus,
            LedgerRow, LedgerScope, MatchedPayment, NewInvoice, NewPayment, Payment,
            UnallocatedPayment,
        },
        billing_month::BillingMonth,
    },
};

#[derive(Clone)]
pub struct PgBillingStore {
    pool: PgPool,
}

impl PgBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn role_token(role: CallerRole) -> &'static str {
    match role {
        CallerRole::Admin => "admin",
        CallerRole::Landlord => "landlord",
        CallerRole::Tenant => "tenant",
    }
}

#[async_trait]
impl BillingStore for PgBillingStore {
    async fn begin(&self) -> Result<Box<dyn BillingTx>, AppError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgBillingTx { tx }))
    }

    async fn contract_exists(&self, contract_id: i64) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM contracts WHERE id = $1)")
            .bind(contract_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }

    // =========================================================================
    //  LEDGER (visão de relatório, somente leitura)
    // =========================================================================

    async fn query_ledger(&self, scope: &LedgerScope) -> Result<Vec<LedgerRow>, AppError> {
        // O escopo do papel e os filtros entram como parâmetros; nada é interpolado no SQL.
        let mut rows = sqlx::query_as::<_, LedgerRow>(
            r#"
            SELECT
                l.id AS landlord_id,
                l.nickname AS landlord_name,
                t.id AS tenant_id,
                t.nickname AS tenant_name,
                b.id AS building_id,
                b.name AS building_name,
                c.room_number,
                c.id AS contract_id,
                c.contract_start_date,
                c.payment_type,
                i.id AS invoice_id,
                i.type AS invoice_type,
                i.billing_month,
                i.due_date,
                i.amount AS due_amount,
                COALESCE(agg.paid_amount, 0)::BIGINT AS paid_amount,
                agg.last_paid_date
            FROM invoices i
            JOIN contracts c ON c.id = i.contract_id
            JOIN users t ON t.id = c.tenant_id
            JOIN buildings b ON b.id = c.building_id
            JOIN users l ON l.id = b.owner_id
            LEFT JOIN (
                SELECT
                    pa.invoice_id,
                    SUM(pa.amount) AS paid_amount,
                    MAX(p.paid_at) AS last_paid_date
                FROM payment_allocations pa
                JOIN payments p ON p.id = pa.payment_id
                GROUP BY pa.invoice_id
            ) agg ON agg.invoice_id = i.id
            WHERE (
                    $1::TEXT = 'admin'
                 OR ($1::TEXT = 'landlord' AND b.owner_id = $2)
                 OR ($1::TEXT = 'tenant' AND c.tenant_id = $2)
              )
              AND ($1::TEXT = 'admin' OR t.status <> 'TERMINATED')
              AND ($3::BIGINT IS NULL OR b.owner_id = $3)
              AND ($4::BIGINT IS NULL OR b.id = $4)
              AND ($5::BIGINT IS NULL OR c.tenant_id = $5)
            ORDER BY i.billing_month DESC, i.id DESC
            "#,
        )
            .bind(role_token(scope.role))
            .bind(scope.caller_id)
            .bind(scope.filters.landlord_id)
            .bind(scope.filters.building_id)
            .bind(scope.filters.tenant_id)
            .fetch_all(&self.pool)
            .await?;

        for row in rows.iter_mut() {
            row.status = InvoiceStatus::derive(row.paid_amount, row.due_amount);
        }

        Ok(rows)
    }

    async fn unallocated_payments(&self, contract_id: i64) -> Result<Vec<UnallocatedPayment>, AppError> {
        let payments = sqlx::query_as::<_, UnallocatedPayment>(
            r#"
            SELECT
                p.id, p.contract_id, p.amount, p.paid_at, p.memo, p.type, p.created_at,
                COALESCE(SUM(pa.amount), 0)::BIGINT AS allocated_amount,
                (p.amount - COALESCE(SUM(pa.amount), 0))::BIGINT AS remaining_amount
            FROM payments p
            LEFT JOIN payment_allocations pa ON pa.payment_id = p.id
            WHERE p.contract_id = $1
            GROUP BY p.id
            HAVING p.amount - COALESCE(SUM(pa.amount), 0) > 0
            ORDER BY p.paid_at ASC, p.id ASC
            "#,
        )
            .bind(contract_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(payments)
    }

    async fn contract_billing(&self, contract_id: i64) -> Result<Vec<InvoiceDetail>, AppError> {
        // Snapshot consistente: faturas e alocações lidas no mesmo instante.
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT id, contract_id, type, billing_month, due_date, amount, status, created_at
            FROM invoices
            WHERE contract_id = $1
            ORDER BY billing_month DESC, id DESC
            "#,
        )
            .bind(contract_id)
            .fetch_all(&mut *tx)
            .await?;

        let matched = sqlx::query_as::<_, MatchedPayment>(
            r#"
            SELECT
                pa.invoice_id,
                pa.id AS allocation_id,
                p.id AS payment_id,
                pa.amount AS matched_amount,
                p.amount AS payment_amount,
                p.paid_at,
                p.memo
            FROM payment_allocations pa
            JOIN payments p ON p.id = pa.payment_id
            JOIN invoices i ON i.id = pa.invoice_id
            WHERE i.contract_id = $1
            ORDER BY p.paid_at ASC, pa.id ASC
            "#,
        )
            .bind(contract_id)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        let mut by_invoice: HashMap<i64, Vec<MatchedPayment>> = HashMap::new();
        for m in matched {
            by_invoice.entry(m.invoice_id).or_default().push(m);
        }

        Ok(invoices
            .into_iter()
            .map(|invoice| {
                let payments = by_invoice.remove(&invoice.id).unwrap_or_default();
                let paid_amount = payments.iter().map(|p| p.matched_amount).sum();
                InvoiceDetail { invoice, paid_amount, payments }
            })
            .collect())
    }
}

// Transação viva; se for descartada sem commit, o sqlx faz o rollback no drop.
pub struct PgBillingTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BillingTx for PgBillingTx {
    // =========================================================================
    //  CONTRATOS
    // =========================================================================

    async fn find_contract(&mut self, contract_id: i64) -> Result<Option<ContractTerms>, AppError> {
        let contract = sqlx::query_as::<_, ContractTerms>(
            r#"
            SELECT id, tenant_id, building_id, payment_type, contract_start_date
            FROM contracts
            WHERE id = $1
            "#,
        )
            .bind(contract_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(contract)
    }

    async fn lock_contract(&mut self, contract_id: i64) -> Result<Option<ContractTerms>, AppError> {
        // NO KEY UPDATE não bloqueia as FKs de invoices/payments (KEY SHARE), só outros travadores.
        let contract = sqlx::query_as::<_, ContractTerms>(
            r#"
            SELECT id, tenant_id, building_id, payment_type, contract_start_date
            FROM contracts
            WHERE id = $1
            FOR NO KEY UPDATE
            "#,
        )
            .bind(contract_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(contract)
    }

    // =========================================================================
    //  FATURAS
    // =========================================================================

    async fn find_invoice(&mut self, invoice_id: i64) -> Result<Option<Invoice>, AppError> {
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT id, contract_id, type, billing_month, due_date, amount, status, created_at
            FROM invoices
            WHERE id = $1
            "#,
        )
            .bind(invoice_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(invoice)
    }

    async fn lock_invoice(&mut self, invoice_id: i64) -> Result<Option<Invoice>, AppError> {
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT id, contract_id, type, billing_month, due_date, amount, status, created_at
            FROM invoices
            WHERE id = $1
            FOR UPDATE
            "#,
        )
            .bind(invoice_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(invoice)
    }

    async fn lock_contract_invoices(&mut self, contract_id: i64) -> Result<Vec<Invoice>, AppError> {
        // Ordem por id na trava evita deadlock com outras transações; reordenamos por competência depois.
        let mut invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT id, contract_id, type, billing_month, due_date, amount, status, created_at
            FROM invoices
            WHERE contract_id = $1
            ORDER BY id
            FOR UPDATE
            "#,
        )
            .bind(contract_id)
            .fetch_all(&mut *self.tx)
            .await?;

        invoices.sort_by_key(|i| (i.billing_month, i.id));
        Ok(invoices)
    }

    async fn find_invoice_by_month(
        &mut self,
        contract_id: i64,
        billing_month: BillingMonth,
    ) -> Result<Option<Invoice>, AppError> {
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT id, contract_id, type, billing_month, due_date, amount, status, created_at
            FROM invoices
            WHERE contract_id = $1 AND billing_month = $2
            ORDER BY id
            LIMIT 1
            "#,
        )
            .bind(contract_id)
            .bind(billing_month)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(invoice)
    }

    async fn insert_invoice(&mut self, new: &NewInvoice) -> Result<Invoice, AppError> {
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices (contract_id, type, billing_month, due_date, amount, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, contract_id, type, billing_month, due_date, amount, status, created_at
            "#,
        )
            .bind(new.contract_id)
            .bind(new.kind)
            .bind(new.billing_month)
            .bind(new.due_date)
            .bind(new.amount)
            .bind(new.status)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(invoice)
    }

    async fn set_invoice_status(&mut self, invoice_id: i64, status: InvoiceStatus) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE invoices SET status = $1 WHERE id = $2")
            .bind(status)
            .bind(invoice_id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::InvoiceNotFound(invoice_id));
        }
        Ok(())
    }

    async fn set_billing_month(&mut self, invoice_id: i64, billing_month: BillingMonth) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE invoices SET billing_month = $1 WHERE id = $2")
            .bind(billing_month)
            .bind(invoice_id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::InvoiceNotFound(invoice_id));
        }
        Ok(())
    }

    async fn update_invoice_terms(
        &mut self,
        invoice_id: i64,
        amount: i64,
        due_date: Option<NaiveDate>,
    ) -> Result<Invoice, AppError> {
        sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET amount = $1, due_date = $2
            WHERE id = $3
            RETURNING id, contract_id, type, billing_month, due_date, amount, status, created_at
            "#,
        )
            .bind(amount)
            .bind(due_date)
            .bind(invoice_id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(AppError::InvoiceNotFound(invoice_id))
    }

    async fn delete_invoice(&mut self, invoice_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM invoices WHERE id = $1")
            .bind(invoice_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    //  PAGAMENTOS
    // =========================================================================

    async fn lock_payment(&mut self, payment_id: i64) -> Result<Option<Payment>, AppError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, contract_id, amount, paid_at, memo, type, created_at
            FROM payments
            WHERE id = $1
            FOR UPDATE
            "#,
        )
            .bind(payment_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(payment)
    }

    async fn insert_payment(&mut self, new: &NewPayment) -> Result<Payment, AppError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (contract_id, amount, paid_at, memo, type)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, contract_id, amount, paid_at, memo, type, created_at
            "#,
        )
            .bind(new.contract_id)
            .bind(new.amount)
            .bind(new.paid_at)
            .bind(new.memo.as_deref())
            .bind(new.kind)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(payment)
    }

    async fn delete_payment(&mut self, payment_id: i64) -> Result<(), AppError> {
        sqlx::query("DELETE FROM payments WHERE id = $1")
            .bind(payment_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    // =========================================================================
    //  ALOCAÇÕES
    // =========================================================================

    async fn insert_allocation(
        &mut self,
        payment_id: i64,
        invoice_id: i64,
        amount: i64,
    ) -> Result<Allocation, AppError> {
        let allocation = sqlx::query_as::<_, Allocation>(
            r#"
            INSERT INTO payment_allocations (payment_id, invoice_id, amount)
            VALUES ($1, $2, $3)
            RETURNING id, payment_id, invoice_id, amount
            "#,
        )
            .bind(payment_id)
            .bind(invoice_id)
            .bind(amount)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(allocation)
    }

    async fn allocated_to_invoice(&mut self, invoice_id: i64) -> Result<i64, AppError> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM payment_allocations WHERE invoice_id = $1",
        )
            .bind(invoice_id)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(total)
    }

    async fn allocated_from_payment(&mut self, payment_id: i64) -> Result<i64, AppError> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM payment_allocations WHERE payment_id = $1",
        )
            .bind(payment_id)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(total)
    }

    async fn payment_ids_for_invoice(&mut self, invoice_id: i64) -> Result<Vec<i64>, AppError> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT DISTINCT payment_id FROM payment_allocations WHERE invoice_id = $1 ORDER BY payment_id",
        )
            .bind(invoice_id)
            .fetch_all(&mut *self.tx)
            .await?;

        Ok(ids)
    }

    async fn delete_allocations_for_invoice(&mut self, invoice_id: i64) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM payment_allocations WHERE invoice_id = $1")
            .bind(invoice_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn count_allocations_for_payment(&mut self, payment_id: i64) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM payment_allocations WHERE payment_id = $1",
        )
            .bind(payment_id)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(count)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }
}

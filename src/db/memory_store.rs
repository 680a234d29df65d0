// src/db/memory_store.rs

use std::{
    borrow::Cow,
    collections::{BTreeMap, HashMap, HashSet},
    error::Error as StdError,
    fmt,
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    common::error::{AppError, MONTH_UNIQUE_CONSTRAINT},
    db::store::{BillingStore, BillingTx},
    models::{
        billing::{
            Allocation, CallerRole, ContractTerms, Invoice, InvoiceDetail, InvoiceStatus,
            InvoiceType, LedgerRow, LedgerScope, MatchedPayment, NewInvoice, NewPayment,
            Payment, PaymentCadence, TenantStatus, UnallocatedPayment,
        },
        billing_month::BillingMonth,
    },
};

/// Pontos onde o armazenamento em memória pode simular uma falha de banco.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    InsertPayment,
    InsertAllocation,
    SetInvoiceStatus,
    SetBillingMonth,
    DeleteInvoice,
    DeletePayment,
    Commit,
}

#[derive(Debug, Clone)]
struct MemoryUser {
    nickname: String,
    status: TenantStatus,
}

#[derive(Debug, Clone)]
struct MemoryBuilding {
    owner_id: i64,
    name: String,
}

#[derive(Debug, Clone)]
struct MemoryContract {
    terms: ContractTerms,
    room_number: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    last_id: i64,
    users: BTreeMap<i64, MemoryUser>,
    buildings: BTreeMap<i64, MemoryBuilding>,
    contracts: BTreeMap<i64, MemoryContract>,
    invoices: BTreeMap<i64, Invoice>,
    payments: BTreeMap<i64, Payment>,
    allocations: BTreeMap<i64, Allocation>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn allocated_to_invoice(&self, invoice_id: i64) -> i64 {
        self.allocations
            .values()
            .filter(|a| a.invoice_id == invoice_id)
            .map(|a| a.amount)
            .sum()
    }

    fn allocated_from_payment(&self, payment_id: i64) -> i64 {
        self.allocations
            .values()
            .filter(|a| a.payment_id == payment_id)
            .map(|a| a.amount)
            .sum()
    }

    // Equivalente à constraint UNIQUE (contract_id, billing_month) DEFERRABLE.
    fn check_unique_months(&self) -> Result<(), AppError> {
        let mut seen: HashSet<(i64, BillingMonth)> = HashSet::new();
        for invoice in self.invoices.values() {
            if !seen.insert((invoice.contract_id, invoice.billing_month)) {
                let violation = UniqueViolation {
                    constraint: MONTH_UNIQUE_CONSTRAINT,
                    message: format!(
                        "duplicate key value violates unique constraint \"{}\" ({}, {})",
                        MONTH_UNIQUE_CONSTRAINT, invoice.contract_id, invoice.billing_month
                    ),
                };
                return Err(AppError::DatabaseError(sqlx::Error::Database(Box::new(violation))));
            }
        }
        Ok(())
    }
}

/// Violação de unicidade no mesmo formato que o driver do Postgres entrega (SQLSTATE 23505).
#[derive(Debug)]
struct UniqueViolation {
    constraint: &'static str,
    message: String,
}

impl fmt::Display for UniqueViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for UniqueViolation {}

impl sqlx::error::DatabaseError for UniqueViolation {
    fn message(&self) -> &str {
        &self.message
    }

    fn code(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed("23505"))
    }

    fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self
    }

    fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
        self
    }

    fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
        self
    }

    fn constraint(&self) -> Option<&str> {
        Some(self.constraint)
    }

    fn kind(&self) -> sqlx::error::ErrorKind {
        sqlx::error::ErrorKind::UniqueViolation
    }
}

fn storage_error(message: String) -> AppError {
    AppError::DatabaseError(sqlx::Error::Protocol(message))
}

fn check_positive(table: &str, amount: i64) -> Result<(), AppError> {
    if amount <= 0 {
        return Err(storage_error(format!(
            "new row for relation \"{}\" violates check constraint (amount > 0)",
            table
        )));
    }
    Ok(())
}

/// Armazenamento em memória com a mesma semântica transacional do Postgres:
/// uma transação segura o estado inteiro (serializa escritas) e só publica no commit.
#[derive(Clone, Default)]
pub struct MemoryBillingStore {
    state: Arc<Mutex<MemoryState>>,
    fail_points: Arc<Mutex<HashSet<FailPoint>>>,
}

impl MemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_on(&self, point: FailPoint) {
        self.fail_points.lock().await.insert(point);
    }

    // =========================================================================
    //  PROVISIONAMENTO (papel dos colaboradores externos)
    // =========================================================================

    pub async fn add_user(&self, nickname: &str, status: TenantStatus) -> i64 {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.users.insert(id, MemoryUser { nickname: nickname.to_string(), status });
        id
    }

    pub async fn set_user_status(&self, user_id: i64, status: TenantStatus) {
        if let Some(user) = self.state.lock().await.users.get_mut(&user_id) {
            user.status = status;
        }
    }

    pub async fn add_building(&self, owner_id: i64, name: &str) -> i64 {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.buildings.insert(id, MemoryBuilding { owner_id, name: name.to_string() });
        id
    }

    pub async fn add_contract(
        &self,
        tenant_id: i64,
        building_id: i64,
        payment_type: PaymentCadence,
        contract_start_date: NaiveDate,
        room_number: Option<&str>,
    ) -> i64 {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.contracts.insert(
            id,
            MemoryContract {
                terms: ContractTerms {
                    id,
                    tenant_id,
                    building_id,
                    payment_type,
                    contract_start_date,
                },
                room_number: room_number.map(str::to_string),
            },
        );
        id
    }

    /// Fatura criada na montagem do contrato (fora do núcleo), sempre em aberto.
    pub async fn add_invoice(
        &self,
        contract_id: i64,
        kind: InvoiceType,
        billing_month: BillingMonth,
        amount: i64,
    ) -> Invoice {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let invoice = Invoice {
            id,
            contract_id,
            kind,
            billing_month,
            due_date: None,
            amount,
            status: InvoiceStatus::Unpaid,
            created_at: Utc::now(),
        };
        state.invoices.insert(id, invoice.clone());
        invoice
    }

    // =========================================================================
    //  INSPEÇÃO
    // =========================================================================

    pub async fn invoice(&self, invoice_id: i64) -> Option<Invoice> {
        self.state.lock().await.invoices.get(&invoice_id).cloned()
    }

    pub async fn payment(&self, payment_id: i64) -> Option<Payment> {
        self.state.lock().await.payments.get(&payment_id).cloned()
    }

    pub async fn payments(&self) -> Vec<Payment> {
        self.state.lock().await.payments.values().cloned().collect()
    }

    pub async fn invoices(&self) -> Vec<Invoice> {
        self.state.lock().await.invoices.values().cloned().collect()
    }

    pub async fn allocations(&self) -> Vec<Allocation> {
        self.state.lock().await.allocations.values().cloned().collect()
    }
}

#[async_trait]
impl BillingStore for MemoryBillingStore {
    async fn begin(&self) -> Result<Box<dyn BillingTx>, AppError> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        let fail_points = self.fail_points.lock().await.clone();

        Ok(Box::new(MemoryBillingTx { guard, working, fail_points }))
    }

    async fn contract_exists(&self, contract_id: i64) -> Result<bool, AppError> {
        Ok(self.state.lock().await.contracts.contains_key(&contract_id))
    }

    async fn query_ledger(&self, scope: &LedgerScope) -> Result<Vec<LedgerRow>, AppError> {
        let state = self.state.lock().await;

        let mut rows = Vec::new();
        for invoice in state.invoices.values() {
            let Some(contract) = state.contracts.get(&invoice.contract_id) else { continue };
            let terms = &contract.terms;
            let (Some(tenant), Some(building)) =
                (state.users.get(&terms.tenant_id), state.buildings.get(&terms.building_id))
            else {
                continue;
            };
            let Some(landlord) = state.users.get(&building.owner_id) else { continue };

            let in_role = match scope.role {
                CallerRole::Admin => true,
                CallerRole::Landlord => building.owner_id == scope.caller_id,
                CallerRole::Tenant => terms.tenant_id == scope.caller_id,
            };
            if !in_role {
                continue;
            }
            if scope.role != CallerRole::Admin && tenant.status == TenantStatus::Terminated {
                continue;
            }

            let filters = &scope.filters;
            if filters.landlord_id.is_some_and(|id| id != building.owner_id)
                || filters.building_id.is_some_and(|id| id != terms.building_id)
                || filters.tenant_id.is_some_and(|id| id != terms.tenant_id)
            {
                continue;
            }

            let matched: Vec<(&Allocation, &Payment)> = state
                .allocations
                .values()
                .filter(|a| a.invoice_id == invoice.id)
                .filter_map(|a| state.payments.get(&a.payment_id).map(|p| (a, p)))
                .collect();
            let paid_amount: i64 = matched.iter().map(|(a, _)| a.amount).sum();
            let last_paid_date = matched.iter().map(|(_, p)| p.paid_at).max();

            rows.push(LedgerRow {
                landlord_id: building.owner_id,
                landlord_name: landlord.nickname.clone(),
                tenant_id: terms.tenant_id,
                tenant_name: tenant.nickname.clone(),
                building_id: terms.building_id,
                building_name: building.name.clone(),
                room_number: contract.room_number.clone(),
                contract_id: terms.id,
                contract_start_date: terms.contract_start_date,
                payment_type: terms.payment_type,
                invoice_id: invoice.id,
                invoice_type: invoice.kind,
                billing_month: invoice.billing_month,
                due_date: invoice.due_date,
                due_amount: invoice.amount,
                paid_amount,
                last_paid_date,
                status: InvoiceStatus::derive(paid_amount, invoice.amount),
            });
        }

        rows.sort_by(|a, b| {
            b.billing_month
                .cmp(&a.billing_month)
                .then_with(|| b.invoice_id.cmp(&a.invoice_id))
        });
        Ok(rows)
    }

    async fn unallocated_payments(&self, contract_id: i64) -> Result<Vec<UnallocatedPayment>, AppError> {
        let state = self.state.lock().await;

        let mut payments: Vec<UnallocatedPayment> = state
            .payments
            .values()
            .filter(|p| p.contract_id == contract_id)
            .filter_map(|p| {
                let allocated_amount = state.allocated_from_payment(p.id);
                let remaining_amount = p.amount - allocated_amount;
                (remaining_amount > 0).then(|| UnallocatedPayment {
                    payment: p.clone(),
                    allocated_amount,
                    remaining_amount,
                })
            })
            .collect();

        payments.sort_by_key(|u| (u.payment.paid_at, u.payment.id));
        Ok(payments)
    }

    async fn contract_billing(&self, contract_id: i64) -> Result<Vec<InvoiceDetail>, AppError> {
        let state = self.state.lock().await;

        let mut by_invoice: HashMap<i64, Vec<MatchedPayment>> = HashMap::new();
        for allocation in state.allocations.values() {
            let Some(payment) = state.payments.get(&allocation.payment_id) else { continue };
            by_invoice.entry(allocation.invoice_id).or_default().push(MatchedPayment {
                invoice_id: allocation.invoice_id,
                allocation_id: allocation.id,
                payment_id: payment.id,
                matched_amount: allocation.amount,
                payment_amount: payment.amount,
                paid_at: payment.paid_at,
                memo: payment.memo.clone(),
            });
        }

        let mut invoices: Vec<&Invoice> = state
            .invoices
            .values()
            .filter(|i| i.contract_id == contract_id)
            .collect();
        invoices.sort_by(|a, b| b.billing_month.cmp(&a.billing_month).then_with(|| b.id.cmp(&a.id)));

        Ok(invoices
            .into_iter()
            .map(|invoice| {
                let mut payments = by_invoice.remove(&invoice.id).unwrap_or_default();
                payments.sort_by_key(|p| (p.paid_at, p.allocation_id));
                let paid_amount = payments.iter().map(|p| p.matched_amount).sum();
                InvoiceDetail { invoice: invoice.clone(), paid_amount, payments }
            })
            .collect())
    }
}

pub struct MemoryBillingTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_points: HashSet<FailPoint>,
}

impl MemoryBillingTx {
    fn check(&self, point: FailPoint) -> Result<(), AppError> {
        if self.fail_points.contains(&point) {
            return Err(storage_error(format!("falha injetada em {:?}", point)));
        }
        Ok(())
    }
}

#[async_trait]
impl BillingTx for MemoryBillingTx {
    async fn find_contract(&mut self, contract_id: i64) -> Result<Option<ContractTerms>, AppError> {
        Ok(self.working.contracts.get(&contract_id).map(|c| c.terms.clone()))
    }

    async fn lock_contract(&mut self, contract_id: i64) -> Result<Option<ContractTerms>, AppError> {
        self.find_contract(contract_id).await
    }

    async fn find_invoice(&mut self, invoice_id: i64) -> Result<Option<Invoice>, AppError> {
        Ok(self.working.invoices.get(&invoice_id).cloned())
    }

    async fn lock_invoice(&mut self, invoice_id: i64) -> Result<Option<Invoice>, AppError> {
        self.find_invoice(invoice_id).await
    }

    async fn lock_contract_invoices(&mut self, contract_id: i64) -> Result<Vec<Invoice>, AppError> {
        let mut invoices: Vec<Invoice> = self
            .working
            .invoices
            .values()
            .filter(|i| i.contract_id == contract_id)
            .cloned()
            .collect();
        invoices.sort_by_key(|i| (i.billing_month, i.id));
        Ok(invoices)
    }

    async fn find_invoice_by_month(
        &mut self,
        contract_id: i64,
        billing_month: BillingMonth,
    ) -> Result<Option<Invoice>, AppError> {
        Ok(self
            .working
            .invoices
            .values()
            .find(|i| i.contract_id == contract_id && i.billing_month == billing_month)
            .cloned())
    }

    async fn insert_invoice(&mut self, new: &NewInvoice) -> Result<Invoice, AppError> {
        check_positive("invoices", new.amount)?;
        if !self.working.contracts.contains_key(&new.contract_id) {
            return Err(storage_error("invoices_contract_id_fkey".into()));
        }

        let id = self.working.next_id();
        let invoice = Invoice {
            id,
            contract_id: new.contract_id,
            kind: new.kind,
            billing_month: new.billing_month,
            due_date: new.due_date,
            amount: new.amount,
            status: new.status,
            created_at: Utc::now(),
        };
        self.working.invoices.insert(id, invoice.clone());
        Ok(invoice)
    }

    async fn set_invoice_status(&mut self, invoice_id: i64, status: InvoiceStatus) -> Result<(), AppError> {
        self.check(FailPoint::SetInvoiceStatus)?;
        let invoice = self
            .working
            .invoices
            .get_mut(&invoice_id)
            .ok_or(AppError::InvoiceNotFound(invoice_id))?;
        invoice.status = status;
        Ok(())
    }

    async fn set_billing_month(&mut self, invoice_id: i64, billing_month: BillingMonth) -> Result<(), AppError> {
        self.check(FailPoint::SetBillingMonth)?;
        let invoice = self
            .working
            .invoices
            .get_mut(&invoice_id)
            .ok_or(AppError::InvoiceNotFound(invoice_id))?;
        invoice.billing_month = billing_month;
        Ok(())
    }

    async fn update_invoice_terms(
        &mut self,
        invoice_id: i64,
        amount: i64,
        due_date: Option<NaiveDate>,
    ) -> Result<Invoice, AppError> {
        check_positive("invoices", amount)?;
        let invoice = self
            .working
            .invoices
            .get_mut(&invoice_id)
            .ok_or(AppError::InvoiceNotFound(invoice_id))?;
        invoice.amount = amount;
        invoice.due_date = due_date;
        Ok(invoice.clone())
    }

    async fn delete_invoice(&mut self, invoice_id: i64) -> Result<bool, AppError> {
        self.check(FailPoint::DeleteInvoice)?;
        if self.working.allocations.values().any(|a| a.invoice_id == invoice_id) {
            return Err(storage_error("payment_allocations_invoice_id_fkey".into()));
        }
        Ok(self.working.invoices.remove(&invoice_id).is_some())
    }

    async fn lock_payment(&mut self, payment_id: i64) -> Result<Option<Payment>, AppError> {
        Ok(self.working.payments.get(&payment_id).cloned())
    }

    async fn insert_payment(&mut self, new: &NewPayment) -> Result<Payment, AppError> {
        self.check(FailPoint::InsertPayment)?;
        check_positive("payments", new.amount)?;
        if !self.working.contracts.contains_key(&new.contract_id) {
            return Err(storage_error("payments_contract_id_fkey".into()));
        }

        let id = self.working.next_id();
        let payment = Payment {
            id,
            contract_id: new.contract_id,
            amount: new.amount,
            paid_at: new.paid_at,
            memo: new.memo.clone(),
            kind: new.kind,
            created_at: Utc::now(),
        };
        self.working.payments.insert(id, payment.clone());
        Ok(payment)
    }

    async fn delete_payment(&mut self, payment_id: i64) -> Result<(), AppError> {
        self.check(FailPoint::DeletePayment)?;
        if self.working.allocations.values().any(|a| a.payment_id == payment_id) {
            return Err(storage_error("payment_allocations_payment_id_fkey".into()));
        }
        self.working.payments.remove(&payment_id);
        Ok(())
    }

    async fn insert_allocation(
        &mut self,
        payment_id: i64,
        invoice_id: i64,
        amount: i64,
    ) -> Result<Allocation, AppError> {
        self.check(FailPoint::InsertAllocation)?;
        check_positive("payment_allocations", amount)?;
        if !self.working.payments.contains_key(&payment_id) {
            return Err(storage_error("payment_allocations_payment_id_fkey".into()));
        }
        if !self.working.invoices.contains_key(&invoice_id) {
            return Err(storage_error("payment_allocations_invoice_id_fkey".into()));
        }

        let id = self.working.next_id();
        let allocation = Allocation { id, payment_id, invoice_id, amount };
        self.working.allocations.insert(id, allocation.clone());
        Ok(allocation)
    }

    async fn allocated_to_invoice(&mut self, invoice_id: i64) -> Result<i64, AppError> {
        Ok(self.working.allocated_to_invoice(invoice_id))
    }

    async fn allocated_from_payment(&mut self, payment_id: i64) -> Result<i64, AppError> {
        Ok(self.working.allocated_from_payment(payment_id))
    }

    async fn payment_ids_for_invoice(&mut self, invoice_id: i64) -> Result<Vec<i64>, AppError> {
        let mut ids: Vec<i64> = self
            .working
            .allocations
            .values()
            .filter(|a| a.invoice_id == invoice_id)
            .map(|a| a.payment_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn delete_allocations_for_invoice(&mut self, invoice_id: i64) -> Result<u64, AppError> {
        let before = self.working.allocations.len();
        self.working.allocations.retain(|_, a| a.invoice_id != invoice_id);
        Ok((before - self.working.allocations.len()) as u64)
    }

    async fn count_allocations_for_payment(&mut self, payment_id: i64) -> Result<i64, AppError> {
        Ok(self
            .working
            .allocations
            .values()
            .filter(|a| a.payment_id == payment_id)
            .count() as i64)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.check(FailPoint::Commit)?;
        self.working.check_unique_months()?;

        let MemoryBillingTx { mut guard, working, .. } = *self;
        *guard = working;
        Ok(())
    }
}

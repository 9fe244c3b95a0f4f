//! Installment plans and the ledger that keeps a sale, its plan and the
//! plan's installments agreeing on how much has been paid.
//!
//! The installment rows are the source of truth: plan totals are the sum of
//! their `amount_paid`, and the sale's `amount_paid` is the down payment plus
//! the plan total. Every payment writes all three in one batch, and
//! [`reconcile`] repairs records that have drifted apart anyway.

use std::collections::HashMap;

use chrono::{Days, Months, NaiveDate};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{LedgerError, Result};
use crate::models::{
    round2, Allocation, Frequency, Installment, InstallmentPlan, InstallmentStatus, Payment, PaymentMethod,
    PaymentStatus, PaymentType, PlanStatus, Sale, EPSILON,
};
use crate::query::{self, Direction, Op, Query};
use crate::repo::{self, Entity};
use crate::store::{DocumentStore, WriteOp};

#[derive(Debug, Clone)]
pub struct PlanTerms {
    pub down_payment: f64,
    pub count: u32,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
}

/// Due date of the installment `k` periods after `start` (k = 0 is `start`).
/// Monthly steps clamp to the end of shorter months.
pub fn due_date(start: NaiveDate, frequency: Frequency, k: u32) -> Result<NaiveDate> {
    let due = match frequency {
        Frequency::Weekly => start.checked_add_days(Days::new(7 * k as u64)),
        Frequency::Biweekly => start.checked_add_days(Days::new(14 * k as u64)),
        Frequency::Monthly => start.checked_add_months(Months::new(k)),
    };
    due.ok_or_else(|| LedgerError::invalid("installment schedule runs past the calendar"))
}

/// Equal cent-rounded parts; the last one absorbs the remainder.
pub fn split_amount(financed: f64, count: u32) -> Result<Vec<f64>> {
    if count == 0 {
        return Err(LedgerError::invalid("a plan needs at least one installment"));
    }
    let base = round2(financed / count as f64);
    let head = round2(base * (count - 1) as f64);
    let last = round2(financed - head);
    if last < 0.0 || (count > 1 && base <= 0.0) {
        return Err(LedgerError::invalid(format!(
            "{financed:.2} cannot be split into {count} installments"
        )));
    }
    let mut parts = vec![base; count as usize - 1];
    parts.push(last);
    Ok(parts)
}

pub fn schedule(store: &dyn DocumentStore, plan_id: &str) -> Result<Vec<Installment>> {
    let q = Query::new(Installment::COLLECTION)
        .filter("plan_id", Op::Eq, plan_id)
        .order_by("sequence", Direction::Asc);
    query::run_as(store, &q)
}

pub fn create_plan(
    store: &dyn DocumentStore,
    sale_id: &str,
    terms: PlanTerms,
    today: NaiveDate,
) -> Result<(InstallmentPlan, Vec<Installment>)> {
    let mut sale: Sale = repo::load(store, sale_id)?;
    if sale.voided {
        return Err(LedgerError::invalid(format!("sale {} is voided", sale.number)));
    }
    if sale.installment_plan_id.is_some() {
        return Err(LedgerError::invalid(format!("sale {} already has a plan", sale.number)));
    }
    let down = round2(terms.down_payment);
    if !down.is_finite() || down < 0.0 || down >= sale.total - EPSILON {
        return Err(LedgerError::invalid(format!(
            "down payment must be at least 0 and below the sale total of {:.2}",
            sale.total
        )));
    }
    if down + EPSILON < sale.amount_paid {
        return Err(LedgerError::invalid(format!(
            "down payment cannot be less than the {:.2} already paid",
            sale.amount_paid
        )));
    }

    let financed = round2(sale.total - down);
    let parts = split_amount(financed, terms.count)?;

    let plan = InstallmentPlan {
        id: uuid::Uuid::new_v4().to_string(),
        sale_id: sale.id.clone(),
        customer_id: sale.customer_id.clone(),
        total_amount: financed,
        down_payment: down,
        installment_count: terms.count,
        frequency: terms.frequency,
        start_date: terms.start_date,
        amount_paid: 0.0,
        remaining_balance: financed,
        status: PlanStatus::Active,
    };

    let mut installments = Vec::with_capacity(parts.len());
    for (k, amount) in parts.into_iter().enumerate() {
        installments.push(Installment {
            id: uuid::Uuid::new_v4().to_string(),
            plan_id: plan.id.clone(),
            sale_id: sale.id.clone(),
            sequence: k as u32 + 1,
            due_date: due_date(terms.start_date, terms.frequency, k as u32)?,
            amount,
            amount_paid: 0.0,
            status: InstallmentStatus::Pending,
            paid_date: None,
        });
    }

    let top_up = round2(down - sale.amount_paid);
    sale.payment_type = PaymentType::Installment;
    sale.installment_plan_id = Some(plan.id.clone());
    sale.amount_paid = down;
    sale.balance = financed;
    sale.payment_status = PaymentStatus::derive(sale.total, down);

    let mut ops = vec![repo::set_op(&sale)?, repo::set_op(&plan)?];
    for inst in &installments {
        ops.push(repo::set_op(inst)?);
    }
    if top_up > EPSILON {
        let mut payment = Payment::new(today, top_up, PaymentMethod::Cash);
        payment.sale_id = Some(sale.id.clone());
        payment.party_id = sale.customer_id.clone();
        payment.note = Some("down payment".to_string());
        ops.push(repo::set_op(&payment)?);
    }
    store.commit(ops)?;

    info!(
        sale = %sale.number,
        plan = %plan.id,
        financed,
        count = terms.count,
        "installment plan created"
    );
    Ok((plan, installments))
}

#[derive(Debug)]
pub struct PaymentOutcome {
    pub payment: Payment,
    pub plan: InstallmentPlan,
    pub sale: Sale,
    pub touched: Vec<Installment>,
}

/// Pay towards a plan, starting with its earliest unsettled installment.
pub fn pay_plan(
    store: &dyn DocumentStore,
    plan_id: &str,
    amount: f64,
    date: NaiveDate,
    method: PaymentMethod,
) -> Result<PaymentOutcome> {
    let plan: InstallmentPlan = repo::load(store, plan_id)?;
    apply_payment(store, plan, None, amount, date, method)
}

/// Pay a specific installment; any excess spills into the rest of the plan.
pub fn pay_installment(
    store: &dyn DocumentStore,
    installment_id: &str,
    amount: f64,
    date: NaiveDate,
    method: PaymentMethod,
) -> Result<PaymentOutcome> {
    let inst: Installment = repo::load(store, installment_id)?;
    let plan: InstallmentPlan = repo::load(store, &inst.plan_id)?;
    apply_payment(store, plan, Some(installment_id), amount, date, method)
}

fn apply_payment(
    store: &dyn DocumentStore,
    mut plan: InstallmentPlan,
    target: Option<&str>,
    amount: f64,
    date: NaiveDate,
    method: PaymentMethod,
) -> Result<PaymentOutcome> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(LedgerError::invalid("payment amount must be positive"));
    }
    if plan.status == PlanStatus::Completed {
        return Err(LedgerError::invalid("plan is already paid off"));
    }
    let amount = round2(amount);
    let mut installments = schedule(store, &plan.id)?;
    let outstanding = round2(installments.iter().map(|i| i.remaining()).sum());
    if amount > outstanding + EPSILON {
        return Err(LedgerError::Overpayment {
            amount,
            balance: outstanding,
        });
    }

    // Target first, then every other unsettled installment in sequence.
    let mut order: Vec<usize> = Vec::new();
    if let Some(id) = target {
        let idx = installments
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| LedgerError::not_found(Installment::COLLECTION, id))?;
        if installments[idx].is_settled() {
            return Err(LedgerError::invalid(format!(
                "installment #{} is already paid",
                installments[idx].sequence
            )));
        }
        order.push(idx);
    }
    let first = order.first().copied();
    order.extend((0..installments.len()).filter(|&i| !installments[i].is_settled() && Some(i) != first));

    let mut left = amount;
    let mut allocations = Vec::new();
    let mut touched_idx = Vec::new();
    for idx in order {
        if left <= EPSILON {
            break;
        }
        let inst = &mut installments[idx];
        let pay = round2(left.min(inst.remaining()));
        if pay <= 0.0 {
            continue;
        }
        inst.amount_paid = round2(inst.amount_paid + pay);
        inst.status = inst.derived_status();
        if inst.status == InstallmentStatus::Paid {
            inst.paid_date = Some(date);
        }
        left = round2(left - pay);
        allocations.push(Allocation {
            installment_id: inst.id.clone(),
            amount: pay,
        });
        touched_idx.push(idx);
    }

    plan.amount_paid = round2(installments.iter().map(|i| i.amount_paid).sum());
    plan.remaining_balance = round2(plan.total_amount - plan.amount_paid).max(0.0);
    plan.status = plan_status(plan.remaining_balance);

    let mut sale: Sale = repo::load(store, &plan.sale_id)?;
    apply_plan_to_sale(&mut sale, &plan);

    let mut payment = Payment::new(date, amount, method);
    payment.sale_id = Some(sale.id.clone());
    payment.party_id = sale.customer_id.clone();
    payment.allocations = allocations;

    let touched: Vec<Installment> = touched_idx.iter().map(|&i| installments[i].clone()).collect();
    let mut ops = Vec::new();
    for inst in &touched {
        ops.push(repo::set_op(inst)?);
    }
    ops.push(repo::set_op(&plan)?);
    ops.push(repo::set_op(&sale)?);
    ops.push(repo::set_op(&payment)?);
    store.commit(ops)?;

    info!(
        sale = %sale.number,
        plan = %plan.id,
        amount,
        installments = touched.len(),
        remaining = plan.remaining_balance,
        "installment payment applied"
    );
    Ok(PaymentOutcome {
        payment,
        plan,
        sale,
        touched,
    })
}

fn plan_status(remaining: f64) -> PlanStatus {
    if remaining <= EPSILON {
        PlanStatus::Completed
    } else {
        PlanStatus::Active
    }
}

fn apply_plan_to_sale(sale: &mut Sale, plan: &InstallmentPlan) {
    sale.amount_paid = round2(plan.down_payment + plan.amount_paid);
    sale.balance = round2(sale.total - sale.amount_paid).max(0.0);
    sale.payment_status = PaymentStatus::derive(sale.total, sale.amount_paid);
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    pub entity: &'static str,
    pub id: String,
    pub field: &'static str,
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub sale_id: String,
    pub sale_number: String,
    pub plan_id: Option<String>,
    pub corrections: Vec<Correction>,
    /// (sum of the schedule, plan financed amount) when they disagree.
    pub schedule_mismatch: Option<(f64, f64)>,
    pub applied: bool,
}

impl ReconcileReport {
    pub fn is_consistent(&self) -> bool {
        self.corrections.is_empty() && self.schedule_mismatch.is_none()
    }
}

struct Diff<'a> {
    corrections: &'a mut Vec<Correction>,
    entity: &'static str,
    id: String,
}

impl Diff<'_> {
    fn money(&mut self, field: &'static str, before: f64, after: f64) -> bool {
        if (before - after).abs() > EPSILON {
            self.push(field, format!("{before:.2}"), format!("{after:.2}"));
            true
        } else {
            false
        }
    }

    fn value<T: PartialEq + std::fmt::Debug>(&mut self, field: &'static str, before: &T, after: &T) -> bool {
        if before != after {
            self.push(field, format!("{before:?}"), format!("{after:?}"));
            true
        } else {
            false
        }
    }

    fn push(&mut self, field: &'static str, before: String, after: String) {
        self.corrections.push(Correction {
            entity: self.entity,
            id: self.id.clone(),
            field,
            before,
            after,
        });
    }
}

/// Recompute a sale's paid amounts from its installments. Writes only when
/// `apply` is set and something disagreed.
pub fn reconcile(store: &dyn DocumentStore, sale_id: &str, apply: bool) -> Result<ReconcileReport> {
    let sale: Sale = repo::load(store, sale_id)?;
    let mut corrections = Vec::new();
    let mut ops = Vec::new();
    let mut schedule_mismatch = None;

    let mut fixed_sale = sale.clone();

    if let Some(plan_id) = &sale.installment_plan_id {
        let plan: InstallmentPlan = repo::load(store, plan_id)?;
        let installments = schedule(store, plan_id)?;

        for inst in &installments {
            let mut fixed = inst.clone();
            fixed.status = inst.derived_status();
            let mut diff = Diff {
                corrections: &mut corrections,
                entity: "installment",
                id: inst.id.clone(),
            };
            if diff.value("status", &inst.status, &fixed.status) {
                ops.push(repo::set_op(&fixed)?);
            }
        }

        let scheduled = round2(installments.iter().map(|i| i.amount).sum());
        if (scheduled - plan.total_amount).abs() > EPSILON {
            warn!(plan = %plan.id, scheduled, financed = plan.total_amount, "schedule does not sum to plan");
            schedule_mismatch = Some((scheduled, plan.total_amount));
        }

        let mut fixed_plan = plan.clone();
        fixed_plan.amount_paid = round2(installments.iter().map(|i| i.amount_paid).sum());
        fixed_plan.remaining_balance = round2(fixed_plan.total_amount - fixed_plan.amount_paid).max(0.0);
        fixed_plan.status = plan_status(fixed_plan.remaining_balance);

        let mut diff = Diff {
            corrections: &mut corrections,
            entity: "plan",
            id: plan.id.clone(),
        };
        let mut changed = diff.money("amount_paid", plan.amount_paid, fixed_plan.amount_paid);
        changed |= diff.money("remaining_balance", plan.remaining_balance, fixed_plan.remaining_balance);
        changed |= diff.value("status", &plan.status, &fixed_plan.status);
        if changed {
            ops.push(repo::set_op(&fixed_plan)?);
        }

        fixed_sale.payment_type = PaymentType::Installment;
        apply_plan_to_sale(&mut fixed_sale, &fixed_plan);
    } else {
        fixed_sale.balance = round2(sale.total - sale.amount_paid).max(0.0);
        fixed_sale.payment_status = PaymentStatus::derive(sale.total, sale.amount_paid);
    }

    let mut diff = Diff {
        corrections: &mut corrections,
        entity: "sale",
        id: sale.id.clone(),
    };
    let mut changed = diff.money("amount_paid", sale.amount_paid, fixed_sale.amount_paid);
    changed |= diff.money("balance", sale.balance, fixed_sale.balance);
    changed |= diff.value("payment_status", &sale.payment_status, &fixed_sale.payment_status);
    changed |= diff.value("payment_type", &sale.payment_type, &fixed_sale.payment_type);
    if changed {
        ops.push(repo::set_op(&fixed_sale)?);
    }

    let applied = apply && !ops.is_empty();
    if applied {
        store.commit(ops)?;
        info!(sale = %sale.number, corrections = corrections.len(), "ledger reconciled");
    }

    Ok(ReconcileReport {
        sale_id: sale.id.clone(),
        sale_number: sale.number.clone(),
        plan_id: sale.installment_plan_id.clone(),
        corrections,
        schedule_mismatch,
        applied,
    })
}

/// Reconcile every live sale that has an installment plan.
pub fn reconcile_all(store: &dyn DocumentStore, apply: bool) -> Result<Vec<ReconcileReport>> {
    let q = Query::new(Sale::COLLECTION)
        .filter("voided", Op::Eq, false)
        .filter("installment_plan_id", Op::Ne, Value::Null)
        .order_by("date", Direction::Asc);
    let mut reports = Vec::new();
    for doc in query::run(store, &q)? {
        reports.push(reconcile(store, &doc.id, apply)?);
    }
    Ok(reports)
}

// ---------------------------------------------------------------------------
// Overdue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OverdueInstallment {
    pub installment: Installment,
    pub sale_number: String,
    pub customer_id: Option<String>,
    pub days_overdue: i64,
    pub remaining: f64,
}

/// Unsettled installments whose due date is before `today`, oldest first.
pub fn overdue(store: &dyn DocumentStore, today: NaiveDate) -> Result<Vec<OverdueInstallment>> {
    let q = Query::new(Installment::COLLECTION)
        .filter("due_date", Op::Lt, today.to_string())
        .order_by("due_date", Direction::Asc);
    let candidates: Vec<Installment> = query::run_as(store, &q)?;

    let mut sales: HashMap<String, Option<Sale>> = HashMap::new();
    let mut out = Vec::new();
    for inst in candidates {
        if inst.is_settled() {
            continue;
        }
        if !sales.contains_key(&inst.sale_id) {
            let sale = repo::find::<Sale>(store, &inst.sale_id)?;
            sales.insert(inst.sale_id.clone(), sale);
        }
        let Some(Some(sale)) = sales.get(&inst.sale_id) else {
            continue;
        };
        if sale.voided {
            continue;
        }
        out.push(OverdueInstallment {
            sale_number: sale.number.clone(),
            customer_id: sale.customer_id.clone(),
            days_overdue: (today - inst.due_date).num_days(),
            remaining: inst.remaining(),
            installment: inst,
        });
    }
    Ok(out)
}

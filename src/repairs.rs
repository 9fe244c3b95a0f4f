use chrono::NaiveDate;
use tracing::info;

use crate::error::{LedgerError, Result};
use crate::models::{round2, Customer, Payment, PaymentMethod, Repair, RepairStatus, EPSILON};
use crate::query::{self, Direction, Op, Query};
use crate::repo::{self, Entity};
use crate::store::DocumentStore;

pub struct NewRepair {
    pub customer_id: String,
    pub device: String,
    pub issue: String,
    pub received: NaiveDate,
    pub promised: Option<NaiveDate>,
    pub estimated_cost: f64,
}

pub fn create_repair(store: &dyn DocumentStore, new: NewRepair) -> Result<Repair> {
    repo::load::<Customer>(store, &new.customer_id)?;
    if new.device.trim().is_empty() {
        return Err(LedgerError::invalid("device description is required"));
    }
    if !new.estimated_cost.is_finite() || new.estimated_cost < 0.0 {
        return Err(LedgerError::invalid("estimate must not be negative"));
    }
    let repair = Repair {
        id: uuid::Uuid::new_v4().to_string(),
        customer_id: new.customer_id,
        device: new.device.trim().to_string(),
        issue: new.issue,
        received: new.received,
        promised: new.promised,
        status: RepairStatus::Received,
        estimated_cost: round2(new.estimated_cost),
        final_cost: None,
        amount_paid: 0.0,
        delivered: None,
    };
    repo::save(store, &repair)?;
    info!(repair = %repair.id, device = %repair.device, "repair ticket opened");
    Ok(repair)
}

/// Whether a ticket may move from `from` to `to`. Work only moves forward,
/// except that anything not yet finished can be cancelled.
pub fn can_transition(from: RepairStatus, to: RepairStatus) -> bool {
    use RepairStatus::*;
    if from.is_terminal() || from == to {
        return false;
    }
    if to == Cancelled {
        return true;
    }
    let rank = |s: RepairStatus| match s {
        Received => 0,
        Diagnosing => 1,
        InProgress => 2,
        Ready => 3,
        Delivered => 4,
        Cancelled => 5,
    };
    rank(to) > rank(from)
}

pub fn advance(
    store: &dyn DocumentStore,
    repair_id: &str,
    to: RepairStatus,
    final_cost: Option<f64>,
    today: NaiveDate,
) -> Result<Repair> {
    let mut repair: Repair = repo::load(store, repair_id)?;
    if !can_transition(repair.status, to) {
        return Err(LedgerError::InvalidTransition {
            from: repair.status.as_str().to_string(),
            to: to.as_str().to_string(),
        });
    }
    if let Some(cost) = final_cost {
        if !cost.is_finite() || cost < 0.0 {
            return Err(LedgerError::invalid("final cost must not be negative"));
        }
        repair.final_cost = Some(round2(cost));
    }
    if to == RepairStatus::Delivered {
        repair.delivered = Some(today);
        if repair.final_cost.is_none() {
            repair.final_cost = Some(repair.estimated_cost);
        }
    }
    let from = repair.status;
    repair.status = to;
    repo::save(store, &repair)?;
    info!(repair = %repair.id, from = from.as_str(), to = to.as_str(), "repair status changed");
    Ok(repair)
}

pub fn pay_repair(
    store: &dyn DocumentStore,
    repair_id: &str,
    amount: f64,
    date: NaiveDate,
    method: PaymentMethod,
) -> Result<Repair> {
    let mut repair: Repair = repo::load(store, repair_id)?;
    if repair.status == RepairStatus::Cancelled {
        return Err(LedgerError::invalid("repair was cancelled"));
    }
    if !amount.is_finite() || amount <= 0.0 {
        return Err(LedgerError::invalid("payment amount must be positive"));
    }
    let amount = round2(amount);
    let owed = round2(repair.chargeable() - repair.amount_paid).max(0.0);
    if amount > owed + EPSILON {
        return Err(LedgerError::Overpayment { amount, balance: owed });
    }
    repair.amount_paid = round2(repair.amount_paid + amount);

    let mut payment = Payment::new(date, amount, method);
    payment.repair_id = Some(repair.id.clone());
    payment.party_id = Some(repair.customer_id.clone());

    store.commit(vec![repo::set_op(&repair)?, repo::set_op(&payment)?])?;
    info!(repair = %repair.id, amount, "repair payment taken");
    Ok(repair)
}

/// Tickets that are neither delivered nor cancelled, oldest first.
pub fn open_repairs(store: &dyn DocumentStore) -> Result<Vec<Repair>> {
    let q = Query::new(Repair::COLLECTION)
        .filter("status", Op::In, serde_json::json!(["received", "diagnosing", "in_progress", "ready"]))
        .order_by("received", Direction::Asc);
    query::run_as(store, &q)
}

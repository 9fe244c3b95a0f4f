//! Accounts receivable and payable.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::error::Result;
use crate::installments;
use crate::models::{round2, Purchase, Sale, Supplier, EPSILON};
use crate::query::{self, Op, Query};
use crate::repo::{self, Entity};
use crate::reports::customer_name;
use crate::store::DocumentStore;

pub struct ReceivableRow {
    pub customer_id: Option<String>,
    pub name: String,
    pub open_sales: usize,
    pub outstanding: f64,
    pub overdue: f64,
}

/// Overdue part of one sale's balance.
fn sale_overdue(store: &dyn DocumentStore, sale: &Sale, today: NaiveDate, credit_terms_days: i64) -> Result<f64> {
    match &sale.installment_plan_id {
        Some(plan_id) => Ok(installments::schedule(store, plan_id)?
            .iter()
            .filter(|i| i.due_date < today && !i.is_settled())
            .map(|i| i.remaining())
            .sum()),
        None if (today - sale.date).num_days() > credit_terms_days => Ok(sale.balance),
        None => Ok(0.0),
    }
}

/// Open customer balances, largest first.
pub fn receivables(store: &dyn DocumentStore, today: NaiveDate, credit_terms_days: i64) -> Result<Vec<ReceivableRow>> {
    let q = Query::new(Sale::COLLECTION)
        .filter("voided", Op::Eq, false)
        .filter("balance", Op::Gt, EPSILON);
    let mut rows: HashMap<Option<String>, ReceivableRow> = HashMap::new();
    for sale in query::run_as::<Sale>(store, &q)? {
        let overdue = sale_overdue(store, &sale, today, credit_terms_days)?;
        let key = sale.customer_id.clone();
        if !rows.contains_key(&key) {
            let name = customer_name(store, key.as_deref())?;
            rows.insert(
                key.clone(),
                ReceivableRow {
                    customer_id: key.clone(),
                    name,
                    open_sales: 0,
                    outstanding: 0.0,
                    overdue: 0.0,
                },
            );
        }
        if let Some(row) = rows.get_mut(&key) {
            row.open_sales += 1;
            row.outstanding += sale.balance;
            row.overdue += overdue;
        }
    }
    let mut rows: Vec<ReceivableRow> = rows
        .into_values()
        .map(|mut r| {
            r.outstanding = round2(r.outstanding);
            r.overdue = round2(r.overdue);
            r
        })
        .collect();
    rows.sort_by(|a, b| {
        b.outstanding
            .partial_cmp(&a.outstanding)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(rows)
}

pub struct PayableRow {
    pub supplier_id: String,
    pub name: String,
    pub open_purchases: usize,
    pub outstanding: f64,
    pub overdue: f64,
}

/// Open supplier balances, largest first. A purchase is overdue once its
/// due date has passed.
pub fn payables(store: &dyn DocumentStore, today: NaiveDate) -> Result<Vec<PayableRow>> {
    let q = Query::new(Purchase::COLLECTION).filter("balance", Op::Gt, EPSILON);
    let mut rows: HashMap<String, PayableRow> = HashMap::new();
    for p in query::run_as::<Purchase>(store, &q)? {
        if !rows.contains_key(&p.supplier_id) {
            let name = repo::find::<Supplier>(store, &p.supplier_id)?
                .map(|s| s.name)
                .unwrap_or_else(|| p.supplier_id.clone());
            rows.insert(
                p.supplier_id.clone(),
                PayableRow {
                    supplier_id: p.supplier_id.clone(),
                    name,
                    open_purchases: 0,
                    outstanding: 0.0,
                    overdue: 0.0,
                },
            );
        }
        if let Some(row) = rows.get_mut(&p.supplier_id) {
            row.open_purchases += 1;
            row.outstanding += p.balance;
            if p.due_date.map(|d| d < today).unwrap_or(false) {
                row.overdue += p.balance;
            }
        }
    }
    let mut rows: Vec<PayableRow> = rows
        .into_values()
        .map(|mut r| {
            r.outstanding = round2(r.outstanding);
            r.overdue = round2(r.overdue);
            r
        })
        .collect();
    rows.sort_by(|a, b| {
        b.outstanding
            .partial_cmp(&a.outstanding)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::{day, product};
    use crate::catalog::{add_customer, add_supplier};
    use crate::installments::{create_plan, PlanTerms};
    use crate::models::{Frequency, PaymentType};
    use crate::purchases::tests::purchase;
    use crate::sales::tests::{line, sale_for};
    use crate::store::MemoryStore;

    #[test]
    fn test_receivables_overdue_by_terms_and_schedule() {
        let store = MemoryStore::new();
        let phone = product(&store, "Phone", 600.0, 300.0, 10);
        let ana = add_customer(&store, "Ana", None, None, None, day("2025-01-01")).unwrap();
        let ben = add_customer(&store, "Ben", None, None, None, day("2025-01-01")).unwrap();

        // Ana: credit sale from January, past 30-day terms by March.
        sale_for(&store, Some(&ana.id), vec![line(&phone.id, 1)], PaymentType::Credit, "2025-01-15");
        // Ben: installment sale, 3 x 200 from Feb 1; two due before Mar 10.
        let s = sale_for(&store, Some(&ben.id), vec![line(&phone.id, 1)], PaymentType::Installment, "2025-01-20");
        create_plan(
            &store,
            &s.id,
            PlanTerms {
                down_payment: 0.0,
                count: 3,
                frequency: Frequency::Monthly,
                start_date: day("2025-02-01"),
            },
            day("2025-01-20"),
        )
        .unwrap();
        // Fully paid cash sale does not appear.
        sale_for(&store, None, vec![line(&phone.id, 1)], PaymentType::Cash, "2025-01-20");

        let rows = receivables(&store, day("2025-03-10"), 30).unwrap();
        assert_eq!(rows.len(), 2);
        let ana_row = rows.iter().find(|r| r.name == "Ana").unwrap();
        assert_eq!(ana_row.outstanding, 600.0);
        assert_eq!(ana_row.overdue, 600.0);
        let ben_row = rows.iter().find(|r| r.name == "Ben").unwrap();
        assert_eq!(ben_row.outstanding, 600.0);
        assert_eq!(ben_row.overdue, 400.0);

        let early = receivables(&store, day("2025-01-31"), 30).unwrap();
        assert!(early.iter().all(|r| r.overdue == 0.0));
    }

    #[test]
    fn test_payables_grouped_by_supplier() {
        let store = MemoryStore::new();
        let acme = add_supplier(&store, "Acme", None, None, day("2025-01-01")).unwrap();
        let p = product(&store, "Case", 10.0, 10.0, 0);
        // Each purchase: 100 + 10 tax, due 2025-04-30.
        purchase(&store, &acme.id, vec![line(&p.id, 10)], 0.0, "2025-03-01");
        purchase(&store, &acme.id, vec![line(&p.id, 10)], 110.0, "2025-03-02");
        purchase(&store, &acme.id, vec![line(&p.id, 10)], 10.0, "2025-03-03");

        let rows = payables(&store, day("2025-04-01")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].open_purchases, 2);
        assert_eq!(rows[0].outstanding, 210.0);
        assert_eq!(rows[0].overdue, 0.0);

        let late = payables(&store, day("2025-05-01")).unwrap();
        assert_eq!(late[0].overdue, 210.0);
    }
}

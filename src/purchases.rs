use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::json;
use tracing::info;

use crate::catalog::{add_stock, resolve_product};
use crate::error::{LedgerError, Result};
use crate::models::{
    round2, Payment, PaymentMethod, PaymentStatus, Product, Purchase, PurchaseItem, Supplier, EPSILON,
};
use crate::query::{self, Cursor, Direction, Op, Page, Query};
use crate::repo::{self, Entity};
use crate::sales::LineRequest;
use crate::store::{DocumentStore, WriteOp};

#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub supplier_id: String,
    pub date: NaiveDate,
    /// Price in each line is the unit cost; missing means the product's current cost.
    pub lines: Vec<LineRequest>,
    pub tax_rate: f64,
    pub amount_paid: f64,
    pub method: PaymentMethod,
    pub due_date: Option<NaiveDate>,
}

pub fn record_purchase(store: &dyn DocumentStore, new: NewPurchase) -> Result<Purchase> {
    let supplier: Supplier = repo::load(store, &new.supplier_id)?;
    if new.lines.is_empty() {
        return Err(LedgerError::invalid("a purchase needs at least one item"));
    }
    if !new.tax_rate.is_finite() || !new.amount_paid.is_finite() || new.tax_rate < 0.0 || new.amount_paid < 0.0 {
        return Err(LedgerError::invalid("tax rate and amount paid must not be negative"));
    }

    let mut products: BTreeMap<String, Product> = BTreeMap::new();
    let mut items = Vec::new();
    for line in &new.lines {
        if line.quantity <= 0 {
            return Err(LedgerError::invalid(format!("quantity must be positive for {}", line.product)));
        }
        let product = resolve_product(store, &line.product)?;
        let unit_cost = round2(line.unit_price.unwrap_or(product.cost_price));
        if !unit_cost.is_finite() || unit_cost < 0.0 {
            return Err(LedgerError::invalid("unit cost must not be negative"));
        }
        items.push(PurchaseItem {
            product_id: product.id.clone(),
            name: product.name.clone(),
            quantity: line.quantity,
            unit_cost,
        });
        products.entry(product.id.clone()).or_insert(product);
    }

    let subtotal = round2(items.iter().map(|i| i.line_total()).sum());
    let tax_amount = round2(subtotal * new.tax_rate / 100.0);
    let total = round2(subtotal + tax_amount);
    let amount_paid = round2(new.amount_paid);
    if amount_paid > total + EPSILON {
        return Err(LedgerError::Overpayment {
            amount: amount_paid,
            balance: total,
        });
    }

    let purchase = Purchase {
        id: uuid::Uuid::new_v4().to_string(),
        number: repo::short_number("P"),
        supplier_id: supplier.id.clone(),
        date: new.date,
        items,
        subtotal,
        tax_amount,
        total,
        amount_paid,
        balance: round2(total - amount_paid).max(0.0),
        payment_status: PaymentStatus::derive(total, amount_paid),
        due_date: new.due_date,
    };

    let mut ops = Vec::new();
    for (id, product) in &products {
        let on_hand = purchase
            .items
            .iter()
            .filter(|i| &i.product_id == id)
            .try_fold(product.quantity, |acc, i| add_stock(&product.name, acc, i.quantity))?;
        // Latest cost wins.
        let cost = purchase
            .items
            .iter()
            .rev()
            .find(|i| &i.product_id == id)
            .map(|i| i.unit_cost)
            .unwrap_or(product.cost_price);
        ops.push(WriteOp::update(
            Product::COLLECTION,
            id,
            json!({
                "quantity": on_hand,
                "cost_price": cost,
                "last_received": purchase.date,
            }),
        ));
    }
    ops.push(repo::set_op(&purchase)?);
    if amount_paid > 0.0 {
        let mut payment = Payment::new(purchase.date, amount_paid, new.method);
        payment.purchase_id = Some(purchase.id.clone());
        payment.party_id = Some(supplier.id.clone());
        ops.push(repo::set_op(&payment)?);
    }
    store.commit(ops)?;

    info!(purchase = %purchase.number, supplier = %supplier.name, total, "purchase recorded");
    Ok(purchase)
}

pub fn resolve_purchase(store: &dyn DocumentStore, key: &str) -> Result<Purchase> {
    if let Some(p) = repo::find::<Purchase>(store, key)? {
        return Ok(p);
    }
    let q = Query::new(Purchase::COLLECTION).filter("number", Op::Eq, key.to_uppercase());
    query::run_as::<Purchase>(store, &q)?
        .into_iter()
        .next()
        .ok_or_else(|| LedgerError::not_found(Purchase::COLLECTION, key))
}

pub fn pay_purchase(
    store: &dyn DocumentStore,
    purchase_id: &str,
    amount: f64,
    date: NaiveDate,
    method: PaymentMethod,
) -> Result<Purchase> {
    let mut purchase: Purchase = repo::load(store, purchase_id)?;
    if !amount.is_finite() || amount <= 0.0 {
        return Err(LedgerError::invalid("payment amount must be positive"));
    }
    let amount = round2(amount);
    if amount > purchase.balance + EPSILON {
        return Err(LedgerError::Overpayment {
            amount,
            balance: purchase.balance,
        });
    }
    purchase.amount_paid = round2(purchase.amount_paid + amount);
    purchase.balance = round2(purchase.total - purchase.amount_paid).max(0.0);
    purchase.payment_status = PaymentStatus::derive(purchase.total, purchase.amount_paid);

    let mut payment = Payment::new(date, amount, method);
    payment.purchase_id = Some(purchase.id.clone());
    payment.party_id = Some(purchase.supplier_id.clone());

    store.commit(vec![repo::set_op(&purchase)?, repo::set_op(&payment)?])?;
    info!(purchase = %purchase.number, amount, balance = purchase.balance, "supplier paid");
    Ok(purchase)
}

pub fn list_purchases(
    store: &dyn DocumentStore,
    supplier_id: Option<&str>,
    page_size: usize,
    cursor: Option<&Cursor>,
) -> Result<Page<Purchase>> {
    let mut q = Query::new(Purchase::COLLECTION).order_by("date", Direction::Desc);
    if let Some(s) = supplier_id {
        q = q.filter("supplier_id", Op::Eq, s);
    }
    query::paginate_as(store, &q, page_size, cursor)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::catalog::add_supplier;
    use crate::catalog::tests::{day, product};
    use crate::sales::tests::line;
    use crate::store::MemoryStore;

    pub(crate) fn purchase(
        store: &dyn DocumentStore,
        supplier: &str,
        lines: Vec<LineRequest>,
        paid: f64,
        date: &str,
    ) -> Purchase {
        record_purchase(
            store,
            NewPurchase {
                supplier_id: supplier.into(),
                date: day(date),
                lines,
                tax_rate: 10.0,
                amount_paid: paid,
                method: PaymentMethod::Transfer,
                due_date: Some(day("2025-04-30")),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_purchase_receives_stock_and_updates_cost() {
        let store = MemoryStore::new();
        let s = add_supplier(&store, "Acme Wholesale", None, None, day("2025-01-01")).unwrap();
        let p = product(&store, "Case", 10.0, 4.0, 2);
        let bought = purchase(
            &store,
            &s.id,
            vec![LineRequest {
                unit_price: Some(3.5),
                ..line(&p.id, 10)
            }],
            0.0,
            "2025-03-15",
        );
        assert_eq!(bought.subtotal, 35.0);
        assert_eq!(bought.tax_amount, 3.5);
        assert_eq!(bought.total, 38.5);
        assert_eq!(bought.payment_status, PaymentStatus::Unpaid);

        let after: Product = repo::load(&store, &p.id).unwrap();
        assert_eq!(after.quantity, 12);
        assert_eq!(after.cost_price, 3.5);
        assert_eq!(after.last_received, Some(day("2025-03-15")));
    }

    #[test]
    fn test_pay_purchase() {
        let store = MemoryStore::new();
        let s = add_supplier(&store, "Acme", None, None, day("2025-01-01")).unwrap();
        let p = product(&store, "Case", 10.0, 4.0, 0);
        let bought = purchase(&store, &s.id, vec![line(&p.id, 5)], 2.0, "2025-03-15");
        assert_eq!(bought.balance, 20.0);

        let err = pay_purchase(&store, &bought.id, 25.0, day("2025-03-20"), PaymentMethod::Cash).unwrap_err();
        assert!(matches!(err, LedgerError::Overpayment { .. }));
        let paid = pay_purchase(&store, &bought.id, 20.0, day("2025-03-20"), PaymentMethod::Cash).unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert_eq!(resolve_purchase(&store, &bought.number).unwrap().balance, 0.0);
    }

    #[test]
    fn test_non_finite_purchase_inputs_rejected() {
        let store = MemoryStore::new();
        let s = add_supplier(&store, "Acme", None, None, day("2025-01-01")).unwrap();
        let p = product(&store, "Case", 10.0, 4.0, 0);
        let new = || NewPurchase {
            supplier_id: s.id.clone(),
            date: day("2025-03-15"),
            lines: vec![line(&p.id, 5)],
            tax_rate: 0.0,
            amount_paid: 0.0,
            method: PaymentMethod::Cash,
            due_date: None,
        };
        assert!(record_purchase(&store, NewPurchase { amount_paid: f64::NAN, ..new() }).is_err());
        assert!(record_purchase(&store, NewPurchase { tax_rate: f64::INFINITY, ..new() }).is_err());
        let costed = NewPurchase {
            lines: vec![LineRequest {
                unit_price: Some(f64::NAN),
                ..line(&p.id, 5)
            }],
            ..new()
        };
        assert!(record_purchase(&store, costed).is_err());
        assert_eq!(repo::load::<Product>(&store, &p.id).unwrap().quantity, 0);

        let bought = record_purchase(&store, new()).unwrap();
        let err = pay_purchase(&store, &bought.id, f64::NAN, day("2025-03-20"), PaymentMethod::Cash).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));
        assert_eq!(resolve_purchase(&store, &bought.number).unwrap().balance, 20.0);
    }

    #[test]
    fn test_purchase_quantity_overflow_rejected() {
        let store = MemoryStore::new();
        let s = add_supplier(&store, "Acme", None, None, day("2025-01-01")).unwrap();
        let p = product(&store, "Case", 10.0, 0.0, 5);
        let err = record_purchase(
            &store,
            NewPurchase {
                supplier_id: s.id.clone(),
                date: day("2025-03-15"),
                lines: vec![line(&p.id, i64::MAX)],
                tax_rate: 0.0,
                amount_paid: 0.0,
                method: PaymentMethod::Cash,
                due_date: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));
        assert_eq!(repo::load::<Product>(&store, &p.id).unwrap().quantity, 5);
    }

    #[test]
    fn test_unknown_supplier() {
        let store = MemoryStore::new();
        let p = product(&store, "Case", 10.0, 4.0, 0);
        let err = record_purchase(
            &store,
            NewPurchase {
                supplier_id: "ghost".into(),
                date: day("2025-03-15"),
                lines: vec![line(&p.id, 1)],
                tax_rate: 0.0,
                amount_paid: 0.0,
                method: PaymentMethod::Cash,
                due_date: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));
    }
}

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::json;
use tracing::{info, warn};

use crate::catalog::{add_stock, resolve_product};
use crate::error::{LedgerError, Result};
use crate::installments;
use crate::models::{
    round2, Customer, Installment, InstallmentPlan, Payment, PaymentMethod, PaymentStatus, PaymentType,
    Product, Sale, SaleItem, EPSILON,
};
use crate::query::{self, Cursor, Direction, Op, Page, Query};
use crate::repo::{self, Entity};
use crate::store::{DocumentStore, WriteOp};

/// One requested line: product id or SKU, quantity, optional price override.
#[derive(Debug, Clone, PartialEq)]
pub struct LineRequest {
    pub product: String,
    pub quantity: i64,
    pub unit_price: Option<f64>,
    pub discount: f64,
}

impl std::str::FromStr for LineRequest {
    type Err = String;

    /// `PRODUCT:QTY[:PRICE]`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() < 2 || parts.len() > 3 || parts[0].is_empty() {
            return Err(format!("expected PRODUCT:QTY[:PRICE], got '{s}'"));
        }
        let quantity: i64 = parts[1]
            .parse()
            .map_err(|_| format!("bad quantity in '{s}'"))?;
        let unit_price = match parts.get(2) {
            Some(p) => Some(
                p.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| format!("bad price in '{s}'"))?,
            ),
            None => None,
        };
        Ok(LineRequest {
            product: parts[0].to_string(),
            quantity,
            unit_price,
            discount: 0.0,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewSale {
    pub date: NaiveDate,
    pub customer_id: Option<String>,
    pub lines: Vec<LineRequest>,
    pub discount: f64,
    /// Percent; falls back to the configured default.
    pub tax_rate: Option<f64>,
    pub payment_type: PaymentType,
    /// Cash sales default to fully paid, others to nothing paid.
    pub amount_paid: Option<f64>,
    pub method: PaymentMethod,
}

pub struct Totals {
    pub subtotal: f64,
    pub tax_amount: f64,
    pub total: f64,
}

pub fn compute_totals(items: &[SaleItem], discount: f64, tax_rate: f64) -> Totals {
    let subtotal = round2(items.iter().map(|i| i.line_total()).sum());
    let taxable = (subtotal - discount).max(0.0);
    let tax_amount = round2(taxable * tax_rate / 100.0);
    Totals {
        subtotal,
        tax_amount,
        total: round2(taxable + tax_amount),
    }
}

pub fn record_sale(store: &dyn DocumentStore, new: NewSale, default_tax_rate: f64) -> Result<Sale> {
    if new.lines.is_empty() {
        return Err(LedgerError::invalid("a sale needs at least one item"));
    }
    if !new.discount.is_finite() || new.discount < 0.0 {
        return Err(LedgerError::invalid("discount must not be negative"));
    }
    let tax_rate = new.tax_rate.unwrap_or(default_tax_rate);
    if !tax_rate.is_finite() || tax_rate < 0.0 {
        return Err(LedgerError::invalid("tax rate must not be negative"));
    }
    match &new.customer_id {
        Some(id) => {
            repo::load::<Customer>(store, id)?;
        }
        None if new.payment_type != PaymentType::Cash => {
            return Err(LedgerError::invalid("credit and installment sales need a customer"));
        }
        None => {}
    }

    let mut products: BTreeMap<String, Product> = BTreeMap::new();
    let mut items = Vec::new();
    for line in &new.lines {
        if line.quantity <= 0 {
            return Err(LedgerError::invalid(format!("quantity must be positive for {}", line.product)));
        }
        let price_ok = line.unit_price.map_or(true, |p| p.is_finite() && p >= 0.0);
        if !price_ok || !line.discount.is_finite() || line.discount < 0.0 {
            return Err(LedgerError::invalid(format!(
                "price and discount must not be negative for {}",
                line.product
            )));
        }
        let product = resolve_product(store, &line.product)?;
        let entry = products.entry(product.id.clone()).or_insert(product);
        let requested = items
            .iter()
            .filter(|i: &&SaleItem| i.product_id == entry.id)
            .try_fold(line.quantity, |acc, i| add_stock(&entry.name, acc, i.quantity))?;
        if requested > entry.quantity {
            return Err(LedgerError::InsufficientStock {
                product: entry.name.clone(),
                available: entry.quantity,
                requested,
            });
        }
        items.push(SaleItem {
            product_id: entry.id.clone(),
            name: entry.name.clone(),
            quantity: line.quantity,
            unit_price: round2(line.unit_price.unwrap_or(entry.unit_price)),
            unit_cost: entry.cost_price,
            discount: round2(line.discount),
        });
    }

    let totals = compute_totals(&items, new.discount, tax_rate);
    let amount_paid = round2(match (new.amount_paid, new.payment_type) {
        (Some(paid), _) => paid,
        (None, PaymentType::Cash) => totals.total,
        (None, _) => 0.0,
    });
    if !amount_paid.is_finite() || amount_paid < 0.0 {
        return Err(LedgerError::invalid("amount paid must not be negative"));
    }
    if amount_paid > totals.total + EPSILON {
        return Err(LedgerError::Overpayment {
            amount: amount_paid,
            balance: totals.total,
        });
    }

    let sale = Sale {
        id: uuid::Uuid::new_v4().to_string(),
        number: repo::short_number("S"),
        date: new.date,
        customer_id: new.customer_id.clone(),
        items,
        subtotal: totals.subtotal,
        discount: round2(new.discount),
        tax_rate,
        tax_amount: totals.tax_amount,
        total: totals.total,
        amount_paid,
        balance: round2(totals.total - amount_paid).max(0.0),
        payment_type: new.payment_type,
        payment_status: PaymentStatus::derive(totals.total, amount_paid),
        installment_plan_id: None,
        voided: false,
    };

    let mut ops = Vec::new();
    for item in &sale.items {
        let product = &products[&item.product_id];
        let sold: i64 = sale
            .items
            .iter()
            .filter(|i| i.product_id == item.product_id)
            .map(|i| i.quantity)
            .sum();
        ops.push(WriteOp::update(
            Product::COLLECTION,
            &product.id,
            json!({ "quantity": product.quantity - sold }),
        ));
    }
    ops.push(repo::set_op(&sale)?);
    if amount_paid > 0.0 {
        let mut payment = Payment::new(sale.date, amount_paid, new.method);
        payment.sale_id = Some(sale.id.clone());
        payment.party_id = sale.customer_id.clone();
        ops.push(repo::set_op(&payment)?);
    }
    store.commit(ops)?;

    info!(
        sale = %sale.number,
        total = sale.total,
        paid = sale.amount_paid,
        payment_type = sale.payment_type.as_str(),
        "sale recorded"
    );
    Ok(sale)
}

/// Find a sale by id or by its short number.
pub fn resolve_sale(store: &dyn DocumentStore, key: &str) -> Result<Sale> {
    if let Some(s) = repo::find::<Sale>(store, key)? {
        return Ok(s);
    }
    let q = Query::new(Sale::COLLECTION).filter("number", Op::Eq, key.to_uppercase());
    query::run_as::<Sale>(store, &q)?
        .into_iter()
        .next()
        .ok_or_else(|| LedgerError::not_found(Sale::COLLECTION, key))
}

/// Take a payment against a sale. Sales on an installment plan route the
/// money through the plan so the schedule stays in step.
pub fn receive_payment(
    store: &dyn DocumentStore,
    sale_id: &str,
    amount: f64,
    date: NaiveDate,
    method: PaymentMethod,
) -> Result<Payment> {
    let sale: Sale = repo::load(store, sale_id)?;
    if sale.voided {
        return Err(LedgerError::invalid(format!("sale {} is voided", sale.number)));
    }
    if let Some(plan_id) = &sale.installment_plan_id {
        return Ok(installments::pay_plan(store, plan_id, amount, date, method)?.payment);
    }
    if !amount.is_finite() || amount <= 0.0 {
        return Err(LedgerError::invalid("payment amount must be positive"));
    }
    let amount = round2(amount);
    if amount > sale.balance + EPSILON {
        return Err(LedgerError::Overpayment {
            amount,
            balance: sale.balance,
        });
    }

    let amount_paid = round2(sale.amount_paid + amount);
    let balance = round2(sale.total - amount_paid).max(0.0);
    let status = PaymentStatus::derive(sale.total, amount_paid);

    let mut payment = Payment::new(date, amount, method);
    payment.sale_id = Some(sale.id.clone());
    payment.party_id = sale.customer_id.clone();

    store.commit(vec![
        WriteOp::update(
            Sale::COLLECTION,
            &sale.id,
            json!({ "amount_paid": amount_paid, "balance": balance, "payment_status": status }),
        ),
        repo::set_op(&payment)?,
    ])?;
    info!(sale = %sale.number, amount, balance, "payment received");
    Ok(payment)
}

/// Cancel a sale: stock goes back on the shelf and any installment schedule
/// is removed. Payments already taken stay on record.
pub fn void_sale(store: &dyn DocumentStore, sale_id: &str) -> Result<Sale> {
    let mut sale: Sale = repo::load(store, sale_id)?;
    if sale.voided {
        return Err(LedgerError::invalid(format!("sale {} is already voided", sale.number)));
    }

    let mut restock: BTreeMap<String, i64> = BTreeMap::new();
    for item in &sale.items {
        *restock.entry(item.product_id.clone()).or_default() += item.quantity;
    }

    let mut ops = Vec::new();
    for (product_id, qty) in restock {
        match repo::find::<Product>(store, &product_id)? {
            Some(p) => ops.push(WriteOp::update(
                Product::COLLECTION,
                &product_id,
                json!({ "quantity": p.quantity + qty }),
            )),
            None => warn!(product = %product_id, "product gone, not restocking"),
        }
    }

    if let Some(plan_id) = sale.installment_plan_id.take() {
        for inst in installments::schedule(store, &plan_id)? {
            ops.push(WriteOp::delete(Installment::COLLECTION, &inst.id));
        }
        ops.push(WriteOp::delete(InstallmentPlan::COLLECTION, &plan_id));
    }

    sale.voided = true;
    ops.push(repo::set_op(&sale)?);
    store.commit(ops)?;
    info!(sale = %sale.number, "sale voided");
    Ok(sale)
}

pub fn list_sales(
    store: &dyn DocumentStore,
    customer_id: Option<&str>,
    include_voided: bool,
    page_size: usize,
    cursor: Option<&Cursor>,
) -> Result<Page<Sale>> {
    let mut q = Query::new(Sale::COLLECTION).order_by("date", Direction::Desc);
    if let Some(c) = customer_id {
        q = q.filter("customer_id", Op::Eq, c);
    }
    if !include_voided {
        q = q.filter("voided", Op::Eq, false);
    }
    query::paginate_as(store, &q, page_size, cursor)
}

pub fn payments_for_sale(store: &dyn DocumentStore, sale_id: &str) -> Result<Vec<Payment>> {
    let q = Query::new(Payment::COLLECTION)
        .filter("sale_id", Op::Eq, sale_id)
        .order_by("date", Direction::Asc);
    query::run_as(store, &q)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::catalog::add_customer;
    use crate::catalog::tests::{day, product};
    use crate::store::MemoryStore;

    pub(crate) fn line(product: &str, qty: i64) -> LineRequest {
        LineRequest {
            product: product.into(),
            quantity: qty,
            unit_price: None,
            discount: 0.0,
        }
    }

    pub(crate) fn sale_for(
        store: &dyn DocumentStore,
        customer: Option<&str>,
        lines: Vec<LineRequest>,
        payment_type: PaymentType,
        date: &str,
    ) -> Sale {
        record_sale(
            store,
            NewSale {
                date: day(date),
                customer_id: customer.map(String::from),
                lines,
                discount: 0.0,
                tax_rate: None,
                payment_type,
                amount_paid: None,
                method: PaymentMethod::Cash,
            },
            0.0,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_line_request() {
        let l: LineRequest = "abc:2".parse().unwrap();
        assert_eq!(l.quantity, 2);
        assert_eq!(l.unit_price, None);
        let l: LineRequest = "abc:1:19.5".parse().unwrap();
        assert_eq!(l.unit_price, Some(19.5));
        assert!("abc".parse::<LineRequest>().is_err());
        assert!("abc:x".parse::<LineRequest>().is_err());
        assert!(":1".parse::<LineRequest>().is_err());
    }

    #[test]
    fn test_totals_with_discount_and_tax() {
        let store = MemoryStore::new();
        let p = product(&store, "Phone", 200.0, 120.0, 5);
        let sale = record_sale(
            &store,
            NewSale {
                date: day("2025-03-01"),
                customer_id: None,
                lines: vec![LineRequest {
                    discount: 10.0,
                    ..line(&p.id, 2)
                }],
                discount: 40.0,
                tax_rate: None,
                payment_type: PaymentType::Cash,
                amount_paid: None,
                method: PaymentMethod::Card,
            },
            10.0,
        )
        .unwrap();
        // 2 x 200 - 10 = 390; less 40 = 350; tax 35
        assert_eq!(sale.subtotal, 390.0);
        assert_eq!(sale.tax_amount, 35.0);
        assert_eq!(sale.total, 385.0);
        assert_eq!(sale.payment_status, PaymentStatus::Paid);
        assert_eq!(sale.balance, 0.0);
        assert_eq!(repo::load::<Product>(&store, &p.id).unwrap().quantity, 3);
        assert_eq!(payments_for_sale(&store, &sale.id).unwrap().len(), 1);
    }

    #[test]
    fn test_discount_larger_than_subtotal_floors_at_zero() {
        let items = vec![SaleItem {
            product_id: "p".into(),
            name: "x".into(),
            quantity: 1,
            unit_price: 5.0,
            unit_cost: 1.0,
            discount: 0.0,
        }];
        let t = compute_totals(&items, 10.0, 8.0);
        assert_eq!(t.total, 0.0);
        assert_eq!(t.tax_amount, 0.0);
    }

    #[test]
    fn test_stock_checked_across_repeated_lines() {
        let store = MemoryStore::new();
        let p = product(&store, "Case", 10.0, 4.0, 3);
        let err = record_sale(
            &store,
            NewSale {
                date: day("2025-03-01"),
                customer_id: None,
                lines: vec![line(&p.id, 2), line(&p.id, 2)],
                discount: 0.0,
                tax_rate: None,
                payment_type: PaymentType::Cash,
                amount_paid: None,
                method: PaymentMethod::Cash,
            },
            0.0,
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientStock { requested: 4, .. }));
        assert_eq!(repo::load::<Product>(&store, &p.id).unwrap().quantity, 3);
    }

    #[test]
    fn test_huge_repeated_quantities_rejected() {
        let store = MemoryStore::new();
        let p = product(&store, "Case", 10.0, 4.0, 3);
        let err = record_sale(
            &store,
            NewSale {
                date: day("2025-03-01"),
                customer_id: None,
                lines: vec![line(&p.id, i64::MAX), line(&p.id, i64::MAX)],
                discount: 0.0,
                tax_rate: None,
                payment_type: PaymentType::Cash,
                amount_paid: None,
                method: PaymentMethod::Cash,
            },
            0.0,
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));
    }

    #[test]
    fn test_non_finite_sale_inputs_rejected() {
        let store = MemoryStore::new();
        let p = product(&store, "Case", 10.0, 4.0, 5);
        let new = || NewSale {
            date: day("2025-03-01"),
            customer_id: None,
            lines: vec![line(&p.id, 1)],
            discount: 0.0,
            tax_rate: None,
            payment_type: PaymentType::Cash,
            amount_paid: None,
            method: PaymentMethod::Cash,
        };
        let priced = NewSale {
            lines: vec![LineRequest {
                unit_price: Some(f64::NAN),
                ..line(&p.id, 1)
            }],
            ..new()
        };
        assert!(record_sale(&store, priced, 0.0).is_err());
        assert!(record_sale(&store, NewSale { discount: f64::NAN, ..new() }, 0.0).is_err());
        assert!(record_sale(&store, NewSale { tax_rate: Some(f64::INFINITY), ..new() }, 0.0).is_err());
        assert!(record_sale(&store, NewSale { amount_paid: Some(f64::NAN), ..new() }, 0.0).is_err());
        assert!(record_sale(&store, new(), f64::NAN).is_err());
        assert!("abc:1:NaN".parse::<LineRequest>().is_err());
        assert!("abc:1:inf".parse::<LineRequest>().is_err());

        let unpaid = record_sale(&store, NewSale { amount_paid: Some(0.0), ..new() }, 0.0).unwrap();
        let err = receive_payment(&store, &unpaid.id, f64::NAN, day("2025-03-02"), PaymentMethod::Cash).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));
        assert_eq!(repo::load::<Sale>(&store, &unpaid.id).unwrap().balance, 10.0);
        assert!(payments_for_sale(&store, &unpaid.id).unwrap().is_empty());
        assert_eq!(repo::load::<Product>(&store, &p.id).unwrap().quantity, 4);
    }

    #[test]
    fn test_repeated_lines_decrement_once_in_total() {
        let store = MemoryStore::new();
        let p = product(&store, "Case", 10.0, 4.0, 5);
        sale_for(&store, None, vec![line(&p.id, 1), line(&p.id, 2)], PaymentType::Cash, "2025-03-01");
        assert_eq!(repo::load::<Product>(&store, &p.id).unwrap().quantity, 2);
    }

    #[test]
    fn test_credit_sale_needs_customer() {
        let store = MemoryStore::new();
        let p = product(&store, "Case", 10.0, 4.0, 5);
        let err = record_sale(
            &store,
            NewSale {
                date: day("2025-03-01"),
                customer_id: None,
                lines: vec![line(&p.id, 1)],
                discount: 0.0,
                tax_rate: None,
                payment_type: PaymentType::Credit,
                amount_paid: None,
                method: PaymentMethod::Cash,
            },
            0.0,
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));
    }

    #[test]
    fn test_credit_sale_payments() {
        let store = MemoryStore::new();
        let p = product(&store, "Tablet", 300.0, 200.0, 2);
        let c = add_customer(&store, "Ana", None, None, None, day("2025-01-01")).unwrap();
        let sale = sale_for(&store, Some(&c.id), vec![line(&p.id, 1)], PaymentType::Credit, "2025-03-01");
        assert_eq!(sale.payment_status, PaymentStatus::Unpaid);
        assert_eq!(sale.balance, 300.0);

        receive_payment(&store, &sale.id, 100.0, day("2025-03-10"), PaymentMethod::Cash).unwrap();
        let s: Sale = repo::load(&store, &sale.id).unwrap();
        assert_eq!(s.payment_status, PaymentStatus::Partial);
        assert_eq!(s.balance, 200.0);

        let err = receive_payment(&store, &sale.id, 250.0, day("2025-03-11"), PaymentMethod::Cash).unwrap_err();
        assert!(matches!(err, LedgerError::Overpayment { .. }));

        receive_payment(&store, &sale.id, 200.0, day("2025-03-12"), PaymentMethod::Card).unwrap();
        let s: Sale = repo::load(&store, &sale.id).unwrap();
        assert_eq!(s.payment_status, PaymentStatus::Paid);
        assert_eq!(payments_for_sale(&store, &sale.id).unwrap().len(), 2);
    }

    #[test]
    fn test_void_restores_stock_once() {
        let store = MemoryStore::new();
        let p = product(&store, "Case", 10.0, 4.0, 5);
        let sale = sale_for(&store, None, vec![line(&p.id, 3)], PaymentType::Cash, "2025-03-01");
        void_sale(&store, &sale.id).unwrap();
        assert_eq!(repo::load::<Product>(&store, &p.id).unwrap().quantity, 5);
        assert!(void_sale(&store, &sale.id).is_err());
        assert!(receive_payment(&store, &sale.id, 1.0, day("2025-03-02"), PaymentMethod::Cash).is_err());
    }

    #[test]
    fn test_resolve_by_number_and_list_newest_first() {
        let store = MemoryStore::new();
        let p = product(&store, "Case", 10.0, 4.0, 10);
        let older = sale_for(&store, None, vec![line(&p.id, 1)], PaymentType::Cash, "2025-03-01");
        let newer = sale_for(&store, None, vec![line(&p.id, 1)], PaymentType::Cash, "2025-03-05");
        assert_eq!(resolve_sale(&store, &older.number.to_lowercase()).unwrap().id, older.id);

        void_sale(&store, &older.id).unwrap();
        let page = list_sales(&store, None, false, 10, None).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, newer.id);
        let page = list_sales(&store, None, true, 10, None).unwrap();
        assert_eq!(page.items[0].id, newer.id);
        assert_eq!(page.items[1].id, older.id);
    }
}

use chrono::NaiveDate;
use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::catalog::resolve_supplier;
use crate::error::Result;
use crate::fmt::money;
use crate::models::{PaymentMethod, Supplier};
use crate::purchases::{self, NewPurchase};
use crate::repo;
use crate::sales::LineRequest;
use crate::settings::load_settings;

use super::sales::status_cell;
use super::{open_store, parse_after, print_next, today};

#[allow(clippy::too_many_arguments)]
pub fn record(
    supplier: &str,
    items: Vec<LineRequest>,
    tax_rate: f64,
    paid: f64,
    method: PaymentMethod,
    due: Option<NaiveDate>,
    date: Option<NaiveDate>,
) -> Result<()> {
    let store = open_store()?;
    let supplier = resolve_supplier(&store, supplier)?;
    let date = date.unwrap_or_else(today);
    let due_date = due.or_else(|| date.checked_add_days(chrono::Days::new(load_settings().credit_terms_days.max(0) as u64)));
    let purchase = purchases::record_purchase(
        &store,
        NewPurchase {
            supplier_id: supplier.id,
            date,
            lines: items,
            tax_rate,
            amount_paid: paid,
            method,
            due_date,
        },
    )?;
    println!("Recorded purchase {} from {}", purchase.number.bold(), supplier.name);
    println!("Total:   {}", money(purchase.total));
    println!("Balance: {}", money(purchase.balance));
    if let Some(d) = purchase.due_date {
        println!("Due:     {d}");
    }
    Ok(())
}

pub fn list(supplier: Option<&str>, after: Option<&str>) -> Result<()> {
    let store = open_store()?;
    let cursor = parse_after(after)?;
    let supplier_id = supplier
        .map(|s| resolve_supplier(&store, s).map(|s| s.id))
        .transpose()?;
    let page = purchases::list_purchases(&store, supplier_id.as_deref(), load_settings().page_size, cursor.as_ref())?;

    let mut table = Table::new();
    table.set_header(vec!["Number", "Date", "Supplier", "Total", "Balance", "Due", "Status"]);
    for p in &page.items {
        let name = repo::find::<Supplier>(&store, &p.supplier_id)?
            .map(|s| s.name)
            .unwrap_or_else(|| p.supplier_id.clone());
        table.add_row(vec![
            Cell::new(&p.number),
            Cell::new(p.date),
            Cell::new(name),
            Cell::new(money(p.total)),
            Cell::new(money(p.balance)),
            Cell::new(p.due_date.map(|d| d.to_string()).unwrap_or_default()),
            status_cell(p.payment_status),
        ]);
    }
    println!("Purchases\n{table}");
    print_next(&page);
    Ok(())
}

pub fn pay(key: &str, amount: f64, method: PaymentMethod, date: Option<NaiveDate>) -> Result<()> {
    let store = open_store()?;
    let purchase = purchases::resolve_purchase(&store, key)?;
    let paid = purchases::pay_purchase(&store, &purchase.id, amount, date.unwrap_or_else(today), method)?;
    println!("Paid {} on {}", money(amount), paid.number);
    println!("Balance: {}", money(paid.balance));
    Ok(())
}

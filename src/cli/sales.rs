use chrono::NaiveDate;
use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::catalog::resolve_customer;
use crate::error::Result;
use crate::fmt::money;
use crate::installments;
use crate::models::{PaymentMethod, PaymentStatus, PaymentType, Sale};
use crate::reports::customer_name;
use crate::sales::{self, LineRequest, NewSale};
use crate::settings::load_settings;
use crate::store::DocumentStore;

use super::{open_store, parse_after, print_next, today};

pub(crate) fn status_cell(status: PaymentStatus) -> Cell {
    match status {
        PaymentStatus::Paid => Cell::new(status.as_str().green()),
        PaymentStatus::Partial => Cell::new(status.as_str().yellow()),
        PaymentStatus::Unpaid => Cell::new(status.as_str().red()),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn record(
    items: Vec<LineRequest>,
    customer: Option<&str>,
    payment_type: PaymentType,
    discount: f64,
    tax_rate: Option<f64>,
    paid: Option<f64>,
    method: PaymentMethod,
    date: Option<NaiveDate>,
) -> Result<()> {
    let store = open_store()?;
    let settings = load_settings();
    let customer_id = customer
        .map(|c| resolve_customer(&store, c).map(|c| c.id))
        .transpose()?;
    let sale = sales::record_sale(
        &store,
        NewSale {
            date: date.unwrap_or_else(today),
            customer_id,
            lines: items,
            discount,
            tax_rate,
            payment_type,
            amount_paid: paid,
            method,
        },
        settings.default_tax_rate,
    )?;
    println!("Recorded sale {}", sale.number.bold());
    println!("Total:   {}", money(sale.total));
    println!("Paid:    {}", money(sale.amount_paid));
    println!("Balance: {}", money(sale.balance));
    if sale.payment_type == PaymentType::Installment {
        println!("Next: shopledger plans create {} --count N", sale.number);
    }
    Ok(())
}

fn sale_row(store: &dyn DocumentStore, s: &Sale) -> Result<Vec<Cell>> {
    let number = if s.voided {
        Cell::new(format!("{} (void)", s.number).dimmed())
    } else {
        Cell::new(&s.number)
    };
    Ok(vec![
        number,
        Cell::new(s.date),
        Cell::new(customer_name(store, s.customer_id.as_deref())?),
        Cell::new(s.payment_type.as_str()),
        Cell::new(money(s.total)),
        Cell::new(money(s.balance)),
        status_cell(s.payment_status),
    ])
}

pub fn list(customer: Option<&str>, voided: bool, after: Option<&str>) -> Result<()> {
    let store = open_store()?;
    let cursor = parse_after(after)?;
    let customer_id = customer
        .map(|c| resolve_customer(&store, c).map(|c| c.id))
        .transpose()?;
    let page = sales::list_sales(
        &store,
        customer_id.as_deref(),
        voided,
        load_settings().page_size,
        cursor.as_ref(),
    )?;

    let mut table = Table::new();
    table.set_header(vec!["Number", "Date", "Customer", "Type", "Total", "Balance", "Status"]);
    for s in &page.items {
        table.add_row(sale_row(&store, s)?);
    }
    println!("Sales\n{table}");
    print_next(&page);
    Ok(())
}

pub fn show(key: &str) -> Result<()> {
    let store = open_store()?;
    let sale = sales::resolve_sale(&store, key)?;

    println!("Sale {}  {}", sale.number.bold(), sale.date);
    println!("Customer: {}", customer_name(&store, sale.customer_id.as_deref())?);
    if sale.voided {
        println!("{}", "VOIDED".red().bold());
    }

    let mut items = Table::new();
    items.set_header(vec!["Item", "Qty", "Price", "Discount", "Line Total"]);
    for i in &sale.items {
        items.add_row(vec![
            Cell::new(&i.name),
            Cell::new(i.quantity),
            Cell::new(money(i.unit_price)),
            Cell::new(money(i.discount)),
            Cell::new(money(i.line_total())),
        ]);
    }
    println!("{items}");
    println!("Subtotal: {}", money(sale.subtotal));
    println!("Discount: {}", money(sale.discount));
    println!("Tax ({}%): {}", sale.tax_rate, money(sale.tax_amount));
    println!("Total:    {}", money(sale.total).bold());
    println!("Paid:     {}", money(sale.amount_paid));
    println!("Balance:  {}  [{}]", money(sale.balance), sale.payment_status.as_str());

    let payments = sales::payments_for_sale(&store, &sale.id)?;
    if !payments.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Date", "Amount", "Method", "Note"]);
        for p in &payments {
            table.add_row(vec![
                Cell::new(p.date),
                Cell::new(money(p.amount)),
                Cell::new(p.method.as_str()),
                Cell::new(p.note.as_deref().unwrap_or_default()),
            ]);
        }
        println!("\nPayments\n{table}");
    }

    if let Some(plan_id) = &sale.installment_plan_id {
        let schedule = installments::schedule(&store, plan_id)?;
        println!("\n{} installments, see `shopledger plans show {}`", schedule.len(), sale.number);
    }
    Ok(())
}

pub fn pay(key: &str, amount: f64, method: PaymentMethod, date: Option<NaiveDate>) -> Result<()> {
    let store = open_store()?;
    let sale = sales::resolve_sale(&store, key)?;
    let payment = sales::receive_payment(&store, &sale.id, amount, date.unwrap_or_else(today), method)?;
    let after = sales::resolve_sale(&store, &sale.id)?;
    println!("Received {} on {}", money(payment.amount), after.number);
    println!("Balance: {}", money(after.balance));
    Ok(())
}

pub fn void(key: &str) -> Result<()> {
    let store = open_store()?;
    let sale = sales::resolve_sale(&store, key)?;
    let voided = sales::void_sale(&store, &sale.id)?;
    println!("Voided sale {}; items returned to stock.", voided.number);
    if voided.amount_paid > 0.0 {
        println!(
            "{} {} was collected and remains on record.",
            "Note:".yellow(),
            money(voided.amount_paid)
        );
    }
    Ok(())
}

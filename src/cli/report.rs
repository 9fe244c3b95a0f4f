use chrono::NaiveDate;
use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::fmt::{money, pct};
use crate::ledger;
use crate::reports::{self, DateRange};
use crate::settings::load_settings;

use super::{open_store, parse_month_opt, today};

fn range(
    month: Option<String>,
    year: Option<i32>,
    from_date: Option<NaiveDate>,
    to_date: Option<NaiveDate>,
) -> Result<DateRange> {
    let (my, mm) = parse_month_opt(&month);
    DateRange::resolve(year.or(my), mm, from_date, to_date, today())
}

fn signed(val: f64) -> Cell {
    if val < 0.0 {
        Cell::new(money(val).red())
    } else {
        Cell::new(money(val))
    }
}

pub fn summary(
    month: Option<String>,
    year: Option<i32>,
    from_date: Option<NaiveDate>,
    to_date: Option<NaiveDate>,
) -> Result<()> {
    let store = open_store()?;
    let range = range(month, year, from_date, to_date)?;
    let s = reports::sales_summary(&store, &range)?;

    let mut table = Table::new();
    table.set_header(vec!["Date", "Sales", "Total"]);
    for d in &s.days {
        table.add_row(vec![Cell::new(d.date), Cell::new(d.count), Cell::new(money(d.total))]);
    }
    println!("Sales Summary {}\n{table}", range.label());
    println!("Sales:       {}", s.count);
    println!("Subtotal:    {}", money(s.subtotal));
    println!("Discounts:   {}", money(s.discounts));
    println!("Tax:         {}", money(s.tax));
    println!("Total:       {}", money(s.total).bold());
    println!("Collected:   {}", money(s.collected));
    println!("Outstanding: {}", money(s.outstanding));
    Ok(())
}

pub fn products(
    month: Option<String>,
    year: Option<i32>,
    from_date: Option<NaiveDate>,
    to_date: Option<NaiveDate>,
) -> Result<()> {
    let store = open_store()?;
    let range = range(month, year, from_date, to_date)?;
    let rows = reports::sales_by_product(&store, &range)?;

    let mut table = Table::new();
    table.set_header(vec!["Product", "Qty", "Revenue", "Cost", "Profit", "Share"]);
    for r in &rows {
        table.add_row(vec![
            Cell::new(&r.name),
            Cell::new(r.quantity),
            Cell::new(money(r.revenue)),
            Cell::new(money(r.cost)),
            signed(r.profit),
            Cell::new(pct(r.share)),
        ]);
    }
    println!("Sales by Product {}\n{table}", range.label());
    Ok(())
}

pub fn customers(
    month: Option<String>,
    year: Option<i32>,
    from_date: Option<NaiveDate>,
    to_date: Option<NaiveDate>,
) -> Result<()> {
    let store = open_store()?;
    let range = range(month, year, from_date, to_date)?;
    let rows = reports::sales_by_customer(&store, &range)?;

    let mut table = Table::new();
    table.set_header(vec!["Customer", "Sales", "Total", "Paid", "Outstanding"]);
    for r in &rows {
        table.add_row(vec![
            Cell::new(&r.name),
            Cell::new(r.count),
            Cell::new(money(r.total)),
            Cell::new(money(r.paid)),
            Cell::new(money(r.outstanding)),
        ]);
    }
    println!("Sales by Customer {}\n{table}", range.label());
    Ok(())
}

pub fn expenses(year: Option<i32>) -> Result<()> {
    let store = open_store()?;
    let year = year.unwrap_or_else(|| chrono::Datelike::year(&today()));
    let report = reports::monthly_expenses(&store, year)?;

    let mut months = Table::new();
    months.set_header(vec!["Month", "Total", "Tax"]);
    for m in &report.months {
        months.add_row(vec![Cell::new(&m.month), Cell::new(money(m.total)), Cell::new(money(m.tax))]);
    }
    months.add_row(vec![
        Cell::new("TOTAL".bold()),
        Cell::new(money(report.total).bold()),
        Cell::new(""),
    ]);
    println!("Expenses {}\n{months}", report.year);

    let mut cats = Table::new();
    cats.set_header(vec!["Category", "Count", "Total", "%"]);
    for c in &report.categories {
        cats.add_row(vec![
            Cell::new(&c.name),
            Cell::new(c.count),
            Cell::new(money(c.total)),
            Cell::new(pct(c.pct)),
        ]);
    }
    println!("By Category\n{cats}");
    Ok(())
}

pub fn aging() -> Result<()> {
    let store = open_store()?;
    let report = reports::inventory_aging(&store, today())?;

    let mut table = Table::new();
    table.set_header(vec!["Age", "Products", "Units", "Value at Cost"]);
    for b in &report.buckets {
        table.add_row(vec![
            Cell::new(b.label),
            Cell::new(b.products),
            Cell::new(b.quantity),
            Cell::new(money(b.value)),
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL".bold()),
        Cell::new(""),
        Cell::new(""),
        Cell::new(money(report.total_value).bold()),
    ]);
    println!("Inventory Aging\n{table}");

    let stale: Vec<_> = report
        .items
        .iter()
        .filter(|i| i.bucket == reports::AGING_BUCKETS.len() - 1)
        .collect();
    if !stale.is_empty() {
        println!("{}", "Over 90 days:".yellow());
        for i in stale {
            println!("  {} x{} ({} days, {})", i.name, i.quantity, i.days, money(i.value));
        }
    }
    Ok(())
}

pub fn tax(
    month: Option<String>,
    year: Option<i32>,
    from_date: Option<NaiveDate>,
    to_date: Option<NaiveDate>,
) -> Result<()> {
    let store = open_store()?;
    let range = range(month, year, from_date, to_date)?;
    let report = reports::tax_report(&store, &range)?;

    let mut table = Table::new();
    table.set_header(vec!["Month", "Collected", "Paid", "Net"]);
    for m in &report.months {
        table.add_row(vec![
            Cell::new(&m.month),
            Cell::new(money(m.output_tax)),
            Cell::new(money(m.input_tax)),
            signed(m.net),
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL".bold()),
        Cell::new(money(report.output_tax)),
        Cell::new(money(report.input_tax)),
        signed(report.net_payable),
    ]);
    println!("Tax {}\n{table}", range.label());
    Ok(())
}

pub fn pnl(
    month: Option<String>,
    year: Option<i32>,
    from_date: Option<NaiveDate>,
    to_date: Option<NaiveDate>,
) -> Result<()> {
    let store = open_store()?;
    let range = range(month, year, from_date, to_date)?;
    let p = reports::profit_and_loss(&store, &range)?;

    let mut table = Table::new();
    table.set_header(vec!["", "Amount"]);
    table.add_row(vec![Cell::new("Revenue".green().bold()), Cell::new(money(p.revenue))]);
    table.add_row(vec![Cell::new("  Cost of goods"), Cell::new(money(p.cost_of_goods))]);
    table.add_row(vec![Cell::new("Gross Profit".bold()), signed(p.gross_profit)]);
    table.add_row(vec![Cell::new("Expenses".red().bold()), Cell::new(money(p.expenses))]);
    let net_label = if p.net_profit >= 0.0 {
        "NET".green().bold()
    } else {
        "NET".red().bold()
    };
    table.add_row(vec![Cell::new(net_label), signed(p.net_profit)]);
    println!("Profit & Loss {}\n{table}", range.label());
    Ok(())
}

pub fn receivables() -> Result<()> {
    let store = open_store()?;
    let rows = ledger::receivables(&store, today(), load_settings().credit_terms_days)?;
    if rows.is_empty() {
        println!("{}", "Nothing owed by customers.".green());
        return Ok(());
    }
    let mut table = Table::new();
    table.set_header(vec!["Customer", "Open Sales", "Outstanding", "Overdue"]);
    for r in &rows {
        let overdue = if r.overdue > 0.0 {
            Cell::new(money(r.overdue).red())
        } else {
            Cell::new(money(r.overdue))
        };
        table.add_row(vec![
            Cell::new(&r.name),
            Cell::new(r.open_sales),
            Cell::new(money(r.outstanding)),
            overdue,
        ]);
    }
    let total: f64 = rows.iter().map(|r| r.outstanding).sum();
    println!("Receivables\n{table}");
    println!("Total: {}", money(total).bold());
    Ok(())
}

pub fn payables() -> Result<()> {
    let store = open_store()?;
    let rows = ledger::payables(&store, today())?;
    if rows.is_empty() {
        println!("{}", "Nothing owed to suppliers.".green());
        return Ok(());
    }
    let mut table = Table::new();
    table.set_header(vec!["Supplier", "Open Purchases", "Outstanding", "Overdue"]);
    for r in &rows {
        let overdue = if r.overdue > 0.0 {
            Cell::new(money(r.overdue).red())
        } else {
            Cell::new(money(r.overdue))
        };
        table.add_row(vec![
            Cell::new(&r.name),
            Cell::new(r.open_purchases),
            Cell::new(money(r.outstanding)),
            overdue,
        ]);
    }
    let total: f64 = rows.iter().map(|r| r.outstanding).sum();
    println!("Payables\n{table}");
    println!("Total: {}", money(total).bold());
    Ok(())
}

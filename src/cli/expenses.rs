use chrono::NaiveDate;
use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::expenses::{self, NewExpense};
use crate::fmt::money;
use crate::models::PaymentMethod;
use crate::reports::DateRange;

use super::{open_store, parse_month_opt, today};

#[allow(clippy::too_many_arguments)]
pub fn add(
    category: &str,
    amount: f64,
    description: &str,
    tax: f64,
    vendor: Option<String>,
    method: PaymentMethod,
    date: Option<NaiveDate>,
) -> Result<()> {
    let store = open_store()?;
    let expense = expenses::add_expense(
        &store,
        NewExpense {
            date: date.unwrap_or_else(today),
            category: category.to_string(),
            description: description.to_string(),
            amount,
            tax_amount: tax,
            vendor,
            method,
        },
    )?;
    println!("Added expense: {} {} on {}", expense.category, money(expense.amount), expense.date);
    Ok(())
}

pub fn list(month: Option<String>, year: Option<i32>) -> Result<()> {
    let store = open_store()?;
    let (my, mm) = parse_month_opt(&month);
    let range = DateRange::resolve(year.or(my), mm, None, None, today())?;
    let rows = expenses::list_expenses(&store, &range)?;

    let mut table = Table::new();
    table.set_header(vec!["Date", "Category", "Description", "Vendor", "Amount", "Tax"]);
    let mut total = 0.0;
    for e in &rows {
        total += e.amount;
        table.add_row(vec![
            Cell::new(e.date),
            Cell::new(&e.category),
            Cell::new(&e.description),
            Cell::new(e.vendor.as_deref().unwrap_or_default()),
            Cell::new(money(e.amount)),
            Cell::new(money(e.tax_amount)),
        ]);
    }
    println!("Expenses {}\n{table}", range.label());
    println!("Total: {}", money(total));
    Ok(())
}

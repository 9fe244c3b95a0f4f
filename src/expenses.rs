use chrono::NaiveDate;
use tracing::info;

use crate::error::{LedgerError, Result};
use crate::models::{round2, Expense, PaymentMethod};
use crate::query::{self, Direction, Op, Query};
use crate::repo::{self, Entity};
use crate::reports::DateRange;
use crate::store::DocumentStore;

#[derive(Debug, Clone)]
pub struct NewExpense {
    pub date: NaiveDate,
    pub category: String,
    pub description: String,
    pub amount: f64,
    pub tax_amount: f64,
    pub vendor: Option<String>,
    pub method: PaymentMethod,
}

pub fn add_expense(store: &dyn DocumentStore, new: NewExpense) -> Result<Expense> {
    if !new.amount.is_finite() || new.amount <= 0.0 {
        return Err(LedgerError::invalid("expense amount must be positive"));
    }
    if !new.tax_amount.is_finite() || new.tax_amount < 0.0 || new.tax_amount > new.amount {
        return Err(LedgerError::invalid("tax must be between 0 and the expense amount"));
    }
    let category = new.category.trim();
    if category.is_empty() {
        return Err(LedgerError::invalid("expense category is required"));
    }
    let expense = Expense {
        id: uuid::Uuid::new_v4().to_string(),
        date: new.date,
        category: category.to_string(),
        description: new.description,
        amount: round2(new.amount),
        tax_amount: round2(new.tax_amount),
        vendor: new.vendor,
        method: new.method,
    };
    repo::save(store, &expense)?;
    info!(expense = %expense.id, category = %expense.category, amount = expense.amount, "expense added");
    Ok(expense)
}

/// Expenses dated inside `range`, oldest first.
pub fn list_expenses(store: &dyn DocumentStore, range: &DateRange) -> Result<Vec<Expense>> {
    let q = Query::new(Expense::COLLECTION)
        .filter("date", Op::Ge, range.from.to_string())
        .filter("date", Op::Le, range.to.to_string())
        .order_by("date", Direction::Asc);
    query::run_as(store, &q)
}

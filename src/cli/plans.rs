use chrono::NaiveDate;
use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::{LedgerError, Result};
use crate::fmt::money;
use crate::installments::{self, PlanTerms, ReconcileReport};
use crate::models::{Frequency, Installment, InstallmentPlan, InstallmentStatus, PaymentMethod, Sale};
use crate::reports::customer_name;
use crate::repo;
use crate::sales::resolve_sale;
use crate::store::DocumentStore;

use super::{open_store, today};

pub fn create(
    key: &str,
    count: u32,
    frequency: Frequency,
    down_payment: f64,
    start: Option<NaiveDate>,
) -> Result<()> {
    let store = open_store()?;
    let sale = resolve_sale(&store, key)?;
    let today = today();
    let start_date = match start {
        Some(d) => d,
        None => installments::due_date(today, frequency, 1)?,
    };
    let (plan, schedule) = installments::create_plan(
        &store,
        &sale.id,
        PlanTerms {
            down_payment,
            count,
            frequency,
            start_date,
        },
        today,
    )?;
    println!(
        "Plan created for {}: {} financed over {} installments",
        sale.number.bold(),
        money(plan.total_amount),
        schedule.len()
    );
    print_schedule(&schedule, today);
    Ok(())
}

fn status_cell(status: InstallmentStatus) -> Cell {
    match status {
        InstallmentStatus::Paid => Cell::new(status.as_str().green()),
        InstallmentStatus::Partial => Cell::new(status.as_str().yellow()),
        InstallmentStatus::Overdue => Cell::new(status.as_str().red().bold()),
        InstallmentStatus::Pending => Cell::new(status.as_str()),
    }
}

fn print_schedule(schedule: &[Installment], today: NaiveDate) {
    let mut table = Table::new();
    table.set_header(vec!["#", "Due", "Amount", "Paid", "Remaining", "Status"]);
    for i in schedule {
        table.add_row(vec![
            Cell::new(i.sequence),
            Cell::new(i.due_date),
            Cell::new(money(i.amount)),
            Cell::new(money(i.amount_paid)),
            Cell::new(money(i.remaining())),
            status_cell(i.effective_status(today)),
        ]);
    }
    println!("{table}");
}

fn plan_of(store: &dyn DocumentStore, key: &str) -> Result<(Sale, InstallmentPlan)> {
    let sale = resolve_sale(store, key)?;
    let plan_id = sale
        .installment_plan_id
        .clone()
        .ok_or_else(|| LedgerError::invalid(format!("sale {} has no installment plan", sale.number)))?;
    let plan: InstallmentPlan = repo::load(store, &plan_id)?;
    Ok((sale, plan))
}

pub fn show(key: &str) -> Result<()> {
    let store = open_store()?;
    let (sale, plan) = plan_of(&store, key)?;
    let schedule = installments::schedule(&store, &plan.id)?;

    println!("Sale {}  {}", sale.number.bold(), customer_name(&store, sale.customer_id.as_deref())?);
    println!("Sale total:   {}", money(sale.total));
    println!("Down payment: {}", money(plan.down_payment));
    println!("Financed:     {}", money(plan.total_amount));
    println!("Paid:         {}", money(plan.amount_paid));
    println!("Remaining:    {}", money(plan.remaining_balance));
    print_schedule(&schedule, today());
    Ok(())
}

pub fn pay(
    key: &str,
    amount: f64,
    installment: Option<u32>,
    method: PaymentMethod,
    date: Option<NaiveDate>,
) -> Result<()> {
    let store = open_store()?;
    let (_, plan) = plan_of(&store, key)?;
    let date = date.unwrap_or_else(today);
    let outcome = match installment {
        Some(seq) => {
            let target = installments::schedule(&store, &plan.id)?
                .into_iter()
                .find(|i| i.sequence == seq)
                .ok_or_else(|| LedgerError::invalid(format!("no installment #{seq} on this plan")))?;
            installments::pay_installment(&store, &target.id, amount, date, method)?
        }
        None => installments::pay_plan(&store, &plan.id, amount, date, method)?,
    };

    println!("Received {} on {}", money(outcome.payment.amount), outcome.sale.number);
    for inst in &outcome.touched {
        println!(
            "  #{} {} -> {} ({})",
            inst.sequence,
            inst.due_date,
            money(inst.amount_paid),
            inst.status.as_str()
        );
    }
    println!("Plan remaining: {}", money(outcome.plan.remaining_balance));
    Ok(())
}

pub fn overdue(as_of: Option<NaiveDate>) -> Result<()> {
    let store = open_store()?;
    let rows = installments::overdue(&store, as_of.unwrap_or_else(today))?;
    if rows.is_empty() {
        println!("{}", "No overdue installments.".green());
        return Ok(());
    }
    let mut table = Table::new();
    table.set_header(vec!["Sale", "Customer", "#", "Due", "Days Late", "Remaining"]);
    let mut total = 0.0;
    for r in &rows {
        total += r.remaining;
        table.add_row(vec![
            Cell::new(&r.sale_number),
            Cell::new(customer_name(&store, r.customer_id.as_deref())?),
            Cell::new(r.installment.sequence),
            Cell::new(r.installment.due_date),
            Cell::new(r.days_overdue.to_string().red()),
            Cell::new(money(r.remaining)),
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL".bold()),
        Cell::new(""),
        Cell::new(""),
        Cell::new(""),
        Cell::new(""),
        Cell::new(money(total).bold()),
    ]);
    println!("Overdue Installments\n{table}");
    Ok(())
}

fn print_report(report: &ReconcileReport) {
    if report.is_consistent() {
        println!("{} {}", report.sale_number, "OK".green());
        return;
    }
    let verb = if report.applied { "fixed" } else { "needs fixing" };
    println!("{} {}", report.sale_number, verb.yellow().bold());
    for c in &report.corrections {
        println!("  {} {} {}: {} -> {}", c.entity, &c.id[..c.id.len().min(8)], c.field, c.before, c.after);
    }
    if let Some((scheduled, financed)) = report.schedule_mismatch {
        println!(
            "  {} schedule sums to {} but plan finances {}",
            "warning:".red(),
            money(scheduled),
            money(financed)
        );
    }
}

pub fn reconcile(key: Option<&str>, apply: bool) -> Result<()> {
    let store = open_store()?;
    let reports = match key {
        Some(k) => {
            let sale = resolve_sale(&store, k)?;
            vec![installments::reconcile(&store, &sale.id, apply)?]
        }
        None => installments::reconcile_all(&store, apply)?,
    };
    if reports.is_empty() {
        println!("No installment sales to check.");
        return Ok(());
    }
    for r in &reports {
        print_report(r);
    }
    let pending = reports.iter().filter(|r| !r.is_consistent() && !r.applied).count();
    if pending > 0 {
        println!("\n{pending} sale(s) out of step. Re-run with --apply to write corrections.");
    }
    Ok(())
}

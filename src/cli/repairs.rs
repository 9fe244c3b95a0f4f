use chrono::NaiveDate;
use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::catalog::resolve_customer;
use crate::error::Result;
use crate::fmt::money;
use crate::models::{PaymentMethod, RepairStatus};
use crate::repairs::{self, NewRepair};
use crate::reports::customer_name;

use super::{open_store, today};

pub fn add(customer: &str, device: &str, issue: &str, estimate: f64, promised: Option<NaiveDate>) -> Result<()> {
    let store = open_store()?;
    let customer = resolve_customer(&store, customer)?;
    let repair = repairs::create_repair(
        &store,
        NewRepair {
            customer_id: customer.id,
            device: device.to_string(),
            issue: issue.to_string(),
            received: today(),
            promised,
            estimated_cost: estimate,
        },
    )?;
    println!("Opened repair {} for {}: {}", repair.id, customer.name, repair.device);
    Ok(())
}

pub fn list() -> Result<()> {
    let store = open_store()?;
    let today = today();
    let open = repairs::open_repairs(&store)?;
    if open.is_empty() {
        println!("No open repairs.");
        return Ok(());
    }
    let mut table = Table::new();
    table.set_header(vec!["ID", "Customer", "Device", "Status", "Received", "Promised", "Estimate"]);
    for r in &open {
        let promised = match r.promised {
            Some(d) if d < today => Cell::new(d.to_string().red()),
            Some(d) => Cell::new(d),
            None => Cell::new(""),
        };
        table.add_row(vec![
            Cell::new(&r.id),
            Cell::new(customer_name(&store, Some(&r.customer_id))?),
            Cell::new(&r.device),
            Cell::new(r.status.as_str()),
            Cell::new(r.received),
            promised,
            Cell::new(money(r.estimated_cost)),
        ]);
    }
    println!("Open Repairs\n{table}");
    Ok(())
}

pub fn advance(id: &str, status: RepairStatus, cost: Option<f64>) -> Result<()> {
    let store = open_store()?;
    let repair = repairs::advance(&store, id, status, cost, today())?;
    println!("Repair {} is now {}", repair.id, repair.status.as_str().bold());
    if repair.status == RepairStatus::Delivered {
        let owed = repair.chargeable() - repair.amount_paid;
        if owed > 0.0 {
            println!("Still owed: {}", money(owed).red());
        }
    }
    Ok(())
}

pub fn pay(id: &str, amount: f64, method: PaymentMethod) -> Result<()> {
    let store = open_store()?;
    let repair = repairs::pay_repair(&store, id, amount, today(), method)?;
    println!("Received {} for repair {}", money(amount), repair.id);
    println!("Paid {} of {}", money(repair.amount_paid), money(repair.chargeable()));
    Ok(())
}

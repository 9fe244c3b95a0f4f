use comfy_table::{Cell, Table};

use crate::catalog;
use crate::error::Result;
use crate::settings::load_settings;

use super::{open_store, parse_after, print_next, today};

pub fn add_customer(name: &str, phone: Option<&str>, email: Option<&str>, address: Option<&str>) -> Result<()> {
    let store = open_store()?;
    let c = catalog::add_customer(&store, name, phone, email, address, today())?;
    println!("Added customer: {} ({})", c.name, c.id);
    Ok(())
}

pub fn list_customers(search: Option<&str>, after: Option<&str>) -> Result<()> {
    let store = open_store()?;
    let cursor = parse_after(after)?;
    let page = catalog::list_customers(&store, search, load_settings().page_size, cursor.as_ref())?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Phone", "Email", "Address"]);
    for c in &page.items {
        table.add_row(vec![
            Cell::new(&c.id),
            Cell::new(&c.name),
            Cell::new(c.phone.as_deref().unwrap_or_default()),
            Cell::new(c.email.as_deref().unwrap_or_default()),
            Cell::new(c.address.as_deref().unwrap_or_default()),
        ]);
    }
    println!("Customers\n{table}");
    print_next(&page);
    Ok(())
}

pub fn add_supplier(name: &str, phone: Option<&str>, email: Option<&str>) -> Result<()> {
    let store = open_store()?;
    let s = catalog::add_supplier(&store, name, phone, email, today())?;
    println!("Added supplier: {} ({})", s.name, s.id);
    Ok(())
}

pub fn list_suppliers(after: Option<&str>) -> Result<()> {
    let store = open_store()?;
    let cursor = parse_after(after)?;
    let page = catalog::list_suppliers(&store, load_settings().page_size, cursor.as_ref())?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Phone", "Email"]);
    for s in &page.items {
        table.add_row(vec![
            Cell::new(&s.id),
            Cell::new(&s.name),
            Cell::new(s.phone.as_deref().unwrap_or_default()),
            Cell::new(s.email.as_deref().unwrap_or_default()),
        ]);
    }
    println!("Suppliers\n{table}");
    print_next(&page);
    Ok(())
}

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::catalog::{self, NewProduct};
use crate::error::Result;
use crate::fmt::money;
use crate::models::Product;
use crate::settings::load_settings;

use super::{open_store, parse_after, print_next, today};

#[allow(clippy::too_many_arguments)]
pub fn add(
    name: &str,
    sku: Option<String>,
    category: Option<String>,
    price: f64,
    cost: f64,
    quantity: i64,
    reorder_level: i64,
) -> Result<()> {
    let store = open_store()?;
    let product = catalog::add_product(
        &store,
        NewProduct {
            name: name.to_string(),
            sku,
            category,
            unit_price: price,
            cost_price: cost,
            quantity,
            reorder_level,
        },
        today(),
    )?;
    println!("Added product: {} ({})", product.name, product.id);
    Ok(())
}

fn product_table(products: &[Product]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["ID", "SKU", "Name", "Category", "Price", "Cost", "Qty"]);
    for p in products {
        let qty = if p.quantity <= p.reorder_level {
            Cell::new(p.quantity.to_string().red())
        } else {
            Cell::new(p.quantity)
        };
        table.add_row(vec![
            Cell::new(&p.id),
            Cell::new(p.sku.as_deref().unwrap_or_default()),
            Cell::new(&p.name),
            Cell::new(p.category.as_deref().unwrap_or_default()),
            Cell::new(money(p.unit_price)),
            Cell::new(money(p.cost_price)),
            qty,
        ]);
    }
    table
}

pub fn list(search: Option<&str>, after: Option<&str>) -> Result<()> {
    let store = open_store()?;
    let cursor = parse_after(after)?;
    let page = catalog::search_products(&store, search, load_settings().page_size, cursor.as_ref())?;
    println!("Products\n{}", product_table(&page.items));
    print_next(&page);
    Ok(())
}

pub fn adjust(product: &str, delta: i64, reason: &str) -> Result<()> {
    let store = open_store()?;
    let found = catalog::resolve_product(&store, product)?;
    let updated = catalog::adjust_stock(&store, &found.id, delta, reason)?;
    println!("{}: {} -> {}", updated.name, found.quantity, updated.quantity);
    Ok(())
}

pub fn low_stock() -> Result<()> {
    let store = open_store()?;
    let low = catalog::low_stock(&store)?;
    if low.is_empty() {
        println!("{}", "All products above reorder level.".green());
        return Ok(());
    }
    let mut table = Table::new();
    table.set_header(vec!["Name", "SKU", "Qty", "Reorder At", "Short"]);
    for p in &low {
        table.add_row(vec![
            Cell::new(&p.name),
            Cell::new(p.sku.as_deref().unwrap_or_default()),
            Cell::new(p.quantity),
            Cell::new(p.reorder_level),
            Cell::new((p.reorder_level - p.quantity).to_string().red()),
        ]);
    }
    println!("Low Stock\n{table}");
    Ok(())
}

use chrono::NaiveDate;
use serde_json::json;
use tracing::info;

use crate::error::{LedgerError, Result};
use crate::models::{round2, Customer, Product, Supplier};
use crate::query::{self, Cursor, Direction, Op, Page, Query};
use crate::repo::{self, Entity};
use crate::store::DocumentStore;

pub struct NewProduct {
    pub name: String,
    pub sku: Option<String>,
    pub category: Option<String>,
    pub unit_price: f64,
    pub cost_price: f64,
    pub quantity: i64,
    pub reorder_level: i64,
}

pub fn add_product(store: &dyn DocumentStore, new: NewProduct, today: NaiveDate) -> Result<Product> {
    if new.name.trim().is_empty() {
        return Err(LedgerError::invalid("product name is required"));
    }
    if !new.unit_price.is_finite() || !new.cost_price.is_finite() {
        return Err(LedgerError::invalid("price and cost must be finite numbers"));
    }
    if new.unit_price < 0.0 || new.cost_price < 0.0 || new.quantity < 0 {
        return Err(LedgerError::invalid("price, cost and quantity must not be negative"));
    }
    if let Some(sku) = &new.sku {
        let clash = query::run(store, &Query::new(Product::COLLECTION).filter("sku", Op::Eq, sku.as_str()))?;
        if !clash.is_empty() {
            return Err(LedgerError::invalid(format!("SKU already in use: {sku}")));
        }
    }
    let product = Product {
        id: uuid::Uuid::new_v4().to_string(),
        name: new.name.trim().to_string(),
        sku: new.sku,
        category: new.category,
        unit_price: round2(new.unit_price),
        cost_price: round2(new.cost_price),
        quantity: new.quantity,
        reorder_level: new.reorder_level,
        created: today,
        last_received: if new.quantity > 0 { Some(today) } else { None },
    };
    repo::save(store, &product)?;
    info!(product = %product.id, name = %product.name, "product added");
    Ok(product)
}

/// Resolve a product by id or SKU.
pub fn resolve_product(store: &dyn DocumentStore, key: &str) -> Result<Product> {
    if let Some(p) = repo::find::<Product>(store, key)? {
        return Ok(p);
    }
    query::run_as::<Product>(store, &Query::new(Product::COLLECTION).filter("sku", Op::Eq, key))?
        .into_iter()
        .next()
        .ok_or_else(|| LedgerError::not_found(Product::COLLECTION, key))
}

/// Quantity arithmetic that refuses to wrap.
pub(crate) fn add_stock(product: &str, a: i64, b: i64) -> Result<i64> {
    a.checked_add(b)
        .ok_or_else(|| LedgerError::invalid(format!("quantity out of range for {product}")))
}

pub fn adjust_stock(store: &dyn DocumentStore, product_id: &str, delta: i64, reason: &str) -> Result<Product> {
    let mut product: Product = repo::load(store, product_id)?;
    let new_qty = add_stock(&product.name, product.quantity, delta)?;
    if new_qty < 0 {
        return Err(LedgerError::InsufficientStock {
            product: product.name.clone(),
            available: product.quantity,
            requested: delta.checked_neg().unwrap_or(i64::MAX),
        });
    }
    store.update(Product::COLLECTION, product_id, json!({ "quantity": new_qty }))?;
    info!(product = %product_id, delta, reason, "stock adjusted");
    product.quantity = new_qty;
    Ok(product)
}

/// Products at or below their reorder level, biggest shortfall first.
pub fn low_stock(store: &dyn DocumentStore) -> Result<Vec<Product>> {
    let mut low: Vec<Product> = repo::all::<Product>(store)?
        .into_iter()
        .filter(|p| p.quantity <= p.reorder_level)
        .collect();
    low.sort_by(|a, b| {
        (b.reorder_level - b.quantity)
            .cmp(&(a.reorder_level - a.quantity))
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(low)
}

pub fn search_products(
    store: &dyn DocumentStore,
    text: Option<&str>,
    page_size: usize,
    cursor: Option<&Cursor>,
) -> Result<Page<Product>> {
    let mut q = Query::new(Product::COLLECTION).order_by("name", Direction::Asc);
    if let Some(t) = text.filter(|t| !t.is_empty()) {
        q = q.filter("name", Op::Contains, t);
    }
    query::paginate_as(store, &q, page_size, cursor)
}

pub fn add_customer(
    store: &dyn DocumentStore,
    name: &str,
    phone: Option<&str>,
    email: Option<&str>,
    address: Option<&str>,
    today: NaiveDate,
) -> Result<Customer> {
    if name.trim().is_empty() {
        return Err(LedgerError::invalid("customer name is required"));
    }
    let customer = Customer {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.trim().to_string(),
        phone: phone.map(String::from),
        email: email.map(String::from),
        address: address.map(String::from),
        created: today,
    };
    repo::save(store, &customer)?;
    info!(customer = %customer.id, "customer added");
    Ok(customer)
}

pub fn add_supplier(
    store: &dyn DocumentStore,
    name: &str,
    phone: Option<&str>,
    email: Option<&str>,
    today: NaiveDate,
) -> Result<Supplier> {
    if name.trim().is_empty() {
        return Err(LedgerError::invalid("supplier name is required"));
    }
    let supplier = Supplier {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.trim().to_string(),
        phone: phone.map(String::from),
        email: email.map(String::from),
        created: today,
    };
    repo::save(store, &supplier)?;
    info!(supplier = %supplier.id, "supplier added");
    Ok(supplier)
}

pub fn list_customers(
    store: &dyn DocumentStore,
    text: Option<&str>,
    page_size: usize,
    cursor: Option<&Cursor>,
) -> Result<Page<Customer>> {
    let mut q = Query::new(Customer::COLLECTION).order_by("name", Direction::Asc);
    if let Some(t) = text.filter(|t| !t.is_empty()) {
        q = q.filter("name", Op::Contains, t);
    }
    query::paginate_as(store, &q, page_size, cursor)
}

pub fn list_suppliers(store: &dyn DocumentStore, page_size: usize, cursor: Option<&Cursor>) -> Result<Page<Supplier>> {
    let q = Query::new(Supplier::COLLECTION).order_by("name", Direction::Asc);
    query::paginate_as(store, &q, page_size, cursor)
}

/// Resolve a party by id, then by exact name. A name shared by several
/// records is ambiguous.
fn resolve_party<T: Entity>(store: &dyn DocumentStore, key: &str) -> Result<T> {
    if let Some(found) = repo::find::<T>(store, key)? {
        return Ok(found);
    }
    let mut matches = query::run_as::<T>(store, &Query::new(T::COLLECTION).filter("name", Op::Eq, key.trim()))?;
    match matches.len() {
        0 => Err(LedgerError::not_found(T::COLLECTION, key)),
        1 => Ok(matches.remove(0)),
        n => Err(LedgerError::invalid(format!("{n} {} named '{key}', use the id", T::COLLECTION))),
    }
}

pub fn resolve_customer(store: &dyn DocumentStore, key: &str) -> Result<Customer> {
    resolve_party(store, key)
}

pub fn resolve_supplier(store: &dyn DocumentStore, key: &str) -> Result<Supplier> {
    resolve_party(store, key)
}

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};

use crate::error::{LedgerError, Result};
use crate::models::{round2, Customer, Expense, Product, Purchase, Sale};
use crate::query::{self, Direction, Op, Query};
use crate::repo::{self, Entity};
use crate::store::DocumentStore;

// ---------------------------------------------------------------------------
// Period helper
// ---------------------------------------------------------------------------

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    pub fn year(year: i32) -> Result<Self> {
        let from = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(|| LedgerError::invalid(format!("bad year {year}")))?;
        let to = NaiveDate::from_ymd_opt(year, 12, 31).ok_or_else(|| LedgerError::invalid(format!("bad year {year}")))?;
        Ok(Self { from, to })
    }

    pub fn month(year: i32, month: u32) -> Result<Self> {
        let from = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| LedgerError::invalid(format!("bad month {year}-{month:02}")))?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        };
        let to = next
            .and_then(|d| d.pred_opt())
            .ok_or_else(|| LedgerError::invalid(format!("bad month {year}-{month:02}")))?;
        Ok(Self { from, to })
    }

    /// Explicit from/to wins (both or neither), then year+month, then year, else the current year.
    pub fn resolve(
        year: Option<i32>,
        month: Option<u32>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<Self> {
        match (from, to) {
            (Some(from), Some(to)) => {
                if from > to {
                    return Err(LedgerError::invalid("start date is after end date"));
                }
                return Ok(Self { from, to });
            }
            (Some(_), None) => {
                return Err(LedgerError::invalid(
                    "--from requires --to (both date boundaries must be specified)",
                ));
            }
            (None, Some(_)) => {
                return Err(LedgerError::invalid(
                    "--to requires --from (both date boundaries must be specified)",
                ));
            }
            (None, None) => {}
        }
        match (year, month) {
            (Some(y), Some(m)) => Self::month(y, m),
            (Some(y), None) => Self::year(y),
            (None, Some(m)) => Self::month(today.year(), m),
            (None, None) => Self::year(today.year()),
        }
    }

    pub fn label(&self) -> String {
        format!("{} to {}", self.from, self.to)
    }

    fn apply(&self, q: Query, field: &str) -> Query {
        q.filter(field, Op::Ge, self.from.to_string())
            .filter(field, Op::Le, self.to.to_string())
    }
}

fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Non-voided sales dated inside the range, oldest first.
pub fn live_sales(store: &dyn DocumentStore, range: &DateRange) -> Result<Vec<Sale>> {
    let q = range
        .apply(Query::new(Sale::COLLECTION), "date")
        .filter("voided", Op::Eq, false)
        .order_by("date", Direction::Asc);
    query::run_as(store, &q)
}

fn purchases_in(store: &dyn DocumentStore, range: &DateRange) -> Result<Vec<Purchase>> {
    let q = range.apply(Query::new(Purchase::COLLECTION), "date");
    query::run_as(store, &q)
}

fn expenses_in(store: &dyn DocumentStore, range: &DateRange) -> Result<Vec<Expense>> {
    let q = range.apply(Query::new(Expense::COLLECTION), "date");
    query::run_as(store, &q)
}

// ---------------------------------------------------------------------------
// Sales summary
// ---------------------------------------------------------------------------

pub struct DaySales {
    pub date: NaiveDate,
    pub count: usize,
    pub total: f64,
}

pub struct SalesSummary {
    pub count: usize,
    pub subtotal: f64,
    pub discounts: f64,
    pub tax: f64,
    pub total: f64,
    pub collected: f64,
    pub outstanding: f64,
    pub days: Vec<DaySales>,
}

pub fn sales_summary(store: &dyn DocumentStore, range: &DateRange) -> Result<SalesSummary> {
    let sales = live_sales(store, range)?;
    let mut days: BTreeMap<NaiveDate, (usize, f64)> = BTreeMap::new();
    for s in &sales {
        let entry = days.entry(s.date).or_default();
        entry.0 += 1;
        entry.1 += s.total;
    }
    Ok(SalesSummary {
        count: sales.len(),
        subtotal: round2(sales.iter().map(|s| s.subtotal).sum()),
        discounts: round2(sales.iter().map(|s| s.discount).sum()),
        tax: round2(sales.iter().map(|s| s.tax_amount).sum()),
        total: round2(sales.iter().map(|s| s.total).sum()),
        collected: round2(sales.iter().map(|s| s.amount_paid).sum()),
        outstanding: round2(sales.iter().map(|s| s.balance).sum()),
        days: days
            .into_iter()
            .map(|(date, (count, total))| DaySales {
                date,
                count,
                total: round2(total),
            })
            .collect(),
    })
}

// ---------------------------------------------------------------------------
// Sales by product
// ---------------------------------------------------------------------------

pub struct ProductSales {
    pub product_id: String,
    pub name: String,
    pub quantity: i64,
    /// Line totals after line discounts, before sale-level discount and tax.
    pub revenue: f64,
    pub cost: f64,
    pub profit: f64,
    pub share: f64,
}

pub fn sales_by_product(store: &dyn DocumentStore, range: &DateRange) -> Result<Vec<ProductSales>> {
    let mut by_product: HashMap<String, ProductSales> = HashMap::new();
    for sale in live_sales(store, range)? {
        for item in &sale.items {
            let row = by_product.entry(item.product_id.clone()).or_insert_with(|| ProductSales {
                product_id: item.product_id.clone(),
                name: item.name.clone(),
                quantity: 0,
                revenue: 0.0,
                cost: 0.0,
                profit: 0.0,
                share: 0.0,
            });
            row.quantity += item.quantity;
            row.revenue += item.line_total();
            row.cost += item.line_cost();
        }
    }
    let total: f64 = by_product.values().map(|r| r.revenue).sum();
    let mut rows: Vec<ProductSales> = by_product
        .into_values()
        .map(|mut r| {
            r.revenue = round2(r.revenue);
            r.cost = round2(r.cost);
            r.profit = round2(r.revenue - r.cost);
            r.share = if total != 0.0 { r.revenue / total * 100.0 } else { 0.0 };
            r
        })
        .collect();
    rows.sort_by(|a, b| {
        b.revenue
            .partial_cmp(&a.revenue)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Sales by customer
// ---------------------------------------------------------------------------

pub const WALK_IN: &str = "Walk-in";

pub struct CustomerSales {
    pub customer_id: Option<String>,
    pub name: String,
    pub count: usize,
    pub total: f64,
    pub paid: f64,
    pub outstanding: f64,
}

pub fn customer_name(store: &dyn DocumentStore, id: Option<&str>) -> Result<String> {
    match id {
        Some(id) => Ok(repo::find::<Customer>(store, id)?
            .map(|c| c.name)
            .unwrap_or_else(|| id.to_string())),
        None => Ok(WALK_IN.to_string()),
    }
}

pub fn sales_by_customer(store: &dyn DocumentStore, range: &DateRange) -> Result<Vec<CustomerSales>> {
    let mut by_customer: HashMap<Option<String>, CustomerSales> = HashMap::new();
    for sale in live_sales(store, range)? {
        let key = sale.customer_id.clone();
        if !by_customer.contains_key(&key) {
            let name = customer_name(store, key.as_deref())?;
            by_customer.insert(
                key.clone(),
                CustomerSales {
                    customer_id: key.clone(),
                    name,
                    count: 0,
                    total: 0.0,
                    paid: 0.0,
                    outstanding: 0.0,
                },
            );
        }
        if let Some(row) = by_customer.get_mut(&key) {
            row.count += 1;
            row.total += sale.total;
            row.paid += sale.amount_paid;
            row.outstanding += sale.balance;
        }
    }
    let mut rows: Vec<CustomerSales> = by_customer
        .into_values()
        .map(|mut r| {
            r.total = round2(r.total);
            r.paid = round2(r.paid);
            r.outstanding = round2(r.outstanding);
            r
        })
        .collect();
    rows.sort_by(|a, b| {
        b.total
            .partial_cmp(&a.total)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Monthly expenses
// ---------------------------------------------------------------------------

pub struct ExpenseMonth {
    pub month: String,
    pub total: f64,
    pub tax: f64,
}

pub struct ExpenseCategory {
    pub name: String,
    pub total: f64,
    pub count: usize,
    pub pct: f64,
}

pub struct MonthlyExpenses {
    pub year: i32,
    pub months: Vec<ExpenseMonth>,
    pub categories: Vec<ExpenseCategory>,
    pub total: f64,
}

pub fn monthly_expenses(store: &dyn DocumentStore, year: i32) -> Result<MonthlyExpenses> {
    let expenses = expenses_in(store, &DateRange::year(year)?)?;

    let mut months: Vec<ExpenseMonth> = (1..=12)
        .map(|m| ExpenseMonth {
            month: format!("{year:04}-{m:02}"),
            total: 0.0,
            tax: 0.0,
        })
        .collect();
    let mut categories: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for e in &expenses {
        let slot = &mut months[e.date.month0() as usize];
        slot.total += e.amount;
        slot.tax += e.tax_amount;
        let cat = categories.entry(e.category.clone()).or_default();
        cat.0 += e.amount;
        cat.1 += 1;
    }
    for m in &mut months {
        m.total = round2(m.total);
        m.tax = round2(m.tax);
    }

    let total = round2(expenses.iter().map(|e| e.amount).sum());
    let mut categories: Vec<ExpenseCategory> = categories
        .into_iter()
        .map(|(name, (t, count))| ExpenseCategory {
            name,
            total: round2(t),
            count,
            pct: if total != 0.0 { t / total * 100.0 } else { 0.0 },
        })
        .collect();
    categories.sort_by(|a, b| b.total.partial_cmp(&a.total).unwrap_or(std::cmp::Ordering::Equal));

    Ok(MonthlyExpenses {
        year,
        months,
        categories,
        total,
    })
}

// ---------------------------------------------------------------------------
// Inventory aging
// ---------------------------------------------------------------------------

/// (label, first day, last day) of each aging bucket.
pub const AGING_BUCKETS: [(&str, i64, Option<i64>); 4] = [
    ("0-30 days", 0, Some(30)),
    ("31-60 days", 31, Some(60)),
    ("61-90 days", 61, Some(90)),
    ("91+ days", 91, None),
];

pub struct AgingItem {
    pub product_id: String,
    pub name: String,
    pub quantity: i64,
    pub days: i64,
    pub value: f64,
    pub bucket: usize,
}

pub struct AgingBucket {
    pub label: &'static str,
    pub products: usize,
    pub quantity: i64,
    pub value: f64,
}

pub struct InventoryAging {
    pub buckets: Vec<AgingBucket>,
    pub items: Vec<AgingItem>,
    pub total_value: f64,
}

fn bucket_for(days: i64) -> usize {
    AGING_BUCKETS
        .iter()
        .position(|(_, lo, hi)| days >= *lo && hi.map(|h| days <= h).unwrap_or(true))
        .unwrap_or(0)
}

/// Stock on hand grouped by days since it was last received.
pub fn inventory_aging(store: &dyn DocumentStore, today: NaiveDate) -> Result<InventoryAging> {
    let mut buckets: Vec<AgingBucket> = AGING_BUCKETS
        .iter()
        .map(|(label, _, _)| AgingBucket {
            label: *label,
            products: 0,
            quantity: 0,
            value: 0.0,
        })
        .collect();

    let mut items = Vec::new();
    for p in repo::all::<Product>(store)? {
        if p.quantity <= 0 {
            continue;
        }
        let anchor = p.last_received.unwrap_or(p.created);
        let days = (today - anchor).num_days().max(0);
        let value = round2(p.quantity as f64 * p.cost_price);
        let bucket = bucket_for(days);
        buckets[bucket].products += 1;
        buckets[bucket].quantity += p.quantity;
        buckets[bucket].value += value;
        items.push(AgingItem {
            product_id: p.id,
            name: p.name,
            quantity: p.quantity,
            days,
            value,
            bucket,
        });
    }
    for b in &mut buckets {
        b.value = round2(b.value);
    }
    items.sort_by(|a, b| b.days.cmp(&a.days).then_with(|| a.name.cmp(&b.name)));
    let total_value = round2(items.iter().map(|i| i.value).sum());

    Ok(InventoryAging {
        buckets,
        items,
        total_value,
    })
}

// ---------------------------------------------------------------------------
// Tax
// ---------------------------------------------------------------------------

pub struct TaxMonth {
    pub month: String,
    pub output_tax: f64,
    pub input_tax: f64,
    pub net: f64,
}

pub struct TaxReport {
    pub months: Vec<TaxMonth>,
    pub output_tax: f64,
    pub input_tax: f64,
    pub net_payable: f64,
}

/// Tax collected on sales against tax paid on purchases and expenses.
pub fn tax_report(store: &dyn DocumentStore, range: &DateRange) -> Result<TaxReport> {
    let mut months: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    for s in live_sales(store, range)? {
        months.entry(month_key(s.date)).or_default().0 += s.tax_amount;
    }
    for p in purchases_in(store, range)? {
        months.entry(month_key(p.date)).or_default().1 += p.tax_amount;
    }
    for e in expenses_in(store, range)? {
        months.entry(month_key(e.date)).or_default().1 += e.tax_amount;
    }

    let months: Vec<TaxMonth> = months
        .into_iter()
        .map(|(month, (out, inp))| TaxMonth {
            month,
            output_tax: round2(out),
            input_tax: round2(inp),
            net: round2(out - inp),
        })
        .collect();
    let output_tax = round2(months.iter().map(|m| m.output_tax).sum());
    let input_tax = round2(months.iter().map(|m| m.input_tax).sum());
    Ok(TaxReport {
        months,
        output_tax,
        input_tax,
        net_payable: round2(output_tax - input_tax),
    })
}

// ---------------------------------------------------------------------------
// Profit & loss
// ---------------------------------------------------------------------------

pub struct ProfitAndLoss {
    pub revenue: f64,
    pub cost_of_goods: f64,
    pub gross_profit: f64,
    pub expenses: f64,
    pub net_profit: f64,
}

pub fn profit_and_loss(store: &dyn DocumentStore, range: &DateRange) -> Result<ProfitAndLoss> {
    let sales = live_sales(store, range)?;
    let revenue = round2(sales.iter().map(|s| s.total - s.tax_amount).sum());
    let cost_of_goods = round2(
        sales
            .iter()
            .flat_map(|s| s.items.iter())
            .map(|i| i.line_cost())
            .sum(),
    );
    let expenses = round2(
        expenses_in(store, range)?
            .iter()
            .map(|e| e.amount - e.tax_amount)
            .sum(),
    );
    let gross_profit = round2(revenue - cost_of_goods);
    Ok(ProfitAndLoss {
        revenue,
        cost_of_goods,
        gross_profit,
        expenses,
        net_profit: round2(gross_profit - expenses),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::{day, product};
    use crate::catalog::{add_customer, add_supplier};
    use crate::expenses::tests::expense;
    use crate::models::{PaymentMethod, PaymentType};
    use crate::purchases::tests::purchase;
    use crate::sales::tests::{line, sale_for};
    use crate::sales::{record_sale, void_sale, NewSale};
    use crate::store::MemoryStore;
    use serde_json::json;

    struct Seed {
        store: MemoryStore,
        ana: String,
    }

    /// Phone 500 (cost 300), Case 20 (cost 5); Ana buys on credit, a walk-in pays cash.
    fn seeded() -> Seed {
        let store = MemoryStore::new();
        let phone = product(&store, "Phone", 500.0, 300.0, 10);
        let case = product(&store, "Case", 20.0, 5.0, 50);
        let ana = add_customer(&store, "Ana", None, None, None, day("2025-01-01")).unwrap();

        record_sale(
            &store,
            NewSale {
                date: day("2025-02-03"),
                customer_id: Some(ana.id.clone()),
                lines: vec![line(&phone.id, 1), line(&case.id, 2)],
                discount: 40.0,
                tax_rate: Some(10.0),
                payment_type: PaymentType::Credit,
                amount_paid: Some(100.0),
                method: PaymentMethod::Cash,
            },
            0.0,
        )
        .unwrap();
        sale_for(&store, None, vec![line(&case.id, 3)], PaymentType::Cash, "2025-02-03");
        sale_for(&store, None, vec![line(&case.id, 1)], PaymentType::Cash, "2025-02-20");
        let voided = sale_for(&store, None, vec![line(&phone.id, 2)], PaymentType::Cash, "2025-02-21");
        void_sale(&store, &voided.id).unwrap();
        // Outside the February range.
        sale_for(&store, None, vec![line(&case.id, 1)], PaymentType::Cash, "2025-03-01");

        Seed { store, ana: ana.id }
    }

    fn feb() -> DateRange {
        DateRange::month(2025, 2).unwrap()
    }

    #[test]
    fn test_resolve_range() {
        let today = day("2025-06-15");
        assert_eq!(
            DateRange::resolve(None, None, None, None, today).unwrap(),
            DateRange::new(day("2025-01-01"), day("2025-12-31"))
        );
        assert_eq!(
            DateRange::resolve(Some(2024), Some(2), None, None, today).unwrap(),
            DateRange::new(day("2024-02-01"), day("2024-02-29"))
        );
        assert_eq!(
            DateRange::resolve(Some(2024), Some(12), None, None, today).unwrap().to,
            day("2024-12-31")
        );
        assert_eq!(
            DateRange::resolve(Some(2024), None, Some(day("2025-01-05")), Some(day("2025-01-09")), today).unwrap(),
            DateRange::new(day("2025-01-05"), day("2025-01-09"))
        );
        assert!(DateRange::resolve(None, None, Some(day("2025-02-01")), Some(day("2025-01-01")), today).is_err());
        // One-sided ranges are rejected rather than widened to the year.
        assert!(DateRange::resolve(None, None, Some(day("2025-03-01")), None, today).is_err());
        assert!(DateRange::resolve(Some(2025), Some(3), None, Some(day("2025-03-31")), today).is_err());
        assert!(DateRange::month(2025, 13).is_err());
    }

    #[test]
    fn test_sales_summary() {
        let seed = seeded();
        let s = sales_summary(&seed.store, &feb()).unwrap();
        // Ana: 540 - 40 = 500 + 50 tax = 550. Cash: 60 and 20.
        assert_eq!(s.count, 3);
        assert_eq!(s.subtotal, 620.0);
        assert_eq!(s.discounts, 40.0);
        assert_eq!(s.tax, 50.0);
        assert_eq!(s.total, 630.0);
        assert_eq!(s.collected, 180.0);
        assert_eq!(s.outstanding, 450.0);
        assert_eq!(s.days.len(), 2);
        assert_eq!(s.days[0].count, 2);
        assert_eq!(s.days[0].total, 610.0);
    }

    #[test]
    fn test_sales_by_product() {
        let seed = seeded();
        let rows = sales_by_product(&seed.store, &feb()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Phone");
        assert_eq!(rows[0].quantity, 1);
        assert_eq!(rows[0].profit, 200.0);
        assert_eq!(rows[1].name, "Case");
        assert_eq!(rows[1].quantity, 6);
        assert_eq!(rows[1].revenue, 120.0);
        assert_eq!(rows[1].cost, 30.0);
        let share: f64 = rows.iter().map(|r| r.share).sum();
        assert!((share - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_sales_by_customer_groups_walk_ins() {
        let seed = seeded();
        let rows = sales_by_customer(&seed.store, &feb()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].customer_id.as_deref(), Some(seed.ana.as_str()));
        assert_eq!(rows[0].name, "Ana");
        assert_eq!(rows[0].outstanding, 450.0);
        assert_eq!(rows[1].name, WALK_IN);
        assert_eq!(rows[1].count, 2);
        assert_eq!(rows[1].total, 80.0);
    }

    #[test]
    fn test_monthly_expenses() {
        let store = MemoryStore::new();
        expense(&store, "2025-01-05", "Rent", 1000.0, 0.0);
        expense(&store, "2025-01-20", "Utilities", 100.0, 10.0);
        expense(&store, "2025-03-02", "Rent", 1000.0, 0.0);
        expense(&store, "2024-12-31", "Rent", 999.0, 0.0);
        let r = monthly_expenses(&store, 2025).unwrap();
        assert_eq!(r.months.len(), 12);
        assert_eq!(r.months[0].total, 1100.0);
        assert_eq!(r.months[0].tax, 10.0);
        assert_eq!(r.months[1].total, 0.0);
        assert_eq!(r.months[2].month, "2025-03");
        assert_eq!(r.total, 2100.0);
        assert_eq!(r.categories[0].name, "Rent");
        assert_eq!(r.categories[0].count, 2);
    }

    #[test]
    fn test_inventory_aging_buckets() {
        let store = MemoryStore::new();
        let fresh = product(&store, "Fresh", 1.0, 2.0, 5);
        let stale = product(&store, "Stale", 1.0, 10.0, 3);
        let gone = product(&store, "Gone", 1.0, 10.0, 0);
        store
            .update(Product::COLLECTION, &fresh.id, json!({ "last_received": "2025-03-20" }))
            .unwrap();
        store
            .update(Product::COLLECTION, &gone.id, json!({ "last_received": null }))
            .unwrap();
        let r = inventory_aging(&store, day("2025-04-15")).unwrap();
        assert_eq!(r.items.len(), 2);
        assert_eq!(r.items[0].product_id, stale.id);
        assert_eq!(r.items[0].days, 104);
        assert_eq!(r.buckets[0].products, 1);
        assert_eq!(r.buckets[0].value, 10.0);
        assert_eq!(r.buckets[3].quantity, 3);
        assert_eq!(r.buckets[3].value, 30.0);
        assert_eq!(r.total_value, 40.0);
    }

    #[test]
    fn test_bucket_edges() {
        assert_eq!(bucket_for(0), 0);
        assert_eq!(bucket_for(30), 0);
        assert_eq!(bucket_for(31), 1);
        assert_eq!(bucket_for(90), 2);
        assert_eq!(bucket_for(91), 3);
    }

    #[test]
    fn test_tax_report_nets_input_against_output() {
        let seed = seeded();
        let supplier = add_supplier(&seed.store, "Acme", None, None, day("2025-01-01")).unwrap();
        let screen = product(&seed.store, "Screen", 1.0, 10.0, 0);
        // 10 x 10 at 10% tax = 10 input tax.
        purchase(&seed.store, &supplier.id, vec![line(&screen.id, 10)], 0.0, "2025-02-10");
        expense(&seed.store, "2025-02-11", "Utilities", 55.0, 5.0);

        let r = tax_report(&seed.store, &feb()).unwrap();
        assert_eq!(r.months.len(), 1);
        assert_eq!(r.output_tax, 50.0);
        assert_eq!(r.input_tax, 15.0);
        assert_eq!(r.net_payable, 35.0);
    }

    #[test]
    fn test_profit_and_loss() {
        let seed = seeded();
        expense(&seed.store, "2025-02-11", "Utilities", 55.0, 5.0);
        let pnl = profit_and_loss(&seed.store, &feb()).unwrap();
        assert_eq!(pnl.revenue, 580.0);
        assert_eq!(pnl.cost_of_goods, 330.0);
        assert_eq!(pnl.gross_profit, 250.0);
        assert_eq!(pnl.expenses, 50.0);
        assert_eq!(pnl.net_profit, 200.0);
    }
}

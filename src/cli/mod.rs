pub mod backup;
pub mod expenses;
pub mod init;
pub mod parties;
pub mod plans;
pub mod products;
pub mod purchases;
pub mod repairs;
pub mod report;
pub mod sales;
pub mod status;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::error::{LedgerError, Result};
use crate::models::{Frequency, PaymentMethod, PaymentType, RepairStatus};
use crate::query::{Cursor, Page};
use crate::sales::LineRequest;
use crate::settings::{db_path, get_data_dir};
use crate::store::SqliteStore;

pub(crate) fn open_store() -> Result<SqliteStore> {
    let data_dir = get_data_dir();
    let path = db_path(&data_dir);
    if !path.exists() {
        return Err(LedgerError::Settings(format!(
            "No database found at {}\nRun `shopledger init` to set up.",
            path.display()
        )));
    }
    SqliteStore::open(&path)
}

pub(crate) fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

pub(crate) fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| format!("expected YYYY-MM-DD, got '{s}'"))
}

/// Money and rate arguments: plain finite numbers only.
pub(crate) fn parse_amount(s: &str) -> std::result::Result<f64, String> {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("expected a number, got '{s}'"))
}

/// `YYYY-MM` into (year, month).
pub(crate) fn parse_month_opt(month: &Option<String>) -> (Option<i32>, Option<u32>) {
    if let Some(m) = month {
        let parts: Vec<&str> = m.split('-').collect();
        if parts.len() == 2 {
            let year = parts[0].parse().ok();
            let month = parts[1].parse().ok();
            return (year, month);
        }
    }
    (None, None)
}

pub(crate) fn parse_after(after: Option<&str>) -> Result<Option<Cursor>> {
    after.map(Cursor::decode).transpose()
}

pub(crate) fn print_next<T>(page: &Page<T>) {
    println!("Showing {} of {}", page.items.len(), page.total);
    if let Some(next) = &page.next {
        println!("More: --after {}", next.encode());
    }
}

#[derive(Parser)]
#[command(name = "shopledger", version, about = "Point-of-sale back office: sales, installments, purchases and reports.")]
pub struct Cli {
    /// Log at debug level (overridden by SHOPLEDGER_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for shop data (default: ~/Documents/shopledger)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// Business name shown on reports
        #[arg(long)]
        name: Option<String>,
        /// Default sales tax percentage
        #[arg(long = "tax-rate", value_parser = parse_amount)]
        tax_rate: Option<f64>,
    },
    /// Show current database and record counts.
    Status,
    /// Back up the database.
    Backup {
        /// Output path (default: <data_dir>/backups/shopledger-YYYYMMDD-HHMMSS.db)
        #[arg(long)]
        output: Option<String>,
    },
    /// Manage the product catalog and stock.
    Products {
        #[command(subcommand)]
        command: ProductsCommands,
    },
    /// Manage customers.
    Customers {
        #[command(subcommand)]
        command: CustomersCommands,
    },
    /// Manage suppliers.
    Suppliers {
        #[command(subcommand)]
        command: SuppliersCommands,
    },
    /// Record and manage sales.
    Sales {
        #[command(subcommand)]
        command: SalesCommands,
    },
    /// Installment plans.
    Plans {
        #[command(subcommand)]
        command: PlansCommands,
    },
    /// Stock purchases from suppliers.
    Purchases {
        #[command(subcommand)]
        command: PurchasesCommands,
    },
    /// Business expenses.
    Expenses {
        #[command(subcommand)]
        command: ExpensesCommands,
    },
    /// Repair tickets.
    Repairs {
        #[command(subcommand)]
        command: RepairsCommands,
    },
    /// Generate reports.
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
}

#[derive(Subcommand)]
pub enum ProductsCommands {
    /// Add a product.
    Add {
        name: String,
        #[arg(long)]
        sku: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// Selling price
        #[arg(long, value_parser = parse_amount)]
        price: f64,
        /// Cost price
        #[arg(long, default_value = "0", value_parser = parse_amount)]
        cost: f64,
        /// Opening stock
        #[arg(long = "qty", default_value = "0")]
        quantity: i64,
        #[arg(long = "reorder-level", default_value = "0")]
        reorder_level: i64,
    },
    /// List products, optionally filtered by name.
    List {
        #[arg(long)]
        search: Option<String>,
        /// Page token from a previous listing
        #[arg(long)]
        after: Option<String>,
    },
    /// Adjust stock by a signed quantity.
    Adjust {
        /// Product id or SKU
        product: String,
        #[arg(allow_hyphen_values = true)]
        delta: i64,
        #[arg(long, default_value = "manual adjustment")]
        reason: String,
    },
    /// Products at or below their reorder level.
    LowStock,
}

#[derive(Subcommand)]
pub enum CustomersCommands {
    /// Add a customer.
    Add {
        name: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        address: Option<String>,
    },
    /// List customers.
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        after: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum SuppliersCommands {
    /// Add a supplier.
    Add {
        name: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// List suppliers.
    List {
        #[arg(long)]
        after: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum SalesCommands {
    /// Record a sale. Items are PRODUCT:QTY[:PRICE] where PRODUCT is an id or SKU.
    Record {
        #[arg(required = true)]
        items: Vec<LineRequest>,
        #[arg(long)]
        customer: Option<String>,
        /// cash, credit or installment
        #[arg(long = "type", default_value = "cash")]
        payment_type: PaymentType,
        /// Sale-level discount amount
        #[arg(long, default_value = "0", value_parser = parse_amount)]
        discount: f64,
        /// Tax percentage (default from settings)
        #[arg(long = "tax-rate", value_parser = parse_amount)]
        tax_rate: Option<f64>,
        /// Amount paid now (cash sales default to the total)
        #[arg(long, value_parser = parse_amount)]
        paid: Option<f64>,
        #[arg(long, default_value = "cash")]
        method: PaymentMethod,
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
    /// List sales, newest first.
    List {
        #[arg(long)]
        customer: Option<String>,
        #[arg(long)]
        voided: bool,
        #[arg(long)]
        after: Option<String>,
    },
    /// Show a sale with its payments and schedule.
    Show {
        /// Sale id or number
        sale: String,
    },
    /// Take a payment against a sale.
    Pay {
        sale: String,
        #[arg(value_parser = parse_amount)]
        amount: f64,
        #[arg(long, default_value = "cash")]
        method: PaymentMethod,
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
    /// Void a sale and restock its items.
    Void { sale: String },
}

#[derive(Subcommand)]
pub enum PlansCommands {
    /// Put a sale on an installment plan.
    Create {
        sale: String,
        /// Number of installments
        #[arg(long)]
        count: u32,
        #[arg(long, default_value = "monthly")]
        frequency: Frequency,
        /// Total paid up front, including anything already paid on the sale
        #[arg(long = "down", default_value = "0", value_parser = parse_amount)]
        down_payment: f64,
        /// First due date (default: one period from today)
        #[arg(long, value_parser = parse_date)]
        start: Option<NaiveDate>,
    },
    /// Show a sale's installment schedule.
    Show { sale: String },
    /// Pay towards a plan, or a specific installment with --installment.
    Pay {
        sale: String,
        #[arg(value_parser = parse_amount)]
        amount: f64,
        /// Installment number (1-based)
        #[arg(long)]
        installment: Option<u32>,
        #[arg(long, default_value = "cash")]
        method: PaymentMethod,
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
    /// Installments past their due date.
    Overdue {
        #[arg(long = "as-of", value_parser = parse_date)]
        as_of: Option<NaiveDate>,
    },
    /// Check sale, plan and installments agree; --apply writes corrections.
    Reconcile {
        /// Sale id or number (default: every sale with a plan)
        sale: Option<String>,
        #[arg(long)]
        apply: bool,
    },
}

#[derive(Subcommand)]
pub enum PurchasesCommands {
    /// Record a purchase. Items are PRODUCT:QTY[:UNIT_COST].
    Record {
        #[arg(long)]
        supplier: String,
        #[arg(required = true)]
        items: Vec<LineRequest>,
        #[arg(long = "tax-rate", default_value = "0", value_parser = parse_amount)]
        tax_rate: f64,
        #[arg(long, default_value = "0", value_parser = parse_amount)]
        paid: f64,
        #[arg(long, default_value = "transfer")]
        method: PaymentMethod,
        /// Payment due date
        #[arg(long, value_parser = parse_date)]
        due: Option<NaiveDate>,
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
    /// List purchases, newest first.
    List {
        #[arg(long)]
        supplier: Option<String>,
        #[arg(long)]
        after: Option<String>,
    },
    /// Pay a supplier against a purchase.
    Pay {
        purchase: String,
        #[arg(value_parser = parse_amount)]
        amount: f64,
        #[arg(long, default_value = "transfer")]
        method: PaymentMethod,
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
}

#[derive(Subcommand)]
pub enum ExpensesCommands {
    /// Add an expense.
    Add {
        category: String,
        #[arg(value_parser = parse_amount)]
        amount: f64,
        #[arg(long, default_value = "")]
        description: String,
        /// Tax included in the amount
        #[arg(long, default_value = "0", value_parser = parse_amount)]
        tax: f64,
        #[arg(long)]
        vendor: Option<String>,
        #[arg(long, default_value = "cash")]
        method: PaymentMethod,
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
    /// List expenses for a period.
    List {
        /// Month: YYYY-MM
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        year: Option<i32>,
    },
}

#[derive(Subcommand)]
pub enum RepairsCommands {
    /// Open a repair ticket.
    Add {
        #[arg(long)]
        customer: String,
        device: String,
        #[arg(long, default_value = "")]
        issue: String,
        #[arg(long, default_value = "0", value_parser = parse_amount)]
        estimate: f64,
        #[arg(long, value_parser = parse_date)]
        promised: Option<NaiveDate>,
    },
    /// Open tickets, oldest first.
    List,
    /// Move a ticket to a new status.
    Advance {
        repair: String,
        status: RepairStatus,
        /// Final cost to charge
        #[arg(long, value_parser = parse_amount)]
        cost: Option<f64>,
    },
    /// Take a payment for a repair.
    Pay {
        repair: String,
        #[arg(value_parser = parse_amount)]
        amount: f64,
        #[arg(long, default_value = "cash")]
        method: PaymentMethod,
    },
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Sales totals for a period.
    Summary {
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long = "from", value_parser = parse_date)]
        from_date: Option<NaiveDate>,
        #[arg(long = "to", value_parser = parse_date)]
        to_date: Option<NaiveDate>,
    },
    /// Sales by product.
    Products {
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long = "from", value_parser = parse_date)]
        from_date: Option<NaiveDate>,
        #[arg(long = "to", value_parser = parse_date)]
        to_date: Option<NaiveDate>,
    },
    /// Sales by customer.
    Customers {
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long = "from", value_parser = parse_date)]
        from_date: Option<NaiveDate>,
        #[arg(long = "to", value_parser = parse_date)]
        to_date: Option<NaiveDate>,
    },
    /// Monthly expense report for a year.
    Expenses {
        #[arg(long)]
        year: Option<i32>,
    },
    /// Inventory aging by days since last received.
    Aging,
    /// Output tax against input tax.
    Tax {
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long = "from", value_parser = parse_date)]
        from_date: Option<NaiveDate>,
        #[arg(long = "to", value_parser = parse_date)]
        to_date: Option<NaiveDate>,
    },
    /// Profit & loss.
    Pnl {
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long = "from", value_parser = parse_date)]
        from_date: Option<NaiveDate>,
        #[arg(long = "to", value_parser = parse_date)]
        to_date: Option<NaiveDate>,
    },
    /// Money owed by customers.
    Receivables,
    /// Money owed to suppliers.
    Payables,
}

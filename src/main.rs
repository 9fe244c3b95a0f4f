mod catalog;
mod cli;
mod error;
mod expenses;
mod fmt;
mod installments;
mod ledger;
mod models;
mod purchases;
mod query;
mod repairs;
mod repo;
mod reports;
mod sales;
mod settings;
mod store;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{
    Cli, Commands, CustomersCommands, ExpensesCommands, PlansCommands, ProductsCommands, PurchasesCommands,
    RepairsCommands, ReportCommands, SalesCommands, SuppliersCommands,
};

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("SHOPLEDGER_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Init {
            data_dir,
            name,
            tax_rate,
        } => cli::init::run(data_dir, name, tax_rate),
        Commands::Status => cli::status::run(),
        Commands::Backup { output } => cli::backup::run(output),
        Commands::Products { command } => match command {
            ProductsCommands::Add {
                name,
                sku,
                category,
                price,
                cost,
                quantity,
                reorder_level,
            } => cli::products::add(&name, sku, category, price, cost, quantity, reorder_level),
            ProductsCommands::List { search, after } => cli::products::list(search.as_deref(), after.as_deref()),
            ProductsCommands::Adjust { product, delta, reason } => cli::products::adjust(&product, delta, &reason),
            ProductsCommands::LowStock => cli::products::low_stock(),
        },
        Commands::Customers { command } => match command {
            CustomersCommands::Add {
                name,
                phone,
                email,
                address,
            } => cli::parties::add_customer(&name, phone.as_deref(), email.as_deref(), address.as_deref()),
            CustomersCommands::List { search, after } => {
                cli::parties::list_customers(search.as_deref(), after.as_deref())
            }
        },
        Commands::Suppliers { command } => match command {
            SuppliersCommands::Add { name, phone, email } => {
                cli::parties::add_supplier(&name, phone.as_deref(), email.as_deref())
            }
            SuppliersCommands::List { after } => cli::parties::list_suppliers(after.as_deref()),
        },
        Commands::Sales { command } => match command {
            SalesCommands::Record {
                items,
                customer,
                payment_type,
                discount,
                tax_rate,
                paid,
                method,
                date,
            } => cli::sales::record(
                items,
                customer.as_deref(),
                payment_type,
                discount,
                tax_rate,
                paid,
                method,
                date,
            ),
            SalesCommands::List {
                customer,
                voided,
                after,
            } => cli::sales::list(customer.as_deref(), voided, after.as_deref()),
            SalesCommands::Show { sale } => cli::sales::show(&sale),
            SalesCommands::Pay {
                sale,
                amount,
                method,
                date,
            } => cli::sales::pay(&sale, amount, method, date),
            SalesCommands::Void { sale } => cli::sales::void(&sale),
        },
        Commands::Plans { command } => match command {
            PlansCommands::Create {
                sale,
                count,
                frequency,
                down_payment,
                start,
            } => cli::plans::create(&sale, count, frequency, down_payment, start),
            PlansCommands::Show { sale } => cli::plans::show(&sale),
            PlansCommands::Pay {
                sale,
                amount,
                installment,
                method,
                date,
            } => cli::plans::pay(&sale, amount, installment, method, date),
            PlansCommands::Overdue { as_of } => cli::plans::overdue(as_of),
            PlansCommands::Reconcile { sale, apply } => cli::plans::reconcile(sale.as_deref(), apply),
        },
        Commands::Purchases { command } => match command {
            PurchasesCommands::Record {
                supplier,
                items,
                tax_rate,
                paid,
                method,
                due,
                date,
            } => cli::purchases::record(&supplier, items, tax_rate, paid, method, due, date),
            PurchasesCommands::List { supplier, after } => {
                cli::purchases::list(supplier.as_deref(), after.as_deref())
            }
            PurchasesCommands::Pay {
                purchase,
                amount,
                method,
                date,
            } => cli::purchases::pay(&purchase, amount, method, date),
        },
        Commands::Expenses { command } => match command {
            ExpensesCommands::Add {
                category,
                amount,
                description,
                tax,
                vendor,
                method,
                date,
            } => cli::expenses::add(&category, amount, &description, tax, vendor, method, date),
            ExpensesCommands::List { month, year } => cli::expenses::list(month, year),
        },
        Commands::Repairs { command } => match command {
            RepairsCommands::Add {
                customer,
                device,
                issue,
                estimate,
                promised,
            } => cli::repairs::add(&customer, &device, &issue, estimate, promised),
            RepairsCommands::List => cli::repairs::list(),
            RepairsCommands::Advance { repair, status, cost } => cli::repairs::advance(&repair, status, cost),
            RepairsCommands::Pay {
                repair,
                amount,
                method,
            } => cli::repairs::pay(&repair, amount, method),
        },
        Commands::Report { command } => match command {
            ReportCommands::Summary {
                month,
                year,
                from_date,
                to_date,
            } => cli::report::summary(month, year, from_date, to_date),
            ReportCommands::Products {
                month,
                year,
                from_date,
                to_date,
            } => cli::report::products(month, year, from_date, to_date),
            ReportCommands::Customers {
                month,
                year,
                from_date,
                to_date,
            } => cli::report::customers(month, year, from_date, to_date),
            ReportCommands::Expenses { year } => cli::report::expenses(year),
            ReportCommands::Aging => cli::report::aging(),
            ReportCommands::Tax {
                month,
                year,
                from_date,
                to_date,
            } => cli::report::tax(month, year, from_date, to_date),
            ReportCommands::Pnl {
                month,
                year,
                from_date,
                to_date,
            } => cli::report::pnl(month, year, from_date, to_date),
            ReportCommands::Receivables => cli::report::receivables(),
            ReportCommands::Payables => cli::report::payables(),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

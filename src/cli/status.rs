use crate::error::Result;
use crate::fmt::format_bytes;
use crate::settings::{db_path, load_settings};
use crate::store::SqliteStore;

pub fn run() -> Result<()> {
    let settings = load_settings();
    let data_dir = std::path::PathBuf::from(&settings.data_dir);
    let db_path = db_path(&data_dir);

    println!("Data dir:   {}", data_dir.display());
    println!("Database:   {}", db_path.display());

    if db_path.exists() {
        let size = std::fs::metadata(&db_path)?.len();
        println!("DB size:    {}", format_bytes(size));

        let store = SqliteStore::open(&db_path)?;
        let business = store.get_metadata("business_name")?;
        println!("Business:   {}", business.as_deref().unwrap_or("(not set)"));
        println!("Tax rate:   {}%", settings.default_tax_rate);

        let counts = store.counts()?;
        println!();
        if counts.is_empty() {
            println!("No records yet.");
        }
        for (collection, count) in counts {
            println!("{:<18} {count}", format!("{collection}:"));
        }
    } else {
        println!();
        println!("Database not found. Run `shopledger init` to set up.");
    }

    Ok(())
}

use std::path::PathBuf;

use crate::error::Result;
use crate::settings::{db_path, load_settings, save_settings, shellexpand_path};
use crate::store::SqliteStore;

pub fn run(data_dir: Option<String>, name: Option<String>, tax_rate: Option<f64>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = dir;
    }
    let resolved = PathBuf::from(shellexpand_path(&settings.data_dir));
    std::fs::create_dir_all(&resolved)?;
    settings.data_dir = resolved.to_string_lossy().to_string();
    if let Some(n) = name {
        settings.business_name = n.trim().to_string();
    }
    if let Some(rate) = tax_rate {
        settings.default_tax_rate = rate;
    }
    save_settings(&settings)?;

    let path = db_path(&resolved);
    let store = SqliteStore::open(&path)?;
    if !settings.business_name.is_empty() {
        store.set_metadata("business_name", &settings.business_name)?;
    }

    println!("Data directory: {}", resolved.display());
    println!("Database:       {}", path.display());
    if !settings.business_name.is_empty() {
        println!("Business:       {}", settings.business_name);
    }
    println!("Default tax:    {}%", settings.default_tax_rate);
    Ok(())
}

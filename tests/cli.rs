use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn shopledger(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("shopledger").unwrap();
    cmd.env("HOME", home.path())
        .env("NO_COLOR", "1")
        .env_remove("XDG_CONFIG_HOME")
        .env_remove("SHOPLEDGER_LOG");
    cmd
}

fn init(home: &TempDir) {
    let data = home.path().join("shop");
    shopledger(home)
        .args(["init", "--data-dir", data.to_str().unwrap(), "--name", "Corner Phones"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Corner Phones"));
}

#[test]
fn test_commands_fail_before_init() {
    let home = TempDir::new().unwrap();
    shopledger(&home)
        .args(["products", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:").and(predicate::str::contains("shopledger init")));
}

#[test]
fn test_init_and_status() {
    let home = TempDir::new().unwrap();
    init(&home);
    assert!(home.path().join("shop").join("shopledger.db").exists());
    assert!(home.path().join(".config/shopledger/settings.json").exists());
    shopledger(&home)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Business:   Corner Phones"));
}

#[test]
fn test_product_sale_and_report() {
    let home = TempDir::new().unwrap();
    init(&home);
    shopledger(&home)
        .args(["products", "add", "Phone Case", "--sku", "CASE", "--price", "10", "--cost", "4", "--qty", "5"])
        .assert()
        .success();
    shopledger(&home)
        .args(["products", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Phone Case").and(predicate::str::contains("$10.00")));

    shopledger(&home)
        .args(["sales", "record", "CASE:2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total:   $20.00"));

    // Only three left in stock.
    shopledger(&home)
        .args(["sales", "record", "CASE:4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Insufficient stock"));

    shopledger(&home)
        .args(["report", "summary"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sales:       1"));
    shopledger(&home)
        .args(["report", "products"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Phone Case"));
}

#[test]
fn test_installment_sale_flow() {
    let home = TempDir::new().unwrap();
    init(&home);
    shopledger(&home)
        .args(["products", "add", "Tablet", "--sku", "TAB", "--price", "300", "--qty", "1"])
        .assert()
        .success();
    shopledger(&home).args(["customers", "add", "Ana"]).assert().success();

    let out = shopledger(&home)
        .args(["sales", "record", "TAB:1", "--type", "installment", "--customer", "Ana"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let out = String::from_utf8(out).unwrap();
    let number = out
        .split_whitespace()
        .find(|w| w.starts_with("S-"))
        .expect("sale number in output")
        .to_string();

    shopledger(&home)
        .args(["plans", "create", &number, "--count", "3", "--down", "60", "--start", "2030-01-15"])
        .assert()
        .success()
        .stdout(predicate::str::contains("$240.00").and(predicate::str::contains("2030-03-15")));

    shopledger(&home)
        .args(["plans", "pay", &number, "100"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Plan remaining: $140.00"));

    shopledger(&home)
        .args(["plans", "reconcile", &number])
        .assert()
        .success()
        .stdout(predicate::str::contains("OK"));

    shopledger(&home)
        .args(["report", "receivables"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ana").and(predicate::str::contains("$140.00")));
}

#[test]
fn test_bad_page_token_rejected() {
    let home = TempDir::new().unwrap();
    init(&home);
    shopledger(&home)
        .args(["customers", "list", "--after", "zz"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("bad page token"));
}

/// First whitespace-separated word in stdout starting with `prefix`.
fn word_with_prefix(out: &[u8], prefix: &str) -> String {
    String::from_utf8_lossy(out)
        .split_whitespace()
        .find(|w| w.starts_with(prefix))
        .unwrap_or_else(|| panic!("no word starting with {prefix}"))
        .to_string()
}

#[test]
fn test_list_follows_page_token() {
    let home = TempDir::new().unwrap();
    init(&home);
    let settings = home.path().join(".config/shopledger/settings.json");
    let json = std::fs::read_to_string(&settings).unwrap();
    std::fs::write(&settings, json.replace("\"page_size\": 25", "\"page_size\": 2")).unwrap();

    for name in ["Ana", "Ben", "Cleo"] {
        shopledger(&home).args(["customers", "add", name]).assert().success();
    }

    let first = shopledger(&home)
        .args(["customers", "list"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Ana")
                .and(predicate::str::contains("Ben"))
                .and(predicate::str::contains("Cleo").not())
                .and(predicate::str::contains("Showing 2 of 3")),
        )
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(first).unwrap();
    let token = text
        .lines()
        .find_map(|l| l.strip_prefix("More: --after "))
        .expect("next page token")
        .trim()
        .to_string();

    shopledger(&home)
        .args(["customers", "list", "--after", &token])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Cleo")
                .and(predicate::str::contains("Ana").not())
                .and(predicate::str::contains("Showing 1 of 3"))
                .and(predicate::str::contains("More:").not()),
        );
}

#[test]
fn test_purchase_to_payables_flow() {
    let home = TempDir::new().unwrap();
    init(&home);
    shopledger(&home)
        .args(["products", "add", "Charger", "--sku", "CHG", "--price", "15", "--cost", "4"])
        .assert()
        .success();
    shopledger(&home).args(["suppliers", "add", "Acme Wholesale"]).assert().success();

    let out = shopledger(&home)
        .args(["purchases", "record", "CHG:5", "--supplier", "Acme Wholesale"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Balance: $20.00"))
        .get_output()
        .stdout
        .clone();
    let number = word_with_prefix(&out, "P-");

    shopledger(&home)
        .args(["report", "payables"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Acme Wholesale").and(predicate::str::contains("$20.00")));

    shopledger(&home)
        .args(["purchases", "pay", &number, "NaN"])
        .assert()
        .failure();
    shopledger(&home)
        .args(["purchases", "pay", &number, "25"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("exceeds outstanding balance"));
    shopledger(&home)
        .args(["purchases", "pay", &number, "20"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Balance: $0.00"));

    shopledger(&home)
        .args(["report", "payables"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing owed to suppliers."));
    shopledger(&home)
        .args(["products", "list", "--search", "Charger"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Charger"));
}

#[test]
fn test_repair_ticket_flow() {
    let home = TempDir::new().unwrap();
    init(&home);
    shopledger(&home).args(["customers", "add", "Ben"]).assert().success();

    let out = shopledger(&home)
        .args(["repairs", "add", "Pixel 7", "--customer", "Ben", "--estimate", "120"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(out).unwrap();
    let id = text
        .split_whitespace()
        .skip_while(|w| *w != "repair")
        .nth(1)
        .expect("repair id in output")
        .to_string();

    shopledger(&home)
        .args(["repairs", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Pixel 7").and(predicate::str::contains("$120.00")));

    shopledger(&home)
        .args(["repairs", "pay", &id, "inf"])
        .assert()
        .failure();
    shopledger(&home)
        .args(["repairs", "pay", &id, "50"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Paid $50.00 of $120.00"));
}

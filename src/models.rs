use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::repo::Entity;

/// Amounts within half a cent are treated as settled.
pub const EPSILON: f64 = 0.005;

pub fn round2(val: f64) -> f64 {
    (val * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Partial,
    Unpaid,
}

impl PaymentStatus {
    pub fn derive(total: f64, paid: f64) -> Self {
        if paid >= total - EPSILON {
            PaymentStatus::Paid
        } else if paid <= EPSILON {
            PaymentStatus::Unpaid
        } else {
            PaymentStatus::Partial
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Unpaid => "unpaid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Cash,
    Credit,
    Installment,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Cash => "cash",
            PaymentType::Credit => "credit",
            PaymentType::Installment => "installment",
        }
    }
}

impl std::str::FromStr for PaymentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cash" => Ok(PaymentType::Cash),
            "credit" => Ok(PaymentType::Credit),
            "installment" | "installments" => Ok(PaymentType::Installment),
            _ => Err(format!("unknown payment type: {s} (cash, credit, installment)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Other => "other",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            "transfer" => Ok(PaymentMethod::Transfer),
            "other" => Ok(PaymentMethod::Other),
            _ => Err(format!("unknown payment method: {s} (cash, card, transfer, other)")),
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub sku: Option<String>,
    pub category: Option<String>,
    pub unit_price: f64,
    pub cost_price: f64,
    pub quantity: i64,
    pub reorder_level: i64,
    pub created: NaiveDate,
    #[serde(default)]
    pub last_received: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub created: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub created: NaiveDate,
}

// ---------------------------------------------------------------------------
// Sales
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleItem {
    pub product_id: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price: f64,
    /// Product cost at the time of sale.
    pub unit_cost: f64,
    #[serde(default)]
    pub discount: f64,
}

impl SaleItem {
    pub fn line_total(&self) -> f64 {
        round2(self.quantity as f64 * self.unit_price - self.discount)
    }

    pub fn line_cost(&self) -> f64 {
        round2(self.quantity as f64 * self.unit_cost)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub id: String,
    pub number: String,
    pub date: NaiveDate,
    pub customer_id: Option<String>,
    pub items: Vec<SaleItem>,
    pub subtotal: f64,
    pub discount: f64,
    pub tax_rate: f64,
    pub tax_amount: f64,
    pub total: f64,
    pub amount_paid: f64,
    pub balance: f64,
    pub payment_type: PaymentType,
    pub payment_status: PaymentStatus,
    pub installment_plan_id: Option<String>,
    #[serde(default)]
    pub voided: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Weekly,
    Biweekly,
    Monthly,
}

impl std::str::FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "weekly" => Ok(Frequency::Weekly),
            "biweekly" => Ok(Frequency::Biweekly),
            "monthly" => Ok(Frequency::Monthly),
            _ => Err(format!("unknown frequency: {s} (weekly, biweekly, monthly)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentPlan {
    pub id: String,
    pub sale_id: String,
    pub customer_id: Option<String>,
    /// Financed amount: sale total minus the down payment.
    pub total_amount: f64,
    pub down_payment: f64,
    pub installment_count: u32,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub amount_paid: f64,
    pub remaining_balance: f64,
    pub status: PlanStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    Pending,
    Partial,
    Paid,
    Overdue,
}

impl InstallmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallmentStatus::Pending => "pending",
            InstallmentStatus::Partial => "partial",
            InstallmentStatus::Paid => "paid",
            InstallmentStatus::Overdue => "overdue",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub id: String,
    pub plan_id: String,
    pub sale_id: String,
    pub sequence: u32,
    pub due_date: NaiveDate,
    pub amount: f64,
    pub amount_paid: f64,
    pub status: InstallmentStatus,
    pub paid_date: Option<NaiveDate>,
}

impl Installment {
    pub fn remaining(&self) -> f64 {
        round2((self.amount - self.amount_paid).max(0.0))
    }

    pub fn is_settled(&self) -> bool {
        self.remaining() <= EPSILON
    }

    /// Status implied by the amounts alone.
    pub fn derived_status(&self) -> InstallmentStatus {
        match PaymentStatus::derive(self.amount, self.amount_paid) {
            PaymentStatus::Paid => InstallmentStatus::Paid,
            PaymentStatus::Partial => InstallmentStatus::Partial,
            PaymentStatus::Unpaid => InstallmentStatus::Pending,
        }
    }

    /// Stored status, upgraded to overdue when unsettled past its due date.
    pub fn effective_status(&self, today: NaiveDate) -> InstallmentStatus {
        let status = self.derived_status();
        if status != InstallmentStatus::Paid && self.due_date < today {
            InstallmentStatus::Overdue
        } else {
            status
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub installment_id: String,
    pub amount: f64,
}

/// Money received from a customer or paid to a supplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub date: NaiveDate,
    pub amount: f64,
    pub method: PaymentMethod,
    pub sale_id: Option<String>,
    pub purchase_id: Option<String>,
    pub repair_id: Option<String>,
    pub party_id: Option<String>,
    #[serde(default)]
    pub allocations: Vec<Allocation>,
    pub note: Option<String>,
}

impl Payment {
    pub fn new(date: NaiveDate, amount: f64, method: PaymentMethod) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            date,
            amount: round2(amount),
            method,
            sale_id: None,
            purchase_id: None,
            repair_id: None,
            party_id: None,
            allocations: Vec::new(),
            note: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Purchases and expenses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseItem {
    pub product_id: String,
    pub name: String,
    pub quantity: i64,
    pub unit_cost: f64,
}

impl PurchaseItem {
    pub fn line_total(&self) -> f64 {
        round2(self.quantity as f64 * self.unit_cost)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: String,
    pub number: String,
    pub supplier_id: String,
    pub date: NaiveDate,
    pub items: Vec<PurchaseItem>,
    pub subtotal: f64,
    pub tax_amount: f64,
    pub total: f64,
    pub amount_paid: f64,
    pub balance: f64,
    pub payment_status: PaymentStatus,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: String,
    pub date: NaiveDate,
    pub category: String,
    pub description: String,
    pub amount: f64,
    #[serde(default)]
    pub tax_amount: f64,
    pub vendor: Option<String>,
    pub method: PaymentMethod,
}

// ---------------------------------------------------------------------------
// Repairs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStatus {
    Received,
    Diagnosing,
    InProgress,
    Ready,
    Delivered,
    Cancelled,
}

impl RepairStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairStatus::Received => "received",
            RepairStatus::Diagnosing => "diagnosing",
            RepairStatus::InProgress => "in_progress",
            RepairStatus::Ready => "ready",
            RepairStatus::Delivered => "delivered",
            RepairStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RepairStatus::Delivered | RepairStatus::Cancelled)
    }
}

impl std::str::FromStr for RepairStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "received" => Ok(RepairStatus::Received),
            "diagnosing" => Ok(RepairStatus::Diagnosing),
            "in_progress" => Ok(RepairStatus::InProgress),
            "ready" => Ok(RepairStatus::Ready),
            "delivered" => Ok(RepairStatus::Delivered),
            "cancelled" => Ok(RepairStatus::Cancelled),
            _ => Err(format!("unknown repair status: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repair {
    pub id: String,
    pub customer_id: String,
    pub device: String,
    pub issue: String,
    pub received: NaiveDate,
    pub promised: Option<NaiveDate>,
    pub status: RepairStatus,
    pub estimated_cost: f64,
    pub final_cost: Option<f64>,
    pub amount_paid: f64,
    pub delivered: Option<NaiveDate>,
}

impl Repair {
    pub fn chargeable(&self) -> f64 {
        self.final_cost.unwrap_or(self.estimated_cost)
    }
}

macro_rules! entity {
    ($ty:ty, $collection:expr) => {
        impl Entity for $ty {
            const COLLECTION: &'static str = $collection;

            fn id(&self) -> &str {
                &self.id
            }
        }
    };
}

entity!(Product, "products");
entity!(Customer, "customers");
entity!(Supplier, "suppliers");
entity!(Sale, "sales");
entity!(InstallmentPlan, "installment_plans");
entity!(Installment, "installments");
entity!(Payment, "payments");
entity!(Purchase, "purchases");
entity!(Expense, "expenses");
entity!(Repair, "repairs");

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_payment_status_tolerance() {
        assert_eq!(PaymentStatus::derive(100.0, 99.996), PaymentStatus::Paid);
        assert_eq!(PaymentStatus::derive(100.0, 0.004), PaymentStatus::Unpaid);
        assert_eq!(PaymentStatus::derive(100.0, 50.0), PaymentStatus::Partial);
        assert_eq!(PaymentStatus::derive(0.0, 0.0), PaymentStatus::Paid);
    }

    #[test]
    fn test_installment_effective_status() {
        let inst = Installment {
            id: "i1".into(),
            plan_id: "p".into(),
            sale_id: "s".into(),
            sequence: 1,
            due_date: date("2025-03-01"),
            amount: 50.0,
            amount_paid: 20.0,
            status: InstallmentStatus::Partial,
            paid_date: None,
        };
        assert_eq!(inst.effective_status(date("2025-03-01")), InstallmentStatus::Partial);
        assert_eq!(inst.effective_status(date("2025-03-02")), InstallmentStatus::Overdue);
        assert_eq!(inst.remaining(), 30.0);

        let paid = Installment { amount_paid: 50.0, ..inst };
        assert_eq!(paid.effective_status(date("2026-01-01")), InstallmentStatus::Paid);
    }

    #[test]
    fn test_enums_serialize_snake_case() {
        assert_eq!(serde_json::to_value(RepairStatus::InProgress).unwrap(), "in_progress");
        assert_eq!(serde_json::to_value(PaymentType::Installment).unwrap(), "installment");
        assert_eq!("In-Progress".parse::<RepairStatus>().unwrap(), RepairStatus::InProgress);
        assert!("sideways".parse::<Frequency>().is_err());
    }

    #[test]
    fn test_line_totals() {
        let item = SaleItem {
            product_id: "p".into(),
            name: "Case".into(),
            quantity: 3,
            unit_price: 9.99,
            unit_cost: 4.0,
            discount: 2.0,
        };
        assert_eq!(item.line_total(), 27.97);
        assert_eq!(item.line_cost(), 12.0);
    }
}

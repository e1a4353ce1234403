use serde::{Deserialize, Serialize};

use super::PaymentPurpose;

/// Append-only ledger row for financial reporting.
///
/// At most one movement exists per (reference_id, reference_type) pair,
/// enforced by a unique constraint rather than in-memory locking so the
/// guarantee survives restarts and multiple service instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialMovement {
    pub id: String,
    pub movement_type: MovementType,
    pub category: MovementCategory,
    pub amount_cents: i64,
    pub description: Option<String>,
    pub reference_id: String,
    pub reference_type: String,
    pub occurred_at: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Income,
    Expense,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }
}

impl std::str::FromStr for MovementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            _ => Err(format!("Unknown movement type: {}", s)),
        }
    }
}

impl std::fmt::Display for MovementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementCategory {
    MembershipIncome,
    ProductsSale,
    DailyIncome,
    OtherIncome,
    OtherExpense,
}

impl MovementCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MembershipIncome => "membership_income",
            Self::ProductsSale => "products_sale",
            Self::DailyIncome => "daily_income",
            Self::OtherIncome => "other_income",
            Self::OtherExpense => "other_expense",
        }
    }

    /// Ledger category for an income movement derived from a payment purpose.
    pub fn from_purpose(purpose: PaymentPurpose) -> Self {
        match purpose {
            PaymentPurpose::Membership => Self::MembershipIncome,
            PaymentPurpose::StoreOrder => Self::ProductsSale,
            PaymentPurpose::DailyEntry => Self::DailyIncome,
            PaymentPurpose::Other => Self::OtherIncome,
        }
    }
}

impl std::str::FromStr for MovementCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "membership_income" => Ok(Self::MembershipIncome),
            "products_sale" => Ok(Self::ProductsSale),
            "daily_income" => Ok(Self::DailyIncome),
            "other_income" => Ok(Self::OtherIncome),
            "other_expense" => Ok(Self::OtherExpense),
            _ => Err(format!("Unknown movement category: {}", s)),
        }
    }
}

impl std::fmt::Display for MovementCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

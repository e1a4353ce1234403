use serde::{Deserialize, Serialize};

/// One row per monetary transaction. Payments are never physically deleted;
/// they only move along the status state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    /// Gateway's opaque transaction id. Unique when present - the idempotency
    /// key for gateway-confirmed payments.
    pub gateway_transaction_id: Option<String>,

    /// Amount in cents, always positive.
    pub amount_cents: i64,
    pub rail: PaymentRail,
    pub purpose: PaymentPurpose,
    pub status: PaymentStatus,

    pub user_id: Option<String>,
    pub membership_id: Option<String>,
    /// Generic reference to the domain object this payment settles
    /// (e.g. a store order).
    pub reference_id: Option<String>,
    pub reference_type: Option<String>,

    /// JSON blob describing a walk-in client with no user account.
    pub anonymous_client: Option<String>,

    /// Pointer to the uploaded proof for transfer payments (file key or URL).
    pub transfer_proof: Option<String>,
    /// Staff member who approved or rejected a transfer.
    pub validated_by: Option<String>,
    pub validated_at: Option<i64>,
    /// Actor who registered the payment (staff id, or "gateway").
    pub created_by: Option<String>,
    pub notes: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

/// Payment-collection mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRail {
    Cash,
    CardInPerson,
    Transfer,
    CardGateway,
}

impl PaymentRail {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::CardInPerson => "card_in_person",
            Self::Transfer => "transfer",
            Self::CardGateway => "card_gateway",
        }
    }

    /// Rails that settle at the desk and complete immediately.
    pub fn is_immediate(&self) -> bool {
        matches!(self, Self::Cash | Self::CardInPerson)
    }
}

impl std::str::FromStr for PaymentRail {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(Self::Cash),
            "card_in_person" => Ok(Self::CardInPerson),
            "transfer" => Ok(Self::Transfer),
            "card_gateway" => Ok(Self::CardGateway),
            _ => Err(format!("Unknown payment rail: {}", s)),
        }
    }
}

impl std::fmt::Display for PaymentRail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the money is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPurpose {
    Membership,
    DailyEntry,
    StoreOrder,
    Other,
}

impl PaymentPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Membership => "membership",
            Self::DailyEntry => "daily_entry",
            Self::StoreOrder => "store_order",
            Self::Other => "other",
        }
    }
}

impl std::str::FromStr for PaymentPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "membership" => Ok(Self::Membership),
            "daily_entry" => Ok(Self::DailyEntry),
            "store_order" => Ok(Self::StoreOrder),
            "other" => Ok(Self::Other),
            _ => Err(format!("Unknown payment purpose: {}", s)),
        }
    }
}

impl std::fmt::Display for PaymentPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment lifecycle status.
///
/// Legal transitions: pending -> completed, pending -> failed,
/// pending -> cancelled, completed -> refunded. Everything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled | Self::Refunded)
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Completed)
                | (Self::Pending, Self::Failed)
                | (Self::Pending, Self::Cancelled)
                | (Self::Completed, Self::Refunded)
        )
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            _ => Err(format!("Unknown payment status: {}", s)),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Domain references a payment can carry into the engine.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentRefs {
    pub user_id: Option<String>,
    pub membership_id: Option<String>,
    pub reference_id: Option<String>,
    pub reference_type: Option<String>,
    /// JSON payload describing a walk-in client without an account.
    pub anonymous_client: Option<String>,
}

/// Input for creating a payment row. Built by the engine, not by callers.
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub gateway_transaction_id: Option<String>,
    pub amount_cents: i64,
    pub rail: PaymentRail,
    pub purpose: PaymentPurpose,
    pub status: PaymentStatus,
    pub refs: PaymentRefs,
    pub created_by: Option<String>,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_accept_no_transition_except_refund() {
        for status in [
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
            PaymentStatus::Refunded,
        ] {
            for next in [
                PaymentStatus::Pending,
                PaymentStatus::Completed,
                PaymentStatus::Failed,
                PaymentStatus::Cancelled,
                PaymentStatus::Refunded,
            ] {
                assert!(!status.can_transition_to(next), "{} -> {}", status, next);
            }
        }
        assert!(PaymentStatus::Completed.can_transition_to(PaymentStatus::Refunded));
        assert!(!PaymentStatus::Completed.can_transition_to(PaymentStatus::Pending));
    }

    #[test]
    fn rail_round_trips_through_strings() {
        for rail in [
            PaymentRail::Cash,
            PaymentRail::CardInPerson,
            PaymentRail::Transfer,
            PaymentRail::CardGateway,
        ] {
            assert_eq!(rail.as_str().parse::<PaymentRail>().unwrap(), rail);
        }
        assert!("paypal".parse::<PaymentRail>().is_err());
    }
}

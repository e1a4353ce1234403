use serde::{Deserialize, Serialize};

/// A storefront product with a live stock counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreProduct {
    pub id: String,
    pub name: String,
    pub sku: String,
    pub price_cents: i64,
    /// Never goes below zero; guarded by the stock reservation unit.
    pub stock_quantity: i64,
    /// Reorder threshold. Stock at or below this flags the product as low.
    pub min_stock: i64,
    pub active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl StoreProduct {
    pub fn is_low_stock(&self) -> bool {
        self.stock_quantity <= self.min_stock
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateStoreProduct {
    pub name: String,
    pub sku: String,
    pub price_cents: i64,
    pub stock_quantity: i64,
    #[serde(default)]
    pub min_stock: i64,
}

/// A storefront order. Items are immutable snapshots taken at order time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreOrder {
    pub id: String,
    pub user_id: Option<String>,
    pub status: OrderStatus,
    pub payment_status: OrderPaymentStatus,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    /// Caller-supplied; trusted, not recomputed server-side.
    pub tax_cents: i64,
    /// Caller-supplied; trusted, not recomputed server-side.
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Snapshot of a product at order time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreOrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub product_name: String,
    pub product_sku: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown order status: {}", s)),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPaymentStatus {
    Pending,
    Paid,
}

impl OrderPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
        }
    }
}

impl std::str::FromStr for OrderPaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            _ => Err(format!("Unknown order payment status: {}", s)),
        }
    }
}

impl std::fmt::Display for OrderPaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One requested line when placing an order.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: String,
    pub quantity: i64,
}

/// Input for placing an order. Tax and shipping come from the caller - a
/// documented trust boundary, only sanity-checked (total >= subtotal - discount).
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrder {
    pub user_id: Option<String>,
    pub items: Vec<OrderLineRequest>,
    #[serde(default)]
    pub discount_cents: i64,
    #[serde(default)]
    pub tax_cents: i64,
    #[serde(default)]
    pub shipping_cents: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

/// An order together with its item snapshots and any low-stock flags raised
/// by the reservation that backed it.
#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: StoreOrder,
    pub items: Vec<StoreOrderItem>,
    /// SKUs whose stock fell to or below `min_stock` during this reservation.
    pub low_stock_skus: Vec<String>,
}

/// A pending item in a client's cart, consumed when the order's payment
/// completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub id: String,
    pub user_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub created_at: i64,
}

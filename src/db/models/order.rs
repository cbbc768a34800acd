//! Order models, status lifecycle and pricing.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::cart::CartItem;
use super::user::Address;

/// Fulfilment lifecycle. The enum bounds what a status can be; it does not
/// enforce forward-only progression (an operator may re-stage an order).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Confirmed,
    Processing,
    Shipped,
    OutForDelivery,
    Delivered,
}

impl OrderStatus {
    /// A customer may cancel only before the order leaves the warehouse
    pub fn is_cancellable(&self) -> bool {
        matches!(self, OrderStatus::Confirmed | OrderStatus::Processing)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Confirmed => write!(f, "confirmed"),
            OrderStatus::Processing => write!(f, "processing"),
            OrderStatus::Shipped => write!(f, "shipped"),
            OrderStatus::OutForDelivery => write!(f, "out for delivery"),
            OrderStatus::Delivered => write!(f, "delivered"),
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "confirmed" => Ok(OrderStatus::Confirmed),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "out for delivery" => Ok(OrderStatus::OutForDelivery),
            "delivered" => Ok(OrderStatus::Delivered),
            _ => Err(format!("Unknown order status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Processing => write!(f, "processing"),
            PaymentStatus::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "processing" => Ok(PaymentStatus::Processing),
            "completed" => Ok(PaymentStatus::Completed),
            _ => Err(format!("Unknown payment status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: String,
    pub customer_id: String,
    /// JSON array of [`OrderItem`], immutable after creation
    pub items: String,
    /// JSON [`Address`] captured from the customer at creation
    pub shipping_address: String,
    /// JSON array of applied offer ids
    pub offers: String,
    pub order_status: String,
    pub total_price: f64,
    pub total_payable_amount: f64,
    pub payment_status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Order {
    pub fn line_items(&self) -> Vec<OrderItem> {
        serde_json::from_str(&self.items).unwrap_or_default()
    }

    pub fn applied_offer_ids(&self) -> Vec<String> {
        serde_json::from_str(&self.offers).unwrap_or_default()
    }

    pub fn address(&self) -> Address {
        serde_json::from_str(&self.shipping_address).unwrap_or_default()
    }

    pub fn status_enum(&self) -> Result<OrderStatus, String> {
        self.order_status.parse()
    }
}

/// Immutable snapshot of one ordered line. Deliberately decoupled from the
/// live product row: later catalog edits or deletion cannot touch it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub name: String,
    pub color: Option<String>,
    pub size: Option<String>,
    pub brand: Option<String>,
    pub quantity: i64,
    pub price: f64,
}

impl From<CartItem> for OrderItem {
    fn from(item: CartItem) -> Self {
        Self {
            product_id: item.product_id,
            name: item.name,
            color: item.color,
            size: item.size,
            brand: item.brand,
            quantity: item.quantity,
            price: item.price,
        }
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Pre-discount and payable totals for a set of lines and offer percentages.
///
/// Discounts are additive: each percentage applies to the pre-discount total,
/// not to the progressively discounted remainder. The payable amount is
/// rounded to 2 decimal places.
pub fn compute_totals(items: &[OrderItem], discount_percents: &[f64]) -> (f64, f64) {
    let total_price: f64 = items.iter().map(|i| i.price * i.quantity as f64).sum();
    let total_discount: f64 = discount_percents
        .iter()
        .map(|percent| percent * total_price / 100.0)
        .sum();
    (total_price, round2(total_price - total_discount))
}

/// Order payload for customer-facing views
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub items: Vec<OrderItem>,
    pub shipping_address: Address,
    pub offers: Vec<String>,
    pub order_status: String,
    pub total_price: f64,
    pub total_payable_amount: f64,
    pub payment_status: String,
    pub created_at: String,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        let items = order.line_items();
        let shipping_address = order.address();
        let offers = order.applied_offer_ids();
        Self {
            id: order.id,
            items,
            shipping_address,
            offers,
            order_status: order.order_status,
            total_price: order.total_price,
            total_payable_amount: order.total_payable_amount,
            payment_status: order.payment_status,
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub offers: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub order_status: String,
    pub payment_status: Option<String>,
}

/// Admin order listing filters; at least one must be present
#[derive(Debug, Default, Deserialize)]
pub struct OrderFilterQuery {
    pub customer: Option<String>,
    pub order_status: Option<String>,
    /// Calendar day (YYYY-MM-DD) the order was created on
    pub date: Option<String>,
}

impl OrderFilterQuery {
    pub fn is_empty(&self) -> bool {
        self.customer.is_none() && self.order_status.is_none() && self.date.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(price: f64, quantity: i64) -> OrderItem {
        OrderItem {
            product_id: "p".into(),
            name: "item".into(),
            color: None,
            size: None,
            brand: None,
            quantity,
            price,
        }
    }

    #[test]
    fn test_discounts_are_additive_not_compounding() {
        let items = vec![item(50.0, 2)];
        let (total, payable) = compute_totals(&items, &[10.0, 20.0]);
        assert_eq!(total, 100.0);
        // 10% + 20% of the original 100, not 100 * 0.9 * 0.8 = 72
        assert_eq!(payable, 70.0);
    }

    #[test]
    fn test_no_offers_means_payable_equals_total() {
        let items = vec![item(19.99, 3)];
        let (total, payable) = compute_totals(&items, &[]);
        assert_eq!(round2(total), 59.97);
        assert_eq!(payable, 59.97);
    }

    #[test]
    fn test_payable_rounds_to_two_decimals() {
        let items = vec![item(9.99, 1)];
        let (_, payable) = compute_totals(&items, &[33.0]);
        // 9.99 - 3.2967 = 6.6933
        assert_eq!(payable, 6.69);
    }

    #[test]
    fn test_cancellable_only_before_shipping() {
        assert!(OrderStatus::Confirmed.is_cancellable());
        assert!(OrderStatus::Processing.is_cancellable());
        assert!(!OrderStatus::Shipped.is_cancellable());
        assert!(!OrderStatus::OutForDelivery.is_cancellable());
        assert!(!OrderStatus::Delivered.is_cancellable());
    }

    #[test]
    fn test_status_round_trips_through_strings() {
        for status in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::OutForDelivery,
            OrderStatus::Delivered,
        ] {
            assert_eq!(status.to_string().parse::<OrderStatus>(), Ok(status));
        }
        assert!("returned".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_order_snapshot_copies_cart_line() {
        let cart_item = CartItem {
            product_id: "p9".into(),
            name: "Desk lamp".into(),
            color: Some("black".into()),
            size: None,
            brand: Some("Lumo".into()),
            quantity: 2,
            price: 24.5,
        };
        let snapshot = OrderItem::from(cart_item.clone());
        assert_eq!(snapshot.product_id, cart_item.product_id);
        assert_eq!(snapshot.name, cart_item.name);
        assert_eq!(snapshot.price, cart_item.price);
        assert_eq!(snapshot.quantity, 2);
    }
}

//! Cart models and line-item arithmetic.
//!
//! A cart is one row per user; its line items live in a JSON column so every
//! mutation is a single atomic row write. Prices and descriptive attributes
//! are snapshotted from the product at first add and never re-read.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::product::Product;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Cart {
    pub id: String,
    pub user_id: String,
    /// JSON array of [`CartItem`]
    pub items: String,
    pub total_price: f64,
    pub created_at: String,
    pub updated_at: String,
}

impl Cart {
    pub fn line_items(&self) -> Vec<CartItem> {
        serde_json::from_str(&self.items).unwrap_or_default()
    }
}

/// One cart line: product reference plus the attributes captured when the
/// item was first added. A later catalog price change does not touch it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: String,
    pub name: String,
    pub color: Option<String>,
    pub size: Option<String>,
    pub brand: Option<String>,
    pub quantity: i64,
    pub price: f64,
}

impl CartItem {
    pub fn from_product(product: &Product, quantity: i64) -> Self {
        Self {
            product_id: product.id.clone(),
            name: product.label.clone(),
            color: product.color.clone(),
            size: product.size.clone(),
            brand: product.brand.clone(),
            quantity,
            price: product.price,
        }
    }
}

/// Merge a line into the list: an existing line for the same product gains
/// quantity (its snapshotted price is sticky), otherwise the line is appended.
pub fn merge_line(items: &mut Vec<CartItem>, line: CartItem) {
    match items.iter_mut().find(|i| i.product_id == line.product_id) {
        Some(existing) => existing.quantity += line.quantity,
        None => items.push(line),
    }
}

/// Apply a quantity delta to the line for `product_id`. Lines that drop to
/// zero or below are removed. Returns false when no such line exists.
pub fn apply_quantity_delta(items: &mut Vec<CartItem>, product_id: &str, delta: i64) -> bool {
    let Some(pos) = items.iter().position(|i| i.product_id == product_id) else {
        return false;
    };
    items[pos].quantity += delta;
    if items[pos].quantity <= 0 {
        items.remove(pos);
    }
    true
}

/// Remove the line for `product_id`. Returns false when no such line exists.
pub fn remove_line(items: &mut Vec<CartItem>, product_id: &str) -> bool {
    let before = items.len();
    items.retain(|i| i.product_id != product_id);
    items.len() != before
}

/// Derived cart total; recomputed on every persist, never trusted from storage
pub fn compute_total(items: &[CartItem]) -> f64 {
    items.iter().map(|i| i.price * i.quantity as f64).sum()
}

/// Cart payload with the owning user reference stripped
#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub id: String,
    pub items: Vec<CartItem>,
    pub total_price: f64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Cart> for CartResponse {
    fn from(cart: Cart) -> Self {
        let items = cart.line_items();
        Self {
            id: cart.id,
            items,
            total_price: cart.total_price,
            created_at: cart.created_at,
            updated_at: cart.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddCartItemRequest {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct ChangeQuantityRequest {
    pub product_id: String,
    pub change: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(product_id: &str, quantity: i64, price: f64) -> CartItem {
        CartItem {
            product_id: product_id.into(),
            name: "item".into(),
            color: None,
            size: None,
            brand: None,
            quantity,
            price,
        }
    }

    #[test]
    fn test_merge_accumulates_quantity_not_lines() {
        let mut items = vec![];
        merge_line(&mut items, line("p1", 2, 10.0));
        merge_line(&mut items, line("p1", 3, 12.0));

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 5);
        // Price from the first add is sticky
        assert_eq!(items[0].price, 10.0);
    }

    #[test]
    fn test_merge_appends_distinct_products() {
        let mut items = vec![line("p1", 1, 10.0)];
        merge_line(&mut items, line("p2", 1, 4.0));
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_total_is_sum_of_price_times_quantity() {
        let items = vec![line("p1", 2, 10.0), line("p2", 3, 4.5)];
        assert_eq!(compute_total(&items), 33.5);
        assert_eq!(compute_total(&[]), 0.0);
    }

    #[test]
    fn test_negative_delta_removes_depleted_line() {
        let mut items = vec![line("p1", 2, 10.0), line("p2", 1, 4.0)];

        assert!(apply_quantity_delta(&mut items, "p1", -1));
        assert_eq!(items[0].quantity, 1);

        assert!(apply_quantity_delta(&mut items, "p1", -1));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_id, "p2");

        // Over-shooting below zero also removes the line
        assert!(apply_quantity_delta(&mut items, "p2", -5));
        assert!(items.is_empty());
    }

    #[test]
    fn test_delta_on_missing_line_reports_absence() {
        let mut items = vec![line("p1", 1, 10.0)];
        assert!(!apply_quantity_delta(&mut items, "nope", 1));
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_remove_line() {
        let mut items = vec![line("p1", 1, 10.0), line("p2", 1, 4.0)];
        assert!(remove_line(&mut items, "p1"));
        assert_eq!(items.len(), 1);
        assert!(!remove_line(&mut items, "p1"));
    }
}

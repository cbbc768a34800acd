//! Catalog models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: String,
    pub label: String,
    pub color: Option<String>,
    pub size: Option<String>,
    pub material: Option<String>,
    pub category: String,
    pub brand: Option<String>,
    pub seller_id: Option<String>,
    pub price: f64,
    pub stock: i64,
    pub is_available: bool,
    /// JSON array of public image URLs
    pub images_url: String,
    /// JSON array of storage object ids, never exposed to clients
    pub images_public_id: String,
    pub warranty_months: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Product {
    pub fn image_urls(&self) -> Vec<String> {
        serde_json::from_str(&self.images_url).unwrap_or_default()
    }

    pub fn image_public_ids(&self) -> Vec<String> {
        serde_json::from_str(&self.images_public_id).unwrap_or_default()
    }
}

/// Availability is derived from stock, not stored authority
pub fn derive_availability(stock: i64) -> bool {
    stock >= 1
}

/// Product payload for list/detail views: stock and storage ids stripped
#[derive(Debug, Clone, Serialize)]
pub struct ProductResponse {
    pub id: String,
    pub label: String,
    pub color: Option<String>,
    pub size: Option<String>,
    pub material: Option<String>,
    pub category: String,
    pub brand: Option<String>,
    pub seller_id: Option<String>,
    pub price: f64,
    pub is_available: bool,
    pub images_url: Vec<String>,
    pub warranty_months: i64,
    pub created_at: String,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        let images_url = product.image_urls();
        Self {
            id: product.id,
            label: product.label,
            color: product.color,
            size: product.size,
            material: product.material,
            category: product.category,
            brand: product.brand,
            seller_id: product.seller_id,
            price: product.price,
            is_available: product.is_available,
            images_url,
            warranty_months: product.warranty_months,
            created_at: product.created_at,
        }
    }
}

/// Exact-match catalog filters; at least one must be present
#[derive(Debug, Default, Deserialize)]
pub struct ProductFilterQuery {
    pub label: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub seller: Option<String>,
    pub price: Option<f64>,
}

impl ProductFilterQuery {
    pub fn is_empty(&self) -> bool {
        self.label.is_none()
            && self.category.is_none()
            && self.brand.is_none()
            && self.seller.is_none()
            && self.price.is_none()
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub price: Option<f64>,
    pub stock: Option<i64>,
    pub is_available: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability_derived_from_stock() {
        assert!(derive_availability(1));
        assert!(derive_availability(250));
        assert!(!derive_availability(0));
        assert!(!derive_availability(-3));
    }

    #[test]
    fn test_image_urls_parse_and_tolerate_garbage() {
        let mut product = Product {
            id: "p1".into(),
            label: "shirt".into(),
            color: None,
            size: None,
            material: None,
            category: "apparel".into(),
            brand: None,
            seller_id: None,
            price: 9.99,
            stock: 3,
            is_available: true,
            images_url: r#"["https://cdn/a.jpg","https://cdn/b.jpg"]"#.into(),
            images_public_id: "[]".into(),
            warranty_months: 0,
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert_eq!(product.image_urls().len(), 2);

        product.images_url = "not json".into();
        assert!(product.image_urls().is_empty());
    }
}

//! Product rating models and aggregation.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Rating {
    pub id: String,
    pub product_id: String,
    /// NULL once the reviewing account has been deleted
    pub reviewed_by: Option<String>,
    pub stars: i64,
    pub review_text: String,
    /// JSON array of [`ReviewImage`]
    pub review_images: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Rating {
    pub fn images(&self) -> Vec<ReviewImage> {
        serde_json::from_str(&self.review_images).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewImage {
    pub image_url: String,
    pub image_public_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRatingRequest {
    pub product_id: String,
    pub stars: i64,
    pub review_text: String,
}

/// One entry in the denormalized review list of a product summary
#[derive(Debug, Serialize)]
pub struct ReviewEntry {
    pub stars: i64,
    pub review_text: String,
    pub review_images: Vec<String>,
    pub reviewed_by: Option<String>,
    pub created_at: String,
}

impl From<Rating> for ReviewEntry {
    fn from(rating: Rating) -> Self {
        let review_images = rating.images().into_iter().map(|i| i.image_url).collect();
        Self {
            stars: rating.stars,
            review_text: rating.review_text,
            review_images,
            reviewed_by: rating.reviewed_by,
            created_at: rating.created_at,
        }
    }
}

/// Aggregate rating view for one product
#[derive(Debug, Serialize)]
pub struct ProductRatingSummary {
    pub product_id: String,
    pub average_rating: f64,
    pub total_ratings: i64,
    pub reviews: Vec<ReviewEntry>,
}

/// Average stars rounded to 1 decimal place
pub fn average_stars(ratings: &[Rating]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let sum: i64 = ratings.iter().map(|r| r.stars).sum();
    let avg = sum as f64 / ratings.len() as f64;
    (avg * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rating(stars: i64) -> Rating {
        Rating {
            id: uuid::Uuid::new_v4().to_string(),
            product_id: "p1".into(),
            reviewed_by: Some("u1".into()),
            stars,
            review_text: "fine".into(),
            review_images: "[]".into(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_average_rounds_to_one_decimal() {
        let ratings = vec![rating(5), rating(4), rating(4)];
        // 13 / 3 = 4.333...
        assert_eq!(average_stars(&ratings), 4.3);

        let ratings = vec![rating(5), rating(4)];
        assert_eq!(average_stars(&ratings), 4.5);
    }

    #[test]
    fn test_average_of_nothing_is_zero() {
        assert_eq!(average_stars(&[]), 0.0);
    }
}

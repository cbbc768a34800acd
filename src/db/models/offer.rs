//! Promotional offer models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Who put an offer out: a marketplace seller, or the brand itself
/// (admin-issued offers are recorded under the brand label).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferIssuerRole {
    Seller,
    Brand,
}

impl std::fmt::Display for OfferIssuerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OfferIssuerRole::Seller => write!(f, "seller"),
            OfferIssuerRole::Brand => write!(f, "brand"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Offer {
    pub id: String,
    pub statement: String,
    pub discount_percent: f64,
    pub expires_at: String,
    pub issued_by_role: String,
    pub issued_by_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Offer {
    /// An offer is active iff its expiry is strictly in the future
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        match DateTime::parse_from_rfc3339(&self.expires_at) {
            Ok(expiry) => expiry.with_timezone(&Utc) > now,
            Err(_) => false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateOfferRequest {
    pub statement: Option<String>,
    pub discount_percent: Option<f64>,
    pub expires_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn offer(expires_at: String) -> Offer {
        Offer {
            id: "o1".into(),
            statement: "10% off".into(),
            discount_percent: 10.0,
            expires_at,
            issued_by_role: "brand".into(),
            issued_by_id: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_active_iff_expiry_strictly_future() {
        let now = Utc::now();
        assert!(offer((now + Duration::hours(1)).to_rfc3339()).is_active_at(now));
        assert!(!offer((now - Duration::hours(1)).to_rfc3339()).is_active_at(now));
        assert!(!offer(now.to_rfc3339()).is_active_at(now));
    }

    #[test]
    fn test_unparseable_expiry_is_never_active() {
        assert!(!offer("next tuesday".into()).is_active_at(Utc::now()));
    }
}

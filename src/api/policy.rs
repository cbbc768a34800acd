//! Role policy for privileged operations.
//!
//! Role requirements live in one table instead of being re-derived inside
//! each handler; every privileged endpoint calls [`authorize`] exactly once
//! before touching the store.

use crate::db::UserRole;

use super::error::ApiError;

/// Privileged operations exposed by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateProduct,
    UpdateProduct,
    DeleteProduct,
    CreateOffer,
    UpdateOffer,
    DeleteOffer,
    UpdateOrderStatus,
    ListAllOrders,
    WriteRating,
}

impl Operation {
    /// Roles permitted to perform this operation
    pub fn permitted_roles(&self) -> &'static [UserRole] {
        use UserRole::*;
        match self {
            Operation::CreateProduct
            | Operation::UpdateProduct
            | Operation::DeleteProduct
            | Operation::CreateOffer
            | Operation::UpdateOffer
            | Operation::DeleteOffer
            | Operation::UpdateOrderStatus => &[Seller, Admin],
            Operation::ListAllOrders => &[Admin],
            // Only buyers review products
            Operation::WriteRating => &[Customer],
        }
    }
}

/// Check a role against the policy table, failing with Forbidden
pub fn authorize(role: UserRole, operation: Operation) -> Result<(), ApiError> {
    if operation.permitted_roles().contains(&role) {
        Ok(())
    } else {
        Err(ApiError::forbidden("Permission denied"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::UserRole;

    #[test]
    fn test_catalog_writes_are_staff_only() {
        assert!(authorize(UserRole::Seller, Operation::CreateProduct).is_ok());
        assert!(authorize(UserRole::Admin, Operation::DeleteProduct).is_ok());
        assert!(authorize(UserRole::Customer, Operation::CreateProduct).is_err());
    }

    #[test]
    fn test_unrestricted_order_listing_is_admin_only() {
        assert!(authorize(UserRole::Admin, Operation::ListAllOrders).is_ok());
        assert!(authorize(UserRole::Seller, Operation::ListAllOrders).is_err());
        assert!(authorize(UserRole::Customer, Operation::ListAllOrders).is_err());
    }

    #[test]
    fn test_ratings_are_customer_only() {
        assert!(authorize(UserRole::Customer, Operation::WriteRating).is_ok());
        assert!(authorize(UserRole::Seller, Operation::WriteRating).is_err());
        assert!(authorize(UserRole::Admin, Operation::WriteRating).is_err());
    }
}

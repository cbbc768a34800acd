//! Database models split into domain-specific modules.

pub mod cart;
pub mod offer;
pub mod order;
pub mod product;
pub mod rating;
pub mod user;

pub use cart::*;
pub use offer::*;
pub use order::*;
pub use product::*;
pub use rating::*;
pub use user::*;

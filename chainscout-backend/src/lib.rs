//! Account and subscription state store for the chainscout bot.
//!
//! Bot handlers open a [`StoreHandle`], take the shared [`Database`] from it
//! and call the per-table methods defined under `db::tables`.

pub mod config;
pub mod db;
pub mod error;
pub mod pricing;
pub mod scheduler;
pub mod store;

pub use db::Database;
pub use db::tables::premium::{PremiumPurchase, premium_expiry_from};
pub use db::tables::profiles::ProfilePurge;
pub use error::{Result, StoreError};
pub use pricing::{PlanCatalog, PlanPricing, PricingError};
pub use store::StoreHandle;

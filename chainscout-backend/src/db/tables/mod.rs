//! Database table modules - extends Database with domain-specific methods
//!
//! Each module adds `impl Database` blocks with methods for a specific table group.

mod users;            // users (accounts, admin flags, activity, stats)
pub mod premium;      // users premium columns, transactions
mod scan_counters;    // user_scans (daily quota ledger)
mod tokens;           // token_data
mod wallets;          // wallet_data
mod kol_wallets;      // kol_wallets
pub mod profiles;     // age-based sweep over token_data / wallet_data
mod tracking;         // tracking_subscriptions
mod referrals;        // referrals

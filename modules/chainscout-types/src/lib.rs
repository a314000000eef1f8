//! Shared value objects for the chainscout store and the bot handlers that feed it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Transaction `type` recorded for every premium purchase.
pub const TRANSACTION_TYPE_PREMIUM_PURCHASE: &str = "premium_purchase";

/// Case-fold an on-chain address into the form used for storage and lookup.
pub fn normalize_address(address: &str) -> String {
    address.to_lowercase()
}

// =====================================================
// Enumerations
// =====================================================

/// Unit of on-chain lookup work counted against a user's daily quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScanType {
    TokenScan,
    WalletScan,
}

/// What kind of activity a tracking subscription watches for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TrackingType {
    /// Trades made by a wallet
    Wallet,
    /// Tokens launched by a deployer address
    Deployer,
}

/// Premium entitlement as derived from the stored flag and expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PremiumState {
    NotPremium,
    Active,
    /// Flag still set but the expiry has passed; the expiry sweep has not run yet.
    Expired,
}

// =====================================================
// Accounts
// =====================================================

/// A bot user, keyed by the Telegram user id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_premium: bool,
    /// Only meaningful while `is_premium` is true
    pub premium_until: Option<DateTime<Utc>>,
    pub premium_plan: Option<String>,
    pub payment_currency: Option<String>,
    pub last_payment_id: Option<String>,
    pub is_admin: bool,
    pub referral_code: Option<String>,
    pub referral_count: i64,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl User {
    /// A fresh free-tier user as created on first interaction.
    pub fn new(user_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            username: None,
            first_name: None,
            last_name: None,
            is_premium: false,
            premium_until: None,
            premium_plan: None,
            payment_currency: None,
            last_payment_id: None,
            is_admin: false,
            referral_code: None,
            referral_count: 0,
            created_at: now,
            last_active: now,
        }
    }

    pub fn premium_state(&self, now: DateTime<Utc>) -> PremiumState {
        if !self.is_premium {
            return PremiumState::NotPremium;
        }
        match self.premium_until {
            Some(until) if until < now => PremiumState::Expired,
            _ => PremiumState::Active,
        }
    }
}

/// User statistics for the admin dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCounts {
    pub total_users: i64,
    pub premium_users: i64,
    pub active_today: i64,
    pub active_week: i64,
    pub active_month: i64,
}

// =====================================================
// Entity Profiles
// =====================================================

/// Cached token profile from the last successful on-chain lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenData {
    pub address: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub deployer: Option<String>,
    pub decimals: Option<u8>,
    pub total_supply: Option<String>,
    pub price_usd: Option<f64>,
    pub market_cap_usd: Option<f64>,
    pub holders_count: Option<i64>,
    pub deployed_at: Option<DateTime<Utc>>,
    /// Stamped by the store on every save
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl TokenData {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
            symbol: None,
            deployer: None,
            decimals: None,
            total_supply: None,
            price_usd: None,
            market_cap_usd: None,
            holders_count: None,
            deployed_at: None,
            last_updated: None,
        }
    }
}

/// Cached wallet profile with trading performance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletData {
    pub address: String,
    pub is_kol: bool,
    pub is_deployer: bool,
    /// Percentage of profitable trades, 0-100
    pub win_rate: f64,
    pub total_trades: i64,
    pub profitable_trades: i64,
    pub total_profit_usd: f64,
    pub tokens_deployed: i64,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl WalletData {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            is_kol: false,
            is_deployer: false,
            win_rate: 0.0,
            total_trades: 0,
            profitable_trades: 0,
            total_profit_usd: 0.0,
            tokens_deployed: 0,
            last_updated: None,
        }
    }
}

/// A wallet attributed to a key opinion leader, looked up by name or address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KolWallet {
    pub name: String,
    pub address: String,
    pub description: Option<String>,
    pub twitter_handle: Option<String>,
    pub win_rate: Option<f64>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

// =====================================================
// Tracking
// =====================================================

/// A user's standing request to be notified about activity at an address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingSubscription {
    /// Row id assigned by the store; `None` before the first save
    #[serde(default)]
    pub id: Option<i64>,
    pub user_id: i64,
    pub tracking_type: TrackingType,
    pub target_address: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
}

impl TrackingSubscription {
    /// An active subscription that has never been checked.
    pub fn new(
        user_id: i64,
        tracking_type: TrackingType,
        target_address: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            user_id,
            tracking_type,
            target_address: target_address.into(),
            is_active: true,
            created_at: now,
            last_checked: None,
        }
    }
}

// =====================================================
// Referrals & Payments
// =====================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralEdge {
    pub referrer_id: i64,
    pub referred_id: i64,
    pub date: DateTime<Utc>,
}

/// Price of a premium plan in one payment currency, as quoted by the pricing lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentDetails {
    /// Uppercase currency symbol (e.g. "ETH")
    pub currency: String,
    pub amount: f64,
    pub duration_days: i64,
    pub network: String,
}

/// Append-only payment log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: i64,
    pub user_id: i64,
    pub transaction_type: String,
    pub plan_type: String,
    pub currency: String,
    pub amount: f64,
    pub duration_days: i64,
    pub network: String,
    pub transaction_id: Option<String>,
    pub date: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::str::FromStr;

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("0xAbCdEF"), "0xabcdef");
        assert_eq!(normalize_address("0xabc"), "0xabc");
    }

    #[test]
    fn test_enum_storage_names() {
        assert_eq!(ScanType::TokenScan.as_ref(), "token_scan");
        assert_eq!(TrackingType::from_str("deployer").unwrap(), TrackingType::Deployer);
        assert!(TrackingType::from_str("kol").is_err());
        assert_eq!(
            serde_json::to_string(&TrackingType::Wallet).unwrap(),
            "\"wallet\""
        );
    }

    #[test]
    fn test_premium_state() {
        let now = Utc::now();
        let mut user = User::new(1, now);
        assert_eq!(user.premium_state(now), PremiumState::NotPremium);

        user.is_premium = true;
        user.premium_until = Some(now + Duration::days(3));
        assert_eq!(user.premium_state(now), PremiumState::Active);
        assert_eq!(
            user.premium_state(now + Duration::days(4)),
            PremiumState::Expired
        );
    }

    #[test]
    fn test_profile_last_updated_defaults_when_absent() {
        let wallet: WalletData = serde_json::from_str(
            r#"{"address":"0xabc","is_kol":true,"is_deployer":false,"win_rate":61.5,
                "total_trades":10,"profitable_trades":6,"total_profit_usd":1200.0,"tokens_deployed":0}"#,
        )
        .unwrap();
        assert!(wallet.is_kol);
        assert_eq!(wallet.last_updated, None);
    }
}

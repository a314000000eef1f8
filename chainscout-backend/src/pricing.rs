//! Premium plan pricing
//!
//! Loaded from `config/premium_plans.ron` at startup, falling back to the
//! built-in table when the file is missing or malformed. The store only sees
//! the `PlanPricing` trait, so callers may supply any other price source.

use chainscout_types::PaymentDetails;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

pub const PLANS_FILE: &str = "premium_plans.ron";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PricingError {
    #[error("unknown premium plan '{0}'")]
    UnknownPlan(String),

    #[error("premium plan '{plan}' cannot be paid in {currency}")]
    UnsupportedCurrency { plan: String, currency: String },

    #[error("pricing source unavailable: {0}")]
    Unavailable(String),
}

/// Plan/currency price lookup consumed by the premium payment path.
pub trait PlanPricing: Send + Sync {
    fn plan_payment_details(&self, plan: &str, currency: &str) -> Result<PaymentDetails, PricingError>;
}

/// Single plan as stored in the RON config file.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanEntry {
    pub duration_days: i64,
    /// Currency symbol → price
    pub prices: HashMap<String, PriceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceEntry {
    pub amount: f64,
    /// Chain the payment must be sent on (e.g. "Ethereum", "BSC")
    pub network: String,
}

/// In-memory plan table keyed by lowercase plan name and uppercase currency.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: HashMap<String, PlanEntry>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl PlanCatalog {
    fn from_entries(entries: HashMap<String, PlanEntry>) -> Self {
        let plans = entries
            .into_iter()
            .map(|(name, entry)| {
                let prices = entry
                    .prices
                    .into_iter()
                    .map(|(currency, price)| (currency.to_uppercase(), price))
                    .collect();
                (
                    name.to_lowercase(),
                    PlanEntry {
                        duration_days: entry.duration_days,
                        prices,
                    },
                )
            })
            .collect();
        Self { plans }
    }

    pub fn from_ron_str(content: &str) -> Result<Self, ron::error::SpannedError> {
        let parsed = ron::from_str::<HashMap<String, PlanEntry>>(content)?;
        Ok(Self::from_entries(parsed))
    }

    /// Load the plan table from `config_dir/premium_plans.ron`.
    pub fn load(config_dir: &Path) -> Self {
        let path = config_dir.join(PLANS_FILE);
        if !path.exists() {
            log::warn!("[pricing] {} not found, using built-in plans", path.display());
            return Self::builtin();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => match Self::from_ron_str(&content) {
                Ok(catalog) => {
                    log::info!("[pricing] Loaded {} premium plans from RON", catalog.len());
                    catalog
                }
                Err(e) => {
                    log::error!("[pricing] Failed to parse {}: {}", path.display(), e);
                    Self::builtin()
                }
            },
            Err(e) => {
                log::error!("[pricing] Failed to read {}: {}", path.display(), e);
                Self::builtin()
            }
        }
    }

    /// Hard-coded fallback used when no config file is available.
    pub fn builtin() -> Self {
        fn plan(duration_days: i64, eth: f64, bnb: f64) -> PlanEntry {
            let mut prices = HashMap::new();
            prices.insert(
                "ETH".to_string(),
                PriceEntry {
                    amount: eth,
                    network: "Ethereum".to_string(),
                },
            );
            prices.insert(
                "BNB".to_string(),
                PriceEntry {
                    amount: bnb,
                    network: "BSC".to_string(),
                },
            );
            PlanEntry {
                duration_days,
                prices,
            }
        }

        let mut plans = HashMap::new();
        plans.insert("weekly".to_string(), plan(7, 0.01, 0.035));
        plans.insert("monthly".to_string(), plan(30, 0.03, 0.1));
        Self { plans }
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// Plan names in alphabetical order.
    pub fn plan_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plans.keys().cloned().collect();
        names.sort();
        names
    }
}

impl PlanPricing for PlanCatalog {
    fn plan_payment_details(&self, plan: &str, currency: &str) -> Result<PaymentDetails, PricingError> {
        let entry = self
            .plans
            .get(&plan.to_lowercase())
            .ok_or_else(|| PricingError::UnknownPlan(plan.to_string()))?;

        let symbol = currency.to_uppercase();
        let price = entry
            .prices
            .get(&symbol)
            .ok_or_else(|| PricingError::UnsupportedCurrency {
                plan: plan.to_string(),
                currency: symbol.clone(),
            })?;

        Ok(PaymentDetails {
            currency: symbol,
            amount: price.amount,
            duration_days: entry.duration_days,
            network: price.network.clone(),
        })
    }
}

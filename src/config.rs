//! Runtime configuration.
//!
//! Every field has a default so an empty (or missing) TOML file yields the stock demo timings.

use crate::domain::payment::{PaymentMethod, PurchaseMode};
use crate::error::{Result, TimelineError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the commerce backend exposing `/intent`, `/update-product` and `/pay`.
    pub base_url: String,
    /// Currency code sent with product updates.
    pub currency: String,
    /// Merchant reported for products that do not carry one.
    pub default_merchant: String,
    /// Spending ceiling used when auto-purchase is requested without an explicit budget.
    pub default_budget: Decimal,
    /// Method used for automatic payments.
    pub auto_payment_method: String,
    pub delays: Delays,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            currency: "INR".to_string(),
            default_merchant: "CoffeeRoasters".to_string(),
            default_budget: dec!(100000),
            auto_payment_method: "card_1".to_string(),
            delays: Delays::default(),
        }
    }
}

impl Config {
    /// Reads a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| TimelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the base URL, the budget and the auto-payment method.
    pub fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.base_url)
            .map_err(|e| TimelineError::Config(format!("invalid base_url '{}': {e}", self.base_url)))?;
        check_budget("default_budget", self.default_budget)?;
        let method = PaymentMethod::offered(&self.auto_payment_method)?;
        if !method.is_auto_eligible() {
            return Err(TimelineError::Config(format!(
                "auto_payment_method '{method}' cannot be used for automatic purchases"
            )));
        }
        Ok(())
    }

    /// Purchase mode for a run; `budget` falls back to `default_budget`.
    pub fn purchase_mode(&self, auto: bool, budget: Option<Decimal>) -> Result<PurchaseMode> {
        if !auto {
            return Ok(PurchaseMode::Manual);
        }
        let budget = budget.unwrap_or(self.default_budget);
        check_budget("budget", budget)?;
        Ok(PurchaseMode::Auto { budget })
    }
}

fn check_budget(name: &str, budget: Decimal) -> Result<()> {
    if budget < Decimal::ZERO {
        return Err(TimelineError::Config(format!("{name} must not be negative")));
    }
    Ok(())
}

/// Fixed delays of the scripted flow, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Delays {
    /// Intent response to merchant agent becoming active.
    pub merchant_handoff_ms: u64,
    /// Intent response to products being shown.
    pub product_reveal_ms: u64,
    /// Products shown to the automatic payment being issued.
    pub auto_payment_ms: u64,
    /// Payment response to payment processor becoming active.
    pub payment_handoff_ms: u64,
    /// Payment response to receipt being shown.
    pub receipt_reveal_ms: u64,
    /// Gap between consecutive log entries of one batch.
    pub log_stagger_ms: u64,
}

impl Default for Delays {
    fn default() -> Self {
        Self {
            merchant_handoff_ms: 1000,
            product_reveal_ms: 2500,
            auto_payment_ms: 2000,
            payment_handoff_ms: 1500,
            receipt_reveal_ms: 3500,
            log_stagger_ms: 600,
        }
    }
}

impl Delays {
    pub fn merchant_handoff(&self) -> Duration {
        Duration::from_millis(self.merchant_handoff_ms)
    }

    pub fn product_reveal(&self) -> Duration {
        Duration::from_millis(self.product_reveal_ms)
    }

    pub fn auto_payment(&self) -> Duration {
        Duration::from_millis(self.auto_payment_ms)
    }

    pub fn payment_handoff(&self) -> Duration {
        Duration::from_millis(self.payment_handoff_ms)
    }

    pub fn receipt_reveal(&self) -> Duration {
        Duration::from_millis(self.receipt_reveal_ms)
    }

    pub fn log_stagger(&self) -> Duration {
        Duration::from_millis(self.log_stagger_ms)
    }

    /// All delays zeroed, for running the flow back-to-back.
    pub fn immediate() -> Self {
        Self {
            merchant_handoff_ms: 0,
            product_reveal_ms: 0,
            auto_payment_ms: 0,
            payment_handoff_ms: 0,
            receipt_reveal_ms: 0,
            log_stagger_ms: 0,
        }
    }
}

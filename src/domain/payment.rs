use crate::error::{Result, TimelineError};
use rust_decimal::Decimal;
use std::fmt;

/// Identifier of a stored payment credential, e.g. `card_1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PaymentMethod(String);

impl PaymentMethod {
    /// Wraps `id` without checking it; see [`PaymentMethod::offered`].
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Looks `id` up among [`PAYMENT_OPTIONS`].
    pub fn offered(id: &str) -> Result<Self> {
        PAYMENT_OPTIONS
            .iter()
            .find(|option| option.id == id)
            .map(|option| Self::new(option.id))
            .ok_or_else(|| {
                let known: Vec<&str> = PAYMENT_OPTIONS.iter().map(|option| option.id).collect();
                TimelineError::Config(format!(
                    "unknown payment method '{id}' (expected one of: {})",
                    known.join(", ")
                ))
            })
    }

    pub fn id(&self) -> &str {
        &self.0
    }

    /// UPI methods are never used for automatic purchases.
    pub fn is_auto_eligible(&self) -> bool {
        !self.0.starts_with("upi")
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A payment method as offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentOption {
    pub id: &'static str,
    pub label: &'static str,
    pub detail: &'static str,
}

pub const PAYMENT_OPTIONS: [PaymentOption; 2] = [
    PaymentOption {
        id: "card_1",
        label: "HDFC Credit Card",
        detail: "**** 1234",
    },
    PaymentOption {
        id: "upi_1",
        label: "UPI",
        detail: "user@upi",
    },
];

/// Options offered for `mode`; automatic purchases hide methods that need interaction.
pub fn payment_options(mode: PurchaseMode) -> Vec<PaymentOption> {
    PAYMENT_OPTIONS
        .iter()
        .filter(|option| !mode.is_auto() || PaymentMethod::new(option.id).is_auto_eligible())
        .copied()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PurchaseMode {
    #[default]
    Manual,
    /// Pay without confirmation when the selected product costs at most `budget`.
    Auto { budget: Decimal },
}

impl PurchaseMode {
    pub fn is_auto(&self) -> bool {
        matches!(self, PurchaseMode::Auto { .. })
    }
}

/// Terminal artifact of a completed payment.
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    pub receipt_id: String,
    pub amount: Decimal,
}

impl fmt::Display for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Receipt {}: ₹{}", self.receipt_id, self.amount)
    }
}

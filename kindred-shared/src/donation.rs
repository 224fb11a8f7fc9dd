//! Donation amount rules
//!
//! Amounts are integers in minor units. Each supported currency has its own
//! floor and ceiling so that, say, 500 NGN and 5 USD are both accepted while
//! 5 NGN is not.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::content::documents::DonationTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CurrencyLimits {
    pub code: &'static str,
    pub min_minor: i64,
    pub max_minor: i64,
}

/// Accepted currencies and their bounds, in minor units
pub const SUPPORTED_CURRENCIES: &[CurrencyLimits] = &[
    CurrencyLimits { code: "USD", min_minor: 100, max_minor: 10_000_000 },
    CurrencyLimits { code: "EUR", min_minor: 100, max_minor: 10_000_000 },
    CurrencyLimits { code: "GBP", min_minor: 100, max_minor: 10_000_000 },
    CurrencyLimits { code: "NGN", min_minor: 50_000, max_minor: 5_000_000_000 },
    CurrencyLimits { code: "GHS", min_minor: 500, max_minor: 100_000_000 },
    CurrencyLimits { code: "KES", min_minor: 10_000, max_minor: 1_000_000_000 },
    CurrencyLimits { code: "ZAR", min_minor: 1_000, max_minor: 200_000_000 },
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DonationError {
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Minimum donation is {}", format_amount(i64::clone(.min_minor), .currency))]
    AmountTooSmall { currency: String, min_minor: i64 },

    #[error("Maximum donation is {}", format_amount(i64::clone(.max_minor), .currency))]
    AmountTooLarge { currency: String, max_minor: i64 },

    #[error("Either an amount or a donation tier is required")]
    MissingAmount,
}

/// A validated amount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationAmount {
    pub amount_minor: i64,
    pub currency: String,
}

pub fn currency_limits(currency: &str) -> Option<&'static CurrencyLimits> {
    SUPPORTED_CURRENCIES
        .iter()
        .find(|c| c.code.eq_ignore_ascii_case(currency))
}

/// Validates a donation amount
///
/// A tier replaces both the custom amount and the currency. The result is
/// always checked against the currency's bounds, tiers included.
pub fn validate_donation(
    amount_minor: Option<i64>,
    currency: &str,
    tier: Option<&DonationTier>,
) -> Result<DonationAmount, DonationError> {
    let (amount_minor, currency) = match tier {
        Some(tier) => (tier.amount_minor, tier.currency.as_str()),
        None => (amount_minor.ok_or(DonationError::MissingAmount)?, currency),
    };

    let limits = currency_limits(currency)
        .ok_or_else(|| DonationError::UnsupportedCurrency(currency.to_string()))?;

    if amount_minor < limits.min_minor {
        return Err(DonationError::AmountTooSmall {
            currency: limits.code.to_string(),
            min_minor: limits.min_minor,
        });
    }
    if amount_minor > limits.max_minor {
        return Err(DonationError::AmountTooLarge {
            currency: limits.code.to_string(),
            max_minor: limits.max_minor,
        });
    }

    Ok(DonationAmount {
        amount_minor,
        currency: limits.code.to_string(),
    })
}

/// Formats minor units for display, e.g. `USD 25.00`
pub fn format_amount(amount_minor: i64, currency: &str) -> String {
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    format!("{} {}{}.{:02}", currency, sign, abs / 100, abs % 100)
}

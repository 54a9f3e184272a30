//! Strongly typed monetary amounts and timestamps.
//!
//! The ledger stores every amount as an integer count of its smallest
//! subunit (1 unit = 1 000 000 subunits).  User-facing decimal strings are
//! parsed straight into subunits by digit scaling, so no floating-point value
//! ever reaches a transaction.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::errors::{ClientError, Result};

/// Number of fractional digits in one ledger unit.
pub const SUBUNIT_DECIMALS: u32 = 6;

/// Subunits in one ledger unit.
pub const SUBUNITS_PER_UNIT: u128 = 10u128.pow(SUBUNIT_DECIMALS);

/// An amount denominated in ledger subunits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_subunits(subunits: u128) -> Self {
        Amount(subunits)
    }

    #[cfg(test)]
    pub const fn from_units(units: u128) -> Self {
        Amount(units * SUBUNITS_PER_UNIT)
    }

    pub const fn subunits(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Parse a user-entered decimal string that must be strictly positive.
    ///
    /// Accepts `"12"`, `"12.5"`, `".5"`, `"0.000001"`.  Rejects empty input,
    /// signs, exponents, `NaN`/`inf`, more than [`SUBUNIT_DECIMALS`]
    /// fractional digits and zero.
    pub fn parse_positive(input: &str) -> Result<Self> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(ClientError::Validation("amount is required".to_string()));
        }
        if raw.starts_with('-') {
            return Err(ClientError::Validation(format!(
                "amount must be positive, got {raw}"
            )));
        }

        let (whole, frac) = match raw.split_once('.') {
            Some((w, f)) => (w, f),
            None => (raw, ""),
        };

        let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !is_digits(whole) || !is_digits(frac) {
            return Err(ClientError::Validation(format!("{raw:?} is not a number")));
        }
        if frac.len() > SUBUNIT_DECIMALS as usize {
            return Err(ClientError::Validation(format!(
                "amount {raw} has more than {SUBUNIT_DECIMALS} decimal places"
            )));
        }

        let too_large = || ClientError::Validation(format!("amount {raw} is too large"));

        let whole_units: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| too_large())?
        };
        let frac_subunits: u128 = if frac.is_empty() {
            0
        } else {
            let padding = 10u128.pow(SUBUNIT_DECIMALS - frac.len() as u32);
            frac.parse::<u128>().map_err(|_| too_large())? * padding
        };

        let subunits = whole_units
            .checked_mul(SUBUNITS_PER_UNIT)
            .and_then(|v| v.checked_add(frac_subunits))
            .ok_or_else(too_large)?;

        if subunits == 0 {
            return Err(ClientError::Validation(
                "amount must be greater than zero".to_string(),
            ));
        }
        Ok(Amount(subunits))
    }

    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / SUBUNITS_PER_UNIT;
        let frac = self.0 % SUBUNITS_PER_UNIT;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{frac:0width$}", width = SUBUNIT_DECIMALS as usize);
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct UnixTimestamp(i64);

impl UnixTimestamp {
    pub const fn from_secs(secs: i64) -> Self {
        UnixTimestamp(secs)
    }

    pub fn now() -> Self {
        UnixTimestamp(Utc::now().timestamp())
    }

    pub const fn secs(self) -> i64 {
        self.0
    }

    /// Parse a form field holding an integer timestamp.
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim();
        raw.parse::<i64>().map(UnixTimestamp).map_err(|_| {
            ClientError::Validation(format!("deadline {raw:?} is not a unix timestamp"))
        })
    }

    pub fn to_rfc3339(self) -> Option<String> {
        DateTime::<Utc>::from_timestamp(self.0, 0).map(|dt| dt.to_rfc3339())
    }
}

impl fmt::Display for UnixTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

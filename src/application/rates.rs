//! Versioned interest rate table keyed by tenor

use std::collections::BTreeMap;

use crate::error::{CreditError, CreditResult};

pub const MIN_TENOR_MONTHS: i16 = 1;
pub const MAX_TENOR_MONTHS: i16 = 12;

const BPS_DENOMINATOR: i128 = 10_000;

/// Flat interest (basis points of principal) per tenor in months.
///
/// A tenor without its own row uses the next longer configured tenor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateTable {
    version: i32,
    rates: BTreeMap<i16, i32>,
}

/// Interest computed for one (amount, tenor) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateQuote {
    pub rate_table_version: i32,
    pub interest_rate_bps: i32,
    pub interest_amount: i64,
    pub total_amount: i64,
}

impl RateTable {
    pub fn new(version: i32, rates: BTreeMap<i16, i32>) -> CreditResult<Self> {
        if rates.is_empty() {
            return Err(CreditError::validation("Rate table must not be empty"));
        }
        for (tenor, bps) in &rates {
            if !(MIN_TENOR_MONTHS..=MAX_TENOR_MONTHS).contains(tenor) {
                return Err(CreditError::validation(format!(
                    "Rate table tenor {} outside {}..={}",
                    tenor, MIN_TENOR_MONTHS, MAX_TENOR_MONTHS
                )));
            }
            if *bps < 0 {
                return Err(CreditError::validation(format!(
                    "Rate for tenor {} must not be negative",
                    tenor
                )));
            }
        }
        Ok(Self { version, rates })
    }

    /// Default schedule: 3% for one month up to 30% for twelve
    pub fn standard() -> Self {
        let rates = BTreeMap::from([
            (1, 300),
            (2, 550),
            (3, 800),
            (6, 1_500),
            (9, 2_250),
            (12, 3_000),
        ]);
        Self { version: 1, rates }
    }

    /// Parse `tenor:bps` pairs, comma separated, e.g. `1:300,3:800,12:3000`
    pub fn parse(version: i32, raw: &str) -> CreditResult<Self> {
        let mut rates = BTreeMap::new();
        for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (tenor, bps) = pair
                .split_once(':')
                .ok_or_else(|| CreditError::validation(format!("Malformed rate '{}'", pair)))?;
            let tenor = tenor
                .trim()
                .parse::<i16>()
                .map_err(|_| CreditError::validation(format!("Bad tenor in '{}'", pair)))?;
            let bps = bps
                .trim()
                .parse::<i32>()
                .map_err(|_| CreditError::validation(format!("Bad rate in '{}'", pair)))?;
            rates.insert(tenor, bps);
        }
        Self::new(version, rates)
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn rate_for(&self, tenor: i16) -> CreditResult<i32> {
        validate_tenor(tenor)?;
        self.rates
            .range(tenor..)
            .next()
            .map(|(_, bps)| *bps)
            .ok_or_else(|| {
                CreditError::validation(format!("No interest rate configured for {} months", tenor))
            })
    }

    /// Deterministic interest for `amount` over `tenor` months
    pub fn quote(&self, amount: i64, tenor: i16) -> CreditResult<RateQuote> {
        validate_amount(amount)?;
        let bps = self.rate_for(tenor)?;
        let interest_amount = interest_on(amount, bps)?;
        Ok(RateQuote {
            rate_table_version: self.version,
            interest_rate_bps: bps,
            interest_amount,
            total_amount: total_with_interest(amount, interest_amount)?,
        })
    }
}

/// `amount * bps / 10_000`, rounded half up
pub fn interest_on(amount: i64, bps: i32) -> CreditResult<i64> {
    let scaled = amount as i128 * bps as i128;
    i64::try_from((scaled + BPS_DENOMINATOR / 2) / BPS_DENOMINATOR)
        .map_err(|_| CreditError::validation(format!("Interest on {} is out of range", amount)))
}

/// `amount + interest`, rejected when it does not fit in minor units
pub fn total_with_interest(amount: i64, interest: i64) -> CreditResult<i64> {
    amount
        .checked_add(interest)
        .ok_or_else(|| CreditError::validation(format!("Amount {} is too large", amount)))
}

pub fn validate_amount(amount: i64) -> CreditResult<()> {
    if amount <= 0 {
        return Err(CreditError::validation("Amount must be greater than 0"));
    }
    Ok(())
}

pub fn validate_tenor(tenor: i16) -> CreditResult<()> {
    if !(MIN_TENOR_MONTHS..=MAX_TENOR_MONTHS).contains(&tenor) {
        return Err(CreditError::validation(format!(
            "Duration must be between {} and {} months",
            MIN_TENOR_MONTHS, MAX_TENOR_MONTHS
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_is_reproducible() {
        let table = RateTable::standard();
        let a = table.quote(100_000, 3).unwrap();
        let b = table.quote(100_000, 3).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.interest_rate_bps, 800);
        assert_eq!(a.interest_amount, 8_000);
        assert_eq!(a.total_amount, 108_000);
        assert_eq!(a.rate_table_version, 1);
    }

    #[test]
    fn test_unlisted_tenor_uses_next_longer_rate() {
        let table = RateTable::standard();
        assert_eq!(table.rate_for(4).unwrap(), 1_500);
        assert_eq!(table.rate_for(10).unwrap(), 3_000);
    }

    #[test]
    fn test_tenor_bounds() {
        let table = RateTable::standard();
        assert!(matches!(table.quote(1_000, 0), Err(CreditError::Validation(_))));
        assert!(matches!(table.quote(1_000, 13), Err(CreditError::Validation(_))));
        assert!(table.quote(1_000, 1).is_ok());
        assert!(table.quote(1_000, 12).is_ok());
    }

    #[test]
    fn test_amount_must_be_positive() {
        let table = RateTable::standard();
        assert!(table.quote(0, 3).is_err());
        assert!(table.quote(-5, 3).is_err());
    }

    #[test]
    fn test_rounding_half_up() {
        assert_eq!(interest_on(1, 5_000).unwrap(), 1);
        assert_eq!(interest_on(1, 4_999).unwrap(), 0);
        assert_eq!(interest_on(333, 300).unwrap(), 10);
    }

    #[test]
    fn test_parse_and_gap() {
        let table = RateTable::parse(2, "1:250, 6:1200").unwrap();
        assert_eq!(table.version(), 2);
        assert_eq!(table.rate_for(3).unwrap(), 1_200);
        // Nothing configured beyond six months
        assert!(table.rate_for(7).is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(RateTable::parse(1, "").is_err());
        assert!(RateTable::parse(1, "3-800").is_err());
        assert!(RateTable::parse(1, "x:800").is_err());
        assert!(RateTable::parse(1, "24:800").is_err());
        assert!(RateTable::parse(1, "3:-1").is_err());
    }

    #[test]
    fn test_amounts_that_overflow_are_rejected() {
        let table = RateTable::standard();
        assert!(matches!(
            table.quote(i64::MAX, 12),
            Err(CreditError::Validation(_))
        ));
        assert!(matches!(
            interest_on(i64::MAX, i32::MAX),
            Err(CreditError::Validation(_))
        ));
        assert!(total_with_interest(i64::MAX - 1, 1).is_ok());
        assert!(total_with_interest(i64::MAX, 1).is_err());
    }
}

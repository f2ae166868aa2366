use std::fmt;
use std::str::FromStr;

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// key: billing-periodicity -> cycle length for a tenant subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Periodicity {
    Monthly,
    Quarterly,
    Semiannual,
    Annual,
}

impl Periodicity {
    pub fn as_str(self) -> &'static str {
        match self {
            Periodicity::Monthly => "monthly",
            Periodicity::Quarterly => "quarterly",
            Periodicity::Semiannual => "semiannual",
            Periodicity::Annual => "annual",
        }
    }

    fn months(self) -> u32 {
        match self {
            Periodicity::Monthly => 1,
            Periodicity::Quarterly => 3,
            Periodicity::Semiannual => 6,
            Periodicity::Annual => 12,
        }
    }
}

impl fmt::Display for Periodicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Periodicity {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "monthly" => Ok(Periodicity::Monthly),
            "quarterly" => Ok(Periodicity::Quarterly),
            "semiannual" => Ok(Periodicity::Semiannual),
            "annual" => Ok(Periodicity::Annual),
            other => Err(EngineError::configuration(format!(
                "unknown periodicity {other:?}"
            ))),
        }
    }
}

/// End date of the billing period opened at `start`.
///
/// Calendar-month arithmetic clamps month-end overflow to the last day of the
/// shorter month (Jan-31 + 1 month = Feb-28, Feb-29 in a leap year). Pinned
/// by the tests below; callers must not assume the rollover convention some
/// other date libraries use.
pub fn period_end(periodicity: Periodicity, start: NaiveDate) -> NaiveDate {
    start
        .checked_add_months(Months::new(periodicity.months()))
        .unwrap_or(start)
}

#[cfg(test)]
mod tests {
    use super::{period_end, Periodicity};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn every_periodicity_moves_forward() {
        let start = date(2024, 3, 15);
        for periodicity in [
            Periodicity::Monthly,
            Periodicity::Quarterly,
            Periodicity::Semiannual,
            Periodicity::Annual,
        ] {
            assert!(period_end(periodicity, start) > start, "{periodicity}");
        }
    }

    #[test]
    fn plain_additions() {
        assert_eq!(
            period_end(Periodicity::Monthly, date(2024, 1, 2)),
            date(2024, 2, 2)
        );
        assert_eq!(
            period_end(Periodicity::Quarterly, date(2024, 1, 2)),
            date(2024, 4, 2)
        );
        assert_eq!(
            period_end(Periodicity::Semiannual, date(2024, 1, 2)),
            date(2024, 7, 2)
        );
        assert_eq!(
            period_end(Periodicity::Annual, date(2024, 1, 2)),
            date(2025, 1, 2)
        );
    }

    #[test]
    fn month_end_overflow_clamps() {
        assert_eq!(
            period_end(Periodicity::Monthly, date(2023, 1, 31)),
            date(2023, 2, 28)
        );
        assert_eq!(
            period_end(Periodicity::Monthly, date(2024, 1, 31)),
            date(2024, 2, 29)
        );
        assert_eq!(
            period_end(Periodicity::Quarterly, date(2024, 8, 31)),
            date(2024, 11, 30)
        );
        assert_eq!(
            period_end(Periodicity::Annual, date(2024, 2, 29)),
            date(2025, 2, 28)
        );
    }

    #[test]
    fn unknown_periodicity_string_is_a_configuration_error() {
        let parsed = "fortnightly".parse::<Periodicity>();
        assert!(parsed.is_err());
    }
}

//! Analysis periods and the period-dependent risk-free rate table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "1M")]
    OneMonth,
    #[serde(rename = "3M")]
    ThreeMonths,
    #[serde(rename = "6M")]
    SixMonths,
    #[serde(rename = "1Y")]
    OneYear,
}

impl Period {
    pub const ALL: [Period; 4] = [
        Period::OneMonth,
        Period::ThreeMonths,
        Period::SixMonths,
        Period::OneYear,
    ];

    pub fn trading_days(self) -> usize {
        match self {
            Period::OneMonth => 21,
            Period::ThreeMonths => 63,
            Period::SixMonths => 126,
            Period::OneYear => 252,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Period::OneMonth => "1M",
            Period::ThreeMonths => "3M",
            Period::SixMonths => "6M",
            Period::OneYear => "1Y",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "1M" => Ok(Period::OneMonth),
            "3M" => Ok(Period::ThreeMonths),
            "6M" => Ok(Period::SixMonths),
            "1Y" => Ok(Period::OneYear),
            other => Err(format!("unknown period '{other}' (expected 1M, 3M, 6M or 1Y)")),
        }
    }
}

/// Annual risk-free rates per period, with a fallback for anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFreeRates {
    pub one_month: f64,
    pub three_months: f64,
    pub six_months: f64,
    pub one_year: f64,
    pub default: f64,
}

impl Default for RiskFreeRates {
    fn default() -> Self {
        RiskFreeRates {
            one_month: 0.015,
            three_months: 0.018,
            six_months: 0.020,
            one_year: 0.025,
            default: 0.02,
        }
    }
}

impl RiskFreeRates {
    pub fn rate(&self, period: Period) -> f64 {
        match period {
            Period::OneMonth => self.one_month,
            Period::ThreeMonths => self.three_months,
            Period::SixMonths => self.six_months,
            Period::OneYear => self.one_year,
        }
    }

    /// Rate for a free-form period label; unknown labels get the default.
    pub fn rate_for_label(&self, label: &str) -> f64 {
        label
            .parse::<Period>()
            .map(|p| self.rate(p))
            .unwrap_or(self.default)
    }
}

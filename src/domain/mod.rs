//! Portfolio domain: price series, statistics, risk, optimization and analysis.

pub mod asset;
pub mod returns;
pub mod stats;
pub mod period;
pub mod risk;
pub mod covariance;
pub mod optimizer;
pub mod portfolio;
pub mod analysis;
pub mod recommend;
pub mod config_validation;
pub mod error;

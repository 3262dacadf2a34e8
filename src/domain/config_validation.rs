//! Configuration validation and the [`AnalysisContext`] it produces.
//!
//! Missing numeric keys fall back to their defaults; present but invalid
//! values are rejected before any data is loaded.

use crate::domain::analysis::{AnalysisContext, DEFAULT_RISK_FREE_RATE};
use crate::domain::error::PortoptError;
use crate::domain::optimizer::{
    DEFAULT_FRONTIER_POINTS, DEFAULT_FRONTIER_RISK_TOLERANCE, DEFAULT_ITERATIONS,
    OptimizerSettings, WeightConstraints,
};
use crate::domain::period::RiskFreeRates;
use crate::domain::risk::DEFAULT_CVAR_CONFIDENCE;
use crate::domain::stats::{DEFAULT_BETA_WINDOW, DEFAULT_EWMA_LAMBDA};
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> PortoptError {
    PortoptError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

pub fn validate_analysis_config(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    validate_dates(config)?;
    validate_optimizer(config)?;
    validate_risk_free_rates(config)?;
    validate_metrics(config)?;
    Ok(())
}

/// Validate the whole file and build the context every analysis call takes.
pub fn analysis_context_from_config(
    config: &dyn ConfigPort,
) -> Result<AnalysisContext, PortoptError> {
    validate_analysis_config(config)?;

    let defaults = RiskFreeRates::default();
    let constraints = WeightConstraints::default();
    Ok(AnalysisContext {
        optimizer: OptimizerSettings {
            iterations: config.get_int("optimizer", "iterations", DEFAULT_ITERATIONS as i64)
                as usize,
            constraints: WeightConstraints {
                min_weight: config.get_double("optimizer", "min_weight", constraints.min_weight),
                max_weight: config.get_double("optimizer", "max_weight", constraints.max_weight),
            },
            frontier_points: config.get_int(
                "optimizer",
                "frontier_points",
                DEFAULT_FRONTIER_POINTS as i64,
            ) as usize,
            frontier_risk_tolerance: config.get_double(
                "optimizer",
                "frontier_risk_tolerance",
                DEFAULT_FRONTIER_RISK_TOLERANCE,
            ),
            sector_penalty: config.get_double("optimizer", "sector_penalty", 0.0),
        },
        risk_free_rate: config.get_double("optimizer", "risk_free_rate", DEFAULT_RISK_FREE_RATE),
        rates: RiskFreeRates {
            one_month: config.get_double("risk_free", "1M", defaults.one_month),
            three_months: config.get_double("risk_free", "3M", defaults.three_months),
            six_months: config.get_double("risk_free", "6M", defaults.six_months),
            one_year: config.get_double("risk_free", "1Y", defaults.one_year),
            default: config.get_double("risk_free", "default", defaults.default),
        },
        cvar_confidence: config.get_double("metrics", "cvar_confidence", DEFAULT_CVAR_CONFIDENCE),
        ewma_lambda: config.get_double("metrics", "ewma_lambda", DEFAULT_EWMA_LAMBDA),
        beta_window: config.get_int("metrics", "beta_window", DEFAULT_BETA_WINDOW as i64)
            as usize,
        seed: parse_seed(config)?,
    })
}

/// `[analysis] start_date`, required.
pub fn start_date(config: &dyn ConfigPort) -> Result<NaiveDate, PortoptError> {
    parse_date(config.get_string("analysis", "start_date").as_deref(), "start_date")?.ok_or_else(
        || PortoptError::ConfigMissing {
            section: "analysis".to_string(),
            key: "start_date".to_string(),
        },
    )
}

/// `[analysis] end_date`, optional.
pub fn end_date(config: &dyn ConfigPort) -> Result<Option<NaiveDate>, PortoptError> {
    parse_date(config.get_string("analysis", "end_date").as_deref(), "end_date")
}

fn parse_date(value: Option<&str>, field: &str) -> Result<Option<NaiveDate>, PortoptError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                invalid(
                    "analysis",
                    field,
                    format!("invalid {field} format, expected YYYY-MM-DD"),
                )
            }),
    }
}

fn parse_seed(config: &dyn ConfigPort) -> Result<Option<u64>, PortoptError> {
    match config.get_string("optimizer", "seed") {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| invalid("optimizer", "seed", "seed must be a non-negative integer")),
    }
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    let start = start_date(config)?;
    if end_date(config)?.is_some_and(|end| start >= end) {
        return Err(invalid(
            "analysis",
            "start_date",
            "start_date must be before end_date",
        ));
    }
    Ok(())
}

fn validate_optimizer(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    let iterations = config.get_int("optimizer", "iterations", DEFAULT_ITERATIONS as i64);
    if iterations <= 0 {
        return Err(invalid("optimizer", "iterations", "iterations must be positive"));
    }

    let defaults = WeightConstraints::default();
    let min = config.get_double("optimizer", "min_weight", defaults.min_weight);
    let max = config.get_double("optimizer", "max_weight", defaults.max_weight);
    for (key, value) in [("min_weight", min), ("max_weight", max)] {
        if !(0.0..=1.0).contains(&value) {
            return Err(invalid("optimizer", key, format!("{key} must be between 0 and 1")));
        }
    }
    if min > max {
        return Err(invalid(
            "optimizer",
            "min_weight",
            "min_weight must not exceed max_weight",
        ));
    }

    let points = config.get_int("optimizer", "frontier_points", DEFAULT_FRONTIER_POINTS as i64);
    if points < 2 {
        return Err(invalid(
            "optimizer",
            "frontier_points",
            "frontier_points must be at least 2",
        ));
    }

    let tolerance = config.get_double(
        "optimizer",
        "frontier_risk_tolerance",
        DEFAULT_FRONTIER_RISK_TOLERANCE,
    );
    if !tolerance.is_finite() {
        return Err(invalid(
            "optimizer",
            "frontier_risk_tolerance",
            "frontier_risk_tolerance must be finite",
        ));
    }

    let rate = config.get_double("optimizer", "risk_free_rate", DEFAULT_RISK_FREE_RATE);
    if !(0.0..1.0).contains(&rate) {
        return Err(invalid(
            "optimizer",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }

    if config.get_double("optimizer", "sector_penalty", 0.0) < 0.0 {
        return Err(invalid(
            "optimizer",
            "sector_penalty",
            "sector_penalty must be non-negative",
        ));
    }

    parse_seed(config)?;
    Ok(())
}

fn validate_risk_free_rates(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    for key in ["1M", "3M", "6M", "1Y", "default"] {
        let value = config.get_double("risk_free", key, 0.0);
        if !(0.0..1.0).contains(&value) {
            return Err(invalid("risk_free", key, "rate must be between 0 and 1"));
        }
    }
    Ok(())
}

fn validate_metrics(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    let confidence = config.get_double("metrics", "cvar_confidence", DEFAULT_CVAR_CONFIDENCE);
    if confidence <= 0.0 || confidence >= 1.0 {
        return Err(invalid(
            "metrics",
            "cvar_confidence",
            "cvar_confidence must be strictly between 0 and 1",
        ));
    }
    let lambda = config.get_double("metrics", "ewma_lambda", DEFAULT_EWMA_LAMBDA);
    if lambda <= 0.0 || lambda >= 1.0 {
        return Err(invalid(
            "metrics",
            "ewma_lambda",
            "ewma_lambda must be strictly between 0 and 1",
        ));
    }
    let window = config.get_int("metrics", "beta_window", DEFAULT_BETA_WINDOW as i64);
    if window < 2 {
        return Err(invalid("metrics", "beta_window", "beta_window must be at least 2"));
    }
    Ok(())
}

//! End-to-end tests over the domain pipeline.
//!
//! - Portfolio loading, metrics and the performance comparison via a mock port
//! - Seeded optimization and the efficient frontier
//! - Data gaps and upstream failures
//! - Recommendations and simulated allocations
//! - The same pipeline over an in-memory SQLite store

mod common;

use approx::assert_abs_diff_eq;
use common::*;
use portopt::domain::analysis::{
    AnalysisContext, Diagnostic, analyze_portfolio, compute_correlation_matrix,
    compute_efficient_frontier, compute_initial_metrics, optimize,
};
use portopt::domain::asset::align_assets;
use portopt::domain::covariance::CovarianceModel;
use portopt::domain::error::PortoptError;
use portopt::domain::optimizer::DEFAULT_FRONTIER_POINTS;
use portopt::domain::portfolio::{Portfolio, load_portfolio, simulate_portfolio};
use portopt::domain::recommend::{load_candidates, recommend};

fn start() -> chrono::NaiveDate {
    date(2024, 1, 1)
}

fn fast_ctx(seed: u64) -> AnalysisContext {
    let mut ctx = AnalysisContext::default().with_seed(seed);
    ctx.optimizer.iterations = 2_000;
    ctx
}

fn core_portfolio() -> Portfolio {
    load_portfolio(&sample_market(), "core", start()).unwrap()
}

fn mid_target(portfolio: &Portfolio) -> f64 {
    let model = CovarianceModel::build(&align_assets(&portfolio.assets));
    let (min, max) = model.return_range().unwrap();
    (min + max) / 2.0
}

mod pipeline {
    use super::*;

    #[test]
    fn loads_holdings_with_sectors_and_benchmark() {
        let portfolio = core_portfolio();
        assert_eq!(portfolio.symbols(), vec!["AAA", "BBB", "CCC"]);
        assert_eq!(portfolio.weights(), vec![0.4, 0.3, 0.3]);
        assert_eq!(portfolio.sectors()[1].as_deref(), Some("Energy"));
        assert_eq!(portfolio.benchmark.len(), 120);
        assert!(portfolio.diagnostics.is_empty());
    }

    #[test]
    fn start_date_filters_history() {
        let portfolio = load_portfolio(&sample_market(), "core", date(2024, 3, 1)).unwrap();
        assert!(portfolio.assets.iter().all(|a| a.history[0].date >= date(2024, 3, 1)));
        assert!(portfolio.benchmark.len() < 120);
    }

    #[test]
    fn initial_metrics_cover_every_period() {
        let portfolio = core_portfolio();
        let metrics = compute_initial_metrics(&portfolio, &fast_ctx(1)).unwrap();

        assert_eq!(metrics.portfolio_id, "core");
        assert_eq!(metrics.periods.len(), 4);
        assert!(metrics.volatility > 0.0);
        assert!(metrics.beta.is_finite());
        assert!(metrics.max_drawdown >= 0.0);
        assert!(metrics.cvar.is_finite());
        assert_abs_diff_eq!(
            metrics.sector_concentration,
            0.4 * 0.4 + 0.3 * 0.3 + 0.3 * 0.3,
            epsilon = 1e-12
        );
    }

    #[test]
    fn report_performance_starts_at_100_and_respects_end_date() {
        let portfolio = core_portfolio();
        let end = date(2024, 2, 15);
        let report = analyze_portfolio(&portfolio, &fast_ctx(1), Some(end)).unwrap();

        let perf = &report.performance;
        assert!(!perf.dates.is_empty());
        assert!(perf.dates.iter().all(|d| *d <= end));
        assert_abs_diff_eq!(perf.portfolio[0], 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(perf.benchmark[0], 100.0, epsilon = 1e-9);
        assert_eq!(perf.portfolio.len(), perf.dates.len());
        assert_eq!(report.correlation.symbols.len(), 3);
    }

    #[test]
    fn correlation_matrix_is_symmetric_with_unit_diagonal() {
        let portfolio = core_portfolio();
        let corr = compute_correlation_matrix(&portfolio.assets);
        for i in 0..3 {
            assert_abs_diff_eq!(corr.matrix[i][i], 1.0, epsilon = 1e-9);
            for j in 0..3 {
                assert_abs_diff_eq!(corr.matrix[i][j], corr.matrix[j][i], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn missing_benchmark_is_rejected() {
        let port = MockDataPort::new()
            .with_prices("AAA", None, generate_prices(start(), 30, 10.0, 0.001, 0.2, 0.0))
            .with_holding("p", "AAA", 1.0);
        let portfolio = load_portfolio(&port, "p", start()).unwrap();
        let err = compute_initial_metrics(&portfolio, &fast_ctx(1)).unwrap_err();
        assert!(matches!(err, PortoptError::NoMarketData { .. }));
    }
}

mod optimization {
    use super::*;

    #[test]
    fn seeded_runs_are_reproducible() {
        let portfolio = core_portfolio();
        let target = mid_target(&portfolio);
        let a = optimize(&portfolio, target, 0.5, &fast_ctx(42)).unwrap();
        let b = optimize(&portfolio, target, 0.5, &fast_ctx(42)).unwrap();
        assert_eq!(a.weights, b.weights);
        assert_eq!(a.seed, 42);
    }

    #[test]
    fn weights_respect_bounds_and_sum_to_one() {
        let portfolio = core_portfolio();
        let target = mid_target(&portfolio);
        let result = optimize(&portfolio, target, 0.3, &fast_ctx(7)).unwrap();

        assert_abs_diff_eq!(result.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        for w in &result.weights {
            assert!(*w >= 0.05 - 1e-9 && *w <= 0.40 + 1e-9, "weight {w} out of bounds");
        }
        assert_eq!(result.assets.len(), 3);
        assert_eq!(result.assets[0].symbol, "AAA");
        assert!(result.estimated_risk >= 0.0);
        assert!(!result.performance_series.dates.is_empty());
    }

    #[test]
    fn unreachable_target_is_rejected() {
        let portfolio = core_portfolio();
        let err = optimize(&portfolio, 50.0, 0.5, &fast_ctx(1)).unwrap_err();
        assert!(matches!(err, PortoptError::TargetOutOfRange { .. }));
    }

    #[test]
    fn risk_tolerance_outside_unit_interval_is_rejected() {
        let portfolio = core_portfolio();
        let target = mid_target(&portfolio);
        let err = optimize(&portfolio, target, 1.5, &fast_ctx(1)).unwrap_err();
        assert!(matches!(err, PortoptError::InvalidInput { .. }));
    }

    #[test]
    fn frontier_has_configured_points_in_target_order() {
        let portfolio = core_portfolio();
        let frontier = compute_efficient_frontier(&portfolio, &fast_ctx(3)).unwrap();

        assert_eq!(frontier.points.len(), DEFAULT_FRONTIER_POINTS);
        assert!(
            frontier
                .points
                .windows(2)
                .all(|w| w[0].target_return <= w[1].target_return)
        );
        assert!(frontier.points.iter().all(|p| p.weights.len() == 3));
        assert!(frontier.current.risk >= 0.0);
    }

    #[test]
    fn frontier_is_reproducible_with_seed() {
        let portfolio = core_portfolio();
        let a = compute_efficient_frontier(&portfolio, &fast_ctx(9)).unwrap();
        let b = compute_efficient_frontier(&portfolio, &fast_ctx(9)).unwrap();
        assert_eq!(a, b);
    }
}

mod data_gaps {
    use super::*;

    #[test]
    fn holding_without_prices_yields_diagnostic() {
        let port = sample_market().with_holding("gappy", "AAA", 0.6).with_holding("gappy", "ZZZ", 0.4);
        let portfolio = load_portfolio(&port, "gappy", start()).unwrap();

        assert_eq!(
            portfolio.diagnostics,
            vec![Diagnostic::MissingPriceHistory {
                symbol: "ZZZ".to_string()
            }]
        );
        let metrics = compute_initial_metrics(&portfolio, &fast_ctx(1)).unwrap();
        assert!(
            metrics
                .diagnostics
                .iter()
                .any(|d| matches!(d, Diagnostic::MissingPriceHistory { symbol } if symbol == "ZZZ"))
        );
    }

    #[test]
    fn price_store_failure_is_upstream_unavailable() {
        let port = sample_market().with_error("BBB", "connection reset");
        let err = load_portfolio(&port, "core", start()).unwrap_err();
        assert!(matches!(err, PortoptError::UpstreamUnavailable { .. }));
    }

    #[test]
    fn benchmark_failure_is_upstream_unavailable() {
        let port = sample_market().with_benchmark_error("timeout");
        let err = load_portfolio(&port, "core", start()).unwrap_err();
        assert!(matches!(err, PortoptError::UpstreamUnavailable { .. }));
    }

    #[test]
    fn unknown_portfolio_is_empty() {
        let err = load_portfolio(&sample_market(), "nope", start()).unwrap_err();
        assert!(matches!(err, PortoptError::EmptyPortfolio { .. }));
    }
}

mod recommendations {
    use super::*;

    #[test]
    fn recommends_unheld_sectors_and_ranks_correlation() {
        let port = sample_market();
        let portfolio = load_portfolio(&port, "core", start()).unwrap();
        let candidates = load_candidates(&port, &portfolio, start()).unwrap();
        assert_eq!(candidates.len(), 2);

        let recs = recommend(&portfolio.assets, &candidates);
        let sector_picks: Vec<&str> = recs
            .sector_diversification
            .iter()
            .map(|r| r.symbol.as_str())
            .collect();
        assert_eq!(sector_picks, vec!["DDD"]);
        assert_eq!(recs.low_correlation.len(), 2);
        let first = recs.low_correlation[0].average_correlation.unwrap();
        let second = recs.low_correlation[1].average_correlation.unwrap();
        assert!(first <= second);
    }

    #[test]
    fn candidate_store_failure_is_upstream_unavailable() {
        let port = sample_market();
        let portfolio = load_portfolio(&port, "core", start()).unwrap();
        let failing = sample_market().with_error("DDD", "disk read failed");
        let err = load_candidates(&failing, &portfolio, start()).unwrap_err();
        match err {
            PortoptError::UpstreamUnavailable { source_name, reason } => {
                assert_eq!(source_name, "price store");
                assert!(reason.contains("disk read failed"));
            }
            other => panic!("expected UpstreamUnavailable, got {other:?}"),
        }
    }
}

mod simulation {
    use super::*;

    #[test]
    fn simulated_allocation_takes_catalog_sectors() {
        let port = sample_market();
        let allocations = vec![("AAA".to_string(), 0.5), ("DDD".to_string(), 0.5)];
        let portfolio = simulate_portfolio(&port, &allocations, start()).unwrap();

        assert_eq!(portfolio.id, "simulation");
        assert_eq!(portfolio.sectors()[1].as_deref(), Some("Utilities"));
        let report = analyze_portfolio(&portfolio, &fast_ctx(1), None).unwrap();
        assert_eq!(report.metrics.portfolio_id, "simulation");
    }

    #[test]
    fn weights_must_sum_to_one() {
        let allocations = vec![("AAA".to_string(), 0.5), ("DDD".to_string(), 0.4)];
        let err = simulate_portfolio(&sample_market(), &allocations, start()).unwrap_err();
        assert!(matches!(err, PortoptError::InvalidInput { .. }));
    }
}

#[cfg(feature = "sqlite")]
mod sqlite_pipeline {
    use super::*;
    use portopt::adapters::sqlite_adapter::SqliteAdapter;

    fn seeded_store() -> SqliteAdapter {
        let market = sample_market();
        let store = SqliteAdapter::in_memory().unwrap();
        store.initialize_schema().unwrap();
        for (symbol, points) in &market.prices {
            store
                .insert_asset(symbol, market.sectors.get(symbol).map(String::as_str))
                .unwrap();
            store.insert_prices(symbol, points).unwrap();
        }
        store.insert_benchmark(&market.benchmark).unwrap();
        store.insert_holdings("core", &market.portfolios["core"]).unwrap();
        store
    }

    #[test]
    fn sqlite_matches_mock_port() {
        let store = seeded_store();
        let from_sqlite = load_portfolio(&store, "core", start()).unwrap();
        let from_mock = core_portfolio();

        assert_eq!(from_sqlite.symbols(), from_mock.symbols());
        let a = compute_initial_metrics(&from_sqlite, &fast_ctx(1)).unwrap();
        let b = compute_initial_metrics(&from_mock, &fast_ctx(1)).unwrap();
        assert_abs_diff_eq!(a.expected_return, b.expected_return, epsilon = 1e-9);
        assert_abs_diff_eq!(a.volatility, b.volatility, epsilon = 1e-9);
        assert_abs_diff_eq!(a.beta, b.beta, epsilon = 1e-9);
    }

    #[test]
    fn sqlite_optimization_runs() {
        let store = seeded_store();
        let portfolio = load_portfolio(&store, "core", start()).unwrap();
        let target = mid_target(&portfolio);
        let result = optimize(&portfolio, target, 0.5, &fast_ctx(11)).unwrap();
        assert_abs_diff_eq!(result.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
    }
}

//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::analysis::{
    AnalysisContext, analyze_portfolio, compute_correlation_matrix, compute_efficient_frontier,
    current_expected_return, optimize,
};
use crate::domain::config_validation::{analysis_context_from_config, end_date, start_date};
use crate::domain::error::PortoptError;
use crate::domain::portfolio::{Portfolio, load_portfolio, parse_allocations, simulate_portfolio};
use crate::domain::recommend::{load_candidates, recommend};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::MarketDataPort;

#[derive(Parser, Debug)]
#[command(name = "portopt", about = "Portfolio analytics and allocation optimizer")]
pub struct Cli {
    /// Log progress at info level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Current metrics, performance comparison and correlation matrix
    Analyze {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        portfolio: String,
        /// Cut-off for the performance comparison
        #[arg(long)]
        end_date: Option<NaiveDate>,
    },
    /// Search for an allocation near a target annual return
    Optimize {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long, required_unless_present = "allocations", conflicts_with = "allocations")]
        portfolio: Option<String>,
        /// Ad-hoc allocation such as AAPL:0.6,MSFT:0.4 instead of a stored portfolio
        #[arg(short, long)]
        allocations: Option<String>,
        /// Defaults to the expected return of the current weights
        #[arg(long)]
        target_return: Option<f64>,
        #[arg(long, default_value_t = 0.5)]
        risk_tolerance: f64,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Efficient frontier over the portfolio's assets
    Frontier {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long, required_unless_present = "allocations", conflicts_with = "allocations")]
        portfolio: Option<String>,
        #[arg(short, long)]
        allocations: Option<String>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Correlation matrix of the held assets
    Correlation {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        portfolio: String,
    },
    /// Diversification candidates from the catalog
    Recommend {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        portfolio: String,
    },
    /// Analyse an ad-hoc allocation such as AAPL:0.6,MSFT:0.4
    Simulate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        allocations: String,
        #[arg(long)]
        end_date: Option<NaiveDate>,
    },
    /// List symbols with stored prices
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match execute(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Run one command, printing its JSON record to stdout.
pub fn execute(command: Command) -> Result<(), PortoptError> {
    match command {
        Command::Analyze {
            config,
            portfolio,
            end_date,
        } => run_analyze(&config, &portfolio, end_date),
        Command::Optimize {
            config,
            portfolio,
            allocations,
            target_return,
            risk_tolerance,
            seed,
        } => {
            let source = PortfolioSource::new(portfolio, allocations)?;
            run_optimize(&config, &source, target_return, risk_tolerance, seed)
        }
        Command::Frontier {
            config,
            portfolio,
            allocations,
            seed,
        } => {
            let source = PortfolioSource::new(portfolio, allocations)?;
            run_frontier(&config, &source, seed)
        }
        Command::Correlation { config, portfolio } => run_correlation(&config, &portfolio),
        Command::Recommend { config, portfolio } => run_recommend(&config, &portfolio),
        Command::Simulate {
            config,
            allocations,
            end_date,
        } => run_simulate(&config, &allocations, end_date),
        Command::ListSymbols { config } => run_list_symbols(&config),
        Command::Validate { config } => run_validate(&config),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, PortoptError> {
    tracing::info!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path)
}

/// Open the price store named by `[data] source`.
pub fn open_data_port(config: &dyn ConfigPort) -> Result<Box<dyn MarketDataPort>, PortoptError> {
    let source = config
        .get_string("data", "source")
        .unwrap_or_else(|| "csv".to_string());

    match source.trim().to_lowercase().as_str() {
        "csv" => {
            let path = config
                .get_string("data", "path")
                .ok_or_else(|| PortoptError::ConfigMissing {
                    section: "data".into(),
                    key: "path".into(),
                })?;
            Ok(Box::new(CsvAdapter::new(PathBuf::from(path))))
        }
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let adapter = crate::adapters::sqlite_adapter::SqliteAdapter::from_config(config)?;
            if config.get_bool("sqlite", "create_schema", true) {
                adapter.initialize_schema()?;
            }
            Ok(Box::new(adapter))
        }
        other => Err(PortoptError::ConfigInvalid {
            section: "data".into(),
            key: "source".into(),
            reason: format!("unsupported data source '{other}'"),
        }),
    }
}

/// A stored portfolio id or an ad-hoc `SYMBOL:weight` list.
enum PortfolioSource {
    Stored(String),
    Simulated(Vec<(String, f64)>),
}

impl PortfolioSource {
    fn new(portfolio: Option<String>, allocations: Option<String>) -> Result<Self, PortoptError> {
        match (portfolio, allocations) {
            (Some(id), None) => Ok(PortfolioSource::Stored(id)),
            (None, Some(list)) => Ok(PortfolioSource::Simulated(parse_allocations(&list)?)),
            (Some(_), Some(_)) => Err(PortoptError::invalid_input(
                "pass either a portfolio id or allocations, not both",
            )),
            (None, None) => Err(PortoptError::invalid_input(
                "a portfolio id or allocations is required",
            )),
        }
    }
}

/// Validated config, analysis context and data port for one command.
struct Session {
    ctx: AnalysisContext,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    port: Box<dyn MarketDataPort>,
}

impl Session {
    fn open(config_path: &Path) -> Result<Self, PortoptError> {
        let config = load_config(config_path)?;
        let ctx = analysis_context_from_config(&config)?;
        Ok(Session {
            ctx,
            start_date: start_date(&config)?,
            end_date: end_date(&config)?,
            port: open_data_port(&config)?,
        })
    }

    fn portfolio(&self, portfolio_id: &str) -> Result<Portfolio, PortoptError> {
        load_portfolio(self.port.as_ref(), portfolio_id, self.start_date)
    }

    fn load(&self, source: &PortfolioSource) -> Result<Portfolio, PortoptError> {
        match source {
            PortfolioSource::Stored(id) => self.portfolio(id),
            PortfolioSource::Simulated(allocations) => {
                simulate_portfolio(self.port.as_ref(), allocations, self.start_date)
            }
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), PortoptError> {
    let json = serde_json::to_string_pretty(value).map_err(std::io::Error::from)?;
    let mut out = std::io::stdout().lock();
    writeln!(out, "{json}")?;
    Ok(())
}

fn run_analyze(
    config_path: &Path,
    portfolio_id: &str,
    end_override: Option<NaiveDate>,
) -> Result<(), PortoptError> {
    let session = Session::open(config_path)?;
    let portfolio = session.portfolio(portfolio_id)?;
    let report = analyze_portfolio(&portfolio, &session.ctx, end_override.or(session.end_date))?;
    print_json(&report)
}

fn run_optimize(
    config_path: &Path,
    source: &PortfolioSource,
    target_return: Option<f64>,
    risk_tolerance: f64,
    seed: Option<u64>,
) -> Result<(), PortoptError> {
    let mut session = Session::open(config_path)?;
    if seed.is_some() {
        session.ctx.seed = seed;
    }
    let portfolio = session.load(source)?;
    let target_return = match target_return {
        Some(target) => target,
        None => current_expected_return(&portfolio)?,
    };
    let result = optimize(&portfolio, target_return, risk_tolerance, &session.ctx)?;
    print_json(&result)
}

fn run_frontier(
    config_path: &Path,
    source: &PortfolioSource,
    seed: Option<u64>,
) -> Result<(), PortoptError> {
    let mut session = Session::open(config_path)?;
    if seed.is_some() {
        session.ctx.seed = seed;
    }
    let portfolio = session.load(source)?;
    let frontier = compute_efficient_frontier(&portfolio, &session.ctx)?;
    print_json(&frontier)
}

fn run_correlation(config_path: &Path, portfolio_id: &str) -> Result<(), PortoptError> {
    let session = Session::open(config_path)?;
    let portfolio = session.portfolio(portfolio_id)?;
    print_json(&compute_correlation_matrix(&portfolio.assets))
}

fn run_recommend(config_path: &Path, portfolio_id: &str) -> Result<(), PortoptError> {
    let session = Session::open(config_path)?;
    let portfolio = session.portfolio(portfolio_id)?;
    let candidates = load_candidates(session.port.as_ref(), &portfolio, session.start_date)?;
    print_json(&recommend(&portfolio.assets, &candidates))
}

fn run_simulate(
    config_path: &Path,
    allocations: &str,
    end_override: Option<NaiveDate>,
) -> Result<(), PortoptError> {
    let allocations = parse_allocations(allocations)?;
    let session = Session::open(config_path)?;
    let portfolio = simulate_portfolio(session.port.as_ref(), &allocations, session.start_date)?;
    let report = analyze_portfolio(&portfolio, &session.ctx, end_override.or(session.end_date))?;
    print_json(&report)
}

fn run_list_symbols(config_path: &Path) -> Result<(), PortoptError> {
    let config = load_config(config_path)?;
    let port = open_data_port(&config)?;
    let symbols = port.list_symbols()?;

    if symbols.is_empty() {
        eprintln!("No symbols found");
        return Ok(());
    }
    let mut out = std::io::stdout().lock();
    for (symbol, sector) in &symbols {
        match sector {
            Some(sector) => writeln!(out, "{symbol}\t{sector}")?,
            None => writeln!(out, "{symbol}")?,
        }
    }
    eprintln!("{} symbols found", symbols.len());
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), PortoptError> {
    let config = load_config(config_path)?;
    let ctx = analysis_context_from_config(&config)?;
    open_data_port(&config)?;

    eprintln!("Configuration is valid");
    eprintln!(
        "  optimizer: {} iterations, weights [{}, {}], {} frontier points",
        ctx.optimizer.iterations,
        ctx.optimizer.constraints.min_weight,
        ctx.optimizer.constraints.max_weight,
        ctx.optimizer.frontier_points
    );
    eprintln!("  start date: {}", start_date(&config)?);
    Ok(())
}

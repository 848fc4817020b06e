use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use prettytable::format;
use prettytable::row;
use prettytable::Table;
use quantfolio::config::AppConfig;
use quantfolio::market::PriceTable;
use quantfolio::optimization::ConstraintType;
use quantfolio::optimization::ObjectiveType;
use quantfolio::portfolio::OptimalPortfolio;
use quantfolio::strategy::PortfolioSelectionProblem;
use quantfolio::strategy::StrategyKind;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Portfolio selection over a CSV of daily prices.
#[derive(Parser)]
#[command(name = "quantfolio")]
#[command(version)]
#[command(about = "Mean-Variance, Mean-MAD, Mean-CVaR and HRP portfolio selection")]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Compute an optimal portfolio
  Solve {
    /// CSV with a `date` column followed by one price column per ticker
    #[arg(short, long)]
    prices: PathBuf,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Risk objective: variance, mad or cvar
    #[arg(short, long)]
    objective: Option<ObjectiveType>,

    /// Extra constraint, e.g. NO_SHORTSELLING (repeatable)
    #[arg(long = "constraint")]
    constraints: Vec<ConstraintType>,

    /// Use hierarchical risk parity instead of an optimization model
    #[arg(long)]
    hrp: bool,

    /// Per-period risk-free rate for the Sharpe ratio
    #[arg(long, default_value = "0.0")]
    risk_free: f64,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  match cli.command {
    Commands::Solve {
      prices,
      config,
      objective,
      constraints,
      hrp,
      risk_free,
      json,
    } => {
      let mut config = match config {
        Some(path) => AppConfig::load(&path).with_context(|| format!("loading config {}", path.display()))?,
        None => AppConfig::default(),
      };
      if let Some(objective) = objective {
        config.optimization.objective = objective;
      }
      config.optimization.constraints.extend(constraints);
      if hrp {
        config.strategy.kind = StrategyKind::HierarchicalRiskParity;
      }

      let table = PriceTable::from_csv_path(&prices)
        .with_context(|| format!("reading prices from {}", prices.display()))?;
      let universe = config.universe.build(table).context("building the investment universe")?;
      let strategy = config.strategy().context("configuring the strategy")?;
      info!(universe = universe.name(), kind = ?config.strategy.kind, "solving");

      let portfolio = PortfolioSelectionProblem::new(strategy, &universe)
        .solve()
        .context("selecting the portfolio")?;

      if json {
        print_json(&portfolio, risk_free)?;
      } else {
        print_table(&portfolio, risk_free)?;
      }
    }
  }

  Ok(())
}

fn print_table(portfolio: &OptimalPortfolio, risk_free: f64) -> Result<()> {
  let mut holdings = Table::new();
  holdings.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
  holdings.set_titles(row!["Holding", "Weight"]);
  for (holding, weight) in portfolio.portfolio().nonzero_holdings() {
    holdings.add_row(row![holding, r->format!("{:.4}", weight)]);
  }

  println!("{} ({}, {})", portfolio.name(), portfolio.model(), portfolio.objective());
  holdings.printstd();

  let mut metrics = Table::new();
  metrics.set_format(*format::consts::FORMAT_CLEAN);
  metrics.add_row(row!["Variance", r->format!("{:.6e}", portfolio.variance()?)]);
  metrics.add_row(row!["Expected return", r->format!("{:.6e}", portfolio.expected_return()?)]);
  metrics.add_row(row!["Sharpe ratio", r->format!("{:.4}", portfolio.sharpe_ratio(risk_free)?)]);
  metrics.printstd();
  Ok(())
}

fn print_json(portfolio: &OptimalPortfolio, risk_free: f64) -> Result<()> {
  let holdings: serde_json::Map<String, serde_json::Value> = portfolio
    .portfolio()
    .nonzero_holdings()
    .into_iter()
    .map(|(holding, weight)| (holding.to_string(), json!(weight)))
    .collect();

  let out = json!({
    "name": portfolio.name(),
    "model": portfolio.model(),
    "objective": portfolio.objective(),
    "start_holding_date": portfolio.start_holding_date(),
    "holdings": holdings,
    "variance": portfolio.variance()?,
    "expected_return": portfolio.expected_return()?,
    "sharpe_ratio": portfolio.sharpe_ratio(risk_free)?,
  });
  println!("{}", serde_json::to_string_pretty(&out)?);
  Ok(())
}

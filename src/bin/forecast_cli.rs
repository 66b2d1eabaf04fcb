use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{ArgAction, Parser};
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;
use serde_json::Value;
use shopintelli_ai::ml::{
    DailyForecast, ForecastConfig, ForecastReport, Forecaster, ModelKind, RandomForestConfig,
};

#[derive(Parser)]
#[command(
    name = "shopintelli-forecast",
    about = "Forecast daily sales for one product from a JSON history file",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")")
)]
struct Cli {
    /// JSON file holding `[{"date": "YYYY-MM-DD", "quantity": n}, ...]`
    history: PathBuf,

    /// Number of days to forecast
    #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u32).range(1..=365))]
    days: u32,

    /// Seed for the fallback generator; random when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Date fallback forecasts start after (defaults to today, UTC)
    #[arg(long)]
    today: Option<NaiveDate>,

    /// Trees in the random forest
    #[arg(long, default_value_t = 100)]
    n_estimators: usize,

    #[arg(
        long,
        action = ArgAction::SetTrue,
        help = "Render the forecast as pretty JSON"
    )]
    json: bool,
}

#[derive(Serialize)]
struct CliOutput<'a> {
    model_used: ModelKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    fallback_reason: Option<String>,
    forecasts: Vec<&'a DailyForecast>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let raw = fs::read_to_string(&cli.history)
        .with_context(|| format!("failed to read {}", cli.history.display()))?;
    let history: Vec<Value> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array", cli.history.display()))?;

    let forecaster = Forecaster::new(ForecastConfig {
        forest: RandomForestConfig {
            n_estimators: cli.n_estimators,
            ..RandomForestConfig::default()
        },
        ..ForecastConfig::default()
    });

    let today = cli.today.unwrap_or_else(|| Utc::now().date_naive());
    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let report = forecaster.forecast_raw(&history, cli.days, today, &mut rng);

    if cli.json {
        print_json(&report)
    } else {
        render_table(&report);
        Ok(())
    }
}

fn print_json(report: &ForecastReport) -> Result<()> {
    let output = CliOutput {
        model_used: report.model_kind(),
        fallback_reason: report.fallback_reason.as_ref().map(|r| r.to_string()),
        forecasts: report.predictions.iter().collect(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn render_table(report: &ForecastReport) {
    println!("model: {}", report.model_kind().as_str());
    if let Some(reason) = &report.fallback_reason {
        println!("fallback reason: {}", reason);
    }
    println!("{:<12} {:>10} {:>10}", "date", "sales", "confidence");
    for forecast in report.predictions.iter() {
        println!(
            "{:<12} {:>10} {:>10.3}",
            forecast.date.to_string(),
            forecast.predicted_sales,
            forecast.confidence
        );
    }
}

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pricecast_core::config::Settings;
use pricecast_core::dataset::Dataset;
use pricecast_core::ingest::provider::{PriceHistoryProvider, YahooChartClient};
use pricecast_core::model::{
    self, store, BoostedTrees, BoostingParams, ModelKind, Regressor, ScaledSvr, SvrParams,
};

#[derive(Debug, Parser)]
#[command(name = "pricecast_trainer")]
struct Args {
    /// Ticker whose daily closes are used for training.
    #[arg(long, default_value = "AAPL")]
    symbol: String,

    /// Lookback requested from the market data source (e.g. 6mo, 1y, 2y).
    #[arg(long, default_value = "1y")]
    range: String,

    /// Artifact directory. Defaults to MODEL_DIR, then ./models.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Fit both models and report their fit, but write no artifacts.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let model_dir = args
        .model_dir
        .clone()
        .unwrap_or_else(|| settings.model_dir.clone());

    if let Err(err) = train(&settings, &args, &model_dir).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(symbol = %args.symbol, error = %format!("{err:#}"), "training run failed");
        return Err(err);
    }

    Ok(())
}

async fn train(settings: &Settings, args: &Args, model_dir: &Path) -> anyhow::Result<()> {
    let provider = YahooChartClient::from_settings(settings)?;
    run(&provider, args, model_dir, &FitParams::default()).await
}

#[derive(Debug, Clone, Default)]
struct FitParams {
    svr: SvrParams,
    boosting: BoostingParams,
}

async fn run(
    provider: &dyn PriceHistoryProvider,
    args: &Args,
    model_dir: &Path,
    params: &FitParams,
) -> anyhow::Result<()> {
    let series = provider
        .fetch_daily_closes(&args.symbol, &args.range)
        .await
        .with_context(|| format!("failed to fetch {} closes for {}", args.range, args.symbol))?;

    let dataset = Dataset::from_series(&series);
    dataset.ensure_trainable()?;
    tracing::info!(
        symbol = %series.symbol,
        prices = series.len(),
        rows = dataset.len(),
        "built training dataset"
    );

    // Each model is persisted as soon as it is fit; a later failure leaves earlier files alone.
    let svr = ScaledSvr::fit(&dataset, &params.svr)
        .with_context(|| format!("failed to fit {}", ModelKind::Svr))?;
    persist(ModelKind::Svr, &svr, &dataset, model_dir, args.dry_run)?;

    let boosted = BoostedTrees::fit(&dataset, &params.boosting)
        .with_context(|| format!("failed to fit {}", ModelKind::BoostedTrees))?;
    persist(ModelKind::BoostedTrees, &boosted, &dataset, model_dir, args.dry_run)?;

    Ok(())
}

fn persist<M>(
    kind: ModelKind,
    fitted: &M,
    dataset: &Dataset,
    model_dir: &Path,
    dry_run: bool,
) -> anyhow::Result<()>
where
    M: Regressor + serde::Serialize,
{
    let in_sample = fitted.predict(&dataset.records())?;
    anyhow::ensure!(
        in_sample.iter().all(|v| v.is_finite()),
        "{kind} produced non-finite in-sample predictions; refusing to save it"
    );
    let rmse = model::rmse(&dataset.targets, &in_sample)?;

    if dry_run {
        tracing::info!(model = %kind, rmse, dry_run = true, "fitted model (not saved)");
        return Ok(());
    }

    let path = store::save(model_dir, kind, fitted)?;
    tracing::info!(model = %kind, rmse, path = %path.display(), "saved model");
    Ok(())
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

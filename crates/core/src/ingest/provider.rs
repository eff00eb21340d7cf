use crate::config::Settings;
use crate::domain::series::{PricePoint, PriceSeries};
use crate::ingest::types::ChartResponse;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate};

const CHART_PATH: &str = "/v8/finance/chart";
const USER_AGENT: &str = concat!("pricecast/", env!("CARGO_PKG_VERSION"));

#[async_trait::async_trait]
pub trait PriceHistoryProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Daily closes for `symbol` over a lookback such as `1y`, oldest first.
    async fn fetch_daily_closes(&self, symbol: &str, range: &str) -> Result<PriceSeries>;
}

#[derive(Debug, Clone)]
pub struct YahooChartClient {
    http: reqwest::Client,
    base_url: String,
}

impl YahooChartClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.market_data_timeout()?)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            base_url: settings.market_data_base_url.clone(),
        })
    }

    fn url(&self, symbol: &str) -> String {
        format!(
            "{}{}/{}",
            self.base_url.trim_end_matches('/'),
            CHART_PATH,
            symbol
        )
    }
}

#[async_trait::async_trait]
impl PriceHistoryProvider for YahooChartClient {
    fn provider_name(&self) -> &'static str {
        "yahoo_chart"
    }

    async fn fetch_daily_closes(&self, symbol: &str, range: &str) -> Result<PriceSeries> {
        let res = self
            .http
            .get(self.url(symbol))
            .query(&[("range", range), ("interval", "1d")])
            .send()
            .await
            .context("market data request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read market data response")?;

        if !status.is_success() {
            anyhow::bail!("market data HTTP {status}: {text}");
        }

        let series = parse_chart(&text, symbol)?;
        tracing::info!(
            provider = self.provider_name(),
            symbol,
            range,
            points = series.len(),
            first = ?series.first_date(),
            last = ?series.last_date(),
            "fetched daily closes"
        );
        Ok(series)
    }
}

/// Pairs chart timestamps with closes, dropping sessions without a close.
pub fn parse_chart(text: &str, symbol: &str) -> Result<PriceSeries> {
    let parsed = serde_json::from_str::<ChartResponse>(text)
        .with_context(|| format!("market data response is not a chart payload: {text}"))?;

    if let Some(err) = parsed.chart.error {
        anyhow::bail!("market data error for {symbol}: {} ({})", err.description, err.code);
    }

    let result = parsed
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .with_context(|| format!("market data response has no result for {symbol}"))?;

    let closes = result
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|q| q.close)
        .unwrap_or_default();

    anyhow::ensure!(
        closes.len() == result.timestamp.len(),
        "market data timestamp/close length mismatch ({} vs {})",
        result.timestamp.len(),
        closes.len()
    );

    let mut points = Vec::with_capacity(closes.len());
    for (ts, close) in result.timestamp.iter().zip(closes) {
        let Some(close) = close.filter(|c| c.is_finite()) else {
            continue;
        };
        points.push(PricePoint {
            date: timestamp_date(*ts)?,
            close,
        });
    }

    anyhow::ensure!(!points.is_empty(), "no closing prices returned for {symbol}");
    Ok(PriceSeries::new(result.meta.symbol, points))
}

fn timestamp_date(ts: i64) -> Result<NaiveDate> {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.date_naive())
        .with_context(|| format!("invalid market data timestamp {ts}"))
}

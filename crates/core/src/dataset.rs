use crate::domain::series::PriceSeries;
use crate::features::{self, FeatureRow};
use ndarray::{Array1, Array2};

/// Supervised training data derived from a price series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub rows: Vec<FeatureRow>,
    pub targets: Vec<f64>,
}

impl Dataset {
    /// Builds `(PrevClose, Return) -> Close` rows.
    ///
    /// For step `t`, the features are `Close[t-1]` and the return from `t-2` to `t-1`; the
    /// target is `Close[t]`. The first two steps have no previous return and are dropped, so a
    /// series of `n` points yields `n - 2` rows (none if `n < 3`).
    pub fn from_series(series: &PriceSeries) -> Self {
        let closes: Vec<f64> = series.closes().collect();

        let mut rows = Vec::with_capacity(closes.len().saturating_sub(2));
        let mut targets = Vec::with_capacity(rows.capacity());
        for w in closes.windows(3) {
            let (before, prev, close) = (w[0], w[1], w[2]);
            rows.push(FeatureRow::new(prev, (prev - before) / before));
            targets.push(close);
        }

        Self { rows, targets }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn records(&self) -> Array2<f64> {
        features::to_matrix(&self.rows)
    }

    pub fn target_array(&self) -> Array1<f64> {
        Array1::from(self.targets.clone())
    }

    pub fn ensure_trainable(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.is_empty(),
            "dataset is empty; need at least 3 prices to derive one training row"
        );
        anyhow::ensure!(
            self.rows.len() == self.targets.len(),
            "dataset rows/targets length mismatch ({} vs {})",
            self.rows.len(),
            self.targets.len()
        );

        // A zero close upstream shows up here as an infinite return.
        for (idx, (row, target)) in self.rows.iter().zip(&self.targets).enumerate() {
            anyhow::ensure!(
                row.prev_close.is_finite() && row.return_rate.is_finite() && target.is_finite(),
                "dataset row {idx} is not finite (prev_close={}, return={}, target={target})",
                row.prev_close,
                row.return_rate
            );
        }
        Ok(())
    }
}

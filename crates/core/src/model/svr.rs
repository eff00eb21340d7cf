use super::Regressor;
use crate::dataset::Dataset;
use crate::features::N_FEATURES;
use anyhow::Context;
use linfa::traits::{Fit, Predict};
use linfa_svm::Svm;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvrParams {
    /// Regularization strength.
    pub c: f64,
    /// Width of the insensitive tube around the target.
    pub epsilon: f64,
    /// RBF kernel coefficient. `None` derives it from the scaled training data.
    pub gamma: Option<f64>,
}

impl Default for SvrParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            epsilon: 0.1,
            gamma: None,
        }
    }
}

/// Per-column standardization to zero mean and unit variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f64>) -> anyhow::Result<Self> {
        let mean = x
            .mean_axis(Axis(0))
            .context("cannot fit a scaler on an empty matrix")?;
        // Constant columns keep their scale so they map to zero instead of NaN.
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 0.0 && s.is_finite() { s } else { 1.0 });
        Ok(Self { mean, scale })
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean) / &self.scale
    }
}

/// `model2`: standardized features fed to an epsilon-SVR with an RBF kernel.
#[derive(Serialize, Deserialize)]
pub struct ScaledSvr {
    scaler: StandardScaler,
    gamma: f64,
    svm: Svm<f64, f64>,
}

impl ScaledSvr {
    pub fn fit(dataset: &Dataset, params: &SvrParams) -> anyhow::Result<Self> {
        dataset.ensure_trainable()?;

        let records = dataset.records();
        let scaler = StandardScaler::fit(&records)?;
        let scaled = scaler.transform(&records);
        let gamma = params.gamma.unwrap_or_else(|| scale_gamma(&scaled));
        anyhow::ensure!(
            gamma.is_finite() && gamma > 0.0,
            "RBF gamma must be positive (got {gamma})"
        );

        let train = linfa::Dataset::new(scaled, dataset.target_array());
        // linfa parameterizes the RBF kernel as exp(-|x - y|^2 / eps).
        let svm = Svm::<f64, f64>::params()
            .c_svr(params.c, Some(params.epsilon))
            .gaussian_kernel(1.0 / gamma)
            .fit(&train)
            .context("SVR fit failed")?;

        tracing::debug!(rows = dataset.len(), gamma, c = params.c, "fitted SVR");

        Ok(Self { scaler, gamma, svm })
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }
}

impl Regressor for ScaledSvr {
    fn predict(&self, x: &Array2<f64>) -> anyhow::Result<Vec<f64>> {
        anyhow::ensure!(
            x.ncols() == N_FEATURES,
            "SVR expects {N_FEATURES} feature columns (got {})",
            x.ncols()
        );
        let scaled = self.scaler.transform(x);
        let predicted: Array1<f64> = self.svm.predict(&scaled);
        Ok(predicted.to_vec())
    }
}

/// `1 / (n_features * var(X))`, falling back to 1 for constant input.
fn scale_gamma(x: &Array2<f64>) -> f64 {
    let Some(mean) = x.mean() else {
        return 1.0;
    };
    let var = x.mapv(|v| (v - mean).powi(2)).mean().unwrap_or(0.0);
    if var > 0.0 {
        1.0 / (x.ncols() as f64 * var)
    } else {
        1.0
    }
}

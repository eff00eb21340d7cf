use super::Regressor;
use crate::dataset::Dataset;
use crate::features::N_FEATURES;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};

type Tree = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostingParams {
    /// Number of boosting rounds (trees).
    pub n_estimators: usize,
    /// Shrinkage applied to every tree's contribution.
    pub learning_rate: f64,
    pub max_depth: u16,
    pub min_samples_leaf: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_samples_leaf: 1,
        }
    }
}

/// `model3`: squared-error gradient boosting over regression trees.
#[derive(Serialize, Deserialize)]
pub struct BoostedTrees {
    base_score: f64,
    learning_rate: f64,
    trees: Vec<Tree>,
}

impl BoostedTrees {
    pub fn fit(dataset: &Dataset, params: &BoostingParams) -> anyhow::Result<Self> {
        dataset.ensure_trainable()?;
        anyhow::ensure!(
            params.learning_rate.is_finite() && params.learning_rate > 0.0,
            "learning_rate must be positive (got {})",
            params.learning_rate
        );

        let x = dense(&dataset.records())?;
        let y = &dataset.targets;
        let base_score = y.iter().sum::<f64>() / y.len() as f64;

        let tree_params = DecisionTreeRegressorParameters::default()
            .with_max_depth(params.max_depth)
            .with_min_samples_leaf(params.min_samples_leaf);

        let mut fitted = vec![base_score; y.len()];
        let mut trees = Vec::with_capacity(params.n_estimators);
        for round in 0..params.n_estimators {
            // Negative gradient of squared error is the plain residual.
            let residuals: Vec<f64> = y.iter().zip(&fitted).map(|(t, f)| t - f).collect();

            let tree = Tree::fit(&x, &residuals, tree_params.clone())
                .map_err(|e| anyhow::anyhow!("tree fit failed at round {round}: {e}"))?;
            let step = tree
                .predict(&x)
                .map_err(|e| anyhow::anyhow!("tree predict failed at round {round}: {e}"))?;

            for (f, s) in fitted.iter_mut().zip(&step) {
                *f += params.learning_rate * s;
            }
            trees.push(tree);
        }

        tracing::debug!(
            rows = dataset.len(),
            trees = trees.len(),
            base_score,
            "fitted boosted trees"
        );

        Ok(Self {
            base_score,
            learning_rate: params.learning_rate,
            trees,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for BoostedTrees {
    fn predict(&self, x: &Array2<f64>) -> anyhow::Result<Vec<f64>> {
        anyhow::ensure!(
            x.ncols() == N_FEATURES,
            "boosted trees expect {N_FEATURES} feature columns (got {})",
            x.ncols()
        );

        let mut out = vec![self.base_score; x.nrows()];
        if out.is_empty() || self.trees.is_empty() {
            return Ok(out);
        }

        let x = dense(x)?;
        for tree in &self.trees {
            let step = tree
                .predict(&x)
                .map_err(|e| anyhow::anyhow!("tree predict failed: {e}"))?;
            for (o, s) in out.iter_mut().zip(&step) {
                *o += self.learning_rate * s;
            }
        }
        Ok(out)
    }
}

fn dense(x: &Array2<f64>) -> anyhow::Result<DenseMatrix<f64>> {
    let rows: Vec<Vec<f64>> = x.outer_iter().map(|row| row.to_vec()).collect();
    DenseMatrix::from_2d_vec(&rows).map_err(|e| anyhow::anyhow!("invalid feature matrix: {e}"))
}

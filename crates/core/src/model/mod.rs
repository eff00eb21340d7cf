pub mod boosted;
pub mod store;
pub mod svr;

use ndarray::Array2;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub use boosted::{BoostedTrees, BoostingParams};
pub use svr::{ScaledSvr, SvrParams};

/// A fitted model: maps an `N x 2` feature matrix to `N` predictions, in row order.
pub trait Regressor: Send + Sync {
    fn predict(&self, x: &Array2<f64>) -> anyhow::Result<Vec<f64>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    /// `model2`
    Svr,
    /// `model3`
    BoostedTrees,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Svr, ModelKind::BoostedTrees];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::Svr => "model2",
            ModelKind::BoostedTrees => "model3",
        }
    }

    pub fn artifact_file_name(self) -> &'static str {
        match self {
            ModelKind::Svr => "model2.pkl",
            ModelKind::BoostedTrees => "model3.pkl",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownModel(pub String);

impl fmt::Display for UnknownModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown model: {}", self.0)
    }
}

impl std::error::Error for UnknownModel {}

impl FromStr for ModelKind {
    type Err = UnknownModel;

    /// Exact, case-sensitive match on the wire name. `model1` is not a model.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model2" => Ok(ModelKind::Svr),
            "model3" => Ok(ModelKind::BoostedTrees),
            other => Err(UnknownModel(other.to_string())),
        }
    }
}

/// The loaded models, fixed for the lifetime of the process.
pub struct Models {
    svr: Box<dyn Regressor>,
    boosted: Box<dyn Regressor>,
}

impl Models {
    pub fn new(svr: Box<dyn Regressor>, boosted: Box<dyn Regressor>) -> Self {
        Self { svr, boosted }
    }

    /// Loads both artifacts from `model_dir`; either one missing or unreadable is an error.
    pub fn load(model_dir: &Path) -> anyhow::Result<Self> {
        let svr: ScaledSvr = store::load(model_dir, ModelKind::Svr)?;
        let boosted: BoostedTrees = store::load(model_dir, ModelKind::BoostedTrees)?;
        Ok(Self::new(Box::new(svr), Box::new(boosted)))
    }

    pub fn get(&self, kind: ModelKind) -> &dyn Regressor {
        match kind {
            ModelKind::Svr => self.svr.as_ref(),
            ModelKind::BoostedTrees => self.boosted.as_ref(),
        }
    }
}

/// Root mean squared error between two equally long slices.
pub fn rmse(actual: &[f64], predicted: &[f64]) -> anyhow::Result<f64> {
    anyhow::ensure!(
        actual.len() == predicted.len() && !actual.is_empty(),
        "rmse needs two non-empty slices of equal length ({} vs {})",
        actual.len(),
        predicted.len()
    );
    let sse: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    Ok((sse / actual.len() as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_selectors_exactly() {
        assert_eq!("model2".parse::<ModelKind>(), Ok(ModelKind::Svr));
        assert_eq!("model3".parse::<ModelKind>(), Ok(ModelKind::BoostedTrees));

        for bad in ["model1", "model9", "foo", "", "Model2", " model2"] {
            let err = bad.parse::<ModelKind>().unwrap_err();
            assert_eq!(err, UnknownModel(bad.to_string()));
        }
        assert_eq!(
            "model1".parse::<ModelKind>().unwrap_err().to_string(),
            "unknown model: model1"
        );
    }

    #[test]
    fn wire_names_round_trip() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.as_str().parse::<ModelKind>(), Ok(kind));
            assert_eq!(kind.artifact_file_name(), format!("{kind}.pkl"));
        }
    }

    #[test]
    fn rmse_of_known_values() {
        assert_eq!(rmse(&[1.0, 2.0], &[1.0, 2.0]).unwrap(), 0.0);
        assert!((rmse(&[0.0, 0.0], &[3.0, 4.0]).unwrap() - 12.5_f64.sqrt()).abs() < 1e-12);
        assert!(rmse(&[], &[]).is_err());
        assert!(rmse(&[1.0], &[1.0, 2.0]).is_err());
    }
}

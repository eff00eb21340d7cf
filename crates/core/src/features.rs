use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Number of steps projected forward for every prediction.
pub const HORIZON: usize = 7;

/// Number of columns in a feature matrix.
pub const N_FEATURES: usize = 2;

/// One model input: the previous close and the return rate that led to it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub prev_close: f64,
    pub return_rate: f64,
}

impl FeatureRow {
    pub fn new(prev_close: f64, return_rate: f64) -> Self {
        Self {
            prev_close,
            return_rate,
        }
    }
}

/// Compounds `return_rate` forward for [`HORIZON`] steps starting from `prev_close`.
///
/// Row `i` (1-based) is `(prev_close * (1 + return_rate)^i, return_rate)`. The rate is held
/// fixed across all rows. Inputs are not validated: a rate of `-1` or a zero close simply
/// produces zeros, and non-finite inputs produce non-finite rows.
pub fn project(prev_close: f64, return_rate: f64) -> [FeatureRow; HORIZON] {
    let growth = 1.0 + return_rate;
    std::array::from_fn(|idx| {
        let step = (idx + 1) as i32;
        FeatureRow::new(prev_close * growth.powi(step), return_rate)
    })
}

/// Lays rows out as an `N x 2` matrix in row order.
pub fn to_matrix(rows: &[FeatureRow]) -> Array2<f64> {
    Array2::from_shape_fn((rows.len(), N_FEATURES), |(r, c)| match c {
        0 => rows[r].prev_close,
        _ => rows[r].return_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() <= 1e-9 * b.abs().max(1.0), "{a} != {b}");
    }

    #[test]
    fn projects_seven_compounded_rows() {
        let rows = project(100.0, 0.05);
        assert_eq!(rows.len(), 7);

        assert_close(rows[0].prev_close, 105.0);
        assert_close(rows[6].prev_close, 100.0 * 1.05_f64.powf(7.0));
        assert!((rows[6].prev_close - 140.71).abs() < 0.01);

        for (idx, row) in rows.iter().enumerate() {
            assert_close(row.prev_close, 100.0 * 1.05_f64.powf((idx + 1) as f64));
            assert_eq!(row.return_rate, 0.05);
        }
    }

    #[test]
    fn projection_is_pure() {
        assert_eq!(project(187.3, -0.012), project(187.3, -0.012));
    }

    #[test]
    fn degenerate_inputs_pass_through() {
        let wiped_out = project(100.0, -1.0);
        assert!(wiped_out.iter().all(|r| r.prev_close == 0.0));

        let zero = project(0.0, 0.1);
        assert!(zero.iter().all(|r| r.prev_close == 0.0 && r.return_rate == 0.1));

        let nan = project(f64::NAN, 0.1);
        assert!(nan.iter().all(|r| r.prev_close.is_nan()));
    }

    #[test]
    fn matrix_has_seven_rows_and_two_columns() {
        let rows = project(50.0, 0.02);
        let x = to_matrix(&rows);
        assert_eq!(x.dim(), (HORIZON, N_FEATURES));
        assert_eq!(x[[0, 0]], rows[0].prev_close);
        assert_eq!(x[[3, 1]], 0.02);
        assert_eq!(x[[6, 0]], rows[6].prev_close);
    }
}

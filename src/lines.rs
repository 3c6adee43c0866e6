use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};
use thiserror::Error;

#[cfg(test)]
use approx::assert_abs_diff_eq;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LineError {
    #[error(
        "Slopes must be n_basis x n_dims and offsets n_basis x 1: got slopes {slopes:?}, offsets {offsets:?}."
    )]
    ShapeMismatch {
        slopes: (usize, usize),
        offsets: (usize, usize),
    },

    #[error("Centers are {centers:?} but the lines are defined for {expected:?}.")]
    CentersMismatch {
        centers: (usize, usize),
        expected: (usize, usize),
    },

    #[error("Inputs have {found} columns but the lines are defined over {expected} dimensions.")]
    InputDimensionMismatch { expected: usize, found: usize },
}

/// `slope_b . center_b` for every basis function.
pub fn slope_center_products(slopes: ArrayView2<'_, f64>, centers: ArrayView2<'_, f64>) -> Array1<f64> {
    Zip::from(slopes.rows())
        .and(centers.rows())
        .map_collect(|slope, center| slope.dot(&center))
}

/// One local linear model `y = slope . x + offset` per basis function.
///
/// When `pivot_at_center` is set the stored offset is the value of the line at its own
/// basis function's center rather than at the origin, i.e. the line reads
/// `y = slope . (x - center) + offset`.
#[derive(Clone, Debug, PartialEq)]
pub struct LineModels {
    slopes: Array2<f64>,
    offsets: Array2<f64>,
    pivot_at_center: bool,
}

impl LineModels {
    pub fn new(
        slopes: Array2<f64>,
        offsets: Array2<f64>,
        pivot_at_center: bool,
    ) -> Result<Self, LineError> {
        if offsets.ncols() != 1 || offsets.nrows() != slopes.nrows() {
            return Err(LineError::ShapeMismatch {
                slopes: slopes.dim(),
                offsets: offsets.dim(),
            });
        }
        Ok(Self {
            slopes,
            offsets,
            pivot_at_center,
        })
    }

    pub fn slopes(&self) -> &Array2<f64> {
        &self.slopes
    }

    pub fn offsets(&self) -> &Array2<f64> {
        &self.offsets
    }

    pub fn pivots_at_center(&self) -> bool {
        self.pivot_at_center
    }

    pub(crate) fn slopes_mut(&mut self) -> &mut Array2<f64> {
        &mut self.slopes
    }

    pub(crate) fn offsets_mut(&mut self) -> &mut Array2<f64> {
        &mut self.offsets
    }

    fn check_centers(&self, centers: ArrayView2<'_, f64>) -> Result<(), LineError> {
        if centers.dim() != self.slopes.dim() {
            return Err(LineError::CentersMismatch {
                centers: centers.dim(),
                expected: self.slopes.dim(),
            });
        }
        Ok(())
    }

    /// Value of every line at every input, `n_samples x n_basis_functions`.
    pub fn evaluate(
        &self,
        inputs: ArrayView2<'_, f64>,
        centers: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>, LineError> {
        if inputs.ncols() != self.slopes.ncols() {
            return Err(LineError::InputDimensionMismatch {
                expected: self.slopes.ncols(),
                found: inputs.ncols(),
            });
        }
        self.check_centers(centers)?;

        let mut intercepts = self.offsets.column(0).to_owned();
        if self.pivot_at_center {
            // y = a(x - c) + b = ax + (b - ac)
            intercepts -= &slope_center_products(self.slopes.view(), centers);
        }

        let mut lines = inputs.dot(&self.slopes.t());
        lines += &intercepts.view().insert_axis(Axis(0));
        Ok(lines)
    }

    /// Re-encodes the offsets for the requested representation; predictions do not change.
    pub fn set_pivot_at_center(
        &mut self,
        pivot_at_center: bool,
        centers: ArrayView2<'_, f64>,
    ) -> Result<(), LineError> {
        if self.pivot_at_center == pivot_at_center {
            return Ok(());
        }
        self.check_centers(centers)?;

        let ac = slope_center_products(self.slopes.view(), centers);
        let mut offsets = self.offsets.column_mut(0);
        if pivot_at_center {
            // y = ax + b  ==  y = a(x - c) + (b + ac)
            offsets += &ac;
        } else {
            // y = a(x - c) + b  ==  y = ax + (b - ac)
            offsets -= &ac;
        }
        self.pivot_at_center = pivot_at_center;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn unpivoted_lines_are_affine_in_the_inputs() {
        let lines = LineModels::new(array![[1.0, 2.0], [-1.0, 0.5]], array![[0.5], [3.0]], false)
            .unwrap();
        let centers = array![[0.0, 0.0], [1.0, 1.0]];
        let values = lines
            .evaluate(array![[1.0, 1.0], [0.0, -2.0]].view(), centers.view())
            .unwrap();
        assert_eq!(values, array![[3.5, 2.5], [-3.5, 2.0]]);
    }

    #[test]
    fn pivoted_offset_is_the_value_at_the_center() {
        let centers = array![[2.0], [-1.0]];
        let lines = LineModels::new(array![[3.0], [0.5]], array![[1.0], [4.0]], true).unwrap();
        let at_centers = lines.evaluate(centers.view(), centers.view()).unwrap();
        assert_abs_diff_eq!(at_centers[[0, 0]], 1.0, epsilon = 1e-15);
        assert_abs_diff_eq!(at_centers[[1, 1]], 4.0, epsilon = 1e-15);
    }

    #[test]
    fn pivot_toggle_preserves_values_and_round_trips_offsets() {
        let centers = array![[0.2, -0.4], [1.3, 0.8], [2.5, 1.5]];
        let original_offsets = array![[0.1], [-0.7], [2.2]];
        let mut lines = LineModels::new(
            array![[1.5, -0.5], [0.3, 2.0], [-1.1, 0.4]],
            original_offsets.clone(),
            false,
        )
        .unwrap();
        let inputs = array![[0.0, 0.0], [1.0, -1.0], [3.0, 2.0]];
        let before = lines.evaluate(inputs.view(), centers.view()).unwrap();

        lines.set_pivot_at_center(true, centers.view()).unwrap();
        // 1.5*0.2 + -0.5*-0.4 = 0.5
        assert_abs_diff_eq!(lines.offsets()[[0, 0]], 0.6, epsilon = 1e-12);
        let pivoted = lines.evaluate(inputs.view(), centers.view()).unwrap();
        for (a, b) in before.iter().zip(pivoted.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }

        lines.set_pivot_at_center(true, centers.view()).unwrap();
        assert_abs_diff_eq!(lines.offsets()[[0, 0]], 0.6, epsilon = 1e-12);

        lines.set_pivot_at_center(false, centers.view()).unwrap();
        for (a, b) in lines.offsets().iter().zip(original_offsets.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn rejects_offsets_with_more_than_one_column() {
        let err = LineModels::new(array![[1.0], [2.0]], array![[0.0, 1.0], [0.0, 1.0]], false)
            .unwrap_err();
        assert!(matches!(err, LineError::ShapeMismatch { .. }));
    }
}

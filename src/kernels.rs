use ndarray::{Array2, ArrayView2, ArrayViewMut1, Axis};
use rayon::prelude::*;
use thiserror::Error;

#[cfg(test)]
use approx::assert_abs_diff_eq;

/// Errors raised while evaluating Gaussian basis functions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    #[error(
        "Centers and widths must have the same shape: centers are {centers:?}, widths are {widths:?}."
    )]
    ShapeMismatch {
        centers: (usize, usize),
        widths: (usize, usize),
    },

    #[error(
        "Inputs have {found} columns but the basis functions are defined over {expected} dimensions."
    )]
    InputDimensionMismatch { expected: usize, found: usize },
}

/// Divisor applied to the largest row sum when some row of activations sums to exactly zero.
pub const ZERO_SUM_GUARD_DIVISOR: f64 = 100000.0;

fn check_shapes(
    centers: ArrayView2<'_, f64>,
    widths: ArrayView2<'_, f64>,
    inputs: ArrayView2<'_, f64>,
) -> Result<(), KernelError> {
    if centers.dim() != widths.dim() {
        return Err(KernelError::ShapeMismatch {
            centers: centers.dim(),
            widths: widths.dim(),
        });
    }
    if inputs.ncols() != centers.ncols() {
        return Err(KernelError::InputDimensionMismatch {
            expected: centers.ncols(),
            found: inputs.ncols(),
        });
    }
    Ok(())
}

// Unnormalized diagonal-covariance Gaussian, accumulated one dimension at a time:
//   exp(sum_d -0.5 (x_d - c_d)^2 / w_d^2) = prod_d exp(-0.5 (x_d - c_d)^2 / w_d^2)
fn fill_activation_column(
    basis: usize,
    mut column: ArrayViewMut1<'_, f64>,
    centers: ArrayView2<'_, f64>,
    widths: ArrayView2<'_, f64>,
    inputs: ArrayView2<'_, f64>,
    asymmetric: bool,
) {
    column.fill(1.0);
    for dim in 0..centers.ncols() {
        let c = centers[[basis, dim]];
        let own_width = widths[[basis, dim]];
        for (sample, activation) in column.iter_mut().enumerate() {
            let x = inputs[[sample, dim]];
            // Below the center, an asymmetric kernel borrows the left neighbour's width.
            let w = if asymmetric && x < c && basis > 0 {
                widths[[basis - 1, dim]]
            } else {
                own_width
            };
            let delta = x - c;
            *activation *= (-0.5 * delta * delta / (w * w)).exp();
        }
    }
}

pub(crate) fn kernel_activations_with_threshold(
    centers: ArrayView2<'_, f64>,
    widths: ArrayView2<'_, f64>,
    inputs: ArrayView2<'_, f64>,
    asymmetric: bool,
    parallel_threshold: usize,
) -> Result<Array2<f64>, KernelError> {
    check_shapes(centers, widths, inputs)?;
    let n_basis = centers.nrows();
    let n_samples = inputs.nrows();
    let mut activations = Array2::<f64>::zeros((n_samples, n_basis));

    if n_samples.saturating_mul(n_basis) >= parallel_threshold {
        activations
            .axis_iter_mut(Axis(1))
            .into_par_iter()
            .enumerate()
            .for_each(|(basis, column)| {
                fill_activation_column(basis, column, centers, widths, inputs, asymmetric);
            });
    } else {
        for (basis, column) in activations.axis_iter_mut(Axis(1)).enumerate() {
            fill_activation_column(basis, column, centers, widths, inputs, asymmetric);
        }
    }
    Ok(activations)
}

/// Raw (unnormalized) Gaussian activations, `n_samples x n_basis_functions`.
///
/// With `asymmetric` set, a sample lying below a center in some dimension is weighted with
/// the width of the previous basis function in that dimension. This only makes sense when
/// basis functions are sorted by increasing center along dimension 0; the ordering is a
/// precondition and is not checked. Basis function 0 always uses its own width.
pub fn kernel_activations(
    centers: ArrayView2<'_, f64>,
    widths: ArrayView2<'_, f64>,
    inputs: ArrayView2<'_, f64>,
    asymmetric: bool,
) -> Result<Array2<f64>, KernelError> {
    kernel_activations_with_threshold(centers, widths, inputs, asymmetric, usize::MAX)
}

/// Normalizes raw activations so that every row sums to one.
///
/// A single basis function is normalized to exactly one everywhere. If any row sums to
/// exactly zero, `max(row_sums) / 1e5` is added to every row sum before dividing. This is a
/// heuristic: a row of zeros still yields NaN when every row sums to zero.
pub fn normalize_activations(mut activations: Array2<f64>) -> Array2<f64> {
    if activations.ncols() == 1 {
        activations.fill(1.0);
        return activations;
    }

    let mut row_sums = activations.sum_axis(Axis(1));
    if row_sums.iter().any(|&s| s == 0.0) {
        let max_sum = row_sums.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let guard = max_sum / ZERO_SUM_GUARD_DIVISOR;
        log::warn!(
            "[LWR kernels] zero activation sum in at least one row; adding {:.3e} to every row sum",
            guard
        );
        row_sums.mapv_inplace(|s| s + guard);
    }

    for (mut row, &sum) in activations.axis_iter_mut(Axis(0)).zip(row_sums.iter()) {
        row.mapv_inplace(|a| a / sum);
    }
    activations
}

pub(crate) fn normalized_kernel_activations_with_threshold(
    centers: ArrayView2<'_, f64>,
    widths: ArrayView2<'_, f64>,
    inputs: ArrayView2<'_, f64>,
    asymmetric: bool,
    parallel_threshold: usize,
) -> Result<Array2<f64>, KernelError> {
    if centers.nrows() == 1 {
        // Weighting a single line with itself is ordinary least squares; skip the divide.
        check_shapes(centers, widths, inputs)?;
        return Ok(Array2::ones((inputs.nrows(), 1)));
    }
    let raw =
        kernel_activations_with_threshold(centers, widths, inputs, asymmetric, parallel_threshold)?;
    Ok(normalize_activations(raw))
}

/// Raw activations followed by [`normalize_activations`].
pub fn normalized_kernel_activations(
    centers: ArrayView2<'_, f64>,
    widths: ArrayView2<'_, f64>,
    inputs: ArrayView2<'_, f64>,
    asymmetric: bool,
) -> Result<Array2<f64>, KernelError> {
    normalized_kernel_activations_with_threshold(centers, widths, inputs, asymmetric, usize::MAX)
}

/// Gaussian kernels defined by one center and one per-dimension width per basis function.
#[derive(Clone, Debug, PartialEq)]
pub struct BasisFunctions {
    centers: Array2<f64>,
    widths: Array2<f64>,
    asymmetric: bool,
    parallel_threshold: usize,
}

impl BasisFunctions {
    pub fn new(
        centers: Array2<f64>,
        widths: Array2<f64>,
        asymmetric: bool,
    ) -> Result<Self, KernelError> {
        if centers.dim() != widths.dim() {
            return Err(KernelError::ShapeMismatch {
                centers: centers.dim(),
                widths: widths.dim(),
            });
        }
        Ok(Self {
            centers,
            widths,
            asymmetric,
            parallel_threshold: usize::MAX,
        })
    }

    pub fn with_parallel_threshold(mut self, parallel_threshold: usize) -> Self {
        self.parallel_threshold = parallel_threshold;
        self
    }

    pub fn n_basis_functions(&self) -> usize {
        self.centers.nrows()
    }

    pub fn n_dims(&self) -> usize {
        self.centers.ncols()
    }

    pub fn centers(&self) -> &Array2<f64> {
        &self.centers
    }

    pub fn widths(&self) -> &Array2<f64> {
        &self.widths
    }

    pub fn is_asymmetric(&self) -> bool {
        self.asymmetric
    }

    pub(crate) fn centers_mut(&mut self) -> &mut Array2<f64> {
        &mut self.centers
    }

    pub(crate) fn widths_mut(&mut self) -> &mut Array2<f64> {
        &mut self.widths
    }

    pub fn activations(&self, inputs: ArrayView2<'_, f64>) -> Result<Array2<f64>, KernelError> {
        kernel_activations_with_threshold(
            self.centers.view(),
            self.widths.view(),
            inputs,
            self.asymmetric,
            self.parallel_threshold,
        )
    }

    pub fn normalized_activations(
        &self,
        inputs: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>, KernelError> {
        normalized_kernel_activations_with_threshold(
            self.centers.view(),
            self.widths.view(),
            inputs,
            self.asymmetric,
            self.parallel_threshold,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_bases_1d(asymmetric: bool) -> BasisFunctions {
        BasisFunctions::new(array![[0.0], [1.0]], array![[0.5], [0.5]], asymmetric).unwrap()
    }

    #[test]
    fn midpoint_between_two_equal_kernels_activates_both_equally() {
        let basis = two_bases_1d(false);
        let inputs = array![[0.5]];
        let raw = basis.activations(inputs.view()).unwrap();
        // (0.5 - 0)^2 / 0.5^2 = 1, so each activation is exp(-0.5).
        assert_abs_diff_eq!(raw[[0, 0]], (-0.5f64).exp(), epsilon = 1e-15);
        assert_abs_diff_eq!(raw[[0, 1]], raw[[0, 0]], epsilon = 1e-15);

        let normalized = basis.normalized_activations(inputs.view()).unwrap();
        assert_abs_diff_eq!(normalized[[0, 0]], 0.5, epsilon = 1e-15);
        assert_abs_diff_eq!(normalized[[0, 1]], 0.5, epsilon = 1e-15);
    }

    #[test]
    fn activation_is_product_over_dimensions() {
        let centers = array![[0.0, 1.0]];
        let widths = array![[1.0, 2.0]];
        let inputs = array![[1.0, -1.0]];
        let raw = kernel_activations(centers.view(), widths.view(), inputs.view(), false).unwrap();
        let expected = (-0.5f64 * 1.0).exp() * (-0.5f64 * 4.0 / 4.0).exp();
        assert_abs_diff_eq!(raw[[0, 0]], expected, epsilon = 1e-15);
    }

    #[test]
    fn asymmetric_kernel_borrows_previous_width_below_center() {
        let centers = array![[0.0], [1.0]];
        let widths = array![[0.25], [1.0]];
        let inputs = array![[0.5], [1.5]];
        let sym = kernel_activations(centers.view(), widths.view(), inputs.view(), false).unwrap();
        let asym = kernel_activations(centers.view(), widths.view(), inputs.view(), true).unwrap();

        // x = 0.5 lies below center 1.0, so basis 1 uses width 0.25.
        let expected = (-0.5f64 * 0.25 / (0.25 * 0.25)).exp();
        assert_abs_diff_eq!(asym[[0, 1]], expected, epsilon = 1e-15);
        assert!(asym[[0, 1]] < sym[[0, 1]]);
        // x = 1.5 lies above center 1.0: own width.
        assert_abs_diff_eq!(asym[[1, 1]], sym[[1, 1]], epsilon = 1e-15);
    }

    #[test]
    fn first_basis_never_substitutes_a_width() {
        let centers = array![[0.0], [1.0]];
        let widths = array![[0.3], [5.0]];
        let inputs = array![[-2.0], [-0.1]];
        let sym = kernel_activations(centers.view(), widths.view(), inputs.view(), false).unwrap();
        let asym = kernel_activations(centers.view(), widths.view(), inputs.view(), true).unwrap();
        for i in 0..inputs.nrows() {
            assert_eq!(asym[[i, 0]], sym[[i, 0]]);
        }
    }

    #[test]
    fn normalized_rows_sum_to_one() {
        let basis = BasisFunctions::new(
            array![[0.0, 0.0], [1.0, 0.5], [2.0, -1.0]],
            array![[0.7, 0.4], [0.6, 0.9], [1.1, 0.3]],
            false,
        )
        .unwrap();
        let inputs = array![[0.1, 0.2], [1.5, -0.3], [3.0, 1.0], [-1.0, 0.0]];
        let normalized = basis.normalized_activations(inputs.view()).unwrap();
        for row in normalized.rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn single_basis_normalizes_to_exactly_one() {
        let basis = BasisFunctions::new(array![[3.0]], array![[0.01]], false).unwrap();
        let inputs = array![[3.0], [100.0], [-1e6]];
        let normalized = basis.normalized_activations(inputs.view()).unwrap();
        assert_eq!(normalized.dim(), (3, 1));
        assert!(normalized.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn zero_sum_row_is_guarded_but_not_fixed() {
        // Row 1 underflows to zero for both kernels; row 0 does not.
        let raw = array![[0.2, 0.6], [0.0, 0.0]];
        let normalized = normalize_activations(raw);
        let guard = 0.8 / ZERO_SUM_GUARD_DIVISOR;
        assert_abs_diff_eq!(normalized[[0, 0]], 0.2 / (0.8 + guard), epsilon = 1e-15);
        assert!(normalized.row(0).sum() < 1.0);
        assert_eq!(normalized[[1, 0]], 0.0);
        assert_eq!(normalized[[1, 1]], 0.0);
    }

    #[test]
    fn all_zero_activations_still_produce_nan() {
        let normalized = normalize_activations(Array2::zeros((2, 3)));
        assert!(normalized.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn parallel_fill_matches_serial_fill() {
        let centers = array![[0.0, 0.0], [0.5, 1.0], [1.0, -1.0], [1.5, 0.5]];
        let widths = array![[0.3, 0.4], [0.2, 0.5], [0.6, 0.3], [0.4, 0.4]];
        let inputs = Array2::from_shape_fn((17, 2), |(i, j)| i as f64 * 0.1 - j as f64 * 0.3);
        let serial = kernel_activations_with_threshold(
            centers.view(),
            widths.view(),
            inputs.view(),
            true,
            usize::MAX,
        )
        .unwrap();
        let parallel =
            kernel_activations_with_threshold(centers.view(), widths.view(), inputs.view(), true, 0)
                .unwrap();
        assert_eq!(serial, parallel);
    }

    #[test]
    fn rejects_inputs_with_wrong_dimension_count() {
        let basis = two_bases_1d(false);
        let err = basis.activations(array![[0.0, 1.0]].view()).unwrap_err();
        assert_eq!(
            err,
            KernelError::InputDimensionMismatch {
                expected: 1,
                found: 2
            }
        );
    }
}

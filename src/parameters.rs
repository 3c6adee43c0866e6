use crate::cache::{ActivationCache, CacheStats};
use crate::kernels::{BasisFunctions, KernelError};
use crate::lines::{LineError, LineModels};
use crate::types::LwrConfig;
use crate::vector::{ParameterGroup, ParameterVector, group_mask};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, s};
use std::collections::BTreeSet;
use thiserror::Error;

#[cfg(test)]
use approx::assert_abs_diff_eq;

pub const MODIFIER_LINES_PIVOT_AT_MAX_ACTIVATION: &str = "lines_pivot_at_max_activation";
pub const MODIFIER_SLOPES_AS_ANGLES: &str = "slopes_as_angles";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParametersError {
    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Parameter vector has {found} values but {expected} were expected.")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error(
        "Unknown parameter vector modifier '{0}'; expected 'lines_pivot_at_max_activation' or 'slopes_as_angles'."
    )]
    UnknownModifier(String),

    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error(transparent)]
    Line(#[from] LineError),
}

fn validate_shapes(
    centers: &Array2<f64>,
    widths: &Array2<f64>,
    slopes: &Array2<f64>,
    offsets: &Array2<f64>,
) -> Result<(), ParametersError> {
    let (n_basis, n_dims) = centers.dim();
    if n_basis == 0 || n_dims == 0 {
        return Err(ParametersError::InvalidDimensions(format!(
            "centers must have at least one row and one column, got {n_basis}x{n_dims}"
        )));
    }
    for (name, m) in [("widths", widths), ("slopes", slopes)] {
        if m.dim() != (n_basis, n_dims) {
            return Err(ParametersError::InvalidDimensions(format!(
                "{name} is {}x{} but centers is {n_basis}x{n_dims}",
                m.nrows(),
                m.ncols()
            )));
        }
    }
    if offsets.dim() != (n_basis, 1) {
        return Err(ParametersError::InvalidDimensions(format!(
            "offsets is {}x{} but must be {n_basis}x1",
            offsets.nrows(),
            offsets.ncols()
        )));
    }
    Ok(())
}

/// Parameters of a locally weighted regression model: Gaussian basis functions that weight
/// one local line each.
///
/// Evaluation that may touch the activation cache takes `&mut self`; everything else is
/// pure. Cloning copies all parameters and leaves the clone with an empty cache.
#[derive(Clone, Debug)]
pub struct ModelParametersLwr {
    basis: BasisFunctions,
    lines: LineModels,
    slopes_as_angles: bool,
    all_values_vector_size: usize,
    config: LwrConfig,
    cache: ActivationCache,
}

impl ModelParametersLwr {
    /// `centers`, `widths` and `slopes` are `n_basis x n_dims`; `offsets` is `n_basis x 1`.
    pub fn new(
        centers: Array2<f64>,
        widths: Array2<f64>,
        slopes: Array2<f64>,
        offsets: Array2<f64>,
        asymmetric_kernels: bool,
        lines_pivot_at_max_activation: bool,
    ) -> Result<Self, ParametersError> {
        Self::with_config(
            centers,
            widths,
            slopes,
            offsets,
            asymmetric_kernels,
            lines_pivot_at_max_activation,
            LwrConfig::default(),
        )
    }

    pub fn with_config(
        centers: Array2<f64>,
        widths: Array2<f64>,
        slopes: Array2<f64>,
        offsets: Array2<f64>,
        asymmetric_kernels: bool,
        lines_pivot_at_max_activation: bool,
        config: LwrConfig,
    ) -> Result<Self, ParametersError> {
        validate_shapes(&centers, &widths, &slopes, &offsets)?;
        let all_values_vector_size = centers.len() + widths.len() + offsets.len() + slopes.len();
        let basis = BasisFunctions::new(centers, widths, asymmetric_kernels)?
            .with_parallel_threshold(config.parallel_threshold);
        let lines = LineModels::new(slopes, offsets, lines_pivot_at_max_activation)?;
        Ok(Self {
            basis,
            lines,
            slopes_as_angles: false,
            all_values_vector_size,
            config,
            cache: ActivationCache::new(config.caching),
        })
    }

    pub fn n_basis_functions(&self) -> usize {
        self.basis.n_basis_functions()
    }

    pub fn n_dims(&self) -> usize {
        self.basis.n_dims()
    }

    pub fn centers(&self) -> &Array2<f64> {
        self.basis.centers()
    }

    pub fn widths(&self) -> &Array2<f64> {
        self.basis.widths()
    }

    pub fn slopes(&self) -> &Array2<f64> {
        self.lines.slopes()
    }

    pub fn offsets(&self) -> &Array2<f64> {
        self.lines.offsets()
    }

    pub fn asymmetric_kernels(&self) -> bool {
        self.basis.is_asymmetric()
    }

    pub fn lines_pivot_at_max_activation(&self) -> bool {
        self.lines.pivots_at_center()
    }

    pub fn slopes_as_angles(&self) -> bool {
        self.slopes_as_angles
    }

    pub fn caching(&self) -> bool {
        self.cache.is_enabled()
    }

    pub fn config(&self) -> LwrConfig {
        self.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn set_caching(&mut self, caching: bool) {
        self.config.caching = caching;
        self.cache.set_enabled(caching);
    }

    pub fn clear_cache(&mut self) {
        self.cache.invalidate();
    }

    /// Raw Gaussian activations, `n_samples x n_basis_functions`. Never cached.
    pub fn kernel_activations(
        &self,
        inputs: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>, ParametersError> {
        Ok(self.basis.activations(inputs)?)
    }

    /// Normalized activations, reusing the previous result when `inputs` is unchanged.
    pub fn normalized_kernel_activations(
        &mut self,
        inputs: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>, ParametersError> {
        let basis = &self.basis;
        let activations = self
            .cache
            .get_or_compute(inputs, |x| basis.normalized_activations(x))?;
        Ok(activations)
    }

    /// Value of each local line at each input, `n_samples x n_basis_functions`.
    pub fn lines(&self, inputs: ArrayView2<'_, f64>) -> Result<Array2<f64>, ParametersError> {
        Ok(self.lines.evaluate(inputs, self.basis.centers().view())?)
    }

    /// Locally weighted blend of the lines: one scalar prediction per input row.
    pub fn predict(&mut self, inputs: ArrayView2<'_, f64>) -> Result<Array1<f64>, ParametersError> {
        let lines = self.lines(inputs)?;
        let activations = self.normalized_kernel_activations(inputs)?;
        Ok((lines * activations).sum_axis(ndarray::Axis(1)))
    }

    /// Switches the offsets between "value at the origin" and "value at the center"
    /// encodings. Predictions are unchanged.
    pub fn set_lines_pivot_at_max_activation(
        &mut self,
        lines_pivot_at_max_activation: bool,
    ) -> Result<(), ParametersError> {
        self.lines
            .set_pivot_at_center(lines_pivot_at_max_activation, self.basis.centers().view())?;
        Ok(())
    }

    /// Angle-encoded slopes are not implemented: requesting them is reported and refused.
    pub fn set_slopes_as_angles(&mut self, slopes_as_angles: bool) -> Result<(), ParametersError> {
        if slopes_as_angles {
            log::warn!(
                "[LWR parameters] slopes_as_angles requested but not implemented; keeping it off"
            );
            self.slopes_as_angles = false;
            return Err(ParametersError::Unsupported(
                "slopes_as_angles is not implemented".to_string(),
            ));
        }
        self.slopes_as_angles = false;
        Ok(())
    }

    pub fn set_parameter_vector_modifier(
        &mut self,
        modifier: &str,
        new_value: bool,
    ) -> Result<(), ParametersError> {
        match modifier {
            MODIFIER_LINES_PIVOT_AT_MAX_ACTIVATION => {
                self.set_lines_pivot_at_max_activation(new_value)
            }
            MODIFIER_SLOPES_AS_ANGLES => self.set_slopes_as_angles(new_value),
            other => Err(ParametersError::UnknownModifier(other.to_string())),
        }
    }

    fn layout(&self) -> [(ParameterGroup, usize); 4] {
        [
            (ParameterGroup::Centers, self.centers().len()),
            (ParameterGroup::Widths, self.widths().len()),
            (ParameterGroup::Offsets, self.offsets().len()),
            (ParameterGroup::Slopes, self.slopes().len()),
        ]
    }
}

impl ParameterVector for ModelParametersLwr {
    fn parameter_vector_size(&self) -> usize {
        self.all_values_vector_size
    }

    /// Centers, widths, offsets, slopes; matrices are laid out one dimension (column) at a
    /// time.
    fn parameter_vector_all(&self) -> Array1<f64> {
        let mut values = Vec::with_capacity(self.all_values_vector_size);
        for column in self.centers().columns() {
            values.extend(column.iter().copied());
        }
        for column in self.widths().columns() {
            values.extend(column.iter().copied());
        }
        values.extend(self.offsets().column(0).iter().copied());
        for column in self.slopes().columns() {
            if self.slopes_as_angles {
                values.extend(column.iter().map(|&slope| slope.atan2(1.0)));
            } else {
                values.extend(column.iter().copied());
            }
        }
        debug_assert_eq!(values.len(), self.all_values_vector_size);
        Array1::from(values)
    }

    fn set_parameter_vector_all(
        &mut self,
        values: ArrayView1<'_, f64>,
    ) -> Result<(), ParametersError> {
        if values.len() != self.all_values_vector_size {
            return Err(ParametersError::DimensionMismatch {
                expected: self.all_values_vector_size,
                found: values.len(),
            });
        }

        let n_basis = self.n_basis_functions();
        let n_dims = self.n_dims();
        let block = n_basis * n_dims;
        let new_centers = values.slice(s![..block]);
        let new_widths = values.slice(s![block..2 * block]);
        let new_offsets = values.slice(s![2 * block..2 * block + n_basis]);
        let new_slopes = values.slice(s![2 * block + n_basis..]);

        // Activations depend only on centers and widths.
        let kernels_changed = self
            .centers()
            .t()
            .iter()
            .zip(new_centers.iter())
            .chain(self.widths().t().iter().zip(new_widths.iter()))
            .any(|(old, new)| old != new);
        if kernels_changed && self.cache.is_warm() {
            log::debug!("[LWR parameters] centers or widths changed; clearing activation cache");
            self.cache.invalidate();
        }

        write_columns(self.basis.centers_mut(), new_centers);
        write_columns(self.basis.widths_mut(), new_widths);
        self.lines
            .offsets_mut()
            .column_mut(0)
            .assign(&new_offsets);
        write_columns(self.lines.slopes_mut(), new_slopes);
        Ok(())
    }

    fn selectable_parameters(&self) -> BTreeSet<&'static str> {
        ParameterGroup::ALL.iter().map(|g| g.label()).collect()
    }

    fn parameter_vector_mask(&self, selected: &[&str]) -> Array1<i32> {
        group_mask(&self.layout(), selected)
    }
}

// Fills `target` one column at a time from a flat segment.
fn write_columns(target: &mut Array2<f64>, segment: ArrayView1<'_, f64>) {
    let n_rows = target.nrows();
    for (dim, mut column) in target.columns_mut().into_iter().enumerate() {
        column.assign(&segment.slice(s![dim * n_rows..(dim + 1) * n_rows]));
    }
}

/// Closed set of parameter kinds a function approximator can be built with.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum ModelParameters {
    Lwr(ModelParametersLwr),
}

impl ModelParameters {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Lwr(_) => "lwr",
        }
    }

    pub fn as_lwr(&self) -> Option<&ModelParametersLwr> {
        match self {
            Self::Lwr(p) => Some(p),
        }
    }

    pub fn as_lwr_mut(&mut self) -> Option<&mut ModelParametersLwr> {
        match self {
            Self::Lwr(p) => Some(p),
        }
    }
}

impl From<ModelParametersLwr> for ModelParameters {
    fn from(value: ModelParametersLwr) -> Self {
        Self::Lwr(value)
    }
}

impl ParameterVector for ModelParameters {
    fn parameter_vector_size(&self) -> usize {
        match self {
            Self::Lwr(p) => p.parameter_vector_size(),
        }
    }

    fn parameter_vector_all(&self) -> Array1<f64> {
        match self {
            Self::Lwr(p) => p.parameter_vector_all(),
        }
    }

    fn set_parameter_vector_all(
        &mut self,
        values: ArrayView1<'_, f64>,
    ) -> Result<(), ParametersError> {
        match self {
            Self::Lwr(p) => p.set_parameter_vector_all(values),
        }
    }

    fn selectable_parameters(&self) -> BTreeSet<&'static str> {
        match self {
            Self::Lwr(p) => p.selectable_parameters(),
        }
    }

    fn parameter_vector_mask(&self, selected: &[&str]) -> Array1<i32> {
        match self {
            Self::Lwr(p) => p.parameter_vector_mask(selected),
        }
    }
}

use serde::{Deserialize, Serialize};

pub fn default_caching() -> bool {
    true
}

pub fn default_parallel_threshold() -> usize {
    4096
}

/// Evaluation-side configuration for LWR model parameters.
/// Semantic flags (asymmetric kernels, pivoted lines) are model state, not config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LwrConfig {
    /// Reuse normalized activations when the same input matrix is queried twice in a row.
    #[serde(default = "default_caching")]
    pub caching: bool,
    /// Minimum `n_samples * n_basis_functions` before activation columns are filled in parallel.
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,
}

impl Default for LwrConfig {
    fn default() -> Self {
        Self {
            caching: default_caching(),
            parallel_threshold: default_parallel_threshold(),
        }
    }
}

impl LwrConfig {
    pub fn uncached() -> Self {
        Self {
            caching: false,
            ..Self::default()
        }
    }
}

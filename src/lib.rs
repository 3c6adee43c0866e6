#![deny(dead_code)]
#![deny(unused_imports)]

//! Parameters and evaluation of a locally weighted regression (LWR) function approximator.
//!
//! A prediction is a blend of local lines `y = slope . x + offset`, weighted by normalized
//! Gaussian kernels. The parameters can be flattened into a single vector (with a
//! per-group selection mask) for black-box optimization, and restored from one.

pub mod cache;
pub mod grid;
pub mod kernels;
pub mod lines;
pub mod parameters;
pub mod persist;
pub mod types;
pub mod vector;

pub use cache::{ActivationCache, CacheStats};
pub use grid::{
    CsvDirectorySink, GRID_TABLE_NAMES, GridData, GridError, GridSpec, MemorySink, TableSink,
    sample_grid,
};
pub use kernels::{
    BasisFunctions, KernelError, kernel_activations, normalize_activations,
    normalized_kernel_activations,
};
pub use lines::{LineError, LineModels};
pub use parameters::{ModelParameters, ModelParametersLwr, ParametersError};
pub use persist::{PARAMETERS_VERSION, PersistError, SavedParameters};
pub use types::LwrConfig;
pub use vector::{ParameterGroup, ParameterVector};

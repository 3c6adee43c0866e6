use crate::parameters::{ModelParametersLwr, ParametersError};
use crate::types::LwrConfig;
use crate::vector::ParameterVector;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const PARAMETERS_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Saved parameters have format version {found}; this build reads version {supported}.")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Saved matrix '{name}' has rows of different lengths.")]
    RaggedMatrix { name: &'static str },

    #[error(
        "Saved all_values_vector_size is {stored} but the stored matrices hold {computed} values."
    )]
    SizeMismatch { stored: usize, computed: usize },

    #[error(transparent)]
    Parameters(#[from] ParametersError),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Versioned on-disk form of [`ModelParametersLwr`]. Field order is part of the format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedParameters {
    pub version: u32,
    pub centers: Vec<Vec<f64>>,
    pub widths: Vec<Vec<f64>>,
    pub slopes: Vec<Vec<f64>>,
    pub offsets: Vec<f64>,
    pub asymmetric_kernels: bool,
    pub lines_pivot_at_max_activation: bool,
    pub slopes_as_angles: bool,
    pub all_values_vector_size: usize,
    pub caching: bool,
}

fn array_to_rows(matrix: &Array2<f64>) -> Vec<Vec<f64>> {
    matrix.rows().into_iter().map(|row| row.to_vec()).collect()
}

fn rows_to_array(name: &'static str, rows: Vec<Vec<f64>>) -> Result<Array2<f64>, PersistError> {
    let n_rows = rows.len();
    let n_cols = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|row| row.len() != n_cols) {
        return Err(PersistError::RaggedMatrix { name });
    }
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((n_rows, n_cols), flat).map_err(|_| PersistError::RaggedMatrix { name })
}

impl From<&ModelParametersLwr> for SavedParameters {
    fn from(params: &ModelParametersLwr) -> Self {
        Self {
            version: PARAMETERS_VERSION,
            centers: array_to_rows(params.centers()),
            widths: array_to_rows(params.widths()),
            slopes: array_to_rows(params.slopes()),
            offsets: params.offsets().column(0).to_vec(),
            asymmetric_kernels: params.asymmetric_kernels(),
            lines_pivot_at_max_activation: params.lines_pivot_at_max_activation(),
            slopes_as_angles: params.slopes_as_angles(),
            all_values_vector_size: params.parameter_vector_size(),
            caching: params.caching(),
        }
    }
}

impl SavedParameters {
    pub fn into_parameters(self) -> Result<ModelParametersLwr, PersistError> {
        if self.version != PARAMETERS_VERSION {
            return Err(PersistError::UnsupportedVersion {
                found: self.version,
                supported: PARAMETERS_VERSION,
            });
        }
        let n_offsets = self.offsets.len();
        let offsets = Array2::from_shape_vec((n_offsets, 1), self.offsets)
            .map_err(|_| PersistError::RaggedMatrix { name: "offsets" })?;
        let config = LwrConfig {
            caching: self.caching,
            ..LwrConfig::default()
        };
        let mut params = ModelParametersLwr::with_config(
            rows_to_array("centers", self.centers)?,
            rows_to_array("widths", self.widths)?,
            rows_to_array("slopes", self.slopes)?,
            offsets,
            self.asymmetric_kernels,
            self.lines_pivot_at_max_activation,
            config,
        )?;
        if params.parameter_vector_size() != self.all_values_vector_size {
            return Err(PersistError::SizeMismatch {
                stored: self.all_values_vector_size,
                computed: params.parameter_vector_size(),
            });
        }
        if self.slopes_as_angles {
            params.set_slopes_as_angles(true)?;
        }
        Ok(params)
    }
}

impl ModelParametersLwr {
    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(&SavedParameters::from(self))?)
    }

    pub fn from_json(payload: &str) -> Result<Self, PersistError> {
        let saved: SavedParameters = serde_json::from_str(payload)?;
        saved.into_parameters()
    }

    pub fn save_json(&self, path: &Path) -> Result<(), PersistError> {
        let payload = self.to_json()?;
        fs::write(path, payload).map_err(|source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load_json(path: &Path) -> Result<Self, PersistError> {
        let payload = fs::read_to_string(path).map_err(|source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&payload)
    }
}

impl fmt::Display for ModelParametersLwr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload =
            serde_json::to_string_pretty(&SavedParameters::from(self)).map_err(|_| fmt::Error)?;
        f.write_str(&payload)
    }
}

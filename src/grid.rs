use crate::parameters::{ModelParametersLwr, ParametersError};
use csv::WriterBuilder;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[cfg(test)]
use approx::assert_abs_diff_eq;

#[derive(Error, Debug)]
pub enum GridError {
    #[error("Grid sampling supports 1 or 2 dimensions, but {0} were requested.")]
    UnsupportedDimensions(usize),

    #[error(
        "Grid bounds and sample counts must have equal lengths: min has {min}, max has {max}, counts has {counts}."
    )]
    SpecLengthMismatch {
        min: usize,
        max: usize,
        counts: usize,
    },

    #[error("Dimension {dim} of the grid has zero samples.")]
    EmptyAxis { dim: usize },

    #[error("Grid has {grid} dimensions but the model expects {model}.")]
    ModelDimensionMismatch { grid: usize, model: usize },

    #[error("Refusing to overwrite existing file '{0}'.")]
    FileExists(PathBuf),

    #[error(transparent)]
    Parameters(#[from] ParametersError),

    #[error("Failed to write table: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-dimension bounds and sample counts of a regular grid.
#[derive(Clone, Debug, PartialEq)]
pub struct GridSpec {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
    pub n_samples_per_dim: Vec<usize>,
}

impl GridSpec {
    pub fn new(
        min: Vec<f64>,
        max: Vec<f64>,
        n_samples_per_dim: Vec<usize>,
    ) -> Result<Self, GridError> {
        if min.len() != max.len() || min.len() != n_samples_per_dim.len() {
            return Err(GridError::SpecLengthMismatch {
                min: min.len(),
                max: max.len(),
                counts: n_samples_per_dim.len(),
            });
        }
        if !(1..=2).contains(&min.len()) {
            return Err(GridError::UnsupportedDimensions(min.len()));
        }
        if let Some(dim) = n_samples_per_dim.iter().position(|&n| n == 0) {
            return Err(GridError::EmptyAxis { dim });
        }
        Ok(Self {
            min,
            max,
            n_samples_per_dim,
        })
    }

    pub fn n_dims(&self) -> usize {
        self.min.len()
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples_per_dim.iter().product()
    }
}

/// `n` evenly spaced values from `low` to `high`; a single sample sits at `high`.
pub fn linspace(n: usize, low: f64, high: f64) -> Array1<f64> {
    match n {
        0 => Array1::zeros(0),
        1 => Array1::from_elem(1, high),
        _ => Array1::linspace(low, high, n),
    }
}

/// Cartesian grid, one sample per row. In two dimensions row `i * n2 + j` holds
/// `(x1[i], x2[j])`.
pub fn sample_grid(spec: &GridSpec) -> Result<Array2<f64>, GridError> {
    match spec.n_dims() {
        1 => {
            let x = linspace(spec.n_samples_per_dim[0], spec.min[0], spec.max[0]);
            Ok(x.insert_axis(Axis(1)))
        }
        2 => {
            let x1 = linspace(spec.n_samples_per_dim[0], spec.min[0], spec.max[0]);
            let x2 = linspace(spec.n_samples_per_dim[1], spec.min[1], spec.max[1]);
            let mut inputs = Array2::<f64>::zeros((x1.len() * x2.len(), 2));
            for (i, &a) in x1.iter().enumerate() {
                for (j, &b) in x2.iter().enumerate() {
                    let row = i * x2.len() + j;
                    inputs[[row, 0]] = a;
                    inputs[[row, 1]] = b;
                }
            }
            Ok(inputs)
        }
        n => Err(GridError::UnsupportedDimensions(n)),
    }
}

/// Names of the tables `GridData::write_to` emits, in write order.
pub const GRID_TABLE_NAMES: [&str; 6] = [
    "n_samples_per_dim",
    "inputs_grid",
    "lines",
    "weighted_lines",
    "activations",
    "activations_normalized",
];

/// Destination for named numeric tables, one row per sample.
pub trait TableSink {
    /// Called once with every table name before any table is written.
    fn prepare(&mut self, _names: &[&str]) -> Result<(), GridError> {
        Ok(())
    }
    fn write_counts(&mut self, name: &str, counts: &[usize]) -> Result<(), GridError>;
    fn write_matrix(&mut self, name: &str, table: ArrayView2<'_, f64>) -> Result<(), GridError>;
}

/// Everything the model computes over a sample grid.
#[derive(Clone, Debug, PartialEq)]
pub struct GridData {
    pub n_samples_per_dim: Vec<usize>,
    pub inputs_grid: Array2<f64>,
    pub lines: Array2<f64>,
    /// Locally weighted prediction, `n_samples x 1`.
    pub weighted_lines: Array2<f64>,
    pub activations: Array2<f64>,
    pub activations_normalized: Array2<f64>,
}

impl GridData {
    pub fn write_to<S: TableSink + ?Sized>(&self, sink: &mut S) -> Result<(), GridError> {
        sink.prepare(&GRID_TABLE_NAMES)?;
        sink.write_counts("n_samples_per_dim", &self.n_samples_per_dim)?;
        sink.write_matrix("inputs_grid", self.inputs_grid.view())?;
        sink.write_matrix("lines", self.lines.view())?;
        sink.write_matrix("weighted_lines", self.weighted_lines.view())?;
        sink.write_matrix("activations", self.activations.view())?;
        sink.write_matrix("activations_normalized", self.activations_normalized.view())?;
        Ok(())
    }
}

impl ModelParametersLwr {
    pub fn grid_data(&mut self, spec: &GridSpec) -> Result<GridData, GridError> {
        if spec.n_dims() != self.n_dims() {
            return Err(GridError::ModelDimensionMismatch {
                grid: spec.n_dims(),
                model: self.n_dims(),
            });
        }
        let inputs = sample_grid(spec)?;
        let lines = self.lines(inputs.view())?;
        let weighted_lines = self.predict(inputs.view())?.insert_axis(Axis(1));
        let activations = self.kernel_activations(inputs.view())?;
        let activations_normalized = self.normalized_kernel_activations(inputs.view())?;
        Ok(GridData {
            n_samples_per_dim: spec.n_samples_per_dim.clone(),
            inputs_grid: inputs,
            lines,
            weighted_lines,
            activations,
            activations_normalized,
        })
    }

    /// Writes the grid diagnostics as text tables into `directory`. Without a directory
    /// there is nothing to do and the call succeeds.
    pub fn save_grid_data(
        &mut self,
        spec: &GridSpec,
        directory: Option<&Path>,
        overwrite: bool,
    ) -> Result<(), GridError> {
        let Some(directory) = directory else {
            return Ok(());
        };
        let data = self.grid_data(spec)?;
        let mut sink = CsvDirectorySink::new(directory, overwrite)?;
        data.write_to(&mut sink)?;
        log::debug!(
            "[LWR grid] wrote {} grid samples to {}",
            data.inputs_grid.nrows(),
            directory.display()
        );
        Ok(())
    }
}

/// Writes each table to `<directory>/<name>.txt`, space separated, without a header.
#[derive(Clone, Debug)]
pub struct CsvDirectorySink {
    directory: PathBuf,
    overwrite: bool,
}

impl CsvDirectorySink {
    pub fn new(directory: &Path, overwrite: bool) -> Result<Self, GridError> {
        fs::create_dir_all(directory).map_err(|source| GridError::Io {
            path: directory.to_path_buf(),
            source,
        })?;
        Ok(Self {
            directory: directory.to_path_buf(),
            overwrite,
        })
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{name}.txt"))
    }

    fn writer(&self, name: &str) -> Result<csv::Writer<fs::File>, GridError> {
        let path = self.path_for(name);
        if path.exists() && !self.overwrite {
            return Err(GridError::FileExists(path));
        }
        Ok(WriterBuilder::new()
            .delimiter(b' ')
            .has_headers(false)
            .from_path(&path)?)
    }
}

impl TableSink for CsvDirectorySink {
    // Refuse up front so a clash leaves the directory untouched.
    fn prepare(&mut self, names: &[&str]) -> Result<(), GridError> {
        if self.overwrite {
            return Ok(());
        }
        match names.iter().map(|name| self.path_for(name)).find(|p| p.exists()) {
            Some(path) => Err(GridError::FileExists(path)),
            None => Ok(()),
        }
    }

    fn write_counts(&mut self, name: &str, counts: &[usize]) -> Result<(), GridError> {
        let mut wtr = self.writer(name)?;
        for n in counts {
            wtr.write_record([n.to_string()])?;
        }
        wtr.flush().map_err(|source| GridError::Io {
            path: self.path_for(name),
            source,
        })
    }

    fn write_matrix(&mut self, name: &str, table: ArrayView2<'_, f64>) -> Result<(), GridError> {
        let mut wtr = self.writer(name)?;
        for row in table.rows() {
            wtr.write_record(row.iter().map(|v| v.to_string()))?;
        }
        wtr.flush().map_err(|source| GridError::Io {
            path: self.path_for(name),
            source,
        })
    }
}

/// Keeps tables in memory, keyed by name. Counts are stored as a single column.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    pub tables: BTreeMap<String, Array2<f64>>,
}

impl TableSink for MemorySink {
    fn write_counts(&mut self, name: &str, counts: &[usize]) -> Result<(), GridError> {
        let column = Array1::from_iter(counts.iter().map(|&n| n as f64)).insert_axis(Axis(1));
        self.tables.insert(name.to_string(), column);
        Ok(())
    }

    fn write_matrix(&mut self, name: &str, table: ArrayView2<'_, f64>) -> Result<(), GridError> {
        self.tables.insert(name.to_string(), table.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn one_dimensional_grid_is_a_column() {
        let spec = GridSpec::new(vec![-1.0], vec![1.0], vec![5]).unwrap();
        let grid = sample_grid(&spec).unwrap();
        assert_eq!(grid.dim(), (5, 1));
        assert_abs_diff_eq!(grid[[0, 0]], -1.0, epsilon = 1e-15);
        assert_abs_diff_eq!(grid[[2, 0]], 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(grid[[4, 0]], 1.0, epsilon = 1e-15);
    }

    #[test]
    fn two_dimensional_grid_varies_second_axis_fastest() {
        let spec = GridSpec::new(vec![0.0, 10.0], vec![1.0, 30.0], vec![2, 3]).unwrap();
        let grid = sample_grid(&spec).unwrap();
        assert_eq!(
            grid,
            array![
                [0.0, 10.0],
                [0.0, 20.0],
                [0.0, 30.0],
                [1.0, 10.0],
                [1.0, 20.0],
                [1.0, 30.0]
            ]
        );
    }

    #[test]
    fn single_sample_axis_sits_at_the_upper_bound() {
        assert_eq!(linspace(1, 2.0, 5.0).to_vec(), vec![5.0]);
    }

    #[test]
    fn rejects_unsupported_specs() {
        assert!(matches!(
            GridSpec::new(vec![0.0; 3], vec![1.0; 3], vec![2; 3]),
            Err(GridError::UnsupportedDimensions(3))
        ));
        assert!(matches!(
            GridSpec::new(vec![0.0], vec![1.0, 2.0], vec![2]),
            Err(GridError::SpecLengthMismatch { .. })
        ));
        assert!(matches!(
            GridSpec::new(vec![0.0, 0.0], vec![1.0, 1.0], vec![4, 0]),
            Err(GridError::EmptyAxis { dim: 1 })
        ));
    }

    #[test]
    fn grid_data_emits_six_consistent_tables() {
        let mut model = ModelParametersLwr::new(
            array![[0.0], [1.0]],
            array![[0.5], [0.5]],
            array![[1.0], [1.0]],
            array![[0.0], [0.0]],
            false,
            false,
        )
        .unwrap();
        let spec = GridSpec::new(vec![0.0], vec![1.0], vec![3]).unwrap();
        let data = model.grid_data(&spec).unwrap();

        let mut sink = MemorySink::default();
        data.write_to(&mut sink).unwrap();
        let names: Vec<&str> = sink.tables.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec![
                "activations",
                "activations_normalized",
                "inputs_grid",
                "lines",
                "n_samples_per_dim",
                "weighted_lines"
            ]
        );
        assert_eq!(sink.tables["n_samples_per_dim"], array![[3.0]]);
        assert_eq!(sink.tables["lines"].dim(), (3, 2));
        assert_eq!(sink.tables["weighted_lines"].dim(), (3, 1));
        // Both lines are y = x, so the blend is y = x too.
        assert_abs_diff_eq!(sink.tables["weighted_lines"][[1, 0]], 0.5, epsilon = 1e-15);
    }

    #[test]
    fn grid_must_match_model_dimensions() {
        let mut model = ModelParametersLwr::new(
            array![[0.0, 0.0]],
            array![[1.0, 1.0]],
            array![[1.0, 1.0]],
            array![[0.0]],
            false,
            false,
        )
        .unwrap();
        let spec = GridSpec::new(vec![0.0], vec![1.0], vec![3]).unwrap();
        assert!(matches!(
            model.grid_data(&spec),
            Err(GridError::ModelDimensionMismatch { grid: 1, model: 2 })
        ));
    }
}

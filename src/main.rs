use clap::{Args, Parser, Subcommand, ValueEnum};
use comfy_table::{Cell, ContentArrangement, Row, Table, presets::UTF8_FULL};
use csv::{ReaderBuilder, WriterBuilder};
use lwr::{GridSpec, ModelParametersLwr, ParameterGroup, ParameterVector};
use ndarray::{Array1, Array2};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "lwr")]
#[command(about = "Inspect and evaluate locally weighted regression model parameters", long_about = None)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print shapes, flags and per-basis parameters of a saved model.
    Describe(DescribeArgs),
    /// Evaluate a saved model on the rows of a CSV file.
    Predict(PredictArgs),
    /// Write kernel/line diagnostics sampled on a regular 1-D or 2-D grid.
    Grid(GridArgs),
    /// Print the parameter-vector selection mask for a set of groups.
    Mask(MaskArgs),
    /// Re-encode offsets relative to the centers (or the origin) and save the model.
    Pivot(PivotArgs),
}

#[derive(Args, Debug)]
struct DescribeArgs {
    model: PathBuf,
}

#[derive(Args, Debug)]
struct PredictArgs {
    model: PathBuf,
    /// CSV with a header row and one column per input dimension.
    inputs: PathBuf,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct GridArgs {
    model: PathBuf,
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    min: Vec<f64>,
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    max: Vec<f64>,
    #[arg(long, value_delimiter = ',')]
    samples: Vec<usize>,
    #[arg(long)]
    out_dir: PathBuf,
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

#[derive(Args, Debug)]
struct MaskArgs {
    model: PathBuf,
    #[arg(long, value_delimiter = ',')]
    groups: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum PivotState {
    Center,
    Origin,
}

#[derive(Args, Debug)]
struct PivotArgs {
    model: PathBuf,
    #[arg(long, value_enum)]
    to: PivotState,
    #[arg(long)]
    out: PathBuf,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let cli = Cli::parse();
    match cli.command {
        Command::Describe(args) => run_describe(args),
        Command::Predict(args) => run_predict(args),
        Command::Grid(args) => run_grid(args),
        Command::Mask(args) => run_mask(args),
        Command::Pivot(args) => run_pivot(args),
    }
}

fn load_model(path: &Path) -> Result<ModelParametersLwr, String> {
    ModelParametersLwr::load_json(path)
        .map_err(|e| format!("failed to load model '{}': {e}", path.display()))
}

fn run_describe(args: DescribeArgs) -> Result<(), String> {
    let model = load_model(&args.model)?;
    println!(
        "basis functions: {}  dims: {}  parameter vector: {}",
        model.n_basis_functions(),
        model.n_dims(),
        model.parameter_vector_size()
    );
    println!(
        "asymmetric kernels: {}  pivot at center: {}  caching: {}",
        model.asymmetric_kernels(),
        model.lines_pivot_at_max_activation(),
        model.caching()
    );

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["basis", "center", "width", "slope", "offset"]);
    let fmt_row = |m: &Array2<f64>, b: usize| {
        m.row(b)
            .iter()
            .map(|v| format!("{v:.4}"))
            .collect::<Vec<_>>()
            .join(", ")
    };
    for b in 0..model.n_basis_functions() {
        table.add_row(Row::from(vec![
            Cell::new(b),
            Cell::new(fmt_row(model.centers(), b)),
            Cell::new(fmt_row(model.widths(), b)),
            Cell::new(fmt_row(model.slopes(), b)),
            Cell::new(format!("{:.4}", model.offsets()[[b, 0]])),
        ]));
    }
    println!("{table}");
    Ok(())
}

fn load_inputs(path: &Path) -> Result<Array2<f64>, String> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| format!("failed to open inputs '{}': {e}", path.display()))?;
    let mut values = Vec::new();
    let mut n_cols = None;
    for (i, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| format!("failed to read csv row {i}: {e}"))?;
        match n_cols {
            None => n_cols = Some(record.len()),
            Some(n) if n != record.len() => {
                return Err(format!(
                    "csv row {i} has {} columns, expected {n}",
                    record.len()
                ));
            }
            Some(_) => {}
        }
        for field in record.iter() {
            let v = field
                .trim()
                .parse::<f64>()
                .map_err(|e| format!("csv row {i}: invalid number '{field}': {e}"))?;
            values.push(v);
        }
    }
    let n_cols = n_cols.unwrap_or(0);
    let n_rows = if n_cols == 0 { 0 } else { values.len() / n_cols };
    Array2::from_shape_vec((n_rows, n_cols), values)
        .map_err(|e| format!("failed to assemble inputs matrix: {e}"))
}

fn write_prediction_csv(path: &Path, prediction: &Array1<f64>) -> Result<(), String> {
    let mut wtr = WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| format!("failed to create output csv '{}': {e}", path.display()))?;
    wtr.write_record(["prediction"])
        .map_err(|e| format!("failed writing csv header: {e}"))?;
    for (i, v) in prediction.iter().enumerate() {
        wtr.write_record([format!("{v:.12}")])
            .map_err(|e| format!("failed writing csv row {i}: {e}"))?;
    }
    wtr.flush()
        .map_err(|e| format!("failed to flush csv writer: {e}"))?;
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<(), String> {
    let mut model = load_model(&args.model)?;
    let inputs = load_inputs(&args.inputs)?;
    let prediction = model
        .predict(inputs.view())
        .map_err(|e| format!("prediction failed: {e}"))?;
    write_prediction_csv(&args.out, &prediction)?;
    println!(
        "wrote {} predictions to {}",
        prediction.len(),
        args.out.display()
    );
    Ok(())
}

fn run_grid(args: GridArgs) -> Result<(), String> {
    let mut model = load_model(&args.model)?;
    let spec = GridSpec::new(args.min, args.max, args.samples).map_err(|e| e.to_string())?;
    model
        .save_grid_data(&spec, Some(args.out_dir.as_path()), args.overwrite)
        .map_err(|e| format!("failed to save grid data: {e}"))?;
    println!(
        "wrote {} grid samples to {}",
        spec.n_samples(),
        args.out_dir.display()
    );
    Ok(())
}

fn run_mask(args: MaskArgs) -> Result<(), String> {
    let model = load_model(&args.model)?;
    let selectable = model.selectable_parameters();
    let groups: Vec<&str> = args.groups.iter().map(|g| g.trim()).collect();
    if let Some(unknown) = groups
        .iter()
        .find(|g| ParameterGroup::from_label(g).is_none())
    {
        return Err(format!(
            "unknown group '{unknown}'; selectable groups are {}",
            selectable.iter().copied().collect::<Vec<_>>().join(", ")
        ));
    }
    let mask = model.parameter_vector_mask(&groups);
    let text = mask
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    println!("{text}");
    Ok(())
}

fn run_pivot(args: PivotArgs) -> Result<(), String> {
    let mut model = load_model(&args.model)?;
    model
        .set_lines_pivot_at_max_activation(args.to == PivotState::Center)
        .map_err(|e| format!("failed to re-encode offsets: {e}"))?;
    model
        .save_json(&args.out)
        .map_err(|e| format!("failed to save model '{}': {e}", args.out.display()))?;
    println!("saved model: {}", args.out.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{MaskArgs, load_inputs, run_mask, write_prediction_csv};
    use lwr::ModelParametersLwr;
    use ndarray::array;
    use std::fs;
    use std::path::PathBuf;

    fn scratch_file(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("lwr_cli_{}_{name}", std::process::id()));
        path
    }

    #[test]
    fn load_inputs_skips_the_header_row() {
        let path = scratch_file("inputs.csv");
        fs::write(&path, "x1,x2\n0.5,1.0\n-2, 3.25\n").unwrap();
        let inputs = load_inputs(&path).unwrap();
        assert_eq!(inputs, array![[0.5, 1.0], [-2.0, 3.25]]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn load_inputs_rejects_ragged_rows() {
        let path = scratch_file("ragged.csv");
        fs::write(&path, "x1,x2\n0.5,1.0\n2.0,3.0,4.0\n").unwrap();
        assert!(load_inputs(&path).is_err());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn load_inputs_rejects_unparseable_numbers() {
        let path = scratch_file("garbage.csv");
        fs::write(&path, "x\n1.0\nabc\n").unwrap();
        let err = load_inputs(&path).unwrap_err();
        assert!(err.contains("invalid number 'abc'"), "{err}");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn prediction_csv_has_header_and_fixed_precision() {
        let path = scratch_file("prediction.csv");
        write_prediction_csv(&path, &array![0.5, -1.25]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "prediction\n0.500000000000\n-1.250000000000\n");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn mask_rejects_unknown_groups() {
        let path = scratch_file("model.json");
        ModelParametersLwr::new(
            array![[0.0], [1.0]],
            array![[0.5], [0.5]],
            array![[1.0], [1.0]],
            array![[0.0], [0.0]],
            false,
            false,
        )
        .unwrap()
        .save_json(&path)
        .unwrap();

        let err = run_mask(MaskArgs {
            model: path.clone(),
            groups: vec!["centers".to_string(), "bogus".to_string()],
        })
        .unwrap_err();
        assert!(err.contains("unknown group 'bogus'"), "{err}");

        run_mask(MaskArgs {
            model: path.clone(),
            groups: vec!["widths".to_string()],
        })
        .unwrap();
        let _ = fs::remove_file(&path);
    }
}

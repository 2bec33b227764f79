use std::fs::File;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use arrow::array::{Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DEFAULT_ROWS: usize = 100_000;
const BATCH_ROWS: usize = 100_000;
const HEADERS: [&str; 3] = ["wavelength (Angstrom)", "irradiance_w_m2_nm", "descriptor"];
const DESCRIPTORS: [&str; 4] = ["continuum", "absorption", "emission", "calibration"];

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Box-Muller transform for normal noise.
fn gauss(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-15);
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

/// Smooth continuum with a few Balmer-like absorption lines, in W m⁻² nm⁻¹.
fn irradiance(angstrom: f64, rng: &mut StdRng) -> f64 {
    let continuum = 1.5 * (-((angstrom - 5500.0) / 4000.0).powi(2)).exp() + 0.2;
    let lines: f64 = [(4861.3, 6.0, 0.3), (6562.8, 8.0, 0.5), (4340.5, 5.0, 0.2)]
        .iter()
        .map(|&(mu, sigma, depth)| gaussian(angstrom, mu, sigma, depth))
        .sum();
    (continuum - lines + gauss(rng, 0.0, 0.01)).max(1e-6)
}

struct Columns {
    wavelength: Vec<f64>,
    irradiance: Vec<f64>,
    descriptor: Vec<&'static str>,
}

fn batch(start: usize, len: usize, total: usize, rng: &mut StdRng) -> Columns {
    let step = 7000.0 / total.max(1) as f64;
    let wavelength: Vec<f64> = (start..start + len).map(|i| 3000.0 + i as f64 * step).collect();
    let irradiance = wavelength.iter().map(|&w| irradiance(w, rng)).collect();
    let descriptor = (start..start + len)
        .map(|i| DESCRIPTORS[i % DESCRIPTORS.len()])
        .collect();
    Columns {
        wavelength,
        irradiance,
        descriptor,
    }
}

#[derive(Parser)]
#[command(name = "generate_sample")]
#[command(about = "Write a synthetic spectrum as CSV and Parquet", long_about = None)]
struct Cli {
    /// Number of rows to generate
    #[arg(default_value_t = DEFAULT_ROWS)]
    rows: usize,
}

fn main() -> Result<()> {
    env_logger::init();

    let rows = Cli::parse().rows;
    let mut rng = StdRng::seed_from_u64(42);

    let csv_path = "sample_spectrum.csv";
    let parquet_path = "sample_spectrum.parquet";

    let mut csv_writer = csv::Writer::from_path(csv_path).context("creating CSV output")?;
    csv_writer.write_record(HEADERS)?;

    let schema = Arc::new(Schema::new(vec![
        Field::new(HEADERS[0], DataType::Float64, false),
        Field::new(HEADERS[1], DataType::Float64, false),
        Field::new(HEADERS[2], DataType::Utf8, false),
    ]));
    let file = File::create(parquet_path).context("creating Parquet output")?;
    let mut parquet_writer =
        ArrowWriter::try_new(file, schema.clone(), None).context("creating Parquet writer")?;

    let mut start = 0;
    while start < rows {
        let len = BATCH_ROWS.min(rows - start);
        let columns = batch(start, len, rows, &mut rng);

        for i in 0..len {
            csv_writer.write_record([
                format!("{:.4}", columns.wavelength[i]),
                format!("{:.6e}", columns.irradiance[i]),
                columns.descriptor[i].to_string(),
            ])?;
        }

        let record_batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Float64Array::from(columns.wavelength)),
                Arc::new(Float64Array::from(columns.irradiance)),
                Arc::new(StringArray::from(columns.descriptor)),
            ],
        )
        .context("building record batch")?;
        parquet_writer.write(&record_batch)?;
        start += len;
    }

    csv_writer.flush()?;
    parquet_writer.close()?;

    println!("Wrote {rows} rows to {csv_path} and {parquet_path}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_count_defaults_and_parses() {
        assert_eq!(Cli::try_parse_from(["generate_sample"]).unwrap().rows, DEFAULT_ROWS);
        assert_eq!(Cli::try_parse_from(["generate_sample", "250"]).unwrap().rows, 250);
        assert!(Cli::try_parse_from(["generate_sample", "many"]).is_err());
    }
}

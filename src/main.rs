use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use spectral_ingest::data::model::keys;
use spectral_ingest::Session;

#[derive(Parser)]
#[command(name = "spectral-ingest")]
#[command(about = "Ingest spectra and normalise them to nm / Jy", long_about = None)]
struct Cli {
    /// Spectrum files (.csv, .txt, .tsv, .dat, .parquet)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Write the loaded session as JSON to this path
    #[arg(long)]
    export: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut session = Session::default();
    for path in &cli.files {
        let record = session.load_file(path, None)?;
        let extra = &record.metadata.extra;
        let field = |key: &str| extra.get(key).map(String::as_str).unwrap_or("-");
        println!(
            "{}: {} points from {} rows, wavelength '{}' [{}], flux '{}' [{} → {}, {}]",
            record.identifier,
            record.spectrum.len(),
            field(keys::ROW_COUNT),
            field(keys::WAVE_COLUMN),
            field(keys::SOURCE_WAVELENGTH_UNIT),
            field(keys::FLUX_COLUMN),
            field(keys::SOURCE_FLUX_UNIT),
            field(keys::FLUX_UNIT),
            field(keys::FLUX_CONVERSION),
        );
    }

    if let Some(path) = cli.export {
        let written = session.export(Some(path))?;
        println!("Session written to {}", written.display());
    }
    Ok(())
}

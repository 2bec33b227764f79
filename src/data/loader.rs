use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufRead;
use std::path::Path;

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{DataType, Float32Type, Float64Type, Int32Type, Int64Type};
use log::{debug, info, warn};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::config::IngestOptions;
use crate::error::IngestError;
use crate::units::{
    canonical_flux_unit, canonical_wavelength_unit, infer_unit, is_spectral, ConversionMethod,
    Quantity, Unit,
};

use super::accumulator::{ChunkAccumulator, FinalizedTable};
use super::model::{keys, DownsampleTier, Spectrum, SpectrumMetadata, SpectrumRecord};
use super::normalize::canonicalize;
use super::reader::{parse_cell, read_table, StreamingTableReader, IN_MEMORY_SOURCE};

pub const ASCII_EXTENSIONS: [&str; 4] = ["csv", "txt", "tsv", "dat"];
pub const PARQUET_EXTENSIONS: [&str; 2] = ["parquet", "pq"];
pub const FITS_EXTENSIONS: [&str; 3] = ["fits", "fit", "fts"];

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Anything that can turn a file into a [`SpectrumRecord`].
pub trait SpectrumLoader {
    fn load(&self, path: &Path, identifier: Option<&str>) -> Result<SpectrumRecord, IngestError>;
}

/// Extension → loader table.
///
/// Text tables and Parquet are registered by default.  FITS extensions are
/// recognised but need an externally registered loader.
pub struct LoaderRegistry {
    loaders: Vec<Box<dyn SpectrumLoader>>,
    by_extension: BTreeMap<String, usize>,
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::with_options(IngestOptions::default())
    }
}

impl LoaderRegistry {
    /// A registry without any loader.
    pub fn empty() -> Self {
        Self {
            loaders: Vec::new(),
            by_extension: BTreeMap::new(),
        }
    }

    /// The built-in loaders, all sharing `options`.
    pub fn with_options(options: IngestOptions) -> Self {
        let mut registry = Self::empty();
        registry.register(
            &ASCII_EXTENSIONS,
            Box::new(AsciiLoader::new(options.clone())),
        );
        registry.register(&PARQUET_EXTENSIONS, Box::new(ParquetLoader::new(options)));
        registry
    }

    /// Route `extensions` (case-insensitive, without the dot) to `loader`,
    /// replacing any previous registration.
    pub fn register(&mut self, extensions: &[&str], loader: Box<dyn SpectrumLoader>) {
        let index = self.loaders.len();
        self.loaders.push(loader);
        for ext in extensions {
            self.by_extension
                .insert(ext.trim_start_matches('.').to_ascii_lowercase(), index);
        }
    }

    pub fn supports(&self, path: &Path) -> bool {
        self.by_extension.contains_key(&extension_of(path))
    }

    /// Dispatch by extension.
    pub fn load(&self, path: &Path, identifier: Option<&str>) -> Result<SpectrumRecord, IngestError> {
        let ext = extension_of(path);
        match self.by_extension.get(&ext) {
            Some(&index) => self.loaders[index].load(path, identifier),
            None => {
                if FITS_EXTENSIONS.contains(&ext.as_str()) {
                    warn!("No FITS loader registered for {}", path.display());
                }
                Err(IngestError::UnsupportedFormat { extension: ext })
            }
        }
    }

    /// Load every path in order, stopping at the first failure.
    pub fn load_multiple<P: AsRef<Path>>(
        &self,
        paths: impl IntoIterator<Item = P>,
    ) -> Result<Vec<SpectrumRecord>, IngestError> {
        paths
            .into_iter()
            .map(|path| self.load(path.as_ref(), None))
            .collect()
    }
}

/// Load a spectrum with the default registry and options.
pub fn load_spectrum(path: &Path, identifier: Option<&str>) -> Result<SpectrumRecord, IngestError> {
    LoaderRegistry::default().load(path, identifier)
}

pub fn load_multiple<P: AsRef<Path>>(
    paths: impl IntoIterator<Item = P>,
) -> Result<Vec<SpectrumRecord>, IngestError> {
    LoaderRegistry::default().load_multiple(paths)
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// ASCII loader
// ---------------------------------------------------------------------------

/// Delimited or whitespace separated text tables.
#[derive(Debug, Clone, Default)]
pub struct AsciiLoader {
    options: IngestOptions,
}

impl AsciiLoader {
    pub fn new(options: IngestOptions) -> Self {
        Self { options }
    }
}

impl SpectrumLoader for AsciiLoader {
    fn load(&self, path: &Path, identifier: Option<&str>) -> Result<SpectrumRecord, IngestError> {
        load_ascii_spectrum(path, identifier, &self.options)
    }
}

pub fn load_ascii_spectrum(
    path: &Path,
    identifier: Option<&str>,
    options: &IngestOptions,
) -> Result<SpectrumRecord, IngestError> {
    let reader = StreamingTableReader::open(path, options.chunk_size)?;
    let source = reader.source().to_string();
    let table = read_table(reader, options)?;
    assemble_record(table, &source, identifier, "ASCII spectrum")
}

/// Same as [`load_ascii_spectrum`] for an already open stream; the record's
/// source is "in-memory".
pub fn load_ascii_from_reader<R: BufRead>(
    reader: R,
    identifier: Option<&str>,
    options: &IngestOptions,
) -> Result<SpectrumRecord, IngestError> {
    let reader = StreamingTableReader::from_reader(reader, IN_MEMORY_SOURCE, options.chunk_size)?;
    let table = read_table(reader, options)?;
    assemble_record(table, IN_MEMORY_SOURCE, identifier, "ASCII spectrum")
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Flat Parquet tables, one spectral point per row.
#[derive(Debug, Clone, Default)]
pub struct ParquetLoader {
    options: IngestOptions,
}

impl ParquetLoader {
    pub fn new(options: IngestOptions) -> Self {
        Self { options }
    }
}

impl SpectrumLoader for ParquetLoader {
    fn load(&self, path: &Path, identifier: Option<&str>) -> Result<SpectrumRecord, IngestError> {
        load_parquet_spectrum(path, identifier, &self.options)
    }
}

/// Record batches of `chunk_size` rows are streamed through the same
/// accumulator as text chunks.  Columns that are neither numeric nor hold
/// numeric strings end up skipped.
pub fn load_parquet_spectrum(
    path: &Path,
    identifier: Option<&str>,
    options: &IngestOptions,
) -> Result<SpectrumRecord, IngestError> {
    let source = path.display().to_string();
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let columns: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.with_batch_size(options.chunk_size.max(1)).build()?;

    let mut accumulator = ChunkAccumulator::new(&options.tier_capacities, options.seed);
    for (i, batch) in reader.enumerate() {
        let batch = batch?;
        let values: Vec<Vec<f64>> = batch.columns().iter().map(column_to_f64).collect();
        accumulator.process_chunk(&columns, &values);
        debug!(
            "{source}: batch {} ({} rows, {} total)",
            i + 1,
            batch.num_rows(),
            accumulator.row_count()
        );
    }

    let table = accumulator.finalize().validate(&source)?;
    assemble_record(table, &source, identifier, "Parquet spectrum")
}

/// Arrow column → `f64`, nulls and non-numeric types as NaN.
fn column_to_f64(col: &ArrayRef) -> Vec<f64> {
    match col.data_type() {
        DataType::Float64 => col
            .as_primitive::<Float64Type>()
            .iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect(),
        DataType::Float32 => col
            .as_primitive::<Float32Type>()
            .iter()
            .map(|v| v.map_or(f64::NAN, f64::from))
            .collect(),
        DataType::Int32 => col
            .as_primitive::<Int32Type>()
            .iter()
            .map(|v| v.map_or(f64::NAN, f64::from))
            .collect(),
        DataType::Int64 => col
            .as_primitive::<Int64Type>()
            .iter()
            .map(|v| v.map_or(f64::NAN, |v| v as f64))
            .collect(),
        DataType::Utf8 => col
            .as_string::<i32>()
            .iter()
            .map(|v| v.map_or(f64::NAN, parse_cell))
            .collect(),
        DataType::LargeUtf8 => col
            .as_string::<i64>()
            .iter()
            .map(|v| v.map_or(f64::NAN, parse_cell))
            .collect(),
        _ => vec![f64::NAN; col.len()],
    }
}

// ---------------------------------------------------------------------------
// Column selection
// ---------------------------------------------------------------------------

pub const WAVELENGTH_CANDIDATES: [&str; 4] = ["wavelength", "lambda", "wave", "wl"];
pub const FLUX_CANDIDATES: [&str; 4] = ["flux", "intensity", "power", "counts"];

fn find_candidate<'a>(columns: &[&'a str], candidates: &[&str], exclude: Option<&str>) -> Option<&'a str> {
    let usable = |c: &&&'a str| Some(**c) != exclude;
    let lowered: Vec<(&'a str, String)> = columns
        .iter()
        .filter(usable)
        .map(|c| (*c, c.to_lowercase()))
        .collect();

    candidates
        .iter()
        .find_map(|cand| lowered.iter().find(|(_, l)| l.as_str() == *cand).map(|(c, _)| *c))
        .or_else(|| {
            // Prefix matches go by column order, not candidate priority.
            lowered
                .iter()
                .find(|(_, l)| candidates.iter().any(|cand| l.starts_with(*cand)))
                .map(|(c, _)| *c)
        })
}

/// Pick the (wavelength, flux) column pair.
///
/// Known names match exactly first, then as a prefix; otherwise the first
/// column is the axis and the first other column the flux.  A single column
/// serves as both.
pub fn select_columns<'a>(columns: &[&'a str]) -> Option<(&'a str, &'a str)> {
    let first = *columns.first()?;
    let wave = find_candidate(columns, &WAVELENGTH_CANDIDATES, None).unwrap_or(first);
    let flux = find_candidate(columns, &FLUX_CANDIDATES, Some(wave))
        .or_else(|| columns.iter().copied().find(|c| *c != wave))
        .unwrap_or(wave);
    Some((wave, flux))
}

/// Header-inferred axis unit, nm when missing or not spectral.
fn resolve_wavelength_unit(column: &str) -> Unit {
    match infer_unit(column) {
        Some(unit) if is_spectral(&unit) => unit,
        Some(unit) => {
            warn!(
                "Column '{column}' suggests unit '{unit}', which is not spectral; assuming {}",
                canonical_wavelength_unit()
            );
            canonical_wavelength_unit()
        }
        None => canonical_wavelength_unit(),
    }
}

// ---------------------------------------------------------------------------
// Record assembly
// ---------------------------------------------------------------------------

/// Build the canonical record from a validated table.
pub fn assemble_record(
    table: FinalizedTable,
    source: &str,
    identifier: Option<&str>,
    description: &str,
) -> Result<SpectrumRecord, IngestError> {
    let names = table.column_names();
    let (wave_column, flux_column) = select_columns(&names)
        .map(|(w, f)| (w.to_string(), f.to_string()))
        .ok_or_else(|| IngestError::NoNumericColumns {
            origin: source.to_string(),
        })?;

    let wave_unit = resolve_wavelength_unit(&wave_column);
    let flux_unit = infer_unit(&flux_column).unwrap_or_else(canonical_flux_unit);
    let column = |name: &str| table.column(name).map(<[f64]>::to_vec).unwrap_or_default();

    let wavelength = Quantity::new(column(&wave_column), wave_unit.clone());
    let flux = Quantity::new(column(&flux_column), flux_unit.clone());
    let (axis, conversion) = canonicalize(&wavelength, &flux)?;
    if conversion.method == ConversionMethod::Unconverted {
        warn!(
            "Flux column '{flux_column}' in {source} uses '{flux_unit}', which cannot be expressed in {}; keeping it",
            canonical_flux_unit()
        );
    }

    let mut downsampled = BTreeMap::new();
    for (&size, rows) in &table.tiers {
        let (w, f): (Vec<f64>, Vec<f64>) = rows
            .iter()
            .filter_map(|row| Some((*row.get(&wave_column)?, *row.get(&flux_column)?)))
            .unzip();
        let tier = DownsampleTier::new(
            Quantity::new(w, wave_unit.clone()),
            Quantity::new(f, flux_unit.clone()),
        )?;
        let (tier, _) = tier.to_canonical_units()?;
        downsampled.insert(size, tier);
    }
    let tier_sizes: Vec<String> = downsampled.keys().map(usize::to_string).collect();

    let mut metadata = SpectrumMetadata::new(source)
        .with_description(description)
        .with_extra(keys::WAVE_COLUMN, wave_column.as_str())
        .with_extra(keys::FLUX_COLUMN, flux_column.as_str())
        .with_extra(keys::WAVELENGTH_UNIT, axis.unit().to_string())
        .with_extra(keys::FLUX_UNIT, conversion.flux.unit().to_string())
        .with_extra(keys::SOURCE_WAVELENGTH_UNIT, wave_unit.to_string())
        .with_extra(keys::SOURCE_FLUX_UNIT, flux_unit.to_string())
        .with_extra(keys::FLUX_CONVERSION, conversion.method.as_str())
        .with_extra(keys::ROW_COUNT, table.row_count.to_string())
        .with_extra(
            keys::COLUMN_STATISTICS,
            serde_json::to_string(&table.statistics)?,
        )
        .with_extra(keys::DOWNSAMPLE_TIERS, tier_sizes.join(","));
    if !table.skipped_columns.is_empty() {
        metadata = metadata.with_extra(keys::SKIPPED_COLUMNS, table.skipped_columns.join(","));
    }

    let identifier = identifier.map(str::to_string).unwrap_or_else(|| {
        Path::new(source)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(source)
            .to_string()
    });

    let spectrum = Spectrum::new(axis, conversion.flux)?.with_downsampled(downsampled);
    info!(
        "Loaded '{identifier}' from {source}: {} points from {} rows (flux {})",
        spectrum.len(),
        table.row_count,
        conversion.method
    );
    Ok(SpectrumRecord::new(identifier, spectrum, metadata))
}

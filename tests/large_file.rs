//! End-to-end ingestion of multi-million row text tables.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use spectral_ingest::data::accumulator::ColumnSummary;
use spectral_ingest::data::loader::load_ascii_spectrum;
use spectral_ingest::data::model::keys;
use spectral_ingest::units::Unit;
use spectral_ingest::config::DEFAULT_CHUNK_SIZE;
use spectral_ingest::{load_spectrum, IngestOptions, SpectrumRecord};

/// Angstrom axis, W m⁻² nm⁻¹ flux and a text column nobody can parse.
fn write_table(path: &Path, rows: usize) {
    let mut out = BufWriter::new(File::create(path).unwrap());
    writeln!(out, "wavelength (Angstrom),irradiance_w_m2_nm,descriptor").unwrap();
    for i in 0..rows {
        let wavelength = 3000.0 + i as f64 * 0.0035;
        let flux = 1.0 + (i % 1000) as f64 * 1e-3;
        writeln!(out, "{wavelength:.4},{flux:.6},row-{}", i % 17).unwrap();
    }
    out.flush().unwrap();
}

/// Evenly sampled nm axis with a sine-plus-offset flux in Jy.
fn write_sine_table(path: &Path, rows: usize) {
    let mut out = BufWriter::new(File::create(path).unwrap());
    writeln!(out, "wavelength_nm,flux (Jy)").unwrap();
    for i in 0..rows {
        let wavelength = 400.0 + i as f64 * 1e-4;
        let flux = 2.0 + (i as f64 * 1e-3).sin();
        writeln!(out, "{wavelength:.4},{flux:.9}").unwrap();
    }
    out.flush().unwrap();
}

fn statistics(record: &SpectrumRecord) -> BTreeMap<String, ColumnSummary> {
    serde_json::from_str(&record.metadata.extra[keys::COLUMN_STATISTICS]).unwrap()
}

#[test]
fn two_million_rows_are_streamed() {
    let rows = 2_000_000;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("large.csv");
    write_table(&path, rows);

    let record = load_spectrum(&path, None).unwrap();
    let extra = &record.metadata.extra;

    assert_eq!(record.identifier, "large");
    assert_eq!(extra[keys::ROW_COUNT], rows.to_string());
    assert_eq!(extra[keys::DOWNSAMPLE_TIERS], "512,2048,8192");
    assert_eq!(extra[keys::SKIPPED_COLUMNS], "descriptor");
    assert_eq!(extra[keys::WAVELENGTH_UNIT], "nm");
    assert_eq!(extra[keys::FLUX_UNIT], "Jy");
    assert_eq!(extra[keys::FLUX_CONVERSION], "spectral_density");

    let stats = statistics(&record);
    assert_eq!(
        stats.keys().collect::<Vec<_>>(),
        vec!["irradiance_w_m2_nm", "wavelength (Angstrom)"]
    );
    assert_eq!(stats["wavelength (Angstrom)"].count, rows as u64);
    assert_eq!(stats["wavelength (Angstrom)"].min, 3000.0);

    for (&size, tier) in record.spectrum.downsampled() {
        assert_eq!(tier.len(), size);
        assert!(tier.len() <= record.spectrum.len());
        assert!(tier.wavelength().values().windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(tier.flux().unit(), &Unit::jansky());
    }

    let axis = record.spectrum.spectral_axis().values();
    assert!((axis[0] - 300.0).abs() < 1e-9);
    assert!(axis.windows(2).all(|w| w[1] > w[0]));
}

#[test]
fn chunk_size_is_not_observable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chunks.csv");
    write_table(&path, 50_000);

    let large = load_ascii_spectrum(&path, None, &IngestOptions::default()).unwrap();
    let small = load_ascii_spectrum(
        &path,
        None,
        &IngestOptions::default().with_chunk_size(3_001),
    )
    .unwrap();

    assert_eq!(large.spectrum, small.spectrum);
    assert_eq!(large.metadata, small.metadata);
    assert_eq!(statistics(&large), statistics(&small));
}

#[test]
fn one_chunk_matches_ten_chunks() {
    let rows = 2_000_000;
    assert_eq!(rows / DEFAULT_CHUNK_SIZE, 10);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sine.csv");
    write_sine_table(&path, rows);

    let chunked = load_ascii_spectrum(&path, None, &IngestOptions::default()).unwrap();
    let whole =
        load_ascii_spectrum(&path, None, &IngestOptions::default().with_chunk_size(rows)).unwrap();

    let (chunked_stats, whole_stats) = (statistics(&chunked), statistics(&whole));
    for column in ["wavelength_nm", "flux (Jy)"] {
        let (a, b) = (&chunked_stats[column], &whole_stats[column]);
        assert_eq!(a.count, rows as u64);
        assert_eq!(a.count, b.count);
        assert_eq!(a.mean, b.mean);
        assert_eq!(a.min, b.min);
        assert_eq!(a.max, b.max);
    }
    assert!((chunked_stats["flux (Jy)"].mean - 2.0).abs() < 0.01);
    assert_eq!(chunked.spectrum, whole.spectrum);
    assert_eq!(chunked.metadata.extra[keys::ROW_COUNT], rows.to_string());
}

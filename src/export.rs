use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::data::model::{SpectrumMetadata, SpectrumRecord};
use crate::units::{canonical_wavelength_unit, convert_axis, Quantity, Unit};

/// Written when a session export does not name its own path.
pub const DEFAULT_EXPORT_PATH: &str = "spectral_session.json";

// ---------------------------------------------------------------------------
// Session annotations
// ---------------------------------------------------------------------------

/// An atomic line drawn on top of the spectra.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceLine {
    pub element: String,
    pub wavelength: f64,
    /// Unit of `wavelength`; anything spectral.
    pub unit: Unit,
    pub intensity: f64,
    pub label: String,
}

impl ReferenceLine {
    pub fn new(
        element: impl Into<String>,
        wavelength: f64,
        unit: Unit,
        intensity: f64,
        label: impl Into<String>,
    ) -> Self {
        Self {
            element: element.into(),
            wavelength,
            unit,
            intensity,
            label: label.into(),
        }
    }

    pub fn wavelength_nm(&self) -> Result<f64> {
        let q = Quantity::new(vec![self.wavelength], self.unit.clone());
        let nm = convert_axis(&q, &canonical_wavelength_unit())
            .with_context(|| format!("reference line '{}'", self.label))?;
        Ok(nm.values()[0])
    }
}

/// A free-text note pinned at a wavelength (nm).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(rename = "wavelength_nm")]
    pub wavelength: f64,
    pub note: String,
    pub flux: Option<f64>,
}

impl Annotation {
    pub fn new(wavelength: f64, note: impl Into<String>, flux: Option<f64>) -> Self {
        Self {
            wavelength,
            note: note.into(),
            flux,
        }
    }
}

/// Everything needed to write a session file.
#[derive(Debug, Clone, Default)]
pub struct SessionExport {
    pub spectra: Vec<SpectrumRecord>,
    pub reference_lines: Vec<ReferenceLine>,
    pub annotations: Vec<Annotation>,
    pub config: BTreeMap<String, JsonValue>,
    /// Defaults to [`DEFAULT_EXPORT_PATH`].
    pub export_path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// JSON payload
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SpectrumPayload<'a> {
    id: &'a str,
    wavelength_nm: Vec<f64>,
    flux: Vec<f64>,
    flux_unit: String,
    metadata: SpectrumMetadata,
}

#[derive(Serialize)]
struct ReferenceLinePayload<'a> {
    element: &'a str,
    wavelength_nm: f64,
    intensity: f64,
    label: &'a str,
}

#[derive(Serialize)]
struct SessionPayload<'a> {
    spectra: Vec<SpectrumPayload<'a>>,
    reference_lines: Vec<ReferenceLinePayload<'a>>,
    annotations: &'a [Annotation],
    config: &'a BTreeMap<String, JsonValue>,
}

fn spectrum_payload(record: &SpectrumRecord) -> Result<SpectrumPayload<'_>> {
    let canonical = record
        .to_canonical_units()
        .with_context(|| format!("canonicalising spectrum '{}'", record.identifier))?;
    let flux_unit = match canonical.spectrum.flux().unit().symbol() {
        "" | "1" => "dimensionless".to_string(),
        symbol => symbol.to_string(),
    };
    // Export the caller's metadata, not the copy annotated with canonical units.
    Ok(SpectrumPayload {
        id: &record.identifier,
        wavelength_nm: canonical.spectrum.spectral_axis().values().to_vec(),
        flux: canonical.spectrum.flux().values().to_vec(),
        flux_unit,
        metadata: record.metadata.clone(),
    })
}

/// Write the session as pretty-printed JSON and return the path written.
pub fn export_session(export: &SessionExport) -> Result<PathBuf> {
    let spectra = export
        .spectra
        .iter()
        .map(spectrum_payload)
        .collect::<Result<Vec<_>>>()?;
    let reference_lines = export
        .reference_lines
        .iter()
        .map(|line| {
            Ok(ReferenceLinePayload {
                element: &line.element,
                wavelength_nm: line.wavelength_nm()?,
                intensity: line.intensity,
                label: &line.label,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let payload = SessionPayload {
        spectra,
        reference_lines,
        annotations: &export.annotations,
        config: &export.config,
    };
    let text = serde_json::to_string_pretty(&payload).context("serialising session")?;

    let path = export
        .export_path
        .clone()
        .unwrap_or_else(|| Path::new(DEFAULT_EXPORT_PATH).to_path_buf());
    std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
    info!("Exported {} spectra to {}", export.spectra.len(), path.display());
    Ok(path)
}

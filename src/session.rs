use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::info;
use serde_json::Value as JsonValue;

use crate::analysis::{compute_difference, compute_ratio, DEFAULT_RATIO_EPSILON};
use crate::config::IngestOptions;
use crate::data::loader::{LoaderRegistry, SpectrumLoader};
use crate::data::model::SpectrumRecord;
use crate::export::{export_session, Annotation, ReferenceLine, SessionExport};

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Loaded spectra plus everything drawn or noted on top of them.
pub struct Session {
    /// In load order; identifiers are unique.
    pub records: Vec<SpectrumRecord>,

    pub reference_lines: Vec<ReferenceLine>,

    pub annotations: Vec<Annotation>,

    /// Free-form settings carried into the export.
    pub config: BTreeMap<String, String>,

    /// Outcome of the last operation, for display.
    pub status_message: Option<String>,

    options: IngestOptions,
    registry: LoaderRegistry,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(IngestOptions::default())
    }
}

impl Session {
    pub fn new(options: IngestOptions) -> Self {
        Self {
            records: Vec::new(),
            reference_lines: Vec::new(),
            annotations: Vec::new(),
            config: BTreeMap::new(),
            status_message: None,
            registry: LoaderRegistry::with_options(options.clone()),
            options,
        }
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Add a loader, e.g. for FITS files.
    pub fn register_loader(&mut self, extensions: &[&str], loader: Box<dyn SpectrumLoader>) {
        self.registry.register(extensions, loader);
    }

    /// Load a file and keep it, replacing any record with the same identifier.
    pub fn load_file(&mut self, path: &Path, identifier: Option<&str>) -> Result<&SpectrumRecord> {
        match self.registry.load(path, identifier) {
            Ok(record) => {
                self.status_message = Some(format!(
                    "Loaded '{}' ({} points)",
                    record.identifier,
                    record.spectrum.len()
                ));
                Ok(self.insert(record))
            }
            Err(err) => {
                self.status_message = Some(format!("Error: {err}"));
                Err(err).with_context(|| format!("loading {}", path.display()))
            }
        }
    }

    /// Keep `record`, replacing any record with the same identifier.
    pub fn insert(&mut self, record: SpectrumRecord) -> &SpectrumRecord {
        let index = match self
            .records
            .iter()
            .position(|r| r.identifier == record.identifier)
        {
            Some(index) => {
                self.records[index] = record;
                index
            }
            None => {
                self.records.push(record);
                self.records.len() - 1
            }
        };
        &self.records[index]
    }

    pub fn get(&self, identifier: &str) -> Option<&SpectrumRecord> {
        self.records.iter().find(|r| r.identifier == identifier)
    }

    pub fn identifiers(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.identifier.as_str()).collect()
    }

    pub fn remove(&mut self, identifier: &str) -> Option<SpectrumRecord> {
        let index = self.records.iter().position(|r| r.identifier == identifier)?;
        Some(self.records.remove(index))
    }

    fn pair(&self, first: &str, second: &str) -> Result<(&SpectrumRecord, &SpectrumRecord)> {
        let lookup = move |id: &str| {
            self.get(id)
                .ok_or_else(|| anyhow!("no spectrum named '{id}' in the session"))
        };
        Ok((lookup(first)?, lookup(second)?))
    }

    /// Store `first - second` as a new record.
    pub fn difference(
        &mut self,
        first: &str,
        second: &str,
        identifier: Option<&str>,
    ) -> Result<&SpectrumRecord> {
        let (a, b) = self.pair(first, second)?;
        let record = compute_difference(a, b, identifier)
            .with_context(|| format!("difference of '{first}' and '{second}'"))?;
        info!("Computed '{}'", record.identifier);
        Ok(self.insert(record))
    }

    /// Store `first / second` as a new record.
    pub fn ratio(
        &mut self,
        first: &str,
        second: &str,
        identifier: Option<&str>,
    ) -> Result<&SpectrumRecord> {
        let (a, b) = self.pair(first, second)?;
        let record = compute_ratio(a, b, identifier, DEFAULT_RATIO_EPSILON)
            .with_context(|| format!("ratio of '{first}' and '{second}'"))?;
        info!("Computed '{}'", record.identifier);
        Ok(self.insert(record))
    }

    pub fn add_reference_line(&mut self, line: ReferenceLine) {
        self.reference_lines.push(line);
    }

    pub fn annotate(&mut self, annotation: Annotation) {
        self.annotations.push(annotation);
    }

    /// Snapshot for [`export_session`].  The ingestion options are written
    /// under `config["ingest_options"]`.
    pub fn to_export(&self, export_path: Option<PathBuf>) -> Result<SessionExport> {
        let mut config: BTreeMap<String, JsonValue> = self
            .config
            .iter()
            .map(|(k, v)| (k.clone(), JsonValue::from(v.as_str())))
            .collect();
        config.insert(
            "ingest_options".to_string(),
            serde_json::to_value(&self.options).context("serialising ingest options")?,
        );
        Ok(SessionExport {
            spectra: self.records.clone(),
            reference_lines: self.reference_lines.clone(),
            annotations: self.annotations.clone(),
            config,
            export_path,
        })
    }

    pub fn export(&mut self, export_path: Option<PathBuf>) -> Result<PathBuf> {
        let path = export_session(&self.to_export(export_path)?)?;
        self.status_message = Some(format!("Exported session to {}", path.display()));
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::data::model::keys;
    use crate::units::Unit;

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn load_compare_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.csv", "wavelength,flux\n500,2\n510,4\n520,6\n");
        let b = write(dir.path(), "b.csv", "wavelength,flux\n500,1\n510,1\n520,1\n");

        let mut session = Session::default();
        session.load_file(&a, None).unwrap();
        session.load_file(&b, None).unwrap();
        assert_eq!(session.identifiers(), vec!["a", "b"]);

        let diff = session.difference("a", "b", None).unwrap();
        assert_eq!(diff.identifier, "a-minus-b");
        assert_eq!(diff.spectrum.flux().values(), &[1.0, 3.0, 5.0]);
        session.ratio("a", "b", Some("a/b")).unwrap();
        assert!(session.get("a/b").is_some());

        session.add_reference_line(ReferenceLine::new("H", 656.281, Unit::nanometer(), 1.0, "Hα"));
        session.config.insert("theme".to_string(), "dark".to_string());
        let path = session.export(Some(dir.path().join("out.json"))).unwrap();

        let payload: JsonValue = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(payload["spectra"].as_array().unwrap().len(), 4);
        assert_eq!(payload["spectra"][0]["metadata"]["extra"][keys::ROW_COUNT], "3");
        assert_eq!(payload["config"]["theme"], "dark");
        assert_eq!(payload["config"]["ingest_options"]["chunk_size"], 200_000);
        assert!(session.status_message.unwrap().starts_with("Exported"));
    }

    #[test]
    fn reloading_replaces_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let first = write(dir.path(), "s.csv", "wavelength,flux\n500,1\n510,1\n");
        let second = write(dir.path(), "t.csv", "wavelength,flux\n500,1\n510,1\n520,1\n");

        let mut session = Session::default();
        session.load_file(&first, Some("star")).unwrap();
        session.load_file(&second, Some("star")).unwrap();
        assert_eq!(session.records.len(), 1);
        assert_eq!(session.get("star").unwrap().spectrum.len(), 3);
        assert!(session.remove("star").is_some());
        assert!(session.get("star").is_none());
    }

    #[test]
    fn failures_are_reported_in_the_status() {
        let dir = tempfile::tempdir().unwrap();
        let empty = write(dir.path(), "empty.csv", "");

        let mut session = Session::default();
        assert!(session.load_file(&empty, None).is_err());
        assert!(session.status_message.as_deref().unwrap().starts_with("Error"));
        assert!(session.difference("x", "y", None).is_err());
        assert!(session.records.is_empty());
    }
}

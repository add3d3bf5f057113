//! Registry of produced outputs
//!
//! A JSON file (`processed_outputs.json`) in the output directory records
//! what each run produced, so callers can list or clear prior outputs
//! without scanning the filesystem. Writes are atomic (temp file + rename).

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Registry file name inside the output directory.
pub const REGISTRY_FILE: &str = "processed_outputs.json";

/// One produced output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputEntry {
    pub source_system: String,
    pub input_file: PathBuf,
    pub output_file: PathBuf,
    /// RFC 3339 timestamp of the run.
    pub processed_at: String,
    pub records_in: usize,
    pub records_out: usize,
}

/// All recorded outputs for one output directory.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct OutputRegistry {
    #[serde(default)]
    pub outputs: Vec<OutputEntry>,
}

impl OutputRegistry {
    fn path_in(dir: &Path) -> PathBuf {
        dir.join(REGISTRY_FILE)
    }

    /// Load the registry for an output directory (empty if absent).
    pub fn load(dir: &Path) -> Result<Self> {
        let path = Self::path_in(dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Save the registry, atomically.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = Self::path_in(dir);
        let content = serde_json::to_string_pretty(self)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &content)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        if let Err(rename_err) = std::fs::rename(&tmp, &path) {
            // Cross-device fallback (Docker overlayfs, some CI)
            if let Err(copy_err) = std::fs::copy(&tmp, &path) {
                let _ = std::fs::remove_file(&tmp);
                bail!(
                    "rename {} -> {} failed ({}), copy fallback failed: {}",
                    tmp.display(),
                    path.display(),
                    rename_err,
                    copy_err
                );
            }
            let _ = std::fs::remove_file(&tmp);
        }
        Ok(())
    }

    /// Record an output, replacing any prior entry for the same source
    /// system and input file.
    pub fn record(&mut self, entry: OutputEntry) {
        self.outputs.retain(|e| {
            e.source_system != entry.source_system || e.input_file != entry.input_file
        });
        self.outputs.push(entry);
    }

    /// Drop the entry for a given output file. Returns whether one existed.
    pub fn remove_output(&mut self, output_file: &Path) -> bool {
        let before = self.outputs.len();
        self.outputs.retain(|e| e.output_file != output_file);
        self.outputs.len() != before
    }

    pub fn clear(&mut self) {
        self.outputs.clear();
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// Build an entry stamped with the current time.
pub fn entry_now(
    source_system: &str,
    input_file: &Path,
    output_file: &Path,
    records_in: usize,
    records_out: usize,
) -> OutputEntry {
    OutputEntry {
        source_system: source_system.to_string(),
        input_file: input_file.to_path_buf(),
        output_file: output_file.to_path_buf(),
        processed_at: chrono::Utc::now().to_rfc3339(),
        records_in,
        records_out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(source: &str, input: &str) -> OutputEntry {
        OutputEntry {
            source_system: source.to_string(),
            input_file: PathBuf::from(input),
            output_file: PathBuf::from(format!("{source}_Output.xlsx")),
            processed_at: "2026-01-01T00:00:00Z".to_string(),
            records_in: 10,
            records_out: 8,
        }
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let registry = OutputRegistry::load(dir.path()).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut registry = OutputRegistry::default();
        registry.record(entry("crm", "crm_a.xlsx"));
        registry.save(dir.path()).unwrap();

        let back = OutputRegistry::load(dir.path()).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back.outputs[0].source_system, "crm");
        assert_eq!(back.outputs[0].records_out, 8);
    }

    #[test]
    fn test_record_replaces_same_source_and_input() {
        let mut registry = OutputRegistry::default();
        registry.record(entry("crm", "crm_a.xlsx"));
        registry.record(entry("crm", "crm_a.xlsx"));
        registry.record(entry("crm", "crm_b.xlsx"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_output() {
        let mut registry = OutputRegistry::default();
        registry.record(entry("crm", "crm_a.xlsx"));
        assert!(registry.remove_output(Path::new("crm_Output.xlsx")));
        assert!(!registry.remove_output(Path::new("crm_Output.xlsx")));
        assert!(registry.is_empty());
    }
}

//! Dataset persistence.
//!
//! Reports embed a stored dataset's reference as `full_data_reference` but
//! never resolve it themselves; saving and loading is the caller's business.

use crate::error::{ReportError, Result};
use crate::output::write_json;
use crate::types::RawDataset;
use std::path::{Path, PathBuf};

pub trait DatasetStore {
    /// Persist a dataset and return an opaque reference to it.
    fn save(&self, dataset: &RawDataset) -> Result<String>;

    fn load(&self, reference: &str) -> Result<RawDataset>;
}

/// Stores each dataset as `<timestamp>_<name>.json` under a root directory.
/// The file name is the reference.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        JsonFileStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, reference: &str) -> Result<PathBuf> {
        let unsafe_name = reference.is_empty()
            || reference.contains(['/', '\\'])
            || reference.contains("..");
        if unsafe_name {
            return Err(ReportError::InvalidReference(reference.to_string()));
        }
        Ok(self.root.join(reference))
    }
}

fn slug(description: &str) -> String {
    let slug: String = description
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "dataset".to_string()
    } else {
        slug.chars().take(48).collect()
    }
}

impl DatasetStore for JsonFileStore {
    fn save(&self, dataset: &RawDataset) -> Result<String> {
        std::fs::create_dir_all(&self.root).map_err(|e| ReportError::io(&self.root, e))?;
        let stem = format!(
            "{}_{}",
            chrono::Local::now().format("%Y%m%d_%H%M%S_%3f"),
            slug(&dataset.description)
        );
        let mut reference = format!("{stem}.json");
        let mut n = 1;
        while self.root.join(&reference).exists() {
            reference = format!("{stem}_{n}.json");
            n += 1;
        }
        write_json(&self.root.join(&reference), dataset)?;
        tracing::info!(reference = %reference, rows = dataset.rows.len(), "saved dataset");
        Ok(reference)
    }

    fn load(&self, reference: &str) -> Result<RawDataset> {
        let path = self.resolve(reference)?;
        if !path.is_file() {
            return Err(ReportError::DatasetNotFound(reference.to_string()));
        }
        let text = std::fs::read_to_string(&path).map_err(|e| ReportError::io(&path, e))?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> RawDataset {
        RawDataset::new(
            vec!["customer".into(), "gross_usd".into()],
            vec![vec![json!("Acme"), json!(100.5)], vec![json!(null), json!("7")]],
        )
        .with_description("November bookings")
    }

    #[test]
    fn saved_datasets_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let reference = store.save(&sample()).unwrap();
        assert!(reference.ends_with("_november_bookings.json"));
        assert_eq!(store.load(&reference).unwrap(), sample());
    }

    #[test]
    fn repeated_saves_get_distinct_references() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let a = store.save(&sample()).unwrap();
        let b = store.save(&sample()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn references_cannot_escape_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        for bad in ["../secrets.json", "a/b.json", "", ".."] {
            assert!(matches!(store.load(bad), Err(ReportError::InvalidReference(_))));
        }
        assert!(matches!(
            store.load("missing.json"),
            Err(ReportError::DatasetNotFound(_))
        ));
    }
}

use crate::error::{ReportError, Result};
use crate::types::RawDataset;
use csv::ReaderBuilder;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub total_rows: usize,
    pub loaded_rows: usize,
    /// CSV rows that could not be read or had the wrong number of fields.
    pub skipped_rows: usize,
}

/// Load a dataset from a `.csv` file (header row plus text cells) or from
/// the JSON shape `{ "data_set_description", "columns", "rows" }`.
pub fn load_raw(path: &Path) -> Result<(RawDataset, LoadReport)> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    let loaded = if is_csv { load_csv(path)? } else { load_json(path)? };
    tracing::debug!(
        path = %path.display(),
        columns = loaded.0.columns.len(),
        rows = loaded.1.loaded_rows,
        "loaded dataset"
    );
    Ok(loaded)
}

fn load_json(path: &Path) -> Result<(RawDataset, LoadReport)> {
    let text = std::fs::read_to_string(path).map_err(|e| ReportError::io(path, e))?;
    let raw: RawDataset = serde_json::from_str(&text)?;
    let rows = raw.rows.len();
    Ok((
        raw,
        LoadReport {
            total_rows: rows,
            loaded_rows: rows,
            skipped_rows: 0,
        },
    ))
}

fn load_csv(path: &Path) -> Result<(RawDataset, LoadReport)> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_path(path)?;
    let columns: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let mut total_rows = 0usize;
    let mut skipped_rows = 0usize;
    let mut rows = Vec::new();
    for result in rdr.records() {
        total_rows += 1;
        let record = match result {
            Ok(r) if r.len() == columns.len() => r,
            _ => {
                skipped_rows += 1;
                continue;
            }
        };
        rows.push(
            record
                .iter()
                .map(|cell| serde_json::Value::String(cell.to_string()))
                .collect(),
        );
    }
    if skipped_rows > 0 {
        tracing::warn!(path = %path.display(), skipped_rows, "skipped malformed CSV rows");
    }

    let description = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    let report = LoadReport {
        total_rows,
        loaded_rows: rows.len(),
        skipped_rows,
    };
    Ok((RawDataset::new(columns, rows).with_description(description), report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn csv_rows_of_the_wrong_width_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "customer, gross_usd").unwrap();
        writeln!(file, "Acme,\"1,200.50\"").unwrap();
        writeln!(file, "Beta").unwrap();
        writeln!(file, "Gamma,").unwrap();
        drop(file);

        let (raw, report) = load_raw(&path).unwrap();
        assert_eq!(raw.columns, vec!["customer", "gross_usd"]);
        assert_eq!(raw.description, "orders");
        assert_eq!(report.total_rows, 3);
        assert_eq!(report.skipped_rows, 1);
        assert_eq!(raw.rows[0][1], serde_json::json!("1,200.50"));
        assert_eq!(raw.rows[1][1], serde_json::json!(""));
    }

    #[test]
    fn json_uses_the_store_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quotes.json");
        std::fs::write(
            &path,
            r#"{"data_set_description":"nov","columns":["a"],"rows":[[1],[null]]}"#,
        )
        .unwrap();
        let (raw, report) = load_raw(&path).unwrap();
        assert_eq!(raw.description, "nov");
        assert_eq!(report.loaded_rows, 2);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_raw(Path::new("/nonexistent/data.json")).unwrap_err();
        assert!(matches!(err, ReportError::Io { .. }));
    }
}

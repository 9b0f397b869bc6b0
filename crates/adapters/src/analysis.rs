use std::fs;
use std::path::{Path, PathBuf};

use sqlpane_core::schema::AnalysisOutput;
use thiserror::Error;

const DEMO_ANALYSIS: &str = r#"{
  "tableStructure": [
    {
      "tableName": "users",
      "comment": "Registered accounts",
      "columns": [
        { "name": "id", "type": "INTEGER", "isPrimary": true, "nullable": false },
        { "name": "name", "type": "VARCHAR(64)", "nullable": false },
        { "name": "email", "type": "VARCHAR(255)", "comment": "Login address" }
      ]
    },
    {
      "tableName": "orders",
      "columns": [
        { "name": "id", "type": "INTEGER", "isPrimary": true, "nullable": false },
        {
          "name": "user_id",
          "type": "INTEGER",
          "nullable": false,
          "references": { "table": "users", "column": "id" }
        },
        { "name": "total", "type": "DECIMAL(10,2)" }
      ]
    }
  ],
  "tuples": [
    {
      "tableName": "users",
      "tupleData": [
        { "id": 1, "name": "Ada", "email": "ada@example.com" },
        { "id": 2, "name": "Linus", "email": "linus@example.com" }
      ]
    },
    {
      "tableName": "orders",
      "tupleData": [
        { "id": 10, "user_id": 1, "total": 42.5 },
        { "id": 11, "user_id": 2, "total": 7 }
      ]
    }
  ]
}"#;

#[derive(Debug, Error)]
pub enum AnalysisLoadError {
    #[error("failed to read analysis file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse analysis file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads producer output saved as JSON (`tableStructure` / `tuples`).
pub fn load_analysis(path: impl AsRef<Path>) -> Result<AnalysisOutput, AnalysisLoadError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| AnalysisLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let analysis: AnalysisOutput =
        serde_json::from_str(&raw).map_err(|source| AnalysisLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    tracing::info!(
        path = %path.display(),
        tables = analysis.table_structure.as_ref().map_or(0, |structure| structure.tables.len()),
        has_tuples = analysis.tuples.is_some(),
        "loaded analysis output"
    );
    Ok(analysis)
}

/// Small two-table schema with sample rows.
pub fn demo_analysis() -> Result<AnalysisOutput, serde_json::Error> {
    serde_json::from_str(DEMO_ANALYSIS)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::{demo_analysis, load_analysis, AnalysisLoadError};

    #[test]
    fn demo_analysis_is_complete() {
        let analysis = demo_analysis().expect("demo analysis parses");
        let structure = analysis.table_structure.expect("structure");
        let tuples = analysis.tuples.expect("tuples");

        assert_eq!(structure.table_names().collect::<Vec<_>>(), vec!["users", "orders"]);
        let user_id = structure
            .table("orders")
            .and_then(|table| table.column("user_id"))
            .expect("user_id column");
        assert_eq!(
            user_id.references.as_ref().map(|reference| reference.table.as_str()),
            Some("users")
        );
        assert_eq!(tuples.rows_for("users").len(), 2);
    }

    #[test]
    fn partial_output_loads_with_missing_parts() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_dir.path().join("analysis.json");
        fs::write(
            &path,
            r#"{ "tableStructure": [ { "tableName": "t", "columns": [ { "name": "id" } ] } ] }"#,
        )
        .expect("failed to write analysis");

        let analysis = load_analysis(&path).expect("analysis loads");
        assert!(analysis.tuples.is_none());
        let structure = analysis.table_structure.expect("structure");
        assert_eq!(structure.tables[0].columns[0].data_type, "TEXT");
    }

    #[test]
    fn load_errors_carry_the_path() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let missing = temp_dir.path().join("missing.json");
        assert!(matches!(
            load_analysis(&missing),
            Err(AnalysisLoadError::Read { path, .. }) if path == missing
        ));

        let broken = temp_dir.path().join("broken.json");
        fs::write(&broken, "{").expect("failed to write analysis");
        assert!(matches!(
            load_analysis(&broken),
            Err(AnalysisLoadError::Parse { .. })
        ));
    }
}

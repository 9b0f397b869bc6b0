use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sqlpane_adapters::analysis::{demo_analysis, load_analysis, AnalysisLoadError};
use sqlpane_adapters::sqlite::SqliteEngineFactory;
use sqlpane_core::config::{default_settings_path, EditorSettings, FileSettingsStore, SettingsError};
use sqlpane_tui::{TuiConfig, TuiError};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

const LOG_FILE_NAME: &str = "sqlpane.log";
const DEMO_QUERY: &str = "SELECT u.name, o.total\nFROM orders o\nJOIN users u ON u.id = o.user_id;";

#[derive(Debug, Error)]
enum AppError {
    #[error("usage: sqlpane [--demo | <analysis.json>]")]
    Usage,
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Analysis(#[from] AnalysisLoadError),
    #[error("failed to parse the bundled demo analysis: {0}")]
    Demo(#[source] serde_json::Error),
    #[error("failed to open log file at {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Tui(#[from] TuiError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AnalysisSource {
    Empty,
    Demo,
    File(PathBuf),
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<AnalysisSource, AppError> {
    let mut source = AnalysisSource::Empty;
    for arg in args {
        if source != AnalysisSource::Empty {
            return Err(AppError::Usage);
        }
        source = match arg.as_str() {
            "--demo" => AnalysisSource::Demo,
            flag if flag.starts_with('-') => return Err(AppError::Usage),
            path => AnalysisSource::File(PathBuf::from(path)),
        };
    }
    Ok(source)
}

fn init_tracing(settings: &EditorSettings, log_path: &Path) -> Result<(), AppError> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).map_err(|source| AppError::LogFile {
            path: log_path.to_path_buf(),
            source,
        })?;
    }
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|source| AppError::LogFile {
            path: log_path.to_path_buf(),
            source,
        })?;

    // RUST_LOG wins over the configured filter.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(true)
        .with_writer(Mutex::new(log_file))
        .try_init();
    Ok(())
}

fn run_app(
    args: impl IntoIterator<Item = String>,
    settings: EditorSettings,
    run_tui: impl FnOnce(TuiConfig) -> Result<(), TuiError>,
) -> Result<(), AppError> {
    let (analysis, initial_sql) = match parse_args(args)? {
        AnalysisSource::Empty => (None, String::new()),
        AnalysisSource::Demo => (
            Some(demo_analysis().map_err(AppError::Demo)?),
            DEMO_QUERY.to_string(),
        ),
        AnalysisSource::File(path) => (Some(load_analysis(path)?), String::new()),
    };

    tracing::info!(
        core = sqlpane_core::domain_name(),
        adapters = sqlpane_adapters::adapter_name(),
        ui = sqlpane_tui::ui_name(),
        has_analysis = analysis.is_some(),
        "starting sqlpane"
    );
    run_tui(TuiConfig {
        settings,
        analysis,
        factory: Box::new(SqliteEngineFactory),
        initial_sql,
    })?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings_path = default_settings_path()?;
    let store = FileSettingsStore::load_from_path(&settings_path)?;
    let log_path = settings_path
        .parent()
        .map_or_else(|| PathBuf::from(LOG_FILE_NAME), |dir| dir.join(LOG_FILE_NAME));
    init_tracing(store.settings(), &log_path)?;

    run_app(
        std::env::args().skip(1),
        store.settings().clone(),
        sqlpane_tui::run,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io;
    use std::path::PathBuf;

    use sqlpane_core::config::EditorSettings;
    use tempfile::TempDir;

    use super::{parse_args, run_app, AnalysisSource, AppError, DEMO_QUERY};

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parses_demo_flag_and_analysis_path() {
        assert_eq!(
            parse_args(args(&[])).expect("no args"),
            AnalysisSource::Empty
        );
        assert_eq!(
            parse_args(args(&["--demo"])).expect("demo"),
            AnalysisSource::Demo
        );
        assert_eq!(
            parse_args(args(&["out/analysis.json"])).expect("path"),
            AnalysisSource::File(PathBuf::from("out/analysis.json"))
        );
        assert!(matches!(
            parse_args(args(&["--verbose"])),
            Err(AppError::Usage)
        ));
        assert!(matches!(
            parse_args(args(&["a.json", "b.json"])),
            Err(AppError::Usage)
        ));
    }

    #[test]
    fn run_app_returns_ok_when_tui_runner_succeeds() {
        let result = run_app(args(&[]), EditorSettings::default(), |config| {
            assert!(config.analysis.is_none());
            assert!(config.initial_sql.is_empty());
            Ok(())
        });
        assert!(result.is_ok());
    }

    #[test]
    fn demo_flag_hands_the_bundled_schema_to_the_tui() {
        let result = run_app(args(&["--demo"]), EditorSettings::default(), |config| {
            let analysis = config.analysis.expect("demo analysis");
            assert!(analysis.table_structure.is_some());
            assert!(analysis.tuples.is_some());
            assert_eq!(config.initial_sql, DEMO_QUERY);
            Ok(())
        });
        assert!(result.is_ok());
    }

    #[test]
    fn analysis_file_is_loaded_before_the_tui_starts() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_dir.path().join("analysis.json");
        fs::write(
            &path,
            r#"{ "tableStructure": [ { "tableName": "t", "columns": [ { "name": "id" } ] } ] }"#,
        )
        .expect("failed to write analysis");

        let result = run_app(
            vec![path.display().to_string()],
            EditorSettings::default(),
            |config| {
                let analysis = config.analysis.expect("analysis");
                assert!(analysis.tuples.is_none());
                Ok(())
            },
        );
        assert!(result.is_ok());

        let missing = temp_dir.path().join("missing.json");
        let result = run_app(
            vec![missing.display().to_string()],
            EditorSettings::default(),
            |_| panic!("tui must not start without the analysis"),
        );
        assert!(matches!(result, Err(AppError::Analysis(_))));
    }

    #[test]
    fn run_app_propagates_tui_errors() {
        let result = run_app(args(&[]), EditorSettings::default(), |_| {
            Err(sqlpane_tui::TuiError::Io(io::Error::other("boom")))
        });
        assert!(matches!(result, Err(AppError::Tui(_))));
    }
}

pub mod commands;
pub mod config;
pub mod content_sync;
pub mod dispatcher;
pub mod editor;
pub mod language;
pub mod providers;
pub mod schema;
pub mod session;

pub use editor::{AnalysisReport, EditorCollaborators, SqlEditor, SqlEditorProps};

#[must_use]
pub fn domain_name() -> &'static str {
    "sqlpane-core"
}

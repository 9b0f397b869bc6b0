use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;
use sqlpane_adapters::analysis::demo_analysis;
use sqlpane_adapters::sqlite::SqliteEngineFactory;
use sqlpane_core::commands::{CommandSurface, Key, KeyChord};
use sqlpane_core::content_sync::SharedEditorText;
use sqlpane_core::dispatcher::{
    EngineFactory, Notification, NotificationLevel, NotificationSink, SharedResultStore,
    MSG_INVALID_SQL,
};
use sqlpane_core::providers::InMemoryLanguageHost;
use sqlpane_core::schema::Row;
use sqlpane_core::session::{EditorOptions, EditorWidget, LiveEditor};
use sqlpane_core::{EditorCollaborators, SqlEditor, SqlEditorProps};

#[derive(Debug)]
struct BufferEditor(Rc<RefCell<String>>);

impl LiveEditor for BufferEditor {
    fn value(&self) -> String {
        self.0.borrow().clone()
    }

    fn set_value(&mut self, text: &str) {
        *self.0.borrow_mut() = text.to_string();
    }
}

#[derive(Debug, Default)]
struct BufferWidget {
    buffer: Rc<RefCell<String>>,
}

impl EditorWidget for BufferWidget {
    fn create(&mut self, _version: u64, text: &str, _options: &EditorOptions) -> Box<dyn LiveEditor> {
        self.buffer = Rc::new(RefCell::new(text.to_string()));
        Box::new(BufferEditor(Rc::clone(&self.buffer)))
    }
}

#[derive(Debug, Clone, Default)]
struct Toasts(Rc<RefCell<Vec<Notification>>>);

impl NotificationSink for Toasts {
    fn notify(&self, notification: Notification) {
        self.0.borrow_mut().push(notification);
    }
}

type Editor =
    SqlEditor<InMemoryLanguageHost, BufferWidget, SharedEditorText, SharedResultStore, Toasts>;

fn type_text(editor: &Editor, sql: &str) {
    *editor.widget().buffer.borrow_mut() = sql.to_string();
}

#[test]
fn factory_builds_engine_from_demo_analysis() {
    let analysis = demo_analysis().expect("demo analysis parses");
    let structure = analysis.table_structure.expect("structure");
    let tuples = analysis.tuples.expect("tuples");

    let engine = SqliteEngineFactory
        .build(&structure, &tuples)
        .expect("engine builds");
    let response = engine
        .execute_query(
            "SELECT u.name, o.total FROM orders o JOIN users u ON u.id = o.user_id ORDER BY o.id",
        )
        .expect("join prepares");

    let rows = response.data.expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], json!("Ada"));
    assert_eq!(rows[0]["total"], json!(42.5));

    let update = engine
        .execute_query("UPDATE users SET email = NULL")
        .expect("update prepares");
    assert!(update.success);
    assert!(update.data.is_none());
    assert_eq!(update.message.as_deref(), Some("2 row(s) affected"));
}

#[test]
fn editor_runs_queries_against_sqlite() {
    let results = SharedResultStore::new();
    let toasts = Toasts::default();
    let executed = Rc::new(RefCell::new(0_usize));
    let executed_count = Rc::clone(&executed);

    let mut editor = SqlEditor::new(
        EditorCollaborators {
            host: InMemoryLanguageHost::new(),
            widget: BufferWidget::default(),
            text: SharedEditorText::default(),
            results: results.clone(),
            notifications: toasts.clone(),
        },
        SqlEditorProps {
            on_execute: Some(Box::new(move |rows: &[Row]| *executed_count.borrow_mut() += rows.len())),
            ..SqlEditorProps::default()
        },
        EditorOptions::default(),
        CommandSurface::default(),
    );
    editor.mount().expect("mount");

    let analysis = demo_analysis().expect("demo analysis parses");
    let report = editor
        .observe_analysis(&analysis, &SqliteEngineFactory)
        .expect("observe analysis");
    assert!(report.engine_rebuilt);
    assert!(report.remounted);

    let completions = editor.host().completions("sql", "SELECT * FROM ord", 17);
    assert!(completions.iter().any(|item| item.label == "orders"));

    type_text(&editor, "SELECT id FROM users ORDER BY id");
    editor
        .handle_shortcut(&KeyChord::ctrl_cmd(Key::Enter))
        .expect("shortcut dispatches");
    assert_eq!(results.rows().len(), 2);
    assert_eq!(*executed.borrow(), 2);
    assert_eq!(editor.text(), "SELECT id FROM users ORDER BY id");

    type_text(&editor, "SELECT FROM WHERE");
    editor.click_run_button().expect("button dispatches");
    assert!(results.is_empty());

    let toasts = toasts.0.borrow();
    assert_eq!(toasts.len(), 2);
    assert_eq!(toasts[0].level, NotificationLevel::Success);
    assert_eq!(toasts[0].message, "2 row(s) returned");
    assert_eq!(toasts[1].level, NotificationLevel::Error);
    assert_eq!(toasts[1].message, MSG_INVALID_SQL);
}

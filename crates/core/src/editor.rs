use std::fmt;
use std::sync::Arc;

use crate::commands::{CommandSurface, KeyChord, SnapshotSource, Trigger};
use crate::content_sync::{ChangeCallback, ContentSynchronizer, EditorTextStore, SyncEffect};
use crate::dispatcher::{
    EngineFactory, ExecuteCallback, ExecutionDispatcher, NotificationSink, QueryEngine,
    QueryOutcome, ResultStore,
};
use crate::providers::{LanguageHost, ProviderRegistry, RefreshReport};
use crate::schema::{AnalysisOutput, SampleTuples, SchemaChange, SchemaSnapshot, SchemaWatcher};
use crate::session::{
    EditorHeight, EditorOptions, EditorWidget, LiveEditor, SessionError, SessionManager,
    SessionState,
};

/// Props passed by the embedding application.
#[derive(Default)]
pub struct SqlEditorProps {
    pub value: Option<String>,
    pub on_change: Option<ChangeCallback>,
    pub on_execute: Option<ExecuteCallback>,
    pub height: EditorHeight,
}

impl fmt::Debug for SqlEditorProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlEditorProps")
            .field("value", &self.value)
            .field("has_on_change", &self.on_change.is_some())
            .field("has_on_execute", &self.on_execute.is_some())
            .field("height", &self.height)
            .finish()
    }
}

/// Concrete collaborators the editor drives.
#[derive(Debug)]
pub struct EditorCollaborators<H, W, S, R, N> {
    pub host: H,
    pub widget: W,
    pub text: S,
    pub results: R,
    pub notifications: N,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisReport {
    pub schema: SchemaChange,
    pub engine_rebuilt: bool,
    pub remounted: bool,
}

pub struct SqlEditor<H, W, S, R, N>
where
    H: LanguageHost,
    W: EditorWidget,
    S: EditorTextStore,
    R: ResultStore,
    N: NotificationSink,
{
    host: H,
    widget: W,
    options: EditorOptions,
    watcher: SchemaWatcher,
    registry: ProviderRegistry,
    session: SessionManager,
    sync: ContentSynchronizer<S>,
    dispatcher: ExecutionDispatcher<R, N>,
    commands: CommandSurface,
    engine: Option<Box<dyn QueryEngine>>,
    tuples: Option<Arc<SampleTuples>>,
    last_refresh: Option<RefreshReport>,
}

impl<H, W, S, R, N> fmt::Debug for SqlEditor<H, W, S, R, N>
where
    H: LanguageHost + fmt::Debug,
    W: EditorWidget,
    S: EditorTextStore + fmt::Debug,
    R: ResultStore + fmt::Debug,
    N: NotificationSink + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlEditor")
            .field("host", &self.host)
            .field("options", &self.options)
            .field("watcher", &self.watcher)
            .field("registry", &self.registry)
            .field("session", &self.session)
            .field("sync", &self.sync)
            .field("dispatcher", &self.dispatcher)
            .field("commands", &self.commands)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl<H, W, S, R, N> SqlEditor<H, W, S, R, N>
where
    H: LanguageHost,
    W: EditorWidget,
    S: EditorTextStore,
    R: ResultStore,
    N: NotificationSink,
{
    /// Builds an unmounted editor. The `value` prop is observed immediately so an
    /// empty initial prop cannot wipe text already held by the store.
    pub fn new(
        collaborators: EditorCollaborators<H, W, S, R, N>,
        props: SqlEditorProps,
        mut options: EditorOptions,
        commands: CommandSurface,
    ) -> Self {
        let EditorCollaborators {
            host,
            widget,
            text,
            results,
            notifications,
        } = collaborators;
        let SqlEditorProps {
            value,
            on_change,
            on_execute,
            height,
        } = props;
        options.height = height;

        let registry = ProviderRegistry::new(
            options.language_id.clone(),
            crate::providers::LanguageConfiguration::sql(),
        );
        let mut sync = ContentSynchronizer::new(text, on_change);
        sync.apply_external(value.as_deref(), None);

        Self {
            host,
            widget,
            options,
            watcher: SchemaWatcher::new(),
            registry,
            session: SessionManager::new(),
            sync,
            dispatcher: ExecutionDispatcher::new(results, notifications, on_execute),
            commands,
            engine: None,
            tuples: None,
            last_refresh: None,
        }
    }

    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    #[must_use]
    pub fn widget(&self) -> &W {
        &self.widget
    }

    #[must_use]
    pub fn options(&self) -> &EditorOptions {
        &self.options
    }

    #[must_use]
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    #[must_use]
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    #[must_use]
    pub fn schema(&self) -> Option<&SchemaSnapshot> {
        self.watcher.current()
    }

    #[must_use]
    pub fn commands(&self) -> &CommandSurface {
        &self.commands
    }

    #[must_use]
    pub fn results(&self) -> &R {
        self.dispatcher.results()
    }

    #[must_use]
    pub fn last_refresh(&self) -> Option<&RefreshReport> {
        self.last_refresh.as_ref()
    }

    #[must_use]
    pub fn text(&self) -> String {
        self.sync.authoritative()
    }

    #[must_use]
    pub fn engine_ready(&self) -> bool {
        self.engine.is_some()
    }

    #[must_use]
    pub fn button_enabled(&self) -> bool {
        self.commands.button_enabled(self.engine_ready())
    }

    /// Installs language services for the current schema, then builds the widget
    /// with the authoritative text.
    pub fn mount(&mut self) -> Result<(), SessionError> {
        let version = self.session.begin_mount()?;
        let report = self.registry.refresh(&mut self.host, self.watcher.current());
        tracing::debug!(
            version,
            generation = report.generation,
            "language services installed before mount"
        );
        self.last_refresh = Some(report);

        let text = self.sync.authoritative();
        self.session
            .finish_mount(&mut self.widget, &text, &self.options)
    }

    /// Controlled `value` prop changed.
    pub fn set_value(&mut self, value: Option<&str>) -> SyncEffect {
        self.sync.apply_external(value, self.session.live_mut())
    }

    /// The live session reported new content.
    pub fn handle_edit(&mut self, value: Option<&str>) -> SyncEffect {
        self.sync.apply_edit(value)
    }

    /// Applies a prop update and a user edit that arrived in the same tick.
    pub fn reconcile(&mut self, value: Option<&str>, edit: Option<&str>) -> (SyncEffect, SyncEffect) {
        self.sync.reconcile(value, edit, self.session.live_mut())
    }

    /// Reacts to new producer output: rebuilds the engine when either part
    /// changed identity and both are present, and remounts when the structure
    /// changed identity.
    pub fn observe_analysis(
        &mut self,
        analysis: &AnalysisOutput,
        factory: &dyn EngineFactory,
    ) -> Result<AnalysisReport, SessionError> {
        let schema = self.watcher.observe(analysis.table_structure.as_ref());
        let tuples_changed = match (&self.tuples, &analysis.tuples) {
            (Some(current), Some(next)) => !Arc::ptr_eq(current, next),
            (None, None) => false,
            _ => true,
        };
        self.tuples.clone_from(&analysis.tuples);

        let mut engine_rebuilt = false;
        let inputs_changed = matches!(schema, SchemaChange::Replaced { .. }) || tuples_changed;
        if let (true, Some(structure), Some(tuples)) =
            (inputs_changed, &analysis.table_structure, &analysis.tuples)
        {
            match factory.build(structure, tuples) {
                Ok(engine) => {
                    self.engine = Some(engine);
                    engine_rebuilt = true;
                    tracing::info!(tables = structure.tables.len(), "query engine rebuilt");
                }
                Err(error) => {
                    tracing::warn!(%error, "failed to build query engine, keeping the previous one");
                }
            }
        }

        let mut remounted = false;
        if matches!(schema, SchemaChange::Replaced { .. })
            && self.session.state() == SessionState::Mounted
        {
            self.session.unmount_for_remount()?;
            self.mount()?;
            remounted = true;
        }

        Ok(AnalysisReport {
            schema,
            engine_rebuilt,
            remounted,
        })
    }

    /// Keyboard path. Returns `None` when the chord is not the run shortcut or
    /// no session is live.
    pub fn handle_shortcut(&mut self, chord: &KeyChord) -> Option<QueryOutcome> {
        if !self.commands.matches_shortcut(chord) {
            return None;
        }
        self.run(Trigger::Shortcut)
    }

    /// Floating button path. A click on a disabled button, or after teardown, is
    /// ignored.
    pub fn click_run_button(&mut self) -> Option<QueryOutcome> {
        if self.session.state() == SessionState::Terminated {
            tracing::debug!("editor torn down, ignoring run button");
            return None;
        }
        if !self.button_enabled() {
            tracing::debug!("run button is disabled, ignoring click");
            return None;
        }
        self.run(Trigger::Button)
    }

    pub fn teardown(&mut self) {
        self.registry.release(&mut self.host);
        self.session.terminate();
        tracing::debug!("editor torn down");
    }

    fn run(&mut self, trigger: Trigger) -> Option<QueryOutcome> {
        let authoritative = self.sync.authoritative();
        let live: Option<&dyn LiveEditor> = self.session.live();
        let snapshot = self.commands.resolve(trigger, live, &authoritative)?;
        if snapshot.source == SnapshotSource::LiveSession {
            self.sync.adopt_snapshot(&snapshot.text);
        }
        Some(self.dispatcher.dispatch(self.engine.as_deref(), &snapshot.text))
    }
}

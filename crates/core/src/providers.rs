use std::collections::HashMap;

use thiserror::Error;

use crate::language::{
    CompletionItem, CompletionProvider, Hover, HoverProvider, SqlCompletionProvider,
    SqlHoverProvider,
};
use crate::schema::SchemaSnapshot;

pub const SQL_LANGUAGE_ID: &str = "sql";

const SQL_WORD_PATTERN: &str =
    r#"(-?\d*\.\d\w*)|([^`~!@#%^&*()\-=+\[{\]}\\|;:'",.<>/?\s]+)"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Completion,
    Hover,
}

/// Ownership token returned by the host for one registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderHandle {
    id: u64,
    kind: ProviderKind,
    language_id: String,
}

impl ProviderHandle {
    #[must_use]
    pub fn new(id: u64, kind: ProviderKind, language_id: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            language_id: language_id.into(),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    #[must_use]
    pub fn language_id(&self) -> &str {
        &self.language_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageConfiguration {
    pub word_pattern: String,
    pub line_comment: String,
    pub block_comment: (String, String),
    pub brackets: Vec<(char, char)>,
    pub auto_closing_pairs: Vec<(char, char)>,
}

impl LanguageConfiguration {
    #[must_use]
    pub fn sql() -> Self {
        Self {
            word_pattern: SQL_WORD_PATTERN.to_string(),
            line_comment: "--".to_string(),
            block_comment: ("/*".to_string(), "*/".to_string()),
            brackets: vec![('{', '}'), ('[', ']'), ('(', ')')],
            auto_closing_pairs: vec![('{', '}'), ('[', ']'), ('(', ')'), ('"', '"'), ('\'', '\'')],
        }
    }

    #[must_use]
    pub fn closing_for(&self, open: char) -> Option<char> {
        self.auto_closing_pairs
            .iter()
            .find(|(candidate, _)| *candidate == open)
            .map(|(_, close)| *close)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("provider #{0} is not registered")]
    UnknownHandle(u64),
    #[error("host rejected the request for `{language_id}`: {reason}")]
    Rejected { language_id: String, reason: String },
}

/// The editor widget's global language-service registry.
pub trait LanguageHost {
    fn register_completion_provider(
        &mut self,
        language_id: &str,
        provider: Box<dyn CompletionProvider>,
    ) -> Result<ProviderHandle, HostError>;

    fn register_hover_provider(
        &mut self,
        language_id: &str,
        provider: Box<dyn HoverProvider>,
    ) -> Result<ProviderHandle, HostError>;

    fn dispose(&mut self, handle: &ProviderHandle) -> Result<(), HostError>;

    /// Drops registrations for `language_id` that are not in `owned`, returning how
    /// many were removed.
    fn purge_unmanaged(
        &mut self,
        language_id: &str,
        owned: &[ProviderHandle],
    ) -> Result<usize, HostError>;

    fn set_language_configuration(
        &mut self,
        language_id: &str,
        configuration: &LanguageConfiguration,
    ) -> Result<(), HostError>;
}

/// Failures swallowed while cycling providers. Never surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderLifecycleFailure {
    #[error("failed to dispose {kind:?} provider #{id}: {source}")]
    Dispose {
        id: u64,
        kind: ProviderKind,
        #[source]
        source: HostError,
    },
    #[error("failed to purge stale providers: {0}")]
    Purge(#[source] HostError),
    #[error("failed to apply language configuration: {0}")]
    Configure(#[source] HostError),
    #[error("failed to register {kind:?} provider: {source}")]
    Register {
        kind: ProviderKind,
        #[source]
        source: HostError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSet {
    generation: u64,
    handles: Vec<ProviderHandle>,
}

impl ProviderSet {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn handles(&self) -> &[ProviderHandle] {
        &self.handles
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub generation: u64,
    pub released: usize,
    pub purged: usize,
    pub failures: Vec<ProviderLifecycleFailure>,
}

#[derive(Debug)]
pub struct ProviderRegistry {
    language_id: String,
    configuration: LanguageConfiguration,
    active: Option<ProviderSet>,
    generation: u64,
    installed_total: usize,
    released_total: usize,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new(language_id: impl Into<String>, configuration: LanguageConfiguration) -> Self {
        Self {
            language_id: language_id.into(),
            configuration,
            active: None,
            generation: 0,
            installed_total: 0,
            released_total: 0,
        }
    }

    #[must_use]
    pub fn sql() -> Self {
        Self::new(SQL_LANGUAGE_ID, LanguageConfiguration::sql())
    }

    #[must_use]
    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    #[must_use]
    pub fn configuration(&self) -> &LanguageConfiguration {
        &self.configuration
    }

    #[must_use]
    pub fn active(&self) -> Option<&ProviderSet> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn installed_total(&self) -> usize {
        self.installed_total
    }

    #[must_use]
    pub fn released_total(&self) -> usize {
        self.released_total
    }

    /// Replaces the active provider set with one bound to `schema`.
    pub fn refresh(
        &mut self,
        host: &mut dyn LanguageHost,
        schema: Option<&SchemaSnapshot>,
    ) -> RefreshReport {
        let mut failures = Vec::new();
        let owned = self
            .active
            .as_ref()
            .map(|set| set.handles.clone())
            .unwrap_or_default();
        let purged = match host.purge_unmanaged(&self.language_id, &owned) {
            Ok(count) => count,
            Err(error) => {
                failures.push(ProviderLifecycleFailure::Purge(error));
                0
            }
        };
        if purged > 0 {
            tracing::debug!(
                language = %self.language_id,
                purged,
                "removed unmanaged provider registrations"
            );
        }
        let released = self.release_active(host, &mut failures);

        if let Err(error) = host.set_language_configuration(&self.language_id, &self.configuration)
        {
            failures.push(ProviderLifecycleFailure::Configure(error));
        }

        let mut handles = Vec::with_capacity(2);
        match host.register_completion_provider(
            &self.language_id,
            Box::new(SqlCompletionProvider::new(schema.cloned())),
        ) {
            Ok(handle) => handles.push(handle),
            Err(source) => failures.push(ProviderLifecycleFailure::Register {
                kind: ProviderKind::Completion,
                source,
            }),
        }
        match host.register_hover_provider(
            &self.language_id,
            Box::new(SqlHoverProvider::new(schema.cloned())),
        ) {
            Ok(handle) => handles.push(handle),
            Err(source) => failures.push(ProviderLifecycleFailure::Register {
                kind: ProviderKind::Hover,
                source,
            }),
        }

        self.generation += 1;
        self.installed_total += handles.len();
        self.active = Some(ProviderSet {
            generation: self.generation,
            handles,
        });

        for failure in &failures {
            tracing::warn!(language = %self.language_id, %failure, "provider lifecycle failure");
        }
        tracing::info!(
            language = %self.language_id,
            generation = self.generation,
            released,
            "language providers refreshed"
        );

        RefreshReport {
            generation: self.generation,
            released,
            purged,
            failures,
        }
    }

    /// Disposes the active set without installing a replacement.
    pub fn release(&mut self, host: &mut dyn LanguageHost) -> Vec<ProviderLifecycleFailure> {
        let mut failures = Vec::new();
        self.release_active(host, &mut failures);
        for failure in &failures {
            tracing::warn!(language = %self.language_id, %failure, "provider lifecycle failure");
        }
        failures
    }

    fn release_active(
        &mut self,
        host: &mut dyn LanguageHost,
        failures: &mut Vec<ProviderLifecycleFailure>,
    ) -> usize {
        let Some(previous) = self.active.take() else {
            return 0;
        };

        for handle in &previous.handles {
            if let Err(source) = host.dispose(handle) {
                failures.push(ProviderLifecycleFailure::Dispose {
                    id: handle.id,
                    kind: handle.kind,
                    source,
                });
            }
        }
        self.released_total += previous.handles.len();
        previous.handles.len()
    }
}

#[derive(Debug)]
struct Registration<P: ?Sized> {
    handle: ProviderHandle,
    provider: Box<P>,
}

/// Host registry that keeps providers in memory and answers queries with the
/// most recent registration for a language.
#[derive(Debug, Default)]
pub struct InMemoryLanguageHost {
    next_id: u64,
    completion: Vec<Registration<dyn CompletionProvider>>,
    hover: Vec<Registration<dyn HoverProvider>>,
    configurations: HashMap<String, LanguageConfiguration>,
}

impl InMemoryLanguageHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn registration_count(&self, language_id: &str, kind: ProviderKind) -> usize {
        match kind {
            ProviderKind::Completion => self
                .completion
                .iter()
                .filter(|entry| entry.handle.language_id == language_id)
                .count(),
            ProviderKind::Hover => self
                .hover
                .iter()
                .filter(|entry| entry.handle.language_id == language_id)
                .count(),
        }
    }

    #[must_use]
    pub fn configuration(&self, language_id: &str) -> Option<&LanguageConfiguration> {
        self.configurations.get(language_id)
    }

    #[must_use]
    pub fn completions(&self, language_id: &str, text: &str, offset: usize) -> Vec<CompletionItem> {
        self.completion
            .iter()
            .rev()
            .find(|entry| entry.handle.language_id == language_id)
            .map(|entry| entry.provider.completions(text, offset))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_completion_trigger(&self, language_id: &str, typed: char) -> bool {
        self.completion
            .iter()
            .rev()
            .find(|entry| entry.handle.language_id == language_id)
            .is_some_and(|entry| entry.provider.is_completion_trigger(typed))
    }

    #[must_use]
    pub fn hover(&self, language_id: &str, text: &str, offset: usize) -> Option<Hover> {
        self.hover
            .iter()
            .rev()
            .find(|entry| entry.handle.language_id == language_id)
            .and_then(|entry| entry.provider.hover(text, offset))
    }

    fn next_handle(&mut self, kind: ProviderKind, language_id: &str) -> ProviderHandle {
        self.next_id += 1;
        ProviderHandle::new(self.next_id, kind, language_id)
    }
}

impl LanguageHost for InMemoryLanguageHost {
    fn register_completion_provider(
        &mut self,
        language_id: &str,
        provider: Box<dyn CompletionProvider>,
    ) -> Result<ProviderHandle, HostError> {
        let handle = self.next_handle(ProviderKind::Completion, language_id);
        self.completion.push(Registration {
            handle: handle.clone(),
            provider,
        });
        Ok(handle)
    }

    fn register_hover_provider(
        &mut self,
        language_id: &str,
        provider: Box<dyn HoverProvider>,
    ) -> Result<ProviderHandle, HostError> {
        let handle = self.next_handle(ProviderKind::Hover, language_id);
        self.hover.push(Registration {
            handle: handle.clone(),
            provider,
        });
        Ok(handle)
    }

    fn dispose(&mut self, handle: &ProviderHandle) -> Result<(), HostError> {
        let before = self.completion.len() + self.hover.len();
        match handle.kind {
            ProviderKind::Completion => self.completion.retain(|entry| entry.handle != *handle),
            ProviderKind::Hover => self.hover.retain(|entry| entry.handle != *handle),
        }
        if self.completion.len() + self.hover.len() == before {
            return Err(HostError::UnknownHandle(handle.id));
        }
        Ok(())
    }

    fn purge_unmanaged(
        &mut self,
        language_id: &str,
        owned: &[ProviderHandle],
    ) -> Result<usize, HostError> {
        let before = self.completion.len() + self.hover.len();
        let keep = |handle: &ProviderHandle| handle.language_id != language_id || owned.contains(handle);
        self.completion.retain(|entry| keep(&entry.handle));
        self.hover.retain(|entry| keep(&entry.handle));
        Ok(before - (self.completion.len() + self.hover.len()))
    }

    fn set_language_configuration(
        &mut self,
        language_id: &str,
        configuration: &LanguageConfiguration,
    ) -> Result<(), HostError> {
        self.configurations
            .insert(language_id.to_string(), configuration.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{
        HostError, InMemoryLanguageHost, LanguageConfiguration, LanguageHost, ProviderHandle,
        ProviderKind, ProviderLifecycleFailure, ProviderRegistry, SQL_LANGUAGE_ID,
    };
    use crate::language::{CompletionProvider, HoverProvider, SqlCompletionProvider, SqlHoverProvider};
    use crate::schema::tests::sample_structure;
    use crate::schema::{ColumnDef, TableDef, TableStructure};

    /// Host whose disposal always fails, to check that failures never block refresh.
    #[derive(Debug, Default)]
    struct StubbornHost {
        inner: InMemoryLanguageHost,
        dispose_calls: usize,
    }

    impl LanguageHost for StubbornHost {
        fn register_completion_provider(
            &mut self,
            language_id: &str,
            provider: Box<dyn CompletionProvider>,
        ) -> Result<ProviderHandle, HostError> {
            self.inner.register_completion_provider(language_id, provider)
        }

        fn register_hover_provider(
            &mut self,
            language_id: &str,
            provider: Box<dyn HoverProvider>,
        ) -> Result<ProviderHandle, HostError> {
            self.inner.register_hover_provider(language_id, provider)
        }

        fn dispose(&mut self, handle: &ProviderHandle) -> Result<(), HostError> {
            self.dispose_calls += 1;
            Err(HostError::Rejected {
                language_id: handle.language_id().to_string(),
                reason: "widget already torn down".to_string(),
            })
        }

        fn purge_unmanaged(
            &mut self,
            language_id: &str,
            _owned: &[ProviderHandle],
        ) -> Result<usize, HostError> {
            Err(HostError::Rejected {
                language_id: language_id.to_string(),
                reason: "registry is private".to_string(),
            })
        }

        fn set_language_configuration(
            &mut self,
            language_id: &str,
            configuration: &LanguageConfiguration,
        ) -> Result<(), HostError> {
            self.inner
                .set_language_configuration(language_id, configuration)
        }
    }

    #[test]
    fn repeated_refreshes_keep_exactly_one_set() {
        let mut host = InMemoryLanguageHost::new();
        let mut registry = ProviderRegistry::sql();

        for round in 1..=5_u64 {
            let schema = Arc::new(sample_structure());
            let report = registry.refresh(&mut host, Some(&schema));
            assert_eq!(report.generation, round);
            assert!(report.failures.is_empty());
            assert_eq!(
                host.registration_count(SQL_LANGUAGE_ID, ProviderKind::Completion),
                1
            );
            assert_eq!(host.registration_count(SQL_LANGUAGE_ID, ProviderKind::Hover), 1);
        }

        let active = registry.active().expect("active set");
        assert_eq!(active.generation(), 5);
        assert_eq!(active.handles().len(), 2);
        assert_eq!(
            registry.released_total(),
            registry.installed_total() - active.handles().len()
        );

        registry.release(&mut host);
        assert_eq!(registry.released_total(), registry.installed_total());
        assert!(registry.active().is_none());
        assert_eq!(host.registration_count(SQL_LANGUAGE_ID, ProviderKind::Hover), 0);
    }

    #[test]
    fn refreshed_providers_follow_the_new_schema() {
        let mut host = InMemoryLanguageHost::new();
        let mut registry = ProviderRegistry::sql();
        registry.refresh(&mut host, Some(&Arc::new(sample_structure())));
        assert_eq!(
            host.completions(SQL_LANGUAGE_ID, "SELECT * FROM ", 14).len(),
            2
        );

        let replacement = Arc::new(TableStructure::new(vec![TableDef::new(
            "invoices",
            vec![ColumnDef::new("number", "TEXT")],
        )]));
        registry.refresh(&mut host, Some(&replacement));
        let labels = host
            .completions(SQL_LANGUAGE_ID, "SELECT * FROM ", 14)
            .into_iter()
            .map(|item| item.label)
            .collect::<Vec<_>>();
        assert_eq!(labels, vec!["invoices"]);
        assert!(host.hover(SQL_LANGUAGE_ID, "invoices", 2).is_some());
        assert_eq!(
            host.configuration(SQL_LANGUAGE_ID)
                .and_then(|configuration| configuration.closing_for('(')),
            Some(')')
        );
    }

    #[test]
    fn unmanaged_registrations_are_purged_before_install() {
        let mut host = InMemoryLanguageHost::new();
        host.register_completion_provider(
            SQL_LANGUAGE_ID,
            Box::new(SqlCompletionProvider::new(None)),
        )
        .expect("stray completion");
        host.register_hover_provider(SQL_LANGUAGE_ID, Box::new(SqlHoverProvider::new(None)))
            .expect("stray hover");
        host.register_hover_provider("pgsql", Box::new(SqlHoverProvider::new(None)))
            .expect("other language");

        let mut registry = ProviderRegistry::sql();
        let report = registry.refresh(&mut host, None);

        assert_eq!(report.purged, 2);
        assert_eq!(host.registration_count(SQL_LANGUAGE_ID, ProviderKind::Completion), 1);
        assert_eq!(host.registration_count("pgsql", ProviderKind::Hover), 1);
    }

    #[test]
    fn purge_keeps_the_registry_handles_for_disposal() {
        let mut host = InMemoryLanguageHost::new();
        let mut registry = ProviderRegistry::sql();
        registry.refresh(&mut host, None);
        host.register_completion_provider(
            SQL_LANGUAGE_ID,
            Box::new(SqlCompletionProvider::new(None)),
        )
        .expect("stray completion");

        let report = registry.refresh(&mut host, None);
        assert_eq!(report.purged, 1);
        assert_eq!(report.released, 2);
        assert!(report.failures.is_empty());
        assert_eq!(host.registration_count(SQL_LANGUAGE_ID, ProviderKind::Completion), 1);
        assert_eq!(host.registration_count(SQL_LANGUAGE_ID, ProviderKind::Hover), 1);
    }

    #[test]
    fn lifecycle_failures_are_reported_not_propagated() {
        let mut host = StubbornHost::default();
        let mut registry = ProviderRegistry::sql();

        let first = registry.refresh(&mut host, None);
        assert!(matches!(
            first.failures.as_slice(),
            [ProviderLifecycleFailure::Purge(_)]
        ));

        let second = registry.refresh(&mut host, None);
        assert_eq!(second.generation, 2);
        assert_eq!(second.released, 2);
        assert_eq!(host.dispose_calls, 2);
        assert_eq!(
            second
                .failures
                .iter()
                .filter(|failure| matches!(failure, ProviderLifecycleFailure::Dispose { .. }))
                .count(),
            2
        );
        assert_eq!(registry.active().map(|set| set.handles().len()), Some(2));
    }

    #[test]
    fn disposing_unknown_handle_fails() {
        let mut host = InMemoryLanguageHost::new();
        let handle = ProviderHandle::new(42, ProviderKind::Hover, SQL_LANGUAGE_ID);
        assert_eq!(host.dispose(&handle), Err(HostError::UnknownHandle(42)));
    }
}

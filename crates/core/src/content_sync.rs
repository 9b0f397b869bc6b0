use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::session::LiveEditor;

/// Shared editor-state store holding the authoritative text.
pub trait EditorTextStore {
    fn get(&self) -> String;

    fn set(&self, text: String);
}

#[derive(Debug, Clone, Default)]
pub struct SharedEditorText(Rc<RefCell<String>>);

impl SharedEditorText {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(Rc::new(RefCell::new(text.into())))
    }
}

impl EditorTextStore for SharedEditorText {
    fn get(&self) -> String {
        self.0.borrow().clone()
    }

    fn set(&self, text: String) {
        *self.0.borrow_mut() = text;
    }
}

pub type ChangeCallback = Box<dyn FnMut(&str)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEffect {
    /// The value became authoritative.
    Adopted,
    /// The value already was authoritative, or the prop did not change.
    Unchanged,
    /// An empty external value was refused because it would wipe existing text.
    Suppressed,
}

/// Reconciles the controlled prop, the shared store and user edits.
///
/// External values are applied before user edits within one tick. An external
/// value is only considered when it differs from the previous external value, so
/// re-passing a stale prop cannot undo later edits.
pub struct ContentSynchronizer<S: EditorTextStore> {
    store: S,
    on_change: Option<ChangeCallback>,
    last_external: Option<String>,
    observed: bool,
}

impl<S: EditorTextStore + fmt::Debug> fmt::Debug for ContentSynchronizer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentSynchronizer")
            .field("store", &self.store)
            .field("has_on_change", &self.on_change.is_some())
            .field("last_external", &self.last_external)
            .finish_non_exhaustive()
    }
}

impl<S: EditorTextStore> ContentSynchronizer<S> {
    #[must_use]
    pub fn new(store: S, on_change: Option<ChangeCallback>) -> Self {
        Self {
            store,
            on_change,
            last_external: None,
            observed: false,
        }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn authoritative(&self) -> String {
        self.store.get()
    }

    pub fn apply_external(
        &mut self,
        value: Option<&str>,
        live: Option<&mut dyn LiveEditor>,
    ) -> SyncEffect {
        // Only the very first observation, made at construction, may be refused.
        let first_observation = !self.observed;
        self.observed = true;
        let Some(value) = value else {
            return SyncEffect::Unchanged;
        };

        if self.last_external.as_deref() == Some(value) {
            return SyncEffect::Unchanged;
        }
        self.last_external = Some(value.to_string());

        let current = self.store.get();
        if value == current {
            return SyncEffect::Unchanged;
        }
        if first_observation && value.is_empty() && !current.is_empty() {
            tracing::debug!("ignoring empty initial value over existing editor text");
            return SyncEffect::Suppressed;
        }

        self.store.set(value.to_string());
        if let Some(live) = live {
            if live.value() != value {
                live.set_value(value);
            }
        }
        tracing::debug!(len = value.len(), "adopted external editor value");
        SyncEffect::Adopted
    }

    pub fn apply_edit(&mut self, value: Option<&str>) -> SyncEffect {
        let Some(value) = value else {
            return SyncEffect::Unchanged;
        };
        if value == self.store.get() {
            return SyncEffect::Unchanged;
        }

        self.store.set(value.to_string());
        if let Some(on_change) = self.on_change.as_mut() {
            on_change(value);
        }
        SyncEffect::Adopted
    }

    /// Applies both writers of one tick, external first.
    pub fn reconcile(
        &mut self,
        external: Option<&str>,
        edit: Option<&str>,
        live: Option<&mut dyn LiveEditor>,
    ) -> (SyncEffect, SyncEffect) {
        let external_effect = self.apply_external(external, live);
        let edit_effect = self.apply_edit(edit);
        (external_effect, edit_effect)
    }

    /// Writes text read straight from the live session back into the store
    /// without notifying the owner.
    pub fn adopt_snapshot(&mut self, text: &str) -> SyncEffect {
        if text == self.store.get() {
            return SyncEffect::Unchanged;
        }
        self.store.set(text.to_string());
        SyncEffect::Adopted
    }
}

use std::fmt;

use thiserror::Error;

/// A mounted editor widget instance.
pub trait LiveEditor: fmt::Debug {
    fn value(&self) -> String;

    fn set_value(&mut self, text: &str);
}

/// Builds widget instances. Each call produces a fresh instance with its own
/// input state; nothing carries over from a previous mount except `text`.
pub trait EditorWidget {
    fn create(&mut self, version: u64, text: &str, options: &EditorOptions) -> Box<dyn LiveEditor>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditorHeight {
    #[default]
    Fill,
    Lines(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorOptions {
    pub language_id: String,
    pub height: EditorHeight,
    pub font_size: u16,
    pub line_numbers: bool,
    pub word_wrap: bool,
    pub minimap: bool,
    pub read_only: bool,
    pub quick_suggestions: bool,
    pub suggest_on_trigger_characters: bool,
    pub hover_enabled: bool,
    pub hover_delay_ms: u64,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            language_id: crate::providers::SQL_LANGUAGE_ID.to_string(),
            height: EditorHeight::Fill,
            font_size: 14,
            line_numbers: true,
            word_wrap: true,
            minimap: false,
            read_only: false,
            quick_suggestions: true,
            suggest_on_trigger_characters: true,
            hover_enabled: true,
            hover_delay_ms: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unmounted,
    Mounting,
    Mounted,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("cannot {action} while the session is {state:?}")]
    InvalidTransition {
        action: &'static str,
        state: SessionState,
    },
}

/// Owns the live widget and the version counter that keys it.
#[derive(Debug)]
pub struct SessionManager {
    state: SessionState,
    version: u64,
    mounts: u64,
    live: Option<Box<dyn LiveEditor>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self {
            state: SessionState::Unmounted,
            version: 0,
            mounts: 0,
            live: None,
        }
    }
}

impl SessionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of widget instances created so far.
    #[must_use]
    pub fn mounts(&self) -> u64 {
        self.mounts
    }

    #[must_use]
    pub fn live(&self) -> Option<&dyn LiveEditor> {
        self.live.as_deref()
    }

    pub fn live_mut(&mut self) -> Option<&mut dyn LiveEditor> {
        match &mut self.live {
            Some(live) => Some(live.as_mut()),
            None => None,
        }
    }

    /// Enters `Mounting`. Language services are installed between this call and
    /// [`SessionManager::finish_mount`].
    pub fn begin_mount(&mut self) -> Result<u64, SessionError> {
        if self.state != SessionState::Unmounted {
            return Err(SessionError::InvalidTransition {
                action: "mount",
                state: self.state,
            });
        }
        self.state = SessionState::Mounting;
        Ok(self.version)
    }

    pub fn finish_mount(
        &mut self,
        widget: &mut dyn EditorWidget,
        text: &str,
        options: &EditorOptions,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::Mounting {
            return Err(SessionError::InvalidTransition {
                action: "finish mounting",
                state: self.state,
            });
        }
        self.live = Some(widget.create(self.version, text, options));
        self.mounts += 1;
        self.state = SessionState::Mounted;
        tracing::debug!(version = self.version, "editor session mounted");
        Ok(())
    }

    /// Drops the live widget and bumps the version so the next mount builds a
    /// new instance.
    pub fn unmount_for_remount(&mut self) -> Result<u64, SessionError> {
        if self.state != SessionState::Mounted {
            return Err(SessionError::InvalidTransition {
                action: "remount",
                state: self.state,
            });
        }
        self.live = None;
        self.version += 1;
        self.state = SessionState::Unmounted;
        tracing::info!(version = self.version, "editor session invalidated for remount");
        Ok(self.version)
    }

    pub fn terminate(&mut self) {
        self.live = None;
        self.state = SessionState::Terminated;
    }
}

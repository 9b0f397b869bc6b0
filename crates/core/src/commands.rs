use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::session::LiveEditor;

pub const DEFAULT_RUN_SHORTCUT: &str = "ctrl+enter";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Enter,
    Char(char),
    F(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers {
    /// Ctrl on Windows/Linux, Command on macOS.
    pub ctrl_cmd: bool,
    pub shift: bool,
    pub alt: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyChord {
    pub modifiers: Modifiers,
    pub key: Key,
}

impl KeyChord {
    #[must_use]
    pub fn new(modifiers: Modifiers, key: Key) -> Self {
        Self { modifiers, key }
    }

    #[must_use]
    pub fn ctrl_cmd(key: Key) -> Self {
        Self {
            modifiers: Modifiers {
                ctrl_cmd: true,
                ..Modifiers::default()
            },
            key,
        }
    }
}

impl Default for KeyChord {
    fn default() -> Self {
        Self::ctrl_cmd(Key::Enter)
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.ctrl_cmd {
            f.write_str("Ctrl+")?;
        }
        if self.modifiers.alt {
            f.write_str("Alt+")?;
        }
        if self.modifiers.shift {
            f.write_str("Shift+")?;
        }
        match self.key {
            Key::Enter => f.write_str("Enter"),
            Key::Char(ch) => write!(f, "{}", ch.to_ascii_uppercase()),
            Key::F(number) => write!(f, "F{number}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShortcutParseError {
    #[error("shortcut is empty")]
    Empty,
    #[error("unknown modifier `{0}`")]
    UnknownModifier(String),
    #[error("unknown key `{0}`")]
    UnknownKey(String),
}

impl FromStr for KeyChord {
    type Err = ShortcutParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parts = raw
            .split('+')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>();
        let Some((key_part, modifier_parts)) = parts.split_last() else {
            return Err(ShortcutParseError::Empty);
        };

        let mut modifiers = Modifiers::default();
        for part in modifier_parts {
            match part.to_ascii_lowercase().as_str() {
                "ctrl" | "control" | "cmd" | "command" | "ctrlcmd" | "meta" => {
                    modifiers.ctrl_cmd = true;
                }
                "shift" => modifiers.shift = true,
                "alt" | "option" => modifiers.alt = true,
                other => return Err(ShortcutParseError::UnknownModifier(other.to_string())),
            }
        }

        let lowered = key_part.to_ascii_lowercase();
        let key = match lowered.as_str() {
            "enter" | "return" => Key::Enter,
            function if function.len() > 1 && function.starts_with('f') => function[1..]
                .parse::<u8>()
                .ok()
                .filter(|number| (1..=12).contains(number))
                .map(Key::F)
                .ok_or_else(|| ShortcutParseError::UnknownKey((*key_part).to_string()))?,
            single if single.chars().count() == 1 => {
                Key::Char(single.chars().next().unwrap_or_default())
            }
            _ => return Err(ShortcutParseError::UnknownKey((*key_part).to_string())),
        };

        Ok(Self { modifiers, key })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Shortcut,
    Button,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    LiveSession,
    Authoritative,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSnapshot {
    pub text: String,
    pub source: SnapshotSource,
}

/// Maps the two run triggers onto a text snapshot for the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct CommandSurface {
    shortcut: KeyChord,
}

impl CommandSurface {
    #[must_use]
    pub fn new(shortcut: KeyChord) -> Self {
        Self { shortcut }
    }

    #[must_use]
    pub fn shortcut(&self) -> KeyChord {
        self.shortcut
    }

    #[must_use]
    pub fn matches_shortcut(&self, chord: &KeyChord) -> bool {
        self.shortcut == *chord
    }

    #[must_use]
    pub fn button_enabled(&self, engine_ready: bool) -> bool {
        engine_ready
    }

    /// Picks the text a trigger runs. The shortcut only exists inside a live
    /// session; the button falls back to the authoritative text.
    #[must_use]
    pub fn resolve(
        &self,
        trigger: Trigger,
        live: Option<&dyn LiveEditor>,
        authoritative: &str,
    ) -> Option<TextSnapshot> {
        match (trigger, live) {
            (_, Some(live)) => Some(TextSnapshot {
                text: live.value(),
                source: SnapshotSource::LiveSession,
            }),
            (Trigger::Button, None) => Some(TextSnapshot {
                text: authoritative.to_string(),
                source: SnapshotSource::Authoritative,
            }),
            (Trigger::Shortcut, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::{
        CommandSurface, Key, KeyChord, Modifiers, ShortcutParseError, SnapshotSource, Trigger,
        DEFAULT_RUN_SHORTCUT,
    };
    use crate::session::tests::FakeLiveEditor;

    #[test]
    fn parses_common_shortcuts() {
        assert_eq!(
            DEFAULT_RUN_SHORTCUT.parse::<KeyChord>(),
            Ok(KeyChord::ctrl_cmd(Key::Enter))
        );
        assert_eq!(
            "Cmd + Return".parse::<KeyChord>(),
            Ok(KeyChord::ctrl_cmd(Key::Enter))
        );
        assert_eq!(
            "f5".parse::<KeyChord>(),
            Ok(KeyChord::new(Modifiers::default(), Key::F(5)))
        );
        assert_eq!(
            "ctrl+shift+r".parse::<KeyChord>().map(|chord| chord.to_string()),
            Ok("Ctrl+Shift+R".to_string())
        );
    }

    #[test]
    fn rejects_malformed_shortcuts() {
        assert_eq!("".parse::<KeyChord>(), Err(ShortcutParseError::Empty));
        assert_eq!(
            "hyper+enter".parse::<KeyChord>(),
            Err(ShortcutParseError::UnknownModifier("hyper".to_string()))
        );
        assert_eq!(
            "ctrl+f99".parse::<KeyChord>(),
            Err(ShortcutParseError::UnknownKey("f99".to_string()))
        );
        assert_eq!(
            "ctrl+space".parse::<KeyChord>(),
            Err(ShortcutParseError::UnknownKey("space".to_string()))
        );
    }

    #[test]
    fn triggers_prefer_the_live_session() {
        let surface = CommandSurface::default();
        let live = FakeLiveEditor {
            text: Rc::new(RefCell::new("SELECT 2".to_string())),
        };

        for trigger in [Trigger::Shortcut, Trigger::Button] {
            let snapshot = surface
                .resolve(trigger, Some(&live), "SELECT 1")
                .expect("live session snapshot");
            assert_eq!(snapshot.text, "SELECT 2");
            assert_eq!(snapshot.source, SnapshotSource::LiveSession);
        }
    }

    #[test]
    fn button_falls_back_without_live_session() {
        let surface = CommandSurface::default();
        let snapshot = surface
            .resolve(Trigger::Button, None, "SELECT 1")
            .expect("button snapshot");
        assert_eq!(snapshot.source, SnapshotSource::Authoritative);
        assert_eq!(snapshot.text, "SELECT 1");
        assert!(surface.resolve(Trigger::Shortcut, None, "SELECT 1").is_none());
    }

    #[test]
    fn button_tracks_engine_availability() {
        let surface = CommandSurface::default();
        assert!(!surface.button_enabled(false));
        assert!(surface.button_enabled(true));
        assert!(surface.matches_shortcut(&KeyChord::ctrl_cmd(Key::Enter)));
        assert!(!surface.matches_shortcut(&KeyChord::ctrl_cmd(Key::Char('r'))));
    }
}

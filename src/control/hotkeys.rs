// SPDX-License-Identifier: GPL-3.0-only

//! Terminal hotkey listener
//!
//! Reads key presses from the controlling terminal in raw mode and turns
//! bound combinations into control events. Bindings map a combination
//! (`t`, `ctrl+t`, `space`, `f2`) to either a plugin name, which toggles
//! that plugin, or `plugin.option=value`, which sets one option.

use super::{ControlEvent, ControlSender, ProducerHandle};
use crate::constants::control::KEY_POLL_MS;
use crate::pipelines::frame_loop::{LoopAction, LoopController};
use crate::plugins::OptionValue;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A key plus its modifiers, normalised for lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyCombo {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub key: Key,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Char(char),
    Function(u8),
    Space,
    Enter,
    Tab,
    Esc,
}

impl KeyCombo {
    /// Parse `"ctrl+shift+t"`-style text; the key is the last `+` segment
    pub fn parse(text: &str) -> Result<Self, String> {
        // A lone space names the space bar
        if text == " " {
            return Ok(Self::plain(Key::Space));
        }
        let lower = text.trim().to_lowercase();
        let mut parts: Vec<&str> = lower.split('+').map(str::trim).collect();
        let key = parts
            .pop()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| format!("empty key in '{text}'"))?;

        let key = parse_key(key).ok_or_else(|| format!("unknown key '{key}' in '{text}'"))?;
        let mut combo = Self::plain(key);
        for modifier in parts {
            match modifier {
                "ctrl" | "control" => combo.ctrl = true,
                "alt" => combo.alt = true,
                "shift" => combo.shift = true,
                other => return Err(format!("unknown modifier '{other}' in '{text}'")),
            }
        }
        Ok(combo)
    }

    const fn plain(key: Key) -> Self {
        Self {
            ctrl: false,
            alt: false,
            shift: false,
            key,
        }
    }

    /// Build from a terminal key event; `None` for keys we never bind
    pub fn from_event(event: &KeyEvent) -> Option<Self> {
        let key = match event.code {
            KeyCode::Char(' ') => Key::Space,
            KeyCode::Char(c) => Key::Char(c.to_ascii_lowercase()),
            KeyCode::F(n) => Key::Function(n),
            KeyCode::Enter => Key::Enter,
            KeyCode::Tab => Key::Tab,
            KeyCode::Esc => Key::Esc,
            _ => return None,
        };
        Some(Self {
            ctrl: event.modifiers.contains(KeyModifiers::CONTROL),
            alt: event.modifiers.contains(KeyModifiers::ALT),
            // Shift is already folded into uppercase characters
            shift: event.modifiers.contains(KeyModifiers::SHIFT) && !matches!(key, Key::Char(_)),
            key,
        })
    }
}

fn parse_key(key: &str) -> Option<Key> {
    match key {
        "space" => Some(Key::Space),
        "enter" | "return" => Some(Key::Enter),
        "tab" => Some(Key::Tab),
        "esc" | "escape" => Some(Key::Esc),
        _ => {
            let mut chars = key.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(Key::Char(c)),
                (Some('f'), Some(_)) => key[1..]
                    .parse()
                    .ok()
                    .filter(|n| (1..=24).contains(n))
                    .map(Key::Function),
                _ => None,
            }
        }
    }
}

/// What a bound key does
#[derive(Debug, Clone, PartialEq)]
pub enum HotkeyAction {
    TogglePlugin(String),
    SetOption {
        plugin: String,
        key: String,
        value: OptionValue,
    },
    TogglePause,
    Quit,
}

impl HotkeyAction {
    /// `"clock"` toggles a plugin, `"tlp.level=RED"` sets an option
    pub fn parse(target: &str) -> Result<Self, String> {
        let target = target.trim();
        if target.is_empty() {
            return Err("empty hotkey target".to_string());
        }
        let Some((path, value)) = target.split_once('=') else {
            return Ok(HotkeyAction::TogglePlugin(target.to_string()));
        };
        let (plugin, key) = path
            .split_once('.')
            .filter(|(p, k)| !p.is_empty() && !k.is_empty())
            .ok_or_else(|| format!("expected plugin.option=value, got '{target}'"))?;
        Ok(HotkeyAction::SetOption {
            plugin: plugin.to_string(),
            key: key.to_string(),
            value: OptionValue::parse(value),
        })
    }

    fn into_event(self) -> ControlEvent {
        match self {
            HotkeyAction::TogglePlugin(name) => ControlEvent::TogglePlugin { name, enabled: None },
            HotkeyAction::SetOption { plugin, key, value } => ControlEvent::SetOption {
                name: plugin,
                key,
                value,
            },
            HotkeyAction::TogglePause => ControlEvent::TogglePause,
            HotkeyAction::Quit => ControlEvent::Shutdown,
        }
    }
}

/// Resolved key bindings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Keymap {
    bindings: BTreeMap<KeyCombo, HotkeyAction>,
}

impl Keymap {
    /// Build from the `hotkeys` (combo -> target) and `shortcuts`
    /// (`quit`/`pause` -> combo) config tables
    ///
    /// Bad entries are logged and skipped; the rest of the map still works.
    pub fn from_config(
        hotkeys: &BTreeMap<String, String>,
        shortcuts: &BTreeMap<String, String>,
    ) -> Self {
        let mut keymap = Self::default();

        for (action, combo) in shortcuts {
            let action = match action.as_str() {
                "quit" => HotkeyAction::Quit,
                "pause" => HotkeyAction::TogglePause,
                other => {
                    debug!(shortcut = other, "Ignoring unsupported shortcut");
                    continue;
                }
            };
            keymap.bind_text(combo, action);
        }

        for (combo, target) in hotkeys {
            match HotkeyAction::parse(target) {
                Ok(action) => keymap.bind_text(combo, action),
                Err(e) => warn!(combo = %combo, error = %e, "Ignoring hotkey"),
            }
        }
        keymap
    }

    fn bind_text(&mut self, combo: &str, action: HotkeyAction) {
        match KeyCombo::parse(combo) {
            Ok(parsed) => {
                if let Some(previous) = self.bindings.insert(parsed, action) {
                    warn!(
                        combo = %combo,
                        ?previous,
                        "Hotkey bound twice, keeping the later binding"
                    );
                }
            }
            Err(e) => warn!(combo = %combo, error = %e, "Ignoring hotkey"),
        }
    }

    pub fn bind(&mut self, combo: KeyCombo, action: HotkeyAction) {
        self.bindings.insert(combo, action);
    }

    pub fn lookup(&self, combo: &KeyCombo) -> Option<&HotkeyAction> {
        self.bindings.get(combo)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Control event for a key event, if it is bound
    ///
    /// Ctrl+C always quits: raw mode swallows the terminal's SIGINT.
    pub fn dispatch(&self, event: &KeyEvent) -> Option<ControlEvent> {
        if event.kind != KeyEventKind::Press {
            return None;
        }
        if event.code == KeyCode::Char('c') && event.modifiers.contains(KeyModifiers::CONTROL) {
            return Some(ControlEvent::Shutdown);
        }
        let combo = KeyCombo::from_event(event)?;
        self.lookup(&combo).cloned().map(HotkeyAction::into_event)
    }
}

/// Start the listener on its own thread
///
/// Returns `None` when stdin is not a terminal (raw mode cannot be
/// enabled); the pipeline then runs without hotkeys.
pub fn spawn(keymap: Keymap, sender: ControlSender) -> Option<ProducerHandle> {
    if keymap.is_empty() {
        debug!("No hotkeys configured");
        return None;
    }
    if let Err(e) = enable_raw_mode() {
        warn!(error = %e, "Terminal unavailable, hotkeys disabled");
        return None;
    }
    info!(bindings = keymap.len(), "Hotkey listener started");

    let poll = Duration::from_millis(KEY_POLL_MS);
    let controller = LoopController::start_with_state(
        "hotkeys",
        (keymap, sender),
        move |(keymap, sender)| {
            let event = match event::poll(poll) {
                Ok(true) => event::read(),
                Ok(false) => return LoopAction::Continue,
                Err(e) => Err(e),
            };
            let key = match event {
                Ok(Event::Key(key)) => key,
                Ok(_) => return LoopAction::Continue,
                Err(e) => {
                    warn!(error = %e, "Failed to read terminal input, stopping hotkeys");
                    return LoopAction::Stop;
                }
            };
            let Some(control) = keymap.dispatch(&key) else {
                return LoopAction::Continue;
            };
            debug!(kind = control.kind(), "Hotkey pressed");
            let quit = control == ControlEvent::Shutdown;
            if sender.blocking_send(control).is_err() || quit {
                return LoopAction::Stop;
            }
            LoopAction::Continue
        },
        |_| {
            if let Err(e) = disable_raw_mode() {
                warn!(error = %e, "Failed to restore terminal mode");
            }
        },
    );
    Some(ProducerHandle::thread(controller))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn test_parse_combos() {
        assert_eq!(KeyCombo::parse("t").unwrap(), KeyCombo::plain(Key::Char('t')));
        let ctrl_t = KeyCombo::parse("Ctrl+T").unwrap();
        assert!(ctrl_t.ctrl && !ctrl_t.alt);
        assert_eq!(ctrl_t.key, Key::Char('t'));
        assert_eq!(KeyCombo::parse("space").unwrap().key, Key::Space);
        assert_eq!(KeyCombo::parse(" ").unwrap().key, Key::Space);
        assert_eq!(KeyCombo::parse("f5").unwrap().key, Key::Function(5));
        assert!(KeyCombo::parse("hyper+t").is_err());
        assert!(KeyCombo::parse("ctrl+").is_err());
        assert!(KeyCombo::parse("banana").is_err());
    }

    #[test]
    fn test_parse_actions() {
        assert_eq!(
            HotkeyAction::parse("clock").unwrap(),
            HotkeyAction::TogglePlugin("clock".into())
        );
        assert_eq!(
            HotkeyAction::parse("tlp.level=RED").unwrap(),
            HotkeyAction::SetOption {
                plugin: "tlp".into(),
                key: "level".into(),
                value: OptionValue::Text("RED".into()),
            }
        );
        assert!(HotkeyAction::parse("=RED").is_err());
    }

    #[test]
    fn test_dispatch() {
        let hotkeys = BTreeMap::from([
            ("ctrl+t".to_string(), "live".to_string()),
            ("r".to_string(), "tlp.level=RED".to_string()),
        ]);
        let shortcuts = BTreeMap::from([
            ("quit".to_string(), "q".to_string()),
            ("pause".to_string(), " ".to_string()),
        ]);
        let keymap = Keymap::from_config(&hotkeys, &shortcuts);
        assert_eq!(keymap.len(), 4);

        assert_eq!(
            keymap.dispatch(&press(KeyCode::Char('t'), KeyModifiers::CONTROL)),
            Some(ControlEvent::toggle("live"))
        );
        assert_eq!(keymap.dispatch(&press(KeyCode::Char('t'), KeyModifiers::NONE)), None);
        assert_eq!(
            keymap.dispatch(&press(KeyCode::Char(' '), KeyModifiers::NONE)),
            Some(ControlEvent::TogglePause)
        );
        assert_eq!(
            keymap.dispatch(&press(KeyCode::Char('q'), KeyModifiers::NONE)),
            Some(ControlEvent::Shutdown)
        );
        assert_eq!(
            keymap.dispatch(&press(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(ControlEvent::Shutdown)
        );
        assert!(matches!(
            keymap.dispatch(&press(KeyCode::Char('R'), KeyModifiers::SHIFT)),
            Some(ControlEvent::SetOption { .. })
        ));
    }

    #[test]
    fn test_release_events_ignored() {
        let hotkeys = BTreeMap::from([("t".to_string(), "live".to_string())]);
        let keymap = Keymap::from_config(&hotkeys, &BTreeMap::new());
        let mut release = press(KeyCode::Char('t'), KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;
        assert_eq!(keymap.dispatch(&release), None);
    }
}

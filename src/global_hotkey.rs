//! System-wide start/stop/bind hotkeys.
//!
//! The `global-hotkey` crate invokes its event handler on its own thread.
//! The handler here does nothing but forward the pressed hotkey's id through
//! an unbounded channel; the controller resolves the id with
//! [`HotkeyListener::action_for`] on its own thread.

use global_hotkey::hotkey::{Code, HotKey, Modifiers};
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{info, trace, warn};

use crate::config::HotkeyBindings;
use crate::error::{AutoKeyError, Result};
use crate::keys::format_key_text;

/// What a hotkey asks the controller to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    Start,
    Stop,
    /// Bind the foreground window as the background target.
    Bind,
}

pub struct HotkeyListener {
    manager: GlobalHotKeyManager,
    registered: Vec<(HotKey, HotkeyAction)>,
}

impl HotkeyListener {
    /// Create the listener and the channel its triggers arrive on.
    pub fn new() -> Result<(Self, UnboundedReceiver<u32>)> {
        let manager = GlobalHotKeyManager::new()
            .map_err(|e| AutoKeyError::hotkey(format!("failed to create hotkey manager: {e}")))?;

        let (tx, rx) = unbounded_channel();
        GlobalHotKeyEvent::set_event_handler(Some(move |event: GlobalHotKeyEvent| {
            if event.state == HotKeyState::Pressed && tx.send(event.id).is_err() {
                trace!(id = event.id, "Hotkey receiver dropped");
            }
        }));

        Ok((
            Self {
                manager,
                registered: Vec::new(),
            },
            rx,
        ))
    }

    /// Replace the current bindings.
    ///
    /// Bindings are parsed and checked for conflicts first; nothing is torn
    /// down if that fails. Otherwise every old hotkey is unregistered before
    /// any new one is installed. Hotkeys the OS refuses (typically already
    /// claimed by another program) are reported in the error while the rest
    /// stay active.
    pub fn register(&mut self, bindings: &HotkeyBindings) -> Result<()> {
        let planned = resolve_bindings(bindings)?;
        self.unregister_all();

        let mut failures = Vec::new();
        for (action, key, hotkey) in planned {
            match self.manager.register(hotkey) {
                Ok(()) => {
                    info!(?action, key = %format_key_text(key), "Registered hotkey");
                    self.registered.push((hotkey, action));
                }
                Err(e) => {
                    warn!(?action, %key, error = %e, "Failed to register hotkey");
                    failures.push(format!("{action:?} '{key}': {e}"));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AutoKeyError::hotkey(failures.join("; ")))
        }
    }

    pub fn unregister_all(&mut self) {
        for (hotkey, action) in self.registered.drain(..) {
            if let Err(e) = self.manager.unregister(hotkey) {
                warn!(?action, error = %e, "Failed to unregister hotkey");
            }
        }
    }

    /// Map a trigger id received from the channel to its action.
    pub fn action_for(&self, id: u32) -> Option<HotkeyAction> {
        self.registered
            .iter()
            .find(|(hotkey, _)| hotkey.id() == id)
            .map(|(_, action)| *action)
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.unregister_all();
        GlobalHotKeyEvent::set_event_handler(None::<fn(GlobalHotKeyEvent)>);
    }
}

/// Parse all three bindings and reject any two that map to the same hotkey.
pub fn resolve_bindings(
    bindings: &HotkeyBindings,
) -> Result<Vec<(HotkeyAction, &str, HotKey)>> {
    bindings.check()?;

    let actions = [HotkeyAction::Start, HotkeyAction::Stop, HotkeyAction::Bind];
    let mut planned: Vec<(HotkeyAction, &str, HotKey)> = Vec::with_capacity(3);
    for (action, (name, key)) in actions.into_iter().zip(bindings.entries()) {
        let hotkey = parse_hotkey(key)?;
        if let Some((other, other_key, _)) = planned.iter().find(|(_, _, h)| h.id() == hotkey.id())
        {
            return Err(AutoKeyError::HotkeyConflict {
                first: format!("{other:?}").to_lowercase(),
                second: name.to_string(),
                combo: format!("{other_key} / {key}"),
            });
        }
        planned.push((action, key, hotkey));
    }
    Ok(planned)
}

/// Parse a key name such as `"ctrl+alt+r"` or `"f9"` into a hotkey.
pub fn parse_hotkey(hotkey_str: &str) -> Result<HotKey> {
    let binding = hotkey_str.to_lowercase();
    let parts: Vec<&str> = binding
        .split('+')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    if parts.is_empty() {
        return Err(AutoKeyError::invalid_key_combination(
            hotkey_str,
            "empty hotkey",
        ));
    }

    let mut modifiers = Modifiers::empty();
    let mut key_code = None;

    for part in &parts {
        match *part {
            "ctrl" | "control" => modifiers |= Modifiers::CONTROL,
            "alt" => modifiers |= Modifiers::ALT,
            "shift" => modifiers |= Modifiers::SHIFT,
            "win" | "windows" | "meta" | "super" => modifiers |= Modifiers::SUPER,
            key => {
                if key_code.is_some() {
                    return Err(AutoKeyError::invalid_key_combination(
                        hotkey_str,
                        "more than one non-modifier key",
                    ));
                }
                key_code = Some(parse_key_code(key).ok_or_else(|| {
                    AutoKeyError::invalid_key(key, "not usable as a hotkey")
                })?);
            }
        }
    }

    let code = key_code.ok_or_else(|| {
        AutoKeyError::invalid_key_combination(hotkey_str, "no key besides modifiers")
    })?;
    let modifiers = (!modifiers.is_empty()).then_some(modifiers);
    Ok(HotKey::new(modifiers, code))
}

fn parse_key_code(key: &str) -> Option<Code> {
    let code = match key {
        // Letters
        "a" => Code::KeyA,
        "b" => Code::KeyB,
        "c" => Code::KeyC,
        "d" => Code::KeyD,
        "e" => Code::KeyE,
        "f" => Code::KeyF,
        "g" => Code::KeyG,
        "h" => Code::KeyH,
        "i" => Code::KeyI,
        "j" => Code::KeyJ,
        "k" => Code::KeyK,
        "l" => Code::KeyL,
        "m" => Code::KeyM,
        "n" => Code::KeyN,
        "o" => Code::KeyO,
        "p" => Code::KeyP,
        "q" => Code::KeyQ,
        "r" => Code::KeyR,
        "s" => Code::KeyS,
        "t" => Code::KeyT,
        "u" => Code::KeyU,
        "v" => Code::KeyV,
        "w" => Code::KeyW,
        "x" => Code::KeyX,
        "y" => Code::KeyY,
        "z" => Code::KeyZ,

        // Numbers
        "0" => Code::Digit0,
        "1" => Code::Digit1,
        "2" => Code::Digit2,
        "3" => Code::Digit3,
        "4" => Code::Digit4,
        "5" => Code::Digit5,
        "6" => Code::Digit6,
        "7" => Code::Digit7,
        "8" => Code::Digit8,
        "9" => Code::Digit9,

        // Function keys
        "f1" => Code::F1,
        "f2" => Code::F2,
        "f3" => Code::F3,
        "f4" => Code::F4,
        "f5" => Code::F5,
        "f6" => Code::F6,
        "f7" => Code::F7,
        "f8" => Code::F8,
        "f9" => Code::F9,
        "f10" => Code::F10,
        "f11" => Code::F11,
        "f12" => Code::F12,

        // Special keys
        "space" => Code::Space,
        "enter" | "return" => Code::Enter,
        "tab" => Code::Tab,
        "escape" | "esc" => Code::Escape,
        "backspace" => Code::Backspace,
        "delete" | "del" => Code::Delete,
        "insert" | "ins" => Code::Insert,
        "home" => Code::Home,
        "end" => Code::End,
        "pageup" | "pgup" => Code::PageUp,
        "pagedown" | "pgdn" => Code::PageDown,
        "pause" => Code::Pause,

        // Arrow keys
        "up" | "arrowup" => Code::ArrowUp,
        "down" | "arrowdown" => Code::ArrowDown,
        "left" | "arrowleft" => Code::ArrowLeft,
        "right" | "arrowright" => Code::ArrowRight,

        _ => return None,
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_modified() {
        assert_eq!(parse_hotkey("f9").unwrap(), HotKey::new(None, Code::F9));
        assert_eq!(
            parse_hotkey("Ctrl + Alt + R").unwrap(),
            HotKey::new(Some(Modifiers::CONTROL | Modifiers::ALT), Code::KeyR)
        );
    }

    #[test]
    fn test_parse_rejects_bad_hotkeys() {
        assert!(parse_hotkey("").is_err());
        assert!(parse_hotkey("ctrl+shift").is_err());
        assert!(parse_hotkey("a+b").is_err());
        assert!(parse_hotkey("ctrl+nosuchkey").is_err());
    }

    #[test]
    fn test_resolve_default_bindings() {
        let bindings = HotkeyBindings::default();
        let planned = resolve_bindings(&bindings).unwrap();
        let actions: Vec<HotkeyAction> = planned.iter().map(|(a, _, _)| *a).collect();
        assert_eq!(
            actions,
            vec![HotkeyAction::Start, HotkeyAction::Stop, HotkeyAction::Bind]
        );
        assert_eq!(planned[0].2, HotKey::new(None, Code::F9));
    }

    #[test]
    fn test_conflicting_bindings_rejected() {
        let bindings = HotkeyBindings {
            start: "ctrl+a".to_string(),
            stop: "a+ctrl".to_string(),
            bind: "f11".to_string(),
        };
        let err = resolve_bindings(&bindings).unwrap_err();
        assert!(matches!(err, AutoKeyError::HotkeyConflict { .. }));
    }
}

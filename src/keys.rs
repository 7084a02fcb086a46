//! Key name resolution and display formatting.
//!
//! Key names are stored in canonical form: lower-case, no whitespace, with
//! modifiers joined by `+` (`"ctrl+shift+a"`). Resolution maps every token
//! of a canonical name to a Windows virtual key code. The table is plain data
//! so resolution behaves the same on every platform; only the backends that
//! inject the codes are OS specific.

use tracing::warn;

use crate::error::{AutoKeyError, Result};

/// OS-level numeric key identifier (Windows virtual key code).
pub type KeyCode = u16;

/// Virtual key codes used by the resolver.
pub mod vk {
    use super::KeyCode;

    pub const BACK: KeyCode = 0x08;
    pub const TAB: KeyCode = 0x09;
    pub const RETURN: KeyCode = 0x0D;
    pub const SHIFT: KeyCode = 0x10;
    pub const CONTROL: KeyCode = 0x11;
    pub const MENU: KeyCode = 0x12;
    pub const PAUSE: KeyCode = 0x13;
    pub const CAPITAL: KeyCode = 0x14;
    pub const ESCAPE: KeyCode = 0x1B;
    pub const SPACE: KeyCode = 0x20;
    pub const PRIOR: KeyCode = 0x21;
    pub const NEXT: KeyCode = 0x22;
    pub const END: KeyCode = 0x23;
    pub const HOME: KeyCode = 0x24;
    pub const LEFT: KeyCode = 0x25;
    pub const UP: KeyCode = 0x26;
    pub const RIGHT: KeyCode = 0x27;
    pub const DOWN: KeyCode = 0x28;
    pub const SNAPSHOT: KeyCode = 0x2C;
    pub const INSERT: KeyCode = 0x2D;
    pub const DELETE: KeyCode = 0x2E;
    pub const LWIN: KeyCode = 0x5B;
    pub const F1: KeyCode = 0x70;
}

/// What to do with a token that has no table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolvePolicy {
    /// Drop the token with a warning and send the rest.
    #[default]
    Lenient,
    /// Fail the whole key.
    Strict,
}

impl ResolvePolicy {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            Self::Strict
        } else {
            Self::Lenient
        }
    }
}

/// Canonical form of a key name: lower-case with all whitespace removed.
///
/// ```
/// assert_eq!(autokey::keys::canonical_key("Ctrl + A"), "ctrl+a");
/// ```
pub fn canonical_key(key: &str) -> String {
    key.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Split a key name into its canonical `+`-separated tokens.
pub fn key_tokens(key: &str) -> Vec<String> {
    canonical_key(key)
        .split('+')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Human-readable form of a key name: `"ctrl+a"` becomes `"Ctrl + A"`.
pub fn format_key_text(key: &str) -> String {
    key_tokens(key)
        .iter()
        .map(|t| capitalize(t))
        .collect::<Vec<_>>()
        .join(" + ")
}

fn capitalize(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Resolve one canonical token to a key code.
///
/// Unmapped single characters fall back to the code point of their
/// upper-case form. Unmapped multi-character tokens are unresolved.
pub fn resolve_token(token: &str) -> Option<KeyCode> {
    let code = match token {
        "ctrl" | "control" => vk::CONTROL,
        "shift" => vk::SHIFT,
        "alt" => vk::MENU,
        "win" | "windows" | "super" | "meta" => vk::LWIN,

        "enter" | "return" => vk::RETURN,
        "space" => vk::SPACE,
        "tab" => vk::TAB,
        "backspace" => vk::BACK,
        "esc" | "escape" => vk::ESCAPE,
        "delete" | "del" => vk::DELETE,
        "insert" | "ins" => vk::INSERT,
        "home" => vk::HOME,
        "end" => vk::END,
        "pageup" | "pgup" => vk::PRIOR,
        "pagedown" | "pgdn" => vk::NEXT,
        "pause" => vk::PAUSE,
        "capslock" => vk::CAPITAL,
        "printscreen" => vk::SNAPSHOT,

        "up" | "arrowup" => vk::UP,
        "down" | "arrowdown" => vk::DOWN,
        "left" | "arrowleft" => vk::LEFT,
        "right" | "arrowright" => vk::RIGHT,

        _ => return function_key(token).or_else(|| single_char(token)),
    };
    Some(code)
}

fn function_key(token: &str) -> Option<KeyCode> {
    let n: KeyCode = token.strip_prefix('f')?.parse().ok()?;
    (1..=24).contains(&n).then(|| vk::F1 + n - 1)
}

fn single_char(token: &str) -> Option<KeyCode> {
    let mut chars = token.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    let mut upper = c.to_uppercase();
    let u = match (upper.next(), upper.next()) {
        (Some(u), None) => u,
        _ => c,
    };
    KeyCode::try_from(u32::from(u)).ok()
}

/// True for the codes that act as modifiers in a combination.
pub fn is_modifier(code: KeyCode) -> bool {
    matches!(code, vk::CONTROL | vk::SHIFT | vk::MENU | vk::LWIN)
}

/// Resolve a (possibly compound) key name to its key codes, in order.
///
/// Under [`ResolvePolicy::Lenient`] unresolved tokens are dropped with a
/// warning; under [`ResolvePolicy::Strict`] they fail the key. A key that
/// resolves to nothing is always an error.
pub fn resolve_key(key: &str, policy: ResolvePolicy) -> Result<Vec<KeyCode>> {
    let tokens = key_tokens(key);
    if tokens.is_empty() {
        return Err(AutoKeyError::invalid_key(key, "empty key"));
    }

    let mut codes = Vec::with_capacity(tokens.len());
    for token in &tokens {
        match resolve_token(token) {
            Some(code) => codes.push(code),
            None => match policy {
                ResolvePolicy::Strict => {
                    return Err(AutoKeyError::invalid_key_combination(
                        key,
                        format!("unknown key '{token}'"),
                    ));
                }
                ResolvePolicy::Lenient => {
                    warn!(%key, %token, "Dropping unknown key token");
                }
            },
        }
    }

    if codes.is_empty() {
        return Err(AutoKeyError::invalid_key(key, "no resolvable key"));
    }
    Ok(codes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_and_format() {
        assert_eq!(canonical_key(" Ctrl + Shift + A "), "ctrl+shift+a");
        assert_eq!(format_key_text("ctrl+a"), "Ctrl + A");
        assert_eq!(format_key_text("esc"), "Esc");
        assert_eq!(format_key_text(""), "");
    }

    #[test]
    fn test_format_is_idempotent() {
        for key in ["ctrl+a", "f9", "ctrl+shift+esc", "space", "alt+f4"] {
            let once = format_key_text(key);
            let twice = format_key_text(&canonical_key(&once));
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_resolve_table() {
        assert_eq!(resolve_token("a"), Some(0x41));
        assert_eq!(resolve_token("z"), Some(0x5A));
        assert_eq!(resolve_token("0"), Some(0x30));
        assert_eq!(resolve_token("enter"), Some(vk::RETURN));
        assert_eq!(resolve_token("f1"), Some(0x70));
        assert_eq!(resolve_token("f12"), Some(0x7B));
        assert_eq!(resolve_token("f25"), None);
        assert_eq!(resolve_token("ctrl"), Some(vk::CONTROL));
    }

    #[test]
    fn test_single_char_fallback() {
        assert_eq!(resolve_token(";"), Some(0x3B));
        assert_eq!(resolve_token("é"), Some(0xC9));
        assert_eq!(resolve_token("nosuchkey"), None);
    }

    #[test]
    fn test_resolve_combo_order() {
        let codes = resolve_key("ctrl+shift+a", ResolvePolicy::Lenient).unwrap();
        assert_eq!(codes, vec![vk::CONTROL, vk::SHIFT, 0x41]);
        assert!(is_modifier(codes[0]));
        assert!(!is_modifier(codes[2]));
    }

    #[test]
    fn test_lenient_drops_unknown_tokens() {
        let codes = resolve_key("ctrl+bogus+a", ResolvePolicy::Lenient).unwrap();
        assert_eq!(codes, vec![vk::CONTROL, 0x41]);
    }

    #[test]
    fn test_strict_rejects_unknown_tokens() {
        let err = resolve_key("ctrl+bogus+a", ResolvePolicy::Strict).unwrap_err();
        assert!(matches!(err, AutoKeyError::InvalidKeyCombination { .. }));
    }

    #[test]
    fn test_nothing_resolvable_is_error() {
        assert!(resolve_key("bogus", ResolvePolicy::Lenient).is_err());
        assert!(resolve_key("", ResolvePolicy::Lenient).is_err());
        assert!(resolve_key(" + ", ResolvePolicy::Lenient).is_err());
    }
}

//! Configuration model and JSON persistence.
//!
//! The file on disk is a flat, human-editable JSON object:
//!
//! ```json
//! {
//!   "start": "f9",
//!   "stop": "f10",
//!   "bind": "f11",
//!   "loop": 1,
//!   "actions": [{ "key": "a", "delay": 500 }],
//!   "mode": "keyboard",
//!   "mouse_cps": 5,
//!   "minimize_to_tray": false
//! }
//! ```
//!
//! Every field is optional when loading and falls back to its default.
//! [`PlaybackConfig`] is the frozen snapshot handed to the executor when a
//! run starts.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AutoKeyError, Result};
use crate::input::WindowHandle;
use crate::keys::{canonical_key, key_tokens, ResolvePolicy};

/// File used when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "default_config.json";

/// Highest click rate the mouse mode accepts.
pub const MAX_CLICKS_PER_SECOND: u32 = 100;

/// Playback mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Keyboard,
    Mouse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClickStyle {
    #[default]
    #[serde(alias = "click")]
    Single,
    Double,
}

/// One step of a keyboard sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Key name, e.g. `"a"` or `"ctrl+s"`.
    pub key: String,
    /// Pause after sending the key, in milliseconds.
    #[serde(default = "default_delay")]
    pub delay: u64,
}

impl Action {
    /// Create an action with the key stored in canonical form.
    pub fn new(key: &str, delay: u64) -> Self {
        Self {
            key: canonical_key(key),
            delay,
        }
    }
}

/// The three global hotkeys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotkeyBindings {
    #[serde(default = "default_start_key")]
    pub start: String,
    #[serde(default = "default_stop_key")]
    pub stop: String,
    #[serde(default = "default_bind_key")]
    pub bind: String,
}

impl Default for HotkeyBindings {
    fn default() -> Self {
        Self {
            start: default_start_key(),
            stop: default_stop_key(),
            bind: default_bind_key(),
        }
    }
}

impl HotkeyBindings {
    /// Bindings as `(name, key)` pairs.
    pub fn entries(&self) -> [(&'static str, &str); 3] {
        [
            ("start", self.start.as_str()),
            ("stop", self.stop.as_str()),
            ("bind", self.bind.as_str()),
        ]
    }

    /// Reject empty bindings and bindings that collide once canonicalized.
    pub fn check(&self) -> Result<()> {
        let entries = self.entries();
        for (name, key) in entries {
            if key_tokens(key).is_empty() {
                return Err(AutoKeyError::config_validation(format!(
                    "{name} hotkey cannot be empty"
                )));
            }
        }
        for (i, (first, a)) in entries.iter().enumerate() {
            for (second, b) in entries.iter().skip(i + 1) {
                let combo = canonical_key(a);
                if combo == canonical_key(b) {
                    return Err(AutoKeyError::HotkeyConflict {
                        first: first.to_string(),
                        second: second.to_string(),
                        combo,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Everything persisted between sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub hotkeys: HotkeyBindings,

    /// Number of passes over `actions`; 0 repeats until stopped.
    #[serde(rename = "loop", default = "default_loop")]
    pub loop_count: u32,

    #[serde(default)]
    pub actions: Vec<Action>,

    #[serde(default)]
    pub mode: Mode,

    #[serde(default = "default_mouse_cps")]
    pub mouse_cps: u32,

    #[serde(default)]
    pub mouse_button: MouseButton,

    #[serde(default)]
    pub mouse_click: ClickStyle,

    /// Kept for the desktop front end; the CLI ignores it.
    #[serde(default)]
    pub minimize_to_tray: bool,

    /// Fail actions whose key has unknown parts instead of dropping the parts.
    #[serde(default)]
    pub strict_keys: bool,

    /// Process whose window becomes the background target at startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_process: Option<String>,
}

fn default_delay() -> u64 {
    100
}

fn default_loop() -> u32 {
    1
}

fn default_mouse_cps() -> u32 {
    5
}

fn default_start_key() -> String {
    "f9".to_string()
}

fn default_stop_key() -> String {
    "f10".to_string()
}

fn default_bind_key() -> String {
    "f11".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hotkeys: HotkeyBindings::default(),
            loop_count: default_loop(),
            actions: Vec::new(),
            mode: Mode::default(),
            mouse_cps: default_mouse_cps(),
            mouse_button: MouseButton::default(),
            mouse_click: ClickStyle::default(),
            minimize_to_tray: false,
            strict_keys: false,
            target_process: None,
        }
    }
}

impl Config {
    /// Config written when no file exists yet.
    pub fn sample() -> Self {
        Self {
            actions: vec![
                Action::new("a", 500),
                Action::new("s", 500),
                Action::new("d", 500),
            ],
            ..Self::default()
        }
    }

    /// Load a config file.
    ///
    /// A missing file yields [`AutoKeyError::ConfigNotFound`]; unreadable or
    /// malformed content yields [`AutoKeyError::ConfigLoad`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(AutoKeyError::config_not_found(path));
            }
            Err(e) => return Err(AutoKeyError::config_load(path, e.to_string())),
        };

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| AutoKeyError::config_load(path, e.to_string()))?;
        debug!(path = %path.display(), actions = config.actions.len(), "Loaded config");
        Ok(config)
    }

    /// Write the config as pretty-printed JSON.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| AutoKeyError::config_save(path, e.to_string()))?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Load `path`, seeding it with [`Config::sample`] only if it is absent.
    ///
    /// Returns the config and whether the file was created.
    pub fn load_or_init(path: impl AsRef<Path>) -> Result<(Self, bool)> {
        let path = path.as_ref();
        match Self::from_file(path) {
            Ok(config) => Ok((config, false)),
            Err(e) if e.is_not_found() => {
                let config = Self::sample();
                config.save_to_file(path)?;
                info!(path = %path.display(), "Created default config");
                Ok((config, true))
            }
            Err(e) => Err(e),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.hotkeys.check()?;
        self.playback(None).validate()
    }

    /// Freeze the playback-relevant part of the config for one run.
    pub fn playback(&self, target: Option<WindowHandle>) -> PlaybackConfig {
        PlaybackConfig {
            mode: self.mode,
            actions: self.actions.clone(),
            loop_count: self.loop_count,
            target,
            mouse_button: self.mouse_button,
            click_style: self.mouse_click,
            clicks_per_second: self.mouse_cps,
            key_policy: ResolvePolicy::from_strict(self.strict_keys),
        }
    }
}

/// Immutable input of a single playback run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackConfig {
    pub mode: Mode,
    pub actions: Vec<Action>,
    /// 0 repeats until stopped.
    pub loop_count: u32,
    /// `None` sends to whichever window has focus.
    pub target: Option<WindowHandle>,
    pub mouse_button: MouseButton,
    pub click_style: ClickStyle,
    pub clicks_per_second: u32,
    pub key_policy: ResolvePolicy,
}

impl PlaybackConfig {
    pub fn validate(&self) -> Result<()> {
        match self.mode {
            Mode::Keyboard => {
                if self.actions.is_empty() {
                    return Err(AutoKeyError::config_validation(
                        "keyboard mode needs at least one action",
                    ));
                }
                if let Some(pos) = self.actions.iter().position(|a| key_tokens(&a.key).is_empty())
                {
                    return Err(AutoKeyError::config_validation(format!(
                        "action {} has an empty key",
                        pos + 1
                    )));
                }
            }
            Mode::Mouse => {
                if !(1..=MAX_CLICKS_PER_SECOND).contains(&self.clicks_per_second) {
                    return Err(AutoKeyError::config_validation(format!(
                        "mouse_cps must be between 1 and {MAX_CLICKS_PER_SECOND}, got {}",
                        self.clicks_per_second
                    )));
                }
            }
        }
        Ok(())
    }
}

//! # autokey
//!
//! Replays keyboard sequences and mouse click patterns, started and stopped
//! with global hotkeys.
//!
//! ## Features
//!
//! - Key sequences with per-key delays, repeated a fixed number of times or
//!   until stopped
//! - Auto-clicking at a fixed rate with single or double clicks
//! - Background delivery to a bound window without focusing it, with
//!   automatic fallback to the foreground when that window closes
//! - Global start/stop/bind hotkeys
//! - JSON configuration file
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use autokey::{Config, DryRunBackend, TaskExecutor};
//!
//! let config = Config::sample();
//! let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
//! let mut executor = TaskExecutor::new(Arc::new(DryRunBackend::new()), tx);
//!
//! executor.start(config.playback(None))?;
//! executor.wait(Duration::from_secs(10))?;
//! # Ok::<(), autokey::AutoKeyError>(())
//! ```
//!
//! ## Configuration
//!
//! ```json
//! {
//!   "start": "f9",
//!   "stop": "f10",
//!   "bind": "f11",
//!   "loop": 0,
//!   "actions": [{"key": "ctrl+s", "delay": 1000}],
//!   "mode": "keyboard"
//! }
//! ```

pub mod app;
pub mod config;
pub mod delivery;
pub mod error;
pub mod executor;
pub mod global_hotkey;
pub mod input;
pub mod keys;
pub mod process_finder;

pub use config::{Action, Config, HotkeyBindings, Mode, PlaybackConfig};
pub use delivery::{KeyDelivery, Route};
pub use error::{AutoKeyError, Result};
pub use executor::{ExecutorEvent, TaskExecutor};
pub use crate::global_hotkey::{HotkeyAction, HotkeyListener};
pub use input::{DryRunBackend, InputBackend, WindowHandle};
pub use process_finder::ProcessFinder;

pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

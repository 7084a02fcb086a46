//! OS input seam.
//!
//! Everything that touches the operating system's input or window APIs goes
//! through [`InputBackend`]. The Win32 implementation lives in
//! [`windows`]; [`DryRunBackend`] logs and records every call instead of
//! injecting anything, which is what `--dry-run` and the tests use.

#[cfg(windows)]
pub mod windows;

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::info;

use crate::config::MouseButton;
use crate::error::Result;
use crate::keys::KeyCode;

/// Opaque OS identifier of a top-level window. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(u64);

impl WindowHandle {
    /// Wrap a raw handle; zero means "no window" and yields `None`.
    pub fn new(raw: u64) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A window handle together with its title at the time it was queried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub handle: WindowHandle,
    pub title: String,
}

/// Synthetic input and window queries.
///
/// Implementations are shared between the controller and the playback
/// worker, hence `Send + Sync` and `&self` receivers.
pub trait InputBackend: Send + Sync {
    /// Whether `handle` still refers to a live window.
    fn is_window(&self, handle: WindowHandle) -> bool;

    /// Post a key-down then key-up for a single key to `handle` without
    /// activating it.
    fn post_key(&self, handle: WindowHandle, code: KeyCode) -> Result<()>;

    /// Press `codes` in order, then release them in reverse, against the
    /// window that has focus.
    fn send_keys(&self, codes: &[KeyCode]) -> Result<()>;

    /// Press and release a mouse button at the current cursor position.
    fn click(&self, button: MouseButton) -> Result<()>;

    /// The window that currently holds focus, if any.
    fn foreground_window(&self) -> Option<WindowInfo>;

    /// First visible top-level window owned by process `pid`.
    fn window_for_pid(&self, pid: u32) -> Option<WindowHandle>;
}

/// The backend to use for this process.
pub fn default_backend(dry_run: bool) -> Result<Arc<dyn InputBackend>> {
    if dry_run {
        return Ok(Arc::new(DryRunBackend::new()));
    }

    #[cfg(windows)]
    {
        return Ok(Arc::new(windows::WindowsBackend::new()));
    }

    #[cfg(not(windows))]
    {
        return Err(crate::error::AutoKeyError::unsupported_platform(
            "input injection requires Windows; use --dry-run to simulate",
        ));
    }
}

/// One injected input, as seen by [`DryRunBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputRecord {
    /// Background delivery to a specific window.
    Posted { handle: WindowHandle, code: KeyCode },
    /// Foreground delivery.
    Sent { codes: Vec<KeyCode> },
    /// Mouse click.
    Clicked { button: MouseButton },
}

/// Backend that injects nothing and records everything.
///
/// Every handle counts as a live window until [`close_window`] is called
/// for it.
///
/// [`close_window`]: DryRunBackend::close_window
#[derive(Debug, Default)]
pub struct DryRunBackend {
    records: Mutex<Vec<(Instant, InputRecord)>>,
    closed: Mutex<HashSet<WindowHandle>>,
    foreground: Mutex<Option<WindowInfo>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DryRunBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a window as destroyed.
    pub fn close_window(&self, handle: WindowHandle) {
        lock(&self.closed).insert(handle);
    }

    /// Set what [`InputBackend::foreground_window`] reports.
    pub fn set_foreground(&self, window: Option<WindowInfo>) {
        *lock(&self.foreground) = window;
    }

    /// All recorded inputs in injection order.
    pub fn records(&self) -> Vec<InputRecord> {
        lock(&self.records).iter().map(|(_, r)| r.clone()).collect()
    }

    /// All recorded inputs with the instant they were injected.
    pub fn timed_records(&self) -> Vec<(Instant, InputRecord)> {
        lock(&self.records).clone()
    }

    fn record(&self, record: InputRecord) {
        lock(&self.records).push((Instant::now(), record));
    }
}

impl InputBackend for DryRunBackend {
    fn is_window(&self, handle: WindowHandle) -> bool {
        !lock(&self.closed).contains(&handle)
    }

    fn post_key(&self, handle: WindowHandle, code: KeyCode) -> Result<()> {
        info!(target: "autokey::dry_run", %handle, code, "DRY-RUN post_key");
        self.record(InputRecord::Posted { handle, code });
        Ok(())
    }

    fn send_keys(&self, codes: &[KeyCode]) -> Result<()> {
        info!(target: "autokey::dry_run", ?codes, "DRY-RUN send_keys");
        self.record(InputRecord::Sent {
            codes: codes.to_vec(),
        });
        Ok(())
    }

    fn click(&self, button: MouseButton) -> Result<()> {
        info!(target: "autokey::dry_run", ?button, "DRY-RUN click");
        self.record(InputRecord::Clicked { button });
        Ok(())
    }

    fn foreground_window(&self) -> Option<WindowInfo> {
        lock(&self.foreground).clone()
    }

    fn window_for_pid(&self, pid: u32) -> Option<WindowHandle> {
        info!(target: "autokey::dry_run", pid, "DRY-RUN window_for_pid");
        WindowHandle::new(u64::from(pid))
    }
}

//! Controller and its event loop.
//!
//! The [`Controller`] is the single owner of mutable session state: the
//! loaded config, the bound target window and the executor. Hotkey triggers
//! and executor events reach it as queued messages and are handled one at a
//! time on the thread running [`run`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::executor::{ExecutorEvent, TaskExecutor, POLL_INTERVAL};
use crate::global_hotkey::{HotkeyAction, HotkeyListener};
use crate::input::{InputBackend, WindowHandle, WindowInfo};
use crate::keys::format_key_text;
use crate::process_finder::ProcessFinder;

/// How long shutdown waits for the playback worker.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Options for [`run`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Start playback as soon as the loop is up.
    pub autostart: bool,
    /// Leave the loop after the first run finishes.
    pub exit_on_finish: bool,
}

pub struct Controller {
    config: Config,
    backend: Arc<dyn InputBackend>,
    executor: TaskExecutor,
    target: Option<WindowInfo>,
}

impl Controller {
    /// Create a controller and the receiver its executor reports on.
    pub fn new(
        config: Config,
        backend: Arc<dyn InputBackend>,
    ) -> (Self, UnboundedReceiver<ExecutorEvent>) {
        let (tx, rx) = unbounded_channel();
        let executor = TaskExecutor::new(Arc::clone(&backend), tx);
        (
            Self {
                config,
                backend,
                executor,
                target: None,
            },
            rx,
        )
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn target(&self) -> Option<WindowHandle> {
        self.target.as_ref().map(|w| w.handle)
    }

    pub fn is_running(&self) -> bool {
        self.executor.is_running()
    }

    /// Bind the first window of a process matching `process_name`.
    pub fn bind_process(&mut self, process_name: &str) -> Option<WindowHandle> {
        let mut finder = ProcessFinder::new();
        match finder.find_window(process_name, self.backend.as_ref()) {
            Some(handle) => {
                self.target = Some(WindowInfo {
                    handle,
                    title: process_name.to_string(),
                });
                status(format!("Bound window {handle} of '{process_name}'").green());
                Some(handle)
            }
            None => {
                status(format!("No window found for process '{process_name}'").yellow());
                None
            }
        }
    }

    /// Bind the focused window as the background target.
    pub fn bind_foreground(&mut self) -> Option<WindowHandle> {
        match self.backend.foreground_window() {
            Some(window) if is_bindable(&window.title) => {
                let handle = window.handle;
                status(format!("Bound window {handle}: {}", short_title(&window.title)).green());
                self.target = Some(window);
                Some(handle)
            }
            _ => {
                status("Cannot bind: focus the target window, then press the bind hotkey".yellow());
                None
            }
        }
    }

    pub fn clear_target(&mut self) {
        self.target = None;
    }

    /// Start a run with a frozen copy of the config. No-op while running.
    pub fn start(&mut self) -> bool {
        let playback = self.config.playback(self.target());
        match self.executor.start(playback) {
            Ok(true) => {
                debug!(target = ?self.target(), "Run started");
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!(error = %e, "Cannot start playback");
                status(format!("Cannot start: {e}").red());
                false
            }
        }
    }

    pub fn stop(&self) {
        if self.executor.is_running() {
            self.executor.stop();
            status("Stopping...".yellow());
        }
    }

    pub fn handle_action(&mut self, action: HotkeyAction) {
        debug!(?action, "Hotkey triggered");
        match action {
            HotkeyAction::Start => {
                self.start();
            }
            HotkeyAction::Stop => self.stop(),
            HotkeyAction::Bind => {
                self.bind_foreground();
            }
        }
    }

    /// Report an executor event. Returns true for the end-of-run event.
    pub fn handle_event(&mut self, event: &ExecutorEvent) -> bool {
        match event {
            ExecutorEvent::KeyProgress { .. } | ExecutorEvent::Clicking { .. } => {
                debug!("{event}");
            }
            ExecutorEvent::Started { .. } => status(event.to_string().green()),
            ExecutorEvent::Fallback { .. }
            | ExecutorEvent::KeyFailed { .. }
            | ExecutorEvent::ClickFailed { .. } => status(event.to_string().yellow()),
            ExecutorEvent::Finished { .. } => {
                status(event.to_string().cyan());
                return true;
            }
        }
        false
    }

    /// Stop any run and wait for it, bounded by `grace`.
    pub fn shutdown(&mut self, grace: Duration) {
        if let Err(e) = self.executor.shutdown(grace) {
            warn!(error = %e, "Playback did not shut down cleanly");
            status(e.to_string().red());
        }
    }
}

fn is_bindable(title: &str) -> bool {
    let title = title.trim();
    !title.is_empty() && !title.to_lowercase().contains(crate::PKG_NAME)
}

fn short_title(title: &str) -> String {
    const MAX: usize = 40;
    if title.chars().count() > MAX {
        format!("{}...", title.chars().take(MAX).collect::<String>())
    } else {
        title.to_string()
    }
}

fn status(message: impl std::fmt::Display) {
    println!("{} {message}", "»".bold());
}

/// Drive the controller until Ctrl+C (or the first finished run when
/// `exit_on_finish` is set), then shut playback down.
pub async fn run(
    mut controller: Controller,
    mut events: UnboundedReceiver<ExecutorEvent>,
    options: RunOptions,
) -> Result<()> {
    let (mut hotkeys, mut triggers) =
        HotkeyListener::new().context("Failed to create hotkey listener")?;

    let bindings = controller.config().hotkeys.clone();
    match hotkeys.register(&bindings) {
        Ok(()) => status(format!(
            "Hotkeys active: start [{}] / stop [{}] / bind [{}]",
            format_key_text(&bindings.start),
            format_key_text(&bindings.stop),
            format_key_text(&bindings.bind)
        )),
        Err(e) => {
            warn!(error = %e, "Hotkeys unavailable");
            status(format!("Hotkey registration failed: {e}").red());
        }
    }

    if options.autostart {
        controller.start();
    }

    let mut pump = tokio::time::interval(POLL_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            Some(id) = triggers.recv() => {
                if let Some(action) = hotkeys.action_for(id) {
                    controller.handle_action(action);
                }
            }
            Some(event) = events.recv() => {
                if controller.handle_event(&event) && options.exit_on_finish {
                    break;
                }
            }
            _ = pump.tick() => {
                #[cfg(windows)]
                crate::input::windows::pump_messages();
            }
            result = &mut ctrl_c => {
                result.context("Failed to listen for Ctrl+C")?;
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    drop(hotkeys);
    controller.shutdown(SHUTDOWN_GRACE);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_window_is_not_bindable() {
        assert!(!is_bindable(""));
        assert!(!is_bindable("   "));
        assert!(!is_bindable("C:\\tools\\autokey.exe run"));
        assert!(is_bindable("Untitled - Notepad"));
    }

    #[test]
    fn test_short_title() {
        assert_eq!(short_title("Notepad"), "Notepad");
        let long = "x".repeat(50);
        assert_eq!(short_title(&long), format!("{}...", "x".repeat(40)));
    }
}

//! Target window lookup by process name.
//!
//! Lets a run be bound to a program's window at startup (`--process` or
//! `target_process` in the config) instead of pressing the bind hotkey.

use sysinfo::{ProcessesToUpdate, System};
use tracing::debug;

use crate::input::{InputBackend, WindowHandle};

/// Finds running processes by name using `sysinfo`.
///
/// # Example
///
/// ```
/// use autokey::ProcessFinder;
///
/// let mut finder = ProcessFinder::new();
/// let pids = finder.find_pids("notepad");
/// println!("{} matching process(es)", pids.len());
/// ```
pub struct ProcessFinder {
    system: System,
}

impl Default for ProcessFinder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessFinder {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// PIDs of every process whose name contains `process_name`,
    /// case-insensitively, in ascending order.
    pub fn find_pids(&mut self, process_name: &str) -> Vec<u32> {
        self.system.refresh_processes(ProcessesToUpdate::All, true);

        let wanted = process_name.to_lowercase();
        let mut pids: Vec<u32> = self
            .system
            .processes()
            .iter()
            .filter(|(_, process)| {
                process
                    .name()
                    .to_string_lossy()
                    .to_lowercase()
                    .contains(&wanted)
            })
            .map(|(pid, _)| pid.as_u32())
            .collect();
        pids.sort_unstable();
        debug!(%process_name, ?pids, "Matched processes");
        pids
    }

    /// First top-level window owned by a process matching `process_name`.
    pub fn find_window(
        &mut self,
        process_name: &str,
        backend: &dyn InputBackend,
    ) -> Option<WindowHandle> {
        if process_name.trim().is_empty() {
            return None;
        }
        self.find_pids(process_name)
            .into_iter()
            .find_map(|pid| backend.window_for_pid(pid))
    }
}

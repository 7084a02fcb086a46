//! Playback loop.
//!
//! [`TaskExecutor`] owns at most one worker thread. The worker replays a
//! [`PlaybackConfig`] snapshot (key sequence or click pattern) and reports
//! back through an unbounded channel; it never touches controller state.
//! The only state shared with the controller is the per-run stop flag.
//!
//! Every wait inside a run is a [`cancellable_sleep`], so a stop request
//! takes effect within [`POLL_INTERVAL`] of being issued, except while an
//! OS call is in flight.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, trace, warn};

use crate::config::{ClickStyle, Mode, PlaybackConfig};
use crate::delivery::{KeyDelivery, Route};
use crate::error::{AutoKeyError, Result};
use crate::input::{InputBackend, WindowHandle};
use crate::keys::format_key_text;

/// Granularity of every wait in a run.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Extra pause between two passes over the key sequence.
pub const PASS_PAUSE: Duration = Duration::from_millis(50);

/// Gap between the two clicks of a double click.
pub const DOUBLE_CLICK_GAP: Duration = Duration::from_millis(50);

/// Notifications from the playback worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorEvent {
    Started { mode: Mode },
    /// About to send `key` during pass `pass` (1-based).
    KeyProgress { pass: u64, key: String },
    /// The bound window was gone; `key` went to the foreground instead.
    Fallback { handle: WindowHandle, key: String },
    /// `key` could not be sent; the run goes on.
    KeyFailed { key: String, reason: String },
    Clicking { clicks: u64, cps: u32 },
    ClickFailed { reason: String },
    /// Sent exactly once per run, after the worker has stopped injecting.
    Finished { passes: u64 },
}

impl fmt::Display for ExecutorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started { mode } => write!(f, "{mode:?} playback started"),
            Self::KeyProgress { pass, key } => write!(f, "Pass {pass} | key: {key}"),
            Self::Fallback { handle, key } => {
                write!(f, "Window {handle} is gone, sent {key} to the foreground")
            }
            Self::KeyFailed { key, reason } => write!(f, "Key {key} failed: {reason}"),
            Self::Clicking { clicks, cps } => write!(f, "Clicking... #{clicks} ({cps}/s)"),
            Self::ClickFailed { reason } => write!(f, "Click failed: {reason}"),
            Self::Finished { passes } => write!(f, "Playback finished after {passes} pass(es)"),
        }
    }
}

/// Sleep for `duration` in [`POLL_INTERVAL`] steps, returning early once
/// `running` is cleared. Returns whether the full duration elapsed.
pub fn cancellable_sleep(running: &AtomicBool, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if !running.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(POLL_INTERVAL));
    }
}

/// Starts, stops and joins the playback worker.
pub struct TaskExecutor {
    backend: Arc<dyn InputBackend>,
    events: UnboundedSender<ExecutorEvent>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    /// Worker that outlived a timed-out wait; no new run starts until it exits.
    abandoned: Option<JoinHandle<()>>,
}

impl TaskExecutor {
    pub fn new(backend: Arc<dyn InputBackend>, events: UnboundedSender<ExecutorEvent>) -> Self {
        Self {
            backend,
            events,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            abandoned: None,
        }
    }

    /// Whether a worker thread is still alive, including one abandoned by a
    /// timed-out [`wait`](Self::wait).
    pub fn is_running(&self) -> bool {
        [&self.worker, &self.abandoned]
            .into_iter()
            .flatten()
            .any(|h| !h.is_finished())
    }

    /// Start a run. Returns `Ok(false)` without doing anything if a run is
    /// already active.
    pub fn start(&mut self, config: PlaybackConfig) -> Result<bool> {
        if self.is_running() {
            debug!("Playback already running; start ignored");
            return Ok(false);
        }
        config.validate()?;
        self.reap();

        // Fresh flag per run so an abandoned worker can never be revived.
        let running = Arc::new(AtomicBool::new(true));
        self.running = Arc::clone(&running);

        let worker = Worker {
            backend: Arc::clone(&self.backend),
            events: self.events.clone(),
            running,
            config,
        };
        let handle = thread::Builder::new()
            .name("autokey-playback".to_string())
            .spawn(move || worker.run())?;
        self.worker = Some(handle);
        Ok(true)
    }

    /// Ask the current run to stop. Does not wait.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Wait up to `timeout` for the worker to exit.
    ///
    /// On timeout the worker is left to finish on its own and
    /// [`AutoKeyError::ShutdownTimeout`] is returned. It still counts as
    /// running until it exits, and a later `wait` resumes waiting for it.
    pub fn wait(&mut self, timeout: Duration) -> Result<()> {
        let Some(handle) = self.worker.take().or_else(|| self.abandoned.take()) else {
            return Ok(());
        };

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            let now = Instant::now();
            if now >= deadline {
                warn!(?timeout, "Playback worker did not stop in time; abandoning it");
                self.abandoned = Some(handle);
                return Err(AutoKeyError::ShutdownTimeout(timeout));
            }
            thread::sleep((deadline - now).min(POLL_INTERVAL));
        }

        if handle.join().is_err() {
            error!("Playback worker panicked");
        }
        Ok(())
    }

    /// [`stop`](Self::stop) followed by a bounded [`wait`](Self::wait).
    pub fn shutdown(&mut self, timeout: Duration) -> Result<()> {
        self.stop();
        self.wait(timeout)
    }

    fn reap(&mut self) {
        for handle in [self.worker.take(), self.abandoned.take()].into_iter().flatten() {
            if handle.join().is_err() {
                error!("Playback worker panicked");
            }
        }
    }
}

impl Drop for TaskExecutor {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    backend: Arc<dyn InputBackend>,
    events: UnboundedSender<ExecutorEvent>,
    running: Arc<AtomicBool>,
    config: PlaybackConfig,
}

impl Worker {
    fn run(self) {
        let mode = self.config.mode;
        info!(?mode, target = ?self.config.target, "Playback started");
        self.emit(ExecutorEvent::Started { mode });

        let passes = match mode {
            Mode::Keyboard => self.run_keyboard(),
            Mode::Mouse => self.run_mouse(),
        };

        self.running.store(false, Ordering::Release);
        info!(passes, "Playback finished");
        self.emit(ExecutorEvent::Finished { passes });
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn sleep(&self, duration: Duration) -> bool {
        cancellable_sleep(&self.running, duration)
    }

    fn emit(&self, event: ExecutorEvent) {
        if self.events.send(event).is_err() {
            trace!("Event receiver dropped");
        }
    }

    fn run_keyboard(&self) -> u64 {
        let delivery = KeyDelivery::new(Arc::clone(&self.backend), self.config.key_policy);
        let limit = u64::from(self.config.loop_count);
        let mut pass = 0u64;

        while self.is_running() {
            if limit > 0 && pass >= limit {
                break;
            }
            pass += 1;

            for action in &self.config.actions {
                if !self.is_running() {
                    break;
                }

                let text = format_key_text(&action.key);
                self.emit(ExecutorEvent::KeyProgress {
                    pass,
                    key: text.clone(),
                });

                // Route is chosen per key: the bound window may close mid-run.
                match delivery.deliver(self.config.target, &action.key) {
                    Ok(Route::Fallback(handle)) => {
                        self.emit(ExecutorEvent::Fallback { handle, key: text });
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(key = %action.key, error = %e, "Key delivery failed");
                        self.emit(ExecutorEvent::KeyFailed {
                            key: text,
                            reason: e.to_string(),
                        });
                    }
                }

                self.sleep(Duration::from_millis(action.delay));
            }

            let more = limit == 0 || pass < limit;
            if more && self.is_running() {
                self.sleep(PASS_PAUSE);
            }
        }
        pass
    }

    fn run_mouse(&self) -> u64 {
        let cps = self.config.clicks_per_second.max(1);
        let interval = Duration::from_secs(1) / cps;
        let button = self.config.mouse_button;
        let mut clicks = 0u64;

        while self.is_running() {
            clicks += 1;
            self.emit(ExecutorEvent::Clicking { clicks, cps });

            let mut result = self.backend.click(button);
            if result.is_ok()
                && self.config.click_style == ClickStyle::Double
                && self.sleep(DOUBLE_CLICK_GAP)
            {
                result = self.backend.click(button);
            }
            if let Err(e) = result {
                warn!(?button, error = %e, "Click failed");
                self.emit(ExecutorEvent::ClickFailed {
                    reason: e.to_string(),
                });
            }

            self.sleep(interval);
        }
        clicks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use crate::config::{Action, MouseButton};
    use crate::input::{DryRunBackend, InputRecord, WindowInfo};
    use crate::keys::{KeyCode, ResolvePolicy};
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    const WAIT: Duration = Duration::from_secs(5);

    fn keyboard(actions: Vec<Action>, loop_count: u32) -> PlaybackConfig {
        PlaybackConfig {
            mode: Mode::Keyboard,
            actions,
            loop_count,
            target: None,
            mouse_button: MouseButton::Left,
            click_style: ClickStyle::Single,
            clicks_per_second: 5,
            key_policy: ResolvePolicy::Lenient,
        }
    }

    fn setup() -> (
        Arc<DryRunBackend>,
        TaskExecutor,
        UnboundedReceiver<ExecutorEvent>,
    ) {
        let backend = Arc::new(DryRunBackend::new());
        let (tx, rx) = unbounded_channel();
        let executor = TaskExecutor::new(backend.clone(), tx);
        (backend, executor, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<ExecutorEvent>) -> Vec<ExecutorEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn finished_count(events: &[ExecutorEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, ExecutorEvent::Finished { .. }))
            .count()
    }

    fn sent(codes: &[KeyCode]) -> InputRecord {
        InputRecord::Sent {
            codes: codes.to_vec(),
        }
    }

    #[test]
    fn test_runs_exact_number_of_passes() {
        let (backend, mut executor, mut rx) = setup();
        let config = keyboard(vec![Action::new("a", 5), Action::new("s", 5)], 2);

        assert!(executor.start(config).unwrap());
        executor.wait(WAIT).unwrap();

        assert_eq!(
            backend.records(),
            vec![sent(&[0x41]), sent(&[0x53]), sent(&[0x41]), sent(&[0x53])]
        );
        let events = drain(&mut rx);
        assert_eq!(finished_count(&events), 1);
        assert_eq!(events.first(), Some(&ExecutorEvent::Started { mode: Mode::Keyboard }));
        assert_eq!(events.last(), Some(&ExecutorEvent::Finished { passes: 2 }));
        assert!(events.contains(&ExecutorEvent::KeyProgress {
            pass: 2,
            key: "S".to_string()
        }));
    }

    #[test]
    fn test_delays_and_pass_pause() {
        let (backend, mut executor, _rx) = setup();
        let delay = 30;
        let config = keyboard(vec![Action::new("a", delay), Action::new("s", delay)], 2);

        executor.start(config).unwrap();
        executor.wait(WAIT).unwrap();

        let times: Vec<Instant> = backend.timed_records().iter().map(|(t, _)| *t).collect();
        assert_eq!(times.len(), 4);
        let delay = Duration::from_millis(delay);
        assert!(times[1] - times[0] >= delay);
        assert!(times[2] - times[1] >= delay + PASS_PAUSE);
        assert!(times[3] - times[2] >= delay);
    }

    #[test]
    fn test_infinite_loop_runs_until_stopped() {
        let (backend, mut executor, mut rx) = setup();
        let config = keyboard(vec![Action::new("a", 5)], 0);

        executor.start(config).unwrap();
        thread::sleep(Duration::from_millis(200));
        assert!(executor.is_running());

        executor.shutdown(WAIT).unwrap();
        assert!(!executor.is_running());
        assert!(backend.records().len() >= 2);
        assert_eq!(finished_count(&drain(&mut rx)), 1);
    }

    #[test]
    fn test_stop_interrupts_long_delay() {
        let (_backend, mut executor, _rx) = setup();
        let config = keyboard(vec![Action::new("a", 10_000)], 1);

        executor.start(config).unwrap();
        thread::sleep(Duration::from_millis(30));

        let stopped_at = Instant::now();
        executor.shutdown(WAIT).unwrap();
        assert!(stopped_at.elapsed() < POLL_INTERVAL * 10);
    }

    #[test]
    fn test_start_while_running_is_noop() {
        let (_backend, mut executor, mut rx) = setup();
        let config = keyboard(vec![Action::new("a", 20)], 0);

        assert!(executor.start(config.clone()).unwrap());
        assert!(!executor.start(config).unwrap());

        executor.shutdown(WAIT).unwrap();
        let events = drain(&mut rx);
        assert_eq!(finished_count(&events), 1);
        let starts = events
            .iter()
            .filter(|e| matches!(e, ExecutorEvent::Started { .. }))
            .count();
        assert_eq!(starts, 1);
    }

    #[test]
    fn test_restart_after_finish() {
        let (backend, mut executor, mut rx) = setup();
        let config = keyboard(vec![Action::new("a", 1)], 1);

        executor.start(config.clone()).unwrap();
        executor.wait(WAIT).unwrap();
        assert!(executor.start(config).unwrap());
        executor.wait(WAIT).unwrap();

        assert_eq!(backend.records().len(), 2);
        assert_eq!(finished_count(&drain(&mut rx)), 2);
    }

    #[test]
    fn test_failed_key_does_not_abort_run() {
        let (backend, mut executor, mut rx) = setup();
        let config = keyboard(vec![Action::new("bogus", 1), Action::new("a", 1)], 1);

        executor.start(config).unwrap();
        executor.wait(WAIT).unwrap();

        assert_eq!(backend.records(), vec![sent(&[0x41])]);
        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, ExecutorEvent::KeyFailed { key, .. } if key == "Bogus")));
        assert_eq!(events.last(), Some(&ExecutorEvent::Finished { passes: 1 }));
    }

    #[test]
    fn test_closed_window_falls_back_mid_run() {
        let (backend, mut executor, mut rx) = setup();
        let handle = WindowHandle::new(0x1234).unwrap();
        let mut config = keyboard(vec![Action::new("a", 10)], 0);
        config.target = Some(handle);

        executor.start(config).unwrap();
        thread::sleep(Duration::from_millis(100));
        backend.close_window(handle);
        thread::sleep(Duration::from_millis(100));
        executor.shutdown(WAIT).unwrap();

        let records = backend.records();
        assert!(matches!(records.first(), Some(InputRecord::Posted { .. })));
        assert!(matches!(records.last(), Some(InputRecord::Sent { .. })));
        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, ExecutorEvent::Fallback { handle: h, .. } if *h == handle)));
        assert_eq!(finished_count(&events), 1);
    }

    #[test]
    fn test_mouse_double_click() {
        let (backend, mut executor, mut rx) = setup();
        let config = PlaybackConfig {
            mode: Mode::Mouse,
            mouse_button: MouseButton::Right,
            click_style: ClickStyle::Double,
            clicks_per_second: 20,
            ..keyboard(Vec::new(), 1)
        };

        executor.start(config).unwrap();
        thread::sleep(Duration::from_millis(250));
        executor.shutdown(WAIT).unwrap();

        let records = backend.records();
        assert!(records.len() >= 2);
        assert!(records.iter().all(|r| *r
            == InputRecord::Clicked {
                button: MouseButton::Right
            }));
        assert_eq!(finished_count(&drain(&mut rx)), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let (_backend, mut executor, _rx) = setup();
        assert!(executor.start(keyboard(Vec::new(), 1)).is_err());
        assert!(!executor.is_running());
    }

    #[test]
    fn test_cancellable_sleep_returns_early() {
        let flag = AtomicBool::new(false);
        let started = Instant::now();
        assert!(!cancellable_sleep(&flag, Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_millis(100));

        let flag = AtomicBool::new(true);
        assert!(cancellable_sleep(&flag, Duration::from_millis(15)));
    }

    /// Blocks inside `send_keys` and tracks how many calls overlap.
    #[derive(Default)]
    struct StuckBackend {
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl InputBackend for StuckBackend {
        fn is_window(&self, _handle: WindowHandle) -> bool {
            true
        }
        fn post_key(&self, _handle: WindowHandle, _code: KeyCode) -> Result<()> {
            Ok(())
        }
        fn send_keys(&self, _codes: &[KeyCode]) -> Result<()> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(300));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
        fn click(&self, _button: MouseButton) -> Result<()> {
            Ok(())
        }
        fn foreground_window(&self) -> Option<WindowInfo> {
            None
        }
        fn window_for_pid(&self, _pid: u32) -> Option<WindowHandle> {
            None
        }
    }

    #[test]
    fn test_shutdown_timeout_abandons_worker() {
        let (tx, _rx) = unbounded_channel();
        let mut executor = TaskExecutor::new(Arc::new(StuckBackend::default()), tx);
        executor
            .start(keyboard(vec![Action::new("a", 1)], 0))
            .unwrap();
        thread::sleep(Duration::from_millis(20));

        let err = executor.shutdown(Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, AutoKeyError::ShutdownTimeout(_)));

        executor.wait(WAIT).unwrap();
        assert!(!executor.is_running());
    }

    #[test]
    fn test_no_second_worker_while_abandoned_one_runs() {
        let backend = Arc::new(StuckBackend::default());
        let (tx, mut rx) = unbounded_channel();
        let mut executor = TaskExecutor::new(backend.clone(), tx);
        let config = keyboard(vec![Action::new("a", 1)], 0);

        executor.start(config.clone()).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(executor.shutdown(Duration::from_millis(50)).is_err());

        assert!(executor.is_running());
        assert!(!executor.start(config.clone()).unwrap());

        executor.wait(WAIT).unwrap();
        assert_eq!(finished_count(&drain(&mut rx)), 1);

        assert!(executor.start(config).unwrap());
        thread::sleep(Duration::from_millis(20));
        executor.shutdown(WAIT).unwrap();

        assert_eq!(backend.max_active.load(Ordering::SeqCst), 1);
        let events = drain(&mut rx);
        assert_eq!(events.first(), Some(&ExecutorEvent::Started { mode: Mode::Keyboard }));
        assert_eq!(finished_count(&events), 1);
    }

    #[test]
    fn test_stop_during_double_click_gap_skips_second_click() {
        let (backend, mut executor, _rx) = setup();
        let config = PlaybackConfig {
            mode: Mode::Mouse,
            click_style: ClickStyle::Double,
            clicks_per_second: 1,
            ..keyboard(Vec::new(), 1)
        };

        executor.start(config).unwrap();
        thread::sleep(Duration::from_millis(20));
        executor.shutdown(WAIT).unwrap();

        assert!(backend.records().len() <= 1);
    }
}

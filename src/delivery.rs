//! Key delivery: background injection to a bound window, or foreground
//! sending to whatever window has focus.
//!
//! Background delivery posts key messages straight to a window handle and
//! never activates it. Only single keys are supported that way; modifier
//! state is per-thread in Windows and cannot be faked through posted
//! messages, so a combination sent to a background window is refused rather
//! than approximated. Foreground delivery goes through the OS input queue and
//! handles combinations.

use std::fmt;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::error::{AutoKeyError, Result};
use crate::input::{InputBackend, WindowHandle};
use crate::keys::{key_tokens, resolve_key, ResolvePolicy};

/// How a key actually reached its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Posted to the bound window.
    Background(WindowHandle),
    /// Sent to the focused window; no window was bound.
    Foreground,
    /// The bound window was gone, so the key went to the focused window.
    Fallback(WindowHandle),
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Background(handle) => write!(f, "window {handle}"),
            Route::Foreground => write!(f, "foreground"),
            Route::Fallback(handle) => write!(f, "foreground (window {handle} is gone)"),
        }
    }
}

/// Resolves key names and hands them to an [`InputBackend`].
#[derive(Clone)]
pub struct KeyDelivery {
    backend: Arc<dyn InputBackend>,
    policy: ResolvePolicy,
}

impl KeyDelivery {
    pub fn new(backend: Arc<dyn InputBackend>, policy: ResolvePolicy) -> Self {
        Self { backend, policy }
    }

    /// Post a single key to `handle` without activating it.
    ///
    /// Fails with [`AutoKeyError::StaleWindow`] if the handle no longer
    /// refers to a window, and with
    /// [`AutoKeyError::UnsupportedBackgroundCombo`] for combinations.
    pub fn inject_background(&self, handle: WindowHandle, key: &str) -> Result<()> {
        if !self.backend.is_window(handle) {
            return Err(AutoKeyError::StaleWindow {
                window_id: handle.raw(),
            });
        }
        if key_tokens(key).len() > 1 {
            return Err(AutoKeyError::UnsupportedBackgroundCombo {
                combo: key.to_string(),
            });
        }

        match resolve_key(key, self.policy)?.as_slice() {
            [code] => self.backend.post_key(handle, *code),
            _ => Err(AutoKeyError::UnsupportedBackgroundCombo {
                combo: key.to_string(),
            }),
        }
    }

    /// Send a key or combination to the focused window.
    pub fn send_foreground(&self, key: &str) -> Result<()> {
        let codes = resolve_key(key, self.policy)?;
        self.backend.send_keys(&codes)
    }

    /// Deliver `key` to `target`, or to the foreground when there is no
    /// target or the target has been closed.
    pub fn deliver(&self, target: Option<WindowHandle>, key: &str) -> Result<Route> {
        let Some(handle) = target else {
            self.send_foreground(key)?;
            return Ok(Route::Foreground);
        };

        match self.inject_background(handle, key) {
            Ok(()) => {
                trace!(%handle, %key, "Delivered in background");
                Ok(Route::Background(handle))
            }
            Err(AutoKeyError::StaleWindow { .. }) => {
                warn!(%handle, %key, "Bound window is gone, falling back to foreground");
                self.send_foreground(key)?;
                Ok(Route::Fallback(handle))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{DryRunBackend, InputRecord};
    use crate::keys::vk;

    fn setup(policy: ResolvePolicy) -> (Arc<DryRunBackend>, KeyDelivery) {
        let backend = Arc::new(DryRunBackend::new());
        let delivery = KeyDelivery::new(backend.clone(), policy);
        (backend, delivery)
    }

    #[test]
    fn test_no_target_goes_foreground() {
        let (backend, delivery) = setup(ResolvePolicy::Lenient);
        let route = delivery.deliver(None, "ctrl+s").unwrap();
        assert_eq!(route, Route::Foreground);
        assert_eq!(
            backend.records(),
            vec![InputRecord::Sent {
                codes: vec![vk::CONTROL, 0x53]
            }]
        );
    }

    #[test]
    fn test_live_target_goes_background() {
        let (backend, delivery) = setup(ResolvePolicy::Lenient);
        let handle = WindowHandle::new(0x500).unwrap();
        let route = delivery.deliver(Some(handle), "enter").unwrap();
        assert_eq!(route, Route::Background(handle));
        assert_eq!(
            backend.records(),
            vec![InputRecord::Posted {
                handle,
                code: vk::RETURN
            }]
        );
    }

    #[test]
    fn test_stale_target_falls_back() {
        let (backend, delivery) = setup(ResolvePolicy::Lenient);
        let handle = WindowHandle::new(0x500).unwrap();
        backend.close_window(handle);
        let route = delivery.deliver(Some(handle), "a").unwrap();
        assert_eq!(route, Route::Fallback(handle));
        assert_eq!(
            backend.records(),
            vec![InputRecord::Sent { codes: vec![0x41] }]
        );
    }

    #[test]
    fn test_background_combo_refused() {
        let (backend, delivery) = setup(ResolvePolicy::Lenient);
        let handle = WindowHandle::new(0x500).unwrap();
        let err = delivery.deliver(Some(handle), "ctrl+c").unwrap_err();
        assert!(matches!(err, AutoKeyError::UnsupportedBackgroundCombo { .. }));
        assert!(backend.records().is_empty());
    }

    #[test]
    fn test_unresolved_key_sends_nothing() {
        let (backend, delivery) = setup(ResolvePolicy::Lenient);
        assert!(delivery.deliver(None, "nosuchkey").is_err());
        assert!(backend.records().is_empty());
    }
}

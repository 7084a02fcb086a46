//! Win32 implementation of [`InputBackend`].

use std::mem;

use tracing::{debug, trace};
use winapi::shared::minwindef::{BOOL, DWORD, FALSE, LPARAM, TRUE, UINT, WPARAM};
use winapi::shared::windef::HWND;
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::winuser::{
    DispatchMessageW, EnumWindows, GetForegroundWindow, GetWindowTextLengthW, GetWindowTextW,
    GetWindowThreadProcessId, IsWindow, IsWindowVisible, PostMessageW, SendInput, INPUT,
    INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT, KEYEVENTF_KEYUP, MOUSEEVENTF_LEFTDOWN,
    MOUSEEVENTF_LEFTUP, MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP, MOUSEINPUT, MSG,
    PM_REMOVE, PeekMessageW, TranslateMessage, WM_KEYDOWN, WM_KEYUP,
};

use super::{InputBackend, WindowHandle, WindowInfo};
use crate::config::MouseButton;
use crate::error::{AutoKeyError, Result};
use crate::keys::KeyCode;

/// Injects input through `PostMessageW` (background) and `SendInput`
/// (foreground).
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsBackend;

impl WindowsBackend {
    pub fn new() -> Self {
        Self
    }
}

fn to_hwnd(handle: WindowHandle) -> HWND {
    handle.raw() as usize as HWND
}

fn from_hwnd(hwnd: HWND) -> Option<WindowHandle> {
    WindowHandle::new(hwnd as usize as u64)
}

fn last_error() -> DWORD {
    // SAFETY: reads the calling thread's last-error value.
    unsafe { GetLastError() }
}

fn key_input(code: KeyCode, flags: DWORD) -> INPUT {
    // SAFETY: INPUT is plain data; all-zero is a valid value.
    let mut input: INPUT = unsafe { mem::zeroed() };
    input.type_ = INPUT_KEYBOARD;
    // SAFETY: the union is tagged INPUT_KEYBOARD above.
    unsafe {
        *input.u.ki_mut() = KEYBDINPUT {
            wVk: code,
            wScan: 0,
            dwFlags: flags,
            time: 0,
            dwExtraInfo: 0,
        };
    }
    input
}

fn mouse_input(flags: DWORD) -> INPUT {
    // SAFETY: INPUT is plain data; all-zero is a valid value.
    let mut input: INPUT = unsafe { mem::zeroed() };
    input.type_ = INPUT_MOUSE;
    // SAFETY: the union is tagged INPUT_MOUSE above.
    unsafe {
        *input.u.mi_mut() = MOUSEINPUT {
            dx: 0,
            dy: 0,
            mouseData: 0,
            dwFlags: flags,
            time: 0,
            dwExtraInfo: 0,
        };
    }
    input
}

fn send_inputs(inputs: &mut [INPUT]) -> Result<()> {
    // SAFETY: `inputs` is a valid, initialized slice for the duration of the call.
    let sent = unsafe {
        SendInput(
            inputs.len() as UINT,
            inputs.as_mut_ptr(),
            mem::size_of::<INPUT>() as i32,
        )
    };
    if sent as usize != inputs.len() {
        return Err(AutoKeyError::input_failed(format!(
            "SendInput injected {sent} of {} events (error {})",
            inputs.len(),
            last_error()
        )));
    }
    Ok(())
}

fn window_title(hwnd: HWND) -> String {
    // SAFETY: any HWND value is accepted; invalid handles yield 0.
    let len = unsafe { GetWindowTextLengthW(hwnd) };
    if len <= 0 {
        return String::new();
    }
    let mut buf = vec![0u16; len as usize + 1];
    // SAFETY: `buf` holds `len + 1` UTF-16 units, matching the size passed.
    let copied = unsafe { GetWindowTextW(hwnd, buf.as_mut_ptr(), buf.len() as i32) };
    String::from_utf16_lossy(&buf[..copied.max(0) as usize])
}

struct PidSearch {
    pid: DWORD,
    found: HWND,
}

unsafe extern "system" fn match_pid(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let search = &mut *(lparam as *mut PidSearch);
    let mut owner: DWORD = 0;
    GetWindowThreadProcessId(hwnd, &mut owner);
    if owner == search.pid && IsWindowVisible(hwnd) != 0 && GetWindowTextLengthW(hwnd) > 0 {
        search.found = hwnd;
        return FALSE;
    }
    TRUE
}

impl InputBackend for WindowsBackend {
    fn is_window(&self, handle: WindowHandle) -> bool {
        // SAFETY: IsWindow accepts arbitrary handle values.
        unsafe { IsWindow(to_hwnd(handle)) != 0 }
    }

    fn post_key(&self, handle: WindowHandle, code: KeyCode) -> Result<()> {
        let hwnd = to_hwnd(handle);
        for msg in [WM_KEYDOWN, WM_KEYUP] {
            // SAFETY: PostMessageW fails cleanly on a dead handle.
            let ok = unsafe { PostMessageW(hwnd, msg, code as WPARAM, 0) };
            if ok == 0 {
                return Err(AutoKeyError::key_send_failed(
                    format!("{code:#04x}"),
                    handle.raw(),
                    format!("PostMessageW failed (error {})", last_error()),
                ));
            }
        }
        trace!(%handle, code, "Posted key");
        Ok(())
    }

    fn send_keys(&self, codes: &[KeyCode]) -> Result<()> {
        let mut inputs: Vec<INPUT> = codes.iter().map(|&c| key_input(c, 0)).collect();
        inputs.extend(codes.iter().rev().map(|&c| key_input(c, KEYEVENTF_KEYUP)));
        send_inputs(&mut inputs)?;
        trace!(?codes, "Sent keys");
        Ok(())
    }

    fn click(&self, button: MouseButton) -> Result<()> {
        let (down, up) = match button {
            MouseButton::Left => (MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP),
            MouseButton::Right => (MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP),
        };
        send_inputs(&mut [mouse_input(down), mouse_input(up)])
    }

    fn foreground_window(&self) -> Option<WindowInfo> {
        // SAFETY: no preconditions.
        let hwnd = unsafe { GetForegroundWindow() };
        let handle = from_hwnd(hwnd)?;
        Some(WindowInfo {
            handle,
            title: window_title(hwnd),
        })
    }

    fn window_for_pid(&self, pid: u32) -> Option<WindowHandle> {
        let mut search = PidSearch {
            pid,
            found: std::ptr::null_mut(),
        };
        // SAFETY: `search` outlives the synchronous enumeration.
        unsafe {
            EnumWindows(Some(match_pid), &mut search as *mut PidSearch as LPARAM);
        }
        let found = from_hwnd(search.found);
        debug!(pid, window = ?found, "Window lookup by pid");
        found
    }
}

/// Drain this thread's Win32 message queue so hotkey messages reach
/// `global-hotkey`'s hidden window.
pub fn pump_messages() {
    // SAFETY: MSG is plain data; PeekMessageW, TranslateMessage and
    // DispatchMessageW are standard message-loop calls.
    unsafe {
        let mut msg: MSG = mem::zeroed();
        while PeekMessageW(&mut msg, std::ptr::null_mut(), 0, 0, PM_REMOVE) != 0 {
            TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}

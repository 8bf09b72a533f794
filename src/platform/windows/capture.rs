//! Hook installation and the Win32 message loop.
//!
//! Legacy mode installs `WH_KEYBOARD_LL` / `WH_MOUSE_LL` on the calling
//! thread. Raw input mode creates a message-only window (`HWND_MESSAGE`) and
//! registers it for the input class with `RIDEV_INPUTSINK` (events regardless
//! of focus) and `RIDEV_NOLEGACY` (no duplicate legacy messages).
//!
//! Either way the calling thread must pump messages: low-level hook procs
//! and the window procedure are only invoked from inside `GetMessageW`.
//!
//! Callback storage: hook procs receive no `user_info` pointer, so the event
//! pipeline lives in a thread-local on the hook thread. Keyboard and mouse
//! hooks run on different threads and therefore never share it.
//!
//! Hook procs always return `CallNextHookEx` so other hooks in the chain
//! keep seeing every event.

use std::cell::RefCell;
use std::mem;
use std::ptr;

use windows_sys::Win32::Foundation::{
    GetLastError, ERROR_CLASS_ALREADY_EXISTS, HWND, LPARAM, LRESULT, WPARAM,
};
use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
use windows_sys::Win32::UI::Input::{
    RegisterRawInputDevices, RAWINPUTDEVICE, RIDEV_INPUTSINK, RIDEV_NOLEGACY, RIDEV_REMOVE,
};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW,
    GetMessageW, PeekMessageW, PostQuitMessage, PostThreadMessageW, RegisterClassW,
    SetWindowsHookExW, TranslateMessage, UnhookWindowsHookEx, UnregisterClassW, HC_ACTION,
    HHOOK, HOOKPROC, HWND_MESSAGE, KBDLLHOOKSTRUCT, MSG, MSLLHOOKSTRUCT, PM_NOREMOVE, PM_REMOVE,
    WH_KEYBOARD_LL, WH_MOUSE_LL, WM_CLOSE, WM_INPUT, WM_QUIT, WM_USER, WNDCLASSW,
};

use super::layout::WindowsLayout;
use super::raw_input::{read_packet, RawPacket};
use crate::hook::dispatch::EventPipeline;
use crate::hook::normalize::{LegacyKeyRecord, LegacyMouseRecord};
use crate::hook::{HookError, InputClass};

/// HID usage page for generic desktop controls.
const HID_USAGE_PAGE_GENERIC: u16 = 0x01;
const HID_USAGE_MOUSE: u16 = 0x02;
const HID_USAGE_KEYBOARD: u16 = 0x06;

// ---------------------------------------------------------------------------
// Thread-local pipeline
// ---------------------------------------------------------------------------

thread_local! {
    /// Pipeline of the hook installed on this thread, if any.
    static PIPELINE: RefCell<Option<EventPipeline<WindowsLayout>>> = const { RefCell::new(None) };
}

fn set_pipeline(pipeline: Option<EventPipeline<WindowsLayout>>) {
    PIPELINE.with(|slot| *slot.borrow_mut() = pipeline);
}

/// Runs `f` on this thread's pipeline. A callback that re-enters while the
/// handler is still running (the handler pumped messages) is dropped.
fn with_pipeline(f: impl FnOnce(&mut EventPipeline<WindowsLayout>)) {
    PIPELINE.with(|slot| match slot.try_borrow_mut() {
        Ok(mut guard) => {
            if let Some(pipeline) = guard.as_mut() {
                f(pipeline);
            }
        }
        Err(_) => log::debug!("capture: re-entrant callback, event dropped"),
    });
}

// ---------------------------------------------------------------------------
// Installation
// ---------------------------------------------------------------------------

/// What `install` acquired; released by `uninstall`.
pub enum Installation {
    Hook(HHOOK),
    Window {
        class: InputClass,
        hwnd: HWND,
        class_name: Vec<u16>,
    },
}

pub(super) fn install(
    class: InputClass,
    raw_input: bool,
    pipeline: EventPipeline<WindowsLayout>,
) -> Result<Installation, HookError> {
    ensure_message_queue();
    set_pipeline(Some(pipeline));

    let installed = if raw_input {
        create_raw_input_window(class)
    } else {
        install_hook(class)
    };

    match installed {
        Ok(installation) => Ok(installation),
        Err(e) => {
            set_pipeline(None);
            Err(e)
        }
    }
}

pub(super) fn uninstall(installation: Installation) -> Result<(), HookError> {
    let removed = match installation {
        Installation::Hook(hook) => {
            // SAFETY: `hook` was returned by SetWindowsHookExW on this thread.
            if unsafe { UnhookWindowsHookEx(hook) } != 0 {
                Ok(())
            } else {
                Err(HookError::UnhookFailed(last_error("UnhookWindowsHookEx")))
            }
        }
        Installation::Window {
            class,
            hwnd,
            class_name,
        } => destroy_raw_input_window(class, hwnd, &class_name),
    };

    set_pipeline(None);
    discard_pending_quit();
    removed
}

/// Forces creation of this thread's message queue, so a `WM_QUIT` posted
/// right after installation is queued rather than rejected.
fn ensure_message_queue() {
    // SAFETY: MSG is plain data; PeekMessageW only writes into it.
    unsafe {
        let mut msg: MSG = mem::zeroed();
        PeekMessageW(&mut msg, ptr::null_mut(), WM_USER, WM_USER, PM_NOREMOVE);
    }
}

/// Drops a `WM_QUIT` posted by an unregister that raced with a loop ending
/// on its own, so it cannot end the next hook run on this thread.
fn discard_pending_quit() {
    // SAFETY: MSG is plain data; PeekMessageW only writes into it.
    unsafe {
        let mut msg: MSG = mem::zeroed();
        while PeekMessageW(&mut msg, ptr::null_mut(), WM_QUIT, WM_QUIT, PM_REMOVE) != 0 {
            log::debug!("capture: discarded stale quit message");
        }
    }
}

fn install_hook(class: InputClass) -> Result<Installation, HookError> {
    let id = match class {
        InputClass::Keyboard => WH_KEYBOARD_LL,
        InputClass::Mouse => WH_MOUSE_LL,
    };
    let proc_fn: HOOKPROC = match class {
        InputClass::Keyboard => Some(keyboard_hook_proc),
        InputClass::Mouse => Some(mouse_hook_proc),
    };

    // SAFETY: the hook procs match HOOKPROC and live for the whole program.
    let hook = unsafe { SetWindowsHookExW(id, proc_fn, GetModuleHandleW(ptr::null()), 0) };
    if hook.is_null() {
        return Err(install_failed(class, "SetWindowsHookExW"));
    }

    log::info!("capture: low-level {class} hook active");
    Ok(Installation::Hook(hook))
}

fn create_raw_input_window(class: InputClass) -> Result<Installation, HookError> {
    let class_name = wide(match class {
        InputClass::Keyboard => "systemhook-keyboard",
        InputClass::Mouse => "systemhook-mouse",
    });

    // SAFETY: all pointers passed below reference locals that outlive the
    // calls; `class_name` is kept in the returned Installation.
    unsafe {
        let instance = GetModuleHandleW(ptr::null());

        let mut wc: WNDCLASSW = mem::zeroed();
        wc.lpfnWndProc = Some(window_proc);
        wc.hInstance = instance;
        wc.lpszClassName = class_name.as_ptr();
        if RegisterClassW(&wc) == 0 && GetLastError() != ERROR_CLASS_ALREADY_EXISTS {
            return Err(install_failed(class, "RegisterClassW"));
        }

        let hwnd = CreateWindowExW(
            0,
            class_name.as_ptr(),
            ptr::null(),
            0,
            0,
            0,
            0,
            0,
            HWND_MESSAGE,
            ptr::null_mut(),
            instance,
            ptr::null(),
        );
        if hwnd.is_null() {
            let err = install_failed(class, "CreateWindowExW");
            UnregisterClassW(class_name.as_ptr(), instance);
            return Err(err);
        }

        let device = RAWINPUTDEVICE {
            usUsagePage: HID_USAGE_PAGE_GENERIC,
            usUsage: hid_usage(class),
            dwFlags: RIDEV_NOLEGACY | RIDEV_INPUTSINK,
            hwndTarget: hwnd,
        };
        if RegisterRawInputDevices(&device, 1, mem::size_of::<RAWINPUTDEVICE>() as u32) == 0 {
            let err = install_failed(class, "RegisterRawInputDevices");
            DestroyWindow(hwnd);
            UnregisterClassW(class_name.as_ptr(), instance);
            return Err(err);
        }

        log::info!("capture: raw input {class} window active");
        Ok(Installation::Window {
            class,
            hwnd,
            class_name,
        })
    }
}

/// Removal request for the raw input registration of `class`.
///
/// Registrations are process-wide per usage, so only this class's usage may
/// be removed; the other class can be running on another thread.
fn removal_request(class: InputClass) -> RAWINPUTDEVICE {
    RAWINPUTDEVICE {
        usUsagePage: HID_USAGE_PAGE_GENERIC,
        usUsage: hid_usage(class),
        dwFlags: RIDEV_REMOVE,
        hwndTarget: ptr::null_mut(),
    }
}

fn destroy_raw_input_window(
    class: InputClass,
    hwnd: HWND,
    class_name: &[u16],
) -> Result<(), HookError> {
    // SAFETY: `hwnd` was created on this thread by create_raw_input_window.
    unsafe {
        let device = removal_request(class);
        if RegisterRawInputDevices(&device, 1, mem::size_of::<RAWINPUTDEVICE>() as u32) == 0 {
            log::warn!("capture: {}", last_error("RegisterRawInputDevices(RIDEV_REMOVE)"));
        }

        let destroyed = DestroyWindow(hwnd) != 0;
        let err = (!destroyed).then(|| last_error("DestroyWindow"));
        UnregisterClassW(class_name.as_ptr(), GetModuleHandleW(ptr::null()));

        match err {
            None => Ok(()),
            Some(e) => Err(HookError::UnhookFailed(e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Message loop
// ---------------------------------------------------------------------------

/// Pumps messages until `WM_QUIT`. Returns 0 on quit, -1 on error; both end it.
pub(super) fn run_message_loop() {
    // SAFETY: standard Win32 GetMessage/DispatchMessage loop on this thread.
    unsafe {
        let mut msg: MSG = mem::zeroed();
        loop {
            match GetMessageW(&mut msg, ptr::null_mut(), 0, 0) {
                0 => break,
                -1 => {
                    log::error!("capture: {}", last_error("GetMessageW"));
                    break;
                }
                _ => {
                    TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                }
            }
        }
    }
    log::info!("capture: message loop exited");
}

pub(super) fn post_quit(thread_id: u32) -> bool {
    // SAFETY: posting to an arbitrary thread id is safe; failure is reported.
    let posted = unsafe { PostThreadMessageW(thread_id, WM_QUIT, 0, 0) } != 0;
    if !posted {
        log::warn!("capture: {}", last_error("PostThreadMessageW"));
    }
    posted
}

// ---------------------------------------------------------------------------
// Hook and window procedures
// ---------------------------------------------------------------------------

/// Low-level keyboard hook proc, called on the hook thread.
unsafe extern "system" fn keyboard_hook_proc(n_code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if n_code == HC_ACTION as i32 {
        // SAFETY: l_param points to a KBDLLHOOKSTRUCT when n_code == HC_ACTION.
        let kb = &*(l_param as *const KBDLLHOOKSTRUCT);
        let record = LegacyKeyRecord {
            message: w_param as u32,
            vk_code: kb.vkCode,
            scan_code: kb.scanCode,
        };
        with_pipeline(|pipeline| pipeline.legacy_key(&record));
    }

    CallNextHookEx(ptr::null_mut(), n_code, w_param, l_param)
}

/// Low-level mouse hook proc, called on the hook thread.
unsafe extern "system" fn mouse_hook_proc(n_code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if n_code == HC_ACTION as i32 {
        // SAFETY: l_param points to a MSLLHOOKSTRUCT when n_code == HC_ACTION.
        let ms = &*(l_param as *const MSLLHOOKSTRUCT);
        let record = LegacyMouseRecord {
            message: w_param as u32,
            x: ms.pt.x,
            y: ms.pt.y,
            mouse_data: ms.mouseData,
        };
        with_pipeline(|pipeline| pipeline.legacy_mouse(&record));
    }

    CallNextHookEx(ptr::null_mut(), n_code, w_param, l_param)
}

/// Window procedure of the message-only raw input window.
unsafe extern "system" fn window_proc(hwnd: HWND, msg: u32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    match msg {
        WM_INPUT => {
            match read_packet(l_param) {
                Some(RawPacket::Keyboard(record)) => with_pipeline(|p| p.raw_key(&record)),
                Some(RawPacket::Mouse(record)) => with_pipeline(|p| p.raw_mouse(&record)),
                None => {}
            }
            // Lets the system release the raw input buffer.
            DefWindowProcW(hwnd, msg, w_param, l_param)
        }
        WM_CLOSE => {
            PostQuitMessage(0);
            0
        }
        _ => DefWindowProcW(hwnd, msg, w_param, l_param),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn hid_usage(class: InputClass) -> u16 {
    match class {
        InputClass::Keyboard => HID_USAGE_KEYBOARD,
        InputClass::Mouse => HID_USAGE_MOUSE,
    }
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

pub(super) fn last_error(call: &str) -> String {
    // SAFETY: reads the calling thread's last-error value.
    let code = unsafe { GetLastError() };
    format!("{call} failed with error {code}")
}

fn install_failed(class: InputClass, call: &str) -> HookError {
    let reason = last_error(call);
    log::error!("capture: {reason}");
    HookError::InstallFailed { class, reason }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

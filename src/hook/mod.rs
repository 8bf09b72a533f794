//! Platform-independent hook core.
//!
//! Holds the event shapes handed to the host, the process-wide error codes,
//! and the pieces that turn OS records into those events:
//!
//! - `normalize` converts legacy hook structs and raw input packets into
//!   canonical key/mouse events.
//! - `decode` resolves a virtual key to a character without disturbing
//!   dead-key composition.
//! - `bridge` attaches the delivering thread to the host runtime and performs
//!   the upcall.
//! - `dispatch` ties the three together on the hook thread.
//! - `registry` owns the register / run / unregister lifecycle per input class.
//! - `devices` filters and names the raw input device list.
//!
//! OS access goes through `crate::platform::InputBackend` only.

pub mod bridge;
pub mod decode;
pub mod devices;
pub mod dispatch;
pub mod normalize;
pub mod registry;

use std::fmt;

// ---------------------------------------------------------------------------
// Input class / acquisition mode
// ---------------------------------------------------------------------------

/// The two independent hook kinds. Each has its own thread and slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InputClass {
    Keyboard,
    Mouse,
}

impl InputClass {
    pub const ALL: [InputClass; 2] = [InputClass::Keyboard, InputClass::Mouse];

    pub(crate) fn index(self) -> usize {
        match self {
            InputClass::Keyboard => 0,
            InputClass::Mouse => 1,
        }
    }
}

impl fmt::Display for InputClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputClass::Keyboard => f.write_str("keyboard"),
            InputClass::Mouse => f.write_str("mouse"),
        }
    }
}

/// How events are acquired from the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionMode {
    /// System-wide low-level hook (`WH_KEYBOARD_LL` / `WH_MOUSE_LL`).
    Legacy,
    /// Raw input delivered to a message-only window; carries device handles.
    RawInput,
}

impl AcquisitionMode {
    /// Maps the boundary boolean (`useRawInput`) to a mode.
    pub fn from_raw_flag(use_raw_input: bool) -> Self {
        if use_raw_input {
            AcquisitionMode::RawInput
        } else {
            AcquisitionMode::Legacy
        }
    }
}

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

/// Result of a `register_hook` call as seen by the host.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,
    NoHandleMethod = -1,
    HookFailed = -2,
    UnhookFailed = -3,
    NotifyFailed = -4,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(ErrorCode::Success),
            -1 => Some(ErrorCode::NoHandleMethod),
            -2 => Some(ErrorCode::HookFailed),
            -3 => Some(ErrorCode::UnhookFailed),
            -4 => Some(ErrorCode::NotifyFailed),
            _ => None,
        }
    }
}

/// Failures of the hook lifecycle. Each maps onto one `ErrorCode`.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("no {0} handler method could be resolved")]
    NoHandleMethod(InputClass),
    #[error("a {0} hook is already registered")]
    AlreadyRegistered(InputClass),
    #[error("failed to install {class} hook: {reason}")]
    InstallFailed { class: InputClass, reason: String },
    #[error("ready notification failed: {0}")]
    NotifyFailed(String),
    #[error("failed to remove hook: {0}")]
    UnhookFailed(String),
}

impl HookError {
    pub fn code(&self) -> ErrorCode {
        match self {
            HookError::NoHandleMethod(_) => ErrorCode::NoHandleMethod,
            HookError::AlreadyRegistered(_) | HookError::InstallFailed { .. } => {
                ErrorCode::HookFailed
            }
            HookError::NotifyFailed(_) => ErrorCode::NotifyFailed,
            HookError::UnhookFailed(_) => ErrorCode::UnhookFailed,
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Opaque raw input device handle (`RAWINPUTHEADER.hDevice`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(pub isize);

impl DeviceHandle {
    pub fn as_i64(self) -> i64 {
        self.0 as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTransition {
    Down,
    Up,
}

impl KeyTransition {
    pub fn is_down(self) -> bool {
        self == KeyTransition::Down
    }
}

/// A single decoded key transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub virtual_key: u16,
    pub scan_code: u16,
    pub transition: KeyTransition,
    /// First UTF-16 unit produced by translation; `None` for dead keys and
    /// non-printable keys.
    pub character: Option<u16>,
    /// Originating device; only known in raw input mode.
    pub device: Option<DeviceHandle>,
}

impl KeyEvent {
    /// Arguments of the `onKeyEvent(virtualKey, pressed, character, deviceHandle)`
    /// upcall. A missing character or device is passed as 0.
    pub fn upcall_args(&self) -> (i32, bool, u16, i64) {
        (
            i32::from(self.virtual_key),
            self.transition.is_down(),
            self.character.unwrap_or(0),
            self.device.map_or(0, DeviceHandle::as_i64),
        )
    }

    /// The decoded character, if it is a complete scalar value.
    pub fn as_char(&self) -> Option<char> {
        self.character.and_then(|unit| char::from_u32(u32::from(unit)))
    }
}

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseTransition {
    Up = 0,
    Down = 1,
    Move = 2,
    Wheel = 3,
}

/// Mouse buttons reported in the button mask (`MK_*` values).
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left = 0x0001,
    Right = 0x0002,
    Middle = 0x0010,
}

impl MouseButton {
    pub fn mask(self) -> i32 {
        self as i32
    }
}

/// One mouse action: a button edge, a move, or a wheel tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    pub transition: MouseTransition,
    /// Set for `Down`/`Up` only.
    pub button: Option<MouseButton>,
    pub x: i32,
    pub y: i32,
    pub wheel_delta: i16,
    pub device: Option<DeviceHandle>,
}

impl MouseEvent {
    /// Arguments of the `onMouseEvent(transition, buttonMask, x, y, wheelDelta,
    /// deviceHandle)` upcall.
    pub fn upcall_args(&self) -> (i32, i32, i32, i32, i32, i64) {
        (
            self.transition as i32,
            self.button.map_or(0, MouseButton::mask),
            self.x,
            self.y,
            i32::from(self.wheel_delta),
            self.device.map_or(0, DeviceHandle::as_i64),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_match_boundary_values() {
        assert_eq!(ErrorCode::Success.as_i32(), 0);
        assert_eq!(ErrorCode::NoHandleMethod.as_i32(), -1);
        assert_eq!(ErrorCode::HookFailed.as_i32(), -2);
        assert_eq!(ErrorCode::UnhookFailed.as_i32(), -3);
        assert_eq!(ErrorCode::NotifyFailed.as_i32(), -4);
        assert_eq!(ErrorCode::from_i32(-3), Some(ErrorCode::UnhookFailed));
        assert_eq!(ErrorCode::from_i32(7), None);
    }

    #[test]
    fn already_registered_reports_hook_failed() {
        let err = HookError::AlreadyRegistered(InputClass::Mouse);
        assert_eq!(err.code(), ErrorCode::HookFailed);
        assert_eq!(err.to_string(), "a mouse hook is already registered");
    }

    #[test]
    fn raw_flag_selects_mode() {
        assert_eq!(AcquisitionMode::from_raw_flag(false), AcquisitionMode::Legacy);
        assert_eq!(AcquisitionMode::from_raw_flag(true), AcquisitionMode::RawInput);
    }

    #[test]
    fn key_upcall_uses_zero_for_missing_fields() {
        let event = KeyEvent {
            virtual_key: 0x41,
            scan_code: 0x1E,
            transition: KeyTransition::Down,
            character: None,
            device: None,
        };
        assert_eq!(event.upcall_args(), (0x41, true, 0, 0));
    }

    #[test]
    fn mouse_upcall_carries_mask_and_device() {
        let event = MouseEvent {
            transition: MouseTransition::Down,
            button: Some(MouseButton::Middle),
            x: -4,
            y: 9,
            wheel_delta: 0,
            device: Some(DeviceHandle(0x1234)),
        };
        assert_eq!(event.upcall_args(), (1, 0x10, -4, 9, 0, 0x1234));
    }
}
